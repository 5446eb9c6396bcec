//! Socket lifecycle (C9): binds the XDMCP UDP socket and runs the single
//! cooperative event loop that owns the [`Manager`].

use std::collections::HashSet;
use std::io;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};

use service::{Manager, ServiceHandler};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;

use crate::{control, observer};

const RECV_BUFFER_SIZE: usize = 1500;

/// Binds (IPv6, any-address, port), falling back to (IPv4, any-address,
/// port) if dual-stack IPv6 is unavailable. Matches section 4.9's bind
/// attempt order.
pub async fn bind(port: u16) -> io::Result<UdpSocket> {
    let v6 = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0);
    match UdpSocket::bind(SocketAddr::V6(v6)).await {
        Ok(socket) => Ok(socket),
        Err(v6_err) => {
            log::warn!("IPv6 bind failed ({v6_err}), falling back to IPv4");
            UdpSocket::bind(SocketAddr::new(std::net::Ipv4Addr::UNSPECIFIED.into(), port)).await
        }
    }
}

/// Joins `group` on every up, non-loopback interface, as required when
/// multicast discovery is enabled, so discovery works on every attached
/// network rather than whichever one the kernel would have defaulted to.
pub fn join_multicast(socket: &UdpSocket, group: Ipv6Addr) {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(err) => {
            log::warn!("failed to enumerate interfaces for multicast join: {err}");
            return;
        }
    };

    let mut seen_indexes = HashSet::new();
    let mut joined_any = false;

    for interface in interfaces {
        if interface.is_loopback() {
            continue;
        }

        let Some(index) = interface.index else { continue };
        if !seen_indexes.insert(index) {
            continue;
        }

        match socket.join_multicast_v6(&group, index) {
            Ok(()) => joined_any = true,
            Err(err) => log::warn!(
                "failed to join multicast group {group} on {} (index {index}): {err}",
                interface.name
            ),
        }
    }

    if !joined_any {
        log::warn!("joined multicast group {group} on no interface");
    }
}

/// Runs until the process receives a shutdown signal. The receive path is
/// edge-triggered: one readable wakeup drains exactly one datagram before
/// control returns to the scheduler, per section 4.9.
pub async fn run<T>(socket: UdpSocket, mut manager: Manager<T>) -> io::Result<()>
where
    T: ServiceHandler,
{
    let mut buffer = [0u8; RECV_BUFFER_SIZE];
    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut purge_tick = tokio::time::interval(std::time::Duration::from_secs(1));
    purge_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        let wake_at = manager.next_timer_wake();
        let timer = async {
            match wake_at {
                Some(at) => tokio::time::sleep_until(at.into()).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            recv = socket.recv_from(&mut buffer) => {
                let (len, src) = recv?;
                handle_datagram(&mut manager, &socket, src, &buffer[..len]).await;
            }
            _ = timer => {
                let outbound = manager.poll_timers();
                observer::log_outbound(&outbound);
                send_all(&socket, &outbound).await;
            }
            _ = purge_tick.tick() => {
                manager.purge_stale();
            }
            line = commands.next_line(), if stdin_open => {
                match line? {
                    Some(text) => handle_command(&mut manager, &text).await,
                    None => stdin_open = false,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("shutdown requested, closing socket and cancelling timers");
                return Ok(());
            }
        }
    }
}

async fn handle_command<T>(manager: &mut Manager<T>, line: &str)
where
    T: ServiceHandler,
{
    match control::parse_chosen(line) {
        Some(cmd) => {
            let delivered = manager.deliver_chosen(cmd.id, &cmd.host_node).await;
            log::info!("CHOSEN id={:#x} host={} delivered={delivered}", cmd.id, cmd.host_node);
        }
        None if line.trim().is_empty() => {}
        None => log::warn!("unrecognized control command: {line}"),
    }
}

async fn handle_datagram<T>(manager: &mut Manager<T>, socket: &UdpSocket, src: SocketAddr, bytes: &[u8])
where
    T: ServiceHandler,
{
    if let Ok((header, message)) = codec::Decoder::default().decode(bytes) {
        observer::log_inbound(src, &header, &message);
    }

    let outbound = manager.on_datagram(src, bytes).await;
    observer::log_outbound(&outbound);
    send_all(socket, &outbound).await;
}

async fn send_all(socket: &UdpSocket, outbound: &[service::Outbound]) {
    for packet in outbound {
        if let Err(err) = socket.send_to(&packet.bytes, packet.to).await {
            log::warn!("send to {} failed: {err}", packet.to);
        }
    }
}
