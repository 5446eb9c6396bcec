//! End-to-end scenarios driving `Manager::on_datagram` directly, the way a
//! real peer's datagrams would arrive off the wire. Assertions read the
//! outbound bytes' opcode and payload rather than re-decoding through
//! `Message`, since several opcodes exercised here (ACCEPT, ALIVE,
//! MANAGED_FORWARD) have no inbound `Message` variant to decode into.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use codec::fields::Writer;
use codec::message::{encode_forward_query, encode_managed_forward};
use codec::{Header, VENDOR_VERSION, VERSION, opcode};
use service::session::Display;
use service::{Manager, ManagerConfig, ServiceHandler};

struct TestHandler;

impl ServiceHandler for TestHandler {
    fn host_allow(&self, _addr: SocketAddr) -> bool {
        true
    }

    async fn resolve_hostname(&self, addr: SocketAddr) -> (String, Vec<SocketAddr>) {
        (addr.ip().to_string(), vec![addr])
    }

    fn cookie_new(&self) -> [u8; 16] {
        [7u8; 16]
    }

    async fn spawn_session(&self, _display: &Display) -> bool {
        true
    }

    async fn willing_run(&self, _script_path: &Path) -> Option<String> {
        None
    }
}

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

fn frame(opcode: u16, version: u16, body: Vec<u8>) -> Vec<u8> {
    let header = Header {
        version,
        opcode,
        length: body.len() as u16,
    };
    let mut bytes = Vec::new();
    header.encode(&mut bytes);
    bytes.extend_from_slice(&body);
    bytes
}

fn request_packet(authorization_names: &[&[u8]]) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_card16(0);
    w.write_array16(&[]);
    w.write_array_of_array8(&[]);
    w.write_array8(b"");
    w.write_array8(b"");
    w.write_array_of_array8(authorization_names);
    w.write_array8(b"");
    frame(opcode::REQUEST, VERSION, w.into_bytes())
}

fn manage_packet(session_id: u32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_card32(session_id);
    w.write_card16(0);
    w.write_array8(b"");
    frame(opcode::MANAGE, VERSION, w.into_bytes())
}

fn keepalive_packet(display_number: u16, session_id: u32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_card16(display_number);
    w.write_card32(session_id);
    frame(opcode::KEEPALIVE, VERSION, w.into_bytes())
}

fn indirect_query_packet(authentication_names: &[&[u8]]) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_array_of_array8(authentication_names);
    frame(opcode::INDIRECT_QUERY, VERSION, w.into_bytes())
}

fn got_managed_forward_packet(origin: IpAddr) -> Vec<u8> {
    let mut w = Writer::new();
    match origin {
        IpAddr::V4(v4) => w.write_array8(&v4.octets()),
        IpAddr::V6(v6) => w.write_array8(&v6.octets()),
    }
    frame(opcode::GOT_MANAGED_FORWARD, VENDOR_VERSION, w.into_bytes())
}

fn session_id_from_accept(bytes: &[u8]) -> u32 {
    u32::from_be_bytes(bytes[6..10].try_into().unwrap())
}

fn decline_reason(bytes: &[u8]) -> String {
    let len = u16::from_be_bytes(bytes[6..8].try_into().unwrap()) as usize;
    String::from_utf8_lossy(&bytes[8..8 + len]).to_string()
}

#[tokio::test]
async fn direct_session_accept_manage_keepalive() {
    let mut manager = Manager::new(ManagerConfig::default(), TestHandler);
    let display = addr("192.0.2.10:1234");

    let accepted = manager
        .on_datagram(display, &request_packet(&[b"MIT-MAGIC-COOKIE-1"]))
        .await;
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].bytes[2..4], opcode::ACCEPT.to_be_bytes());

    let session_id = session_id_from_accept(&accepted[0].bytes);
    assert_ne!(session_id, 0);
    assert_eq!(manager.sessions().num_pending(), 1);

    let managed = manager.on_datagram(display, &manage_packet(session_id)).await;
    assert!(managed.is_empty(), "spawn succeeds, no reply expected");
    assert_eq!(manager.sessions().num_managed(), 1);

    let alive = manager
        .on_datagram(display, &keepalive_packet(0, session_id))
        .await;
    assert_eq!(alive.len(), 1);
    assert_eq!(alive[0].bytes[2..4], opcode::ALIVE.to_be_bytes());
    assert_eq!(alive[0].bytes[6], 1, "session is managed, running=1");
}

#[tokio::test]
async fn over_pending_cap_is_declined() {
    let mut config = ManagerConfig::default();
    config.max_pending_displays = 1;
    let mut manager = Manager::new(config, TestHandler);

    let first = manager
        .on_datagram(addr("192.0.2.1:1"), &request_packet(&[b"MIT-MAGIC-COOKIE-1"]))
        .await;
    assert_eq!(first[0].bytes[2..4], opcode::ACCEPT.to_be_bytes());

    let second = manager
        .on_datagram(addr("192.0.2.2:1"), &request_packet(&[b"MIT-MAGIC-COOKIE-1"]))
        .await;
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].bytes[2..4], opcode::DECLINE.to_be_bytes());
    assert!(decline_reason(&second[0].bytes).contains("pending"));
}

#[tokio::test]
async fn keepalive_for_unknown_session_reports_not_running() {
    let mut manager = Manager::new(ManagerConfig::default(), TestHandler);

    let reply = manager
        .on_datagram(addr("192.0.2.50:9000"), &keepalive_packet(3, 0xDEAD_BEEF))
        .await;

    assert_eq!(reply.len(), 1);
    assert_eq!(reply[0].bytes[2..4], opcode::ALIVE.to_be_bytes());
    assert_eq!(reply[0].bytes[6], 0, "unknown session reports not running");
    let id = u32::from_be_bytes(reply[0].bytes[7..11].try_into().unwrap());
    assert_eq!(id, 0);
}

#[tokio::test]
async fn malformed_request_gets_failed_checksum_decline() {
    let mut manager = Manager::new(ManagerConfig::default(), TestHandler);

    let mut bytes = request_packet(&[b"MIT-MAGIC-COOKIE-1"]);
    let true_len = bytes.len() - Header::SIZE;
    bytes[4..6].copy_from_slice(&((true_len + 1) as u16).to_be_bytes());

    let reply = manager.on_datagram(addr("192.0.2.60:1"), &bytes).await;
    assert_eq!(reply.len(), 1);
    assert_eq!(reply[0].bytes[2..4], opcode::DECLINE.to_be_bytes());
    assert_eq!(decline_reason(&reply[0].bytes), "Failed checksum");
}

#[tokio::test]
async fn forward_query_to_remote_target_replies_willing_there() {
    let mut manager = Manager::new(ManagerConfig::default(), TestHandler);
    let peer = addr("198.51.100.1:177");
    let target = addr("198.51.100.20:177");

    let bytes = encode_forward_query(target, &[b"MIT-MAGIC-COOKIE-1"]);
    let reply = manager.on_datagram(peer, &bytes).await;

    assert_eq!(reply.len(), 1);
    assert_eq!(reply[0].to, target);
    assert_eq!(reply[0].bytes[2..4], opcode::WILLING.to_be_bytes());
    assert_eq!(manager.forwards().len(), 1);
}

#[tokio::test]
async fn managed_forward_round_trip_registers_and_cancels_retransmit() {
    let mut manager = Manager::new(ManagerConfig::default(), TestHandler);
    let peer = addr("198.51.100.1:177");
    let display = addr("198.51.100.20:4000");

    manager
        .on_datagram(peer, &encode_forward_query(display, &[]))
        .await;

    let accepted = manager
        .on_datagram(display, &request_packet(&[b"MIT-MAGIC-COOKIE-1"]))
        .await;
    let session_id = session_id_from_accept(&accepted[0].bytes);

    let managed = manager.on_datagram(display, &manage_packet(session_id)).await;
    assert_eq!(managed.len(), 1);
    assert_eq!(managed[0].bytes[2..4], opcode::MANAGED_FORWARD.to_be_bytes());
    assert_eq!(managed[0].to, peer);
    assert_eq!(manager.managed_forwards().len(), 1);

    let ack_reply = manager
        .on_datagram(peer, &got_managed_forward_packet(display.ip()))
        .await;
    assert!(ack_reply.is_empty());
    assert_eq!(
        manager.managed_forwards().len(),
        0,
        "GOT_MANAGED_FORWARD cancels the retransmit timer"
    );
}

/// Scenario 4: a client queries this host over loopback, so its
/// IndirectRecord's origin is 127.0.0.1, but the chosen host's
/// MANAGED_FORWARD carries one of this host's real interface addresses as
/// origin instead. The record must still be found and disposed, not leaked.
#[tokio::test]
async fn managed_forward_disposes_loopback_origin_indirect_record() {
    let local_ip = if_addrs::get_if_addrs()
        .expect("enumerate local interfaces")
        .into_iter()
        .map(|i| i.ip())
        .find(|ip| !ip.is_loopback())
        .expect("test host has at least one non-loopback interface");

    let mut manager = Manager::new(ManagerConfig::default(), TestHandler);
    let loopback_client = addr("127.0.0.1:1234");
    let chosen_host = addr("198.51.100.5:177");

    manager.on_datagram(loopback_client, &indirect_query_packet(&[])).await;
    assert_eq!(manager.indirect().len(), 1, "unresolved query allocates a record");

    assert!(manager.deliver_chosen(1, &chosen_host.ip().to_string()).await);

    let reply = manager
        .on_datagram(chosen_host, &encode_managed_forward(local_ip))
        .await;

    assert_eq!(reply.len(), 1);
    assert_eq!(reply[0].bytes[2..4], opcode::GOT_MANAGED_FORWARD.to_be_bytes());
    assert_eq!(
        manager.indirect().len(),
        0,
        "loopback-origin record must be disposed via the chosen+local-origin match, not leaked"
    );
}
