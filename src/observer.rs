//! Structured logging for protocol events, in the same per-callback style
//! the rest of this codebase's stack uses for its own observer hooks:
//! one terse [`log`] line per notable transition, no accumulation of state.

use std::net::SocketAddr;

use codec::{Header, Message};
use service::Outbound;

pub fn log_inbound(src: SocketAddr, header: &Header, message: &Message<'_>) {
    match message {
        Message::Query { .. } => log::info!("QUERY from {src}"),
        Message::BroadcastQuery { .. } => log::info!("BROADCAST_QUERY from {src}"),
        Message::IndirectQuery { .. } => log::info!("INDIRECT_QUERY from {src}"),
        Message::ForwardQuery { target, .. } => {
            log::info!("FORWARD_QUERY from {src} for {target}")
        }
        Message::Request { display_number, .. } => {
            log::info!("REQUEST from {src} display={display_number}")
        }
        Message::Manage { session_id, display_number, .. } => {
            log::info!("MANAGE from {src} session={session_id:#x} display={display_number}")
        }
        Message::KeepAlive { session_id, .. } => {
            log::info!("KEEPALIVE from {src} session={session_id:#x}")
        }
        Message::ManagedForward { origin } => {
            log::info!("MANAGED_FORWARD from {src} origin={origin}")
        }
        Message::GotManagedForward { origin } => {
            log::info!("GOT_MANAGED_FORWARD from {src} origin={origin}")
        }
    }

    log::debug!("header version={} opcode={}", header.version, header.opcode);
}

pub fn log_outbound(outbound: &[Outbound]) {
    for packet in outbound {
        log::debug!("-> {} ({} bytes)", packet.to, packet.bytes.len());
    }
}
