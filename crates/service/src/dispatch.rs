//! Protocol dispatcher (C7): demultiplexes incoming datagrams by opcode,
//! validates them, and drives C3/C4/C5/C6/C8 to produce the replies.

use std::net::SocketAddr;

use codec::message::{
    encode_accept, encode_alive, encode_decline, encode_failed, encode_forward_query,
    encode_got_managed_forward, encode_managed_forward, encode_refuse, encode_unwilling,
    encode_willing,
};
use codec::{Decoder, Header, Message, opcode};

use crate::session::Status;
use crate::{Manager, Outbound, ServiceHandler};

const MIT_MAGIC_COOKIE_1: &[u8] = b"MIT-MAGIC-COOKIE-1";

impl<T> Manager<T>
where
    T: ServiceHandler,
{
    /// Entry point fed one datagram at a time by the event loop (C9). Never
    /// panics and never blocks beyond the bounded operations the handler
    /// itself performs (name resolution, willing-script execution).
    pub async fn on_datagram(&mut self, src: SocketAddr, bytes: &[u8]) -> Vec<Outbound> {
        let header = match Header::decode(bytes) {
            Ok(header) => header,
            Err(_) => return Vec::new(),
        };

        if header.version != codec::VERSION && header.version != codec::VENDOR_VERSION {
            return Vec::new();
        }

        if !self.handler.host_allow(src) {
            if header.opcode == opcode::QUERY && self.unwilling_limiter.allow() {
                return vec![Outbound::new(src, encode_unwilling(b"Not authorized"))];
            }
            return Vec::new();
        }

        let message = match Decoder::default().decode(bytes) {
            Ok((_, message)) => message,
            Err(_) => {
                if header.opcode == opcode::REQUEST {
                    return vec![Outbound::new(
                        src,
                        encode_decline(b"Failed checksum", b"", b""),
                    )];
                }
                return Vec::new();
            }
        };

        match message {
            Message::Query { .. } | Message::BroadcastQuery { .. } => {
                let status = self.willing_status_for(src).await;
                vec![Outbound::new(src, encode_willing(b"", status.as_bytes()))]
            }
            Message::IndirectQuery { authentication_names } => {
                self.handle_indirect_query(src, &authentication_names).await
            }
            Message::ForwardQuery { target, .. } => self.handle_forward_query(src, target).await,
            Message::Request {
                display_number,
                authorization_names,
                ..
            } => self.handle_request(src, display_number, &authorization_names).await,
            Message::Manage {
                session_id,
                display_number: _,
                display_class: _,
            } => self.handle_manage(src, session_id).await,
            Message::KeepAlive { display_number, session_id } => {
                self.handle_keep_alive(src, display_number, session_id)
            }
            Message::ManagedForward { origin } => {
                if let Some(record) = self.indirect.lookup_by_chosen(src.ip(), origin, &mut self.locals) {
                    self.indirect.dispose(record.id);
                }
                vec![Outbound::new(src, encode_got_managed_forward(origin))]
            }
            Message::GotManagedForward { origin } => {
                self.managed_forwards
                    .cancel_matching(src, SocketAddr::new(origin, codec::DEFAULT_PORT));
                Vec::new()
            }
        }
    }

    async fn handle_indirect_query(
        &mut self,
        src: SocketAddr,
        authentication_names: &[&[u8]],
    ) -> Vec<Outbound> {
        if !self.config.honor_indirect {
            return Vec::new();
        }

        let record = match self.indirect.lookup_by_origin(src) {
            Some(record) => record,
            None => {
                self.indirect.alloc(src);
                match self.indirect.lookup_by_origin(src) {
                    Some(record) => record,
                    None => return Vec::new(),
                }
            }
        };

        match record.chosen {
            Some(chosen) if self.locals.is_local(chosen.ip()) => {
                self.indirect.dispose(record.id);
                let status = self.willing_status_for(src).await;
                vec![Outbound::new(src, encode_willing(b"", status.as_bytes()))]
            }
            Some(chosen) if crate::address::is_loopback(src.ip()) => self
                .locals
                .non_loopback()
                .into_iter()
                .map(|local_ip| {
                    let client = SocketAddr::new(local_ip, src.port());
                    Outbound::new(chosen, encode_forward_query(client, authentication_names))
                })
                .collect(),
            Some(chosen) => vec![Outbound::new(
                chosen,
                encode_forward_query(src, authentication_names),
            )],
            None => {
                let status = self.willing_status_for(src).await;
                vec![Outbound::new(src, encode_willing(b"", status.as_bytes()))]
            }
        }
    }

    async fn handle_forward_query(&mut self, src: SocketAddr, target: SocketAddr) -> Vec<Outbound> {
        self.managed_forwards.cancel_matching(src, target);

        if !self.handler.host_allow(target) {
            return Vec::new();
        }

        self.forwards.dispose(target);
        self.forwards.alloc(src, target);

        let status = self.willing_status_for(target).await;
        vec![Outbound::new(target, encode_willing(b"", status.as_bytes()))]
    }

    async fn handle_request(
        &mut self,
        src: SocketAddr,
        display_number: u16,
        authorization_names: &[&[u8]],
    ) -> Vec<Outbound> {
        if !authorization_names.iter().any(|name| *name == MIT_MAGIC_COOKIE_1) {
            return vec![Outbound::new(
                src,
                encode_decline(b"Only MIT-MAGIC-COOKIE-1 supported", b"", b""),
            )];
        }

        self.sessions.purge_stale(self.config.max_wait);

        if self.sessions.num_managed() as u32 >= self.config.max_displays {
            return vec![Outbound::new(
                src,
                encode_decline(b"Maximum number of open sessions reached", b"", b""),
            )];
        }

        if !self.locals.is_local(src.ip())
            && self.sessions.per_host_count(src) as u32 >= self.config.max_displays_per_host
        {
            return vec![Outbound::new(
                src,
                encode_decline(b"Maximum number of open sessions from your host reached", b"", b""),
            )];
        }

        if self.sessions.num_pending() as u32 >= self.config.max_pending_displays {
            return vec![Outbound::new(
                src,
                encode_decline(b"Maximum pending servers", b"", b""),
            )];
        }

        let (hostname, alt_addrs) = self.handler.resolve_hostname(src).await;

        if let Some(stale_id) = self.sessions.find_by_hostname(&hostname, display_number) {
            self.sessions.dispose(stale_id);
        }

        let cookie = self.handler.cookie_new();
        let session_id = self.sessions.alloc(src, display_number, hostname, alt_addrs, cookie);

        vec![Outbound::new(
            src,
            encode_accept(session_id, b"", MIT_MAGIC_COOKIE_1, &cookie),
        )]
    }

    async fn handle_manage(&mut self, src: SocketAddr, session_id: u32) -> Vec<Outbound> {
        let status = match self.sessions.get(session_id) {
            None => return vec![Outbound::new(src, encode_refuse(session_id))],
            Some(display) => display.status,
        };

        if status == Status::Managed {
            return Vec::new();
        }

        let indirect_record = self.indirect.lookup_by_origin(src);
        if let Some(display) = self.sessions.get_mut(session_id) {
            match &indirect_record {
                Some(record) if self.config.honor_indirect && record.chosen.is_none() => {
                    display.use_chooser = true;
                    display.indirect_reference = record.id;
                }
                _ => display.use_chooser = false,
            }
        }

        if let Some(record) = &indirect_record {
            if !(self.config.honor_indirect && record.chosen.is_none()) {
                self.indirect.dispose(record.id);
            }
        }

        let mut outbound = Vec::new();

        if let Some(forward) = self.forwards.lookup(src) {
            outbound.push(Outbound::new(forward.from, encode_managed_forward(src.ip())));
            self.managed_forwards.send(forward.from, src);
            self.forwards.dispose(src);
        }

        self.sessions.manage(session_id);

        let display = match self.sessions.get(session_id) {
            Some(display) => display.clone(),
            None => return outbound,
        };

        if !self.handler.spawn_session(&display).await {
            self.sessions.dispose(session_id);
            outbound.push(Outbound::new(src, encode_failed(session_id, b"Failed to start session")));
        }

        outbound
    }

    fn handle_keep_alive(&mut self, src: SocketAddr, display_number: u16, session_id: u32) -> Vec<Outbound> {
        let found = self
            .sessions
            .get(session_id)
            .or_else(|| self.sessions.find_by_addr(src, display_number));

        let (running, id) = match found {
            Some(display) => (
                if display.status == Status::Managed { 1u8 } else { 0u8 },
                display.session_id,
            ),
            None => (0u8, 0u32),
        };

        vec![Outbound::new(src, encode_alive(running, id))]
    }

    /// Composes the WILLING status string for `peer`: the cached
    /// willing-script output (or platform sysid fallback), with the
    /// "(Server is busy)" suffix appended when `peer` is remote and its
    /// host is at the per-host display cap.
    async fn willing_status_for(&mut self, peer: SocketAddr) -> String {
        let base = match self.willing_cache.fresh() {
            Some(cached) => cached.to_string(),
            None => {
                let computed = match &self.config.willing_script {
                    Some(script) => match self.handler.willing_run(script).await {
                        Some(status) => status,
                        None => sysid_string(),
                    },
                    None => sysid_string(),
                };
                self.willing_cache.store(computed.clone());
                computed
            }
        };

        let per_host_at_cap =
            self.sessions.per_host_count(peer) as u32 >= self.config.max_displays_per_host;
        crate::admission::compose_status(&base, self.locals.is_local(peer.ip()), per_host_at_cap)
    }
}

/// "sysname release", e.g. `"Linux 6.8.0"` — the same fallback WILLING
/// status the host XDMCP daemon has always reported when no willing-script
/// is configured.
fn sysid_string() -> String {
    match uname::uname() {
        Ok(info) => format!("{} {}", info.sysname, info.release),
        Err(_) => std::env::consts::OS.to_string(),
    }
}
