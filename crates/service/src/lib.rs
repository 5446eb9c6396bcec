//! XDMCP session and forwarding state machine: everything the wire codec
//! (`xdmcp-codec`) doesn't know about — admission policy, the indirect and
//! forward-query tables, and the managed-forward retransmitter.

pub mod address;
pub mod admission;
pub mod dispatch;
pub mod forward;
pub mod indirect;
pub mod managed_forward;
pub mod session;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use address::LocalAddresses;
use admission::{UnwillingRateLimiter, WillingStatusCache};
use forward::ForwardTable;
use indirect::IndirectTable;
use session::{Display, SessionTable};

/// External collaborators the manager calls out to. Everything here is
/// out of scope for the core per section 1 of the distillation this crate
/// implements: auth file storage, the slave process, host ACLs, and the
/// daemon's own config/IPC machinery all live on the implementor's side.
pub trait ServiceHandler {
    /// TCP-wrappers-style ACL check.
    fn host_allow(&self, addr: SocketAddr) -> bool;

    /// Reverse-resolves `addr`, falling back to its literal address on
    /// failure rather than treating resolution failure as fatal.
    async fn resolve_hostname(&self, addr: SocketAddr) -> (String, Vec<SocketAddr>);

    /// Cryptographically random 16-byte MIT-MAGIC-COOKIE-1 secret.
    fn cookie_new(&self) -> [u8; 16];

    /// Hands a newly MANAGED display to the slave subsystem. `false` means
    /// the manager should reply FAILED and tear the session back down.
    async fn spawn_session(&self, display: &Display) -> bool;

    /// Runs the configured willing-script, if any, returning its first
    /// line. The caller is responsible for the 3 s result cache.
    async fn willing_run(&self, script_path: &std::path::Path) -> Option<String>;
}

/// Tunables enumerated in section 6 of the distillation. `config.get(key)`
/// becomes this concrete, already-validated struct rather than a runtime
/// key/value lookup.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub port: u16,
    pub honor_indirect: bool,
    pub willing_script: Option<PathBuf>,
    pub max_displays_per_host: u32,
    pub max_displays: u32,
    pub max_pending_displays: u32,
    pub max_wait: Duration,
    pub max_indirect: u32,
    pub max_wait_indirect: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            port: codec::DEFAULT_PORT,
            honor_indirect: true,
            willing_script: None,
            max_displays_per_host: 2,
            max_displays: 16,
            max_pending_displays: 4,
            max_wait: Duration::from_secs(15),
            max_indirect: 16,
            max_wait_indirect: Duration::from_secs(15),
        }
    }
}

/// One packet the dispatcher wants sent. The event loop (C9) owns the
/// socket; this crate never touches it directly.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: SocketAddr,
    pub bytes: Vec<u8>,
}

impl Outbound {
    pub fn new(to: SocketAddr, bytes: Vec<u8>) -> Self {
        Self { to, bytes }
    }
}

/// All protocol state, owned by a single event loop — no `Arc`, no locks.
/// Every table here is mutated only from inside [`dispatch::Manager::on_datagram`]
/// or the periodic maintenance tick the event loop drives.
pub struct Manager<T> {
    config: ManagerConfig,
    handler: T,
    sessions: SessionTable,
    indirect: IndirectTable,
    forwards: ForwardTable,
    managed_forwards: managed_forward::Queue,
    locals: LocalAddresses,
    willing_cache: WillingStatusCache,
    unwilling_limiter: UnwillingRateLimiter,
}

impl<T> Manager<T>
where
    T: ServiceHandler,
{
    pub fn new(config: ManagerConfig, handler: T) -> Self {
        let indirect = IndirectTable::new(config.max_indirect as usize, config.max_wait_indirect);

        Self {
            config,
            handler,
            sessions: SessionTable::default(),
            indirect,
            forwards: ForwardTable::default(),
            managed_forwards: managed_forward::Queue::default(),
            locals: LocalAddresses::default(),
            willing_cache: WillingStatusCache::default(),
            unwilling_limiter: UnwillingRateLimiter::default(),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn indirect(&self) -> &IndirectTable {
        &self.indirect
    }

    pub fn forwards(&self) -> &ForwardTable {
        &self.forwards
    }

    pub fn managed_forwards(&self) -> &managed_forward::Queue {
        &self.managed_forwards
    }

    /// Drives the managed-forward retransmit queue; call this on every
    /// event-loop wake, not only socket readiness.
    pub fn poll_timers(&mut self) -> Vec<Outbound> {
        use codec::message::encode_managed_forward;

        self.managed_forwards
            .poll_due(std::time::Instant::now())
            .into_iter()
            .map(|(manager, origin)| Outbound::new(manager, encode_managed_forward(origin.ip())))
            .collect()
    }

    /// The next instant the event loop must wake to service a pending
    /// managed-forward retransmit, for use alongside socket readiness in a
    /// `tokio::select!`.
    pub fn next_timer_wake(&self) -> Option<std::time::Instant> {
        self.managed_forwards.next_wake()
    }

    /// Removes PENDING displays that have aged past `max_wait`. Intended
    /// to run on a periodic tick, not per-datagram.
    pub fn purge_stale(&mut self) {
        self.sessions.purge_stale(self.config.max_wait);
    }

    /// Resolves `host_node` and records it as the chooser's decision for
    /// the indirect query identified by `id`. This is the core-side half
    /// of the `CHOSEN <id> <host>` control-input command described in
    /// section 6; the surface that parses that command is the caller's
    /// responsibility.
    pub async fn deliver_chosen(&mut self, id: u32, host_node: &str) -> bool {
        let Some(host) = address::resolve_first(host_node, self.config.port).await else {
            return false;
        };

        self.indirect.deliver_chosen(id, host)
    }
}
