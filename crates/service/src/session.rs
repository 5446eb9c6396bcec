//! Session table (C6): the set of pending and managed XDMCP displays.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Managed,
    Dead,
}

/// One remote display known to the manager.
#[derive(Debug, Clone)]
pub struct Display {
    pub remote_addr: SocketAddr,
    pub display_number: u16,
    pub session_id: u32,
    pub status: Status,
    pub accept_time: Instant,
    pub hostname: String,
    pub alt_addrs: Vec<SocketAddr>,
    pub cookie: [u8; 16],
    /// 0 if this display was reached directly, otherwise the owning
    /// [`crate::indirect::IndirectRecord`] id.
    pub indirect_reference: u32,
    pub use_chooser: bool,
    /// Opaque to the core; set by the slave-spawn collaborator.
    pub slave_pid: Option<u32>,
}

impl Display {
    pub fn cookie_hex(&self) -> String {
        self.cookie.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Allocates non-zero session ids monotonically from a random start;
/// wraparound past `u32::MAX` re-randomizes rather than reusing 1.
pub struct SessionIdAllocator {
    next: u32,
}

impl Default for SessionIdAllocator {
    fn default() -> Self {
        let start = rand::rng().random_range(1..=u32::MAX);
        Self { next: start }
    }
}

impl SessionIdAllocator {
    /// # Test
    ///
    /// ```
    /// use xdmcp_service::session::SessionIdAllocator;
    ///
    /// let mut alloc = SessionIdAllocator::default();
    /// let a = alloc.next_id();
    /// let b = alloc.next_id();
    /// assert_ne!(a, 0);
    /// assert_ne!(b, 0);
    /// assert_ne!(a, b);
    /// ```
    pub fn next_id(&mut self) -> u32 {
        loop {
            let (id, overflowed) = self.next.overflowing_add(1);
            self.next = if overflowed {
                rand::rng().random_range(1..=u32::MAX)
            } else {
                id
            };

            if self.next != 0 {
                return self.next;
            }
        }
    }
}

#[derive(Default)]
pub struct SessionTable {
    displays: HashMap<u32, Display>,
    allocator: SessionIdAllocator,
    num_pending: usize,
    num_managed: usize,
}

impl SessionTable {
    pub fn num_pending(&self) -> usize {
        self.num_pending
    }

    pub fn num_managed(&self) -> usize {
        self.num_managed
    }

    pub fn per_host_count(&self, addr: SocketAddr) -> usize {
        self.displays
            .values()
            .filter(|d| d.status != Status::Dead && d.remote_addr.ip() == addr.ip())
            .count()
    }

    /// Allocates a PENDING display and returns its session id.
    pub fn alloc(
        &mut self,
        remote_addr: SocketAddr,
        display_number: u16,
        hostname: String,
        alt_addrs: Vec<SocketAddr>,
        cookie: [u8; 16],
    ) -> u32 {
        let session_id = self.allocator.next_id();
        self.displays.insert(
            session_id,
            Display {
                remote_addr,
                display_number,
                session_id,
                status: Status::Pending,
                accept_time: Instant::now(),
                hostname,
                alt_addrs,
                cookie,
                indirect_reference: 0,
                use_chooser: false,
                slave_pid: None,
            },
        );

        self.num_pending += 1;
        session_id
    }

    pub fn get(&self, session_id: u32) -> Option<&Display> {
        self.displays.get(&session_id)
    }

    pub fn get_mut(&mut self, session_id: u32) -> Option<&mut Display> {
        self.displays.get_mut(&session_id)
    }

    /// Finds the prior Display for the same (hostname, display-number),
    /// so a re-sent REQUEST replaces rather than duplicates it.
    pub fn find_by_hostname(&self, hostname: &str, display_number: u16) -> Option<u32> {
        self.displays
            .values()
            .find(|d| d.hostname == hostname && d.display_number == display_number)
            .map(|d| d.session_id)
    }

    pub fn find_by_addr(&self, remote_addr: SocketAddr, display_number: u16) -> Option<&Display> {
        self.displays
            .values()
            .find(|d| d.remote_addr == remote_addr && d.display_number == display_number)
    }

    /// Marks a PENDING display MANAGED. No-op (idempotent) if already
    /// MANAGED; returns `false` if no such session exists.
    pub fn manage(&mut self, session_id: u32) -> bool {
        match self.displays.get_mut(&session_id) {
            Some(d) if d.status == Status::Managed => true,
            Some(d) => {
                d.status = Status::Managed;
                self.num_pending -= 1;
                self.num_managed += 1;
                true
            }
            None => false,
        }
    }

    pub fn dispose(&mut self, session_id: u32) -> Option<Display> {
        let display = self.displays.remove(&session_id)?;
        match display.status {
            Status::Pending => self.num_pending -= 1,
            Status::Managed => self.num_managed -= 1,
            Status::Dead => {}
        }
        Some(display)
    }

    /// Removes PENDING displays whose age exceeds `max_wait`.
    pub fn purge_stale(&mut self, max_wait: Duration) {
        let stale: Vec<u32> = self
            .displays
            .values()
            .filter(|d| d.status == Status::Pending && d.accept_time.elapsed() > max_wait)
            .map(|d| d.session_id)
            .collect();

        for session_id in stale {
            self.dispose(session_id);
        }
    }

    /// Recomputes `num_pending`/`num_managed` from a full scan.
    pub fn count_sessions(&mut self) {
        self.num_pending = self.displays.values().filter(|d| d.status == Status::Pending).count();
        self.num_managed = self.displays.values().filter(|d| d.status == Status::Managed).count();
    }
}
