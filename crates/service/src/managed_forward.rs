//! Managed-forward retransmitter (C5): periodic re-send of MANAGED_FORWARD
//! until acknowledged or a bounded number of attempts elapse.
//!
//! Entries hold no back-pointer to the manager or the socket — only the
//! addresses and timing needed to know when to fire next. The event loop
//! polls [`Queue::poll_due`] from its own `tokio::select!` and performs the
//! actual send, keeping this module free of any I/O.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

const RETRANSMIT_INTERVAL: Duration = Duration::from_millis(1500);
const MAX_TRANSMISSIONS: u8 = 3;

struct Entry {
    manager: SocketAddr,
    origin: SocketAddr,
    transmissions: u8,
    next_fire: Instant,
}

#[derive(Default)]
pub struct Queue {
    entries: Vec<Entry>,
}

impl Queue {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Registers a retransmit timer for a MANAGED_FORWARD the caller has
    /// already sent once.
    pub fn send(&mut self, manager: SocketAddr, origin: SocketAddr) {
        self.cancel_matching(manager, origin);
        self.entries.push(Entry {
            manager,
            origin,
            transmissions: 1,
            next_fire: Instant::now() + RETRANSMIT_INTERVAL,
        });
    }

    /// Removes any entry for `(manager, origin)`, cancelling its timer.
    /// Addresses are compared by IP only: the sender of a GOT_MANAGED_FORWARD
    /// or a repeated FORWARD_QUERY reports origin addresses reconstructed
    /// from a bare `ARRAY8`, which carries no port.
    pub fn cancel_matching(&mut self, manager: SocketAddr, origin: SocketAddr) {
        self.entries
            .retain(|e| !(e.manager.ip() == manager.ip() && e.origin.ip() == origin.ip()));
    }

    /// Returns the `(manager, origin)` pairs due for retransmission at
    /// `now`, advancing or dropping each entry as appropriate.
    pub fn poll_due(&mut self, now: Instant) -> Vec<(SocketAddr, SocketAddr)> {
        let mut due = Vec::new();
        let mut i = 0;

        while i < self.entries.len() {
            if self.entries[i].next_fire > now {
                i += 1;
                continue;
            }

            let entry = &mut self.entries[i];
            due.push((entry.manager, entry.origin));
            entry.transmissions += 1;

            if entry.transmissions >= MAX_TRANSMISSIONS {
                self.entries.remove(i);
            } else {
                entry.next_fire = now + RETRANSMIT_INTERVAL;
                i += 1;
            }
        }

        due
    }

    /// The earliest time the event loop must wake to service this queue,
    /// for use in a `tokio::select!` alongside socket readiness.
    pub fn next_wake(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.next_fire).min()
    }
}
