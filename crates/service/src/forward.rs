//! Forward-query table (C4): outstanding FORWARD_QUERYs we've sent on
//! behalf of indirect clients, with a fixed 30 s timeout.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

const MAX_FORWARDS: usize = 10;
const FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ForwardQuery {
    /// The display we will proxy WILLING to.
    pub origin: SocketAddr,
    /// The peer manager that asked us to forward.
    pub from: SocketAddr,
    pub acctime: Instant,
}

#[derive(Default)]
pub struct ForwardTable {
    entries: Vec<ForwardQuery>,
}

impl ForwardTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Inserts a new entry, evicting the oldest by `acctime` until the
    /// table is below [`MAX_FORWARDS`].
    pub fn alloc(&mut self, from: SocketAddr, origin: SocketAddr) {
        while self.entries.len() >= MAX_FORWARDS {
            if let Some((idx, _)) = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.acctime)
            {
                self.entries.remove(idx);
            } else {
                break;
            }
        }

        self.entries.push(ForwardQuery {
            origin,
            from,
            acctime: Instant::now(),
        });
    }

    /// Scans for `origin`, reaping expired entries along the way.
    pub fn lookup(&mut self, origin: SocketAddr) -> Option<ForwardQuery> {
        self.entries.retain(|e| e.acctime.elapsed() <= FORWARD_TIMEOUT);
        self.entries.iter().find(|e| e.origin == origin).cloned()
    }

    pub fn dispose(&mut self, origin: SocketAddr) {
        self.entries.retain(|e| e.origin != origin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn alloc_then_lookup() {
        let mut table = ForwardTable::default();
        table.alloc(addr("10.0.0.1:177"), addr("10.0.0.2:5000"));

        let entry = table.lookup(addr("10.0.0.2:5000")).unwrap();
        assert_eq!(entry.from, addr("10.0.0.1:177"));
    }

    #[test]
    fn dispose_removes_entry() {
        let mut table = ForwardTable::default();
        table.alloc(addr("10.0.0.1:177"), addr("10.0.0.2:5000"));
        table.dispose(addr("10.0.0.2:5000"));

        assert!(table.lookup(addr("10.0.0.2:5000")).is_none());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut table = ForwardTable::default();
        for i in 0..MAX_FORWARDS {
            table.alloc(addr("10.0.0.1:177"), format!("10.0.1.{i}:5000").parse().unwrap());
        }
        assert_eq!(table.len(), MAX_FORWARDS);

        table.alloc(addr("10.0.0.1:177"), addr("10.0.2.1:5000"));
        assert_eq!(table.len(), MAX_FORWARDS);
        assert!(table.lookup(addr("10.0.1.0:5000")).is_none());
    }
}
