//! Indirect-display table (C3): displays that sent an INDIRECT_QUERY and
//! the host an out-of-band chooser eventually picked for them.

use std::net::SocketAddr;
use std::time::Instant;

use crate::address::{self, LocalAddresses};

#[derive(Debug, Clone)]
pub struct IndirectRecord {
    pub id: u32,
    pub origin: SocketAddr,
    pub chosen: Option<SocketAddr>,
    pub acctime: Option<Instant>,
}

impl IndirectRecord {
    pub fn is_resolved(&self) -> bool {
        self.acctime.is_some()
    }
}

pub struct IndirectTable {
    records: Vec<IndirectRecord>,
    next_id: u32,
    max_indirect: usize,
    max_wait_indirect: std::time::Duration,
}

impl IndirectTable {
    pub fn new(max_indirect: usize, max_wait_indirect: std::time::Duration) -> Self {
        Self {
            records: Vec::new(),
            next_id: 0,
            max_indirect,
            max_wait_indirect,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    fn fresh_id(&mut self) -> u32 {
        loop {
            self.next_id = self.next_id.wrapping_add(1);
            if self.next_id != 0 && !self.records.iter().any(|r| r.id == self.next_id) {
                return self.next_id;
            }
        }
    }

    /// Creates a new unresolved record for `origin`.
    pub fn alloc(&mut self, origin: SocketAddr) -> u32 {
        let id = self.fresh_id();
        self.records.insert(
            0,
            IndirectRecord {
                id,
                origin,
                chosen: None,
                acctime: None,
            },
        );
        id
    }

    /// Linear scan for `origin`, opportunistically reaping resolved
    /// records that have aged past `max_wait_indirect`.
    pub fn lookup_by_origin(&mut self, origin: SocketAddr) -> Option<IndirectRecord> {
        let mut i = 0;
        while i < self.records.len() {
            let expired = matches!(self.records[i].acctime, Some(at) if at.elapsed() > self.max_wait_indirect);

            if expired {
                self.records.remove(i);
                continue;
            }

            if self.records[i].origin == origin {
                return Some(self.records[i].clone());
            }

            i += 1;
        }
        None
    }

    /// Finds a record whose chosen host matches `chosen_ip`, and whose
    /// origin either matches `origin_ip` directly, or is loopback while
    /// `origin_ip` is one of this host's own addresses (the
    /// forwarded-via-loopback case). Takes bare IPs, not `SocketAddr`s,
    /// since the MANAGED_FORWARD `origin` field it's built for is
    /// reconstructed from a bare `ARRAY8` and carries no port.
    pub fn lookup_by_chosen(
        &self,
        chosen_ip: std::net::IpAddr,
        origin_ip: std::net::IpAddr,
        locals: &mut LocalAddresses,
    ) -> Option<IndirectRecord> {
        self.records
            .iter()
            .find(|r| {
                r.chosen.map(|c| c.ip()) == Some(chosen_ip)
                    && (r.origin.ip() == origin_ip
                        || (address::is_loopback(r.origin.ip()) && locals.is_local(origin_ip)))
            })
            .cloned()
    }

    /// Resolves and records the chooser's decision for `id`. Evicts the
    /// oldest resolved record first if at capacity.
    pub fn deliver_chosen(&mut self, id: u32, host: SocketAddr) -> bool {
        if !self.records.iter().any(|r| r.id == id) {
            return false;
        }

        if self.records.len() >= self.max_indirect {
            if let Some(oldest) = self
                .records
                .iter()
                .filter(|r| r.is_resolved())
                .min_by_key(|r| r.acctime)
                .map(|r| r.id)
            {
                self.dispose(oldest);
            }
        }

        if let Some(record) = self.records.iter_mut().find(|r| r.id == id) {
            record.chosen = Some(host);
            record.acctime = Some(Instant::now());
            true
        } else {
            false
        }
    }

    pub fn dispose(&mut self, id: u32) -> Option<IndirectRecord> {
        let idx = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(idx))
    }

    /// Disposes the record with `id` only if it has no chosen host yet.
    pub fn dispose_empty(&mut self, id: u32) {
        if let Some(idx) = self.records.iter().position(|r| r.id == id && r.chosen.is_none()) {
            self.records.remove(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn alloc_ids_are_never_zero_and_unique() {
        let mut table = IndirectTable::new(10, Duration::from_secs(60));
        let a = table.alloc(addr("10.0.0.1:1"));
        let b = table.alloc(addr("10.0.0.2:1"));
        assert_ne!(a, 0);
        assert_ne!(b, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn deliver_chosen_then_lookup_by_origin() {
        let mut table = IndirectTable::new(10, Duration::from_secs(60));
        let origin = addr("10.0.0.1:1");
        let id = table.alloc(origin);

        assert!(table.deliver_chosen(id, addr("10.0.0.9:177")));

        let record = table.lookup_by_origin(origin).unwrap();
        assert_eq!(record.chosen, Some(addr("10.0.0.9:177")));
    }

    #[test]
    fn dispose_empty_keeps_resolved_records() {
        let mut table = IndirectTable::new(10, Duration::from_secs(60));
        let id = table.alloc(addr("10.0.0.1:1"));
        table.deliver_chosen(id, addr("10.0.0.9:177"));

        table.dispose_empty(id);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn dispose_empty_removes_unresolved() {
        let mut table = IndirectTable::new(10, Duration::from_secs(60));
        let id = table.alloc(addr("10.0.0.1:1"));

        table.dispose_empty(id);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn lookup_by_chosen_matches_exact_origin() {
        let mut table = IndirectTable::new(10, Duration::from_secs(60));
        let mut locals = LocalAddresses::default();
        let origin = addr("10.0.0.1:1");
        let id = table.alloc(origin);
        table.deliver_chosen(id, addr("10.0.0.9:177"));

        let record = table
            .lookup_by_chosen("10.0.0.9".parse().unwrap(), origin.ip(), &mut locals)
            .unwrap();
        assert_eq!(record.id, id);
    }

    #[test]
    fn lookup_by_chosen_matches_loopback_origin_against_any_local_address() {
        let mut table = IndirectTable::new(10, Duration::from_secs(60));
        let mut locals = LocalAddresses::with_addrs(vec!["192.168.1.5".parse().unwrap()]);
        // The client sent its original INDIRECT_QUERY over loopback, so the
        // record's origin is 127.0.0.1, but the MANAGED_FORWARD that comes
        // back from the chosen host carries a real local interface address.
        let loopback_origin = addr("127.0.0.1:1");
        let id = table.alloc(loopback_origin);
        table.deliver_chosen(id, addr("10.0.0.9:177"));

        let record = table
            .lookup_by_chosen("10.0.0.9".parse().unwrap(), "192.168.1.5".parse().unwrap(), &mut locals)
            .unwrap();
        assert_eq!(record.id, id);
    }

    #[test]
    fn lookup_by_chosen_rejects_non_loopback_origin_mismatch() {
        let mut table = IndirectTable::new(10, Duration::from_secs(60));
        let mut locals = LocalAddresses::with_addrs(vec!["192.168.1.5".parse().unwrap()]);
        let id = table.alloc(addr("10.0.0.1:1"));
        table.deliver_chosen(id, addr("10.0.0.9:177"));

        assert!(
            table
                .lookup_by_chosen("10.0.0.9".parse().unwrap(), "192.168.1.5".parse().unwrap(), &mut locals)
                .is_none()
        );
    }
}
