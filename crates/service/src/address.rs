//! Address comparison, classification, and resolution (C2).
//!
//! Local-address enumeration is cached: interfaces don't change mid-session
//! often enough to justify a syscall per datagram.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use tokio::net::lookup_host;

const LOCAL_ADDRESSES_TTL: Duration = Duration::from_secs(30);

/// Family-aware address equality. For XDMCP purposes two addresses are
/// equal when their IP bytes match; the port is not part of display
/// identity (a display can re-send from an ephemeral source port).
pub fn equal(a: IpAddr, b: IpAddr) -> bool {
    a == b
}

pub fn is_loopback(addr: IpAddr) -> bool {
    addr.is_loopback()
}

/// Caches the host's non-loopback interface addresses and the full set
/// (including loopback), refreshing at most once per [`LOCAL_ADDRESSES_TTL`].
pub struct LocalAddresses {
    all: Vec<IpAddr>,
    refreshed_at: Option<Instant>,
}

impl Default for LocalAddresses {
    fn default() -> Self {
        Self {
            all: Vec::new(),
            refreshed_at: None,
        }
    }
}

impl LocalAddresses {
    /// Seeds the cache directly, bypassing interface enumeration. For tests
    /// that need `is_local`/`non_loopback` to answer against a fixed set of
    /// addresses rather than whatever interfaces the test host happens to
    /// have.
    #[cfg(test)]
    pub fn with_addrs(addrs: Vec<IpAddr>) -> Self {
        Self {
            all: addrs,
            refreshed_at: Some(Instant::now()),
        }
    }

    fn refresh_if_stale(&mut self) {
        let stale = match self.refreshed_at {
            Some(at) => at.elapsed() > LOCAL_ADDRESSES_TTL,
            None => true,
        };

        if !stale {
            return;
        }

        self.all = if_addrs::get_if_addrs()
            .map(|ifaces| ifaces.into_iter().map(|i| i.ip()).collect())
            .unwrap_or_default();

        self.refreshed_at = Some(Instant::now());
    }

    /// `true` if `addr` names one of this host's own interfaces.
    pub fn is_local(&mut self, addr: IpAddr) -> bool {
        self.refresh_if_stale();
        addr.is_loopback() || self.all.iter().any(|local| *local == addr)
    }

    /// Every configured non-loopback address, used to fan a FORWARD_QUERY
    /// out across all of this host's interfaces (scenario: indirect query
    /// from loopback with a non-local chosen host).
    pub fn non_loopback(&mut self) -> Vec<IpAddr> {
        self.refresh_if_stale();
        self.all.iter().copied().filter(|a| !a.is_loopback()).collect()
    }
}

/// Resolves `node` and returns the first address, bound to the XDMCP port
/// unless `node` already carries one. Bounded to avoid stalling the event
/// loop on a hung resolver.
pub async fn resolve_first(node: &str, default_port: u16) -> Option<SocketAddr> {
    // A bare IPv6 literal ("2001:db8::1") also `contains(':')` but carries no
    // port, so a bare colon check misclassifies it as already having one;
    // parse as an IP first and handle bracketing explicitly.
    let target = if node.parse::<SocketAddr>().is_ok() {
        node.to_string()
    } else if let Ok(ip) = node.parse::<std::net::IpAddr>() {
        match ip {
            std::net::IpAddr::V6(_) => format!("[{node}]:{default_port}"),
            std::net::IpAddr::V4(_) => format!("{node}:{default_port}"),
        }
    } else if node.contains(':') {
        node.to_string()
    } else {
        format!("{node}:{default_port}")
    };

    let timeout = Duration::from_secs(2);
    let mut addrs = tokio::time::timeout(timeout, lookup_host(target)).await.ok()??;
    addrs.next()
}

/// Renders an address for log lines as `(host, service)`, matching the
/// collaborator contract in spec section 6.
pub fn render(addr: SocketAddr) -> (String, String) {
    (addr.ip().to_string(), addr.port().to_string())
}
