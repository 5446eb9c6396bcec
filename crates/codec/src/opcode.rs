use crate::Error;

/// XDMCP opcode registry.
///
/// [XDMCP]: https://www.x.org/releases/X11R7.7/doc/libXdmcp/xdmcp.html
///
/// Opcodes 2 through 15 are the standard protocol, carried at header
/// version 1. MANAGED_FORWARD and GOT_MANAGED_FORWARD are a two-opcode
/// vendor extension used by display managers to forward an indirect query
/// to a chooser-selected peer; both are carried at header version 1001.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Query,
    BroadcastQuery,
    IndirectQuery,
    ForwardQuery,
    Willing,
    Unwilling,
    Request,
    Accept,
    Decline,
    Manage,
    Refuse,
    Failed,
    KeepAlive,
    Alive,
    ManagedForward,
    GotManagedForward,
}

pub const QUERY: u16 = 2;
pub const BROADCAST_QUERY: u16 = 3;
pub const INDIRECT_QUERY: u16 = 4;
pub const FORWARD_QUERY: u16 = 5;
pub const WILLING: u16 = 6;
pub const UNWILLING: u16 = 7;
pub const REQUEST: u16 = 8;
pub const ACCEPT: u16 = 9;
pub const DECLINE: u16 = 10;
pub const MANAGE: u16 = 11;
pub const REFUSE: u16 = 12;
pub const FAILED: u16 = 13;
pub const KEEPALIVE: u16 = 14;
pub const ALIVE: u16 = 15;
pub const MANAGED_FORWARD: u16 = 1000;
pub const GOT_MANAGED_FORWARD: u16 = 1001;

impl Opcode {
    /// `true` for opcodes carried at the vendor header version (1001)
    /// rather than the standard version (1).
    pub fn is_vendor(&self) -> bool {
        matches!(self, Opcode::ManagedForward | Opcode::GotManagedForward)
    }
}

impl TryFrom<u16> for Opcode {
    type Error = Error;

    /// # Test
    ///
    /// ```
    /// use xdmcp_codec::opcode::*;
    /// use std::convert::TryFrom;
    ///
    /// assert_eq!(Opcode::try_from(QUERY).unwrap(), Opcode::Query);
    /// assert_eq!(Opcode::try_from(BROADCAST_QUERY).unwrap(), Opcode::BroadcastQuery);
    /// assert_eq!(Opcode::try_from(INDIRECT_QUERY).unwrap(), Opcode::IndirectQuery);
    /// assert_eq!(Opcode::try_from(FORWARD_QUERY).unwrap(), Opcode::ForwardQuery);
    /// assert_eq!(Opcode::try_from(WILLING).unwrap(), Opcode::Willing);
    /// assert_eq!(Opcode::try_from(UNWILLING).unwrap(), Opcode::Unwilling);
    /// assert_eq!(Opcode::try_from(REQUEST).unwrap(), Opcode::Request);
    /// assert_eq!(Opcode::try_from(ACCEPT).unwrap(), Opcode::Accept);
    /// assert_eq!(Opcode::try_from(DECLINE).unwrap(), Opcode::Decline);
    /// assert_eq!(Opcode::try_from(MANAGE).unwrap(), Opcode::Manage);
    /// assert_eq!(Opcode::try_from(REFUSE).unwrap(), Opcode::Refuse);
    /// assert_eq!(Opcode::try_from(FAILED).unwrap(), Opcode::Failed);
    /// assert_eq!(Opcode::try_from(KEEPALIVE).unwrap(), Opcode::KeepAlive);
    /// assert_eq!(Opcode::try_from(ALIVE).unwrap(), Opcode::Alive);
    /// assert_eq!(Opcode::try_from(MANAGED_FORWARD).unwrap(), Opcode::ManagedForward);
    /// assert_eq!(Opcode::try_from(GOT_MANAGED_FORWARD).unwrap(), Opcode::GotManagedForward);
    /// assert!(Opcode::try_from(0u16).is_err());
    /// ```
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            QUERY => Self::Query,
            BROADCAST_QUERY => Self::BroadcastQuery,
            INDIRECT_QUERY => Self::IndirectQuery,
            FORWARD_QUERY => Self::ForwardQuery,
            WILLING => Self::Willing,
            UNWILLING => Self::Unwilling,
            REQUEST => Self::Request,
            ACCEPT => Self::Accept,
            DECLINE => Self::Decline,
            MANAGE => Self::Manage,
            REFUSE => Self::Refuse,
            FAILED => Self::Failed,
            KEEPALIVE => Self::KeepAlive,
            ALIVE => Self::Alive,
            MANAGED_FORWARD => Self::ManagedForward,
            GOT_MANAGED_FORWARD => Self::GotManagedForward,
            _ => return Err(Error::UnknownOpcode(value)),
        })
    }
}

impl From<Opcode> for u16 {
    /// # Test
    ///
    /// ```
    /// use xdmcp_codec::opcode::*;
    ///
    /// assert_eq!(u16::from(Opcode::Query), QUERY);
    /// assert_eq!(u16::from(Opcode::ManagedForward), MANAGED_FORWARD);
    /// assert_eq!(u16::from(Opcode::GotManagedForward), GOT_MANAGED_FORWARD);
    /// ```
    fn from(value: Opcode) -> u16 {
        match value {
            Opcode::Query => QUERY,
            Opcode::BroadcastQuery => BROADCAST_QUERY,
            Opcode::IndirectQuery => INDIRECT_QUERY,
            Opcode::ForwardQuery => FORWARD_QUERY,
            Opcode::Willing => WILLING,
            Opcode::Unwilling => UNWILLING,
            Opcode::Request => REQUEST,
            Opcode::Accept => ACCEPT,
            Opcode::Decline => DECLINE,
            Opcode::Manage => MANAGE,
            Opcode::Refuse => REFUSE,
            Opcode::Failed => FAILED,
            Opcode::KeepAlive => KEEPALIVE,
            Opcode::Alive => ALIVE,
            Opcode::ManagedForward => MANAGED_FORWARD,
            Opcode::GotManagedForward => GOT_MANAGED_FORWARD,
        }
    }
}
