use crate::{error, listener::Listener};
use std::fmt;

pub mod base;
mod macros;

#[allow(unused_imports)]
pub use self::WireValue::*;

use macros::declare_interfaces;

pub type WaylandId = u32;
pub type WlOpcode = u16;
pub type Version = u32;

/// Id the server reserves for `wl_display`. Client allocated ids start after it.
pub const DISPLAY_ID: WaylandId = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireValue {
    Uint32(u32),
    Int32(i32),
    Str(String),
    Array(Vec<u8>),
    FileDesc(i32),
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uint32(v)   => write!(f, "{v}"),
            Int32(v)    => write!(f, "{v}"),
            Str(v)      => write!(f, "{v:?}"),
            Array(v)    => write!(f, "{v:?}"),
            FileDesc(v) => write!(f, "fd {v}"),
        }
    }
}

#[derive(Debug)]
pub struct WireMessage<'a> {
    pub object_id: WaylandId,
    pub request_id: WlOpcode,
    pub values: &'a [WireValue],
}

// Implementation of this trait are recommended to use interior mutability
// (https://doc.rust-lang.org/reference/interior-mutability.html)
pub trait WaylandStream {
    fn send(&self, msg: WireMessage) -> Result<usize, error::Error>;
}

#[derive(Debug, Clone)]
pub struct RawMessage {
    pub object_id: WaylandId,
    pub event_id: WlOpcode,
    pub payload: Box<[u8]>,
}

/// Request that tears the object down on the server, and the first object
/// version that defines it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destructor {
    pub request: &'static str,
    pub opcode: WlOpcode,
    pub since: Version,
}

impl Destructor {
    /// Below `since` the request does not exist for the object and the handle
    /// goes away together with the connection instead.
    #[inline]
    pub fn applies_to(&self, version: Version) -> bool {
        version >= self.since
    }
}

/// A protocol object type. Implemented by `declare_interfaces!`.
pub trait Interface: Sized + 'static {
    /// Per-instance event callbacks, one optional slot per event.
    type Handlers: Default + 'static;

    const NAME: &'static str;
    const DESTRUCTOR: Option<Destructor>;

    fn listener() -> &'static Listener<Self>;

    /// Request to send when a proxy of the given version is dropped, if any.
    fn destructor_for(version: Version) -> Option<Destructor> {
        Self::DESTRUCTOR.filter(|destructor| destructor.applies_to(version))
    }
}

#[cfg(test)]
mod test {
    use super::{base::*, *};

    #[test]
    fn destructor_threshold_is_inclusive() {
        let destructor = Destructor { request: "destroy", opcode: 0, since: 1 };
        assert!(!destructor.applies_to(0));
        assert!(destructor.applies_to(1));
        assert!(destructor.applies_to(7));
    }

    #[test]
    fn buffer_destructor_is_gated_on_version_one() {
        let opcode = |version| WlBuffer::destructor_for(version).map(|d| d.opcode);
        assert_eq!(opcode(0), None);
        assert_eq!(opcode(1), Some(0));
        assert_eq!(opcode(2), Some(0));
    }

    #[test]
    fn callback_never_sends_a_destructor() {
        assert_eq!(WlCallback::DESTRUCTOR, None);
        assert_eq!(WlCallback::destructor_for(5), None);
    }

    #[test]
    fn shm_pool_destructor_uses_its_own_opcode() {
        let destructor = WlShmPool::destructor_for(1).unwrap();
        assert_eq!((destructor.request, destructor.opcode), ("destroy", 1));
    }

    #[test]
    fn wire_value_display() {
        assert_eq!(Uint32(3).to_string(), "3");
        assert_eq!(Int32(-2).to_string(), "-2");
        assert_eq!(Str("xdg".into()).to_string(), "\"xdg\"");
    }
}
