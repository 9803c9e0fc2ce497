//! Handle-based primitives a [`Proxy`](crate::Proxy) drives.
//!
//! [`ObjectTable`] is the in-process implementation used by
//! [`Connection`](crate::client::Connection); other transports only have to
//! provide the [`Runtime`] trait.

pub(crate) mod objects;

pub use objects::ObjectTable;

use crate::{
    listener::Dispatch,
    protocol::{Version, WaylandId, WireValue, WlOpcode},
    proxy::ProxyTag,
    Result,
};
use std::rc::Rc;

/// Owned reference to a protocol object.
///
/// Neither `Clone` nor `Copy`: whoever holds the handle is the only party
/// allowed to release it, and releasing consumes it. Handles only come from
/// [`ObjectTable`] and [`Connection`](crate::client::Connection):
///
/// ```compile_fail
/// let handle = wlproxy::Handle::new(2);
/// ```
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Handle(WaylandId);

impl Handle {
    /// Mints a handle for an object just allocated by [`ObjectTable`], which
    /// hands out at most one `Handle` per live object id.
    pub(crate) fn new(object_id: WaylandId) -> Self {
        Self(object_id)
    }

    #[inline(always)]
    pub fn id(&self) -> WaylandId {
        self.0
    }
}

pub trait Runtime {
    /// Version negotiated for the object when it was created.
    fn version(&self, handle: &Handle) -> Result<Version>;

    /// `None` clears the tag.
    fn set_user_data(&self, handle: &Handle, tag: Option<ProxyTag>) -> Result<()>;
    fn user_data(&self, handle: &Handle) -> Option<ProxyTag>;

    /// Attaches the object's event listener. An object takes one listener for
    /// its whole lifetime.
    fn add_listener(&self, handle: &Handle, dispatcher: Rc<dyn Dispatch>) -> Result<()>;

    fn send_request(&self, handle: &Handle, opcode: WlOpcode, values: &[WireValue])
        -> Result<usize>;

    /// Sends the destructor request `opcode` and releases the handle.
    fn destroy(&self, handle: Handle, opcode: WlOpcode) -> Result<()>;

    /// Releases the handle without telling the server.
    fn forget(&self, handle: Handle);
}
