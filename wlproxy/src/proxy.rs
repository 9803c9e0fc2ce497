use crate::{
    error::{Error, Result},
    listener::Trampoline,
    protocol::{Interface, Version, WaylandId, WireValue, WlOpcode},
    runtime::{Handle, Runtime},
};
use log::{debug, warn};
use std::{cell::RefCell, fmt, rc::Rc};

/// Identity of a live proxy, stored by the runtime as the object's user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyTag(pub(crate) usize);

/// The part of a proxy that event dispatch reaches through its back-reference.
pub struct ProxyState<I: Interface> {
    object_id: WaylandId,
    version: Version,
    handlers: RefCell<I::Handlers>,
}

impl<I: Interface> ProxyState<I> {
    #[inline(always)]
    pub fn id(&self) -> WaylandId {
        self.object_id
    }

    #[inline(always)]
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn handlers(&self) -> &RefCell<I::Handlers> {
        &self.handlers
    }

    /// Address of the state, which stays put for as long as the proxy lives.
    pub fn tag(&self) -> ProxyTag {
        ProxyTag(self as *const Self as usize)
    }
}

/// Sole owner of one protocol object of interface `I`.
///
/// Building a proxy tags the object with the proxy's identity and registers
/// the interface listener, so events start reaching the handlers installed
/// through the generated `on_<event>` methods. Dropping it (or calling
/// [`Proxy::destroy`]) sends the interface destructor when the object's
/// version defines one and releases the handle in every case.
pub struct Proxy<I: Interface> {
    handle: Option<Handle>,
    state: Rc<ProxyState<I>>,
    runtime: Rc<dyn Runtime>,
}

impl<I: Interface> Proxy<I> {
    /// Takes ownership of `handle`.
    ///
    /// An object that is already tagged by another proxy is refused with
    /// [`Error::HandlerAlreadyInPlace`]. On any error the handle is dropped,
    /// the object's tag is restored and no proxy ever exists for the object.
    pub fn new(runtime: Rc<dyn Runtime>, handle: Handle) -> Result<Self> {
        let version = runtime.version(&handle)?;
        let previous = runtime.user_data(&handle);
        if previous.is_some() {
            return Err(Error::HandlerAlreadyInPlace(handle.id()));
        }

        let state = Rc::new(ProxyState {
            object_id: handle.id(),
            version,
            handlers: RefCell::default(),
        });

        runtime.set_user_data(&handle, Some(state.tag()))?;
        if let Err(err) = runtime.add_listener(&handle, Rc::new(Trampoline::new(&state))) {
            runtime.set_user_data(&handle, previous)?;
            return Err(err);
        }

        debug!("{} @ {} v{version} bound", handle.id(), I::NAME);
        Ok(Self {
            handle: Some(handle),
            state,
            runtime,
        })
    }

    #[inline(always)]
    pub fn id(&self) -> WaylandId {
        self.state.id()
    }

    #[inline(always)]
    pub fn version(&self) -> Version {
        self.state.version()
    }

    pub fn tag(&self) -> ProxyTag {
        self.state.tag()
    }

    /// Borrows the underlying handle for use in other protocol calls.
    pub fn handle(&self) -> &Handle {
        self.handle
            .as_ref()
            .expect("proxy handle is only taken while tearing down")
    }

    pub fn runtime(&self) -> &Rc<dyn Runtime> {
        &self.runtime
    }

    pub(crate) fn state(&self) -> &Rc<ProxyState<I>> {
        &self.state
    }

    pub fn send_request(
        &self,
        request: &'static str,
        opcode: WlOpcode,
        values: &[WireValue],
    ) -> Result<usize> {
        debug!(
            "{} @ {} -> {request}({})",
            self.id(),
            I::NAME,
            values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
        );
        self.runtime.send_request(self.handle(), opcode, values)
    }

    /// Tears the object down now, reporting failures instead of logging them.
    pub fn destroy(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        match I::destructor_for(self.version()) {
            Some(destructor) => {
                debug!("{} @ {} -> {}()", handle.id(), I::NAME, destructor.request);
                self.runtime.destroy(handle, destructor.opcode)
            }
            None => {
                debug!("{} @ {} v{} released", handle.id(), I::NAME, self.version());
                self.runtime.forget(handle);
                Ok(())
            }
        }
    }
}

impl<I: Interface> Drop for Proxy<I> {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            warn!("Failed to destroy {} @ {}: {err}", self.id(), I::NAME);
        }
    }
}

impl<I: Interface> AsRef<Handle> for Proxy<I> {
    fn as_ref(&self) -> &Handle {
        self.handle()
    }
}

impl<I: Interface> fmt::Debug for Proxy<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("interface", &I::NAME)
            .field("object_id", &self.id())
            .field("version", &self.version())
            .finish()
    }
}
