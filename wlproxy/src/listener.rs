//! Event routing from a runtime back to the proxy owning an object.
//!
//! Each interface has exactly one [`Listener`], a `static` table with an entry
//! per event opcode. Per-object state never lives in the table: a
//! [`Trampoline`] pairs the table with a weak back-reference to one proxy and
//! is what gets registered with the runtime.

use crate::{
    error::{Error, Result},
    protocol::{Interface, WaylandId, WlOpcode},
    proxy::{ProxyState, ProxyTag},
    wire_format::parsing::{self, WireReader},
};
use std::rc::{Rc, Weak};

/// Decodes one event's arguments and calls the matching handler.
pub type EventFn<I> = fn(&ProxyState<I>, WireReader<'_>) -> parsing::Result<()>;

pub struct Listener<I: Interface> {
    pub(crate) interface: &'static str,
    pub(crate) events: &'static [EventFn<I>],
}

impl<I: Interface> Listener<I> {
    pub fn interface(&self) -> &'static str {
        self.interface
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

/// What a runtime calls when an event arrives for an object.
pub trait Dispatch {
    /// `object_id` is the object the event was addressed to and `user_data`
    /// the tag the runtime holds for it.
    fn dispatch(
        &self,
        object_id: WaylandId,
        user_data: Option<ProxyTag>,
        opcode: WlOpcode,
        payload: &[u8],
    ) -> Result<()>;
}

pub(crate) struct Trampoline<I: Interface> {
    listener: &'static Listener<I>,
    proxy: Weak<ProxyState<I>>,
}

impl<I: Interface> Trampoline<I> {
    pub(crate) fn new(proxy: &Rc<ProxyState<I>>) -> Self {
        Self {
            listener: I::listener(),
            proxy: Rc::downgrade(proxy),
        }
    }
}

impl<I: Interface> Dispatch for Trampoline<I> {
    fn dispatch(
        &self,
        object_id: WaylandId,
        user_data: Option<ProxyTag>,
        opcode: WlOpcode,
        payload: &[u8],
    ) -> Result<()> {
        let Some(proxy) = self.proxy.upgrade() else {
            panic!(
                "Event {opcode} for object {object_id} @ {} reached a proxy that was already dropped",
                I::NAME
            );
        };

        assert!(
            proxy.id() == object_id && user_data == Some(proxy.tag()),
            "Object identity mismatch: event for {object_id} @ {} tagged {user_data:?} \
             was routed to the proxy of object {} ({:?})",
            I::NAME,
            proxy.id(),
            proxy.tag(),
        );

        let event = self
            .listener
            .events
            .get(opcode as usize)
            .ok_or(Error::NoSuchEvent {
                interface: self.listener.interface,
                opcode,
            })?;

        event(&proxy, WireReader::new(payload))?;
        Ok(())
    }
}
