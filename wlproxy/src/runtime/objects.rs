use super::{Handle, Runtime};
use crate::{
    error::{error_context, fallback_error, Error, Result},
    listener::Dispatch,
    protocol::*,
    proxy::ProxyTag,
};
use log::{debug, trace};
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

/// Last id a client may allocate, ids above it belong to the server.
const MAX_CLIENT_ID: WaylandId = 0xFEFF_FFFF;

struct ObjectEntry {
    interface: &'static str,
    version: Version,
    user_data: Option<ProxyTag>,
    dispatcher: Option<Rc<dyn Dispatch>>,
}

/// Client side bookkeeping of every live object on a connection.
pub struct ObjectTable {
    stream: Rc<dyn WaylandStream>,
    objects: RefCell<HashMap<WaylandId, ObjectEntry>>,
    last_id: Cell<WaylandId>,
    // ids the server acknowledged as deleted, reused before fresh ones
    free_ids: RefCell<Vec<WaylandId>>,
}

impl ObjectTable {
    pub fn new(stream: Rc<dyn WaylandStream>) -> Self {
        Self {
            stream,
            objects: RefCell::new(HashMap::new()),
            last_id: Cell::new(DISPLAY_ID),
            free_ids: RefCell::default(),
        }
    }

    /// Allocates an id for a new object of interface `I`. The id still has to
    /// be announced to the server through the request that creates it.
    pub fn new_object<I: Interface>(&self, version: Version) -> Handle {
        let recycled = self.free_ids.borrow_mut().pop();
        let object_id = match recycled {
            Some(object_id) => object_id,
            None => {
                let object_id = self.last_id.get() + 1;
                assert!(object_id <= MAX_CLIENT_ID, "Ran out of client object ids");
                self.last_id.set(object_id);
                object_id
            }
        };

        let previous = self.objects.borrow_mut().insert(
            object_id,
            ObjectEntry {
                interface: I::NAME,
                version,
                user_data: None,
                dispatcher: None,
            },
        );
        assert!(previous.is_none(), "Object id {object_id} allocated twice");

        trace!("Allocated object {object_id} @ {} v{version}", I::NAME);
        Handle::new(object_id)
    }

    /// Allocates an object created through a request on `parent`, which
    /// inherits the parent's version.
    pub fn new_child<I: Interface>(&self, parent: &Handle) -> Result<Handle> {
        let version = self.version(parent)?;
        Ok(self.new_object::<I>(version))
    }

    /// Makes `object_id` available again once the server confirmed its
    /// deletion. Ids still owned here or never handed out are ignored.
    pub fn release_id(&self, object_id: WaylandId) -> bool {
        if object_id <= DISPLAY_ID || object_id > self.last_id.get() || self.contains(object_id) {
            return false;
        }

        let mut free_ids = self.free_ids.borrow_mut();
        if free_ids.contains(&object_id) {
            return false;
        }
        free_ids.push(object_id);
        true
    }

    pub fn contains(&self, object_id: WaylandId) -> bool {
        self.objects.borrow().contains_key(&object_id)
    }

    pub fn interface_of(&self, object_id: WaylandId) -> Option<&'static str> {
        self.objects.borrow().get(&object_id).map(|e| e.interface)
    }

    pub fn len(&self) -> usize {
        self.objects.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hands an event to the listener of the object it targets.
    pub fn dispatch(&self, msg: RawMessage) -> Result<()> {
        let object_id = msg.object_id;
        let event_id = msg.event_id;

        // The borrow ends before the listener runs: handlers are free to
        // create or destroy objects.
        let (dispatcher, user_data, interface) = {
            let objects = self.objects.borrow();
            let entry = objects.get(&object_id).ok_or_else(|| {
                fallback_error!("Received message to an non-existant object: {object_id}")
            })?;
            (entry.dispatcher.clone(), entry.user_data, entry.interface)
        };

        let dispatcher = dispatcher.ok_or_else(|| {
            fallback_error!("No handler for object {object_id} @ {interface} (received event {event_id})")
        })?;

        error_context!(
            dispatcher.dispatch(object_id, user_data, event_id, &msg.payload),
            "Of object {object_id} @ {interface}"
        )
    }

    fn with_entry<T>(
        &self,
        handle: &Handle,
        f: impl FnOnce(&mut ObjectEntry) -> Result<T>,
    ) -> Result<T> {
        let mut objects = self.objects.borrow_mut();
        let entry = objects
            .get_mut(&handle.id())
            .ok_or(Error::NoSuchObject(handle.id()))?;
        f(entry)
    }

    fn remove(&self, handle: Handle) -> Option<ObjectEntry> {
        self.objects.borrow_mut().remove(&handle.id())
    }
}

impl Runtime for ObjectTable {
    fn version(&self, handle: &Handle) -> Result<Version> {
        self.with_entry(handle, |entry| Ok(entry.version))
    }

    fn set_user_data(&self, handle: &Handle, tag: Option<ProxyTag>) -> Result<()> {
        self.with_entry(handle, |entry| {
            entry.user_data = tag;
            Ok(())
        })
    }

    fn user_data(&self, handle: &Handle) -> Option<ProxyTag> {
        self.objects.borrow().get(&handle.id())?.user_data
    }

    fn add_listener(&self, handle: &Handle, dispatcher: Rc<dyn Dispatch>) -> Result<()> {
        self.with_entry(handle, |entry| match entry.dispatcher {
            Some(_) => Err(Error::HandlerAlreadyInPlace(handle.id())),
            None => {
                entry.dispatcher = Some(dispatcher);
                Ok(())
            }
        })
    }

    fn send_request(
        &self,
        handle: &Handle,
        opcode: WlOpcode,
        values: &[WireValue],
    ) -> Result<usize> {
        if !self.contains(handle.id()) {
            return Err(Error::NoSuchObject(handle.id()));
        }

        self.stream.send(WireMessage {
            object_id: handle.id(),
            request_id: opcode,
            values,
        })
    }

    fn destroy(&self, handle: Handle, opcode: WlOpcode) -> Result<()> {
        let object_id = handle.id();
        let result = self.send_request(&handle, opcode, &[]).map(|_| ());
        if let Some(entry) = self.remove(handle) {
            debug!("Released object {object_id} @ {} after destructor", entry.interface);
        }
        result
    }

    fn forget(&self, handle: Handle) {
        let object_id = handle.id();
        if let Some(entry) = self.remove(handle) {
            debug!("Released object {object_id} @ {} without destructor", entry.interface);
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::protocol::base::*;

    /// Keeps every request instead of writing it anywhere.
    #[derive(Default)]
    pub(crate) struct RecordingStream {
        pub requests: RefCell<Vec<(WaylandId, WlOpcode, Vec<WireValue>)>>,
    }

    impl RecordingStream {
        pub fn count(&self, object_id: WaylandId, opcode: WlOpcode) -> usize {
            self.requests
                .borrow()
                .iter()
                .filter(|(id, op, _)| *id == object_id && *op == opcode)
                .count()
        }
    }

    impl WaylandStream for RecordingStream {
        fn send(&self, msg: WireMessage) -> Result<usize> {
            self.requests
                .borrow_mut()
                .push((msg.object_id, msg.request_id, msg.values.to_vec()));
            Ok(8)
        }
    }

    pub(crate) fn table() -> (Rc<ObjectTable>, Rc<RecordingStream>) {
        let stream = Rc::new(RecordingStream::default());
        (Rc::new(ObjectTable::new(stream.clone())), stream)
    }

    #[test]
    fn ids_start_after_the_display() {
        let (table, _) = table();
        let first = table.new_object::<WlSurface>(4);
        let second = table.new_object::<WlBuffer>(1);

        assert_eq!(first.id(), DISPLAY_ID + 1);
        assert_eq!(second.id(), DISPLAY_ID + 2);
        assert_eq!(table.interface_of(first.id()), Some("wl_surface"));
        assert_eq!(table.version(&second).unwrap(), 1);
    }

    #[test]
    fn children_inherit_the_parent_version() {
        let (table, _) = table();
        let surface = table.new_object::<WlSurface>(5);
        let callback = table.new_child::<WlCallback>(&surface).unwrap();
        assert_eq!(table.version(&callback).unwrap(), 5);
    }

    #[test]
    fn forget_sends_nothing_and_destroy_sends_once() {
        let (table, stream) = table();
        let kept = table.new_object::<WlBuffer>(0);
        let destroyed = table.new_object::<WlBuffer>(1);
        let destroyed_id = destroyed.id();

        table.forget(kept);
        table.destroy(destroyed, 0).unwrap();

        assert!(table.is_empty());
        assert_eq!(stream.requests.borrow().len(), 1);
        assert_eq!(stream.count(destroyed_id, 0), 1);
    }

    #[test]
    fn deleted_ids_are_reused() {
        let (table, _) = table();
        let first = table.new_object::<WlCallback>(1);
        let first_id = first.id();
        let second = table.new_object::<WlBuffer>(1);

        // still owned
        assert!(!table.release_id(first_id));
        table.forget(first);
        assert!(table.release_id(first_id));
        assert!(!table.release_id(first_id));
        assert!(!table.release_id(DISPLAY_ID));
        assert!(!table.release_id(second.id() + 1));

        let reused = table.new_object::<WlSurface>(4);
        assert_eq!(reused.id(), first_id);
        assert_eq!(table.interface_of(first_id), Some("wl_surface"));
        assert_eq!(table.new_object::<WlRegion>(1).id(), second.id() + 1);
    }

    #[test]
    fn unknown_objects_are_rejected() {
        let (table, _) = table();
        let stale = Handle::new(42);

        assert!(matches!(table.version(&stale), Err(Error::NoSuchObject(42))));
        assert!(matches!(
            table.send_request(&stale, 0, &[]),
            Err(Error::NoSuchObject(42))
        ));
        assert!(table
            .dispatch(RawMessage { object_id: 42, event_id: 0, payload: Box::default() })
            .is_err());
    }

    #[test]
    fn event_without_listener_is_an_error() {
        let (table, _) = table();
        let buffer = table.new_object::<WlBuffer>(1);
        let result = table.dispatch(RawMessage {
            object_id: buffer.id(),
            event_id: 0,
            payload: Box::default(),
        });
        assert!(result.is_err());
    }
}
