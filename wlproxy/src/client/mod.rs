use std::{
    env,
    ffi::OsString,
    io::{self, Read},
    os::unix::net::UnixStream,
    path::PathBuf,
    rc::Rc,
};

use crate::{
    error::{error_context, fallback_error, Error, Result},
    protocol::*,
    runtime::{Handle, ObjectTable, Runtime},
    wire_format::{
        parsing::WireReader,
        ClientStream, WireMsgHeader,
    },
};

use log::{debug, error, info, trace};

const DEFAULT_DISPLAY: &str = "wayland-0";
const BUFFER_SIZE: usize = 4 * 1024;

// wl_display events
const DISPLAY_ERROR: WlOpcode = 0;
const DISPLAY_DELETE_ID: WlOpcode = 1;

/// A client connection: the socket, the read buffer and the objects living on it.
pub struct Connection {
    objects: Rc<ObjectTable>,
    socket: UnixStream,
    buffer: ByteBuffer,
    // header of the message the stream lost its framing on
    desynced: Option<(WaylandId, usize)>,
}

impl Connection {
    pub fn connect() -> Result<Self> {
        let path = error_context!(socket_path(), "Failed to find the compositor socket")?;
        Self::connect_to(&path.to_string_lossy())
    }

    pub fn connect_to(socket_path: &str) -> Result<Self> {
        debug!("Connecting to socket_path = {socket_path}");
        let socket = error_context!(
            UnixStream::connect(socket_path),
            "Failed to establish connection."
        )?;

        Self::from_stream(socket)
    }

    pub fn from_stream(socket: UnixStream) -> Result<Self> {
        let writer = error_context!(socket.try_clone(), "Unable to clone UnixStream")?;

        Ok(Self {
            objects: Rc::new(ObjectTable::new(Rc::new(ClientStream::new(writer)))),
            buffer: ByteBuffer::new(BUFFER_SIZE),
            socket,
            desynced: None,
        })
    }

    pub fn objects(&self) -> &Rc<ObjectTable> {
        &self.objects
    }

    /// The runtime proxies on this connection are built against.
    pub fn runtime(&self) -> Rc<dyn Runtime> {
        self.objects.clone()
    }

    pub fn new_object<I: Interface>(&self, version: Version) -> Handle {
        self.objects.new_object::<I>(version)
    }

    pub fn new_child<I: Interface>(&self, parent: &Handle) -> Result<Handle> {
        self.objects.new_child::<I>(parent)
    }

    /// Blocks for the next event and runs the listener of its object.
    ///
    /// Once a message could not be framed every later call fails with the
    /// same [`Error::InvalidMessage`].
    pub fn dispatch_next(&mut self) -> Result<()> {
        let msg = self.next_msg()?;

        if msg.object_id == DISPLAY_ID {
            self.handle_display_event(msg)
        } else {
            self.objects.dispatch(msg)
        }
    }

    /// Dispatches until the server goes away, reports a protocol error or
    /// sends a message that cannot be framed. Anything else going wrong with
    /// a single event is logged and skipped.
    pub fn event_loop(mut self) -> Result<()> {
        loop {
            let Err(err) = self.dispatch_next() else {
                continue;
            };

            match err.root() {
                Error::ConnectionClosed => {
                    info!("Compositor closed the connection");
                    return Ok(());
                }
                Error::Protocol { .. } | Error::InvalidMessage { .. } | Error::Io(_) => {
                    return Err(err)
                }
                _ => error!("Error handling message: {err}"),
            }
        }
    }

    fn handle_display_event(&self, msg: RawMessage) -> Result<()> {
        let mut reader = WireReader::new(&msg.payload);

        match msg.event_id {
            DISPLAY_ERROR => {
                let object_id = reader.read_u32()?;
                let code = reader.read_u32()?;
                let message = reader.read_str()?;
                reader.finish()?;

                let interface = self.objects.interface_of(object_id).unwrap_or("unknown");
                error!("Wayland error {code} for object {object_id} @ {interface}: {message:?}");
                Err(Error::Protocol { object_id, code, message })
            }
            DISPLAY_DELETE_ID => {
                let id = reader.read_u32()?;
                reader.finish()?;

                if self.objects.release_id(id) {
                    trace!("Server acknowledged deletion of object {id}");
                } else if self.objects.contains(id) {
                    // still owned locally, the proxy releases it when dropped
                    debug!("Server deleted object {id} that still has an owner");
                } else {
                    debug!("Ignoring deletion of unknown object {id}");
                }
                Ok(())
            }
            opcode => Err(Error::NoSuchEvent { interface: "wl_display", opcode }),
        }
    }

    fn next_msg(&mut self) -> Result<RawMessage> {
        if let Some((object_id, length)) = self.desynced {
            return Err(Error::InvalidMessage { object_id, length });
        }

        let header = WireMsgHeader::build(error_context!(
            self.read_bytes(WireMsgHeader::WIRE_SIZE),
            "Failed to read wire message header"
        )?);

        trace!(
            "Received a msg from {} with {} size",
            header.object_id,
            header.length
        );

        let length = header.length as usize;
        if length < WireMsgHeader::WIRE_SIZE || length % 4 != 0 || length > BUFFER_SIZE {
            error!("Cannot frame a {length} bytes message for object {}", header.object_id);
            self.desynced = Some((header.object_id, length));
            return Err(Error::InvalidMessage { object_id: header.object_id, length });
        }

        let payload = error_context!(
            self.read_bytes(length - WireMsgHeader::WIRE_SIZE),
            "Failed to read message payload"
        )?;

        Ok(RawMessage {
            object_id: header.object_id,
            event_id: header.method_id,
            payload: payload.into(),
        })
    }

    fn read_bytes(&mut self, size: usize) -> Result<&[u8]> {
        self.buffer.read_bytes(size, &mut self.socket)
    }
}

/// Where `connect` looks for the compositor, following `WAYLAND_DISPLAY` and
/// `XDG_RUNTIME_DIR`.
pub fn socket_path() -> Result<PathBuf> {
    resolve_socket_path(env::var_os("XDG_RUNTIME_DIR"), env::var_os("WAYLAND_DISPLAY"))
}

/// An absolute `display` is used as is. A relative one (`wayland-0` when
/// unset) lives in `runtime_dir`.
pub fn resolve_socket_path(
    runtime_dir: Option<OsString>,
    display: Option<OsString>,
) -> Result<PathBuf> {
    let display = PathBuf::from(display.unwrap_or_else(|| DEFAULT_DISPLAY.into()));
    if display.is_absolute() {
        return Ok(display);
    }

    let runtime_dir = runtime_dir
        .ok_or_else(|| fallback_error!("XDG_RUNTIME_DIR is not set"))?;
    Ok(PathBuf::from(runtime_dir).join(display))
}

pub struct ByteBuffer {
    data: Box<[u8]>,
    head: usize,
    tail: usize,
}

impl ByteBuffer {
    pub fn new(size: usize) -> Self {
        ByteBuffer {
            head: 0,
            tail: 0,
            data: vec![0; size].into_boxed_slice(),
        }
    }

    fn cached_bytes(&self) -> usize {
        self.tail - self.head
    }

    fn tail_space(&self) -> usize {
        self.data.len() - self.tail
    }

    /// Returns exactly `bytes` bytes, reading from `stream` as many times as
    /// needed. Fails with `ConnectionClosed` when the stream ends first.
    pub fn read_bytes(&mut self, bytes: usize, stream: &mut impl Read) -> Result<&[u8]> {
        if bytes > self.data.len() {
            return Err(fallback_error!(
                "Message of {bytes} bytes does not fit the {} bytes buffer",
                self.data.len()
            ));
        }

        if self.cached_bytes() + self.tail_space() < bytes {
            self.data.copy_within(self.head..self.tail, 0);
            self.tail = self.cached_bytes();
            self.head = 0;
        }

        while self.cached_bytes() < bytes {
            let size = match stream.read(&mut self.data[self.tail..]) {
                Ok(size) => size,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };

            if size == 0 {
                return Err(Error::ConnectionClosed);
            }
            self.tail += size;
        }

        let res = &self.data[self.head..self.head + bytes];
        self.head += bytes;
        Ok(res)
    }
}
