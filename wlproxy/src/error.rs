use crate::{
    protocol::{WaylandId, WlOpcode},
    wire_format::parsing,
};
use std::{env, fmt, io};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    // runtime errors
    NoSuchObject(WaylandId),
    HandlerAlreadyInPlace(WaylandId),
    NoSuchEvent { interface: &'static str, opcode: WlOpcode },
    Unsupported(String),

    // connection errors
    ConnectionClosed,
    /// A header the stream cannot be framed past. Nothing read after it can
    /// be trusted.
    InvalidMessage { object_id: WaylandId, length: usize },
    Protocol { object_id: WaylandId, code: u32, message: String },

    // other modules errors
    Parse(parsing::Error),
    Io(io::Error),
    Context { error: Box<Error>, message: String },
    FallBack(Box<dyn std::error::Error>),
}

impl Error {
    /// The innermost error, looking through any added context.
    pub fn root(&self) -> &Error {
        match self {
            Self::Context { error, .. } => error.root(),
            other => other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchObject(id) => write!(f, "no such object {id}"),
            Self::HandlerAlreadyInPlace(id) => write!(f, "object {id} already has a listener"),
            Self::NoSuchEvent { interface, opcode } => {
                write!(f, "{interface} has no event with opcode {opcode}")
            }
            Self::Unsupported(what) => write!(f, "unsupported: {what}"),
            Self::ConnectionClosed => f.write_str("connection closed by the server"),
            Self::InvalidMessage { object_id, length } => {
                write!(f, "invalid message length {length} for object {object_id}")
            }
            Self::Protocol { object_id, code, message } => {
                write!(f, "protocol error {code} on object {object_id}: {message}")
            }
            Self::Parse(err) => write!(f, "malformed event: {err}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::Context { error, message } => write!(f, "{message}: {error}"),
            Self::FallBack(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Context { error, .. } => Some(error.as_ref()),
            Self::FallBack(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<parsing::Error> for Error {
    fn from(value: parsing::Error) -> Self {
        Error::Parse(value)
    }
}

impl From<env::VarError> for Error {
    fn from(value: env::VarError) -> Self {
        Error::FallBack(Box::new(value))
    }
}

macro_rules! fallback_error {
    ($($t : tt)*) => { crate::error::Error::FallBack(format!($($t)*).into()) }
}

macro_rules! error_context{
    ($result : expr, $($t : tt)*) => {
        $result.map_err(|e| crate::error::Error::Context {
            error   : Box::new(e.into()),
            message : format!($($t)*)
        })
    };
}

pub(crate) use error_context;
pub(crate) use fallback_error;
