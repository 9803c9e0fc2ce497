use crate::{
    error::{fallback_error, Error},
    protocol::*,
    Result,
};
use log::trace;
use std::{cell::RefCell, io::Write, os::unix::net::UnixStream};

#[derive(Debug, PartialEq, Eq)]
pub struct WireMsgHeader {
    pub object_id: u32,
    pub length: u16,
    pub method_id: u16,
}

impl WireMsgHeader {
    pub const WIRE_SIZE: usize = 4 + 2 + 2;

    pub fn build(data: &[u8]) -> Self {
        assert!(data.len() == Self::WIRE_SIZE);

        let object_id = u32_from_bytes(&data[..4]);
        let len_and_event_id = u32_from_bytes(&data[4..8]);

        Self {
            object_id,
            method_id: (len_and_event_id & 0xFFFF) as u16,
            length: (len_and_event_id >> 16) as u16,
        }
    }
}

/// Serializes a request into its wire representation (header included).
pub fn encode(msg: &WireMessage<'_>) -> Result<Vec<u8>> {
    // 128 bytes seems to be a good default. For what I've seen hardly any
    // request will need so many bytes.
    let mut buffer = Vec::with_capacity(128);

    write_u32(&mut buffer, msg.object_id);
    write_u32(&mut buffer, 0); // will be filled in the end

    for value in msg.values {
        match value {
            Uint32(value) => write_u32(&mut buffer, *value),
            Int32(value) => write_u32(&mut buffer, *value as u32),
            Str(value) => {
                let bytes = value.as_bytes();
                let str_size = 1 + bytes.len(); // +1 because of the 'null terminator'
                write_u32(&mut buffer, str_size as u32);
                buffer.extend_from_slice(bytes);
                buffer.push(0);
                pad(&mut buffer, str_size);
            }
            Array(value) => {
                write_u32(&mut buffer, value.len() as u32);
                buffer.extend_from_slice(value);
                pad(&mut buffer, value.len());
            }
            FileDesc(fd) => {
                return Err(Error::Unsupported(format!(
                    "passing file descriptor {fd} needs ancillary data"
                )));
            }
        }
    }

    let total_size = buffer.len();
    assert!(
        total_size % 4 == 0,
        "Bug, the total size ({total_size}) of message {msg:?} isn't a multiple of 32 bits"
    );

    if total_size > u16::MAX as usize {
        return Err(fallback_error!(
            "Request of {total_size} bytes does not fit in a wire message"
        ));
    }

    let size_and_opcode = (total_size as u32) << 16 | msg.request_id as u32;
    buffer[4..8].copy_from_slice(&size_and_opcode.to_ne_bytes());

    Ok(buffer)
}

pub struct ClientStream(RefCell<UnixStream>);

impl ClientStream {
    pub fn new(stream: UnixStream) -> Self {
        Self(RefCell::new(stream))
    }
}

impl WaylandStream for ClientStream {
    fn send(&self, msg: WireMessage<'_>) -> Result<usize> {
        let buffer = encode(&msg)?;
        trace!("Writing {} bytes for object {}", buffer.len(), msg.object_id);

        self.0.borrow_mut().write_all(&buffer)?;
        Ok(buffer.len())
    }
}

// helper functions
fn u32_from_bytes(data: &[u8]) -> u32 {
    assert!(data.len() == 4);
    u32::from_ne_bytes([data[0], data[1], data[2], data[3]])
}

#[inline]
fn write_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_ne_bytes())
}

#[inline]
fn pad(buffer: &mut Vec<u8>, written: usize) {
    buffer.resize(buffer.len() + aligned_size(written) - written, 0u8)
}

#[inline]
fn aligned_size(base_size: usize) -> usize {
    base_size.div_ceil(4) * 4
}

// parsing helper functions
pub mod parsing {
    use super::{aligned_size, u32_from_bytes};
    use std::{fmt, str};

    pub type Result<T> = std::result::Result<T, Error>;

    #[derive(Debug)]
    pub enum Error {
        MissingField(&'static str),
        InvalidUtfString(str::Utf8Error),
        TrailingBytes(usize),
        CustomError(String),
    }

    impl From<str::Utf8Error> for Error {
        fn from(value: str::Utf8Error) -> Self {
            Self::InvalidUtfString(value)
        }
    }

    impl fmt::Display for Error {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::MissingField(field) => write!(f, "missing {field}"),
                Self::InvalidUtfString(err) => write!(f, "invalid utf-8 string: {err}"),
                Self::TrailingBytes(count) => write!(f, "found {count} extra bytes"),
                Self::CustomError(message) => f.write_str(message),
            }
        }
    }

    impl std::error::Error for Error {}

    macro_rules! custom_err {
        ($($t : tt)+) => {
            Error::CustomError(format!($($t)+))
        };
    }

    /// Cursor over an event payload.
    pub struct WireReader<'a> {
        data: &'a [u8],
        offset: usize,
    }

    impl<'a> WireReader<'a> {
        pub fn new(data: &'a [u8]) -> Self {
            Self { data, offset: 0 }
        }

        pub fn remaining(&self) -> usize {
            self.data.len() - self.offset
        }

        fn take(&mut self, size: usize, field: &'static str) -> Result<&'a [u8]> {
            if self.remaining() < size {
                return Err(Error::MissingField(field));
            }

            let bytes = &self.data[self.offset..self.offset + size];
            self.offset += size;
            Ok(bytes)
        }

        pub fn read_u32(&mut self) -> Result<u32> {
            Ok(u32_from_bytes(self.take(4, "4 bytes for u32/i32 integer")?))
        }

        pub fn read_i32(&mut self) -> Result<i32> {
            Ok(self.read_u32()? as i32)
        }

        pub fn read_str(&mut self) -> Result<String> {
            let str_size = self.read_u32()? as usize;
            if str_size == 0 {
                return Err(custom_err!("Got a null string where one was required"));
            }

            let data = self
                .take(aligned_size(str_size), "string data")
                .map_err(|_| custom_err!("Failed to get {str_size} bytes for str data."))?;

            if data[str_size - 1] != 0 {
                return Err(custom_err!("String of {str_size} bytes is not null terminated"));
            }

            Ok(str::from_utf8(&data[..str_size - 1])?.to_string())
        }

        pub fn read_array(&mut self) -> Result<Vec<u8>> {
            let size = self.read_u32()? as usize;
            let data = self
                .take(aligned_size(size), "array data")
                .map_err(|_| custom_err!("Failed to get all {size} bytes of array"))?;
            Ok(data[..size].to_vec())
        }

        /// Fails if the payload had bytes no argument accounted for.
        pub fn finish(self) -> Result<()> {
            match self.remaining() {
                0 => Ok(()),
                extra => Err(Error::TrailingBytes(extra)),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{
        parsing::{Error as ParseError, WireReader},
        *,
    };

    fn words(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    #[test]
    fn header_splits_size_and_opcode() {
        let header = WireMsgHeader::build(&words(&[7, 12 << 16 | 3]));
        assert_eq!(
            header,
            WireMsgHeader { object_id: 7, length: 12, method_id: 3 }
        );
    }

    #[test]
    fn encodes_destroy_request_as_bare_header() {
        let bytes = encode(&WireMessage { object_id: 5, request_id: 0, values: &[] }).unwrap();
        assert_eq!(bytes, words(&[5, 8 << 16]));
    }

    #[test]
    fn encodes_strings_with_terminator_and_padding() {
        let values = [Str("abcd".to_string()), Int32(-1)];
        let bytes = encode(&WireMessage { object_id: 2, request_id: 1, values: &values }).unwrap();

        assert_eq!(bytes.len(), 8 + 4 + 8 + 4);
        assert_eq!(&bytes[8..12], &5u32.to_ne_bytes());
        assert_eq!(&bytes[12..20], b"abcd\0\0\0\0");
        assert_eq!(&bytes[20..24], &(-1i32).to_ne_bytes());
        assert_eq!(WireMsgHeader::build(&bytes[..8]).length, 24);
    }

    #[test]
    fn refuses_file_descriptors() {
        let values = [FileDesc(3)];
        let result = encode(&WireMessage { object_id: 2, request_id: 0, values: &values });
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }

    #[test]
    fn reader_decodes_mixed_arguments() {
        let mut payload = words(&[42, (-3i32) as u32, 6]);
        payload.extend_from_slice(b"hello\0\0\0");
        payload.extend_from_slice(&words(&[2]));
        payload.extend_from_slice(&[9, 8, 0, 0]);

        let mut reader = WireReader::new(&payload);
        assert_eq!(reader.read_u32().unwrap(), 42);
        assert_eq!(reader.read_i32().unwrap(), -3);
        assert_eq!(reader.read_str().unwrap(), "hello");
        assert_eq!(reader.read_array().unwrap(), vec![9, 8]);
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn reader_reports_missing_and_trailing_bytes() {
        let payload = [1u8, 2];
        assert!(matches!(
            WireReader::new(&payload).read_u32(),
            Err(ParseError::MissingField(_))
        ));

        let payload = words(&[1, 2]);
        let mut reader = WireReader::new(&payload);
        reader.read_u32().unwrap();
        assert!(matches!(reader.finish(), Err(ParseError::TrailingBytes(4))));
    }

    #[test]
    fn reader_rejects_unterminated_strings() {
        let mut payload = words(&[4]);
        payload.extend_from_slice(b"abcd");
        assert!(matches!(
            WireReader::new(&payload).read_str(),
            Err(ParseError::CustomError(_))
        ));
    }
}
