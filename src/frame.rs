// https://redis.io/docs/reference/protocol-spec

use std::fmt;

use bytes::Buf;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::str::Utf8Error;
use std::string::FromUtf8Error;
use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

// Replies nest arbitrarily deep on the wire; a hostile or broken peer must not be able to
// overflow the stack.
const MAX_DEPTH: usize = 512;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("invalid frame data type: {0:#04x}")]
    InvalidDataType(u8),
    #[error("frame type '{data_type}' is not part of {protocol}")]
    Unsupported { data_type: char, protocol: Protocol },
    #[error("invalid length prefix: {0}")]
    InvalidLength(String),
    #[error("frame payload is not terminated by CRLF")]
    InvalidTerminator,
    #[error("frame nesting exceeds the maximum depth")]
    TooDeep,
    /// Invalid message encoding.
    #[error("{0}")]
    Other(String),
}

/// The protocol version spoken on a connection, negotiated with `HELLO`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Resp2,
    #[default]
    Resp3,
}

impl Protocol {
    pub fn version(self) -> u8 {
        match self {
            Protocol::Resp2 => 2,
            Protocol::Resp3 => 3,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RESP{}", self.version())
    }
}

/// A single reply as sent by the server. Variants mirror the RESP3 types one to one, so a
/// reply keeps the exact type the server chose for it.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
    Double(f64),
    Boolean(bool),
    BigNumber(String),
    Verbatim { format: String, text: Bytes },
    Map(Vec<(Frame, Frame)>),
    Set(Vec<Frame>),
    Push(Vec<Frame>),
}

// Protocol specification: https://redis.io/docs/reference/protocol-spec/
impl Frame {
    /// Parses one complete frame starting at the cursor position. On success the cursor is
    /// left right after the frame; `Error::Incomplete` means more bytes are needed.
    pub fn parse(src: &mut Cursor<&[u8]>, protocol: Protocol) -> Result<Self, Error> {
        Self::parse_at_depth(src, protocol, 0)
    }

    fn parse_at_depth(
        src: &mut Cursor<&[u8]>,
        protocol: Protocol,
        depth: usize,
    ) -> Result<Self, Error> {
        if depth > MAX_DEPTH {
            return Err(Error::TooDeep);
        }

        // The first byte in an RESP-serialized payload always identifies its type.
        // Subsequent bytes constitute the type's contents.
        let first_byte = get_byte(src)?;
        let data_type = DataType::try_from(first_byte)?;

        if protocol == Protocol::Resp2 && data_type.is_resp3_only() {
            return Err(Error::Unsupported {
                data_type: first_byte as char,
                protocol,
            });
        }

        match data_type {
            DataType::SimpleString => Ok(Frame::Simple(get_line_string(src)?)),
            DataType::SimpleError => Ok(Frame::Error(get_line_string(src)?)),
            DataType::Integer => Ok(Frame::Integer(get_integer(src)?)),
            // $<length>\r\n<data>\r\n
            DataType::BulkString => match get_length(src)? {
                None => Ok(Frame::Null),
                Some(length) => {
                    let data = get_blob(src, length)?;
                    Ok(Frame::Bulk(Bytes::copy_from_slice(data)))
                }
            },
            // !<length>\r\n<error>\r\n
            DataType::BulkError => {
                let length = get_length(src)?
                    .ok_or_else(|| Error::InvalidLength("null bulk error".to_string()))?;
                let msg = std::str::from_utf8(get_blob(src, length)?)?;
                Ok(Frame::Error(msg.to_string()))
            }
            // *<number-of-elements>\r\n<element-1>...<element-n>
            DataType::Array => match get_length(src)? {
                None => Ok(Frame::Null),
                Some(length) => Ok(Frame::Array(parse_elements(
                    src, protocol, depth, length,
                )?)),
            },
            DataType::Set => {
                let length = get_required_length(src)?;
                Ok(Frame::Set(parse_elements(src, protocol, depth, length)?))
            }
            DataType::Push => {
                let length = get_required_length(src)?;
                Ok(Frame::Push(parse_elements(src, protocol, depth, length)?))
            }
            // %<number-of-entries>\r\n<key-1><value-1>...<key-n><value-n>
            DataType::Map => {
                let length = get_required_length(src)?;
                Ok(Frame::Map(parse_pairs(src, protocol, depth, length)?))
            }
            // Attributes carry out-of-band metadata about the reply that follows them. They are
            // consumed and the reply itself is returned. Each one counts as a nesting level so a
            // chain of attributes is bounded like any other nesting.
            DataType::Attribute => {
                let length = get_required_length(src)?;
                let _ = parse_pairs(src, protocol, depth, length)?;
                Self::parse_at_depth(src, protocol, depth + 1)
            }
            DataType::Null => {
                if !get_line(src)?.is_empty() {
                    return Err("protocol error; null frame carries data".into());
                }
                Ok(Frame::Null)
            }
            DataType::Boolean => match get_line(src)? {
                b"t" => Ok(Frame::Boolean(true)),
                b"f" => Ok(Frame::Boolean(false)),
                other => Err(format!(
                    "protocol error; invalid boolean {:?}",
                    String::from_utf8_lossy(other)
                )
                .into()),
            },
            DataType::Double => {
                let line = get_line_string(src)?;
                let double = line
                    .parse::<f64>()
                    .map_err(|_| Error::Other(format!("protocol error; invalid double {line:?}")))?;
                Ok(Frame::Double(double))
            }
            DataType::BigNumber => {
                let line = get_line_string(src)?;
                let digits = line
                    .strip_prefix('-')
                    .or_else(|| line.strip_prefix('+'))
                    .unwrap_or(&line);
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(format!("protocol error; invalid big number {line:?}").into());
                }
                Ok(Frame::BigNumber(line))
            }
            // =<length>\r\n<encoding>:<data>\r\n
            DataType::VerbatimString => {
                let length = get_required_length(src)?;
                let data = get_blob(src, length)?;
                if data.len() < 4 || data[3] != b':' {
                    return Err("protocol error; verbatim string without encoding".into());
                }
                let format = std::str::from_utf8(&data[..3])?.to_string();
                Ok(Frame::Verbatim {
                    format,
                    text: Bytes::copy_from_slice(&data[4..]),
                })
            }
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes);
        bytes
    }

    /// Appends the wire representation of this frame to `dst`, as a server speaking RESP3
    /// would send it.
    pub fn write_to(&self, dst: &mut Vec<u8>) {
        match self {
            Frame::Simple(s) => write_line(dst, DataType::SimpleString, s.as_bytes()),
            Frame::Error(s) => write_line(dst, DataType::SimpleError, s.as_bytes()),
            Frame::Integer(i) => write_line(dst, DataType::Integer, i.to_string().as_bytes()),
            Frame::Bulk(bytes) => write_blob(dst, DataType::BulkString, bytes),
            Frame::Null => write_line(dst, DataType::Null, b""),
            Frame::Array(arr) => write_elements(dst, DataType::Array, arr),
            Frame::Double(d) => write_line(dst, DataType::Double, format_double(*d).as_bytes()),
            Frame::Boolean(b) => {
                write_line(dst, DataType::Boolean, if *b { b"t" } else { b"f" })
            }
            Frame::BigNumber(n) => write_line(dst, DataType::BigNumber, n.as_bytes()),
            Frame::Verbatim { format, text } => {
                let mut payload = Vec::with_capacity(format.len() + 1 + text.len());
                payload.extend_from_slice(format.as_bytes());
                payload.push(b':');
                payload.extend_from_slice(text);
                write_blob(dst, DataType::VerbatimString, &payload);
            }
            Frame::Map(pairs) => {
                write_line(dst, DataType::Map, pairs.len().to_string().as_bytes());
                for (key, value) in pairs {
                    key.write_to(dst);
                    value.write_to(dst);
                }
            }
            Frame::Set(items) => write_elements(dst, DataType::Set, items),
            Frame::Push(items) => write_elements(dst, DataType::Push, items),
        }
    }

    /// Short lowercase name of the reply type, as used in history entries and exports.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Simple(_) => "simple",
            Frame::Error(_) => "error",
            Frame::Integer(_) => "integer",
            Frame::Bulk(_) => "bulk",
            Frame::Null => "null",
            Frame::Array(_) => "array",
            Frame::Double(_) => "double",
            Frame::Boolean(_) => "boolean",
            Frame::BigNumber(_) => "bignumber",
            Frame::Verbatim { .. } => "verbatim",
            Frame::Map(_) => "map",
            Frame::Set(_) => "set",
            Frame::Push(_) => "push",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null)
    }

    /// Raw bytes of string-like replies.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Frame::Simple(s) | Frame::BigNumber(s) => Some(s.as_bytes()),
            Frame::Bulk(b) => Some(b),
            Frame::Verbatim { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Integer value of the reply. Bulk strings holding a number are accepted because RESP2
    /// servers send numeric cursors that way.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Frame::Integer(i) => Some(*i),
            frame => frame.as_str().and_then(|s| s.parse().ok()),
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Frame::Double(d) => Some(*d),
            Frame::Integer(i) => Some(*i as f64),
            frame => frame.as_str().and_then(|s| s.parse().ok()),
        }
    }

    /// Consumes an aggregate reply into its elements. Maps are flattened into alternating
    /// keys and values, the way RESP2 servers send them.
    pub fn into_elements(self) -> Option<Vec<Frame>> {
        match self {
            Frame::Array(items) | Frame::Set(items) | Frame::Push(items) => Some(items),
            Frame::Map(pairs) => Some(pairs.into_iter().flat_map(|(k, v)| [k, v]).collect()),
            _ => None,
        }
    }

    /// Lines of the redis-cli style rendering.
    fn render(&self) -> Vec<String> {
        match self {
            Frame::Simple(s) => vec![s.clone()],
            Frame::Error(s) => vec![format!("(error) {}", s)],
            Frame::Integer(i) => vec![format!("(integer) {}", i)],
            Frame::Bulk(bytes) => vec![quote_bytes(bytes)],
            Frame::Null => vec!["(nil)".to_string()],
            Frame::Double(d) => vec![format!("(double) {}", format_double(*d))],
            Frame::Boolean(b) => vec![format!("({})", b)],
            Frame::BigNumber(n) => vec![format!("(big number) {}", n)],
            Frame::Verbatim { text, .. } => {
                let lines: Vec<String> = String::from_utf8_lossy(text)
                    .lines()
                    .map(str::to_string)
                    .collect();
                if lines.is_empty() {
                    vec![String::new()]
                } else {
                    lines
                }
            }
            Frame::Array(items) | Frame::Set(items) | Frame::Push(items) => {
                if items.is_empty() {
                    return vec![match self {
                        Frame::Set(_) => "(empty set)".to_string(),
                        _ => "(empty array)".to_string(),
                    }];
                }
                let mut lines = Vec::new();
                for (index, item) in items.iter().enumerate() {
                    let prefix = format!("{}) ", index + 1);
                    push_indented(&mut lines, &prefix, item.render());
                }
                lines
            }
            Frame::Map(pairs) => {
                if pairs.is_empty() {
                    return vec!["(empty hash)".to_string()];
                }
                let mut lines = Vec::new();
                for (index, (key, value)) in pairs.iter().enumerate() {
                    let prefix = format!("{}# ", index + 1);
                    let mut entry = key.render();
                    let pad = entry.last().map(|l| l.len() + 4).unwrap_or(4);
                    // The first value line continues the key line.
                    let mut value = value.render().into_iter();
                    if let (Some(last), Some(first)) = (entry.last_mut(), value.next()) {
                        last.push_str(" => ");
                        last.push_str(&first);
                    }
                    entry.extend(value.map(|l| format!("{}{}", " ".repeat(pad), l)));
                    push_indented(&mut lines, &prefix, entry);
                }
                lines
            }
        }
    }
}

impl From<Frame> for Vec<u8> {
    fn from(frame: Frame) -> Self {
        frame.serialize()
    }
}

/// Renders the reply the way `redis-cli` prints it.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render().join("\n"))
    }
}

fn push_indented(lines: &mut Vec<String>, prefix: &str, item: Vec<String>) {
    let pad = " ".repeat(prefix.len());
    for (i, line) in item.into_iter().enumerate() {
        if i == 0 {
            lines.push(format!("{}{}", prefix, line));
        } else {
            lines.push(format!("{}{}", pad, line));
        }
    }
}

fn quote_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out.push('"');
    out
}

pub(crate) fn format_double(d: f64) -> String {
    if d.is_nan() {
        "nan".to_string()
    } else if d.is_infinite() {
        (if d > 0.0 { "inf" } else { "-inf" }).to_string()
    } else {
        d.to_string()
    }
}

fn write_line(dst: &mut Vec<u8>, data_type: DataType, payload: &[u8]) {
    dst.push(u8::from(data_type));
    dst.extend_from_slice(payload);
    dst.extend_from_slice(CRLF);
}

fn write_blob(dst: &mut Vec<u8>, data_type: DataType, payload: &[u8]) {
    write_line(dst, data_type, payload.len().to_string().as_bytes());
    dst.extend_from_slice(payload);
    dst.extend_from_slice(CRLF);
}

fn write_elements(dst: &mut Vec<u8>, data_type: DataType, items: &[Frame]) {
    write_line(dst, data_type, items.len().to_string().as_bytes());
    for item in items {
        item.write_to(dst);
    }
}

fn parse_elements(
    src: &mut Cursor<&[u8]>,
    protocol: Protocol,
    depth: usize,
    length: usize,
) -> Result<Vec<Frame>, Error> {
    // The length prefix is untrusted, so it only hints the allocation.
    let mut frames = Vec::with_capacity(length.min(1024));
    for _ in 0..length {
        frames.push(Frame::parse_at_depth(src, protocol, depth + 1)?);
    }
    Ok(frames)
}

fn parse_pairs(
    src: &mut Cursor<&[u8]>,
    protocol: Protocol,
    depth: usize,
    length: usize,
) -> Result<Vec<(Frame, Frame)>, Error> {
    let mut pairs = Vec::with_capacity(length.min(1024));
    for _ in 0..length {
        let key = Frame::parse_at_depth(src, protocol, depth + 1)?;
        let value = Frame::parse_at_depth(src, protocol, depth + 1)?;
        pairs.push((key, value));
    }
    Ok(pairs)
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    let end = buf[start..]
        .windows(2)
        .position(|window| window == CRLF)
        .map(|index| start + index)
        .ok_or(Error::Incomplete)?;

    src.set_position((end + CRLF.len()) as u64);

    Ok(&buf[start..end])
}

fn get_line_string(src: &mut Cursor<&[u8]>) -> Result<String, Error> {
    let line = get_line(src)?;
    Ok(std::str::from_utf8(line)?.to_string())
}

fn get_integer(src: &mut Cursor<&[u8]>) -> Result<i64, Error> {
    let line = get_line_string(src)?;
    line.parse::<i64>()
        .map_err(|_| Error::Other(format!("protocol error; invalid integer {line:?}")))
}

/// Reads a length prefix. `None` is the RESP2 null marker (`-1`).
fn get_length(src: &mut Cursor<&[u8]>) -> Result<Option<usize>, Error> {
    let line = get_line_string(src)?;
    let length = line
        .parse::<i64>()
        .map_err(|_| Error::InvalidLength(line.clone()))?;

    match length {
        -1 => Ok(None),
        n if n < 0 => Err(Error::InvalidLength(line)),
        n => usize::try_from(n)
            .map(Some)
            .map_err(|_| Error::InvalidLength(line)),
    }
}

fn get_required_length(src: &mut Cursor<&[u8]>) -> Result<usize, Error> {
    get_length(src)?.ok_or_else(|| Error::InvalidLength("-1".to_string()))
}

/// Reads exactly `length` bytes followed by CRLF.
fn get_blob<'a>(src: &mut Cursor<&'a [u8]>, length: usize) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    let end = start
        .checked_add(length)
        .ok_or_else(|| Error::InvalidLength(length.to_string()))?;
    if buf.len() < end + CRLF.len() {
        return Err(Error::Incomplete);
    }
    if &buf[end..end + CRLF.len()] != CRLF {
        return Err(Error::InvalidTerminator);
    }

    src.set_position((end + CRLF.len()) as u64);

    Ok(&buf[start..end])
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

#[derive(Debug, Clone, Copy)]
enum DataType {
    SimpleString,   // '+'
    BulkString,     // '$'
    VerbatimString, // '='
    SimpleError,    // '-'
    BulkError,      // '!'
    Boolean,        // '#'
    Integer,        // ':'
    Double,         // ','
    BigNumber,      // '('
    Array,          // '*'
    Map,            // '%'
    Set,            // '~'
    Push,           // '>'
    Attribute,      // '|'
    // Due to historical reasons, RESP2 features two specially crafted values for representing null
    // values of bulk strings and arrays. This duality has always been a redundancy that added zero
    // semantical value to the protocol itself. The null type, introduced in RESP3, aims to fix
    // this wrong.
    Null, // '_'
}

impl DataType {
    fn is_resp3_only(self) -> bool {
        !matches!(
            self,
            DataType::SimpleString
                | DataType::SimpleError
                | DataType::Integer
                | DataType::BulkString
                | DataType::Array
        )
    }
}

impl TryFrom<u8> for DataType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::SimpleError),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::BulkString),
            b'!' => Ok(Self::BulkError),
            b'*' => Ok(Self::Array),
            b'_' => Ok(Self::Null),
            b'#' => Ok(Self::Boolean),
            b',' => Ok(Self::Double),
            b'(' => Ok(Self::BigNumber),
            b'=' => Ok(Self::VerbatimString),
            b'%' => Ok(Self::Map),
            b'~' => Ok(Self::Set),
            b'>' => Ok(Self::Push),
            b'|' => Ok(Self::Attribute),
            _ => Err(Error::InvalidDataType(byte)),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::BulkError => b'!',
            DataType::Array => b'*',
            DataType::Null => b'_',
            DataType::Boolean => b'#',
            DataType::Double => b',',
            DataType::BigNumber => b'(',
            DataType::VerbatimString => b'=',
            DataType::Map => b'%',
            DataType::Set => b'~',
            DataType::Push => b'>',
            DataType::Attribute => b'|',
        }
    }
}

impl From<FromUtf8Error> for Error {
    fn from(_src: FromUtf8Error) -> Error {
        "protocol error; invalid frame format".into()
    }
}

impl From<Utf8Error> for Error {
    fn from(_src: Utf8Error) -> Error {
        "protocol error; invalid frame format".into()
    }
}

impl From<&str> for Error {
    fn from(src: &str) -> Error {
        src.to_string().into()
    }
}

impl From<String> for Error {
    fn from(src: String) -> Error {
        Error::Other(src)
    }
}
