use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::frame::Frame;
use crate::Error;

/// The reply type a caller expects for a command. It documents intent and lets typed
/// readers validate replies; it never changes how a reply is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ReplyHint {
    Status,
    Integer,
    Bulk,
    Array,
    Map,
    Double,
}

impl ReplyHint {
    /// Returns `true` when `frame` is an acceptable shape for this hint under either
    /// protocol version. Nulls and error replies always match.
    pub fn matches(self, frame: &Frame) -> bool {
        match (self, frame) {
            (_, Frame::Null) | (_, Frame::Error(_)) => true,
            (ReplyHint::Status, Frame::Simple(_)) => true,
            (ReplyHint::Integer, Frame::Integer(_)) => true,
            (ReplyHint::Bulk, Frame::Bulk(_) | Frame::Verbatim { .. } | Frame::Simple(_)) => true,
            (ReplyHint::Array, Frame::Array(_) | Frame::Set(_)) => true,
            // RESP2 servers send maps as flat arrays.
            (ReplyHint::Map, Frame::Map(_) | Frame::Array(_)) => true,
            (ReplyHint::Double, Frame::Double(_) | Frame::Bulk(_)) => true,
            _ => false,
        }
    }
}

/// Converts a value into a single command argument.
pub trait ToArg {
    fn to_arg(&self) -> Bytes;
}

impl ToArg for str {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for [u8] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl<const N: usize> ToArg for [u8; N] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for Bytes {
    fn to_arg(&self) -> Bytes {
        self.clone()
    }
}

macro_rules! numeric_to_arg {
    ($($ty:ty),*) => {
        $(
            impl ToArg for $ty {
                fn to_arg(&self) -> Bytes {
                    Bytes::from(self.to_string())
                }
            }
        )*
    };
}

numeric_to_arg!(i32, i64, u16, u32, u64, usize, f64);

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Bytes {
        (**self).to_arg()
    }
}

/// Transaction control commands intercepted by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionControl {
    Multi,
    Exec,
    Discard,
}

/// A command name plus its ordered arguments, sent as an array of bulk strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<Bytes>,
    hint: Option<ReplyHint>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Command {
        Command {
            name: name.into(),
            args: Vec::new(),
            hint: None,
        }
    }

    pub fn arg(mut self, arg: impl ToArg) -> Command {
        self.args.push(arg.to_arg());
        self
    }

    pub fn args<I, T>(mut self, args: I) -> Command
    where
        I: IntoIterator<Item = T>,
        T: ToArg,
    {
        self.args.extend(args.into_iter().map(|a| a.to_arg()));
        self
    }

    pub fn with_hint(mut self, hint: ReplyHint) -> Command {
        self.hint = Some(hint);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Upper-cased command name, used for dispatch decisions.
    pub fn normalized_name(&self) -> String {
        self.name.to_ascii_uppercase()
    }

    pub fn arguments(&self) -> &[Bytes] {
        &self.args
    }

    pub fn hint(&self) -> Option<ReplyHint> {
        self.hint
    }

    /// Parses a console line into a command. Quoting follows redis-cli: double quotes accept
    /// `\n`, `\r`, `\t`, `\"`, `\\` and `\xHH` escapes, single quotes only `\'`.
    pub fn parse_line(line: &str) -> Result<Command, Error> {
        let mut parts = split_args(line)?.into_iter();
        let name = parts
            .next()
            .ok_or_else(|| Error::InvalidCommand("empty command".to_string()))?;
        let name = String::from_utf8(name.to_vec())
            .map_err(|_| Error::InvalidCommand("command name is not valid UTF-8".to_string()))?;

        Ok(Command {
            name,
            args: parts.collect(),
            hint: None,
        })
    }

    /// The request as a RESP array of bulk strings.
    pub fn to_frame(&self) -> Frame {
        let mut items = Vec::with_capacity(self.args.len() + 1);
        items.push(Frame::Bulk(Bytes::copy_from_slice(self.name.as_bytes())));
        items.extend(self.args.iter().cloned().map(Frame::Bulk));
        Frame::Array(items)
    }

    /// Wire encoding of the request.
    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::new();
        self.encode_into(&mut dst);
        dst.freeze()
    }

    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.put_u8(b'*');
        dst.put_slice((self.args.len() + 1).to_string().as_bytes());
        dst.put_slice(b"\r\n");
        put_bulk(dst, self.name.as_bytes());
        for arg in &self.args {
            put_bulk(dst, arg);
        }
    }

    pub fn is_subscribe(&self) -> bool {
        matches!(
            self.normalized_name().as_str(),
            "SUBSCRIBE" | "PSUBSCRIBE" | "SSUBSCRIBE"
        )
    }

    pub fn is_unsubscribe(&self) -> bool {
        matches!(
            self.normalized_name().as_str(),
            "UNSUBSCRIBE" | "PUNSUBSCRIBE" | "SUNSUBSCRIBE"
        )
    }

    pub fn transaction_control(&self) -> Option<TransactionControl> {
        match self.normalized_name().as_str() {
            "MULTI" => Some(TransactionControl::Multi),
            "EXEC" => Some(TransactionControl::Exec),
            "DISCARD" => Some(TransactionControl::Discard),
            _ => None,
        }
    }

    /// The database index of a `SELECT` command.
    pub fn selected_database(&self) -> Option<u32> {
        if self.normalized_name() != "SELECT" || self.args.len() != 1 {
            return None;
        }
        std::str::from_utf8(&self.args[0]).ok()?.parse().ok()
    }
}

fn put_bulk(dst: &mut BytesMut, data: &[u8]) {
    dst.put_u8(b'$');
    dst.put_slice(data.len().to_string().as_bytes());
    dst.put_slice(b"\r\n");
    dst.put_slice(data);
    dst.put_slice(b"\r\n");
}

/// Renders the command as it would be typed into the console, quoting arguments that need it.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", quote_arg(arg))?;
        }
        Ok(())
    }
}

fn quote_arg(arg: &[u8]) -> String {
    let plain = !arg.is_empty()
        && arg
            .iter()
            .all(|b| b.is_ascii_graphic() && !matches!(b, b'"' | b'\'' | b'\\'));
    if plain {
        // Checked above: every byte is printable ASCII.
        return String::from_utf8_lossy(arg).into_owned();
    }

    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for &b in arg {
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

fn split_args(line: &str) -> Result<Vec<Bytes>, Error> {
    let unbalanced = || Error::InvalidCommand("unbalanced quotes in command line".to_string());

    let bytes = line.as_bytes();
    let mut args = Vec::new();
    let mut i = 0;

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            return Ok(args);
        }

        let mut current = Vec::new();
        let mut in_double = false;
        let mut in_single = false;

        loop {
            if in_double {
                let b = *bytes.get(i).ok_or_else(unbalanced)?;
                if b == b'\\' && i + 3 < bytes.len() && bytes[i + 1] == b'x' {
                    let hex = std::str::from_utf8(&bytes[i + 2..i + 4]).ok();
                    if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                        current.push(value);
                        i += 4;
                        continue;
                    }
                }
                if b == b'\\' && i + 1 < bytes.len() {
                    i += 1;
                    current.push(match bytes[i] {
                        b'n' => b'\n',
                        b'r' => b'\r',
                        b't' => b'\t',
                        b'b' => 0x08,
                        b'a' => 0x07,
                        other => other,
                    });
                } else if b == b'"' {
                    // The closing quote must be followed by a space or nothing.
                    if i + 1 < bytes.len() && !bytes[i + 1].is_ascii_whitespace() {
                        return Err(unbalanced());
                    }
                    in_double = false;
                    i += 1;
                    break;
                } else {
                    current.push(b);
                }
            } else if in_single {
                let b = *bytes.get(i).ok_or_else(unbalanced)?;
                if b == b'\\' && i + 1 < bytes.len() && bytes[i + 1] == b'\'' {
                    i += 1;
                    current.push(b'\'');
                } else if b == b'\'' {
                    if i + 1 < bytes.len() && !bytes[i + 1].is_ascii_whitespace() {
                        return Err(unbalanced());
                    }
                    in_single = false;
                    i += 1;
                    break;
                } else {
                    current.push(b);
                }
            } else {
                match bytes.get(i) {
                    None => break,
                    Some(b) if b.is_ascii_whitespace() => break,
                    Some(b'"') => in_double = true,
                    Some(b'\'') => in_single = true,
                    Some(&b) => current.push(b),
                }
            }
            i += 1;
        }

        args.push(Bytes::from(current));
    }
}
