//! Cursor-based browsing of a keyspace: listing keys with SCAN, describing them and reading
//! their values page by page, without blocking the server.

mod readers;
mod scan;

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use crate::command::{Command, ToArg};
use crate::config::BrowserConfig;
use crate::frame::Frame;
use crate::session::Session;
use crate::Error;

pub use scan::KeyScan;

/// Data type of a key, as reported by `TYPE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyKind {
    String,
    List,
    Hash,
    Set,
    ZSet,
    Stream,
    /// Module types such as `ReJSON-RL`. Described, but not readable.
    Other(String),
}

impl KeyKind {
    /// `None` for `none`, the reply for a missing key.
    pub fn from_type_reply(name: &str) -> Option<KeyKind> {
        let kind = match name {
            "none" => return None,
            "string" => KeyKind::String,
            "list" => KeyKind::List,
            "hash" => KeyKind::Hash,
            "set" => KeyKind::Set,
            "zset" => KeyKind::ZSet,
            "stream" => KeyKind::Stream,
            other => KeyKind::Other(other.to_string()),
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &str {
        match self {
            KeyKind::String => "string",
            KeyKind::List => "list",
            KeyKind::Hash => "hash",
            KeyKind::Set => "set",
            KeyKind::ZSet => "zset",
            KeyKind::Stream => "stream",
            KeyKind::Other(name) => name,
        }
    }

    /// Command returning the element count (or byte length for strings).
    fn size_command(&self) -> Option<&'static str> {
        match self {
            KeyKind::String => Some("STRLEN"),
            KeyKind::List => Some("LLEN"),
            KeyKind::Hash => Some("HLEN"),
            KeyKind::Set => Some("SCARD"),
            KeyKind::ZSet => Some("ZCARD"),
            KeyKind::Stream => Some("XLEN"),
            KeyKind::Other(_) => None,
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Persistent,
    Expires(Duration),
}

impl Ttl {
    /// Interprets a `TTL` reply. `None` means the key does not exist.
    pub fn from_seconds(seconds: i64) -> Option<Ttl> {
        match seconds {
            -2 => None,
            s if s < 0 => Some(Ttl::Persistent),
            s => Some(Ttl::Expires(Duration::from_secs(s as u64))),
        }
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ttl::Persistent => f.write_str("no expiry"),
            Ttl::Expires(d) => write!(f, "{}s", d.as_secs()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyInfo {
    pub key: Bytes,
    pub kind: KeyKind,
    pub ttl: Ttl,
    /// Element count for collections, byte length for strings. `None` for module types.
    pub approximate_size: Option<u64>,
}

/// Where the next page of a collection starts. Tokens are only meaningful for the key and
/// type they were returned for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageToken {
    /// HSCAN / SSCAN cursor.
    Cursor(u64),
    /// LRANGE / ZRANGE index.
    Offset(u64),
    /// First stream entry id of the next XRANGE page.
    StreamId(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub token: Option<PageToken>,
    /// Number of elements to fetch. A hint for cursor-based reads.
    pub count: usize,
}

impl PageRequest {
    pub fn first(count: usize) -> PageRequest {
        PageRequest { token: None, count }
    }

    pub fn after(token: PageToken, count: usize) -> PageRequest {
        PageRequest {
            token: Some(token),
            count,
        }
    }

    fn is_first(&self) -> bool {
        self.token.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: T,
    /// Continuation token. `None` once the collection has been read completely.
    pub next: Option<PageToken>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: Vec<(Bytes, Bytes)>,
}

/// A typed page of a key's value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(Bytes),
    List(Vec<Bytes>),
    Hash(Vec<(Bytes, Bytes)>),
    Set(Vec<Bytes>),
    ZSet(Vec<(Bytes, f64)>),
    Stream(Vec<StreamEntry>),
}

impl Value {
    pub fn kind(&self) -> KeyKind {
        match self {
            Value::String(_) => KeyKind::String,
            Value::List(_) => KeyKind::List,
            Value::Hash(_) => KeyKind::Hash,
            Value::Set(_) => KeyKind::Set,
            Value::ZSet(_) => KeyKind::ZSet,
            Value::Stream(_) => KeyKind::Stream,
        }
    }

    /// Number of elements in this page.
    pub fn len(&self) -> usize {
        match self {
            Value::String(_) => 1,
            Value::List(items) | Value::Set(items) => items.len(),
            Value::Hash(pairs) => pairs.len(),
            Value::ZSet(members) => members.len(),
            Value::Stream(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One section of the `INFO` reply, e.g. `Server` or `Keyspace`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoSection {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub sections: Vec<InfoSection>,
}

impl ServerInfo {
    pub fn parse(text: &str) -> ServerInfo {
        let mut sections: Vec<InfoSection> = Vec::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(name) = line.strip_prefix('#') {
                sections.push(InfoSection {
                    name: name.trim().to_string(),
                    entries: Vec::new(),
                });
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            if sections.is_empty() {
                sections.push(InfoSection {
                    name: String::new(),
                    entries: Vec::new(),
                });
            }
            if let Some(section) = sections.last_mut() {
                section.entries.push((key.to_string(), value.to_string()));
            }
        }
        ServerInfo { sections }
    }

    pub fn section(&self, name: &str) -> Option<&InfoSection> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Looks a field up in any section.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .flat_map(|s| s.entries.iter())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Read-only views of a keyspace plus a few maintenance operations, built on a [`Session`].
#[derive(Debug)]
pub struct Browser {
    session: Session,
    config: BrowserConfig,
}

impl Browser {
    pub fn new(session: Session, config: BrowserConfig) -> Browser {
        Browser { session, config }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    /// Lazily lists keys matching `pattern`. `batch_size` is the COUNT hint sent with SCAN.
    pub fn scan_keys(&mut self, pattern: &str, batch_size: usize) -> KeyScan<'_> {
        KeyScan::new(&mut self.session, pattern, batch_size)
    }

    /// [`Browser::scan_keys`] with the configured page size.
    pub fn scan(&mut self, pattern: &str) -> KeyScan<'_> {
        let batch_size = self.config.scan_page_size;
        self.scan_keys(pattern, batch_size)
    }

    /// Type, TTL and size of a key.
    pub async fn describe(&mut self, key: impl ToArg) -> Result<KeyInfo, Error> {
        let key = key.to_arg();
        let replies = self
            .session
            .pipeline(vec![
                Command::new("TYPE").arg(&key),
                Command::new("TTL").arg(&key),
            ])
            .await?;
        let mut replies = replies.into_iter();

        let kind = match replies.next().map(|r| typed(&key, r)).transpose()? {
            Some(reply) => reply
                .as_str()
                .and_then(KeyKind::from_type_reply)
                .ok_or_else(|| not_found(&key))?,
            None => return Err(Error::Protocol("missing TYPE reply".into())),
        };
        let ttl = match replies.next().map(|r| typed(&key, r)).transpose()? {
            Some(reply) => reply
                .as_integer()
                .and_then(Ttl::from_seconds)
                .ok_or_else(|| not_found(&key))?,
            None => return Err(Error::Protocol("missing TTL reply".into())),
        };

        let approximate_size = match kind.size_command() {
            Some(name) => {
                let reply = typed(&key, self.session.execute(Command::new(name).arg(&key)).await?)?;
                let size = reply.as_integer().ok_or_else(|| {
                    Error::Protocol(format!("{} returned a {} reply", name, reply.kind()))
                })?;
                // A zero size is either an empty string, an empty stream or a key that
                // vanished after TYPE.
                if size == 0 && !readers::exists(&mut self.session, &key).await? {
                    return Err(not_found(&key));
                }
                Some(size as u64)
            }
            None => None,
        };

        Ok(KeyInfo {
            key,
            kind,
            ttl,
            approximate_size,
        })
    }

    /// Reads one page of a key's value. Strings are always read whole.
    pub async fn read(
        &mut self,
        key: impl ToArg,
        kind: &KeyKind,
        request: PageRequest,
    ) -> Result<Page<Value>, Error> {
        let key = key.to_arg();
        debug!(
            "Reading {} key {:?} from {:?}",
            kind,
            String::from_utf8_lossy(&key),
            request.token
        );
        readers::read(&mut self.session, &key, kind, request).await
    }

    /// First page of a key, using the configured page size.
    pub async fn read_first(&mut self, key: impl ToArg, kind: &KeyKind) -> Result<Page<Value>, Error> {
        let count = self.config.read_page_size;
        self.read(key, kind, PageRequest::first(count)).await
    }

    /// Number of keys in the selected database.
    pub async fn database_size(&mut self) -> Result<u64, Error> {
        let reply = reply_or_err(self.session.execute(Command::new("DBSIZE")).await?)?;
        reply
            .as_integer()
            .map(|n| n as u64)
            .ok_or_else(|| Error::Protocol(format!("DBSIZE returned a {} reply", reply.kind())))
    }

    pub async fn server_info(&mut self, section: Option<&str>) -> Result<ServerInfo, Error> {
        let mut cmd = Command::new("INFO");
        if let Some(section) = section {
            cmd = cmd.arg(section);
        }
        let reply = reply_or_err(self.session.execute(cmd).await?)?;
        let text = reply
            .as_bytes()
            .ok_or_else(|| Error::Protocol(format!("INFO returned a {} reply", reply.kind())))?;
        Ok(ServerInfo::parse(&String::from_utf8_lossy(text)))
    }

    /// Returns `true` when the key existed.
    pub async fn delete(&mut self, key: impl ToArg) -> Result<bool, Error> {
        let reply = reply_or_err(self.session.execute(Command::new("DEL").arg(key)).await?)?;
        Ok(reply.as_integer() == Some(1))
    }

    /// Sets a time to live. Sub-second durations use millisecond precision.
    /// Returns `false` when the key does not exist.
    pub async fn expire(&mut self, key: impl ToArg, ttl: Duration) -> Result<bool, Error> {
        let cmd = if ttl.subsec_millis() == 0 {
            Command::new("EXPIRE").arg(key).arg(ttl.as_secs())
        } else {
            Command::new("PEXPIRE").arg(key).arg(ttl.as_millis() as u64)
        };
        let reply = reply_or_err(self.session.execute(cmd).await?)?;
        Ok(reply.as_integer() == Some(1))
    }

    /// Removes the time to live. Returns `false` when the key had none or does not exist.
    pub async fn persist(&mut self, key: impl ToArg) -> Result<bool, Error> {
        let reply = reply_or_err(self.session.execute(Command::new("PERSIST").arg(key)).await?)?;
        Ok(reply.as_integer() == Some(1))
    }

    pub async fn set_string(&mut self, key: impl ToArg, value: impl ToArg) -> Result<(), Error> {
        let cmd = Command::new("SET").arg(key).arg(value);
        reply_or_err(self.session.execute(cmd).await?)?;
        Ok(())
    }
}

fn not_found(key: &[u8]) -> Error {
    Error::KeyNotFound(String::from_utf8_lossy(key).into_owned())
}

/// Converts error replies for a key-specific request. A WRONGTYPE error means the key was
/// replaced by a value of another type since it was described.
fn typed(key: &[u8], reply: Frame) -> Result<Frame, Error> {
    match reply {
        Frame::Error(msg) if msg.starts_with("WRONGTYPE") => Err(not_found(key)),
        Frame::Error(msg) => Err(Error::Reply(msg)),
        other => Ok(other),
    }
}

fn reply_or_err(reply: Frame) -> Result<Frame, Error> {
    match reply {
        Frame::Error(msg) => Err(Error::Reply(msg)),
        other => Ok(other),
    }
}
