//! An in-process server that speaks enough RESP2/RESP3 to drive the client end to end.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use glob_match::glob_match;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};

use redline::config::{ConnectionConfig, PoolConfig, SessionConfig};
use redline::{Endpoint, Frame, Pool, Protocol, Session};

pub const PASSWORD: &str = "s3cret";

#[derive(Debug, Clone, Default)]
pub struct MockOptions {
    /// Require AUTH (or HELLO ... AUTH) with this password.
    pub password: Option<String>,
    /// Answer HELLO like a server that predates RESP3.
    pub without_hello: bool,
}

#[derive(Debug, Clone)]
enum Entry {
    String(Bytes),
    List(Vec<Bytes>),
    Hash(Vec<(Bytes, Bytes)>),
    Set(Vec<Bytes>),
    ZSet(Vec<(Bytes, f64)>),
    Stream(Vec<(String, Vec<(Bytes, Bytes)>)>),
}

impl Entry {
    fn type_name(&self) -> &'static str {
        match self {
            Entry::String(_) => "string",
            Entry::List(_) => "list",
            Entry::Hash(_) => "hash",
            Entry::Set(_) => "set",
            Entry::ZSet(_) => "zset",
            Entry::Stream(_) => "stream",
        }
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: BTreeMap<Bytes, Entry>,
    /// Remaining time to live in milliseconds. The clock never advances.
    expires: HashMap<Bytes, i64>,
}

impl Keyspace {
    fn remove(&mut self, key: &Bytes) -> bool {
        self.expires.remove(key);
        self.entries.remove(key).is_some()
    }
}

struct Shared {
    options: MockOptions,
    databases: Mutex<HashMap<u32, Keyspace>>,
    accepted: AtomicUsize,
    reply_delay_ms: AtomicU64,
    commands: Mutex<Vec<String>>,
    subscribers: Mutex<HashMap<Bytes, usize>>,
    kill: watch::Sender<u64>,
    messages: broadcast::Sender<(Bytes, Bytes)>,
}

pub struct MockServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
}

impl MockServer {
    pub async fn start() -> MockServer {
        MockServer::with_options(MockOptions::default()).await
    }

    pub async fn with_options(options: MockOptions) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (kill, _) = watch::channel(0);
        let (messages, _) = broadcast::channel(64);
        let shared = Arc::new(Shared {
            options,
            databases: Mutex::new(HashMap::new()),
            accepted: AtomicUsize::new(0),
            reply_delay_ms: AtomicU64::new(0),
            commands: Mutex::new(Vec::new()),
            subscribers: Mutex::new(HashMap::new()),
            kill,
            messages,
        });

        let accept_shared = shared.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accept_shared.accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(socket, accept_shared.clone()));
            }
        });

        MockServer { addr, shared }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// An endpoint for this server, carrying the password when one is required.
    pub fn endpoint(&self) -> Endpoint {
        let endpoint = Endpoint::new("127.0.0.1", self.addr.port());
        match &self.shared.options.password {
            Some(password) => endpoint.with_password(password.as_str()),
            None => endpoint,
        }
    }

    /// Number of TCP connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    /// Delays every reply, to provoke client timeouts.
    pub fn set_reply_delay(&self, delay: Duration) {
        self.shared
            .reply_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Drops every open connection, the way a server restart would.
    pub fn kill_connections(&self) {
        self.shared.kill.send_modify(|generation| *generation += 1);
    }

    /// Upper-cased names of all commands received so far, in arrival order.
    pub fn commands(&self) -> Vec<String> {
        self.shared.commands.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.commands().iter().filter(|c| *c == name).count()
    }

    pub fn clear_commands(&self) {
        self.shared.commands.lock().unwrap().clear();
    }

    /// Publishes from outside any client connection.
    pub fn publish(&self, channel: &str, payload: &str) {
        let _ = self.shared.messages.send((
            Bytes::copy_from_slice(channel.as_bytes()),
            Bytes::copy_from_slice(payload.as_bytes()),
        ));
    }

    pub fn subscribers(&self, channel: &str) -> usize {
        self.shared
            .subscribers
            .lock()
            .unwrap()
            .get(channel.as_bytes())
            .copied()
            .unwrap_or(0)
    }

    pub fn set_string(&self, db: u32, key: &str, value: &[u8]) {
        self.insert(db, key, Entry::String(Bytes::copy_from_slice(value)));
    }

    pub fn set_list(&self, db: u32, key: &str, items: &[&str]) {
        self.insert(db, key, Entry::List(items.iter().map(|s| bytes(s)).collect()));
    }

    pub fn set_hash(&self, db: u32, key: &str, fields: &[(&str, &str)]) {
        let fields = fields.iter().map(|(f, v)| (bytes(f), bytes(v))).collect();
        self.insert(db, key, Entry::Hash(fields));
    }

    pub fn set_set(&self, db: u32, key: &str, members: &[&str]) {
        self.insert(db, key, Entry::Set(members.iter().map(|s| bytes(s)).collect()));
    }

    pub fn set_zset(&self, db: u32, key: &str, members: &[(&str, f64)]) {
        let mut members: Vec<(Bytes, f64)> =
            members.iter().map(|(m, s)| (bytes(m), *s)).collect();
        sort_zset(&mut members);
        self.insert(db, key, Entry::ZSet(members));
    }

    pub fn set_stream(&self, db: u32, key: &str, entries: &[(&str, &[(&str, &str)])]) {
        let entries = entries
            .iter()
            .map(|(id, fields)| {
                let fields = fields.iter().map(|(f, v)| (bytes(f), bytes(v))).collect();
                (id.to_string(), fields)
            })
            .collect();
        self.insert(db, key, Entry::Stream(entries));
    }

    pub fn set_ttl(&self, db: u32, key: &str, ttl: Duration) {
        let mut databases = self.shared.databases.lock().unwrap();
        databases
            .entry(db)
            .or_default()
            .expires
            .insert(bytes(key), ttl.as_millis() as i64);
    }

    pub fn string(&self, db: u32, key: &str) -> Option<Bytes> {
        let databases = self.shared.databases.lock().unwrap();
        match databases.get(&db)?.entries.get(key.as_bytes())? {
            Entry::String(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn key_count(&self, db: u32) -> usize {
        let databases = self.shared.databases.lock().unwrap();
        databases.get(&db).map_or(0, |ks| ks.entries.len())
    }

    fn insert(&self, db: u32, key: &str, entry: Entry) {
        let mut databases = self.shared.databases.lock().unwrap();
        let keyspace = databases.entry(db).or_default();
        keyspace.expires.remove(key.as_bytes());
        keyspace.entries.insert(bytes(key), entry);
    }
}

/// A pool with short timeouts, suitable for tests.
pub fn test_pool(max_size: usize) -> Pool {
    let pool = PoolConfig {
        max_size,
        acquire_timeout: Duration::from_millis(500),
        max_connect_attempts: 2,
        backoff_base: Duration::from_millis(10),
        backoff_max: Duration::from_millis(20),
        ..PoolConfig::default()
    };
    let connection = ConnectionConfig {
        connect_timeout: Duration::from_millis(500),
        command_timeout: Duration::from_millis(500),
        ..ConnectionConfig::default()
    };
    Pool::new(pool, connection)
}

pub fn test_session(server: &MockServer, protocol: Protocol) -> Session {
    let endpoint = server.endpoint().with_protocol(protocol);
    Session::new(test_pool(4), endpoint, SessionConfig::default())
}

pub fn bytes(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}

struct Client {
    resp3: bool,
    db: u32,
    authed: bool,
    multi: Option<Vec<Vec<Bytes>>>,
    multi_failed: bool,
    channels: HashSet<Bytes>,
    quit: bool,
}

async fn serve(mut socket: TcpStream, shared: Arc<Shared>) {
    let mut kill = shared.kill.subscribe();
    let mut messages: Option<broadcast::Receiver<(Bytes, Bytes)>> = None;
    let mut buf = BytesMut::with_capacity(4096);
    let mut client = Client {
        resp3: false,
        db: 0,
        authed: shared.options.password.is_none(),
        multi: None,
        multi_failed: false,
        channels: HashSet::new(),
        quit: false,
    };

    'conn: loop {
        while let Some(args) = next_command(&mut buf) {
            let delay = shared.reply_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let replies = execute(&shared, &mut client, args);
            if client.channels.is_empty() {
                messages = None;
            } else if messages.is_none() {
                messages = Some(shared.messages.subscribe());
            }

            let mut out = Vec::new();
            for reply in &replies {
                encode(reply, client.resp3, &mut out);
            }
            if socket.write_all(&out).await.is_err() || client.quit {
                break 'conn;
            }
        }

        tokio::select! {
            read = socket.read_buf(&mut buf) => match read {
                Ok(0) | Err(_) => break 'conn,
                Ok(_) => {}
            },
            _ = kill.changed() => break 'conn,
            published = next_published(&mut messages) => {
                if let Some((channel, payload)) = published {
                    if client.channels.contains(&channel) {
                        let message = push(vec![
                            bulk_str("message"),
                            Frame::Bulk(channel),
                            Frame::Bulk(payload),
                        ]);
                        let mut out = Vec::new();
                        encode(&message, client.resp3, &mut out);
                        if socket.write_all(&out).await.is_err() {
                            break 'conn;
                        }
                    }
                }
            }
        }
    }

    let mut subscribers = shared.subscribers.lock().unwrap();
    for channel in &client.channels {
        if let Some(count) = subscribers.get_mut(channel) {
            *count = count.saturating_sub(1);
        }
    }
}

async fn next_published(
    messages: &mut Option<broadcast::Receiver<(Bytes, Bytes)>>,
) -> Option<(Bytes, Bytes)> {
    let Some(rx) = messages.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(message) => return Some(message),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

fn next_command(buf: &mut BytesMut) -> Option<Vec<Bytes>> {
    let (frame, len) = {
        let mut cursor = Cursor::new(&buf[..]);
        let frame = Frame::parse(&mut cursor, Protocol::Resp2).ok()?;
        (frame, cursor.position() as usize)
    };
    buf.advance(len);

    let args = frame
        .into_elements()?
        .into_iter()
        .filter_map(|f| f.as_bytes().map(Bytes::copy_from_slice))
        .collect();
    Some(args)
}

/// Writes a reply the way a server speaking the client's protocol would.
pub fn encode(frame: &Frame, resp3: bool, out: &mut Vec<u8>) {
    if resp3 {
        frame.write_to(out);
        return;
    }
    match frame {
        Frame::Null => out.extend_from_slice(b"$-1\r\n"),
        Frame::Double(d) => encode(&Frame::Bulk(Bytes::from(d.to_string())), false, out),
        Frame::Boolean(b) => encode(&Frame::Integer(*b as i64), false, out),
        Frame::BigNumber(n) => encode(&Frame::Bulk(Bytes::from(n.clone())), false, out),
        Frame::Verbatim { text, .. } => encode(&Frame::Bulk(text.clone()), false, out),
        Frame::Map(pairs) => {
            out.extend_from_slice(format!("*{}\r\n", pairs.len() * 2).as_bytes());
            for (key, value) in pairs {
                encode(key, false, out);
                encode(value, false, out);
            }
        }
        Frame::Array(items) | Frame::Set(items) | Frame::Push(items) => {
            out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
            for item in items {
                encode(item, false, out);
            }
        }
        other => other.write_to(out),
    }
}

fn execute(shared: &Shared, client: &mut Client, args: Vec<Bytes>) -> Vec<Frame> {
    let Some(name) = args.first() else {
        return vec![error("ERR empty command")];
    };
    let name = String::from_utf8_lossy(name).to_ascii_uppercase();
    shared.commands.lock().unwrap().push(name.clone());
    let rest = &args[1..];

    match name.as_str() {
        "HELLO" => return vec![hello(shared, client, rest)],
        "AUTH" => return vec![auth(shared, client, rest)],
        "QUIT" => {
            client.quit = true;
            return vec![ok()];
        }
        _ => {}
    }

    if !client.authed {
        return vec![error("NOAUTH Authentication required.")];
    }

    match name.as_str() {
        "SUBSCRIBE" => return subscribe(shared, client, rest),
        "UNSUBSCRIBE" => return unsubscribe(shared, client, rest),
        // RESP3 clients may run any command while subscribed.
        "PING" if !client.channels.is_empty() && !client.resp3 => {
            return vec![push(vec![bulk_str("pong"), bulk_str("")])]
        }
        _ if !client.channels.is_empty() && !client.resp3 => {
            return vec![error(&format!(
                "ERR Can't execute '{}': only (P|S)SUBSCRIBE / (P|S)UNSUBSCRIBE / PING / QUIT / RESET are allowed in this context",
                name.to_ascii_lowercase()
            ))]
        }
        "MULTI" if client.multi.is_some() => return vec![error("ERR MULTI calls can not be nested")],
        "MULTI" => {
            client.multi = Some(Vec::new());
            client.multi_failed = false;
            return vec![ok()];
        }
        "EXEC" => {
            let Some(queued) = client.multi.take() else {
                return vec![error("ERR EXEC without MULTI")];
            };
            if client.multi_failed {
                return vec![error(
                    "EXECABORT Transaction discarded because of previous errors.",
                )];
            }
            let results = queued
                .into_iter()
                .map(|cmd| {
                    let name = String::from_utf8_lossy(&cmd[0]).to_ascii_uppercase();
                    run(shared, client, &name, &cmd[1..])
                })
                .collect();
            return vec![Frame::Array(results)];
        }
        "DISCARD" => {
            return match client.multi.take() {
                Some(_) => vec![ok()],
                None => vec![error("ERR DISCARD without MULTI")],
            }
        }
        _ => {}
    }

    if let Some(queue) = client.multi.as_mut() {
        if !KNOWN.contains(&name.as_str()) {
            client.multi_failed = true;
            return vec![unknown(&name, rest)];
        }
        queue.push(args);
        return vec![Frame::Simple("QUEUED".into())];
    }

    vec![run(shared, client, &name, rest)]
}

const KNOWN: &[&str] = &[
    "PING", "ECHO", "CLIENT", "SELECT", "DBSIZE", "FLUSHDB", "INFO", "GET", "SET", "STRLEN",
    "INCR", "DEL", "EXISTS", "TYPE", "TTL", "PTTL", "EXPIRE", "PEXPIRE", "PERSIST", "RPUSH",
    "LLEN", "LRANGE", "HSET", "HGET", "HLEN", "HGETALL", "HSCAN", "SADD", "SCARD", "SMEMBERS",
    "SSCAN", "ZADD", "ZCARD", "ZRANGE", "XADD", "XLEN", "XRANGE", "SCAN", "PUBLISH",
];

fn hello(shared: &Shared, client: &mut Client, args: &[Bytes]) -> Frame {
    if shared.options.without_hello {
        return unknown("HELLO", args);
    }

    let version = match args.first().map(|v| text(v)) {
        None => {
            if client.resp3 {
                3
            } else {
                2
            }
        }
        Some(v) => match v.parse::<i64>() {
            Ok(v @ (2 | 3)) => v,
            Ok(_) => return error("NOPROTO unsupported protocol version"),
            Err(_) => return error("ERR Protocol version is not an integer or out of range"),
        },
    };

    let mut i = 1;
    while i < args.len() {
        match text(&args[i]).to_ascii_uppercase().as_str() {
            "AUTH" if i + 2 < args.len() => {
                let password = text(&args[i + 2]);
                if shared.options.password.as_deref() != Some(password.as_str()) {
                    return error(
                        "WRONGPASS invalid username-password pair or user is disabled.",
                    );
                }
                client.authed = true;
                i += 3;
            }
            "SETNAME" if i + 1 < args.len() => i += 2,
            _ => return error("ERR Syntax error in HELLO option"),
        }
    }

    if !client.authed {
        return error("NOAUTH HELLO must be called with the client already authenticated, otherwise the HELLO <proto> AUTH <user> <pass> option can be used to authenticate the client and select the RESP protocol version at the same time");
    }

    client.resp3 = version == 3;
    Frame::Map(vec![
        (bulk_str("server"), bulk_str("redis")),
        (bulk_str("version"), bulk_str("7.2.4")),
        (bulk_str("proto"), Frame::Integer(version)),
        (bulk_str("id"), Frame::Integer(7)),
        (bulk_str("mode"), bulk_str("standalone")),
        (bulk_str("role"), bulk_str("master")),
        (bulk_str("modules"), Frame::Array(vec![])),
    ])
}

fn auth(shared: &Shared, client: &mut Client, args: &[Bytes]) -> Frame {
    let Some(password) = args.last().map(|p| text(p)) else {
        return arity("auth");
    };
    match &shared.options.password {
        None => error("ERR AUTH <password> called without any password configured for the default user. Are you sure your configuration is correct?"),
        Some(expected) if *expected == password => {
            client.authed = true;
            ok()
        }
        Some(_) => error("WRONGPASS invalid username-password pair or user is disabled."),
    }
}

fn subscribe(shared: &Shared, client: &mut Client, channels: &[Bytes]) -> Vec<Frame> {
    if channels.is_empty() {
        return vec![arity("subscribe")];
    }
    let mut subscribers = shared.subscribers.lock().unwrap();
    channels
        .iter()
        .map(|channel| {
            if client.channels.insert(channel.clone()) {
                *subscribers.entry(channel.clone()).or_default() += 1;
            }
            push(vec![
                bulk_str("subscribe"),
                Frame::Bulk(channel.clone()),
                Frame::Integer(client.channels.len() as i64),
            ])
        })
        .collect()
}

fn unsubscribe(shared: &Shared, client: &mut Client, channels: &[Bytes]) -> Vec<Frame> {
    let channels: Vec<Bytes> = if channels.is_empty() {
        client.channels.iter().cloned().collect()
    } else {
        channels.to_vec()
    };
    if channels.is_empty() {
        return vec![push(vec![
            bulk_str("unsubscribe"),
            Frame::Null,
            Frame::Integer(0),
        ])];
    }

    let mut subscribers = shared.subscribers.lock().unwrap();
    channels
        .into_iter()
        .map(|channel| {
            if client.channels.remove(&channel) {
                if let Some(count) = subscribers.get_mut(&channel) {
                    *count = count.saturating_sub(1);
                }
            }
            push(vec![
                bulk_str("unsubscribe"),
                Frame::Bulk(channel),
                Frame::Integer(client.channels.len() as i64),
            ])
        })
        .collect()
}

fn run(shared: &Shared, client: &mut Client, name: &str, args: &[Bytes]) -> Frame {
    match dispatch(shared, client, name, args) {
        Ok(frame) | Err(frame) => frame,
    }
}

fn dispatch(shared: &Shared, client: &mut Client, name: &str, args: &[Bytes]) -> Result<Frame, Frame> {
    let lower = name.to_ascii_lowercase();
    let arg = |i: usize| args.get(i).cloned().ok_or_else(|| arity(&lower));
    let int = |i: usize| -> Result<i64, Frame> {
        let value = args.get(i).ok_or_else(|| arity(&lower))?;
        text(value)
            .parse::<i64>()
            .map_err(|_| error("ERR value is not an integer or out of range"))
    };

    match name {
        "PING" => {
            return Ok(match args.first() {
                Some(message) => Frame::Bulk(message.clone()),
                None => Frame::Simple("PONG".into()),
            })
        }
        "ECHO" => return Ok(Frame::Bulk(arg(0)?)),
        "CLIENT" => return Ok(ok()),
        "SELECT" => {
            let db = int(0)?;
            if !(0..16).contains(&db) {
                return Err(error("ERR DB index is out of range"));
            }
            client.db = db as u32;
            return Ok(ok());
        }
        "PUBLISH" => {
            let channel = arg(0)?;
            let payload = arg(1)?;
            let receivers = shared
                .subscribers
                .lock()
                .unwrap()
                .get(&channel)
                .copied()
                .unwrap_or(0);
            let _ = shared.messages.send((channel, payload));
            return Ok(Frame::Integer(receivers as i64));
        }
        _ => {}
    }

    let mut databases = shared.databases.lock().unwrap();
    let ks = databases.entry(client.db).or_default();

    match name {
        "DBSIZE" => Ok(Frame::Integer(ks.entries.len() as i64)),
        "FLUSHDB" => {
            ks.entries.clear();
            ks.expires.clear();
            Ok(ok())
        }
        "INFO" => {
            let keyspace = format!(
                "db{}:keys={},expires={},avg_ttl=0",
                client.db,
                ks.entries.len(),
                ks.expires.len()
            );
            let sections = [
                ("Server", "redis_version:7.2.4\r\nredis_mode:standalone\r\ntcp_port:6379".to_string()),
                ("Clients", "connected_clients:1".to_string()),
                ("Keyspace", keyspace),
            ];
            let wanted = args.first().map(|s| text(s).to_ascii_lowercase());
            let body = sections
                .iter()
                .filter(|(title, _)| match &wanted {
                    Some(w) => w == "all" || w == "everything" || title.eq_ignore_ascii_case(w),
                    None => true,
                })
                .map(|(title, body)| format!("# {}\r\n{}\r\n", title, body))
                .collect::<Vec<_>>()
                .join("\r\n");
            Ok(Frame::Verbatim {
                format: "txt".into(),
                text: Bytes::from(body),
            })
        }
        "GET" => match ks.entries.get(&arg(0)?) {
            None => Ok(Frame::Null),
            Some(Entry::String(value)) => Ok(Frame::Bulk(value.clone())),
            Some(_) => Err(wrongtype()),
        },
        "SET" => {
            let key = arg(0)?;
            let value = arg(1)?;
            ks.expires.remove(&key);
            ks.entries.insert(key.clone(), Entry::String(value));
            if args.get(2).map(|o| text(o).to_ascii_uppercase()).as_deref() == Some("EX") {
                ks.expires.insert(key, int(3)? * 1000);
            }
            Ok(ok())
        }
        "STRLEN" => match ks.entries.get(&arg(0)?) {
            None => Ok(Frame::Integer(0)),
            Some(Entry::String(value)) => Ok(Frame::Integer(value.len() as i64)),
            Some(_) => Err(wrongtype()),
        },
        "INCR" => {
            let key = arg(0)?;
            let current = match ks.entries.get(&key) {
                None => 0,
                Some(Entry::String(value)) => text(value)
                    .parse::<i64>()
                    .map_err(|_| error("ERR value is not an integer or out of range"))?,
                Some(_) => return Err(wrongtype()),
            };
            ks.entries
                .insert(key, Entry::String(Bytes::from((current + 1).to_string())));
            Ok(Frame::Integer(current + 1))
        }
        "DEL" => {
            let removed = args.iter().filter(|key| ks.remove(key)).count();
            Ok(Frame::Integer(removed as i64))
        }
        "EXISTS" => {
            let found = args.iter().filter(|key| ks.entries.contains_key(*key)).count();
            Ok(Frame::Integer(found as i64))
        }
        "TYPE" => Ok(Frame::Simple(
            ks.entries
                .get(&arg(0)?)
                .map_or("none", Entry::type_name)
                .to_string(),
        )),
        "TTL" | "PTTL" => {
            let key = arg(0)?;
            let millis = if !ks.entries.contains_key(&key) {
                return Ok(Frame::Integer(-2));
            } else {
                match ks.expires.get(&key) {
                    None => return Ok(Frame::Integer(-1)),
                    Some(ms) => *ms,
                }
            };
            Ok(Frame::Integer(if name == "TTL" {
                (millis + 999) / 1000
            } else {
                millis
            }))
        }
        "EXPIRE" | "PEXPIRE" => {
            let key = arg(0)?;
            let amount = int(1)?;
            if !ks.entries.contains_key(&key) {
                return Ok(Frame::Integer(0));
            }
            let millis = if name == "EXPIRE" { amount * 1000 } else { amount };
            ks.expires.insert(key, millis);
            Ok(Frame::Integer(1))
        }
        "PERSIST" => Ok(Frame::Integer(ks.expires.remove(&arg(0)?).is_some() as i64)),
        "RPUSH" => {
            let key = arg(0)?;
            let items = args.get(1..).filter(|i| !i.is_empty()).ok_or_else(|| arity(&lower))?;
            match ks.entries.entry(key).or_insert_with(|| Entry::List(Vec::new())) {
                Entry::List(list) => {
                    list.extend(items.iter().cloned());
                    Ok(Frame::Integer(list.len() as i64))
                }
                _ => Err(wrongtype()),
            }
        }
        "LLEN" => match ks.entries.get(&arg(0)?) {
            None => Ok(Frame::Integer(0)),
            Some(Entry::List(list)) => Ok(Frame::Integer(list.len() as i64)),
            Some(_) => Err(wrongtype()),
        },
        "LRANGE" => match ks.entries.get(&arg(0)?) {
            None => Ok(Frame::Array(vec![])),
            Some(Entry::List(list)) => {
                let range = index_range(list.len(), int(1)?, int(2)?);
                Ok(Frame::Array(list[range].iter().cloned().map(Frame::Bulk).collect()))
            }
            Some(_) => Err(wrongtype()),
        },
        "HSET" => {
            let key = arg(0)?;
            let pairs = args.get(1..).unwrap_or_default();
            if pairs.is_empty() || pairs.len() % 2 != 0 {
                return Err(arity(&lower));
            }
            match ks.entries.entry(key).or_insert_with(|| Entry::Hash(Vec::new())) {
                Entry::Hash(fields) => {
                    let mut added = 0;
                    for pair in pairs.chunks(2) {
                        match fields.iter_mut().find(|(f, _)| *f == pair[0]) {
                            Some(existing) => existing.1 = pair[1].clone(),
                            None => {
                                fields.push((pair[0].clone(), pair[1].clone()));
                                added += 1;
                            }
                        }
                    }
                    Ok(Frame::Integer(added))
                }
                _ => Err(wrongtype()),
            }
        }
        "HGET" => match ks.entries.get(&arg(0)?) {
            None => Ok(Frame::Null),
            Some(Entry::Hash(fields)) => {
                let field = arg(1)?;
                Ok(fields
                    .iter()
                    .find(|(f, _)| *f == field)
                    .map_or(Frame::Null, |(_, v)| Frame::Bulk(v.clone())))
            }
            Some(_) => Err(wrongtype()),
        },
        "HLEN" => match ks.entries.get(&arg(0)?) {
            None => Ok(Frame::Integer(0)),
            Some(Entry::Hash(fields)) => Ok(Frame::Integer(fields.len() as i64)),
            Some(_) => Err(wrongtype()),
        },
        "HGETALL" => match ks.entries.get(&arg(0)?) {
            None => Ok(Frame::Map(vec![])),
            Some(Entry::Hash(fields)) => Ok(Frame::Map(
                fields
                    .iter()
                    .map(|(f, v)| (Frame::Bulk(f.clone()), Frame::Bulk(v.clone())))
                    .collect(),
            )),
            Some(_) => Err(wrongtype()),
        },
        "HSCAN" => {
            let fields = match ks.entries.get(&arg(0)?) {
                None => Vec::new(),
                Some(Entry::Hash(fields)) => fields.clone(),
                Some(_) => return Err(wrongtype()),
            };
            let options = ScanOptions::parse(&args[1..], &lower)?;
            let (next, page) = options.page(&fields, |(field, _)| field);
            let items = page
                .into_iter()
                .flat_map(|(f, v)| [Frame::Bulk(f), Frame::Bulk(v)])
                .collect();
            Ok(scan_reply(next, items))
        }
        "SADD" => {
            let key = arg(0)?;
            match ks.entries.entry(key).or_insert_with(|| Entry::Set(Vec::new())) {
                Entry::Set(members) => {
                    let mut added = 0;
                    for member in &args[1..] {
                        if !members.contains(member) {
                            members.push(member.clone());
                            added += 1;
                        }
                    }
                    Ok(Frame::Integer(added))
                }
                _ => Err(wrongtype()),
            }
        }
        "SCARD" => match ks.entries.get(&arg(0)?) {
            None => Ok(Frame::Integer(0)),
            Some(Entry::Set(members)) => Ok(Frame::Integer(members.len() as i64)),
            Some(_) => Err(wrongtype()),
        },
        "SMEMBERS" => match ks.entries.get(&arg(0)?) {
            None => Ok(Frame::Set(vec![])),
            Some(Entry::Set(members)) => {
                Ok(Frame::Set(members.iter().cloned().map(Frame::Bulk).collect()))
            }
            Some(_) => Err(wrongtype()),
        },
        "SSCAN" => {
            let members = match ks.entries.get(&arg(0)?) {
                None => Vec::new(),
                Some(Entry::Set(members)) => members.clone(),
                Some(_) => return Err(wrongtype()),
            };
            let options = ScanOptions::parse(&args[1..], &lower)?;
            let (next, page) = options.page(&members, |member| member);
            Ok(scan_reply(next, page.into_iter().map(Frame::Bulk).collect()))
        }
        "ZADD" => {
            let key = arg(0)?;
            let pairs = &args[1..];
            if pairs.is_empty() || pairs.len() % 2 != 0 {
                return Err(arity(&lower));
            }
            match ks.entries.entry(key).or_insert_with(|| Entry::ZSet(Vec::new())) {
                Entry::ZSet(members) => {
                    let mut added = 0;
                    for pair in pairs.chunks(2) {
                        let score: f64 = text(&pair[0])
                            .parse()
                            .map_err(|_| error("ERR value is not a valid float"))?;
                        match members.iter_mut().find(|(m, _)| *m == pair[1]) {
                            Some(existing) => existing.1 = score,
                            None => {
                                members.push((pair[1].clone(), score));
                                added += 1;
                            }
                        }
                    }
                    sort_zset(members);
                    Ok(Frame::Integer(added))
                }
                _ => Err(wrongtype()),
            }
        }
        "ZCARD" => match ks.entries.get(&arg(0)?) {
            None => Ok(Frame::Integer(0)),
            Some(Entry::ZSet(members)) => Ok(Frame::Integer(members.len() as i64)),
            Some(_) => Err(wrongtype()),
        },
        "ZRANGE" => {
            let members = match ks.entries.get(&arg(0)?) {
                None => return Ok(Frame::Array(vec![])),
                Some(Entry::ZSet(members)) => members,
                Some(_) => return Err(wrongtype()),
            };
            let range = index_range(members.len(), int(1)?, int(2)?);
            let with_scores = args
                .get(3)
                .is_some_and(|o| text(o).eq_ignore_ascii_case("WITHSCORES"));
            let page = &members[range];
            let items = if !with_scores {
                page.iter().map(|(m, _)| Frame::Bulk(m.clone())).collect()
            } else if client.resp3 {
                page.iter()
                    .map(|(m, s)| Frame::Array(vec![Frame::Bulk(m.clone()), Frame::Double(*s)]))
                    .collect()
            } else {
                page.iter()
                    .flat_map(|(m, s)| [Frame::Bulk(m.clone()), Frame::Double(*s)])
                    .collect()
            };
            Ok(Frame::Array(items))
        }
        "XADD" => {
            let key = arg(0)?;
            let id = text(&arg(1)?);
            let fields = &args[2..];
            if fields.is_empty() || fields.len() % 2 != 0 {
                return Err(arity(&lower));
            }
            match ks.entries.entry(key).or_insert_with(|| Entry::Stream(Vec::new())) {
                Entry::Stream(entries) => {
                    let id = if id == "*" {
                        let last = entries.last().and_then(|(id, _)| parse_id(id)).unwrap_or((0, 0));
                        format!("{}-0", last.0 + 1)
                    } else {
                        id
                    };
                    let fields = fields
                        .chunks(2)
                        .map(|pair| (pair[0].clone(), pair[1].clone()))
                        .collect();
                    entries.push((id.clone(), fields));
                    Ok(Frame::Bulk(Bytes::from(id)))
                }
                _ => Err(wrongtype()),
            }
        }
        "XLEN" => match ks.entries.get(&arg(0)?) {
            None => Ok(Frame::Integer(0)),
            Some(Entry::Stream(entries)) => Ok(Frame::Integer(entries.len() as i64)),
            Some(_) => Err(wrongtype()),
        },
        "XRANGE" => {
            let entries = match ks.entries.get(&arg(0)?) {
                None => return Ok(Frame::Array(vec![])),
                Some(Entry::Stream(entries)) => entries,
                Some(_) => return Err(wrongtype()),
            };
            let start = text(&arg(1)?);
            let end = text(&arg(2)?);
            let count = match args.get(3) {
                Some(option) if text(option).eq_ignore_ascii_case("COUNT") => int(4)? as usize,
                _ => usize::MAX,
            };
            let items = entries
                .iter()
                .filter(|(id, _)| in_stream_range(id, &start, &end))
                .take(count)
                .map(|(id, fields)| {
                    Frame::Array(vec![
                        bulk_str(id),
                        Frame::Array(
                            fields
                                .iter()
                                .flat_map(|(f, v)| [Frame::Bulk(f.clone()), Frame::Bulk(v.clone())])
                                .collect(),
                        ),
                    ])
                })
                .collect();
            Ok(Frame::Array(items))
        }
        "SCAN" => {
            let options = ScanOptions::parse(args, &lower)?;
            let keys: Vec<Bytes> = ks
                .entries
                .iter()
                .filter(|(_, entry)| {
                    options
                        .kind
                        .as_deref()
                        .map_or(true, |kind| entry.type_name().eq_ignore_ascii_case(kind))
                })
                .map(|(key, _)| key.clone())
                .collect();
            let (next, page) = options.page(&keys, |key| key);
            Ok(scan_reply(next, page.into_iter().map(Frame::Bulk).collect()))
        }
        _ => Err(unknown(name, args)),
    }
}

struct ScanOptions {
    cursor: usize,
    pattern: Option<String>,
    count: usize,
    kind: Option<String>,
}

impl ScanOptions {
    fn parse(args: &[Bytes], command: &str) -> Result<ScanOptions, Frame> {
        let cursor = args
            .first()
            .ok_or_else(|| arity(command))
            .and_then(|c| text(c).parse::<usize>().map_err(|_| error("ERR invalid cursor")))?;
        let mut options = ScanOptions {
            cursor,
            pattern: None,
            count: 10,
            kind: None,
        };

        for pair in args[1..].chunks(2) {
            let [option, value] = pair else {
                return Err(error("ERR syntax error"));
            };
            match text(option).to_ascii_uppercase().as_str() {
                "MATCH" => options.pattern = Some(text(value)),
                "COUNT" => {
                    options.count = text(value)
                        .parse::<usize>()
                        .ok()
                        .filter(|c| *c > 0)
                        .ok_or_else(|| error("ERR syntax error"))?
                }
                "TYPE" => options.kind = Some(text(value)),
                _ => return Err(error("ERR syntax error")),
            }
        }
        Ok(options)
    }

    /// One page starting at the cursor. Like Redis, MATCH filters after the page is cut,
    /// so pages may come back empty before the iteration ends.
    fn page<T: Clone>(&self, items: &[T], key: impl Fn(&T) -> &Bytes) -> (usize, Vec<T>) {
        let start = self.cursor.min(items.len());
        let end = (start + self.count).min(items.len());
        let next = if end >= items.len() { 0 } else { end };
        let page = items[start..end]
            .iter()
            .filter(|item| match &self.pattern {
                Some(pattern) => glob_match(pattern, &String::from_utf8_lossy(key(item))),
                None => true,
            })
            .cloned()
            .collect();
        (next, page)
    }
}

fn scan_reply(cursor: usize, items: Vec<Frame>) -> Frame {
    Frame::Array(vec![
        Frame::Bulk(Bytes::from(cursor.to_string())),
        Frame::Array(items),
    ])
}

fn index_range(len: usize, start: i64, stop: i64) -> std::ops::Range<usize> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return 0..0;
    }
    start as usize..stop as usize + 1
}

fn sort_zset(members: &mut [(Bytes, f64)]) {
    members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
}

fn parse_id(id: &str) -> Option<(u64, u64)> {
    let (ms, seq) = id.split_once('-').unwrap_or((id, "0"));
    Some((ms.parse().ok()?, seq.parse().ok()?))
}

fn in_stream_range(id: &str, start: &str, end: &str) -> bool {
    let Some(id) = parse_id(id) else {
        return false;
    };
    let lower_ok = match start {
        "-" => true,
        s => match s.strip_prefix('(') {
            Some(s) => parse_id(s).is_some_and(|s| id > s),
            None => parse_id(s).is_some_and(|s| id >= s),
        },
    };
    let upper_ok = match end {
        "+" => true,
        e => match e.strip_prefix('(') {
            Some(e) => parse_id(e).is_some_and(|e| id < e),
            None => parse_id(e).is_some_and(|e| id <= e),
        },
    };
    lower_ok && upper_ok
}

fn text(bytes: &Bytes) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn ok() -> Frame {
    Frame::Simple("OK".into())
}

fn error(msg: &str) -> Frame {
    Frame::Error(msg.to_string())
}

fn wrongtype() -> Frame {
    error("WRONGTYPE Operation against a key holding the wrong kind of value")
}

fn arity(command: &str) -> Frame {
    error(&format!(
        "ERR wrong number of arguments for '{}' command",
        command
    ))
}

fn unknown(name: &str, args: &[Bytes]) -> Frame {
    let beginning = args
        .iter()
        .map(|a| format!("'{}'", text(a)))
        .collect::<Vec<_>>()
        .join(" ");
    error(&format!(
        "ERR unknown command '{}', with args beginning with: {}",
        name.to_ascii_lowercase(),
        beginning
    ))
}

fn bulk_str(s: &str) -> Frame {
    Frame::Bulk(Bytes::copy_from_slice(s.as_bytes()))
}

fn push(items: Vec<Frame>) -> Frame {
    Frame::Push(items)
}
