use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_util::codec::Decoder;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::codec::FrameCodec;
use crate::command::{Command, TransactionControl};
use crate::config::ConnectionConfig;
use crate::endpoint::{Endpoint, TlsMode};
use crate::error::{ConnectionErrorKind, Error};
use crate::frame::{Frame, Protocol};
use crate::tls;

/// Health as last observed by a command or a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Health {
    Healthy,
    /// The server answered the last probe with an error reply.
    Degraded,
    /// The transport failed or was closed. Terminal.
    Dead,
}

enum Stream {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_flush(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// One socket to one server.
///
/// A connection is used by a single task at a time: every operation takes `&mut self`.
pub struct Connection {
    id: Uuid,
    endpoint: Arc<Endpoint>,
    stream: BufWriter<Stream>,
    // Data is read from the socket into the read buffer. When a frame is parsed, the corresponding
    // data is removed from the buffer.
    buffer: BytesMut,
    codec: FrameCodec,
    health: Health,
    authenticated: bool,
    database: u32,
    command_timeout: Duration,
    created_at: Instant,
    last_used: Instant,
    // Set while a request is between write and reply. Still set afterwards means the
    // request future was dropped and the reply stream is out of sync.
    in_flight: bool,
    in_transaction: bool,
    subscribed: bool,
    server_version: Option<String>,
}

impl Connection {
    /// Wraps an already connected stream with default settings and no handshake.
    pub fn new(stream: TcpStream) -> Connection {
        let endpoint = match stream.peer_addr() {
            Ok(addr) => Endpoint::new(addr.ip().to_string(), addr.port()),
            Err(_) => Endpoint::default(),
        };
        Connection::from_stream(
            stream,
            Arc::new(endpoint),
            Protocol::default(),
            &ConnectionConfig::default(),
        )
    }

    /// Wraps an already connected stream speaking `protocol`. No handshake is performed.
    pub fn from_stream(
        stream: TcpStream,
        endpoint: Arc<Endpoint>,
        protocol: Protocol,
        config: &ConnectionConfig,
    ) -> Connection {
        Connection::build(Stream::Tcp(stream), endpoint, protocol, config)
    }

    fn build(
        stream: Stream,
        endpoint: Arc<Endpoint>,
        protocol: Protocol,
        config: &ConnectionConfig,
    ) -> Connection {
        let now = Instant::now();
        Connection {
            id: Uuid::new_v4(),
            endpoint,
            stream: BufWriter::new(stream),
            // Allocate the buffer with 4kb of capacity.
            buffer: BytesMut::with_capacity(4096),
            codec: FrameCodec::new(protocol, config.max_frame_size),
            health: Health::Healthy,
            authenticated: false,
            database: 0,
            command_timeout: config.command_timeout,
            created_at: now,
            last_used: now,
            in_flight: false,
            in_transaction: false,
            subscribed: false,
            server_version: None,
        }
    }

    /// Connects, negotiates TLS and runs the handshake.
    #[instrument(
        name = "connect",
        skip(endpoint, config),
        fields(endpoint = %endpoint, connection_id)
    )]
    pub async fn open(endpoint: Arc<Endpoint>, config: &ConnectionConfig) -> Result<Connection, Error> {
        let address = endpoint.address();
        let tcp = timeout(config.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| {
                Error::connection(
                    ConnectionErrorKind::Timeout,
                    format!("connecting to {} timed out", address),
                )
            })?
            .map_err(transport)?;

        tcp.set_nodelay(true).map_err(transport)?;
        if let Some(idle) = config.keepalive {
            let keepalive = TcpKeepalive::new().with_time(idle);
            if let Err(e) = SockRef::from(&tcp).set_tcp_keepalive(&keepalive) {
                warn!("Failed to enable TCP keep-alive: {}", e);
            }
        }

        let stream = match &endpoint.tls {
            TlsMode::Disabled => Stream::Tcp(tcp),
            TlsMode::Enabled(verification) => {
                debug!("Starting TLS handshake with {}", address);
                let connector = tls::connector(verification)?;
                let name = tls::server_name(&endpoint.host)?;
                let tls_stream = timeout(config.connect_timeout, connector.connect(name, tcp))
                    .await
                    .map_err(|_| {
                        Error::connection(ConnectionErrorKind::Timeout, "TLS handshake timed out")
                    })?
                    .map_err(|e| {
                        Error::connection(
                            ConnectionErrorKind::Tls,
                            format!("TLS handshake failed: {}", e),
                        )
                    })?;
                Stream::Tls(Box::new(tls_stream))
            }
        };

        let protocol = endpoint.protocol;
        let mut conn = Connection::build(stream, endpoint, protocol, config);
        tracing::Span::current().record("connection_id", conn.id.to_string());

        if let Err(e) = conn.handshake(config.client_name.as_deref()).await {
            conn.close().await;
            return Err(e);
        }

        info!(
            "Connected using {}, database {}",
            conn.protocol(),
            conn.database
        );
        Ok(conn)
    }

    async fn handshake(&mut self, client_name: Option<&str>) -> Result<(), Error> {
        let endpoint = self.endpoint.clone();

        let negotiated = if endpoint.protocol == Protocol::Resp3 {
            self.hello(client_name).await?
        } else {
            false
        };

        if !negotiated {
            self.codec.set_protocol(Protocol::Resp2);
            self.legacy_handshake(client_name).await?;
        } else if endpoint.database != 0 {
            self.select(endpoint.database).await?;
        }

        Ok(())
    }

    /// Returns `false` when the server does not speak RESP3 and the legacy handshake is needed.
    async fn hello(&mut self, client_name: Option<&str>) -> Result<bool, Error> {
        let endpoint = self.endpoint.clone();
        let mut hello = Command::new("HELLO").arg(3);
        if let Some(password) = &endpoint.password {
            let username = endpoint.username.as_deref().unwrap_or("default");
            hello = hello.arg("AUTH").arg(username).arg(password.as_str());
        }
        if let Some(name) = client_name {
            hello = hello.arg("SETNAME").arg(name);
        }

        self.codec.set_protocol(Protocol::Resp3);
        match self.send(&hello).await? {
            Frame::Error(msg) if is_auth_failure(&msg) => Err(Error::Auth(msg)),
            Frame::Error(msg) if msg.starts_with("NOPROTO") || is_unknown_command(&msg) => {
                debug!("Server refused HELLO 3 ({}), falling back to RESP2", msg);
                Ok(false)
            }
            Frame::Error(msg) => Err(Error::Reply(msg)),
            reply => {
                self.authenticated = endpoint.password.is_some();
                self.server_version = hello_field(&reply, "version");
                Ok(true)
            }
        }
    }

    async fn legacy_handshake(&mut self, client_name: Option<&str>) -> Result<(), Error> {
        let endpoint = self.endpoint.clone();

        if let Some(password) = &endpoint.password {
            let mut auth = Command::new("AUTH");
            if let Some(username) = &endpoint.username {
                auth = auth.arg(username.as_str());
            }
            match self.send(&auth.arg(password.as_str())).await? {
                Frame::Error(msg) => return Err(Error::Auth(msg)),
                _ => self.authenticated = true,
            }
        }

        if let Some(name) = client_name {
            let setname = Command::new("CLIENT").arg("SETNAME").arg(name);
            if let Frame::Error(msg) = self.send(&setname).await? {
                debug!("CLIENT SETNAME rejected: {}", msg);
            }
        }

        if endpoint.database != 0 {
            self.select(endpoint.database).await?;
        }

        match self.send(&Command::new("PING")).await? {
            Frame::Error(msg) if is_auth_failure(&msg) => Err(Error::Auth(msg)),
            Frame::Error(msg) => Err(Error::Reply(msg)),
            _ => Ok(()),
        }
    }

    async fn select(&mut self, database: u32) -> Result<(), Error> {
        match self.send(&Command::new("SELECT").arg(database)).await? {
            Frame::Error(msg) if is_auth_failure(&msg) => Err(Error::Auth(msg)),
            Frame::Error(msg) => Err(Error::Reply(msg)),
            _ => Ok(()),
        }
    }

    /// Sends one command and waits for its reply under the command timeout.
    ///
    /// Error replies are returned as `Frame::Error`. Transport failures, timeouts and
    /// malformed replies return `Err` and leave the connection `Dead`.
    pub async fn send(&mut self, cmd: &Command) -> Result<Frame, Error> {
        self.ensure_usable()?;
        self.in_flight = true;

        let command_timeout = self.command_timeout;
        let result = timeout(command_timeout, async {
            self.write_command(cmd).await?;
            self.read_reply().await
        })
        .await;

        let reply = self.settle(result)?;
        self.in_flight = false;
        self.observe(cmd, &reply);
        Ok(reply)
    }

    /// Writes every command, flushes once and reads the replies in send order.
    pub async fn send_pipeline(&mut self, cmds: &[Command]) -> Result<Vec<Frame>, Error> {
        if cmds.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_usable()?;
        self.in_flight = true;

        let command_timeout = self.command_timeout;
        let written = timeout(command_timeout, async {
            let mut buf = BytesMut::new();
            for cmd in cmds {
                cmd.encode_into(&mut buf);
            }
            self.stream.write_all(&buf).await.map_err(transport)?;
            self.stream.flush().await.map_err(transport)
        })
        .await;
        self.settle(written)?;

        let mut replies = Vec::with_capacity(cmds.len());
        for cmd in cmds {
            let result = timeout(command_timeout, self.read_reply()).await;
            let reply = self.settle(result)?;
            self.observe(cmd, &reply);
            replies.push(reply);
        }

        self.in_flight = false;
        Ok(replies)
    }

    /// Writes a command without waiting for the reply. Used in subscription mode, where
    /// replies arrive as a stream of messages.
    pub async fn write_command(&mut self, cmd: &Command) -> Result<(), Error> {
        let mut buf = BytesMut::new();
        cmd.encode_into(&mut buf);
        self.stream.write_all(&buf).await.map_err(transport)?;
        self.stream.flush().await.map_err(transport)?;
        self.last_used = Instant::now();
        Ok(())
    }

    /// Reads a single frame from the connection.
    ///
    /// Returns `None` if the server closed the connection cleanly.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, Error> {
        loop {
            // Attempt to parse a frame from the buffered data. If enough data has been buffered,
            // the frame is returned.
            if let Some(frame) = self.codec.decode(&mut self.buffer)? {
                return Ok(Some(frame));
            }

            // There is not enough buffered data to read a frame. Attempt to read more data from the
            // socket. On success, the number of bytes is returned. `0` indicates "end of stream".
            if 0 == self.stream.read_buf(&mut self.buffer).await.map_err(transport)? {
                // The remote closed the connection. For this to be a clean shutdown, there should
                // be no data in the read buffer. If there is, this means that the peer closed the
                // socket while sending a frame.
                if self.buffer.is_empty() {
                    return Ok(None);
                } else {
                    return Err(Error::connection(
                        ConnectionErrorKind::Reset,
                        "connection reset by peer",
                    ));
                }
            }
        }
    }

    /// Reads the reply to a request, skipping out-of-band pushes.
    async fn read_reply(&mut self) -> Result<Frame, Error> {
        loop {
            match self.read_frame().await? {
                Some(Frame::Push(items)) if !self.subscribed => {
                    debug!("Ignoring out-of-band push with {} items", items.len());
                }
                Some(frame) => return Ok(frame),
                None => {
                    return Err(Error::connection(
                        ConnectionErrorKind::Closed,
                        "server closed the connection",
                    ))
                }
            }
        }
    }

    /// Waits for the next message with no timeout. Returns `None` once the server closes
    /// the connection.
    pub async fn read_message(&mut self) -> Result<Option<Frame>, Error> {
        match self.read_frame().await {
            Ok(Some(frame)) => {
                self.last_used = Instant::now();
                Ok(Some(frame))
            }
            Ok(None) => {
                self.health = Health::Dead;
                Ok(None)
            }
            Err(e) => {
                self.mark_dead();
                Err(e)
            }
        }
    }

    /// Probes the connection with PING and records the outcome.
    pub async fn ping(&mut self) -> Health {
        match self.send(&Command::new("PING")).await {
            Ok(Frame::Error(msg)) => {
                debug!(connection_id = %self.id, "PING returned an error: {}", msg);
                self.health = Health::Degraded;
            }
            Ok(_) => self.health = Health::Healthy,
            Err(e) => {
                debug!(connection_id = %self.id, "PING failed: {}", e);
                self.mark_dead();
            }
        }
        self.health
    }

    /// Shuts the socket down. Calling it again is a no-op.
    pub async fn close(&mut self) {
        if self.health == Health::Dead && !self.in_flight {
            return;
        }
        self.health = Health::Dead;
        self.in_flight = false;
        if let Err(e) = self.stream.shutdown().await {
            debug!(connection_id = %self.id, "Error while closing connection: {}", e);
        }
    }

    pub fn mark_dead(&mut self) {
        self.health = Health::Dead;
    }

    /// Returns `true` when the connection can be handed to another user of `endpoint`.
    pub fn is_reusable_for(&self, endpoint: &Endpoint) -> bool {
        self.health() == Health::Healthy
            && *self.endpoint == *endpoint
            && self.database == endpoint.database
            && !self.in_transaction
            && !self.subscribed
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    pub fn protocol(&self) -> Protocol {
        self.codec.protocol()
    }

    pub fn health(&self) -> Health {
        if self.in_flight {
            Health::Dead
        } else {
            self.health
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Database currently selected on the server side.
    pub fn database(&self) -> u32 {
        self.database
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub(crate) fn set_subscribed(&mut self, subscribed: bool) {
        self.subscribed = subscribed;
    }

    /// Server version reported by `HELLO`, when RESP3 was negotiated.
    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn idle_time(&self) -> Duration {
        self.last_used.elapsed()
    }

    fn ensure_usable(&mut self) -> Result<(), Error> {
        if self.in_flight {
            // A previous request was abandoned mid-flight; its reply may still arrive.
            self.in_flight = false;
            self.health = Health::Dead;
        }
        if self.health == Health::Dead {
            return Err(Error::connection(
                ConnectionErrorKind::Closed,
                "connection is closed",
            ));
        }
        Ok(())
    }

    fn settle<T>(
        &mut self,
        result: Result<Result<T, Error>, tokio::time::error::Elapsed>,
    ) -> Result<T, Error> {
        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                self.in_flight = false;
                if e.is_fatal_to_connection() {
                    self.health = Health::Dead;
                }
                Err(e)
            }
            Err(_) => {
                self.in_flight = false;
                self.health = Health::Dead;
                Err(Error::connection(
                    ConnectionErrorKind::Timeout,
                    format!("no reply within {:?}", self.command_timeout),
                ))
            }
        }
    }

    /// Tracks server-side state changed by a successful command.
    fn observe(&mut self, cmd: &Command, reply: &Frame) {
        self.last_used = Instant::now();
        match cmd.transaction_control() {
            Some(TransactionControl::Multi) if !reply.is_error() => self.in_transaction = true,
            Some(TransactionControl::Exec) | Some(TransactionControl::Discard) => {
                self.in_transaction = false
            }
            _ => {}
        }
        if reply.is_error() {
            return;
        }
        if let Some(database) = cmd.selected_database() {
            self.database = database;
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint.label())
            .field("protocol", &self.protocol())
            .field("health", &self.health())
            .field("database", &self.database)
            .finish()
    }
}

fn transport(err: io::Error) -> Error {
    Error::connection(ConnectionErrorKind::from(&err), err.to_string())
}

/// Error replies that mean the credentials were rejected or are required.
pub(crate) fn is_auth_failure(msg: &str) -> bool {
    msg.starts_with("WRONGPASS")
        || msg.starts_with("NOAUTH")
        || msg.contains("invalid password")
        || msg.contains("without any password configured")
        || msg.contains("invalid username-password pair")
}

fn is_unknown_command(msg: &str) -> bool {
    msg.starts_with("ERR unknown command") || msg.starts_with("ERR Unknown command")
}

fn hello_field(reply: &Frame, field: &str) -> Option<String> {
    let pairs: Vec<(&Frame, &Frame)> = match reply {
        Frame::Map(pairs) => pairs.iter().map(|(k, v)| (k, v)).collect(),
        Frame::Array(items) => items
            .chunks(2)
            .filter(|pair| pair.len() == 2)
            .map(|pair| (&pair[0], &pair[1]))
            .collect(),
        _ => return None,
    };
    pairs
        .into_iter()
        .find(|(key, _)| key.as_str() == Some(field))
        .and_then(|(_, value)| value.as_str().map(str::to_string))
}
