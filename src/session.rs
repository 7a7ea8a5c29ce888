use std::time::{Instant, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::catalog;
use crate::command::{Command, TransactionControl};
use crate::config::SessionConfig;
use crate::connection::Health;
use crate::endpoint::Endpoint;
use crate::frame::{Frame, Protocol};
use crate::history::{History, HistoryEntry};
use crate::pool::{Pool, PooledConnection};
use crate::subscription::Subscription;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TransactionState {
    #[default]
    None,
    /// MULTI was issued; commands are collected until commit or discard.
    Queued,
    /// The queued commands are on their way to the server.
    Executing,
}

/// Point-in-time view of a session, for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub endpoint: String,
    pub database: u32,
    pub transaction: TransactionState,
    pub queued: usize,
    pub history_len: usize,
    pub connection_id: Option<Uuid>,
    pub protocol: Option<Protocol>,
}

/// Outcome of [`Session::dispatch`].
#[derive(Debug)]
pub enum Response {
    Reply(Frame),
    Subscription(Subscription),
}

/// Sequences a user's commands against one endpoint.
///
/// The session holds one pooled connection for its whole lifetime, so commands that depend
/// on connection state (SELECT, WATCH, CLIENT ...) behave as they would in `redis-cli`.
/// Transactions are queued client-side and sent as one MULTI ... EXEC pipeline on commit.
pub struct Session {
    pool: Pool,
    endpoint: Endpoint,
    config: SessionConfig,
    conn: Option<PooledConnection>,
    database: u32,
    transaction: TransactionState,
    queued: Vec<Command>,
    history: History,
}

impl Session {
    /// Creates a session. The connection is checked out on first use.
    pub fn new(pool: Pool, endpoint: Endpoint, config: SessionConfig) -> Session {
        let history = History::new(config.history_capacity);
        Session {
            pool,
            database: endpoint.database,
            endpoint,
            config,
            conn: None,
            transaction: TransactionState::None,
            queued: Vec::new(),
            history,
        }
    }

    /// Creates a session and checks out its connection right away, so connection and
    /// authentication problems surface immediately.
    pub async fn connect(
        pool: Pool,
        endpoint: Endpoint,
        config: SessionConfig,
    ) -> Result<Session, Error> {
        let mut session = Session::new(pool, endpoint, config);
        session.connection().await?;
        Ok(session)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Database the session's commands run against.
    pub fn database(&self) -> u32 {
        self.database
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.transaction
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            endpoint: self.endpoint.label(),
            database: self.database,
            transaction: self.transaction,
            queued: self.queued.len(),
            history_len: self.history.len(),
            connection_id: self.conn.as_ref().map(|c| c.id()),
            protocol: self.conn.as_ref().map(|c| c.protocol()),
        }
    }

    /// Runs one command and returns its reply. Error replies are returned as
    /// `Frame::Error`; `Err` means the request did not complete.
    #[instrument(name = "execute", skip(self, cmd), fields(command = %cmd.name(), db = self.database))]
    pub async fn execute(&mut self, cmd: Command) -> Result<Frame, Error> {
        self.check_idle()?;
        check_plain(&cmd)?;

        let started = Instant::now();
        let result = {
            let conn = self.connection().await?;
            conn.send(&cmd).await
        };

        match &result {
            Ok(reply) => {
                if let (Some(database), false) = (cmd.selected_database(), reply.is_error()) {
                    debug!("Session switched to database {}", database);
                    self.database = database;
                }
                self.record(&cmd, reply.kind(), started);
            }
            Err(e) => {
                warn!("Command failed: {}", e);
                self.record(&cmd, "failed", started);
            }
        }
        result
    }

    /// Like [`Session::execute`], but abandons the request once `token` fires. The
    /// connection is closed in that case, since its reply stream can no longer be trusted.
    pub async fn execute_cancellable(
        &mut self,
        cmd: Command,
        token: &CancellationToken,
    ) -> Result<Frame, Error> {
        let outcome = tokio::select! {
            _ = token.cancelled() => None,
            result = self.execute(cmd) => Some(result),
        };

        match outcome {
            Some(result) => result,
            None => {
                if let Some(mut conn) = self.conn.take() {
                    info!(connection_id = %conn.id(), "Request cancelled, closing connection");
                    conn.close().await;
                }
                Err(Error::Cancelled)
            }
        }
    }

    /// Sends the commands in batches of `pipeline_batch_size`, each batch written before its
    /// replies are read. Replies come back in send order.
    pub async fn pipeline(&mut self, cmds: Vec<Command>) -> Result<Vec<Frame>, Error> {
        self.check_idle()?;
        for cmd in &cmds {
            check_plain(cmd)?;
        }

        let mut replies = Vec::with_capacity(cmds.len());
        for batch in cmds.chunks(self.config.pipeline_batch_size.max(1)) {
            let started = Instant::now();
            let result = {
                let conn = self.connection().await?;
                conn.send_pipeline(batch).await
            };

            match result {
                Ok(frames) => {
                    for (cmd, reply) in batch.iter().zip(&frames) {
                        if let (Some(database), false) = (cmd.selected_database(), reply.is_error())
                        {
                            self.database = database;
                        }
                        self.record(cmd, reply.kind(), started);
                    }
                    replies.extend(frames);
                }
                Err(e) => {
                    for cmd in batch {
                        self.record(cmd, "failed", started);
                    }
                    return Err(e);
                }
            }
        }
        Ok(replies)
    }

    pub fn begin_transaction(&mut self) -> Result<(), Error> {
        if self.transaction != TransactionState::None {
            return Err(Error::Transaction("MULTI calls can not be nested".into()));
        }
        debug!("Transaction started");
        self.transaction = TransactionState::Queued;
        self.queued.clear();
        Ok(())
    }

    /// Adds a command to the open transaction. Returns the number of queued commands.
    pub fn queue(&mut self, cmd: Command) -> Result<usize, Error> {
        if self.transaction != TransactionState::Queued {
            return Err(Error::Transaction("no transaction in progress".into()));
        }
        check_plain(&cmd)?;
        self.queued.push(cmd);
        Ok(self.queued.len())
    }

    pub fn queued(&self) -> &[Command] {
        &self.queued
    }

    /// Sends MULTI, the queued commands and EXEC in one round trip and returns the EXEC
    /// results. An empty transaction completes without touching the server.
    pub async fn commit(&mut self) -> Result<Vec<Frame>, Error> {
        if self.transaction != TransactionState::Queued {
            return Err(Error::Transaction("EXEC without MULTI".into()));
        }
        let queued = std::mem::take(&mut self.queued);
        if queued.is_empty() {
            self.transaction = TransactionState::None;
            return Ok(Vec::new());
        }

        debug!("Committing {} queued commands", queued.len());
        self.transaction = TransactionState::Executing;

        let mut batch = Vec::with_capacity(queued.len() + 2);
        batch.push(Command::new("MULTI"));
        batch.extend(queued.iter().cloned());
        batch.push(Command::new("EXEC"));

        let started = Instant::now();
        let result = match self.connection().await {
            Ok(conn) => conn.send_pipeline(&batch).await,
            Err(e) => Err(e),
        };
        self.transaction = TransactionState::None;

        let mut replies = match result {
            Ok(replies) => replies,
            Err(e) => {
                for cmd in &queued {
                    self.record(cmd, "failed", started);
                }
                return Err(e);
            }
        };

        if let Some(Frame::Error(msg)) = replies.first() {
            return Err(Error::Transaction(msg.clone()));
        }

        let results = match replies.pop() {
            Some(Frame::Null) => {
                for cmd in &queued {
                    self.record(cmd, "null", started);
                }
                return Err(Error::TransactionAborted(
                    "a watched key was modified".into(),
                ));
            }
            Some(Frame::Error(msg)) => {
                for cmd in &queued {
                    self.record(cmd, "error", started);
                }
                return Err(Error::TransactionAborted(msg));
            }
            Some(exec) => exec.into_elements().ok_or_else(|| {
                Error::Protocol("EXEC returned a non-aggregate reply".into())
            })?,
            None => return Err(Error::Protocol("missing EXEC reply".into())),
        };

        for (cmd, reply) in queued.iter().zip(&results) {
            if let (Some(database), false) = (cmd.selected_database(), reply.is_error()) {
                self.database = database;
            }
            self.record(cmd, reply.kind(), started);
        }
        Ok(results)
    }

    /// Drops the queued commands and leaves transaction mode.
    pub fn discard(&mut self) -> Result<(), Error> {
        if self.transaction != TransactionState::Queued {
            return Err(Error::Transaction("DISCARD without MULTI".into()));
        }
        debug!("Discarding {} queued commands", self.queued.len());
        self.queued.clear();
        self.transaction = TransactionState::None;
        Ok(())
    }

    /// Opens a subscription on a dedicated connection taken out of the pool.
    pub async fn subscribe(&mut self, cmd: Command) -> Result<Subscription, Error> {
        self.check_idle()?;
        let conn = self
            .pool
            .acquire(&self.endpoint, self.pool.config().acquire_timeout)
            .await?
            .detach();

        let started = Instant::now();
        let subscription = Subscription::open(conn, &cmd).await?;
        self.record(&cmd, "push", started);
        Ok(subscription)
    }

    /// Console entry point: parses `line` and routes it through the transaction state
    /// machine, the subscription path or a plain round trip.
    pub async fn dispatch(&mut self, line: &str) -> Result<Response, Error> {
        let cmd = Command::parse_line(line)?;

        match cmd.transaction_control() {
            Some(TransactionControl::Multi) => {
                self.begin_transaction()?;
                Ok(Response::Reply(Frame::Simple("OK".into())))
            }
            Some(TransactionControl::Exec) => Ok(Response::Reply(Frame::Array(self.commit().await?))),
            Some(TransactionControl::Discard) => {
                self.discard()?;
                Ok(Response::Reply(Frame::Simple("OK".into())))
            }
            None if self.transaction == TransactionState::Queued => {
                self.queue(cmd)?;
                Ok(Response::Reply(Frame::Simple("QUEUED".into())))
            }
            None if cmd.is_subscribe() => Ok(Response::Subscription(self.subscribe(cmd).await?)),
            None => Ok(Response::Reply(self.execute(cmd).await?)),
        }
    }

    /// Completion candidates for a partially typed line: matching history lines first,
    /// then command names from the catalog.
    pub fn complete(&self, prefix: &str) -> Vec<String> {
        let mut candidates = self.history.complete(prefix);
        if !prefix.contains(' ') {
            for info in catalog::complete(prefix) {
                if !candidates.iter().any(|c| c.eq_ignore_ascii_case(info.name)) {
                    candidates.push(info.name.to_string());
                }
            }
        }
        candidates
    }

    /// Returns the connection to the pool and forgets any open transaction.
    pub fn close(&mut self) {
        self.queued.clear();
        self.transaction = TransactionState::None;
        self.conn.take();
    }

    /// The session's connection, replaced first when the held one is dead.
    async fn connection(&mut self) -> Result<&mut PooledConnection, Error> {
        let conn = match self.conn.take() {
            Some(conn) if conn.health() != Health::Dead => conn,
            stale => {
                if let Some(conn) = stale {
                    warn!(connection_id = %conn.id(), "Session connection is dead, replacing it");
                }
                self.checkout().await?
            }
        };
        Ok(self.conn.insert(conn))
    }

    async fn checkout(&mut self) -> Result<PooledConnection, Error> {
        let mut conn = self
            .pool
            .acquire(&self.endpoint, self.pool.config().acquire_timeout)
            .await?;

        if conn.database() != self.database {
            let select = Command::new("SELECT").arg(self.database);
            if let Frame::Error(msg) = conn.send(&select).await? {
                return Err(Error::Reply(msg));
            }
        }
        Ok(conn)
    }

    fn check_idle(&self) -> Result<(), Error> {
        match self.transaction {
            TransactionState::None => Ok(()),
            _ => Err(Error::Transaction(
                "a transaction is in progress; queue the command or commit first".into(),
            )),
        }
    }

    fn record(&mut self, cmd: &Command, reply_kind: &'static str, started: Instant) {
        self.history.record(HistoryEntry {
            command: cmd.to_string(),
            database: self.database,
            reply_kind,
            elapsed: started.elapsed(),
            executed_at: SystemTime::now(),
        });
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint.label())
            .field("database", &self.database)
            .field("transaction", &self.transaction)
            .finish()
    }
}

/// Commands that change connection mode go through dedicated session methods.
fn check_plain(cmd: &Command) -> Result<(), Error> {
    if cmd.transaction_control().is_some() {
        return Err(Error::InvalidCommand(format!(
            "{} is handled by the session's transaction methods",
            cmd.normalized_name()
        )));
    }
    if cmd.is_subscribe() || cmd.is_unsubscribe() {
        return Err(Error::InvalidCommand(format!(
            "{} requires a subscription",
            cmd.normalized_name()
        )));
    }
    Ok(())
}
