use std::str::FromStr;

use bytes::Bytes;
use futures::stream::{self, Stream};
use tracing::debug;

use crate::command::Command;
use crate::connection::Connection;
use crate::frame::Frame;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MessageKind {
    Subscribe,
    Psubscribe,
    Ssubscribe,
    Unsubscribe,
    Punsubscribe,
    Sunsubscribe,
    Message,
    Pmessage,
    Smessage,
    Pong,
}

impl MessageKind {
    fn is_unsubscribe(self) -> bool {
        matches!(
            self,
            MessageKind::Unsubscribe | MessageKind::Punsubscribe | MessageKind::Sunsubscribe
        )
    }
}

/// A message received in subscription mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    pub channel: Bytes,
    /// The matching pattern, for `pmessage`.
    pub pattern: Option<Bytes>,
    /// Message body, or the number of active subscriptions for (un)subscribe confirmations.
    pub payload: Frame,
}

impl Message {
    fn from_frame(frame: Frame) -> Result<Option<Message>, Error> {
        let items = match frame {
            Frame::Push(items) | Frame::Array(items) => items,
            Frame::Error(msg) => return Err(Error::Reply(msg)),
            // RESP3 answers PING with a plain reply while subscribed.
            Frame::Simple(s) if s.eq_ignore_ascii_case("pong") => {
                return Ok(Some(Message {
                    kind: MessageKind::Pong,
                    channel: Bytes::new(),
                    pattern: None,
                    payload: Frame::Null,
                }))
            }
            other => {
                debug!("Ignoring {} reply in subscription mode", other.kind());
                return Ok(None);
            }
        };

        let mut items = items.into_iter();
        let kind = match items.next().as_ref().and_then(Frame::as_str) {
            Some(kind) => match MessageKind::from_str(kind) {
                Ok(kind) => kind,
                Err(_) => {
                    debug!("Ignoring unknown push kind '{}'", kind);
                    return Ok(None);
                }
            },
            None => return Err(Error::Protocol("empty subscription message".into())),
        };

        let pattern = if kind == MessageKind::Pmessage {
            items.next().and_then(|f| f.as_bytes().map(Bytes::copy_from_slice))
        } else {
            None
        };
        let channel = items
            .next()
            .and_then(|f| f.as_bytes().map(Bytes::copy_from_slice))
            .unwrap_or_default();
        let payload = items.next().unwrap_or(Frame::Null);

        Ok(Some(Message {
            kind,
            channel,
            pattern,
            payload,
        }))
    }
}

/// A connection in subscription mode, owned outside the pool.
///
/// Messages are read lazily. The sequence ends once the server confirms that no
/// subscriptions remain, or when the connection closes.
#[derive(Debug)]
pub struct Subscription {
    conn: Connection,
    finished: bool,
}

impl Subscription {
    /// Puts `conn` into subscription mode by sending `cmd` (SUBSCRIBE, PSUBSCRIBE or SSUBSCRIBE).
    pub async fn open(mut conn: Connection, cmd: &Command) -> Result<Subscription, Error> {
        if !cmd.is_subscribe() {
            return Err(Error::InvalidCommand(format!(
                "{} does not start a subscription",
                cmd.name()
            )));
        }
        conn.set_subscribed(true);
        conn.write_command(cmd).await?;
        Ok(Subscription {
            conn,
            finished: false,
        })
    }

    /// Sends a further (UN)SUBSCRIBE or PING on the subscribed connection. Confirmations
    /// and pongs arrive through [`Subscription::next_message`]; replies to other commands
    /// are skipped.
    pub async fn send(&mut self, cmd: &Command) -> Result<(), Error> {
        if self.finished {
            return Err(Error::connection(
                crate::error::ConnectionErrorKind::Closed,
                "subscription has ended",
            ));
        }
        self.conn.write_command(cmd).await
    }

    /// Unsubscribes from every channel and pattern.
    pub async fn unsubscribe_all(&mut self) -> Result<(), Error> {
        self.send(&Command::new("UNSUBSCRIBE")).await?;
        self.send(&Command::new("PUNSUBSCRIBE")).await
    }

    /// Waits for the next message. Returns `None` once the subscription has ended.
    pub async fn next_message(&mut self) -> Result<Option<Message>, Error> {
        while !self.finished {
            let frame = match self.conn.read_message().await? {
                Some(frame) => frame,
                None => {
                    self.finished = true;
                    return Ok(None);
                }
            };

            if let Some(message) = Message::from_frame(frame)? {
                if message.kind.is_unsubscribe() && message.payload.as_integer() == Some(0) {
                    debug!("No subscriptions left, leaving subscription mode");
                    self.finished = true;
                }
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The messages as a stream. The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Message, Error>> {
        stream::unfold(Some(self), |state| async move {
            let mut subscription = state?;
            match subscription.next_message().await {
                Ok(Some(message)) => Some((Ok(message), Some(subscription))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    pub async fn close(mut self) {
        self.finished = true;
        self.conn.close().await;
    }
}
