use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, Stream};
use tracing::debug;

use super::KeyKind;
use crate::command::Command;
use crate::frame::Frame;
use crate::session::Session;
use crate::Error;

/// A SCAN iteration over the keyspace.
///
/// Keys are fetched one server page at a time. The cursor is internal, so an iteration can
/// only be restarted from the beginning. SCAN gives no snapshot: keys changed during the
/// iteration may be reported twice or not at all.
pub struct KeyScan<'a> {
    session: &'a mut Session,
    pattern: String,
    batch_size: usize,
    kind: Option<KeyKind>,
    cursor: u64,
    done: bool,
}

impl<'a> KeyScan<'a> {
    pub(super) fn new(session: &'a mut Session, pattern: &str, batch_size: usize) -> KeyScan<'a> {
        KeyScan {
            session,
            pattern: pattern.to_string(),
            batch_size: batch_size.max(1),
            kind: None,
            cursor: 0,
            done: false,
        }
    }

    /// Only list keys of this type (`SCAN ... TYPE`, Redis 6.0 and later).
    pub fn with_kind(mut self, kind: KeyKind) -> KeyScan<'a> {
        self.kind = Some(kind);
        self
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fetches the next server page. Pages may be empty before the iteration ends;
    /// `None` means the iteration is complete.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<Bytes>>, Error> {
        if self.done {
            return Ok(None);
        }

        let mut cmd = Command::new("SCAN")
            .arg(self.cursor)
            .arg("MATCH")
            .arg(self.pattern.as_str())
            .arg("COUNT")
            .arg(self.batch_size);
        if let Some(kind) = &self.kind {
            cmd = cmd.arg("TYPE").arg(kind.as_str());
        }

        let (cursor, keys) = parse_scan_reply(self.session.execute(cmd).await?)?;
        debug!(cursor, keys = keys.len(), "SCAN page");

        self.cursor = cursor;
        if cursor == 0 {
            self.done = true;
        }
        Ok(Some(keys))
    }

    /// Runs the iteration to the end.
    pub async fn collect(mut self) -> Result<Vec<Bytes>, Error> {
        let mut keys = Vec::new();
        while let Some(batch) = self.next_batch().await? {
            keys.extend(batch);
        }
        Ok(keys)
    }

    /// The keys one by one. The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Error>> + 'a {
        stream::unfold(Some((self, VecDeque::new())), |state| async move {
            let (mut scan, mut pending) = state?;
            loop {
                if let Some(key) = pending.pop_front() {
                    return Some((Ok(key), Some((scan, pending))));
                }
                match scan.next_batch().await {
                    Ok(Some(batch)) => pending.extend(batch),
                    Ok(None) => return None,
                    Err(e) => return Some((Err(e), None)),
                }
            }
        })
    }
}

/// Splits a SCAN-family reply into the next cursor and the returned elements.
pub(super) fn parse_scan_reply(reply: Frame) -> Result<(u64, Vec<Bytes>), Error> {
    if let Frame::Error(msg) = reply {
        return Err(Error::Reply(msg));
    }
    let mut parts = reply
        .into_elements()
        .ok_or_else(|| Error::Protocol("SCAN reply is not an array".into()))?
        .into_iter();

    let cursor = parts
        .next()
        .and_then(|c| c.as_str().and_then(|s| s.parse::<u64>().ok()))
        .ok_or_else(|| Error::Protocol("SCAN reply has no valid cursor".into()))?;
    let elements = parts
        .next()
        .and_then(Frame::into_elements)
        .ok_or_else(|| Error::Protocol("SCAN reply has no element list".into()))?;

    let keys = elements
        .into_iter()
        .map(|f| match f {
            Frame::Bulk(bytes) => Ok(bytes),
            Frame::Simple(s) => Ok(Bytes::from(s)),
            other => Err(Error::Protocol(format!(
                "unexpected {} element in SCAN reply",
                other.kind()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((cursor, keys))
}
