//! Type-specific readers. Collections are read in bounded pages: small hashes and sets in
//! one HGETALL / SMEMBERS, larger ones with HSCAN / SSCAN, lists and sorted sets by index
//! and streams by entry id.

use bytes::Bytes;

use super::scan::parse_scan_reply;
use super::{not_found, typed, KeyKind, Page, PageRequest, PageToken, StreamEntry, Value};
use crate::command::Command;
use crate::frame::Frame;
use crate::session::Session;
use crate::Error;

pub(super) async fn read(
    session: &mut Session,
    key: &Bytes,
    kind: &KeyKind,
    request: PageRequest,
) -> Result<Page<Value>, Error> {
    let count = request.count.max(1);
    let page = match kind {
        KeyKind::String => read_string(session, key).await?,
        KeyKind::Hash => read_hash(session, key, &request, count).await?,
        KeyKind::Set => read_set(session, key, &request, count).await?,
        KeyKind::List => read_list(session, key, &request, count).await?,
        KeyKind::ZSet => read_zset(session, key, &request, count).await?,
        KeyKind::Stream => read_stream(session, key, &request, count).await?,
        KeyKind::Other(name) => {
            return Err(Error::InvalidCommand(format!(
                "values of type '{}' cannot be browsed",
                name
            )))
        }
    };

    // An empty first page means the key is gone, unless it is an empty stream.
    if request.is_first() && page.items.is_empty() && !exists(session, key).await? {
        return Err(not_found(key));
    }
    Ok(page)
}

async fn read_string(session: &mut Session, key: &Bytes) -> Result<Page<Value>, Error> {
    let reply = typed(key, session.execute(Command::new("GET").arg(key)).await?)?;
    match reply {
        Frame::Null => Err(not_found(key)),
        other => {
            let bytes = other.as_bytes().map(Bytes::copy_from_slice).ok_or_else(|| {
                Error::Protocol(format!("GET returned a {} reply", other.kind()))
            })?;
            Ok(Page {
                items: Value::String(bytes),
                next: None,
            })
        }
    }
}

async fn read_hash(
    session: &mut Session,
    key: &Bytes,
    request: &PageRequest,
    count: usize,
) -> Result<Page<Value>, Error> {
    let cursor = match cursor_of(request)? {
        Some(cursor) => cursor,
        None => {
            if collection_len(session, "HLEN", key).await? <= count as u64 {
                let reply = typed(key, session.execute(Command::new("HGETALL").arg(key)).await?)?;
                return Ok(Page {
                    items: Value::Hash(pairs(elements(reply, "HGETALL")?)?),
                    next: None,
                });
            }
            0
        }
    };

    let (next, items) = scan_page(session, "HSCAN", key, cursor, count).await?;
    let items = pairs(items.into_iter().map(Frame::Bulk).collect())?;
    Ok(Page {
        items: Value::Hash(items),
        next,
    })
}

async fn read_set(
    session: &mut Session,
    key: &Bytes,
    request: &PageRequest,
    count: usize,
) -> Result<Page<Value>, Error> {
    let cursor = match cursor_of(request)? {
        Some(cursor) => cursor,
        None => {
            if collection_len(session, "SCARD", key).await? <= count as u64 {
                let reply = typed(key, session.execute(Command::new("SMEMBERS").arg(key)).await?)?;
                let members = elements(reply, "SMEMBERS")?
                    .into_iter()
                    .map(bulk)
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Page {
                    items: Value::Set(members),
                    next: None,
                });
            }
            0
        }
    };

    let (next, members) = scan_page(session, "SSCAN", key, cursor, count).await?;
    Ok(Page {
        items: Value::Set(members),
        next,
    })
}

async fn read_list(
    session: &mut Session,
    key: &Bytes,
    request: &PageRequest,
    count: usize,
) -> Result<Page<Value>, Error> {
    let (start, stop) = index_range(request, count)?;
    let cmd = Command::new("LRANGE").arg(key).arg(start).arg(stop);
    let reply = typed(key, session.execute(cmd).await?)?;

    let items = elements(reply, "LRANGE")?
        .into_iter()
        .map(bulk)
        .collect::<Result<Vec<_>, _>>()?;
    let next = next_offset(start, items.len(), count);
    Ok(Page {
        items: Value::List(items),
        next,
    })
}

async fn read_zset(
    session: &mut Session,
    key: &Bytes,
    request: &PageRequest,
    count: usize,
) -> Result<Page<Value>, Error> {
    let (start, stop) = index_range(request, count)?;
    let cmd = Command::new("ZRANGE")
        .arg(key)
        .arg(start)
        .arg(stop)
        .arg("WITHSCORES");
    let reply = typed(key, session.execute(cmd).await?)?;
    let reply = elements(reply, "ZRANGE")?;

    // RESP3 servers nest each member with its score, RESP2 servers alternate them.
    let flat: Vec<Frame> = if reply.iter().all(|f| matches!(f, Frame::Array(_))) {
        reply
            .into_iter()
            .flat_map(|f| f.into_elements().unwrap_or_default())
            .collect()
    } else {
        reply
    };
    if flat.len() % 2 != 0 {
        return Err(Error::Protocol("ZRANGE WITHSCORES returned an odd element count".into()));
    }

    let mut members = Vec::with_capacity(flat.len() / 2);
    let mut items = flat.into_iter();
    while let (Some(member), Some(score)) = (items.next(), items.next()) {
        let score = score
            .as_double()
            .ok_or_else(|| Error::Protocol("ZRANGE returned a non-numeric score".into()))?;
        members.push((bulk(member)?, score));
    }

    let next = next_offset(start, members.len(), count);
    Ok(Page {
        items: Value::ZSet(members),
        next,
    })
}

async fn read_stream(
    session: &mut Session,
    key: &Bytes,
    request: &PageRequest,
    count: usize,
) -> Result<Page<Value>, Error> {
    let start = match &request.token {
        None => "-".to_string(),
        Some(PageToken::StreamId(id)) => id.clone(),
        Some(other) => return Err(mismatched(other, "stream")),
    };
    let cmd = Command::new("XRANGE")
        .arg(key)
        .arg(start.as_str())
        .arg("+")
        .arg("COUNT")
        .arg(count);
    let reply = typed(key, session.execute(cmd).await?)?;

    let entries = elements(reply, "XRANGE")?
        .into_iter()
        .map(stream_entry)
        .collect::<Result<Vec<_>, _>>()?;

    let next = match entries.last() {
        Some(last) if entries.len() == count => Some(PageToken::StreamId(next_stream_id(&last.id)?)),
        _ => None,
    };
    Ok(Page {
        items: Value::Stream(entries),
        next,
    })
}

fn stream_entry(frame: Frame) -> Result<StreamEntry, Error> {
    let mut parts = frame
        .into_elements()
        .ok_or_else(|| Error::Protocol("stream entry is not an array".into()))?
        .into_iter();
    let id = parts
        .next()
        .and_then(|f| f.as_str().map(str::to_string))
        .ok_or_else(|| Error::Protocol("stream entry has no id".into()))?;
    let fields = match parts.next() {
        Some(fields) => pairs(elements(fields, "XRANGE")?)?,
        None => Vec::new(),
    };
    Ok(StreamEntry { id, fields })
}

/// The smallest id strictly greater than `id`, for resuming XRANGE.
pub(super) fn next_stream_id(id: &str) -> Result<String, Error> {
    let invalid = || Error::Protocol(format!("invalid stream id '{}'", id));
    let (ms, seq) = id.split_once('-').ok_or_else(invalid)?;
    let ms: u64 = ms.parse().map_err(|_| invalid())?;
    let seq: u64 = seq.parse().map_err(|_| invalid())?;
    Ok(match seq.checked_add(1) {
        Some(seq) => format!("{}-{}", ms, seq),
        None => format!("{}-0", ms.checked_add(1).ok_or_else(invalid)?),
    })
}

async fn collection_len(session: &mut Session, name: &str, key: &Bytes) -> Result<u64, Error> {
    let reply = typed(key, session.execute(Command::new(name).arg(key)).await?)?;
    reply
        .as_integer()
        .map(|n| n.max(0) as u64)
        .ok_or_else(|| Error::Protocol(format!("{} returned a {} reply", name, reply.kind())))
}

pub(super) async fn exists(session: &mut Session, key: &Bytes) -> Result<bool, Error> {
    let reply = typed(key, session.execute(Command::new("EXISTS").arg(key)).await?)?;
    Ok(reply.as_integer().unwrap_or(0) > 0)
}

async fn scan_page(
    session: &mut Session,
    name: &str,
    key: &Bytes,
    cursor: u64,
    count: usize,
) -> Result<(Option<PageToken>, Vec<Bytes>), Error> {
    let cmd = Command::new(name)
        .arg(key)
        .arg(cursor)
        .arg("COUNT")
        .arg(count);
    let reply = typed(key, session.execute(cmd).await?)?;
    let (cursor, items) = parse_scan_reply(reply)?;
    let next = (cursor != 0).then_some(PageToken::Cursor(cursor));
    Ok((next, items))
}

fn cursor_of(request: &PageRequest) -> Result<Option<u64>, Error> {
    match &request.token {
        None => Ok(None),
        Some(PageToken::Cursor(cursor)) => Ok(Some(*cursor)),
        Some(other) => Err(mismatched(other, "cursor")),
    }
}

fn offset_of(request: &PageRequest) -> Result<u64, Error> {
    match &request.token {
        None => Ok(0),
        Some(PageToken::Offset(offset)) => Ok(*offset),
        Some(other) => Err(mismatched(other, "offset")),
    }
}

/// Inclusive LRANGE/ZRANGE bounds for a page. Redis indexes are signed 64-bit.
fn index_range(request: &PageRequest, count: usize) -> Result<(u64, u64), Error> {
    let start = offset_of(request)?;
    if start > i64::MAX as u64 {
        return Err(Error::InvalidCommand(format!(
            "page offset {} is out of range",
            start
        )));
    }
    let stop = start
        .saturating_add(count as u64 - 1)
        .min(i64::MAX as u64);
    Ok((start, stop))
}

fn next_offset(start: u64, returned: usize, count: usize) -> Option<PageToken> {
    (returned == count).then_some(PageToken::Offset(start.saturating_add(returned as u64)))
}

fn mismatched(token: &PageToken, expected: &str) -> Error {
    Error::InvalidCommand(format!(
        "page token {:?} does not match this key type, expected a {} token",
        token, expected
    ))
}

fn elements(reply: Frame, command: &str) -> Result<Vec<Frame>, Error> {
    let kind = reply.kind();
    reply
        .into_elements()
        .ok_or_else(|| Error::Protocol(format!("{} returned a {} reply", command, kind)))
}

fn bulk(frame: Frame) -> Result<Bytes, Error> {
    match frame {
        Frame::Bulk(bytes) => Ok(bytes),
        Frame::Simple(s) => Ok(Bytes::from(s)),
        Frame::Verbatim { text, .. } => Ok(text),
        Frame::Integer(i) => Ok(Bytes::from(i.to_string())),
        other => Err(Error::Protocol(format!(
            "expected a string element, got {}",
            other.kind()
        ))),
    }
}

fn pairs(items: Vec<Frame>) -> Result<Vec<(Bytes, Bytes)>, Error> {
    if items.len() % 2 != 0 {
        return Err(Error::Protocol("odd number of field/value elements".into()));
    }
    let mut out = Vec::with_capacity(items.len() / 2);
    let mut items = items.into_iter();
    while let (Some(field), Some(value)) = (items.next(), items.next()) {
        out.push((bulk(field)?, bulk(value)?));
    }
    Ok(out)
}
