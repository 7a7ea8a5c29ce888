use bytes::{Buf, BytesMut};
use std::io::Cursor;
use tokio_util::codec::{Decoder, Encoder};

use crate::command::Command;
use crate::frame::{self, Frame, Protocol};
use crate::Error;

pub const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// Decodes server replies and encodes client commands.
///
/// Decoding is a pure function of the buffered bytes and the negotiated protocol: the codec
/// keeps no state besides its configuration, so byte fixtures are enough to test it.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    protocol: Protocol,
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(protocol: Protocol, max_frame_size: usize) -> FrameCodec {
        FrameCodec {
            protocol,
            max_frame_size,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Switches the grammar used for subsequent frames, after `HELLO` negotiated a version.
    pub fn set_protocol(&mut self, protocol: Protocol) {
        self.protocol = protocol;
    }

    /// Yields every complete frame currently buffered, leaving a partial trailing frame in
    /// `src` for the next read.
    pub fn frames<'a>(&'a mut self, src: &'a mut BytesMut) -> Frames<'a> {
        Frames {
            codec: self,
            src,
            failed: false,
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec::new(Protocol::default(), DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&src[..]);
        let frame = match Frame::parse(&mut cursor, self.protocol) {
            Ok(frame) => frame,
            Err(frame::Error::Incomplete) => {
                // Check if the pending frame exceeds the limit before buffering more of it.
                if src.len() > self.max_frame_size {
                    return Err(Error::Protocol(format!(
                        "frame size exceeds limit of {} bytes",
                        self.max_frame_size
                    )));
                }
                return Ok(None); // Not enough data to parse a frame.
            }
            Err(err) => return Err(err.into()),
        };

        let position = cursor.position() as usize;

        // Remove the parsed frame from the buffer.
        src.advance(position);

        Ok(Some(frame))
    }
}

impl Encoder<&Command> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: &Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst);
        Ok(())
    }
}

impl Encoder<Command> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        <Self as Encoder<&Command>>::encode(self, &item, dst)
    }
}

/// Iterator returned by [`FrameCodec::frames`]. Stops at the first error.
pub struct Frames<'a> {
    codec: &'a mut FrameCodec,
    src: &'a mut BytesMut,
    failed: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.codec.decode(self.src) {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
