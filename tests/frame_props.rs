mod support;

use std::io::Cursor;

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use tokio_util::codec::Decoder;

use redline::codec::{FrameCodec, DEFAULT_MAX_FRAME_SIZE};
use redline::frame::{Frame, Protocol};

fn line() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 :_.-]{0,24}"
}

fn leaf() -> impl Strategy<Value = Frame> {
    prop_oneof![
        line().prop_map(Frame::Simple),
        line().prop_map(|s| Frame::Error(format!("ERR {}", s))),
        any::<i64>().prop_map(Frame::Integer),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(|b| Frame::Bulk(Bytes::from(b))),
        Just(Frame::Null),
        (-1.0e12f64..1.0e12).prop_map(Frame::Double),
        any::<bool>().prop_map(Frame::Boolean),
        "-?[1-9][0-9]{0,40}".prop_map(Frame::BigNumber),
        ("[a-z]{3}", prop::collection::vec(any::<u8>(), 0..32)).prop_map(|(format, text)| {
            Frame::Verbatim {
                format,
                text: Bytes::from(text),
            }
        }),
    ]
}

/// Replies a RESP2 server can send.
fn resp2_frame() -> impl Strategy<Value = Frame> {
    let leaf = prop_oneof![
        line().prop_map(Frame::Simple),
        line().prop_map(|s| Frame::Error(format!("ERR {}", s))),
        any::<i64>().prop_map(Frame::Integer),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(|b| Frame::Bulk(Bytes::from(b))),
        Just(Frame::Null),
    ];
    leaf.prop_recursive(4, 64, 6, |inner| {
        prop::collection::vec(inner, 0..6).prop_map(Frame::Array)
    })
}

fn frame() -> impl Strategy<Value = Frame> {
    leaf().prop_recursive(4, 64, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Frame::Array),
            prop::collection::vec(inner.clone(), 0..6).prop_map(Frame::Set),
            prop::collection::vec(inner.clone(), 1..6).prop_map(Frame::Push),
            prop::collection::vec((inner.clone(), inner), 0..4).prop_map(Frame::Map),
        ]
    })
}

proptest! {
    #[test]
    fn serialized_frames_parse_back(frame in frame()) {
        let bytes = frame.serialize();
        let mut cursor = Cursor::new(&bytes[..]);

        let parsed = Frame::parse(&mut cursor, Protocol::Resp3).unwrap();

        prop_assert_eq!(parsed, frame);
        prop_assert_eq!(cursor.position() as usize, bytes.len());
    }

    #[test]
    fn resp2_replies_parse_back(frame in resp2_frame()) {
        let mut bytes = Vec::new();
        support::encode(&frame, false, &mut bytes);
        let mut cursor = Cursor::new(&bytes[..]);

        let parsed = Frame::parse(&mut cursor, Protocol::Resp2).unwrap();

        prop_assert_eq!(parsed, frame);
        prop_assert_eq!(cursor.position() as usize, bytes.len());
    }

    #[test]
    fn codec_waits_for_the_rest_of_a_split_frame(frame in frame(), split in any::<prop::sample::Index>()) {
        let bytes = frame.serialize();
        let at = split.index(bytes.len());
        let mut codec = FrameCodec::new(Protocol::Resp3, DEFAULT_MAX_FRAME_SIZE);
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&bytes[..at]);
        prop_assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(&bytes[at..]);
        prop_assert_eq!(codec.decode(&mut buf).unwrap(), Some(frame));
        prop_assert!(buf.is_empty());
    }

    #[test]
    fn arbitrary_input_never_panics(input in prop::collection::vec(any::<u8>(), 0..256)) {
        let mut cursor = Cursor::new(&input[..]);
        let _ = Frame::parse(&mut cursor, Protocol::Resp3);

        let mut codec = FrameCodec::new(Protocol::Resp2, 1024);
        let mut buf = BytesMut::from(&input[..]);
        let _ = codec.decode(&mut buf);
    }
}
