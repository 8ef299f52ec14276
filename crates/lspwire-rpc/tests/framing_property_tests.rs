//! Property-based tests for the Content-Length codec
//!
//! **Property 1: Frame Round-Trip** - any message written on one end of a
//! stream reads back with the same id, method and params bytes.
//! **Property 2: Header Tolerance** - header case and unknown headers never
//! change the decoded message.
//! **Property 3: Chunking Independence** - how the bytes are split across
//! reads never changes the decoded message.
//! **Property 4: Concurrent Send Integrity** - frames written concurrently
//! through one writer are never interleaved.

use std::sync::Arc;

use lspwire_rpc::protocol::to_payload;
use lspwire_rpc::{encode_frame, FrameReader, FrameWriter, Message, RequestId};
use proptest::prelude::*;
use serde_json::Value;

/// Strategy for opaque params objects
fn arb_params() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(
        "[a-zA-Z_]{1,12}",
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            "[ -~]{0,24}".prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            prop::collection::vec(any::<i32>(), 0..5).prop_map(Value::from),
        ],
        0..6,
    )
    .prop_map(|map| Value::Object(map.into_iter().collect()))
}

fn arb_method() -> impl Strategy<Value = String> {
    "[a-z]{1,10}(/[a-zA-Z]{1,12})?"
}

fn arb_request() -> impl Strategy<Value = (i64, String, Value)> {
    (1i64..i64::MAX, arb_method(), arb_params())
}

fn request(id: i64, method: &str, params: &Value) -> Message {
    Message::request(
        RequestId::Number(id),
        method,
        to_payload(params).unwrap(),
    )
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    /// Property 1: Frame Round-Trip
    #[test]
    fn prop_frame_round_trip((id, method, params) in arb_request()) {
        let rt = runtime();
        let decoded = rt.block_on(async {
            let (a, b) = tokio::io::duplex(64 * 1024);
            let writer = FrameWriter::new(a);
            let mut reader = FrameReader::new(b);

            writer.send(&request(id, &method, &params)).await.unwrap();
            reader.read_message().await.unwrap()
        });

        prop_assert_eq!(decoded.id, Some(RequestId::Number(id)));
        prop_assert_eq!(decoded.method.as_deref(), Some(method.as_str()));
        let raw = decoded.params.unwrap();
        prop_assert_eq!(raw.get(), serde_json::to_string(&params).unwrap());
    }

    /// Property 2: Header Tolerance
    #[test]
    fn prop_header_case_and_extra_headers(
        (id, method, params) in arb_request(),
        upper in prop::collection::vec(any::<bool>(), 14),
        extra in prop::collection::vec(("X-[A-Za-z]{1,8}", "[a-z0-9 ]{0,16}"), 0..3),
    ) {
        let body = request(id, &method, &params).to_vec().unwrap();

        let name: String = "content-length"
            .chars()
            .zip(upper.iter())
            .map(|(c, up)| if *up { c.to_ascii_uppercase() } else { c })
            .collect();
        let mut frame = String::new();
        for (key, value) in &extra {
            frame.push_str(&format!("{}: {}\r\n", key, value));
        }
        frame.push_str(&format!("{}: {}\r\n\r\n", name, body.len()));

        let mut bytes = frame.into_bytes();
        bytes.extend_from_slice(&body);

        let rt = runtime();
        let decoded = rt.block_on(async {
            let mut reader = FrameReader::new(std::io::Cursor::new(bytes));
            reader.read_message().await.unwrap()
        });

        prop_assert_eq!(decoded.id, Some(RequestId::Number(id)));
        prop_assert_eq!(decoded.method.as_deref(), Some(method.as_str()));
    }

    /// Property 3: Chunking Independence
    #[test]
    fn prop_chunked_reads(
        (id, method, params) in arb_request(),
        cuts in prop::collection::vec(1usize..64, 1..16),
    ) {
        let message = request(id, &method, &params);
        let frame = encode_frame(&message).unwrap();

        let mut builder = tokio_test::io::Builder::new();
        let mut offset = 0;
        for cut in cuts.iter().cycle() {
            if offset >= frame.len() {
                break;
            }
            let end = (offset + cut).min(frame.len());
            builder.read(&frame[offset..end]);
            offset = end;
        }
        let mock = builder.build();

        let rt = runtime();
        let decoded = rt.block_on(async {
            let mut reader = FrameReader::new(mock);
            reader.read_message().await.unwrap()
        });

        prop_assert_eq!(decoded.id, Some(RequestId::Number(id)));
        let decoded_params = decoded.params.unwrap();
        let message_params = message.params.unwrap();
        prop_assert_eq!(decoded_params.get(), message_params.get());
    }

    /// Property 4: Concurrent Send Integrity
    #[test]
    fn prop_concurrent_sends_do_not_interleave(
        messages in prop::collection::vec((arb_method(), arb_params()), 1..24),
    ) {
        let count = messages.len();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut ids = rt.block_on(async move {
            // Small buffer so writers contend for the stream
            let (a, b) = tokio::io::duplex(256);
            let writer = Arc::new(FrameWriter::new(a));
            let mut reader = FrameReader::new(b);

            for (i, (method, params)) in messages.into_iter().enumerate() {
                let writer = writer.clone();
                tokio::spawn(async move {
                    writer.send(&request(i as i64 + 1, &method, &params)).await.unwrap();
                });
            }

            let mut ids = Vec::with_capacity(count);
            for _ in 0..count {
                let message = reader.read_message().await.unwrap();
                match message.id {
                    Some(RequestId::Number(id)) => ids.push(id),
                    other => panic!("unexpected id {:?}", other),
                }
            }
            ids
        });

        ids.sort_unstable();
        let expected: Vec<i64> = (1..=count as i64).collect();
        prop_assert_eq!(ids, expected);
    }
}
