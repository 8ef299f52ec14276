//! In-process fake language server used by the end-to-end suites

#![allow(dead_code)]

use std::sync::Arc;

use lspwire_rpc::{Client, ClientOptions, FrameReader, FrameWriter, Message, RequestId};
use serde_json::value::RawValue;
use serde_json::Value;

/// Peer end of a client's stream
pub struct FakePeer {
    pub reader: FrameReader,
    pub writer: Arc<FrameWriter>,
}

impl FakePeer {
    /// Next frame the client wrote
    pub async fn recv(&mut self) -> Message {
        self.reader
            .read_message()
            .await
            .expect("peer failed to read frame")
    }

    /// Answer `id` with a JSON result
    pub async fn respond(&self, id: RequestId, result: &Value) {
        let raw = RawValue::from_string(result.to_string()).expect("invalid result json");
        self.writer
            .send(&Message::response(id, Some(raw)))
            .await
            .expect("peer failed to respond");
    }

    /// Push a notification to the client
    pub async fn notify(&self, method: &str, params: &Value) {
        let raw = RawValue::from_string(params.to_string()).expect("invalid params json");
        self.writer
            .send(&Message::notification(method, Some(raw)))
            .await
            .expect("peer failed to notify");
    }

    /// Answer every request by echoing its params back as the result
    pub fn spawn_echo(self) -> tokio::task::JoinHandle<()> {
        let FakePeer { mut reader, writer } = self;
        tokio::spawn(async move {
            while let Ok(message) = reader.read_message().await {
                let (Some(id), Some(_)) = (message.id.clone(), message.method.as_ref()) else {
                    continue;
                };
                let result = message.params.clone();
                if writer.send(&Message::response(id, result)).await.is_err() {
                    break;
                }
            }
        })
    }
}

/// Started client wired to a fake peer over an in-memory pipe
pub fn connect(options: ClientOptions) -> (Client, FakePeer) {
    init_tracing();

    let (local, remote) = tokio::io::duplex(256 * 1024);
    let client = Client::new(options);
    client.start(local).expect("client failed to start");

    let (read, write) = tokio::io::split(remote);
    (
        client,
        FakePeer {
            reader: FrameReader::new(read),
            writer: Arc::new(FrameWriter::new(write)),
        },
    )
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
