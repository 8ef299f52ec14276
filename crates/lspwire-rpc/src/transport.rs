//! Content-Length framed message transport
//!
//! This module handles the low-level wire protocol: every message is a JSON
//! body preceded by an HTTP-style header block.
//!
//! ```text
//! Content-Length: 47\r\n
//! \r\n
//! {"jsonrpc":"2.0","method":"initialized"}
//! ```
//!
//! The codec is split into a [`FrameWriter`] that any number of tasks may
//! share (writes are serialized by a lock) and a [`FrameReader`] that owns the
//! single read cursor and must be driven by one task at a time.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, RpcError};
use crate::protocol::Message;

/// Name of the mandatory length header (matched case-insensitively)
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Longest header line accepted before the frame is rejected
pub const MAX_HEADER_LINE: usize = 8 * 1024;

/// Default upper bound on a single frame body
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Boxed read half of a duplex stream
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a duplex stream
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Encode a message as a complete frame (header block plus body)
pub fn encode_frame(message: &Message) -> Result<Vec<u8>> {
    let body = message.to_vec()?;
    let header = format!("{}: {}\r\n\r\n", CONTENT_LENGTH, body.len());

    let mut frame = Vec::with_capacity(header.len() + body.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Write half of the codec
///
/// Concurrent callers never interleave: the whole frame is written while the
/// send lock is held.
pub struct FrameWriter {
    writer: Mutex<BoxWriter>,
}

impl FrameWriter {
    /// Wrap a writer
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Serialize and write a single message
    pub async fn send(&self, message: &Message) -> Result<()> {
        let frame = encode_frame(message)?;

        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;

        debug!(
            method = message.method.as_deref().unwrap_or(""),
            id = ?message.id,
            bytes = frame.len(),
            "Sent frame"
        );
        Ok(())
    }

    /// Shut down the write side of the stream
    pub async fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await?;
        Ok(())
    }
}

/// Read half of the codec
pub struct FrameReader {
    reader: BufReader<BoxReader>,
    max_frame_size: usize,
}

impl FrameReader {
    /// Wrap a reader with the default frame size limit
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::with_max_frame_size(reader, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Wrap a reader with an explicit frame size limit
    pub fn with_max_frame_size<R>(reader: R, max_frame_size: usize) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let reader: BoxReader = Box::new(reader);
        Self {
            reader: BufReader::new(reader),
            max_frame_size,
        }
    }

    /// Read the next frame and decode its body
    ///
    /// Returns [`RpcError::ConnectionClosed`] when the stream ends cleanly
    /// between frames and [`RpcError::UnexpectedEof`] when it ends inside one.
    pub async fn read_message(&mut self) -> Result<Message> {
        let body = self.read_frame().await?;
        Message::from_slice(&body)
    }

    /// Read the next frame body without decoding it
    pub async fn read_frame(&mut self) -> Result<Vec<u8>> {
        let content_length = self.read_headers().await?;

        let mut body = vec![0u8; content_length];
        let mut received = 0;
        while received < content_length {
            let n = self.reader.read(&mut body[received..]).await?;
            if n == 0 {
                return Err(RpcError::UnexpectedEof {
                    expected: content_length,
                    received,
                });
            }
            received += n;
        }

        debug!(bytes = content_length, "Received frame");
        Ok(body)
    }

    /// Read header lines up to the blank separator and return the body length
    async fn read_headers(&mut self) -> Result<usize> {
        let mut content_length = None;
        let mut header_bytes = 0;
        let mut line = Vec::new();

        loop {
            line.clear();
            let n = (&mut self.reader)
                .take(MAX_HEADER_LINE as u64 + 1)
                .read_until(b'\n', &mut line)
                .await?;

            if n == 0 {
                if header_bytes == 0 {
                    return Err(RpcError::ConnectionClosed);
                }
                return Err(RpcError::UnexpectedEof {
                    expected: header_bytes + 1,
                    received: header_bytes,
                });
            }
            if line.last() != Some(&b'\n') {
                if n > MAX_HEADER_LINE {
                    return Err(RpcError::InvalidContentLength(format!(
                        "header line longer than {} bytes",
                        MAX_HEADER_LINE
                    )));
                }
                return Err(RpcError::UnexpectedEof {
                    expected: header_bytes + n + 1,
                    received: header_bytes + n,
                });
            }
            header_bytes += n;

            let text = String::from_utf8_lossy(&line);
            let trimmed = text.trim_end_matches(&['\r', '\n'][..]);
            if trimmed.is_empty() {
                break;
            }

            // Lines without a colon and unknown headers are ignored
            let Some((key, value)) = trimmed.split_once(':') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
                let value = value.trim();
                let length = value
                    .parse::<usize>()
                    .ok()
                    .filter(|length| *length > 0)
                    .ok_or_else(|| RpcError::InvalidContentLength(value.to_string()))?;
                content_length = Some(length);
            }
        }

        let content_length = content_length.ok_or(RpcError::MissingContentLength)?;
        if content_length > self.max_frame_size {
            return Err(RpcError::FrameTooLarge {
                size: content_length,
                limit: self.max_frame_size,
            });
        }
        Ok(content_length)
    }
}
