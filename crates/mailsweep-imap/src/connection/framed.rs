//! Line and literal framing over an async byte stream.
//!
//! Server responses are CRLF-terminated lines that may embed `{n}` literals.
//! A literal's bytes follow the line that announces it, and the response
//! continues after them.

#![allow(clippy::missing_errors_doc)]

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::types::Tag;
use crate::{Error, Result};

const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Longest single line accepted before the connection is treated as broken.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Largest literal accepted. Header-only fetches stay far below this.
const MAX_LITERAL_SIZE: usize = 16 * 1024 * 1024;

/// Buffered reader/writer that yields whole responses.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Reads one complete response, including any embedded literals.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = self.read_line().await?;
            response.extend_from_slice(&line);

            let Some(len) = literal_length(&line) else {
                break;
            };
            if len > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "literal of {len} bytes exceeds {MAX_LITERAL_SIZE}"
                )));
            }
            let start = response.len();
            response.resize(start + len, 0);
            self.reader.read_exact(&mut response[start..]).await?;
        }

        Ok(response)
    }

    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            // CRLF split across two reads.
            if line.ends_with(b"\r") && buf[0] == b'\n' {
                line.push(b'\n');
                self.reader.consume(1);
                return Ok(line);
            }

            if let Some(pos) = find_crlf(buf) {
                line.extend_from_slice(&buf[..pos + 2]);
                self.reader.consume(pos + 2);
                return Ok(line);
            }

            let len = buf.len();
            line.extend_from_slice(buf);
            self.reader.consume(len);

            if line.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }
    }

    /// Writes and flushes one serialized command.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Shuts down the write half. Errors are ignored; the peer may be gone.
    pub async fn shutdown(&mut self) {
        let _ = self.reader.get_mut().shutdown().await;
    }

    /// Returns the inner stream, dropping any buffered input.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Extracts `n` from a line ending in `{n}\r\n` or `{n+}\r\n`.
fn literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let line = line.strip_suffix(b"}")?;
    let line = line.strip_suffix(b"+").unwrap_or(line);
    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Reads responses until the one tagged with `tag`, returning all of them.
///
/// If the server sends an untagged BYE and then closes the connection before
/// the tagged completion, the result is [`Error::Bye`] with the server's text.
pub async fn read_until_tagged<S>(framed: &mut FramedStream<S>, tag: &Tag) -> Result<Vec<Vec<u8>>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let prefix = tag.as_str().as_bytes();
    let mut responses = Vec::new();
    let mut bye: Option<String> = None;

    loop {
        let response = match framed.read_response().await {
            Ok(response) => response,
            Err(Error::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(bye.map_or(Error::Io(err), Error::Bye));
            }
            Err(err) => return Err(err),
        };

        if let Some(text) = response.strip_prefix(b"* BYE") {
            bye = Some(String::from_utf8_lossy(text).trim().to_string());
        }

        let done = response.starts_with(prefix) && response.get(prefix.len()) == Some(&b' ');
        responses.push(response);
        if done {
            return Ok(responses);
        }
    }
}
