use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::http::parser::{self, RequestParser};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;

const READ_CHUNK: usize = 1024;

/// Bounds applied while reading one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLimits {
    /// Messages whose buffered size exceeds this are answered with 413
    pub max_message_size: usize,
    /// Upper bound on a single socket read
    pub read_timeout: Duration,
}

pub struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
    limits: ReadLimits,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter),
    Closed,
}

enum Inbound {
    Request(Request),
    TooLarge,
    Closed,
}

enum Fill {
    Ready,
    Empty,
    TooLarge,
}

/// What the header block says about the body that follows it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Framing {
    /// Declared `Content-Length`, `None` when absent or unparsable
    pub content_length: Option<usize>,
    pub expects_continue: bool,
}

impl Framing {
    pub fn scan(head: &str) -> Self {
        let mut fields = std::collections::HashMap::new();
        let mut content_length = None;

        for line in head.split("\r\n").skip(1) {
            if let Some((name, value)) = parser::parse_field(line) {
                if name.eq_ignore_ascii_case("Content-Length") {
                    content_length = value.trim().parse().ok();
                }
                fields.insert(name, value);
            }
        }

        Self {
            content_length,
            expects_continue: parser::expects_continue(&fields),
        }
    }
}

impl Connection {
    pub fn new(stream: TcpStream, limits: ReadLimits) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK * 4),
            limits,
            state: ConnectionState::Reading,
        }
    }

    /// Runs one request/response exchange and closes.
    ///
    /// Returns the status that was sent, or `None` when the peer went away
    /// without sending anything.
    pub async fn run<F>(&mut self, mut handle: F) -> anyhow::Result<Option<StatusCode>>
    where
        F: FnMut(&Request) -> Response,
    {
        let mut sent = None;

        loop {
            match &mut self.state {
                ConnectionState::Reading => {
                    match self.read_request().await? {
                        Inbound::Request(req) => {
                            self.state = ConnectionState::Processing(req);
                        }
                        Inbound::TooLarge => {
                            tracing::warn!(
                                limit = self.limits.max_message_size,
                                "Request exceeds maximum message size"
                            );
                            let response = Response::payload_too_large();
                            sent = Some(response.status);
                            self.state = ConnectionState::Writing(ResponseWriter::new(&response));
                        }
                        Inbound::Closed => {
                            self.state = ConnectionState::Closed;
                        }
                    }
                }

                ConnectionState::Processing(req) => {
                    let response = handle(req);
                    sent = Some(response.status);
                    self.state = ConnectionState::Writing(ResponseWriter::new(&response));
                }

                ConnectionState::Writing(writer) => {
                    writer.write_to_stream(&mut self.stream).await?;
                    self.state = ConnectionState::Closed;
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(sent)
    }

    async fn read_request(&mut self) -> anyhow::Result<Inbound> {
        self.buffer.clear();

        match self.fill(message_complete).await? {
            Fill::Ready => {}
            Fill::Empty => return Ok(Inbound::Closed),
            Fill::TooLarge => return Ok(Inbound::TooLarge),
        }

        let mut parser = RequestParser::new();
        parser.feed(&self.buffer)?;

        if parser.needs_continue() {
            tracing::debug!("Sending 100 Continue");
            ResponseWriter::interim(StatusCode::Continue)
                .write_to_stream(&mut self.stream)
                .await?;

            let head_len = self.buffer.len();
            let declared = find_headers_end(&self.buffer)
                .map(|end| Framing::scan(&String::from_utf8_lossy(&self.buffer[..end])))
                .unwrap_or_default()
                .content_length;

            // Without a length, wait for whatever the client sends first.
            if declared != Some(0) {
                let expected = declared.unwrap_or(1);
                if let Fill::TooLarge = self
                    .fill(move |buf: &[u8]| buf.len() - head_len >= expected)
                    .await?
                {
                    return Ok(Inbound::TooLarge);
                }
            }

            parser.resume(&self.buffer[head_len..])?;
        }

        Ok(Inbound::Request(parser.finish()))
    }

    /// Reads until `complete` accepts the buffer, the peer closes, a read
    /// times out, or the size limit is exceeded.
    async fn fill<C>(&mut self, complete: C) -> anyhow::Result<Fill>
    where
        C: Fn(&[u8]) -> bool,
    {
        loop {
            if self.buffer.len() > self.limits.max_message_size {
                return Ok(Fill::TooLarge);
            }
            if complete(&self.buffer[..]) {
                return Ok(Fill::Ready);
            }

            self.buffer.reserve(READ_CHUNK);
            let read = timeout(self.limits.read_timeout, self.stream.read_buf(&mut self.buffer)).await;

            match read {
                Ok(Ok(0)) | Err(_) => {
                    return Ok(if self.buffer.is_empty() {
                        Fill::Empty
                    } else {
                        Fill::Ready
                    });
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }
}

/// A message is complete once its header block is closed and, unless the
/// client waits for `100 Continue`, the declared body has arrived.
fn message_complete(buf: &[u8]) -> bool {
    let Some(end) = find_headers_end(buf) else {
        return false;
    };
    let framing = Framing::scan(&String::from_utf8_lossy(&buf[..end]));
    framing.expects_continue || buf.len() - (end + 4) >= framing.content_length.unwrap_or(0)
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_reads_length_and_expect() {
        let framing = Framing::scan("POST / HTTP/1.1\r\ncontent-length: 12\r\nExpect: 100-continue");
        assert_eq!(framing.content_length, Some(12));
        assert!(framing.expects_continue);

        let framing = Framing::scan("GET / HTTP/1.1\r\nContent-Length: many");
        assert_eq!(framing.content_length, None);
        assert!(!framing.expects_continue);
    }

    #[test]
    fn message_waits_for_declared_body() {
        assert!(!message_complete(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhel"));
        assert!(message_complete(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello"));
        assert!(message_complete(b"GET / HTTP/1.1\r\n\r\n"));
        assert!(!message_complete(b"GET / HTTP/1.1\r\nHost: x\r\n"));
    }

    #[test]
    fn expect_continue_completes_at_header_end() {
        assert!(message_complete(
            b"POST / HTTP/1.1\r\nContent-Length: 5\r\nExpect: 100-continue\r\n\r\n"
        ));
    }
}
