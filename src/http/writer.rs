use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::http::response::{Response, StatusCode};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serialises a response. `Content-Length` is filled in when the handler
/// did not set one, and every response closes the connection.
pub fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut buf = status_line(resp.status);

    for (k, v) in &resp.headers {
        if k.eq_ignore_ascii_case("Connection") {
            continue;
        }
        push_header(&mut buf, k, v);
    }

    if !resp.headers.keys().any(|k| k.eq_ignore_ascii_case("Content-Length")) {
        push_header(&mut buf, "Content-Length", &resp.body.len().to_string());
    }
    push_header(&mut buf, "Connection", "close");

    // Header/body separator
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(&resp.body);

    buf
}

/// Serialises an interim (1xx) response: a bare status line.
pub fn serialize_interim(status: StatusCode) -> Vec<u8> {
    let mut buf = status_line(status);
    buf.extend_from_slice(b"\r\n");
    buf
}

fn status_line(status: StatusCode) -> Vec<u8> {
    format!("{} {} {}\r\n", HTTP_VERSION, status.as_u16(), status.reason_phrase()).into_bytes()
}

fn push_header(buf: &mut Vec<u8>, key: &str, value: &str) {
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response) -> Self {
        Self {
            buffer: serialize_response(response),
            written: 0,
        }
    }

    pub fn interim(status: StatusCode) -> Self {
        Self {
            buffer: serialize_interim(status),
            written: 0,
        }
    }

    pub async fn write_to_stream(
        &mut self,
        stream: &mut TcpStream,
    ) -> anyhow::Result<()> {
        while self.written < self.buffer.len() {
            let n = stream
                .write(&self.buffer[self.written..])
                .await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        stream.flush().await?;
        Ok(())
    }
}
