//! Line-oriented HTTP/1.1 request parser.
//!
//! Input is split on CRLF and every line is fed through [`transition`],
//! which maps `(phase, line)` to the next phase plus an [`Effect`] that the
//! [`RequestParser`] applies to the request under construction:
//!
//! ```text
//!   Method ──request line──▶ Fields ──blank line──▶ Content
//!                                          │
//!                                          └─(multipart)──▶ Multipart(slot)
//! ```
//!
//! Malformed input never aborts the parse. A bad request line leaves the
//! request invalid, a header line without a colon is skipped, and the rest
//! of the message is still parsed best-effort.

use crate::http::request::{BodyKind, Method, Request};
use std::collections::HashMap;

/// Prefix of an `Expect` value asking for an interim `100 Continue`.
const EXPECT_CONTINUE_PREFIX: &str = "100-";
const MULTIPART_FORM_DATA: &str = "multipart/form-data";
const BOUNDARY_PARAM: &str = "boundary=";
const FORM_NAME_MARKER: &str = "form-data; name=";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The parser reached a state it can never legally be in.
    #[error("unrecoverable parser state: {0}")]
    Unrecoverable(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the first non-empty line
    Method,
    /// Reading `Name: value` lines until a blank line
    Fields,
    /// Concatenating plain body lines
    Content,
    /// Reading `multipart/form-data` parts
    Multipart(FormSlot),
}

/// Two-slot state of the multipart sub-parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormSlot {
    AwaitingName,
    AwaitingValue(String),
}

/// Side effect of consuming one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    RequestLine {
        method: Method,
        resource: Option<String>,
    },
    Field {
        name: String,
        value: String,
    },
    HeadersComplete {
        boundary: Option<String>,
    },
    Content(String),
    FormField {
        name: String,
        value: String,
    },
}

/// Consumes one line in `phase`.
///
/// `request` is the request parsed so far; it supplies the header fields
/// (to decide on multipart at the end of the header block) and the
/// boundary once the body is reached.
pub fn transition(phase: &Phase, line: &str, request: &Request) -> Result<(Phase, Effect), ParseError> {
    let step = match phase {
        Phase::Method => {
            if line.is_empty() {
                (Phase::Method, Effect::None)
            } else {
                let (method, resource) = parse_request_line(line);
                (Phase::Fields, Effect::RequestLine { method, resource })
            }
        }

        Phase::Fields => {
            if line.is_empty() {
                let boundary = multipart_boundary(&request.fields);
                let next = match boundary {
                    Some(_) => Phase::Multipart(FormSlot::AwaitingName),
                    None => Phase::Content,
                };
                (next, Effect::HeadersComplete { boundary })
            } else {
                match parse_field(line) {
                    Some((name, value)) => (Phase::Fields, Effect::Field { name, value }),
                    None => (Phase::Fields, Effect::None),
                }
            }
        }

        Phase::Content => {
            if line.is_empty() {
                (Phase::Content, Effect::None)
            } else {
                (Phase::Content, Effect::Content(line.to_string()))
            }
        }

        Phase::Multipart(slot) => {
            let boundary = request
                .boundary
                .as_deref()
                .ok_or(ParseError::Unrecoverable("multipart body without a boundary"))?;
            multipart_step(slot, line, boundary)
        }
    };

    Ok(step)
}

fn multipart_step(slot: &FormSlot, line: &str, boundary: &str) -> (Phase, Effect) {
    if line.is_empty() || line.contains(boundary) {
        return (Phase::Multipart(slot.clone()), Effect::None);
    }

    match slot {
        FormSlot::AwaitingName => match form_name(line) {
            Some(name) => (Phase::Multipart(FormSlot::AwaitingValue(name)), Effect::None),
            None => (Phase::Multipart(FormSlot::AwaitingName), Effect::None),
        },
        FormSlot::AwaitingValue(name) => (
            Phase::Multipart(FormSlot::AwaitingName),
            Effect::FormField {
                name: name.clone(),
                value: line.to_string(),
            },
        ),
    }
}

/// Splits `METHOD resource VERSION`. The resource is `None` when the line
/// has no space or the resource is empty.
pub fn parse_request_line(line: &str) -> (Method, Option<String>) {
    match line.split_once(' ') {
        Some((token, rest)) if !token.is_empty() => {
            let resource = rest.split(' ').next().unwrap_or("");
            let resource = (!resource.is_empty()).then(|| resource.to_string());
            (Method::from_token(token), resource)
        }
        _ => (Method::from_token(line), None),
    }
}

/// Splits a header line on its first colon. The single conventional space
/// after the colon is dropped; nothing else is trimmed from the value.
pub fn parse_field(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value.strip_prefix(' ').unwrap_or(value);
    Some((name.to_string(), value.to_string()))
}

/// Returns the boundary of a `multipart/form-data; boundary=...` content type.
pub fn multipart_boundary(fields: &HashMap<String, String>) -> Option<String> {
    let value = fields.get("Content-Type")?;
    let (kind, params) = value.split_once(';')?;
    if kind != MULTIPART_FORM_DATA {
        return None;
    }
    let at = params.find(BOUNDARY_PARAM)?;
    let boundary = &params[at + BOUNDARY_PARAM.len()..];
    (!boundary.is_empty()).then(|| boundary.to_string())
}

/// True when the `Expect` field asks for a `100 Continue` interim response.
pub fn expects_continue(fields: &HashMap<String, String>) -> bool {
    fields
        .get("Expect")
        .is_some_and(|v| v.starts_with(EXPECT_CONTINUE_PREFIX))
}

fn form_name(line: &str) -> Option<String> {
    if !line.contains(FORM_NAME_MARKER) {
        return None;
    }
    let start = line.find('"')? + 1;
    let len = line[start..].find('"')?;
    Some(line[start..start + len].to_string())
}

/// Incremental request parser.
///
/// Feed the first receive buffer with [`feed`](Self::feed). If
/// [`needs_continue`](Self::needs_continue) reports true the caller sends
/// `100 Continue`, reads once more and hands that buffer to
/// [`resume`](Self::resume). [`finish`](Self::finish) yields the request.
#[derive(Debug)]
pub struct RequestParser {
    phase: Phase,
    request: Request,
    body_started: bool,
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            phase: Phase::Method,
            request: Request::empty(String::new()),
            body_started: false,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Parses every line of `buf`, continuing from the current phase.
    pub fn feed(&mut self, buf: &[u8]) -> Result<(), ParseError> {
        let text = String::from_utf8_lossy(buf);
        self.request.raw.push_str(&text);

        for line in text.split("\r\n") {
            self.step(line)?;
        }
        Ok(())
    }

    /// True when the client is waiting for `100 Continue` before it sends
    /// the body.
    pub fn needs_continue(&self) -> bool {
        self.request.is_valid && !self.body_started && expects_continue(&self.request.fields)
    }

    /// Parses the buffer read after `100 Continue` as body. A header block
    /// that was never closed by a blank line is closed first.
    pub fn resume(&mut self, buf: &[u8]) -> Result<(), ParseError> {
        match self.phase {
            Phase::Method => {
                return Err(ParseError::Unrecoverable(
                    "body continuation requested before a request line was parsed",
                ));
            }
            Phase::Fields => self.step("")?,
            Phase::Content | Phase::Multipart(_) => {}
        }
        self.feed(buf)
    }

    pub fn finish(self) -> Request {
        let request = self.request;

        if request.body_kind() == BodyKind::Unknown && request.has_content() {
            tracing::warn!(
                resource = request.resource().unwrap_or(""),
                content_type = request.field("Content-Type").unwrap_or(""),
                "Request body has no recognised type, kept as plain content"
            );
        }

        request
    }

    fn step(&mut self, line: &str) -> Result<(), ParseError> {
        if !line.is_empty() && matches!(self.phase, Phase::Content | Phase::Multipart(_)) {
            self.body_started = true;
        }

        let (next, effect) = transition(&self.phase, line, &self.request)?;
        self.phase = next;
        self.apply(effect);
        Ok(())
    }

    fn apply(&mut self, effect: Effect) {
        let request = &mut self.request;
        match effect {
            Effect::None => {}
            Effect::RequestLine { method, resource } => {
                request.method = method;
                request.is_valid = resource.is_some();
                request.resource = resource;
            }
            Effect::Field { name, value } => {
                request.fields.insert(name, value);
            }
            Effect::HeadersComplete { boundary } => {
                request.boundary = boundary;
            }
            Effect::Content(line) => {
                request.content.get_or_insert_with(String::new).push_str(&line);
            }
            Effect::FormField { name, value } => {
                request.form_data.insert(name, value);
            }
        }
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a complete message held in one buffer, without any interim
/// response exchange.
pub fn parse_request(buf: &[u8]) -> Result<Request, ParseError> {
    let mut parser = RequestParser::new();
    parser.feed(buf)?;
    Ok(parser.finish())
}
