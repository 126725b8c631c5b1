use std::collections::HashMap;

/// HTTP status codes supported by the server.
///
/// Common HTTP status codes used in responses:
/// - `Continue` (100): Interim response, client may send the body
/// - `Ok` (200): Request successful
/// - `TemporaryRedirect` (307): Retry the same request at `Location`
/// - `NotFound` (404): No route for the resource
/// - `PayloadTooLarge` (413): Message exceeded the buffer limit
/// - `ServiceUnavailable` (503): No member available to take the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 100 Continue
    Continue,
    /// 200 OK
    Ok,
    /// 201 Created
    Created,
    /// 204 No Content
    NoContent,
    /// 307 Temporary Redirect
    TemporaryRedirect,
    /// 400 Bad Request
    BadRequest,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 413 Payload Too Large
    PayloadTooLarge,
    /// 500 Internal Server Error
    InternalServerError,
    /// 503 Service Unavailable
    ServiceUnavailable,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use hive::http::response::StatusCode;
    /// assert_eq!(StatusCode::Continue.as_u16(), 100);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Continue => 100,
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::NoContent => 204,
            StatusCode::TemporaryRedirect => 307,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::InternalServerError => 500,
            StatusCode::ServiceUnavailable => 503,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Continue => "Continue",
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::NoContent => "No Content",
            StatusCode::TemporaryRedirect => "Temporary Redirect",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }

    /// 1xx responses carry no headers or body.
    pub fn is_interim(&self) -> bool {
        self.as_u16() < 200
    }
}

/// The response a handler fills in.
///
/// Handlers receive it by `&mut` and describe the outcome through the
/// setters; the writer serialises whatever is left here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The HTTP status code
    pub status: StatusCode,
    /// HTTP headers as key-value pairs
    pub headers: HashMap<String, String>,
    /// Response body as bytes
    pub body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    /// Adds or replaces a header.
    pub fn header(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn content_type(&mut self, mime: &str) -> &mut Self {
        self.header("Content-Type", mime)
    }

    pub fn body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Ends the exchange with `status` and a short plain-text body naming it.
    pub fn end(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self.body = format!("{} {}", status.as_u16(), status.reason_phrase()).into_bytes();
        self.content_type("text/plain")
    }

    /// Creates a simple 200 OK response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        let mut response = Self::new(StatusCode::Ok);
        response.body(body);
        response
    }

    /// Creates a 404 Not Found response.
    pub fn not_found() -> Self {
        let mut response = Self::default();
        response.end(StatusCode::NotFound);
        response
    }

    pub fn payload_too_large() -> Self {
        let mut response = Self::default();
        response.end(StatusCode::PayloadTooLarge);
        response
    }

    /// Creates a 307 redirect to `location`.
    pub fn redirect(location: &str) -> Self {
        let mut response = Self::new(StatusCode::TemporaryRedirect);
        response.header("Location", location);
        response
    }
}

/// Canned landing page served by the default fallback handler.
pub fn welcome_page() -> &'static str {
    "<!doctype html>\r\n\
     <html><head><title>hive</title></head><body><h1>Hello World</h1></body></html>\r\n"
}
