use std::collections::HashMap;

/// HTTP request methods.
///
/// Tokens outside the recognised set parse as `UNKNOWN`; the request is
/// still routed by its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// GET - Retrieve a resource
    GET,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// TRACE - Message loop-back test
    TRACE,
    /// CONNECT - Establish a tunnel
    CONNECT,
    /// Any token not listed above
    UNKNOWN,
}

/// How the body of a request was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// `multipart/form-data`; fields land in `form_data`
    Multipart,
    /// No recognised body type; any body text lands in `content`
    Unknown,
}

/// Represents a parsed HTTP request from a client.
///
/// Built in a single parse pass and owned by the connection that read it.
/// Malformed input never fails the parse; check `is_valid` instead.
#[derive(Debug, Clone)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The request path used as routing key, `None` if the request line was malformed
    pub resource: Option<String>,
    /// Header fields; later duplicates overwrite earlier ones
    pub fields: HashMap<String, String>,
    /// Multipart form fields
    pub form_data: HashMap<String, String>,
    /// Body text for non-multipart requests
    pub content: Option<String>,
    /// True when both a method token and a non-empty resource were found
    pub is_valid: bool,
    /// Multipart boundary, present only for `multipart/form-data` bodies
    pub boundary: Option<String>,
    /// The text as received, before parsing
    pub raw: String,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Method,
    resource: Option<String>,
    fields: HashMap<String, String>,
    form_data: HashMap<String, String>,
    content: Option<String>,
    boundary: Option<String>,
}

impl Method {
    /// Maps a request-line token to a method.
    ///
    /// Matching is case-sensitive.
    ///
    /// # Example
    ///
    /// ```
    /// # use hive::http::request::Method;
    /// assert_eq!(Method::from_token("GET"), Method::GET);
    /// assert_eq!(Method::from_token("get"), Method::UNKNOWN);
    /// ```
    pub fn from_token(token: &str) -> Self {
        match token {
            "OPTIONS" => Method::OPTIONS,
            "GET" => Method::GET,
            "HEAD" => Method::HEAD,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "TRACE" => Method::TRACE,
            "CONNECT" => Method::CONNECT,
            _ => Method::UNKNOWN,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::OPTIONS => "OPTIONS",
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::TRACE => "TRACE",
            Method::CONNECT => "CONNECT",
            Method::UNKNOWN => "UNKNOWN",
        }
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: Method::GET,
            resource: None,
            fields: HashMap::new(),
            form_data: HashMap::new(),
            content: None,
            boundary: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form_data.insert(key.into(), value.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Marks the request as `multipart/form-data` with the given boundary.
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Builds the request. Validity follows the parser's rule: a
    /// non-empty resource is required.
    pub fn build(self) -> Request {
        let resource = self.resource.filter(|r| !r.is_empty());
        let is_valid = resource.is_some();
        Request {
            method: self.method,
            resource,
            fields: self.fields,
            form_data: self.form_data,
            content: self.content,
            is_valid,
            boundary: self.boundary,
            raw: String::new(),
        }
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    pub(crate) fn empty(raw: String) -> Self {
        Self {
            method: Method::UNKNOWN,
            resource: None,
            fields: HashMap::new(),
            form_data: HashMap::new(),
            content: None,
            is_valid: false,
            boundary: None,
            raw,
        }
    }

    /// Retrieves a header value by its exact name.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|v| v.as_str())
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Retrieves a multipart form value by field name.
    pub fn form(&self, key: &str) -> Option<&str> {
        self.form_data.get(key).map(|v| v.as_str())
    }

    pub fn has_form(&self, key: &str) -> bool {
        self.form_data.contains_key(key)
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn is_method(&self, method: Method) -> bool {
        self.method == method
    }

    pub fn is_multipart(&self) -> bool {
        self.boundary.is_some()
    }

    pub fn body_kind(&self) -> BodyKind {
        if self.is_multipart() {
            BodyKind::Multipart
        } else {
            BodyKind::Unknown
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}
