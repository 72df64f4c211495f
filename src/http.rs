use once_cell::unsync::OnceCell;
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::status::StatusCode;

/// A single framed HTTP request.
///
/// Immutable once constructed; the query parameter map is parsed lazily on
/// first access and memoized for the lifetime of the instance.
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    target: String,
    version: String,
    headers: FxHashMap<String, String>,
    body: String,
    query: OnceCell<FxHashMap<String, String>>,
}

impl Request {
    pub fn new(
        method: String,
        target: String,
        version: String,
        headers: FxHashMap<String, String>,
        body: String,
    ) -> Self {
        Request {
            method,
            target,
            version,
            headers,
            body,
            query: OnceCell::new(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// The raw request target: path plus optional `?query`.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &FxHashMap<String, String> {
        &self.headers
    }

    /// Header lookup is case-sensitive; duplicate keys were resolved
    /// last-write-wins during framing.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// The target up to the first `?`, used as the registry lookup key.
    pub fn resource(&self) -> &str {
        match self.target.find('?') {
            Some(index) => &self.target[..index],
            None => &self.target,
        }
    }

    /// The substring after the first `?`, or `""` when there is none.
    pub fn query_string(&self) -> &str {
        match self.target.find('?') {
            Some(index) => &self.target[index + 1..],
            None => "",
        }
    }

    /// Parsed query parameters, memoized per instance.
    ///
    /// Chunks are split on `&`, then on the first `=`; a chunk without `=`
    /// yields an empty-string value.
    pub fn query_params(&self) -> &FxHashMap<String, String> {
        self.query.get_or_init(|| {
            let mut params = FxHashMap::default();
            for chunk in self.query_string().split('&') {
                if chunk.is_empty() {
                    continue;
                }
                match chunk.find('=') {
                    Some(index) => {
                        params.insert(chunk[..index].to_string(), chunk[index + 1..].to_string())
                    }
                    None => params.insert(chunk.to_string(), String::new()),
                };
            }
            params
        })
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query_params().get(key).map(String::as_str)
    }

    /// A copy of this request with a different target. The query parameter
    /// cache is not carried over.
    pub fn with_target(&self, target: String) -> Request {
        Request::new(
            self.method.clone(),
            target,
            self.version.clone(),
            self.headers.clone(),
            self.body.clone(),
        )
    }

    pub fn with_header(&self, key: String, value: String) -> Request {
        let mut headers = self.headers.clone();
        headers.insert(key, value);
        Request::new(
            self.method.clone(),
            self.target.clone(),
            self.version.clone(),
            headers,
            self.body.clone(),
        )
    }

    pub fn with_body(&self, body: String) -> Request {
        Request::new(
            self.method.clone(),
            self.target.clone(),
            self.version.clone(),
            self.headers.clone(),
            body,
        )
    }
}

/// A mutable HTTP response builder that serializes to wire bytes.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    reason: Option<String>,
    headers: FxHashMap<String, String>,
    body: Option<String>,
}

impl Default for Response {
    fn default() -> Self {
        Response::new(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Response {
            status,
            reason: None,
            headers: FxHashMap::default(),
            body: None,
        }
    }

    pub fn with_body(status: StatusCode, body: impl Into<String>) -> Self {
        let mut response = Response::new(status);
        response.set_body(body);
        response
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Set the status from a numeric code. Unregistered codes are logged
    /// and leave the current status in place.
    pub fn set_status_code(&mut self, code: u16) {
        match StatusCode::from_code(code) {
            Some(status) => self.status = status,
            None => warn!(code, "unknown status code, keeping current status"),
        }
    }

    /// The reason phrase; falls back to the status name when unset.
    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or(self.status.name())
    }

    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn headers(&self) -> &FxHashMap<String, String> {
        &self.headers
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Set the body and a matching `Content-Length` header.
    ///
    /// The length is counted in characters, mirroring the framer, which
    /// reads request bodies character by character.
    pub fn set_body(&mut self, body: impl Into<String>) {
        let body = body.into();
        self.headers
            .insert("Content-Length".to_string(), body.chars().count().to_string());
        self.body = Some(body);
    }

    /// Serialize to wire form: status line, headers in unspecified order,
    /// blank line, body verbatim.
    pub fn to_wire(&self) -> String {
        let mut wire = String::new();
        wire.push_str("HTTP/1.1 ");
        wire.push_str(&self.status.code().to_string());
        wire.push(' ');
        wire.push_str(self.reason());
        wire.push_str("\r\n");

        for (key, value) in &self.headers {
            wire.push_str(key);
            wire.push_str(": ");
            wire.push_str(value);
            wire.push_str("\r\n");
        }

        wire.push_str("\r\n");

        if let Some(body) = &self.body {
            wire.push_str(body);
        }

        wire
    }
}
