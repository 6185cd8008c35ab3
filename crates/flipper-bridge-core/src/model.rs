//! Bridge data model types.
//!
//! These types describe one transaction as plain data:
//! - `RequestDescriptor` for an outbound HTTP request
//! - `ResponseHead` for the status line the host sees first
//! - `SocketTarget` for a WebSocket session

use std::fmt;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Upper-case method name as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a response body is written back over the serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyMode {
    /// Head announces the server's content length (or -1), body follows as received.
    Text,
    /// Head always announces the exact byte count, body follows as raw bytes.
    Bytes,
}

/// An HTTP transaction described as plain data.
///
/// Headers are kept as an ordered list and applied in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub mode: BodyMode,
    pub url: String,
    pub payload: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl RequestDescriptor {
    /// Create a descriptor with no payload and no headers.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            mode: BodyMode::Text,
            url: url.into(),
            payload: None,
            headers: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: BodyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Number of headers (the `headerSize` of the parallel-array form).
    pub fn header_count(&self) -> usize {
        self.headers.len()
    }
}

/// Status and announced length of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    /// `None` when the server did not announce a length.
    pub content_length: Option<u64>,
}

impl ResponseHead {
    pub fn new(status: u16, content_length: Option<u64>) -> Self {
        Self {
            status,
            content_length,
        }
    }

    /// Content length as reported to the host, -1 when unknown.
    pub fn wire_length(&self) -> i64 {
        self.content_length
            .and_then(|len| i64::try_from(len).ok())
            .unwrap_or(-1)
    }
}

/// Target of a WebSocket session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketTarget {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl SocketTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_length_unknown_is_negative_one() {
        assert_eq!(ResponseHead::new(200, None).wire_length(), -1);
        assert_eq!(ResponseHead::new(200, Some(0)).wire_length(), 0);
        assert_eq!(ResponseHead::new(404, Some(17)).wire_length(), 17);
    }

    #[test]
    fn test_headers_keep_insertion_order() {
        let request = RequestDescriptor::new(HttpMethod::Post, "http://example.com")
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "*/*")
            .with_payload("{}");

        assert_eq!(request.header_count(), 2);
        assert_eq!(request.headers[0].0, "Content-Type");
        assert_eq!(request.headers[1].0, "Accept");
        assert_eq!(request.mode, BodyMode::Text);
    }

    #[test]
    fn test_method_display() {
        assert_eq!(HttpMethod::Delete.to_string(), "DELETE");
        assert_eq!(HttpMethod::Get.as_str(), "GET");
    }
}
