//! Captured responses.

use std::fmt;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{CheckError, CheckResult};

/// An immutable snapshot of an HTTP response.
///
/// The body is drained eagerly when the capture is created, so it can be read,
/// decoded and asserted on any number of times.
#[derive(Clone)]
pub struct ResponseCapture {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    text: String,
}

impl ResponseCapture {
    /// Drains a live client response into a capture.
    pub async fn from_response(response: reqwest::Response) -> CheckResult<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| CheckError::BodyRead(e.to_string()))?;

        Ok(Self::new(status, headers, body))
    }

    /// Creates a capture from raw parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        let text = String::from_utf8_lossy(&body).into_owned();
        Self {
            status,
            headers,
            body,
            text,
        }
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the status code as a u16.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Returns true if the status is successful (2xx).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the status is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    /// Returns true if the status is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Returns the full header multimap.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Gets the first value of a header.
    #[must_use]
    pub fn header(&self, name: impl AsRef<str>) -> Option<&HeaderValue> {
        self.headers.get(name.as_ref())
    }

    /// Gets the first value of a header as a string.
    ///
    /// Values that are not visible ASCII are treated as absent.
    #[must_use]
    pub fn header_str(&self, name: impl AsRef<str>) -> Option<&str> {
        self.header(name).and_then(|v| v.to_str().ok())
    }

    /// Gets every value of a header, in received order.
    #[must_use]
    pub fn header_values(&self, name: impl AsRef<str>) -> Vec<&str> {
        self.headers
            .get_all(name.as_ref())
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// Returns the Content-Type header value.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header_str(header::CONTENT_TYPE.as_str())
    }

    /// Returns the ETag header value.
    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.header_str(header::ETAG.as_str())
    }

    /// Returns the raw body bytes.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the body as text. Invalid UTF-8 sequences are replaced.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Decodes the buffered body as JSON.
    ///
    /// A malformed body or a type mismatch is returned as
    /// [`CheckError::Json`]; asserting on bad payloads is a legitimate test.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bytes::Bytes;
    /// use http::{HeaderMap, StatusCode};
    /// use httpcheck::ResponseCapture;
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct User {
    ///     id: u32,
    /// }
    ///
    /// let response = ResponseCapture::new(
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Bytes::from_static(br#"{"id":7}"#),
    /// );
    /// let user: User = response.json().unwrap();
    /// assert_eq!(user.id, 7);
    /// ```
    pub fn json<T: DeserializeOwned>(&self) -> CheckResult<T> {
        serde_json::from_slice(&self.body).map_err(CheckError::Json)
    }

    /// Decodes the buffered body as a JSON value.
    pub fn json_value(&self) -> CheckResult<serde_json::Value> {
        self.json()
    }
}

impl fmt::Debug for ResponseCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCapture")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}
