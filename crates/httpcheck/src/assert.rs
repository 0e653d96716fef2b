//! Soft assertions on captured responses.
//!
//! [`ResponseAssertions`] checks one property per call and reports a mismatch
//! to a [`FailureSink`] instead of panicking, so a single test run surfaces
//! every mismatch. Every method returns `&Self` for chaining.
//!
//! # Example
//!
//! ```rust
//! use bytes::Bytes;
//! use http::{HeaderMap, StatusCode};
//! use httpcheck::{assert_response, FailureLog, ResponseCapture};
//!
//! let response = ResponseCapture::new(StatusCode::NOT_FOUND, HeaderMap::new(), Bytes::new());
//! let failures = FailureLog::new();
//!
//! assert_response(&failures, &response)
//!     .is_ok()
//!     .contains("hello");
//!
//! assert_eq!(failures.take().len(), 2);
//! ```

use std::fmt;

use http::header;
use parking_lot::Mutex;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::response::ResponseCapture;

/// Receives assertion failures. Recording must never halt execution.
pub trait FailureSink {
    /// Records one failure message.
    fn record(&self, message: String);
}

impl<F> FailureSink for F
where
    F: Fn(String),
{
    fn record(&self, message: String) {
        (self)(message);
    }
}

/// Collects failures for the duration of a test.
///
/// Dropping a log that still holds failures panics with all of them, which
/// fails the enclosing test after every assertion has run. Call
/// [`take`](Self::take) to inspect and clear them instead.
#[derive(Debug, Default)]
pub struct FailureLog {
    failures: Mutex<Vec<String>>,
}

impl FailureLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded failures.
    #[must_use]
    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().clone()
    }

    /// Returns the number of recorded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.lock().len()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.lock().is_empty()
    }

    /// Removes and returns every recorded failure.
    #[must_use]
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.failures.lock())
    }

    /// Panics with every recorded failure, if there are any.
    pub fn verify(&self) {
        let failures = self.take();
        if !failures.is_empty() {
            panic!("{}", format_failures(&failures));
        }
    }
}

impl FailureSink for FailureLog {
    fn record(&self, message: String) {
        self.failures.lock().push(message);
    }
}

impl Drop for FailureLog {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let failures = std::mem::take(self.failures.get_mut());
        if !failures.is_empty() {
            panic!("{}", format_failures(&failures));
        }
    }
}

fn format_failures(failures: &[String]) -> String {
    let mut out = format!("{} assertion failure(s):", failures.len());
    for (i, failure) in failures.iter().enumerate() {
        out.push_str(&format!("\n  {}. {}", i + 1, failure));
    }
    out
}

/// Starts an assertion chain on `response`, recording into `sink`.
pub fn assert_response<'a, S>(
    sink: &'a S,
    response: &'a ResponseCapture,
) -> ResponseAssertions<'a, S>
where
    S: FailureSink + ?Sized,
{
    ResponseAssertions::new(response, sink)
}

/// A chain of soft assertions over one response.
pub struct ResponseAssertions<'a, S: FailureSink + ?Sized> {
    response: &'a ResponseCapture,
    sink: &'a S,
}

impl<'a, S: FailureSink + ?Sized> ResponseAssertions<'a, S> {
    /// Creates an assertion group.
    pub fn new(response: &'a ResponseCapture, sink: &'a S) -> Self {
        Self { response, sink }
    }

    /// Returns the response under assertion.
    #[must_use]
    pub fn response(&self) -> &ResponseCapture {
        self.response
    }

    fn fail(&self, message: String) {
        tracing::warn!(failure = %message, "assertion failed");
        self.sink.record(message);
    }

    /// Status code is 200.
    pub fn is_ok(&self) -> &Self {
        self.has_status_code(200)
    }

    /// Status code is `code`.
    pub fn has_status_code(&self, code: u16) -> &Self {
        let actual = self.response.status_code();
        if actual != code {
            self.fail(format!("status code was {actual} expected {code}"));
        }
        self
    }

    /// Content-Type is exactly `application/json`.
    pub fn is_json(&self) -> &Self {
        self.contains_content_type("application/json")
    }

    /// Content-Type is present and exactly `expected`.
    pub fn contains_content_type(&self, expected: &str) -> &Self {
        self.contains_header_value(header::CONTENT_TYPE.as_str(), expected)
    }

    /// ETag is present and exactly `expected`.
    pub fn contains_etag(&self, expected: &str) -> &Self {
        self.contains_header_value(header::ETAG.as_str(), expected)
    }

    /// Header `name` is present, and its first value is exactly `expected`.
    ///
    /// Presence and equality are checked separately, so an absent header with
    /// a non-empty expectation records two failures.
    pub fn contains_header_value(&self, name: &str, expected: &str) -> &Self {
        let actual = self.response.header_str(name);
        if actual.is_none() {
            self.fail(format!("{name} header is not found"));
        }

        let actual = actual.unwrap_or_default();
        if actual != expected {
            self.fail(format!("{name} was {actual:?}, expected {expected:?}"));
        }
        self
    }

    /// Body text is exactly `expected`.
    pub fn contains(&self, expected: &str) -> &Self {
        let actual = self.response.text();
        if actual != expected {
            self.fail(format!(
                "body does not match:\n\t{actual}\nexpected:\n\t{expected}"
            ));
        }
        self
    }

    /// Body is JSON that renders identically to `expected`.
    ///
    /// Both sides are pretty-printed with the same indentation, keeping every
    /// object member as written, so whitespace differences are ignored while
    /// differing values, key order or repeated keys are not.
    pub fn contains_json<T: Serialize + ?Sized>(&self, expected: &T) -> &Self {
        let expected = match serde_json::to_vec(expected).and_then(|bytes| pretty_json(&bytes)) {
            Ok(pretty) => pretty,
            Err(e) => {
                self.fail(format!("expected value is not serializable as JSON: {e}"));
                return self;
            }
        };

        let actual = match pretty_json(self.response.body()) {
            Ok(pretty) => pretty,
            Err(e) => {
                self.fail(format!(
                    "body is not valid JSON ({e}):\n{}",
                    self.response.text()
                ));
                return self;
            }
        };

        if actual != expected {
            self.fail(format!(
                "JSON body does not match:\n{actual}\nexpected:\n{expected}"
            ));
        }
        self
    }
}

/// Re-indents a JSON document with tabs.
///
/// The document is transcoded through `Document`, which keeps every object
/// member in source order, duplicates included, so only whitespace changes.
pub(crate) fn pretty_json(bytes: &[u8]) -> Result<String, serde_json::Error> {
    let document: Document = serde_json::from_slice(bytes)?;

    let mut out = Vec::with_capacity(bytes.len() * 2);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    document.serialize(&mut serializer)?;

    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// JSON tree that, unlike `serde_json::Value`, never merges repeated keys.
enum Document {
    Scalar(serde_json::Value),
    Array(Vec<Document>),
    Object(Vec<(String, Document)>),
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Scalar(value) => value.serialize(serializer),
            Self::Array(items) => serializer.collect_seq(items),
            Self::Object(members) => {
                let mut map = serializer.serialize_map(Some(members.len()))?;
                for (key, value) in members {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DocumentVisitor)
    }
}

struct DocumentVisitor;

impl<'de> Visitor<'de> for DocumentVisitor {
    type Value = Document;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Document, E> {
        Ok(Document::Scalar(v.into()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Document, E> {
        Ok(Document::Scalar(v.into()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Document, E> {
        Ok(Document::Scalar(v.into()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Document, E> {
        Ok(Document::Scalar(v.into()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Document, E> {
        Ok(Document::Scalar(v.into()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Document, E> {
        Ok(Document::Scalar(v.into()))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Document, E> {
        Ok(Document::Scalar(serde_json::Value::Null))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Document, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Document::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Document, A::Error> {
        let mut members = Vec::new();
        while let Some(member) = map.next_entry()? {
            members.push(member);
        }
        Ok(Document::Object(members))
    }
}
