//! # httpcheck
//!
//! Test utilities for HTTP handlers: a fluent request builder that fires real
//! HTTP/1.1 requests at a handler served on an ephemeral loopback port, and
//! soft assertions that record every mismatch instead of stopping at the first.
//!
//! ## Key Features
//!
//! - **Request Builder**: method, path, params, headers and body, resolved
//!   into exactly one request per execution
//! - **Ephemeral Listener**: a fresh loopback server per request, always torn down
//! - **Response Capture**: fully buffered body, re-readable and decodable
//! - **Soft Assertions**: chainable checks reporting into an explicit failure sink
//!
//! ## Example
//!
//! ```ignore
//! use bytes::Bytes;
//! use http_body_util::Full;
//! use httpcheck::{FailureLog, RequestBuilder};
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_user() {
//!     let builder = RequestBuilder::for_handler(|req: http::Request<Bytes>| async move {
//!         http::Response::builder()
//!             .header("content-type", "application/json")
//!             .body(Full::new(req.into_body()))
//!             .unwrap()
//!     });
//!
//!     let exchange = builder
//!         .post("/users")
//!         .json_body(&json!({"name": "Alice"}))
//!         .execute()
//!         .await;
//!
//!     let failures = FailureLog::new();
//!     exchange
//!         .assert_with(&failures)
//!         .is_ok()
//!         .is_json()
//!         .contains_json(&json!({"name": "Alice"}));
//! }
//! ```
//!
//! ## Failure model
//!
//! | Situation                          | Outcome                               |
//! |------------------------------------|---------------------------------------|
//! | Bind, URL, header, transport error | `execute` panics, `try_execute` errs  |
//! | Assertion mismatch                 | recorded in the sink, chain continues |
//! | Undecodable body (`json`)          | `Err(CheckError::Json)`               |

#![doc(html_root_url = "https://docs.rs/httpcheck/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod assert;
mod config;
mod error;
mod handler;
mod listener;
pub mod logging;
mod request;
mod response;

pub use assert::{assert_response, FailureLog, FailureSink, ResponseAssertions};
pub use config::{ProbeConfig, ProbeConfigBuilder, DEFAULT_BIND_ADDR};
pub use error::{CheckError, CheckResult};
pub use handler::{Handler, HandlerFuture, HttpResponse, SharedHandler};
pub use listener::EphemeralListener;
pub use request::{
    Exchange, RequestBuilder, ResolvedRequest, APPLICATION_JSON, FORM_URLENCODED,
};
pub use response::ResponseCapture;
