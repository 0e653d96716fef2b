//! Request building and execution.
//!
//! A [`RequestBuilder`] accumulates method, path, params, headers and body,
//! then turns them into exactly one HTTP request per execution:
//!
//! - POST, PUT and PATCH carry an explicit body as `application/json`, or,
//!   without one, the params as an `application/x-www-form-urlencoded` body.
//! - Every other method carries the params in the query string and no body.
//! - Headers set on the builder always win over the Content-Type defaults,
//!   which in turn replace any `Content-Type` from [`ProbeConfig`].
//!
//! Setters take `self` by value and the builder is `Clone`, so a configured
//! builder can be forked and executed from several tasks without sharing
//! mutable state. Each execution binds its own [`EphemeralListener`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::Method;
use serde::Serialize;

use crate::assert::{FailureSink, ResponseAssertions};
use crate::config::ProbeConfig;
use crate::error::{CheckError, CheckResult};
use crate::handler::{Handler, SharedHandler};
use crate::listener::EphemeralListener;
use crate::response::ResponseCapture;

/// Media type of params-derived request bodies.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Media type of explicit request bodies.
pub const APPLICATION_JSON: &str = "application/json";

#[derive(Clone)]
enum RequestBody {
    Bytes(Bytes),
    /// Serialization failed when the body was set; reported on execution.
    Invalid(String),
}

/// Fluent builder for requests against a handler under test.
///
/// # Example
///
/// ```rust,no_run
/// use bytes::Bytes;
/// use http_body_util::Full;
/// use httpcheck::{FailureLog, RequestBuilder};
///
/// # async fn run() {
/// let builder = RequestBuilder::for_handler(|req: http::Request<Bytes>| async move {
///     http::Response::new(Full::new(Bytes::from(req.method().to_string())))
/// });
///
/// let exchange = builder.post("/users").param("name", "alice").execute().await;
///
/// let failures = FailureLog::new();
/// exchange.assert_with(&failures).is_ok().contains("POST");
/// # }
/// ```
#[must_use]
#[derive(Clone)]
pub struct RequestBuilder {
    handler: SharedHandler,
    config: ProbeConfig,
    method: Method,
    path: String,
    params: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    body: Option<RequestBody>,
}

impl RequestBuilder {
    /// Creates a builder for `handler`: GET `/`, no params, headers or body.
    pub fn for_handler<H: Handler>(handler: H) -> Self {
        Self::for_shared(Arc::new(handler))
    }

    /// Creates a builder for a handler that is already shared.
    pub fn for_shared(handler: SharedHandler) -> Self {
        Self {
            handler,
            config: ProbeConfig::default(),
            method: Method::GET,
            path: "/".to_string(),
            params: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Replaces the builder configuration.
    pub fn with_config(mut self, config: ProbeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the request method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the request path, optionally including a query string.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    fn route(self, method: Method, path: impl Into<String>) -> Self {
        self.method(method).path(path)
    }

    /// Sets method GET and `path`.
    pub fn get(self, path: impl Into<String>) -> Self {
        self.route(Method::GET, path)
    }

    /// Sets method POST and `path`.
    pub fn post(self, path: impl Into<String>) -> Self {
        self.route(Method::POST, path)
    }

    /// Sets method PUT and `path`.
    pub fn put(self, path: impl Into<String>) -> Self {
        self.route(Method::PUT, path)
    }

    /// Sets method DELETE and `path`.
    pub fn delete(self, path: impl Into<String>) -> Self {
        self.route(Method::DELETE, path)
    }

    /// Sets method HEAD and `path`.
    pub fn head(self, path: impl Into<String>) -> Self {
        self.route(Method::HEAD, path)
    }

    /// Sets method OPTIONS and `path`.
    pub fn options(self, path: impl Into<String>) -> Self {
        self.route(Method::OPTIONS, path)
    }

    /// Sets method PATCH and `path`.
    pub fn patch(self, path: impl Into<String>) -> Self {
        self.route(Method::PATCH, path)
    }

    /// Adds or replaces one param.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Replaces all params.
    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Adds or replaces one header. Names are case-insensitive, so a later
    /// call replaces an earlier one however either was spelled.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(header_key(name.into()), value.into());
        self
    }

    /// Replaces all headers.
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers = headers
            .into_iter()
            .map(|(k, v)| (header_key(k.into()), v.into()))
            .collect();
        self
    }

    /// Sets the explicit request body as the JSON encoding of `value`.
    ///
    /// The body is sent with `Content-Type: application/json` on write
    /// methods. A value that cannot be serialized fails the next execution.
    pub fn json_body<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.body = Some(match serde_json::to_vec(value) {
            Ok(bytes) => RequestBody::Bytes(Bytes::from(bytes)),
            Err(e) => RequestBody::Invalid(e.to_string()),
        });
        self
    }

    /// Sets a raw explicit request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(RequestBody::Bytes(body.into()));
        self
    }

    /// Resolves the accumulated state into the request that would be sent to
    /// a server at `base_url` (scheme and authority, no trailing slash).
    pub fn resolve(&self, base_url: &str) -> CheckResult<ResolvedRequest> {
        let explicit_body = match &self.body {
            Some(RequestBody::Invalid(reason)) => {
                return Err(CheckError::Serialize(reason.clone()));
            }
            Some(RequestBody::Bytes(bytes)) => Some(bytes),
            None => None,
        };

        let mut headers = HeaderMap::new();
        if let Some(user_agent) = &self.config.user_agent {
            insert_header(&mut headers, header::USER_AGENT.as_str(), user_agent)?;
        }
        for (name, value) in &self.config.default_headers {
            insert_header(&mut headers, name, value)?;
        }

        let (target, body) = if carries_body(&self.method) {
            let (content_type, body) = match explicit_body {
                Some(bytes) => (APPLICATION_JSON, bytes.clone()),
                None => (FORM_URLENCODED, Bytes::from(encode_params(&self.params))),
            };
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            (self.path.clone(), body)
        } else {
            (
                append_query(&self.path, &encode_params(&self.params)),
                Bytes::new(),
            )
        };

        for (name, value) in &self.headers {
            insert_header(&mut headers, name, value)?;
        }

        let raw_url = format!("{base_url}{target}");
        let url = reqwest::Url::parse(&raw_url).map_err(|e| CheckError::InvalidUrl {
            url: raw_url.clone(),
            reason: e.to_string(),
        })?;

        Ok(ResolvedRequest {
            method: self.method.clone(),
            url,
            headers,
            body,
        })
    }

    /// Serves the handler on an ephemeral listener, sends the request and
    /// captures the response.
    ///
    /// The listener is closed before this returns, whatever the outcome.
    pub async fn try_execute(&self) -> CheckResult<Exchange> {
        let listener =
            EphemeralListener::bind(&self.config.bind_addr, Arc::clone(&self.handler)).await?;
        let result = self.round_trip(&listener.base_url()).await;
        listener.shutdown().await;
        result
    }

    /// Like [`try_execute`](Self::try_execute), but a setup or transport
    /// failure panics and so aborts the calling test.
    pub async fn execute(&self) -> Exchange {
        match self.try_execute().await {
            Ok(exchange) => exchange,
            Err(err) => setup_failed(&err),
        }
    }

    /// Runs [`try_execute`](Self::try_execute) to completion on a private
    /// current-thread runtime. Must not be called from inside a runtime.
    pub fn try_execute_blocking(&self) -> CheckResult<Exchange> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(CheckError::Runtime)?;
        runtime.block_on(self.try_execute())
    }

    /// Blocking counterpart of [`execute`](Self::execute) for plain `#[test]`s.
    pub fn execute_blocking(&self) -> Exchange {
        match self.try_execute_blocking() {
            Ok(exchange) => exchange,
            Err(err) => setup_failed(&err),
        }
    }

    async fn round_trip(&self, base_url: &str) -> CheckResult<Exchange> {
        let request = self.resolve(base_url)?;

        let client = reqwest::Client::builder().no_proxy().build()?;
        let mut outgoing = client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if carries_body(&request.method) {
            outgoing = outgoing.body(request.body.clone());
        }

        tracing::debug!(method = %request.method, url = %request.url, "dispatching request");
        let response = ResponseCapture::from_response(outgoing.send().await?).await?;
        tracing::debug!(
            status = response.status_code(),
            body_len = response.body().len(),
            "response captured"
        );

        Ok(Exchange { request, response })
    }
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn setup_failed(err: &CheckError) -> ! {
    tracing::error!(error = %err, "request setup failed");
    panic!("request setup failed: {err}");
}

/// POST, PUT and PATCH send a body; everything else sends params as a query.
fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

fn header_key(mut name: String) -> String {
    name.make_ascii_lowercase();
    name
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> CheckResult<()> {
    let header_name =
        HeaderName::from_bytes(name.as_bytes()).map_err(|e| CheckError::invalid_header(name, e))?;
    let header_value = HeaderValue::from_str(value).map_err(|e| CheckError::invalid_header(name, e))?;
    headers.insert(header_name, header_value);
    Ok(())
}

/// Encodes params as `k=v` pairs joined by `&`, keys in sorted order,
/// percent-encoding everything outside the RFC 3986 unreserved set.
pub(crate) fn encode_params(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn append_query(path: &str, query: &str) -> String {
    if query.is_empty() {
        path.to_string()
    } else if path.contains('?') {
        format!("{path}&{query}")
    } else {
        format!("{path}?{query}")
    }
}

/// The concrete request a builder put on the wire.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute request URL
    pub url: reqwest::Url,
    /// Final request headers
    pub headers: HeaderMap,
    /// Request body
    pub body: Bytes,
}

impl ResolvedRequest {
    /// Returns the URL path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Returns the raw query string, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    /// Gets a header value as a string.
    #[must_use]
    pub fn header_str(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Returns the Content-Type header value.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header_str(header::CONTENT_TYPE.as_str())
    }
}

/// The outcome of one execution: what was sent and what came back.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// The request as sent.
    pub request: ResolvedRequest,
    /// The captured response.
    pub response: ResponseCapture,
}

impl Exchange {
    /// Starts an assertion chain on the response, recording into `sink`.
    pub fn assert_with<'a, S>(&'a self, sink: &'a S) -> ResponseAssertions<'a, S>
    where
        S: FailureSink + ?Sized,
    {
        ResponseAssertions::new(&self.response, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use http_body_util::Full;
    use serde_json::json;

    const BASE: &str = "http://127.0.0.1:9";

    fn builder() -> RequestBuilder {
        RequestBuilder::for_handler(|_req: http::Request<Bytes>| async {
            http::Response::new(Full::new(Bytes::new()))
        })
    }

    /// Echoes method, query, content type and body as JSON.
    fn inspector() -> RequestBuilder {
        RequestBuilder::for_handler(|req: http::Request<Bytes>| async move {
            let body = json!({
                "method": req.method().as_str(),
                "query": req.uri().query(),
                "content_type": req
                    .headers()
                    .get("content-type")
                    .and_then(|v| v.to_str().ok()),
                "body": String::from_utf8_lossy(req.body()),
            });
            http::Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "application/json")
                .body(Full::new(Bytes::from(body.to_string())))
                .unwrap()
        })
    }

    #[test]
    fn test_defaults() {
        let request = builder().resolve(BASE).unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path(), "/");
        assert_eq!(request.query(), None);
        assert!(request.body.is_empty());
        assert!(request.content_type().is_none());
    }

    #[test]
    fn test_get_params_in_query() {
        let request = builder()
            .get("/get")
            .param("name", "foo")
            .resolve(BASE)
            .unwrap();

        assert_eq!(request.query(), Some("name=foo"));
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_query_appended_to_existing_query() {
        let request = builder()
            .get("/search?page=2")
            .param("q", "a b")
            .resolve(BASE)
            .unwrap();

        assert_eq!(request.query(), Some("page=2&q=a%20b"));
    }

    #[test]
    fn test_write_methods_form_encode_params() {
        for method in [Method::POST, Method::PUT, Method::PATCH] {
            let request = builder()
                .method(method.clone())
                .path("/form")
                .param("name", "foo")
                .resolve(BASE)
                .unwrap();

            assert_eq!(request.content_type(), Some(FORM_URLENCODED), "{method}");
            assert_eq!(request.body.as_ref(), b"name=foo", "{method}");
            assert_eq!(request.query(), None, "{method}");
        }
    }

    #[test]
    fn test_explicit_body_wins_over_params() {
        let request = builder()
            .post("/json")
            .param("ignored", "yes")
            .json_body(&json!({"foo": "bar"}))
            .resolve(BASE)
            .unwrap();

        assert_eq!(request.content_type(), Some(APPLICATION_JSON));
        assert_eq!(request.body.as_ref(), br#"{"foo":"bar"}"#);
    }

    #[test]
    fn test_read_methods_drop_explicit_body() {
        let request = builder()
            .delete("/items/1")
            .body("payload")
            .param("force", "true")
            .resolve(BASE)
            .unwrap();

        assert!(request.body.is_empty());
        assert_eq!(request.query(), Some("force=true"));
        assert!(request.content_type().is_none());
    }

    #[test]
    fn test_explicit_header_overrides_content_type() {
        let request = builder()
            .put("/raw")
            .body("plain words")
            .header("Content-Type", "text/plain")
            .resolve(BASE)
            .unwrap();

        assert_eq!(request.content_type(), Some("text/plain"));
    }

    #[test]
    fn test_config_default_headers_yield_to_builder_headers() {
        let config = ProbeConfig::builder()
            .default_header("X-Tenant", "default")
            .default_header("X-Trace", "on")
            .user_agent(Some("probe-tests".to_string()))
            .build();

        let request = builder()
            .with_config(config)
            .header("X-Tenant", "override")
            .resolve(BASE)
            .unwrap();

        assert_eq!(request.header_str("X-Tenant"), Some("override"));
        assert_eq!(request.header_str("X-Trace"), Some("on"));
        assert_eq!(request.header_str("User-Agent"), Some("probe-tests"));
    }

    #[test]
    fn test_write_methods_replace_config_content_type() {
        let config = ProbeConfig::builder()
            .default_header("Content-Type", "text/plain")
            .build();
        let configured = builder().with_config(config);

        let write = configured.clone().post("/form").resolve(BASE).unwrap();
        assert_eq!(write.content_type(), Some(FORM_URLENCODED));

        let read = configured.get("/form").resolve(BASE).unwrap();
        assert_eq!(read.content_type(), Some("text/plain"));
    }

    #[test]
    fn test_params_and_headers_replace() {
        let request = builder()
            .param("a", "1")
            .params([("b", "2")])
            .header("X-A", "1")
            .headers([("X-B", "2")])
            .resolve(BASE)
            .unwrap();

        assert_eq!(request.query(), Some("b=2"));
        assert!(request.header_str("X-A").is_none());
        assert_eq!(request.header_str("X-B"), Some("2"));
    }

    #[test]
    fn test_header_names_are_case_insensitive() {
        let request = builder()
            .header("x-a", "first")
            .header("X-A", "second")
            .resolve(BASE)
            .unwrap();
        assert_eq!(request.header_str("x-a"), Some("second"));

        let request = builder()
            .headers([("X-B", "first"), ("x-b", "second")])
            .resolve(BASE)
            .unwrap();
        assert_eq!(request.header_str("X-B"), Some("second"));
    }

    #[test]
    fn test_invalid_header_is_setup_error() {
        let err = builder()
            .header("Bad Header", "x")
            .resolve(BASE)
            .unwrap_err();
        assert!(matches!(err, CheckError::InvalidHeader { .. }));
    }

    #[test]
    fn test_invalid_path_is_setup_error() {
        let err = builder().get("no-leading-slash").resolve(BASE).unwrap_err();
        assert!(matches!(err, CheckError::InvalidUrl { .. }));
    }

    #[test]
    fn test_unserializable_body_is_setup_error() {
        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), "tuple keys are not JSON");

        let err = builder().post("/json").json_body(&map).resolve(BASE).unwrap_err();
        assert!(matches!(err, CheckError::Serialize(_)));
        assert!(err.is_setup());
    }

    #[test]
    fn test_encode_params() {
        let mut params = BTreeMap::new();
        params.insert("b".to_string(), "x&y=z".to_string());
        params.insert("a".to_string(), "hello world".to_string());

        assert_eq!(encode_params(&params), "a=hello%20world&b=x%26y%3Dz");
        assert_eq!(encode_params(&BTreeMap::new()), "");
    }

    proptest::proptest! {
        #[test]
        fn prop_encoded_params_decode_back(
            params in proptest::collection::btree_map(".*", ".*", 0..8)
        ) {
            let encoded = encode_params(&params);
            let decoded: BTreeMap<String, String> = if encoded.is_empty() {
                BTreeMap::new()
            } else {
                encoded
                    .split('&')
                    .map(|pair| {
                        let (k, v) = pair.split_once('=').unwrap();
                        (
                            urlencoding::decode(k).unwrap().into_owned(),
                            urlencoding::decode(v).unwrap().into_owned(),
                        )
                    })
                    .collect()
            };
            proptest::prop_assert_eq!(decoded, params);
        }
    }

    #[tokio::test]
    async fn test_execute_form_post() {
        let exchange = inspector().post("/form").param("name", "foo").execute().await;
        let echoed = exchange.response.json_value().unwrap();

        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["content_type"], FORM_URLENCODED);
        assert_eq!(echoed["body"], "name=foo");
    }

    #[tokio::test]
    async fn test_execute_get_query() {
        let exchange = inspector().get("/get").param("name", "foo").execute().await;
        let echoed = exchange.response.json_value().unwrap();

        assert_eq!(echoed["query"], "name=foo");
        assert_eq!(echoed["body"], "");
        assert_eq!(exchange.request.query(), Some("name=foo"));
    }

    #[tokio::test]
    async fn test_repeated_execution_is_independent() {
        let builder = inspector().get("/get").param("page", "1");
        let first = builder.execute().await;

        let builder = builder.param("page", "2");
        let second = builder.execute().await;

        assert_eq!(first.response.json_value().unwrap()["query"], "page=1");
        assert_eq!(second.response.json_value().unwrap()["query"], "page=2");
    }

    #[tokio::test]
    async fn test_setup_failure_is_error() {
        let result = inspector()
            .with_config(ProbeConfig::builder().bind_addr("not-an-address").build())
            .try_execute()
            .await;

        assert!(matches!(result, Err(CheckError::Bind { .. })));
    }

    #[tokio::test]
    #[should_panic(expected = "request setup failed")]
    async fn test_execute_panics_on_setup_failure() {
        inspector().header("Bad Header", "x").execute().await;
    }

    #[tokio::test]
    async fn test_listener_closed_after_execute() {
        let exchange = inspector().get("/get").execute().await;
        let port = exchange.request.url.port().unwrap();

        let connect = tokio::net::TcpStream::connect(("127.0.0.1", port)).await;
        assert!(connect.is_err());
    }

    #[tokio::test]
    async fn test_listener_closed_after_failed_round_trip() {
        // Reserve a free port, then release it for the listener to bind.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = ProbeConfig::builder()
            .bind_addr(format!("127.0.0.1:{port}"))
            .build();

        let result = inspector()
            .with_config(config)
            .header("Bad Header", "x")
            .try_execute()
            .await;
        assert!(matches!(result, Err(CheckError::InvalidHeader { .. })));

        let connect = tokio::net::TcpStream::connect(("127.0.0.1", port)).await;
        assert!(connect.is_err());
    }

    #[test]
    fn test_execute_blocking() {
        let exchange = inspector().put("/blocking").execute_blocking();
        assert_eq!(exchange.response.json_value().unwrap()["method"], "PUT");
    }
}
