//! The handler-under-test seam.
//!
//! Anything that can turn an [`http::Request`] into an [`http::Response`]
//! can be tested: a router, a single endpoint, or an async closure.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;

/// Type alias for the response a handler produces.
pub type HttpResponse = http::Response<Full<Bytes>>;

/// Boxed future returned by [`Handler::call`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = HttpResponse> + Send>>;

/// Shared, type-erased handler.
pub type SharedHandler = Arc<dyn Handler>;

/// A component that serves one HTTP request at a time.
///
/// The request body has already been collected when the handler runs.
/// Implemented for every `Fn(Request<Bytes>) -> impl Future<Output = HttpResponse>`.
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use http_body_util::Full;
/// use httpcheck::RequestBuilder;
///
/// let builder = RequestBuilder::for_handler(|req: http::Request<Bytes>| async move {
///     http::Response::new(Full::new(Bytes::from(req.method().to_string())))
/// });
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Serves a single request.
    fn call(&self, request: http::Request<Bytes>) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(http::Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    fn call(&self, request: http::Request<Bytes>) -> HandlerFuture {
        Box::pin((self)(request))
    }
}
