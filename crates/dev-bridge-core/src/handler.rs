//! Request and response types seen by an entrypoint handler.
//!
//! A remote runtime's entrypoint exports a default handler; these are the
//! plain structures that handler receives and returns, independent of any
//! particular HTTP framework on either side of the bridge.

use std::sync::Arc;

use async_trait::async_trait;

use dev_bridge_common::EnvMap;

/// A request forwarded into a remote runtime.
#[derive(Debug, Clone)]
pub struct AppRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request path including query.
    pub path: String,
    /// Request headers as key-value pairs.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Vec<u8>,
}

impl AppRequest {
    /// Create a new empty request.
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Append a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Attach a body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Get a header value by name (case-insensitive, first match).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace every occurrence of a header, or append it when absent.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }
}

/// A response produced by a remote runtime.
#[derive(Debug, Clone)]
pub struct AppResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers as key-value pairs.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl AppResponse {
    /// Create a plain-text response.
    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: vec![(
                "content-type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )],
            body: body.as_bytes().to_vec(),
        }
    }

    /// Create a JSON response.
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.as_bytes().to_vec(),
        }
    }

    /// Create an empty response with just a status code.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Append a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request handler a runtime serves: the entrypoint's default export.
///
/// Handlers receive the merged environment the isolate exposes to
/// application code (static bindings minus internal control bindings,
/// overlaid with values set at runtime).
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Serve one request.
    async fn handle(&self, request: AppRequest, env: EnvMap) -> AppResponse;
}

/// A handler backed by a plain async-compatible closure, mostly for tests
/// and small embedders.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> RequestHandler for FnHandler<F>
where
    F: Fn(AppRequest, EnvMap) -> AppResponse + Send + Sync,
{
    async fn handle(&self, request: AppRequest, env: EnvMap) -> AppResponse {
        (self.0)(request, env)
    }
}

/// Convenience constructor for [`FnHandler`].
pub fn handler_fn<F>(f: F) -> Arc<dyn RequestHandler>
where
    F: Fn(AppRequest, EnvMap) -> AppResponse + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}
