//! HTTP router configuration.
//!
//! The dev server's control-plane surface lives on fixed paths; every
//! other request falls through to the isolate proxy:
//!
//! - `POST /__bridge_rpc` — module-fetch RPC for remote runners
//! - `GET /__bridge_entry.js` — dev entry script for a service-worker
//!   runner
//! - `GET /health` — health check
//! - anything else — proxied into the attached isolate

use std::time::Duration;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, instrument};

use dev_bridge_common::protocol;
use dev_bridge_core::{AppRequest, AppResponse};

use crate::state::DevState;

/// Build the dev server router.
pub fn build_router(state: DevState, request_timeout: Duration) -> Router {
    Router::new()
        .route(protocol::MODULE_RPC_PATH, post(fetch_module_rpc))
        .route(protocol::DEV_ENTRY_PATH, get(dev_entry))
        .route("/health", get(health_check))
        .fallback(proxy_app)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Module-fetch RPC: forward `[id, importer]` to the module graph and
/// serialize the result back.
#[instrument(skip(state, headers, body))]
async fn fetch_module_rpc(
    State(state): State<DevState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let rpc_type = headers
        .get(protocol::RPC_TYPE_HEADER)
        .and_then(|v| v.to_str().ok());
    if rpc_type != Some(protocol::RPC_TYPE_FETCH_MODULE) {
        return (StatusCode::BAD_REQUEST, "unknown rpc type").into_response();
    }

    let Ok((id, importer)) = serde_json::from_slice::<(String, Option<String>)>(&body) else {
        return (StatusCode::BAD_REQUEST, "malformed fetch-module arguments").into_response();
    };

    debug!(module_id = %id, importer = importer.as_deref(), "fetch-module rpc");
    match state.graph().fetch_module(&id, importer.as_deref()).await {
        Ok(module) => match serde_json::to_string(&module) {
            Ok(body) => (
                [(CONTENT_TYPE, protocol::MODULE_CONTENT_TYPE)],
                body,
            )
                .into_response(),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        },
        Err(e) if e.is_not_found() => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
        Err(e) => {
            error!(module_id = %id, error = %e, "module fetch failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Dev entry script: the runner bootstrap document with the root path,
/// hot channel port, and entrypoint embedded as literal constants.
async fn dev_entry(State(state): State<DevState>) -> Response {
    let Some(entrypoint) = state.entrypoint() else {
        return (
            StatusCode::NOT_FOUND,
            "no service worker entrypoint configured",
        )
            .into_response();
    };

    let script = format!(
        "const ROOT = {root};\nconst RPC_PATH = {rpc_path};\nconst HMR_PORT = {hmr_port};\nconst ENTRYPOINT = {entrypoint};\n\n{bootstrap}",
        root = serde_json::json!(state.root()),
        rpc_path = serde_json::json!(protocol::MODULE_RPC_PATH),
        hmr_port = state.hmr_port(),
        entrypoint = serde_json::json!(entrypoint),
        bootstrap = state.runner_bootstrap(),
    );
    ([(CONTENT_TYPE, protocol::MODULE_CONTENT_TYPE)], script).into_response()
}

/// Fallback: proxy the request into the attached isolate.
async fn proxy_app(State(state): State<DevState>, req: Request) -> Response {
    let Some(controller) = state.controller() else {
        return (StatusCode::BAD_GATEWAY, "no isolate attached").into_response();
    };

    let app_req = match into_app_request(req).await {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    match controller.proxy(app_req).await {
        Ok(resp) => into_response(resp),
        Err(e) => {
            error!(error = %e, "isolate proxy failed");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

async fn into_app_request(req: Request) -> Result<AppRequest, Response> {
    let method = req.method().to_string();
    let path = req
        .uri()
        .path_and_query()
        .map_or_else(|| req.uri().path().to_string(), ToString::to_string);

    let mut app_req = AppRequest::new(&method, &path);
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            app_req = app_req.with_header(name.as_str(), value);
        }
    }

    match to_bytes(req.into_body(), usize::MAX).await {
        Ok(body) => Ok(app_req.with_body(body.to_vec())),
        Err(e) => Err((StatusCode::BAD_REQUEST, e.to_string()).into_response()),
    }
}

fn into_response(resp: AppResponse) -> Response {
    let status =
        StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = Response::builder().status(status);
    if let Some(headers) = response.headers_mut() {
        for (name, value) in &resp.headers {
            let Ok(name) = HeaderName::try_from(name.as_str()) else {
                continue;
            };
            let Ok(value) = HeaderValue::try_from(value.as_str()) else {
                continue;
            };
            headers.append(name, value);
        }
    }
    response
        .body(Body::from(resp.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::http::Request as HttpRequest;
    use tower::util::ServiceExt;

    use dev_bridge_common::config::EntryInput;
    use dev_bridge_common::{BridgeConfig, BridgeError, TransformedModule};
    use dev_bridge_core::{
        handler_fn, CodeEvaluator, ModuleExports, ModuleNamespace, ModuleValue,
    };
    use dev_bridge_host::IsolateBindings;

    use crate::controller::{GraphBinding, IsolateController};
    use crate::graph::MemoryModuleGraph;

    fn test_state() -> (DevState, Arc<MemoryModuleGraph>) {
        let graph = Arc::new(MemoryModuleGraph::new());
        graph.insert(TransformedModule::new("/main.ts", "export default 1"));

        let mut config = BridgeConfig::default();
        config.entry.service_worker = Some(EntryInput::Single("/sw/main.ts".into()));

        let state = DevState::new(&config, graph.clone()).unwrap();
        (state, graph)
    }

    fn test_router() -> Router {
        let (state, _) = test_state();
        build_router(state, Duration::from_secs(5))
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = test_router()
            .oneshot(
                HttpRequest::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_fetch_module_rpc() {
        let response = test_router()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri(protocol::MODULE_RPC_PATH)
                    .header(protocol::RPC_TYPE_HEADER, protocol::RPC_TYPE_FETCH_MODULE)
                    .body(Body::from(r#"["/main.ts",null]"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            protocol::MODULE_CONTENT_TYPE
        );
        let module: TransformedModule =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(module.id, "/main.ts");
    }

    #[tokio::test]
    async fn test_fetch_module_rpc_requires_type_header() {
        let response = test_router()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri(protocol::MODULE_RPC_PATH)
                    .body(Body::from(r#"["/main.ts",null]"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_fetch_module_rpc_unknown_module() {
        let response = test_router()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri(protocol::MODULE_RPC_PATH)
                    .header(protocol::RPC_TYPE_HEADER, protocol::RPC_TYPE_FETCH_MODULE)
                    .body(Body::from(r#"["/missing.ts",null]"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dev_entry_embeds_constants() {
        let response = test_router()
            .oneshot(
                HttpRequest::builder()
                    .uri(protocol::DEV_ENTRY_PATH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let script = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(script.contains(r#"const ENTRYPOINT = "/sw/main.ts";"#));
        assert!(script.contains("const HMR_PORT = 5172;"));
        assert!(script.contains(&format!(
            "const RPC_PATH = \"{}\";",
            protocol::MODULE_RPC_PATH
        )));
    }

    #[tokio::test]
    async fn test_dev_entry_without_entrypoint() {
        let state = DevState::new(
            &BridgeConfig::default(),
            Arc::new(MemoryModuleGraph::new()),
        )
        .unwrap();
        let response = build_router(state, Duration::from_secs(5))
            .oneshot(
                HttpRequest::builder()
                    .uri(protocol::DEV_ENTRY_PATH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_proxy_without_controller() {
        let response = test_router()
            .oneshot(
                HttpRequest::builder()
                    .uri("/anything")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    struct PathEchoEvaluator;

    #[async_trait]
    impl CodeEvaluator for PathEchoEvaluator {
        async fn evaluate(
            &self,
            _module: &TransformedModule,
            _deps: &HashMap<String, Arc<ModuleNamespace>>,
        ) -> Result<ModuleExports, BridgeError> {
            let mut exports = ModuleExports::new();
            exports.set_default(ModuleValue::Handler(handler_fn(|req, _| {
                dev_bridge_core::AppResponse::text(200, &req.path)
            })));
            Ok(exports)
        }
    }

    #[tokio::test]
    async fn test_proxy_reaches_isolate() {
        let (state, graph) = test_state();
        let controller = Arc::new(IsolateController::new(
            IsolateBindings::new(
                "/srv/app",
                Arc::new(PathEchoEvaluator),
                Arc::new(GraphBinding::new(graph)),
            ),
            "/main.ts",
        ));
        controller.bootstrap().await.unwrap();
        state.set_controller(controller);

        let response = build_router(state, Duration::from_secs(5))
            .oneshot(
                HttpRequest::builder()
                    .uri("/app/route?q=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"/app/route?q=1");
    }
}
