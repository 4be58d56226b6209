//! The sandboxed isolate.
//!
//! An [`Isolate`] is reachable only through [`Isolate::dispatch_fetch`];
//! it has no filesystem and no direct network path to the dev server. It
//! speaks the fixed control protocol on top of that single boundary:
//!
//! - `GET /__init-module-runner` — upgrade: hands back one end of a socket
//!   pair and starts the hot-update read loop
//! - `/__set-entrypoint` — imports the entrypoint named in the header and
//!   installs its default export as the request handler
//! - `/__set-envs` — shallow-merges a JSON body into the environment
//!   overlay
//! - every other path — dispatched to the application handler once an
//!   entrypoint is set

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, instrument, warn};

use dev_bridge_common::{protocol, EnvMap, HotPayload};
use dev_bridge_core::{AppRequest, AppResponse, ModuleRunner, RunnerHarness};

use crate::bindings::IsolateBindings;
use crate::rpc::BindingModuleTransport;
use crate::socket::{socket_pair, SocketEnd};

/// Response from an isolate dispatch, optionally carrying the upgraded
/// socket end of the bootstrap call.
#[derive(Debug)]
pub struct IsolateResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
    /// Upgraded socket end, present only on a successful bootstrap.
    pub socket: Option<SocketEnd>,
}

impl IsolateResponse {
    fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: vec![(
                "content-type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )],
            body: body.as_bytes().to_vec(),
            socket: None,
        }
    }

    fn upgraded(socket: SocketEnd) -> Self {
        Self {
            status: 101,
            headers: Vec::new(),
            body: Vec::new(),
            socket: Some(socket),
        }
    }

    /// Returns `true` for 2xx statuses (and the 101 upgrade).
    pub fn is_success(&self) -> bool {
        self.status == 101 || (200..300).contains(&self.status)
    }
}

impl From<AppResponse> for IsolateResponse {
    fn from(resp: AppResponse) -> Self {
        Self {
            status: resp.status,
            headers: resp.headers,
            body: resp.body,
            socket: None,
        }
    }
}

/// A callback receiving hot payloads delivered into an isolate, invoked
/// after the runner has handled the payload.
pub type HotForward = Arc<dyn Fn(&HotPayload) + Send + Sync>;

struct IsolateState {
    harness: Option<Arc<RunnerHarness>>,
    env_overlay: EnvMap,
    hot_forwards: Vec<HotForward>,
}

/// A sandboxed runtime instance.
///
/// Each instance starts with an unset entrypoint; recreating the isolate
/// (a dev-server restart) resets every piece of state here.
pub struct Isolate {
    bindings: IsolateBindings,
    runner: Arc<ModuleRunner>,
    state: Mutex<IsolateState>,
}

impl Isolate {
    /// Create an isolate from its static binding set.
    pub fn new(bindings: IsolateBindings) -> Arc<Self> {
        let transport = Arc::new(BindingModuleTransport::new(bindings.fetch_module.clone()));
        let runner = Arc::new(ModuleRunner::new(
            bindings.root.clone(),
            transport,
            bindings.evaluator.clone(),
        ));
        Arc::new(Self {
            bindings,
            runner,
            state: Mutex::new(IsolateState {
                harness: None,
                env_overlay: EnvMap::new(),
                hot_forwards: Vec::new(),
            }),
        })
    }

    /// The module runner owned by this isolate.
    pub fn runner(&self) -> &Arc<ModuleRunner> {
        &self.runner
    }

    /// Returns `true` once an entrypoint handshake has succeeded.
    pub fn entrypoint_set(&self) -> bool {
        self.state.lock().harness.is_some()
    }

    /// Register a callback for hot payloads read off the bootstrap socket.
    ///
    /// A full-reload is applied to the runner before it is forwarded, so
    /// a listener always observes the re-imported entrypoint.
    pub fn add_hot_listener(&self, listener: HotForward) {
        self.state.lock().hot_forwards.push(listener);
    }

    /// Dispatch one request into the isolate.
    #[instrument(skip(self, req), fields(method = %req.method, path = %req.path))]
    pub async fn dispatch_fetch(self: &Arc<Self>, req: AppRequest) -> IsolateResponse {
        let path = req.path.split('?').next().unwrap_or(&req.path);
        match path {
            protocol::INIT_MODULE_RUNNER_PATH => self.init_module_runner(&req),
            protocol::SET_ENTRYPOINT_PATH => self.set_entrypoint(&req).await,
            protocol::SET_ENVS_PATH => self.set_envs_from(&req),
            _ => self.dispatch_app(req).await,
        }
    }

    /// Bootstrap: establish the hot channel socket.
    fn init_module_runner(self: &Arc<Self>, req: &AppRequest) -> IsolateResponse {
        if req
            .get_header("upgrade")
            .is_none_or(|v| !v.eq_ignore_ascii_case("websocket"))
        {
            return IsolateResponse::text(426, "upgrade required");
        }

        let (ours, theirs) = socket_pair();
        let isolate = self.clone();
        tokio::spawn(async move {
            isolate.hot_loop(ours).await;
        });
        debug!("module runner socket established");
        IsolateResponse::upgraded(theirs)
    }

    /// Read hot payloads until the controller end goes away.
    async fn hot_loop(self: Arc<Self>, socket: SocketEnd) {
        loop {
            let Some(frame) = socket.recv_frame().await else {
                debug!("hot socket closed");
                return;
            };
            let payload = match HotPayload::decode(&frame) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "dropping malformed hot frame");
                    continue;
                }
            };

            let harness = self.state.lock().harness.clone();
            match harness {
                Some(harness) => harness.on_hot_payload(&payload).await,
                // no entrypoint yet; a reload still drops stale modules
                None => {
                    if payload == HotPayload::FullReload {
                        self.runner.clear_cache();
                    }
                }
            }

            // invoked outside the state lock; a listener may register more
            let forwards = self.state.lock().hot_forwards.clone();
            for forward in &forwards {
                forward(&payload);
            }
        }
    }

    /// One-time entrypoint handshake.
    async fn set_entrypoint(self: &Arc<Self>, req: &AppRequest) -> IsolateResponse {
        let Some(entrypoint) = req.get_header(protocol::ENTRYPOINT_HEADER) else {
            return IsolateResponse::text(400, "missing entrypoint header");
        };

        let harness = Arc::new(RunnerHarness::new(self.runner.clone(), entrypoint));
        if let Err(e) = harness.set_handler().await {
            error!(entrypoint, error = %e, "failed to import entrypoint");
            return IsolateResponse::text(500, "failed to import entrypoint");
        }

        self.state.lock().harness = Some(harness);
        IsolateResponse::text(200, "entrypoint successfully set")
    }

    /// Shallow-merge a JSON body into the environment overlay.
    fn set_envs_from(&self, req: &AppRequest) -> IsolateResponse {
        let new_envs: EnvMap = match serde_json::from_slice(&req.body) {
            Ok(envs) => envs,
            Err(e) => return IsolateResponse::text(400, &format!("invalid envs body: {e}")),
        };

        let mut state = self.state.lock();
        for (name, value) in new_envs {
            state.env_overlay.insert(name, value);
        }
        IsolateResponse::text(200, "envs successfully set")
    }

    /// Dispatch an application request to the entrypoint handler.
    async fn dispatch_app(&self, req: AppRequest) -> IsolateResponse {
        let (harness, overlay) = {
            let state = self.state.lock();
            (state.harness.clone(), state.env_overlay.clone())
        };

        let Some(harness) = harness else {
            return IsolateResponse::text(503, "entrypoint not set");
        };
        let Some(handler) = harness.handler() else {
            // uninitialized: the first resolution has not landed yet
            return IsolateResponse::text(503, "handler not ready");
        };

        let mut env = self.bindings.app_env();
        for (name, value) in overlay {
            env.insert(name, value);
        }

        handler.handle(req, env).await.into()
    }
}

impl std::fmt::Debug for Isolate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Isolate")
            .field("root", &self.bindings.root)
            .field("entrypoint_set", &self.entrypoint_set())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;

    use dev_bridge_common::{BridgeError, TransformedModule};
    use dev_bridge_core::{
        handler_fn, CodeEvaluator, ModuleExports, ModuleNamespace, ModuleValue,
    };

    use crate::bindings::{BindingResponse, ModuleFetchBinding};

    /// Binding serving a one-module graph whose body records a version.
    struct VersionedBinding {
        version: AtomicU64,
    }

    #[async_trait]
    impl ModuleFetchBinding for VersionedBinding {
        async fn dispatch(&self, body: &[u8]) -> BindingResponse {
            let args: (String, Option<String>) = serde_json::from_slice(body).unwrap();
            let v = self.version.fetch_add(1, Ordering::SeqCst);
            let module = TransformedModule::new(args.0, format!("v{v}"));
            BindingResponse::ok(serde_json::to_vec(&module).unwrap())
        }
    }

    /// Evaluator exporting a handler that reports body + observed env.
    struct EnvEchoEvaluator;

    #[async_trait]
    impl CodeEvaluator for EnvEchoEvaluator {
        async fn evaluate(
            &self,
            module: &TransformedModule,
            _deps: &HashMap<String, Arc<ModuleNamespace>>,
        ) -> Result<ModuleExports, BridgeError> {
            let body = module.code.clone();
            let mut exports = ModuleExports::new();
            exports.set_default(ModuleValue::Handler(handler_fn(move |_, env| {
                let doc = serde_json::json!({ "body": body, "env": env });
                dev_bridge_core::AppResponse::json(200, &doc.to_string())
            })));
            Ok(exports)
        }
    }

    fn isolate() -> Arc<Isolate> {
        let mut static_env = EnvMap::new();
        static_env.insert("STATIC_KEY".into(), serde_json::json!("static"));
        static_env.insert("ROOT".into(), serde_json::json!("/leak"));

        Isolate::new(
            IsolateBindings::new(
                "/srv/app",
                Arc::new(EnvEchoEvaluator),
                Arc::new(VersionedBinding {
                    version: AtomicU64::new(0),
                }),
            )
            .with_static_env(static_env),
        )
    }

    fn bootstrap_req() -> AppRequest {
        AppRequest::new("GET", protocol::INIT_MODULE_RUNNER_PATH).with_header("upgrade", "websocket")
    }

    fn entrypoint_req() -> AppRequest {
        AppRequest::new("GET", protocol::SET_ENTRYPOINT_PATH)
            .with_header(protocol::ENTRYPOINT_HEADER, "/main.ts")
    }

    async fn app_body(isolate: &Arc<Isolate>) -> serde_json::Value {
        let resp = isolate.dispatch_fetch(AppRequest::new("GET", "/")).await;
        assert_eq!(resp.status, 200);
        serde_json::from_slice(&resp.body).unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_returns_upgraded_socket() {
        let isolate = isolate();
        let resp = isolate.dispatch_fetch(bootstrap_req()).await;
        assert_eq!(resp.status, 101);
        assert!(resp.socket.is_some());
    }

    #[tokio::test]
    async fn test_bootstrap_without_upgrade_header() {
        let isolate = isolate();
        let resp = isolate
            .dispatch_fetch(AppRequest::new("GET", protocol::INIT_MODULE_RUNNER_PATH))
            .await;
        assert!(resp.socket.is_none());
        assert_eq!(resp.status, 426);
    }

    #[tokio::test]
    async fn test_app_request_before_entrypoint_is_dropped() {
        let isolate = isolate();
        let resp = isolate.dispatch_fetch(AppRequest::new("GET", "/")).await;
        assert_eq!(resp.status, 503);
    }

    #[tokio::test]
    async fn test_set_entrypoint_then_serve() {
        let isolate = isolate();
        let resp = isolate.dispatch_fetch(entrypoint_req()).await;
        assert_eq!(resp.status, 200);
        assert!(isolate.entrypoint_set());

        let doc = app_body(&isolate).await;
        assert_eq!(doc["body"], "v0");
        // static env visible, reserved names filtered
        assert_eq!(doc["env"]["STATIC_KEY"], "static");
        assert!(doc["env"].get("ROOT").is_none());
    }

    #[tokio::test]
    async fn test_set_entrypoint_missing_header() {
        let isolate = isolate();
        let resp = isolate
            .dispatch_fetch(AppRequest::new("GET", protocol::SET_ENTRYPOINT_PATH))
            .await;
        assert_eq!(resp.status, 400);
    }

    #[tokio::test]
    async fn test_set_envs_merges_over_static() {
        let isolate = isolate();
        isolate.dispatch_fetch(entrypoint_req()).await;

        let body = serde_json::json!({ "UPSTREAM_PORT": "5170", "STATIC_KEY": "overridden" });
        let resp = isolate
            .dispatch_fetch(
                AppRequest::new("POST", protocol::SET_ENVS_PATH)
                    .with_body(body.to_string().into_bytes()),
            )
            .await;
        assert_eq!(resp.status, 200);

        let doc = app_body(&isolate).await;
        assert_eq!(doc["env"]["UPSTREAM_PORT"], "5170");
        assert_eq!(doc["env"]["STATIC_KEY"], "overridden");

        // later merges keep earlier keys
        let body = serde_json::json!({ "EXTRA": 1 });
        isolate
            .dispatch_fetch(
                AppRequest::new("POST", protocol::SET_ENVS_PATH)
                    .with_body(body.to_string().into_bytes()),
            )
            .await;
        let doc = app_body(&isolate).await;
        assert_eq!(doc["env"]["UPSTREAM_PORT"], "5170");
        assert_eq!(doc["env"]["EXTRA"], 1);
    }

    #[tokio::test]
    async fn test_full_reload_over_socket_swaps_handler() {
        let isolate = isolate();
        let resp = isolate.dispatch_fetch(bootstrap_req()).await;
        let controller_end = resp.socket.unwrap();
        isolate.dispatch_fetch(entrypoint_req()).await;

        assert_eq!(app_body(&isolate).await["body"], "v0");

        controller_end.send_frame(HotPayload::FullReload.encode());
        // the hot loop runs on a spawned task; give it a beat
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(app_body(&isolate).await["body"], "v1");
    }

    #[tokio::test]
    async fn test_custom_payloads_reach_hot_listeners() {
        let isolate = isolate();
        let resp = isolate.dispatch_fetch(bootstrap_req()).await;
        let controller_end = resp.socket.unwrap();
        isolate.dispatch_fetch(entrypoint_req()).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        isolate.add_hot_listener(Arc::new(move |payload: &HotPayload| {
            sink.lock().push(payload.clone());
        }));

        controller_end
            .send_frame(HotPayload::custom("announce", serde_json::json!("hi")).encode());
        controller_end.send_frame(HotPayload::FullReload.encode());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(
            *seen.lock(),
            vec![
                HotPayload::custom("announce", serde_json::json!("hi")),
                HotPayload::FullReload,
            ]
        );
        // the reload was applied before it was forwarded
        assert_eq!(app_body(&isolate).await["body"], "v1");
    }

    #[tokio::test]
    async fn test_set_envs_invalid_body() {
        let isolate = isolate();
        let resp = isolate
            .dispatch_fetch(
                AppRequest::new("POST", protocol::SET_ENVS_PATH).with_body(b"{oops".to_vec()),
            )
            .await;
        assert_eq!(resp.status, 400);
    }
}
