//! End-to-end tests for the remote module evaluator.
//!
//! These drive a [`ModuleRunner`] + [`RunnerHarness`] pair against a
//! scripted transport and evaluator, the way a remote runtime host would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use dev_bridge_common::{BridgeError, HotPayload, TransformedModule};
use dev_bridge_core::{
    handler_fn, AppRequest, AppResponse, CodeEvaluator, ModuleExports, ModuleNamespace,
    ModuleRunner, ModuleTransport, ModuleValue, RunnerHarness, SlotState,
};

/// Transport that bumps a version on every fetch of the entrypoint and can
/// be paused to hold a fetch in flight.
struct ScriptedTransport {
    version: AtomicU64,
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl ModuleTransport for ScriptedTransport {
    async fn fetch_module(
        &self,
        id: &str,
        importer: Option<&str>,
    ) -> Result<TransformedModule, BridgeError> {
        let version = self.version.fetch_add(1, Ordering::SeqCst);
        if version > 0 {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
        }
        assert!(importer.is_none() || importer == Some("/main.ts"));
        Ok(TransformedModule::new(id, format!("v{version}")))
    }
}

/// Evaluator that exports a handler echoing the compiled body.
struct BodyEvaluator;

#[async_trait]
impl CodeEvaluator for BodyEvaluator {
    async fn evaluate(
        &self,
        module: &TransformedModule,
        _deps: &HashMap<String, Arc<ModuleNamespace>>,
    ) -> Result<ModuleExports, BridgeError> {
        let body = module.code.clone();
        let mut exports = ModuleExports::new();
        exports.set_default(ModuleValue::Handler(handler_fn(move |_, _| {
            AppResponse::text(200, &body)
        })));
        Ok(exports)
    }
}

async fn served_body(harness: &RunnerHarness) -> String {
    let handler = harness.handler().expect("handler installed");
    let resp = handler
        .handle(AppRequest::new("GET", "/"), Default::default())
        .await;
    String::from_utf8(resp.body).unwrap()
}

#[tokio::test]
async fn first_import_sets_handler_from_default_export() {
    // scenario: the runtime fetches "/main.ts" once, evaluates it, and the
    // default export becomes the serving handler
    let runner = Arc::new(ModuleRunner::new(
        "/srv/app",
        Arc::new(ScriptedTransport {
            version: AtomicU64::new(0),
            gate: None,
        }),
        Arc::new(BodyEvaluator),
    ));
    let harness = RunnerHarness::new(runner.clone(), "/main.ts");

    assert_eq!(harness.slot().state(), SlotState::Uninitialized);
    harness.set_handler().await.unwrap();

    assert_eq!(harness.slot().state(), SlotState::Ready);
    assert!(runner.is_cached("/main.ts"));
    assert_eq!(served_body(&harness).await, "v0");
}

#[tokio::test]
async fn full_reload_revalidates_while_old_handler_serves() {
    let gate = Arc::new(Notify::new());
    let runner = Arc::new(ModuleRunner::new(
        "/srv/app",
        Arc::new(ScriptedTransport {
            version: AtomicU64::new(0),
            gate: Some(gate.clone()),
        }),
        Arc::new(BodyEvaluator),
    ));
    let harness = Arc::new(RunnerHarness::new(runner, "/main.ts"));

    harness.activate().await;
    assert_eq!(served_body(&harness).await, "v0");

    // a full-reload arrives; the re-import blocks on the transport gate
    let revalidation = {
        let harness = harness.clone();
        tokio::spawn(async move { harness.on_hot_payload(&HotPayload::FullReload).await })
    };
    tokio::task::yield_now().await;

    // requests arriving during the transition are served by the old handler
    assert_eq!(harness.slot().state(), SlotState::Revalidating);
    assert_eq!(served_body(&harness).await, "v0");

    gate.notify_one();
    revalidation.await.unwrap();

    assert_eq!(harness.slot().state(), SlotState::Ready);
    assert_eq!(served_body(&harness).await, "v1");
}

#[tokio::test]
async fn repeated_full_reloads_each_schedule_a_resolution() {
    let runner = Arc::new(ModuleRunner::new(
        "/srv/app",
        Arc::new(ScriptedTransport {
            version: AtomicU64::new(0),
            gate: None,
        }),
        Arc::new(BodyEvaluator),
    ));
    let harness = RunnerHarness::new(runner, "/main.ts");

    harness.activate().await;
    harness.on_hot_payload(&HotPayload::FullReload).await;
    harness.on_hot_payload(&HotPayload::FullReload).await;

    // every reload re-resolved; the last one is serving
    assert_eq!(served_body(&harness).await, "v2");
    assert_eq!(harness.slot().state(), SlotState::Ready);
}

#[tokio::test]
async fn non_reload_payloads_do_not_touch_the_handler() {
    let runner = Arc::new(ModuleRunner::new(
        "/srv/app",
        Arc::new(ScriptedTransport {
            version: AtomicU64::new(0),
            gate: None,
        }),
        Arc::new(BodyEvaluator),
    ));
    let harness = RunnerHarness::new(runner.clone(), "/main.ts");

    harness.activate().await;
    harness
        .on_hot_payload(&HotPayload::custom("ping", serde_json::json!({})))
        .await;

    assert_eq!(served_body(&harness).await, "v0");
    assert!(runner.is_cached("/main.ts"));
}
