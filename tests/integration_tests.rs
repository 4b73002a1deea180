//! Integration tests for flow deployment and execution
//!
//! Each test spawns a kernel, deploys an app and drives instances through
//! the message loop, observing them via lifecycle events and the store.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokenflow::base::broadcast::{LifecycleEvent, LifecycleEventType};
use tokenflow::base::error::{DefinitionError, TokenflowError};
use tokenflow::base::instance::{FlowMetadata, FlowType, Payload, TokenId, TokenStatus};
use tokenflow::flow::config::{EngineConfig, Transport};
use tokenflow::flow::definition::{App, AppLoader};
use tokenflow::flow::interpreter::{Action, ActionRegistry};
use tokenflow::flow::kernel::Kernel;
use tokio::sync::{broadcast, Mutex};

// ============================================================================
// Fixtures
// ============================================================================

static LOANS: Lazy<App> = Lazy::new(|| {
    AppLoader::parse_yaml(
        r#"
id: loans
name: Loans
flows:
  - id: P1
    variables:
      - { name: x, scope: Input }
    flow_objects:
      - { id: s, kind: StartEvent }
      - { id: a, kind: InlineAction }
      - id: g
        kind: DecisionGateway
        conditions:
          - { id: big, when: "x > 5", connect_to: g_b }
          - { id: otherwise, connect_to: g_c }
      - { id: b, kind: InlineAction }
      - { id: c, kind: InlineAction }
      - { id: e, kind: EndEvent }
    connecting_objects:
      - { id: s_a, from: s, to: a }
      - { id: a_g, from: a, to: g }
      - { id: g_b, from: g, to: b }
      - { id: g_c, from: g, to: c }
      - { id: b_e, from: b, to: e }
      - { id: c_e, from: c, to: e }
"#,
    )
    .unwrap()
});

static SPLIT: Lazy<App> = Lazy::new(|| {
    AppLoader::parse_yaml(
        r#"
id: fanout
flows:
  - id: P2
    flow_objects:
      - { id: s, kind: StartEvent }
      - { id: a, kind: InlineAction }
      - { id: b, kind: InlineAction }
      - { id: c, kind: InlineAction }
      - { id: e, kind: EndEvent }
    connecting_objects:
      - { id: s_a, from: s, to: a }
      - { id: a_b, from: a, to: b }
      - { id: a_c, from: a, to: c }
      - { id: b_e, from: b, to: e }
      - { id: c_e, from: c, to: e }
"#,
    )
    .unwrap()
});

static NESTED: Lazy<App> = Lazy::new(|| {
    AppLoader::parse_yaml(
        r#"
id: nested
flows:
  - id: P
    variables:
      - { name: x, scope: Input }
    flow_objects:
      - { id: s, kind: StartEvent }
      - id: a
        kind: SubFlowRef
        sub_flow_id: S
        data_mappings:
          - { from: x, to: amount, scope: Input }
          - { from: total, to: result, scope: Output }
      - { id: check, kind: InlineAction, action: capture }
      - { id: e, kind: EndEvent }
    connecting_objects:
      - { id: s_a, from: s, to: a }
      - { id: a_check, from: a, to: check }
      - { id: check_e, from: check, to: e }
  - id: S
    flow_type: MicroService
    variables:
      - { name: amount, scope: Input }
      - { name: total, scope: Output }
    flow_objects:
      - { id: s2, kind: StartEvent }
      - { id: calc, kind: InlineAction, action: double }
      - { id: e2, kind: EndEvent }
    connecting_objects:
      - { id: s2_calc, from: s2, to: calc }
      - { id: calc_e2, from: calc, to: e2 }
"#,
    )
    .unwrap()
});

static REVIEW: Lazy<App> = Lazy::new(|| {
    AppLoader::parse_yaml(
        r#"
id: review
flows:
  - id: P
    flow_objects:
      - { id: s, kind: StartEvent }
      - id: f
        kind: SubFlowRef
        sub_flow_id: form
        data_mappings:
          - { from: approved, to: approved, scope: Output }
      - { id: e, kind: EndEvent }
    connecting_objects:
      - { id: s_f, from: s, to: f }
      - { id: f_e, from: f, to: e }
  - id: form
    flow_type: InteractiveService
    variables:
      - { name: approved, scope: Output }
    flow_objects:
      - { id: s3, kind: StartEvent }
      - { id: v, kind: ViewRef, ref_view_id: approve_form }
      - { id: e3, kind: EndEvent }
    connecting_objects:
      - { id: s3_v, from: s3, to: v }
      - { id: v_e3, from: v, to: e3 }
"#,
    )
    .unwrap()
});

// ============================================================================
// Mock Components
// ============================================================================

/// Doubles `amount` into `total`
struct Double;

#[async_trait]
impl Action for Double {
    fn name(&self) -> &str {
        "double"
    }

    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        let amount = input
            .get("amount")
            .and_then(Value::as_i64)
            .ok_or("amount missing")?;
        let mut data = input.as_object().cloned().unwrap_or_default();
        data.insert("total".into(), json!(amount * 2));
        Ok(Value::Object(data))
    }
}

/// Records the data it sees and passes it on unchanged
#[derive(Default)]
struct Capture {
    seen: Mutex<Vec<Value>>,
}

#[async_trait]
impl Action for Capture {
    fn name(&self) -> &str {
        "capture"
    }

    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        self.seen.lock().await.push(input.clone());
        Ok(input)
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn kernel_with(config: EngineConfig, actions: ActionRegistry) -> Kernel {
    Kernel::builder()
        .config(config)
        .actions(actions)
        .spawn()
        .await
        .unwrap()
}

async fn kernel() -> Kernel {
    kernel_with(EngineConfig::default(), ActionRegistry::new()).await
}

fn payload(value: Value) -> Payload {
    value.as_object().cloned().unwrap()
}

fn top_level(event_type: LifecycleEventType) -> impl Fn(&LifecycleEvent) -> bool {
    move |event| event.event_type == event_type && event.is_top_level()
}

fn of_type(event_type: LifecycleEventType) -> impl Fn(&LifecycleEvent) -> bool {
    move |event| event.event_type == event_type
}

/// Wait for the first event matching `pred`, returning it and every event
/// seen before it.
async fn wait_for<F>(
    events: &mut broadcast::Receiver<LifecycleEvent>,
    pred: F,
) -> (LifecycleEvent, Vec<LifecycleEvent>)
where
    F: Fn(&LifecycleEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut before = Vec::new();
        loop {
            let event = events.recv().await.expect("lifecycle channel closed");
            if pred(&event) {
                return (event, before);
            }
            before.push(event);
        }
    })
    .await
    .expect("timed out waiting for lifecycle event")
}

/// Events published within a short grace period
async fn settle(events: &mut broadcast::Receiver<LifecycleEvent>) -> Vec<LifecycleEvent> {
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut rest = Vec::new();
    while let Ok(event) = events.try_recv() {
        rest.push(event);
    }
    rest
}

async fn trail(kernel: &Kernel, root: TokenId) -> Vec<String> {
    kernel
        .token_trail(root)
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.flow_object_id)
        .collect()
}

async fn run_loans(kernel: &Kernel, x: i64) -> (TokenId, Vec<LifecycleEvent>) {
    let mut events = kernel.subscribe();
    kernel.deploy_app(&LOANS).await.unwrap();
    let root = kernel
        .start("loans", "P1", Some(payload(json!({ "x": x }))))
        .await
        .unwrap()
        .expect("process instances are persisted");

    let (_, mut others) = wait_for(&mut events, top_level(LifecycleEventType::Complete)).await;
    others.extend(settle(&mut events).await);
    (root, others)
}

// ============================================================================
// Flow Execution Tests
// ============================================================================

#[tokio::test]
async fn test_end_to_end_takes_guarded_branch() {
    let kernel = kernel().await;
    let (root, others) = run_loans(&kernel, 10).await;

    assert_eq!(trail(&kernel, root).await, vec!["s", "a", "g", "b", "e"]);
    assert_eq!(
        kernel.store().vertex(root).await.unwrap().status,
        TokenStatus::Completed
    );
    for vertex in kernel.token_trail(root).await.unwrap() {
        assert_eq!(vertex.status, TokenStatus::Completed, "{}", vertex.flow_object_id);
        assert_eq!(vertex.instance_id, Some(root));
    }
    assert!(!others
        .iter()
        .any(|e| e.event_type == LifecycleEventType::Complete));
}

#[tokio::test]
async fn test_gateway_falls_back_to_last_condition() {
    let kernel = kernel().await;
    let (root, _) = run_loans(&kernel, 1).await;
    assert_eq!(trail(&kernel, root).await, vec!["s", "a", "g", "c", "e"]);
}

#[tokio::test]
async fn test_split_runs_both_branches_without_join() {
    let kernel = kernel().await;
    let mut events = kernel.subscribe();
    kernel.deploy_app(&SPLIT).await.unwrap();
    let root = kernel.start("fanout", "P2", None).await.unwrap().unwrap();

    // Each branch reaches the end on its own
    wait_for(&mut events, top_level(LifecycleEventType::Complete)).await;
    wait_for(&mut events, top_level(LifecycleEventType::Complete)).await;

    let mut steps = trail(&kernel, root).await;
    steps.sort();
    assert_eq!(steps, vec!["a", "b", "c", "e", "e", "s"]);
}

#[tokio::test]
async fn test_sub_flow_round_trip() {
    let actions = ActionRegistry::new();
    let capture = Arc::new(Capture::default());
    actions.register(Arc::new(Double)).await;
    actions.register(capture.clone()).await;

    let kernel = kernel_with(EngineConfig::default(), actions).await;
    let mut events = kernel.subscribe();
    kernel.deploy_app(&NESTED).await.unwrap();
    let root = kernel
        .start("nested", "P", Some(payload(json!({"x": 4}))))
        .await
        .unwrap()
        .unwrap();

    let (_, before) = wait_for(&mut events, top_level(LifecycleEventType::Complete)).await;

    // The sub-flow completed first, linked to its parent step
    let sub_complete: Vec<&LifecycleEvent> = before
        .iter()
        .filter(|e| e.event_type == LifecycleEventType::Complete)
        .collect();
    assert_eq!(sub_complete.len(), 1);
    assert_eq!(sub_complete[0].flow_id, "S");
    assert!(!sub_complete[0].is_top_level());

    // The parent saw the sub-flow's output, and none of its internals
    let seen = capture.seen.lock().await.clone();
    assert_eq!(seen, vec![json!({"x": 4, "result": 8})]);

    assert_eq!(
        trail(&kernel, root).await,
        vec!["s", "a", "s2", "calc", "e2", "check", "e"]
    );
}

#[tokio::test]
async fn test_interactive_sub_flow() {
    let kernel = kernel().await;
    let mut events = kernel.subscribe();
    kernel.deploy_app(&REVIEW).await.unwrap();
    let root = kernel.start("review", "P", None).await.unwrap().unwrap();

    let (waiting, _) = wait_for(&mut events, of_type(LifecycleEventType::WaitInteraction)).await;
    let task_token = waiting.flow_object_instance_id.unwrap();
    let inbox = kernel.inbox(1, 10).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].token, task_token);
    assert_eq!(inbox[0].flow_object_id, "f");
    assert_eq!(
        kernel.store().vertex(task_token).await.unwrap().status,
        TokenStatus::New
    );

    kernel.start_interaction_task(task_token).await.unwrap();
    let (started, _) = wait_for(&mut events, of_type(LifecycleEventType::StartInteraction)).await;
    let view_token = started.flow_object_instance_id.unwrap();
    assert_eq!(
        kernel.store().vertex(view_token).await.unwrap().status,
        TokenStatus::UserInteracting
    );

    let mut view = kernel.get_flow_instance_task(view_token).await.unwrap();
    assert_eq!(view.metadata.flow.flow_id, "form");
    view.data = payload(json!({"approved": true}));
    kernel.complete_interaction_task(view).await.unwrap();

    let (_, before) = wait_for(&mut events, top_level(LifecycleEventType::Complete)).await;
    let types: Vec<LifecycleEventType> = before.iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![
            LifecycleEventType::CompleteInteraction,
            LifecycleEventType::Complete
        ]
    );

    assert!(kernel.inbox(1, 10).await.unwrap().is_empty());
    assert_eq!(
        trail(&kernel, root).await,
        vec!["s", "f", "s3", "v", "e3", "e"]
    );
}

#[tokio::test]
async fn test_unknown_flow_fails_without_tokens() {
    let kernel = kernel().await;
    let mut events = kernel.subscribe();
    let root = kernel
        .start_flow(FlowMetadata::new("loans", "missing", FlowType::Process), None)
        .await
        .unwrap()
        .unwrap();

    let (failed, _) = wait_for(&mut events, of_type(LifecycleEventType::Fail)).await;
    assert_eq!(failed.failure_code, Some(3005));
    assert!(settle(&mut events)
        .await
        .iter()
        .all(|e| e.event_type != LifecycleEventType::Fail));

    assert!(trail(&kernel, root).await.is_empty());
    let vertex = kernel.store().vertex(root).await.unwrap();
    assert_eq!(vertex.status, TokenStatus::Failed);
    assert!(vertex.cause.unwrap().starts_with("3005"));
}

#[tokio::test]
async fn test_failing_step_records_cause() {
    // `capture` and `double` are not registered
    let kernel = kernel().await;
    let mut events = kernel.subscribe();
    kernel.deploy_app(&NESTED).await.unwrap();
    let root = kernel
        .start("nested", "P", Some(payload(json!({"x": 4}))))
        .await
        .unwrap()
        .unwrap();

    let (failed, _) = wait_for(&mut events, of_type(LifecycleEventType::Fail)).await;
    assert_eq!(failed.failure_code, Some(3008));
    assert_eq!(failed.flow_id, "S");

    let calc = kernel
        .token_trail(root)
        .await
        .unwrap()
        .into_iter()
        .find(|v| v.flow_object_id == "calc")
        .unwrap();
    assert_eq!(calc.status, TokenStatus::Failed);
    assert!(calc.cause.unwrap().contains("double"));
}

#[tokio::test]
async fn test_wire_transport_matches_local() {
    let config = EngineConfig {
        transport: Transport::Wire,
        ..EngineConfig::default()
    };
    let kernel = kernel_with(config, ActionRegistry::new()).await;
    let (root, _) = run_loans(&kernel, 10).await;
    assert_eq!(trail(&kernel, root).await, vec!["s", "a", "g", "b", "e"]);
}

#[tokio::test]
async fn test_lifecycle_events_can_be_switched_off() {
    let config = EngineConfig {
        publish_lifecycle_events: false,
        ..EngineConfig::default()
    };
    let kernel = kernel_with(config, ActionRegistry::new()).await;
    let mut events = kernel.subscribe();
    kernel.deploy_app(&LOANS).await.unwrap();
    let root = kernel
        .start("loans", "P1", Some(payload(json!({"x": 10}))))
        .await
        .unwrap()
        .unwrap();

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if kernel.store().vertex(root).await.unwrap().status == TokenStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(completed.is_ok());
    assert!(settle(&mut events).await.is_empty());
}

// ============================================================================
// Deployment Tests
// ============================================================================

#[tokio::test]
async fn test_duplicate_deploy_is_rejected() {
    let kernel = kernel().await;
    kernel.deploy_app(&LOANS).await.unwrap();
    let err = kernel.deploy_app(&LOANS).await.unwrap_err();
    assert!(matches!(
        err,
        TokenflowError::Definition(DefinitionError::AppAlreadyDeployed(_))
    ));
}

#[tokio::test]
async fn test_concurrent_deploys_register_once() {
    let kernel = Arc::new(kernel().await);
    let attempts = (0..4).map(|_| {
        let kernel = kernel.clone();
        tokio::spawn(async move { kernel.deploy_app(&LOANS).await.is_ok() })
    });
    let results = futures::future::join_all(attempts).await;
    let deployed = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
    assert_eq!(deployed, 1);
}

#[tokio::test]
async fn test_undeployed_app_cannot_start() {
    let kernel = kernel().await;
    kernel.deploy_app(&LOANS).await.unwrap();
    kernel.undeploy_app("loans").await.unwrap();
    assert!(kernel.start("loans", "P1", None).await.is_err());
    assert!(kernel.flows().await.unwrap().is_empty());
}
