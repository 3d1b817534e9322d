//! Integration tests for normalization, state ops and directives
//!
//! Tests cover:
//! - Normalization order and all-or-nothing lists
//! - Context precedence and opts merging
//! - Deep merge and path operations
//! - Partitioning effects into state ops and directives
//! - Directive wire format and extension kinds

use marshal_agent::{
    apply, deep_merge, normalize, normalize_single, ActionRegistry, Agent, AgentError,
    ContextPrecedence, CustomDirective, Directive, DirectiveRegistry, Effect, ExtensionDirective,
    FnAction, ActionOutput, Instruction, InstructionInput, Normalizer, Opts, ScheduleMessage,
    StateOp, StopReason,
};
use marshal_bus::Signal;
use marshal_dispatch::DispatchConfig;
use serde_json::{json, Map, Value};
use std::any::Any;

fn map(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

// ============================================================================
// Normalization
// ============================================================================

/// Test every accepted shape normalizes, preserving order
#[test]
fn test_normalize_mixed_list() {
    let prebuilt = Instruction::new("d")
        .map(|i| i.with_id("fixed-id"))
        .unwrap_or_else(|e| panic!("{}", e));
    let input = InstructionInput::List(vec![
        "a".into(),
        ("b", map(json!({"x": 1}))).into(),
        ("c", Map::new(), map(json!({"trace": "t1"}))).into(),
        prebuilt.into(),
    ]);

    let instructions = normalize(input, &Map::new(), &Opts::new()).unwrap();

    let actions: Vec<&str> = instructions.iter().map(|i| i.action.as_str()).collect();
    assert_eq!(actions, vec!["a", "b", "c", "d"]);
    assert_eq!(instructions[1].params["x"], json!(1));
    assert_eq!(instructions[2].context["trace"], json!("t1"));
    assert_eq!(instructions[3].id, "fixed-id");
    assert_ne!(instructions[0].id, instructions[1].id);
}

/// Test one bad element fails the whole list
#[test]
fn test_normalize_all_or_nothing() {
    let input = InstructionInput::from(vec!["ok", "", "also_ok"]);
    let err = normalize(input, &Map::new(), &Opts::new()).unwrap_err();
    assert!(matches!(err, AgentError::InvalidAction(_)));
}

/// Test an empty list normalizes to no instructions
#[test]
fn test_normalize_empty_list() {
    let input = InstructionInput::List(Vec::new());
    assert!(normalize(input, &Map::new(), &Opts::new()).unwrap().is_empty());
}

/// Test normalize_single refuses lists
#[test]
fn test_normalize_single_refuses_list() {
    let err = normalize_single(vec!["a"], &Map::new(), &Opts::new()).unwrap_err();
    assert!(matches!(err, AgentError::InvalidFormat(_)));

    let instruction = normalize_single("a", &Map::new(), &Opts::new()).unwrap();
    assert_eq!(instruction.action.as_str(), "a");
}

/// Test shared context conflicts resolve by the configured precedence
#[test]
fn test_context_precedence() {
    let shared = map(json!({"tenant": "shared", "region": "eu"}));
    let item = ("a", Map::new(), map(json!({"tenant": "item"})));

    let shared_wins = Normalizer::new()
        .normalize_single(item.clone(), &shared, &Opts::new())
        .unwrap();
    assert_eq!(shared_wins.context["tenant"], json!("shared"));
    assert_eq!(shared_wins.context["region"], json!("eu"));

    let item_wins = Normalizer::new()
        .with_precedence(ContextPrecedence::ItemWins)
        .normalize_single(item, &shared, &Opts::new())
        .unwrap();
    assert_eq!(item_wins.context["tenant"], json!("item"));
    assert_eq!(item_wins.context["region"], json!("eu"));
}

/// Test instructions without their own context get the shared one
#[test]
fn test_shared_context_fills_bare_actions() {
    let shared = map(json!({"tenant": "acme"}));
    let instructions = normalize(vec!["a", "b"], &shared, &Opts::new()).unwrap();
    assert!(instructions.iter().all(|i| i.context == shared));
}

/// Test shared opts extend item opts
#[test]
fn test_opts_merge() {
    let item_opts = Opts::new().with("timeout", 10).with("retries", 1);
    let shared_opts = Opts::new().with("retries", 3).with("log", true);
    let input = ("a", Map::new(), Map::new(), item_opts);

    let instruction = normalize_single(input, &Map::new(), &shared_opts).unwrap();

    let keys: Vec<&str> = instruction.opts.keys().collect();
    assert_eq!(keys, vec!["timeout", "retries", "log"]);
    assert_eq!(instruction.opts.get("timeout"), Some(&json!(10)));
}

/// Test unknown actions are rejected when a registry is supplied
#[test]
fn test_registry_check() {
    let actions =
        ActionRegistry::new().with(FnAction::new("known", |_, _| Ok(ActionOutput::empty())));
    let normalizer = Normalizer::new().with_actions(&actions);

    assert!(normalizer.normalize_single("known", &Map::new(), &Opts::new()).is_ok());
    let err = normalizer
        .normalize(vec!["known", "unknown"], &Map::new(), &Opts::new())
        .unwrap_err();
    assert_eq!(err, AgentError::UnknownAction("unknown".to_string()));
}

/// Test JSON instruction input
#[test]
fn test_instruction_from_json() {
    let input = InstructionInput::try_from(json!([
        "ping",
        {"action": "send", "params": {"to": "ops"}, "opts": [["timeout", 5]]},
        {"action": "tagged", "id": "abc"}
    ]))
    .unwrap();

    let instructions = normalize(input, &Map::new(), &Opts::new()).unwrap();
    assert_eq!(instructions.len(), 3);
    assert_eq!(instructions[1].params["to"], json!("ops"));
    assert_eq!(instructions[1].opts.get("timeout"), Some(&json!(5)));
    assert_eq!(instructions[2].id, "abc");

    assert!(InstructionInput::try_from(json!(42)).is_err());
    assert!(InstructionInput::try_from(json!({"params": {}})).is_err());
}

// ============================================================================
// State ops
// ============================================================================

/// Test deep merge is associative for map-valued inputs
#[test]
fn test_deep_merge_associative() {
    let a = map(json!({"cfg": {"x": 1, "nested": {"p": 1}}, "keep": true}));
    let b = map(json!({"cfg": {"y": 2, "nested": {"q": 2}}}));
    let c = map(json!({"cfg": {"x": 3, "nested": {"p": 9}}, "list": [1]}));

    let mut left = a.clone();
    deep_merge(&mut left, b.clone());
    deep_merge(&mut left, c.clone());

    let mut bc = b;
    deep_merge(&mut bc, c);
    let mut right = a;
    deep_merge(&mut right, bc);

    assert_eq!(left, right);
    assert_eq!(
        Value::Object(left),
        json!({
            "cfg": {"x": 3, "y": 2, "nested": {"p": 9, "q": 2}},
            "keep": true,
            "list": [1]
        })
    );
}

/// Test deleting a path twice equals deleting it once
#[test]
fn test_delete_path_idempotent() {
    let mut once = map(json!({"a": {"b": {"c": 1, "d": 2}}}));
    StateOp::delete_path(["a", "b", "c"]).apply_to(&mut once);

    let mut twice = once.clone();
    StateOp::delete_path(["a", "b", "c"]).apply_to(&mut twice);

    assert_eq!(once, twice);
    assert_eq!(Value::Object(once), json!({"a": {"b": {"d": 2}}}));
}

/// Test set_path creates and replaces intermediate nodes
#[test]
fn test_set_path_builds_structure() {
    let mut state = map(json!({"a": 5}));
    StateOp::set_path(["a", "b", "c"], "deep").apply_to(&mut state);
    assert_eq!(Value::Object(state), json!({"a": {"b": {"c": "deep"}}}));
}

/// Test replace and delete_keys
#[test]
fn test_replace_and_delete_keys() {
    let mut state = map(json!({"a": 1, "b": 2, "c": 3}));
    StateOp::delete_keys(["a", "missing"]).apply_to(&mut state);
    assert_eq!(Value::Object(state.clone()), json!({"b": 2, "c": 3}));

    StateOp::replace_state(map(json!({"z": 0}))).apply_to(&mut state);
    assert_eq!(Value::Object(state), json!({"z": 0}));
}

/// Test state ops apply in order and directives keep their order
#[test]
fn test_apply_partitions_effects() {
    let s1 = Signal::new("first", "/test");
    let s2 = Signal::new("second", "/test");
    let effects: Vec<Effect> = vec![
        StateOp::set_state(map(json!({"a": 1}))).into(),
        Directive::emit(s1.clone()).into(),
        StateOp::set_path(["b"], 2).into(),
        Directive::emit(s2.clone()).into(),
    ];

    let (agent, directives) = apply(Agent::new("partition"), effects);

    assert_eq!(Value::Object(agent.state), json!({"a": 1, "b": 2}));
    assert_eq!(directives, vec![Directive::emit(s1), Directive::emit(s2)]);
}

/// Test state op wire format
#[test]
fn test_state_op_json() {
    let op: StateOp =
        serde_json::from_value(json!({"op": "set_path", "path": ["a", "b"], "value": 1})).unwrap();
    assert_eq!(op, StateOp::set_path(["a", "b"], 1));
}

// ============================================================================
// Directives
// ============================================================================

/// Test emit with explicit dispatch round-trips through JSON
#[test]
fn test_emit_wire_format() {
    let directive = Directive::emit_to(
        Signal::new("order.created", "/orders").with_data(json!({"id": 7})),
        vec![DispatchConfig::logger(), DispatchConfig::noop()],
    );
    let value = directive.to_value().unwrap();
    assert_eq!(value["kind"], json!("emit"));
    assert_eq!(value["signal"]["type"], json!("order.created"));

    let decoded = DirectiveRegistry::new().decode(&value).unwrap();
    assert_eq!(decoded, directive);
}

/// Test schedule and cron directives decode from JSON
#[test]
fn test_schedule_and_cron_decode() {
    let registry = DirectiveRegistry::new();

    let schedule = Directive::schedule(1500, ScheduleMessage::StrategyTick).unwrap();
    let decoded = registry.decode(&schedule.to_value().unwrap()).unwrap();
    assert_eq!(decoded, schedule);

    let cron = Directive::cron(
        "0 9 * * 1",
        ScheduleMessage::Value(json!({"report": "weekly"})),
        Some("weekly-report".to_string()),
        None,
    )
    .unwrap();
    let decoded = registry.decode(&cron.to_value().unwrap()).unwrap();
    assert_eq!(decoded, cron);

    let stop = Directive::stop(StopReason::Error("fatal".to_string()));
    assert_eq!(registry.decode(&stop.to_value().unwrap()).unwrap(), stop);
}

/// Ask a human to approve something
#[derive(Debug, Clone, PartialEq)]
struct ApprovalRequest {
    approver: String,
}

impl ExtensionDirective for ApprovalRequest {
    fn kind(&self) -> &str {
        "approval_request"
    }

    fn to_value(&self) -> Value {
        json!({"approver": self.approver})
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Test extension kinds decode through a registered decoder
#[test]
fn test_extension_directive_round_trip() {
    let mut registry = DirectiveRegistry::new();
    registry
        .register("approval_request", |value| {
            let approver = value
                .get("approver")
                .and_then(Value::as_str)
                .ok_or_else(|| AgentError::InvalidFormat("approver missing".to_string()))?;
            Ok(CustomDirective::new(ApprovalRequest {
                approver: approver.to_string(),
            }))
        })
        .unwrap();

    let directive = Directive::custom(ApprovalRequest {
        approver: "lead".to_string(),
    });
    let value = directive.to_value().unwrap();
    assert_eq!(value, json!({"kind": "approval_request", "approver": "lead"}));

    let decoded = registry.decode(&value).unwrap();
    assert_eq!(decoded.kind(), "approval_request");
    match decoded {
        Directive::Custom(custom) => {
            let request = custom.downcast_ref::<ApprovalRequest>().unwrap();
            assert_eq!(request.approver, "lead");
        }
        other => panic!("expected a custom directive, got {:?}", other),
    }

    assert!(registry.kinds().contains(&"approval_request".to_string()));
}

/// Test core kinds cannot be shadowed and unknown kinds are reported
#[test]
fn test_directive_registry_guards() {
    let mut registry = DirectiveRegistry::new();
    let err = registry
        .register("emit", |_| Err(AgentError::InvalidFormat("never".to_string())))
        .unwrap_err();
    assert!(matches!(err, AgentError::InvalidDirective { .. }));

    let err = registry.decode(&json!({"kind": "teleport"})).unwrap_err();
    assert_eq!(err, AgentError::UnknownDirective("teleport".to_string()));

    assert!(registry.decode(&json!({"signal": {}})).is_err());
}
