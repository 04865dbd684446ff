use pretty_assertions::assert_eq;
use serde_json::json;
use tarn::runtime::RuntimeErrorKind;
use tarn::{Runtime, TarnError, Tree, Value};

fn run(program: serde_json::Value) -> Result<Value, TarnError> {
    let tree = Tree::from_json(&program).expect("test program should be valid tree notation");
    Runtime::default().run(&tree)
}

fn eval(program: serde_json::Value) -> Value {
    run(program).expect("program should evaluate")
}

fn runtime_error(program: serde_json::Value) -> RuntimeErrorKind {
    match run(program) {
        Err(TarnError::Runtime(error)) => error.kind,
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

#[test]
fn test_break_carries_the_loop_value() {
    assert_eq!(eval(json!(["loop", ["break", 5]])), Value::number(5.0));
    assert!(eval(json!(["loop", ["break"]])).is_null());
}

#[test]
fn test_continue_skips_the_rest_of_the_body() {
    let result = eval(json!([
        "let", ["params", ["i", 0], ["odd", 0]],
        ["loop",
            ["set", "i", ["add", "i", 1]],
            ["if", ["gt", "i", 10], ["break", "odd"]],
            ["if", ["eq", ["mod", "i", 2], 0], ["continue"]],
            ["set", "odd", ["add", "odd", 1]]]
    ]));
    assert_eq!(result, Value::number(5.0));
}

#[test]
fn test_break_pops_frames_entered_inside_the_loop() {
    let result = eval(json!([
        "let", ["params", ["x", 1]],
        ["loop", ["let", ["params", ["y", 2]], ["break", "y"]]],
        "x"
    ]));
    assert_eq!(result, Value::number(1.0));
}

#[test]
fn test_nested_loops_break_innermost() {
    let result = eval(json!([
        "let", ["params", ["outer", 0]],
        ["loop",
            ["set", "outer", ["add", "outer", 1]],
            ["loop", ["break"]],
            ["if", ["eq", "outer", 3], ["break", "outer"]]]
    ]));
    assert_eq!(result, Value::number(3.0));
}

#[test]
fn test_exit_intrinsics_as_calls() {
    assert_eq!(eval(json!(["loop", ["call", "break", 7]])), Value::number(7.0));
    assert_eq!(
        eval(json!([["fn", ["params"], ["call", "return", 8], 9]])),
        Value::number(8.0)
    );
    assert_eq!(eval(json!(["call", "seq", 1, 2, 3])), Value::number(3.0));
}

#[test]
fn test_exits_cannot_cross_a_call_boundary() {
    assert_eq!(
        runtime_error(json!(["loop", [["fn", ["params"], ["call", "break", 1]]]])),
        RuntimeErrorKind::StrayExit("break")
    );
    assert_eq!(
        runtime_error(json!(["call", "continue"])),
        RuntimeErrorKind::StrayExit("continue")
    );
    assert_eq!(
        runtime_error(json!(["call", "return", 1])),
        RuntimeErrorKind::StrayExit("return")
    );
}

#[test]
fn test_seq_evaluates_in_order() {
    let result = eval(json!([
        "let", ["params", ["log", ["list"]]],
        ["let", ["params", ["r", ["seq",
                ["call", ["prop", "log", "push"], ["str", "a"]],
                ["call", ["prop", "log", "push"], ["str", "b"]],
                ["str", "c"]]]],
            ["list", "r", ["index", "log", 0], ["index", "log", 1]]]
    ]));
    assert_eq!(result.to_string(), "[\"c\", \"a\", \"b\"]");
    assert!(eval(json!(["seq"])).is_null());
}

#[test]
fn test_if_requires_a_boolean() {
    assert_eq!(eval(json!(["if", true, 1, 2])), Value::number(1.0));
    assert!(eval(json!(["if", false, 1])).is_null());
    assert_eq!(
        runtime_error(json!(["if", 1, 2, 3])),
        RuntimeErrorKind::TypeError {
            operation: "if".to_string(),
            expected: "boolean".to_string(),
            actual: "number".to_string(),
        }
    );
}

#[test]
fn test_logical_forms_short_circuit() {
    assert_eq!(eval(json!(["and", true, false])), Value::boolean(false));
    assert_eq!(eval(json!(["or", false, true])), Value::boolean(true));
    assert_eq!(eval(json!(["and", false, ["prop", 1, "x"]])), Value::boolean(false));
    assert_eq!(eval(json!(["or", true, ["prop", 1, "x"]])), Value::boolean(true));
    assert_eq!(eval(json!(["and", true, true, true])), Value::boolean(true));
    assert_eq!(eval(json!(["or", false])), Value::boolean(false));
    assert_eq!(eval(json!(["and", true])), Value::boolean(true));
}

#[test]
fn test_logical_operands_must_be_booleans() {
    assert!(matches!(
        runtime_error(json!(["and", true, 1])),
        RuntimeErrorKind::TypeError { .. }
    ));
    assert!(matches!(
        runtime_error(json!(["or", null, true])),
        RuntimeErrorKind::TypeError { .. }
    ));
}

#[test]
fn test_assignment_is_type_stable() {
    assert_eq!(
        runtime_error(json!(["let", ["params", ["s", ["str", "a"]]], ["set", "s", 1]])),
        RuntimeErrorKind::TypeUnstableAssignment {
            current: "string".to_string(),
            assigned: "number".to_string(),
        }
    );
    assert!(matches!(
        runtime_error(json!([
            "let", ["params", ["o", ["object", ["x", ["str", "a"]]]]],
            ["set", ["prop", "o", "x"], 1]
        ])),
        RuntimeErrorKind::TypeUnstableAssignment { .. }
    ));
}

#[test]
fn test_first_assignment_picks_the_type() {
    assert_eq!(
        eval(json!(["let", ["params", "s"], ["set", "s", 1], ["set", "s", 2], "s"])),
        Value::number(2.0)
    );
    assert_eq!(
        eval(json!(["let", ["params", ["s", null]], ["set", "s", ["str", "now"]], "s"])),
        Value::string("now")
    );
    assert_eq!(
        runtime_error(json!(["let", ["params", "s"], ["set", "s", 1], ["set", "s", true]])),
        RuntimeErrorKind::TypeUnstableAssignment {
            current: "number".to_string(),
            assigned: "boolean".to_string(),
        }
    );
}

#[test]
fn test_set_yields_the_assigned_value() {
    assert_eq!(
        eval(json!(["let", ["params", "x"], ["set", "x", 4]])),
        Value::number(4.0)
    );
}

#[test]
fn test_reading_before_initialization() {
    assert_eq!(
        runtime_error(json!(["let", ["params", "x"], "x"])),
        RuntimeErrorKind::UninitializedVariable("x".to_string())
    );
    assert_eq!(
        runtime_error(json!(["let", ["params", ["a", "b"], ["b", 1]], "a"])),
        RuntimeErrorKind::UninitializedVariable("b".to_string())
    );
}

#[test]
fn test_references_alias_their_target() {
    let result = eval(json!([
        "let", ["params", ["x", 1], ["r", ["ref", "x"]]],
        ["set", ["deref", "r"], 5],
        ["list", "x", ["deref", "r"]]
    ]));
    assert_eq!(result.to_string(), "[5, 5]");
}

#[test]
fn test_references_outlive_their_frame() {
    let result = eval(json!([
        "let", ["params", ["r", ["let", ["params", ["y", 3]], ["ref", "y"]]]],
        ["deref", "r"]
    ]));
    assert_eq!(result, Value::number(3.0));
}

#[test]
fn test_property_references() {
    let result = eval(json!([
        "let", ["params", ["o", ["object", ["x", 1]]], ["r", ["ref", ["prop", "o", "x"]]]],
        ["set", ["deref", "r"], 9],
        ["prop", "o", "x"]
    ]));
    assert_eq!(result, Value::number(9.0));
    assert!(matches!(
        runtime_error(json!(["deref", 1])),
        RuntimeErrorKind::TypeError { .. }
    ));
}
