use pretty_assertions::assert_eq;
use serde_json::json;
use tarn::{CompileError, Namespace, Runtime, RuntimeConfig, SourceLocation, TarnError, Tree, Value};

fn compile_error(program: serde_json::Value) -> CompileError {
    let tree = Tree::from_json(&program).expect("test program should be valid tree notation");
    match Runtime::default().run(&tree) {
        Err(TarnError::Compile(error)) => error,
        other => panic!("expected a compile error, got {:?}", other),
    }
}

#[test]
fn test_unresolved_names_are_reported_together() {
    assert_eq!(
        compile_error(json!(["list", "alpha", ["fn", ["params"], "beta"], "alpha", "gamma"])),
        CompileError::Unresolved {
            names: vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()]
        }
    );
}

#[test]
fn test_names_do_not_resolve_ahead_of_their_binding() {
    assert_eq!(
        compile_error(json!(["seq", "later", ["let", ["params", ["later", 1]], "later"]])),
        CompileError::Unresolved {
            names: vec!["later".to_string()]
        }
    );
}

#[test]
fn test_bindings_do_not_leak_out_of_their_scope() {
    assert_eq!(
        compile_error(json!(["seq", [["fn", ["params", "p"], "p"], 1], "p"])),
        CompileError::Unresolved {
            names: vec!["p".to_string()]
        }
    );
}

#[test]
fn test_globals_link_against_the_namespace() {
    let mut namespace = Namespace::prelude();
    namespace.define("answer", Value::number(42.0));
    let runtime = Runtime::with_namespace(RuntimeConfig::default(), namespace);
    let tree = Tree::from_json(&json!([["fn", ["params"], ["set", "answer", ["add", "answer", 1]]]])).unwrap();
    assert_eq!(runtime.run(&tree).unwrap(), Value::number(43.0));
    assert_eq!(runtime.namespace().get("answer"), Some(Value::number(43.0)));
}

#[test]
fn test_duplicate_names() {
    assert!(matches!(
        compile_error(json!(["let", ["params", "a", ["a", 1]], null])),
        CompileError::DuplicateParameter { ref name, .. } if name == "a"
    ));
    assert!(matches!(
        compile_error(json!(["struct", ["f", 1], ["f", 2]])),
        CompileError::DuplicateParameter { ref form, .. } if form == "struct"
    ));
}

#[test]
fn test_reserved_names() {
    assert!(matches!(
        compile_error(json!(["fn", ["params", "mul"], null])),
        CompileError::ReservedName { ref name, .. } if name == "mul"
    ));
}

#[test]
fn test_exits_outside_their_construct() {
    assert!(matches!(
        compile_error(json!(["continue"])),
        CompileError::StrayExit { exit: "continue", .. }
    ));
    assert!(matches!(
        compile_error(json!(["launch", ["break", 1]])),
        CompileError::StrayExit { exit: "break", .. }
    ));
    assert!(matches!(
        compile_error(json!(["loop", ["launch", ["break"]]])),
        CompileError::StrayExit { exit: "break", .. }
    ));
}

#[test]
fn test_malformed_forms() {
    for program in [
        json!([]),
        json!(["let", "x"]),
        json!(["let"]),
        json!(["fn", ["x"], null]),
        json!(["str", 1]),
        json!(["set", 1, 2]),
        json!(["prop", "o", 1]),
        json!(["map", [1]]),
        json!(["object", [1, 2]]),
        json!(["await"]),
        json!(["break", 1, 2]),
    ] {
        let program = json!(["let", ["params", ["o", null]], ["loop", program]]);
        assert!(
            matches!(compile_error(program.clone()), CompileError::MalformedForm { .. }),
            "{} should be malformed",
            program
        );
    }
}

#[test]
fn test_compile_errors_carry_location() {
    let error = compile_error(json!({
        "at": {"line": 7, "column": 3, "file": "main.tarn"},
        "tree": ["break"]
    }));
    assert_eq!(
        error,
        CompileError::StrayExit {
            exit: "break",
            location: Some(SourceLocation::new(7, 3).in_file("main.tarn")),
        }
    );
    assert_eq!(error.to_string(), "`break` outside of a loop at main.tarn:7:3");
}

#[test]
fn test_invalid_tree_text() {
    let runtime = Runtime::default();
    assert!(matches!(runtime.run_json("[\"add\", 1"), Err(TarnError::Tree(_))));
    assert!(matches!(runtime.run_json("{\"x\": 1}"), Err(TarnError::Tree(_))));
    assert_eq!(runtime.run_json("[\"add\", 1, 2]").unwrap(), Value::number(3.0));
}
