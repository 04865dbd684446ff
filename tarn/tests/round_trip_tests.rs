use pretty_assertions::assert_eq;
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;
use serde_json::json;
use tarn::{compile, to_tree, Runtime, Tree};

/// Printed outcome of running a program, comparable across runs.
fn outcome(runtime: &Runtime, tree: &Tree) -> String {
    match runtime.run(tree) {
        Ok(value) => value.to_string(),
        Err(error) => format!("error: {}", error),
    }
}

/// Compiles `tree` and prints the IR back into tree notation, going through
/// JSON text so the printed form is exactly what a front end would hand over.
fn reprint(tree: &Tree) -> Tree {
    let (root, _) = compile(tree, None).expect("program should compile");
    Tree::parse(&to_tree(&root).to_string()).expect("printed tree should parse")
}

fn assert_round_trip(program: serde_json::Value) {
    let runtime = Runtime::default();
    let tree = Tree::from_json(&program).unwrap();
    let printed = reprint(&tree);
    assert_eq!(outcome(&runtime, &printed), outcome(&runtime, &tree));
    assert_eq!(reprint(&printed), printed);
}

fn arb_program() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        (-100i32..100).prop_map(|n| json!(n)),
        any::<bool>().prop_map(|b| json!(b)),
        "[a-z]{0,4}".prop_map(|s| json!(["str", s])),
        Just(json!(null)),
        Just(json!("x")),
    ];

    let expr = leaf.prop_recursive(
        4,  // depth
        48, // max size
        4,  // items per collection
        |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(a, b)| json!(["add", a, b])),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| json!(["eq", a, b])),
                (inner.clone(), inner.clone(), inner.clone())
                    .prop_map(|(c, t, e)| json!(["if", c, t, e])),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| json!(["and", a, b])),
                prop::collection::vec(inner.clone(), 0..=3).prop_map(|items| {
                    let mut form = vec![json!("list")];
                    form.extend(items);
                    serde_json::Value::Array(form)
                }),
                (inner.clone(), inner.clone())
                    .prop_map(|(v, body)| json!(["let", ["params", ["x", v]], ["list", "x", body]])),
                (inner.clone(), inner.clone())
                    .prop_map(|(v, body)| json!([["fn", ["params", "x"], ["seq", body, "x"]], v])),
                inner.clone().prop_map(|v| json!(["loop", ["break", v]])),
                inner.clone().prop_map(|v| json!(["prop", ["object", ["f", v]], "f"])),
            ]
        },
    );
    // The outermost binding keeps every `x` resolvable
    expr.prop_map(|body| json!(["let", ["params", ["x", 0]], body]))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        // Do not write `.proptest-regressions` files into the repo.
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_printed_ir_evaluates_like_the_source(program in arb_program()) {
        let runtime = Runtime::default();
        let tree = Tree::from_json(&program).unwrap();
        let printed = reprint(&tree);
        prop_assert_eq!(outcome(&runtime, &printed), outcome(&runtime, &tree));
    }

    #[test]
    fn prop_printing_is_a_fixed_point(program in arb_program()) {
        let printed = reprint(&Tree::from_json(&program).unwrap());
        prop_assert_eq!(reprint(&printed), printed);
    }
}

#[test]
fn test_closures_round_trip() {
    assert_round_trip(json!([
        "let", ["params",
            ["n", 0],
            ["counter", ["fn", ["params"], ["set", "n", ["add", "n", 1]], "n"]]],
        ["list", ["counter"], ["counter"], "n"]
    ]));
}

#[test]
fn test_fexpr_round_trip() {
    assert_round_trip(json!([
        "let", ["params", ["unless", ["fexpr", ["params", "c", "body"], ["if", ["c"], null, ["body"]]]]],
        ["unless", false, ["str", "ran"]]
    ]));
}

#[test]
fn test_containers_and_references_round_trip() {
    assert_round_trip(json!([
        "let", ["params",
            ["o", ["object", ["x", 1]]],
            ["s", ["struct", ["y", ["str", "why"]]]],
            ["d", ["map", [["str", "k"], ["list", 1, 2]]]],
            ["r", ["ref", ["prop", "o", "x"]]]],
        ["set", ["deref", "r"], 3],
        ["list", ["prop", "o", "x"], ["prop", "s", "y"], ["index", ["index", "d", ["str", "k"]], 1],
            ["is_undefined", ["prop", "o", "missing"]], ["is_end", ["end"]]]
    ]));
}

#[test]
fn test_control_flow_round_trip() {
    assert_round_trip(json!([
        "let", ["params", ["i", 0]],
        ["loop",
            ["set", "i", ["add", "i", 1]],
            ["if", ["or", ["lt", "i", 3], false], ["continue"]],
            ["break", ["and", true, ["eq", "i", 3], true]]]
    ]));
}

#[test]
fn test_tasks_round_trip() {
    assert_round_trip(json!([
        "let", ["params", ["x", 2], ["d", ["launch", ["mul", "x", 21]]]],
        ["await", "d"]
    ]));
}

#[test]
fn test_locations_round_trip() {
    assert_round_trip(json!({
        "at": {"line": 1, "column": 1, "file": "main.tarn"},
        "tree": ["let", ["params", ["x", 1]], {"at": {"line": 2, "column": 3}, "tree": ["not", "x"]}]
    }));
}
