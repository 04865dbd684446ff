// IR to tree printer
//
// Produces the tagged-tree notation the converter reads, so printing a
// compiled program and converting it again yields equivalent IR. Natives and
// closures embedded as literal values print by name only.

use crate::ir::core::{FunctionDef, IrKind, IrLetBinding, IrNode};
use crate::runtime::native_stack::ensure_sufficient_stack;
use crate::runtime::values::{Concrete, List, Sentinel, Value};
use crate::tree::Tree;
use std::rc::Rc;

pub fn to_tree(node: &IrNode) -> Tree {
    let tree = kind_to_tree(&node.kind);
    match &node.location {
        Some(location) => Tree::Located(location.clone(), Box::new(tree)),
        None => tree,
    }
}

fn all(nodes: &[Rc<IrNode>]) -> impl Iterator<Item = Tree> + '_ {
    nodes.iter().map(|node| to_tree(node))
}

fn params(names: impl IntoIterator<Item = Tree>) -> Tree {
    Tree::form("params", names)
}

fn function(form: &str, def: &FunctionDef) -> Tree {
    Tree::form(
        form,
        [
            params(def.params.iter().map(Tree::symbol)),
            to_tree(&def.body),
        ],
    )
}

fn binding(binding: &IrLetBinding) -> Tree {
    match &binding.init {
        Some(init) => Tree::Node(vec![Tree::symbol(&binding.name), to_tree(init)]),
        None => Tree::symbol(&binding.name),
    }
}

fn optional(form: &str, payload: &Option<Rc<IrNode>>) -> Tree {
    Tree::form(form, payload.iter().map(|node| to_tree(node)))
}

fn kind_to_tree(kind: &IrKind) -> Tree {
    match kind {
        IrKind::Literal(value) => value_to_tree(value),
        IrKind::Intrinsic(op) => Tree::symbol(op.name()),
        IrKind::Sequence(items) => Tree::form("seq", all(items)),
        IrKind::Let { bindings, body } => Tree::form(
            "let",
            [params(bindings.iter().map(binding)), to_tree(body)],
        ),
        IrKind::Get(variable) => Tree::symbol(variable.name()),
        IrKind::Set { target, value } => Tree::form("set", [to_tree(target), to_tree(value)]),
        IrKind::Call { callee, arguments } => {
            Tree::form("call", std::iter::once(to_tree(callee)).chain(all(arguments)))
        }
        IrKind::Function(def) => function(if def.lazy { "fexpr" } else { "fn" }, def),
        IrKind::List(items) => Tree::form("list", all(items)),
        IrKind::Dict(entries) => Tree::form(
            "map",
            entries
                .iter()
                .map(|(key, value)| Tree::Node(vec![to_tree(key), to_tree(value)])),
        ),
        IrKind::Object { fields, sealed } => Tree::form(
            if *sealed { "struct" } else { "object" },
            fields
                .iter()
                .map(|(name, value)| Tree::Node(vec![Tree::symbol(name), to_tree(value)])),
        ),
        IrKind::Property { target, name } => {
            Tree::form("prop", [to_tree(target), Tree::symbol(name)])
        }
        IrKind::Index { target, key } => Tree::form("index", [to_tree(target), to_tree(key)]),
        IrKind::If {
            condition,
            then_branch,
            else_branch,
        } => Tree::form(
            "if",
            [to_tree(condition), to_tree(then_branch)]
                .into_iter()
                .chain(else_branch.iter().map(|node| to_tree(node))),
        ),
        IrKind::And(lhs, rhs) => Tree::form("and", [to_tree(lhs), to_tree(rhs)]),
        IrKind::Or(lhs, rhs) => Tree::form("or", [to_tree(lhs), to_tree(rhs)]),
        IrKind::Loop(body) => Tree::form("loop", [to_tree(body)]),
        IrKind::Break(payload) => optional("break", payload),
        IrKind::Continue => Tree::form("continue", []),
        IrKind::Return(payload) => optional("return", payload),
        IrKind::Launch(def) => Tree::form("launch", [to_tree(&def.body)]),
        IrKind::Await(inner) => Tree::form("await", [to_tree(inner)]),
        IrKind::Ref(target) => Tree::form("ref", [to_tree(target)]),
        IrKind::Deref(inner) => Tree::form("deref", [to_tree(inner)]),
    }
}

/// Tree form of a value. Only scalars and sentinels have a literal spelling;
/// lists print as list literals and callables by name. A list nested inside
/// itself prints by type name at the point of recursion.
pub fn value_to_tree(value: &Value) -> Tree {
    literal_tree(value, &mut Vec::new())
}

fn literal_tree(value: &Value, open: &mut Vec<*const List>) -> Tree {
    match value {
        Value::Concrete(concrete) => match concrete.as_ref() {
            Concrete::Null => Tree::Null,
            Concrete::Boolean(b) => Tree::Boolean(*b),
            Concrete::Number(n) => Tree::Number(*n),
            Concrete::String(s) => Tree::form("str", [Tree::symbol(s)]),
        },
        Value::Sentinel(Sentinel::Undefined) => Tree::form("undefined", []),
        Value::Sentinel(Sentinel::End) => Tree::form("end", []),
        Value::List(list) if !open.contains(&Rc::as_ptr(list)) => {
            open.push(Rc::as_ptr(list));
            let items = ensure_sufficient_stack(|| {
                list.items
                    .borrow()
                    .iter()
                    .map(|item| literal_tree(item, open))
                    .collect::<Vec<_>>()
            });
            open.pop();
            Tree::form("list", items)
        }
        Value::Closure(closure) => Tree::symbol(closure.name()),
        Value::Native(native) => Tree::symbol(native.name()),
        other => Tree::symbol(other.type_name()),
    }
}
