//! Tarn standard library
//!
//! Implementations behind the intrinsics table, the member surface of the
//! built-in containers, and the host natives of the prelude namespace:
//! - Arithmetic, bitwise and comparison intrinsics
//! - Control-flow intrinsics (`break`, `continue`, `return`, `seq`)
//! - Container properties and bound methods
//! - Prelude natives (`type_of`, `to_string`, `is_undefined`, `is_end`)

use crate::ir::intrinsics::Intrinsic;
use crate::runtime::error::{Exit, RuntimeErrorKind};
use crate::runtime::reference::PropertyKey;
use crate::runtime::values::{
    Arity, Concrete, ContainerMethod, IterSource, List, NativeFunction, Value, ValueIter,
};
use std::cmp::Ordering;
use std::rc::Rc;

pub fn check_arity(function: &str, arity: Arity, actual: usize) -> Result<(), RuntimeErrorKind> {
    if arity.accepts(actual) {
        Ok(())
    } else {
        Err(RuntimeErrorKind::ArityMismatch {
            function: function.to_string(),
            expected: arity.to_string(),
            actual,
        })
    }
}

/// Applies an intrinsic. Control-flow intrinsics answer with their exit.
pub fn apply_intrinsic(op: Intrinsic, args: &[Value]) -> Result<Value, Exit> {
    let name = op.name();
    check_arity(name, op.arity(), args.len())?;
    let value = match op {
        Intrinsic::Pos => Value::number(number(name, &args[0])?),
        Intrinsic::Neg => Value::number(-number(name, &args[0])?),
        Intrinsic::Not => Value::boolean(!args[0].truthiness(name)?),
        Intrinsic::BitNot => Value::number(!integer(name, &args[0])? as f64),
        Intrinsic::Add => add(&args[0], &args[1])?,
        Intrinsic::Sub => arithmetic(name, args, |a, b| a - b)?,
        Intrinsic::Mul => arithmetic(name, args, |a, b| a * b)?,
        Intrinsic::Div => arithmetic(name, args, |a, b| a / b)?,
        Intrinsic::Mod => arithmetic(name, args, |a, b| a % b)?,
        Intrinsic::Pow => arithmetic(name, args, f64::powf)?,
        Intrinsic::BitAnd => bitwise(name, args, |a, b| a & b)?,
        Intrinsic::BitOr => bitwise(name, args, |a, b| a | b)?,
        Intrinsic::BitXor => bitwise(name, args, |a, b| a ^ b)?,
        Intrinsic::Shl => shift(name, args, |a, s| a << s)?,
        Intrinsic::Shr => shift(name, args, |a, s| a >> s)?,
        Intrinsic::Eq => Value::boolean(args[0] == args[1]),
        Intrinsic::Ne => Value::boolean(args[0] != args[1]),
        Intrinsic::Lt => Value::boolean(compare(name, args)? == Some(Ordering::Less)),
        Intrinsic::Le => Value::boolean(matches!(
            compare(name, args)?,
            Some(Ordering::Less | Ordering::Equal)
        )),
        Intrinsic::Gt => Value::boolean(compare(name, args)? == Some(Ordering::Greater)),
        Intrinsic::Ge => Value::boolean(matches!(
            compare(name, args)?,
            Some(Ordering::Greater | Ordering::Equal)
        )),
        Intrinsic::Break => return Err(Exit::Break(payload(args))),
        Intrinsic::Continue => return Err(Exit::Continue),
        Intrinsic::Return => return Err(Exit::Return(payload(args))),
        Intrinsic::Seq => args.last().cloned().unwrap_or_else(Value::null),
    };
    Ok(value)
}

fn payload(args: &[Value]) -> Value {
    args.first().cloned().unwrap_or_else(Value::null)
}

fn number(operation: &str, value: &Value) -> Result<f64, RuntimeErrorKind> {
    value
        .as_number()
        .ok_or_else(|| RuntimeErrorKind::type_error(operation, "number", value))
}

/// Bitwise operands must be numbers with an exact 64-bit integer value.
fn integer(operation: &str, value: &Value) -> Result<i64, RuntimeErrorKind> {
    let n = number(operation, value)?;
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        Ok(n as i64)
    } else {
        Err(RuntimeErrorKind::TypeError {
            operation: operation.to_string(),
            expected: "integer".to_string(),
            actual: n.to_string(),
        })
    }
}

fn mismatched(operation: &str, expected: &str, a: &Value, b: &Value) -> RuntimeErrorKind {
    RuntimeErrorKind::TypeError {
        operation: operation.to_string(),
        expected: expected.to_string(),
        actual: format!("{} and {}", a.type_name(), b.type_name()),
    }
}

fn add(a: &Value, b: &Value) -> Result<Value, RuntimeErrorKind> {
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return Ok(Value::number(x + y));
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return Ok(Value::string(format!("{}{}", x, y)));
    }
    Err(mismatched("add", "two numbers or two strings", a, b))
}

fn arithmetic(
    operation: &str,
    args: &[Value],
    op: impl Fn(f64, f64) -> f64,
) -> Result<Value, RuntimeErrorKind> {
    Ok(Value::number(op(
        number(operation, &args[0])?,
        number(operation, &args[1])?,
    )))
}

fn bitwise(
    operation: &str,
    args: &[Value],
    op: impl Fn(i64, i64) -> i64,
) -> Result<Value, RuntimeErrorKind> {
    Ok(Value::number(
        op(integer(operation, &args[0])?, integer(operation, &args[1])?) as f64,
    ))
}

fn shift(
    operation: &str,
    args: &[Value],
    op: impl Fn(i64, u32) -> i64,
) -> Result<Value, RuntimeErrorKind> {
    let value = integer(operation, &args[0])?;
    let amount = integer(operation, &args[1])?;
    if !(0..=63).contains(&amount) {
        return Err(RuntimeErrorKind::TypeError {
            operation: operation.to_string(),
            expected: "shift amount in 0..=63".to_string(),
            actual: amount.to_string(),
        });
    }
    Ok(Value::number(op(value, amount as u32) as f64))
}

/// Orders two numbers or two strings. `None` when a number is NaN.
fn compare(operation: &str, args: &[Value]) -> Result<Option<Ordering>, RuntimeErrorKind> {
    let (a, b) = (&args[0], &args[1]);
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return Ok(x.partial_cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return Ok(Some(x.cmp(y)));
    }
    Err(mismatched(operation, "two numbers or two strings", a, b))
}

fn bound(receiver: &Value, method: ContainerMethod) -> Value {
    Value::Native(Rc::new(NativeFunction::Method {
        receiver: receiver.clone(),
        method,
    }))
}

fn list_method(name: &str) -> Option<ContainerMethod> {
    match name {
        "push" => Some(ContainerMethod::Push),
        "pop" => Some(ContainerMethod::Pop),
        other => table_method(other),
    }
}

/// Methods shared by dictionaries and objects.
fn table_method(name: &str) -> Option<ContainerMethod> {
    match name {
        "get" => Some(ContainerMethod::Get),
        "set" => Some(ContainerMethod::Set),
        "has" => Some(ContainerMethod::Has),
        "delete" => Some(ContainerMethod::Delete),
        "iter" => Some(ContainerMethod::Iter),
        _ => None,
    }
}

fn not_a_container(target: &Value, key: &PropertyKey) -> RuntimeErrorKind {
    RuntimeErrorKind::NotAContainer {
        type_name: target.type_name().to_string(),
        property: key.to_string(),
    }
}

fn field_name(key: &PropertyKey) -> Result<String, RuntimeErrorKind> {
    match key {
        PropertyKey::Name(name) => Ok(name.clone()),
        PropertyKey::Index(key) => key
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RuntimeErrorKind::type_error("index", "string", key)),
    }
}

/// Position designated by `key` in a list of `length` elements.
fn list_index(key: &Value, length: usize) -> Result<usize, RuntimeErrorKind> {
    let n = key
        .as_number()
        .ok_or_else(|| RuntimeErrorKind::type_error("index", "number", key))?;
    if n.fract() == 0.0 && n >= 0.0 && n < length as f64 {
        Ok(n as usize)
    } else {
        Err(RuntimeErrorKind::IndexOutOfRange { index: n, length })
    }
}

fn list_member(receiver: &Value, list: &List, name: &str) -> Value {
    match name {
        "length" => Value::number(list.len() as f64),
        _ => list_method(name)
            .map(|method| bound(receiver, method))
            .unwrap_or_else(Value::undefined),
    }
}

/// Reads a member. Names a container does not define read as `undefined`.
pub fn get_property(target: &Value, key: &PropertyKey) -> Result<Value, RuntimeErrorKind> {
    match target {
        Value::Object(object) => {
            let name = field_name(key)?;
            Ok(object
                .field(&name)
                .or_else(|| table_method(&name).map(|method| bound(target, method)))
                .unwrap_or_else(Value::undefined))
        }
        Value::List(list) => match key {
            PropertyKey::Name(name) => Ok(list_member(target, list, name)),
            PropertyKey::Index(index) => match index.as_str() {
                Some(name) => Ok(list_member(target, list, name)),
                None => {
                    let position = list_index(index, list.len())?;
                    Ok(list.get(position).unwrap_or_else(Value::undefined))
                }
            },
        },
        Value::Dict(dict) => match key {
            PropertyKey::Name(name) => Ok(match name.as_str() {
                "size" | "length" => Value::number(dict.len() as f64),
                _ => table_method(name)
                    .map(|method| bound(target, method))
                    .unwrap_or_else(Value::undefined),
            }),
            PropertyKey::Index(index) => Ok(dict.get(index).unwrap_or_else(Value::undefined)),
        },
        Value::Iterator(_) => match key {
            PropertyKey::Name(name) if name == "next" => Ok(bound(target, ContainerMethod::Next)),
            PropertyKey::Name(_) => Ok(Value::undefined()),
            PropertyKey::Index(_) => Err(not_a_container(target, key)),
        },
        _ => Err(not_a_container(target, key)),
    }
}

/// Reads only stored data (fields, elements, entries), never methods.
/// Used as the "current value" when assigning through a property.
pub fn stored_property(target: &Value, key: &PropertyKey) -> Result<Value, RuntimeErrorKind> {
    match target {
        Value::Object(object) => Ok(object
            .field(&field_name(key)?)
            .unwrap_or_else(Value::undefined)),
        Value::List(list) => match key {
            PropertyKey::Index(index) if index.as_number().is_some() => {
                let position = list_index(index, list.len())?;
                Ok(list.get(position).unwrap_or_else(Value::undefined))
            }
            _ => Ok(Value::undefined()),
        },
        Value::Dict(dict) => match key {
            PropertyKey::Index(index) => Ok(dict.get(index).unwrap_or_else(Value::undefined)),
            PropertyKey::Name(_) => Ok(Value::undefined()),
        },
        _ => Err(not_a_container(target, key)),
    }
}

/// Writes a member. List elements and dictionary entries are written by
/// computed key; their named members are read-only.
pub fn set_property(target: &Value, key: &PropertyKey, value: Value) -> Result<(), RuntimeErrorKind> {
    let read_only = |name: &str| RuntimeErrorKind::ReadOnlyProperty {
        type_name: target.type_name().to_string(),
        property: name.to_string(),
    };
    match target {
        Value::Object(object) => object.set_field(&field_name(key)?, value),
        Value::List(list) => match key {
            PropertyKey::Name(name) => Err(read_only(name)),
            PropertyKey::Index(index) => match index.as_str() {
                Some(name) => Err(read_only(name)),
                None => {
                    let mut items = list.items.borrow_mut();
                    let position = list_index(index, items.len())?;
                    items[position] = value;
                    Ok(())
                }
            },
        },
        Value::Dict(dict) => match key {
            PropertyKey::Name(name) => Err(read_only(name)),
            PropertyKey::Index(index) => {
                dict.set(index.clone(), value);
                Ok(())
            }
        },
        _ => Err(not_a_container(target, key)),
    }
}

fn string_arg(method: ContainerMethod, value: &Value) -> Result<String, RuntimeErrorKind> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| RuntimeErrorKind::type_error(method.name(), "string", value))
}

fn iterator(source: IterSource) -> Value {
    Value::Iterator(Rc::new(ValueIter::new(source)))
}

/// Invokes a bound container method. Arity has already been checked.
pub fn call_method(
    receiver: &Value,
    method: ContainerMethod,
    args: &[Value],
) -> Result<Value, RuntimeErrorKind> {
    use ContainerMethod::*;
    match (receiver, method) {
        (Value::List(list), Get) => {
            let position = list_index(&args[0], list.len())?;
            Ok(list.get(position).unwrap_or_else(Value::undefined))
        }
        (Value::List(list), Set) => {
            let mut items = list.items.borrow_mut();
            let position = list_index(&args[0], items.len())?;
            items[position] = args[1].clone();
            Ok(args[1].clone())
        }
        (Value::List(list), Push) => {
            list.push(args[0].clone());
            Ok(Value::null())
        }
        (Value::List(list), Pop) => Ok(list.pop().unwrap_or_else(Value::undefined)),
        (Value::List(list), Has) => Ok(Value::boolean(list_index(&args[0], list.len()).is_ok())),
        (Value::List(list), Delete) => {
            let mut items = list.items.borrow_mut();
            let position = list_index(&args[0], items.len())?;
            Ok(items.remove(position))
        }
        (Value::List(list), Iter) => Ok(iterator(IterSource::List(list.clone()))),

        (Value::Dict(dict), Get) => Ok(dict.get(&args[0]).unwrap_or_else(Value::undefined)),
        (Value::Dict(dict), Set) => {
            dict.set(args[0].clone(), args[1].clone());
            Ok(args[1].clone())
        }
        (Value::Dict(dict), Has) => Ok(Value::boolean(dict.has(&args[0]))),
        (Value::Dict(dict), Delete) => Ok(dict.delete(&args[0]).unwrap_or_else(Value::undefined)),
        (Value::Dict(dict), Iter) => Ok(iterator(IterSource::Keys(dict.keys()))),

        (Value::Object(object), Get) => Ok(object
            .field(&string_arg(method, &args[0])?)
            .unwrap_or_else(Value::undefined)),
        (Value::Object(object), Set) => {
            object.set_field(&string_arg(method, &args[0])?, args[1].clone())?;
            Ok(args[1].clone())
        }
        (Value::Object(object), Has) => Ok(Value::boolean(
            object.has(&string_arg(method, &args[0])?),
        )),
        (Value::Object(object), Delete) => Ok(object
            .delete(&string_arg(method, &args[0])?)?
            .unwrap_or_else(Value::undefined)),
        (Value::Object(object), Iter) => Ok(iterator(IterSource::Keys(object.keys()))),

        (Value::Iterator(iter), Next) => Ok(iter.next_value()),

        (other, method) => Err(RuntimeErrorKind::NotAContainer {
            type_name: other.type_name().to_string(),
            property: method.name().to_string(),
        }),
    }
}

/// Text of a value; strings are not quoted.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::Concrete(concrete) => match concrete.as_ref() {
            Concrete::String(s) => s.clone(),
            _ => value.to_string(),
        },
        _ => value.to_string(),
    }
}

/// Host natives bound in the prelude namespace.
pub fn prelude() -> Vec<Value> {
    vec![
        Value::host_function("type_of", Arity::Fixed(1), |args| {
            Ok(Value::string(args[0].type_name()))
        }),
        Value::host_function("to_string", Arity::Fixed(1), |args| {
            Ok(Value::string(display_string(&args[0])))
        }),
        Value::host_function("is_undefined", Arity::Fixed(1), |args| {
            Ok(Value::boolean(args[0].is_undefined()))
        }),
        Value::host_function("is_end", Arity::Fixed(1), |args| {
            Ok(Value::boolean(args[0].is_end()))
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn apply(op: Intrinsic, args: &[Value]) -> Value {
        match apply_intrinsic(op, args) {
            Ok(value) => value,
            Err(exit) => panic!("{} failed: {:?}", op.name(), exit),
        }
    }

    #[test]
    fn test_arithmetic() {
        let n = Value::number;
        assert_eq!(apply(Intrinsic::Add, &[n(2.0), n(3.0)]), n(5.0));
        assert_eq!(apply(Intrinsic::Sub, &[n(2.0), n(3.0)]), n(-1.0));
        assert_eq!(apply(Intrinsic::Div, &[n(1.0), n(0.0)]), n(f64::INFINITY));
        assert_eq!(apply(Intrinsic::Mod, &[n(7.0), n(3.0)]), n(1.0));
        assert_eq!(apply(Intrinsic::Pow, &[n(2.0), n(10.0)]), n(1024.0));
        assert_eq!(apply(Intrinsic::Neg, &[n(4.0)]), n(-4.0));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(
            apply(Intrinsic::Add, &[Value::string("ta"), Value::string("rn")]),
            Value::string("tarn")
        );
        assert!(apply_intrinsic(Intrinsic::Add, &[Value::string("a"), Value::number(1.0)]).is_err());
    }

    #[test]
    fn test_bitwise_requires_integers() {
        let n = Value::number;
        assert_eq!(apply(Intrinsic::BitAnd, &[n(6.0), n(3.0)]), n(2.0));
        assert_eq!(apply(Intrinsic::Shl, &[n(1.0), n(4.0)]), n(16.0));
        assert_eq!(apply(Intrinsic::BitNot, &[n(0.0)]), n(-1.0));
        assert!(apply_intrinsic(Intrinsic::BitOr, &[n(1.5), n(1.0)]).is_err());
        assert!(apply_intrinsic(Intrinsic::Shr, &[n(1.0), n(64.0)]).is_err());
    }

    #[test]
    fn test_comparisons() {
        let n = Value::number;
        assert_eq!(apply(Intrinsic::Lt, &[n(1.0), n(2.0)]), Value::boolean(true));
        assert_eq!(apply(Intrinsic::Ge, &[n(1.0), n(2.0)]), Value::boolean(false));
        assert_eq!(
            apply(Intrinsic::Le, &[Value::string("a"), Value::string("b")]),
            Value::boolean(true)
        );
        assert_eq!(apply(Intrinsic::Lt, &[n(f64::NAN), n(1.0)]), Value::boolean(false));
        assert_eq!(apply(Intrinsic::Eq, &[n(1.0), n(1.0)]), Value::boolean(true));
    }

    #[test]
    fn test_not_requires_boolean() {
        assert_eq!(
            apply(Intrinsic::Not, &[Value::boolean(false)]),
            Value::boolean(true)
        );
        assert!(apply_intrinsic(Intrinsic::Not, &[Value::null()]).is_err());
    }

    #[test]
    fn test_control_intrinsics_exit() {
        assert!(matches!(
            apply_intrinsic(Intrinsic::Break, &[Value::number(5.0)]),
            Err(Exit::Break(v)) if v == Value::number(5.0)
        ));
        assert!(matches!(
            apply_intrinsic(Intrinsic::Return, &[]),
            Err(Exit::Return(v)) if v.is_null()
        ));
        assert_eq!(
            apply(Intrinsic::Seq, &[Value::number(1.0), Value::number(2.0)]),
            Value::number(2.0)
        );
    }

    #[test]
    fn test_arity_is_checked() {
        assert!(matches!(
            apply_intrinsic(Intrinsic::Add, &[Value::number(1.0)]),
            Err(Exit::Error(e)) if matches!(e.kind, RuntimeErrorKind::ArityMismatch { .. })
        ));
    }

    #[test]
    fn test_list_surface() {
        let list = Value::list(vec![Value::number(10.0), Value::number(20.0)]);
        let length = get_property(&list, &PropertyKey::Name("length".into())).unwrap();
        assert_eq!(length, Value::number(2.0));
        assert_eq!(
            get_property(&list, &PropertyKey::Index(Value::number(1.0))).unwrap(),
            Value::number(20.0)
        );
        assert!(matches!(
            get_property(&list, &PropertyKey::Index(Value::number(2.0))),
            Err(RuntimeErrorKind::IndexOutOfRange { length: 2, .. })
        ));
        assert!(get_property(&list, &PropertyKey::Name("missing".into()))
            .unwrap()
            .is_undefined());
        assert!(matches!(
            set_property(&list, &PropertyKey::Name("length".into()), Value::number(0.0)),
            Err(RuntimeErrorKind::ReadOnlyProperty { .. })
        ));
    }

    #[test]
    fn test_dict_methods() {
        let dict = Value::dict(Vec::new());
        let key = Value::string("k");
        call_method(&dict, ContainerMethod::Set, &[key.clone(), Value::number(1.0)]).unwrap();
        assert_eq!(
            call_method(&dict, ContainerMethod::Get, &[key.clone()]).unwrap(),
            Value::number(1.0)
        );
        assert_eq!(
            call_method(&dict, ContainerMethod::Has, &[key.clone()]).unwrap(),
            Value::boolean(true)
        );
        call_method(&dict, ContainerMethod::Delete, &[key.clone()]).unwrap();
        assert_eq!(
            call_method(&dict, ContainerMethod::Has, &[key]).unwrap(),
            Value::boolean(false)
        );
    }

    #[test]
    fn test_scalars_are_not_containers() {
        assert!(matches!(
            get_property(&Value::number(1.0), &PropertyKey::Name("x".into())),
            Err(RuntimeErrorKind::NotAContainer { .. })
        ));
    }

    #[test]
    fn test_display_string_is_unquoted() {
        assert_eq!(display_string(&Value::string("hi")), "hi");
        assert_eq!(display_string(&Value::number(2.5)), "2.5");
    }
}
