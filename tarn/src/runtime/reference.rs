// References: the indirection cells behind variables, captures and properties

use crate::runtime::environment::RuntimeStack;
use crate::runtime::error::RuntimeErrorKind;
use crate::runtime::stdlib;
use crate::runtime::values::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A heap cell owning one value.
///
/// Frame locals, `let` bindings and globals all live in cells; a closure
/// captures the cell itself, so every alias observes every mutation.
#[derive(Clone)]
pub struct ValueCell(Rc<RefCell<Value>>);

impl ValueCell {
    pub fn new(value: Value) -> Self {
        ValueCell(Rc::new(RefCell::new(value)))
    }

    pub fn uninitialized() -> Self {
        ValueCell::new(Value::uninitialized())
    }

    pub fn get(&self) -> Value {
        self.0.borrow().clone()
    }

    /// Stores `value` without the type-stability check and returns the old value.
    pub fn replace(&self, value: Value) -> Value {
        self.0.replace(value)
    }

    /// Stores `value` if the type-stability rule allows it.
    pub fn assign(&self, value: Value) -> Result<(), RuntimeErrorKind> {
        check_stable(&self.get(), &value)?;
        self.replace(value);
        Ok(())
    }

    pub fn ptr_eq(&self, other: &ValueCell) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ValueCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(value) => write!(f, "ValueCell({:?})", *value),
            Err(_) => write!(f, "ValueCell(<borrowed>)"),
        }
    }
}

/// Key of a property reference.
#[derive(Debug, Clone)]
pub enum PropertyKey {
    /// A static member name: `["prop", target, name]`.
    Name(String),
    /// A computed key: `["index", target, key]`.
    Index(Value),
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::Name(name) => write!(f, "{}", name),
            PropertyKey::Index(key) => write!(f, "[{}]", key),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Reference {
    /// Owns its value directly.
    Cell(ValueCell),
    /// A slot of a frame on the current runtime stack (absolute frame index).
    Stack { frame: usize, slot: usize },
    /// A member of a container, read and written through the container.
    Property { target: Value, key: PropertyKey },
}

impl Reference {
    pub fn get(&self, stack: &RuntimeStack) -> Result<Value, RuntimeErrorKind> {
        match self {
            Reference::Cell(cell) => Ok(cell.get()),
            Reference::Stack { frame, slot } => Ok(stack.slot(*frame, *slot)?.get()),
            Reference::Property { target, key } => stdlib::get_property(target, key),
        }
    }

    /// Writes through the reference, enforcing the type-stability rule.
    pub fn set(&self, stack: &RuntimeStack, value: Value) -> Result<(), RuntimeErrorKind> {
        match self {
            Reference::Cell(cell) => cell.assign(value),
            Reference::Stack { frame, slot } => stack.slot(*frame, *slot)?.assign(value),
            Reference::Property { target, key } => {
                check_stable(&stdlib::stored_property(target, key)?, &value)?;
                stdlib::set_property(target, key, value)
            }
        }
    }

    /// Turns a stack address into the cell it designates, so the reference
    /// stays valid after the frame is popped.
    pub fn detach(self, stack: &RuntimeStack) -> Result<Reference, RuntimeErrorKind> {
        match self {
            Reference::Stack { frame, slot } => Ok(Reference::Cell(stack.slot(frame, slot)?.clone())),
            other => Ok(other),
        }
    }
}

/// First assignment is free; afterwards the concrete tag may not change.
pub fn check_stable(current: &Value, assigned: &Value) -> Result<(), RuntimeErrorKind> {
    if current.is_null() || current.is_uninitialized() || current.is_undefined() {
        return Ok(());
    }
    if current.type_name() != assigned.type_name() {
        return Err(RuntimeErrorKind::TypeUnstableAssignment {
            current: current.type_name().to_string(),
            assigned: assigned.type_name().to_string(),
        });
    }
    Ok(())
}
