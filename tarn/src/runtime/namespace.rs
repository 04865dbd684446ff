// Global namespace consulted by the link step

use crate::runtime::error::RuntimeErrorKind;
use crate::runtime::reference::ValueCell;
use crate::runtime::stdlib;
use crate::runtime::values::{Arity, Value};
use indexmap::IndexMap;

/// Name to cell table. Linked code holds the cells, so redefining a name
/// updates it in place for every program already linked against it.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    entries: IndexMap<String, ValueCell>,
}

impl Namespace {
    pub fn new() -> Self {
        Namespace {
            entries: IndexMap::new(),
        }
    }

    /// A namespace holding the host natives every program may use.
    pub fn prelude() -> Self {
        let mut namespace = Namespace::new();
        for native in stdlib::prelude() {
            if let Value::Native(function) = &native {
                let name = function.name().to_string();
                namespace.define(name, native);
            }
        }
        namespace
    }

    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.entries.get(&name) {
            Some(cell) => {
                cell.replace(value);
            }
            None => {
                self.entries.insert(name, ValueCell::new(value));
            }
        }
    }

    pub fn define_native(
        &mut self,
        name: impl Into<String>,
        arity: Arity,
        func: impl Fn(&[Value]) -> Result<Value, RuntimeErrorKind> + 'static,
    ) {
        let name = name.into();
        let native = Value::host_function(name.clone(), arity, func);
        self.define(name, native);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.entries.get(name).map(ValueCell::get)
    }

    pub fn cell(&self, name: &str) -> Option<&ValueCell> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
