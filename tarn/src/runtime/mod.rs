// Runtime system for Tarn
// This module contains the evaluator, the value model, the executor behind
// launch/await, and the entry points tying compilation to evaluation.

pub mod environment;
pub mod error;
pub mod interner;
pub mod ir_runtime;
pub mod namespace;
pub mod native_stack;
pub mod reference;
pub mod stdlib;
pub mod tasks;
pub mod values;

pub use environment::{Frame, RuntimeStack};
pub use error::{Exit, RuntimeError, RuntimeErrorKind, RuntimeResult};
pub use ir_runtime::Evaluator;
pub use namespace::Namespace;
pub use reference::{Reference, ValueCell};
pub use tasks::{Deferred, Executor};
pub use values::{Arity, Value};

use crate::config::RuntimeConfig;
use crate::ir::{compile, link, CompileEnv, CompileError, IrNode};
use crate::tree::Tree;
use crate::TarnError;
use std::rc::Rc;

/// Evaluates a linked IR root on `stack` and returns its value.
///
/// Launched tasks run whenever the root evaluation is suspended in `await`.
/// With `drain_launched_tasks` set, tasks still pending when the root value
/// is produced are run to completion before returning.
pub fn evaluate(root: &IrNode, stack: RuntimeStack, config: &RuntimeConfig) -> RuntimeResult<Value> {
    interner::set_prune_threshold(config.intern_prune_threshold);
    let executor = Executor::new();
    let mut evaluator = Evaluator::new(stack, executor.spawner(), Rc::new(config.clone()));
    let outcome = executor.block_on(evaluator.eval(root))?;
    let value = outcome.map_err(Exit::into_error)?;
    if config.drain_launched_tasks {
        executor.run_until_idle();
    }
    Ok(value)
}

/// Compile, link and evaluate against one namespace.
#[derive(Debug)]
pub struct Runtime {
    config: RuntimeConfig,
    namespace: Namespace,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Runtime {
    /// A runtime whose namespace starts with the prelude natives.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_namespace(config, Namespace::prelude())
    }

    pub fn with_namespace(config: RuntimeConfig, namespace: Namespace) -> Self {
        Runtime { config, namespace }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn namespace_mut(&mut self) -> &mut Namespace {
        &mut self.namespace
    }

    /// Compiles `tree` and links its free variables against the namespace.
    pub fn compile(&self, tree: &Tree) -> Result<Rc<IrNode>, CompileError> {
        self.compile_in(tree, None)
    }

    /// Like [`Runtime::compile`], resolving names against a pre-seeded frame first.
    pub fn compile_in(&self, tree: &Tree, env: Option<CompileEnv>) -> Result<Rc<IrNode>, CompileError> {
        let (root, free) = compile(tree, env)?;
        link(&free, &self.namespace)?;
        Ok(root)
    }

    pub fn run(&self, tree: &Tree) -> Result<Value, TarnError> {
        let root = self.compile(tree)?;
        Ok(evaluate(&root, RuntimeStack::new(), &self.config)?)
    }

    /// Parses the JSON tree notation, then runs it.
    pub fn run_json(&self, text: &str) -> Result<Value, TarnError> {
        let tree = Tree::parse(text)?;
        self.run(&tree)
    }
}
