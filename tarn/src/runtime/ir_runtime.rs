// IR Runtime - tree-walking evaluator for resolved Tarn IR
// Names were resolved by the converter, so evaluation only follows
// (depth, index) addresses, capture indices and linked global cells.

use crate::config::RuntimeConfig;
use crate::ir::core::{FunctionDef, IrKind, IrLetBinding, IrNode, Variable};
use crate::runtime::environment::{Frame, RuntimeStack};
use crate::runtime::error::{Exit, RuntimeErrorKind};
use crate::runtime::native_stack::StackSafe;
use crate::runtime::reference::{PropertyKey, Reference, ValueCell};
use crate::runtime::stdlib;
use crate::runtime::tasks::{Deferred, Spawner};
use crate::runtime::values::{Arity, Closure, NativeFunction, Thunk, Value};
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use std::rc::Rc;

/// Outcome of one evaluation step. Non-local exits travel on the `Err` side.
pub type Eval = Result<Value, Exit>;

/// Evaluates IR for one logical thread: owns its runtime stack and launches
/// tasks through the executor's spawner.
#[derive(Debug)]
pub struct Evaluator {
    stack: RuntimeStack,
    spawner: Spawner,
    config: Rc<RuntimeConfig>,
    /// Nested closure invocations on this logical thread.
    call_depth: usize,
}

impl Evaluator {
    pub fn new(stack: RuntimeStack, spawner: Spawner, config: Rc<RuntimeConfig>) -> Self {
        Evaluator {
            stack,
            spawner,
            config,
            call_depth: 0,
        }
    }

    pub fn stack(&self) -> &RuntimeStack {
        &self.stack
    }

    /// Evaluates `node`, tagging any error that has no location yet with the
    /// node's own location.
    ///
    /// Every recursive path returns a boxed future, so each level keeps only
    /// a pointer to the next one in its state.
    pub fn eval<'a>(&'a mut self, node: &'a IrNode) -> LocalBoxFuture<'a, Eval> {
        let step = async move {
            self.execute_node(node)
                .await
                .map_err(|exit| exit.at(node.location.as_ref()))
        };
        StackSafe::new(step.boxed_local()).boxed_local()
    }

    async fn execute_node(&mut self, node: &IrNode) -> Eval {
        match &node.kind {
            IrKind::Literal(value) => Ok(value.clone()),
            IrKind::Intrinsic(op) => Ok(Value::Native(Rc::new(NativeFunction::Intrinsic(*op)))),
            IrKind::Sequence(items) => {
                let mut last = Value::null();
                for item in items {
                    last = self.eval(item).await?;
                }
                Ok(last)
            }
            IrKind::Let { bindings, body } => {
                let cells = bindings.iter().map(|_| ValueCell::uninitialized()).collect();
                let captures = self.stack.captures();
                self.stack.push(Frame::new(cells, captures, false));
                let result = self.execute_let(bindings, body).await;
                self.stack.pop()?;
                result
            }
            IrKind::Get(variable) => Ok(self.read_variable(variable)?),
            IrKind::Set { target, value } => {
                let reference = self.eval_reference(target).await?;
                let value = self.eval(value).await?;
                reference.set(&self.stack, value.clone())?;
                Ok(value)
            }
            IrKind::Call { callee, arguments } => self.execute_call(callee, arguments).await,
            IrKind::Function(def) => Ok(Value::Closure(self.make_closure(def)?)),
            IrKind::List(items) => Ok(Value::list(self.eval_all(items).await?)),
            IrKind::Dict(entries) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.eval(key).await?;
                    let value = self.eval(value).await?;
                    pairs.push((key, value));
                }
                Ok(Value::dict(pairs))
            }
            IrKind::Object { fields, sealed } => {
                let mut values = IndexMap::with_capacity(fields.len());
                for (name, value) in fields {
                    values.insert(name.clone(), self.eval(value).await?);
                }
                Ok(Value::object(values, *sealed))
            }
            IrKind::Property { target, name } => {
                let target = self.eval(target).await?;
                Ok(stdlib::get_property(&target, &PropertyKey::Name(name.clone()))?)
            }
            IrKind::Index { target, key } => {
                let target = self.eval(target).await?;
                let key = self.eval(key).await?;
                Ok(stdlib::get_property(&target, &PropertyKey::Index(key))?)
            }
            IrKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(condition).await?.truthiness("if")? {
                    self.eval(then_branch).await
                } else {
                    match else_branch {
                        Some(branch) => self.eval(branch).await,
                        None => Ok(Value::null()),
                    }
                }
            }
            IrKind::And(lhs, rhs) => {
                let left = self.eval(lhs).await?;
                if !left.truthiness("and")? {
                    return Ok(left);
                }
                let right = self.eval(rhs).await?;
                right.truthiness("and")?;
                Ok(right)
            }
            IrKind::Or(lhs, rhs) => {
                let left = self.eval(lhs).await?;
                if left.truthiness("or")? {
                    return Ok(left);
                }
                let right = self.eval(rhs).await?;
                right.truthiness("or")?;
                Ok(right)
            }
            IrKind::Loop(body) => loop {
                match self.eval(body).await {
                    Ok(_) | Err(Exit::Continue) => continue,
                    Err(Exit::Break(value)) => return Ok(value),
                    Err(other) => return Err(other),
                }
            },
            IrKind::Break(payload) => {
                let value = self.eval_payload(payload).await?;
                Err(Exit::Break(value))
            }
            IrKind::Continue => Err(Exit::Continue),
            IrKind::Return(payload) => {
                let value = self.eval_payload(payload).await?;
                Err(Exit::Return(value))
            }
            IrKind::Launch(def) => self.launch(def),
            IrKind::Await(inner) => match self.eval(inner).await? {
                Value::Deferred(deferred) => Ok(deferred.wait().await?),
                other => Err(RuntimeErrorKind::AwaitNonDeferred(other.type_name().to_string()).into()),
            },
            IrKind::Ref(target) => {
                let reference = self.eval_reference(target).await?.detach(&self.stack)?;
                Ok(Value::Reference(Rc::new(reference)))
            }
            IrKind::Deref(inner) => match self.eval(inner).await? {
                Value::Reference(reference) => Ok(reference.get(&self.stack)?),
                other => Err(RuntimeErrorKind::type_error("deref", "reference", &other).into()),
            },
        }
    }

    fn execute_let<'a>(
        &'a mut self,
        bindings: &'a [IrLetBinding],
        body: &'a IrNode,
    ) -> LocalBoxFuture<'a, Eval> {
        async move {
            for (index, binding) in bindings.iter().enumerate() {
                if let Some(init) = &binding.init {
                    let value = self.eval(init).await?;
                    self.stack.local(0, index)?.replace(value);
                }
            }
            self.eval(body).await
        }
        .boxed_local()
    }

    fn execute_call<'a>(
        &'a mut self,
        callee: &'a IrNode,
        arguments: &'a [Rc<IrNode>],
    ) -> LocalBoxFuture<'a, Eval> {
        async move {
            // Operators skip materializing a native value for the callee
            if let IrKind::Intrinsic(op) = &callee.kind {
                let args = self.eval_all(arguments).await?;
                return stdlib::apply_intrinsic(*op, &args);
            }
            let function = self.eval(callee).await?;
            if let Value::Closure(closure) = &function {
                if closure.def.lazy {
                    let frames = self.stack.snapshot();
                    let thunks = arguments
                        .iter()
                        .map(|argument| {
                            Value::Thunk(Rc::new(Thunk {
                                node: argument.clone(),
                                frames: frames.clone(),
                            }))
                        })
                        .collect();
                    return self.call_closure(closure.clone(), thunks).await;
                }
            }
            let args = self.eval_all(arguments).await?;
            self.call_value(function, args).await
        }
        .boxed_local()
    }

    fn eval_all<'a>(
        &'a mut self,
        nodes: &'a [Rc<IrNode>],
    ) -> LocalBoxFuture<'a, Result<Vec<Value>, Exit>> {
        async move {
            let mut values = Vec::with_capacity(nodes.len());
            for node in nodes {
                values.push(self.eval(node).await?);
            }
            Ok(values)
        }
        .boxed_local()
    }

    fn eval_payload<'a>(
        &'a mut self,
        payload: &'a Option<Rc<IrNode>>,
    ) -> LocalBoxFuture<'a, Eval> {
        async move {
            match payload {
                Some(node) => self.eval(node).await,
                None => Ok(Value::null()),
            }
        }
        .boxed_local()
    }

    /// Applies any callable value to already evaluated arguments.
    pub fn call_value(&mut self, function: Value, args: Vec<Value>) -> LocalBoxFuture<'_, Eval> {
        async move {
            match &function {
                Value::Closure(closure) => self.call_closure(closure.clone(), args).await,
                Value::Native(native) => {
                    stdlib::check_arity(native.name(), native.arity(), args.len())?;
                    match native.as_ref() {
                        NativeFunction::Intrinsic(op) => stdlib::apply_intrinsic(*op, &args),
                        NativeFunction::Host(host) => Ok((host.func)(&args)?),
                        NativeFunction::Method { receiver, method } => {
                            Ok(stdlib::call_method(receiver, *method, &args)?)
                        }
                    }
                }
                Value::Thunk(thunk) => {
                    stdlib::check_arity("thunk", Arity::Fixed(0), args.len())?;
                    self.force_thunk(thunk.clone()).await
                }
                other => Err(RuntimeErrorKind::NotCallable {
                    type_name: other.type_name().to_string(),
                }
                .into()),
            }
        }
        .boxed_local()
    }

    /// Invokes a closure: one boundary frame holding the parameters and the
    /// rest list, popped again on every exit path.
    pub fn call_closure(
        &mut self,
        closure: Rc<Closure>,
        args: Vec<Value>,
    ) -> LocalBoxFuture<'_, Eval> {
        async move {
            if self.call_depth >= self.config.max_call_depth {
                return Err(RuntimeErrorKind::CallDepthExceeded(self.config.max_call_depth).into());
            }
            log::trace!("call {} with {} argument(s)", closure.name(), args.len());

            let def = &closure.def;
            let mut args = args.into_iter();
            let mut locals: Vec<ValueCell> = def
                .params
                .iter()
                .map(|_| ValueCell::new(args.next().unwrap_or_else(Value::null)))
                .collect();
            locals.push(ValueCell::new(Value::list(args.collect())));

            self.stack
                .push(Frame::new(locals, closure.captures.clone(), true));
            self.call_depth += 1;
            let result = self.eval(&def.body).await;
            self.call_depth -= 1;
            self.stack.pop()?;

            match result {
                Ok(value) | Err(Exit::Return(value)) => Ok(value),
                Err(Exit::Error(error)) => Err(Exit::Error(error)),
                Err(stray) => Err(stray.into_error().into()),
            }
        }
        .boxed_local()
    }

    /// Evaluates a thunk's expression on a stack rebuilt from its snapshot.
    fn force_thunk(&mut self, thunk: Rc<Thunk>) -> LocalBoxFuture<'_, Eval> {
        async move {
            let caller = std::mem::replace(
                &mut self.stack,
                RuntimeStack::from_frames(thunk.frames.clone()),
            );
            let result = self.eval(&thunk.node).await;
            self.stack = caller;
            result.map_err(|exit| match exit {
                Exit::Error(error) => Exit::Error(error),
                stray => stray.into_error().into(),
            })
        }
        .boxed_local()
    }

    fn launch(&mut self, def: &Rc<FunctionDef>) -> Eval {
        let closure = self.make_closure(def)?;
        let id = self.spawner.reserve()?;
        let deferred = Rc::new(Deferred::new(id));

        let settled = deferred.clone();
        let spawner = self.spawner.clone();
        let config = self.config.clone();
        self.spawner.spawn(id, async move {
            let mut evaluator = Evaluator::new(RuntimeStack::new(), spawner, config);
            let result = evaluator
                .call_closure(closure, Vec::new())
                .await
                .map_err(Exit::into_error);
            if let Err(error) = &result {
                log::debug!("task {} failed: {}", id, error);
            }
            settled.complete(result);
        })?;
        log::debug!("launched task {}", id);
        Ok(Value::Deferred(deferred))
    }

    /// Creates a closure, taking the cells its definition captures from the
    /// current frames.
    fn make_closure(&self, def: &Rc<FunctionDef>) -> Result<Rc<Closure>, RuntimeErrorKind> {
        let captures = def
            .captures
            .iter()
            .map(|capture| self.variable_cell(&capture.source))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Rc::new(Closure {
            def: def.clone(),
            captures: Rc::from(captures),
        }))
    }

    fn variable_cell(&self, variable: &Variable) -> Result<ValueCell, RuntimeErrorKind> {
        match variable {
            Variable::Local { depth, index, .. } => Ok(self.stack.local(*depth, *index)?.clone()),
            Variable::Capture { index, .. } => Ok(self.stack.capture(*index)?.clone()),
            Variable::Global(slot) => slot
                .cell()
                .cloned()
                .ok_or_else(|| RuntimeErrorKind::UnlinkedGlobal(slot.name.clone())),
        }
    }

    fn read_variable(&self, variable: &Variable) -> Result<Value, RuntimeErrorKind> {
        let value = self.variable_cell(variable)?.get();
        if value.is_uninitialized() {
            return Err(RuntimeErrorKind::UninitializedVariable(
                variable.name().to_string(),
            ));
        }
        Ok(value)
    }

    /// Evaluates an assignable place to the reference it designates.
    fn eval_reference<'a>(
        &'a mut self,
        target: &'a IrNode,
    ) -> LocalBoxFuture<'a, Result<Reference, Exit>> {
        async move {
            let reference = match &target.kind {
                // Locals are addressed on the stack; captures and globals by cell
                IrKind::Get(Variable::Local { depth, index, .. }) => Reference::Stack {
                    frame: self.stack.absolute(*depth)?,
                    slot: *index,
                },
                IrKind::Get(variable) => Reference::Cell(self.variable_cell(variable)?),
                IrKind::Property { target, name } => Reference::Property {
                    target: self.eval(target).await?,
                    key: PropertyKey::Name(name.clone()),
                },
                IrKind::Index { target, key } => {
                    let target = self.eval(target).await?;
                    let key = self.eval(key).await?;
                    Reference::Property {
                        target,
                        key: PropertyKey::Index(key),
                    }
                }
                IrKind::Deref(inner) => match self.eval(inner).await? {
                    Value::Reference(reference) => (*reference).clone(),
                    other => return Err(RuntimeErrorKind::type_error("deref", "reference", &other).into()),
                },
                _ => return Err(RuntimeErrorKind::InvalidAssignmentTarget.into()),
            };
            Ok(reference)
        }
        .boxed_local()
    }
}
