// Tree to IR converter
// Resolves every identifier to a stack slot, a closure capture or a global
// site while building the IR, so evaluation never looks names up.

use crate::ir::core::*;
use crate::ir::intrinsics::{is_intrinsic, Intrinsic};
use crate::runtime::values::Value;
use crate::tree::{SourceLocation, Tree};
use indexmap::IndexMap;
use itertools::Itertools;
use std::rc::Rc;

/// Implicit name of the surplus-argument slot of every function frame.
pub const REST: &str = "rest";

fn location_suffix(location: &Option<SourceLocation>) -> String {
    match location {
        Some(location) => format!(" at {}", location),
        None => String::new(),
    }
}

fn exit_scope(exit: &str) -> &'static str {
    if exit == "return" {
        "a function"
    } else {
        "a loop"
    }
}

fn join_names(names: &[String]) -> String {
    names.join(", ")
}

/// Error types for IR conversion
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("malformed `{form}` form: {message}{}", location_suffix(.location))]
    MalformedForm {
        form: String,
        message: String,
        location: Option<SourceLocation>,
    },

    #[error("duplicate name `{name}` in `{form}`{}", location_suffix(.location))]
    DuplicateParameter {
        form: String,
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("`{name}` is a built-in and cannot be rebound{}", location_suffix(.location))]
    ReservedName {
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("`{exit}` outside of {}{}", exit_scope(.exit), location_suffix(.location))]
    StrayExit {
        exit: &'static str,
        location: Option<SourceLocation>,
    },

    #[error("unresolved names: {}", join_names(.names))]
    Unresolved { names: Vec<String> },

    #[error("already linked to another namespace: {}", join_names(.names))]
    AlreadyLinked { names: Vec<String> },

    #[error("invalid tree: {message}")]
    InvalidTree { message: String },
}

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Let,
    /// Starts a new function region; names from outside it become captures.
    Function,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    /// Frame layout: slot `i` holds `names[i]`.
    pub names: Vec<String>,
    /// Filled while the function body is converted.
    pub captures: Vec<IrCapture>,
}

/// Residual free variables: every unresolved occurrence, grouped by name.
#[derive(Debug, Default)]
pub struct FreeVars {
    sites: IndexMap<String, Vec<Rc<GlobalSlot>>>,
}

impl FreeVars {
    fn record(&mut self, name: &str) -> Variable {
        let slot = Rc::new(GlobalSlot::new(name));
        self.sites
            .entry(name.to_string())
            .or_default()
            .push(slot.clone());
        Variable::Global(slot)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }

    pub fn sites(&self, name: &str) -> &[Rc<GlobalSlot>] {
        self.sites.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Rc<GlobalSlot>>)> {
        self.sites.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sites.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// Compile-time environment: the stack of name frames being converted.
#[derive(Debug, Clone)]
pub struct CompileEnv {
    scopes: Vec<Scope>,
    /// Enclosing loops per function region; `break` cannot cross a function.
    loop_depths: Vec<usize>,
    function_depth: usize,
}

impl Default for CompileEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl CompileEnv {
    pub fn new() -> Self {
        CompileEnv {
            scopes: Vec::new(),
            loop_depths: vec![0],
            function_depth: 0,
        }
    }

    /// An environment with one frame of pre-bound names, to be evaluated
    /// against `RuntimeStack::with_frame` holding one cell per name.
    pub fn with_frame<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let mut env = Self::new();
        env.scopes.push(Scope {
            kind: ScopeKind::Let,
            names: names.into_iter().map(Into::into).collect(),
            captures: Vec::new(),
        });
        env
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn push_let(&mut self, names: Vec<String>) {
        self.scopes.push(Scope {
            kind: ScopeKind::Let,
            names,
            captures: Vec::new(),
        });
    }

    fn pop_let(&mut self) {
        self.scopes.pop();
    }

    fn enter_function(&mut self, names: Vec<String>) {
        self.scopes.push(Scope {
            kind: ScopeKind::Function,
            names,
            captures: Vec::new(),
        });
        self.loop_depths.push(0);
        self.function_depth += 1;
    }

    fn exit_function(&mut self) -> Vec<IrCapture> {
        self.loop_depths.pop();
        self.function_depth -= 1;
        self.scopes
            .pop()
            .map(|scope| scope.captures)
            .unwrap_or_default()
    }

    fn enter_loop(&mut self) {
        if let Some(depth) = self.loop_depths.last_mut() {
            *depth += 1;
        }
    }

    fn exit_loop(&mut self) {
        if let Some(depth) = self.loop_depths.last_mut() {
            *depth = depth.saturating_sub(1);
        }
    }

    fn in_loop(&self) -> bool {
        self.loop_depths.last().copied().unwrap_or(0) > 0
    }

    fn in_function(&self) -> bool {
        self.function_depth > 0
    }

    /// Resolves `name` from the innermost scope outwards.
    pub fn resolve(&mut self, name: &str, free: &mut FreeVars) -> Variable {
        let top = self.scopes.len();
        self.resolve_below(top, name, free)
    }

    /// Resolution as seen from just inside scope `top` (exclusive).
    ///
    /// Crossing a function scope turns the outer resolution into a capture of
    /// that function; the capture's source is resolved in the enclosing
    /// region, recursively, so a chain of nested closures each capture the
    /// same cell.
    fn resolve_below(&mut self, top: usize, name: &str, free: &mut FreeVars) -> Variable {
        let mut depth = 0;
        for i in (0..top).rev() {
            if let Some(index) = self.scopes[i].names.iter().position(|n| n == name) {
                return Variable::Local {
                    name: name.to_string(),
                    depth,
                    index,
                };
            }
            if self.scopes[i].kind == ScopeKind::Function {
                if let Some(index) = self.scopes[i].captures.iter().position(|c| c.name == name) {
                    return Variable::Capture {
                        name: name.to_string(),
                        index,
                    };
                }
                let source = self.resolve_below(i, name, free);
                let captures = &mut self.scopes[i].captures;
                captures.push(IrCapture {
                    name: name.to_string(),
                    source,
                });
                return Variable::Capture {
                    name: name.to_string(),
                    index: captures.len() - 1,
                };
            }
            depth += 1;
        }
        free.record(name)
    }
}

struct Param<'t> {
    name: String,
    init: Option<&'t Tree>,
}

/// Main tree to IR converter
pub struct IrConverter {
    env: CompileEnv,
    free: FreeVars,
    /// Name given to the next `fn` literal; set only while converting a
    /// `let` initializer that is itself a function literal.
    pending_name: Option<String>,
}

impl Default for IrConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl IrConverter {
    pub fn new() -> Self {
        Self::with_env(CompileEnv::new())
    }

    pub fn with_env(env: CompileEnv) -> Self {
        IrConverter {
            env,
            free: FreeVars::default(),
            pending_name: None,
        }
    }

    pub fn convert(&mut self, tree: &Tree) -> CompileResult<Rc<IrNode>> {
        self.convert_at(tree, None)
    }

    /// The free variables recorded so far.
    pub fn finish(self) -> FreeVars {
        self.free
    }

    fn convert_at(
        &mut self,
        tree: &Tree,
        location: Option<&SourceLocation>,
    ) -> CompileResult<Rc<IrNode>> {
        match tree {
            Tree::Located(inner_location, inner) => self.convert_at(inner, Some(inner_location)),
            Tree::Null => Ok(node(IrKind::Literal(Value::null()), location)),
            Tree::Boolean(b) => Ok(node(IrKind::Literal(Value::boolean(*b)), location)),
            Tree::Number(n) => Ok(node(IrKind::Literal(Value::number(*n)), location)),
            Tree::Symbol(name) => Ok(self.convert_symbol(name, location)),
            Tree::Node(items) => self.convert_form(items, location),
        }
    }

    fn convert_symbol(&mut self, name: &str, location: Option<&SourceLocation>) -> Rc<IrNode> {
        match Intrinsic::lookup(name) {
            Some(op) => node(IrKind::Intrinsic(op), location),
            None => {
                let variable = self.env.resolve(name, &mut self.free);
                node(IrKind::Get(variable), location)
            }
        }
    }

    fn convert_form(
        &mut self,
        items: &[Tree],
        location: Option<&SourceLocation>,
    ) -> CompileResult<Rc<IrNode>> {
        let Some((head, args)) = items.split_first() else {
            return Err(malformed("call", "empty form", location));
        };
        match head.as_symbol() {
            Some("str") => self.convert_str(args, location),
            Some(form @ ("undefined" | "end")) => {
                expect_args(form, args, 0, Some(0), location)?;
                let value = if form == "end" {
                    Value::end()
                } else {
                    Value::undefined()
                };
                Ok(node(IrKind::Literal(value), location))
            }
            Some("seq") => Ok(node(IrKind::Sequence(self.convert_all(args)?), location)),
            Some("let") => self.convert_let(args, location),
            Some(form @ ("fn" | "fexpr")) => self.convert_function(form, args, location),
            Some("call") => {
                expect_args("call", args, 1, None, location)?;
                self.convert_call(&args[0], &args[1..], location)
            }
            Some("if") => self.convert_if(args, location),
            Some(form @ ("and" | "or")) => self.convert_logical(form, args, location),
            Some("set") => self.convert_set(args, location),
            Some("list") => Ok(node(IrKind::List(self.convert_all(args)?), location)),
            Some("map") => self.convert_map(args, location),
            Some(form @ ("object" | "struct")) => self.convert_object(form, args, location),
            Some("prop") => self.convert_prop(args, location),
            Some("index") => {
                expect_args("index", args, 2, Some(2), location)?;
                let target = self.convert(&args[0])?;
                let key = self.convert(&args[1])?;
                Ok(node(IrKind::Index { target, key }, location))
            }
            Some("loop") => {
                self.env.enter_loop();
                let body = self.convert_body(args, location);
                self.env.exit_loop();
                Ok(node(IrKind::Loop(body?), location))
            }
            Some(form @ ("break" | "continue" | "return")) => {
                self.convert_exit(form, args, location)
            }
            Some("launch") => {
                let def = self.convert_function_def(None, Vec::new(), args, false, location)?;
                Ok(node(IrKind::Launch(def), location))
            }
            Some("await") => {
                expect_args("await", args, 1, Some(1), location)?;
                Ok(node(IrKind::Await(self.convert(&args[0])?), location))
            }
            Some("ref") => {
                expect_args("ref", args, 1, Some(1), location)?;
                Ok(node(IrKind::Ref(self.convert_target("ref", &args[0], location)?), location))
            }
            Some("deref") => {
                expect_args("deref", args, 1, Some(1), location)?;
                Ok(node(IrKind::Deref(self.convert(&args[0])?), location))
            }
            _ => self.convert_call(head, args, location),
        }
    }

    fn convert_all(&mut self, trees: &[Tree]) -> CompileResult<Vec<Rc<IrNode>>> {
        trees.iter().map(|tree| self.convert(tree)).collect()
    }

    /// Several body expressions form an implicit sequence; none is `null`.
    fn convert_body(
        &mut self,
        body: &[Tree],
        location: Option<&SourceLocation>,
    ) -> CompileResult<Rc<IrNode>> {
        match body {
            [] => Ok(node(IrKind::Literal(Value::null()), location)),
            [single] => self.convert(single),
            many => Ok(node(IrKind::Sequence(self.convert_all(many)?), location)),
        }
    }

    fn convert_str(
        &mut self,
        args: &[Tree],
        location: Option<&SourceLocation>,
    ) -> CompileResult<Rc<IrNode>> {
        expect_args("str", args, 1, Some(1), location)?;
        let text = args[0]
            .as_symbol()
            .ok_or_else(|| malformed("str", "expected a string", location))?;
        Ok(node(IrKind::Literal(Value::string(text)), location))
    }

    fn convert_call(
        &mut self,
        callee: &Tree,
        args: &[Tree],
        location: Option<&SourceLocation>,
    ) -> CompileResult<Rc<IrNode>> {
        let callee = self.convert(callee)?;
        let arguments = self.convert_all(args)?;
        Ok(node(IrKind::Call { callee, arguments }, location))
    }

    fn convert_let(
        &mut self,
        args: &[Tree],
        location: Option<&SourceLocation>,
    ) -> CompileResult<Rc<IrNode>> {
        let (params, body) = args
            .split_first()
            .ok_or_else(|| malformed("let", "missing parameter list", location))?;
        let params = parse_params("let", params, true, location)?;

        // Initializers see the new frame, so a function can refer to itself
        self.env
            .push_let(params.iter().map(|p| p.name.clone()).collect());
        let mut bindings = Vec::with_capacity(params.len());
        for param in &params {
            let init = match param.init {
                Some(init) => {
                    if is_function_literal(init) {
                        self.pending_name = Some(param.name.clone());
                    }
                    let converted = self.convert(init);
                    self.pending_name = None;
                    Some(converted?)
                }
                None => None,
            };
            bindings.push(IrLetBinding {
                name: param.name.clone(),
                init,
            });
        }
        let body = self.convert_body(body, location);
        self.env.pop_let();
        Ok(node(IrKind::Let { bindings, body: body? }, location))
    }

    fn convert_function(
        &mut self,
        form: &str,
        args: &[Tree],
        location: Option<&SourceLocation>,
    ) -> CompileResult<Rc<IrNode>> {
        let name = self.pending_name.take();
        let (params, body) = args
            .split_first()
            .ok_or_else(|| malformed(form, "missing parameter list", location))?;
        let params = parse_params(form, params, false, location)?
            .into_iter()
            .map(|p| p.name)
            .collect();
        let def = self.convert_function_def(name, params, body, form == "fexpr", location)?;
        Ok(node(IrKind::Function(def), location))
    }

    fn convert_function_def(
        &mut self,
        name: Option<String>,
        params: Vec<String>,
        body: &[Tree],
        lazy: bool,
        location: Option<&SourceLocation>,
    ) -> CompileResult<Rc<FunctionDef>> {
        let mut names = params.clone();
        if !names.iter().any(|n| n == REST) {
            names.push(REST.to_string());
        }
        self.env.enter_function(names);
        let body = self.convert_body(body, location);
        let captures = self.env.exit_function();
        let body = body?;

        log::debug!(
            "compiled function `{}`: {} param(s), captures [{}]",
            name.as_deref().unwrap_or("anonymous"),
            params.len(),
            captures.iter().map(|c| &c.name).join(", ")
        );
        Ok(Rc::new(FunctionDef {
            name,
            params,
            captures,
            body,
            lazy,
        }))
    }

    fn convert_if(
        &mut self,
        args: &[Tree],
        location: Option<&SourceLocation>,
    ) -> CompileResult<Rc<IrNode>> {
        expect_args("if", args, 2, Some(3), location)?;
        let condition = self.convert(&args[0])?;
        let then_branch = self.convert(&args[1])?;
        let else_branch = args.get(2).map(|tree| self.convert(tree)).transpose()?;
        Ok(node(
            IrKind::If {
                condition,
                then_branch,
                else_branch,
            },
            location,
        ))
    }

    /// `["and", a, b, c]` folds to the right: `a and (b and c)`. A single
    /// operand is paired with the identity of the operator.
    fn convert_logical(
        &mut self,
        form: &str,
        args: &[Tree],
        location: Option<&SourceLocation>,
    ) -> CompileResult<Rc<IrNode>> {
        expect_args(form, args, 1, None, location)?;
        let is_and = form == "and";
        let mut operands = self.convert_all(args)?;
        let mut acc = match operands.len() {
            1 => node(IrKind::Literal(Value::boolean(is_and)), location),
            _ => operands.pop().ok_or_else(|| malformed(form, "no operands", location))?,
        };
        while let Some(lhs) = operands.pop() {
            let kind = if is_and {
                IrKind::And(lhs, acc)
            } else {
                IrKind::Or(lhs, acc)
            };
            acc = node(kind, location);
        }
        Ok(acc)
    }

    fn convert_set(
        &mut self,
        args: &[Tree],
        location: Option<&SourceLocation>,
    ) -> CompileResult<Rc<IrNode>> {
        expect_args("set", args, 2, Some(2), location)?;
        let target = self.convert_target("set", &args[0], location)?;
        let value = self.convert(&args[1])?;
        Ok(node(IrKind::Set { target, value }, location))
    }

    /// An assignable place: a name, `prop`, `index` or `deref`.
    fn convert_target(
        &mut self,
        form: &str,
        tree: &Tree,
        location: Option<&SourceLocation>,
    ) -> CompileResult<Rc<IrNode>> {
        match tree.strip() {
            Tree::Symbol(name) if is_intrinsic(name) => Err(CompileError::ReservedName {
                name: name.clone(),
                location: tree.location().or(location).cloned(),
            }),
            Tree::Symbol(_) => self.convert(tree),
            Tree::Node(items)
                if matches!(
                    items.first().and_then(Tree::as_symbol),
                    Some("prop" | "index" | "deref")
                ) =>
            {
                self.convert(tree)
            }
            _ => Err(malformed(form, "invalid assignment target", location)),
        }
    }

    fn convert_map(
        &mut self,
        args: &[Tree],
        location: Option<&SourceLocation>,
    ) -> CompileResult<Rc<IrNode>> {
        let mut entries = Vec::with_capacity(args.len());
        for entry in args {
            match entry.strip() {
                Tree::Node(pair) if pair.len() == 2 => {
                    let key = self.convert(&pair[0])?;
                    let value = self.convert(&pair[1])?;
                    entries.push((key, value));
                }
                _ => return Err(malformed("map", "entries must be [key, value]", location)),
            }
        }
        Ok(node(IrKind::Dict(entries), location))
    }

    fn convert_object(
        &mut self,
        form: &str,
        args: &[Tree],
        location: Option<&SourceLocation>,
    ) -> CompileResult<Rc<IrNode>> {
        let mut fields: Vec<(String, Rc<IrNode>)> = Vec::with_capacity(args.len());
        for entry in args {
            let (name, value) = match entry.strip() {
                Tree::Node(pair) if pair.len() == 2 => match pair[0].as_symbol() {
                    Some(name) => (name.to_string(), &pair[1]),
                    None => return Err(malformed(form, "field names must be names", location)),
                },
                _ => return Err(malformed(form, "fields must be [name, value]", location)),
            };
            if fields.iter().any(|(existing, _)| *existing == name) {
                return Err(CompileError::DuplicateParameter {
                    form: form.to_string(),
                    name,
                    location: entry.location().or(location).cloned(),
                });
            }
            let value = self.convert(value)?;
            fields.push((name, value));
        }
        Ok(node(
            IrKind::Object {
                fields,
                sealed: form == "struct",
            },
            location,
        ))
    }

    fn convert_prop(
        &mut self,
        args: &[Tree],
        location: Option<&SourceLocation>,
    ) -> CompileResult<Rc<IrNode>> {
        expect_args("prop", args, 2, Some(2), location)?;
        let target = self.convert(&args[0])?;
        let name = args[1]
            .as_symbol()
            .ok_or_else(|| malformed("prop", "property name must be a name", location))?
            .to_string();
        Ok(node(IrKind::Property { target, name }, location))
    }

    fn convert_exit(
        &mut self,
        form: &str,
        args: &[Tree],
        location: Option<&SourceLocation>,
    ) -> CompileResult<Rc<IrNode>> {
        let (exit, allowed) = match form {
            "break" => ("break", self.env.in_loop()),
            "continue" => ("continue", self.env.in_loop()),
            _ => ("return", self.env.in_function()),
        };
        if !allowed {
            return Err(CompileError::StrayExit {
                exit,
                location: location.cloned(),
            });
        }
        let max = if form == "continue" { 0 } else { 1 };
        expect_args(form, args, 0, Some(max), location)?;
        let payload = args.first().map(|tree| self.convert(tree)).transpose()?;
        let kind = match form {
            "break" => IrKind::Break(payload),
            "continue" => IrKind::Continue,
            _ => IrKind::Return(payload),
        };
        Ok(node(kind, location))
    }
}

fn node(kind: IrKind, location: Option<&SourceLocation>) -> Rc<IrNode> {
    Rc::new(IrNode::new(kind, location.cloned()))
}

fn malformed(form: &str, message: &str, location: Option<&SourceLocation>) -> CompileError {
    CompileError::MalformedForm {
        form: form.to_string(),
        message: message.to_string(),
        location: location.cloned(),
    }
}

fn expect_args(
    form: &str,
    args: &[Tree],
    min: usize,
    max: Option<usize>,
    location: Option<&SourceLocation>,
) -> CompileResult<()> {
    let count = args.len();
    if count < min || max.map_or(false, |max| count > max) {
        let expected = match max {
            Some(max) if max == min => format!("{}", min),
            Some(max) => format!("{} to {}", min, max),
            None => format!("at least {}", min),
        };
        return Err(malformed(
            form,
            &format!("expected {} argument(s), got {}", expected, count),
            location,
        ));
    }
    Ok(())
}

fn is_function_literal(tree: &Tree) -> bool {
    match tree.strip() {
        Tree::Node(items) => matches!(items.first().and_then(Tree::as_symbol), Some("fn" | "fexpr")),
        _ => false,
    }
}

/// Reads `["params", entry...]`. An entry is a name, or `[name, init]` when
/// `allow_init` is set.
fn parse_params<'t>(
    form: &str,
    tree: &'t Tree,
    allow_init: bool,
    location: Option<&SourceLocation>,
) -> CompileResult<Vec<Param<'t>>> {
    let entries = match tree.strip() {
        Tree::Node(items) if items.first().and_then(Tree::as_symbol) == Some("params") => {
            &items[1..]
        }
        _ => return Err(malformed(form, "expected [\"params\", ...]", location)),
    };
    let mut params: Vec<Param<'t>> = Vec::with_capacity(entries.len());
    for entry in entries {
        let entry_location = entry.location().or(location);
        let (name, init) = match entry.strip() {
            Tree::Symbol(name) => (name.clone(), None),
            Tree::Node(pair) if allow_init && pair.len() == 2 => match pair[0].as_symbol() {
                Some(name) => (name.to_string(), Some(&pair[1])),
                None => return Err(malformed(form, "binding names must be names", entry_location)),
            },
            _ => return Err(malformed(form, "parameters must be names", entry_location)),
        };
        if is_intrinsic(&name) {
            return Err(CompileError::ReservedName {
                name,
                location: entry_location.cloned(),
            });
        }
        if params.iter().any(|p| p.name == name) {
            return Err(CompileError::DuplicateParameter {
                form: form.to_string(),
                name,
                location: entry_location.cloned(),
            });
        }
        params.push(Param { name, init });
    }
    Ok(params)
}

/// Compiles `tree` against `env` (or an empty environment), returning the IR
/// root and the names it leaves unresolved.
pub fn compile(tree: &Tree, env: Option<CompileEnv>) -> CompileResult<(Rc<IrNode>, FreeVars)> {
    let mut converter = IrConverter::with_env(env.unwrap_or_default());
    let root = converter.convert(tree)?;
    Ok((root, converter.finish()))
}
