// Core IR definitions
//
// IR nodes are built once by the converter and never mutated afterwards.
// The only late-bound piece is the cell behind a global reference, which the
// link step fills in exactly once.

use crate::ir::intrinsics::Intrinsic;
use crate::runtime::reference::ValueCell;
use crate::runtime::values::Value;
use crate::tree::SourceLocation;
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

/// One occurrence of a name that no enclosing scope binds.
pub struct GlobalSlot {
    pub name: String,
    cell: OnceCell<ValueCell>,
}

impl GlobalSlot {
    pub fn new(name: impl Into<String>) -> Self {
        GlobalSlot {
            name: name.into(),
            cell: OnceCell::new(),
        }
    }

    /// Binds the slot to a namespace cell. A slot keeps its first binding.
    pub fn bind(&self, cell: ValueCell) -> bool {
        self.cell.set(cell).is_ok()
    }

    pub fn cell(&self) -> Option<&ValueCell> {
        self.cell.get()
    }

    pub fn is_linked(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl fmt::Debug for GlobalSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalSlot")
            .field("name", &self.name)
            .field("linked", &self.is_linked())
            .finish()
    }
}

/// Where a resolved name lives at run time.
#[derive(Debug, Clone)]
pub enum Variable {
    /// Slot `index` of the frame `depth` levels below the top, within the
    /// current function region.
    Local {
        name: String,
        depth: usize,
        index: usize,
    },
    /// Entry `index` of the executing closure's capture list.
    Capture { name: String, index: usize },
    /// A namespace entry, bound by the link step.
    Global(Rc<GlobalSlot>),
}

impl Variable {
    pub fn name(&self) -> &str {
        match self {
            Variable::Local { name, .. } | Variable::Capture { name, .. } => name,
            Variable::Global(slot) => &slot.name,
        }
    }
}

/// A cell a closure takes from its defining context when it is created.
#[derive(Debug, Clone)]
pub struct IrCapture {
    pub name: String,
    /// Resolution of the name in the enclosing function region.
    pub source: Variable,
}

#[derive(Debug)]
pub struct FunctionDef {
    /// Binding name when the literal initializes a `let` binding.
    pub name: Option<String>,
    pub params: Vec<String>,
    pub captures: Vec<IrCapture>,
    pub body: Rc<IrNode>,
    /// `fexpr`: arguments arrive as unevaluated thunks.
    pub lazy: bool,
}

impl FunctionDef {
    /// Frame slot of the surplus-argument list.
    pub fn rest_slot(&self) -> usize {
        self.params.len()
    }
}

#[derive(Debug)]
pub struct IrLetBinding {
    pub name: String,
    pub init: Option<Rc<IrNode>>,
}

#[derive(Debug)]
pub struct IrNode {
    pub kind: IrKind,
    /// Diagnostic only; never affects evaluation.
    pub location: Option<SourceLocation>,
}

impl IrNode {
    pub fn new(kind: IrKind, location: Option<SourceLocation>) -> Self {
        IrNode { kind, location }
    }
}

#[derive(Debug)]
pub enum IrKind {
    Literal(Value),
    Intrinsic(Intrinsic),
    Sequence(Vec<Rc<IrNode>>),
    Let {
        bindings: Vec<IrLetBinding>,
        body: Rc<IrNode>,
    },
    Get(Variable),
    /// `target` is a `Get`, `Property`, `Index` or `Deref` node.
    Set {
        target: Rc<IrNode>,
        value: Rc<IrNode>,
    },
    Call {
        callee: Rc<IrNode>,
        arguments: Vec<Rc<IrNode>>,
    },
    Function(Rc<FunctionDef>),
    List(Vec<Rc<IrNode>>),
    Dict(Vec<(Rc<IrNode>, Rc<IrNode>)>),
    Object {
        fields: Vec<(String, Rc<IrNode>)>,
        sealed: bool,
    },
    Property {
        target: Rc<IrNode>,
        name: String,
    },
    Index {
        target: Rc<IrNode>,
        key: Rc<IrNode>,
    },
    If {
        condition: Rc<IrNode>,
        then_branch: Rc<IrNode>,
        else_branch: Option<Rc<IrNode>>,
    },
    And(Rc<IrNode>, Rc<IrNode>),
    Or(Rc<IrNode>, Rc<IrNode>),
    Loop(Rc<IrNode>),
    Break(Option<Rc<IrNode>>),
    Continue,
    Return(Option<Rc<IrNode>>),
    /// Body compiled as a zero-parameter function.
    Launch(Rc<FunctionDef>),
    Await(Rc<IrNode>),
    Ref(Rc<IrNode>),
    Deref(Rc<IrNode>),
}
