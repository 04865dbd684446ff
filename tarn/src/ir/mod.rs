// IR module organization
pub mod converter;
pub mod core;
pub mod intrinsics;
pub mod linker;
pub mod printer;

pub use converter::{compile, CompileEnv, CompileError, CompileResult, FreeVars, IrConverter};
pub use self::core::{FunctionDef, GlobalSlot, IrCapture, IrKind, IrLetBinding, IrNode, Variable};
pub use intrinsics::{Intrinsic, INTRINSICS, INTRINSICS_VERSION};
pub use linker::link;
pub use printer::to_tree;
