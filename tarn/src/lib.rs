// Tarn language runtime
// Compiles tagged expression trees to resolved IR and evaluates them
pub mod config;
pub mod ir;
pub mod runtime;
pub mod tree;

pub use config::{ConfigError, RuntimeConfig};
pub use ir::{compile, link, to_tree, CompileEnv, CompileError, FreeVars, IrNode};
pub use runtime::{evaluate, Namespace, Runtime, RuntimeError, RuntimeStack, Value};
pub use tree::{SourceLocation, Tree, TreeError};

/// Any failure of the compile, link and evaluate pipeline.
#[derive(Debug, thiserror::Error)]
pub enum TarnError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
