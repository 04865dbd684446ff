// Built-in operator table
//
// The table is process-wide, built on first use and never mutated afterwards.
// Intrinsic names resolve without any free-variable record and cannot be rebound.

use crate::runtime::values::Arity;
use indexmap::IndexMap;
use lazy_static::lazy_static;

/// Bumped whenever a name is added, removed or changes meaning.
pub const INTRINSICS_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    Pos,
    Neg,
    Not,
    BitNot,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Break,
    Continue,
    Return,
    Seq,
}

#[derive(Debug, Clone, Copy)]
pub struct IntrinsicSpec {
    pub name: &'static str,
    pub op: Intrinsic,
    pub arity: Arity,
}

impl Intrinsic {
    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    pub fn arity(&self) -> Arity {
        self.spec().arity
    }

    pub fn spec(&self) -> IntrinsicSpec {
        use Intrinsic::*;
        let (name, arity) = match self {
            Pos => ("pos", Arity::Fixed(1)),
            Neg => ("neg", Arity::Fixed(1)),
            Not => ("not", Arity::Fixed(1)),
            BitNot => ("bnot", Arity::Fixed(1)),
            Add => ("add", Arity::Fixed(2)),
            Sub => ("sub", Arity::Fixed(2)),
            Mul => ("mul", Arity::Fixed(2)),
            Div => ("div", Arity::Fixed(2)),
            Mod => ("mod", Arity::Fixed(2)),
            Pow => ("pow", Arity::Fixed(2)),
            BitAnd => ("band", Arity::Fixed(2)),
            BitOr => ("bor", Arity::Fixed(2)),
            BitXor => ("bxor", Arity::Fixed(2)),
            Shl => ("shl", Arity::Fixed(2)),
            Shr => ("shr", Arity::Fixed(2)),
            Eq => ("eq", Arity::Fixed(2)),
            Ne => ("ne", Arity::Fixed(2)),
            Lt => ("lt", Arity::Fixed(2)),
            Le => ("le", Arity::Fixed(2)),
            Gt => ("gt", Arity::Fixed(2)),
            Ge => ("ge", Arity::Fixed(2)),
            Break => ("break", Arity::Range(0, 1)),
            Continue => ("continue", Arity::Fixed(0)),
            Return => ("return", Arity::Range(0, 1)),
            Seq => ("seq", Arity::Variadic(0)),
        };
        IntrinsicSpec {
            name,
            op: *self,
            arity,
        }
    }

    pub fn lookup(name: &str) -> Option<Intrinsic> {
        INTRINSICS.get(name).map(|spec| spec.op)
    }
}

const ALL: [Intrinsic; 25] = [
    Intrinsic::Pos,
    Intrinsic::Neg,
    Intrinsic::Not,
    Intrinsic::BitNot,
    Intrinsic::Add,
    Intrinsic::Sub,
    Intrinsic::Mul,
    Intrinsic::Div,
    Intrinsic::Mod,
    Intrinsic::Pow,
    Intrinsic::BitAnd,
    Intrinsic::BitOr,
    Intrinsic::BitXor,
    Intrinsic::Shl,
    Intrinsic::Shr,
    Intrinsic::Eq,
    Intrinsic::Ne,
    Intrinsic::Lt,
    Intrinsic::Le,
    Intrinsic::Gt,
    Intrinsic::Ge,
    Intrinsic::Break,
    Intrinsic::Continue,
    Intrinsic::Return,
    Intrinsic::Seq,
];

lazy_static! {
    pub static ref INTRINSICS: IndexMap<&'static str, IntrinsicSpec> = {
        log::debug!("building intrinsics table v{}", INTRINSICS_VERSION);
        ALL.iter().map(|op| (op.name(), op.spec())).collect()
    };
}

pub fn is_intrinsic(name: &str) -> bool {
    INTRINSICS.contains_key(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_covers_every_intrinsic() {
        assert_eq!(INTRINSICS.len(), ALL.len());
        for op in ALL {
            assert_eq!(Intrinsic::lookup(op.name()), Some(op));
        }
    }

    #[test]
    fn test_unknown_names() {
        assert!(!is_intrinsic("rest"));
        assert!(!is_intrinsic("let"));
        assert!(is_intrinsic("seq"));
    }
}
