// Link step: binds residual free variables to namespace cells

use crate::ir::converter::{CompileError, FreeVars};
use crate::runtime::namespace::Namespace;

/// Binds every free-variable site to the namespace cell of the same name.
///
/// Names the namespace does not define are collected and reported together
/// in a single `Unresolved` error. Linking again against the same namespace
/// is a no-op; a site already bound to another namespace's cell keeps that
/// binding and fails the whole link with `AlreadyLinked` before anything
/// is bound.
pub fn link(free: &FreeVars, namespace: &Namespace) -> Result<(), CompileError> {
    let relinked: Vec<String> = free
        .iter()
        .filter(|(name, sites)| {
            sites.iter().any(|site| match (site.cell(), namespace.cell(name)) {
                (Some(bound), Some(cell)) => !bound.ptr_eq(cell),
                (Some(_), None) => true,
                (None, _) => false,
            })
        })
        .map(|(name, _)| name.clone())
        .collect();
    if !relinked.is_empty() {
        log::warn!("link refused, names bound elsewhere: {:?}", relinked);
        return Err(CompileError::AlreadyLinked { names: relinked });
    }

    let mut unresolved = Vec::new();
    let mut bound = 0;
    for (name, sites) in free.iter() {
        match namespace.cell(name) {
            Some(cell) => {
                for site in sites {
                    site.bind(cell.clone());
                }
                bound += 1;
            }
            None => unresolved.push(name.clone()),
        }
    }
    if !unresolved.is_empty() {
        log::debug!("link failed, unresolved: {:?}", unresolved);
        return Err(CompileError::Unresolved { names: unresolved });
    }
    log::debug!("linked {} global name(s)", bound);
    Ok(())
}
