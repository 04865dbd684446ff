//! Interning of concrete scalar values.
//!
//! Every `Null`, `Boolean`, `Number` and `String` value is created through
//! [`intern`], so two live values with the same raw content are the same
//! allocation. The table only holds weak handles: once the last strong
//! reference to a scalar is dropped its entry is dead and is swept on the
//! next prune.

use crate::runtime::values::Concrete;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ScalarKey {
    Null,
    Boolean(bool),
    /// Raw bit pattern, so `0.0` and `-0.0` stay distinct.
    Number(u64),
    String(String),
}

impl ScalarKey {
    fn of(concrete: &Concrete) -> ScalarKey {
        match concrete {
            Concrete::Null => ScalarKey::Null,
            Concrete::Boolean(b) => ScalarKey::Boolean(*b),
            Concrete::Number(n) => ScalarKey::Number(n.to_bits()),
            Concrete::String(s) => ScalarKey::String(s.clone()),
        }
    }
}

struct Interner {
    table: HashMap<ScalarKey, Weak<Concrete>>,
    inserts_since_prune: usize,
    prune_threshold: usize,
}

impl Default for Interner {
    fn default() -> Self {
        Interner {
            table: HashMap::new(),
            inserts_since_prune: 0,
            prune_threshold: 1024,
        }
    }
}

impl Interner {
    fn intern(&mut self, concrete: Concrete) -> Rc<Concrete> {
        let key = ScalarKey::of(&concrete);
        if let Some(live) = self.table.get(&key).and_then(Weak::upgrade) {
            return live;
        }
        let value = Rc::new(concrete);
        self.table.insert(key, Rc::downgrade(&value));
        self.inserts_since_prune += 1;
        if self.inserts_since_prune >= self.prune_threshold {
            self.prune();
        }
        value
    }

    fn prune(&mut self) {
        let before = self.table.len();
        self.table.retain(|_, weak| weak.strong_count() > 0);
        self.inserts_since_prune = 0;
        log::trace!(
            "intern table pruned {} dead entries ({} live)",
            before - self.table.len(),
            self.table.len()
        );
    }
}

thread_local! {
    static INTERNER: RefCell<Interner> = RefCell::new(Interner::default());
}

/// Returns the shared allocation for `concrete`, creating it if no live one exists.
pub fn intern(concrete: Concrete) -> Rc<Concrete> {
    INTERNER.with(|interner| interner.borrow_mut().intern(concrete))
}

/// Sets how many insertions happen between sweeps of dead entries.
pub fn set_prune_threshold(threshold: usize) {
    INTERNER.with(|interner| interner.borrow_mut().prune_threshold = threshold.max(1));
}

/// Sweeps dead entries now and returns the number of live ones.
pub fn prune() -> usize {
    INTERNER.with(|interner| {
        let mut interner = interner.borrow_mut();
        interner.prune();
        interner.table.len()
    })
}
