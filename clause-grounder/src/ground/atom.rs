//! Ground atoms are predicates applied to concrete constants, each
//! carrying a scalar truth value in [0, 1].  An atom is either
//! observed (its value is fixed by the fact store) or a random
//! variable (its value is owned and mutated by the solver).
//!
//! The fact store guarantees at most one logical atom per
//! `(predicate, arguments)` key within a query session; that key is
//! reified here as [`AtomKey`] so downstream indices never depend on
//! object identity.

use super::Constant;
use std::fmt;
use std::sync::Arc;

/// A named relation with a fixed arity.
///
/// Predicates are compared by name and arity; creating the "same"
/// predicate twice yields equal (if not pointer-identical) values.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Predicate {
    name: String,
    arity: usize,
}

impl Predicate {
    #[must_use]
    pub fn new(name: &str, arity: usize) -> Arc<Self> {
        assert!(arity > 0);
        Arc::new(Predicate {
            name: name.into(),
            arity,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.arity
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

/// Whether an atom's value is pinned by the fact store or free for
/// the solver to move.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AtomKind {
    Observed,
    RandomVariable,
}

/// The deduplication key for a ground atom: the predicate and its
/// concrete arguments, without the (mutable) truth value.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct AtomKey {
    predicate: Arc<Predicate>,
    arguments: Vec<Constant>,
}

impl AtomKey {
    #[must_use]
    pub fn new(predicate: Arc<Predicate>, arguments: Vec<Constant>) -> Self {
        assert_eq!(predicate.arity(), arguments.len());
        AtomKey {
            predicate,
            arguments,
        }
    }

    #[must_use]
    pub fn predicate(&self) -> &Arc<Predicate> {
        &self.predicate
    }

    #[must_use]
    pub fn arguments(&self) -> &[Constant] {
        &self.arguments
    }
}

impl fmt::Display for AtomKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(", self.predicate.name())?;
        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

/// A predicate applied to concrete constants, with a current truth
/// value in [0, 1].
#[derive(Clone, Debug, PartialEq)]
pub struct GroundAtom {
    key: AtomKey,
    value: f32,
    kind: AtomKind,
}

impl GroundAtom {
    /// Returns an atom whose value is fixed by the fact store.
    #[must_use]
    pub fn observed(predicate: Arc<Predicate>, arguments: Vec<Constant>, value: f32) -> Self {
        Self::new(predicate, arguments, value, AtomKind::Observed)
    }

    /// Returns an atom whose value the solver owns.
    #[must_use]
    pub fn random_variable(
        predicate: Arc<Predicate>,
        arguments: Vec<Constant>,
        value: f32,
    ) -> Self {
        Self::new(predicate, arguments, value, AtomKind::RandomVariable)
    }

    fn new(predicate: Arc<Predicate>, arguments: Vec<Constant>, value: f32, kind: AtomKind) -> Self {
        assert!((0.0..=1.0).contains(&value));
        GroundAtom {
            key: AtomKey::new(predicate, arguments),
            value,
            kind,
        }
    }

    #[must_use]
    pub fn key(&self) -> &AtomKey {
        &self.key
    }

    #[must_use]
    pub fn predicate(&self) -> &Arc<Predicate> {
        self.key.predicate()
    }

    #[must_use]
    pub fn arguments(&self) -> &[Constant] {
        self.key.arguments()
    }

    #[must_use]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Overwrites the atom's value.  Only meaningful for random
    /// variables; the solver calls this when syncing a solved state
    /// back into atoms.
    pub fn set_value(&mut self, value: f32) {
        assert!((0.0..=1.0).contains(&value));
        self.value = value;
    }

    #[must_use]
    pub fn kind(&self) -> AtomKind {
        self.kind
    }

    #[must_use]
    pub fn is_random_variable(&self) -> bool {
        self.kind == AtomKind::RandomVariable
    }
}

impl fmt::Display for GroundAtom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

#[test]
fn test_atom_key_identity() {
    let friends = Predicate::new("Friends", 2);
    let a = AtomKey::new(
        friends.clone(),
        vec![Constant::int(1), Constant::int(2)],
    );
    let b = AtomKey::new(
        friends.clone(),
        vec![Constant::int(1), Constant::int(2)],
    );
    let c = AtomKey::new(
        friends.clone(),
        vec![Constant::int(2), Constant::int(1)],
    );

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(format!("{}", a), "Friends(1, 2)");
}

#[test]
fn test_atom_kinds() {
    let knows = Predicate::new("Knows", 1);
    let obs = GroundAtom::observed(knows.clone(), vec![Constant::int(7)], 0.25);
    let rv = GroundAtom::random_variable(knows.clone(), vec![Constant::int(7)], 0.5);

    assert!(!obs.is_random_variable());
    assert!(rv.is_random_variable());
    // Same key regardless of kind: the fact store decides which
    // kind a key resolves to, not the key itself.
    assert_eq!(obs.key(), rv.key());
}

#[test]
#[should_panic]
fn test_value_range_checked() {
    let p = Predicate::new("P", 1);
    let _ = GroundAtom::observed(p, vec![Constant::int(0)], 1.5);
}
