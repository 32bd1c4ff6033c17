//! The fact store the grounding engine runs against.
//!
//! Two capabilities matter: enumerating every substitution that
//! satisfies a clause's positive literals (the grounding query), and
//! resolving one fully-substituted atom to a value plus its
//! observed/random-variable classification.  [`MemoryDatabase`] is
//! the obvious hash-map implementation with a nested-loop join; the
//! query plan is criminally bad, but grounding cost is dominated by
//! term generation downstream and the join is trivially correct.

use crate::formula::{Argument, GroundingQuery, Literal};
use crate::ground::{AtomKey, Constant, GroundAtom, Predicate, Variable};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// One resolved atom.  `violation` marks an access the store never
/// authorized: the atom belongs to an open predicate but was neither
/// observed nor declared a target, so its value (0) is an artifact
/// of the lookup rather than data.
#[derive(Clone, Debug)]
pub struct AtomResolution {
    pub atom: GroundAtom,
    pub violation: bool,
}

/// A restartable result set for a grounding query.  `columns` names
/// the variable order of every row; callers re-run the query to
/// iterate again.
pub struct QueryRows<'a> {
    pub columns: Vec<Variable>,
    pub rows: Box<dyn Iterator<Item = Vec<Constant>> + Send + 'a>,
}

/// What grounding needs from a fact store.
pub trait Database: Sync {
    /// Enumerates every substitution satisfying all of the query's
    /// positive literals, one row per substitution.
    fn grounding_rows<'a>(&'a self, query: &GroundingQuery) -> QueryRows<'a>;

    /// Resolves one ground atom to a value and classification.
    fn resolve(&self, predicate: &Arc<Predicate>, arguments: &[Constant]) -> AtomResolution;

    /// Whether the predicate is closed: unlisted atoms read as
    /// observed 0 instead of being access violations.
    fn is_closed(&self, predicate: &Arc<Predicate>) -> bool;
}

/// Hash-map backed fact store.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    observations: HashMap<AtomKey, f32>,
    targets: HashMap<AtomKey, f32>,
    closed: HashSet<String>,
    by_predicate: HashMap<String, Vec<AtomKey>>,
}

impl MemoryDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an observed atom with a fixed truth value.
    pub fn observe(&mut self, predicate: &Arc<Predicate>, arguments: Vec<Constant>, value: f32) {
        assert!((0.0..=1.0).contains(&value));
        let key = AtomKey::new(predicate.clone(), arguments);
        self.index(&key);
        self.observations.insert(key, value);
    }

    /// Declares a random-variable atom with an initial value.
    pub fn declare_target(
        &mut self,
        predicate: &Arc<Predicate>,
        arguments: Vec<Constant>,
        value: f32,
    ) {
        assert!((0.0..=1.0).contains(&value));
        let key = AtomKey::new(predicate.clone(), arguments);
        self.index(&key);
        self.targets.insert(key, value);
    }

    /// Marks a predicate closed-world: any atom not explicitly
    /// listed resolves to observed 0.
    pub fn close_predicate(&mut self, predicate: &Arc<Predicate>) {
        self.closed.insert(predicate.name().to_string());
    }

    fn index(&mut self, key: &AtomKey) {
        let atoms = self
            .by_predicate
            .entry(key.predicate().name().to_string())
            .or_insert_with(Vec::new);
        if !atoms.contains(key) {
            atoms.push(key.clone());
        }
    }

    fn atoms_for(&self, predicate: &Arc<Predicate>) -> &[AtomKey] {
        self.by_predicate
            .get(predicate.name())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Extends `binding` to also satisfy `literal` against `key`'s
    /// arguments, or returns `None` on any mismatch.
    fn unify(
        literal: &Literal,
        key: &AtomKey,
        binding: &HashMap<Variable, Constant>,
    ) -> Option<HashMap<Variable, Constant>> {
        if key.predicate() != &literal.predicate {
            return None;
        }

        let mut extended = binding.clone();
        for (argument, constant) in literal.arguments.iter().zip(key.arguments()) {
            match argument {
                Argument::Constant(expected) => {
                    if expected != constant {
                        return None;
                    }
                }
                Argument::Variable(v) => match extended.get(v) {
                    Some(bound) if bound != constant => return None,
                    Some(_) => {}
                    None => {
                        extended.insert(v.clone(), constant.clone());
                    }
                },
            }
        }

        Some(extended)
    }

    fn join(
        &self,
        literals: &[Literal],
        binding: HashMap<Variable, Constant>,
        columns: &[Variable],
        out: &mut BTreeSet<Vec<Constant>>,
    ) {
        match literals.split_first() {
            None => {
                let row: Option<Vec<Constant>> =
                    columns.iter().map(|v| binding.get(v).cloned()).collect();
                // Every column is a positive-literal variable, so a
                // complete join always binds them all.
                out.insert(row.expect("all columns bound"));
            }
            Some((literal, rest)) => {
                for key in self.atoms_for(&literal.predicate) {
                    if let Some(extended) = Self::unify(literal, key, &binding) {
                        self.join(rest, extended, columns, out);
                    }
                }
            }
        }
    }
}

impl Database for MemoryDatabase {
    fn grounding_rows<'a>(&'a self, query: &GroundingQuery) -> QueryRows<'a> {
        // Nested-loop join, deduplicated and sorted so grounding is
        // deterministic regardless of hash-map iteration order.
        let mut rows = BTreeSet::new();
        self.join(&query.positive, HashMap::new(), &query.variables, &mut rows);

        QueryRows {
            columns: query.variables.clone(),
            rows: Box::new(rows.into_iter()),
        }
    }

    fn resolve(&self, predicate: &Arc<Predicate>, arguments: &[Constant]) -> AtomResolution {
        let key = AtomKey::new(predicate.clone(), arguments.to_vec());
        if let Some(value) = self.observations.get(&key) {
            return AtomResolution {
                atom: GroundAtom::observed(predicate.clone(), arguments.to_vec(), *value),
                violation: false,
            };
        }

        if let Some(value) = self.targets.get(&key) {
            return AtomResolution {
                atom: GroundAtom::random_variable(predicate.clone(), arguments.to_vec(), *value),
                violation: false,
            };
        }

        if self.is_closed(predicate) {
            return AtomResolution {
                atom: GroundAtom::observed(predicate.clone(), arguments.to_vec(), 0.0),
                violation: false,
            };
        }

        AtomResolution {
            atom: GroundAtom::random_variable(predicate.clone(), arguments.to_vec(), 0.0),
            violation: true,
        }
    }

    fn is_closed(&self, predicate: &Arc<Predicate>) -> bool {
        self.closed.contains(predicate.name())
    }
}
