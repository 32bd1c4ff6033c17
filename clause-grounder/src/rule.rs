//! Weighted and constraint rules, plus the process-wide registry
//! that maps a rule's integer hash back to the rule itself.
//!
//! Ground objective terms only carry their parent rule's hash: the
//! weight stays on the rule so that reweighting (e.g. by a learning
//! loop) takes effect on the next optimization pass without
//! regenerating any term.  The registry is what makes that
//! indirection safe: a hash stored in a term must resolve to exactly
//! one live rule.

use crate::formula::{Formula, NegatedClause};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};
use thiserror::Error;

/// Why a rule could not be built or registered.
#[derive(Debug, Error, PartialEq)]
pub enum RuleError {
    /// The formula's negation expands to more than one DNF clause.
    #[error("negated formula is not a single clause ({clauses} clauses)")]
    NotClausal { clauses: usize },
    /// An atom's argument count disagrees with its predicate.
    #[error("atom {atom} does not match its predicate's arity")]
    ArityMismatch { atom: String },
    /// Some variables never appear in a positive standard literal.
    #[error("variables not bound by any positive literal: {variables}")]
    UnboundVariables { variables: String },
    /// The formula has no variables at all.
    #[error("formula is already ground; nothing to ground against")]
    GroundFormula,
    /// The weight is NaN or infinite.
    #[error("rule weight {weight} is not finite")]
    InvalidWeight { weight: f32 },
    /// A different rule already registered under the same hash.
    #[error("hash collision: a different rule already owns hash {hash}")]
    HashCollision { hash: i32 },
    /// Tried to set a weight on a constraint rule.
    #[error("constraint rules carry no weight")]
    NotWeighted,
}

/// A first-order rule: a formula, an optional weight, and the
/// grounding clause derived from the formula's negation.
#[derive(Debug)]
pub struct Rule {
    formula: Formula,
    clause: NegatedClause,
    weight: Option<RwLock<f32>>,
    squared: bool,
    hash: i32,
}

impl Rule {
    /// Builds and registers a weighted rule whose dissatisfaction is
    /// penalized linearly (`squared == false`) or quadratically.
    ///
    /// Building the same rule twice returns the already-registered
    /// instance, updated to carry the newly requested weight.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the formula does not reduce to a single
    /// negated clause, when the weight is not finite, or when a
    /// *different* rule already owns this rule's hash.
    pub fn new_weighted(formula: Formula, weight: f32, squared: bool) -> Result<Arc<Rule>, RuleError> {
        if !weight.is_finite() {
            return Err(RuleError::InvalidWeight { weight });
        }

        let clause = NegatedClause::analyze(&formula)?;
        let hash = identity_hash(&formula, squared, true);
        intern(Rule {
            formula,
            clause,
            weight: Some(RwLock::new(weight)),
            squared,
            hash,
        })
    }

    /// Builds and registers an unweighted (hard constraint) rule.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Rule::new_weighted`], minus the weight
    /// check.
    pub fn new_constraint(formula: Formula) -> Result<Arc<Rule>, RuleError> {
        let clause = NegatedClause::analyze(&formula)?;
        let hash = identity_hash(&formula, false, false);
        intern(Rule {
            formula,
            clause,
            weight: None,
            squared: false,
            hash,
        })
    }

    #[must_use]
    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    #[must_use]
    pub fn clause(&self) -> &NegatedClause {
        &self.clause
    }

    /// The rule's current weight, or `None` for constraints.
    #[must_use]
    pub fn weight(&self) -> Option<f32> {
        self.weight
            .as_ref()
            .map(|w| *w.read().expect("weight lock poisoned"))
    }

    /// Overwrites the weight.  Terms generated from this rule pick
    /// the new weight up on their next pass.
    ///
    /// # Errors
    ///
    /// Returns `Err` for constraint rules and non-finite weights.
    pub fn set_weight(&self, weight: f32) -> Result<(), RuleError> {
        if !weight.is_finite() {
            return Err(RuleError::InvalidWeight { weight });
        }

        match &self.weight {
            None => Err(RuleError::NotWeighted),
            Some(lock) => {
                *lock.write().expect("weight lock poisoned") = weight;
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn is_weighted(&self) -> bool {
        self.weight.is_some()
    }

    #[must_use]
    pub fn is_squared(&self) -> bool {
        self.squared
    }

    /// The registry key this rule is stored under.
    #[must_use]
    pub fn hash(&self) -> i32 {
        self.hash
    }

    fn identity(&self) -> (String, bool, bool) {
        (self.formula.to_string(), self.squared, self.is_weighted())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.weight() {
            Some(w) if self.squared => write!(f, "{}: {} ^2", w, self.formula),
            Some(w) => write!(f, "{}: {}", w, self.formula),
            None => write!(f, "{} .", self.formula),
        }
    }
}

/// Looks a registered rule up by hash.
#[must_use]
pub fn lookup_rule(hash: i32) -> Option<Arc<Rule>> {
    registry()
        .read()
        .expect("registry lock poisoned")
        .get(&hash)
        .cloned()
}

fn registry() -> &'static RwLock<HashMap<i32, Arc<Rule>>> {
    static REGISTRY: OnceLock<RwLock<HashMap<i32, Arc<Rule>>>> = OnceLock::new();

    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

fn intern(rule: Rule) -> Result<Arc<Rule>, RuleError> {
    let mut map = registry().write().expect("registry lock poisoned");
    if let Some(existing) = map.get(&rule.hash) {
        if existing.identity() == rule.identity() {
            // Same rule, possibly a new weight: the registered
            // instance adopts it, as a fresh registration would.
            if let (Some(lock), Some(weight)) = (&existing.weight, rule.weight()) {
                *lock.write().expect("weight lock poisoned") = weight;
            }
            return Ok(existing.clone());
        }

        return Err(RuleError::HashCollision { hash: rule.hash });
    }

    let rule = Arc::new(rule);
    map.insert(rule.hash, rule.clone());
    Ok(rule)
}

/// FNV-1a over the rule's textual identity, folded to the 32 bits we
/// ship inside every serialized term.
fn identity_hash(formula: &Formula, squared: bool, weighted: bool) -> i32 {
    let text = format!("{} squared:{} weighted:{}", formula, squared, weighted);
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }

    (hash ^ (hash >> 32)) as i32
}
