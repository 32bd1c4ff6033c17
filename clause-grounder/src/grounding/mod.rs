//! The grounding engine: runs a rule's conjunctive query against a
//! fact store and turns each surviving row into a [`GroundRule`].
//!
//! Per-row work follows a fixed check order that callers must be
//! able to rely on, since it decides which atoms ever get
//! materialized: grounding-only literals are evaluated on raw
//! constants first (no atom is allocated for them), standard
//! literals are then resolved with a cheap per-atom trivial check,
//! and only a row that survives the final worst-case trivial check
//! may raise its queued access violations.
//!
//! Rows are processed in batches, each batch fanned out over rayon.
//! Results are folded back in row order, so the sink observes a
//! deterministic sequence for a given store.

mod ground_rule;

pub use ground_rule::GroundRule;

use crate::database::Database;
use crate::formula::{Argument, GroundingOnlyLiteral, Literal};
use crate::ground::{AtomKey, Constant, GroundAtom, Variable};
use crate::rule::Rule;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Dissatisfaction at or below this is treated as provably zero.
pub const TRIVIAL_EPSILON: f32 = 1e-6;

/// Default number of query rows grounded per parallel batch.
pub const DEFAULT_BATCH_SIZE: usize = 4096;

#[derive(Debug, Error, PartialEq)]
pub enum GroundingError {
    /// A non-trivial ground rule needed atoms the store never
    /// authorized.
    #[error("rule [{rule}] read unauthorized atoms: {atoms}")]
    AccessViolation { rule: String, atoms: String },
}

/// What to do when a non-trivial ground rule trips an access
/// violation.  Either way the offending ground rule is dropped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ViolationPolicy {
    /// Abort grounding with [`GroundingError::AccessViolation`].
    Error,
    /// Log one warning per rule and skip the offending rows.
    WarnOnce,
}

/// Counters for one grounding run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GroundingStats {
    /// Query rows pulled from the fact store.
    pub rows: usize,
    /// Ground rules handed to the sink.
    pub ground_rules: usize,
    /// Rows dropped as provably satisfied (including rows filtered
    /// by grounding-only literals).
    pub trivial_rows: usize,
    /// Rows dropped for access violations under
    /// [`ViolationPolicy::WarnOnce`].
    pub violating_rows: usize,
}

impl GroundingStats {
    fn absorb(&mut self, other: &GroundingStats) {
        self.rows += other.rows;
        self.ground_rules += other.ground_rules;
        self.trivial_rows += other.trivial_rows;
        self.violating_rows += other.violating_rows;
    }
}

/// Reusable per-worker buffers for [`ground_row`].
#[derive(Debug, Default)]
pub struct GroundingScratch {
    arguments: Vec<Constant>,
    pos_atoms: Vec<GroundAtom>,
    neg_atoms: Vec<GroundAtom>,
    violations: Vec<AtomKey>,
}

fn substitute(
    arguments: &[Argument],
    columns: &HashMap<Variable, usize>,
    row: &[Constant],
    out: &mut Vec<Constant>,
) {
    out.clear();
    for argument in arguments {
        match argument {
            Argument::Constant(c) => out.push(c.clone()),
            Argument::Variable(v) => out.push(row[columns[v]].clone()),
        }
    }
}

fn join_keys(keys: &[AtomKey]) -> String {
    let rendered: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    rendered.join(", ")
}

/// Grounds one query row.  `Ok(None)` means the row was filtered:
/// a grounding-only literal failed, or the instance is provably
/// satisfied, or it has no random variables to optimize over.
///
/// # Errors
///
/// Returns `Err` when the (non-trivial) instance needed atoms the
/// store never authorized.
pub fn ground_row(
    rule: &Arc<Rule>,
    columns: &HashMap<Variable, usize>,
    row: &[Constant],
    db: &(impl Database + ?Sized),
    scratch: &mut GroundingScratch,
) -> Result<Option<GroundRule>, GroundingError> {
    scratch.pos_atoms.clear();
    scratch.neg_atoms.clear();
    scratch.violations.clear();

    // Grounding-only literals first: they only look at constants,
    // so a failing one filters the row before any atom exists.
    for literal in rule.clause().grounding_only_literals() {
        if !grounding_only_holds(literal, columns, row, &mut scratch.arguments) {
            return Ok(None);
        }
    }

    for (positive, literals) in &[
        (true, rule.clause().pos_literals()),
        (false, rule.clause().neg_literals()),
    ] {
        for literal in literals.iter() {
            match resolve_literal(literal, *positive, columns, row, db, scratch) {
                LiteralOutcome::Trivial => return Ok(None),
                LiteralOutcome::Resolved => {}
            }
        }
    }

    let ground = GroundRule::new(
        rule.clone(),
        scratch.pos_atoms.clone(),
        scratch.neg_atoms.clone(),
    );
    if !ground.has_random_variable() {
        return Ok(None);
    }
    if ground.worst_case_dissatisfaction() <= TRIVIAL_EPSILON {
        return Ok(None);
    }

    // Queued violations only surface now that the instance is known
    // to be non-trivial.
    if !scratch.violations.is_empty() {
        return Err(GroundingError::AccessViolation {
            rule: rule.to_string(),
            atoms: join_keys(&scratch.violations),
        });
    }

    Ok(Some(ground))
}

enum LiteralOutcome {
    Resolved,
    Trivial,
}

fn resolve_literal(
    literal: &Literal,
    positive: bool,
    columns: &HashMap<Variable, usize>,
    row: &[Constant],
    db: &(impl Database + ?Sized),
    scratch: &mut GroundingScratch,
) -> LiteralOutcome {
    substitute(&literal.arguments, columns, row, &mut scratch.arguments);
    let resolution = db.resolve(&literal.predicate, &scratch.arguments);
    if resolution.violation {
        scratch.violations.push(resolution.atom.key().clone());
    }

    // A fixed value can satisfy its literal outright: a positive
    // literal at 0 or a negative literal at 1 zeroes the whole
    // conjunction.  Random variables get no such shortcut, their
    // contribution depends on the solver.
    if !resolution.atom.is_random_variable() {
        let value = resolution.atom.value();
        if positive && value <= TRIVIAL_EPSILON {
            return LiteralOutcome::Trivial;
        }
        if !positive && value >= 1.0 - TRIVIAL_EPSILON {
            return LiteralOutcome::Trivial;
        }
    }

    if positive {
        scratch.pos_atoms.push(resolution.atom);
    } else {
        scratch.neg_atoms.push(resolution.atom);
    }

    LiteralOutcome::Resolved
}

fn grounding_only_holds(
    literal: &GroundingOnlyLiteral,
    columns: &HashMap<Variable, usize>,
    row: &[Constant],
    arguments: &mut Vec<Constant>,
) -> bool {
    substitute(&literal.arguments, columns, row, arguments);
    let holds = literal.predicate.evaluate(&arguments[0], &arguments[1]);

    holds == literal.positive
}

/// Grounds `rule` against `db`, feeding each surviving ground rule
/// to `sink` in row order.
///
/// # Errors
///
/// Returns `Err` on an access violation under
/// [`ViolationPolicy::Error`].
pub fn ground_batches(
    rule: &Arc<Rule>,
    db: &(impl Database + ?Sized),
    policy: ViolationPolicy,
    batch_size: usize,
    mut sink: impl FnMut(GroundRule),
) -> Result<GroundingStats, GroundingError> {
    let query = rule.clause().query();
    let rows = db.grounding_rows(query);
    let columns: HashMap<Variable, usize> = rows
        .columns
        .iter()
        .enumerate()
        .map(|(i, v)| (v.clone(), i))
        .collect();

    let batch_size = batch_size.max(1);
    let mut iter = rows.rows;
    let mut stats = GroundingStats::default();
    let mut warned = false;
    loop {
        let batch: Vec<Vec<Constant>> = iter.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }

        stats.rows += batch.len();
        let results: Vec<Result<Option<GroundRule>, GroundingError>> = batch
            .par_iter()
            .map_init(GroundingScratch::default, |scratch, row| {
                ground_row(rule, &columns, row, db, scratch)
            })
            .collect();

        for result in results {
            match result {
                Ok(Some(ground)) => {
                    stats.ground_rules += 1;
                    sink(ground);
                }
                Ok(None) => stats.trivial_rows += 1,
                Err(e) => match policy {
                    ViolationPolicy::Error => return Err(e),
                    ViolationPolicy::WarnOnce => {
                        stats.violating_rows += 1;
                        if !warned {
                            warned = true;
                            warn!(error = %e, "skipping rows with unauthorized atom accesses");
                        }
                    }
                },
            }
        }
    }

    debug!(
        rule = %rule,
        rows = stats.rows,
        ground_rules = stats.ground_rules,
        trivial = stats.trivial_rows,
        violating = stats.violating_rows,
        "grounding complete"
    );
    Ok(stats)
}

/// Grounds every rule in `rules`, accumulating stats.
///
/// # Errors
///
/// Same conditions as [`ground_batches`].
pub fn ground_all(
    rules: &[Arc<Rule>],
    db: &(impl Database + ?Sized),
    policy: ViolationPolicy,
    batch_size: usize,
    mut sink: impl FnMut(GroundRule),
) -> Result<GroundingStats, GroundingError> {
    let mut total = GroundingStats::default();
    for rule in rules {
        let stats = ground_batches(rule, db, policy, batch_size, &mut sink)?;
        total.absorb(&stats);
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryDatabase;
    use crate::formula::{Formula, GroundingOnlyPredicate};
    use crate::ground::Predicate;

    fn implication(a: &Arc<Predicate>, b: &Arc<Predicate>) -> Arc<Rule> {
        let formula = Formula::implies(
            Formula::atom(a, vec![Argument::var("x")]),
            Formula::atom(b, vec![Argument::var("x")]),
        );

        Rule::new_weighted(formula, 2.0, false).expect("clausal")
    }

    #[test]
    fn test_grounds_observed_implication() {
        let a = Predicate::new("TestGndA", 1);
        let b = Predicate::new("TestGndB", 1);
        let rule = implication(&a, &b);

        let mut db = MemoryDatabase::new();
        db.observe(&a, vec![Constant::int(1)], 0.9);
        db.declare_target(&b, vec![Constant::int(1)], 0.2);

        let mut out = Vec::new();
        let stats = ground_batches(&rule, &db, ViolationPolicy::Error, 16, |g| out.push(g))
            .expect("grounds");

        assert_eq!(stats.rows, 1);
        assert_eq!(stats.ground_rules, 1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].pos_atoms().len(), 1);
        assert_eq!(out[0].neg_atoms().len(), 1);
        assert!((out[0].dissatisfaction() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_trivial_rows_filtered() {
        // A(1) observed at 0 satisfies the positive literal outright;
        // A(2) at 1 with B(2) observed at 1 satisfies the negative
        // literal.  Only A(3) => B(3) survives.
        let a = Predicate::new("TestTrivA", 1);
        let b = Predicate::new("TestTrivB", 1);
        let rule = implication(&a, &b);

        let mut db = MemoryDatabase::new();
        db.observe(&a, vec![Constant::int(1)], 0.0);
        db.observe(&a, vec![Constant::int(2)], 1.0);
        db.observe(&b, vec![Constant::int(2)], 1.0);
        db.observe(&a, vec![Constant::int(3)], 1.0);
        db.declare_target(&b, vec![Constant::int(3)], 0.0);
        db.declare_target(&b, vec![Constant::int(1)], 0.5);

        let mut out = Vec::new();
        let stats = ground_batches(&rule, &db, ViolationPolicy::Error, 16, |g| out.push(g))
            .expect("grounds");

        assert_eq!(stats.rows, 3);
        assert_eq!(stats.trivial_rows, 2);
        assert_eq!(stats.ground_rules, 1);
        assert_eq!(out[0].pos_atoms()[0].arguments(), &[Constant::int(3)]);
    }

    #[test]
    fn test_no_random_variable_filtered() {
        let a = Predicate::new("TestNoRvA", 1);
        let b = Predicate::new("TestNoRvB", 1);
        let rule = implication(&a, &b);

        let mut db = MemoryDatabase::new();
        db.observe(&a, vec![Constant::int(1)], 0.9);
        db.observe(&b, vec![Constant::int(1)], 0.2);

        let stats = ground_batches(&rule, &db, ViolationPolicy::Error, 16, |_| {
            panic!("fully observed instance must not reach the sink")
        })
        .expect("grounds");
        assert_eq!(stats.trivial_rows, 1);
    }

    #[test]
    fn test_grounding_only_filters_before_resolution() {
        // Edge(x, y) => #NotEqual(x, y) negates to
        // Edge(x, y) & x == y: the (1, 2) row dies on the helper
        // literal before any atom is resolved, the self-loop row is
        // the only violation candidate.
        let edge = Predicate::new("TestGoEdge", 2);
        let formula = Formula::implies(
            Formula::atom(&edge, vec![Argument::var("x"), Argument::var("y")]),
            Formula::grounding_only(
                GroundingOnlyPredicate::NotEqual,
                vec![Argument::var("x"), Argument::var("y")],
            ),
        );
        let rule = Rule::new_weighted(formula, 1.0, false).expect("clausal");

        let mut db = MemoryDatabase::new();
        db.declare_target(&edge, vec![Constant::int(1), Constant::int(1)], 0.5);
        db.declare_target(&edge, vec![Constant::int(1), Constant::int(2)], 0.5);

        let mut out = Vec::new();
        let stats = ground_batches(&rule, &db, ViolationPolicy::Error, 16, |g| out.push(g))
            .expect("grounds");

        assert_eq!(stats.rows, 2);
        assert_eq!(stats.trivial_rows, 1);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].pos_atoms()[0].arguments(),
            &[Constant::int(1), Constant::int(1)]
        );
    }

    #[test]
    fn test_violation_policies() {
        // B(1) is neither observed nor a declared target and B is
        // open, so the only row trips an access violation.
        let a = Predicate::new("TestViolA", 1);
        let b = Predicate::new("TestViolB", 1);
        let rule = implication(&a, &b);

        let mut db = MemoryDatabase::new();
        db.observe(&a, vec![Constant::int(1)], 0.9);

        let err = ground_batches(&rule, &db, ViolationPolicy::Error, 16, |_| {})
            .expect_err("violation");
        assert!(matches!(err, GroundingError::AccessViolation { .. }));

        let stats = ground_batches(&rule, &db, ViolationPolicy::WarnOnce, 16, |_| {
            panic!("violating instance must not reach the sink")
        })
        .expect("warn-once grounds");
        assert_eq!(stats.violating_rows, 1);
        assert_eq!(stats.ground_rules, 0);
    }

    #[test]
    fn test_closed_predicate_defaults_to_zero() {
        // With B closed, the unlisted B(1) reads as observed 0: the
        // instance is non-trivial but fully determined, no violation.
        let a = Predicate::new("TestClosedA", 1);
        let b = Predicate::new("TestClosedB", 1);
        let c = Predicate::new("TestClosedC", 1);
        let formula = Formula::implies(
            Formula::and(vec![
                Formula::atom(&a, vec![Argument::var("x")]),
                Formula::atom(&c, vec![Argument::var("x")]),
            ]),
            Formula::atom(&b, vec![Argument::var("x")]),
        );
        let rule = Rule::new_weighted(formula, 1.0, false).expect("clausal");

        let mut db = MemoryDatabase::new();
        db.observe(&a, vec![Constant::int(1)], 0.9);
        db.declare_target(&c, vec![Constant::int(1)], 0.5);
        db.close_predicate(&b);

        let mut out = Vec::new();
        let stats = ground_batches(&rule, &db, ViolationPolicy::Error, 16, |g| out.push(g))
            .expect("grounds");
        assert_eq!(stats.ground_rules, 1);
        assert_eq!(out[0].pos_atoms().len(), 2);
        assert_eq!(out[0].neg_atoms()[0].value(), 0.0);
    }

    #[test]
    fn test_deterministic_counts() {
        let a = Predicate::new("TestDetA", 1);
        let b = Predicate::new("TestDetB", 1);
        let rule = implication(&a, &b);

        let mut db = MemoryDatabase::new();
        for i in 0..100 {
            db.observe(&a, vec![Constant::int(i)], 1.0);
            db.declare_target(&b, vec![Constant::int(i)], 0.0);
        }

        let first = ground_batches(&rule, &db, ViolationPolicy::Error, 7, |_| {}).expect("ok");
        let second = ground_batches(&rule, &db, ViolationPolicy::Error, 7, |_| {}).expect("ok");
        assert_eq!(first, second);
        assert_eq!(first.ground_rules, 100);
    }
}
