//! Weighted first-order rules describe soft constraints over a
//! relational fact base: each rule is a clause whose violation costs
//! its weight, scaled by how badly the clause is violated under a
//! continuous [0, 1] interpretation of its atoms.  This crate owns
//! the rule language surface (constants, atoms, formulas, rules) and
//! the grounding engine that expands a rule against a fact store,
//! one variable substitution at a time.
//!
//! The fact store itself is an external collaborator: anything that
//! can answer a conjunctive query over the positive literals of a
//! clause and resolve `(predicate, constants)` pairs to ground atoms
//! can drive grounding through the [`database::Database`] trait.  An
//! in-memory implementation is provided for tests and small models.
//!
//! Grounding never materializes the full set of substitutions.  Rows
//! stream out of the fact store, trivially-satisfied rows are dropped
//! as early and as cheaply as possible, and the surviving ground
//! rules are handed to a caller-provided sink.

pub mod database;
pub mod formula;
pub mod ground;
pub mod grounding;
pub mod rule;

pub use database::AtomResolution;
pub use database::Database;
pub use database::MemoryDatabase;
pub use database::QueryRows;
pub use formula::Argument;
pub use formula::Formula;
pub use formula::GroundingOnlyPredicate;
pub use formula::NegatedClause;
pub use ground::AtomKey;
pub use ground::AtomKind;
pub use ground::Constant;
pub use ground::GroundAtom;
pub use ground::Predicate;
pub use ground::Variable;
pub use grounding::ground_all;
pub use grounding::ground_batches;
pub use grounding::GroundRule;
pub use grounding::GroundingError;
pub use grounding::GroundingScratch;
pub use grounding::GroundingStats;
pub use grounding::ViolationPolicy;
pub use rule::lookup_rule;
pub use rule::Rule;
pub use rule::RuleError;
