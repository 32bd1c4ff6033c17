//! The formula language and its reduction to a grounding clause.
//!
//! A rule's formula is an arbitrary boolean combination of atoms,
//! but the grounding engine only accepts rules whose *negation*
//! reduces to a single conjunctive clause: grounding then amounts to
//! one conjunctive query over the clause's positive literals, and
//! every satisfying substitution names a potential violation of the
//! original rule.  Formulas that need more than one clause, leave a
//! variable unbound, or contain no variables at all are rejected
//! when the rule is built, never at grounding time.

mod grounding_only;

pub use grounding_only::GroundingOnlyPredicate;

use crate::ground::{Constant, Predicate, Variable};
use crate::rule::RuleError;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// An argument position in a (non-ground) atom: either a logical
/// variable or a literal constant.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Argument {
    Variable(Variable),
    Constant(Constant),
}

impl Argument {
    #[must_use]
    pub fn var(name: &str) -> Self {
        Argument::Variable(Variable::new(name))
    }

    #[must_use]
    pub fn constant(value: Constant) -> Self {
        Argument::Constant(value)
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Argument::Variable(v) => write!(f, "{}", v),
            Argument::Constant(c) => write!(f, "{}", c),
        }
    }
}

/// The predicate slot of a formula atom.  Grounding-only predicates
/// are classified here, once, so the engine never re-checks kinds
/// per row.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum PredicateRef {
    Standard(Arc<Predicate>),
    GroundingOnly(GroundingOnlyPredicate),
}

impl fmt::Display for PredicateRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PredicateRef::Standard(p) => write!(f, "{}", p.name()),
            PredicateRef::GroundingOnly(p) => write!(f, "{}", p),
        }
    }
}

/// A predicate applied to arguments, before grounding.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct AtomFormula {
    pub predicate: PredicateRef,
    pub arguments: Vec<Argument>,
}

impl AtomFormula {
    fn arity_matches(&self) -> bool {
        match &self.predicate {
            PredicateRef::Standard(p) => p.arity() == self.arguments.len(),
            PredicateRef::GroundingOnly(p) => p.arity() == self.arguments.len(),
        }
    }

}

impl fmt::Display for AtomFormula {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(", self.predicate)?;
        for (i, argument) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", argument)?;
        }
        write!(f, ")")
    }
}

/// A boolean combination of atoms.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Formula {
    Atom(AtomFormula),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

impl Formula {
    /// An atom over a standard (fact-store backed) predicate.
    #[must_use]
    pub fn atom(predicate: &Arc<Predicate>, arguments: Vec<Argument>) -> Self {
        Formula::Atom(AtomFormula {
            predicate: PredicateRef::Standard(predicate.clone()),
            arguments,
        })
    }

    /// An atom over a grounding-only helper predicate.
    #[must_use]
    pub fn grounding_only(predicate: GroundingOnlyPredicate, arguments: Vec<Argument>) -> Self {
        Formula::Atom(AtomFormula {
            predicate: PredicateRef::GroundingOnly(predicate),
            arguments,
        })
    }

    #[must_use]
    pub fn not(inner: Formula) -> Self {
        Formula::Not(Box::new(inner))
    }

    #[must_use]
    pub fn and(conjuncts: Vec<Formula>) -> Self {
        Formula::And(conjuncts)
    }

    #[must_use]
    pub fn or(disjuncts: Vec<Formula>) -> Self {
        Formula::Or(disjuncts)
    }

    /// `body => head`, i.e. `!body | head`.
    #[must_use]
    pub fn implies(body: Formula, head: Formula) -> Self {
        Formula::Or(vec![Formula::not(body), head])
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Formula::Atom(atom) => write!(f, "{}", atom),
            Formula::Not(inner) => write!(f, "~( {} )", inner),
            Formula::And(children) => write_joined(f, children, " & "),
            Formula::Or(children) => write_joined(f, children, " | "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter, children: &[Formula], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", child)?;
    }
    write!(f, ")")
}

/// A standard literal of the negated clause.  Polarity is carried by
/// which list of [`NegatedClause`] the literal sits in.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Literal {
    pub predicate: Arc<Predicate>,
    pub arguments: Vec<Argument>,
}

/// A grounding-only literal of the negated clause, with its polarity
/// inline since these never join the numeric potential.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct GroundingOnlyLiteral {
    pub predicate: GroundingOnlyPredicate,
    pub arguments: Vec<Argument>,
    pub positive: bool,
}

/// The conjunctive query grounding runs against the fact store: the
/// clause's positive standard literals, plus the sorted set of
/// variables every returned row must bind.
#[derive(Clone, Debug)]
pub struct GroundingQuery {
    pub positive: Vec<Literal>,
    pub variables: Vec<Variable>,
}

/// The single-clause disjunctive normal form of a formula's
/// negation.  The clause is a conjunction: a satisfying substitution
/// makes every positive literal "true-ish" and every negative
/// literal "false-ish", which is exactly a potential violation of
/// the original formula.
#[derive(Clone, Debug)]
pub struct NegatedClause {
    pos_literals: Vec<Literal>,
    neg_literals: Vec<Literal>,
    grounding_only: Vec<GroundingOnlyLiteral>,
    query: GroundingQuery,
}

impl NegatedClause {
    /// Negates `formula` and reduces the negation to one conjunctive
    /// clause.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the negation needs more than one DNF
    /// clause, when a variable appears only outside the positive
    /// standard literals (it would be unbound by the grounding
    /// query), or when the formula is already ground.
    pub fn analyze(formula: &Formula) -> Result<Self, RuleError> {
        let mut clauses = to_dnf(formula, true);
        if clauses.len() != 1 {
            return Err(RuleError::NotClausal {
                clauses: clauses.len(),
            });
        }

        let mut pos_literals = Vec::new();
        let mut neg_literals = Vec::new();
        let mut grounding_only = Vec::new();

        for (positive, atom) in clauses.pop().expect("one clause") {
            if !atom.arity_matches() {
                return Err(RuleError::ArityMismatch {
                    atom: atom.to_string(),
                });
            }

            match atom.predicate {
                PredicateRef::GroundingOnly(predicate) => {
                    grounding_only.push(GroundingOnlyLiteral {
                        predicate,
                        arguments: atom.arguments,
                        positive,
                    });
                }
                PredicateRef::Standard(predicate) => {
                    let literal = Literal {
                        predicate,
                        arguments: atom.arguments,
                    };
                    if positive {
                        pos_literals.push(literal);
                    } else {
                        neg_literals.push(literal);
                    }
                }
            }
        }

        // The grounding query binds exactly the variables of the
        // positive standard literals; everything else must be a
        // subset of those.
        let mut bound = BTreeSet::new();
        for literal in &pos_literals {
            for argument in &literal.arguments {
                if let Argument::Variable(v) = argument {
                    bound.insert(v.clone());
                }
            }
        }

        let mut all = bound.clone();
        for literal in &neg_literals {
            for argument in &literal.arguments {
                if let Argument::Variable(v) = argument {
                    all.insert(v.clone());
                }
            }
        }
        for literal in &grounding_only {
            for argument in &literal.arguments {
                if let Argument::Variable(v) = argument {
                    all.insert(v.clone());
                }
            }
        }

        let unbound: Vec<Variable> = all.difference(&bound).cloned().collect();
        if !unbound.is_empty() {
            return Err(RuleError::UnboundVariables {
                variables: join_variables(&unbound),
            });
        }

        if all.is_empty() {
            return Err(RuleError::GroundFormula);
        }

        let query = GroundingQuery {
            positive: pos_literals.clone(),
            variables: bound.into_iter().collect(),
        };

        Ok(NegatedClause {
            pos_literals,
            neg_literals,
            grounding_only,
            query,
        })
    }

    #[must_use]
    pub fn pos_literals(&self) -> &[Literal] {
        &self.pos_literals
    }

    #[must_use]
    pub fn neg_literals(&self) -> &[Literal] {
        &self.neg_literals
    }

    #[must_use]
    pub fn grounding_only_literals(&self) -> &[GroundingOnlyLiteral] {
        &self.grounding_only
    }

    #[must_use]
    pub fn query(&self) -> &GroundingQuery {
        &self.query
    }
}

fn join_variables(variables: &[Variable]) -> String {
    let names: Vec<&str> = variables.iter().map(Variable::name).collect();
    names.join(", ")
}

/// Expands `formula` (negated iff `negate`) into DNF, represented as
/// a disjunction of conjunctions of `(positive, atom)` literals.
///
/// Rules are small, so the potentially exponential expansion is not
/// a concern; callers reject anything past one clause anyway.
fn to_dnf(formula: &Formula, negate: bool) -> Vec<Vec<(bool, AtomFormula)>> {
    match formula {
        Formula::Atom(atom) => vec![vec![(!negate, atom.clone())]],
        Formula::Not(inner) => to_dnf(inner, !negate),
        Formula::And(children) => {
            if negate {
                // !(a & b) == !a | !b: union of the children's clauses.
                concat_clauses(children, negate)
            } else {
                cross_clauses(children, negate)
            }
        }
        Formula::Or(children) => {
            if negate {
                // !(a | b) == !a & !b: cross product of the children.
                cross_clauses(children, negate)
            } else {
                concat_clauses(children, negate)
            }
        }
    }
}

fn concat_clauses(children: &[Formula], negate: bool) -> Vec<Vec<(bool, AtomFormula)>> {
    let mut clauses = Vec::new();
    for child in children {
        clauses.extend(to_dnf(child, negate));
    }

    clauses
}

fn cross_clauses(children: &[Formula], negate: bool) -> Vec<Vec<(bool, AtomFormula)>> {
    let mut acc: Vec<Vec<(bool, AtomFormula)>> = vec![Vec::new()];
    for child in children {
        let child_clauses = to_dnf(child, negate);
        let mut next = Vec::with_capacity(acc.len() * child_clauses.len());
        for prefix in &acc {
            for clause in &child_clauses {
                let mut merged = prefix.clone();
                merged.extend(clause.iter().cloned());
                next.push(merged);
            }
        }

        acc = next;
    }

    acc
}

#[cfg(test)]
fn implication_fixture() -> (Arc<Predicate>, Arc<Predicate>, Formula) {
    let a = Predicate::new("A", 1);
    let b = Predicate::new("B", 1);
    let formula = Formula::implies(
        Formula::atom(&a, vec![Argument::var("x")]),
        Formula::atom(&b, vec![Argument::var("x")]),
    );

    (a, b, formula)
}

#[test]
fn test_implication_classifies_literals() {
    // !A(x) | B(x) negates to A(x) & !B(x): one positive literal on
    // A, one negative on B.
    let (a, b, formula) = implication_fixture();
    let clause = NegatedClause::analyze(&formula).expect("ok");

    assert_eq!(clause.pos_literals().len(), 1);
    assert_eq!(clause.neg_literals().len(), 1);
    assert_eq!(clause.pos_literals()[0].predicate, a);
    assert_eq!(clause.neg_literals()[0].predicate, b);
    assert_eq!(clause.query().positive.len(), 1);
    assert_eq!(clause.query().variables, vec![Variable::new("x")]);
}

#[test]
fn test_conjunction_is_not_clausal() {
    // !(A(x) & B(x)) is a disjunction of two literals: two DNF
    // clauses once negated again, so the rule A(x) & B(x) must be
    // rejected at construction time.
    let a = Predicate::new("A", 1);
    let b = Predicate::new("B", 1);
    let formula = Formula::and(vec![
        Formula::atom(&a, vec![Argument::var("x")]),
        Formula::atom(&b, vec![Argument::var("x")]),
    ]);

    match NegatedClause::analyze(&formula) {
        Err(RuleError::NotClausal { clauses }) => assert_eq!(clauses, 2),
        other => panic!("expected NotClausal, got {:?}", other),
    }
}

#[test]
fn test_unbound_variable_rejected() {
    // !A(x) | B(x, y) negates to A(x) & !B(x, y); y only appears in
    // the negative literal and would be unbound by the query.
    let a = Predicate::new("A", 1);
    let b = Predicate::new("B", 2);
    let formula = Formula::implies(
        Formula::atom(&a, vec![Argument::var("x")]),
        Formula::atom(&b, vec![Argument::var("x"), Argument::var("y")]),
    );

    match NegatedClause::analyze(&formula) {
        Err(RuleError::UnboundVariables { variables }) => assert_eq!(variables, "y"),
        other => panic!("expected UnboundVariables, got {:?}", other),
    }
}

#[test]
fn test_ground_formula_rejected() {
    let a = Predicate::new("A", 1);
    let formula = Formula::atom(&a, vec![Argument::constant(Constant::int(1))]);

    assert!(matches!(
        NegatedClause::analyze(&formula),
        Err(RuleError::GroundFormula)
    ));
}

#[test]
fn test_grounding_only_literals_split_out() {
    // !Edge(x, y) | #NotEqual(x, y): the helper literal must not
    // join the standard literal lists or the query.
    let edge = Predicate::new("Edge", 2);
    let formula = Formula::implies(
        Formula::atom(&edge, vec![Argument::var("x"), Argument::var("y")]),
        Formula::grounding_only(
            GroundingOnlyPredicate::NotEqual,
            vec![Argument::var("x"), Argument::var("y")],
        ),
    );

    let clause = NegatedClause::analyze(&formula).expect("ok");
    assert_eq!(clause.pos_literals().len(), 1);
    assert_eq!(clause.neg_literals().len(), 0);
    assert_eq!(clause.grounding_only_literals().len(), 1);
    assert!(!clause.grounding_only_literals()[0].positive);
    assert_eq!(clause.query().positive.len(), 1);
}
