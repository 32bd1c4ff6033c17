//! A few helper predicates get special treatment during grounding:
//! they are not backed by fact-store data and never materialize into
//! ground atoms.  Instead they are evaluated directly against the
//! variable substitution of each query row, which lets the engine
//! discard trivially-satisfied rows before allocating anything.

use crate::ground::Constant;
use std::fmt;

/// The closed set of grounding-only predicates.  All of them are
/// binary and boolean-valued.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum GroundingOnlyPredicate {
    /// True iff both arguments are equal.
    Equal,
    /// True iff the arguments differ.
    NotEqual,
    /// True iff the first argument sorts strictly before the second.
    /// Used to ground only one of a symmetric pair of substitutions.
    NonSymmetric,
}

impl GroundingOnlyPredicate {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            GroundingOnlyPredicate::Equal => "#Equal",
            GroundingOnlyPredicate::NotEqual => "#NotEqual",
            GroundingOnlyPredicate::NonSymmetric => "#NonSymmetric",
        }
    }

    /// All grounding-only predicates take exactly two arguments.
    #[must_use]
    pub fn arity(self) -> usize {
        2
    }

    /// Evaluates the predicate on a fully substituted argument pair.
    #[must_use]
    pub fn evaluate(self, first: &Constant, second: &Constant) -> bool {
        match self {
            GroundingOnlyPredicate::Equal => first == second,
            GroundingOnlyPredicate::NotEqual => first != second,
            GroundingOnlyPredicate::NonSymmetric => first < second,
        }
    }
}

impl fmt::Display for GroundingOnlyPredicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[test]
fn test_truth_tables() {
    let one = Constant::int(1);
    let two = Constant::int(2);

    assert!(GroundingOnlyPredicate::Equal.evaluate(&one, &one));
    assert!(!GroundingOnlyPredicate::Equal.evaluate(&one, &two));

    assert!(GroundingOnlyPredicate::NotEqual.evaluate(&one, &two));
    assert!(!GroundingOnlyPredicate::NotEqual.evaluate(&one, &one));

    assert!(GroundingOnlyPredicate::NonSymmetric.evaluate(&one, &two));
    assert!(!GroundingOnlyPredicate::NonSymmetric.evaluate(&two, &one));
    assert!(!GroundingOnlyPredicate::NonSymmetric.evaluate(&one, &one));
}
