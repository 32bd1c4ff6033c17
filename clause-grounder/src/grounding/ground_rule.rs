//! One fully-instantiated rule: the negated clause's literals with
//! every variable replaced by a constant and every atom resolved.

use crate::ground::GroundAtom;
use crate::rule::Rule;
use std::fmt;
use std::sync::Arc;

/// A ground instance of a rule's negated clause.  The atoms keep
/// the clause's polarity split: positives push dissatisfaction up,
/// negatives pull it down.
#[derive(Clone, Debug)]
pub struct GroundRule {
    rule: Arc<Rule>,
    pos_atoms: Vec<GroundAtom>,
    neg_atoms: Vec<GroundAtom>,
}

impl GroundRule {
    #[must_use]
    pub fn new(rule: Arc<Rule>, pos_atoms: Vec<GroundAtom>, neg_atoms: Vec<GroundAtom>) -> Self {
        GroundRule {
            rule,
            pos_atoms,
            neg_atoms,
        }
    }

    #[must_use]
    pub fn rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    #[must_use]
    pub fn pos_atoms(&self) -> &[GroundAtom] {
        &self.pos_atoms
    }

    #[must_use]
    pub fn neg_atoms(&self) -> &[GroundAtom] {
        &self.neg_atoms
    }

    /// How far the current atom values are from satisfying the rule:
    /// `max(0, sum(pos) - sum(neg) + 1 - |pos|)`.
    #[must_use]
    pub fn dissatisfaction(&self) -> f32 {
        let pos: f32 = self.pos_atoms.iter().map(GroundAtom::value).sum();
        let neg: f32 = self.neg_atoms.iter().map(GroundAtom::value).sum();
        let raw = pos - neg + 1.0 - self.pos_atoms.len() as f32;

        raw.max(0.0)
    }

    /// The largest dissatisfaction any assignment to this instance's
    /// random variables can reach.  At or below `epsilon` the
    /// instance is trivially satisfied.
    #[must_use]
    pub fn worst_case_dissatisfaction(&self) -> f32 {
        let pos: f32 = self
            .pos_atoms
            .iter()
            .map(|a| if a.is_random_variable() { 1.0 } else { a.value() })
            .sum();
        let neg: f32 = self
            .neg_atoms
            .iter()
            .map(|a| if a.is_random_variable() { 0.0 } else { a.value() })
            .sum();

        pos - neg + 1.0 - self.pos_atoms.len() as f32
    }

    #[must_use]
    pub fn has_random_variable(&self) -> bool {
        self.pos_atoms
            .iter()
            .chain(&self.neg_atoms)
            .any(GroundAtom::is_random_variable)
    }

    /// Enumerates this instance's non-trivial negations: every
    /// alternative obtained by flipping a proper, non-empty subset
    /// of the literals' polarities.
    ///
    /// Flipping the full set recovers (the complement of) the
    /// original and is excluded, as are alternatives without random
    /// variables or without any reachable dissatisfaction.
    #[must_use]
    pub fn negations(&self, epsilon: f32) -> Vec<GroundRule> {
        let atoms: Vec<(&GroundAtom, bool)> = self
            .pos_atoms
            .iter()
            .map(|a| (a, true))
            .chain(self.neg_atoms.iter().map(|a| (a, false)))
            .collect();
        let n = atoms.len();
        assert!(n <= 16, "negation enumeration capped at 16 literals");

        let all_flipped = (1_u32 << n) - 1;
        let mut out = Vec::new();
        for mask in 1..all_flipped {
            let mut pos = Vec::new();
            let mut neg = Vec::new();
            for (bit, (atom, positive)) in atoms.iter().enumerate() {
                let flipped = mask & (1 << bit) != 0;
                if *positive != flipped {
                    pos.push((*atom).clone());
                } else {
                    neg.push((*atom).clone());
                }
            }

            let candidate = GroundRule::new(self.rule.clone(), pos, neg);
            if candidate.has_random_variable()
                && candidate.worst_case_dissatisfaction() > epsilon
            {
                out.push(candidate);
            }
        }

        out
    }
}

impl fmt::Display for GroundRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} :: ", self.rule)?;
        for (i, atom) in self.pos_atoms.iter().enumerate() {
            if i > 0 {
                write!(f, " & ")?;
            }
            write!(f, "{}", atom)?;
        }
        for atom in &self.neg_atoms {
            if !self.pos_atoms.is_empty() {
                write!(f, " & ")?;
            }
            write!(f, "~{}", atom)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{Argument, Formula};
    use crate::ground::{Constant, Predicate};

    fn fixture() -> GroundRule {
        let a = Predicate::new("TestGrA", 1);
        let b = Predicate::new("TestGrB", 1);
        let formula = Formula::implies(
            Formula::atom(&a, vec![Argument::var("x")]),
            Formula::atom(&b, vec![Argument::var("x")]),
        );
        let rule = Rule::new_weighted(formula, 2.0, false).expect("ok");

        GroundRule::new(
            rule,
            vec![GroundAtom::observed(a, vec![Constant::int(1)], 0.9)],
            vec![GroundAtom::random_variable(b, vec![Constant::int(1)], 0.2)],
        )
    }

    #[test]
    fn test_dissatisfaction() {
        // 0.9 - 0.2 + 1 - 1 = 0.7.
        let ground = fixture();
        assert!((ground.dissatisfaction() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_worst_case_treats_rv_adversarially() {
        // The random variable contributes 0 from the negative side,
        // so the worst case is 0.9 - 0 + 1 - 1 = 0.9.
        let ground = fixture();
        assert!((ground.worst_case_dissatisfaction() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_negations_exclude_identity_and_full_flip() {
        // Two literals leave masks 01 and 10; both alternatives are
        // non-trivial.  Flipping only the observed A(1) yields
        // pos=[] neg=[A, B] with worst case
        // 0 - (0.9 + 0) + 1 - 0 = 0.1 > eps; flipping only B(1)
        // yields pos=[A, B] neg=[] with worst case
        // (0.9 + 1) - 0 + 1 - 2 = 0.9 > eps.  The identity (mask 00)
        // and the full complement (mask 11) are never enumerated.
        let ground = fixture();
        let negations = ground.negations(1e-6);
        assert_eq!(negations.len(), 2);
        assert_eq!(negations[0].pos_atoms().len(), 0);
        assert_eq!(negations[0].neg_atoms().len(), 2);
        assert_eq!(negations[1].pos_atoms().len(), 2);
        assert_eq!(negations[1].neg_atoms().len(), 0);
    }
}
