//! Reduction of a ground rule to a hyperplane over free variables.
//!
//! The clause dissatisfaction `sum(pos) - sum(neg) + 1 - |pos|`
//! becomes `coeffs . x - constant` by giving each positive random
//! variable coefficient `+1`, each negative one `-1`, folding every
//! observed atom's fixed contribution into the constant, and merging
//! duplicate variables.  An observed atom leaves no trace beyond
//! that constant shift, so the hyperplane serializes without any
//! atom identity.

use crate::variables::VariableIndex;
use clause_grounder::GroundRule;

/// `coeffs . x - constant`, with `x` indexed into a
/// [`VariableIndex`].
#[derive(Clone, Debug, PartialEq)]
pub struct Hyperplane {
    coefficients: Vec<f32>,
    variable_indexes: Vec<u32>,
    constant: f32,
}

impl Hyperplane {
    /// Projects `ground` onto its random variables.  Returns `None`
    /// when no random variable survives (a fully-observed instance
    /// has nothing to optimize).
    #[must_use]
    pub fn from_ground_rule(ground: &GroundRule, variables: &mut VariableIndex) -> Option<Self> {
        let mut plane = Hyperplane {
            coefficients: Vec::new(),
            variable_indexes: Vec::new(),
            constant: (ground.pos_atoms().len() as f32) - 1.0,
        };

        for atom in ground.pos_atoms() {
            plane.accumulate(atom, 1.0, variables);
        }
        for atom in ground.neg_atoms() {
            plane.accumulate(atom, -1.0, variables);
        }

        if plane.variable_indexes.is_empty() {
            return None;
        }

        Some(plane)
    }

    fn accumulate(
        &mut self,
        atom: &clause_grounder::GroundAtom,
        coefficient: f32,
        variables: &mut VariableIndex,
    ) {
        if atom.is_random_variable() {
            let index = variables.index_of(atom);
            // The same atom can appear in both polarities (or twice
            // in one); merge rather than emitting duplicate columns.
            match self.variable_indexes.iter().position(|i| *i == index) {
                Some(at) => self.coefficients[at] += coefficient,
                None => {
                    self.variable_indexes.push(index);
                    self.coefficients.push(coefficient);
                }
            }
        } else {
            self.constant -= coefficient * atom.value();
        }
    }

    #[must_use]
    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    #[must_use]
    pub fn variable_indexes(&self) -> &[u32] {
        &self.variable_indexes
    }

    /// The folded constant: dissatisfaction is
    /// `max(0, coeffs . x - constant)`.
    #[must_use]
    pub fn constant(&self) -> f32 {
        self.constant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clause_grounder::{Constant, GroundAtom, Predicate, Rule};
    use clause_grounder::{Argument, Formula};
    use std::sync::Arc;

    fn any_rule() -> Arc<Rule> {
        let a = Predicate::new("TestHpA", 1);
        let b = Predicate::new("TestHpB", 1);
        let formula = Formula::implies(
            Formula::atom(&a, vec![Argument::var("x")]),
            Formula::atom(&b, vec![Argument::var("x")]),
        );

        Rule::new_weighted(formula, 2.0, false).expect("clausal")
    }

    #[test]
    fn test_observed_folds_into_constant() {
        // pos = [A(1) observed 0.9], neg = [B(1) rv 0.2]:
        // dissatisfaction 0.9 - b reads as -1 * b - (-0.9).
        let a = Predicate::new("TestHpA", 1);
        let b = Predicate::new("TestHpB", 1);
        let ground = GroundRule::new(
            any_rule(),
            vec![GroundAtom::observed(a, vec![Constant::int(1)], 0.9)],
            vec![GroundAtom::random_variable(b, vec![Constant::int(1)], 0.2)],
        );

        let mut variables = VariableIndex::new();
        let plane = Hyperplane::from_ground_rule(&ground, &mut variables).expect("has rv");
        assert_eq!(plane.coefficients(), &[-1.0]);
        assert_eq!(plane.variable_indexes(), &[0]);
        assert!((plane.constant() - (-0.9)).abs() < 1e-6);
        assert_eq!(variables.len(), 1);
    }

    #[test]
    fn test_duplicate_atom_merges() {
        // The same random variable positive and negative cancels to
        // coefficient 0 but keeps its column.
        let b = Predicate::new("TestHpDup", 1);
        let atom = GroundAtom::random_variable(b, vec![Constant::int(1)], 0.5);
        let ground = GroundRule::new(any_rule(), vec![atom.clone()], vec![atom]);

        let mut variables = VariableIndex::new();
        let plane = Hyperplane::from_ground_rule(&ground, &mut variables).expect("has rv");
        assert_eq!(plane.coefficients(), &[0.0]);
        assert_eq!(variables.len(), 1);
    }

    #[test]
    fn test_fully_observed_yields_none() {
        let a = Predicate::new("TestHpObs", 1);
        let ground = GroundRule::new(
            any_rule(),
            vec![GroundAtom::observed(a, vec![Constant::int(1)], 0.9)],
            vec![],
        );

        let mut variables = VariableIndex::new();
        assert!(Hyperplane::from_ground_rule(&ground, &mut variables).is_none());
    }
}
