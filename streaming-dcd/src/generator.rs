//! Turns ground rules into serializable objective terms.

use crate::hyperplane::Hyperplane;
use crate::term::ObjectiveTerm;
use crate::variables::VariableIndex;
use clause_grounder::{GroundRule, Rule};
use tracing::debug;

/// How a rule's dissatisfaction is penalized.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LossShape {
    HingeLinear,
    HingeSquared,
}

impl LossShape {
    /// The shape for `rule`, or `None` for unweighted constraints,
    /// which this solver cannot express.
    #[must_use]
    pub fn from_rule(rule: &Rule) -> Option<Self> {
        if !rule.is_weighted() {
            return None;
        }

        if rule.is_squared() {
            Some(LossShape::HingeSquared)
        } else {
            Some(LossShape::HingeLinear)
        }
    }

    #[must_use]
    pub fn is_squared(self) -> bool {
        self == LossShape::HingeSquared
    }
}

/// Stateless term factory; `c` is the dual box-constraint scale
/// every generated term carries.
#[derive(Clone, Copy, Debug)]
pub struct TermGenerator {
    c: f32,
}

impl TermGenerator {
    #[must_use]
    pub fn new(c: f32) -> Self {
        assert!(c > 0.0);
        TermGenerator { c }
    }

    /// Generates the term for one ground rule, interning its random
    /// variables.  Returns `None` for constraint rules, instances
    /// without random variables, and degenerate (all-zero
    /// coefficient) hyperplanes.
    #[must_use]
    pub fn generate(
        &self,
        ground: &GroundRule,
        variables: &mut VariableIndex,
    ) -> Option<ObjectiveTerm> {
        let shape = match LossShape::from_rule(ground.rule()) {
            Some(shape) => shape,
            None => {
                debug!(rule = %ground.rule(), "skipping constraint rule instance");
                return None;
            }
        };

        let plane = Hyperplane::from_ground_rule(ground, variables)?;
        let qii: f32 = plane.coefficients().iter().map(|c| c * c).sum();
        if qii <= 0.0 {
            debug!(ground = %ground, "skipping degenerate hyperplane");
            return None;
        }

        Some(ObjectiveTerm::new(
            shape.is_squared(),
            ground.rule().hash(),
            plane.constant(),
            qii,
            self.c,
            plane.coefficients().to_vec(),
            plane.variable_indexes().to_vec(),
        ))
    }
}
