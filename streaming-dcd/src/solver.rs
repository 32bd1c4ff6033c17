//! Dual coordinate descent over a streaming term store.
//!
//! Each pass streams every term once, taking one dual step per
//! term.  Between passes the variables are clamped back to the unit
//! box (unless every step already truncates) and the full objective
//! is re-evaluated with a read-only pass; the loop stops on the
//! objective-change tolerance or the pass cap.

use crate::store::{StoreError, StreamingTermStore};
use tracing::{debug, info};

#[derive(Clone, Debug)]
pub struct DcdOptions {
    pub max_passes: usize,
    /// Objective-change threshold for convergence.
    pub tolerance: f32,
    /// Stop on objective convergence; otherwise always run
    /// `max_passes` passes.
    pub objective_break: bool,
    /// Clamp variables after every dual step instead of once per
    /// pass.
    pub truncate_every_step: bool,
    /// Evaluate the objective before the first pass, for logging.
    pub compute_initial_objective: bool,
}

impl Default for DcdOptions {
    fn default() -> Self {
        DcdOptions {
            max_passes: 200,
            tolerance: 1e-6,
            objective_break: true,
            truncate_every_step: false,
            compute_initial_objective: false,
        }
    }
}

/// What [`DcdSolver::optimize`] did.
#[derive(Clone, Debug)]
pub struct OptimizationReport {
    pub passes: usize,
    pub objective: f32,
    pub term_count: usize,
    pub variable_count: usize,
}

#[derive(Clone, Debug, Default)]
pub struct DcdSolver {
    options: DcdOptions,
}

impl DcdSolver {
    #[must_use]
    pub fn new(options: DcdOptions) -> Self {
        DcdSolver { options }
    }

    /// Runs dual coordinate descent to convergence and syncs the
    /// solved values back into the store's atoms.
    ///
    /// # Errors
    ///
    /// Propagates store failures; the first pass fails if the store
    /// has not been grounded.
    pub fn optimize(&self, store: &mut StreamingTermStore) -> Result<OptimizationReport, StoreError> {
        let truncate = self.options.truncate_every_step;

        let mut objective = if self.options.compute_initial_objective {
            let initial = self.objective(store)?;
            debug!(objective = initial, "initial objective");
            initial
        } else {
            f32::INFINITY
        };

        let mut passes = 0;
        while passes < self.options.max_passes {
            store.pass(|term, weight, values| term.minimize(weight, values, truncate))?;
            if !truncate {
                store.clamp_values();
            }
            passes += 1;

            let previous = objective;
            objective = self.objective(store)?;
            debug!(pass = passes, objective = objective, "dcd pass");
            if self.options.objective_break && (previous - objective).abs() < self.options.tolerance
            {
                break;
            }
        }

        store.sync_atoms();
        let report = OptimizationReport {
            passes,
            objective,
            term_count: store.term_count(),
            variable_count: store.variables().len(),
        };
        info!(
            passes = report.passes,
            objective = report.objective,
            terms = report.term_count,
            variables = report.variable_count,
            "optimization complete"
        );
        Ok(report)
    }

    /// The mean per-term objective, with the dual scale `c` divided
    /// back out.
    fn objective(&self, store: &mut StreamingTermStore) -> Result<f32, StoreError> {
        let count = store.term_count();
        if count == 0 {
            return Ok(0.0);
        }

        let mut total = 0.0_f64;
        store.read_only_pass(|term, weight, values| {
            total += f64::from(term.evaluate(weight, values) / term.c());
        })?;

        Ok((total / count as f64) as f32)
    }
}
