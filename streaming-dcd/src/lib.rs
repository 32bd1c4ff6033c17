//! Disk-paged hinge-loss objectives and a dual coordinate descent
//! solver over them.
//!
//! Ground rules from [`clause_grounder`] become hyperplane terms
//! `weight * max(0, coeffs . x - constant)^{1 or 2}` over the free
//! variables.  Terms are generated once, serialized to fixed-size
//! page files on disk, and streamed back through a bounded arena on
//! every optimization pass, so the resident set is a page of terms
//! plus one `f32` per variable, independent of how many terms the
//! model grounds out to.
//!
//! Each term's immutable fields live in a fixed page that is written
//! once; its dual (Lagrange) multiplier lives in a parallel volatile
//! page rewritten after every pass.  Passes may shuffle both the
//! page visit order and the order of terms within a page; a
//! per-page shuffle map keeps the volatile write-back aligned with
//! the fixed file.

pub mod generator;
pub mod hyperplane;
pub mod solver;
pub mod store;
pub mod term;
pub mod variables;

pub use generator::LossShape;
pub use generator::TermGenerator;
pub use hyperplane::Hyperplane;
pub use solver::DcdOptions;
pub use solver::DcdSolver;
pub use solver::OptimizationReport;
pub use store::StoreError;
pub use store::StoreOptions;
pub use store::StreamingTermStore;
pub use term::ObjectiveTerm;
pub use variables::VariableIndex;
