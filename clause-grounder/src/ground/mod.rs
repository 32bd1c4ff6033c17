//! A grounding run manipulates enormous numbers of small values:
//! constants pulled out of query rows, predicates applied to those
//! constants, and the resulting ground atoms.  These types must be
//! cheap to hash, compare, and clone, because they are the keys of
//! every deduplication map downstream (the fact store's atom cache,
//! the term store's variable index).

mod atom;
mod constant;

pub use atom::AtomKey;
pub use atom::AtomKind;
pub use atom::GroundAtom;
pub use atom::Predicate;
pub use constant::Constant;
pub use constant::Variable;
