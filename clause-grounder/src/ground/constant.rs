//! Rules are written over logical variables; the fact store binds
//! those variables to concrete constants, one query row at a time.
//! Both halves of that mapping live here.

use std::fmt;

/// A concrete value a logical variable can be bound to.
///
/// The fact store decides which representation it hands back; the
/// grounding engine only needs equality, ordering, and hashing, so
/// unique integer ids should be preferred for anything large.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Constant {
    Int(i64),
    Str(String),
}

impl Constant {
    #[must_use]
    pub fn int(value: i64) -> Self {
        Constant::Int(value)
    }

    #[must_use]
    pub fn str(value: &str) -> Self {
        Constant::Str(value.into())
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Constant::Int(value) => write!(f, "{}", value),
            Constant::Str(value) => write!(f, "'{}'", value),
        }
    }
}

/// A logical variable, identified by its name: `x` in one literal of
/// a formula is the same variable as `x` in another.
///
/// The implicit order (by name) gives query rows a canonical column
/// order, so that two executions of the same grounding query bind
/// columns identically.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Variable(String);

impl Variable {
    #[must_use]
    pub fn new(name: &str) -> Self {
        assert!(!name.is_empty());
        Variable(name.into())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[test]
fn test_constant_order() {
    assert!(Constant::int(1) < Constant::int(2));
    assert_eq!(Constant::str("a"), Constant::str("a"));
    assert_ne!(Constant::int(1), Constant::str("1"));
}

#[test]
fn test_variable_identity() {
    assert_eq!(Variable::new("x"), Variable::new("x"));
    assert!(Variable::new("a") < Variable::new("b"));
    assert_eq!(format!("{}", Variable::new("x")), "x");
}
