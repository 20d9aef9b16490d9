//! Quadruple intermediate representation.

use std::fmt;

/// Four-address instruction: an operator, up to two source operands and a
/// result field. Fields that do not apply stay empty; every operand is a
/// plain string token (a name, a literal, a label, or a count).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quad {
    pub op: String,
    pub arg1: Option<String>,
    pub arg2: Option<String>,
    pub result: Option<String>,
}

impl Quad {
    pub fn new(
        op: impl Into<String>,
        arg1: Option<String>,
        arg2: Option<String>,
        result: Option<String>,
    ) -> Quad {
        Quad {
            op: op.into(),
            arg1,
            arg2,
            result,
        }
    }
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn field(x: &Option<String>) -> &str {
            x.as_deref().unwrap_or("-")
        }
        write!(
            f,
            "({}, {}, {}, {})",
            self.op,
            field(&self.arg1),
            field(&self.arg2),
            field(&self.result)
        )
    }
}
