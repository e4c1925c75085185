//! Key predicates for index scans.

use std::fmt;

use crate::tuple::Key;

/// Comparison applied to the key field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateOp {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEq,
    LessThan,
    LessThanOrEq,
}

impl fmt::Display for PredicateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PredicateOp::Equals => "=",
            PredicateOp::NotEquals => "<>",
            PredicateOp::GreaterThan => ">",
            PredicateOp::GreaterThanOrEq => ">=",
            PredicateOp::LessThan => "<",
            PredicateOp::LessThanOrEq => "<=",
        };
        f.write_str(s)
    }
}

/// `key <op> operand`, evaluated against the key field of each tuple.
///
/// # Example
/// ```
/// use blinkdb::index::btree::{IndexPredicate, PredicateOp};
///
/// let p = IndexPredicate::new(PredicateOp::LessThan, 10);
/// assert!(p.matches(9));
/// assert!(!p.matches(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexPredicate {
    op: PredicateOp,
    operand: Key,
}

impl IndexPredicate {
    pub fn new(op: PredicateOp, operand: Key) -> Self {
        Self { op, operand }
    }

    #[inline]
    pub fn op(&self) -> PredicateOp {
        self.op
    }

    #[inline]
    pub fn operand(&self) -> Key {
        self.operand
    }

    pub fn matches(&self, key: Key) -> bool {
        match self.op {
            PredicateOp::Equals => key == self.operand,
            PredicateOp::NotEquals => key != self.operand,
            PredicateOp::GreaterThan => key > self.operand,
            PredicateOp::GreaterThanOrEq => key >= self.operand,
            PredicateOp::LessThan => key < self.operand,
            PredicateOp::LessThanOrEq => key <= self.operand,
        }
    }

    /// Key to start a scan from, for operators bounded below.
    ///
    /// A split inside a run of equal keys leaves copies of a key on the leaf
    /// whose high key it is, and a descent for that key moves past that
    /// leaf. Inclusive bounds therefore descend for the key below the
    /// operand, or from the leftmost leaf when there is none.
    pub(crate) fn start_key(&self) -> Option<Key> {
        match self.op {
            PredicateOp::Equals | PredicateOp::GreaterThanOrEq => self.operand.checked_sub(1),
            PredicateOp::GreaterThan => Some(self.operand),
            _ => None,
        }
    }

    /// True if no tuple after one with `key` can match, given that keys are
    /// scanned in ascending order.
    pub(crate) fn exhausted_at(&self, key: Key) -> bool {
        match self.op {
            PredicateOp::Equals => key > self.operand,
            PredicateOp::LessThan | PredicateOp::LessThanOrEq => !self.matches(key),
            _ => false,
        }
    }
}

impl fmt::Display for IndexPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key {} {}", self.op, self.operand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches() {
        let cases = [
            (PredicateOp::Equals, [false, true, false]),
            (PredicateOp::NotEquals, [true, false, true]),
            (PredicateOp::GreaterThan, [false, false, true]),
            (PredicateOp::GreaterThanOrEq, [false, true, true]),
            (PredicateOp::LessThan, [true, false, false]),
            (PredicateOp::LessThanOrEq, [true, true, false]),
        ];
        for (op, expected) in cases {
            let p = IndexPredicate::new(op, 5);
            let got = [p.matches(4), p.matches(5), p.matches(6)];
            assert_eq!(got, expected, "{}", p);
        }
    }

    #[test]
    fn test_start_key() {
        assert_eq!(IndexPredicate::new(PredicateOp::Equals, 3).start_key(), Some(2));
        assert_eq!(IndexPredicate::new(PredicateOp::GreaterThanOrEq, 3).start_key(), Some(2));
        assert_eq!(IndexPredicate::new(PredicateOp::GreaterThan, 3).start_key(), Some(3));
        assert_eq!(IndexPredicate::new(PredicateOp::Equals, Key::MIN).start_key(), None);
        assert_eq!(IndexPredicate::new(PredicateOp::LessThan, 3).start_key(), None);
        assert_eq!(IndexPredicate::new(PredicateOp::NotEquals, 3).start_key(), None);
    }

    #[test]
    fn test_exhausted_at() {
        let eq = IndexPredicate::new(PredicateOp::Equals, 3);
        assert!(!eq.exhausted_at(2));
        assert!(!eq.exhausted_at(3));
        assert!(eq.exhausted_at(4));

        let lt = IndexPredicate::new(PredicateOp::LessThan, 3);
        assert!(!lt.exhausted_at(2));
        assert!(lt.exhausted_at(3));

        let gt = IndexPredicate::new(PredicateOp::GreaterThan, 3);
        assert!(!gt.exhausted_at(100));
    }

    #[test]
    fn test_display() {
        let p = IndexPredicate::new(PredicateOp::GreaterThanOrEq, -1);
        assert_eq!(format!("{}", p), "key >= -1");
    }
}
