//! Dense timestamp labels.
//!
//! A [`Timestamp`] is a fraction `0.d1 d2 d3 ...` written in base 2^32. Labels
//! never end in a zero digit, which makes the derived lexicographic order the
//! numeric order and guarantees that a fresh label always exists strictly
//! between two distinct labels.

use std::fmt;
use std::rc::Rc;

const BASE: u64 = 1 << 32;

/// A point on the dense execution timeline.
///
/// Clone is cheap as the digits are wrapped by `Rc`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Rc<[u32]>);

impl Timestamp {
    /// The origin of every timeline. No timestamp compares below it.
    pub fn origin() -> Self {
        Timestamp(Rc::from(Vec::new()))
    }

    /// Returns true if this is the origin.
    pub fn is_origin(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of digits in the label.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Allocate a label strictly greater than `self` with no upper bound.
    ///
    /// The first digit advances by `stride`; once it saturates the label grows by a digit.
    pub(crate) fn successor(&self, stride: u32) -> Self {
        let stride = u64::from(stride.max(1));
        let mut digits = Vec::with_capacity(self.0.len() + 1);
        for &digit in self.0.iter() {
            let digit = u64::from(digit);
            if digit + stride < BASE {
                digits.push((digit + stride) as u32);
                return Timestamp(digits.into());
            }
            digits.push(digit as u32);
        }
        // Every digit is saturated (or the label is the origin).
        digits.push(stride.min(BASE - 1) as u32);
        Timestamp(digits.into())
    }

    /// Allocate a label strictly between `self` and `upper`.
    ///
    /// The label sits `stride` above `self` at the first digit with room, or halfway
    /// when the gap is narrower, so runs of insertions each after the last consume
    /// the gap linearly instead of halving it. Returns `None` unless `self < upper`.
    pub(crate) fn between(&self, upper: &Self, stride: u32) -> Option<Self> {
        if self >= upper {
            return None;
        }
        let stride = u64::from(stride.max(1));
        let mut digits = Vec::new();
        let mut bounded = true;
        for i in 0.. {
            let lo = self.0.get(i).map_or(0, |d| u64::from(*d));
            let hi = if bounded {
                upper.0.get(i).map_or(0, |d| u64::from(*d))
            } else {
                BASE
            };
            if hi >= lo + 2 {
                digits.push((lo + stride.min((hi - lo) / 2)) as u32);
                return Some(Timestamp(digits.into()));
            }
            digits.push(lo as u32);
            if hi > lo {
                bounded = false;
            }
        }
        unreachable!("labels are finite")
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::origin()
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T(")?;
        for (i, digit) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{:x}", digit)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(digits: &[u32]) -> Timestamp {
        Timestamp(Rc::from(digits.to_vec()))
    }

    #[test]
    fn test_origin_is_minimal() {
        let origin = Timestamp::origin();
        assert!(origin.is_origin());
        assert!(origin < label(&[1]));
        assert!(origin < label(&[0, 1]));
    }

    #[test]
    fn test_successor_strides() {
        let a = Timestamp::origin().successor(16);
        assert_eq!(a, label(&[16]));
        let b = a.successor(16);
        assert_eq!(b, label(&[32]));
        assert!(a < b);
    }

    #[test]
    fn test_successor_saturated_digit_grows() {
        let a = label(&[u32::MAX]);
        let b = a.successor(16);
        assert!(a < b);
        assert_eq!(b.depth(), 2);
    }

    #[test]
    fn test_between_steps_by_stride() {
        let a = label(&[2]);
        assert_eq!(a.between(&label(&[1000]), 16), Some(label(&[18])));
        // Narrow gaps are halved instead.
        assert_eq!(a.between(&label(&[10]), 16), Some(label(&[6])));
    }

    #[test]
    fn test_between_adjacent_digits_descends() {
        let a = label(&[5]);
        let b = label(&[6]);
        let c = a.between(&b, 16).unwrap();
        assert!(a < c && c < b);
        assert_eq!(c.depth(), 2);
    }

    #[test]
    fn test_between_prefix() {
        let a = label(&[5]);
        let b = label(&[5, 1]);
        let c = a.between(&b, 16).unwrap();
        assert!(a < c && c < b);
    }

    #[test]
    fn test_between_rejects_unordered() {
        let a = label(&[5]);
        assert_eq!(a.between(&a, 16), None);
        assert_eq!(label(&[6]).between(&a, 16), None);
    }

    #[test]
    fn test_repeated_insertion_at_same_point_never_exhausts() {
        let lower = label(&[1]);
        let mut upper = label(&[2]);
        for _ in 0..10_000 {
            let mid = lower.between(&upper, 1 << 16).unwrap();
            assert!(lower < mid && mid < upper);
            upper = mid;
        }
    }

    #[test]
    fn test_sequential_insertion_stays_shallow() {
        let upper = label(&[2]);
        let mut current = label(&[1]);
        for _ in 0..100_000 {
            let next = current.between(&upper, 1 << 16).unwrap();
            assert!(current < next && next < upper);
            current = next;
        }
        assert!(current.depth() <= 3);
    }
}
