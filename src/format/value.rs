//! Constraint values used inside capability descriptors.

use super::fraction::Fraction;

/// A value that can be fixed, range, list, or any.
///
/// Used in caps negotiation to express constraints on format parameters.
/// Supports intersection (finding common ground), subset tests, and fixation
/// (choosing a value).
///
/// # Examples
///
/// ```rust
/// use parallax_stabilize::format::CapsValue;
///
/// let fixed: CapsValue<u32> = CapsValue::Fixed(1920);
/// let range: CapsValue<u32> = CapsValue::Range { min: 720, max: 1920 };
///
/// assert_eq!(fixed.intersect(&range), Some(CapsValue::Fixed(1920)));
/// assert!(fixed.is_subset_of(&range));
/// assert_eq!(range.fixate_nearest(&4000), Some(1920));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum CapsValue<T> {
    /// Exact value (fully constrained).
    Fixed(T),
    /// Range of acceptable values (inclusive).
    Range {
        /// Minimum acceptable value.
        min: T,
        /// Maximum acceptable value.
        max: T,
    },
    /// List of acceptable values (ordered by preference, first is best).
    List(Vec<T>),
    /// Any value accepted (unconstrained, or the field is absent).
    #[default]
    Any,
}

impl<T: Clone + Ord> CapsValue<T> {
    /// Check if a value is accepted by this constraint.
    pub fn accepts(&self, value: &T) -> bool {
        match self {
            Self::Fixed(v) => v == value,
            Self::Range { min, max } => value >= min && value <= max,
            Self::List(values) => values.contains(value),
            Self::Any => true,
        }
    }

    /// Intersect two constraints, finding common values.
    ///
    /// Returns `None` if there's no overlap. List order follows `self`.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Any, other) => Some(other.clone()),
            (this, Self::Any) => Some(this.clone()),

            (Self::Fixed(v), other) | (other, Self::Fixed(v)) => {
                other.accepts(v).then(|| Self::Fixed(v.clone()))
            }

            (
                Self::Range {
                    min: min1,
                    max: max1,
                },
                Self::Range {
                    min: min2,
                    max: max2,
                },
            ) => {
                let lo = min1.max(min2);
                let hi = max1.min(max2);
                match lo.cmp(hi) {
                    std::cmp::Ordering::Greater => None,
                    std::cmp::Ordering::Equal => Some(Self::Fixed(lo.clone())),
                    std::cmp::Ordering::Less => Some(Self::Range {
                        min: lo.clone(),
                        max: hi.clone(),
                    }),
                }
            }

            (Self::List(list), other @ Self::Range { .. })
            | (other @ Self::Range { .. }, Self::List(list))
            | (Self::List(list), other @ Self::List(_)) => {
                Self::collapse(list.iter().filter(|v| other.accepts(v)).cloned().collect())
            }
        }
    }

    fn collapse(mut values: Vec<T>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => values.pop().map(Self::Fixed),
            _ => Some(Self::List(values)),
        }
    }

    /// True when every value accepted by `self` is accepted by `other`.
    ///
    /// Ranges are only compared against ranges (or degenerate single-value
    /// ranges against fixed values and lists); a wide range is never
    /// considered a subset of a list.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        match (self, other) {
            (_, Self::Any) => true,
            (Self::Any, _) => false,
            (Self::Fixed(v), other) => other.accepts(v),
            (Self::List(values), other) => values.iter().all(|v| other.accepts(v)),
            (Self::Range { min, max }, Self::Range { min: lo, max: hi }) => min >= lo && max <= hi,
            (Self::Range { min, max }, other) => min == max && other.accepts(min),
        }
    }

    /// Fixate: choose a single value from the constraint.
    ///
    /// Returns the preferred value (first in list, min in range).
    /// Returns `None` for `Any` (cannot fixate without default).
    pub fn fixate(&self) -> Option<T> {
        match self {
            Self::Fixed(v) => Some(v.clone()),
            Self::Range { min, .. } => Some(min.clone()),
            Self::List(values) => values.first().cloned(),
            Self::Any => None,
        }
    }

    /// Fixate with a default value for `Any`.
    pub fn fixate_with_default(&self, default: T) -> T {
        self.fixate().unwrap_or(default)
    }

    /// Fixate to `preferred` if accepted, otherwise to the first choice.
    pub fn fixate_preferring(&self, preferred: &T) -> Option<T> {
        if self.accepts(preferred) {
            Some(preferred.clone())
        } else {
            self.fixate()
        }
    }

    /// Check if this is a fixed value.
    #[inline]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }

    /// Check if this accepts any value.
    #[inline]
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// Get the fixed value if this is fixed.
    #[inline]
    pub fn as_fixed(&self) -> Option<&T> {
        match self {
            Self::Fixed(v) => Some(v),
            _ => None,
        }
    }
}

/// Values with a notion of distance, for nearest-value fixation.
pub trait Nearness: Clone + Ord {
    /// True when `self` is strictly closer to `target` than `other` is.
    fn closer_than(&self, other: &Self, target: &Self) -> bool;
}

impl Nearness for u32 {
    fn closer_than(&self, other: &Self, target: &Self) -> bool {
        self.abs_diff(*target) < other.abs_diff(*target)
    }
}

impl Nearness for Fraction {
    fn closer_than(&self, other: &Self, target: &Self) -> bool {
        Fraction::closer_than(self, other, target)
    }
}

impl<T: Nearness> CapsValue<T> {
    /// Choose the accepted value nearest to `target`.
    ///
    /// Ranges clamp, lists pick the closest entry (earliest on ties), and
    /// `Any` yields the target itself.
    pub fn fixate_nearest(&self, target: &T) -> Option<T> {
        match self {
            Self::Fixed(v) => Some(v.clone()),
            Self::Range { min, max } => Some(target.clone().clamp(min.clone(), max.clone())),
            Self::List(values) => values
                .iter()
                .fold(None::<&T>, |best, v| match best {
                    Some(b) if !v.closer_than(b, target) => Some(b),
                    _ => Some(v),
                })
                .cloned(),
            Self::Any => Some(target.clone()),
        }
    }
}

impl<T: Clone + Ord> From<T> for CapsValue<T> {
    fn from(value: T) -> Self {
        Self::Fixed(value)
    }
}

impl<T: Clone + Ord> From<std::ops::RangeInclusive<T>> for CapsValue<T> {
    fn from(range: std::ops::RangeInclusive<T>) -> Self {
        let (min, max) = range.into_inner();
        Self::Range { min, max }
    }
}

impl<T: Clone + Ord> From<Vec<T>> for CapsValue<T> {
    fn from(values: Vec<T>) -> Self {
        Self::collapse(values).unwrap_or(Self::Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersect_fixed() {
        let a = CapsValue::Fixed(10u32);
        assert_eq!(a.intersect(&CapsValue::Fixed(10)), Some(CapsValue::Fixed(10)));
        assert_eq!(a.intersect(&CapsValue::Fixed(11)), None);
        assert_eq!(a.intersect(&(1..=20).into()), Some(CapsValue::Fixed(10)));
        assert_eq!(a.intersect(&CapsValue::Any), Some(a.clone()));
    }

    #[test]
    fn test_intersect_ranges() {
        let a: CapsValue<u32> = (1..=100).into();
        let b: CapsValue<u32> = (50..=200).into();
        assert_eq!(a.intersect(&b), Some((50..=100).into()));
        let c: CapsValue<u32> = (100..=300).into();
        assert_eq!(a.intersect(&c), Some(CapsValue::Fixed(100)));
        let d: CapsValue<u32> = (101..=300).into();
        assert_eq!(a.intersect(&d), None);
    }

    #[test]
    fn test_intersect_lists_keep_first_order() {
        let a = CapsValue::List(vec![3u32, 2, 1]);
        let b = CapsValue::List(vec![1u32, 2]);
        assert_eq!(a.intersect(&b), Some(CapsValue::List(vec![2, 1])));
        assert_eq!(a.intersect(&(3..=9).into()), Some(CapsValue::Fixed(3)));
    }

    #[test]
    fn test_subset() {
        let range: CapsValue<u32> = (1..=100).into();
        assert!(CapsValue::Fixed(5u32).is_subset_of(&range));
        assert!(CapsValue::List(vec![5u32, 6]).is_subset_of(&range));
        assert!(CapsValue::<u32>::Range { min: 2, max: 3 }.is_subset_of(&range));
        assert!(!range.is_subset_of(&CapsValue::Fixed(5)));
        assert!(range.is_subset_of(&CapsValue::Any));
        assert!(!CapsValue::<u32>::Any.is_subset_of(&range));
        assert!(!range.is_subset_of(&CapsValue::List(vec![1, 2, 3])));
    }

    #[test]
    fn test_fixate_nearest() {
        let range: CapsValue<u32> = (100..=200).into();
        assert_eq!(range.fixate_nearest(&50), Some(100));
        assert_eq!(range.fixate_nearest(&150), Some(150));
        assert_eq!(range.fixate_nearest(&500), Some(200));

        let list = CapsValue::List(vec![480u32, 720, 1080]);
        assert_eq!(list.fixate_nearest(&700), Some(720));
        assert_eq!(list.fixate_nearest(&600), Some(480));
        assert_eq!(CapsValue::<u32>::Any.fixate_nearest(&7), Some(7));
    }

    #[test]
    fn test_fixate_nearest_fraction() {
        let one = Fraction::ONE;
        let range = CapsValue::Range {
            min: Fraction::MIN_POSITIVE,
            max: Fraction::MAX,
        };
        let target = Fraction::new(4, 3).unwrap();
        assert_eq!(range.fixate_nearest(&target), Some(target));
        let list = CapsValue::List(vec![one, Fraction::new(2, 1).unwrap()]);
        assert_eq!(list.fixate_nearest(&target), Some(one));
    }

    #[test]
    fn test_from_vec() {
        assert_eq!(CapsValue::<u32>::from(vec![]), CapsValue::Any);
        assert_eq!(CapsValue::from(vec![4u32]), CapsValue::Fixed(4));
    }
}
