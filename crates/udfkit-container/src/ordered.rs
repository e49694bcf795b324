//! Totally ordered float wrappers usable as set and map keys

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

macro_rules! ordered_float {
    ($name:ident, $float:ty) => {
        /// Float with a total order. `-0.0` is normalized to `0.0` on
        /// construction so both zeros hash and compare equal.
        #[repr(transparent)]
        #[derive(Copy, Clone, Default)]
        pub struct $name(pub $float);

        impl From<$float> for $name {
            fn from(f: $float) -> Self {
                $name(if f == 0.0 { 0.0 } else { f })
            }
        }

        impl From<$name> for $float {
            fn from(v: $name) -> Self {
                v.0
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.cmp(other) == Ordering::Equal
            }
        }

        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.total_cmp(&other.0)
            }
        }

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.to_bits().hash(state);
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

ordered_float!(OrderedF32, f32);
ordered_float!(OrderedF64, f64);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_sorting_with_negatives() {
        let mut values: Vec<OrderedF64> = vec![10.0, -2.0, 5.0, -7.5]
            .into_iter()
            .map(OrderedF64::from)
            .collect();
        values.sort();
        let sorted: Vec<f64> = values.into_iter().map(f64::from).collect();
        assert_eq!(sorted, vec![-7.5, -2.0, 5.0, 10.0]);
    }

    #[test]
    fn test_normalizes_zero() {
        let pos_zero = OrderedF32::from(0.0);
        let neg_zero = OrderedF32::from(-0.0);
        assert_eq!(pos_zero, neg_zero);

        let mut set = HashSet::new();
        set.insert(pos_zero);
        assert!(set.contains(&neg_zero));
    }
}
