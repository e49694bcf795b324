use std::collections::BTreeMap;
use std::marker::PhantomData;
use tracing::trace;

use crate::{format_string, Bound, Container, ContainerType, Limit};

/// Multiset of the largest values seen, bounded by a per-row limit.
///
/// Duplicates are retained. Once the element count exceeds the limit the
/// smallest elements are dropped.
pub struct TopKContainer<T: ContainerType, B> {
    counts: BTreeMap<T::Stored, usize>,
    len: usize,
    limit: Limit,
    _bound: PhantomData<fn(B)>,
}

impl<T: ContainerType, B> Default for TopKContainer<T, B> {
    fn default() -> Self {
        Self {
            counts: BTreeMap::new(),
            len: 0,
            limit: Limit::Unset,
            _bound: PhantomData,
        }
    }
}

impl<T: ContainerType, B: Bound> Container for TopKContainer<T, B> {
    fn layout_name() -> String {
        format!("{}_bound_{}", B::type_name(), T::type_name())
    }
}

impl<T: ContainerType, B: Bound> TopKContainer<T, B> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts a value, then evicts the smallest values while over `bound`.
    /// A null value is ignored.
    pub fn push(&mut self, value: Option<T>, bound: B) {
        self.limit = bound.limit();
        let Some(value) = value else {
            return;
        };
        *self.counts.entry(value.to_stored()).or_insert(0) += 1;
        self.len += 1;
        self.evict_overflow();
    }

    pub fn merge(&mut self, other: Self) {
        self.limit = self.limit.combine(other.limit);
        for (value, count) in other.counts {
            *self.counts.entry(value).or_insert(0) += count;
            self.len += count;
        }
        self.evict_overflow();
    }

    fn evict_overflow(&mut self) {
        while self.limit.exceeded_by(self.len) {
            let Some(mut smallest) = self.counts.first_entry() else {
                break;
            };
            trace!(len = self.len, "top-k evicting smallest value");
            *smallest.get_mut() -= 1;
            if *smallest.get() == 0 {
                smallest.remove();
            }
            self.len -= 1;
        }
    }

    /// Values in descending order joined by commas. Consumes the container.
    pub fn output(self) -> String {
        let mut tokens = Vec::with_capacity(self.len);
        for (value, count) in self.counts.iter().rev() {
            let text = format_string(&T::from_stored(value));
            tokens.extend(std::iter::repeat(text).take(*count));
        }
        tokens.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use udfkit_ir::Date;

    #[test]
    fn test_top_two() {
        let mut top = TopKContainer::<i32, i32>::default();
        for v in [5, 1, 9, 3] {
            top.push(Some(v), 2);
            assert!(top.len() <= 2);
        }
        assert_eq!(top.output(), "9,5");
    }

    #[test]
    fn test_duplicates_are_kept() {
        let mut top = TopKContainer::<i64, i64>::default();
        for v in [4, 4, 1, 4] {
            top.push(Some(v), 3);
        }
        assert_eq!(top.output(), "4,4,4");
    }

    #[test]
    fn test_nulls_and_negative_bound() {
        let mut top = TopKContainer::<f64, i64>::default();
        top.push(None, -1);
        top.push(Some(1.5), -1);
        top.push(Some(-2.0), -1);
        top.push(Some(7.0), -1);
        assert_eq!(top.len(), 3);
        assert_eq!(top.output(), "7,1.5,-2");
    }

    #[test]
    fn test_merge_keeps_largest() {
        let mut left = TopKContainer::<i32, i32>::default();
        let mut right = TopKContainer::<i32, i32>::default();
        for v in [5, 1] {
            left.push(Some(v), 2);
        }
        for v in [9, 3] {
            right.push(Some(v), 2);
        }
        left.merge(right);
        assert_eq!(left.output(), "9,5");
    }

    #[test]
    fn test_dates_descend() {
        let mut top = TopKContainer::<Date, i32>::default();
        for day in [3, 1, 2] {
            top.push(Date::from_ymd(2020, 1, day), 5);
        }
        assert_eq!(top.output(), "2020-01-03,2020-01-02,2020-01-01");
        assert_eq!(TopKContainer::<Date, i32>::layout_name(), "int32_bound_date");
    }
}
