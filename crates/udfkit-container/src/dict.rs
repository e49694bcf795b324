use indexmap::map::Entry;
use indexmap::IndexMap;
use std::marker::PhantomData;
use tracing::trace;
use udfkit_ir::Arithmetic;

use crate::{format_pairs, format_string, Container, ContainerType, Limit};

/// Partial aggregate kept per dictionary key
pub trait Partial<V>: Clone + Send + 'static {
    fn start(value: V) -> Self;
    fn accumulate(&mut self, value: V);
    fn combine(&mut self, other: &Self);

    /// Derived result used for ranking and rendering
    fn finish(&self) -> f64;
}

/// Running `(count, sum)` whose result is the average. The sum is kept
/// as a double whatever the input width.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CountSum {
    pub count: i64,
    pub sum: f64,
}

impl<V: Arithmetic> Partial<V> for CountSum {
    fn start(value: V) -> Self {
        CountSum {
            count: 1,
            sum: value.to_f64(),
        }
    }

    fn accumulate(&mut self, value: V) {
        self.count += 1;
        self.sum += value.to_f64();
    }

    fn combine(&mut self, other: &Self) {
        self.count += other.count;
        self.sum += other.sum;
    }

    fn finish(&self) -> f64 {
        self.sum / self.count as f64
    }
}

/// Map from key to a partial aggregate that remembers insertion order.
///
/// When a limit is set and exceeded, the oldest inserted entries are
/// evicted first, whatever their key or accumulated value. Updating an
/// existing key does not move it.
pub struct BoundedGroupByDict<K: ContainerType, V, A = CountSum> {
    entries: IndexMap<K::Stored, A>,
    limit: Limit,
    _value: PhantomData<fn(V)>,
}

impl<K: ContainerType, V, A> Default for BoundedGroupByDict<K, V, A> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            limit: Limit::Unset,
            _value: PhantomData,
        }
    }
}

impl<K, V, A> Container for BoundedGroupByDict<K, V, A>
where
    K: ContainerType,
    V: Arithmetic,
    A: Partial<V>,
{
    fn layout_name() -> String {
        format!("dict_{}_{}", K::type_name(), V::type_name())
    }
}

impl<K, V, A> BoundedGroupByDict<K, V, A>
where
    K: ContainerType,
    V: Arithmetic,
    A: Partial<V>,
{
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> Limit {
        self.limit
    }

    pub fn update(&mut self, key: K, value: V) {
        match self.entries.entry(key.to_stored()) {
            Entry::Occupied(mut entry) => entry.get_mut().accumulate(value),
            Entry::Vacant(entry) => {
                entry.insert(A::start(value));
            }
        }
    }

    pub fn set_limit(&mut self, limit: Limit) {
        self.limit = limit;
    }

    /// Drops the oldest entries until the limit holds again
    pub fn evict_overflow(&mut self) {
        while self.limit.exceeded_by(self.entries.len()) {
            trace!(len = self.entries.len(), "group-by dict evicting oldest entry");
            self.entries.shift_remove_index(0);
        }
    }

    /// Folds another partial dictionary into this one. Keys new to `self`
    /// are appended in `other`'s insertion order.
    pub fn merge(&mut self, other: Self) {
        self.limit = self.limit.combine(other.limit);
        for (key, partial) in other.entries {
            match self.entries.entry(key) {
                Entry::Occupied(mut entry) => entry.get_mut().combine(&partial),
                Entry::Vacant(entry) => {
                    entry.insert(partial);
                }
            }
        }
        self.evict_overflow();
    }

    fn render(key: &K::Stored, partial: &A) -> (String, String) {
        (
            format_string(&K::from_stored(key)),
            format_string(&partial.finish()),
        )
    }

    /// `key:result` pairs in ascending key order. Consumes the dictionary.
    pub fn output_by_key(self) -> String {
        let mut entries: Vec<_> = self.entries.into_iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        format_pairs(entries.iter().map(|(k, p)| Self::render(k, p)))
    }

    /// `key:result` pairs in descending result order, truncated to the
    /// limit. Ties keep ascending key order. Consumes the dictionary.
    pub fn output_by_value_desc(self) -> String {
        let max_len = self.limit.max_len();
        let mut entries: Vec<_> = self.entries.into_iter().collect();
        entries.sort_by(|(ka, a), (kb, b)| {
            b.finish().total_cmp(&a.finish()).then_with(|| ka.cmp(kb))
        });
        if let Some(n) = max_len {
            entries.truncate(n);
        }
        format_pairs(entries.iter().map(|(k, p)| Self::render(k, p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bound;

    type AvgDict = BoundedGroupByDict<String, i32>;

    #[test]
    fn test_average_by_category() {
        let mut dict = AvgDict::default();
        for (v, k) in [(0, "x"), (1, "y"), (2, "x"), (3, "y"), (4, "x")] {
            dict.update(k.to_string(), v);
        }
        assert_eq!(dict.output_by_key(), "x:2,y:2");
    }

    #[test]
    fn test_fifo_eviction_ignores_key_and_value() {
        let mut dict = AvgDict::default();
        dict.set_limit(2i32.limit());
        for (v, k) in [(100, "b"), (1, "a"), (50, "c")] {
            dict.update(k.to_string(), v);
            dict.evict_overflow();
            assert!(dict.len() <= 2);
        }
        // "b" is the oldest entry even though it has the largest value
        assert_eq!(dict.output_by_key(), "a:1,c:50");
    }

    #[test]
    fn test_update_keeps_insertion_position() {
        let mut dict = AvgDict::default();
        dict.set_limit(2i32.limit());
        for (v, k) in [(1, "x"), (2, "y"), (3, "x"), (4, "z")] {
            dict.update(k.to_string(), v);
            dict.evict_overflow();
        }
        assert_eq!(dict.output_by_key(), "y:2,z:4");
    }

    #[test]
    fn test_output_by_value_truncates() {
        let mut dict = BoundedGroupByDict::<i64, f64>::default();
        dict.set_limit(Limit::AtMost(2));
        dict.update(1, 5.0);
        dict.update(2, 1.0);
        dict.evict_overflow();
        dict.update(2, 9.0);
        dict.update(3, 0.5);
        assert_eq!(dict.len(), 3);
        assert_eq!(dict.output_by_value_desc(), "1:5,2:5");
    }

    #[test]
    fn test_sum_does_not_wrap_input_width() {
        let mut dict = BoundedGroupByDict::<String, i16>::default();
        dict.update("x".to_string(), i16::MAX);
        dict.update("x".to_string(), i16::MAX);
        dict.update("y".to_string(), i16::MIN);
        dict.update("y".to_string(), i16::MIN);
        assert_eq!(dict.output_by_key(), "x:32767,y:-32768");
    }

    #[test]
    fn test_merge_combines_partials() {
        let mut left = AvgDict::default();
        let mut right = AvgDict::default();
        left.update("x".to_string(), 1);
        right.update("x".to_string(), 3);
        right.update("y".to_string(), 7);
        left.merge(right);
        assert_eq!(left.output_by_key(), "x:2,y:7");
    }
}
