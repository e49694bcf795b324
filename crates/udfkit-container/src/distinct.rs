use std::collections::HashSet;

use crate::{Container, ContainerType};

/// Hash set whose cardinality is read destructively
pub struct DistinctCountSet<T: ContainerType> {
    values: HashSet<T::Stored>,
}

impl<T: ContainerType> Default for DistinctCountSet<T> {
    fn default() -> Self {
        Self {
            values: HashSet::new(),
        }
    }
}

impl<T: ContainerType> Container for DistinctCountSet<T> {
    fn layout_name() -> String {
        format!("std_set_{}", T::type_name())
    }
}

impl<T: ContainerType> DistinctCountSet<T> {
    pub fn insert(&mut self, value: T) {
        self.values.insert(value.to_stored());
    }

    pub fn merge(&mut self, other: Self) {
        self.values.extend(other.values);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of distinct values. Consumes the set.
    pub fn output(mut self) -> i64 {
        let count = self.values.len() as i64;
        self.values.clear();
        count
    }
}
