//! Bounded online-aggregation containers
//!
//! Opaque aggregate state for `top`, `distinct_count` and the `avg_cate`
//! family. Each container is default-constructed by the aggregate's init
//! step, mutated once per accepted row, and consumed by its `output` method,
//! which renders the result and drops the container.

mod dict;
mod distinct;
mod format;
mod ordered;
mod topk;

pub use dict::{BoundedGroupByDict, CountSum, Partial};
pub use distinct::DistinctCountSet;
pub use format::{format_pairs, format_string};
pub use ordered::{OrderedF32, OrderedF64};
pub use topk::TopKContainer;

use std::hash::Hash;
use udfkit_ir::{Date, NativeType, Timestamp};

/// Scalar types that can be stored in a container.
///
/// `Stored` is a totally ordered, hashable representation; floats are
/// wrapped so they can live in ordered and hashed collections.
pub trait ContainerType: NativeType {
    type Stored: Ord + Hash + Clone + Send + Sync + 'static;

    fn to_stored(self) -> Self::Stored;
    fn from_stored(stored: &Self::Stored) -> Self;
}

macro_rules! container_type {
    ($($ty:ty),*) => {
        $(
            impl ContainerType for $ty {
                type Stored = $ty;

                fn to_stored(self) -> Self::Stored {
                    self
                }

                fn from_stored(stored: &Self::Stored) -> Self {
                    stored.clone()
                }
            }
        )*
    };
}

container_type!(i16, i32, i64, Timestamp, Date, String);

impl ContainerType for f32 {
    type Stored = OrderedF32;

    fn to_stored(self) -> Self::Stored {
        OrderedF32::from(self)
    }

    fn from_stored(stored: &Self::Stored) -> Self {
        stored.0
    }
}

impl ContainerType for f64 {
    type Stored = OrderedF64;

    fn to_stored(self) -> Self::Stored {
        OrderedF64::from(self)
    }

    fn from_stored(stored: &Self::Stored) -> Self {
        stored.0
    }
}

/// Size cap currently applied to a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Limit {
    /// No bound has been seen yet
    #[default]
    Unset,
    Unbounded,
    AtMost(usize),
}

impl Limit {
    /// Combines the limits of two partial states; the looser one wins.
    pub fn combine(self, other: Limit) -> Limit {
        match (self, other) {
            (Limit::Unset, l) | (l, Limit::Unset) => l,
            (Limit::Unbounded, _) | (_, Limit::Unbounded) => Limit::Unbounded,
            (Limit::AtMost(a), Limit::AtMost(b)) => Limit::AtMost(a.max(b)),
        }
    }

    pub fn exceeded_by(self, len: usize) -> bool {
        matches!(self, Limit::AtMost(n) if len > n)
    }

    pub fn max_len(self) -> Option<usize> {
        match self {
            Limit::AtMost(n) => Some(n),
            _ => None,
        }
    }
}

/// Integer widths a bound argument may arrive in. A negative bound means
/// no limit.
pub trait Bound: NativeType + Copy {
    fn limit(self) -> Limit;
}

impl Bound for i32 {
    fn limit(self) -> Limit {
        (self as i64).limit()
    }
}

impl Bound for i64 {
    fn limit(self) -> Limit {
        if self < 0 {
            Limit::Unbounded
        } else {
            Limit::AtMost(usize::try_from(self).unwrap_or(usize::MAX))
        }
    }
}

/// Opaque aggregate state with a layout name visible to the type system
pub trait Container: Default + Send + 'static {
    fn layout_name() -> String;
}
