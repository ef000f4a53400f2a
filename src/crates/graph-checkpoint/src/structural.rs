//! Structural deep copy of nested containers
//!
//! [`StructuralClone`] rebuilds every map, sequence and shared pointer in a
//! value so that the result has no substructure in common with its source.
//! It differs from [`Clone`] wherever sharing is involved: cloning an
//! `Arc<T>` hands out another reference to the same allocation, while
//! `structural_clone` allocates a fresh `T`.
//!
//! Checkpoints use it for `versions_seen`, the two-level map the execution
//! engine mutates in place per node and per channel.
//!
//! # Limitations
//!
//! Input must be finite and acyclic. A cycle built through `Arc` plus
//! interior mutability makes `structural_clone` recurse without end; this is
//! not detected or reported.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

/// Deep copy with no shared mutable substructure
pub trait StructuralClone: Sized {
    /// Return a structurally equal value that shares no container with `self`
    fn structural_clone(&self) -> Self;
}

/// Free-function form of [`StructuralClone::structural_clone`]
pub fn structural_clone<T: StructuralClone>(value: &T) -> T {
    value.structural_clone()
}

// Primitives are immutable, so a plain copy is already structural.
macro_rules! impl_leaf {
    ($($ty:ty),* $(,)?) => {
        $(
            impl StructuralClone for $ty {
                fn structural_clone(&self) -> Self {
                    self.clone()
                }
            }
        )*
    };
}

impl_leaf!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String,
);

impl<T: StructuralClone> StructuralClone for Option<T> {
    fn structural_clone(&self) -> Self {
        self.as_ref().map(T::structural_clone)
    }
}

impl<T: StructuralClone> StructuralClone for Vec<T> {
    fn structural_clone(&self) -> Self {
        self.iter().map(T::structural_clone).collect()
    }
}

impl<T: StructuralClone> StructuralClone for Arc<T> {
    fn structural_clone(&self) -> Self {
        Arc::new((**self).structural_clone())
    }
}

impl<K, V, H> StructuralClone for HashMap<K, V, H>
where
    K: Eq + Hash + Clone,
    V: StructuralClone,
    H: BuildHasher + Clone,
{
    fn structural_clone(&self) -> Self {
        let mut out = HashMap::with_capacity_and_hasher(self.len(), self.hasher().clone());
        for (key, value) in self {
            out.insert(key.clone(), value.structural_clone());
        }
        out
    }
}

impl<K, V> StructuralClone for BTreeMap<K, V>
where
    K: Ord + Clone,
    V: StructuralClone,
{
    fn structural_clone(&self) -> Self {
        self.iter()
            .map(|(key, value)| (key.clone(), value.structural_clone()))
            .collect()
    }
}

impl StructuralClone for Value {
    fn structural_clone(&self) -> Self {
        match self {
            Value::Array(items) => Value::Array(items.structural_clone()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.structural_clone()))
                    .collect(),
            ),
            leaf => leaf.clone(),
        }
    }
}
