//! Fast collection types for Alcove.
//!
//! Re-exports `FxHashMap` and `FxHashSet` (faster than std for small keys),
//! plus `IndexMap`/`IndexSet` with FxHash where iteration order must match
//! insertion order (the application registry and main menu rely on this).

pub use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
pub use std::collections::*;

/// Insertion-ordered hash map with FxHash (faster than default hasher).
pub type IndexMap<K, V> = indexmap::IndexMap<K, V, FxBuildHasher>;

/// Insertion-ordered hash set with FxHash.
pub type IndexSet<T> = indexmap::IndexSet<T, FxBuildHasher>;
