//! Zero-sized hash builder for the crate's internal maps.
//!
//! Object values and per-scope listener tables are keyed by short strings and
//! never exposed to untrusted input sizes, so HashDoS resistance buys nothing
//! here. `FastHashBuilder` uses foldhash with a fixed seed instead.

use std::hash::BuildHasher;

use foldhash::fast::{FixedState, FoldHasher};

/// Seed shared by every `FastHashBuilder`.
const SEED: u64 = 0x517c_c1b7_2722_0a95;

/// A zero-sized `BuildHasher` backed by foldhash with a fixed seed.
///
/// All instances hash identically, which keeps `IndexMap<String, Value, _>`
/// cheap to create for every object value and every scope.
#[derive(Clone, Copy, Debug, Default)]
pub struct FastHashBuilder;

impl BuildHasher for FastHashBuilder {
    type Hasher = FoldHasher<'static>;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(SEED).build_hasher()
    }
}

/// Insertion-ordered string map used for object values.
pub type OrderedMap<V> = indexmap::IndexMap<String, V, FastHashBuilder>;

/// Unordered string map used for listener tables.
pub type FastMap<V> = std::collections::HashMap<String, V, FastHashBuilder>;
