//! LRU tracking and memory accounting for resident tiles.

pub mod accountant;
pub mod lru;

pub use accountant::Accountant;
pub use lru::{LruList, TileId};

/// The LRU list and the memory counters are manipulated together under one
/// short-held mutex (see the store's lock-ordering docs): every eviction
/// decision needs a consistent view of both "is anything even evictable"
/// and "how over budget are we".
#[derive(Debug)]
pub struct Accounting {
    pub lru: LruList,
    pub memory: Accountant,
}

impl Accounting {
    pub fn new(memory_limit: u64) -> Self {
        Accounting { lru: LruList::new(), memory: Accountant::new(memory_limit) }
    }
}
