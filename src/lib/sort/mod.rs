//! Merging, coordinate sorting, and indexing of chunk files.
//!
//! The pipeline is an external merge sort:
//!
//! 1. **Open phase**: check every input header against the target reference dictionary
//! 2. **Run phase**: use coordinate-sorted inputs as-is; buffer, sort, and spill the rest
//! 3. **Merge phase**: k-way merge of all runs using a min-heap
//! 4. **Write phase**: atomic BGZF output with an optional `.bai` built on the fly
//!
//! Without sorting, inputs are simply concatenated in the order given.

pub mod keys;
pub mod merge;

pub use keys::{CoordinateKey, MergeKey};
pub use merge::{ChunkMerger, DEFAULT_MEMORY_LIMIT, MergeStats, merge_chunks};
