//! Integration tests for the lazybam library.
//!
//! These tests exercise complete read/write/merge workflows on real files and check that the
//! output is readable by an independent BAM implementation.

mod helpers;
mod test_chunked_reading;
mod test_error_paths;
mod test_merge_sort;
mod test_noodles_compat;
mod test_region_query;
