//! Assertion helpers for integration tests.

#![allow(dead_code)]

use lazybam::BamError;
use lazybam::record::Record;

/// Asserts records are in coordinate order with unplaced records last.
///
/// # Panics
///
/// Panics at the first pair that is out of order.
pub fn assert_coordinate_sorted(records: &[Record]) {
    let key = |r: &Record| (u32::try_from(r.reference_id()).unwrap_or(u32::MAX), r.alignment_start());
    for pair in records.windows(2) {
        assert!(
            key(&pair[0]) <= key(&pair[1]),
            "{} ({:?}) sorts after {} ({:?})",
            pair[0].name(),
            key(&pair[0]),
            pair[1].name(),
            key(&pair[1])
        );
    }
}

/// Asserts an `anyhow` error wraps a [`BamError::Format`].
///
/// # Panics
///
/// Panics if the root error is not a format error.
pub fn assert_format_error(err: &anyhow::Error) {
    match err.downcast_ref::<BamError>() {
        Some(e) if e.is_format() => {}
        other => panic!("expected a format error, got {other:?} ({err:#})"),
    }
}
