//! Record ids for work items and ledger entries.
//!
//! Ids come from one process-wide monotonic ULID generator: ids created
//! within the same millisecond still compare in creation order, which the
//! storage layer relies on when it scans the pending queue.

use std::sync::Mutex;

use ulid::{Generator, Ulid};

static GENERATOR: Mutex<Generator> = Mutex::new(Generator::new());

/// Next record id, strictly greater than every id handed out before.
pub fn next_record_id() -> String {
    let mut generator = GENERATOR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    // Overflow needs 2^80 ids in one millisecond; fall back to a fresh id
    let ulid = generator.generate().unwrap_or_else(|_| Ulid::new());
    ulid.to_string()
}
