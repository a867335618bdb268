//! Named failure points for exercising rollback paths in tests.

use std::sync::OnceLock;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::DataAccessError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// After the first page of a payload has been written.
    BlobWriteMidStream,
    /// After the owning row points at the new handle, before commit.
    BlobWriteBeforeCommit,
    /// After every table has been recreated, before the reset commits.
    ResetBeforeCommit,
    /// Before each chunked insert while restoring a table.
    RestoreChunkInsert,
}

fn registry() -> &'static Mutex<AHashMap<FaultPoint, usize>> {
    static REGISTRY: OnceLock<Mutex<AHashMap<FaultPoint, usize>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(AHashMap::new()))
}

pub fn reset_faults() {
    registry().lock().clear();
}

/// Arms `point` to fail the next `failures` times it is reached.
pub fn configure_fault(point: FaultPoint, failures: usize) {
    let mut guard = registry().lock();
    if failures == 0 {
        guard.remove(&point);
    } else {
        guard.insert(point, failures);
    }
}

pub(crate) fn check_fault(point: FaultPoint) -> Result<(), DataAccessError> {
    let mut guard = registry().lock();
    if let Some(remaining) = guard.get_mut(&point)
        && *remaining > 0
    {
        *remaining -= 1;
        if *remaining == 0 {
            guard.remove(&point);
        }
        return Err(DataAccessError::fault_injection(format!("{point:?}")));
    }
    Ok(())
}
