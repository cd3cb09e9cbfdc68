use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::remote::{RemoteApi, Scope};
use crate::store::{CommitOutcome, EditStore, RecordView, StoreError};

/// A score in points, or absent when the cell was never marked.
pub type GradeValue = Option<f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellKey {
    pub student_id: i64,
    pub assignment_id: i64,
}

/// Half-up rounding at the reportable precision (one decimal):
/// `Int(10*x + 0.5) / 10`. Applied to every value before it is stored
/// locally, so comparison against the snapshot and the value sent over the
/// wire can never disagree.
pub fn round_points(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

fn parse_raw(raw: &str) -> Result<GradeValue, StoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let n: f64 = trimmed
        .parse()
        .map_err(|_| StoreError::Validation(format!("not a number: {trimmed}")))?;
    if !n.is_finite() {
        return Err(StoreError::Validation(format!("not a number: {trimmed}")));
    }
    Ok(Some(round_points(n)))
}

/// Bounded numeric grade editing over the generic edit store, one record per
/// (student, assignment) cell. `max_points` comes from the assignment
/// definitions supplied at open time; it is not part of the cell record.
#[derive(Clone)]
pub struct GradeBook {
    store: EditStore<CellKey, GradeValue>,
    max_points: Arc<Mutex<HashMap<i64, f64>>>,
}

impl GradeBook {
    pub fn new(remote: Arc<dyn RemoteApi<CellKey, GradeValue>>) -> Self {
        Self {
            store: EditStore::new(remote),
            max_points: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Loads the class scope. `assignments` pairs each assignment id with its
    /// `max_points`; the table is swapped in only once the load succeeded so
    /// a failed load keeps the previous cells editable.
    pub async fn open(&self, class_id: i64, assignments: &[(i64, f64)]) -> Result<(), StoreError> {
        self.store.load(Scope::class(class_id)).await?;
        let mut max = self.max_points.lock().expect("max points lock");
        max.clear();
        max.extend(assignments.iter().copied());
        Ok(())
    }

    /// Parses and validates raw input, then updates the local value only.
    /// Empty input means "absent". Rejected input leaves the cell exactly as
    /// it was; nothing here touches the network.
    pub fn edit_local(&self, key: CellKey, raw: &str) -> Result<(), StoreError> {
        let parsed = parse_raw(raw)?;
        if let Some(points) = parsed {
            let max = self.max_for(key.assignment_id)?;
            if points < 0.0 || points > max {
                return Err(StoreError::Validation(format!(
                    "points must be between 0 and {max}"
                )));
            }
        }
        self.store.set_local(&key, parsed)
    }

    fn max_for(&self, assignment_id: i64) -> Result<f64, StoreError> {
        self.max_points
            .lock()
            .expect("max points lock")
            .get(&assignment_id)
            .copied()
            .ok_or_else(|| StoreError::Validation(format!("unknown assignment {assignment_id}")))
    }

    /// Commits one cell: create when it has never been persisted, update
    /// otherwise. A cell whose local value equals the snapshot is never
    /// written, even on explicit blur.
    pub async fn commit_cell(
        &self,
        key: CellKey,
    ) -> Result<CommitOutcome<CellKey, GradeValue>, StoreError> {
        self.store.commit(&key).await
    }

    pub fn cells(&self) -> Vec<RecordView<CellKey, GradeValue>> {
        self.store.records()
    }

    pub fn display_value(&self, key: CellKey) -> Option<GradeValue> {
        self.store.display_value(&key)
    }

    pub fn is_dirty(&self, key: CellKey) -> bool {
        self.store.is_dirty(&key)
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }
}
