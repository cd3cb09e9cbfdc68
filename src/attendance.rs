use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::remote::{RemoteApi, Scope};
use crate::store::{CommitSummary, EditStore, RecordView, StoreError};

pub type StudentId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Tardy,
    Excused,
    Unset,
}

impl AttendanceStatus {
    /// One step along the fixed cycle:
    /// present → absent → tardy → excused → unset → present.
    pub fn next(self) -> Self {
        match self {
            Self::Present => Self::Absent,
            Self::Absent => Self::Tardy,
            Self::Tardy => Self::Excused,
            Self::Excused => Self::Unset,
            Self::Unset => Self::Present,
        }
    }
}

/// Per (date, class) scope, not per record. `verified` is terminal for the
/// scope until the scope changes, which resets to `draft`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationState {
    Draft,
    Verifying,
    Verified,
}

/// Attendance marking for one class on one day: the status cycle and the
/// draft/verified lifecycle layered over the generic edit store.
#[derive(Clone)]
pub struct AttendanceBoard {
    store: EditStore<StudentId, AttendanceStatus>,
    verification: Arc<Mutex<VerificationState>>,
}

impl AttendanceBoard {
    pub fn new(remote: Arc<dyn RemoteApi<StudentId, AttendanceStatus>>) -> Self {
        Self {
            store: EditStore::new(remote),
            verification: Arc::new(Mutex::new(VerificationState::Draft)),
        }
    }

    /// Loads the (class, date) scope. The verified badge is cleared before
    /// the fetch goes out so it is never shown for data still in flight.
    pub async fn open(&self, class_id: i64, date: NaiveDate) -> Result<(), StoreError> {
        self.set_verification(VerificationState::Draft);
        self.store.load(Scope::class_date(class_id, date)).await?;
        if !self.store.has_persisted() {
            // Nothing has ever been verified for this date: default the whole
            // roster to present rather than unset.
            for key in self.store.keys() {
                self.store.set_local(&key, AttendanceStatus::Present)?;
            }
        }
        Ok(())
    }

    /// Advances one student's local status one step. Never commits.
    pub fn cycle(&self, student: StudentId) -> Result<AttendanceStatus, StoreError> {
        let current = self
            .store
            .display_value(&student)
            .ok_or(StoreError::UnknownKey)?;
        let next = current.next();
        self.store.set_local(&student, next)?;
        Ok(next)
    }

    /// Sets every record's local value in one pass. Pure local, no I/O.
    pub fn apply_bulk(&self, status: AttendanceStatus) {
        for key in self.store.keys() {
            let _ = self.store.set_local(&key, status);
        }
    }

    /// Commits every dirty mark. Full success transitions the scope to
    /// `verified`; any failure leaves it `draft` with the failing students
    /// reported in the summary, their local values kept for retry.
    ///
    /// Calling this while already `verified` is a no-op.
    pub async fn verify(&self) -> Result<CommitSummary<StudentId>, StoreError> {
        if self.verification_state() == VerificationState::Verified {
            return Ok(CommitSummary::default());
        }
        self.set_verification(VerificationState::Verifying);
        match self.store.commit_all().await {
            Ok(summary) => {
                if summary.clean() {
                    self.set_verification(VerificationState::Verified);
                } else {
                    self.set_verification(VerificationState::Draft);
                }
                Ok(summary)
            }
            Err(e) => {
                self.set_verification(VerificationState::Draft);
                Err(e)
            }
        }
    }

    pub fn verification_state(&self) -> VerificationState {
        *self.verification.lock().expect("verification lock")
    }

    fn set_verification(&self, state: VerificationState) {
        *self.verification.lock().expect("verification lock") = state;
    }

    pub fn rows(&self) -> Vec<RecordView<StudentId, AttendanceStatus>> {
        self.store.records()
    }

    pub fn display_status(&self, student: StudentId) -> Option<AttendanceStatus> {
        self.store.display_value(&student)
    }

    pub fn is_dirty(&self, student: StudentId) -> bool {
        self.store.is_dirty(&student)
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::AttendanceStatus::*;
    use super::*;

    #[test]
    fn cycle_returns_to_start_after_five_steps() {
        for start in [Present, Absent, Tardy, Excused, Unset] {
            let mut status = start;
            for _ in 0..5 {
                status = status.next();
            }
            assert_eq!(status, start);
        }
    }

    #[test]
    fn cycle_order_is_fixed() {
        assert_eq!(Present.next(), Absent);
        assert_eq!(Absent.next(), Tardy);
        assert_eq!(Tardy.next(), Excused);
        assert_eq!(Excused.next(), Unset);
        assert_eq!(Unset.next(), Present);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Tardy).expect("json"), "tardy");
        let parsed: AttendanceStatus =
            serde_json::from_value(serde_json::json!("excused")).expect("parse");
        assert_eq!(parsed, Excused);
    }
}
