use std::sync::Arc;

use serde::Deserialize;

use crate::attendance::AttendanceBoard;
use crate::grades::GradeBook;
use crate::prefs::PrefStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub remote_base: Option<String>,
    pub prefs: Arc<dyn PrefStore>,
    pub attendance: Option<AttendanceBoard>,
    pub grades: Option<GradeBook>,
}

impl AppState {
    pub fn new(prefs: Arc<dyn PrefStore>) -> Self {
        Self {
            remote_base: None,
            prefs,
            attendance: None,
            grades: None,
        }
    }
}
