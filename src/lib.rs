pub mod attendance;
pub mod grades;
pub mod ipc;
pub mod prefs;
pub mod remote;
pub mod store;
