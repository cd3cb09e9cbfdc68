use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

/// UI preference store (theme, last active tab). Incidental persistence kept
/// behind an explicit get/set seam instead of hidden globals.
pub trait PrefStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryPrefs {
    values: Mutex<HashMap<String, String>>,
}

impl PrefStore for MemoryPrefs {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().expect("prefs lock").get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .expect("prefs lock")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON-file-backed preferences. The whole map is rewritten on every set;
/// preference volume is a handful of keys.
pub struct FilePrefs {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl FilePrefs {
    pub fn open(path: &Path) -> Result<Self> {
        let values = match fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).context("parse prefs file")?,
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e).context("read prefs file"),
        };
        Ok(Self {
            path: path.to_path_buf(),
            values: Mutex::new(values),
        })
    }
}

impl PrefStore for FilePrefs {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().expect("prefs lock").get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().expect("prefs lock");
        values.insert(key.to_string(), value.to_string());
        let text = serde_json::to_string_pretty(&*values).context("serialize prefs")?;
        fs::write(&self.path, text).context("write prefs file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "{}-{}.json",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    #[test]
    fn memory_prefs_round_trip() {
        let prefs = MemoryPrefs::default();
        assert_eq!(prefs.get("theme"), None);
        prefs.set("theme", "dark").expect("set");
        assert_eq!(prefs.get("theme").as_deref(), Some("dark"));
    }

    #[test]
    fn file_prefs_survive_reopen() {
        let path = temp_path("classboardd-prefs");
        {
            let prefs = FilePrefs::open(&path).expect("open fresh");
            prefs.set("lastTab", "grades").expect("set");
        }
        let reopened = FilePrefs::open(&path).expect("reopen");
        assert_eq!(reopened.get("lastTab").as_deref(), Some("grades"));
        let _ = fs::remove_file(&path);
    }
}
