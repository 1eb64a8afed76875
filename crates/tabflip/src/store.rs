#![forbid(unsafe_code)]

//! Persistent MRU and preview caches.
//!
//! Both stores share one JSON document shape: `{pid: {group_id: payload}}`,
//! so multiple host processes and window groups coexist in a single file
//! without clobbering each other. Saves are wholesale read-modify-write of
//! the per-(pid, group) subtree. Unreadable or malformed files always read
//! as empty state; cache corruption is never fatal.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value, json};
use tabflip_core::logging::{debug, warn};

/// MRU store file name.
const MRU_FILENAME: &str = "tabflip.json";

/// Preview store file name.
const PREVIEW_FILENAME: &str = "tabflip-previews.json";

/// Current wall-clock time as fractional Unix seconds.
#[must_use]
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// The cache directory: `$KITTY_CACHE_DIRECTORY`, else the platform cache
/// dir, else `/tmp`.
#[must_use]
pub fn cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("KITTY_CACHE_DIRECTORY")
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    dirs::cache_dir().unwrap_or_else(|| PathBuf::from("/tmp"))
}

fn host_pid() -> u64 {
    std::env::var("KITTY_PID")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

/// Shared file plumbing for both stores.
#[derive(Debug, Clone)]
struct StoreFile {
    path: PathBuf,
    pid_key: String,
    group_key: String,
}

impl StoreFile {
    fn new(path: PathBuf, group_id: u64) -> Self {
        Self {
            path,
            pid_key: host_pid().to_string(),
            group_key: group_id.to_string(),
        }
    }

    /// Read this store's subtree, or `None` when absent/corrupt.
    fn load_subtree(&self) -> Option<Value> {
        let text = std::fs::read_to_string(&self.path).ok()?;
        let doc: Value = match serde_json::from_str(&text) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "cache file corrupt, treating as empty");
                return None;
            }
        };
        doc.get(&self.pid_key)?.get(&self.group_key).cloned()
    }

    /// Write this store's subtree, preserving other pids and groups.
    fn save_subtree(&self, payload: Value) -> std::io::Result<()> {
        let mut root = match std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| serde_json::from_str::<Value>(&text).ok())
        {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        let pid_entry = root
            .entry(self.pid_key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !pid_entry.is_object() {
            *pid_entry = Value::Object(Map::new());
        }
        if let Some(groups) = pid_entry.as_object_mut() {
            groups.insert(self.group_key.clone(), payload);
        }
        let doc = Value::Object(root);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string(&doc)?)
    }
}

/// Persisted most-recently-used scores, keyed `tab id → score` (higher =
/// more recent).
#[derive(Debug, Clone)]
pub struct MruStore {
    file: StoreFile,
}

impl MruStore {
    /// Store for one window group at the default cache path.
    #[must_use]
    pub fn new(group_id: u64) -> Self {
        Self::at_path(cache_dir().join(MRU_FILENAME), group_id)
    }

    /// Store at an explicit path (tests).
    #[must_use]
    pub fn at_path(path: impl Into<PathBuf>, group_id: u64) -> Self {
        Self {
            file: StoreFile::new(path.into(), group_id),
        }
    }

    /// Load the score map. A legacy encoding (a plain ordered list of tab
    /// ids) is migrated to scores on the fly, score = now - index.
    #[must_use]
    pub fn load(&self) -> HashMap<u64, f64> {
        let Some(raw) = self.file.load_subtree() else {
            return HashMap::new();
        };
        match raw {
            Value::Array(ids) => {
                let now = unix_now();
                ids.iter()
                    .enumerate()
                    .filter_map(|(idx, id)| {
                        parse_id(id).map(|id| (id, now - idx as f64))
                    })
                    .collect()
            }
            Value::Object(map) => map
                .iter()
                .filter_map(|(k, v)| {
                    let id = k.parse().ok()?;
                    Some((id, v.as_f64()?))
                })
                .collect(),
            _ => HashMap::new(),
        }
    }

    /// Persist the score map wholesale.
    pub fn save(&self, last_used: &HashMap<u64, f64>) -> std::io::Result<()> {
        let payload: Map<String, Value> = last_used
            .iter()
            .map(|(id, score)| (id.to_string(), json!(score)))
            .collect();
        debug!(entries = payload.len(), "saving MRU scores");
        self.file.save_subtree(Value::Object(payload))
    }
}

/// Persisted preview captures with their capture timestamps.
#[derive(Debug, Clone)]
pub struct PreviewStore {
    file: StoreFile,
}

impl PreviewStore {
    /// Store for one window group at the default cache path.
    #[must_use]
    pub fn new(group_id: u64) -> Self {
        Self::at_path(cache_dir().join(PREVIEW_FILENAME), group_id)
    }

    /// Store at an explicit path (tests).
    #[must_use]
    pub fn at_path(path: impl Into<PathBuf>, group_id: u64) -> Self {
        Self {
            file: StoreFile::new(path.into(), group_id),
        }
    }

    /// Load cached preview lines and capture timestamps. Entries whose
    /// lines are not a list of strings are skipped; a bare line list
    /// (no timestamp wrapper) is accepted as an entry of unknown age.
    #[must_use]
    pub fn load(&self) -> (HashMap<u64, Vec<String>>, HashMap<u64, f64>) {
        let Some(Value::Object(raw)) = self.file.load_subtree() else {
            return (HashMap::new(), HashMap::new());
        };
        let mut previews = HashMap::new();
        let mut timestamps = HashMap::new();
        for (key, value) in &raw {
            let Ok(tab_id) = key.parse::<u64>() else {
                continue;
            };
            let (lines_value, ts) = match value {
                Value::Object(entry) => (entry.get("lines"), entry.get("ts").and_then(Value::as_f64)),
                other => (Some(other), None),
            };
            let Some(lines) = lines_value.and_then(string_list) else {
                continue;
            };
            previews.insert(tab_id, lines);
            if let Some(ts) = ts {
                timestamps.insert(tab_id, ts);
            }
        }
        (previews, timestamps)
    }

    /// Persist previews and timestamps wholesale. Entries missing a
    /// timestamp are stamped with the current time.
    pub fn save(
        &self,
        previews: &HashMap<u64, Vec<String>>,
        timestamps: &HashMap<u64, f64>,
    ) -> std::io::Result<()> {
        let now = unix_now();
        let payload: Map<String, Value> = previews
            .iter()
            .map(|(id, lines)| {
                let ts = timestamps.get(id).copied().unwrap_or(now);
                (id.to_string(), json!({ "lines": lines, "ts": ts }))
            })
            .collect();
        debug!(entries = payload.len(), "saving preview cache");
        self.file.save_subtree(Value::Object(payload))
    }
}

fn parse_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    let list = value.as_array()?;
    list.iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        dir.path().join(name)
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MruStore::at_path(temp_path(&dir, "mru.json"), 1);
        assert!(store.load().is_empty());
    }

    #[test]
    fn corrupt_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "mru.json");
        std::fs::write(&path, "{definitely not json").unwrap();
        let store = MruStore::at_path(&path, 1);
        assert!(store.load().is_empty());
        // And saving over it recovers.
        store.save(&HashMap::from([(7, 3.5)])).unwrap();
        assert_eq!(store.load().get(&7), Some(&3.5));
    }

    #[test]
    fn mru_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = MruStore::at_path(temp_path(&dir, "mru.json"), 4);
        let scores = HashMap::from([(1, 10.0), (2, 5.5)]);
        store.save(&scores).unwrap();
        assert_eq!(store.load(), scores);
    }

    #[test]
    fn groups_do_not_clobber_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "mru.json");
        let a = MruStore::at_path(&path, 1);
        let b = MruStore::at_path(&path, 2);
        a.save(&HashMap::from([(1, 1.0)])).unwrap();
        b.save(&HashMap::from([(2, 2.0)])).unwrap();
        assert_eq!(a.load(), HashMap::from([(1, 1.0)]));
        assert_eq!(b.load(), HashMap::from([(2, 2.0)]));
    }

    #[test]
    fn legacy_list_form_migrates_to_scores() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "mru.json");
        let pid = host_pid().to_string();
        let doc = json!({ pid: { "9": [3, 1, 2] } });
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();
        let store = MruStore::at_path(&path, 9);
        let scores = store.load();
        assert_eq!(scores.len(), 3);
        // Earlier entries score higher.
        assert!(scores[&3] > scores[&1]);
        assert!(scores[&1] > scores[&2]);
    }

    #[test]
    fn preview_round_trip_keeps_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreviewStore::at_path(temp_path(&dir, "previews.json"), 2);
        let previews = HashMap::from([(5, vec!["line one".to_string(), "two".to_string()])]);
        let timestamps = HashMap::from([(5, 1000.5)]);
        store.save(&previews, &timestamps).unwrap();
        let (loaded, ts) = store.load();
        assert_eq!(loaded, previews);
        assert_eq!(ts.get(&5), Some(&1000.5));
    }

    #[test]
    fn preview_without_timestamp_is_stamped_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreviewStore::at_path(temp_path(&dir, "previews.json"), 2);
        let previews = HashMap::from([(5, vec!["x".to_string()])]);
        store.save(&previews, &HashMap::new()).unwrap();
        let (_, ts) = store.load();
        assert!(ts.get(&5).copied().unwrap_or(0.0) > 0.0);
    }

    #[test]
    fn preview_bare_line_list_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "previews.json");
        let pid = host_pid().to_string();
        // Shape: {pid: {group: {tab: lines}}}.
        let doc = json!({ pid: { "3": { "8": ["a", "b"] } } });
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();
        let store = PreviewStore::at_path(&path, 3);
        let (previews, ts) = store.load();
        assert_eq!(previews.get(&8), Some(&vec!["a".to_string(), "b".to_string()]));
        assert!(ts.is_empty());
    }

    #[test]
    fn malformed_preview_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "previews.json");
        let pid = host_pid().to_string();
        let doc = json!({ pid: { "3": {
            "8": { "lines": ["ok"], "ts": 1.0 },
            "9": { "lines": [1, 2, 3], "ts": 2.0 },
            "nope": { "lines": ["x"], "ts": 3.0 }
        } } });
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();
        let (previews, _) = PreviewStore::at_path(&path, 3).load();
        assert_eq!(previews.len(), 1);
        assert!(previews.contains_key(&8));
    }
}
