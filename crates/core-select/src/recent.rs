//! Recent-selection persistence.
//!
//! Each control's recent history lives in one JSON file keyed by the
//! control's logical `name`: `<base>/recent-<name>.json`, a plain array of
//! option ids, newest first, capped at [`RECENT_LIMIT`], deduplicated on
//! insert. Storage failures (unwritable dir, corrupt file) degrade to an
//! empty history; the control itself never fails over persistence.
//!
//! Scoping rule: two controls sharing a `name` share one history and will
//! clobber each other's entries. Keying is by name, not by instance.

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use core_options::OptionId;

/// Maximum entries retained per control name.
pub const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct RecentStore {
    base: PathBuf,
}

impl RecentStore {
    /// Store rooted at the platform data dir
    /// (`<data_dir>/hybrid-controls/`), falling back to the working
    /// directory when the platform reports none.
    pub fn new() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hybrid-controls");
        Self { base }
    }

    /// Store rooted at an explicit directory (tests, embedded hosts).
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        // Control names come from config; keep the file name tame.
        let safe: String = name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base.join(format!("recent-{safe}.json"))
    }

    /// Load the recent ids for a control name; any failure yields empty.
    pub fn load(&self, name: &str) -> Vec<OptionId> {
        let path = self.path_for(name);
        match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(ids) => ids.into_iter().map(OptionId::from).collect(),
                Err(err) => {
                    debug!(target: "select.recent", path = %path.display(), error = %err, "recent file unreadable");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }

    /// Record `id` as most recent for `name` and return the updated list.
    /// Write failures are swallowed; the returned list still reflects the
    /// in-memory update so the current session stays consistent.
    pub fn save(&self, name: &str, id: &OptionId) -> Vec<OptionId> {
        let mut ids = self.load(name);
        ids.retain(|existing| existing != id);
        ids.insert(0, id.clone());
        ids.truncate(RECENT_LIMIT);

        let serialized: Vec<&str> = ids.iter().map(OptionId::as_str).collect();
        let write = fs::create_dir_all(&self.base).and_then(|_| {
            let body = serde_json::to_string(&serialized).unwrap_or_else(|_| "[]".to_string());
            fs::write(self.path_for(name), body)
        });
        if let Err(err) = write {
            debug!(target: "select.recent", name, error = %err, "recent write failed; history not persisted");
        }
        ids
    }
}

impl Default for RecentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> OptionId {
        OptionId::new(s)
    }

    #[test]
    fn save_orders_newest_first_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecentStore::with_base(dir.path());
        store.save("crew", &id("a"));
        store.save("crew", &id("b"));
        let after = store.save("crew", &id("a"));
        assert_eq!(after, vec![id("a"), id("b")]);
        assert_eq!(store.load("crew"), vec![id("a"), id("b")]);
    }

    #[test]
    fn history_is_capped_at_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecentStore::with_base(dir.path());
        for n in 0..8 {
            store.save("crew", &id(&format!("opt-{n}")));
        }
        let ids = store.load("crew");
        assert_eq!(ids.len(), RECENT_LIMIT);
        assert_eq!(ids[0], id("opt-7"));
        assert_eq!(ids[4], id("opt-3"));
    }

    #[test]
    fn names_share_history_but_not_across_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecentStore::with_base(dir.path());
        store.save("crew", &id("a"));
        store.save("route", &id("b"));
        assert_eq!(store.load("crew"), vec![id("a")]);
        assert_eq!(store.load("route"), vec![id("b")]);
    }

    #[test]
    fn corrupt_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecentStore::with_base(dir.path());
        std::fs::write(dir.path().join("recent-crew.json"), "{not json").unwrap();
        assert!(store.load("crew").is_empty());
        // Saving over the corrupt file recovers it.
        store.save("crew", &id("x"));
        assert_eq!(store.load("crew"), vec![id("x")]);
    }

    #[test]
    fn unwritable_base_still_returns_in_memory_list() {
        let store = RecentStore::with_base("/proc/definitely/not/writable");
        let ids = store.save("crew", &id("a"));
        assert_eq!(ids, vec![id("a")]);
        assert!(store.load("crew").is_empty());
    }
}
