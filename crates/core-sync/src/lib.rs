//! Cross-instance option synchronization.
//!
//! One process-wide registry keyed by group name. Every control that carries
//! a `sync_group` registers here; publishing a group's option set delivers it
//! synchronously to every other live member and stores it as the group's
//! latest versioned snapshot, which late-joining members receive at
//! registration (catch-up semantics).
//!
//! Invariants:
//! - a member never receives its own publish;
//! - a publish for a group already mid-broadcast is dropped (re-entrancy
//!   guard), so a member reacting to a snapshot by republishing cannot loop;
//! - one member's failing snapshot handler is logged and skipped, the
//!   remaining members still receive the update;
//! - the registry lock is never held while member callbacks run.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, Weak};

use core_options::OptionItem;
use tracing::{debug, warn};

// Telemetry counters, inspectable from tests and periodic logging.
pub static SYNC_PUBLISHES: AtomicU64 = AtomicU64::new(0);
pub static SYNC_REENTRANT_DROPS: AtomicU64 = AtomicU64::new(0);
pub static SYNC_LISTENER_FAILURES: AtomicU64 = AtomicU64::new(0);

/// Process-unique member identity, minted once per control.
pub type MemberId = u64;

static NEXT_MEMBER_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_member_id() -> MemberId {
    NEXT_MEMBER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Implemented by any control participating in a sync group.
pub trait SyncMember: Send + Sync {
    /// Stable identity used for source exclusion and unregistration.
    fn sync_id(&self) -> MemberId;
    /// Replace the member's option set with the broadcast snapshot.
    fn apply_sync_snapshot(&self, options: &[OptionItem]) -> anyhow::Result<()>;
    /// Whether the member has a remote data source configured.
    fn has_remote_source(&self) -> bool {
        false
    }
    /// Re-trigger the member's remote fetch with an empty search term.
    fn request_refetch(&self) {}
}

/// Latest published option set for a group.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub version: u64,
    pub options: Vec<OptionItem>,
}

#[derive(Default)]
struct RegistryInner {
    members: HashMap<String, Vec<Weak<dyn SyncMember>>>,
    snapshots: HashMap<String, Snapshot>,
    broadcasting: HashSet<String>,
}

static REGISTRY: LazyLock<Mutex<RegistryInner>> = LazyLock::new(Mutex::default);

fn lock() -> std::sync::MutexGuard<'static, RegistryInner> {
    // A poisoned registry would leave every sync group wedged; recover the
    // data instead.
    match REGISTRY.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Add `member` to `group`. If the group already has a snapshot the newcomer
/// receives it immediately.
pub fn register(group: &str, member: &Arc<dyn SyncMember>) {
    if group.is_empty() {
        return;
    }
    let catch_up = {
        let mut inner = lock();
        let slot = inner.members.entry(group.to_string()).or_default();
        slot.retain(|weak| weak.strong_count() > 0);
        slot.push(Arc::downgrade(member));
        inner.snapshots.get(group).cloned()
    };
    debug!(target: "sync", group, member = member.sync_id(), "member registered");
    if let Some(snapshot) = catch_up {
        apply_isolated(group, member.as_ref(), &snapshot.options);
    }
}

/// Remove a member from `group`; the group entry (members and snapshot) is
/// dropped entirely once its last member leaves.
pub fn unregister(group: &str, member_id: MemberId) {
    if group.is_empty() {
        return;
    }
    let mut inner = lock();
    let emptied = match inner.members.get_mut(group) {
        Some(slot) => {
            slot.retain(|weak| {
                weak.upgrade()
                    .is_some_and(|member| member.sync_id() != member_id)
            });
            slot.is_empty()
        }
        None => false,
    };
    if emptied {
        inner.members.remove(group);
        inner.snapshots.remove(group);
        debug!(target: "sync", group, "group dropped");
    }
}

/// Move a member between groups when its sync-group setting changes live.
pub fn migrate(old_group: &str, new_group: &str, member: &Arc<dyn SyncMember>) {
    unregister(old_group, member.sync_id());
    register(new_group, member);
}

/// Broadcast `options` to every member of `group` except `source`.
///
/// No-op when the group name is empty or the group is already broadcasting.
/// The snapshot version is bumped and stored even when the group currently
/// has no other members, so late joiners still catch up.
pub fn publish(group: &str, options: &[OptionItem], source: MemberId) {
    if group.is_empty() {
        return;
    }
    let targets = {
        let mut inner = lock();
        if inner.broadcasting.contains(group) {
            SYNC_REENTRANT_DROPS.fetch_add(1, Ordering::Relaxed);
            debug!(target: "sync", group, "re-entrant publish dropped");
            return;
        }
        inner.broadcasting.insert(group.to_string());
        let snapshot = inner.snapshots.entry(group.to_string()).or_default();
        snapshot.version += 1;
        snapshot.options = options.to_vec();
        live_members(&mut inner, group)
    };
    SYNC_PUBLISHES.fetch_add(1, Ordering::Relaxed);

    for member in &targets {
        if member.sync_id() == source {
            continue;
        }
        apply_isolated(group, member.as_ref(), options);
    }

    lock().broadcasting.remove(group);
}

/// Refresh every member of `group`: apply `payload` when given, otherwise
/// refetch remote-backed members and re-apply the stored snapshot to the
/// rest.
pub fn refresh(group: &str, payload: Option<&[OptionItem]>) {
    if group.is_empty() {
        return;
    }
    let (targets, snapshot) = {
        let mut inner = lock();
        let targets = live_members(&mut inner, group);
        (targets, inner.snapshots.get(group).cloned())
    };
    for member in &targets {
        if let Some(options) = payload {
            apply_isolated(group, member.as_ref(), options);
        } else if member.has_remote_source() {
            member.request_refetch();
        } else if let Some(snapshot) = &snapshot {
            apply_isolated(group, member.as_ref(), &snapshot.options);
        }
    }
}

/// [`refresh`] across every known group.
pub fn sync_all(payload: Option<&[OptionItem]>) {
    let groups: Vec<String> = lock().members.keys().cloned().collect();
    for group in groups {
        refresh(&group, payload);
    }
}

/// Current snapshot version for a group, if one was ever published.
pub fn snapshot_version(group: &str) -> Option<u64> {
    lock().snapshots.get(group).map(|s| s.version)
}

/// Stored snapshot options for a group.
pub fn snapshot_options(group: &str) -> Option<Vec<OptionItem>> {
    lock().snapshots.get(group).map(|s| s.options.clone())
}

/// Number of live members currently registered in a group.
pub fn group_len(group: &str) -> usize {
    let mut inner = lock();
    live_members(&mut inner, group).len()
}

fn live_members(inner: &mut RegistryInner, group: &str) -> Vec<Arc<dyn SyncMember>> {
    match inner.members.get_mut(group) {
        Some(slot) => {
            slot.retain(|weak| weak.strong_count() > 0);
            slot.iter().filter_map(Weak::upgrade).collect()
        }
        None => Vec::new(),
    }
}

fn apply_isolated(group: &str, member: &dyn SyncMember, options: &[OptionItem]) {
    if let Err(err) = member.apply_sync_snapshot(options) {
        SYNC_LISTENER_FAILURES.fetch_add(1, Ordering::Relaxed);
        warn!(
            target: "sync",
            group,
            member = member.sync_id(),
            error = %err,
            "snapshot handler failed; continuing with remaining members"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use core_options::{FieldMap, normalize_option};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    fn options(labels: &[&str]) -> Vec<OptionItem> {
        labels
            .iter()
            .map(|l| normalize_option(&json!({"id": *l, "label": *l}), &FieldMap::default()))
            .collect()
    }

    #[derive(Default)]
    struct Recorder {
        id: MemberId,
        applied: Mutex<Vec<Vec<String>>>,
        fail: bool,
        republish: Option<String>,
        remote: bool,
        refetches: AtomicU64,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: next_member_id(),
                ..Self::default()
            })
        }

        fn applied_count(&self) -> usize {
            self.applied.lock().unwrap().len()
        }
    }

    impl SyncMember for Recorder {
        fn sync_id(&self) -> MemberId {
            self.id
        }

        fn apply_sync_snapshot(&self, options: &[OptionItem]) -> anyhow::Result<()> {
            self.applied
                .lock()
                .unwrap()
                .push(options.iter().map(|o| o.label.clone()).collect());
            if let Some(group) = &self.republish {
                publish(group, options, self.id);
            }
            if self.fail {
                bail!("handler rejected snapshot");
            }
            Ok(())
        }

        fn has_remote_source(&self) -> bool {
            self.remote
        }

        fn request_refetch(&self) {
            self.refetches.fetch_add(1, Ordering::Relaxed);
        }
    }

    // Each test uses its own group name; the registry is process-wide.

    #[test]
    fn publish_excludes_source_and_reaches_everyone_else() {
        let a = Recorder::new();
        let b = Recorder::new();
        let c = Recorder::new();
        for m in [&a, &b, &c] {
            register("t-fanout", &(m.clone() as Arc<dyn SyncMember>));
        }
        publish("t-fanout", &options(&["one"]), a.id);
        assert_eq!(a.applied_count(), 0, "source must not receive its own publish");
        assert_eq!(b.applied_count(), 1);
        assert_eq!(c.applied_count(), 1);
        assert_eq!(b.applied.lock().unwrap()[0], vec!["one".to_string()]);
    }

    #[test]
    fn late_joiner_catches_up_from_snapshot() {
        let a = Recorder::new();
        register("t-catchup", &(a.clone() as Arc<dyn SyncMember>));
        publish("t-catchup", &options(&["x", "y"]), a.id);
        assert_eq!(snapshot_version("t-catchup"), Some(1));

        let late = Recorder::new();
        register("t-catchup", &(late.clone() as Arc<dyn SyncMember>));
        assert_eq!(late.applied_count(), 1);
        assert_eq!(
            late.applied.lock().unwrap()[0],
            vec!["x".to_string(), "y".to_string()]
        );
    }

    #[test]
    fn republishing_member_does_not_trigger_second_broadcast() {
        let a = Recorder::new();
        let b = Arc::new(Recorder {
            id: next_member_id(),
            republish: Some("t-reentrant".to_string()),
            ..Recorder::default()
        });
        let c = Recorder::new();
        register("t-reentrant", &(a.clone() as Arc<dyn SyncMember>));
        register("t-reentrant", &(b.clone() as Arc<dyn SyncMember>));
        register("t-reentrant", &(c.clone() as Arc<dyn SyncMember>));

        publish("t-reentrant", &options(&["loop"]), a.id);
        // b's republish was dropped by the broadcasting guard: everyone saw
        // exactly one application and the version advanced exactly once.
        assert_eq!(b.applied_count(), 1);
        assert_eq!(c.applied_count(), 1);
        assert_eq!(a.applied_count(), 0);
        assert_eq!(snapshot_version("t-reentrant"), Some(1));
    }

    #[test]
    fn failing_handler_does_not_block_remaining_members() {
        let a = Recorder::new();
        let failing = Arc::new(Recorder {
            id: next_member_id(),
            fail: true,
            ..Recorder::default()
        });
        let c = Recorder::new();
        register("t-isolate", &(a.clone() as Arc<dyn SyncMember>));
        register("t-isolate", &(failing.clone() as Arc<dyn SyncMember>));
        register("t-isolate", &(c.clone() as Arc<dyn SyncMember>));

        publish("t-isolate", &options(&["z"]), a.id);
        assert_eq!(failing.applied_count(), 1);
        assert_eq!(c.applied_count(), 1, "members after a failure still receive");
    }

    #[test]
    fn unregister_last_member_drops_group_and_snapshot() {
        let a = Recorder::new();
        register("t-drop", &(a.clone() as Arc<dyn SyncMember>));
        publish("t-drop", &options(&["gone"]), 0);
        assert!(snapshot_version("t-drop").is_some());
        unregister("t-drop", a.id);
        assert_eq!(group_len("t-drop"), 0);
        assert_eq!(snapshot_version("t-drop"), None);
    }

    #[test]
    fn migrate_moves_membership_between_groups() {
        let a = Recorder::new();
        let sibling = Recorder::new();
        register("t-old", &(a.clone() as Arc<dyn SyncMember>));
        register("t-new", &(sibling.clone() as Arc<dyn SyncMember>));
        publish("t-new", &options(&["seed"]), sibling.id);

        migrate("t-old", "t-new", &(a.clone() as Arc<dyn SyncMember>));
        assert_eq!(group_len("t-old"), 0);
        assert_eq!(group_len("t-new"), 2);
        // Catch-up applied the new group's snapshot on arrival.
        assert_eq!(a.applied_count(), 1);
        assert_eq!(a.applied.lock().unwrap()[0], vec!["seed".to_string()]);
    }

    #[test]
    fn refresh_routes_by_member_kind() {
        let plain = Recorder::new();
        let remote = Arc::new(Recorder {
            id: next_member_id(),
            remote: true,
            ..Recorder::default()
        });
        register("t-refresh", &(plain.clone() as Arc<dyn SyncMember>));
        register("t-refresh", &(remote.clone() as Arc<dyn SyncMember>));
        publish("t-refresh", &options(&["snap"]), 0);
        let before_plain = plain.applied_count();

        refresh("t-refresh", None);
        assert_eq!(remote.refetches.load(Ordering::Relaxed), 1);
        assert_eq!(plain.applied_count(), before_plain + 1);

        refresh("t-refresh", Some(&options(&["forced"])));
        assert_eq!(
            plain.applied.lock().unwrap().last().unwrap(),
            &vec!["forced".to_string()]
        );
        assert_eq!(
            remote.applied.lock().unwrap().last().unwrap(),
            &vec!["forced".to_string()],
            "payload refresh applies even to remote-backed members"
        );
    }

    #[test]
    fn dropped_members_are_pruned() {
        let a = Recorder::new();
        {
            let ephemeral = Recorder::new();
            register("t-prune", &(a.clone() as Arc<dyn SyncMember>));
            register("t-prune", &(ephemeral.clone() as Arc<dyn SyncMember>));
            assert_eq!(group_len("t-prune"), 2);
        }
        assert_eq!(group_len("t-prune"), 1);
    }
}
