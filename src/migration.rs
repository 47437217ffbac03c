//! One-time upgrade of data written by earlier releases.
//!
//! Version 0 kept everything under flat keys (`users`, `currentUser`,
//! `sessions`) with events embedded in each session. Version 1 moved the auth
//! data to namespaced keys and version 2 split the event logs out of the
//! session records. Every step is best-effort: data that cannot be parsed is
//! left where it is and the step is still marked as done.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::model::{Session, SessionEvent, SessionOption, User};
use crate::session::DEFAULT_SESSION_NAME;
use crate::storage::{Batch, Storage, StorageKey};

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// A session as stored under the legacy combined key. Covers both the numeric
/// score shape and the option/event shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySession {
    id: String,
    user_id: String,
    #[serde(default)]
    name: Option<String>,
    start_date: DateTime<Utc>,
    #[serde(default)]
    end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    scores: Vec<f64>,
    #[serde(default)]
    options: Vec<SessionOption>,
    #[serde(default)]
    events: Vec<SessionEvent>,
    #[serde(default)]
    is_active: bool,
}

impl LegacySession {
    fn split(self) -> (Session, Vec<SessionEvent>) {
        let session = Session {
            id: self.id,
            user_id: self.user_id,
            name: self
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string()),
            start_date: self.start_date,
            end_date: self.end_date,
            options: self.options,
            scores: self.scores,
            is_active: self.is_active,
        };
        (session, self.events)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub users_moved: usize,
    pub sessions_moved: usize,
    pub events_moved: usize,
    pub event_logs_pruned: usize,
}

impl MigrationReport {
    pub fn changed(&self) -> bool {
        self.from_version != self.to_version
    }
}

pub fn schema_version(storage: &Storage) -> u32 {
    storage
        .read_json(&StorageKey::SchemaVersion)
        .unwrap_or(0)
}

/// Bring the store up to [`CURRENT_SCHEMA_VERSION`]. Safe to call on every start.
pub fn migrate(storage: &Storage) -> Result<MigrationReport, StoreError> {
    let from_version = schema_version(storage);
    let mut report = MigrationReport {
        from_version,
        to_version: from_version,
        ..Default::default()
    };

    if from_version > CURRENT_SCHEMA_VERSION {
        warn!(
            version = from_version,
            supported = CURRENT_SCHEMA_VERSION,
            "store was written by a newer release, leaving it untouched"
        );
        return Ok(report);
    }

    if report.to_version < 1 {
        report.users_moved = migrate_auth_keys(storage)?;
        report.to_version = 1;
    }
    if report.to_version < 2 {
        let (sessions, events) = split_legacy_sessions(storage)?;
        report.sessions_moved = sessions;
        report.events_moved = events;
        report.to_version = 2;
    }

    report.event_logs_pruned = prune_orphaned_event_logs(storage)?;

    if report.changed() {
        info!(
            from = report.from_version,
            to = report.to_version,
            users = report.users_moved,
            sessions = report.sessions_moved,
            events = report.events_moved,
            "migrated store"
        );
    }
    Ok(report)
}

/// Drop event logs whose session is no longer in the index.
///
/// Skipped when the index exists but cannot be decoded, since every log would
/// then look orphaned.
pub fn prune_orphaned_event_logs(storage: &Storage) -> Result<usize, StoreError> {
    let sessions: Vec<Session> = match storage.read_raw(&StorageKey::Sessions) {
        None => vec![],
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, "session index is unreadable, keeping all event logs");
                return Ok(0);
            }
        },
    };

    let mut batch = Batch::new();
    let mut pruned = 0;
    for id in storage.event_log_ids()? {
        if !sessions.iter().any(|s| s.id == id) {
            batch.remove(&StorageKey::Events(id));
            pruned += 1;
        }
    }

    if pruned > 0 {
        info!(count = pruned, "removing orphaned event logs");
        storage.apply(batch)?;
    }
    Ok(pruned)
}

fn migrate_auth_keys(storage: &Storage) -> Result<usize, StoreError> {
    let mut batch = Batch::new();
    let mut moved = 0;

    if let Some(raw) = storage.read_raw(&StorageKey::LegacyUsers) {
        match serde_json::from_str::<Vec<User>>(&raw) {
            Ok(legacy) => {
                let mut users: Vec<User> = storage.read_list(&StorageKey::Users);
                for user in legacy {
                    if !users.iter().any(|u| u.username == user.username) {
                        users.push(user);
                        moved += 1;
                    }
                }
                batch
                    .set_json(&StorageKey::Users, &users)?
                    .remove(&StorageKey::LegacyUsers);
            }
            Err(e) => warn!(error = %e, "legacy user list is unreadable, leaving it in place"),
        }
    }

    if let Some(raw) = storage.read_raw(&StorageKey::LegacyCurrentUser) {
        match serde_json::from_str::<User>(&raw) {
            Ok(user) => {
                if !storage.contains(&StorageKey::CurrentUser) {
                    batch.set_json(&StorageKey::CurrentUser, &user)?;
                }
                batch.remove(&StorageKey::LegacyCurrentUser);
            }
            Err(e) => warn!(error = %e, "legacy current user is unreadable, leaving it in place"),
        }
    }

    batch.set_json(&StorageKey::SchemaVersion, &1u32)?;
    storage.apply(batch)?;
    Ok(moved)
}

fn split_legacy_sessions(storage: &Storage) -> Result<(usize, usize), StoreError> {
    let mut batch = Batch::new();
    let mut moved = (0, 0);

    if let Some(raw) = storage.read_raw(&StorageKey::LegacySessions) {
        match serde_json::from_str::<Vec<LegacySession>>(&raw) {
            Ok(legacy) => {
                let mut sessions: Vec<Session> = storage.read_list(&StorageKey::Sessions);
                for (session, events) in legacy.into_iter().map(LegacySession::split) {
                    if sessions.iter().any(|s| s.id == session.id) {
                        continue;
                    }
                    if !events.is_empty() {
                        moved.1 += events.len();
                        batch.set_json(&StorageKey::Events(session.id.clone()), &events)?;
                    }
                    sessions.push(session);
                    moved.0 += 1;
                }
                batch
                    .set_json(&StorageKey::Sessions, &sessions)?
                    .remove(&StorageKey::LegacySessions);
            }
            Err(e) => warn!(error = %e, "legacy session list is unreadable, leaving it in place"),
        }
    }

    batch.set_json(&StorageKey::SchemaVersion, &2u32)?;
    storage.apply(batch)?;
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Outcome;

    const LEGACY_SESSIONS: &str = r#"[
        {
            "id": "lq1a2b3c",
            "userId": "ana",
            "name": "Chess",
            "startDate": "2024-03-01T10:00:00.000Z",
            "endDate": "2024-03-01T11:00:00.000Z",
            "options": [
                {"label": "Win", "outcome": "victory", "count": 2},
                {"label": "Loss", "outcome": "defeat", "count": 1}
            ],
            "events": [
                {"optionLabel": "Win", "outcome": "victory", "timestamp": "2024-03-01T10:10:00.000Z"},
                {"optionLabel": "Loss", "outcome": "defeat", "timestamp": "2024-03-01T10:20:00.000Z"},
                {"optionLabel": "Win", "outcome": "victory", "timestamp": "2024-03-01T10:30:00.000Z"}
            ],
            "isActive": false
        },
        {
            "id": "lq9z8y7x",
            "userId": "ana",
            "startDate": "2024-03-02T09:00:00.000Z",
            "scores": [10, 4.5],
            "isActive": true
        }
    ]"#;

    #[test]
    fn fresh_store_is_stamped_with_current_version() {
        let storage = Storage::in_memory();
        let report = migrate(&storage).unwrap();
        assert_eq!(report.from_version, 0);
        assert_eq!(report.to_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(schema_version(&storage), CURRENT_SCHEMA_VERSION);
        assert!(!storage.contains(&StorageKey::Sessions));
    }

    #[test]
    fn splits_legacy_sessions_and_events() {
        let storage = Storage::in_memory();
        storage
            .write_raw(&StorageKey::LegacySessions, LEGACY_SESSIONS)
            .unwrap();

        let report = migrate(&storage).unwrap();
        assert_eq!(report.sessions_moved, 2);
        assert_eq!(report.events_moved, 3);
        assert!(!storage.contains(&StorageKey::LegacySessions));

        let sessions: Vec<Session> = storage.read_list(&StorageKey::Sessions);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].name, "Chess");
        assert_eq!(sessions[0].options[0].count, 2);
        assert_eq!(sessions[1].name, DEFAULT_SESSION_NAME);
        assert_eq!(sessions[1].scores, vec![10.0, 4.5]);
        assert!(sessions[1].is_active);

        let events: Vec<SessionEvent> =
            storage.read_list(&StorageKey::Events("lq1a2b3c".into()));
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].outcome, Outcome::Defeat);
        assert!(!storage.contains(&StorageKey::Events("lq9z8y7x".into())));

        // the stored session records carry no embedded events
        let raw = storage.read_raw(&StorageKey::Sessions).unwrap();
        assert!(!raw.contains("optionLabel"));
    }

    #[test]
    fn moves_legacy_auth_keys() {
        let storage = Storage::in_memory();
        storage
            .write_raw(
                &StorageKey::LegacyUsers,
                r#"[{"username":"ana","password":"pw"},{"username":"bob","password":"x"}]"#,
            )
            .unwrap();
        storage
            .write_raw(
                &StorageKey::LegacyCurrentUser,
                r#"{"username":"ana","password":"pw"}"#,
            )
            .unwrap();

        let report = migrate(&storage).unwrap();
        assert_eq!(report.users_moved, 2);

        let users: Vec<User> = storage.read_list(&StorageKey::Users);
        assert_eq!(users.len(), 2);
        let current: Option<User> = storage.read_json(&StorageKey::CurrentUser);
        assert_eq!(current.unwrap().username, "ana");
        assert!(!storage.contains(&StorageKey::LegacyUsers));
        assert!(!storage.contains(&StorageKey::LegacyCurrentUser));
    }

    #[test]
    fn unparseable_legacy_data_is_left_alone() {
        let storage = Storage::in_memory();
        storage
            .write_raw(&StorageKey::LegacySessions, "[{\"id\": oops")
            .unwrap();

        let report = migrate(&storage).unwrap();
        assert_eq!(report.sessions_moved, 0);
        assert_eq!(schema_version(&storage), CURRENT_SCHEMA_VERSION);
        assert!(storage.contains(&StorageKey::LegacySessions));
        assert!(!storage.contains(&StorageKey::Sessions));
    }

    #[test]
    fn migration_runs_once() {
        let storage = Storage::in_memory();
        storage
            .write_raw(&StorageKey::LegacySessions, LEGACY_SESSIONS)
            .unwrap();
        migrate(&storage).unwrap();

        // legacy data reappearing after the upgrade is not picked up again
        storage
            .write_raw(&StorageKey::LegacySessions, LEGACY_SESSIONS)
            .unwrap();
        let report = migrate(&storage).unwrap();
        assert!(!report.changed());
        assert_eq!(report.sessions_moved, 0);
        assert_eq!(storage.read_list::<Session>(&StorageKey::Sessions).len(), 2);
    }

    #[test]
    fn orphaned_event_logs_are_pruned() {
        let storage = Storage::in_memory();
        storage
            .write_raw(&StorageKey::LegacySessions, LEGACY_SESSIONS)
            .unwrap();
        migrate(&storage).unwrap();
        storage
            .write_raw(&StorageKey::Events("gone".into()), "[]")
            .unwrap();

        let report = migrate(&storage).unwrap();
        assert_eq!(report.event_logs_pruned, 1);
        assert!(!storage.contains(&StorageKey::Events("gone".into())));
        assert!(storage.contains(&StorageKey::Events("lq1a2b3c".into())));
    }

    #[test]
    fn unreadable_index_keeps_event_logs() {
        let storage = Storage::in_memory();
        storage
            .write_json(&StorageKey::SchemaVersion, &CURRENT_SCHEMA_VERSION)
            .unwrap();
        storage.write_raw(&StorageKey::Sessions, "[{broken").unwrap();
        storage
            .write_raw(&StorageKey::Events("lq1a2b3c".into()), "[]")
            .unwrap();

        let report = migrate(&storage).unwrap();
        assert_eq!(report.event_logs_pruned, 0);
        assert!(storage.contains(&StorageKey::Events("lq1a2b3c".into())));
    }

    #[test]
    fn newer_store_is_not_touched() {
        let storage = Storage::in_memory();
        storage
            .write_json(&StorageKey::SchemaVersion, &(CURRENT_SCHEMA_VERSION + 1))
            .unwrap();
        storage
            .write_raw(&StorageKey::LegacySessions, LEGACY_SESSIONS)
            .unwrap();

        let report = migrate(&storage).unwrap();
        assert!(!report.changed());
        assert!(storage.contains(&StorageKey::LegacySessions));
    }
}
