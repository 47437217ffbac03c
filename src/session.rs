use chrono::{DateTime, Duration, SubsecRound, Utc};
use itertools::Itertools;
use rand::Rng;
use tracing::{info, warn};

use crate::auth::AuthService;
use crate::error::SessionError;
use crate::model::{OptionTemplate, Outcome, Session, SessionEvent, SessionOption};
use crate::stats::{self, HistorySummary, ScoreStats, SessionStats};
use crate::storage::{Batch, Storage, StorageKey};

pub const DEFAULT_SESSION_NAME: &str = "Session";

/// The option set used when a session is started without any
pub fn default_option_templates() -> Vec<OptionTemplate> {
    vec![
        OptionTemplate::new("Victory", Outcome::Victory),
        OptionTemplate::new("Defeat", Outcome::Defeat),
    ]
}

/// Session bookkeeping for the logged-in user.
///
/// Session records live in one list under [`StorageKey::Sessions`]; each
/// session's events live under their own [`StorageKey::Events`] key. Writes
/// touching both go through a single batch.
pub struct SessionService<'a> {
    storage: &'a Storage,
}

impl<'a> SessionService<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    fn current_user_id(&self) -> Result<String, SessionError> {
        AuthService::new(self.storage)
            .current_user()
            .map(|u| u.username)
            .ok_or(SessionError::NotLoggedIn)
    }

    fn all_sessions(&self) -> Vec<Session> {
        self.storage.read_list(&StorageKey::Sessions)
    }

    fn events_of(&self, session_id: &str) -> Vec<SessionEvent> {
        self.storage
            .read_list(&StorageKey::Events(session_id.to_string()))
    }

    /// Locate a session owned by the current user, returning the full list and its index
    fn find_owned(&self, session_id: &str) -> Result<(Vec<Session>, usize), SessionError> {
        let user_id = self.current_user_id()?;
        let sessions = self.all_sessions();
        let idx = sessions
            .iter()
            .position(|s| s.id == session_id && s.user_id == user_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        Ok((sessions, idx))
    }

    pub fn start_session(
        &self,
        name: &str,
        options: &[OptionTemplate],
    ) -> Result<Session, SessionError> {
        let user_id = self.current_user_id()?;
        let templates = if options.is_empty() {
            default_option_templates()
        } else {
            validate_options(options)?;
            options.to_vec()
        };

        let now = Utc::now();
        let mut sessions = self.all_sessions();
        for prior in sessions
            .iter_mut()
            .filter(|s| s.user_id == user_id && s.is_active)
        {
            info!(session = %prior.id, "ending previous active session");
            prior.close(now);
        }

        let name = name.trim();
        let session = Session {
            id: generate_id(),
            user_id,
            name: if name.is_empty() {
                DEFAULT_SESSION_NAME.to_string()
            } else {
                name.to_string()
            },
            start_date: now,
            end_date: None,
            options: templates.iter().map(SessionOption::from).collect(),
            scores: vec![],
            is_active: true,
        };
        sessions.push(session.clone());
        self.storage.write_json(&StorageKey::Sessions, &sessions)?;

        info!(session = %session.id, name = %session.name, "started session");
        Ok(session)
    }

    pub fn end_session(&self, session_id: &str) -> Result<Session, SessionError> {
        let (mut sessions, idx) = self.find_owned(session_id)?;
        if !sessions[idx].close(Utc::now()) {
            return Err(SessionError::NotActive(session_id.to_string()));
        }
        self.storage.write_json(&StorageKey::Sessions, &sessions)?;

        info!(session = %session_id, "ended session");
        Ok(sessions.swap_remove(idx))
    }

    /// Remove a session and its event log. Returns false when there was nothing to delete.
    pub fn delete_session(&self, session_id: &str) -> Result<bool, SessionError> {
        let (mut sessions, idx) = match self.find_owned(session_id) {
            Ok(found) => found,
            Err(SessionError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        sessions.remove(idx);

        let mut batch = Batch::new();
        batch
            .set_json(&StorageKey::Sessions, &sessions)?
            .remove(&StorageKey::Events(session_id.to_string()));
        self.storage.apply(batch)?;

        info!(session = %session_id, "deleted session");
        Ok(true)
    }

    pub fn add_outcome(
        &self,
        session_id: &str,
        option_label: &str,
    ) -> Result<SessionEvent, SessionError> {
        let (mut sessions, idx) = self.find_owned(session_id)?;
        let session = &mut sessions[idx];
        if !session.is_active {
            return Err(SessionError::NotActive(session_id.to_string()));
        }

        let option = session
            .options
            .iter_mut()
            .find(|o| o.label == option_label)
            .ok_or_else(|| SessionError::UnknownOption(option_label.to_string()))?;
        option.count += 1;

        let mut events = self.events_of(session_id);
        let event = SessionEvent {
            option_label: option.label.clone(),
            outcome: option.outcome,
            timestamp: next_timestamp(events.last().map(|e| e.timestamp)),
        };
        events.push(event.clone());

        let mut batch = Batch::new();
        batch
            .set_json(&StorageKey::Sessions, &sessions)?
            .set_json(&StorageKey::Events(session_id.to_string()), &events)?;
        self.storage.apply(batch)?;

        Ok(event)
    }

    /// Remove the first event recorded at `timestamp`, compensating the option tally
    pub fn take_event(
        &self,
        session_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<SessionEvent, SessionError> {
        let (mut sessions, idx) = self.find_owned(session_id)?;

        let mut events = self.events_of(session_id);
        let pos = events
            .iter()
            .position(|e| e.timestamp == timestamp)
            .ok_or_else(|| SessionError::EventNotFound {
                session_id: session_id.to_string(),
                timestamp,
            })?;
        let removed = events.remove(pos);

        if let Some(option) = sessions[idx].option_mut(&removed.option_label, removed.outcome) {
            option.count = option.count.saturating_sub(1);
        } else {
            warn!(
                session = %session_id,
                label = %removed.option_label,
                "removed event has no matching option"
            );
        }

        let mut batch = Batch::new();
        batch
            .set_json(&StorageKey::Sessions, &sessions)?
            .set_json(&StorageKey::Events(session_id.to_string()), &events)?;
        self.storage.apply(batch)?;

        Ok(removed)
    }

    /// Like [`Self::take_event`], reporting a missing session or event as `false`
    pub fn remove_event(
        &self,
        session_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        match self.take_event(session_id, timestamp) {
            Ok(_) => Ok(true),
            Err(SessionError::NotFound(_) | SessionError::EventNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove the most recent event of a session, if any
    pub fn undo_last_event(&self, session_id: &str) -> Result<bool, SessionError> {
        match self.events_of(session_id).last() {
            Some(last) => self.remove_event(session_id, last.timestamp),
            None => Ok(false),
        }
    }

    /// Record a raw numeric score (the original scoring mode)
    pub fn add_score(&self, session_id: &str, score: f64) -> Result<(), SessionError> {
        // JSON has no encoding for inf/NaN and the whole index would fail to decode
        if !score.is_finite() {
            return Err(SessionError::InvalidScore(score));
        }
        let (mut sessions, idx) = self.find_owned(session_id)?;
        if !sessions[idx].is_active {
            return Err(SessionError::NotActive(session_id.to_string()));
        }
        sessions[idx].scores.push(score);
        self.storage.write_json(&StorageKey::Sessions, &sessions)?;
        Ok(())
    }

    pub fn active_session(&self) -> Option<Session> {
        let user_id = self.current_user_id().ok()?;
        self.all_sessions()
            .into_iter()
            .find(|s| s.is_active && s.user_id == user_id)
    }

    /// The current user's sessions, newest first
    pub fn user_sessions(&self) -> Vec<Session> {
        let Ok(user_id) = self.current_user_id() else {
            return vec![];
        };
        self.all_sessions()
            .into_iter()
            .filter(|s| s.user_id == user_id)
            .sorted_by(|a, b| b.start_date.cmp(&a.start_date))
            .collect()
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.find_owned(session_id)
            .ok()
            .map(|(mut sessions, idx)| sessions.swap_remove(idx))
    }

    pub fn session_events(&self, session_id: &str) -> Vec<SessionEvent> {
        match self.find_owned(session_id) {
            Ok(_) => self.events_of(session_id),
            Err(_) => vec![],
        }
    }

    pub fn session_stats(&self, session: &Session) -> SessionStats {
        stats::session_stats(session)
    }

    pub fn score_stats(&self, session: &Session) -> ScoreStats {
        stats::score_stats(&session.scores)
    }

    pub fn history_summary(&self) -> HistorySummary {
        stats::history_summary(&self.user_sessions())
    }
}

fn validate_options(options: &[OptionTemplate]) -> Result<(), SessionError> {
    if let Some(blank) = options.iter().position(|o| o.label.trim().is_empty()) {
        return Err(SessionError::InvalidOptions(format!(
            "option {} has an empty label",
            blank + 1
        )));
    }
    if let Some(dup) = options.iter().duplicates_by(|o| &o.label).next() {
        return Err(SessionError::InvalidOptions(format!(
            "label {:?} is used more than once",
            dup.label
        )));
    }
    Ok(())
}

/// Millisecond timestamp strictly after `previous`, so a timestamp identifies one event
fn next_timestamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(3);
    match previous {
        Some(prev) if now <= prev => prev + Duration::milliseconds(1),
        _ => now,
    }
}

/// Base-36 millisecond timestamp followed by random base-36 characters
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| std::char::from_digit(rng.gen_range(0..36), 36).unwrap_or('0'))
        .collect();
    format!("{}{}", to_base36(Utc::now().timestamp_millis().max(0) as u64), suffix)
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(std::char::from_digit((n % 36) as u32, 36).unwrap_or('0'));
        n /= 36;
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;
    use assert_matches::assert_matches;

    fn logged_in(storage: &Storage, name: &str) {
        let auth = AuthService::new(storage);
        let _ = auth.register(User::new(name, "pw"));
        auth.login(name, "pw").unwrap();
    }

    fn chess_options() -> Vec<OptionTemplate> {
        vec![
            OptionTemplate::new("Checkmate", Outcome::Victory),
            OptionTemplate::new("Timeout win", Outcome::Victory),
            OptionTemplate::new("Resigned", Outcome::Defeat),
        ]
    }

    #[test]
    fn base36_encoding() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "loyw3v28");
    }

    #[test]
    fn generated_ids_are_distinct() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn next_timestamp_is_strictly_increasing() {
        let far_future = Utc::now() + Duration::hours(1);
        let next = next_timestamp(Some(far_future));
        assert_eq!(next, far_future + Duration::milliseconds(1));
        assert!(next_timestamp(None) <= Utc::now());
    }

    #[test]
    fn requires_login() {
        let storage = Storage::in_memory();
        let service = SessionService::new(&storage);
        assert_matches!(
            service.start_session("x", &[]),
            Err(SessionError::NotLoggedIn)
        );
        assert!(service.active_session().is_none());
        assert!(service.user_sessions().is_empty());
    }

    #[test]
    fn start_uses_defaults_for_blank_input() {
        let storage = Storage::in_memory();
        logged_in(&storage, "ana");
        let service = SessionService::new(&storage);

        let s = service.start_session("   ", &[]).unwrap();
        assert_eq!(s.name, DEFAULT_SESSION_NAME);
        assert_eq!(s.options.len(), 2);
        assert!(s.options.iter().all(|o| o.count == 0));
        assert!(s.is_active);
        assert!(service.session_events(&s.id).is_empty());
    }

    #[test]
    fn start_rejects_invalid_options() {
        let storage = Storage::in_memory();
        logged_in(&storage, "ana");
        let service = SessionService::new(&storage);

        let dup = vec![
            OptionTemplate::new("Win", Outcome::Victory),
            OptionTemplate::new("Win", Outcome::Defeat),
        ];
        assert_matches!(
            service.start_session("x", &dup),
            Err(SessionError::InvalidOptions(_))
        );

        let blank = vec![OptionTemplate::new(" ", Outcome::Victory)];
        assert_matches!(
            service.start_session("x", &blank),
            Err(SessionError::InvalidOptions(_))
        );
        assert!(service.user_sessions().is_empty());
    }

    #[test]
    fn starting_a_session_ends_the_previous_one() {
        let storage = Storage::in_memory();
        logged_in(&storage, "ana");
        let service = SessionService::new(&storage);

        let first = service.start_session("one", &chess_options()).unwrap();
        let second = service.start_session("two", &chess_options()).unwrap();

        let first = service.session(&first.id).unwrap();
        assert!(!first.is_active);
        assert!(first.end_date.is_some());
        assert_eq!(service.active_session().unwrap().id, second.id);
        assert_eq!(
            service.user_sessions().iter().filter(|s| s.is_active).count(),
            1
        );
    }

    #[test]
    fn sessions_are_scoped_to_their_owner() {
        let storage = Storage::in_memory();
        logged_in(&storage, "ana");
        let ana_session = SessionService::new(&storage)
            .start_session("ana's", &[])
            .unwrap();

        logged_in(&storage, "bob");
        let service = SessionService::new(&storage);
        assert!(service.active_session().is_none());
        assert!(service.user_sessions().is_empty());
        assert_matches!(
            service.add_outcome(&ana_session.id, "Victory"),
            Err(SessionError::NotFound(_))
        );
        assert!(!service.delete_session(&ana_session.id).unwrap());

        // bob starting a session leaves ana's active
        service.start_session("bob's", &[]).unwrap();
        logged_in(&storage, "ana");
        assert_eq!(
            SessionService::new(&storage).active_session().unwrap().id,
            ana_session.id
        );
    }

    #[test]
    fn end_session_only_when_active() {
        let storage = Storage::in_memory();
        logged_in(&storage, "ana");
        let service = SessionService::new(&storage);
        let s = service.start_session("x", &[]).unwrap();

        let ended = service.end_session(&s.id).unwrap();
        assert!(!ended.is_active);
        let end_date = ended.end_date.unwrap();

        assert_matches!(service.end_session(&s.id), Err(SessionError::NotActive(_)));
        assert_eq!(service.session(&s.id).unwrap().end_date, Some(end_date));
        assert!(service.active_session().is_none());
    }

    #[test]
    fn add_outcome_increments_and_logs() {
        let storage = Storage::in_memory();
        logged_in(&storage, "ana");
        let service = SessionService::new(&storage);
        let s = service.start_session("chess", &chess_options()).unwrap();

        let event = service.add_outcome(&s.id, "Resigned").unwrap();
        assert_eq!(event.option_label, "Resigned");
        assert_eq!(event.outcome, Outcome::Defeat);

        let s = service.session(&s.id).unwrap();
        assert_eq!(s.option("Resigned").unwrap().count, 1);
        assert_eq!(s.option("Checkmate").unwrap().count, 0);
        assert_eq!(service.session_events(&s.id), vec![event]);
    }

    #[test]
    fn add_outcome_rejects_inactive_and_unknown() {
        let storage = Storage::in_memory();
        logged_in(&storage, "ana");
        let service = SessionService::new(&storage);
        let s = service.start_session("chess", &chess_options()).unwrap();

        assert_matches!(
            service.add_outcome(&s.id, "Stalemate"),
            Err(SessionError::UnknownOption(_))
        );

        service.end_session(&s.id).unwrap();
        let before = service.session(&s.id).unwrap();
        assert_matches!(
            service.add_outcome(&s.id, "Checkmate"),
            Err(SessionError::NotActive(_))
        );
        assert_eq!(service.session(&s.id).unwrap(), before);
        assert!(service.session_events(&s.id).is_empty());
    }

    #[test]
    fn remove_event_decrements_matching_option() {
        let storage = Storage::in_memory();
        logged_in(&storage, "ana");
        let service = SessionService::new(&storage);
        let s = service.start_session("chess", &chess_options()).unwrap();

        let first = service.add_outcome(&s.id, "Checkmate").unwrap();
        let second = service.add_outcome(&s.id, "Checkmate").unwrap();
        let third = service.add_outcome(&s.id, "Resigned").unwrap();
        assert!(first.timestamp < second.timestamp);

        assert!(service.remove_event(&s.id, second.timestamp).unwrap());
        let after = service.session(&s.id).unwrap();
        assert_eq!(after.option("Checkmate").unwrap().count, 1);
        assert_eq!(after.option("Resigned").unwrap().count, 1);
        assert_eq!(service.session_events(&s.id), vec![first, third]);

        assert!(!service.remove_event(&s.id, second.timestamp).unwrap());
        assert_matches!(
            service.take_event(&s.id, second.timestamp),
            Err(SessionError::EventNotFound { .. })
        );
        assert_matches!(
            service.take_event("missing", second.timestamp),
            Err(SessionError::NotFound(_))
        );
    }

    #[test]
    fn remove_event_never_goes_below_zero() {
        let storage = Storage::in_memory();
        logged_in(&storage, "ana");
        let service = SessionService::new(&storage);
        let s = service.start_session("chess", &chess_options()).unwrap();
        let event = service.add_outcome(&s.id, "Checkmate").unwrap();

        // Simulate a tally that drifted below the log
        let mut sessions: Vec<Session> = storage.read_list(&StorageKey::Sessions);
        sessions[0].options[0].count = 0;
        storage.write_json(&StorageKey::Sessions, &sessions).unwrap();

        assert!(service.remove_event(&s.id, event.timestamp).unwrap());
        assert_eq!(
            service.session(&s.id).unwrap().option("Checkmate").unwrap().count,
            0
        );
    }

    #[test]
    fn undo_removes_latest_event() {
        let storage = Storage::in_memory();
        logged_in(&storage, "ana");
        let service = SessionService::new(&storage);
        let s = service.start_session("x", &[]).unwrap();

        assert!(!service.undo_last_event(&s.id).unwrap());
        service.add_outcome(&s.id, "Victory").unwrap();
        service.add_outcome(&s.id, "Defeat").unwrap();

        assert!(service.undo_last_event(&s.id).unwrap());
        let events = service.session_events(&s.id);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].option_label, "Victory");
        assert_eq!(
            service.session(&s.id).unwrap().option("Defeat").unwrap().count,
            0
        );
    }

    #[test]
    fn delete_removes_session_and_event_log() {
        let storage = Storage::in_memory();
        logged_in(&storage, "ana");
        let service = SessionService::new(&storage);
        let s = service.start_session("x", &[]).unwrap();
        service.add_outcome(&s.id, "Victory").unwrap();
        assert!(storage.contains(&StorageKey::Events(s.id.clone())));

        assert!(service.delete_session(&s.id).unwrap());
        assert!(service.user_sessions().is_empty());
        assert!(service.session_events(&s.id).is_empty());
        assert!(!storage.contains(&StorageKey::Events(s.id.clone())));
        assert!(!service.delete_session(&s.id).unwrap());
    }

    #[test]
    fn numeric_scores_on_active_sessions_only() {
        let storage = Storage::in_memory();
        logged_in(&storage, "ana");
        let service = SessionService::new(&storage);
        let s = service.start_session("darts", &[]).unwrap();

        service.add_score(&s.id, 10.0).unwrap();
        service.add_score(&s.id, 4.0).unwrap();
        let stats = service.score_stats(&service.session(&s.id).unwrap());
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total, 14.0);

        service.end_session(&s.id).unwrap();
        assert_matches!(service.add_score(&s.id, 1.0), Err(SessionError::NotActive(_)));
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        let storage = Storage::in_memory();
        logged_in(&storage, "ana");
        let service = SessionService::new(&storage);
        let older = service.start_session("older", &[]).unwrap();
        service.add_outcome(&older.id, "Victory").unwrap();
        let s = service.start_session("darts", &[]).unwrap();
        service.add_score(&s.id, 3.0).unwrap();

        for bad in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            assert_matches!(
                service.add_score(&s.id, bad),
                Err(SessionError::InvalidScore(_))
            );
        }

        assert_eq!(service.user_sessions().len(), 2);
        assert_eq!(service.session(&s.id).unwrap().scores, vec![3.0]);
        assert_eq!(service.session_events(&older.id).len(), 1);
    }

    #[test]
    fn user_sessions_newest_first() {
        let storage = Storage::in_memory();
        logged_in(&storage, "ana");
        let service = SessionService::new(&storage);
        let a = service.start_session("a", &[]).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = service.start_session("b", &[]).unwrap();

        let ids: Vec<String> = service.user_sessions().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }
}
