use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
}

impl User {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Outcome {
    Victory,
    Defeat,
}

/// A label/outcome pair a session is started with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionTemplate {
    pub label: String,
    pub outcome: Outcome,
}

impl OptionTemplate {
    pub fn new(label: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            label: label.into(),
            outcome,
        }
    }
}

/// A named outcome bucket with a running tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOption {
    pub label: String,
    pub outcome: Outcome,
    pub count: u32,
}

impl From<&OptionTemplate> for SessionOption {
    fn from(t: &OptionTemplate) -> Self {
        Self {
            label: t.label.clone(),
            outcome: t.outcome,
            count: 0,
        }
    }
}

/// One recorded outcome; never modified after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub option_label: String,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub start_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub options: Vec<SessionOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scores: Vec<f64>,
    pub is_active: bool,
}

impl Session {
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(6)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }

    pub fn option(&self, label: &str) -> Option<&SessionOption> {
        self.options.iter().find(|o| o.label == label)
    }

    pub fn option_mut(&mut self, label: &str, outcome: Outcome) -> Option<&mut SessionOption> {
        self.options
            .iter_mut()
            .find(|o| o.label == label && o.outcome == outcome)
    }

    /// Close the session at `at`; does nothing when already closed
    pub fn close(&mut self, at: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        self.is_active = false;
        self.end_date = Some(at);
        true
    }
}
