use serde::Serialize;

use crate::model::{Outcome, Session};
use crate::util::{mean, percentage};

/// Win/loss totals of one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub total: u32,
    pub victories: u32,
    pub defeats: u32,
    pub balance: i64,
}

/// Summary of a raw numeric score list
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreStats {
    pub total: f64,
    pub avg: f64,
    pub max: f64,
    pub min: f64,
    pub count: usize,
}

/// Totals across all of a user's sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HistorySummary {
    pub sessions: usize,
    pub victories: u32,
    pub defeats: u32,
    pub balance: i64,
    pub win_rate: f64,
}

/// One option's tally and its share of the session's outcomes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionCount {
    pub label: String,
    pub outcome: Outcome,
    pub count: u32,
    pub share: f64,
}

/// Per-option tallies in option order; shares are percentages of the session total
pub fn outcome_counts(session: &Session) -> Vec<OptionCount> {
    let total = session_stats(session).total;
    session
        .options
        .iter()
        .map(|o| OptionCount {
            label: o.label.clone(),
            outcome: o.outcome,
            count: o.count,
            share: percentage(o.count, total),
        })
        .collect()
}

pub fn session_stats(session: &Session) -> SessionStats {
    let (victories, defeats) =
        session
            .options
            .iter()
            .fold((0u32, 0u32), |(v, d), o| match o.outcome {
                Outcome::Victory => (v + o.count, d),
                Outcome::Defeat => (v, d + o.count),
            });

    SessionStats {
        total: victories + defeats,
        victories,
        defeats,
        balance: victories as i64 - defeats as i64,
    }
}

/// Sum, average, extremes and count; all zero for an empty list
pub fn score_stats(scores: &[f64]) -> ScoreStats {
    let Some(avg) = mean(scores) else {
        return ScoreStats::default();
    };

    ScoreStats {
        total: scores.iter().sum(),
        avg: (avg * 100.0).round() / 100.0,
        max: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        min: scores.iter().copied().fold(f64::INFINITY, f64::min),
        count: scores.len(),
    }
}

pub fn history_summary(sessions: &[Session]) -> HistorySummary {
    let (victories, defeats) = sessions
        .iter()
        .map(session_stats)
        .fold((0u32, 0u32), |(v, d), s| (v + s.victories, d + s.defeats));

    HistorySummary {
        sessions: sessions.len(),
        victories,
        defeats,
        balance: victories as i64 - defeats as i64,
        win_rate: percentage(victories, victories + defeats),
    }
}
