use std::io::Write;

use serde::Serialize;

use crate::error::ExportError;
use crate::model::Session;
use crate::session::SessionService;
use crate::stats::session_stats;

const HEADER: [&str; 10] = [
    "id",
    "name",
    "start",
    "end",
    "active",
    "victories",
    "defeats",
    "balance",
    "events",
    "scores",
];

#[derive(Debug, Serialize)]
struct HistoryRow<'a> {
    id: &'a str,
    name: &'a str,
    start: String,
    end: String,
    active: bool,
    victories: u32,
    defeats: u32,
    balance: i64,
    events: usize,
    scores: String,
}

/// Write the header and one CSV row per session. Returns the number of rows.
pub fn export_history<W: Write>(
    sessions: &[Session],
    event_count: impl Fn(&Session) -> usize,
    out: W,
) -> Result<usize, ExportError> {
    // header is written up front so an empty history still yields one
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(out);
    writer.write_record(HEADER)?;

    for session in sessions {
        let stats = session_stats(session);
        writer.serialize(HistoryRow {
            id: &session.id,
            name: &session.name,
            start: session.start_date.to_rfc3339(),
            end: session
                .end_date
                .map(|d| d.to_rfc3339())
                .unwrap_or_default(),
            active: session.is_active,
            victories: stats.victories,
            defeats: stats.defeats,
            balance: stats.balance,
            events: event_count(session),
            scores: session
                .scores
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        })?;
    }

    writer.flush()?;
    Ok(sessions.len())
}

/// Export the current user's history
pub fn export_user_history<W: Write>(
    service: &SessionService<'_>,
    out: W,
) -> Result<usize, ExportError> {
    let sessions = service.user_sessions();
    export_history(
        &sessions,
        |s| service.session_events(&s.id).len(),
        out,
    )
}
