use crate::model::{Outcome, SessionEvent};

/// Running victory-minus-defeat balance after each event, as (event #, balance)
pub fn balance_series(events: &[SessionEvent]) -> Vec<(f64, f64)> {
    let mut balance = 0.0;
    let mut points = vec![(0.0, 0.0)];
    for (i, e) in events.iter().enumerate() {
        balance += match e.outcome {
            Outcome::Victory => 1.0,
            Outcome::Defeat => -1.0,
        };
        points.push(((i + 1) as f64, balance));
    }
    points
}

/// X (event count) and symmetric Y bounds for the balance chart
pub fn compute_chart_params(points: &[(f64, f64)]) -> (f64, f64) {
    let overall = points.last().map(|p| p.0).unwrap_or(1.0).max(1.0);
    let extent = points
        .iter()
        .map(|&(_, y)| y.abs())
        .fold(1.0_f64, f64::max);
    (overall, extent)
}

/// Format a simple numeric label consistently
pub fn format_label(val: f64) -> String {
    if (val - val.round()).abs() < f64::EPSILON {
        format!("{}", val.round())
    } else {
        format!("{val:.2}")
    }
}
