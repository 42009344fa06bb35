use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::AttendanceRecord;

use super::ReconcilerError;

/// Class time window and sampling interval for an attendance report.
/// `end_at` is exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportWindow {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub interval_seconds: u32,
}

impl ReportWindow {
    pub fn total_slots(&self) -> i64 {
        if self.interval_seconds == 0 {
            return 0;
        }
        let duration_ms = (self.end_at - self.start_at).num_milliseconds();
        duration_ms / (self.interval_seconds as i64 * 1000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub name: String,
    pub marked_slots: u64,
    pub total_slots: u64,
    pub percentage: f64,
}

/// Builds the per-subject attendance report: the window is split into
/// fixed-width slots and each subject counts a slot at most once no matter
/// how many records landed in it, so over-marking cannot push a percentage
/// past 100. Every roster name appears in the output, absentees at 0%.
///
/// Pure over its inputs; rows come back sorted by percentage descending with
/// name ascending as the tie-break.
pub fn build_report(
    window: &ReportWindow,
    records: &[AttendanceRecord],
    roster: &[String],
) -> Result<Vec<ReportRow>, ReconcilerError> {
    let total_slots = window.total_slots();
    if total_slots <= 0 {
        return Err(ReconcilerError::InvalidArgument(
            "report window must span at least one full interval".into(),
        ));
    }

    let slot_width_ms = window.interval_seconds as i64 * 1000;
    let mut slots_by_name: HashMap<&str, HashSet<i64>> = HashMap::new();

    for record in records {
        // Half-open window: a record exactly at end_at belongs to the next class.
        if record.marked_at < window.start_at || record.marked_at >= window.end_at {
            continue;
        }
        let offset_ms = (record.marked_at - window.start_at).num_milliseconds();
        slots_by_name
            .entry(record.name.as_str())
            .or_default()
            .insert(offset_ms / slot_width_ms);
    }

    let mut rows: Vec<ReportRow> = roster
        .iter()
        .map(|name| {
            let marked_slots = slots_by_name
                .get(name.as_str())
                .map(|slots| slots.len() as u64)
                .unwrap_or(0);
            ReportRow {
                name: name.clone(),
                marked_slots,
                total_slots: total_slots as u64,
                percentage: marked_slots as f64 * 100.0 / total_slots as f64,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.percentage
            .partial_cmp(&a.percentage)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });

    Ok(rows)
}
