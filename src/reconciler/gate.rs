use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ReconcilerError;

/// Label the recognizer attaches to a face it could not match to anyone registered.
pub const UNKNOWN_LABEL: &str = "unknown";

/// A single recognizer observation. `distance` is a distance-style score:
/// lower means a better match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionEvent {
    pub name: String,
    pub distance: f64,
    pub observed_at: DateTime<Utc>,
}

/// Outcome of running one event through the cooldown gate. `Suppressed` and
/// `NoConfidentMatch` are expected steady-state results while a subject stays
/// in view, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum Decision {
    Admitted,
    Suppressed { remaining_ms: u64 },
    NoConfidentMatch,
}

struct GateState {
    cooldown: Duration,
    last_admitted: HashMap<String, DateTime<Utc>>,
}

/// Per-subject cooldown gate over recognizer events.
///
/// Owns the name -> last-admitted-timestamp map. Entries are created on the
/// first admission for a subject and updated on each later one; the map is
/// bounded by the registered roster size and only cleared by process restart.
pub struct Reconciler {
    threshold: f64,
    state: Mutex<GateState>,
}

impl Reconciler {
    pub fn new(threshold: f64, cooldown_secs: u64) -> Self {
        Self {
            threshold,
            state: Mutex::new(GateState {
                cooldown: Duration::seconds(cooldown_secs as i64),
                last_admitted: HashMap::new(),
            }),
        }
    }

    /// Decides whether `event` becomes a persisted attendance record. The
    /// last-admitted map is mutated only on `Admitted`; the whole decision runs
    /// under one lock so two racing observations of the same subject cannot
    /// both admit within a single cooldown window.
    pub fn observe(&self, event: &RecognitionEvent) -> Decision {
        if event.name == UNKNOWN_LABEL || event.distance >= self.threshold {
            return Decision::NoConfidentMatch;
        }

        let mut state = lock_state(&self.state);

        match state.last_admitted.get(&event.name) {
            Some(last) if event.observed_at - *last <= state.cooldown => {
                let remaining = state.cooldown - (event.observed_at - *last);
                Decision::Suppressed {
                    remaining_ms: remaining.num_milliseconds().max(0) as u64,
                }
            }
            _ => {
                state
                    .last_admitted
                    .insert(event.name.clone(), event.observed_at);
                Decision::Admitted
            }
        }
    }

    /// Replaces the cooldown used by subsequent `observe` calls. Past
    /// admission timestamps are kept as-is, so shortening the cooldown can
    /// immediately re-admit a subject on its next event.
    pub fn set_cooldown(&self, seconds: u64) -> Result<(), ReconcilerError> {
        if seconds == 0 {
            return Err(ReconcilerError::InvalidArgument(
                "cooldown must be greater than zero seconds".into(),
            ));
        }
        lock_state(&self.state).cooldown = Duration::seconds(seconds as i64);
        Ok(())
    }

    pub fn cooldown_secs(&self) -> u64 {
        lock_state(&self.state).cooldown.num_seconds().max(0) as u64
    }

    pub fn match_threshold(&self) -> f64 {
        self.threshold
    }
}

fn lock_state(state: &Mutex<GateState>) -> std::sync::MutexGuard<'_, GateState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(name: &str, distance: f64, offset_ms: i64) -> RecognitionEvent {
        let base = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        RecognitionEvent {
            name: name.to_string(),
            distance,
            observed_at: base + Duration::milliseconds(offset_ms),
        }
    }

    #[test]
    fn admits_then_suppresses_within_cooldown() {
        let gate = Reconciler::new(0.6, 10);

        assert_eq!(gate.observe(&event("Alice", 0.4, 0)), Decision::Admitted);
        assert_eq!(
            gate.observe(&event("Alice", 0.4, 5_000)),
            Decision::Suppressed { remaining_ms: 5_000 }
        );
        // Exactly at the boundary the elapsed time is not strictly greater.
        assert_eq!(
            gate.observe(&event("Alice", 0.4, 10_000)),
            Decision::Suppressed { remaining_ms: 0 }
        );
        assert_eq!(
            gate.observe(&event("Alice", 0.4, 10_001)),
            Decision::Admitted
        );
    }

    #[test]
    fn subjects_are_gated_independently() {
        let gate = Reconciler::new(0.6, 10);

        assert_eq!(gate.observe(&event("Alice", 0.3, 0)), Decision::Admitted);
        assert_eq!(gate.observe(&event("Bob", 0.3, 1)), Decision::Admitted);
        assert!(matches!(
            gate.observe(&event("Alice", 0.3, 2)),
            Decision::Suppressed { .. }
        ));
    }

    #[test]
    fn weak_match_is_rejected_without_touching_state() {
        let gate = Reconciler::new(0.6, 10);

        assert_eq!(
            gate.observe(&event("Alice", 0.6, 0)),
            Decision::NoConfidentMatch
        );
        assert_eq!(
            gate.observe(&event("unknown", 0.1, 0)),
            Decision::NoConfidentMatch
        );
        // A rejected event must not have started a cooldown window.
        assert_eq!(gate.observe(&event("Alice", 0.4, 1)), Decision::Admitted);
    }

    #[test]
    fn shortening_cooldown_applies_to_old_timestamps() {
        let gate = Reconciler::new(0.6, 60);

        assert_eq!(gate.observe(&event("Alice", 0.4, 0)), Decision::Admitted);
        assert!(matches!(
            gate.observe(&event("Alice", 0.4, 8_000)),
            Decision::Suppressed { .. }
        ));

        gate.set_cooldown(5).unwrap();
        assert_eq!(
            gate.observe(&event("Alice", 0.4, 8_000)),
            Decision::Admitted
        );
    }

    #[test]
    fn zero_cooldown_is_rejected_and_previous_value_kept() {
        let gate = Reconciler::new(0.6, 60);
        gate.set_cooldown(5).unwrap();

        assert!(matches!(
            gate.set_cooldown(0),
            Err(ReconcilerError::InvalidArgument(_))
        ));
        assert_eq!(gate.cooldown_secs(), 5);
    }

    #[test]
    fn admissions_never_violate_cooldown_spacing() {
        let gate = Reconciler::new(0.6, 10);
        let mut admitted_at: Vec<i64> = Vec::new();

        for offset in (0..60_000).step_by(100) {
            if gate.observe(&event("Alice", 0.4, offset)) == Decision::Admitted {
                admitted_at.push(offset);
            }
        }

        assert!(!admitted_at.is_empty());
        for pair in admitted_at.windows(2) {
            assert!(pair[1] - pair[0] > 10_000);
        }
    }
}
