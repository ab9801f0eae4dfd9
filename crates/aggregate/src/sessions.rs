//! Session tracking and inactivity-based finalization.

use std::time::{Duration, Instant};

use engine_core::{Error, InteractionEvent, Result};

use crate::keyed::KeyedState;
use crate::profiles::SessionProfile;

/// An open session plus the wall-clock moment it was last observed.
/// Finalization runs on observation time, not event time, so replayed
/// historical batches do not close sessions mid-replay.
#[derive(Debug, Clone)]
struct Tracked {
    profile: SessionProfile,
    last_observed: Option<Instant>,
}

impl Default for Tracked {
    fn default() -> Self {
        Self {
            profile: SessionProfile::default(),
            last_observed: None,
        }
    }
}

/// Tracks open sessions and finalizes them after the inactivity window.
///
/// A late event for a finalized session reopens it: finalization is a lag
/// optimization, not a correctness boundary.
pub struct SessionTracker {
    inactivity: Duration,
    open: KeyedState<String, Tracked>,
    closed: KeyedState<String, SessionProfile>,
}

impl SessionTracker {
    pub fn new(inactivity: Duration) -> Self {
        Self {
            inactivity,
            open: KeyedState::new(),
            closed: KeyedState::new(),
        }
    }

    /// Folds one event into its session.
    ///
    /// Fails only when the session was previously observed under a
    /// different user, the one merge the commutative discipline cannot
    /// express.
    pub fn observe(&self, event: &InteractionEvent) -> Result<()> {
        // Reopen on a late arrival.
        if let Some(mut finalized) = self.closed.remove(&event.session_id) {
            finalized.closed = false;
            self.open.update(&event.session_id, |tracked| {
                tracked.profile.merge(&finalized);
            });
        }

        self.open.update(&event.session_id, |tracked| {
            if !tracked.profile.user_id.is_empty() && tracked.profile.user_id != event.user_id {
                return Err(Error::aggregation_conflict(
                    event.session_id.clone(),
                    format!(
                        "session observed under users {:?} and {:?}",
                        tracked.profile.user_id, event.user_id
                    ),
                ));
            }
            tracked.profile.observe(event);
            tracked.last_observed = Some(Instant::now());
            Ok(())
        })
    }

    /// Closes every session idle longer than the inactivity window.
    /// Returns the number of sessions finalized.
    pub fn finalize_idle(&self) -> usize {
        let now = Instant::now();
        let mut finalized = 0;
        for (session_id, tracked) in self.open.snapshot() {
            let idle = tracked
                .last_observed
                .map(|at| now.duration_since(at) >= self.inactivity)
                .unwrap_or(false);
            if idle {
                finalized += self.close(&session_id);
            }
        }
        finalized
    }

    /// Closes every open session regardless of idle time (end of run).
    pub fn finalize_all(&self) -> usize {
        let mut finalized = 0;
        for (session_id, _) in self.open.snapshot() {
            finalized += self.close(&session_id);
        }
        finalized
    }

    fn close(&self, session_id: &String) -> usize {
        match self.open.remove(session_id) {
            Some(tracked) => {
                let mut profile = tracked.profile;
                profile.closed = true;
                self.closed.update(session_id, |slot| {
                    slot.merge(&profile);
                    slot.closed = true;
                });
                1
            }
            None => 0,
        }
    }

    /// Current profile, open or finalized.
    pub fn profile(&self, session_id: &str) -> Option<SessionProfile> {
        let key = session_id.to_string();
        self.open
            .get(&key)
            .map(|t| t.profile)
            .or_else(|| self.closed.get(&key))
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn total_count(&self) -> usize {
        self.open.len() + self.closed.len()
    }

    /// All session profiles, open and finalized.
    pub fn snapshot(&self) -> Vec<(String, SessionProfile)> {
        let mut all: Vec<(String, SessionProfile)> = self
            .open
            .snapshot()
            .into_iter()
            .map(|(id, t)| (id, t.profile))
            .collect();
        all.extend(self.closed.snapshot());
        all
    }

    /// Discards state for the given sessions; recompute resets exactly the
    /// sessions it is about to replay and leaves the rest alone.
    pub fn reset(&self, session_ids: impl IntoIterator<Item = String>) {
        for id in session_ids {
            self.open.remove(&id);
            self.closed.remove(&id);
        }
    }

    /// Discards all session state.
    pub fn clear(&self) {
        self.open.clear();
        self.closed.clear();
    }
}
