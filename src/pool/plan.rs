//! Pure pool arithmetic
//!
//! Everything here works on a snapshot of the environment's sessions and
//! returns what should change; the manager performs the writes.

use chrono::{DateTime, Utc};

use crate::crd::{SessionPhase, WorkshopSession};

/// Clamp configured limits to `0 <= reserved <= capacity`
pub fn clamp(capacity: i64, reserved: i64) -> (u32, u32) {
    let capacity = u32::try_from(capacity.max(0)).unwrap_or(u32::MAX);
    let reserved = u32::try_from(reserved.max(0)).unwrap_or(u32::MAX);
    (capacity, reserved.min(capacity))
}

/// The parts of a session the planner looks at
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionView {
    /// Session name
    pub name: String,
    /// Current phase
    pub phase: SessionPhase,
    /// Creation timestamp
    pub created_at: Option<DateTime<Utc>>,
}

impl SessionView {
    /// Views of the sessions that still exist; objects already being deleted
    /// are left out
    pub fn observe(sessions: &[WorkshopSession]) -> Vec<SessionView> {
        sessions
            .iter()
            .filter(|s| !s.is_deleting())
            .map(|s| SessionView {
                name: s.metadata.name.clone().unwrap_or_default(),
                phase: s.phase(),
                created_at: s.created_at(),
            })
            .collect()
    }
}

/// Session counts by phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolCounts {
    /// Idle sessions
    pub reserved: u32,
    /// Sessions bound to a learner
    pub allocated: u32,
}

impl PoolCounts {
    /// Count a snapshot
    pub fn of(sessions: &[SessionView]) -> Self {
        let count = |phase| {
            let n = sessions.iter().filter(|s| s.phase == phase).count();
            u32::try_from(n).unwrap_or(u32::MAX)
        };
        Self {
            reserved: count(SessionPhase::Reserved),
            allocated: count(SessionPhase::Allocated),
        }
    }

    /// Sessions occupying capacity
    pub fn live(&self) -> u32 {
        self.reserved.saturating_add(self.allocated)
    }
}

/// Changes needed to bring a pool to its targets
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolPlan {
    /// Number of reserved sessions to create
    pub create: u32,
    /// Sessions to mark `Expiring` and delete, in order
    pub reclaim: Vec<String>,
    /// Sessions already `Expiring` whose delete never went through
    pub purge: Vec<String>,
}

impl PoolPlan {
    /// Whether the pool is already at its targets
    pub fn is_empty(&self) -> bool {
        self.create == 0 && self.reclaim.is_empty() && self.purge.is_empty()
    }
}

/// Sort oldest-created first, ties broken by name
pub fn oldest_first<'a>(
    sessions: impl IntoIterator<Item = &'a SessionView>,
) -> Vec<&'a SessionView> {
    let mut sorted: Vec<_> = sessions.into_iter().collect();
    sorted.sort_by(|a, b| (a.created_at, &a.name).cmp(&(b.created_at, &b.name)));
    sorted
}

fn in_phase(sessions: &[SessionView], phase: SessionPhase) -> Vec<&SessionView> {
    oldest_first(sessions.iter().filter(|s| s.phase == phase))
}

/// Plan one reconcile pass
///
/// Live sessions are those `Reserved` or `Allocated`; `Expiring` sessions are
/// purged in the same pass and don't count. Excess over `capacity` is taken
/// from idle sessions before allocated ones, then idle sessions above
/// `reserved` are reclaimed, and finally the idle pool is topped up as far
/// as capacity allows.
pub fn plan(capacity: u32, reserved: u32, sessions: &[SessionView]) -> PoolPlan {
    let capacity = capacity as usize;
    let reserved = reserved.min(capacity as u32) as usize;

    let mut idle = in_phase(sessions, SessionPhase::Reserved);
    let mut busy = in_phase(sessions, SessionPhase::Allocated);
    let purge = in_phase(sessions, SessionPhase::Expiring)
        .into_iter()
        .map(|s| s.name.clone())
        .collect();

    let mut reclaim = Vec::new();

    let excess = (idle.len() + busy.len()).saturating_sub(capacity);
    let from_idle = excess.min(idle.len());
    reclaim.extend(idle.drain(..from_idle).map(|s| s.name.clone()));
    let from_busy = (excess - from_idle).min(busy.len());
    reclaim.extend(busy.drain(..from_busy).map(|s| s.name.clone()));

    let surplus = idle.len().saturating_sub(reserved);
    reclaim.extend(idle.drain(..surplus).map(|s| s.name.clone()));

    let live = idle.len() + busy.len();
    let deficit = reserved.saturating_sub(idle.len());
    let room = capacity.saturating_sub(live);
    let create = u32::try_from(deficit.min(room)).unwrap_or(u32::MAX);

    PoolPlan {
        create,
        reclaim,
        purge,
    }
}
