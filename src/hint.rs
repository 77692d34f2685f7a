//! The hint side-channel.
//!
//! A hint search runs while the human thinks. Its answer is shown only if the
//! board still holds the position the hint was asked for.

use tracing::debug;

use crate::channel::{AnalysisError, PendingSearch};
use crate::oracle::{CandidateMove, GamePosition};
use crate::view::BoardView;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HintResolution {
    Shown,
    /// The position changed since the hint was requested.
    Stale,
    /// The engine named no legal move.
    Empty,
}

/// Show `hint` if `captured` is still the `live` position.
pub fn settle(
    captured: &GamePosition,
    live: &GamePosition,
    hint: Option<&CandidateMove>,
    view: &mut dyn BoardView,
) -> HintResolution {
    match hint {
        _ if captured != live => HintResolution::Stale,
        Some(mv) => {
            view.mark_hint(mv.from);
            HintResolution::Shown
        }
        None => HintResolution::Empty,
    }
}

/// Holds at most one hint search.
#[derive(Default)]
pub struct HintSlot {
    pending: Option<PendingSearch>,
}

impl HintSlot {
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Hold `search`, abandoning any earlier one.
    pub fn replace(&mut self, search: PendingSearch) {
        if let Some(old) = self.pending.replace(search) {
            debug!(id = %old.id(), "hint superseded");
        }
    }

    /// Drop the held search. Returns whether there was one.
    pub fn abandon(&mut self) -> bool {
        match self.pending.take() {
            Some(old) => {
                debug!(id = %old.id(), "hint abandoned");
                true
            }
            None => false,
        }
    }

    /// Wait for the held search to settle, then empty the slot. Never resolves
    /// while the slot is empty. Dropping the future keeps the search held.
    pub async fn resolved(
        &mut self,
    ) -> (GamePosition, Result<Option<CandidateMove>, AnalysisError>) {
        let Some(search) = self.pending.as_mut() else {
            return std::future::pending().await;
        };
        let result = search.await;
        let captured = self
            .pending
            .take()
            .map(|search| search.position().clone())
            .unwrap_or_default();
        (captured, result)
    }
}
