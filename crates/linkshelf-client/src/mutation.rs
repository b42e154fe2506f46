//! Lifecycle of a single store mutation.
//!
//! ```text
//! Idle -> Validating -> Rejected
//!                    -> OptimisticApply -> Persisting -> Confirmed | Reverted | Resynced
//!                    -> Persisting (remote-first) -> Confirmed | Rejected
//!                    -> Confirmed (nothing to persist)
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    Rejected,
    OptimisticApply,
    Persisting,
    Confirmed,
    Reverted,
    Resynced,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Confirmed | Self::Reverted | Self::Resynced
        )
    }

    fn can_move_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Rejected)
                | (Validating, OptimisticApply)
                | (Validating, Persisting)
                | (Validating, Confirmed)
                | (OptimisticApply, Persisting)
                | (OptimisticApply, Confirmed)
                | (Persisting, Confirmed)
                | (Persisting, Reverted)
                | (Persisting, Resynced)
                | (Persisting, Rejected)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    AddBookmark,
    CreateCategory,
    UpdateCategory,
    DeleteCategory,
    DeleteBookmark,
    UpdateBookmark,
    ToggleVisibility,
    Reorder,
    MigrateGuest,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("illegal transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: Phase,
    pub to: Phase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    kind: MutationKind,
    phase: Phase,
    history: Vec<Phase>,
    error: Option<String>,
}

impl Mutation {
    /// Starts a mutation already in `Validating`.
    pub fn begin(kind: MutationKind) -> Self {
        Self {
            kind,
            phase: Phase::Validating,
            history: vec![Phase::Idle, Phase::Validating],
            error: None,
        }
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn advance(&mut self, next: Phase) -> Result<(), TransitionError> {
        if !self.phase.can_move_to(next) {
            return Err(TransitionError {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    /// Moves to `next` and records why the mutation did not go through.
    pub fn fail(&mut self, next: Phase, error: impl fmt::Display) -> Result<(), TransitionError> {
        self.advance(next)?;
        self.error = Some(error.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimistic_happy_path() {
        let mut m = Mutation::begin(MutationKind::AddBookmark);
        m.advance(Phase::OptimisticApply).unwrap();
        m.advance(Phase::Persisting).unwrap();
        m.advance(Phase::Confirmed).unwrap();
        assert!(m.phase().is_terminal());
        assert_eq!(
            m.history(),
            &[
                Phase::Idle,
                Phase::Validating,
                Phase::OptimisticApply,
                Phase::Persisting,
                Phase::Confirmed
            ]
        );
    }

    #[test]
    fn rejection_records_error() {
        let mut m = Mutation::begin(MutationKind::CreateCategory);
        m.fail(Phase::Rejected, "name too short").unwrap();
        assert_eq!(m.error(), Some("name too short"));
        assert!(m.phase().is_terminal());
    }

    #[test]
    fn terminal_phases_are_final() {
        let mut m = Mutation::begin(MutationKind::DeleteBookmark);
        m.advance(Phase::OptimisticApply).unwrap();
        m.advance(Phase::Persisting).unwrap();
        m.advance(Phase::Resynced).unwrap();
        assert_eq!(
            m.advance(Phase::Confirmed),
            Err(TransitionError {
                from: Phase::Resynced,
                to: Phase::Confirmed
            })
        );
    }

    #[test]
    fn cannot_revert_before_persisting() {
        let mut m = Mutation::begin(MutationKind::UpdateCategory);
        m.advance(Phase::OptimisticApply).unwrap();
        assert!(m.advance(Phase::Reverted).is_err());
        assert_eq!(m.phase(), Phase::OptimisticApply);
    }
}
