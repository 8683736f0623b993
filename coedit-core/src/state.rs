//! Per-document slot state machine.
//!
//! ```text
//!               DocumentCreated{text}         SharedTextAdded
//!   Untracked ───────────────────────► Pending ──────────────► Bound
//!       │                                 │                      │
//!       │ DocumentCreated{text available} │ DocumentRemoved      │ DocumentRemoved
//!       └──────────────────────────► Bound  ▼                      ▼
//!                                     Untracked (disposed, slot free)
//! ```
//!
//! [`transition`] is a pure function; the service executes the returned
//! [`Action`]. A disposed slot is indistinguishable from an untracked one, so
//! the key can be reopened later.

/// Where a document key currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    Untracked,
    /// Waiting for the replicated text to appear
    Pending,
    Bound,
}

/// Something that happened to a document key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    DocumentCreated { text_available: bool },
    /// A replicated text appeared in (or replaced an entry of) the shared map
    SharedTextAdded,
    SharedTextDeleted,
    GroupOpened,
    GroupClosed,
    DocumentRemoved,
}

/// Why an event was not acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The event contradicts the documented event ordering
    OutOfOrder,
    /// The key is already pending or bound
    AlreadyTracked,
    /// Nobody waits for this text; it stays in the map for later reuse
    Unclaimed,
    /// Shared-map deletes never tear down bindings
    AdvisoryDelete,
    NotAttached,
}

/// Side effect the service performs for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Construct a binding from the existing replicated text
    Bind,
    /// Create a pending request and ask the fetcher for content
    RequestContent,
    /// Turn the pending request into a binding and attach its editors
    ResolvePending,
    /// Point the live binding at the new replicated text
    Retarget,
    AttachEditor,
    QueueEditor,
    DetachEditor,
    /// Dispose the binding
    Release,
    /// Drop the pending request
    CancelPending,
    Ignore(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: SlotState,
    pub action: Action,
}

impl Transition {
    fn to(next: SlotState, action: Action) -> Self {
        Self { next, action }
    }

    fn stay(state: SlotState, reason: IgnoreReason) -> Self {
        Self::to(state, Action::Ignore(reason))
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self.action, Action::Ignore(_))
    }
}

pub fn transition(state: SlotState, trigger: Trigger) -> Transition {
    use SlotState::*;
    use Trigger::*;

    match (state, trigger) {
        (Untracked, DocumentCreated { text_available: true }) => Transition::to(Bound, Action::Bind),
        (Untracked, DocumentCreated { text_available: false }) => {
            Transition::to(Pending, Action::RequestContent)
        }
        (Pending | Bound, DocumentCreated { .. }) => Transition::stay(state, IgnoreReason::AlreadyTracked),

        (Pending, SharedTextAdded) => Transition::to(Bound, Action::ResolvePending),
        (Bound, SharedTextAdded) => Transition::to(Bound, Action::Retarget),
        (Untracked, SharedTextAdded) => Transition::stay(Untracked, IgnoreReason::Unclaimed),

        (_, SharedTextDeleted) => Transition::stay(state, IgnoreReason::AdvisoryDelete),

        (Bound, GroupOpened) => Transition::to(Bound, Action::AttachEditor),
        (Pending, GroupOpened) => Transition::to(Pending, Action::QueueEditor),
        (Untracked, GroupOpened) => Transition::stay(Untracked, IgnoreReason::OutOfOrder),

        (Bound, GroupClosed) => Transition::to(Bound, Action::DetachEditor),
        (Pending | Untracked, GroupClosed) => Transition::stay(state, IgnoreReason::NotAttached),

        (Bound, DocumentRemoved) => Transition::to(Untracked, Action::Release),
        (Pending, DocumentRemoved) => Transition::to(Untracked, Action::CancelPending),
        (Untracked, DocumentRemoved) => Transition::stay(Untracked, IgnoreReason::NotAttached),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [SlotState; 3] = [SlotState::Untracked, SlotState::Pending, SlotState::Bound];

    #[test]
    fn test_creation_depends_on_text_availability() {
        assert_eq!(
            transition(SlotState::Untracked, Trigger::DocumentCreated { text_available: true }),
            Transition::to(SlotState::Bound, Action::Bind)
        );
        assert_eq!(
            transition(SlotState::Untracked, Trigger::DocumentCreated { text_available: false }),
            Transition::to(SlotState::Pending, Action::RequestContent)
        );
    }

    #[test]
    fn test_shared_text_added() {
        assert_eq!(
            transition(SlotState::Pending, Trigger::SharedTextAdded).action,
            Action::ResolvePending
        );
        // A live binding is never replaced, only re-targeted
        assert_eq!(
            transition(SlotState::Bound, Trigger::SharedTextAdded),
            Transition::to(SlotState::Bound, Action::Retarget)
        );
        assert!(transition(SlotState::Untracked, Trigger::SharedTextAdded).is_ignored());
    }

    #[test]
    fn test_delete_is_advisory_everywhere() {
        for state in ALL_STATES {
            let t = transition(state, Trigger::SharedTextDeleted);
            assert_eq!(t, Transition::stay(state, IgnoreReason::AdvisoryDelete));
        }
    }

    #[test]
    fn test_group_events() {
        assert_eq!(transition(SlotState::Bound, Trigger::GroupOpened).action, Action::AttachEditor);
        assert_eq!(transition(SlotState::Pending, Trigger::GroupOpened).action, Action::QueueEditor);
        assert_eq!(
            transition(SlotState::Untracked, Trigger::GroupOpened).action,
            Action::Ignore(IgnoreReason::OutOfOrder)
        );
        assert_eq!(transition(SlotState::Bound, Trigger::GroupClosed).action, Action::DetachEditor);
        assert!(transition(SlotState::Pending, Trigger::GroupClosed).is_ignored());
        assert!(transition(SlotState::Untracked, Trigger::GroupClosed).is_ignored());
    }

    #[test]
    fn test_removal_always_frees_the_slot() {
        for state in ALL_STATES {
            assert_eq!(transition(state, Trigger::DocumentRemoved).next, SlotState::Untracked);
        }
        assert_eq!(transition(SlotState::Bound, Trigger::DocumentRemoved).action, Action::Release);
        assert_eq!(
            transition(SlotState::Pending, Trigger::DocumentRemoved).action,
            Action::CancelPending
        );
    }

    #[test]
    fn test_pending_never_returns_to_untracked_except_by_removal() {
        let triggers = [
            Trigger::DocumentCreated { text_available: true },
            Trigger::DocumentCreated { text_available: false },
            Trigger::SharedTextAdded,
            Trigger::SharedTextDeleted,
            Trigger::GroupOpened,
            Trigger::GroupClosed,
        ];
        for trigger in triggers {
            assert_ne!(transition(SlotState::Pending, trigger).next, SlotState::Untracked);
        }
    }
}
