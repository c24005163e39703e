//! Identity lifecycle: who progress is synced for, and whether a sync is
//! running.

use serde::Serialize;

/// Where the tracker is in the sign-in lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IdentityState {
    /// No user; progress is local only.
    #[default]
    Anonymous,
    /// A pull/merge for `user_id` is in flight.
    Syncing { user_id: String, attempt: u64 },
    /// Local and remote were reconciled for `user_id`.
    Synced { user_id: String },
    /// The last sync for `user_id` failed; changes trigger a re-sync
    /// instead of a blind push.
    Unsynced { user_id: String },
}

impl IdentityState {
    /// The user this state refers to, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::Syncing { user_id, .. }
            | Self::Synced { user_id }
            | Self::Unsynced { user_id } => Some(user_id),
        }
    }
}

/// Proof that a caller owns the current sync attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTicket {
    user_id: String,
    attempt: u64,
}

impl SyncTicket {
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Result of [`IdentityMachine::begin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Begin {
    Started(SyncTicket),
    AlreadySynced,
    InFlight,
}

/// Guards sync so each identity is reconciled at most once at a time.
#[derive(Debug, Default)]
pub struct IdentityMachine {
    state: IdentityState,
    attempts: u64,
}

impl IdentityMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> &IdentityState {
        &self.state
    }

    /// Request a sync for `user_id`.
    ///
    /// A request for a different user than the one in flight supersedes it.
    pub fn begin(&mut self, user_id: &str) -> Begin {
        match &self.state {
            IdentityState::Synced { user_id: current } if current == user_id => {
                return Begin::AlreadySynced;
            }
            IdentityState::Syncing { user_id: current, .. } if current == user_id => {
                return Begin::InFlight;
            }
            _ => {}
        }

        self.attempts += 1;
        self.state = IdentityState::Syncing {
            user_id: user_id.to_string(),
            attempt: self.attempts,
        };
        Begin::Started(SyncTicket {
            user_id: user_id.to_string(),
            attempt: self.attempts,
        })
    }

    /// Whether `ticket` still owns the in-flight attempt.
    #[must_use]
    pub fn is_current(&self, ticket: &SyncTicket) -> bool {
        matches!(
            &self.state,
            IdentityState::Syncing { user_id, attempt }
                if *user_id == ticket.user_id && *attempt == ticket.attempt
        )
    }

    /// Mark the attempt successful. Returns false if it was superseded.
    pub fn complete(&mut self, ticket: &SyncTicket) -> bool {
        self.finish(ticket, IdentityState::Synced {
            user_id: ticket.user_id.clone(),
        })
    }

    /// Mark the attempt failed. Returns false if it was superseded.
    pub fn fail(&mut self, ticket: &SyncTicket) -> bool {
        self.finish(ticket, IdentityState::Unsynced {
            user_id: ticket.user_id.clone(),
        })
    }

    /// Sign out. Any in-flight attempt becomes stale.
    pub fn clear(&mut self) {
        self.state = IdentityState::Anonymous;
    }

    /// The user background pushes should go to, only once synced.
    #[must_use]
    pub fn push_target(&self) -> Option<&str> {
        match &self.state {
            IdentityState::Synced { user_id } => Some(user_id),
            _ => None,
        }
    }

    /// The user to re-sync for after a local change, when the last pull
    /// failed. Pushing blindly there could overwrite a richer remote record.
    #[must_use]
    pub fn resync_target(&self) -> Option<&str> {
        match &self.state {
            IdentityState::Unsynced { user_id } => Some(user_id),
            _ => None,
        }
    }

    fn finish(&mut self, ticket: &SyncTicket, next: IdentityState) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(begin: Begin) -> SyncTicket {
        match begin {
            Begin::Started(ticket) => ticket,
            other => panic!("expected a new attempt, got {other:?}"),
        }
    }

    #[test]
    fn test_anonymous_to_synced() {
        let mut machine = IdentityMachine::new();
        assert_eq!(machine.push_target(), None);

        let ticket = started(machine.begin("ada"));
        assert_eq!(machine.push_target(), None);
        assert!(machine.complete(&ticket));
        assert_eq!(machine.push_target(), Some("ada"));
        assert_eq!(machine.begin("ada"), Begin::AlreadySynced);
    }

    #[test]
    fn test_same_user_in_flight_is_noop() {
        let mut machine = IdentityMachine::new();
        let _ticket = started(machine.begin("ada"));
        assert_eq!(machine.begin("ada"), Begin::InFlight);
    }

    #[test]
    fn test_different_user_supersedes() {
        let mut machine = IdentityMachine::new();
        let first = started(machine.begin("ada"));
        let second = started(machine.begin("bob"));

        assert!(!machine.is_current(&first));
        assert!(!machine.complete(&first));
        assert!(machine.complete(&second));
        assert_eq!(machine.state().user_id(), Some("bob"));
    }

    #[test]
    fn test_clear_invalidates_in_flight_attempt() {
        let mut machine = IdentityMachine::new();
        let ticket = started(machine.begin("ada"));
        machine.clear();

        assert!(!machine.complete(&ticket));
        assert_eq!(*machine.state(), IdentityState::Anonymous);
    }

    #[test]
    fn test_failure_allows_retry_and_blocks_pushes() {
        let mut machine = IdentityMachine::new();
        let ticket = started(machine.begin("ada"));
        assert!(machine.fail(&ticket));
        assert_eq!(
            *machine.state(),
            IdentityState::Unsynced {
                user_id: "ada".to_string()
            }
        );
        assert_eq!(machine.push_target(), None);
        assert_eq!(machine.resync_target(), Some("ada"));

        let retry = started(machine.begin("ada"));
        assert_ne!(retry, ticket);
        assert_eq!(machine.resync_target(), None);
        assert!(machine.complete(&retry));
        assert_eq!(machine.resync_target(), None);
    }

    #[test]
    fn test_resync_same_user_after_sign_out() {
        let mut machine = IdentityMachine::new();
        let ticket = started(machine.begin("ada"));
        machine.complete(&ticket);
        machine.clear();

        assert!(matches!(machine.begin("ada"), Begin::Started(_)));
    }
}
