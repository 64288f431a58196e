//! Player bonus state machine.
//!
//! ```text
//! pending -> active -> wagering -> { completed | expired | cancelled | forfeited }
//!              \________________________^
//! ```
//!
//! `active` may also end directly in any terminal state (a zero requirement
//! completes at once, an untouched bonus can expire or be cancelled).

use crate::ledger::BonusStatus;

impl BonusStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: BonusStatus) -> bool {
        use BonusStatus::*;

        match (self, next) {
            (Pending, Active) => true,
            (Active, Wagering) => true,
            (Active | Wagering, Completed | Expired | Cancelled | Forfeited) => true,
            _ => false,
        }
    }

    /// Statuses reachable from `self` in one step
    pub fn successors(self) -> Vec<BonusStatus> {
        ALL_STATUSES
            .into_iter()
            .filter(|s| self.can_transition_to(*s))
            .collect()
    }
}

pub const ALL_STATUSES: [BonusStatus; 7] = [
    BonusStatus::Pending,
    BonusStatus::Active,
    BonusStatus::Wagering,
    BonusStatus::Completed,
    BonusStatus::Cancelled,
    BonusStatus::Expired,
    BonusStatus::Forfeited,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_have_no_successors() {
        for status in ALL_STATUSES.into_iter().filter(|s| s.is_terminal()) {
            assert!(status.successors().is_empty(), "{status} must be final");
        }
    }

    #[test]
    fn test_pending_only_activates() {
        assert_eq!(BonusStatus::Pending.successors(), vec![BonusStatus::Active]);
    }

    #[test]
    fn test_wagering_never_goes_back() {
        assert!(!BonusStatus::Wagering.can_transition_to(BonusStatus::Active));
        assert!(!BonusStatus::Wagering.can_transition_to(BonusStatus::Pending));
        assert!(BonusStatus::Wagering.can_transition_to(BonusStatus::Expired));
    }

    #[test]
    fn test_active_can_complete_directly() {
        assert!(BonusStatus::Active.can_transition_to(BonusStatus::Completed));
    }
}
