//! Pure queries over the lifecycle tables in [`crate::definitions`].
//!
//! Nothing here performs I/O, reads a clock or allocates identifiers, so every
//! function can be called speculatively (for example to render the actions a user
//! may take next). An illegal transition is reported as `None`, never as an error;
//! the caller decides whether that is fatal.
//!
//! # Example
//!
//! ```
//! use ticketflow_core::definitions::{TicketAction, TicketStatus, TICKET_MACHINE};
//! use ticketflow_core::engine;
//!
//! assert_eq!(
//!     engine::transition(&TICKET_MACHINE, TicketStatus::Staked, TicketAction::Cancel),
//!     Some(TicketStatus::Refunded)
//! );
//! assert!(!engine::can_transition(&TICKET_MACHINE, TicketStatus::Pending, TicketAction::Stake));
//! assert!(engine::available_actions(&TICKET_MACHINE, TicketStatus::CheckedIn).is_empty());
//! ```

use crate::definitions::{StateMachine, Transition};

/// Find the table row for `(current, action)`.
#[must_use]
pub fn find_transition<S, A>(
    machine: &'static StateMachine<S, A>,
    current: S,
    action: A,
) -> Option<&'static Transition<S, A>>
where
    S: Copy + PartialEq,
    A: Copy + PartialEq,
{
    machine
        .transitions
        .iter()
        .find(|row| row.from == current && row.action == action)
}

/// State reached by applying `action` in `current`, or `None` if the table has no
/// such edge.
#[must_use]
pub fn transition<S, A>(machine: &'static StateMachine<S, A>, current: S, action: A) -> Option<S>
where
    S: Copy + PartialEq,
    A: Copy + PartialEq,
{
    find_transition(machine, current, action).map(|row| row.to)
}

/// Whether `action` is legal in `current`.
#[must_use]
pub fn can_transition<S, A>(machine: &'static StateMachine<S, A>, current: S, action: A) -> bool
where
    S: Copy + PartialEq,
    A: Copy + PartialEq,
{
    find_transition(machine, current, action).is_some()
}

/// Every action legal in `current`, in table order. Empty for terminal states.
#[must_use]
pub fn available_actions<S, A>(machine: &'static StateMachine<S, A>, current: S) -> Vec<A>
where
    S: Copy + PartialEq,
    A: Copy + PartialEq,
{
    machine
        .transitions
        .iter()
        .filter(|row| row.from == current)
        .map(|row| row.action)
        .collect()
}

/// Whether no action leaves `current`.
#[must_use]
pub fn is_terminal<S, A>(machine: &'static StateMachine<S, A>, current: S) -> bool
where
    S: Copy + PartialEq,
{
    !machine.transitions.iter().any(|row| row.from == current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{
        EVENT_MACHINE, EventAction, EventStatus, TICKET_MACHINE, TicketAction, TicketStatus,
    };
    use proptest::prelude::*;

    const TICKET_TERMINALS: [TicketStatus; 7] = [
        TicketStatus::CheckedIn,
        TicketStatus::Scanned,
        TicketStatus::Rejected,
        TicketStatus::Forfeited,
        TicketStatus::Refunded,
        TicketStatus::Revoked,
        TicketStatus::Cancelled,
    ];

    #[test]
    fn staking_path_is_legal() {
        let path = [
            (TicketStatus::Pending, TicketAction::RequestApproval, TicketStatus::PendingApproval),
            (TicketStatus::PendingApproval, TicketAction::Approve, TicketStatus::Approved),
            (TicketStatus::Approved, TicketAction::Stake, TicketStatus::Staked),
            (TicketStatus::Staked, TicketAction::CheckIn, TicketStatus::CheckedIn),
        ];
        for (from, action, to) in path {
            assert_eq!(transition(&TICKET_MACHINE, from, action), Some(to));
        }
    }

    #[test]
    fn free_event_shortcut() {
        assert_eq!(
            transition(&TICKET_MACHINE, TicketStatus::Pending, TicketAction::Issue),
            Some(TicketStatus::Issued)
        );
        assert_eq!(
            transition(&TICKET_MACHINE, TicketStatus::Issued, TicketAction::CheckIn),
            Some(TicketStatus::CheckedIn)
        );
    }

    #[test]
    fn pending_cannot_stake_directly() {
        assert_eq!(
            transition(&TICKET_MACHINE, TicketStatus::Pending, TicketAction::Stake),
            None
        );
    }

    #[test]
    fn cancelling_a_staked_ticket_refunds_it() {
        assert_eq!(
            transition(&TICKET_MACHINE, TicketStatus::Staked, TicketAction::Cancel),
            Some(TicketStatus::Refunded)
        );
    }

    #[test]
    fn scan_is_a_distinct_alias_of_check_in() {
        for from in [TicketStatus::Issued, TicketStatus::Staked] {
            assert_eq!(
                transition(&TICKET_MACHINE, from, TicketAction::Scan),
                Some(TicketStatus::Scanned)
            );
            assert_eq!(
                transition(&TICKET_MACHINE, from, TicketAction::CheckIn),
                Some(TicketStatus::CheckedIn)
            );
        }
    }

    #[test]
    fn ticket_terminal_states_have_no_actions() {
        for status in TICKET_TERMINALS {
            assert!(available_actions(&TICKET_MACHINE, status).is_empty(), "{status}");
            assert!(is_terminal(&TICKET_MACHINE, status));
        }
    }

    #[test]
    fn event_terminal_states_have_no_actions() {
        for status in [EventStatus::Archived, EventStatus::Cancelled] {
            assert!(available_actions(&EVENT_MACHINE, status).is_empty());
        }
        assert_eq!(
            available_actions(&EVENT_MACHINE, EventStatus::Live),
            vec![EventAction::End, EventAction::Cancel]
        );
    }

    #[test]
    fn available_actions_follow_table_order() {
        assert_eq!(
            available_actions(&TICKET_MACHINE, TicketStatus::Staked),
            vec![
                TicketAction::CheckIn,
                TicketAction::Scan,
                TicketAction::Forfeit,
                TicketAction::Refund,
                TicketAction::Cancel,
            ]
        );
    }

    fn ticket_status() -> impl Strategy<Value = TicketStatus> {
        prop::sample::select(TicketStatus::ALL.to_vec())
    }

    fn ticket_action() -> impl Strategy<Value = TicketAction> {
        prop::sample::select(TicketAction::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn missing_rows_are_illegal(status in ticket_status(), action in ticket_action()) {
            let has_row = TICKET_MACHINE
                .transitions
                .iter()
                .any(|row| row.from == status && row.action == action);
            if !has_row {
                prop_assert_eq!(transition(&TICKET_MACHINE, status, action), None);
                prop_assert!(!can_transition(&TICKET_MACHINE, status, action));
            }
        }

        #[test]
        fn available_actions_agree_with_can_transition(status in ticket_status(), action in ticket_action()) {
            let listed = available_actions(&TICKET_MACHINE, status).contains(&action);
            prop_assert_eq!(listed, can_transition(&TICKET_MACHINE, status, action));
        }

        #[test]
        fn transition_is_deterministic(status in ticket_status(), action in ticket_action()) {
            prop_assert_eq!(
                transition(&TICKET_MACHINE, status, action),
                transition(&TICKET_MACHINE, status, action)
            );
        }
    }
}
