//! The booking transition table.
//!
//! One static map serves both booking kinds. Generic bookings never enter
//! `InProgress`, so for them every edge touching it is filtered out.

use crate::db::models::bookings::{BookingKind, BookingStatus};

use BookingStatus::*;

static TRANSITIONS: &[(BookingStatus, &[BookingStatus])] = &[
    (Pending, &[Accepted, Declined]),
    (Accepted, &[InProgress, PendingConfirmation, Cancelled]),
    (InProgress, &[Completed, PendingConfirmation]),
    (PendingConfirmation, &[Completed, InProgress]),
    (Completed, &[]),
    (Declined, &[]),
    (Cancelled, &[]),
];

fn kind_allows(kind: BookingKind, status: BookingStatus) -> bool {
    !(kind == BookingKind::Generic && status == InProgress)
}

/// Direct successors of `from` for a booking of the given kind, in table order.
pub fn allowed_successors(kind: BookingKind, from: BookingStatus) -> Vec<BookingStatus> {
    if !kind_allows(kind, from) {
        return Vec::new();
    }
    TRANSITIONS
        .iter()
        .find(|(status, _)| *status == from)
        .map(|(_, successors)| successors.iter().copied().filter(|to| kind_allows(kind, *to)).collect())
        .unwrap_or_default()
}

pub fn is_allowed(kind: BookingKind, from: BookingStatus, to: BookingStatus) -> bool {
    allowed_successors(kind, from).contains(&to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_offering_table() {
        let kind = BookingKind::ServiceOffering;
        assert_eq!(allowed_successors(kind, Pending), vec![Accepted, Declined]);
        assert_eq!(allowed_successors(kind, Accepted), vec![InProgress, PendingConfirmation, Cancelled]);
        assert_eq!(allowed_successors(kind, InProgress), vec![Completed, PendingConfirmation]);
        assert_eq!(allowed_successors(kind, PendingConfirmation), vec![Completed, InProgress]);
    }

    #[test]
    fn test_generic_table_skips_in_progress() {
        let kind = BookingKind::Generic;
        assert_eq!(allowed_successors(kind, Pending), vec![Accepted, Declined]);
        assert_eq!(allowed_successors(kind, Accepted), vec![PendingConfirmation, Cancelled]);
        assert_eq!(allowed_successors(kind, PendingConfirmation), vec![Completed]);
        assert!(allowed_successors(kind, InProgress).is_empty());
    }

    #[test]
    fn test_terminal_states_have_no_successors() {
        for kind in [BookingKind::Generic, BookingKind::ServiceOffering] {
            for status in BookingStatus::ALL.into_iter().filter(BookingStatus::is_terminal) {
                for to in BookingStatus::ALL {
                    assert!(!is_allowed(kind, status, to), "{status} -> {to} must be rejected");
                }
            }
        }
    }

    #[test]
    fn test_every_edge_is_reachable_from_pending() {
        // No dead rows: every non-terminal status of a service-offering booking can be reached.
        let kind = BookingKind::ServiceOffering;
        let mut seen = vec![Pending];
        let mut frontier = vec![Pending];
        while let Some(status) = frontier.pop() {
            for next in allowed_successors(kind, status) {
                if !seen.contains(&next) {
                    seen.push(next);
                    frontier.push(next);
                }
            }
        }
        assert_eq!(seen.len(), BookingStatus::ALL.len());
    }
}
