//! The redistribution pass: decide which lines give up committed quantity
//! and which lines gain it, for one (item, location) pair.

use std::cmp::Ordering;

use recommit_core::OrderId;

use crate::action::CommitmentAction;
use crate::demand::{DemandLine, FillLevel};

/// One quantity transfer decided by a redistribution pass. Kept for the
/// audit trail; the persisted plan is the action list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Donation {
    pub donor_order: OrderId,
    pub donor_line: u32,
    pub donor_window: usize,
    pub recipient_order: OrderId,
    pub recipient_line: u32,
    pub recipient_window: usize,
    pub quantity: i64,
}

/// Result of one redistribution pass over a pair's demand list.
#[derive(Debug, Clone)]
pub struct RedistributionOutcome {
    /// The working set in sort order, with final committed quantities and
    /// `do_decommit`/`do_recommit` flags.
    pub lines: Vec<DemandLine>,
    /// Every transfer decision, in the order it was made.
    pub donations: Vec<Donation>,
}

impl RedistributionOutcome {
    /// Lines that must release their reservation.
    pub fn decommit_actions(&self) -> Vec<CommitmentAction> {
        self.lines
            .iter()
            .filter(|l| l.do_decommit)
            .map(|l| CommitmentAction::decommit(l.order_id, l.line_index))
            .collect()
    }

    /// Recommit actions for every touched line whose final fill matches
    /// `level`. Touched means the line donated, received, or was swept up
    /// by the decommit cascade; untouched lines re-enter no queue.
    pub fn recommit_actions_at(&self, level: FillLevel) -> Vec<CommitmentAction> {
        self.lines
            .iter()
            .filter(|l| (l.do_decommit || l.do_recommit) && l.fill_level() == level)
            .map(|l| CommitmentAction::recommit(l.order_id, l.line_index))
            .collect()
    }

    /// Flat action list: every decommit, then recommits in descending fill
    /// order. Decommits must be applied first so the recommits claim only
    /// inventory that has actually been freed.
    pub fn actions(&self) -> Vec<CommitmentAction> {
        let mut actions = self.decommit_actions();
        actions.extend(self.recommit_actions_at(FillLevel::Full));
        actions.extend(self.recommit_actions_at(FillLevel::Partial));
        actions.extend(self.recommit_actions_at(FillLevel::None));
        actions
    }

    /// Orders touched by any commitment change, in sort order, deduplicated.
    pub fn touched_orders(&self) -> Vec<OrderId> {
        let mut orders: Vec<OrderId> = self
            .lines
            .iter()
            .filter(|l| l.do_decommit || l.do_recommit)
            .map(|l| l.order_id)
            .collect();
        orders.sort_unstable();
        orders.dedup();
        orders
    }

    pub fn is_noop(&self) -> bool {
        self.donations.is_empty() && self.lines.iter().all(|l| !l.do_decommit && !l.do_recommit)
    }

    pub fn total_committed(&self) -> i64 {
        self.lines.iter().map(|l| l.committed).sum()
    }
}

/// Business precedence for one pair's demand list: explicit priority first
/// (lower value wins, absent sorts last), then the line whose demand can be
/// met from inventory expected sooner, then the earliest requested ship
/// date. The sort is stable, so fully tied lines keep their read order.
pub fn sort_demand(lines: &mut [DemandLine]) {
    lines.sort_by(compare);
}

fn compare(a: &DemandLine, b: &DemandLine) -> Ordering {
    match (a.priority, b.priority) {
        (Some(x), Some(y)) => match x.cmp(&y) {
            Ordering::Equal => {}
            other => return other,
        },
        (Some(_), None) => return Ordering::Less,
        (None, Some(_)) => return Ordering::Greater,
        (None, None) => {}
    }

    match a.po_window.cmp(&b.po_window) {
        Ordering::Equal => {}
        other => return other,
    }

    a.ship_date.cmp(&b.ship_date)
}

/// Run one redistribution pass.
///
/// Walks the sorted list front to back; each line with a deficit raids
/// donors from the back of the list toward itself. A donor is eligible only
/// if it still holds committed quantity, is not protected, and sits in a
/// strictly later supply window than the recipient. Equal-window transfers
/// are refused, so a window-0 line can never be raided.
///
/// Total committed quantity across the set is conserved exactly, and no
/// line ends above its ordered quantity. A deficit that finds no donors
/// stays unmet; under-commitment is a valid state that corrects itself when
/// more supply arrives.
pub fn redistribute(mut lines: Vec<DemandLine>) -> RedistributionOutcome {
    sort_demand(&mut lines);

    let mut donations = Vec::new();
    let n = lines.len();

    for i in 0..n {
        let mut deficit = lines[i].deficit();
        if deficit <= 0 {
            continue;
        }

        for j in (i + 1..n).rev() {
            if deficit == 0 {
                break;
            }
            if lines[j].committed <= 0
                || lines[j].is_protected()
                || lines[j].po_window <= lines[i].po_window
            {
                continue;
            }

            let take = deficit.min(lines[j].committed);
            lines[j].committed -= take;
            lines[j].do_decommit = true;
            lines[i].committed += take;
            lines[i].do_recommit = true;
            deficit -= take;

            donations.push(Donation {
                donor_order: lines[j].order_id,
                donor_line: lines[j].line_index,
                donor_window: lines[j].po_window,
                recipient_order: lines[i].order_id,
                recipient_line: lines[i].line_index,
                recipient_window: lines[i].po_window,
                quantity: take,
            });
        }
    }

    // Every line behind the earliest donor re-enters the commit queue: it
    // must not silently re-steal the freed inventory ahead of the lines it
    // was raided for. Protected lines keep their reservation untouched.
    if let Some(first_donor) = lines.iter().position(|l| l.do_decommit) {
        for line in &mut lines[first_donor + 1..] {
            if !line.is_protected() {
                line.do_decommit = true;
            }
        }
    }

    RedistributionOutcome { lines, donations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use recommit_core::{ItemId, LocationId};
    use uuid::Uuid;

    fn order(n: u128) -> OrderId {
        OrderId::from_uuid(Uuid::from_u128(n))
    }

    fn ship(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    fn line(tag: u128, quantity: i64, committed: i64, window: usize) -> DemandLine {
        DemandLine {
            order_id: order(tag),
            line_index: 1,
            item: ItemId::from_uuid(Uuid::from_u128(900)),
            location: LocationId::from_uuid(Uuid::from_u128(901)),
            quantity,
            committed,
            ship_date: ship(tag as u32 % 28 + 1),
            priority: None,
            logistics_approved: false,
            split_from_order: None,
            po_window: window,
            do_decommit: false,
            do_recommit: false,
        }
    }

    fn by_order(outcome: &RedistributionOutcome, tag: u128) -> &DemandLine {
        outcome
            .lines
            .iter()
            .find(|l| l.order_id == order(tag))
            .unwrap()
    }

    #[test]
    fn explicit_priority_overrides_window_and_date() {
        let mut urgent = line(1, 10, 0, 5);
        urgent.priority = Some(1);
        urgent.ship_date = ship(28);
        let relaxed = line(2, 10, 0, 0);

        let mut lines = vec![relaxed, urgent];
        sort_demand(&mut lines);
        assert_eq!(lines[0].order_id, order(1));
    }

    #[test]
    fn absent_priority_sorts_last() {
        let unprioritized = line(1, 10, 0, 0);
        let mut low_urgency = line(2, 10, 0, 7);
        low_urgency.priority = Some(99);

        let mut lines = vec![unprioritized, low_urgency];
        sort_demand(&mut lines);
        assert_eq!(lines[0].order_id, order(2));
    }

    #[test]
    fn window_then_ship_date_break_ties() {
        let mut a = line(1, 10, 0, 1);
        a.ship_date = ship(20);
        let mut b = line(2, 10, 0, 0);
        b.ship_date = ship(25);
        let mut c = line(3, 10, 0, 1);
        c.ship_date = ship(5);

        let mut lines = vec![a, b, c];
        sort_demand(&mut lines);
        let order_ids: Vec<_> = lines.iter().map(|l| l.order_id).collect();
        assert_eq!(order_ids, vec![order(2), order(3), order(1)]);
    }

    #[test]
    fn later_window_donates_to_earlier_deficit() {
        let recipient = line(1, 10, 2, 0);
        let donor = line(2, 8, 8, 2);

        let outcome = redistribute(vec![recipient, donor]);

        assert_eq!(by_order(&outcome, 1).committed, 10);
        assert_eq!(by_order(&outcome, 2).committed, 0);
        assert!(by_order(&outcome, 1).do_recommit);
        assert!(by_order(&outcome, 2).do_decommit);
        assert_eq!(outcome.donations.len(), 1);
        assert_eq!(outcome.donations[0].quantity, 8);
    }

    #[test]
    fn deficit_with_no_later_window_donor_stays_unmet() {
        let full = line(1, 10, 10, 0);
        let starved = line(2, 10, 0, 0);

        let outcome = redistribute(vec![full, starved]);

        assert!(outcome.is_noop());
        assert_eq!(by_order(&outcome, 2).committed, 0);
        assert!(outcome.actions().is_empty());
    }

    #[test]
    fn later_window_supply_is_pulled_forward() {
        // The same pair as above, plus a window-2 order holding five units:
        // those five move to the starved window-0 line and the donor joins
        // the recommit queue empty-handed.
        let full = line(1, 10, 10, 0);
        let mut starved = line(2, 10, 0, 0);
        starved.ship_date = ship(27);
        let donor = line(3, 5, 5, 2);

        let outcome = redistribute(vec![full, starved, donor]);

        let starved = by_order(&outcome, 2);
        let donor = by_order(&outcome, 3);
        assert_eq!(starved.committed, 5);
        assert!(starved.do_recommit);
        assert_eq!(donor.committed, 0);
        assert!(donor.do_decommit);

        let untouched = by_order(&outcome, 1);
        assert!(!untouched.do_decommit && !untouched.do_recommit);

        assert_eq!(starved.fill_level(), FillLevel::Partial);
        assert_eq!(donor.fill_level(), FillLevel::None);
    }

    #[test]
    fn equal_window_never_donates() {
        let starved = line(1, 10, 0, 1);
        let peer = line(2, 10, 10, 1);

        let outcome = redistribute(vec![starved, peer]);
        assert!(outcome.is_noop());
    }

    #[test]
    fn logistics_approved_donor_is_never_raided() {
        let starved = line(1, 10, 0, 0);
        let mut protected = line(2, 10, 10, 2);
        protected.logistics_approved = true;

        let outcome = redistribute(vec![starved, protected]);
        assert!(outcome.is_noop());
        assert!(!by_order(&outcome, 2).do_decommit);
    }

    #[test]
    fn split_origin_donor_is_never_raided() {
        let starved = line(1, 10, 0, 0);
        let mut protected = line(2, 10, 10, 2);
        protected.split_from_order = Some(order(77));

        let outcome = redistribute(vec![starved, protected]);
        assert!(outcome.is_noop());
    }

    #[test]
    fn donors_drain_in_reverse_sort_order() {
        let recipient = line(1, 10, 2, 0);
        let near = line(2, 5, 5, 1);
        let far = line(3, 5, 5, 2);

        let outcome = redistribute(vec![recipient, near, far]);

        // The farthest-out donor empties first; the nearer one covers the rest.
        assert_eq!(outcome.donations[0].donor_order, order(3));
        assert_eq!(outcome.donations[0].quantity, 5);
        assert_eq!(outcome.donations[1].donor_order, order(2));
        assert_eq!(outcome.donations[1].quantity, 3);
        assert_eq!(by_order(&outcome, 2).committed, 2);
        assert_eq!(by_order(&outcome, 3).committed, 0);
        assert_eq!(by_order(&outcome, 1).committed, 10);
    }

    #[test]
    fn cascade_marks_every_unprotected_line_behind_the_earliest_donor() {
        let recipient = line(1, 5, 0, 0);
        let mut donor = line(2, 5, 5, 1);
        donor.ship_date = ship(2);
        let mut bystander = line(3, 4, 0, 2);
        bystander.ship_date = ship(3);
        let mut protected = line(4, 4, 4, 2);
        protected.logistics_approved = true;
        protected.ship_date = ship(4);

        let outcome = redistribute(vec![recipient, donor, bystander, protected]);

        assert!(by_order(&outcome, 2).do_decommit);
        // Never donated, but sits behind the raided donor: back of the queue.
        assert!(by_order(&outcome, 3).do_decommit);
        assert!(!by_order(&outcome, 4).do_decommit);
    }

    #[test]
    fn decommits_precede_recommits() {
        let recipient = line(1, 10, 0, 0);
        let donor = line(2, 5, 5, 1);
        let bystander = line(3, 4, 0, 2);

        let actions = redistribute(vec![recipient, donor, bystander]).actions();

        let first_recommit = actions
            .iter()
            .position(|a| a.kind == ActionKind::Recommit)
            .unwrap();
        assert!(
            actions[..first_recommit]
                .iter()
                .all(|a| a.kind == ActionKind::Decommit)
        );
        assert!(
            actions[first_recommit..]
                .iter()
                .all(|a| a.kind == ActionKind::Recommit)
        );
    }

    #[test]
    fn earlier_sorted_deficit_is_served_first() {
        let mut urgent = line(1, 10, 0, 0);
        urgent.priority = Some(1);
        let relaxed = line(2, 10, 0, 0);
        let donor = line(3, 5, 5, 3);

        let outcome = redistribute(vec![relaxed, urgent, donor]);

        assert_eq!(by_order(&outcome, 1).committed, 5);
        assert_eq!(by_order(&outcome, 2).committed, 0);
    }

    #[test]
    fn committed_total_is_conserved() {
        let lines = vec![
            line(1, 10, 4, 0),
            line(2, 6, 6, 1),
            line(3, 9, 2, 2),
            line(4, 5, 5, 3),
        ];
        let before: i64 = lines.iter().map(|l| l.committed).sum();

        let outcome = redistribute(lines);
        assert_eq!(outcome.total_committed(), before);
    }

    #[test]
    fn touched_orders_dedup_across_lines() {
        let recipient = line(1, 10, 0, 0);
        let mut donor_a = line(2, 5, 5, 1);
        donor_a.line_index = 1;
        let mut donor_b = line(2, 5, 5, 2);
        donor_b.line_index = 2;

        let outcome = redistribute(vec![recipient, donor_a, donor_b]);
        assert_eq!(outcome.touched_orders(), vec![order(1), order(2)]);
    }

    fn arb_line() -> impl Strategy<Value = DemandLine> {
        (
            1u128..64,
            0i64..40,
            0usize..5,
            proptest::option::of(0u32..4),
            proptest::bool::ANY,
            1u32..28,
        )
            .prop_flat_map(|(tag, quantity, window, priority, protected, day)| {
                (0..=quantity).prop_map(move |committed| {
                    let mut l = line(tag, quantity, committed, window);
                    l.priority = priority;
                    l.logistics_approved = protected;
                    l.ship_date = ship(day);
                    l
                })
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: total committed quantity is conserved exactly.
        #[test]
        fn committed_is_conserved(lines in prop::collection::vec(arb_line(), 0..24)) {
            let before: i64 = lines.iter().map(|l| l.committed).sum();
            let outcome = redistribute(lines);
            prop_assert_eq!(outcome.total_committed(), before);
        }

        /// Property: no line ends committed above its ordered quantity.
        #[test]
        fn no_line_over_commits(lines in prop::collection::vec(arb_line(), 0..24)) {
            let outcome = redistribute(lines);
            for l in &outcome.lines {
                prop_assert!(l.committed <= l.quantity);
                prop_assert!(l.committed >= 0);
            }
        }

        /// Property: protected lines never lose their reservation.
        #[test]
        fn protected_lines_never_decommit(lines in prop::collection::vec(arb_line(), 0..24)) {
            // Unique line indices so each generated line is identifiable.
            let lines: Vec<DemandLine> = lines
                .into_iter()
                .enumerate()
                .map(|(i, mut l)| {
                    l.line_index = i as u32;
                    l
                })
                .collect();
            let protected_before: Vec<(OrderId, u32, i64)> = lines
                .iter()
                .filter(|l| l.is_protected())
                .map(|l| (l.order_id, l.line_index, l.committed))
                .collect();

            let outcome = redistribute(lines);
            for l in outcome.lines.iter().filter(|l| l.is_protected()) {
                prop_assert!(!l.do_decommit);
            }
            for (order_id, line_index, committed) in protected_before {
                let after = outcome
                    .lines
                    .iter()
                    .find(|l| l.order_id == order_id && l.line_index == line_index)
                    .unwrap();
                prop_assert_eq!(after.committed, committed);
            }
        }

        /// Property: rerunning on an unchanged snapshot is a no-op.
        #[test]
        fn second_pass_is_a_noop(lines in prop::collection::vec(arb_line(), 0..24)) {
            let first = redistribute(lines);

            let rerun: Vec<DemandLine> = first
                .lines
                .iter()
                .cloned()
                .map(|mut l| {
                    l.do_decommit = false;
                    l.do_recommit = false;
                    l
                })
                .collect();

            let second = redistribute(rerun);
            prop_assert!(second.is_noop());
            prop_assert!(second.actions().is_empty());
        }
    }
}
