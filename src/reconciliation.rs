// ⚖️ Reconciliation Engine - FIFO allocation of payment credit to lessons
//
// For one payer and one billing party:
//   available_credit = Σ live payments
//   walk live lessons oldest first (ties by lesson id):
//     cost == 0                      → PAID
//     credit >= cost                 → PAID, credit -= cost
//     otherwise                      → UNPAID, credit drains to max(0, credit - cost)
//
// The drain keeps the PAID set a chronological prefix: once a lesson goes
// unpaid, no later lesson can jump ahead of it for credit. Credit is local to
// one pass; every scope recomputes its own.

use crate::correction::live;
use crate::entities::{LessonLog, PaymentRecord};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use uuid::Uuid;

// ============================================================================
// STATUS + SCOPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaidStatus {
    Paid,
    Unpaid,
}

impl PaidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaidStatus::Paid => "PAID",
            PaidStatus::Unpaid => "UNPAID",
        }
    }
}

/// Which lessons compete for which credit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationScope {
    pub payer: Uuid,

    /// One relationship only; `None` reconciles every billing party of the payer
    pub billing_party: Option<Uuid>,

    /// Only this student's lessons and only their share of each lesson's cost
    pub student: Option<Uuid>,
}

impl ReconciliationScope {
    pub fn payer(payer: Uuid) -> Self {
        ReconciliationScope {
            payer,
            billing_party: None,
            student: None,
        }
    }

    pub fn with_billing_party(mut self, billing_party: Uuid) -> Self {
        self.billing_party = Some(billing_party);
        self
    }

    pub fn with_student(mut self, student: Uuid) -> Self {
        self.student = Some(student);
        self
    }
}

// ============================================================================
// FIFO CORE
// ============================================================================

/// A lesson reduced to what the allocation needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillableLesson {
    pub lesson_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonStatus {
    pub lesson_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub cost: Decimal,
    pub status: PaidStatus,
}

/// Allocate `available_credit` to lessons in (start time, id) order
pub fn allocate_fifo(available_credit: Decimal, lessons: &[BillableLesson]) -> Vec<LessonStatus> {
    let mut ordered: Vec<&BillableLesson> = lessons.iter().collect();
    ordered.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.lesson_id.cmp(&b.lesson_id))
    });

    let mut credit = available_credit.max(Decimal::ZERO);
    ordered
        .into_iter()
        .map(|lesson| {
            let status = if lesson.cost <= Decimal::ZERO {
                PaidStatus::Paid
            } else if credit >= lesson.cost {
                credit -= lesson.cost;
                PaidStatus::Paid
            } else {
                credit = (credit - lesson.cost).max(Decimal::ZERO);
                PaidStatus::Unpaid
            };
            LessonStatus {
                lesson_id: lesson.lesson_id,
                start_time: lesson.start_time,
                cost: lesson.cost,
                status,
            }
        })
        .collect()
}

// ============================================================================
// REPORT
// ============================================================================

/// One payer ↔ billing party pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipPass {
    pub billing_party: Uuid,

    /// Σ live payments in the relationship
    pub available_credit: Decimal,

    /// Σ cost of in-scope live lessons
    pub total_cost: Decimal,

    /// Credit spent on PAID lessons
    pub consumed: Decimal,

    /// Oldest first
    pub lessons: Vec<LessonStatus>,
}

impl RelationshipPass {
    /// Payments minus cost; negative means the payer owes
    pub fn balance(&self) -> Decimal {
        self.available_credit - self.total_cost
    }

    pub fn unpaid_count(&self) -> usize {
        self.lessons
            .iter()
            .filter(|l| l.status == PaidStatus::Unpaid)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub scope: ReconciliationScope,

    /// Ordered by billing party id
    pub passes: Vec<RelationshipPass>,

    pub statuses: BTreeMap<Uuid, PaidStatus>,
}

impl ReconciliationReport {
    pub fn status(&self, lesson_id: Uuid) -> Option<PaidStatus> {
        self.statuses.get(&lesson_id).copied()
    }

    pub fn total_credit(&self) -> Decimal {
        self.passes.iter().map(|p| p.available_credit).sum()
    }

    pub fn total_cost(&self) -> Decimal {
        self.passes.iter().map(|p| p.total_cost).sum()
    }

    pub fn paid_count(&self) -> usize {
        self.statuses.values().filter(|s| **s == PaidStatus::Paid).count()
    }

    pub fn unpaid_count(&self) -> usize {
        self.statuses.values().filter(|s| **s == PaidStatus::Unpaid).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation for payer {}: {} lessons ({} paid, {} unpaid), credit {}, cost {}",
            self.scope.payer,
            self.statuses.len(),
            self.paid_count(),
            self.unpaid_count(),
            self.total_credit(),
            self.total_cost()
        )
    }
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconciliationEngine;

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine
    }

    /// Reconcile `scope` over a lesson and payment snapshot.
    ///
    /// VOID and superseded records are dropped first. Each billing party gets
    /// an independent pass with its own credit. With a student scope, only
    /// billing parties that taught that student get a pass.
    pub fn reconcile(
        &self,
        scope: ReconciliationScope,
        lessons: &[LessonLog],
        payments: &[PaymentRecord],
    ) -> ReconciliationReport {
        let lessons = live(lessons);
        let payments = live(payments);

        let mut billing_parties: BTreeSet<Uuid> = BTreeSet::new();
        billing_parties.extend(
            lessons
                .iter()
                .filter(|l| Self::in_scope(&scope, l))
                .map(|l| l.teacher_id),
        );
        // a student scope only covers teachers that student actually had
        if scope.student.is_none() {
            billing_parties.extend(
                payments
                    .iter()
                    .filter(|p| p.parent_id == scope.payer)
                    .map(|p| p.teacher_id),
            );
        }
        if let Some(only) = scope.billing_party {
            billing_parties.retain(|bp| *bp == only);
        }

        let mut passes = Vec::with_capacity(billing_parties.len());
        let mut statuses = BTreeMap::new();
        for billing_party in billing_parties {
            let pass = self.reconcile_relationship(&scope, billing_party, &lessons, &payments);
            statuses.extend(pass.lessons.iter().map(|l| (l.lesson_id, l.status)));
            passes.push(pass);
        }

        let report = ReconciliationReport {
            scope,
            passes,
            statuses,
        };
        debug!(
            payer = %scope.payer,
            lessons = report.statuses.len(),
            unpaid = report.unpaid_count(),
            credit = %report.total_credit(),
            "Reconciled"
        );
        report
    }

    fn in_scope(scope: &ReconciliationScope, lesson: &LessonLog) -> bool {
        lesson.charges.iter().any(|c| {
            c.parent_id == scope.payer && scope.student.map_or(true, |s| c.student_id == s)
        })
    }

    fn reconcile_relationship(
        &self,
        scope: &ReconciliationScope,
        billing_party: Uuid,
        lessons: &[&LessonLog],
        payments: &[&PaymentRecord],
    ) -> RelationshipPass {
        let available_credit: Decimal = payments
            .iter()
            .filter(|p| p.is_between(scope.payer, billing_party))
            .map(|p| p.amount)
            .sum();

        let billable: Vec<BillableLesson> = lessons
            .iter()
            .filter(|l| l.teacher_id == billing_party && Self::in_scope(scope, l))
            .map(|l| BillableLesson {
                lesson_id: l.id,
                start_time: l.start_time,
                cost: l.cost_for(scope.payer, scope.student),
            })
            .collect();

        let allocated = allocate_fifo(available_credit, &billable);
        let total_cost = allocated.iter().map(|l| l.cost).sum();
        let consumed = allocated
            .iter()
            .filter(|l| l.status == PaidStatus::Paid)
            .map(|l| l.cost.max(Decimal::ZERO))
            .sum();

        RelationshipPass {
            billing_party,
            available_credit,
            total_cost,
            consumed,
            lessons: allocated,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::{Origin, RecordStatus};
    use crate::entities::{LessonCharge, LessonKind};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    const PAYER: Uuid = Uuid::from_u128(0xA);
    const OTHER_PAYER: Uuid = Uuid::from_u128(0xB);
    const TEACHER: Uuid = Uuid::from_u128(0x7);
    const OTHER_TEACHER: Uuid = Uuid::from_u128(0x8);
    const KID: Uuid = Uuid::from_u128(0x51);
    const SIBLING: Uuid = Uuid::from_u128(0x52);

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap() + Duration::days(n)
    }

    fn lesson(id: u128, on: i64, charges: &[(Uuid, Decimal)]) -> LessonLog {
        LessonLog {
            id: Uuid::from_u128(id),
            teacher_id: TEACHER,
            subject: "Math".to_string(),
            educational_system: "IGCSE".to_string(),
            lesson_index: None,
            tuition_id: None,
            start_time: day(on),
            end_time: day(on) + Duration::hours(1),
            kind: LessonKind::Custom,
            status: RecordStatus::Active,
            origin: Origin::Original,
            charges: charges
                .iter()
                .map(|(student_id, cost)| LessonCharge {
                    student_id: *student_id,
                    parent_id: PAYER,
                    cost: *cost,
                })
                .collect(),
        }
    }

    fn payment(amount: Decimal) -> PaymentRecord {
        PaymentRecord::new(PAYER, TEACHER, amount, day(0))
    }

    fn statuses(report: &ReconciliationReport, ids: &[u128]) -> Vec<PaidStatus> {
        ids.iter()
            .map(|id| report.status(Uuid::from_u128(*id)).unwrap())
            .collect()
    }

    #[test]
    fn test_credit_exhausted_at_second_lesson() {
        let lessons = vec![
            lesson(1, 1, &[(KID, dec!(100))]),
            lesson(2, 2, &[(KID, dec!(50))]),
            lesson(3, 3, &[(KID, dec!(30))]),
        ];
        let payments = vec![payment(dec!(100)), payment(dec!(20))];

        let report = ReconciliationEngine::new().reconcile(ReconciliationScope::payer(PAYER), &lessons, &payments);

        assert_eq!(
            statuses(&report, &[1, 2, 3]),
            vec![PaidStatus::Paid, PaidStatus::Unpaid, PaidStatus::Unpaid]
        );
        assert_eq!(report.total_credit(), dec!(120));
        assert_eq!(report.passes[0].consumed, dec!(100));

        println!("✅ FIFO concrete scenario test passed");
    }

    #[test]
    fn test_cheap_later_lesson_waits_behind_expensive_one() {
        // total credit covers lesson 1 + lesson 3, but lesson 2 comes first
        let lessons = vec![
            lesson(1, 1, &[(KID, dec!(80))]),
            lesson(2, 2, &[(KID, dec!(30))]),
            lesson(3, 3, &[(KID, dec!(20))]),
        ];
        let report = ReconciliationEngine::new().reconcile(
            ReconciliationScope::payer(PAYER),
            &lessons,
            &[payment(dec!(100))],
        );

        assert_eq!(
            statuses(&report, &[1, 2, 3]),
            vec![PaidStatus::Paid, PaidStatus::Unpaid, PaidStatus::Unpaid]
        );
    }

    #[test]
    fn test_processing_is_chronological_not_input_order() {
        let lessons = vec![
            lesson(3, 3, &[(KID, dec!(10))]),
            lesson(1, 1, &[(KID, dec!(10))]),
            lesson(2, 2, &[(KID, dec!(10))]),
        ];
        let report = ReconciliationEngine::new().reconcile(
            ReconciliationScope::payer(PAYER),
            &lessons,
            &[payment(dec!(20))],
        );

        assert_eq!(
            statuses(&report, &[1, 2, 3]),
            vec![PaidStatus::Paid, PaidStatus::Paid, PaidStatus::Unpaid]
        );
    }

    #[test]
    fn test_zero_cost_lesson_is_always_paid() {
        let lessons = vec![
            lesson(1, 1, &[(KID, dec!(50))]),
            lesson(2, 2, &[(KID, dec!(0))]),
        ];
        let report = ReconciliationEngine::new().reconcile(ReconciliationScope::payer(PAYER), &lessons, &[]);

        assert_eq!(
            statuses(&report, &[1, 2]),
            vec![PaidStatus::Unpaid, PaidStatus::Paid]
        );
    }

    #[test]
    fn test_void_and_corrected_records_are_ignored() {
        let mut voided = lesson(1, 1, &[(KID, dec!(40))]);
        voided.status = RecordStatus::Void;
        let mut original = lesson(2, 2, &[(KID, dec!(40))]);
        original.status = RecordStatus::Void;
        let mut successor = lesson(3, 2, &[(KID, dec!(30))]);
        successor.origin = Origin::Correction(original.id);

        let mut void_payment = payment(dec!(500));
        void_payment.status = RecordStatus::Void;

        let report = ReconciliationEngine::new().reconcile(
            ReconciliationScope::payer(PAYER),
            &[voided, original, successor],
            &[void_payment, payment(dec!(30))],
        );

        assert_eq!(report.statuses.len(), 1);
        assert_eq!(report.status(Uuid::from_u128(3)), Some(PaidStatus::Paid));
        assert_eq!(report.total_credit(), dec!(30));
    }

    #[test]
    fn test_same_start_time_breaks_ties_by_id() {
        let lessons = vec![
            lesson(9, 1, &[(KID, dec!(25))]),
            lesson(4, 1, &[(KID, dec!(25))]),
        ];
        let report = ReconciliationEngine::new().reconcile(
            ReconciliationScope::payer(PAYER),
            &lessons,
            &[payment(dec!(25))],
        );

        assert_eq!(
            statuses(&report, &[4, 9]),
            vec![PaidStatus::Paid, PaidStatus::Unpaid]
        );
    }

    #[test]
    fn test_relationships_do_not_share_credit() {
        let mut elsewhere = lesson(2, 1, &[(KID, dec!(60))]);
        elsewhere.teacher_id = OTHER_TEACHER;
        let lessons = vec![lesson(1, 2, &[(KID, dec!(60))]), elsewhere];
        let payments = vec![payment(dec!(100))];

        let engine = ReconciliationEngine::new();
        let whole = engine.reconcile(ReconciliationScope::payer(PAYER), &lessons, &payments);
        assert_eq!(whole.passes.len(), 2);
        assert_eq!(whole.status(Uuid::from_u128(1)), Some(PaidStatus::Paid));
        assert_eq!(whole.status(Uuid::from_u128(2)), Some(PaidStatus::Unpaid));

        let one = engine.reconcile(
            ReconciliationScope::payer(PAYER).with_billing_party(OTHER_TEACHER),
            &lessons,
            &payments,
        );
        assert_eq!(one.passes.len(), 1);
        assert_eq!(one.total_credit(), Decimal::ZERO);
    }

    #[test]
    fn test_student_scope_recomputes_competition() {
        // sibling's lesson eats the credit in the whole-payer pass
        let lessons = vec![
            lesson(1, 1, &[(SIBLING, dec!(100))]),
            lesson(2, 2, &[(KID, dec!(40))]),
        ];
        let payments = vec![payment(dec!(100))];
        let engine = ReconciliationEngine::new();

        let whole = engine.reconcile(ReconciliationScope::payer(PAYER), &lessons, &payments);
        assert_eq!(whole.status(Uuid::from_u128(2)), Some(PaidStatus::Unpaid));

        let kid_only = engine.reconcile(ReconciliationScope::payer(PAYER).with_student(KID), &lessons, &payments);
        assert_eq!(kid_only.statuses.len(), 1);
        assert_eq!(kid_only.status(Uuid::from_u128(2)), Some(PaidStatus::Paid));
    }

    #[test]
    fn test_student_scope_skips_teachers_the_student_never_had() {
        let lessons = vec![lesson(1, 1, &[(KID, dec!(60))])];
        let payments = vec![
            payment(dec!(150)),
            PaymentRecord::new(PAYER, OTHER_TEACHER, dec!(100), day(0)),
        ];
        let engine = ReconciliationEngine::new();

        let whole = engine.reconcile(ReconciliationScope::payer(PAYER), &lessons, &payments);
        assert_eq!(whole.passes.len(), 2);
        assert_eq!(whole.total_credit(), dec!(250));

        let kid_only = engine.reconcile(ReconciliationScope::payer(PAYER).with_student(KID), &lessons, &payments);
        assert_eq!(kid_only.passes.len(), 1);
        assert_eq!(kid_only.passes[0].billing_party, TEACHER);
        assert_eq!(kid_only.total_credit(), dec!(150));
        assert_eq!(kid_only.passes[0].balance(), dec!(90));
    }

    #[test]
    fn test_only_payer_share_of_shared_lesson_counts() {
        let mut shared = lesson(1, 1, &[(KID, dec!(50))]);
        shared.charges.push(LessonCharge {
            student_id: SIBLING,
            parent_id: OTHER_PAYER,
            cost: dec!(500),
        });

        let report = ReconciliationEngine::new().reconcile(
            ReconciliationScope::payer(PAYER),
            &[shared],
            &[payment(dec!(50))],
        );
        assert_eq!(report.total_cost(), dec!(50));
        assert_eq!(report.status(Uuid::from_u128(1)), Some(PaidStatus::Paid));
    }

    proptest! {
        #[test]
        fn prop_paid_lessons_form_a_chronological_prefix(
            costs in prop::collection::vec(1u32..200, 0..20),
            credit in 0u32..2000,
        ) {
            let lessons: Vec<BillableLesson> = costs
                .iter()
                .enumerate()
                .map(|(i, cost)| BillableLesson {
                    lesson_id: Uuid::from_u128(i as u128),
                    start_time: day(i as i64),
                    cost: Decimal::from(*cost),
                })
                .collect();
            let credit = Decimal::from(credit);

            let allocated = allocate_fifo(credit, &lessons);

            let paid = allocated.iter().take_while(|l| l.status == PaidStatus::Paid).count();
            prop_assert!(allocated[paid..].iter().all(|l| l.status == PaidStatus::Unpaid));

            let spent: Decimal = allocated[..paid].iter().map(|l| l.cost).sum();
            prop_assert!(spent <= credit);
            if let Some(next) = allocated.get(paid) {
                prop_assert!(spent + next.cost > credit);
            }
        }

        #[test]
        fn prop_input_order_does_not_matter(
            costs in prop::collection::vec(0u32..100, 1..12),
            credit in 0u32..500,
            seed in any::<u64>(),
        ) {
            let mut lessons: Vec<BillableLesson> = costs
                .iter()
                .enumerate()
                .map(|(i, cost)| BillableLesson {
                    lesson_id: Uuid::from_u128(i as u128),
                    start_time: day((i % 3) as i64),
                    cost: Decimal::from(*cost),
                })
                .collect();
            let forward = allocate_fifo(Decimal::from(credit), &lessons);

            let len = lessons.len();
            lessons.rotate_left((seed as usize) % len);
            lessons.reverse();
            let shuffled = allocate_fifo(Decimal::from(credit), &lessons);

            prop_assert_eq!(forward, shuffled);
        }
    }
}
