// 📊 Financial Aggregator - payer and billing party roll-ups
//
// Every figure is derived from fresh reconciliation passes over the scoped
// snapshot, never by slicing a wider pass.
//
//   payer view:          total_due      = max(0, cost - payments)
//                        credit_balance = max(0, payments - cost)
//   billing party view:  total_owed        = Σ max(0, -balance)  per payer
//                        total_credit_held = Σ max(0,  balance)  per payer

use crate::correction::live;
use crate::entities::{LessonLog, PaymentRecord};
use crate::reconciliation::{PaidStatus, ReconciliationEngine, ReconciliationScope, RelationshipPass};
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

// ============================================================================
// SUMMARY TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipBalance {
    pub payer: Uuid,
    pub billing_party: Uuid,
    pub total_payments: Decimal,
    pub total_lesson_cost: Decimal,

    /// Payments minus cost; negative means the payer owes
    pub balance: Decimal,

    pub unpaid_count: usize,
}

impl RelationshipBalance {
    fn from_pass(payer: Uuid, pass: &RelationshipPass) -> Self {
        RelationshipBalance {
            payer,
            billing_party: pass.billing_party,
            total_payments: pass.available_credit,
            total_lesson_cost: pass.total_cost,
            balance: pass.balance(),
            unpaid_count: pass.unpaid_count(),
        }
    }

    pub fn owed(&self) -> Decimal {
        (-self.balance).max(Decimal::ZERO)
    }

    pub fn credit(&self) -> Decimal {
        self.balance.max(Decimal::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayerSummary {
    pub scope: ReconciliationScope,
    pub total_lesson_cost: Decimal,
    pub total_payments: Decimal,
    pub total_due: Decimal,
    pub credit_balance: Decimal,
    pub unpaid_count: usize,
    pub relationships: Vec<RelationshipBalance>,
}

/// Status of one student's charge on one lesson
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeStatus {
    pub lesson_id: Uuid,
    pub student_id: Uuid,
    pub payer: Uuid,
    pub start_time: DateTime<Utc>,
    pub cost: Decimal,
    pub status: PaidStatus,
}

/// Narrow a billing party view to one payer and/or one student
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPartyFilter {
    pub payer: Option<Uuid>,
    pub student: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingPartySummary {
    pub billing_party: Uuid,
    pub filter: BillingPartyFilter,
    pub total_owed: Decimal,
    pub total_credit_held: Decimal,

    /// In-scope lessons that started in the calendar month (UTC) of `as_of`
    pub lessons_this_month: usize,

    /// Lessons with at least one unpaid charge
    pub unpaid_lessons_count: usize,

    pub relationships: Vec<RelationshipBalance>,

    /// Oldest first
    pub charges: Vec<ChargeStatus>,
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct FinancialAggregator {
    engine: ReconciliationEngine,
}

impl FinancialAggregator {
    pub fn new() -> Self {
        FinancialAggregator {
            engine: ReconciliationEngine::new(),
        }
    }

    pub fn summarize_payer(
        &self,
        scope: ReconciliationScope,
        lessons: &[LessonLog],
        payments: &[PaymentRecord],
    ) -> PayerSummary {
        let report = self.engine.reconcile(scope, lessons, payments);

        let total_lesson_cost = report.total_cost();
        let total_payments = report.total_credit();
        let summary = PayerSummary {
            scope,
            total_lesson_cost,
            total_payments,
            total_due: (total_lesson_cost - total_payments).max(Decimal::ZERO),
            credit_balance: (total_payments - total_lesson_cost).max(Decimal::ZERO),
            unpaid_count: report.unpaid_count(),
            relationships: report
                .passes
                .iter()
                .map(|pass| RelationshipBalance::from_pass(scope.payer, pass))
                .collect(),
        };

        debug!(
            payer = %scope.payer,
            due = %summary.total_due,
            credit = %summary.credit_balance,
            unpaid = summary.unpaid_count,
            "Payer summary"
        );
        summary
    }

    pub fn summarize_billing_party(
        &self,
        billing_party: Uuid,
        filter: BillingPartyFilter,
        as_of: DateTime<Utc>,
        lessons: &[LessonLog],
        payments: &[PaymentRecord],
    ) -> BillingPartySummary {
        let live_lessons: Vec<&LessonLog> = live(lessons)
            .into_iter()
            .filter(|l| l.teacher_id == billing_party)
            .collect();

        let payers = Self::payers(billing_party, &filter, &live_lessons, payments);

        let mut relationships = Vec::with_capacity(payers.len());
        let mut charges = Vec::new();
        let mut unpaid_lessons = BTreeSet::new();

        for payer in payers {
            let mut scope = ReconciliationScope::payer(payer).with_billing_party(billing_party);
            if let Some(student) = filter.student {
                scope = scope.with_student(student);
            }
            let report = self.engine.reconcile(scope, lessons, payments);

            for pass in &report.passes {
                relationships.push(RelationshipBalance::from_pass(payer, pass));
            }

            for lesson in &live_lessons {
                let Some(status) = report.status(lesson.id) else {
                    continue;
                };
                if status == PaidStatus::Unpaid {
                    unpaid_lessons.insert(lesson.id);
                }
                charges.extend(
                    lesson
                        .charges
                        .iter()
                        .filter(|c| c.parent_id == payer)
                        .filter(|c| filter.student.map_or(true, |s| c.student_id == s))
                        .map(|c| ChargeStatus {
                            lesson_id: lesson.id,
                            student_id: c.student_id,
                            payer,
                            start_time: lesson.start_time,
                            cost: c.cost,
                            status,
                        }),
                );
            }
        }

        charges.sort_by(|a, b| {
            (a.start_time, a.lesson_id, a.student_id).cmp(&(b.start_time, b.lesson_id, b.student_id))
        });

        let lessons_this_month = live_lessons
            .iter()
            .filter(|l| Self::matches_filter(l, &filter))
            .filter(|l| l.start_time.year() == as_of.year() && l.start_time.month() == as_of.month())
            .count();

        let summary = BillingPartySummary {
            billing_party,
            filter,
            total_owed: relationships.iter().map(RelationshipBalance::owed).sum(),
            total_credit_held: relationships.iter().map(RelationshipBalance::credit).sum(),
            lessons_this_month,
            unpaid_lessons_count: unpaid_lessons.len(),
            relationships,
            charges,
        };

        debug!(
            billing_party = %billing_party,
            owed = %summary.total_owed,
            credit_held = %summary.total_credit_held,
            this_month = summary.lessons_this_month,
            "Billing party summary"
        );
        summary
    }

    fn matches_filter(lesson: &LessonLog, filter: &BillingPartyFilter) -> bool {
        lesson.charges.iter().any(|c| {
            filter.payer.map_or(true, |p| c.parent_id == p)
                && filter.student.map_or(true, |s| c.student_id == s)
        })
    }

    /// Payers with live lessons or live payments in the relationship, narrowed by `filter`
    fn payers(
        billing_party: Uuid,
        filter: &BillingPartyFilter,
        lessons: &[&LessonLog],
        payments: &[PaymentRecord],
    ) -> BTreeSet<Uuid> {
        let mut payers: BTreeSet<Uuid> = lessons
            .iter()
            .flat_map(|l| l.charges.iter())
            .filter(|c| filter.student.map_or(true, |s| c.student_id == s))
            .map(|c| c.parent_id)
            .collect();

        if filter.student.is_none() {
            payers.extend(
                live(payments)
                    .into_iter()
                    .filter(|p| p.teacher_id == billing_party)
                    .map(|p| p.parent_id),
            );
        }
        if let Some(only) = filter.payer {
            payers.retain(|p| *p == only);
        }
        payers
    }
}

impl Default for FinancialAggregator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
