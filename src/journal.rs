// 📒 Journal - lesson logging and payment posting
//
// Records are append-only. A mistake is fixed by voiding the record and, for a
// correction, writing a successor that points back at it. Every operation runs
// in its own transaction.

use crate::correction::{Chained, Origin, RecordStatus};
use crate::db;
use crate::entities::{LessonCharge, LessonKind, LessonLog, PaymentRecord, UserDirectory};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

// ============================================================================
// INPUTS
// ============================================================================

/// An ad hoc lesson with explicit per-student costs
#[derive(Debug, Clone)]
pub struct CustomLesson {
    pub teacher_id: Uuid,
    pub subject: String,
    pub educational_system: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub costs: Vec<(Uuid, Decimal)>,
}

/// Replacement values for a corrected lesson
#[derive(Debug, Clone)]
pub struct LessonCorrection {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    /// `None` keeps the predecessor's charges
    pub costs: Option<Vec<(Uuid, Decimal)>>,
}

/// Replacement values for a corrected payment
#[derive(Debug, Clone)]
pub struct PaymentCorrection {
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    pub notes: Option<String>,
}

// ============================================================================
// VALIDATION
// ============================================================================

fn check_times(start: &DateTime<Utc>, end: &DateTime<Utc>) -> Result<()> {
    if end <= start {
        return Err(LedgerError::constraint(
            "lesson_time",
            format!("lesson ends ({end}) before it starts ({start})"),
        ));
    }
    Ok(())
}

fn resolve_charges(directory: &UserDirectory, costs: &[(Uuid, Decimal)]) -> Result<Vec<LessonCharge>> {
    if costs.is_empty() {
        return Err(LedgerError::constraint("lesson_charges", "a lesson needs at least one student"));
    }

    costs
        .iter()
        .map(|(student_id, cost)| {
            if cost.is_sign_negative() {
                return Err(LedgerError::constraint(
                    "lesson_cost",
                    format!("negative cost {cost} for student {student_id}"),
                ));
            }
            let profile = directory.student(*student_id).ok_or(LedgerError::NotFound {
                entity: "student",
                id: *student_id,
            })?;
            Ok(LessonCharge {
                student_id: *student_id,
                parent_id: profile.parent_id,
                cost: *cost,
            })
        })
        .collect()
}

/// The record `id` must exist, be ACTIVE and have no successor
fn correctable<'a, T: Chained>(records: &'a [T], id: Uuid, entity: &'static str) -> Result<&'a T> {
    let invalid = |reason: String| LedgerError::InvalidCorrection { entity, id, reason };

    let record = records
        .iter()
        .find(|r| r.record_id() == id)
        .ok_or_else(|| invalid("no such record".to_string()))?;

    if let Some(successor) = records.iter().find(|r| r.origin().predecessor() == Some(id)) {
        return Err(invalid(format!("already corrected by {}", successor.record_id())));
    }
    if record.status() == RecordStatus::Void {
        return Err(invalid("record is void".to_string()));
    }

    Ok(record)
}

// ============================================================================
// LESSONS
// ============================================================================

/// Log a lesson from a catalog tuition, snapshotting its current charges
pub fn log_scheduled_lesson(
    conn: &mut Connection,
    tuition_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> Result<LessonLog> {
    check_times(&start_time, &end_time)?;
    let tx = conn.transaction()?;

    let entry = db::load_catalog_entry(&tx, tuition_id)?;
    let lesson = LessonLog {
        id: Uuid::new_v4(),
        teacher_id: entry.tuition.teacher_id,
        subject: entry.tuition.subject.clone(),
        educational_system: entry.tuition.educational_system.clone(),
        lesson_index: Some(entry.tuition.lesson_index),
        tuition_id: Some(tuition_id),
        start_time,
        end_time,
        kind: LessonKind::Scheduled,
        status: RecordStatus::Active,
        origin: Origin::Original,
        charges: entry
            .charges
            .iter()
            .map(|c| LessonCharge {
                student_id: c.student_id,
                parent_id: c.parent_id,
                cost: c.cost,
            })
            .collect(),
    };
    db::insert_lesson(&tx, &lesson)?;
    tx.commit()?;

    info!(lesson = %lesson.id, tuition = %tuition_id, charges = lesson.charges.len(), "Scheduled lesson logged");
    Ok(lesson)
}

pub fn log_custom_lesson(conn: &mut Connection, input: &CustomLesson) -> Result<LessonLog> {
    check_times(&input.start_time, &input.end_time)?;
    let tx = conn.transaction()?;

    let directory = db::load_users(&tx)?;
    let lesson = LessonLog {
        id: Uuid::new_v4(),
        teacher_id: input.teacher_id,
        subject: input.subject.clone(),
        educational_system: input.educational_system.clone(),
        lesson_index: None,
        tuition_id: None,
        start_time: input.start_time,
        end_time: input.end_time,
        kind: LessonKind::Custom,
        status: RecordStatus::Active,
        origin: Origin::Original,
        charges: resolve_charges(&directory, &input.costs)?,
    };
    db::insert_lesson(&tx, &lesson)?;
    tx.commit()?;

    info!(lesson = %lesson.id, teacher = %lesson.teacher_id, "Custom lesson logged");
    Ok(lesson)
}

pub fn void_lesson(conn: &mut Connection, lesson_id: Uuid) -> Result<()> {
    let tx = conn.transaction()?;
    let lesson = db::get_lesson(&tx, lesson_id)?;
    if lesson.status == RecordStatus::Void {
        return Err(LedgerError::InvalidCorrection {
            entity: "lesson log",
            id: lesson_id,
            reason: "already void".to_string(),
        });
    }
    db::set_lesson_status(&tx, lesson_id, RecordStatus::Void)?;
    tx.commit()?;

    info!(lesson = %lesson_id, "Lesson voided");
    Ok(())
}

/// Void `lesson_id` and write its successor; both or neither
pub fn correct_lesson(conn: &mut Connection, lesson_id: Uuid, correction: &LessonCorrection) -> Result<LessonLog> {
    check_times(&correction.start_time, &correction.end_time)?;
    let tx = conn.transaction()?;

    let lessons = db::load_lessons(&tx)?;
    let previous = correctable(&lessons, lesson_id, "lesson log")?;

    let charges = match &correction.costs {
        Some(costs) => resolve_charges(&db::load_users(&tx)?, costs)?,
        None => previous.charges.clone(),
    };
    let successor = LessonLog {
        id: Uuid::new_v4(),
        start_time: correction.start_time,
        end_time: correction.end_time,
        status: RecordStatus::Active,
        origin: Origin::Correction(lesson_id),
        charges,
        ..previous.clone()
    };

    db::set_lesson_status(&tx, lesson_id, RecordStatus::Void)?;
    db::insert_lesson(&tx, &successor)?;
    tx.commit()?;

    info!(lesson = %successor.id, corrects = %lesson_id, "Lesson corrected");
    Ok(successor)
}

// ============================================================================
// PAYMENTS
// ============================================================================

pub fn post_payment(
    conn: &Connection,
    parent_id: Uuid,
    teacher_id: Uuid,
    amount: Decimal,
    paid_at: DateTime<Utc>,
    notes: Option<String>,
) -> Result<PaymentRecord> {
    check_amount(amount)?;
    let mut payment = PaymentRecord::new(parent_id, teacher_id, amount, paid_at);
    payment.notes = notes;
    db::insert_payment(conn, &payment)?;

    info!(payment = %payment.id, parent = %parent_id, teacher = %teacher_id, amount = %amount, "Payment posted");
    Ok(payment)
}

fn check_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::constraint(
            "payment_amount",
            format!("payment amount must be positive, got {amount}"),
        ));
    }
    Ok(())
}

pub fn void_payment(conn: &mut Connection, payment_id: Uuid) -> Result<()> {
    let tx = conn.transaction()?;
    let payment = db::get_payment(&tx, payment_id)?;
    if payment.status == RecordStatus::Void {
        return Err(LedgerError::InvalidCorrection {
            entity: "payment log",
            id: payment_id,
            reason: "already void".to_string(),
        });
    }
    db::set_payment_status(&tx, payment_id, RecordStatus::Void)?;
    tx.commit()?;

    info!(payment = %payment_id, "Payment voided");
    Ok(())
}

pub fn correct_payment(
    conn: &mut Connection,
    payment_id: Uuid,
    correction: &PaymentCorrection,
) -> Result<PaymentRecord> {
    check_amount(correction.amount)?;
    let tx = conn.transaction()?;

    let payments = db::load_payments(&tx)?;
    let previous = correctable(&payments, payment_id, "payment log")?;
    let successor = PaymentRecord {
        id: Uuid::new_v4(),
        amount: correction.amount,
        paid_at: correction.paid_at,
        notes: correction.notes.clone(),
        status: RecordStatus::Active,
        origin: Origin::Correction(payment_id),
        ..previous.clone()
    };

    db::set_payment_status(&tx, payment_id, RecordStatus::Void)?;
    db::insert_payment(&tx, &successor)?;
    tx.commit()?;

    info!(payment = %successor.id, corrects = %payment_id, "Payment corrected");
    Ok(successor)
}

// ============================================================================
// TESTS
// ============================================================================
