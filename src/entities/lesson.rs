// 📝 Lesson Log - a lesson actually given
//
// Carries its own charge snapshot, so later catalog rebuilds never rewrite
// what a past lesson cost. `tuition_id` may go stale (nulled) after a rebuild.

use crate::correction::{Chained, Origin, RecordStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LessonKind {
    /// Logged from a catalog tuition
    Scheduled,

    /// Logged ad hoc with explicit costs
    Custom,
}

impl LessonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonKind::Scheduled => "SCHEDULED",
            LessonKind::Custom => "CUSTOM",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SCHEDULED" => Some(LessonKind::Scheduled),
            "CUSTOM" => Some(LessonKind::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonCharge {
    pub student_id: Uuid,
    pub parent_id: Uuid,
    pub cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonLog {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub subject: String,
    pub educational_system: String,
    pub lesson_index: Option<u32>,
    pub tuition_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub kind: LessonKind,
    pub status: RecordStatus,
    pub origin: Origin,
    pub charges: Vec<LessonCharge>,
}

impl LessonLog {
    /// What `payer` owes for this lesson, optionally for one student only
    pub fn cost_for(&self, payer: Uuid, student: Option<Uuid>) -> Decimal {
        self.charges
            .iter()
            .filter(|c| c.parent_id == payer)
            .filter(|c| student.map_or(true, |s| c.student_id == s))
            .map(|c| c.cost)
            .sum()
    }

    /// Distinct payers charged for this lesson
    pub fn payers(&self) -> Vec<Uuid> {
        let mut payers: Vec<Uuid> = self.charges.iter().map(|c| c.parent_id).collect();
        payers.sort();
        payers.dedup();
        payers
    }
}

impl Chained for LessonLog {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn origin(&self) -> Origin {
        self.origin
    }

    fn status(&self) -> RecordStatus {
        self.status
    }
}
