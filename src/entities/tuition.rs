// 🗓️ Tuition Catalog - recurring lesson slots + their attachments
//
// A TuitionRecord's id is derived (see identity.rs). Records never survive a
// rebuild; only their id recurs. Charges and meeting links hang off the id.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuitionRecord {
    pub id: Uuid,
    pub subject: String,
    pub educational_system: String,
    pub teacher_id: Uuid,

    /// Which of the group's weekly lessons this is (1-based)
    pub lesson_index: u32,

    pub min_duration_mins: u32,
    pub max_duration_mins: u32,
}

/// Per-student cost template for a tuition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRecord {
    pub tuition_id: Uuid,
    pub student_id: Uuid,

    /// Payer of this charge (the student's parent)
    pub parent_id: Uuid,

    pub cost: Decimal,

    /// Set by a manual override; only overridden costs survive a rebuild
    pub overridden: bool,
}

/// Online meeting details attached 1:1 to a tuition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingLink {
    pub tuition_id: Uuid,
    pub url: String,
    pub meeting_id: Option<String>,
    pub passcode: Option<String>,
}

impl MeetingLink {
    pub fn new(tuition_id: Uuid, url: &str) -> Self {
        MeetingLink {
            tuition_id,
            url: url.to_string(),
            meeting_id: None,
            passcode: None,
        }
    }

    /// Same link pointed at another tuition
    pub fn reattach(&self, tuition_id: Uuid) -> Self {
        MeetingLink {
            tuition_id,
            ..self.clone()
        }
    }
}

/// A tuition with its charges and optional link, as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub tuition: TuitionRecord,
    pub charges: Vec<ChargeRecord>,
    pub meeting_link: Option<MeetingLink>,
}

impl CatalogEntry {
    pub fn student_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.charges.iter().map(|c| c.student_id).collect();
        ids.sort();
        ids
    }

    pub fn total_cost(&self) -> Decimal {
        self.charges.iter().map(|c| c.cost).sum()
    }
}
