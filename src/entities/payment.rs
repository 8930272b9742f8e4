// 💳 Payment Record - money a parent paid a teacher

use crate::correction::{Chained, Origin, RecordStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,

    /// Payer
    pub parent_id: Uuid,

    /// Billing party
    pub teacher_id: Uuid,

    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub status: RecordStatus,
    pub origin: Origin,
}

impl PaymentRecord {
    pub fn new(parent_id: Uuid, teacher_id: Uuid, amount: Decimal, paid_at: DateTime<Utc>) -> Self {
        PaymentRecord {
            id: Uuid::new_v4(),
            parent_id,
            teacher_id,
            amount,
            paid_at,
            notes: None,
            status: RecordStatus::Active,
            origin: Origin::Original,
        }
    }

    pub fn is_between(&self, payer: Uuid, billing_party: Uuid) -> bool {
        self.parent_id == payer && self.teacher_id == billing_party
    }
}

impl Chained for PaymentRecord {
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
