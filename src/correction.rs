// 🔗 Correction Chains - void + recreate, never edit in place
//
// A lesson or payment is corrected by voiding it and writing a successor that
// points back at it:
//
//   L1 (VOID) <- L2 (VOID) <- L3 (ACTIVE)
//
// Each record corrects at most one predecessor and is corrected by at most one
// successor. Only the live head of a chain counts towards money.

use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

// ============================================================================
// STATUS + ORIGIN
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
    Active,
    Void,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "ACTIVE",
            RecordStatus::Void => "VOID",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(RecordStatus::Active),
            "VOID" => Some(RecordStatus::Void),
            _ => None,
        }
    }
}

/// Where a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// First record of its chain
    Original,

    /// Replaces the (now void) predecessor
    Correction(Uuid),
}

impl Origin {
    pub fn from_predecessor(predecessor: Option<Uuid>) -> Self {
        match predecessor {
            Some(id) => Origin::Correction(id),
            None => Origin::Original,
        }
    }

    pub fn predecessor(&self) -> Option<Uuid> {
        match self {
            Origin::Original => None,
            Origin::Correction(id) => Some(*id),
        }
    }
}

// ============================================================================
// CHAINED RECORDS
// ============================================================================

/// Records that take part in a correction chain
pub trait Chained {
    fn record_id(&self) -> Uuid;
    fn origin(&self) -> Origin;
    fn status(&self) -> RecordStatus;
}

/// Records that count: ACTIVE and not superseded by a successor
pub fn live<T: Chained>(records: &[T]) -> Vec<&T> {
    let superseded: HashSet<Uuid> = records
        .iter()
        .filter_map(|r| r.origin().predecessor())
        .collect();

    records
        .iter()
        .filter(|r| r.status() == RecordStatus::Active && !superseded.contains(&r.record_id()))
        .collect()
}

/// Walk back from `id` to the chain's original record (inclusive, newest first)
pub fn lineage<T: Chained>(records: &[T], id: Uuid) -> Result<Vec<Uuid>> {
    let by_id: HashMap<Uuid, &T> = records.iter().map(|r| (r.record_id(), r)).collect();

    let mut seen = HashSet::new();
    let mut lineage = Vec::new();
    let mut cursor = Some(id);

    while let Some(current) = cursor {
        if !seen.insert(current) {
            return Err(LedgerError::InvalidCorrection {
                entity: "record",
                id: current,
                reason: "correction chain revisits a record".to_string(),
            });
        }
        lineage.push(current);

        cursor = by_id
            .get(&current)
            .and_then(|r| r.origin().predecessor())
            .filter(|pred| by_id.contains_key(pred));
    }

    Ok(lineage)
}

/// Check the whole set: no cycles and no record corrected twice
pub fn verify_chains<T: Chained>(records: &[T]) -> Result<()> {
    let mut corrected_by: HashMap<Uuid, Uuid> = HashMap::new();

    for record in records {
        if let Some(pred) = record.origin().predecessor() {
            if pred == record.record_id() {
                return Err(LedgerError::InvalidCorrection {
                    entity: "record",
                    id: pred,
                    reason: "record corrects itself".to_string(),
                });
            }
            if let Some(other) = corrected_by.insert(pred, record.record_id()) {
                return Err(LedgerError::InvalidCorrection {
                    entity: "record",
                    id: pred,
                    reason: format!(
                        "corrected by both {} and {}",
                        other,
                        record.record_id()
                    ),
                });
            }
        }
    }

    for record in records {
        lineage(records, record.record_id())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Rec {
        id: Uuid,
        origin: Origin,
        status: RecordStatus,
    }

    impl Chained for Rec {
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

    fn rec(id: u128, pred: Option<u128>, status: RecordStatus) -> Rec {
        Rec {
            id: Uuid::from_u128(id),
            origin: Origin::from_predecessor(pred.map(Uuid::from_u128)),
            status,
        }
    }

    #[test]
    fn test_live_keeps_only_chain_heads() {
        let records = vec![
            rec(1, None, RecordStatus::Void),
            rec(2, Some(1), RecordStatus::Void),
            rec(3, Some(2), RecordStatus::Active),
            rec(4, None, RecordStatus::Active),
            rec(5, None, RecordStatus::Void),
        ];

        let ids: Vec<Uuid> = live(&records).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![Uuid::from_u128(3), Uuid::from_u128(4)]);
    }

    #[test]
    fn test_superseded_record_is_excluded_even_if_active() {
        // Status drift must not double count a corrected record
        let records = vec![
            rec(1, None, RecordStatus::Active),
            rec(2, Some(1), RecordStatus::Active),
        ];

        let ids: Vec<Uuid> = live(&records).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![Uuid::from_u128(2)]);
    }

    #[test]
    fn test_lineage_walks_to_original() {
        let records = vec![
            rec(1, None, RecordStatus::Void),
            rec(2, Some(1), RecordStatus::Void),
            rec(3, Some(2), RecordStatus::Active),
        ];

        let chain = lineage(&records, Uuid::from_u128(3)).unwrap();
        assert_eq!(
            chain,
            vec![Uuid::from_u128(3), Uuid::from_u128(2), Uuid::from_u128(1)]
        );
    }

    #[test]
    fn test_verify_rejects_cycles() {
        let records = vec![
            rec(1, Some(2), RecordStatus::Void),
            rec(2, Some(1), RecordStatus::Active),
        ];

        assert!(verify_chains(&records).is_err());
    }

    #[test]
    fn test_verify_rejects_double_correction() {
        let records = vec![
            rec(1, None, RecordStatus::Void),
            rec(2, Some(1), RecordStatus::Active),
            rec(3, Some(1), RecordStatus::Active),
        ];

        let err = verify_chains(&records).unwrap_err();
        assert!(err.to_string().contains("corrected by both"));
    }

    #[test]
    fn test_verify_accepts_well_formed_chains() {
        let records = vec![
            rec(1, None, RecordStatus::Void),
            rec(2, Some(1), RecordStatus::Active),
            rec(3, None, RecordStatus::Active),
        ];

        assert!(verify_chains(&records).is_ok());
    }
}
