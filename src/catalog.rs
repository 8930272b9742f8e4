// 🏗️ Catalog Rebuilder - wipe and regenerate tuitions from enrollments
//
// Two phases inside one IMMEDIATE transaction:
//   1. stage    snapshot side data (overrides, links), group enrollments,
//               derive ids, check teacher capabilities. Nothing written yet.
//   2. swap     delete every tuition, insert the staged set, restore side
//               data and lesson references whose tuition id recurred, commit.
//
// Any error drops the transaction, which rolls it back. The previous catalog
// is never partially visible.

use crate::db;
use crate::entities::{ChargeRecord, MeetingLink, TuitionRecord, UserDirectory};
use crate::error::{LedgerError, Result};
use crate::grouping::{slot_candidates, DeliveryGroup, EnrollmentGrouper};
use crate::identity;
use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ============================================================================
// TEACHER CAPABILITIES
// ============================================================================

/// Whether a teacher may deliver a (subject, educational system) pair
pub trait TeacherCapabilities {
    fn has_specialty(&self, teacher_id: Uuid, subject: &str, educational_system: &str) -> Result<bool>;
}

impl TeacherCapabilities for UserDirectory {
    fn has_specialty(&self, teacher_id: Uuid, subject: &str, educational_system: &str) -> Result<bool> {
        Ok(UserDirectory::has_specialty(self, teacher_id, subject, educational_system))
    }
}

impl TeacherCapabilities for Connection {
    fn has_specialty(&self, teacher_id: Uuid, subject: &str, educational_system: &str) -> Result<bool> {
        db::has_specialty(self, teacher_id, subject, educational_system)
    }
}

// ============================================================================
// STAGING
// ============================================================================

/// A tuition ready to insert, with default-cost charges
#[derive(Debug, Clone, PartialEq)]
pub struct StagedTuition {
    pub tuition: TuitionRecord,
    pub charges: Vec<ChargeRecord>,
}

/// Turn delivery groups into tuitions with derived ids.
///
/// Fails with a constraint violation if a teacher lacks the specialty or a
/// member has no student profile.
pub fn stage_catalog(
    groups: &[DeliveryGroup],
    directory: &UserDirectory,
    capabilities: &dyn TeacherCapabilities,
) -> Result<Vec<StagedTuition>> {
    let mut staged = Vec::new();

    for candidate in slot_candidates(groups) {
        let key = &candidate.group.key;
        if !capabilities.has_specialty(key.teacher_id, &key.subject, &key.educational_system)? {
            return Err(LedgerError::constraint(
                "teacher_specialty",
                format!(
                    "teacher {} does not teach {}/{}",
                    key.teacher_id, key.subject, key.educational_system
                ),
            ));
        }

        let id = identity::tuition_id(
            &key.subject,
            &key.educational_system,
            candidate.lesson_index,
            key.teacher_id,
            &candidate.group.student_ids,
        );

        let mut charges = Vec::with_capacity(candidate.group.student_ids.len());
        for student_id in &candidate.group.student_ids {
            let profile = directory.student(*student_id).ok_or_else(|| {
                LedgerError::constraint(
                    "student_profile",
                    format!("enrolled student {student_id} has no student profile"),
                )
            })?;
            charges.push(ChargeRecord {
                tuition_id: id,
                student_id: *student_id,
                parent_id: profile.parent_id,
                cost: profile.default_cost,
                overridden: false,
            });
        }

        staged.push(StagedTuition {
            tuition: TuitionRecord {
                id,
                subject: key.subject.clone(),
                educational_system: key.educational_system.clone(),
                teacher_id: key.teacher_id,
                lesson_index: candidate.lesson_index,
                min_duration_mins: candidate.group.min_duration_mins,
                max_duration_mins: candidate.group.max_duration_mins,
            },
            charges,
        });
    }

    Ok(staged)
}

/// Side data that enrollments cannot regenerate, held in memory across the swap
#[derive(Debug, Clone, Default)]
pub struct PreservedSideData {
    /// Overridden costs keyed by (tuition id, student id)
    pub overrides: HashMap<(Uuid, Uuid), Decimal>,

    /// Meeting links keyed by tuition id
    pub links: HashMap<Uuid, MeetingLink>,
}

impl PreservedSideData {
    pub fn snapshot(conn: &Connection) -> Result<Self> {
        Ok(PreservedSideData {
            overrides: db::load_overridden_charges(conn)?,
            links: db::load_meeting_links(conn)?,
        })
    }

    /// The charge to insert: the preserved override if one exists for this exact slot
    pub fn charge_for(&self, staged: &ChargeRecord) -> ChargeRecord {
        match self.overrides.get(&(staged.tuition_id, staged.student_id)) {
            Some(cost) => ChargeRecord {
                cost: *cost,
                overridden: true,
                ..staged.clone()
            },
            None => staged.clone(),
        }
    }
}

// ============================================================================
// REBUILDER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub tuitions_deleted: usize,
    pub tuitions: usize,
    pub charges: usize,
    pub overrides_restored: usize,
    pub overrides_dropped: usize,
    pub links_restored: usize,
    pub links_dropped: usize,

    /// Lesson logs pointed back at their recurring tuition
    pub lessons_relinked: usize,

    /// Lesson logs whose tuition reference was nulled
    pub orphaned_lessons: usize,
}

pub struct CatalogRebuilder {
    grouper: EnrollmentGrouper,
}

impl CatalogRebuilder {
    pub fn new() -> Self {
        CatalogRebuilder {
            grouper: EnrollmentGrouper::new(),
        }
    }

    pub fn with_grouper(grouper: EnrollmentGrouper) -> Self {
        CatalogRebuilder { grouper }
    }

    /// Rebuild using the specialties recorded in the user directory
    pub fn rebuild(&self, conn: &mut Connection) -> Result<RebuildReport> {
        self.run(conn, None)
    }

    /// Rebuild with an external capability check
    pub fn rebuild_with(
        &self,
        conn: &mut Connection,
        capabilities: &dyn TeacherCapabilities,
    ) -> Result<RebuildReport> {
        self.run(conn, Some(capabilities))
    }

    fn run(
        &self,
        conn: &mut Connection,
        capabilities: Option<&dyn TeacherCapabilities>,
    ) -> Result<RebuildReport> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Phase 1: snapshot + stage
        let preserved = PreservedSideData::snapshot(&tx)?;
        let referenced = db::lessons_by_tuition(&tx)?;

        let directory = db::load_users(&tx)?;
        let enrollments = db::load_enrollments(&tx)?;
        let groups = self.grouper.group(&enrollments)?;
        let staged = match capabilities {
            Some(capabilities) => stage_catalog(&groups, &directory, capabilities)?,
            None => stage_catalog(&groups, &directory, &directory)?,
        };
        debug!(
            groups = groups.len(),
            staged = staged.len(),
            overrides = preserved.overrides.len(),
            links = preserved.links.len(),
            "Staged catalog"
        );

        // Phase 2: swap
        let mut report = RebuildReport {
            tuitions_deleted: db::delete_catalog(&tx)?,
            ..RebuildReport::default()
        };

        let created_at = Utc::now();
        let mut new_ids = HashSet::with_capacity(staged.len());
        for entry in &staged {
            db::insert_tuition(&tx, &entry.tuition, &created_at)?;
            new_ids.insert(entry.tuition.id);
            report.tuitions += 1;

            for staged_charge in &entry.charges {
                let charge = preserved.charge_for(staged_charge);
                if charge.overridden {
                    report.overrides_restored += 1;
                }
                db::insert_charge(&tx, &charge)?;
                report.charges += 1;
            }

            if let Some(link) = preserved.links.get(&entry.tuition.id) {
                db::upsert_meeting_link(&tx, &link.reattach(entry.tuition.id))?;
                report.links_restored += 1;
            }

            // the delete cascaded SET NULL onto every lesson reference
            if let Some(lessons) = referenced.get(&entry.tuition.id) {
                report.lessons_relinked += db::relink_lessons(&tx, entry.tuition.id, lessons)?;
            }
        }

        report.overrides_dropped = preserved.overrides.len() - report.overrides_restored;
        report.links_dropped = preserved.links.len() - report.links_restored;
        report.orphaned_lessons = referenced
            .iter()
            .filter(|(tuition_id, _)| !new_ids.contains(tuition_id))
            .map(|(_, lessons)| lessons.len())
            .sum();

        tx.commit()?;

        if report.links_dropped > 0 || report.overrides_dropped > 0 {
            warn!(
                links_dropped = report.links_dropped,
                overrides_dropped = report.overrides_dropped,
                "Side data dropped for tuitions that did not recur"
            );
        }
        info!(
            tuitions = report.tuitions,
            charges = report.charges,
            overrides_restored = report.overrides_restored,
            links_restored = report.links_restored,
            lessons_relinked = report.lessons_relinked,
            orphaned_lessons = report.orphaned_lessons,
            "Catalog rebuilt"
        );

        Ok(report)
    }
}

impl Default for CatalogRebuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SIDE DATA OPERATIONS
// ============================================================================

/// Set a custom cost that survives rebuilds while the tuition id recurs
pub fn override_charge(conn: &Connection, tuition_id: Uuid, student_id: Uuid, cost: Decimal) -> Result<()> {
    db::override_charge(conn, tuition_id, student_id, cost)?;
    info!(tuition = %tuition_id, student = %student_id, cost = %cost, "Charge overridden");
    Ok(())
}

pub fn attach_meeting_link(conn: &Connection, link: &MeetingLink) -> Result<()> {
    if !db::tuition_exists(conn, link.tuition_id)? {
        return Err(LedgerError::NotFound {
            entity: "tuition",
            id: link.tuition_id,
        });
    }
    db::upsert_meeting_link(conn, link)?;
    info!(tuition = %link.tuition_id, "Meeting link attached");
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
