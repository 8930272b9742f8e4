// 👥 Enrollment Grouper - who sits in the same recurring lesson
//
// Enrollments are indexed by (subject, educational system, teacher). Within a
// key, co-attendee declarations form an UNDIRECTED graph; each connected
// component is one delivery group. A student lands in exactly one group per key.
//
//   A declares B, C declares B   →   {A, B, C}
//   D declares nobody            →   {D}

use crate::config::LessonsPerWeekPolicy;
use crate::entities::{Enrollment, GroupKey};
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::{debug, warn};
use uuid::Uuid;

// ============================================================================
// DELIVERY GROUP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryGroup {
    pub key: GroupKey,

    /// Members, sorted ascending
    pub student_ids: Vec<Uuid>,

    pub lessons_per_week: u32,

    /// Largest personal minimum among members
    pub min_duration_mins: u32,

    /// Largest personal maximum among members
    pub max_duration_mins: u32,
}

impl DeliveryGroup {
    /// Slot indices `1..=lessons_per_week`
    pub fn slot_indices(&self) -> impl Iterator<Item = u32> {
        1..=self.lessons_per_week
    }
}

/// One tuition candidate: a group at one weekly slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCandidate<'a> {
    pub group: &'a DeliveryGroup,
    pub lesson_index: u32,
}

/// Expand groups into ordered (group, slot) candidates
pub fn slot_candidates(groups: &[DeliveryGroup]) -> Vec<SlotCandidate<'_>> {
    groups
        .iter()
        .flat_map(|group| {
            group
                .slot_indices()
                .map(move |lesson_index| SlotCandidate { group, lesson_index })
        })
        .collect()
}

// ============================================================================
// GROUPER
// ============================================================================

pub struct EnrollmentGrouper {
    /// How to resolve co-attendees that disagree on lessons per week
    pub lessons_per_week_policy: LessonsPerWeekPolicy,
}

impl EnrollmentGrouper {
    pub fn new() -> Self {
        EnrollmentGrouper {
            lessons_per_week_policy: LessonsPerWeekPolicy::default(),
        }
    }

    pub fn with_policy(policy: LessonsPerWeekPolicy) -> Self {
        EnrollmentGrouper {
            lessons_per_week_policy: policy,
        }
    }

    /// Cluster an enrollment snapshot into delivery groups.
    ///
    /// Output order is deterministic: by key, then by smallest member id.
    pub fn group(&self, enrollments: &[Enrollment]) -> Result<Vec<DeliveryGroup>> {
        let by_key = self.index_by_key(enrollments)?;

        let mut groups = Vec::new();
        for (key, members) in &by_key {
            for component in Self::components(key, members) {
                groups.push(self.build_group(key, members, component)?);
            }
        }

        debug!(
            enrollments = enrollments.len(),
            groups = groups.len(),
            "Grouped enrollments"
        );

        Ok(groups)
    }

    /// Index by group key, rejecting a student enrolled twice under one key
    fn index_by_key<'a>(
        &self,
        enrollments: &'a [Enrollment],
    ) -> Result<BTreeMap<GroupKey, BTreeMap<Uuid, &'a Enrollment>>> {
        let mut by_key: BTreeMap<GroupKey, BTreeMap<Uuid, &Enrollment>> = BTreeMap::new();

        for enrollment in enrollments {
            let members = by_key.entry(enrollment.group_key()).or_default();
            if members.insert(enrollment.student_id, enrollment).is_some() {
                return Err(LedgerError::constraint(
                    "duplicate_enrollment",
                    format!(
                        "student {} enrolled twice in {}/{} with teacher {}",
                        enrollment.student_id,
                        enrollment.subject,
                        enrollment.educational_system,
                        enrollment.teacher_id
                    ),
                ));
            }
        }

        Ok(by_key)
    }

    /// Connected components of the co-attendance graph under one key
    fn components(key: &GroupKey, members: &BTreeMap<Uuid, &Enrollment>) -> Vec<Vec<Uuid>> {
        let mut adjacency: HashMap<Uuid, BTreeSet<Uuid>> = HashMap::new();

        for (student, enrollment) in members {
            for other in &enrollment.co_attendee_ids {
                if other == student {
                    continue;
                }
                if !members.contains_key(other) {
                    warn!(
                        student = %student,
                        co_attendee = %other,
                        subject = %key.subject,
                        educational_system = %key.educational_system,
                        teacher = %key.teacher_id,
                        "Co-attendee has no matching enrollment, ignoring link"
                    );
                    continue;
                }
                // undirected: record both directions
                adjacency.entry(*student).or_default().insert(*other);
                adjacency.entry(*other).or_default().insert(*student);
            }
        }

        let mut visited: BTreeSet<Uuid> = BTreeSet::new();
        let mut components = Vec::new();

        for student in members.keys() {
            if visited.contains(student) {
                continue;
            }

            let mut component = Vec::new();
            let mut queue = VecDeque::from([*student]);
            visited.insert(*student);

            while let Some(current) = queue.pop_front() {
                component.push(current);
                if let Some(neighbours) = adjacency.get(&current) {
                    for next in neighbours {
                        if visited.insert(*next) {
                            queue.push_back(*next);
                        }
                    }
                }
            }

            component.sort();
            components.push(component);
        }

        components
    }

    fn build_group(
        &self,
        key: &GroupKey,
        members: &BTreeMap<Uuid, &Enrollment>,
        student_ids: Vec<Uuid>,
    ) -> Result<DeliveryGroup> {
        let enrollments: Vec<&Enrollment> = student_ids.iter().map(|id| members[id]).collect();

        let lessons_per_week = self.resolve_lessons_per_week(key, &enrollments)?;
        let min_duration_mins = enrollments
            .iter()
            .map(|e| e.min_duration_mins)
            .max()
            .unwrap_or_default();
        let max_duration_mins = enrollments
            .iter()
            .map(|e| e.max_duration_mins)
            .max()
            .unwrap_or_default();

        Ok(DeliveryGroup {
            key: key.clone(),
            student_ids,
            lessons_per_week,
            min_duration_mins,
            max_duration_mins,
        })
    }

    fn resolve_lessons_per_week(&self, key: &GroupKey, enrollments: &[&Enrollment]) -> Result<u32> {
        let values: BTreeSet<u32> = enrollments.iter().map(|e| e.lessons_per_week).collect();

        if values.len() <= 1 {
            return Ok(values.into_iter().next().unwrap_or_default());
        }

        match self.lessons_per_week_policy {
            LessonsPerWeekPolicy::Max => {
                let resolved = values.iter().copied().max().unwrap_or_default();
                warn!(
                    subject = %key.subject,
                    educational_system = %key.educational_system,
                    teacher = %key.teacher_id,
                    values = ?values,
                    resolved,
                    "Co-attendees disagree on lessons per week, using the maximum"
                );
                Ok(resolved)
            }
            LessonsPerWeekPolicy::Reject => Err(LedgerError::InconsistentLessonsPerWeek {
                subject: key.subject.clone(),
                educational_system: key.educational_system.clone(),
                teacher_id: key.teacher_id,
                values: values.into_iter().collect(),
            }),
        }
    }
}

impl Default for EnrollmentGrouper {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    const TEACHER: u128 = 1000;

    fn math(student: u128) -> Enrollment {
        Enrollment::new(id(student), "Math", "IGCSE", id(TEACHER))
    }

    #[test]
    fn test_solo_students_form_singleton_groups() {
        let grouper = EnrollmentGrouper::new();
        let groups = grouper.group(&[math(1), math(2)]).unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].student_ids, vec![id(1)]);
        assert_eq!(groups[1].student_ids, vec![id(2)]);
    }

    #[test]
    fn test_grouping_is_symmetric() {
        let grouper = EnrollmentGrouper::new();

        // A declares B
        let a_declares = grouper
            .group(&[math(1).shared_with(&[id(2)]), math(2)])
            .unwrap();
        // B declares A
        let b_declares = grouper
            .group(&[math(1), math(2).shared_with(&[id(1)])])
            .unwrap();

        assert_eq!(a_declares.len(), 1);
        assert_eq!(a_declares[0].student_ids, vec![id(1), id(2)]);
        assert_eq!(a_declares, b_declares);
    }

    #[test]
    fn test_links_are_transitive() {
        let grouper = EnrollmentGrouper::new();
        let groups = grouper
            .group(&[
                math(1).shared_with(&[id(2)]),
                math(3).shared_with(&[id(2)]),
                math(2),
                math(4),
            ])
            .unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].student_ids, vec![id(1), id(2), id(3)]);
        assert_eq!(groups[1].student_ids, vec![id(4)]);
    }

    #[test]
    fn test_keys_are_kept_apart() {
        let grouper = EnrollmentGrouper::new();
        let physics = Enrollment::new(id(2), "Physics", "IGCSE", id(TEACHER));
        let other_teacher = Enrollment::new(id(2), "Math", "IGCSE", id(2000));

        let groups = grouper
            .group(&[math(1).shared_with(&[id(2)]), physics, other_teacher])
            .unwrap();

        // the link names student 2, but student 2 has no Math/IGCSE enrollment with this teacher
        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| g.student_ids.len() == 1));
    }

    #[test]
    fn test_effective_durations_take_the_maximum() {
        let grouper = EnrollmentGrouper::new();
        let groups = grouper
            .group(&[
                math(1).durations(45, 120).shared_with(&[id(2)]),
                math(2).durations(60, 90),
            ])
            .unwrap();

        assert_eq!(groups[0].min_duration_mins, 60);
        assert_eq!(groups[0].max_duration_mins, 120);
    }

    #[test]
    fn test_slots_expand_per_lesson() {
        let grouper = EnrollmentGrouper::new();
        let groups = grouper
            .group(&[math(1).lessons_per_week(3), math(2).lessons_per_week(1)])
            .unwrap();

        let slots = slot_candidates(&groups);
        let indices: Vec<(Uuid, u32)> = slots
            .iter()
            .map(|s| (s.group.student_ids[0], s.lesson_index))
            .collect();

        assert_eq!(
            indices,
            vec![(id(1), 1), (id(1), 2), (id(1), 3), (id(2), 1)]
        );
    }

    #[test]
    fn test_disagreeing_lessons_per_week_use_max() {
        let grouper = EnrollmentGrouper::with_policy(LessonsPerWeekPolicy::Max);
        let groups = grouper
            .group(&[
                math(1).lessons_per_week(1).shared_with(&[id(2)]),
                math(2).lessons_per_week(2),
            ])
            .unwrap();

        assert_eq!(groups[0].lessons_per_week, 2);
    }

    #[test]
    fn test_disagreeing_lessons_per_week_rejected() {
        let grouper = EnrollmentGrouper::with_policy(LessonsPerWeekPolicy::Reject);
        let err = grouper
            .group(&[
                math(1).lessons_per_week(1).shared_with(&[id(2)]),
                math(2).lessons_per_week(2),
            ])
            .unwrap_err();

        assert!(matches!(err, LedgerError::InconsistentLessonsPerWeek { .. }));
    }

    #[test]
    fn test_duplicate_enrollment_rejected() {
        let grouper = EnrollmentGrouper::new();
        let err = grouper.group(&[math(1), math(1)]).unwrap_err();

        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_input_order_does_not_change_output() {
        let grouper = EnrollmentGrouper::new();
        let forward = vec![
            math(3).shared_with(&[id(1)]),
            math(1),
            math(2),
            Enrollment::new(id(5), "Physics", "National", id(TEACHER)),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        assert_eq!(grouper.group(&forward).unwrap(), grouper.group(&backward).unwrap());
    }
}
