// 📚 Enrollment - one student taking one subject with one teacher

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Enrollments sharing this key may be taught together
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub subject: String,
    pub educational_system: String,
    pub teacher_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub student_id: Uuid,
    pub subject: String,
    pub educational_system: String,
    pub teacher_id: Uuid,
    pub lessons_per_week: u32,
    pub min_duration_mins: u32,
    pub max_duration_mins: u32,

    /// Students this enrollment declares it shares lessons with.
    /// The relation is undirected: one side declaring it is enough.
    #[serde(default)]
    pub co_attendee_ids: Vec<Uuid>,
}

impl Enrollment {
    pub fn new(student_id: Uuid, subject: &str, educational_system: &str, teacher_id: Uuid) -> Self {
        Enrollment {
            student_id,
            subject: subject.to_string(),
            educational_system: educational_system.to_string(),
            teacher_id,
            lessons_per_week: 1,
            min_duration_mins: 60,
            max_duration_mins: 90,
            co_attendee_ids: Vec::new(),
        }
    }

    pub fn lessons_per_week(mut self, lessons: u32) -> Self {
        self.lessons_per_week = lessons;
        self
    }

    pub fn durations(mut self, min: u32, max: u32) -> Self {
        self.min_duration_mins = min;
        self.max_duration_mins = max;
        self
    }

    pub fn shared_with(mut self, students: &[Uuid]) -> Self {
        self.co_attendee_ids.extend_from_slice(students);
        self
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            subject: self.subject.clone(),
            educational_system: self.educational_system.clone(),
            teacher_id: self.teacher_id,
        }
    }
}
