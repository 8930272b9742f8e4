// 👤 User Directory - one identity, one role payload
//
// Every user is a single record; the role discriminator selects the
// role-specific payload. Resolved once at load time, so a student's parent,
// default cost and duration limits are always at hand without a second query.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// ROLE PAYLOADS
// ============================================================================

/// A (subject, educational system) pair a teacher is qualified for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Specialty {
    pub subject: String,
    pub educational_system: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeacherProfile {
    pub specialties: Vec<Specialty>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentProfile {
    /// ISO 4217 code the parent is billed in
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    /// The payer for this student's lessons
    pub parent_id: Uuid,

    /// Cost per lesson used when no override exists
    pub default_cost: Decimal,

    pub min_duration_mins: u32,
    pub max_duration_mins: u32,
    pub grade: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Teacher(TeacherProfile),
    Parent(ParentProfile),
    Student(StudentProfile),
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher(_) => "teacher",
            Role::Parent(_) => "parent",
            Role::Student(_) => "student",
        }
    }
}

// ============================================================================
// USER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub timezone: String,
    pub role: Role,
}

impl User {
    pub fn new(email: &str, role: Role) -> Self {
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            first_name: None,
            last_name: None,
            timezone: "UTC".to_string(),
            role,
        }
    }

    pub fn with_name(mut self, first: &str, last: &str) -> Self {
        self.first_name = Some(first.to_string());
        self.last_name = Some(last.to_string());
        self
    }

    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        )
        .trim()
        .to_string()
    }

    pub fn as_student(&self) -> Option<&StudentProfile> {
        match &self.role {
            Role::Student(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn as_teacher(&self) -> Option<&TeacherProfile> {
        match &self.role {
            Role::Teacher(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn as_parent(&self) -> Option<&ParentProfile> {
        match &self.role {
            Role::Parent(profile) => Some(profile),
            _ => None,
        }
    }
}

// ============================================================================
// DIRECTORY
// ============================================================================

/// In-memory view of all users, keyed by id
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<Uuid, User>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn get(&self, id: Uuid) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn student(&self, id: Uuid) -> Option<&StudentProfile> {
        self.get(id).and_then(User::as_student)
    }

    pub fn teacher(&self, id: Uuid) -> Option<&TeacherProfile> {
        self.get(id).and_then(User::as_teacher)
    }

    pub fn has_specialty(&self, teacher_id: Uuid, subject: &str, educational_system: &str) -> bool {
        self.teacher(teacher_id).map_or(false, |t| {
            t.specialties
                .iter()
                .any(|s| s.subject == subject && s.educational_system == educational_system)
        })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl FromIterator<User> for UserDirectory {
    fn from_iter<I: IntoIterator<Item = User>>(iter: I) -> Self {
        let mut directory = UserDirectory::new();
        for user in iter {
            directory.insert(user);
        }
        directory
    }
}
