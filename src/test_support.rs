// 🧪 Shared test fixture: one teacher, two parents, two students

use crate::correction::{Origin, RecordStatus};
use crate::db;
use crate::entities::{
    LessonCharge, LessonKind, LessonLog, ParentProfile, Role, Specialty,
    StudentProfile, TeacherProfile, User,
};
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

pub struct Fixture {
    pub conn: Connection,
    pub teacher: Uuid,

    /// Pays for alice
    pub parent: Uuid,

    /// Pays for bob
    pub parent2: Uuid,

    pub alice: Uuid,
    pub bob: Uuid,
}

impl Fixture {
    /// Teacher (Math + Physics, IGCSE), alice at 100, bob at 80
    pub fn new() -> Self {
        let conn = db::open_in_memory().unwrap();

        let teacher = User::new(
            "teacher@example.com",
            Role::Teacher(TeacherProfile {
                specialties: vec![specialty("Math"), specialty("Physics")],
            }),
        )
        .with_name("Tariq", "Hassan");
        let parent = parent_user("parent@example.com");
        let parent2 = parent_user("parent2@example.com");
        let alice = student_user("alice@example.com", parent.id, dec!(100));
        let bob = student_user("bob@example.com", parent2.id, dec!(80));

        for user in [&teacher, &parent, &parent2, &alice, &bob] {
            db::insert_user(&conn, user).unwrap();
        }

        Fixture {
            conn,
            teacher: teacher.id,
            parent: parent.id,
            parent2: parent2.id,
            alice: alice.id,
            bob: bob.id,
        }
    }

    pub fn parent_of(&self, student: Uuid) -> Uuid {
        if student == self.bob {
            self.parent2
        } else {
            self.parent
        }
    }

    /// An ACTIVE custom Math lesson, not yet stored
    pub fn custom_lesson(&self, start: DateTime<Utc>, charges: &[(Uuid, Decimal)]) -> LessonLog {
        LessonLog {
            id: Uuid::new_v4(),
            teacher_id: self.teacher,
            subject: "Math".to_string(),
            educational_system: "IGCSE".to_string(),
            lesson_index: None,
            tuition_id: None,
            start_time: start,
            end_time: start + Duration::minutes(60),
            kind: LessonKind::Custom,
            status: RecordStatus::Active,
            origin: Origin::Original,
            charges: charges
                .iter()
                .map(|(student_id, cost)| LessonCharge {
                    student_id: *student_id,
                    parent_id: self.parent_of(*student_id),
                    cost: *cost,
                })
                .collect(),
        }
    }
}

fn specialty(subject: &str) -> Specialty {
    Specialty {
        subject: subject.to_string(),
        educational_system: "IGCSE".to_string(),
    }
}

fn parent_user(email: &str) -> User {
    User::new(
        email,
        Role::Parent(ParentProfile {
            currency: "EGP".to_string(),
        }),
    )
}

fn student_user(email: &str, parent_id: Uuid, default_cost: Decimal) -> User {
    User::new(
        email,
        Role::Student(StudentProfile {
            parent_id,
            default_cost,
            min_duration_mins: 60,
            max_duration_mins: 90,
            grade: Some(10),
        }),
    )
}
