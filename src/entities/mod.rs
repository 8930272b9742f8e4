// Entity Models - users, enrollments, catalog, lessons, payments

pub mod enrollment;
pub mod lesson;
pub mod payment;
pub mod tuition;
pub mod user;

pub use enrollment::{Enrollment, GroupKey};
pub use lesson::{LessonCharge, LessonKind, LessonLog};
pub use payment::PaymentRecord;
pub use tuition::{CatalogEntry, ChargeRecord, MeetingLink, TuitionRecord};
pub use user::{
    ParentProfile, Role, Specialty, StudentProfile, TeacherProfile, User, UserDirectory,
};
