// Tuition Ledger - Core Library
// Catalog rebuild from enrollments + FIFO payment reconciliation over SQLite

pub mod catalog;        // Catalog Rebuilder - stage, snapshot side data, swap
pub mod config;
pub mod correction;     // Void + correct chains
pub mod db;
pub mod engine;
pub mod entities;
pub mod error;
pub mod grouping;       // Enrollment Grouper - delivery groups
pub mod identity;       // Deterministic tuition ids
pub mod journal;        // Lesson logging + payment posting
pub mod reconciliation; // FIFO reconciler
pub mod summary;        // Financial Aggregator

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use catalog::{CatalogRebuilder, PreservedSideData, RebuildReport, StagedTuition, TeacherCapabilities};
pub use config::{EngineConfig, LessonsPerWeekPolicy};
pub use correction::{Chained, Origin, RecordStatus};
pub use db::{check_catalog_integrity, setup_database, IntegrityIssue};
pub use engine::TuitionEngine;
pub use entities::{
    CatalogEntry, ChargeRecord, Enrollment, GroupKey, LessonCharge, LessonKind, LessonLog,
    MeetingLink, PaymentRecord, Role, TuitionRecord, User, UserDirectory,
};
pub use error::{LedgerError, Result};
pub use grouping::{DeliveryGroup, EnrollmentGrouper};
pub use journal::{CustomLesson, LessonCorrection, PaymentCorrection};
pub use reconciliation::{
    PaidStatus, ReconciliationEngine, ReconciliationReport, ReconciliationScope, RelationshipPass,
};
pub use summary::{
    BillingPartyFilter, BillingPartySummary, ChargeStatus, FinancialAggregator, PayerSummary,
    RelationshipBalance,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
