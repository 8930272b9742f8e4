// 🚂 Tuition Engine - the surface the tutoring service calls
//
//   rebuild()                     full catalog replacement (one IMMEDIATE tx)
//   reconcile(scope)              lesson id → PAID | UNPAID
//   summarize_payer / _billing_party
//
// Reads take one deferred transaction so lessons and payments come from the
// same snapshot.

use crate::catalog::{self, CatalogRebuilder, RebuildReport};
use crate::config::EngineConfig;
use crate::db::{self, IntegrityIssue};
use crate::entities::{LessonLog, MeetingLink, PaymentRecord};
use crate::error::Result;
use crate::grouping::EnrollmentGrouper;
use crate::journal::{self, CustomLesson, LessonCorrection, PaymentCorrection};
use crate::reconciliation::{ReconciliationEngine, ReconciliationReport, ReconciliationScope};
use crate::summary::{BillingPartyFilter, BillingPartySummary, FinancialAggregator, PayerSummary};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

pub struct TuitionEngine {
    conn: Connection,
    config: EngineConfig,
    rebuilder: CatalogRebuilder,
    reconciler: ReconciliationEngine,
    aggregator: FinancialAggregator,
}

impl TuitionEngine {
    pub fn open(config: EngineConfig) -> Result<Self> {
        let conn = db::open(&config)?;
        info!(path = %config.database_path.display(), wal = config.wal_mode, "Opened tuition ledger");
        Ok(Self::with_connection(conn, config))
    }

    /// Wrap a connection that already has the schema
    pub fn with_connection(conn: Connection, config: EngineConfig) -> Self {
        let grouper = EnrollmentGrouper::with_policy(config.lessons_per_week_policy);
        TuitionEngine {
            conn,
            config,
            rebuilder: CatalogRebuilder::with_grouper(grouper),
            reconciler: ReconciliationEngine::new(),
            aggregator: FinancialAggregator::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    pub fn rebuild(&mut self) -> Result<RebuildReport> {
        self.rebuilder.rebuild(&mut self.conn)
    }

    pub fn override_charge(&self, tuition_id: Uuid, student_id: Uuid, cost: Decimal) -> Result<()> {
        catalog::override_charge(&self.conn, tuition_id, student_id, cost)
    }

    pub fn attach_meeting_link(&self, link: &MeetingLink) -> Result<()> {
        catalog::attach_meeting_link(&self.conn, link)
    }

    pub fn check_catalog_integrity(&self) -> Result<Vec<IntegrityIssue>> {
        db::check_catalog_integrity(&self.conn)
    }

    // ========================================================================
    // Journal
    // ========================================================================

    pub fn log_scheduled_lesson(
        &mut self,
        tuition_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<LessonLog> {
        journal::log_scheduled_lesson(&mut self.conn, tuition_id, start_time, end_time)
    }

    pub fn log_custom_lesson(&mut self, lesson: &CustomLesson) -> Result<LessonLog> {
        journal::log_custom_lesson(&mut self.conn, lesson)
    }

    pub fn void_lesson(&mut self, lesson_id: Uuid) -> Result<()> {
        journal::void_lesson(&mut self.conn, lesson_id)
    }

    pub fn correct_lesson(&mut self, lesson_id: Uuid, correction: &LessonCorrection) -> Result<LessonLog> {
        journal::correct_lesson(&mut self.conn, lesson_id, correction)
    }

    pub fn post_payment(
        &self,
        parent_id: Uuid,
        teacher_id: Uuid,
        amount: Decimal,
        paid_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<PaymentRecord> {
        journal::post_payment(&self.conn, parent_id, teacher_id, amount, paid_at, notes)
    }

    pub fn void_payment(&mut self, payment_id: Uuid) -> Result<()> {
        journal::void_payment(&mut self.conn, payment_id)
    }

    pub fn correct_payment(&mut self, payment_id: Uuid, correction: &PaymentCorrection) -> Result<PaymentRecord> {
        journal::correct_payment(&mut self.conn, payment_id, correction)
    }

    // ========================================================================
    // Reconciliation + summaries
    // ========================================================================

    /// Lessons and payments from one read transaction
    fn snapshot(&mut self) -> Result<(Vec<LessonLog>, Vec<PaymentRecord>)> {
        let tx = self.conn.transaction()?;
        let lessons = db::load_lessons(&tx)?;
        let payments = db::load_payments(&tx)?;
        tx.commit()?;
        Ok((lessons, payments))
    }

    pub fn reconcile(&mut self, scope: ReconciliationScope) -> Result<ReconciliationReport> {
        let (lessons, payments) = self.snapshot()?;
        Ok(self.reconciler.reconcile(scope, &lessons, &payments))
    }

    pub fn summarize_payer(&mut self, scope: ReconciliationScope) -> Result<PayerSummary> {
        let (lessons, payments) = self.snapshot()?;
        Ok(self.aggregator.summarize_payer(scope, &lessons, &payments))
    }

    pub fn summarize_billing_party(
        &mut self,
        billing_party: Uuid,
        filter: BillingPartyFilter,
        as_of: DateTime<Utc>,
    ) -> Result<BillingPartySummary> {
        let (lessons, payments) = self.snapshot()?;
        Ok(self
            .aggregator
            .summarize_billing_party(billing_party, filter, as_of, &lessons, &payments))
    }
}

// ============================================================================
// TESTS
// ============================================================================
