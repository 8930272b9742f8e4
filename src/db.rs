// 🗄️ Storage - SQLite schema, row mapping and snapshot loaders
//
// Money is stored as TEXT (exact decimal), timestamps as RFC 3339 TEXT,
// ids as hyphenated UUID TEXT. Foreign keys carry the catalog's lifecycle:
//   tuition_charges, meeting_links  → CASCADE with the tuition
//   lesson_logs.tuition_id          → SET NULL (history is never deleted)

use crate::config::EngineConfig;
use crate::correction::{Origin, RecordStatus};
use crate::entities::{
    CatalogEntry, ChargeRecord, Enrollment, LessonCharge, LessonKind, LessonLog, MeetingLink,
    ParentProfile, PaymentRecord, Role, Specialty, StudentProfile, TeacherProfile, TuitionRecord,
    User, UserDirectory,
};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

// ============================================================================
// CONNECTION + SCHEMA
// ============================================================================

/// Open the configured database and make sure the schema exists
pub fn open(config: &EngineConfig) -> Result<Connection> {
    if config.database_path.as_os_str().is_empty() {
        return Err(LedgerError::Config("database_path is empty".to_string()));
    }
    let conn = Connection::open(&config.database_path)?;
    configure(&conn, config)?;
    setup_database(&conn)?;
    Ok(conn)
}

/// In-memory database with the full schema
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn configure(conn: &Connection, config: &EngineConfig) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    if config.wal_mode {
        conn.pragma_update(None, "journal_mode", "WAL")?;
    }
    Ok(())
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- ==================================================================
        -- Users (one identity, role payload in a side table)
        -- ==================================================================
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT UNIQUE NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('admin', 'teacher', 'parent', 'student')),
            first_name TEXT,
            last_name TEXT,
            timezone TEXT NOT NULL DEFAULT 'UTC'
        );

        CREATE TABLE IF NOT EXISTS parents (
            id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            currency TEXT NOT NULL DEFAULT 'EGP'
        );

        CREATE TABLE IF NOT EXISTS teachers (
            id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS students (
            id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            parent_id TEXT NOT NULL REFERENCES parents(id) ON DELETE CASCADE,
            default_cost TEXT NOT NULL,
            min_duration_mins INTEGER NOT NULL,
            max_duration_mins INTEGER NOT NULL,
            grade INTEGER
        );

        CREATE TABLE IF NOT EXISTS teacher_specialties (
            teacher_id TEXT NOT NULL REFERENCES teachers(id) ON DELETE CASCADE,
            subject TEXT NOT NULL,
            educational_system TEXT NOT NULL,
            PRIMARY KEY (teacher_id, subject, educational_system)
        );

        -- ==================================================================
        -- Enrollments
        -- ==================================================================
        CREATE TABLE IF NOT EXISTS enrollments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            subject TEXT NOT NULL,
            educational_system TEXT NOT NULL,
            teacher_id TEXT NOT NULL REFERENCES teachers(id) ON DELETE CASCADE,
            lessons_per_week INTEGER NOT NULL CHECK (lessons_per_week >= 1),
            UNIQUE (student_id, subject, educational_system, teacher_id)
        );

        CREATE TABLE IF NOT EXISTS enrollment_sharings (
            enrollment_id INTEGER NOT NULL REFERENCES enrollments(id) ON DELETE CASCADE,
            shared_with_student_id TEXT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            PRIMARY KEY (enrollment_id, shared_with_student_id)
        );

        -- ==================================================================
        -- Tuition catalog (wiped and rebuilt as a whole)
        -- ==================================================================
        CREATE TABLE IF NOT EXISTS tuitions (
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            educational_system TEXT NOT NULL,
            lesson_index INTEGER NOT NULL CHECK (lesson_index >= 1),
            min_duration_mins INTEGER NOT NULL,
            max_duration_mins INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (teacher_id, subject, educational_system)
                REFERENCES teacher_specialties(teacher_id, subject, educational_system)
        );

        CREATE TABLE IF NOT EXISTS tuition_charges (
            tuition_id TEXT NOT NULL REFERENCES tuitions(id) ON DELETE CASCADE,
            student_id TEXT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            parent_id TEXT NOT NULL REFERENCES parents(id) ON DELETE CASCADE,
            cost TEXT NOT NULL,
            overridden INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (tuition_id, student_id)
        );

        CREATE TABLE IF NOT EXISTS meeting_links (
            tuition_id TEXT PRIMARY KEY REFERENCES tuitions(id) ON DELETE CASCADE,
            url TEXT NOT NULL,
            meeting_id TEXT,
            passcode TEXT
        );

        -- ==================================================================
        -- Lesson + payment journals (void + correct, never edit)
        -- ==================================================================
        CREATE TABLE IF NOT EXISTS lesson_logs (
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL REFERENCES teachers(id),
            subject TEXT NOT NULL,
            educational_system TEXT NOT NULL,
            lesson_index INTEGER,
            tuition_id TEXT REFERENCES tuitions(id) ON DELETE SET NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            create_type TEXT NOT NULL CHECK (create_type IN ('SCHEDULED', 'CUSTOM')),
            status TEXT NOT NULL CHECK (status IN ('ACTIVE', 'VOID')),
            corrected_from_log_id TEXT UNIQUE REFERENCES lesson_logs(id),
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS lesson_log_charges (
            lesson_log_id TEXT NOT NULL REFERENCES lesson_logs(id) ON DELETE CASCADE,
            student_id TEXT NOT NULL,
            parent_id TEXT NOT NULL,
            cost TEXT NOT NULL,
            PRIMARY KEY (lesson_log_id, student_id)
        );

        CREATE TABLE IF NOT EXISTS payment_logs (
            id TEXT PRIMARY KEY,
            parent_id TEXT NOT NULL REFERENCES parents(id),
            teacher_id TEXT NOT NULL REFERENCES teachers(id),
            amount TEXT NOT NULL,
            paid_at TEXT NOT NULL,
            notes TEXT,
            status TEXT NOT NULL CHECK (status IN ('ACTIVE', 'VOID')),
            corrected_from_log_id TEXT UNIQUE REFERENCES payment_logs(id),
            created_at TEXT NOT NULL
        );

        -- ==================================================================
        -- Indexes
        -- ==================================================================
        CREATE INDEX IF NOT EXISTS idx_tuition_charges_student ON tuition_charges(student_id);
        CREATE INDEX IF NOT EXISTS idx_lesson_logs_teacher ON lesson_logs(teacher_id, start_time);
        CREATE INDEX IF NOT EXISTS idx_lesson_logs_tuition ON lesson_logs(tuition_id);
        CREATE INDEX IF NOT EXISTS idx_lesson_log_charges_parent ON lesson_log_charges(parent_id);
        CREATE INDEX IF NOT EXISTS idx_payment_logs_relationship ON payment_logs(parent_id, teacher_id);
        ",
    )?;

    Ok(())
}

// ============================================================================
// COLUMN HELPERS
// ============================================================================

pub(crate) fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn get_uuid(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion(idx, e))
}

fn get_opt_uuid(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| conversion(idx, e)))
        .transpose()
}

fn get_decimal(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| conversion(idx, e))
}

fn get_time(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

fn get_status(row: &Row, idx: usize) -> rusqlite::Result<RecordStatus> {
    let raw: String = row.get(idx)?;
    RecordStatus::parse(&raw).ok_or_else(|| conversion(idx, format!("unknown status {raw}")))
}

// ============================================================================
// USERS
// ============================================================================

/// Insert a user and its role payload
pub fn insert_user(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, email, role, first_name, last_name, timezone)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.id.to_string(),
            user.email,
            user.role.as_str(),
            user.first_name,
            user.last_name,
            user.timezone,
        ],
    )?;

    match &user.role {
        Role::Admin => {}
        Role::Parent(parent) => {
            conn.execute(
                "INSERT INTO parents (id, currency) VALUES (?1, ?2)",
                params![user.id.to_string(), parent.currency],
            )?;
        }
        Role::Teacher(teacher) => {
            conn.execute(
                "INSERT INTO teachers (id) VALUES (?1)",
                params![user.id.to_string()],
            )?;
            for specialty in &teacher.specialties {
                add_specialty(conn, user.id, specialty)?;
            }
        }
        Role::Student(student) => {
            conn.execute(
                "INSERT INTO students (id, parent_id, default_cost, min_duration_mins, max_duration_mins, grade)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.id.to_string(),
                    student.parent_id.to_string(),
                    student.default_cost.to_string(),
                    student.min_duration_mins,
                    student.max_duration_mins,
                    student.grade,
                ],
            )?;
        }
    }

    Ok(())
}

pub fn add_specialty(conn: &Connection, teacher_id: Uuid, specialty: &Specialty) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO teacher_specialties (teacher_id, subject, educational_system)
         VALUES (?1, ?2, ?3)",
        params![
            teacher_id.to_string(),
            specialty.subject,
            specialty.educational_system
        ],
    )?;
    Ok(())
}

pub fn update_student_cost(conn: &Connection, student_id: Uuid, cost: Decimal) -> Result<()> {
    let changed = conn.execute(
        "UPDATE students SET default_cost = ?1 WHERE id = ?2",
        params![cost.to_string(), student_id.to_string()],
    )?;
    if changed == 0 {
        return Err(LedgerError::NotFound {
            entity: "student",
            id: student_id,
        });
    }
    Ok(())
}

struct UserRow {
    id: Uuid,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    timezone: String,
    role: String,
    currency: Option<String>,
    parent_id: Option<Uuid>,
    default_cost: Option<String>,
    min_duration_mins: Option<u32>,
    max_duration_mins: Option<u32>,
    grade: Option<u8>,
}

/// Load every user with its role payload in one pass
pub fn load_users(conn: &Connection) -> Result<UserDirectory> {
    let specialties = load_specialties(conn)?;

    let mut stmt = conn.prepare(
        "SELECT u.id, u.email, u.first_name, u.last_name, u.timezone, u.role,
                p.currency,
                s.parent_id, s.default_cost, s.min_duration_mins, s.max_duration_mins, s.grade
         FROM users u
         LEFT JOIN parents p ON p.id = u.id
         LEFT JOIN students s ON s.id = u.id
         ORDER BY u.id",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(UserRow {
                id: get_uuid(row, 0)?,
                email: row.get(1)?,
                first_name: row.get(2)?,
                last_name: row.get(3)?,
                timezone: row.get(4)?,
                role: row.get(5)?,
                currency: row.get(6)?,
                parent_id: get_opt_uuid(row, 7)?,
                default_cost: row.get(8)?,
                min_duration_mins: row.get(9)?,
                max_duration_mins: row.get(10)?,
                grade: row.get(11)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut directory = UserDirectory::new();
    for row in rows {
        let role = resolve_role(&row, &specialties)?;
        directory.insert(User {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            timezone: row.timezone,
            role,
        });
    }

    Ok(directory)
}

fn resolve_role(row: &UserRow, specialties: &HashMap<Uuid, Vec<Specialty>>) -> Result<Role> {
    match row.role.as_str() {
        "admin" => Ok(Role::Admin),
        "teacher" => Ok(Role::Teacher(TeacherProfile {
            specialties: specialties.get(&row.id).cloned().unwrap_or_default(),
        })),
        "parent" => Ok(Role::Parent(ParentProfile {
            currency: row.currency.clone().unwrap_or_else(|| "EGP".to_string()),
        })),
        "student" => {
            let missing = || LedgerError::Corrupt {
                column: "students",
                value: format!("student {} has no profile row", row.id),
            };
            let raw_cost = row.default_cost.as_deref().ok_or_else(missing)?;
            let default_cost = Decimal::from_str(raw_cost).map_err(|_| LedgerError::Corrupt {
                column: "students.default_cost",
                value: raw_cost.to_string(),
            })?;
            Ok(Role::Student(StudentProfile {
                parent_id: row.parent_id.ok_or_else(missing)?,
                default_cost,
                min_duration_mins: row.min_duration_mins.ok_or_else(missing)?,
                max_duration_mins: row.max_duration_mins.ok_or_else(missing)?,
                grade: row.grade,
            }))
        }
        other => Err(LedgerError::Corrupt {
            column: "users.role",
            value: other.to_string(),
        }),
    }
}

fn load_specialties(conn: &Connection) -> Result<HashMap<Uuid, Vec<Specialty>>> {
    let mut stmt = conn.prepare(
        "SELECT teacher_id, subject, educational_system
         FROM teacher_specialties
         ORDER BY teacher_id, subject, educational_system",
    )?;

    let mut by_teacher: HashMap<Uuid, Vec<Specialty>> = HashMap::new();
    let rows = stmt.query_map([], |row| {
        Ok((
            get_uuid(row, 0)?,
            Specialty {
                subject: row.get(1)?,
                educational_system: row.get(2)?,
            },
        ))
    })?;
    for row in rows {
        let (teacher_id, specialty) = row?;
        by_teacher.entry(teacher_id).or_default().push(specialty);
    }

    Ok(by_teacher)
}

pub fn has_specialty(
    conn: &Connection,
    teacher_id: Uuid,
    subject: &str,
    educational_system: &str,
) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM teacher_specialties
             WHERE teacher_id = ?1 AND subject = ?2 AND educational_system = ?3",
            params![teacher_id.to_string(), subject, educational_system],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

// ============================================================================
// ENROLLMENTS
// ============================================================================

/// Insert an enrollment and its co-attendee declarations; returns the row id
pub fn insert_enrollment(conn: &Connection, enrollment: &Enrollment) -> Result<i64> {
    conn.execute(
        "INSERT INTO enrollments (student_id, subject, educational_system, teacher_id, lessons_per_week)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            enrollment.student_id.to_string(),
            enrollment.subject,
            enrollment.educational_system,
            enrollment.teacher_id.to_string(),
            enrollment.lessons_per_week,
        ],
    )?;
    let enrollment_id = conn.last_insert_rowid();

    for other in &enrollment.co_attendee_ids {
        conn.execute(
            "INSERT OR IGNORE INTO enrollment_sharings (enrollment_id, shared_with_student_id)
             VALUES (?1, ?2)",
            params![enrollment_id, other.to_string()],
        )?;
    }

    Ok(enrollment_id)
}

pub fn delete_enrollment(
    conn: &Connection,
    student_id: Uuid,
    subject: &str,
    educational_system: &str,
    teacher_id: Uuid,
) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM enrollments
         WHERE student_id = ?1 AND subject = ?2 AND educational_system = ?3 AND teacher_id = ?4",
        params![
            student_id.to_string(),
            subject,
            educational_system,
            teacher_id.to_string()
        ],
    )?;
    Ok(removed > 0)
}

/// Enrollment snapshot; duration limits come from the student's profile
pub fn load_enrollments(conn: &Connection) -> Result<Vec<Enrollment>> {
    let mut sharings: HashMap<i64, Vec<Uuid>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT enrollment_id, shared_with_student_id
             FROM enrollment_sharings
             ORDER BY enrollment_id, shared_with_student_id",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, get_uuid(row, 1)?)))?;
        for row in rows {
            let (enrollment_id, other) = row?;
            sharings.entry(enrollment_id).or_default().push(other);
        }
    }

    let mut stmt = conn.prepare(
        "SELECT e.id, e.student_id, e.subject, e.educational_system, e.teacher_id,
                e.lessons_per_week, s.min_duration_mins, s.max_duration_mins
         FROM enrollments e
         JOIN students s ON s.id = e.student_id
         ORDER BY e.id",
    )?;

    let enrollments = stmt
        .query_map([], |row| {
            let enrollment_id: i64 = row.get(0)?;
            Ok(Enrollment {
                student_id: get_uuid(row, 1)?,
                subject: row.get(2)?,
                educational_system: row.get(3)?,
                teacher_id: get_uuid(row, 4)?,
                lessons_per_week: row.get(5)?,
                min_duration_mins: row.get(6)?,
                max_duration_mins: row.get(7)?,
                co_attendee_ids: sharings.remove(&enrollment_id).unwrap_or_default(),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(enrollments)
}

// ============================================================================
// CATALOG
// ============================================================================

pub fn insert_tuition(conn: &Connection, tuition: &TuitionRecord, created_at: &DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT INTO tuitions (id, teacher_id, subject, educational_system, lesson_index,
                               min_duration_mins, max_duration_mins, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            tuition.id.to_string(),
            tuition.teacher_id.to_string(),
            tuition.subject,
            tuition.educational_system,
            tuition.lesson_index,
            tuition.min_duration_mins,
            tuition.max_duration_mins,
            timestamp(created_at),
        ],
    )?;
    Ok(())
}

pub fn insert_charge(conn: &Connection, charge: &ChargeRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO tuition_charges (tuition_id, student_id, parent_id, cost, overridden)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            charge.tuition_id.to_string(),
            charge.student_id.to_string(),
            charge.parent_id.to_string(),
            charge.cost.to_string(),
            charge.overridden,
        ],
    )?;
    Ok(())
}

/// Manually override one student's cost on a tuition
pub fn override_charge(conn: &Connection, tuition_id: Uuid, student_id: Uuid, cost: Decimal) -> Result<()> {
    let changed = conn.execute(
        "UPDATE tuition_charges SET cost = ?1, overridden = 1
         WHERE tuition_id = ?2 AND student_id = ?3",
        params![cost.to_string(), tuition_id.to_string(), student_id.to_string()],
    )?;
    if changed == 0 {
        return Err(LedgerError::NotFound {
            entity: "tuition charge",
            id: tuition_id,
        });
    }
    Ok(())
}

pub fn upsert_meeting_link(conn: &Connection, link: &MeetingLink) -> Result<()> {
    conn.execute(
        "INSERT INTO meeting_links (tuition_id, url, meeting_id, passcode)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(tuition_id) DO UPDATE SET
             url = excluded.url,
             meeting_id = excluded.meeting_id,
             passcode = excluded.passcode",
        params![
            link.tuition_id.to_string(),
            link.url,
            link.meeting_id,
            link.passcode,
        ],
    )?;
    Ok(())
}

/// Overridden charges keyed by (tuition id, student id)
pub fn load_overridden_charges(conn: &Connection) -> Result<HashMap<(Uuid, Uuid), Decimal>> {
    let mut stmt = conn.prepare(
        "SELECT tuition_id, student_id, cost FROM tuition_charges WHERE overridden = 1",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(((get_uuid(row, 0)?, get_uuid(row, 1)?), get_decimal(row, 2)?))
    })?;

    let mut overrides = HashMap::new();
    for row in rows {
        let (key, cost) = row?;
        overrides.insert(key, cost);
    }
    Ok(overrides)
}

pub fn load_meeting_links(conn: &Connection) -> Result<HashMap<Uuid, MeetingLink>> {
    let mut stmt = conn.prepare("SELECT tuition_id, url, meeting_id, passcode FROM meeting_links")?;
    let rows = stmt.query_map([], |row| {
        Ok(MeetingLink {
            tuition_id: get_uuid(row, 0)?,
            url: row.get(1)?,
            meeting_id: row.get(2)?,
            passcode: row.get(3)?,
        })
    })?;

    let mut links = HashMap::new();
    for row in rows {
        let link = row?;
        links.insert(link.tuition_id, link);
    }
    Ok(links)
}

/// Remove every tuition; charges and links cascade, lesson references go NULL
pub fn delete_catalog(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM tuitions", [])?)
}

pub fn tuition_exists(conn: &Connection, tuition_id: Uuid) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM tuitions WHERE id = ?1",
            params![tuition_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn count_tuitions(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM tuitions", [], |row| row.get(0))?)
}

/// Full catalog ordered by tuition id
pub fn load_catalog(conn: &Connection) -> Result<Vec<CatalogEntry>> {
    let mut links = load_meeting_links(conn)?;

    let mut charges: HashMap<Uuid, Vec<ChargeRecord>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT tuition_id, student_id, parent_id, cost, overridden
             FROM tuition_charges
             ORDER BY tuition_id, student_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ChargeRecord {
                tuition_id: get_uuid(row, 0)?,
                student_id: get_uuid(row, 1)?,
                parent_id: get_uuid(row, 2)?,
                cost: get_decimal(row, 3)?,
                overridden: row.get(4)?,
            })
        })?;
        for row in rows {
            let charge = row?;
            charges.entry(charge.tuition_id).or_default().push(charge);
        }
    }

    let mut stmt = conn.prepare(
        "SELECT id, subject, educational_system, teacher_id, lesson_index,
                min_duration_mins, max_duration_mins
         FROM tuitions
         ORDER BY id",
    )?;
    let tuitions = stmt
        .query_map([], |row| {
            Ok(TuitionRecord {
                id: get_uuid(row, 0)?,
                subject: row.get(1)?,
                educational_system: row.get(2)?,
                teacher_id: get_uuid(row, 3)?,
                lesson_index: row.get(4)?,
                min_duration_mins: row.get(5)?,
                max_duration_mins: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(tuitions
        .into_iter()
        .map(|tuition| CatalogEntry {
            charges: charges.remove(&tuition.id).unwrap_or_default(),
            meeting_link: links.remove(&tuition.id),
            tuition,
        })
        .collect())
}

pub fn load_catalog_entry(conn: &Connection, tuition_id: Uuid) -> Result<CatalogEntry> {
    load_catalog(conn)?
        .into_iter()
        .find(|entry| entry.tuition.id == tuition_id)
        .ok_or(LedgerError::NotFound {
            entity: "tuition",
            id: tuition_id,
        })
}

/// Diagnostic row from [`check_catalog_integrity`]
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct IntegrityIssue {
    pub tuition_id: Uuid,
    pub problem: String,
}

/// Tuitions whose teacher is gone or that have no charges. Read-only.
pub fn check_catalog_integrity(conn: &Connection) -> Result<Vec<IntegrityIssue>> {
    let mut stmt = conn.prepare(
        "SELECT t.id,
                CASE WHEN tr.id IS NULL THEN 'teacher does not exist' END,
                CASE WHEN NOT EXISTS (SELECT 1 FROM tuition_charges c WHERE c.tuition_id = t.id)
                     THEN 'no charges' END
         FROM tuitions t
         LEFT JOIN teachers tr ON tr.id = t.teacher_id
         ORDER BY t.id",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                get_uuid(row, 0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let issues: Vec<IntegrityIssue> = rows
        .into_iter()
        .flat_map(|(tuition_id, teacher, charges)| {
            [teacher, charges]
                .into_iter()
                .flatten()
                .map(move |problem| IntegrityIssue { tuition_id, problem })
        })
        .collect();

    if issues.is_empty() {
        debug!("Catalog integrity check passed");
    } else {
        warn!(issues = issues.len(), "Catalog integrity check found problems");
    }

    Ok(issues)
}

// ============================================================================
// LESSON LOGS
// ============================================================================

pub fn insert_lesson(conn: &Connection, lesson: &LessonLog) -> Result<()> {
    conn.execute(
        "INSERT INTO lesson_logs (id, teacher_id, subject, educational_system, lesson_index,
                                  tuition_id, start_time, end_time, create_type, status,
                                  corrected_from_log_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            lesson.id.to_string(),
            lesson.teacher_id.to_string(),
            lesson.subject,
            lesson.educational_system,
            lesson.lesson_index,
            lesson.tuition_id.map(|id| id.to_string()),
            timestamp(&lesson.start_time),
            timestamp(&lesson.end_time),
            lesson.kind.as_str(),
            lesson.status.as_str(),
            lesson.origin.predecessor().map(|id| id.to_string()),
            timestamp(&Utc::now()),
        ],
    )?;

    for charge in &lesson.charges {
        conn.execute(
            "INSERT INTO lesson_log_charges (lesson_log_id, student_id, parent_id, cost)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                lesson.id.to_string(),
                charge.student_id.to_string(),
                charge.parent_id.to_string(),
                charge.cost.to_string(),
            ],
        )?;
    }

    Ok(())
}

pub fn set_lesson_status(conn: &Connection, lesson_id: Uuid, status: RecordStatus) -> Result<()> {
    let changed = conn.execute(
        "UPDATE lesson_logs SET status = ?1 WHERE id = ?2",
        params![status.as_str(), lesson_id.to_string()],
    )?;
    if changed == 0 {
        return Err(LedgerError::NotFound {
            entity: "lesson log",
            id: lesson_id,
        });
    }
    Ok(())
}

/// Point lesson logs at a tuition id again after the catalog swap
pub fn relink_lessons(conn: &Connection, tuition_id: Uuid, lesson_ids: &[Uuid]) -> Result<usize> {
    let mut stmt = conn.prepare("UPDATE lesson_logs SET tuition_id = ?1 WHERE id = ?2")?;
    let mut relinked = 0;
    for lesson_id in lesson_ids {
        relinked += stmt.execute(params![tuition_id.to_string(), lesson_id.to_string()])?;
    }
    Ok(relinked)
}

/// Every lesson log (all statuses), oldest first
pub fn load_lessons(conn: &Connection) -> Result<Vec<LessonLog>> {
    let mut charges: HashMap<Uuid, Vec<LessonCharge>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT lesson_log_id, student_id, parent_id, cost
             FROM lesson_log_charges
             ORDER BY lesson_log_id, student_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                get_uuid(row, 0)?,
                LessonCharge {
                    student_id: get_uuid(row, 1)?,
                    parent_id: get_uuid(row, 2)?,
                    cost: get_decimal(row, 3)?,
                },
            ))
        })?;
        for row in rows {
            let (lesson_id, charge) = row?;
            charges.entry(lesson_id).or_default().push(charge);
        }
    }

    let mut stmt = conn.prepare(
        "SELECT id, teacher_id, subject, educational_system, lesson_index, tuition_id,
                start_time, end_time, create_type, status, corrected_from_log_id
         FROM lesson_logs
         ORDER BY start_time, id",
    )?;

    let lessons = stmt
        .query_map([], |row| {
            let id = get_uuid(row, 0)?;
            let kind_raw: String = row.get(8)?;
            let kind = LessonKind::parse(&kind_raw)
                .ok_or_else(|| conversion(8, format!("unknown create type {kind_raw}")))?;
            Ok(LessonLog {
                id,
                teacher_id: get_uuid(row, 1)?,
                subject: row.get(2)?,
                educational_system: row.get(3)?,
                lesson_index: row.get(4)?,
                tuition_id: get_opt_uuid(row, 5)?,
                start_time: get_time(row, 6)?,
                end_time: get_time(row, 7)?,
                kind,
                status: get_status(row, 9)?,
                origin: Origin::from_predecessor(get_opt_uuid(row, 10)?),
                charges: charges.remove(&id).unwrap_or_default(),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(lessons)
}

pub fn get_lesson(conn: &Connection, lesson_id: Uuid) -> Result<LessonLog> {
    load_lessons(conn)?
        .into_iter()
        .find(|l| l.id == lesson_id)
        .ok_or(LedgerError::NotFound {
            entity: "lesson log",
            id: lesson_id,
        })
}

// ============================================================================
// PAYMENT LOGS
// ============================================================================

pub fn insert_payment(conn: &Connection, payment: &PaymentRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO payment_logs (id, parent_id, teacher_id, amount, paid_at, notes, status,
                                   corrected_from_log_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            payment.id.to_string(),
            payment.parent_id.to_string(),
            payment.teacher_id.to_string(),
            payment.amount.to_string(),
            timestamp(&payment.paid_at),
            payment.notes,
            payment.status.as_str(),
            payment.origin.predecessor().map(|id| id.to_string()),
            timestamp(&Utc::now()),
        ],
    )?;
    Ok(())
}

pub fn set_payment_status(conn: &Connection, payment_id: Uuid, status: RecordStatus) -> Result<()> {
    let changed = conn.execute(
        "UPDATE payment_logs SET status = ?1 WHERE id = ?2",
        params![status.as_str(), payment_id.to_string()],
    )?;
    if changed == 0 {
        return Err(LedgerError::NotFound {
            entity: "payment log",
            id: payment_id,
        });
    }
    Ok(())
}

/// Every payment (all statuses), oldest first.
///
/// An amount that does not parse is logged and counted as zero credit.
pub fn load_payments(conn: &Connection) -> Result<Vec<PaymentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, parent_id, teacher_id, amount, paid_at, notes, status, corrected_from_log_id
         FROM payment_logs
         ORDER BY paid_at, id",
    )?;

    let payments = stmt
        .query_map([], |row| {
            let id = get_uuid(row, 0)?;
            let raw_amount: String = row.get(3)?;
            let amount = Decimal::from_str(&raw_amount).unwrap_or_else(|_| {
                warn!(payment = %id, amount = %raw_amount, "Unreadable payment amount, counting as zero");
                Decimal::ZERO
            });
            Ok(PaymentRecord {
                id,
                parent_id: get_uuid(row, 1)?,
                teacher_id: get_uuid(row, 2)?,
                amount,
                paid_at: get_time(row, 4)?,
                notes: row.get(5)?,
                status: get_status(row, 6)?,
                origin: Origin::from_predecessor(get_opt_uuid(row, 7)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(payments)
}

pub fn get_payment(conn: &Connection, payment_id: Uuid) -> Result<PaymentRecord> {
    load_payments(conn)?
        .into_iter()
        .find(|p| p.id == payment_id)
        .ok_or(LedgerError::NotFound {
            entity: "payment log",
            id: payment_id,
        })
}

/// Lesson log ids grouped by the tuition they still reference
pub fn lessons_by_tuition(conn: &Connection) -> Result<BTreeMap<Uuid, Vec<Uuid>>> {
    let mut stmt = conn.prepare(
        "SELECT tuition_id, id FROM lesson_logs WHERE tuition_id IS NOT NULL ORDER BY tuition_id, id",
    )?;
    let rows = stmt.query_map([], |row| Ok((get_uuid(row, 0)?, get_uuid(row, 1)?)))?;

    let mut map: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
    for row in rows {
        let (tuition_id, lesson_id) = row?;
        map.entry(tuition_id).or_default().push(lesson_id);
    }
    Ok(map)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();
        assert_eq!(count_tuitions(&conn).unwrap(), 0);
    }

    #[test]
    fn test_empty_database_path_is_config_error() {
        let config = EngineConfig {
            database_path: std::path::PathBuf::new(),
            ..EngineConfig::default()
        };
        assert!(matches!(open(&config), Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_users_round_trip_with_roles() {
        let fx = Fixture::new();
        let directory = load_users(&fx.conn).unwrap();

        assert_eq!(directory.len(), 5);
        let student = directory.student(fx.alice).unwrap();
        assert_eq!(student.parent_id, fx.parent);
        assert_eq!(student.default_cost, dec!(100));
        assert!(directory.has_specialty(fx.teacher, "Math", "IGCSE"));
        assert!(directory.get(fx.parent).unwrap().as_parent().is_some());
    }

    #[test]
    fn test_student_without_parent_is_rejected() {
        let conn = open_in_memory().unwrap();
        let orphan = User::new(
            "orphan@example.com",
            Role::Student(StudentProfile {
                parent_id: Uuid::new_v4(),
                default_cost: dec!(5),
                min_duration_mins: 60,
                max_duration_mins: 90,
                grade: None,
            }),
        );

        let err = insert_user(&conn, &orphan).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_enrollments_round_trip_with_sharings() {
        let fx = Fixture::new();
        insert_enrollment(
            &fx.conn,
            &Enrollment::new(fx.alice, "Math", "IGCSE", fx.teacher).shared_with(&[fx.bob]),
        )
        .unwrap();

        let loaded = load_enrollments(&fx.conn).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].co_attendee_ids, vec![fx.bob]);
        // durations come from the student profile
        assert_eq!(loaded[0].min_duration_mins, 60);
        assert_eq!(loaded[0].max_duration_mins, 90);
    }

    #[test]
    fn test_duplicate_enrollment_is_constraint_violation() {
        let fx = Fixture::new();
        let enrollment = Enrollment::new(fx.alice, "Math", "IGCSE", fx.teacher);
        insert_enrollment(&fx.conn, &enrollment).unwrap();

        let err = insert_enrollment(&fx.conn, &enrollment).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_tuition_requires_teacher_specialty() {
        let fx = Fixture::new();
        let tuition = TuitionRecord {
            id: Uuid::new_v4(),
            subject: "Chemistry".to_string(),
            educational_system: "IGCSE".to_string(),
            teacher_id: fx.teacher,
            lesson_index: 1,
            min_duration_mins: 60,
            max_duration_mins: 90,
        };

        let err = insert_tuition(&fx.conn, &tuition, &Utc::now()).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_lessons_round_trip() {
        let fx = Fixture::new();
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 16, 0, 0).unwrap();
        let lesson = fx.custom_lesson(start, &[(fx.alice, dec!(40.50))]);
        insert_lesson(&fx.conn, &lesson).unwrap();

        let loaded = get_lesson(&fx.conn, lesson.id).unwrap();
        assert_eq!(loaded, lesson);
    }

    #[test]
    fn test_payments_round_trip() {
        let fx = Fixture::new();
        let paid_at = Utc.with_ymd_and_hms(2025, 3, 2, 9, 30, 0).unwrap();
        let mut payment = PaymentRecord::new(fx.parent, fx.teacher, dec!(120.00), paid_at);
        payment.notes = Some("cash".to_string());
        insert_payment(&fx.conn, &payment).unwrap();

        assert_eq!(get_payment(&fx.conn, payment.id).unwrap(), payment);
    }

    #[test]
    fn test_unreadable_payment_amount_counts_as_zero() {
        let fx = Fixture::new();
        let payment = PaymentRecord::new(fx.parent, fx.teacher, dec!(10), Utc::now());
        insert_payment(&fx.conn, &payment).unwrap();
        fx.conn
            .execute(
                "UPDATE payment_logs SET amount = 'ten' WHERE id = ?1",
                params![payment.id.to_string()],
            )
            .unwrap();

        let loaded = load_payments(&fx.conn).unwrap();
        assert_eq!(loaded[0].amount, Decimal::ZERO);
    }

    #[test]
    fn test_integrity_check_reports_chargeless_tuition() {
        let fx = Fixture::new();
        let tuition = TuitionRecord {
            id: Uuid::from_u128(1),
            subject: "Math".to_string(),
            educational_system: "IGCSE".to_string(),
            teacher_id: fx.teacher,
            lesson_index: 1,
            min_duration_mins: 60,
            max_duration_mins: 90,
        };
        insert_tuition(&fx.conn, &tuition, &Utc::now()).unwrap();

        let issues = check_catalog_integrity(&fx.conn).unwrap();
        assert_eq!(
            issues,
            vec![IntegrityIssue {
                tuition_id: tuition.id,
                problem: "no charges".to_string()
            }]
        );
    }
}
