use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;

use crate::completion::CompletionStore;
use crate::error::{ProgressError, Result};
use crate::models::{
    slugify, Actor, ChecklistItem, CompletionRecord, PrerequisiteEdge, Subject, SubjectKind,
    SubjectRef,
};

const SUBJECT_COLUMNS: &str = "id, kind, name, slug, description, level_id, created_at";

pub struct Database {
    conn: Connection,
}

/// Fixed-width UTC timestamps so that stored strings sort chronologically.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ProgressError::Timestamp(format!("{}: {}", s, e)))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
            })
    })
    .transpose()
}

fn subject_from_row(row: &Row<'_>) -> rusqlite::Result<Subject> {
    let kind_str: String = row.get(1)?;
    let kind = SubjectKind::from_str(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            Box::new(ProgressError::InvalidKind(kind_str.clone())),
        )
    })?;
    Ok(Subject {
        id: row.get(0)?,
        kind,
        name: row.get(2)?,
        slug: row.get(3)?,
        description: row.get(4)?,
        level_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn completion_from_row(row: &Row<'_>) -> rusqlite::Result<CompletionRecord> {
    Ok(CompletionRecord {
        actor_id: row.get(0)?,
        subject_id: row.get(1)?,
        completion_count: row.get(2)?,
        last_completed_at: timestamp_column(row, 3)?,
        completed_at: timestamp_column(row, 4)?,
    })
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS subjects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL CHECK(kind IN ('hack', 'routine', 'level')),
                name TEXT NOT NULL,
                slug TEXT NOT NULL,
                description TEXT,
                level_id INTEGER,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (kind, slug),
                FOREIGN KEY (level_id) REFERENCES subjects(id) ON DELETE SET NULL
            );

            -- subject_id stays locked until required_id is completed.
            -- required_id is deliberately not a foreign key: dangling targets are kept.
            CREATE TABLE IF NOT EXISTS prerequisites (
                subject_id INTEGER NOT NULL,
                required_id INTEGER NOT NULL,
                PRIMARY KEY (subject_id, required_id),
                FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE
            );

            -- Not a foreign key either: a completion outlives its subject and
            -- keeps satisfying edges that point at it, same as on the device.
            CREATE TABLE IF NOT EXISTS completions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                actor_id TEXT NOT NULL,
                subject_id INTEGER NOT NULL,
                kind TEXT NOT NULL CHECK(kind IN ('hack', 'routine', 'level')),
                completion_count INTEGER NOT NULL DEFAULT 0,
                last_completed_at TEXT,
                completed_at TEXT,
                UNIQUE (actor_id, subject_id)
            );

            CREATE TABLE IF NOT EXISTS completion_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                actor_id TEXT NOT NULL,
                subject_id INTEGER NOT NULL,
                completed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS checklist_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                position INTEGER NOT NULL,
                FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS checklist_checks (
                actor_id TEXT NOT NULL,
                item_id INTEGER NOT NULL,
                checked_at TEXT NOT NULL,
                PRIMARY KEY (actor_id, item_id),
                FOREIGN KEY (item_id) REFERENCES checklist_items(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_subjects_kind ON subjects(kind);
            CREATE INDEX IF NOT EXISTS idx_subjects_level ON subjects(level_id);
            CREATE INDEX IF NOT EXISTS idx_prerequisites_required ON prerequisites(required_id);
            CREATE INDEX IF NOT EXISTS idx_completions_actor ON completions(actor_id, kind);
            CREATE INDEX IF NOT EXISTS idx_history_actor ON completion_history(actor_id);
            CREATE INDEX IF NOT EXISTS idx_checklist_subject ON checklist_items(subject_id);
            "#,
        )?;
        Ok(())
    }

    // Subject catalog
    pub fn add_subject(
        &self,
        kind: SubjectKind,
        name: &str,
        description: Option<&str>,
        level_id: Option<i64>,
    ) -> Result<i64> {
        let name = name.trim();
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(ProgressError::InvalidName(format!(
                "'{}' needs at least one letter or digit",
                name
            )));
        }
        if let Some(level) = level_id {
            self.expect_kind(level, SubjectKind::Level)?;
        }

        self.conn.execute(
            "INSERT INTO subjects (kind, name, slug, description, level_id) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![kind.as_str(), name, slug, description, level_id],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(id, kind = %kind, slug = %slug, "subject added");
        Ok(id)
    }

    pub fn get_subject(&self, id: i64) -> Result<Option<Subject>> {
        let subject = self
            .conn
            .query_row(
                &format!("SELECT {} FROM subjects WHERE id = ?1", SUBJECT_COLUMNS),
                params![id],
                subject_from_row,
            )
            .optional()?;
        Ok(subject)
    }

    /// Fetches a subject and checks it is of the expected kind.
    pub fn expect_kind(&self, id: i64, kind: SubjectKind) -> Result<Subject> {
        match self.get_subject(id)? {
            Some(subject) if subject.kind == kind => Ok(subject),
            _ => Err(ProgressError::KindNotFound { kind, id }),
        }
    }

    pub fn list_subjects(&self, kind: Option<SubjectKind>) -> Result<Vec<Subject>> {
        let subjects = match kind {
            Some(kind) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {} FROM subjects WHERE kind = ?1 ORDER BY name",
                    SUBJECT_COLUMNS
                ))?;
                let rows = stmt.query_map(params![kind.as_str()], subject_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {} FROM subjects ORDER BY kind, name",
                    SUBJECT_COLUMNS
                ))?;
                let rows = stmt.query_map([], subject_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(subjects)
    }

    pub fn level_members(&self, level_id: i64) -> Result<Vec<Subject>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM subjects WHERE level_id = ?1 ORDER BY name",
            SUBJECT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![level_id], subject_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn delete_subject(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM subjects WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Prerequisite edges
    pub fn add_prerequisite(&self, subject_id: i64, required_id: i64) -> Result<bool> {
        if subject_id == required_id {
            return Err(ProgressError::SelfPrerequisite(subject_id));
        }
        let subject = self
            .get_subject(subject_id)?
            .ok_or(ProgressError::SubjectNotFound(subject_id))?;
        let required = self
            .get_subject(required_id)?
            .ok_or(ProgressError::SubjectNotFound(required_id))?;
        if subject.kind != required.kind {
            return Err(ProgressError::KindMismatch {
                subject: subject_id,
                subject_kind: subject.kind,
                required: required_id,
                required_kind: required.kind,
            });
        }

        let rows = self.conn.execute(
            "INSERT OR IGNORE INTO prerequisites (subject_id, required_id) VALUES (?1, ?2)",
            params![subject_id, required_id],
        )?;
        Ok(rows > 0)
    }

    pub fn remove_prerequisite(&self, subject_id: i64, required_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM prerequisites WHERE subject_id = ?1 AND required_id = ?2",
            params![subject_id, required_id],
        )?;
        Ok(rows > 0)
    }

    /// Every edge whose dependent subject is of `kind`.
    pub fn prerequisite_edges(&self, kind: SubjectKind) -> Result<Vec<PrerequisiteEdge>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT p.subject_id, p.required_id
            FROM prerequisites p
            JOIN subjects s ON s.id = p.subject_id
            WHERE s.kind = ?1
            ORDER BY p.subject_id, p.required_id
            "#,
        )?;
        let rows = stmt.query_map(params![kind.as_str()], |row| {
            Ok(PrerequisiteEdge::new(row.get(0)?, row.get(1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // Checklists
    pub fn add_checklist_item(&self, subject_id: i64, title: &str) -> Result<i64> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ProgressError::InvalidName("checklist item title is empty".to_string()));
        }
        self.get_subject(subject_id)?
            .ok_or(ProgressError::SubjectNotFound(subject_id))?;

        let position: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM checklist_items WHERE subject_id = ?1",
            params![subject_id],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO checklist_items (subject_id, title, position) VALUES (?1, ?2, ?3)",
            params![subject_id, title, position],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn checklist(&self, subject_id: i64, user_id: &str) -> Result<Vec<ChecklistItem>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT ci.id, ci.subject_id, ci.title, ci.position, cc.item_id IS NOT NULL
            FROM checklist_items ci
            LEFT JOIN checklist_checks cc ON cc.item_id = ci.id AND cc.actor_id = ?2
            WHERE ci.subject_id = ?1
            ORDER BY ci.position
            "#,
        )?;
        let rows = stmt.query_map(params![subject_id, user_id], |row| {
            Ok(ChecklistItem {
                id: row.get(0)?,
                subject_id: row.get(1)?,
                title: row.get(2)?,
                position: row.get(3)?,
                checked: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn set_checked(
        &self,
        item_id: i64,
        user_id: &str,
        checked: bool,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let subject_id: i64 = self
            .conn
            .query_row(
                "SELECT subject_id FROM checklist_items WHERE id = ?1",
                params![item_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(ProgressError::ChecklistItemNotFound(item_id))?;

        if checked {
            self.conn.execute(
                "INSERT OR IGNORE INTO checklist_checks (actor_id, item_id, checked_at) VALUES (?1, ?2, ?3)",
                params![user_id, item_id, format_timestamp(now)],
            )?;
        } else {
            self.conn.execute(
                "DELETE FROM checklist_checks WHERE actor_id = ?1 AND item_id = ?2",
                params![user_id, item_id],
            )?;
        }
        Ok(subject_id)
    }

    // Account completions
    fn user_key<'a>(&self, actor: &'a Actor) -> Result<&'a str> {
        actor.user_id().ok_or_else(|| ProgressError::ActorMismatch {
            store: "account",
            actor: actor.to_string(),
        })
    }

    pub fn total_completions(&self, actor: &Actor) -> Result<i64> {
        let user = self.user_key(actor)?;
        let total = self.conn.query_row(
            "SELECT COUNT(*) FROM completion_history WHERE actor_id = ?1",
            params![user],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Folds a record from another store into the account, keeping the
    /// larger count and the later timestamp so counts never go down.
    /// Every completion gained this way also lands in the history log.
    pub fn merge_completion(
        &self,
        actor: &Actor,
        subject: SubjectRef,
        record: &CompletionRecord,
    ) -> Result<u32> {
        let user = self.user_key(actor)?;
        let last = record.last_completed_at.map(format_timestamp);
        let first = record
            .completed_at
            .or(record.last_completed_at)
            .map(format_timestamp);

        let tx = self.conn.unchecked_transaction()?;
        let before: u32 = tx
            .query_row(
                "SELECT completion_count FROM completions WHERE actor_id = ?1 AND subject_id = ?2",
                params![user, subject.id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        tx.execute(
            r#"
            INSERT INTO completions (actor_id, subject_id, kind, completion_count, last_completed_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(actor_id, subject_id) DO UPDATE SET
                completion_count = MAX(completion_count, excluded.completion_count),
                last_completed_at = CASE
                    WHEN last_completed_at IS NULL THEN excluded.last_completed_at
                    WHEN excluded.last_completed_at IS NULL THEN last_completed_at
                    ELSE MAX(last_completed_at, excluded.last_completed_at)
                END,
                completed_at = COALESCE(completed_at, excluded.completed_at)
            "#,
            params![
                user,
                subject.id,
                subject.kind.as_str(),
                record.completion_count,
                last,
                first
            ],
        )?;

        let after: u32 = tx.query_row(
            "SELECT completion_count FROM completions WHERE actor_id = ?1 AND subject_id = ?2",
            params![user, subject.id],
            |row| row.get(0),
        )?;
        let logged_at = last.or(first).unwrap_or_else(|| format_timestamp(Utc::now()));
        for _ in before..after {
            tx.execute(
                "INSERT INTO completion_history (actor_id, subject_id, completed_at) VALUES (?1, ?2, ?3)",
                params![user, subject.id, logged_at],
            )?;
        }
        tx.commit()?;
        Ok(after)
    }
}

impl CompletionStore for Database {
    fn get(&self, actor: &Actor, subject: SubjectRef) -> Result<Option<CompletionRecord>> {
        let user = self.user_key(actor)?;
        let record = self
            .conn
            .query_row(
                r#"
                SELECT actor_id, subject_id, completion_count, last_completed_at, completed_at
                FROM completions
                WHERE actor_id = ?1 AND subject_id = ?2
                "#,
                params![user, subject.id],
                completion_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn record_if_cooled(
        &self,
        actor: &Actor,
        subject: SubjectRef,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Option<CompletionRecord>> {
        let user = self.user_key(actor)?;
        let now_str = format_timestamp(now);
        let cutoff = format_timestamp(now - cooldown);

        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            r#"
            INSERT INTO completions (actor_id, subject_id, kind, completion_count, last_completed_at, completed_at)
            VALUES (?1, ?2, ?5, 1, ?3, ?3)
            ON CONFLICT(actor_id, subject_id) DO UPDATE SET
                completion_count = completion_count + 1,
                last_completed_at = excluded.last_completed_at,
                completed_at = COALESCE(completed_at, excluded.completed_at)
            WHERE last_completed_at IS NULL OR last_completed_at <= ?4
            "#,
            params![user, subject.id, now_str, cutoff, subject.kind.as_str()],
        )?;
        if changed == 0 {
            tx.rollback()?;
            return Ok(None);
        }
        tx.execute(
            "INSERT INTO completion_history (actor_id, subject_id, completed_at) VALUES (?1, ?2, ?3)",
            params![user, subject.id, now_str],
        )?;
        tx.commit()?;

        self.get(actor, subject)
    }

    fn completed_ids(&self, actor: &Actor, kind: SubjectKind) -> Result<HashSet<i64>> {
        let user = self.user_key(actor)?;
        let mut stmt = self.conn.prepare(
            r#"
            SELECT subject_id
            FROM completions
            WHERE actor_id = ?1 AND kind = ?2 AND completion_count > 0
            "#,
        )?;
        let rows = stmt.query_map(params![user, kind.as_str()], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<HashSet<i64>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionCounter, CompletionOutcome};

    fn setup_db() -> Database {
        let db = Database::open(":memory:").expect("Failed to create in-memory database");
        db.init().expect("Failed to initialize database");
        db
    }

    fn at(minute: i64) -> DateTime<Utc> {
        parse_timestamp("2026-03-01T08:00:00Z").unwrap() + Duration::minutes(minute)
    }

    fn user(id: &str) -> Actor {
        Actor::User(id.to_string())
    }

    mod init_tests {
        use super::*;

        #[test]
        fn init_creates_tables() {
            let db = setup_db();
            for table in [
                "subjects",
                "prerequisites",
                "completions",
                "completion_history",
                "checklist_items",
                "checklist_checks",
            ] {
                let count: i64 = db
                    .conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                    .unwrap_or_else(|_| panic!("{} table should exist", table));
                assert_eq!(count, 0);
            }
        }

        #[test]
        fn init_is_idempotent() {
            let db = setup_db();
            db.add_subject(SubjectKind::Hack, "Cold Shower", None, None)
                .unwrap();

            db.init().expect("Re-init should succeed");

            assert_eq!(db.list_subjects(None).unwrap().len(), 1);
        }
    }

    mod timestamp_tests {
        use super::*;

        #[test]
        fn format_is_fixed_width_utc() {
            let a = format_timestamp(at(0));
            let b = format_timestamp(at(0) + Duration::microseconds(1));
            assert_eq!(a, "2026-03-01T08:00:00.000000Z");
            assert_eq!(a.len(), b.len());
            assert!(a < b);
        }

        #[test]
        fn parse_round_trips() {
            assert_eq!(parse_timestamp(&format_timestamp(at(7))).unwrap(), at(7));
        }

        #[test]
        fn parse_rejects_garbage() {
            assert!(matches!(
                parse_timestamp("yesterday"),
                Err(ProgressError::Timestamp(_))
            ));
        }
    }

    mod subject_tests {
        use super::*;

        #[test]
        fn add_subject_basic() {
            let db = setup_db();
            let id = db
                .add_subject(SubjectKind::Hack, "Box Breathing", Some("4-4-4-4"), None)
                .unwrap();
            assert!(id > 0);

            let subject = db.get_subject(id).unwrap().unwrap();
            assert_eq!(subject.name, "Box Breathing");
            assert_eq!(subject.slug, "box-breathing");
            assert_eq!(subject.kind, SubjectKind::Hack);
            assert_eq!(subject.description, Some("4-4-4-4".to_string()));
            assert!(subject.level_id.is_none());
        }

        #[test]
        fn add_subject_rejects_blank_name() {
            let db = setup_db();
            let result = db.add_subject(SubjectKind::Hack, "  !! ", None, None);
            assert!(matches!(result, Err(ProgressError::InvalidName(_))));
        }

        #[test]
        fn duplicate_slug_within_kind_fails() {
            let db = setup_db();
            db.add_subject(SubjectKind::Hack, "Grounding", None, None)
                .unwrap();
            assert!(db
                .add_subject(SubjectKind::Hack, "grounding", None, None)
                .is_err());
            // Same name is fine for another kind
            assert!(db
                .add_subject(SubjectKind::Routine, "Grounding", None, None)
                .is_ok());
        }

        #[test]
        fn level_membership() {
            let db = setup_db();
            let level = db
                .add_subject(SubjectKind::Level, "Foundations", None, None)
                .unwrap();
            let hack = db
                .add_subject(SubjectKind::Hack, "Sunlight", None, Some(level))
                .unwrap();
            db.add_subject(SubjectKind::Hack, "Elsewhere", None, None)
                .unwrap();

            let members = db.level_members(level).unwrap();
            assert_eq!(members.len(), 1);
            assert_eq!(members[0].id, hack);
        }

        #[test]
        fn level_must_be_a_level() {
            let db = setup_db();
            let hack = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            let result = db.add_subject(SubjectKind::Hack, "B", None, Some(hack));
            assert!(matches!(result, Err(ProgressError::KindNotFound { .. })));
        }

        #[test]
        fn list_subjects_filters_and_sorts() {
            let db = setup_db();
            db.add_subject(SubjectKind::Hack, "Zone 2", None, None).unwrap();
            db.add_subject(SubjectKind::Hack, "Ashwagandha", None, None)
                .unwrap();
            db.add_subject(SubjectKind::Routine, "Morning", None, None)
                .unwrap();

            let hacks = db.list_subjects(Some(SubjectKind::Hack)).unwrap();
            assert_eq!(hacks.len(), 2);
            assert_eq!(hacks[0].name, "Ashwagandha");
            assert_eq!(hacks[1].name, "Zone 2");

            assert_eq!(db.list_subjects(None).unwrap().len(), 3);
        }

        #[test]
        fn delete_subject_cascades_edges() {
            let db = setup_db();
            let a = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            let b = db.add_subject(SubjectKind::Hack, "B", None, None).unwrap();
            db.add_prerequisite(b, a).unwrap();

            assert!(db.delete_subject(b).unwrap());
            assert!(db.prerequisite_edges(SubjectKind::Hack).unwrap().is_empty());
            assert!(!db.delete_subject(b).unwrap());
        }

        #[test]
        fn deleting_a_requirement_leaves_a_dangling_edge() {
            let db = setup_db();
            let a = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            let b = db.add_subject(SubjectKind::Hack, "B", None, None).unwrap();
            db.add_prerequisite(b, a).unwrap();

            db.delete_subject(a).unwrap();

            let edges = db.prerequisite_edges(SubjectKind::Hack).unwrap();
            assert_eq!(edges, vec![PrerequisiteEdge::new(b, a)]);
        }
    }

    mod prerequisite_tests {
        use super::*;

        #[test]
        fn add_and_remove() {
            let db = setup_db();
            let a = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            let b = db.add_subject(SubjectKind::Hack, "B", None, None).unwrap();

            assert!(db.add_prerequisite(b, a).unwrap());
            assert!(!db.add_prerequisite(b, a).unwrap(), "duplicate is ignored");
            assert_eq!(
                db.prerequisite_edges(SubjectKind::Hack).unwrap(),
                vec![PrerequisiteEdge::new(b, a)]
            );

            assert!(db.remove_prerequisite(b, a).unwrap());
            assert!(!db.remove_prerequisite(b, a).unwrap());
        }

        #[test]
        fn rejects_self_and_cross_kind_edges() {
            let db = setup_db();
            let hack = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            let routine = db
                .add_subject(SubjectKind::Routine, "R", None, None)
                .unwrap();

            assert!(matches!(
                db.add_prerequisite(hack, hack),
                Err(ProgressError::SelfPrerequisite(_))
            ));
            assert!(matches!(
                db.add_prerequisite(hack, routine),
                Err(ProgressError::KindMismatch { .. })
            ));
            assert!(matches!(
                db.add_prerequisite(hack, 999),
                Err(ProgressError::SubjectNotFound(999))
            ));
        }

        #[test]
        fn cycles_are_allowed_to_be_stored() {
            let db = setup_db();
            let a = db.add_subject(SubjectKind::Level, "A", None, None).unwrap();
            let b = db.add_subject(SubjectKind::Level, "B", None, None).unwrap();
            db.add_prerequisite(a, b).unwrap();
            db.add_prerequisite(b, a).unwrap();
            assert_eq!(db.prerequisite_edges(SubjectKind::Level).unwrap().len(), 2);
        }

        #[test]
        fn edges_are_scoped_by_kind() {
            let db = setup_db();
            let a = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            let b = db.add_subject(SubjectKind::Hack, "B", None, None).unwrap();
            db.add_prerequisite(b, a).unwrap();
            assert!(db.prerequisite_edges(SubjectKind::Routine).unwrap().is_empty());
        }
    }

    mod completion_store_tests {
        use super::*;

        #[test]
        fn first_completion_creates_record() {
            let db = setup_db();
            let hack = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            let subject = SubjectRef::new(SubjectKind::Hack, hack);

            let record = db
                .record_if_cooled(&user("u1"), subject, at(0), Duration::minutes(30))
                .unwrap()
                .unwrap();
            assert_eq!(record.completion_count, 1);
            assert_eq!(record.last_completed_at, Some(at(0)));
            assert_eq!(record.completed_at, Some(at(0)));
        }

        #[test]
        fn cooldown_rejects_inside_window() {
            let db = setup_db();
            let hack = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            let subject = SubjectRef::new(SubjectKind::Hack, hack);
            let window = Duration::minutes(30);

            db.record_if_cooled(&user("u1"), subject, at(0), window).unwrap();
            assert!(db
                .record_if_cooled(&user("u1"), subject, at(29), window)
                .unwrap()
                .is_none());

            let record = db
                .record_if_cooled(&user("u1"), subject, at(30), window)
                .unwrap()
                .unwrap();
            assert_eq!(record.completion_count, 2);
            assert_eq!(record.last_completed_at, Some(at(30)));
            assert_eq!(record.completed_at, Some(at(0)), "first completion is kept");
        }

        #[test]
        fn history_only_counts_accepted_completions() {
            let db = setup_db();
            let hack = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            let subject = SubjectRef::new(SubjectKind::Hack, hack);
            let window = Duration::minutes(30);

            for minute in [0, 5, 10, 40, 41] {
                db.record_if_cooled(&user("u1"), subject, at(minute), window)
                    .unwrap();
            }
            assert_eq!(db.total_completions(&user("u1")).unwrap(), 2);
            assert_eq!(db.total_completions(&user("u2")).unwrap(), 0);
        }

        #[test]
        fn completed_ids_by_kind() {
            let db = setup_db();
            let hack = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            let routine = db
                .add_subject(SubjectKind::Routine, "R", None, None)
                .unwrap();
            let window = Duration::minutes(30);
            db.record_if_cooled(&user("u1"), SubjectRef::new(SubjectKind::Hack, hack), at(0), window)
                .unwrap();
            db.record_if_cooled(
                &user("u1"),
                SubjectRef::new(SubjectKind::Routine, routine),
                at(0),
                window,
            )
            .unwrap();

            let hacks = db.completed_ids(&user("u1"), SubjectKind::Hack).unwrap();
            assert_eq!(hacks, HashSet::from([hack]));
            assert!(db
                .completed_ids(&user("u2"), SubjectKind::Hack)
                .unwrap()
                .is_empty());
        }

        #[test]
        fn anonymous_actor_is_rejected() {
            let db = setup_db();
            let result = db.get(&Actor::Anonymous, SubjectRef::new(SubjectKind::Hack, 1));
            assert!(matches!(result, Err(ProgressError::ActorMismatch { .. })));
        }

        #[test]
        fn counter_over_database() {
            let db = setup_db();
            let hack = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            let subject = SubjectRef::new(SubjectKind::Hack, hack);
            let counter = CompletionCounter::new(&db);

            counter.record_completion(&user("u1"), subject, at(0)).unwrap();
            assert_eq!(
                counter.record_completion(&user("u1"), subject, at(10)).unwrap(),
                CompletionOutcome::CoolingDown {
                    remaining_minutes: 20
                }
            );
            assert_eq!(counter.completion_count(&user("u1"), subject).unwrap(), 1);
        }
    }

    mod merge_tests {
        use super::*;

        fn record(subject_id: i64, count: u32, last: Option<DateTime<Utc>>) -> CompletionRecord {
            CompletionRecord {
                actor_id: "local".to_string(),
                subject_id,
                completion_count: count,
                last_completed_at: last,
                completed_at: None,
            }
        }

        #[test]
        fn merge_into_empty_account() {
            let db = setup_db();
            let count = db
                .merge_completion(
                    &user("u1"),
                    SubjectRef::new(SubjectKind::Hack, 5),
                    &record(5, 3, Some(at(10))),
                )
                .unwrap();
            assert_eq!(count, 3);

            let stored = db
                .get(&user("u1"), SubjectRef::new(SubjectKind::Hack, 5))
                .unwrap()
                .unwrap();
            assert_eq!(stored.last_completed_at, Some(at(10)));
            assert_eq!(stored.completed_at, Some(at(10)));
        }

        #[test]
        fn merge_keeps_larger_count_and_later_time() {
            let db = setup_db();
            let hack = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            let subject = SubjectRef::new(SubjectKind::Hack, hack);
            let window = Duration::minutes(30);
            for minute in [0, 60, 120, 180] {
                db.record_if_cooled(&user("u1"), subject, at(minute), window)
                    .unwrap();
            }

            let count = db
                .merge_completion(&user("u1"), subject, &record(hack, 2, Some(at(300))))
                .unwrap();
            assert_eq!(count, 4, "count never goes down");
            assert_eq!(db.total_completions(&user("u1")).unwrap(), 4);

            let stored = db.get(&user("u1"), subject).unwrap().unwrap();
            assert_eq!(stored.last_completed_at, Some(at(300)));
            assert_eq!(stored.completed_at, Some(at(0)));
        }

        #[test]
        fn merged_completions_are_logged() {
            let db = setup_db();
            let hack = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            let subject = SubjectRef::new(SubjectKind::Hack, hack);
            db.record_if_cooled(&user("u1"), subject, at(0), Duration::minutes(30))
                .unwrap();

            db.merge_completion(&user("u1"), subject, &record(hack, 5, Some(at(90))))
                .unwrap();
            assert_eq!(db.total_completions(&user("u1")).unwrap(), 5);

            // Merging the same device record again adds nothing.
            db.merge_completion(&user("u1"), subject, &record(hack, 5, Some(at(90))))
                .unwrap();
            assert_eq!(db.total_completions(&user("u1")).unwrap(), 5);
        }

        #[test]
        fn completion_survives_subject_deletion() {
            let db = setup_db();
            let hack = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            db.record_if_cooled(
                &user("u1"),
                SubjectRef::new(SubjectKind::Hack, hack),
                at(0),
                Duration::minutes(30),
            )
            .unwrap();
            db.delete_subject(hack).unwrap();

            let hacks = db.completed_ids(&user("u1"), SubjectKind::Hack).unwrap();
            assert_eq!(hacks, HashSet::from([hack]));
        }
    }

    mod checklist_tests {
        use super::*;

        #[test]
        fn items_are_ordered_and_checked_per_user() {
            let db = setup_db();
            let hack = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            let first = db.add_checklist_item(hack, "Find a quiet spot").unwrap();
            let second = db.add_checklist_item(hack, "Set a 4 second count").unwrap();

            db.set_checked(second, "u1", true, at(0)).unwrap();

            let items = db.checklist(hack, "u1").unwrap();
            assert_eq!(items.len(), 2);
            assert_eq!(items[0].id, first);
            assert_eq!(items[0].position, 1);
            assert!(!items[0].checked);
            assert!(items[1].checked);

            assert!(db.checklist(hack, "u2").unwrap().iter().all(|i| !i.checked));
        }

        #[test]
        fn uncheck_and_recheck() {
            let db = setup_db();
            let hack = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            let item = db.add_checklist_item(hack, "Step").unwrap();

            assert_eq!(db.set_checked(item, "u1", true, at(0)).unwrap(), hack);
            db.set_checked(item, "u1", true, at(1)).unwrap();
            db.set_checked(item, "u1", false, at(2)).unwrap();
            assert!(!db.checklist(hack, "u1").unwrap()[0].checked);
        }

        #[test]
        fn unknown_item_and_blank_title() {
            let db = setup_db();
            let hack = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            assert!(matches!(
                db.set_checked(42, "u1", true, at(0)),
                Err(ProgressError::ChecklistItemNotFound(42))
            ));
            assert!(matches!(
                db.add_checklist_item(hack, "   "),
                Err(ProgressError::InvalidName(_))
            ));
        }
    }
}
