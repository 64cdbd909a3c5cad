// 🗄️ Selection audit log - every selection event as a row in SQLite
//
// Audit trail only: the ledger itself is never persisted. Rows are
// append-only; replaying a cell's rows in order reproduces its selection
// history.

use crate::error::{ReconError, Result};
use crate::period::Period;
use crate::resolver::{SelectionEvent, SelectionSink};
use rusqlite::{params, Connection};
use std::path::Path;

const EVENT_TYPE: &str = "observation_selected";
const ENTITY_TYPE: &str = "cell";

pub struct SqliteAuditLog {
    conn: Connection,
    actor: String,
}

impl SqliteAuditLog {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        // WAL keeps the log readable while a session is writing
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_audit_tables(&conn)?;
        Ok(SqliteAuditLog {
            conn,
            actor: "user".to_string(),
        })
    }

    /// Name recorded as the actor of subsequent events
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn insert_event(&self, event: &SelectionEvent) -> Result<()> {
        let data_json = serde_json::to_string(event)?;

        self.conn.execute(
            "INSERT INTO events (
                event_id, timestamp, event_type, entity_type, entity_id, project_id, data, actor
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.event_id,
                event.timestamp.to_rfc3339(),
                EVENT_TYPE,
                ENTITY_TYPE,
                cell_entity_id(&event.metric_key, &event.period),
                event.project_id,
                data_json,
                self.actor,
            ],
        )?;

        Ok(())
    }

    /// Selection history of one cell within one project, oldest first.
    /// `None` addresses selections made outside any project.
    pub fn events_for_cell(
        &self,
        project_id: Option<&str>,
        metric_key: &str,
        period: &Period,
    ) -> Result<Vec<SelectionEvent>> {
        // IS matches NULL against NULL
        let mut stmt = self.conn.prepare(
            "SELECT data FROM events
             WHERE entity_type = ?1 AND entity_id = ?2 AND project_id IS ?3
             ORDER BY id ASC",
        )?;

        let rows = stmt
            .query_map(
                params![ENTITY_TYPE, cell_entity_id(metric_key, period), project_id],
                |row| row.get::<_, String>(0),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(ReconError::from))
            .collect()
    }

    pub fn count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl SelectionSink for SqliteAuditLog {
    fn record(&mut self, event: &SelectionEvent) -> Result<()> {
        self.insert_event(event)
    }
}

fn cell_entity_id(metric_key: &str, period: &Period) -> String {
    format!("{}@{}", metric_key, period.label())
}

pub fn setup_audit_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            project_id TEXT,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    migrate_add_project_id(conn)?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id, project_id)",
        [],
    )?;

    Ok(())
}

/// Logs written before selections were project-scoped lack the column;
/// their rows read back as project-less.
fn migrate_add_project_id(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(events)")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if !columns.iter().any(|name| name == "project_id") {
        conn.execute("ALTER TABLE events ADD COLUMN project_id TEXT", [])?;
        conn.execute("DROP INDEX IF EXISTS idx_events_entity", [])?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MetricLedger;
    use crate::merge::merge_batch;
    use crate::observation::Observation;
    use crate::resolver::ConflictResolver;

    fn p(year: i32, month: u8) -> Period {
        Period::new(year, month).unwrap()
    }

    #[test]
    fn test_resolver_writes_through_sink() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("audit.db");

        let mut ledger = MetricLedger::new();
        merge_batch(
            &mut ledger,
            "Revenue",
            "Revenue",
            p(2024, 1),
            vec![
                Observation::new(Some(1000.0), "10-K", "u1"),
                Observation::new(Some(1200.0), "Investor Deck", "u2"),
            ],
        );

        let mut resolver = ConflictResolver::new()
            .with_sink(SqliteAuditLog::open(&db_path).unwrap().with_actor("analyst"));
        resolver.select_observation(&mut ledger, "Revenue", p(2024, 1), 1).unwrap();
        resolver.select_observation(&mut ledger, "Revenue", p(2024, 1), 0).unwrap();
        // No-op and failed selections never reach the log
        resolver.select_observation(&mut ledger, "Revenue", p(2024, 1), 0).unwrap();
        assert!(resolver.select_observation(&mut ledger, "Revenue", p(2024, 1), 9).is_err());

        let reader = SqliteAuditLog::open(&db_path).unwrap();
        let history = reader.events_for_cell(None, "Revenue", &p(2024, 1)).unwrap();
        let indexes: Vec<usize> = history.iter().map(|e| e.index).collect();
        assert_eq!(indexes, vec![1, 0]);
        assert_eq!(history[0].value, Some(1200.0));
    }

    #[test]
    fn test_events_for_cell_round_trip() {
        let mut ledger = MetricLedger::new();
        merge_batch(
            &mut ledger,
            "Revenue",
            "Revenue",
            p(2024, 1),
            vec![
                Observation::new(Some(1000.0), "10-K", "u1"),
                Observation::new(Some(1200.0), "Investor Deck", "u2"),
            ],
        );
        let mut resolver = ConflictResolver::new();
        let first = resolver
            .select_observation(&mut ledger, "Revenue", p(2024, 1), 1)
            .unwrap()
            .event()
            .cloned()
            .unwrap();
        let second = resolver
            .select_observation(&mut ledger, "Revenue", p(2024, 1), 0)
            .unwrap()
            .event()
            .cloned()
            .unwrap();

        let mut log = SqliteAuditLog::open_in_memory().unwrap();
        log.record(&first).unwrap();
        log.record(&second).unwrap();

        let history = log.events_for_cell(None, "Revenue", &p(2024, 1)).unwrap();
        assert_eq!(history, vec![first, second]);
        assert!(log.events_for_cell(None, "Revenue", &p(2023, 1)).unwrap().is_empty());
        assert_eq!(log.count().unwrap(), 2);
    }

    #[test]
    fn test_duplicate_event_id_rejected() {
        let mut ledger = MetricLedger::new();
        merge_batch(&mut ledger, "Revenue", "Revenue", p(2024, 1), vec![Observation::new(Some(1.0), "A", "u")]);
        let event = ConflictResolver::new()
            .select_observation(&mut ledger, "Revenue", p(2024, 1), 0)
            .unwrap()
            .event()
            .cloned()
            .unwrap();

        let log = SqliteAuditLog::open_in_memory().unwrap();
        log.insert_event(&event).unwrap();
        assert!(log.insert_event(&event).is_err());
    }

    #[test]
    fn test_history_is_scoped_to_project() {
        let mut ledger = MetricLedger::new();
        merge_batch(
            &mut ledger,
            "Revenue",
            "Revenue",
            p(2024, 1),
            vec![Observation::new(Some(1.0), "A", "u1"), Observation::new(Some(2.0), "B", "u2")],
        );

        let mut resolver = ConflictResolver::new();
        resolver.set_project(Some("acme".to_string()));
        let event = resolver
            .select_observation(&mut ledger, "Revenue", p(2024, 1), 1)
            .unwrap()
            .event()
            .cloned()
            .unwrap();

        let log = SqliteAuditLog::open_in_memory().unwrap();
        log.insert_event(&event).unwrap();

        assert_eq!(log.events_for_cell(Some("acme"), "Revenue", &p(2024, 1)).unwrap(), vec![event]);
        assert!(log.events_for_cell(Some("globex"), "Revenue", &p(2024, 1)).unwrap().is_empty());
        assert!(log.events_for_cell(None, "Revenue", &p(2024, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_migrates_log_without_project_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT UNIQUE NOT NULL,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                data TEXT NOT NULL,
                actor TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )
        .unwrap();

        let log = SqliteAuditLog::from_connection(conn).unwrap();
        assert_eq!(log.count().unwrap(), 0);
        assert!(log.events_for_cell(None, "Revenue", &p(2024, 1)).unwrap().is_empty());
    }
}
