//! SQLite-based persistence store

use crate::persistence::{
    ExecutionStatus, ExecutionSummary, PersistenceBackend, StageRecordRow, StageRowStatus,
};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS executions (
        id TEXT PRIMARY KEY,
        workflow_name TEXT NOT NULL,
        message TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        progress REAL NOT NULL DEFAULT 0.0,
        completed_stages INTEGER NOT NULL DEFAULT 0,
        failed_stages INTEGER NOT NULL DEFAULT 0,
        skipped_stages INTEGER NOT NULL DEFAULT 0,
        total_stages INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_workflow_name ON executions(workflow_name)",
    "CREATE INDEX IF NOT EXISTS idx_started_at ON executions(started_at)",
    r#"
    CREATE TABLE IF NOT EXISTS stage_records (
        execution_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        stage TEXT NOT NULL,
        group_name TEXT,
        status TEXT NOT NULL,
        output TEXT,
        structured TEXT,
        error TEXT,
        started_at TEXT,
        completed_at TEXT,
        PRIMARY KEY (execution_id, position)
    )
    "#,
];

const SUMMARY_COLUMNS: &str = "id, workflow_name, message, status, started_at, completed_at, \
     progress, completed_stages, failed_stages, skipped_stages, total_stages";

/// SQLite execution store
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    /// Open (creating if needed) the database at `db_path`; `:memory:` is supported
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))
            .context("Invalid database path")?
            .create_if_missing(true);

        // Every connection to :memory: is a separate database
        let max_connections = if db_path == ":memory:" { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Open the database at a filesystem path, creating parent directories
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let db_path = path
            .to_str()
            .with_context(|| format!("Non UTF-8 database path: {}", path.display()))?;
        Self::new(db_path).await
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        Self::open(&Self::default_path()).await
    }

    /// `<data dir>/agent-workflow/executions.db`
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("agent-workflow")
            .join("executions.db")
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to initialize schema")?;
        }
        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn row_to_summary(row: &SqliteRow) -> Result<ExecutionSummary> {
        Ok(ExecutionSummary {
            execution_id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
            workflow_name: row.try_get("workflow_name")?,
            message: row.try_get("message")?,
            status: ExecutionStatus::parse(&row.try_get::<String, _>("status")?),
            started_at: Self::from_naive(row.try_get("started_at")?),
            completed_at: row
                .try_get::<Option<NaiveDateTime>, _>("completed_at")?
                .map(Self::from_naive),
            progress: row.try_get("progress")?,
            completed_stages: row.try_get::<i64, _>("completed_stages")? as usize,
            failed_stages: row.try_get::<i64, _>("failed_stages")? as usize,
            skipped_stages: row.try_get::<i64, _>("skipped_stages")? as usize,
            total_stages: row.try_get::<i64, _>("total_stages")? as usize,
        })
    }

    fn row_to_stage(row: &SqliteRow) -> Result<StageRecordRow> {
        let status: String = row.try_get("status")?;
        let structured = row
            .try_get::<Option<String>, _>("structured")?
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .context("Corrupt structured content")?;

        Ok(StageRecordRow {
            execution_id: Uuid::parse_str(&row.try_get::<String, _>("execution_id")?)?,
            position: row.try_get::<i64, _>("position")? as usize,
            stage: row.try_get("stage")?,
            group: row.try_get("group_name")?,
            status: StageRowStatus::parse(&status)
                .with_context(|| format!("Unknown stage status '{}'", status))?,
            output: row.try_get("output")?,
            structured,
            error: row.try_get("error")?,
            started_at: row
                .try_get::<Option<NaiveDateTime>, _>("started_at")?
                .map(Self::from_naive),
            completed_at: row
                .try_get::<Option<NaiveDateTime>, _>("completed_at")?
                .map(Self::from_naive),
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteExecutionStore {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO executions
            (id, workflow_name, message, status, started_at, completed_at, progress,
             completed_stages, failed_stages, skipped_stages, total_stages)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(execution.execution_id.to_string())
        .bind(&execution.workflow_name)
        .bind(&execution.message)
        .bind(execution.status.as_str())
        .bind(Self::to_naive(execution.started_at))
        .bind(execution.completed_at.map(Self::to_naive))
        .bind(execution.progress)
        .bind(execution.completed_stages as i64)
        .bind(execution.failed_stages as i64)
        .bind(execution.skipped_stages as i64)
        .bind(execution.total_stages as i64)
        .execute(&self.pool)
        .await
        .context("Failed to save execution")?;

        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM executions WHERE id = ?1",
            SUMMARY_COLUMNS
        ))
        .bind(execution_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load execution")?;

        row.as_ref().map(Self::row_to_summary).transpose()
    }

    async fn save_stage_records(
        &self,
        execution_id: Uuid,
        records: &[StageRecordRow],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM stage_records WHERE execution_id = ?1")
            .bind(execution_id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to clear stage records")?;

        for record in records {
            let structured = record
                .structured
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            sqlx::query(
                r#"
                INSERT INTO stage_records
                (execution_id, position, stage, group_name, status, output, structured,
                 error, started_at, completed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )
            .bind(execution_id.to_string())
            .bind(record.position as i64)
            .bind(&record.stage)
            .bind(&record.group)
            .bind(record.status.as_str())
            .bind(&record.output)
            .bind(structured)
            .bind(&record.error)
            .bind(record.started_at.map(Self::to_naive))
            .bind(record.completed_at.map(Self::to_naive))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to save stage record '{}'", record.stage))?;
        }

        tx.commit().await.context("Failed to commit stage records")?;
        Ok(())
    }

    async fn load_stage_records(&self, execution_id: Uuid) -> Result<Vec<StageRecordRow>> {
        let rows = sqlx::query(
            r#"
            SELECT execution_id, position, stage, group_name, status, output, structured,
                   error, started_at, completed_at
            FROM stage_records
            WHERE execution_id = ?1
            ORDER BY position ASC
            "#,
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load stage records")?;

        rows.iter().map(Self::row_to_stage).collect()
    }

    async fn list_executions(&self, workflow_name: &str) -> Result<Vec<ExecutionSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM executions WHERE workflow_name = ?1 ORDER BY started_at DESC",
            SUMMARY_COLUMNS
        ))
        .bind(workflow_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list executions")?;

        rows.iter().map(Self::row_to_summary).collect()
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT workflow_name
            FROM executions
            ORDER BY workflow_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list workflows")?;

        let mut names = Vec::with_capacity(rows.len());
        for row in &rows {
            names.push(row.try_get::<String, _>("workflow_name")?);
        }
        Ok(names)
    }
}
