//! SQLite storage backend for factgraph

use super::traits::{EmbeddingStats, FactStore, OpenStore, StorageError, StorageResult};
use crate::graph::{
    Corpus, CorpusId, EmbeddingInfo, EmbeddingStatus, Fact, FactId, FactLink, FactSummary,
    ProjectId, EMBEDDING_ERROR_KEY, EMBEDDING_FAILED_AT_KEY,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const FACT_COLUMNS: &str = "id, corpus_id, statement, context, state, basis_id, metadata_json, \
     embedding_status, last_embedded_at, embedding_model, embedding_version, created_at, updated_at";

const SUMMARY_COLUMNS: &str = "id, corpus_id, statement, state, context, basis_id";

/// SQL predicate selecting facts that carry an embeddable statement
const HAS_STATEMENT: &str = "statement IS NOT NULL AND trim(statement) <> ''";

/// SQLite-backed fact store
///
/// Uses a single database file with tables for corpora, facts and links.
/// Thread-safe via internal mutex on the connection.
///
/// The schema repeats the structural rules the graph engine validates
/// (context/basis compatibility, basis placement, link corpus/context
/// matching) as CHECK constraints and triggers, so rows written around the
/// engine still cannot break the graph.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// Raw fact columns as read from a row
struct FactRow {
    id: String,
    corpus_id: String,
    statement: Option<String>,
    context: String,
    state: String,
    basis_id: Option<String>,
    metadata_json: String,
    embedding_status: String,
    last_embedded_at: Option<String>,
    embedding_model: Option<String>,
    embedding_version: Option<String>,
    created_at: String,
    updated_at: String,
}

impl FactRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            corpus_id: row.get(1)?,
            statement: row.get(2)?,
            context: row.get(3)?,
            state: row.get(4)?,
            basis_id: row.get(5)?,
            metadata_json: row.get(6)?,
            embedding_status: row.get(7)?,
            last_embedded_at: row.get(8)?,
            embedding_model: row.get(9)?,
            embedding_version: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_fact(self) -> StorageResult<Fact> {
        Ok(Fact {
            id: self.id.parse()?,
            corpus_id: self.corpus_id.parse()?,
            statement: self.statement,
            context: self.context.parse()?,
            state: self.state.parse()?,
            basis_id: self.basis_id.map(|s| s.parse()).transpose()?,
            metadata: serde_json::from_str(&self.metadata_json)?,
            embedding: EmbeddingInfo {
                status: self.embedding_status.parse()?,
                last_embedded_at: self.last_embedded_at.as_deref().map(parse_ts).transpose()?,
                model: self.embedding_model,
                version: self.embedding_version,
            },
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

/// Raw summary columns as read from a row
struct SummaryRow {
    id: String,
    corpus_id: String,
    statement: Option<String>,
    state: String,
    context: String,
    basis_id: Option<String>,
}

impl SummaryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            corpus_id: row.get(1)?,
            statement: row.get(2)?,
            state: row.get(3)?,
            context: row.get(4)?,
            basis_id: row.get(5)?,
        })
    }

    fn into_summary(self) -> StorageResult<FactSummary> {
        Ok(FactSummary {
            id: self.id.parse()?,
            corpus_id: self.corpus_id.parse()?,
            statement: self.statement,
            state: self.state.parse()?,
            context: self.context.parse()?,
            basis_id: self.basis_id.map(|s| s.parse()).transpose()?,
        })
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering
fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::DateParse(e.to_string()))
}

/// `?1, ?2, ..., ?n`
fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- Enable WAL mode for concurrent reads during writes
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS corpora (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                name TEXT NOT NULL,
                basis_corpus_id TEXT REFERENCES corpora(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL,
                CHECK (basis_corpus_id IS NULL OR basis_corpus_id <> id)
            );

            CREATE INDEX IF NOT EXISTS idx_corpora_project
                ON corpora(project_id);

            CREATE TABLE IF NOT EXISTS facts (
                id TEXT PRIMARY KEY,
                corpus_id TEXT NOT NULL REFERENCES corpora(id) ON DELETE CASCADE,
                statement TEXT,
                context TEXT NOT NULL
                    CHECK (context IN ('global', 'builder', 'knowledge')),
                state TEXT NOT NULL
                    CHECK (state IN ('clarify', 'conflict', 'ready', 'rejected', 'confirmed')),
                basis_id TEXT REFERENCES facts(id) ON DELETE SET NULL,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                embedding_status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (embedding_status IN ('pending', 'embedded', 'failed')),
                last_embedded_at TEXT,
                embedding_model TEXT,
                embedding_version TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_facts_corpus
                ON facts(corpus_id);
            CREATE INDEX IF NOT EXISTS idx_facts_basis
                ON facts(basis_id);
            CREATE INDEX IF NOT EXISTS idx_facts_embedding_status
                ON facts(embedding_status, created_at);

            -- Links are stored once, smaller id first
            CREATE TABLE IF NOT EXISTS fact_links (
                fact_a TEXT NOT NULL REFERENCES facts(id) ON DELETE CASCADE,
                fact_b TEXT NOT NULL REFERENCES facts(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                PRIMARY KEY (fact_a, fact_b),
                CHECK (fact_a < fact_b)
            );

            CREATE INDEX IF NOT EXISTS idx_fact_links_b
                ON fact_links(fact_b);
            "#,
        )?;

        Self::create_triggers(conn)?;
        Ok(())
    }

    /// Store-level enforcement of the graph rules
    fn create_triggers(conn: &Connection) -> StorageResult<()> {
        const BASIS_GUARD_BODY: &str = r#"
            SELECT RAISE(ABORT, 'fact cannot be its own basis')
                WHERE NEW.basis_id = NEW.id;
            SELECT RAISE(ABORT, 'context forbids basis')
                WHERE NEW.context <> 'knowledge';
            SELECT RAISE(ABORT, 'no parent corpus to derive from')
                WHERE (SELECT basis_corpus_id FROM corpora WHERE id = NEW.corpus_id) IS NULL;
            SELECT RAISE(ABORT, 'basis must be a knowledge fact in the same corpus or the parent corpus')
                WHERE NOT EXISTS (
                    SELECT 1 FROM facts b, corpora c
                    WHERE b.id = NEW.basis_id
                      AND c.id = NEW.corpus_id
                      AND b.context = 'knowledge'
                      AND (b.corpus_id = c.basis_corpus_id OR b.corpus_id = NEW.corpus_id)
                );
        "#;

        conn.execute_batch(&format!(
            r#"
            CREATE TRIGGER IF NOT EXISTS facts_basis_guard_insert
            BEFORE INSERT ON facts
            WHEN NEW.basis_id IS NOT NULL
            BEGIN {body} END;

            CREATE TRIGGER IF NOT EXISTS facts_basis_guard_update
            BEFORE UPDATE OF basis_id, context, corpus_id ON facts
            WHEN NEW.basis_id IS NOT NULL
            BEGIN {body} END;

            CREATE TRIGGER IF NOT EXISTS facts_relocation_drops_links
            AFTER UPDATE OF corpus_id, context ON facts
            WHEN NEW.corpus_id IS NOT OLD.corpus_id OR NEW.context IS NOT OLD.context
            BEGIN
                DELETE FROM fact_links WHERE fact_a = NEW.id OR fact_b = NEW.id;
            END;

            CREATE TRIGGER IF NOT EXISTS fact_links_guard
            BEFORE INSERT ON fact_links
            BEGIN
                SELECT RAISE(ABORT, 'fact cannot link to itself')
                    WHERE NEW.fact_a = NEW.fact_b;
                SELECT RAISE(ABORT, 'linked facts must share corpus and context')
                    WHERE NOT EXISTS (
                        SELECT 1 FROM facts a, facts b
                        WHERE a.id = NEW.fact_a
                          AND b.id = NEW.fact_b
                          AND a.corpus_id = b.corpus_id
                          AND a.context = b.context
                    );
                SELECT RAISE(ABORT, 'facts are already linked')
                    WHERE EXISTS (
                        SELECT 1 FROM fact_links
                        WHERE (fact_a = NEW.fact_a AND fact_b = NEW.fact_b)
                           OR (fact_a = NEW.fact_b AND fact_b = NEW.fact_a)
                    );
            END;
            "#,
            body = BASIS_GUARD_BODY
        ))?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn row_to_corpus(
        id: String,
        project_id: String,
        name: String,
        basis_corpus_id: Option<String>,
        created_at: String,
    ) -> StorageResult<Corpus> {
        Ok(Corpus {
            id: id.parse()?,
            project_id: project_id.parse::<ProjectId>()?,
            name,
            basis_corpus_id: basis_corpus_id.map(|s| s.parse()).transpose()?,
            created_at: parse_ts(&created_at)?,
        })
    }

    fn query_facts(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StorageResult<Vec<Fact>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, FactRow::from_row)?;
        let mut facts = Vec::new();
        for row in rows {
            facts.push(row?.into_fact()?);
        }
        Ok(facts)
    }

    fn fact_params(fact: &Fact) -> StorageResult<[Box<dyn rusqlite::ToSql>; 13]> {
        Ok([
            Box::new(fact.id.to_string()),
            Box::new(fact.corpus_id.to_string()),
            Box::new(fact.statement.clone()),
            Box::new(fact.context.as_str()),
            Box::new(fact.state.as_str()),
            Box::new(fact.basis_id.map(|id| id.to_string())),
            Box::new(serde_json::to_string(&fact.metadata)?),
            Box::new(fact.embedding.status.as_str()),
            Box::new(fact.embedding.last_embedded_at.as_ref().map(ts)),
            Box::new(fact.embedding.model.clone()),
            Box::new(fact.embedding.version.clone()),
            Box::new(ts(&fact.created_at)),
            Box::new(ts(&fact.updated_at)),
        ])
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl FactStore for SqliteStore {
    // === Corpus Operations ===

    fn save_corpus(&self, corpus: &Corpus) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO corpora (id, project_id, name, basis_corpus_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                basis_corpus_id = excluded.basis_corpus_id
            "#,
            params![
                corpus.id.to_string(),
                corpus.project_id.to_string(),
                corpus.name,
                corpus.basis_corpus_id.map(|id| id.to_string()),
                ts(&corpus.created_at),
            ],
        )?;
        Ok(())
    }

    fn load_corpus(&self, id: &CorpusId) -> StorageResult<Option<Corpus>> {
        let conn = self.conn()?;
        let row: Option<(String, String, String, Option<String>, String)> = conn
            .query_row(
                "SELECT id, project_id, name, basis_corpus_id, created_at FROM corpora WHERE id = ?1",
                params![id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        match row {
            Some((id, project_id, name, basis, created_at)) => {
                Ok(Some(Self::row_to_corpus(id, project_id, name, basis, created_at)?))
            }
            None => Ok(None),
        }
    }

    fn list_corpora(&self, project_id: Option<&ProjectId>) -> StorageResult<Vec<Corpus>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, basis_corpus_id, created_at FROM corpora
             WHERE ?1 IS NULL OR project_id = ?1
             ORDER BY created_at, name",
        )?;
        let rows = stmt.query_map(params![project_id.map(|p| p.to_string())], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut corpora = Vec::new();
        for row in rows {
            let (id, project_id, name, basis, created_at) = row?;
            corpora.push(Self::row_to_corpus(id, project_id, name, basis, created_at)?);
        }
        Ok(corpora)
    }

    fn delete_corpus(&self, id: &CorpusId) -> StorageResult<Vec<FactId>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let removed = {
            let mut stmt = tx.prepare("SELECT id FROM facts WHERE corpus_id = ?1")?;
            let ids = stmt
                .query_map(params![id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids.into_iter()
                .map(|s| s.parse::<FactId>().map_err(StorageError::from))
                .collect::<StorageResult<Vec<_>>>()?
        };

        // Children losing their parent lose every basis with it
        tx.execute(
            "UPDATE facts SET basis_id = NULL, updated_at = ?2
             WHERE basis_id IS NOT NULL
               AND corpus_id IN (SELECT id FROM corpora WHERE basis_corpus_id = ?1)",
            params![id.to_string(), ts(&Utc::now())],
        )?;
        tx.execute("DELETE FROM corpora WHERE id = ?1", params![id.to_string()])?;
        tx.commit()?;
        Ok(removed)
    }

    fn clear_bases_into(&self, corpus_id: &CorpusId, basis_corpus_id: &CorpusId) -> StorageResult<usize> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE facts SET basis_id = NULL, updated_at = ?3
             WHERE corpus_id = ?1
               AND basis_id IN (SELECT id FROM facts WHERE corpus_id = ?2)",
            params![corpus_id.to_string(), basis_corpus_id.to_string(), ts(&Utc::now())],
        )?;
        Ok(rows)
    }

    fn clear_bases_in(&self, corpus_id: &CorpusId) -> StorageResult<usize> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE facts SET basis_id = NULL, updated_at = ?2
             WHERE corpus_id = ?1 AND basis_id IS NOT NULL",
            params![corpus_id.to_string(), ts(&Utc::now())],
        )?;
        Ok(rows)
    }

    // === Fact Operations ===

    fn insert_fact(&self, fact: &Fact) -> StorageResult<()> {
        let conn = self.conn()?;
        let values = Self::fact_params(fact)?;
        conn.execute(
            &format!(
                "INSERT INTO facts ({}) VALUES ({})",
                FACT_COLUMNS,
                placeholders(values.len())
            ),
            params_from_iter(values.iter().map(|v| v.as_ref())),
        )?;
        Ok(())
    }

    fn update_fact(&self, fact: &Fact) -> StorageResult<()> {
        let conn = self.conn()?;
        let values = Self::fact_params(fact)?;
        conn.execute(
            r#"
            UPDATE facts SET
                corpus_id = ?2,
                statement = ?3,
                context = ?4,
                state = ?5,
                basis_id = ?6,
                metadata_json = ?7,
                embedding_status = ?8,
                last_embedded_at = ?9,
                embedding_model = ?10,
                embedding_version = ?11,
                updated_at = ?13
            WHERE id = ?1
            "#,
            params_from_iter(values.iter().map(|v| v.as_ref())),
        )?;
        Ok(())
    }

    fn load_fact(&self, id: &FactId) -> StorageResult<Option<Fact>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM facts WHERE id = ?1", FACT_COLUMNS),
                params![id.to_string()],
                FactRow::from_row,
            )
            .optional()?;
        row.map(FactRow::into_fact).transpose()
    }

    fn load_facts(&self, ids: &[FactId]) -> StorageResult<Vec<Fact>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        Self::query_facts(
            &conn,
            &format!(
                "SELECT {} FROM facts WHERE id IN ({})",
                FACT_COLUMNS,
                placeholders(ids.len())
            ),
            params_from_iter(ids.iter().map(|id| id.to_string())),
        )
    }

    fn load_summary(&self, id: &FactId) -> StorageResult<Option<FactSummary>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM facts WHERE id = ?1", SUMMARY_COLUMNS),
                params![id.to_string()],
                SummaryRow::from_row,
            )
            .optional()?;
        row.map(SummaryRow::into_summary).transpose()
    }

    fn load_summaries(&self, ids: &[FactId]) -> StorageResult<Vec<FactSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM facts WHERE id IN ({})",
            SUMMARY_COLUMNS,
            placeholders(ids.len())
        ))?;
        let rows = stmt.query_map(
            params_from_iter(ids.iter().map(|id| id.to_string())),
            SummaryRow::from_row,
        )?;
        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?.into_summary()?);
        }
        Ok(summaries)
    }

    fn delete_fact(&self, id: &FactId) -> StorageResult<bool> {
        let conn = self.conn()?;
        // Links cascade, dependents' basis_id is set to NULL by the foreign key
        let rows = conn.execute("DELETE FROM facts WHERE id = ?1", params![id.to_string()])?;
        Ok(rows > 0)
    }

    fn clear_dependent_bases(&self, id: &FactId) -> StorageResult<usize> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE facts SET basis_id = NULL, updated_at = ?2 WHERE basis_id = ?1",
            params![id.to_string(), ts(&Utc::now())],
        )?;
        Ok(rows)
    }

    // === Link Operations ===

    fn insert_link(&self, link: &FactLink) -> StorageResult<()> {
        let conn = self.conn()?;
        let (a, b) = link.ids();
        conn.execute(
            "INSERT INTO fact_links (fact_a, fact_b, created_at) VALUES (?1, ?2, ?3)",
            params![a.to_string(), b.to_string(), ts(&link.created_at)],
        )?;
        Ok(())
    }

    fn delete_link(&self, a: &FactId, b: &FactId) -> StorageResult<bool> {
        let conn = self.conn()?;
        let (low, high) = FactLink::canonical(*a, *b);
        let rows = conn.execute(
            "DELETE FROM fact_links WHERE fact_a = ?1 AND fact_b = ?2",
            params![low.to_string(), high.to_string()],
        )?;
        Ok(rows > 0)
    }

    fn link_exists(&self, a: &FactId, b: &FactId) -> StorageResult<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS (
                SELECT 1 FROM fact_links
                WHERE (fact_a = ?1 AND fact_b = ?2) OR (fact_a = ?2 AND fact_b = ?1)
             )",
            params![a.to_string(), b.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn links_for(&self, ids: &[FactId]) -> StorageResult<Vec<FactLink>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let marks = placeholders(ids.len());
        let mut stmt = conn.prepare(&format!(
            "SELECT fact_a, fact_b, created_at FROM fact_links
             WHERE fact_a IN ({marks}) OR fact_b IN ({marks})
             ORDER BY created_at"
        ))?;
        let rows = stmt.query_map(params_from_iter(ids.iter().map(|id| id.to_string())), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut links = Vec::new();
        for row in rows {
            let (a, b, created_at) = row?;
            links.push(FactLink::from_parts(a.parse()?, b.parse()?, parse_ts(&created_at)?));
        }
        Ok(links)
    }

    fn delete_links_for(&self, id: &FactId) -> StorageResult<usize> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM fact_links WHERE fact_a = ?1 OR fact_b = ?1",
            params![id.to_string()],
        )?;
        Ok(rows)
    }

    // === Embedding State ===

    fn facts_with_status(&self, status: EmbeddingStatus, limit: usize) -> StorageResult<Vec<Fact>> {
        let order = match status {
            EmbeddingStatus::Pending => "created_at",
            EmbeddingStatus::Embedded | EmbeddingStatus::Failed => "updated_at",
        };
        let conn = self.conn()?;
        Self::query_facts(
            &conn,
            &format!(
                "SELECT {} FROM facts
                 WHERE embedding_status = ?1 AND {}
                 ORDER BY {}, rowid
                 LIMIT ?2",
                FACT_COLUMNS, HAS_STATEMENT, order
            ),
            params![status.as_str(), limit as i64],
        )
    }

    fn mark_embedded(
        &self,
        id: &FactId,
        at: DateTime<Utc>,
        model: &str,
        version: &str,
    ) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "UPDATE facts SET
                    embedding_status = 'embedded',
                    last_embedded_at = ?2,
                    embedding_model = ?3,
                    embedding_version = ?4,
                    metadata_json = json_remove(metadata_json, '$.{}', '$.{}')
                 WHERE id = ?1",
                EMBEDDING_ERROR_KEY, EMBEDDING_FAILED_AT_KEY
            ),
            params![id.to_string(), ts(&at), model, version],
        )?;
        Ok(())
    }

    fn mark_failed(&self, id: &FactId, error: &str, at: DateTime<Utc>) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "UPDATE facts SET
                    embedding_status = 'failed',
                    metadata_json = json_set(metadata_json, '$.{}', ?2, '$.{}', ?3),
                    updated_at = ?3
                 WHERE id = ?1",
                EMBEDDING_ERROR_KEY, EMBEDDING_FAILED_AT_KEY
            ),
            params![id.to_string(), error, ts(&at)],
        )?;
        Ok(())
    }

    fn mark_pending(&self, id: &FactId) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE facts SET embedding_status = 'pending', updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), ts(&Utc::now())],
        )?;
        Ok(())
    }

    fn embedding_stats(&self) -> StorageResult<EmbeddingStats> {
        let conn = self.conn()?;
        let (total, embedded, pending, failed): (i64, i64, i64, i64) = conn.query_row(
            &format!(
                "SELECT
                    COUNT(*),
                    COALESCE(SUM(embedding_status = 'embedded'), 0),
                    COALESCE(SUM(embedding_status = 'pending'), 0),
                    COALESCE(SUM(embedding_status = 'failed'), 0)
                 FROM facts WHERE {}",
                HAS_STATEMENT
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        Ok(EmbeddingStats {
            total: total as u64,
            embedded: embedded as u64,
            pending: pending as u64,
            failed: failed as u64,
        })
    }
}
