//! SQLite 会话图谱
//!
//! 表结构：`sessions`（Session 节点）+ `nodes`（Step / SummaryStep，`next_key` 即 NEXT 边）。
//! 每个 trait 方法一个事务；replace_window 的四个子步骤在同一事务内提交，失败则整体回滚。

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::core::AgentError;
use crate::memory::graph::{
    walk_chain, ChainNode, GraphStats, NodeKey, SessionGraphStore, StatsScope, StepRecord,
    SummaryRecord,
};

const LABEL_STEP: &str = "Step";
const LABEL_SUMMARY: &str = "SummaryStep";

pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    /// 打开（或创建）数据库文件；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AgentError::GraphWriteFailure(format!("create {}: {}", parent.display(), e)))?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, AgentError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), AgentError> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS sessions (
              id TEXT PRIMARY KEY,
              created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS nodes (
              session_id TEXT NOT NULL REFERENCES sessions(id),
              node_key TEXT NOT NULL,
              label TEXT NOT NULL,
              step_number INTEGER,
              start_step INTEGER,
              end_step INTEGER,
              action_type TEXT,
              description TEXT,
              summary TEXT,
              timestamp TEXT NOT NULL,
              next_key TEXT,
              PRIMARY KEY (session_id, node_key)
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_step ON nodes(session_id, label, step_number);
            CREATE INDEX IF NOT EXISTS idx_nodes_next ON nodes(session_id, next_key);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, AgentError> {
        self.conn
            .lock()
            .map_err(|_| AgentError::GraphWriteFailure("sqlite connection lock poisoned".to_string()))
    }
}

const NODE_COLS: &str =
    "label, step_number, start_step, end_step, action_type, description, summary, timestamp, next_key";

/// 按 NODE_COLS 顺序解析一行
fn parse_node_row(row: &Row) -> rusqlite::Result<(ChainNode, Option<String>)> {
    let label: String = row.get(0)?;
    let timestamp: DateTime<Utc> = row.get(7)?;
    let next_key: Option<String> = row.get(8)?;
    let node = if label == LABEL_SUMMARY {
        ChainNode::Summary(SummaryRecord {
            start_step: row.get::<_, i64>(2)? as u64,
            end_step: row.get::<_, i64>(3)? as u64,
            summary: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            timestamp,
        })
    } else {
        ChainNode::Step(StepRecord {
            step_number: row.get::<_, i64>(1)? as u64,
            action_type: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            description: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            timestamp,
        })
    };
    Ok((node, next_key))
}

fn parse_next(next: Option<String>) -> Result<Option<NodeKey>, AgentError> {
    next.map(|k| k.parse::<NodeKey>()).transpose()
}

impl SessionGraphStore for SqliteGraphStore {
    fn append_step(&self, session_id: &str, step: &StepRecord) -> Result<(), AgentError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO sessions(id, created_at) VALUES (?1, ?2)",
            params![session_id, Utc::now()],
        )?;
        let head: Option<String> = tx
            .query_row(
                "SELECT node_key FROM nodes WHERE session_id = ?1 AND next_key IS NULL LIMIT 1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        let key = NodeKey::Step(step.step_number).to_string();
        tx.execute(
            r#"
            INSERT INTO nodes(session_id, node_key, label, step_number, action_type, description, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                session_id,
                key,
                LABEL_STEP,
                step.step_number as i64,
                step.action_type,
                step.description,
                step.timestamp
            ],
        )?;
        if let Some(head) = head {
            tx.execute(
                "UPDATE nodes SET next_key = ?1 WHERE session_id = ?2 AND node_key = ?3",
                params![key, session_id, head],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn steps_in_range(&self, session_id: &str, start: u64, end: u64) -> Result<Vec<StepRecord>, AgentError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {NODE_COLS} FROM nodes \
             WHERE session_id = ?1 AND label = ?2 AND step_number BETWEEN ?3 AND ?4 \
             ORDER BY step_number"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![session_id, LABEL_STEP, start as i64, end as i64],
            parse_node_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            if let (ChainNode::Step(s), _) = row? {
                out.push(s);
            }
        }
        Ok(out)
    }

    fn replace_window(&self, session_id: &str, summary: &SummaryRecord) -> Result<bool, AgentError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let bounds: Option<(i64, i64)> = tx
            .query_row(
                "SELECT MIN(step_number), MAX(step_number) FROM nodes \
                 WHERE session_id = ?1 AND label = ?2 AND step_number BETWEEN ?3 AND ?4",
                params![session_id, LABEL_STEP, summary.start_step as i64, summary.end_step as i64],
                |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<i64>>(1)?)),
            )
            .map(|(min, max)| min.zip(max))?;
        let Some((first, last)) = bounds else {
            return Ok(false);
        };
        let first_key = NodeKey::Step(first as u64).to_string();
        let last_key = NodeKey::Step(last as u64).to_string();
        let summary_key = NodeKey::Summary {
            start: summary.start_step,
            end: summary.end_step,
        }
        .to_string();

        let successor: Option<String> = tx.query_row(
            "SELECT next_key FROM nodes WHERE session_id = ?1 AND node_key = ?2",
            params![session_id, last_key],
            |row| row.get(0),
        )?;

        // (a)(b) SummaryStep 节点，归属会话即 HAS_SUMMARY
        tx.execute(
            r#"
            INSERT INTO nodes(session_id, node_key, label, start_step, end_step, summary, timestamp, next_key)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                session_id,
                summary_key,
                LABEL_SUMMARY,
                summary.start_step as i64,
                summary.end_step as i64,
                summary.summary,
                summary.timestamp,
                successor
            ],
        )?;
        // (c) 指向窗口首步的 NEXT 改指摘要
        tx.execute(
            "UPDATE nodes SET next_key = ?1 WHERE session_id = ?2 AND next_key = ?3",
            params![summary_key, session_id, first_key],
        )?;
        // (d) 删除窗口内的 Step
        tx.execute(
            "DELETE FROM nodes WHERE session_id = ?1 AND label = ?2 AND step_number BETWEEN ?3 AND ?4",
            params![session_id, LABEL_STEP, summary.start_step as i64, summary.end_step as i64],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn chain(&self, session_id: &str) -> Result<Vec<ChainNode>, AgentError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {NODE_COLS} FROM nodes WHERE session_id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![session_id], parse_node_row)?;
        let mut nodes = Vec::new();
        for row in rows {
            let (node, next) = row?;
            nodes.push((node, parse_next(next)?));
        }
        walk_chain(nodes)
    }

    fn summaries(&self, session_id: &str) -> Result<Vec<SummaryRecord>, AgentError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {NODE_COLS} FROM nodes WHERE session_id = ?1 AND label = ?2 ORDER BY start_step"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![session_id, LABEL_SUMMARY], parse_node_row)?;
        let mut out = Vec::new();
        for row in rows {
            if let (ChainNode::Summary(s), _) = row? {
                out.push(s);
            }
        }
        Ok(out)
    }

    fn stats(&self, scope: StatsScope<'_>) -> Result<GraphStats, AgentError> {
        let conn = self.lock()?;
        let (sessions, nodes, next_edges): (i64, i64, i64) = match scope {
            StatsScope::Session(id) => conn.query_row(
                "SELECT (SELECT COUNT(*) FROM sessions WHERE id = ?1), \
                        (SELECT COUNT(*) FROM nodes WHERE session_id = ?1), \
                        (SELECT COUNT(*) FROM nodes WHERE session_id = ?1 AND next_key IS NOT NULL)",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?,
            StatsScope::Global => conn.query_row(
                "SELECT (SELECT COUNT(*) FROM sessions), \
                        (SELECT COUNT(*) FROM nodes), \
                        (SELECT COUNT(*) FROM nodes WHERE next_key IS NOT NULL)",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?,
        };
        Ok(GraphStats {
            node_count: (sessions + nodes) as u64,
            relationship_count: (nodes + next_edges) as u64,
        })
    }
}
