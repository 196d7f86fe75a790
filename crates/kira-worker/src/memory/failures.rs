//! Failure-pattern memory, ported from
//! `original_source/src/kira/memory/failures.py`'s `FailureLearning`.
//!
//! Reuses the `tokio_rusqlite::Connection` pattern already established in
//! `kira-db::store`: one `conn.call(move |conn| ...)` closure per operation.

use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_rusqlite::Connection;

#[derive(Debug, Error)]
pub enum FailureMemoryError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("sqlite: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, FailureMemoryError>;

#[derive(Debug, Clone)]
pub struct FailurePattern {
    pub id: i64,
    pub error_type: String,
    pub error_message: String,
    pub context: String,
    pub solution: String,
    pub task_keywords: Vec<String>,
    pub file_patterns: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub occurrence_count: i64,
    pub last_occurred: DateTime<Utc>,
}

impl FailurePattern {
    /// Weighted relevance score against a candidate task/file set: 0.4
    /// keyword overlap + 0.3 file-extension overlap + 0.3 error-type-name
    /// bonus, capped at 1.0, matching the original's `matches_context`.
    pub fn matches_context(&self, task: &str, files: &[String]) -> f64 {
        let task_lower = task.to_lowercase();
        let mut score = 0.0;

        if !self.task_keywords.is_empty() {
            let matching = self
                .task_keywords
                .iter()
                .filter(|kw| task_lower.contains(kw.as_str()))
                .count();
            score += 0.4 * (matching as f64 / self.task_keywords.len() as f64);
        }

        if !files.is_empty() && !self.file_patterns.is_empty() {
            let matching = self
                .file_patterns
                .iter()
                .filter(|fp| files.iter().any(|f| f.contains(fp.as_str())))
                .count();
            score += 0.3 * (matching as f64 / self.file_patterns.len() as f64);
        }

        if task_lower.contains(&self.error_type.to_lowercase()) {
            score += 0.3;
        }

        score.min(1.0)
    }

    pub fn to_warning(&self) -> String {
        let message: String = self.error_message.chars().take(100).collect();
        let solution: String = self.solution.chars().take(150).collect();
        format!("Known Issue ({}): {message}\n   Solution: {solution}", self.error_type)
    }
}

/// SQLite-backed store for recorded failure patterns, keyed by a truncated
/// `Sha256` content hash of `(error_type, error_message[..100])` — the
/// original uses MD5, purely as a dedup hash rather than for any
/// cryptographic property, so this uses the crate already present
/// throughout this workspace's stack instead of adding an MD5 dependency.
#[derive(Clone)]
pub struct FailureLearning {
    conn: Connection,
}

impl FailureLearning {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path).await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    /// Default location: `~/.kira/failures.db`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| Path::new(".").to_path_buf())
            .join(".kira")
            .join("failures.db")
    }

    async fn init_schema(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "PRAGMA journal_mode=WAL;
                     CREATE TABLE IF NOT EXISTS failures (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        error_hash TEXT UNIQUE NOT NULL,
                        error_type TEXT NOT NULL,
                        error_message TEXT NOT NULL,
                        context TEXT NOT NULL DEFAULT '',
                        solution TEXT NOT NULL DEFAULT '',
                        task_keywords TEXT NOT NULL DEFAULT '[]',
                        file_patterns TEXT NOT NULL DEFAULT '[]',
                        created_at TEXT NOT NULL,
                        occurrence_count INTEGER NOT NULL DEFAULT 1,
                        last_occurred TEXT NOT NULL
                     );
                     CREATE INDEX IF NOT EXISTS idx_failures_type ON failures(error_type);",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    fn error_hash(error_type: &str, error_message: &str) -> String {
        let truncated: String = error_message.chars().take(100).collect();
        let mut hasher = Sha256::new();
        hasher.update(format!("{error_type}:{truncated}").as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub async fn record_failure(
        &self,
        error_type: String,
        error_message: String,
        context: String,
        solution: String,
        task: String,
        files: Vec<String>,
    ) -> Result<FailurePattern> {
        let hash = Self::error_hash(&error_type, &error_message);
        let keywords = extract_keywords(&task);
        let mut extensions: Vec<String> = files
            .iter()
            .filter_map(|f| Path::new(f).extension().map(|e| format!(".{}", e.to_string_lossy())))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        extensions.sort();

        let now = Utc::now();
        let keywords_json = serde_json::to_string(&keywords).unwrap_or_else(|_| "[]".to_string());
        let patterns_json = serde_json::to_string(&extensions).unwrap_or_else(|_| "[]".to_string());

        let pattern = self
            .conn
            .call(move |conn| {
                let existing: Option<(i64, i64)> = conn
                    .query_row(
                        "SELECT id, occurrence_count FROM failures WHERE error_hash = ?1",
                        [&hash],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .ok();

                if let Some((id, count)) = existing {
                    conn.execute(
                        "UPDATE failures SET occurrence_count = occurrence_count + 1,
                            last_occurred = ?1,
                            solution = CASE WHEN ?2 != '' THEN ?2 ELSE solution END
                         WHERE id = ?3",
                        rusqlite::params![now.to_rfc3339(), solution, id],
                    )?;
                    Ok(FailurePattern {
                        id,
                        error_type,
                        error_message,
                        context,
                        solution,
                        task_keywords: keywords,
                        file_patterns: extensions,
                        created_at: now,
                        occurrence_count: count + 1,
                        last_occurred: now,
                    })
                } else {
                    conn.execute(
                        "INSERT INTO failures
                            (error_hash, error_type, error_message, context, solution,
                             task_keywords, file_patterns, created_at, last_occurred)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                        rusqlite::params![
                            hash,
                            error_type,
                            error_message,
                            context,
                            solution,
                            keywords_json,
                            patterns_json,
                            now.to_rfc3339(),
                        ],
                    )?;
                    let id = conn.last_insert_rowid();
                    Ok(FailurePattern {
                        id,
                        error_type,
                        error_message,
                        context,
                        solution,
                        task_keywords: keywords,
                        file_patterns: extensions,
                        created_at: now,
                        occurrence_count: 1,
                        last_occurred: now,
                    })
                }
            })
            .await?;

        Ok(pattern)
    }

    pub async fn get_relevant_warnings(
        &self,
        task: String,
        files: Vec<String>,
        min_score: f64,
        limit: usize,
    ) -> Result<Vec<FailurePattern>> {
        let rows: Vec<FailurePattern> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, error_type, error_message, context, solution,
                            task_keywords, file_patterns, created_at, occurrence_count, last_occurred
                     FROM failures
                     WHERE solution != ''
                     ORDER BY occurrence_count DESC, last_occurred DESC
                     LIMIT 50",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        let keywords_json: String = row.get(5)?;
                        let patterns_json: String = row.get(6)?;
                        let created_at: String = row.get(7)?;
                        let last_occurred: String = row.get(9)?;
                        Ok(FailurePattern {
                            id: row.get(0)?,
                            error_type: row.get(1)?,
                            error_message: row.get(2)?,
                            context: row.get(3)?,
                            solution: row.get(4)?,
                            task_keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
                            file_patterns: serde_json::from_str(&patterns_json).unwrap_or_default(),
                            created_at: created_at
                                .parse()
                                .unwrap_or_else(|_| Utc::now()),
                            occurrence_count: row.get(8)?,
                            last_occurred: last_occurred
                                .parse()
                                .unwrap_or_else(|_| Utc::now()),
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut scored: Vec<(f64, FailurePattern)> = rows
            .into_iter()
            .map(|p| {
                let score = p.matches_context(&task, &files);
                (score, p)
            })
            .filter(|(score, _)| *score >= min_score)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(limit).map(|(_, p)| p).collect())
    }

    /// Render the top matches as a `## Known Pitfalls` block for prompt
    /// injection; empty string if nothing relevant was found.
    pub async fn get_context_string(
        &self,
        task: String,
        files: Vec<String>,
        max_warnings: usize,
    ) -> Result<String> {
        let warnings = self
            .get_relevant_warnings(task, files, 0.3, max_warnings)
            .await?;
        if warnings.is_empty() {
            return Ok(String::new());
        }
        let mut lines = vec!["## Known Pitfalls (learn from past mistakes)\n".to_string()];
        for pattern in &warnings {
            lines.push(pattern.to_warning());
            lines.push(String::new());
        }
        Ok(lines.join("\n"))
    }
}

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should", "may", "might", "must", "shall", "can", "need", "please", "i",
    "you", "we", "they", "it", "this", "that", "these", "those",
];

fn extract_keywords(task: &str) -> Vec<String> {
    let re = Regex::new(r"\b[a-z]+\b").expect("valid regex");
    let lower = task.to_lowercase();
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for word in re.find_iter(&lower) {
        let w = word.as_str();
        if w.len() > 2 && !STOP_WORDS.contains(&w) && seen.insert(w.to_string()) {
            unique.push(w.to_string());
        }
        if unique.len() == 10 {
            break;
        }
    }
    unique
}

/// Error-type detection from raw agent output, via the same pattern table as
/// the original's `ERROR_PATTERNS`.
pub fn detect_error_type(output: &str) -> Option<&'static str> {
    const TABLE: &[(&str, &[&str])] = &[
        ("SyntaxError", &["SyntaxError:", "syntax error", "unexpected token"]),
        ("ImportError", &["ImportError:", "ModuleNotFoundError:", "No module named"]),
        ("TypeError", &["TypeError:", "not callable", "NoneType"]),
        ("AttributeError", &["AttributeError:", "has no attribute"]),
        ("ValueError", &["ValueError:", "invalid literal", "could not convert"]),
        ("KeyError", &["KeyError:"]),
        ("IndexError", &["IndexError:", "list index out of range"]),
        ("FileNotFoundError", &["FileNotFoundError:", "No such file or directory"]),
        ("TestFailure", &["FAILED", "AssertionError:", "test failed"]),
        ("RuntimeError", &["RuntimeError:", "maximum recursion"]),
    ];
    let lower = output.to_lowercase();
    for (error_type, patterns) in TABLE {
        if patterns.iter().any(|p| lower.contains(&p.to_lowercase())) {
            return Some(error_type);
        }
    }
    None
}

pub fn extract_error_message(output: &str, error_type: &str) -> String {
    for (i, line) in output.lines().enumerate() {
        if line.contains(error_type) {
            let mut msg = line.trim().to_string();
            if let Some(next) = output.lines().nth(i + 1) {
                if !next.trim().is_empty() {
                    msg.push(' ');
                    msg.push_str(next.trim());
                }
            }
            return msg.chars().take(200).collect();
        }
    }
    output.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_and_recall_failure() {
        let store = FailureLearning::open_in_memory().await.unwrap();
        store
            .record_failure(
                "ImportError".to_string(),
                "No module named 'requests'".to_string(),
                "running pip install step".to_string(),
                "pin requests in requirements.txt".to_string(),
                "fix the import error in the requests client module".to_string(),
                vec!["client.py".to_string()],
            )
            .await
            .unwrap();

        let warnings = store
            .get_relevant_warnings(
                "fix import error in requests client".to_string(),
                vec!["client.py".to_string()],
                0.1,
                3,
            )
            .await
            .unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].occurrence_count, 1);
    }

    #[tokio::test]
    async fn repeated_failure_increments_occurrence_count() {
        let store = FailureLearning::open_in_memory().await.unwrap();
        for _ in 0..3 {
            store
                .record_failure(
                    "TypeError".to_string(),
                    "NoneType is not callable".to_string(),
                    "ctx".to_string(),
                    "check for None before calling".to_string(),
                    "type error in handler".to_string(),
                    vec![],
                )
                .await
                .unwrap();
        }
        let warnings = store
            .get_relevant_warnings("type error in handler".to_string(), vec![], 0.1, 1)
            .await
            .unwrap();
        assert_eq!(warnings[0].occurrence_count, 3);
    }

    #[tokio::test]
    async fn context_string_empty_when_nothing_relevant() {
        let store = FailureLearning::open_in_memory().await.unwrap();
        let ctx = store
            .get_context_string("totally unrelated task".to_string(), vec![], 3)
            .await
            .unwrap();
        assert!(ctx.is_empty());
    }

    #[test]
    fn detect_error_type_matches_import_error() {
        assert_eq!(
            detect_error_type("Traceback...\nImportError: No module named foo"),
            Some("ImportError")
        );
    }

    #[test]
    fn detect_error_type_none_when_unmatched() {
        assert_eq!(detect_error_type("all good here"), None);
    }
}
