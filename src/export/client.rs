//! Client-side export strategy
//!
//! Executes the unmodified query, pulls every row over the client
//! connection, and encodes CSV locally. Works against any reachable
//! database with read privilege only: no `FILE` grant, no engine-local
//! filesystem access. The artifact is written through a temporary file
//! in the destination directory and persisted atomically, so a crashed
//! export never leaves a partial artifact under the final name.

use super::headers;
use crate::config::{DatabaseConfig, ExportConfig};
use crate::csv::CsvEncoder;
use crate::error::{ExportError, Result};
use crate::export::{ExportArtifact, Exporter, connect, unique_artifact_path};
use crate::query_source::QueryDefinition;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Connection, Executor, Row, Statement};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Exporter that pulls rows over the client connection
pub struct ClientSideExporter {
    db: DatabaseConfig,
    export: ExportConfig,
}

impl ClientSideExporter {
    /// Create the exporter from configuration
    pub fn new(db: DatabaseConfig, export: ExportConfig) -> Self {
        Self { db, export }
    }

    /// Preferred header derivation: column metadata from a zero-row
    /// execution of the wrapped query
    async fn header_names(
        &self,
        conn: &mut sqlx::MySqlConnection,
        query: &QueryDefinition,
    ) -> Option<Vec<String>> {
        if !self.export.csv.headers {
            return None;
        }
        let wrapped = headers::zero_limit_wrapper(&query.body);
        match conn.prepare(wrapped.as_str()).await {
            Ok(statement) => Some(
                statement
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect(),
            ),
            Err(e) => {
                tracing::debug!(
                    query = %query.name,
                    error = %e,
                    "column metadata unavailable, trying text fallback"
                );
                match headers::header_names_from_sql(&query.body) {
                    Some(names) => Some(names),
                    None => {
                        // Recoverable degradation: the file ships without
                        // a header rather than failing the item.
                        tracing::warn!(
                            query = %query.name,
                            "no header could be derived, exporting without one"
                        );
                        None
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Exporter for ClientSideExporter {
    async fn export(&self, query: &QueryDefinition) -> Result<ExportArtifact> {
        tokio::fs::create_dir_all(&self.export.work_dir).await?;
        let (target, remote_name) = unique_artifact_path(&self.export.work_dir, &query.name);

        let mut conn = connect(&self.db).await?;
        let header = self.header_names(&mut conn, query).await;

        let rows = match sqlx::query(&query.body).fetch_all(&mut conn).await {
            Ok(rows) => rows,
            Err(e) => {
                conn.close().await.ok();
                return Err(ExportError::QueryExecutionFailed {
                    name: query.name.clone(),
                    detail: e.to_string(),
                }
                .into());
            }
        };
        conn.close().await.ok();

        let values = rows_to_values(&rows)?;
        let encoder = CsvEncoder::new(self.export.csv);
        persist_artifact(
            &self.export.work_dir,
            &target,
            &encoder,
            header.as_deref(),
            &values,
        )?;

        tracing::info!(
            query = %query.name,
            artifact = %target.display(),
            rows = values.len(),
            "client-side export complete"
        );
        Ok(ExportArtifact {
            path: target,
            remote_name,
        })
    }
}

/// Render every row to positional nullable text values
fn rows_to_values(rows: &[MySqlRow]) -> Result<Vec<Vec<Option<String>>>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(row.len());
        for idx in 0..row.len() {
            values.push(render_value(row, idx)?);
        }
        out.push(values);
    }
    Ok(out)
}

/// Render one column value as its textual representation
///
/// The wire protocol types values, so decoding walks a ladder from the
/// most common representations down to raw bytes. `NULL` survives as
/// `None` at every rung.
fn render_value(row: &MySqlRow, idx: usize) -> Result<Option<String>> {
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return Ok(v);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return Ok(v.map(|n| n.to_string()));
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return Ok(v.map(|n| n.to_string()));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return Ok(v.map(|n| n.to_string()));
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return Ok(v.map(|n| n.to_string()));
    }
    if let Ok(v) = row.try_get::<Option<rust_decimal::Decimal>, _>(idx) {
        return Ok(v.map(|n| n.to_string()));
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return Ok(v.map(|b| (b as i32).to_string()));
    }
    if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
        return Ok(v.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()));
    }
    if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
        return Ok(v.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()));
    }
    if let Ok(v) = row.try_get::<Option<NaiveDate>, _>(idx) {
        return Ok(v.map(|t| t.format("%Y-%m-%d").to_string()));
    }
    if let Ok(v) = row.try_get::<Option<NaiveTime>, _>(idx) {
        return Ok(v.map(|t| t.format("%H:%M:%S").to_string()));
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return Ok(v.map(|b| String::from_utf8_lossy(&b).into_owned()));
    }

    let column = row.column(idx).name().to_string();
    Err(sqlx::Error::ColumnDecode {
        index: column,
        source: "no textual representation for column type".into(),
    }
    .into())
}

/// Write the artifact through a same-directory temporary file and
/// persist it atomically to `target`
fn persist_artifact(
    work_dir: &Path,
    target: &Path,
    encoder: &CsvEncoder,
    header: Option<&[String]>,
    rows: &[Vec<Option<String>>],
) -> Result<()> {
    let mut temp = NamedTempFile::new_in(work_dir).map_err(|e| ExportError::WriteFailed {
        path: target.to_path_buf(),
        detail: e.to_string(),
    })?;

    if let Some(names) = header {
        temp.write_all(&encoder.encode_header(names)?)
            .map_err(|e| ExportError::WriteFailed {
                path: target.to_path_buf(),
                detail: e.to_string(),
            })?;
    }
    for row in rows {
        temp.write_all(&encoder.encode_row(row)?)
            .map_err(|e| ExportError::WriteFailed {
                path: target.to_path_buf(),
                detail: e.to_string(),
            })?;
    }
    temp.flush().map_err(|e| ExportError::WriteFailed {
        path: target.to_path_buf(),
        detail: e.to_string(),
    })?;

    temp.persist(target).map_err(|e| ExportError::WriteFailed {
        path: target.to_path_buf(),
        detail: e.error.to_string(),
    })?;
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv::CsvFormat;
    use tempfile::TempDir;

    fn encoder() -> CsvEncoder {
        CsvEncoder::new(CsvFormat::default())
    }

    #[test]
    fn persist_writes_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("orders.csv");

        let header = vec!["id".to_string(), "name".to_string()];
        let rows = vec![
            vec![Some("1".to_string()), Some("Alice".to_string())],
            vec![Some("2".to_string()), Some("Bob, Jr.".to_string())],
        ];
        persist_artifact(dir.path(), &target, &encoder(), Some(&header), &rows).unwrap();

        let content = std::fs::read_to_string(&target).unwrap();
        assert_eq!(content, "\"id\",\"name\"\n\"1\",\"Alice\"\n\"2\",\"Bob, Jr.\"\n");
    }

    #[test]
    fn persist_without_header_writes_rows_only() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("bare.csv");

        let rows = vec![vec![Some("x".to_string()), None]];
        persist_artifact(dir.path(), &target, &encoder(), None, &rows).unwrap();

        let content = std::fs::read_to_string(&target).unwrap();
        assert_eq!(content, "\"x\",\"\"\n");
    }

    #[test]
    fn persist_leaves_no_temporary_behind() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("clean.csv");

        persist_artifact(dir.path(), &target, &encoder(), None, &[]).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["clean.csv"]);
    }

    #[test]
    fn persist_replaces_newer_content_atomically() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("replace.csv");
        std::fs::write(&target, "old").unwrap();

        let rows = vec![vec![Some("new".to_string())]];
        persist_artifact(dir.path(), &target, &encoder(), None, &rows).unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "\"new\"\n");
    }

    #[test]
    fn empty_result_set_produces_header_only_artifact() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("empty.csv");

        let header = vec!["id".to_string()];
        persist_artifact(dir.path(), &target, &encoder(), Some(&header), &[]).unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "\"id\"\n");
    }
}
