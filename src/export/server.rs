//! Server-side export strategy
//!
//! Appends an `INTO OUTFILE` clause (built from the CSV format) to the
//! cleaned query body and lets the engine write the artifact itself. The
//! engine refuses to overwrite an existing path and writes no header
//! row, so the strategy removes stale artifacts up front and, when
//! headers are enabled, prepends a literal header select with
//! `UNION ALL`.

use super::headers;
use crate::config::{DatabaseConfig, ExportConfig};
use crate::csv::CsvFormat;
use crate::error::{Error, ExportError, Result};
use crate::export::{ExportArtifact, Exporter, connect, unique_artifact_path};
use crate::query_source::QueryDefinition;
use async_trait::async_trait;
use sqlx::{Column, Connection, Executor, Statement};
use std::path::{Path, PathBuf};

/// Builder for the engine's export clause
///
/// Renders the `INTO OUTFILE` directive from a [`CsvFormat`]: fields
/// terminated by the delimiter, enclosed by the quote character, escaped
/// by the same character (doubled-quote escaping), lines terminated by
/// the record terminator, UTF-8 (4-byte-safe) encoding.
#[derive(Debug, Clone)]
pub struct OutfileClause {
    path: PathBuf,
    format: CsvFormat,
}

impl OutfileClause {
    /// Create a clause writing to `path` with the given format
    pub fn new(path: impl Into<PathBuf>, format: CsvFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    /// Render the SQL clause
    pub fn build(&self) -> String {
        let mut sql = String::new();
        sql.push_str("INTO OUTFILE ");
        sql.push_str(&sql_string(&self.path.to_string_lossy()));
        sql.push_str("\nCHARACTER SET utf8mb4");
        sql.push_str("\nFIELDS TERMINATED BY ");
        sql.push_str(&sql_char(self.format.delimiter));
        sql.push_str(" ENCLOSED BY ");
        sql.push_str(&sql_char(self.format.quote));
        sql.push_str(" ESCAPED BY ");
        sql.push_str(&sql_char(self.format.quote));
        sql.push_str("\nLINES TERMINATED BY ");
        sql.push_str(&sql_char(self.format.terminator));
        sql
    }
}

/// Render a string as a single-quoted SQL literal
fn sql_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Render a single character as a SQL literal, escaping control characters
fn sql_char(c: char) -> String {
    match c {
        '\n' => "'\\n'".to_string(),
        '\r' => "'\\r'".to_string(),
        '\t' => "'\\t'".to_string(),
        _ => sql_string(&c.to_string()),
    }
}

/// Assemble the full export statement
///
/// With a header the user's body is wrapped in a derived table so the
/// literal header select can be prepended with `UNION ALL`; the engine
/// emits rows in statement order, header first.
fn build_export_statement(body: &str, header: Option<&[String]>, clause: &OutfileClause) -> String {
    match header {
        Some(names) => {
            let literals: Vec<String> = names.iter().map(|n| sql_string(n)).collect();
            format!(
                "SELECT {}\nUNION ALL\nSELECT * FROM ({body}) AS export_rows\n{}",
                literals.join(", "),
                clause.build()
            )
        }
        None => format!("{body}\n{}", clause.build()),
    }
}

/// Exporter that directs the engine to write the artifact server-side
pub struct ServerSideExporter {
    db: DatabaseConfig,
    export: ExportConfig,
    work_dir: PathBuf,
}

impl ServerSideExporter {
    /// Create the exporter from configuration
    pub fn new(db: DatabaseConfig, export: ExportConfig) -> Self {
        let work_dir = export.work_dir.clone();
        Self {
            db,
            export,
            work_dir,
        }
    }

    async fn header_names(&self, query: &QueryDefinition) -> Option<Vec<String>> {
        if !self.export.csv.headers {
            return None;
        }
        match self.describe_columns(&query.body).await {
            Ok(names) => Some(names),
            Err(e) => {
                tracing::debug!(
                    query = %query.name,
                    error = %e,
                    "column metadata unavailable, trying text fallback"
                );
                match headers::header_names_from_sql(&query.body) {
                    Some(names) => Some(names),
                    None => {
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

    async fn describe_columns(&self, body: &str) -> Result<Vec<String>> {
        let mut conn = connect(&self.db).await?;
        let wrapped = headers::zero_limit_wrapper(body);
        let statement = conn.prepare(&wrapped).await?;
        let names = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        conn.close().await.ok();
        Ok(names)
    }

    /// Gather diagnostic context for an unverifiable artifact
    async fn diagnostics(&self, work_dir: &Path) -> String {
        let mut parts = Vec::new();

        match connect(&self.db).await {
            Ok(mut conn) => {
                match sqlx::query_scalar::<_, Option<String>>("SELECT @@secure_file_priv")
                    .fetch_one(&mut conn)
                    .await
                {
                    Ok(priv_dir) => parts.push(format!(
                        "secure_file_priv={}",
                        priv_dir.as_deref().unwrap_or("NULL")
                    )),
                    Err(e) => parts.push(format!("secure_file_priv unavailable: {e}")),
                }
                conn.close().await.ok();
            }
            Err(e) => parts.push(format!("engine unreachable for diagnostics: {e}")),
        }

        match std::fs::read_dir(work_dir) {
            Ok(entries) => {
                let listing: Vec<String> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect();
                parts.push(format!(
                    "directory {} contains: [{}]",
                    work_dir.display(),
                    listing.join(", ")
                ));
            }
            Err(e) => parts.push(format!("directory {} unreadable: {e}", work_dir.display())),
        }

        parts.join("; ")
    }
}

#[async_trait]
impl Exporter for ServerSideExporter {
    /// Align the working directory with the engine's permitted write
    /// location
    ///
    /// The engine only writes files under `secure_file_priv` when that
    /// setting names a directory; a `NULL` setting disables file export
    /// entirely, which is pipeline-fatal for this strategy.
    async fn preflight(&mut self) -> Result<()> {
        let mut conn = connect(&self.db).await?;
        let priv_dir = sqlx::query_scalar::<_, Option<String>>("SELECT @@secure_file_priv")
            .fetch_one(&mut conn)
            .await?;
        conn.close().await.ok();

        match priv_dir {
            None => Err(Error::Config {
                message: "server-side export is disabled by the engine (secure_file_priv is NULL)"
                    .into(),
                key: Some("export.mode".into()),
            }),
            Some(dir) if dir.is_empty() => Ok(()),
            Some(dir) => {
                let constrained = PathBuf::from(dir.trim_end_matches('/'));
                if constrained != self.work_dir {
                    tracing::info!(
                        configured = %self.work_dir.display(),
                        constrained = %constrained.display(),
                        "aligning export directory with secure_file_priv"
                    );
                    self.work_dir = constrained;
                }
                Ok(())
            }
        }
    }

    async fn export(&self, query: &QueryDefinition) -> Result<ExportArtifact> {
        let (target, remote_name) = unique_artifact_path(&self.work_dir, &query.name);

        let header = self.header_names(query).await;
        let clause = OutfileClause::new(&target, self.export.csv);
        let sql = build_export_statement(&query.body, header.as_deref(), &clause);

        let mut conn = connect(&self.db).await?;
        let result = sqlx::query(&sql).execute(&mut conn).await;
        conn.close().await.ok();
        if let Err(e) = result {
            return Err(ExportError::QueryExecutionFailed {
                name: query.name.clone(),
                detail: e.to_string(),
            }
            .into());
        }

        // The engine reports success without a local artifact when it ran
        // on another host or wrote somewhere unexpected; verify before
        // handing the artifact downstream.
        if tokio::fs::metadata(&target).await.is_err() {
            let diagnostics = self.diagnostics(&self.work_dir).await;
            return Err(ExportError::Incomplete {
                name: query.name.clone(),
                path: target,
                diagnostics,
            }
            .into());
        }

        tracing::info!(query = %query.name, artifact = %target.display(), "server-side export complete");
        Ok(ExportArtifact {
            path: target,
            remote_name,
        })
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clause_renders_default_format() {
        let clause = OutfileClause::new("/var/lib/mysql-files/orders.csv", CsvFormat::default());
        let sql = clause.build();

        assert!(sql.starts_with("INTO OUTFILE '/var/lib/mysql-files/orders.csv'"));
        assert!(sql.contains("CHARACTER SET utf8mb4"));
        assert!(sql.contains("FIELDS TERMINATED BY ','"));
        assert!(sql.contains("ENCLOSED BY '\"'"));
        assert!(sql.contains("ESCAPED BY '\"'"));
        assert!(sql.contains("LINES TERMINATED BY '\\n'"));
    }

    #[test]
    fn clause_renders_custom_delimiter() {
        let clause = OutfileClause::new(
            "/tmp/out.csv",
            CsvFormat {
                delimiter: ';',
                quote: '\'',
                terminator: '\n',
                headers: true,
            },
        );
        let sql = clause.build();

        assert!(sql.contains("FIELDS TERMINATED BY ';'"));
        // The quote character itself needs SQL-literal escaping
        assert!(sql.contains("ENCLOSED BY ''''"));
    }

    #[test]
    fn clause_escapes_quotes_in_path() {
        let clause = OutfileClause::new("/tmp/it's here/x.csv", CsvFormat::default());
        assert!(clause.build().contains("'/tmp/it''s here/x.csv'"));
    }

    #[test]
    fn sql_char_escapes_control_characters() {
        assert_eq!(sql_char('\n'), "'\\n'");
        assert_eq!(sql_char('\r'), "'\\r'");
        assert_eq!(sql_char('\t'), "'\\t'");
        assert_eq!(sql_char(','), "','");
        assert_eq!(sql_char('\''), "''''");
    }

    #[test]
    fn sql_string_escapes_backslashes() {
        assert_eq!(sql_string(r"C:\exports"), r"'C:\\exports'");
    }

    #[test]
    fn statement_without_header_appends_clause_to_body() {
        let clause = OutfileClause::new("/tmp/x.csv", CsvFormat::default());
        let sql = build_export_statement("SELECT id FROM t", None, &clause);

        assert!(sql.starts_with("SELECT id FROM t\nINTO OUTFILE"));
        assert!(!sql.contains("UNION ALL"));
    }

    #[test]
    fn statement_with_header_prepends_literal_select() {
        let clause = OutfileClause::new("/tmp/x.csv", CsvFormat::default());
        let header = vec!["id".to_string(), "name".to_string()];
        let sql = build_export_statement("SELECT id, name FROM t", Some(&header), &clause);

        assert!(sql.starts_with("SELECT 'id', 'name'\nUNION ALL\n"));
        assert!(sql.contains("SELECT * FROM (SELECT id, name FROM t) AS export_rows"));
        // The clause lands once, at the end of the combined statement
        assert_eq!(sql.matches("INTO OUTFILE").count(), 1);
        assert!(sql.trim_start().starts_with("SELECT"));
    }

    #[test]
    fn statement_header_escapes_quoted_names() {
        let clause = OutfileClause::new("/tmp/x.csv", CsvFormat::default());
        let header = vec!["it's".to_string()];
        let sql = build_export_statement("SELECT 1", Some(&header), &clause);

        assert!(sql.contains("SELECT 'it''s'"));
    }
}
