//! Stored query loading and validation
//!
//! Queries live as `<name>.sql` files in a directory; the base name
//! becomes the output artifact's base name (`<name>.csv`). Loading does
//! no SQL parsing beyond the two checks the pipeline depends on: a
//! non-empty body and the absence of a pre-embedded export clause.

use crate::error::{QueryError, Result};
use std::path::{Path, PathBuf};

/// A named query definition, immutable once loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDefinition {
    /// Identifier derived from the source file's base name
    pub name: String,
    /// Raw SQL body: no trailing terminator, no export clause
    pub body: String,
}

/// Loads named query definitions from a directory of `.sql` files
#[derive(Debug, Clone)]
pub struct QuerySource {
    query_dir: PathBuf,
}

impl QuerySource {
    /// Create a source over the given query directory
    pub fn new(query_dir: impl Into<PathBuf>) -> Self {
        Self {
            query_dir: query_dir.into(),
        }
    }

    /// Load and validate the query named `name`
    ///
    /// Strips surrounding whitespace and a single trailing `;` from the
    /// raw body; everything else passes through verbatim. Fails when the
    /// body is empty after cleaning or already contains an
    /// `INTO OUTFILE` clause (case-insensitive). The latter would
    /// double-write a destination clause in server-side mode, so it is
    /// rejected rather than rewritten.
    pub async fn load(&self, name: &str) -> Result<QueryDefinition> {
        let path = self.query_dir.join(format!("{name}.sql"));
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(QueryError::NotFound {
                    name: name.to_string(),
                    path,
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        };

        let body = clean_body(&raw);
        if body.is_empty() {
            return Err(QueryError::EmptyBody {
                name: name.to_string(),
            }
            .into());
        }
        if body.to_ascii_lowercase().contains("into outfile") {
            return Err(QueryError::EmbeddedExportClause {
                name: name.to_string(),
            }
            .into());
        }

        Ok(QueryDefinition {
            name: name.to_string(),
            body: body.to_string(),
        })
    }

    /// Enumerate all query names in the directory, sorted
    ///
    /// Used when no explicit identifiers are given to the pipeline.
    pub async fn discover(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.query_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("sql")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// The directory this source reads from
    pub fn query_dir(&self) -> &Path {
        &self.query_dir
    }
}

/// Strip surrounding whitespace and at most one trailing `;`
fn clean_body(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_terminator = trimmed.strip_suffix(';').unwrap_or(trimmed);
    without_terminator.trim_end()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn source_with(files: &[(&str, &str)]) -> (TempDir, QuerySource) {
        let dir = TempDir::new().unwrap();
        for (name, body) in files {
            std::fs::write(dir.path().join(format!("{name}.sql")), body).unwrap();
        }
        let source = QuerySource::new(dir.path());
        (dir, source)
    }

    #[tokio::test]
    async fn load_strips_trailing_terminator_and_whitespace() {
        let (_dir, source) = source_with(&[("orders", "SELECT id FROM orders;\n")]).await;

        let query = source.load("orders").await.unwrap();
        assert_eq!(query.name, "orders");
        assert_eq!(query.body, "SELECT id FROM orders");
    }

    #[tokio::test]
    async fn load_strips_exactly_one_terminator() {
        // Only a single trailing terminator is stripped; a second one is
        // part of the body and left for the engine to reject.
        let (_dir, source) = source_with(&[("double", "SELECT 1;;")]).await;

        let query = source.load("double").await.unwrap();
        assert_eq!(query.body, "SELECT 1;");
    }

    #[tokio::test]
    async fn load_strips_whitespace_after_terminator() {
        let (_dir, source) = source_with(&[("spaced", "  SELECT 1  ;   \n\t")]).await;

        let query = source.load("spaced").await.unwrap();
        assert_eq!(query.body, "SELECT 1");
    }

    #[tokio::test]
    async fn load_passes_interior_semicolons_through() {
        let (_dir, source) =
            source_with(&[("literal", "SELECT 'a;b' AS v FROM t")]).await;

        let query = source.load("literal").await.unwrap();
        assert_eq!(query.body, "SELECT 'a;b' AS v FROM t");
    }

    #[tokio::test]
    async fn load_rejects_empty_body() {
        let (_dir, source) = source_with(&[("empty", "  ;\n")]).await;

        let err = source.load("empty").await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Query(QueryError::EmptyBody { name }) if name == "empty"
        ));
    }

    #[tokio::test]
    async fn load_rejects_embedded_export_clause_case_insensitively() {
        let (_dir, source) = source_with(&[
            ("upper", "SELECT * FROM t INTO OUTFILE '/tmp/x.csv'"),
            ("lower", "select * from t into outfile '/tmp/x.csv'"),
            ("mixed", "SELECT * FROM t Into Outfile '/tmp/x.csv'"),
        ])
        .await;

        for name in ["upper", "lower", "mixed"] {
            let err = source.load(name).await.unwrap_err();
            assert!(
                matches!(
                    err,
                    crate::error::Error::Query(QueryError::EmbeddedExportClause { .. })
                ),
                "{name} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn load_reports_missing_query_with_path() {
        let (_dir, source) = source_with(&[]).await;

        let err = source.load("ghost").await.unwrap_err();
        match err {
            crate::error::Error::Query(QueryError::NotFound { name, path }) => {
                assert_eq!(name, "ghost");
                assert!(path.ends_with("ghost.sql"));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn discover_lists_sql_files_sorted_ignoring_others() {
        let (dir, source) = source_with(&[
            ("zeta", "SELECT 1"),
            ("alpha", "SELECT 2"),
            ("middle", "SELECT 3"),
        ])
        .await;
        std::fs::write(dir.path().join("README.md"), "not a query").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "also not").unwrap();

        let names = source.discover().await.unwrap();
        assert_eq!(names, vec!["alpha", "middle", "zeta"]);
    }

    #[tokio::test]
    async fn discover_on_missing_directory_errors() {
        let source = QuerySource::new("/nonexistent/queries");
        assert!(source.discover().await.is_err());
    }
}
