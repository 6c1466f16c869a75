use super::Warehouse;
use crate::errors::{AppError, AppResult};
use crate::models::{CellValue, EndpointSummary, RowSet, WarehouseKind};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct SqliteWarehouse {
    path: PathBuf,
}

impl SqliteWarehouse {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn open(&self) -> AppResult<Connection> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|error| {
            AppError::Connection(format!("failed to open {}: {}", self.path.display(), error))
        })
    }
}

impl Warehouse for SqliteWarehouse {
    fn endpoint(&self) -> EndpointSummary {
        EndpointSummary {
            kind: WarehouseKind::Sqlite,
            host: "localhost".to_string(),
            location: self.path.display().to_string(),
        }
    }

    fn execute(&self, sql: &str, deadline: Instant) -> AppResult<RowSet> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(AppError::Timeout("deadline passed before the query started".to_string()));
        }
        let conn = self.open()?;
        conn.busy_timeout(remaining)?;
        let mut statement = conn.prepare(sql)?;
        let columns: Vec<String> = statement.column_names().iter().map(|name| name.to_string()).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = statement.query([])?;
        while let Some(row) = cursor.next()? {
            let mut cells = Vec::with_capacity(width);
            for index in 0..width {
                cells.push(cell_from_sqlite(row.get_ref(index)?));
            }
            rows.push(cells);
        }

        tracing::debug!(path = %self.path.display(), rows = rows.len(), "sqlite statement executed");
        Ok(RowSet { columns, rows })
    }
}

fn cell_from_sqlite(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(value) => CellValue::Int(value),
        ValueRef::Real(value) => CellValue::Float(value),
        ValueRef::Text(bytes) => CellValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => CellValue::Text(format!("<{} bytes>", bytes.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteWarehouse;
    use crate::models::CellValue;
    use crate::warehouse::Warehouse;
    use rusqlite::Connection;
    use std::time::{Duration, Instant};

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn seeded(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("warehouse.sqlite");
        let conn = Connection::open(&path).expect("open");
        conn.execute_batch(
            "CREATE TABLE produccion_petrolera (Fecha TEXT, Pozo TEXT, Produccion_bpd REAL);
             INSERT INTO produccion_petrolera VALUES ('2025-01-01', 'A', 100.0);
             INSERT INTO produccion_petrolera VALUES ('2025-01-01', 'B', NULL);",
        )
        .expect("seed");
        path
    }

    #[test]
    fn returns_columns_and_typed_cells() {
        let dir = tempfile::tempdir().expect("tempdir");
        let warehouse = SqliteWarehouse::new(&seeded(&dir));

        let rows = warehouse
            .execute("SELECT * FROM produccion_petrolera LIMIT 30", soon())
            .expect("query");
        assert_eq!(rows.columns, vec!["Fecha", "Pozo", "Produccion_bpd"]);
        assert_eq!(rows.rows.len(), 2);
        assert_eq!(rows.rows[0][2], CellValue::Float(100.0));
        assert_eq!(rows.rows[1][2], CellValue::Null);
    }

    #[test]
    fn missing_table_is_a_query_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let warehouse = SqliteWarehouse::new(&seeded(&dir));
        let error = warehouse.execute("SELECT * FROM nope LIMIT 1", soon()).expect_err("missing table");
        assert_eq!(error.code(), "WAREHOUSE_QUERY");
    }

    #[test]
    fn missing_file_is_a_connection_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let warehouse = SqliteWarehouse::new(&dir.path().join("absent.sqlite"));
        let error = warehouse.execute("SELECT 1", soon()).expect_err("no file");
        assert_eq!(error.code(), "WAREHOUSE_CONNECTION");
    }

    #[test]
    fn expired_deadline_is_a_timeout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let warehouse = SqliteWarehouse::new(&seeded(&dir));
        let error = warehouse
            .execute("SELECT * FROM produccion_petrolera", Instant::now())
            .expect_err("expired");
        assert_eq!(error.code(), "WAREHOUSE_TIMEOUT");
    }
}
