use chrono::NaiveDate;
use production_dashboard_lib::charts::{DAILY_TOTAL_ID, PER_WELL_DISTRIBUTION_ID, PER_WELL_ID};
use production_dashboard_lib::config::{AppConfig, DashboardSettings};
use production_dashboard_lib::dashboard::DashboardService;
use production_dashboard_lib::errors::AppError;
use production_dashboard_lib::models::{CellValue, ChartSpec, DashboardVariant};
use production_dashboard_lib::warehouse::sqlite::SqliteWarehouse;
use production_dashboard_lib::warehouse::TableName;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn seed(path: &Path, rows: &[(&str, &str, i64)]) {
    let conn = Connection::open(path).expect("open sqlite");
    conn.execute_batch(
        "CREATE TABLE produccion_petrolera (Fecha TEXT, Pozo TEXT, Produccion_bpd INTEGER);",
    )
    .expect("create table");
    for (fecha, pozo, bpd) in rows {
        conn.execute(
            "INSERT INTO produccion_petrolera (Fecha, Pozo, Produccion_bpd) VALUES (?1, ?2, ?3)",
            params![fecha, pozo, bpd],
        )
        .expect("insert row");
    }
}

fn service(path: &Path, variant: DashboardVariant) -> DashboardService {
    let settings = DashboardSettings {
        variant,
        ..DashboardSettings::default()
    };
    DashboardService::new(
        Arc::new(SqliteWarehouse::new(path)),
        settings,
        TableName::new("produccion_petrolera").expect("table"),
    )
}

#[test]
fn two_wells_on_one_day() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("produccion.sqlite");
    seed(&db, &[("2025-01-01", "A", 100), ("2025-01-01", "B", 50)]);

    let view = service(&db, DashboardVariant::Extended)
        .render(Some("30"))
        .expect("render");

    assert_eq!(view.query, "SELECT * FROM produccion_petrolera LIMIT 30");
    assert_eq!(view.table.rows.len(), 2);
    assert_eq!(view.metric("distinct-wells").expect("wells").value, "2");
    let total = view.metric("total-production").expect("total");
    assert_eq!(total.value, "150");
    assert_eq!(total.unit.as_deref(), Some("bpd"));
    assert_eq!(view.metric("distinct-dates").expect("dates").value, "1");

    match view.chart_panel(DAILY_TOTAL_ID).and_then(|panel| panel.chart()) {
        Some(ChartSpec::Line { points, .. }) => {
            assert_eq!(points.len(), 1);
            assert_eq!(
                points[0].x,
                CellValue::Date(NaiveDate::from_ymd_opt(2025, 1, 1).expect("date"))
            );
            assert_eq!(points[0].y, 150.0);
        }
        other => panic!("expected daily line chart, got {:?}", other),
    }
    match view.chart_panel(PER_WELL_ID).and_then(|panel| panel.chart()) {
        Some(ChartSpec::Bar { bars, .. }) => assert_eq!(bars.len(), 2),
        other => panic!("expected per-well bars, got {:?}", other),
    }
    assert!(view
        .chart_panel(PER_WELL_DISTRIBUTION_ID)
        .and_then(|panel| panel.chart())
        .is_some());
    assert!(view.notices.is_empty());
    assert!(view.download.is_some());
}

#[test]
fn row_count_follows_the_limit() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("produccion.sqlite");
    let rows: Vec<(String, String, i64)> = (0..12)
        .map(|day| (format!("2025-01-{:02}", day + 1), format!("P-{}", day % 3), 10 * day))
        .collect();
    let borrowed: Vec<(&str, &str, i64)> = rows
        .iter()
        .map(|(fecha, pozo, bpd)| (fecha.as_str(), pozo.as_str(), *bpd))
        .collect();
    seed(&db, &borrowed);

    let service = service(&db, DashboardVariant::Basic);
    for limit in 1..=30usize {
        let view = service.render(Some(&limit.to_string())).expect("render");
        assert_eq!(view.table.rows.len(), limit.min(12), "limit {}", limit);
        assert_eq!(view.limit as usize, limit);
    }
}

#[test]
fn basic_variant_has_no_metrics_or_download() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("produccion.sqlite");
    seed(&db, &[("2025-01-01", "A", 100)]);

    let view = service(&db, DashboardVariant::Basic).render(None).expect("render");
    assert!(view.metrics.is_empty());
    assert!(view.download.is_none());
    assert!(view.chart_panel(PER_WELL_DISTRIBUTION_ID).is_none());
    assert_eq!(view.limit, 30);
}

#[test]
fn missing_columns_become_notices() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("produccion.sqlite");
    let conn = Connection::open(&db).expect("open sqlite");
    conn.execute_batch(
        "CREATE TABLE produccion_petrolera (Pozo TEXT, Produccion_bpd INTEGER);
         INSERT INTO produccion_petrolera VALUES ('A', 10), ('B', 20);",
    )
    .expect("seed");
    drop(conn);

    let view = service(&db, DashboardVariant::Extended).render(Some("5")).expect("render");
    let daily = view.chart_panel(DAILY_TOTAL_ID).expect("daily panel");
    assert!(daily.chart().is_none());
    assert!(daily.notice().is_some());
    assert!(view.chart_panel(PER_WELL_ID).and_then(|panel| panel.chart()).is_some());
    assert_eq!(view.metric("distinct-dates").expect("dates").value, "N/A");
    assert_eq!(view.notices.len(), 1);
}

#[test]
fn export_writes_csv_with_header() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("produccion.sqlite");
    seed(&db, &[("2025-01-01", "Pozo, Norte", 100)]);

    let file = service(&db, DashboardVariant::Extended).export(Some("1")).expect("export");
    assert_eq!(file.file_name, "produccion_petrolera.csv");
    assert_eq!(file.row_count, 1);
    assert_eq!(
        file.content,
        "Fecha,Pozo,Produccion_bpd\n2025-01-01,\"Pozo, Norte\",100\n"
    );
}

#[test]
fn missing_table_is_a_query_error() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("empty.sqlite");
    Connection::open(&db).expect("create file");

    let error = service(&db, DashboardVariant::Extended)
        .render(Some("3"))
        .expect_err("missing table");
    assert!(matches!(error, AppError::Query(_)), "got {:?}", error);
}

#[test]
fn out_of_range_limits_are_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("produccion.sqlite");
    seed(&db, &[("2025-01-01", "A", 100)]);

    let service = service(&db, DashboardVariant::Extended);
    for raw in ["0", "31", "-1", "abc"] {
        let error = service.render(Some(raw)).expect_err("invalid limit");
        assert!(matches!(error, AppError::InvalidInput(_)), "{} gave {:?}", raw, error);
    }
}

#[test]
fn config_sqlite_backend_builds_a_service() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("produccion.sqlite");
    seed(&db, &[("2025-01-01", "A", 100), ("2025-01-02", "A", 80)]);

    let mut config = AppConfig::default();
    config.use_sqlite(db);
    let service = production_dashboard_lib::build_service(&config).expect("service");
    let view = service.render(Some("2")).expect("render");
    assert_eq!(view.table.rows.len(), 2);
}
