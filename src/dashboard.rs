use crate::charts;
use crate::config::DashboardSettings;
use crate::errors::{AppError, AppResult};
use crate::models::{
    DashboardVariant, DashboardView, DownloadLink, EndpointSummary, ExportFile, HelpPanel, Notice, WarehouseKind,
};
use crate::redaction::Redactor;
use crate::schema::{Capabilities, ProductionColumn};
use crate::summary;
use crate::table::Table;
use crate::warehouse::{RowLimit, SelectQuery, TableName, Warehouse};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const EXPORT_ROUTE: &str = "/api/export";
pub const DEFAULT_REQUEST_BUDGET: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct DashboardService {
    warehouse: Arc<dyn Warehouse>,
    settings: DashboardSettings,
    table: TableName,
    redactor: Redactor,
    budget: Duration,
}

struct LoadedTable {
    query: SelectQuery,
    table: Table,
    capabilities: Capabilities,
}

impl DashboardService {
    pub fn new(warehouse: Arc<dyn Warehouse>, settings: DashboardSettings, table: TableName) -> Self {
        Self {
            warehouse,
            settings,
            table,
            redactor: Redactor::new(),
            budget: DEFAULT_REQUEST_BUDGET,
        }
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn with_request_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn request_budget(&self) -> Duration {
        self.budget
    }

    pub fn variant(&self) -> DashboardVariant {
        self.settings.variant
    }

    pub fn endpoint(&self) -> EndpointSummary {
        self.warehouse.endpoint()
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    pub fn render(&self, limit: Option<&str>) -> AppResult<DashboardView> {
        let request_id = Uuid::new_v4().to_string();
        let limit = RowLimit::from_param(limit)?;
        let LoadedTable {
            query,
            table,
            capabilities,
        } = self.load(&request_id, limit)?;

        let variant = self.settings.variant;
        let mut notices = Vec::new();
        if table.is_empty() {
            notices.push(Notice::info(format!(
                "La consulta no devolvió registros de la tabla {}.",
                self.table
            )));
        }

        let metrics = match variant {
            DashboardVariant::Extended => summary::all(&table, &capabilities),
            DashboardVariant::Basic => Vec::new(),
        };

        let mut charts = vec![
            charts::daily_total(&table, &capabilities)?,
            charts::per_well(&table, &capabilities),
        ];
        if variant == DashboardVariant::Extended {
            charts.push(charts::per_well_distribution(&table, &capabilities));
        }
        notices.extend(charts.iter().filter_map(|panel| panel.notice().cloned()));

        let download = (variant == DashboardVariant::Extended).then(|| DownloadLink {
            label: "Descargar datos como CSV".to_string(),
            href: format!("{}?limit={}", EXPORT_ROUTE, limit),
            file_name: self.settings.export_file_name.clone(),
            content: table.to_delimited_text(),
        });

        tracing::info!(
            request_id = %request_id,
            limit = limit.get(),
            rows = table.row_count(),
            charts_rendered = charts.iter().filter(|panel| panel.chart().is_some()).count(),
            notices = notices.len(),
            "dashboard rendered"
        );

        Ok(DashboardView {
            request_id,
            generated_at: Utc::now(),
            title: self.settings.title.clone(),
            description: self.settings.description.clone(),
            variant,
            limit: limit.get(),
            limit_bounds: RowLimit::bounds(),
            query: query.sql(),
            endpoint: self.warehouse.endpoint(),
            table: table.to_view(),
            metrics,
            charts,
            notices,
            download,
            help: self.help_panel(),
            footer: self.settings.footer.clone(),
        })
    }

    pub fn export(&self, limit: Option<&str>) -> AppResult<ExportFile> {
        let request_id = Uuid::new_v4().to_string();
        let limit = RowLimit::from_param(limit)?;
        let loaded = self.load(&request_id, limit)?;
        let content = loaded.table.to_delimited_text();

        tracing::info!(
            request_id = %request_id,
            limit = limit.get(),
            rows = loaded.table.row_count(),
            bytes = content.len(),
            "dashboard export prepared"
        );

        Ok(ExportFile {
            file_name: self.settings.export_file_name.clone(),
            content_type: "text/csv; charset=utf-8".to_string(),
            row_count: loaded.table.row_count(),
            content,
        })
    }

    pub fn help_panel(&self) -> HelpPanel {
        let endpoint = self.warehouse.endpoint();
        let mut lines = Vec::new();
        lines.push("### Cómo se conecta esta app al warehouse".to_string());
        lines.push(String::new());
        match endpoint.kind {
            WarehouseKind::Databricks => {
                lines.push(format!("- **Servidor:** `{}`", endpoint.host));
                lines.push(format!("- **HTTP Path:** `{}`", endpoint.location));
                lines.push(
                    "- **Autenticación:** token de acceso leído de `DATABRICKS_ACCESS_TOKEN` o del llavero del sistema."
                        .to_string(),
                );
            }
            WarehouseKind::Sqlite => {
                lines.push(format!("- **Archivo local:** `{}`", endpoint.location));
                lines.push("- **Autenticación:** no aplica (modo sin conexión).".to_string());
            }
        }
        lines.push(String::new());
        lines.push(format!(
            "La consulta `SELECT * FROM {} LIMIT N` extrae los datos históricos de producción petrolera.",
            self.table
        ));
        lines.push(String::new());
        lines.push("El dashboard muestra:".to_string());
        lines.push("- Tabla de registros.".to_string());
        if self.settings.variant == DashboardVariant::Extended {
            lines.push("- Estadísticas generales (pozos únicos, producción total, fechas únicas).".to_string());
        }
        lines.push("- Producción total diaria.".to_string());
        lines.push("- Producción por pozo.".to_string());
        if self.settings.variant == DashboardVariant::Extended {
            lines.push("- Distribución de producción por pozo.".to_string());
            lines.push("- Descarga de los datos como CSV.".to_string());
        }
        lines.push(String::new());
        lines.push("Herramientas: servidor Rust (axum), consultas SQL al warehouse y gráficos con Plotly.".to_string());
        lines.push(String::new());
        lines.push(format!(
            "Puedes modificar el número de registros ({}-{}) con el control deslizante.",
            RowLimit::MIN,
            RowLimit::MAX
        ));

        HelpPanel {
            title: "Acerca de la conexión y datos utilizados".to_string(),
            markdown: lines.join("\n"),
        }
    }

    fn load(&self, request_id: &str, limit: RowLimit) -> AppResult<LoadedTable> {
        let query = SelectQuery::new(self.table.clone(), limit);
        let started = Instant::now();
        let deadline = started.checked_add(self.budget).ok_or_else(|| {
            AppError::Config(format!("request budget of {}s is out of range", self.budget.as_secs()))
        })?;

        let row_set = self.warehouse.run(&query, deadline).map_err(|error| {
            let error = error.map_message(|message| self.redactor.redact(message));
            tracing::error!(
                request_id = %request_id,
                code = error.code(),
                error = %error,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "warehouse query failed"
            );
            error
        })?;

        if row_set.rows.len() > limit.get() as usize {
            return Err(AppError::Data(format!(
                "warehouse returned {} rows for limit {}",
                row_set.rows.len(),
                limit
            )));
        }

        let mut table = Table::from_row_set(row_set)?;
        if let Some(report) = table.coerce_date(ProductionColumn::Fecha.as_str()) {
            if report.nulled > 0 {
                tracing::warn!(
                    request_id = %request_id,
                    nulled = report.nulled,
                    "unparsable Fecha values replaced with nulls"
                );
            }
        }
        let capabilities = Capabilities::detect(&table);

        tracing::debug!(
            request_id = %request_id,
            rows = table.row_count(),
            columns = ?capabilities.present(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "result table built"
        );

        Ok(LoadedTable {
            query,
            table,
            capabilities,
        })
    }
}
