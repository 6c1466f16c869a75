use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) if value.is_finite() => Some(*value),
            Self::Text(value) => value.trim().parse::<f64>().ok().filter(|parsed| parsed.is_finite()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Text(value) => value.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn display_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(value) => if *value { "True" } else { "False" }.to_string(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => float_text(*value),
            Self::Text(value) => value.clone(),
            Self::Date(value) => value.format("%Y-%m-%d").to_string(),
            Self::Timestamp(value) => value.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Float(_) => 2,
            Self::Date(_) | Self::Timestamp(_) => 3,
            Self::Text(_) => 4,
        }
    }

    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(left), Self::Bool(right)) => left.cmp(right),
            (Self::Int(left), Self::Int(right)) => left.cmp(right),
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                let left = numeric(self);
                let right = numeric(other);
                left.total_cmp(&right)
            }
            (Self::Date(_) | Self::Timestamp(_), Self::Date(_) | Self::Timestamp(_)) => {
                temporal(self).cmp(&temporal(other))
            }
            (Self::Text(left), Self::Text(right)) => left.cmp(right),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

// Integral floats keep their `.0` so a DOUBLE column does not read back as integers.
fn float_text(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && value.fract() == 0.0 {
        format!("{}.0", text)
    } else {
        text
    }
}

fn numeric(value: &CellValue) -> f64 {
    match value {
        CellValue::Int(value) => *value as f64,
        CellValue::Float(value) => *value,
        _ => f64::NAN,
    }
}

fn temporal(value: &CellValue) -> Option<NaiveDateTime> {
    match value {
        CellValue::Date(date) => date.and_hms_opt(0, 0, 0),
        CellValue::Timestamp(timestamp) => Some(*timestamp),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarehouseKind {
    Databricks,
    Sqlite,
}

impl WarehouseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Databricks => "databricks",
            Self::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSummary {
    pub kind: WarehouseKind,
    pub host: String,
    pub location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DashboardVariant {
    Basic,
    #[default]
    Extended,
}

impl DashboardVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Extended => "extended",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "basic" => Some(Self::Basic),
            "extended" => Some(Self::Extended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoticeLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricCard {
    pub id: String,
    pub label: String,
    pub value: String,
    pub unit: Option<String>,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub x: CellValue,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BarPoint {
    pub x: String,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxGroup {
    pub name: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub lower_whisker: f64,
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChartSpec {
    #[serde(rename_all = "camelCase")]
    Line {
        x_label: String,
        y_label: String,
        points: Vec<SeriesPoint>,
    },
    #[serde(rename_all = "camelCase")]
    Bar {
        x_label: String,
        y_label: String,
        bars: Vec<BarPoint>,
    },
    #[serde(rename_all = "camelCase")]
    Box {
        x_label: String,
        y_label: String,
        groups: Vec<BoxGroup>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ChartOutcome {
    Rendered { chart: ChartSpec },
    Skipped { notice: Notice },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPanel {
    pub id: String,
    pub title: String,
    pub outcome: ChartOutcome,
}

impl ChartPanel {
    pub fn chart(&self) -> Option<&ChartSpec> {
        match &self.outcome {
            ChartOutcome::Rendered { chart } => Some(chart),
            ChartOutcome::Skipped { .. } => None,
        }
    }

    pub fn notice(&self) -> Option<&Notice> {
        match &self.outcome {
            ChartOutcome::Rendered { .. } => None,
            ChartOutcome::Skipped { notice } => Some(notice),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableView {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpPanel {
    pub title: String,
    pub markdown: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLink {
    pub label: String,
    pub href: String,
    pub file_name: String,
    /// CSV of the rows in this view, so the saved file matches the screen.
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitBounds {
    pub min: u32,
    pub max: u32,
    pub default: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub request_id: String,
    pub generated_at: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub variant: DashboardVariant,
    pub limit: u32,
    pub limit_bounds: LimitBounds,
    pub query: String,
    pub endpoint: EndpointSummary,
    pub table: TableView,
    pub metrics: Vec<MetricCard>,
    pub charts: Vec<ChartPanel>,
    pub notices: Vec<Notice>,
    pub download: Option<DownloadLink>,
    pub help: HelpPanel,
    pub footer: Option<String>,
}

impl DashboardView {
    pub fn chart_panel(&self, id: &str) -> Option<&ChartPanel> {
        self.charts.iter().find(|panel| panel.id == id)
    }

    pub fn metric(&self, id: &str) -> Option<&MetricCard> {
        self.metrics.iter().find(|metric| metric.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFile {
    pub file_name: String,
    pub content_type: String,
    pub row_count: usize,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub variant: DashboardVariant,
    pub endpoint: EndpointSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
