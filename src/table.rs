use crate::errors::{AppError, AppResult};
use crate::models::{CellValue, RowSet, TableView};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

// Slash dates read month-first; day-first only when the month would be out of range.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoercionReport {
    pub parsed: usize,
    pub nulled: usize,
}

impl Table {
    pub fn build(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> AppResult<Self> {
        let mut seen = HashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(AppError::Data(format!("duplicate column name '{}'", name)));
            }
        }

        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(AppError::Data(format!(
                    "row {} has {} cells, expected {}",
                    index,
                    row.len(),
                    columns.len()
                )));
            }
        }

        Ok(Self { columns, rows })
    }

    pub fn from_row_set(row_set: RowSet) -> AppResult<Self> {
        Self::build(row_set.columns, row_set.rows)
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &CellValue> + '_> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[index]))
    }

    pub fn coerce_date(&mut self, name: &str) -> Option<CoercionReport> {
        let index = self.column_index(name)?;
        let mut report = CoercionReport::default();

        for row in &mut self.rows {
            let cell = &mut row[index];
            if cell.is_null() {
                continue;
            }
            match coerce_cell(cell) {
                Some(value) => {
                    *cell = value;
                    report.parsed += 1;
                }
                None => {
                    *cell = CellValue::Null;
                    report.nulled += 1;
                }
            }
        }

        Some(report)
    }

    pub fn group_sum(&self, group_key: &str, value_key: &str) -> AppResult<Table> {
        let key_index = self
            .column_index(group_key)
            .ok_or_else(|| AppError::Data(format!("column '{}' not found", group_key)))?;
        let value_index = self
            .column_index(value_key)
            .ok_or_else(|| AppError::Data(format!("column '{}' not found", value_key)))?;

        let mut groups: BTreeMap<GroupKey, SumAccumulator> = BTreeMap::new();
        for row in &self.rows {
            let key = &row[key_index];
            if key.is_null() {
                continue;
            }
            groups
                .entry(GroupKey(key.clone()))
                .or_default()
                .add(&row[value_index]);
        }

        let columns = if group_key == value_key {
            vec![group_key.to_string(), format!("{}_sum", value_key)]
        } else {
            vec![group_key.to_string(), value_key.to_string()]
        };
        let rows = groups
            .into_iter()
            .map(|(key, accumulator)| vec![key.0, accumulator.total()])
            .collect();

        Table::build(columns, rows)
    }

    pub fn to_delimited_text(&self) -> String {
        let mut output = String::new();
        push_line(&mut output, self.columns.iter().map(|name| Cow::Borrowed(name.as_str())));
        for row in &self.rows {
            push_line(&mut output, row.iter().map(|cell| Cow::Owned(cell.display_text())));
        }
        output
    }

    pub fn to_view(&self) -> TableView {
        TableView {
            columns: self.columns.clone(),
            rows: self.rows.clone(),
        }
    }
}

fn coerce_cell(cell: &CellValue) -> Option<CellValue> {
    match cell {
        CellValue::Date(_) | CellValue::Timestamp(_) => Some(cell.clone()),
        CellValue::Text(text) => parse_temporal(text),
        _ => None,
    }
}

pub fn parse_temporal(text: &str) -> Option<CellValue> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(CellValue::Date(date));
        }
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(collapse_midnight(parsed.naive_utc()));
    }

    for format in DATETIME_FORMATS {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(text, format) {
            return Some(collapse_midnight(timestamp));
        }
    }

    None
}

fn collapse_midnight(timestamp: NaiveDateTime) -> CellValue {
    if timestamp.time() == NaiveTime::MIN {
        CellValue::Date(timestamp.date())
    } else {
        CellValue::Timestamp(timestamp)
    }
}

#[derive(Debug, Clone)]
struct GroupKey(CellValue);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug)]
struct SumAccumulator {
    integer: Option<i64>,
    float: f64,
}

impl Default for SumAccumulator {
    fn default() -> Self {
        Self {
            integer: Some(0),
            float: 0.0,
        }
    }
}

impl SumAccumulator {
    fn add(&mut self, value: &CellValue) {
        if let Some(number) = value.as_i64() {
            self.integer = self.integer.and_then(|total| total.checked_add(number));
            self.float += number as f64;
        } else if let Some(number) = value.as_f64() {
            self.integer = None;
            self.float += number;
        }
    }

    fn total(self) -> CellValue {
        match self.integer {
            Some(total) => CellValue::Int(total),
            None => CellValue::Float(self.float),
        }
    }
}

fn push_line<'a>(output: &mut String, fields: impl Iterator<Item = Cow<'a, str>>) {
    let mut first = true;
    for field in fields {
        if !first {
            output.push(',');
        }
        first = false;
        push_field(output, &field);
    }
    output.push('\n');
}

fn push_field(output: &mut String, field: &str) {
    if field.contains(&[',', '"', '\n', '\r'][..]) {
        output.push('"');
        output.push_str(&field.replace('"', "\"\""));
        output.push('"');
    } else {
        output.push_str(field);
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_temporal, Table};
    use crate::models::CellValue;
    use chrono::NaiveDate;

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_string())
    }

    fn date(y: i32, m: u32, d: u32) -> CellValue {
        CellValue::Date(NaiveDate::from_ymd_opt(y, m, d).expect("valid date"))
    }

    fn production_table() -> Table {
        Table::build(
            vec!["Fecha".to_string(), "Pozo".to_string(), "Produccion_bpd".to_string()],
            vec![
                vec![text("2025-01-02"), text("A"), CellValue::Int(100)],
                vec![text("2025-01-01"), text("B"), CellValue::Int(50)],
                vec![text("2025-01-02"), text("B"), CellValue::Float(25.5)],
                vec![text("2025-01-01"), text("A"), CellValue::Null],
            ],
        )
        .expect("table")
    }

    #[test]
    fn build_rejects_ragged_rows() {
        let error = Table::build(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![CellValue::Int(1)]],
        )
        .expect_err("ragged row");
        assert!(error.to_string().contains("row 0 has 1 cells, expected 2"));
    }

    #[test]
    fn build_rejects_duplicate_columns() {
        let error = Table::build(vec!["a".to_string(), "a".to_string()], vec![]).expect_err("duplicate");
        assert_eq!(error.code(), "DATA_INVALID");
    }

    #[test]
    fn coerce_date_nulls_only_the_unparsable_cell() {
        let mut table = Table::build(
            vec!["Fecha".to_string()],
            vec![vec![text("2025-01-01")], vec![text("not a date")], vec![text("2025/01/03")]],
        )
        .expect("table");

        let report = table.coerce_date("Fecha").expect("column exists");
        assert_eq!(report.parsed, 2);
        assert_eq!(report.nulled, 1);
        assert_eq!(table.row_count(), 3);

        let cells: Vec<_> = table.column("Fecha").expect("column").cloned().collect();
        assert_eq!(cells, vec![date(2025, 1, 1), CellValue::Null, date(2025, 1, 3)]);
    }

    #[test]
    fn coerce_date_on_missing_column_is_a_no_op() {
        let mut table = production_table();
        assert!(table.coerce_date("Missing").is_none());
        assert_eq!(table, production_table());
    }

    #[test]
    fn coerce_date_rejects_numbers() {
        let mut table = Table::build(vec!["Fecha".to_string()], vec![vec![CellValue::Int(20250101)]]).expect("table");
        table.coerce_date("Fecha");
        assert_eq!(table.rows()[0][0], CellValue::Null);
    }

    #[test]
    fn parses_common_timestamp_shapes() {
        assert_eq!(parse_temporal("2025-01-01T00:00:00.000Z"), Some(date(2025, 1, 1)));
        assert_eq!(parse_temporal("01/02/2025"), Some(date(2025, 1, 2)));
        assert_eq!(parse_temporal("31/12/2024"), Some(date(2024, 12, 31)));
        assert!(matches!(parse_temporal("2025-01-01 06:30:00"), Some(CellValue::Timestamp(_))));
        assert_eq!(parse_temporal("   "), None);
    }

    #[test]
    fn group_sum_adds_values_sharing_a_key() {
        let mut table = production_table();
        table.coerce_date("Fecha");
        let grouped = table.group_sum("Fecha", "Produccion_bpd").expect("group");

        assert_eq!(grouped.column_names(), ["Fecha", "Produccion_bpd"]);
        assert_eq!(
            grouped.rows(),
            [
                vec![date(2025, 1, 1), CellValue::Int(50)],
                vec![date(2025, 1, 2), CellValue::Float(125.5)],
            ]
        );
    }

    #[test]
    fn group_sum_of_empty_table_is_empty() {
        let table = Table::build(vec!["Pozo".to_string(), "Produccion_bpd".to_string()], vec![]).expect("table");
        let grouped = table.group_sum("Pozo", "Produccion_bpd").expect("group");
        assert!(grouped.is_empty());
        assert_eq!(grouped.column_names().len(), 2);
    }

    #[test]
    fn group_sum_skips_null_keys_and_requires_columns() {
        let table = Table::build(
            vec!["Pozo".to_string(), "Produccion_bpd".to_string()],
            vec![
                vec![CellValue::Null, CellValue::Int(10)],
                vec![text("A"), CellValue::Int(5)],
            ],
        )
        .expect("table");
        let grouped = table.group_sum("Pozo", "Produccion_bpd").expect("group");
        assert_eq!(grouped.rows(), [vec![text("A"), CellValue::Int(5)]]);

        assert!(table.group_sum("Fecha", "Produccion_bpd").is_err());
    }

    #[test]
    fn delimited_text_has_header_and_one_line_per_row() {
        let table = production_table();
        let csv = table.to_delimited_text();
        let lines: Vec<&str> = csv.lines().collect();

        let header: Vec<&str> = lines[0].split(',').collect();
        assert_eq!(header, table.column_names());
        assert_eq!(lines.len() - 1, table.row_count());
        assert_eq!(lines[3], "2025-01-02,B,25.5");
        assert_eq!(lines[4], "2025-01-01,A,");
    }

    #[test]
    fn delimited_text_keeps_float_fractions() {
        let table = Table::build(
            vec!["Produccion_bpd".to_string()],
            vec![vec![CellValue::Float(100.0)], vec![CellValue::Float(25.5)], vec![CellValue::Int(7)]],
        )
        .expect("table");
        assert_eq!(table.to_delimited_text(), "Produccion_bpd\n100.0\n25.5\n7\n");
    }

    #[test]
    fn delimited_text_quotes_fields_with_separators() {
        let table = Table::build(
            vec!["Pozo".to_string()],
            vec![vec![text("Norte, \"A\"")]],
        )
        .expect("table");
        assert_eq!(table.to_delimited_text(), "Pozo\n\"Norte, \"\"A\"\"\"\n");
    }
}
