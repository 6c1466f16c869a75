use crate::models::{CellValue, MetricCard};
use crate::schema::{Capabilities, ProductionColumn};
use crate::table::Table;
use std::cmp::Ordering;

pub const NOT_APPLICABLE: &str = "N/A";

pub fn distinct_wells(table: &Table, capabilities: &Capabilities) -> MetricCard {
    let value = capabilities
        .has(ProductionColumn::Pozo)
        .then(|| distinct_non_null(table, ProductionColumn::Pozo).to_string());
    card("distinct-wells", "Pozos únicos", value, None)
}

pub fn total_production(table: &Table, capabilities: &Capabilities) -> MetricCard {
    let value = capabilities.has(ProductionColumn::ProduccionBpd).then(|| {
        let total: f64 = table
            .column(ProductionColumn::ProduccionBpd.as_str())
            .map(|cells| cells.filter_map(CellValue::as_f64).sum())
            .unwrap_or(0.0);
        format_thousands(total)
    });
    card("total-production", "Total Producción", value, Some("bpd"))
}

pub fn distinct_dates(table: &Table, capabilities: &Capabilities) -> MetricCard {
    let value = capabilities
        .has(ProductionColumn::Fecha)
        .then(|| distinct_non_null(table, ProductionColumn::Fecha).to_string());
    card("distinct-dates", "Fechas únicas", value, None)
}

pub fn all(table: &Table, capabilities: &Capabilities) -> Vec<MetricCard> {
    vec![
        distinct_wells(table, capabilities),
        total_production(table, capabilities),
        distinct_dates(table, capabilities),
    ]
}

fn card(id: &str, label: &str, value: Option<String>, unit: Option<&str>) -> MetricCard {
    let available = value.is_some();
    MetricCard {
        id: id.to_string(),
        label: label.to_string(),
        value: value.unwrap_or_else(|| NOT_APPLICABLE.to_string()),
        unit: if available { unit.map(ToString::to_string) } else { None },
        available,
    }
}

fn distinct_non_null(table: &Table, column: ProductionColumn) -> usize {
    let Some(cells) = table.column(column.as_str()) else {
        return 0;
    };
    let mut values: Vec<&CellValue> = cells.filter(|cell| !cell.is_null()).collect();
    values.sort_by(|left, right| left.total_cmp(right));
    values.dedup_by(|left, right| left.total_cmp(right) == Ordering::Equal);
    values.len()
}

/// Rounds to whole units and groups digits in threes: `1234567.6` becomes
/// `1,234,568`.
pub fn format_thousands(value: f64) -> String {
    let rounded = format!("{:.0}", value);
    let (sign, digits) = match rounded.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", rounded.as_str()),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    if grouped == "0" {
        return grouped;
    }
    format!("{}{}", sign, grouped)
}

#[cfg(test)]
mod tests {
    use super::{all, distinct_dates, distinct_wells, format_thousands, total_production, NOT_APPLICABLE};
    use crate::models::CellValue;
    use crate::schema::Capabilities;
    use crate::table::Table;

    fn table(columns: &[&str], rows: Vec<Vec<CellValue>>) -> Table {
        Table::build(columns.iter().map(ToString::to_string).collect(), rows).expect("table")
    }

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_string())
    }

    #[test]
    fn formats_with_thousands_separators() {
        assert_eq!(format_thousands(150.0), "150");
        assert_eq!(format_thousands(1234.0), "1,234");
        assert_eq!(format_thousands(1234567.6), "1,234,568");
        assert_eq!(format_thousands(-98765.0), "-98,765");
        assert_eq!(format_thousands(-0.2), "0");
    }

    #[test]
    fn metrics_ignore_nulls() {
        let table = table(
            &["Pozo", "Produccion_bpd"],
            vec![
                vec![text("A"), CellValue::Int(100)],
                vec![text("A"), CellValue::Null],
                vec![CellValue::Null, CellValue::Float(50.4)],
                vec![text("B"), CellValue::Int(1000)],
            ],
        );
        let capabilities = Capabilities::detect(&table);

        assert_eq!(distinct_wells(&table, &capabilities).value, "2");
        let total = total_production(&table, &capabilities);
        assert_eq!(total.value, "1,150");
        assert_eq!(total.unit.as_deref(), Some("bpd"));
    }

    #[test]
    fn missing_columns_degrade_to_sentinel() {
        let table = table(&["Pozo"], vec![vec![text("A")]]);
        let capabilities = Capabilities::detect(&table);

        let total = total_production(&table, &capabilities);
        assert_eq!(total.value, NOT_APPLICABLE);
        assert!(!total.available);
        assert!(total.unit.is_none());
        assert_eq!(distinct_dates(&table, &capabilities).value, NOT_APPLICABLE);
        assert_eq!(all(&table, &capabilities).len(), 3);
    }

    #[test]
    fn empty_production_column_totals_zero() {
        let table = table(&["Produccion_bpd"], vec![]);
        let capabilities = Capabilities::detect(&table);
        assert_eq!(total_production(&table, &capabilities).value, "0");
    }
}
