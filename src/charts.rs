use crate::errors::AppResult;
use crate::models::{BarPoint, BoxGroup, CellValue, ChartOutcome, ChartPanel, ChartSpec, Notice, SeriesPoint};
use crate::schema::{Capabilities, ProductionColumn};
use crate::table::Table;

pub const DAILY_TOTAL_ID: &str = "daily-total";
pub const PER_WELL_ID: &str = "per-well";
pub const PER_WELL_DISTRIBUTION_ID: &str = "per-well-distribution";

const PRODUCTION_LABEL: &str = "Producción (bpd)";
const WHISKER_SPAN: f64 = 1.5;

const DAILY_REQUIRES: [ProductionColumn; 2] = [ProductionColumn::Fecha, ProductionColumn::ProduccionBpd];
const PER_WELL_REQUIRES: [ProductionColumn; 2] = [ProductionColumn::Pozo, ProductionColumn::ProduccionBpd];

pub fn daily_total(table: &Table, capabilities: &Capabilities) -> AppResult<ChartPanel> {
    let title = "Producción Total Diaria (barriles por día)";
    if !capabilities.has_all(&DAILY_REQUIRES) {
        return Ok(skipped(
            DAILY_TOTAL_ID,
            title,
            "Las columnas 'Fecha' o 'Produccion_bpd' no están disponibles para graficar producción diaria.",
            capabilities,
            &DAILY_REQUIRES,
        ));
    }

    let grouped = table.group_sum(ProductionColumn::Fecha.as_str(), ProductionColumn::ProduccionBpd.as_str())?;
    let points = grouped
        .rows()
        .iter()
        .map(|row| SeriesPoint {
            x: row[0].clone(),
            y: row[1].as_f64().unwrap_or(0.0),
        })
        .collect();

    Ok(rendered(
        DAILY_TOTAL_ID,
        title,
        ChartSpec::Line {
            x_label: "Fecha".to_string(),
            y_label: PRODUCTION_LABEL.to_string(),
            points,
        },
    ))
}

pub fn per_well(table: &Table, capabilities: &Capabilities) -> ChartPanel {
    let title = "Producción por Pozo";
    let (Some(wells), Some(volumes)) = well_columns(table, capabilities) else {
        return skipped(
            PER_WELL_ID,
            title,
            "No se encontraron columnas 'Pozo' o 'Produccion_bpd' para graficar producción por pozo.",
            capabilities,
            &PER_WELL_REQUIRES,
        );
    };

    let bars = wells
        .zip(volumes)
        .map(|(well, volume)| BarPoint {
            x: well.display_text(),
            y: volume.as_f64(),
        })
        .collect();

    rendered(
        PER_WELL_ID,
        title,
        ChartSpec::Bar {
            x_label: "Pozo".to_string(),
            y_label: PRODUCTION_LABEL.to_string(),
            bars,
        },
    )
}

pub fn per_well_distribution(table: &Table, capabilities: &Capabilities) -> ChartPanel {
    let title = "Distribución de producción por pozo";
    let (Some(wells), Some(volumes)) = well_columns(table, capabilities) else {
        return skipped(
            PER_WELL_DISTRIBUTION_ID,
            title,
            "No se encontraron columnas 'Pozo' o 'Produccion_bpd' para graficar la distribución por pozo.",
            capabilities,
            &PER_WELL_REQUIRES,
        );
    };

    let mut partitions: Vec<(String, Vec<f64>)> = Vec::new();
    for (well, volume) in wells.zip(volumes) {
        if well.is_null() {
            continue;
        }
        let name = well.display_text();
        let index = match partitions.iter().position(|(existing, _)| *existing == name) {
            Some(index) => index,
            None => {
                partitions.push((name, Vec::new()));
                partitions.len() - 1
            }
        };
        if let Some(value) = volume.as_f64() {
            partitions[index].1.push(value);
        }
    }

    let groups = partitions
        .into_iter()
        .filter_map(|(name, values)| box_group(name, values))
        .collect();

    rendered(
        PER_WELL_DISTRIBUTION_ID,
        title,
        ChartSpec::Box {
            x_label: "Pozo".to_string(),
            y_label: PRODUCTION_LABEL.to_string(),
            groups,
        },
    )
}

fn well_columns<'a>(
    table: &'a Table,
    capabilities: &Capabilities,
) -> (
    Option<impl Iterator<Item = &'a CellValue>>,
    Option<impl Iterator<Item = &'a CellValue>>,
) {
    if !capabilities.has_all(&PER_WELL_REQUIRES) {
        return (None, None);
    }
    (
        table.column(ProductionColumn::Pozo.as_str()),
        table.column(ProductionColumn::ProduccionBpd.as_str()),
    )
}

pub fn box_group(name: String, mut values: Vec<f64>) -> Option<BoxGroup> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|left, right| left.total_cmp(right));

    let q1 = quantile(&values, 0.25);
    let median = quantile(&values, 0.5);
    let q3 = quantile(&values, 0.75);
    let span = (q3 - q1) * WHISKER_SPAN;
    let lower_fence = q1 - span;
    let upper_fence = q3 + span;

    let lower_whisker = values.iter().copied().find(|value| *value >= lower_fence).unwrap_or(values[0]);
    let upper_whisker = values
        .iter()
        .rev()
        .copied()
        .find(|value| *value <= upper_fence)
        .unwrap_or(values[values.len() - 1]);
    let outliers = values
        .iter()
        .copied()
        .filter(|value| *value < lower_whisker || *value > upper_whisker)
        .collect();

    Some(BoxGroup {
        name,
        count: values.len(),
        min: values[0],
        q1,
        median,
        q3,
        max: values[values.len() - 1],
        lower_whisker,
        upper_whisker,
        outliers,
    })
}

fn quantile(sorted: &[f64], p: f64) -> f64 {
    let position = p * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
}

fn rendered(id: &str, title: &str, chart: ChartSpec) -> ChartPanel {
    ChartPanel {
        id: id.to_string(),
        title: title.to_string(),
        outcome: ChartOutcome::Rendered { chart },
    }
}

fn skipped(
    id: &str,
    title: &str,
    message: &str,
    capabilities: &Capabilities,
    required: &[ProductionColumn],
) -> ChartPanel {
    let missing = capabilities
        .missing(required)
        .iter()
        .map(|column| column.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    ChartPanel {
        id: id.to_string(),
        title: title.to_string(),
        outcome: ChartOutcome::Skipped {
            notice: Notice::warning(format!("{} Faltan: {}.", message, missing)),
        },
    }
}
