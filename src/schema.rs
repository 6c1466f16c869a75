use crate::table::Table;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProductionColumn {
    Fecha,
    Pozo,
    ProduccionBpd,
}

impl ProductionColumn {
    pub const ALL: [ProductionColumn; 3] = [Self::Fecha, Self::Pozo, Self::ProduccionBpd];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fecha => "Fecha",
            Self::Pozo => "Pozo",
            Self::ProduccionBpd => "Produccion_bpd",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Self::Fecha => 0b001,
            Self::Pozo => 0b010,
            Self::ProduccionBpd => 0b100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    present: u8,
}

impl Capabilities {
    pub fn detect(table: &Table) -> Self {
        let present = ProductionColumn::ALL
            .iter()
            .filter(|column| table.has_column(column.as_str()))
            .fold(0u8, |bits, column| bits | column.bit());
        Self { present }
    }

    pub fn from_columns(columns: &[ProductionColumn]) -> Self {
        Self {
            present: columns.iter().fold(0u8, |bits, column| bits | column.bit()),
        }
    }

    pub fn has(&self, column: ProductionColumn) -> bool {
        self.present & column.bit() != 0
    }

    pub fn has_all(&self, columns: &[ProductionColumn]) -> bool {
        columns.iter().all(|column| self.has(*column))
    }

    pub fn missing(&self, columns: &[ProductionColumn]) -> Vec<ProductionColumn> {
        columns.iter().copied().filter(|column| !self.has(*column)).collect()
    }

    pub fn present(&self) -> Vec<ProductionColumn> {
        ProductionColumn::ALL.iter().copied().filter(|column| self.has(*column)).collect()
    }
}
