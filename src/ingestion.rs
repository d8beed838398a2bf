use std::borrow::Cow;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::geocode::{format_coordinate, Coordinates};

/// One row of cell text as produced by table extraction.
pub type RawRow = Vec<String>;

const BIP_SENTINEL: &str = "SI";
const BIP_LABEL: &str = "CARTA BIP";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub address: String,
    pub category: String,
    pub flag: String,
}

impl NormalizedRow {
    pub fn new(
        address: impl Into<String>,
        category: impl Into<String>,
        flag: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            category: category.into(),
            flag: flag.into(),
        }
    }

    pub fn finalize(&self, coords: Coordinates) -> FinalizedRow {
        FinalizedRow {
            address: self.address.clone(),
            category: self.category.clone(),
            flag: self.flag.clone(),
            lat: format_coordinate(coords.lat),
            lng: format_coordinate(coords.lng),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizedRow {
    pub address: String,
    pub category: String,
    pub flag: String,
    pub lat: String,
    pub lng: String,
}

/// Turns raw extracted rows into geocoder-ready rows.
///
/// `normalize` returns `None` for rows that should be skipped; a skip is never
/// an error. Schema-specific normalizers override `is_complete`, `repair` and
/// `compose` and keep the provided `normalize`.
pub trait RowNormalizer: Send + Sync {
    fn is_complete(&self, row: &[String]) -> bool {
        row.first().is_some_and(|cell| !cell.is_empty())
    }

    fn repair<'a>(&self, row: &'a [String]) -> Cow<'a, [String]> {
        Cow::Borrowed(row)
    }

    fn compose(&self, row: &[String]) -> Option<NormalizedRow> {
        let cell = |idx: usize| row.get(idx).cloned().unwrap_or_default();
        Some(NormalizedRow::new(cell(0), cell(1), cell(2)))
    }

    fn normalize(&self, row: &[String]) -> Option<NormalizedRow> {
        if !self.is_complete(row) {
            return None;
        }
        let repaired = self.repair(row);
        self.compose(&repaired)
            .filter(|normalized| !normalized.address.trim().is_empty())
    }
}

/// Rows already shaped as `(address, category, flag)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughNormalizer;

impl RowNormalizer for PassThroughNormalizer {}

/// Point-of-sale listing of the GTT "abbonamenti" PDF.
///
/// ```text
///        0                   1         2        3     4      5                   6    7
/// --------------------------------------------------------------------------------------
/// |    VIA|          INDIRIZZO|N° CIVICO| INTERNO|  CAP|CITTA'|     TIPO ESERCIZIO| BIP|
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct GttAbbNormalizer;

#[derive(Debug, Clone, PartialEq, Eq)]
struct GttAbbRecord<'a> {
    street_kind: &'a str,
    street: &'a str,
    number: &'a str,
    unit: &'a str,
    postcode: &'a str,
    city: &'a str,
    shop_kind: &'a str,
    bip: &'a str,
}

impl<'a> GttAbbRecord<'a> {
    const COLUMNS: usize = 8;

    fn from_cells(row: &'a [String]) -> Option<Self> {
        if row.len() < Self::COLUMNS {
            return None;
        }
        Some(Self {
            street_kind: &row[0],
            street: &row[1],
            number: &row[2],
            unit: &row[3],
            postcode: &row[4],
            city: &row[5],
            shop_kind: &row[6],
            bip: &row[7],
        })
    }

    fn address(&self) -> String {
        format!(
            "{} {} {} {}, {}, {}",
            self.street_kind, self.street, self.number, self.unit, self.postcode, self.city
        )
    }
}

impl RowNormalizer for GttAbbNormalizer {
    fn is_complete(&self, row: &[String]) -> bool {
        // multi line cells come out with empty fragments; nothing to recover there
        GttAbbRecord::from_cells(row).is_some_and(|record| {
            [record.street_kind, record.street, record.postcode, record.city]
                .iter()
                .all(|cell| !cell.is_empty())
        })
    }

    fn repair<'a>(&self, row: &'a [String]) -> Cow<'a, [String]> {
        match row.first() {
            Some(first) if is_duplicated(first) => {
                Cow::Owned(row.iter().map(|cell| back_half(cell).to_string()).collect())
            }
            _ => Cow::Borrowed(row),
        }
    }

    fn compose(&self, row: &[String]) -> Option<NormalizedRow> {
        let record = GttAbbRecord::from_cells(row)?;
        let flag = if record.bip == BIP_SENTINEL {
            BIP_LABEL
        } else {
            ""
        };
        Some(NormalizedRow::new(record.address(), record.shop_kind, flag))
    }
}

/// True when the cell is two identical halves. Odd lengths never qualify.
pub fn is_duplicated(cell: &str) -> bool {
    let len = cell.chars().count();
    if len == 0 || len % 2 != 0 {
        return false;
    }
    let (front, back) = cell.split_at(char_midpoint(cell));
    front == back
}

/// The back half of a cell. The back half is kept because the front copy of
/// the postcode column comes out mangled.
pub fn back_half(cell: &str) -> &str {
    &cell[char_midpoint(cell)..]
}

fn char_midpoint(cell: &str) -> usize {
    let edge = cell.chars().count() / 2;
    cell.char_indices()
        .nth(edge)
        .map(|(idx, _)| idx)
        .unwrap_or(cell.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TableSchema {
    #[default]
    GttAbb,
    PassThrough,
}

impl TableSchema {
    pub fn as_tag(&self) -> &'static str {
        match self {
            TableSchema::GttAbb => "gtt-abb",
            TableSchema::PassThrough => "pass-through",
        }
    }

    pub fn normalizer(&self) -> Box<dyn RowNormalizer> {
        match self {
            TableSchema::GttAbb => Box::new(GttAbbNormalizer),
            TableSchema::PassThrough => Box::new(PassThroughNormalizer),
        }
    }
}
