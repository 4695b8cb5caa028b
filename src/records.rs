// Warehouse Records - typed views of the financial and tourism tables
// Field names follow the warehouse columns so rows decode and re-encode unchanged

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::warehouse::Row;

pub const FINANCIAL_TABLE: &str = "ART_CULTURE_FINANCIAL_DATA";
pub const TOURISM_TABLE: &str = "TOURISM_DATA";

/// Art & culture grants for one state in one financial year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRecord {
    #[serde(rename = "STATE_UT")]
    pub state_ut: String,

    #[serde(rename = "FINANCIAL_YEAR")]
    pub financial_year: String,

    #[serde(rename = "NO_OF_ORGS", default)]
    pub no_of_orgs: u32,

    #[serde(rename = "AMOUNT_RS_IN_LAKHS", alias = "AMOUNT_Rs_IN_LAKHS", default)]
    pub amount_rs_in_lakhs: f64,

    #[serde(rename = "CREATED_AT", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Visitor numbers plus the category flags for one state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourismRecord {
    #[serde(rename = "STATE")]
    pub state: String,

    #[serde(rename = "DOMESTIC_TOURIST_VISITS_MILLION", default)]
    pub domestic_visits_million: f64,

    #[serde(rename = "FOREIGN_TOURIST_VISITS_MILLION", default)]
    pub foreign_visits_million: f64,

    #[serde(rename = "HAS_ART", default, deserialize_with = "flag")]
    pub has_art: bool,

    #[serde(rename = "HAS_CULTURE", default, deserialize_with = "flag")]
    pub has_culture: bool,

    #[serde(rename = "HAS_TOURISM", default, deserialize_with = "flag")]
    pub has_tourism: bool,

    #[serde(rename = "CREATED_AT", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Row that did not match the expected record shape
#[derive(Debug, Error)]
#[error("row {index} is not a valid {table} record: {source}")]
pub struct RecordError {
    pub table: &'static str,
    pub index: usize,
    #[source]
    pub source: serde_json::Error,
}

/// Decode warehouse rows into typed records, failing on the first bad row
pub fn from_rows<T: DeserializeOwned>(table: &'static str, rows: Vec<Row>) -> Result<Vec<T>, RecordError> {
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            serde_json::from_value(serde_json::Value::Object(row))
                .map_err(|source| RecordError { table, index, source })
        })
        .collect()
}

// Booleans arrive as real booleans, 0/1 integers (SQLite) or Yes/No strings (CSV uploads)
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Null => Ok(false),
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::Number(n) => Ok(n.as_f64().map(|v| v != 0.0).unwrap_or(false)),
        serde_json::Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" | "" => Ok(false),
            other => Err(de::Error::custom(format!("unrecognised flag value '{}'", other))),
        },
        other => Err(de::Error::custom(format!("unrecognised flag value {}", other))),
    }
}
