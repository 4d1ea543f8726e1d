// src/schema/types.rs

use serde::{Deserialize, Serialize};

/// A single column as declared by a `.create table` command.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct Column {
    pub name: String,
    pub ty: String,
}

/// One binding of a CSV ingestion mapping: source ordinal → target column.
///
/// Field names follow the JSON the service expects inside the mapping
/// command, so the embedded command deserializes straight into this.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct MappingField {
    #[serde(rename = "Name")]
    pub name: String,
    pub datatype: String,
    #[serde(rename = "Ordinal")]
    pub ordinal: u32,
}

/// A parsed `.create table <T> ingestion csv mapping '<name>' '<json>'` command.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct CsvMapping {
    pub table: String,
    pub name: String,
    pub fields: Vec<MappingField>,
}
