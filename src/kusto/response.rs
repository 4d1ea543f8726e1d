// src/kusto/response.rs

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of a v1 REST response: one or more tables of rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KustoResponse {
    #[serde(rename = "Tables", default)]
    pub tables: Vec<KustoTable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KustoTable {
    #[serde(rename = "TableName", default)]
    pub table_name: String,
    #[serde(rename = "Columns", default)]
    pub columns: Vec<KustoColumn>,
    #[serde(rename = "Rows", default)]
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KustoColumn {
    #[serde(rename = "ColumnName")]
    pub name: String,
    #[serde(rename = "DataType", default)]
    pub data_type: Option<String>,
    #[serde(rename = "ColumnType", default)]
    pub column_type: Option<String>,
}

impl KustoResponse {
    /// The first table, which carries the command's result for mgmt calls.
    pub fn primary(&self) -> Result<&KustoTable> {
        self.tables
            .first()
            .ok_or_else(|| anyhow!("response contained no tables"))
    }
}

impl KustoTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Every row's value in column `name`, as strings. Nulls are skipped.
    pub fn string_column(&self, name: &str) -> Result<Vec<String>> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| anyhow!("column `{}` not in table `{}`", name, self.table_name))?;
        Ok(self
            .rows
            .iter()
            .filter_map(|row| row.get(idx))
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect())
    }
}

/// Pull the human-readable message out of a service error body, if any.
pub fn service_error_message(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    let err = v.get("error")?;
    err.get("@message")
        .or_else(|| err.get("message"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}
