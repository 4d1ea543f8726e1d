// src/schema/parse.rs

use anyhow::{anyhow, bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument, trace, warn};

use super::types::{Column, CsvMapping, MappingField};

static CREATE_TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*\.create\s+table\s+(\w+)\s*\((.*)\)\s*$")
        .expect("create-table regex should compile")
});

static CREATE_MAPPING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*\.create\s+table\s+(\w+)\s+ingestion\s+csv\s+mapping\s+'([^']+)'\s+'(.*)'\s*$")
        .expect("create-mapping regex should compile")
});

/// Parse a `.create table T (col: type, ...)` command into its table name
/// and ordered column list.
#[instrument(level = "debug", skip(command), fields(command_len = command.len()))]
pub fn parse_create_table(command: &str) -> Result<(String, Vec<Column>)> {
    let caps = CREATE_TABLE_RE.captures(command).ok_or_else(|| {
        warn!("not a .create table command");
        anyhow!("not a .create table command")
    })?;
    let table = caps[1].to_owned();
    let body = &caps[2];

    let mut columns = Vec::new();
    for raw in body.split(',') {
        let s = raw.trim();
        if s.is_empty() {
            continue;
        }
        let (name, ty) = s
            .split_once(':')
            .with_context(|| format!("bad column declaration `{}`", s))?;
        let (name, ty) = (name.trim(), ty.trim());
        if name.is_empty() || ty.is_empty() {
            bail!("bad column declaration `{}`", s);
        }
        trace!(name = %name, ty = %ty, "parsed column");
        columns.push(Column {
            name: name.to_owned(),
            ty: ty.to_owned(),
        });
    }

    debug!(table = %table, columns = columns.len(), "parsed create-table command");
    Ok((table, columns))
}

/// Parse a `.create table T ingestion csv mapping 'name' '[...]'` command.
#[instrument(level = "debug", skip(command), fields(command_len = command.len()))]
pub fn parse_csv_mapping(command: &str) -> Result<CsvMapping> {
    let caps = CREATE_MAPPING_RE.captures(command).ok_or_else(|| {
        warn!("not a csv mapping command");
        anyhow!("not a .create table ... ingestion csv mapping command")
    })?;

    let fields: Vec<MappingField> =
        serde_json::from_str(&caps[3]).context("parsing mapping field list")?;

    debug!(table = &caps[1], mapping = &caps[2], fields = fields.len(), "parsed mapping command");
    Ok(CsvMapping {
        table: caps[1].to_owned(),
        name: caps[2].to_owned(),
        fields,
    })
}

/// Check that every mapping field targets an existing column of the same
/// type, and that no column or source ordinal is bound twice.
pub fn check_mapping(columns: &[Column], mapping: &CsvMapping) -> Result<()> {
    let by_name: HashMap<&str, &str> = columns
        .iter()
        .map(|c| (c.name.as_str(), c.ty.as_str()))
        .collect();

    let mut seen_names = HashSet::new();
    let mut seen_ordinals = HashSet::new();
    for field in &mapping.fields {
        let ty = by_name.get(field.name.as_str()).ok_or_else(|| {
            anyhow!(
                "mapping `{}` binds unknown column `{}`",
                mapping.name,
                field.name
            )
        })?;
        if *ty != field.datatype {
            bail!(
                "mapping `{}` declares `{}` as {} but the table has {}",
                mapping.name,
                field.name,
                field.datatype,
                ty
            );
        }
        if !seen_names.insert(field.name.as_str()) {
            bail!("mapping `{}` binds `{}` twice", mapping.name, field.name);
        }
        if !seen_ordinals.insert(field.ordinal) {
            bail!("mapping `{}` reuses ordinal {}", mapping.name, field.ordinal);
        }
    }
    Ok(())
}
