pub mod commands;
pub mod parse;
pub mod types;

pub use parse::{check_mapping, parse_create_table, parse_csv_mapping};
pub use types::{Column, CsvMapping, MappingField};
