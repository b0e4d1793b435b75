use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use gpuasm_rs::{LabelTable, Line};

/// Reads a JSON array of lines as produced by the front end.
pub fn load_lines(path: &Path) -> Result<Vec<Line>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_lines(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn parse_lines(text: &str) -> Result<Vec<Line>> {
    Ok(serde_json::from_str(text)?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelKV {
    pub value: u64,
    pub name: String,
}

pub fn export_labels(labels: &LabelTable) -> Vec<LabelKV> {
    labels
        .entries()
        .into_iter()
        .map(|(name, value)| LabelKV { value, name: name.to_string() })
        .collect()
}
