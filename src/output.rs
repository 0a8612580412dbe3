//! Rendering of resource documents for the terminal

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use kubesift_types::ResourceDocument;

/// How selected documents are printed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// NAME / NAMESPACE / AGE table
    #[default]
    Name,
    Json,
    Yaml,
}

/// Render documents in the requested format
pub fn render(docs: &[ResourceDocument], format: OutputFormat, now: DateTime<Utc>) -> Result<String> {
    Ok(match format {
        OutputFormat::Name => table(docs, now),
        OutputFormat::Json => serde_json::to_string_pretty(docs)?,
        OutputFormat::Yaml => serde_yaml::to_string(docs)?,
    })
}

/// kubectl-style table, columns sized to the longest name
fn table(docs: &[ResourceDocument], now: DateTime<Utc>) -> String {
    let name_width = docs
        .iter()
        .map(|d| d.name().unwrap_or_default().len() + 2)
        .max()
        .unwrap_or(6)
        .max(6);
    let ns_width = docs
        .iter()
        .map(|d| d.namespace().unwrap_or_default().len() + 2)
        .max()
        .unwrap_or(11)
        .max(11);

    let mut out = format!(
        "{:<name_width$}{:<ns_width$}{}\n",
        "NAME", "NAMESPACE", "AGE"
    );
    for doc in docs {
        out.push_str(&format!(
            "{:<name_width$}{:<ns_width$}{}\n",
            doc.name().unwrap_or("<unnamed>"),
            doc.namespace().unwrap_or("-"),
            doc.age(now).unwrap_or_else(|| "<unknown>".to_string()),
        ));
    }
    out
}
