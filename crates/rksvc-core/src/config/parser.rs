//! TOML parser with helpful error messages

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};

use super::schema::{ConfigDocument, SettingKey};

/// Parse the settings document at `path`.
pub fn parse_document(path: &Path) -> Result<ConfigDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_document_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

pub fn parse_document_str(content: &str) -> Result<ConfigDocument> {
    let table: toml::Table =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;
    Ok(ConfigDocument::from_table(table))
}

/// Enhance TOML parsing errors with the offending lines
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let error_msg = error.message().to_string();
    let line_num = error
        .span()
        .and_then(|span| content.get(..span.start))
        .map(|before| before.matches('\n').count() + 1);

    match line_num {
        Some(line_num) => anyhow::anyhow!(
            "TOML parsing error at line {}:\n{}\n\nError: {}",
            line_num,
            get_line_context(content, line_num),
            error_msg
        ),
        None => anyhow::anyhow!("TOML parsing error: {}", error_msg),
    }
}

fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());

    lines[start.min(end)..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

const DOCUMENT_HEADER: &str = "# Managed by `rksvc configure`. Keys not listed in config.example.toml are kept as-is.\n\n";

pub fn to_toml(document: &ConfigDocument) -> Result<String> {
    let body = toml::to_string(&document.to_table())
        .context("Failed to serialize configuration to TOML")?;
    Ok(format!("{DOCUMENT_HEADER}{body}"))
}

/// Reference document listing every recognised key at its default.
pub fn render_example() -> String {
    let mut out = String::from(
        "# Reference configuration for reasonkit-web.\n\
         # Regenerated by `rksvc configure`; edit config.toml instead.\n",
    );
    for key in SettingKey::ALL {
        let _ = write!(
            out,
            "\n# {}\n# Environment: {}\n{} = {}\n",
            key.description(),
            key.env_var(),
            key.name(),
            key.default_value().to_toml()
        );
    }
    out
}
