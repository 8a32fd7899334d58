//! TOML parser with helpful error messages

use super::TetherConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse tether.toml with detailed error messages
pub fn parse_tether_toml(path: &Path) -> Result<TetherConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_tether_toml_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse tether.toml content from string
pub fn parse_tether_toml_str(content: &str) -> Result<TetherConfig> {
    let config: TetherConfig =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;

    config.validate()?;

    Ok(config)
}

/// Enhance TOML parsing errors with the offending lines
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message().to_string();

    match error.span() {
        Some(span) => {
            let line_num = content[..span.start.min(content.len())]
                .matches('\n')
                .count()
                + 1;
            anyhow::anyhow!(
                "TOML parsing error at line {}:\n{}\n\nError: {}",
                line_num,
                get_line_context(content, line_num),
                message
            )
        }
        None => anyhow::anyhow!("TOML parsing error: {}", message),
    }
}

/// Get context lines around an error
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

/// Serialize a configuration to TOML string
pub fn to_toml(config: &TetherConfig) -> Result<String> {
    toml::to_string_pretty(config).with_context(|| "Failed to serialize configuration to TOML")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_valid_config() {
        let toml = r#"
[setup]
enabled = false
timeout_secs = 30

[diagnostics]
timings = true
"#;

        let config = parse_tether_toml_str(toml).unwrap();
        assert!(!config.setup.enabled);
        assert_eq!(config.setup.timeout_secs, 30);
        assert!(config.diagnostics.timings);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = parse_tether_toml_str("").unwrap();
        assert!(config.setup.enabled);
        assert_eq!(config.setup.timeout_secs, 600);
        assert!(!config.diagnostics.timings);
    }

    #[test]
    fn test_parse_invalid_toml_mentions_line() {
        let toml = "[setup]\nenabled = \"yes\"\n";

        let err = parse_tether_toml_str(toml).unwrap_err().to_string();
        assert!(err.contains("line 2"), "unexpected error: {err}");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = parse_tether_toml_str("[setup]\ntimeout_secs = 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[diagnostics]\ntimings = true").unwrap();

        let config = parse_tether_toml(file.path()).unwrap();
        assert!(config.diagnostics.timings);
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let mut original = TetherConfig::new();
        original.setup.timeout_secs = 45;
        original.diagnostics.timings = true;

        let toml_str = to_toml(&original).unwrap();
        let parsed = parse_tether_toml_str(&toml_str).unwrap();

        assert_eq!(parsed, original);
    }
}
