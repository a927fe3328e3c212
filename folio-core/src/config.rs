//! Configuration parsing and management.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// Engine configuration matching the folio.yml schema. Every section is
/// optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub editor: EditorConfig,

    #[serde(default)]
    pub highlight: HighlightConfig,

    #[serde(default)]
    pub markdown: MarkdownConfig,

    #[serde(default)]
    pub images: ImageConfig,

    #[serde(default)]
    pub html: HtmlConfig,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Turn web and email addresses in text into links
    #[serde(default = "default_true")]
    pub autolink: bool,

    /// Keep an empty paragraph after a final code block, table or display
    /// equation
    #[serde(default = "default_true")]
    pub trailing_paragraph: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            autolink: true,
            trailing_paragraph: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightConfig {
    /// Tokenize code blocks with syntect. When off, code is still split into
    /// lines but carries no token classes.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkdownConfig {
    /// Separate exported top-level blocks with an empty line
    #[serde(default = "default_true")]
    pub blank_line_between_blocks: bool,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            blank_line_between_blocks: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlConfig {
    /// Elements discarded with their whole subtree on paste
    #[serde(default = "default_drop_tags")]
    pub drop_tags: Vec<String>,
}

fn default_drop_tags() -> Vec<String> {
    ["script", "style", "head", "title", "meta", "link", "template"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for HtmlConfig {
    fn default() -> Self {
        Self {
            drop_tags: default_drop_tags(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        // An empty file is a valid, all-default config
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Get a config value using a dotted path (e.g., "images.max_upload_bytes")
    pub fn get(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["editor", "autolink"] => Some(self.editor.autolink.to_string()),
            ["editor", "trailing_paragraph"] => Some(self.editor.trailing_paragraph.to_string()),
            ["highlight", "enabled"] => Some(self.highlight.enabled.to_string()),
            ["markdown", "blank_line_between_blocks"] => {
                Some(self.markdown.blank_line_between_blocks.to_string())
            }
            ["images", "max_upload_bytes"] => Some(self.images.max_upload_bytes.to_string()),
            ["html", "drop_tags"] => Some(self.html.drop_tags.join(",")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert!(config.editor.autolink);
        assert!(config.editor.trailing_paragraph);
        assert!(config.highlight.enabled);
        assert!(config.markdown.blank_line_between_blocks);
        assert_eq!(config.images.max_upload_bytes, 10 * 1024 * 1024);
        assert!(config.html.drop_tags.iter().any(|t| t == "script"));
    }

    #[test]
    fn test_partial_yaml() {
        let config = Config::from_yaml("highlight:\n  enabled: false\nimages: {}\n").unwrap();
        assert!(!config.highlight.enabled);
        assert_eq!(config.images.max_upload_bytes, 10 * 1024 * 1024);
        assert!(config.markdown.blank_line_between_blocks);
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = Config::from_yaml("   \n").unwrap();
        assert!(config.highlight.enabled);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.yml");
        std::fs::write(&path, "images:\n  max_upload_bytes: 1024\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.images.max_upload_bytes, 1024);

        let missing = Config::from_file(dir.path().join("nope.yml"));
        assert!(matches!(missing, Err(ConfigError::ReadError(_))));
    }

    #[test]
    fn test_get_nested_value() {
        let config = Config::default();
        assert_eq!(config.get("highlight.enabled"), Some("true".into()));
        assert_eq!(
            config.get("images.max_upload_bytes"),
            Some("10485760".into())
        );
        assert_eq!(config.get("nonexistent.key"), None);
    }
}
