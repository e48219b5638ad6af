//! `server.properties` codec.
//!
//! The file is a flat `key=value` list with `#` comments. Edits must not
//! reorder entries or drop comments, since the server ships the file with
//! documentation inline; parsing keeps every line and only rewrites the
//! value part of touched entries.

use std::path::Path;

use anyhow::Context;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry { key: String, value: String },
    /// Comments, blank lines, and anything else left byte-for-byte intact.
    Raw(String),
}

#[derive(Debug, Clone, Default)]
pub struct ServerProperties {
    lines: Vec<Line>,
}

impl ServerProperties {
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|line| {
                let trimmed = line.trim_start();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    return Line::Raw(line.to_string());
                }
                match line.split_once('=') {
                    Some((key, value)) => Line::Entry {
                        key: key.trim().to_string(),
                        value: value.trim().to_string(),
                    },
                    None => Line::Raw(line.to_string()),
                }
            })
            .collect();
        Self { lines }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.render())
            .with_context(|| format!("write {}", path.display()))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Entry { key: k, value } if k.as_str() == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Rewrites the first entry with `key`, or appends a new one.
    pub fn set(&mut self, key: &str, value: &str) {
        for line in &mut self.lines {
            if let Line::Entry { key: k, value: v } = line
                && k.as_str() == key
            {
                *v = value.to_string();
                return;
            }
        }
        self.lines.push(Line::Entry {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    /// Applies comma-separated `key=value` pairs (the
    /// `BEDROCK_PROPERTY_OVERRIDES` format) and returns how many were
    /// applied. Malformed pairs are logged and skipped.
    pub fn apply_overrides(&mut self, overrides: &str) -> usize {
        let mut applied = 0;
        for pair in overrides.split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            match pair.split_once('=') {
                Some((key, value)) => {
                    self.set(key.trim(), value.trim());
                    applied += 1;
                }
                None => tracing::warn!(pair, "ignoring malformed property override"),
            }
        }
        applied
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry { key, value } => Some((key.as_str(), value.as_str())),
            Line::Raw(_) => None,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Entry { key, value } => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value);
                }
                Line::Raw(raw) => out.push_str(raw),
            }
            out.push('\n');
        }
        out
    }
}
