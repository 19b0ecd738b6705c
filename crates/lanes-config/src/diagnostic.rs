// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns figment extraction errors into miette diagnostics.
//!
//! Errors are located in the TOML source when possible. Array tables are
//! resolved by index, so a typo in the third `[[channel.plugin]]` of the
//! second `[[channel]]` points at that table and not the first one.

#![allow(unused_assignments)] // miette's Diagnostic derive triggers this lint

use std::collections::HashMap;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity for a "did you mean" hint.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// Tables written as `[[...]]` in `lanes.toml`.
const ARRAY_TABLES: &[&str] = &["channel", "channel.plugin"];

/// A configuration error with diagnostic information.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` in {table}")]
    #[diagnostic(code(lanes::config::unknown_key), help("{hint}"))]
    UnknownKey {
        key: String,
        /// Table the key appeared in, e.g. `[[channel.plugin]]`.
        table: String,
        suggestion: Option<String>,
        hint: String,
        #[label("unknown key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid value for `{key}`: {detail}")]
    #[diagnostic(code(lanes::config::invalid_type), help("{hint}"))]
    InvalidType {
        key: String,
        detail: String,
        hint: String,
        #[label("wrong type")]
        span: Option<SourceSpan>,
        expected: String,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("{table} is missing `{key}`")]
    #[diagnostic(code(lanes::config::missing_key), help("{hint}"))]
    MissingKey {
        key: String,
        table: String,
        hint: String,
    },

    /// A semantic check failed after parsing.
    #[error("validation error: {message}")]
    #[diagnostic(code(lanes::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(lanes::config::other))]
    Other(String),
}

/// Converts a `figment::Error` (which may hold several errors) into diagnostics.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| convert(&error, toml_sources))
        .collect()
}

fn convert(error: &figment::error::Error, toml_sources: &[(String, String)]) -> ConfigError {
    use figment::error::Kind;

    match &error.kind {
        Kind::UnknownField(field, expected) => {
            let table = table_label(&error.path);
            let suggestion = closest_key(field, expected);
            let hint = match &suggestion {
                Some(s) => format!("did you mean `{s}`? {table} accepts: {}", expected.join(", ")),
                None => format!("{table} accepts: {}", expected.join(", ")),
            };
            let located = locate(error, &error.path, field, toml_sources);
            ConfigError::UnknownKey {
                key: field.clone(),
                table,
                suggestion,
                hint,
                span: located.as_ref().map(|(span, _)| *span),
                src: located.map(|(_, src)| src),
            }
        }
        Kind::MissingField(field) => {
            let table = table_label(&error.path);
            ConfigError::MissingKey {
                hint: missing_key_hint(&table, field),
                key: field.to_string(),
                table,
            }
        }
        Kind::InvalidType(actual, expected) => {
            let (parent, field) = match error.path.split_last() {
                Some((last, parent)) => (parent, last.as_str()),
                None => (&error.path[..], ""),
            };
            let located = locate(error, parent, field, toml_sources);
            ConfigError::InvalidType {
                key: error.path.join("."),
                detail: format!("found {actual}"),
                hint: value_hint(field, &expected.to_string()),
                span: located.as_ref().map(|(span, _)| *span),
                expected: expected.to_string(),
                src: located.map(|(_, src)| src),
            }
        }
        _ => ConfigError::Other(error.to_string()),
    }
}

/// Describes the table `path` points into, as written in `lanes.toml`.
fn table_label(path: &[String]) -> String {
    let dotted = TablePath::parse(path).dotted();
    if dotted.is_empty() {
        "the top level".to_string()
    } else if ARRAY_TABLES.contains(&dotted.as_str()) {
        format!("[[{dotted}]]")
    } else {
        format!("[{dotted}]")
    }
}

fn missing_key_hint(table: &str, key: &str) -> String {
    match (table, key) {
        ("[[channel]]", "name") => "every [[channel]] needs a `name`, unique across the file".into(),
        ("[[channel.plugin]]", "type") => {
            "set `type` to a qualified (`demo::Echo`) or short (`Echo`) plugin type".into()
        }
        ("[[channel.plugin]]", "name") => {
            "set `name` to an instance name, unique within its channel".into()
        }
        _ => format!("add `{key} = <value>` under {table}"),
    }
}

fn value_hint(field: &str, expected: &str) -> String {
    if field.ends_with("_ms") {
        format!("use {expected}: a whole number of milliseconds")
    } else if field == "id" {
        "use a UUID string, e.g. \"6f1c1b84-4c1e-4f55-9a8b-0d7e3b8a9f10\"".into()
    } else if field == "paths" {
        "use a list of manifest files or directories, e.g. [\"/usr/lib/lanes\"]".into()
    } else {
        format!("use {expected}")
    }
}

fn locate(
    error: &figment::error::Error,
    table: &[String],
    field: &str,
    toml_sources: &[(String, String)],
) -> Option<(SourceSpan, NamedSource<String>)> {
    let file = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });

    // Inline sources have no path; fall back to the only source supplied.
    let (name, content) = match file {
        Some(path) => toml_sources.iter().find(|(p, _)| *p == path)?,
        None if toml_sources.len() == 1 => toml_sources.first()?,
        None => return None,
    };
    let offset = find_key_offset(content, table, field)?;
    Some((
        SourceSpan::new(offset.into(), field.len()),
        NamedSource::new(name, content.clone()),
    ))
}

/// A figment path split into table names and array indexes.
struct TablePath {
    segments: Vec<(String, Option<usize>)>,
}

impl TablePath {
    fn parse(path: &[String]) -> Self {
        let mut segments: Vec<(String, Option<usize>)> = Vec::new();
        for part in path {
            match part.parse::<usize>() {
                Ok(index) => {
                    if let Some(last) = segments.last_mut() {
                        last.1 = Some(index);
                    }
                }
                Err(_) => segments.push((part.clone(), None)),
            }
        }
        Self { segments }
    }

    fn dotted(&self) -> String {
        self.segments
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    fn matches_table(&self, header: &str) -> bool {
        self.segments.iter().all(|(_, index)| index.is_none()) && self.dotted() == header
    }

    /// Whether the array-table header just seen is the entry this path names,
    /// given how many entries of each array table have been seen so far.
    fn matches_array(&self, header: &str, seen: &HashMap<String, usize>) -> bool {
        if self.dotted() != header {
            return false;
        }
        let mut prefix = String::new();
        self.segments.iter().all(|(name, index)| {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(name);
            index.is_none_or(|i| seen.get(&prefix) == Some(&i))
        })
    }
}

enum Header<'a> {
    Table(&'a str),
    Array(&'a str),
}

fn parse_header(line: &str) -> Option<Header<'_>> {
    if let Some(rest) = line.strip_prefix("[[") {
        return rest.split_once("]]").map(|(name, _)| Header::Array(name.trim()));
    }
    line.strip_prefix('[')
        .and_then(|rest| rest.split_once(']'))
        .map(|(name, _)| Header::Table(name.trim()))
}

/// Finds the byte offset of `field` inside the table `path` names.
///
/// `path` is a figment path such as `["runtime"]` or
/// `["channel", "1", "plugin", "0"]`; an empty path is the top level.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let target = TablePath::parse(path);
    let mut in_target = target.segments.is_empty();
    // Zero-based index of the latest entry of each array table.
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        match parse_header(trimmed) {
            Some(Header::Array(name)) => {
                seen.entry(name.to_string())
                    .and_modify(|n| *n += 1)
                    .or_insert(0);
                // Nested arrays restart under every new parent entry.
                let nested = format!("{name}.");
                seen.retain(|key, _| !key.starts_with(&nested));
                in_target = target.matches_array(name, &seen);
            }
            Some(Header::Table(name)) => in_target = target.matches_table(name),
            None if in_target => {
                if let Some(after) = trimmed.strip_prefix(field)
                    && after.trim_start().starts_with('=')
                {
                    return Some(offset + (line.len() - trimmed.len()));
                }
            }
            None => {}
        }
        offset += line.len();
    }
    None
}

/// The valid key closest to `unknown`, if any is similar enough.
pub fn closest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Renders errors to stderr using miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
}
