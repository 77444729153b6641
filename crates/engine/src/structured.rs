//! Structured configuration documents
//!
//! JSON artifacts are normalized before they are hashed or written: authoring
//! annotations are dropped, home-directory placeholders are substituted and
//! the document is re-serialized in canonical form. The canonical bytes then
//! go through the same classification as any other file.

use crate::error::{Error, Result};
use crate::sync::{FileSync, SyncReport};
use crate::system::System;
use serde_json::{Map, Value};
use stowage_config::Config;
use stowage_core::path::{AbsPath, RelPath};
use tracing::{debug, warn};

/// Bracketed home placeholder
pub const HOME_PLACEHOLDER: &str = "${HOME}";

/// Bare home placeholder, only replaced when not followed by an identifier character
pub const BARE_HOME_PLACEHOLDER: &str = "$HOME";

/// How structured documents are normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredSettings {
    /// Object keys starting with this prefix are removed
    pub annotation_prefix: String,
    /// Lowercase extensions (without dot) routed through normalization
    pub extensions: Vec<String>,
    /// Substituted for home placeholders; placeholders are kept when `None`
    pub home: Option<String>,
}

impl StructuredSettings {
    /// Take settings from configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            annotation_prefix: config.structured.annotation_prefix.clone(),
            extensions: config
                .structured
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            home: config
                .home_dir()
                .map(|home| home.to_string_lossy().into_owned()),
        }
    }
}

/// Synchronizes structured documents through a [`FileSync`]
pub struct StructuredSync<'a, S: System> {
    files: &'a FileSync<'a, S>,
    settings: &'a StructuredSettings,
}

impl<'a, S: System> StructuredSync<'a, S> {
    /// Render with `settings`, then apply through `files`
    pub fn new(files: &'a FileSync<'a, S>, settings: &'a StructuredSettings) -> Self {
        Self { files, settings }
    }

    /// Whether `artifact` is a structured document
    pub fn handles(&self, artifact: &RelPath) -> bool {
        artifact
            .extension()
            .is_some_and(|ext| self.settings.extensions.iter().any(|e| *e == ext))
    }

    /// Normalize `source` and synchronize the canonical bytes onto `dest`
    ///
    /// The integrity gate applies to the raw shipped bytes. When the document
    /// does not parse, it is copied verbatim and the report is flagged.
    ///
    /// # Errors
    ///
    /// Same as [`FileSync::sync`].
    pub fn sync(&self, source: &AbsPath, dest: &AbsPath, artifact: &RelPath) -> Result<SyncReport> {
        if self.files.is_blocked(dest)? {
            warn!(dest = %dest, "Destination is a symbolic link, refusing to write");
            return Ok(SyncReport::blocked(dest));
        }

        let (raw, mode) = self.files.read_source(source, artifact)?;

        match self.render(&raw) {
            Ok(canonical) => {
                debug!(artifact = %artifact, "Normalized structured document");
                self.files.apply(&canonical, mode, dest)
            }
            Err(message) => {
                let err = Error::ParseFailure {
                    path: source.as_path().to_path_buf(),
                    message,
                };
                warn!(error = %err, "Installing document verbatim");
                let mut report = self.files.apply(&raw, mode, dest)?;
                report.parse_fallback = true;
                Ok(report)
            }
        }
    }

    /// Parse, strip, substitute and canonicalize a document
    ///
    /// Returns the parser's message when `content` is not valid JSON.
    pub fn render(&self, content: &[u8]) -> std::result::Result<Vec<u8>, String> {
        let mut value: Value = serde_json::from_slice(content).map_err(|e| e.to_string())?;
        strip_annotations(&mut value, &self.settings.annotation_prefix);
        if let Some(home) = &self.settings.home {
            resolve_home_placeholders(&mut value, home);
        }
        Ok(canonicalize(&value))
    }
}

/// Remove every object key starting with `prefix`, at any depth
pub fn strip_annotations(value: &mut Value, prefix: &str) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !key.starts_with(prefix));
            for child in map.values_mut() {
                strip_annotations(child, prefix);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_annotations(item, prefix);
            }
        }
        _ => {}
    }
}

/// Substitute `home` for home placeholders in every string value
///
/// Object keys are left as they are.
pub fn resolve_home_placeholders(value: &mut Value, home: &str) {
    match value {
        Value::String(text) => {
            if text.contains('$') {
                *text = substitute_home(text, home);
            }
        }
        Value::Object(map) => {
            for child in map.values_mut() {
                resolve_home_placeholders(child, home);
            }
        }
        Value::Array(items) => {
            for item in items {
                resolve_home_placeholders(item, home);
            }
        }
        _ => {}
    }
}

fn substitute_home(text: &str, home: &str) -> String {
    let mut out = String::with_capacity(text.len() + home.len());
    let mut rest = text;

    while let Some(at) = rest.find('$') {
        out.push_str(&rest[..at]);
        let tail = &rest[at..];

        if let Some(after) = tail.strip_prefix(HOME_PLACEHOLDER) {
            out.push_str(home);
            rest = after;
        } else if let Some(after) = tail
            .strip_prefix(BARE_HOME_PLACEHOLDER)
            .filter(|after| !after.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_'))
        {
            out.push_str(home);
            rest = after;
        } else {
            out.push('$');
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}

/// Canonical serialization: keys sorted at every level, two-space indent,
/// trailing newline
///
/// Re-parsing the output and canonicalizing again yields identical bytes.
#[must_use]
pub fn canonicalize(value: &Value) -> Vec<u8> {
    let sorted = sort_keys(value);
    // Serializing a `Value` cannot fail: every map key is already a string
    let mut out = serde_json::to_vec_pretty(&sorted).unwrap_or_default();
    out.push(b'\n');
    out
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, child)| (key.clone(), sort_keys(child)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::sync::{SyncOutcome, SyncSettings};
    use crate::system::RealSystem;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn settings(home: Option<&str>) -> StructuredSettings {
        StructuredSettings {
            annotation_prefix: "_comment".to_string(),
            extensions: vec!["json".to_string()],
            home: home.map(str::to_string),
        }
    }

    #[test]
    fn test_strip_annotations_recurses_into_lists() {
        let mut value = json!({
            "_comment": "top",
            "hooks": [
                {"_comment_why": "note", "command": "guard"},
                {"matcher": "Bash", "nested": {"_comment": 1, "keep": true}}
            ],
            "keep_comment": "stays"
        });
        strip_annotations(&mut value, "_comment");

        assert_eq!(
            value,
            json!({
                "hooks": [
                    {"command": "guard"},
                    {"matcher": "Bash", "nested": {"keep": true}}
                ],
                "keep_comment": "stays"
            })
        );
    }

    #[test]
    fn test_home_placeholders() {
        let home = "/home/ada";
        let cases = [
            ("${HOME}/bin", "/home/ada/bin"),
            ("$HOME/bin", "/home/ada/bin"),
            ("$HOME", "/home/ada"),
            ("a:${HOME}:$HOME:b", "a:/home/ada:/home/ada:b"),
            ("$HOMEDIR/x", "$HOMEDIR/x"),
            ("$HOME_X", "$HOME_X"),
            ("cost: $5", "cost: $5"),
            ("${HOMEPATH}", "${HOMEPATH}"),
            ("trailing $", "trailing $"),
        ];
        for (input, expected) in cases {
            assert_eq!(substitute_home(input, home), expected, "input {input:?}");
        }
    }

    #[test]
    fn test_placeholders_only_in_values() {
        let mut value = json!({"$HOME": ["$HOME/.cache", 3, null]});
        resolve_home_placeholders(&mut value, "/h");
        assert_eq!(value, json!({"$HOME": ["/h/.cache", 3, null]}));
    }

    #[test]
    fn test_canonical_form() {
        let value: Value = serde_json::from_str(r#"{"b":1,"a":{"z":[1,{"y":2,"x":1}],"c":"s"}}"#)
            .unwrap();
        let canonical = String::from_utf8(canonicalize(&value)).unwrap();
        let expected = "{\n  \"a\": {\n    \"c\": \"s\",\n    \"z\": [\n      1,\n      {\n        \"x\": 1,\n        \"y\": 2\n      }\n    ]\n  },\n  \"b\": 1\n}\n";
        assert_eq!(canonical, expected);
    }

    #[test]
    fn test_canonical_form_is_a_fixed_point() {
        let canonical = StructuredSync::new(
            &FileSync::new(&RealSystem, &SyncSettings::default()),
            &settings(Some("/home/ada")),
        )
        .render(br#"{ "z": 1.5, "_comment": "x", "a": ["$HOME", {"k": -0.25e3}] }"#)
        .unwrap();

        let again = canonicalize(&serde_json::from_slice(&canonical).unwrap());
        assert_eq!(canonical, again);
    }

    #[test]
    fn test_whitespace_only_rebuild_is_unchanged() {
        let temp = TempDir::new().unwrap();
        let source = AbsPath::from_path(&temp.path().join("settings.json")).unwrap();
        let dest = AbsPath::from_path(&temp.path().join("out/settings.json")).unwrap();
        let artifact = RelPath::from_manifest_key("settings.json").unwrap();

        let sync_settings = SyncSettings::default();
        let files = FileSync::new(&RealSystem, &sync_settings);
        let doc_settings = settings(None);
        let structured = StructuredSync::new(&files, &doc_settings);

        fs::write(source.as_path(), br#"{"a":1,"b":[1,2]}"#).unwrap();
        let first = structured.sync(&source, &dest, &artifact).unwrap();
        assert_eq!(first.outcome, SyncOutcome::Installed);

        fs::write(
            source.as_path(),
            b"{\n\t\"b\" : [ 1, 2 ],\n\t\"_comment\": \"rebuilt\",\n\t\"a\" : 1\n}\n",
        )
        .unwrap();
        let second = structured.sync(&source, &dest, &artifact).unwrap();
        assert_eq!(second.outcome, SyncOutcome::Unchanged);
    }

    #[test]
    fn test_parse_failure_falls_back_to_raw_copy() {
        let temp = TempDir::new().unwrap();
        let source = AbsPath::from_path(&temp.path().join("broken.json")).unwrap();
        let dest = AbsPath::from_path(&temp.path().join("out/broken.json")).unwrap();
        let artifact = RelPath::from_manifest_key("broken.json").unwrap();

        let sync_settings = SyncSettings::default();
        let files = FileSync::new(&RealSystem, &sync_settings);
        let doc_settings = settings(None);
        let structured = StructuredSync::new(&files, &doc_settings);

        fs::write(source.as_path(), b"{ not json").unwrap();
        let report = structured.sync(&source, &dest, &artifact).unwrap();

        assert!(report.parse_fallback);
        assert_eq!(report.outcome, SyncOutcome::Installed);
        assert_eq!(fs::read(dest.as_path()).unwrap(), b"{ not json");
    }

    #[test]
    fn test_handles_by_extension() {
        let sync_settings = SyncSettings::default();
        let files = FileSync::new(&RealSystem, &sync_settings);
        let doc_settings = settings(None);
        let structured = StructuredSync::new(&files, &doc_settings);

        assert!(structured.handles(&RelPath::from_manifest_key("a/settings.JSON").unwrap()));
        assert!(!structured.handles(&RelPath::from_manifest_key("a/guard.sh").unwrap()));
        assert!(!structured.handles(&RelPath::from_manifest_key("Makefile").unwrap()));
    }
}
