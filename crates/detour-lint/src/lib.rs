//! Rule file linting for the detour redirect proxy.
//!
//! Rule files hold one site's redirects as YAML or JSON, either as
//! `{ rules: [...] }` or as a bare list. This crate reports the problems the
//! proxy would otherwise only log at load time: rules it skips, patterns that
//! do not compile, and rules that load but cannot do what their author meant.
//!
//! # Example
//!
//! ```no_run
//! use detour_lint::{lint_directory, lint_file, LintOptions};
//! use std::path::Path;
//!
//! let result = lint_file(Path::new("rules/corporate.yaml"), &LintOptions::default());
//! let all = lint_directory(Path::new("rules"), &LintOptions::default());
//!
//! if all.has_errors() {
//!     eprintln!("Found {} errors", all.errors);
//! }
//! ```

mod types;
mod validator;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use types::{LintIssue, LintOptions, LintResult, Severity};
pub use validator::{validate_document, validate_rule};

/// Extensions the proxy reads, in the order it prefers them.
pub const RULE_FILE_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Document syntax of a rule file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    /// JSON for `.json`, YAML for everything else.
    pub fn from_path(path: &Path) -> Self {
        if path.extension().is_some_and(|ext| ext == "json") {
            Format::Json
        } else {
            Format::Yaml
        }
    }
}

/// Lint one rule file.
pub fn lint_file(path: &Path, options: &LintOptions) -> LintResult {
    match std::fs::read_to_string(path) {
        Ok(content) => lint_str(&content, path, Format::from_path(path), options),
        Err(e) => {
            let mut result = LintResult::new();
            result.files_checked = 1;
            result.add_issue(LintIssue::error("E001", format!("Failed to read file: {e}"), path));
            result
        }
    }
}

/// Lint every rule file in a directory (non-recursive).
///
/// Also reports sites that have more than one rule file, since the proxy only
/// reads the first one it finds.
pub fn lint_directory(path: &Path, options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();

    let files = match rule_files(path) {
        Ok(files) => files,
        Err(e) => {
            result.add_issue(LintIssue::error(
                "E001",
                format!("Failed to read directory: {e}"),
                path,
            ));
            return result;
        }
    };

    for file in &files {
        result.merge(lint_file(file, options));
    }
    check_shadowed_files(&files, &mut result);
    result
}

/// Lint rule file contents held in memory. `name` is used in reported issues.
pub fn lint_str(content: &str, name: &Path, format: Format, options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();
    result.files_checked = 1;

    let parsed: Result<serde_json::Value, String> = match format {
        Format::Json => serde_json::from_str(content).map_err(|e| format!("Invalid JSON: {e}")),
        Format::Yaml => serde_yaml::from_str(content).map_err(|e| format!("Invalid YAML: {e}")),
    };
    match parsed {
        Ok(document) => validate_document(name, &document, &mut result, options),
        Err(message) => result.add_issue(LintIssue::error("E002", message, name)),
    }
    result
}

/// Rule files directly under `dir`, sorted. A single file is returned as is.
pub fn rule_files(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| RULE_FILE_EXTENSIONS.contains(&e))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn check_shadowed_files(files: &[PathBuf], result: &mut LintResult) {
    let mut by_site: BTreeMap<&str, Vec<&PathBuf>> = BTreeMap::new();
    for file in files {
        if let Some(stem) = file.file_stem().and_then(|s| s.to_str()) {
            by_site.entry(stem).or_default().push(file);
        }
    }

    for (site, mut site_files) in by_site {
        if site_files.len() < 2 {
            continue;
        }
        site_files.sort_by_key(|f| {
            let ext = f.extension().and_then(|e| e.to_str()).unwrap_or_default();
            RULE_FILE_EXTENSIONS.iter().position(|known| *known == ext)
        });
        let (read, ignored) = site_files.split_at(1);
        for file in ignored {
            result.add_issue(
                LintIssue::warning(
                    "W006",
                    format!(
                        "Site '{site}' has several rule files; only {} is read",
                        read[0].display()
                    ),
                    file,
                )
                .with_suggestion("Merge the rules into one file per site"),
            );
        }
    }
}
