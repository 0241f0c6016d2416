//! Core validation logic for redirect rule files.

use crate::types::{LintIssue, LintOptions, LintResult};
use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;

const SOURCE_URL_TYPES: [&str; 3] = ["plain", "absolute", "regex"];
const REDIRECT_TYPES: [&str; 2] = ["always", "afterNotFound"];

/// How a rule's source is interpreted, after alias folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Plain,
    Regex,
}

/// Validate a parsed rule document: `{ rules: [...] }` or a bare list.
pub fn validate_document(
    file: &Path,
    document: &Value,
    result: &mut LintResult,
    options: &LintOptions,
) {
    let rules = match document {
        Value::Array(rules) => rules,
        Value::Object(obj) => match obj.get("rules") {
            Some(Value::Array(rules)) => rules,
            Some(_) => {
                result.add_issue(
                    LintIssue::error("E002", "'rules' must be a list", file).with_location("rules"),
                );
                return;
            }
            None => {
                result.add_issue(
                    LintIssue::error("E002", "Document has no 'rules' list", file)
                        .with_suggestion("Use `rules: [...]` or a bare list of rules"),
                );
                return;
            }
        },
        _ => {
            result.add_issue(LintIssue::error(
                "E002",
                "Expected a list of rules or an object with a 'rules' list",
                file,
            ));
            return;
        }
    };

    let mut seen = HashSet::new();
    for (idx, rule) in rules.iter().enumerate() {
        validate_rule(file, rule, idx, &mut seen, result, options);
    }
}

/// Validate a single rule. `seen` collects ids across the file for E004.
pub fn validate_rule(
    file: &Path,
    rule: &Value,
    idx: usize,
    seen: &mut HashSet<String>,
    result: &mut LintResult,
    options: &LintOptions,
) {
    let location = format!("rules[{idx}]");
    result.rules_checked += 1;

    let Some(obj) = rule.as_object() else {
        result.add_issue(
            LintIssue::error("E002", "Rule must be an object", file).with_location(location),
        );
        return;
    };

    let id = rule_id(obj);
    let id = id.as_deref();
    if id.is_none() {
        result.add_issue(
            LintIssue::error("E003", "Rule has no id", file)
                .with_location(&location)
                .with_suggestion("Give every rule a unique, non-blank id"),
        );
    }

    if obj.get("deleted").and_then(Value::as_bool) == Some(true) {
        if options.verbose {
            result.add_issue(
                LintIssue::info("I001", "Rule is flagged deleted and will be ignored", file)
                    .with_rule(id)
                    .with_location(location),
            );
        }
        return;
    }

    if let Some(id) = id {
        if !seen.insert(id.to_string()) {
            result.add_issue(
                LintIssue::error("E004", format!("Duplicate rule id '{id}'"), file)
                    .with_rule(Some(id))
                    .with_location(&location),
            );
        }
    }

    let kind = check_kinds(file, obj, id, &location, result);
    check_source(file, obj, kind, id, &location, result);
    check_target(file, obj, id, &location, result);
    check_source_params(file, obj, id, &location, result);
}

fn rule_id(obj: &Map<String, Value>) -> Option<String> {
    match obj.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_blank<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// E008 for unknown enum values. Returns the source kind when it is known.
fn check_kinds(
    file: &Path,
    obj: &Map<String, Value>,
    id: Option<&str>,
    location: &str,
    result: &mut LintResult,
) -> Option<SourceKind> {
    let mut kind = Some(SourceKind::Plain);
    if let Some(value) = obj.get("sourceUrlType") {
        match value.as_str() {
            Some("regex") => kind = Some(SourceKind::Regex),
            Some(v) if SOURCE_URL_TYPES.contains(&v) => {}
            _ => {
                kind = None;
                result.add_issue(
                    LintIssue::error("E008", format!("Unknown sourceUrlType {value}"), file)
                        .with_rule(id)
                        .with_location(format!("{location}.sourceUrlType"))
                        .with_suggestion(format!("Use one of: {}", SOURCE_URL_TYPES.join(", "))),
                );
            }
        }
    }

    if let Some(value) = obj.get("redirectType") {
        if !value.as_str().is_some_and(|v| REDIRECT_TYPES.contains(&v)) {
            result.add_issue(
                LintIssue::error("E008", format!("Unknown redirectType {value}"), file)
                    .with_rule(id)
                    .with_location(format!("{location}.redirectType"))
                    .with_suggestion(format!("Use one of: {}", REDIRECT_TYPES.join(", "))),
            );
        }
    }
    kind
}

fn check_source(
    file: &Path,
    obj: &Map<String, Value>,
    kind: Option<SourceKind>,
    id: Option<&str>,
    location: &str,
    result: &mut LintResult,
) {
    let Some(source) = non_blank(obj, "source").or_else(|| non_blank(obj, "sourceUrl")) else {
        result.add_issue(
            LintIssue::error("E005", "Rule has no source", file)
                .with_rule(id)
                .with_location(location),
        );
        return;
    };
    let location = format!("{location}.source");

    match kind {
        Some(SourceKind::Regex) => {
            // the proxy anchors every pattern
            if let Err(e) = Regex::new(&format!("^(?:{source})$")) {
                let reason = e.to_string();
                let reason = reason.lines().last().unwrap_or_default().trim();
                result.add_issue(
                    LintIssue::error("E007", format!("Invalid regex source: {reason}"), file)
                        .with_rule(id)
                        .with_location(location),
                );
            }
        }
        Some(SourceKind::Plain) => {
            if !source.starts_with('/') {
                result.add_issue(
                    LintIssue::warning("W002", format!("Plain source '{source}' has no leading '/'"), file)
                        .with_rule(id)
                        .with_location(&location)
                        .with_suggestion(format!("Use '/{source}'")),
                );
            }
            if source.len() > 1 && source.ends_with('/') {
                result.add_issue(
                    LintIssue::warning(
                        "W005",
                        format!("Trailing slash on '{source}' is stripped before matching"),
                        file,
                    )
                    .with_rule(id)
                    .with_location(location),
                );
            }
        }
        None => {}
    }
}

fn check_target(
    file: &Path,
    obj: &Map<String, Value>,
    id: Option<&str>,
    location: &str,
    result: &mut LintResult,
) {
    let location = format!("{location}.target");
    let target = obj.get("target").and_then(Value::as_object);
    let link = target.and_then(|t| non_blank(t, "link"));
    let url = target.and_then(|t| non_blank(t, "url"));

    let Some(target) = target.filter(|_| link.is_some() || url.is_some()) else {
        result.add_issue(
            LintIssue::error("E006", "Rule has no target url or link", file)
                .with_rule(id)
                .with_location(location),
        );
        return;
    };

    if let Some(url) = url {
        let absolute = url.starts_with("http://") || url.starts_with("https://");
        if !absolute && !url.starts_with('/') {
            result.add_issue(
                LintIssue::warning(
                    "W004",
                    format!("Target url '{url}' is neither absolute http(s) nor a path"),
                    file,
                )
                .with_rule(id)
                .with_location(format!("{location}.url")),
            );
        }
    }

    let valid_from = timestamp(file, target, "validFrom", id, &location, result);
    let valid_to = timestamp(file, target, "validTo", id, &location, result);
    if let (Some(from), Some(to)) = (valid_from, valid_to) {
        if to <= from {
            result.add_issue(
                LintIssue::warning("W001", "validTo is not after validFrom; the link never applies", file)
                    .with_rule(id)
                    .with_location(format!("{location}.validTo")),
            );
        }
    }
}

fn timestamp(
    file: &Path,
    target: &Map<String, Value>,
    key: &str,
    id: Option<&str>,
    location: &str,
    result: &mut LintResult,
) -> Option<DateTime<FixedOffset>> {
    let value = target.get(key).filter(|v| !v.is_null())?;
    match value.as_str().map(DateTime::parse_from_rfc3339) {
        Some(Ok(ts)) => Some(ts),
        _ => {
            // the whole file fails to load on a bad timestamp
            result.add_issue(
                LintIssue::error("E002", format!("{key} {value} is not an RFC 3339 timestamp"), file)
                    .with_rule(id)
                    .with_location(format!("{location}.{key}")),
            );
            None
        }
    }
}

fn check_source_params(
    file: &Path,
    obj: &Map<String, Value>,
    id: Option<&str>,
    location: &str,
    result: &mut LintResult,
) {
    let Some(params) = obj.get("sourceParams").and_then(Value::as_array) else {
        return;
    };
    for (idx, param) in params.iter().enumerate() {
        let location = format!("{location}.sourceParams[{idx}]");
        let param = param.as_object();
        let name = param.and_then(|p| non_blank(p, "name"));
        let value = param.and_then(|p| non_blank(p, "value"));
        if name.is_none() || value.is_none() {
            result.add_issue(
                LintIssue::error("E009", "Source param needs both a name and a value", file)
                    .with_rule(id)
                    .with_location(&location),
            );
        }

        if let Some(operator) = param.and_then(|p| p.get("operator")).and_then(Value::as_str) {
            if !operator.eq_ignore_ascii_case("equals") {
                result.add_issue(
                    LintIssue::warning(
                        "W003",
                        format!("Operator '{operator}' is not supported; the param is dropped"),
                        file,
                    )
                    .with_rule(id)
                    .with_location(location)
                    .with_suggestion("Only 'equals' is supported"),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lint(document: Value) -> LintResult {
        let mut result = LintResult::new();
        validate_document(Path::new("site.yaml"), &document, &mut result, &LintOptions::default());
        result
    }

    fn rule(extra: Value) -> Value {
        let mut rule = json!({
            "id": 1,
            "source": "/old",
            "target": { "url": "https://example.com/new" }
        });
        if let (Some(obj), Some(extra)) = (rule.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }
        rule
    }

    #[test]
    fn test_valid_rule_has_no_issues() {
        let result = lint(json!({ "rules": [rule(json!({}))] }));
        assert!(result.issues.is_empty());
        assert_eq!(result.rules_checked, 1);

        // bare list form
        assert!(lint(json!([rule(json!({}))])).issues.is_empty());
    }

    #[test]
    fn test_document_shape() {
        assert_eq!(lint(json!({ "redirects": [] })).codes(), vec!["E002"]);
        assert_eq!(lint(json!({ "rules": {} })).codes(), vec!["E002"]);
        assert_eq!(lint(json!("rules")).codes(), vec!["E002"]);
        assert_eq!(lint(json!(["not a rule"])).codes(), vec!["E002"]);
    }

    #[test]
    fn test_missing_and_duplicate_ids() {
        let result = lint(json!([
            rule(json!({ "id": "  " })),
            rule(json!({ "id": "7" })),
            rule(json!({ "id": 7 })),
        ]));
        assert_eq!(result.codes(), vec!["E003", "E004"]);
        assert_eq!(result.issues[1].rule_id.as_deref(), Some("7"));
        assert_eq!(result.issues[1].location.as_deref(), Some("rules[2]"));
    }

    #[test]
    fn test_deleted_rules_are_skipped() {
        let deleted = json!({ "id": 3, "deleted": true });
        assert!(lint(json!([deleted.clone(), rule(json!({ "id": 3 }))])).issues.is_empty());

        let mut result = LintResult::new();
        let options = LintOptions { verbose: true };
        validate_document(Path::new("a.yml"), &json!([deleted]), &mut result, &options);
        assert_eq!(result.codes(), vec!["I001"]);
        assert!(!result.has_errors());
    }

    #[test]
    fn test_source_checks() {
        assert_eq!(lint(json!([rule(json!({ "source": "" }))])).codes(), vec!["E005"]);
        // alias
        let aliased = json!([{ "id": 1, "sourceUrl": "/a", "target": { "url": "/b" } }]);
        assert!(lint(aliased).issues.is_empty());

        assert_eq!(lint(json!([rule(json!({ "source": "old" }))])).codes(), vec!["W002"]);
        assert_eq!(lint(json!([rule(json!({ "source": "/old/" }))])).codes(), vec!["W005"]);
        assert!(lint(json!([rule(json!({ "source": "/" }))])).issues.is_empty());
    }

    #[test]
    fn test_regex_sources() {
        let ok = rule(json!({ "source": r"/blog/\d+/.*", "sourceUrlType": "regex" }));
        assert!(lint(json!([ok])).issues.is_empty());

        let bad = rule(json!({ "source": "/blog/(unclosed", "sourceUrlType": "regex" }));
        let result = lint(json!([bad]));
        assert_eq!(result.codes(), vec!["E007"]);
        assert_eq!(result.issues[0].location.as_deref(), Some("rules[0].source"));

        // regex sources are not held to plain path conventions
        let relative = rule(json!({ "source": "blog/.*/", "sourceUrlType": "regex" }));
        assert!(lint(json!([relative])).issues.is_empty());
    }

    #[test]
    fn test_unknown_kinds() {
        let result = lint(json!([rule(json!({
            "sourceUrlType": "glob",
            "redirectType": "sometimes"
        }))]));
        assert_eq!(result.codes(), vec!["E008", "E008"]);

        let absolute = rule(json!({ "sourceUrlType": "absolute", "redirectType": "afterNotFound" }));
        assert!(lint(json!([absolute])).issues.is_empty());
    }

    #[test]
    fn test_target_checks() {
        assert_eq!(lint(json!([rule(json!({ "target": null }))])).codes(), vec!["E006"]);
        assert_eq!(
            lint(json!([rule(json!({ "target": { "url": " ", "link": "" } }))])).codes(),
            vec!["E006"]
        );
        assert_eq!(
            lint(json!([rule(json!({ "target": { "url": "example.com/x" } }))])).codes(),
            vec!["W004"]
        );
        assert!(lint(json!([rule(json!({ "target": { "url": "/x?y=1" } }))]))
            .issues
            .is_empty());
    }

    #[test]
    fn test_validity_window() {
        let inverted = rule(json!({ "target": {
            "link": "/landing",
            "validFrom": "2024-06-01T00:00:00Z",
            "validTo": "2024-01-01T00:00:00Z"
        }}));
        assert_eq!(lint(json!([inverted])).codes(), vec!["W001"]);

        let open_ended = rule(json!({ "target": { "link": "/landing", "validFrom": "2024-06-01T00:00:00+02:00" }}));
        assert!(lint(json!([open_ended])).issues.is_empty());

        let garbled = rule(json!({ "target": { "link": "/landing", "validTo": "next tuesday" }}));
        assert_eq!(lint(json!([garbled])).codes(), vec!["E002"]);
    }

    #[test]
    fn test_source_params() {
        let result = lint(json!([rule(json!({ "sourceParams": [
            { "name": "utm", "value": "mail" },
            { "name": "utm", "value": "x", "operator": "EQUALS" },
            { "name": "", "value": "x" },
            { "name": "page", "value": "2", "operator": "greater_than" }
        ]}))]));
        assert_eq!(result.codes(), vec!["E009", "W003"]);
        assert_eq!(
            result.issues[0].location.as_deref(),
            Some("rules[0].sourceParams[2]")
        );
    }
}
