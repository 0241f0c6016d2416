//! Raw rule records as authored in rule files.
//!
//! Records are deliberately permissive: every field has a default so that a
//! half-filled record still deserializes and can be rejected by validation with
//! a useful message instead of a serde error for the whole file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// How the `source` of a record is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceUrlType {
    #[default]
    #[serde(alias = "absolute")]
    Plain,
    Regex,
}

/// When the redirect fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RedirectType {
    #[default]
    Always,
    AfterNotFound,
}

/// Target of a record: either a rendered content link or a literal URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
}

/// A query parameter constraint on the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceParamRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
    /// Only `equals` is supported; anything else invalidates the parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
}

/// A parameter appended to the redirect location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// One redirect as it appears in a rule file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRecord {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, alias = "sourceUrl")]
    pub source: String,
    #[serde(default)]
    pub source_url_type: SourceUrlType,
    #[serde(default)]
    pub redirect_type: RedirectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_params: Vec<SourceParamRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_params: Vec<ParamRecord>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

/// Rule files may hold either `{ rules: [...] }` or a bare list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RuleFile {
    Wrapped { rules: Vec<RuleRecord> },
    Bare(Vec<RuleRecord>),
}

impl RuleFile {
    pub fn into_records(self) -> Vec<RuleRecord> {
        match self {
            RuleFile::Wrapped { rules } => rules,
            RuleFile::Bare(rules) => rules,
        }
    }
}

/// Ids are frequently numeric in authored YAML (`id: 101`); accept both forms.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Uint(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Uint(n) => n.to_string(),
    })
}
