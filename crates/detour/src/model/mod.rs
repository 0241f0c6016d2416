//! Redirect data model: raw records, validated rules and request parameters.

mod query;
mod record;
mod rule;

pub use query::QueryParams;
pub use record::{
    ParamRecord, RedirectType, RuleFile, RuleRecord, SourceParamRecord, SourceUrlType,
    TargetRecord,
};
pub use rule::{Mode, Param, Rule, RuleId, SourceKind, Target};

/// Identifier of a site (tenant) owning an independent redirect index.
pub type SiteId = String;
