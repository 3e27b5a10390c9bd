//! Bucketing configuration models. This is the format served by the bucketing endpoint
//! (`/{environment_id}/bucketing.json`).
use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::decision::Modifications;
use crate::ContextValue;

/// The full bucketing configuration of an environment.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Global kill switch: when set, every campaign is suppressed.
    #[serde(default)]
    pub panic: bool,
    #[allow(missing_docs)]
    #[serde(default)]
    pub campaigns: Vec<Campaign>,
}

/// An experiment containing one or more variation groups.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    #[allow(missing_docs)]
    pub id: String,
    /// Scanned in order: a visitor belongs to the first group whose targeting matches.
    #[serde(default)]
    pub variation_groups: Vec<VariationGroup>,
}

/// A targeting rule plus a set of weighted variations.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VariationGroup {
    #[allow(missing_docs)]
    pub id: String,
    #[allow(missing_docs)]
    #[serde(default)]
    pub targeting: Targeting,
    /// Allocation weights sum to 100 across the group; a smaller sum leaves part of the
    /// traffic unallocated.
    #[serde(default)]
    pub variations: Vec<Variation>,
}

/// A disjunction of targeting groups: the rule matches when any group matches.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Targeting {
    #[allow(missing_docs)]
    #[serde(default)]
    pub targeting_groups: Vec<TargetingGroup>,
}

/// A conjunction of predicates: the group matches when all of them match.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetingGroup {
    #[allow(missing_docs)]
    #[serde(default)]
    pub targetings: Vec<TargetingRule>,
}

/// A single key/operator/value predicate against the visitor context.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetingRule {
    #[allow(missing_docs)]
    pub operator: TargetingOperator,
    /// Context key to test. The special key `fs_all_users` always matches, and `fs_users`
    /// tests the visitor id itself.
    pub key: String,
    #[allow(missing_docs)]
    pub value: TargetingValue,
}

/// Operators recognized in targeting predicates.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum TargetingOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEquals,
    LowerThan,
    LowerThanOrEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
}

/// The expected value of a targeting predicate: either a single value or a list, where a
/// list matches when any entry matches.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, From)]
#[serde(untagged)]
pub enum TargetingValue {
    /// A single expected value.
    Single(ContextValue),
    /// Several accepted values.
    Multiple(Vec<ContextValue>),
}

impl From<bool> for TargetingValue {
    fn from(value: bool) -> Self {
        Self::Single(value.into())
    }
}

impl From<f64> for TargetingValue {
    fn from(value: f64) -> Self {
        Self::Single(value.into())
    }
}

impl From<&str> for TargetingValue {
    fn from(value: &str) -> Self {
        Self::Single(value.into())
    }
}

/// A concrete treatment with an allocation weight and flag modifications.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    #[allow(missing_docs)]
    pub id: String,
    /// Share of the group's traffic, out of 100.
    #[serde(default)]
    pub allocation: u32,
    /// Whether this variation is the reference (control).
    #[serde(default)]
    pub reference: bool,
    #[allow(missing_docs)]
    #[serde(default)]
    pub modifications: Modifications,
}
