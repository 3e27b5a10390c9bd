//! Per-visitor decision results, mirroring the decision API response format.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The result of evaluating every campaign for one visitor.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    /// Visitor the decisions apply to.
    pub visitor_id: String,
    /// Whether the environment was in panic mode when the decision was made.
    #[serde(default)]
    pub panic: bool,
    /// One entry per campaign whose targeting matched.
    #[serde(default)]
    pub campaigns: Vec<CampaignDecision>,
}

/// The decision for a single campaign.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CampaignDecision {
    /// Campaign id.
    pub id: String,
    /// The variation group whose targeting matched.
    pub variation_group_id: String,
    /// The variation chosen by allocation.
    pub variation: VariationDecision,
}

/// The chosen variation of a campaign decision.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VariationDecision {
    /// Variation id.
    pub id: String,
    /// Whether this variation is the reference (control).
    #[serde(default)]
    pub reference: bool,
    /// Flag values carried by the variation.
    #[serde(default)]
    pub modifications: Modifications,
}

/// Key-value flag modifications attached to a variation.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Modifications {
    /// Modification type, e.g. `FLAG`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Flag keys and their values for this variation.
    #[serde(default)]
    pub value: HashMap<String, serde_json::Value>,
}
