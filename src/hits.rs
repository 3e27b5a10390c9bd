//! Telemetry hits sent to the data-collect endpoint.
//!
//! A [`Hit`] is a closed tagged union: every kind of record the collector understands is a
//! variant, and per-variant required fields are checked by [`Hit::validate`]. The serde
//! representation uses the compact wire names of the collect protocol (`vid`, `cid`, `t`,
//! `ea`, ...).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[allow(missing_docs)]
pub type Timestamp = DateTime<Utc>;

/// The kind of a [`Hit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitType {
    /// Campaign activation.
    Activation,
    /// Screen or page view.
    Page,
    /// Custom visitor event.
    Event,
    /// Transaction item.
    Item,
    /// Purchase transaction.
    Transaction,
    /// Container for other hits.
    Batch,
}

/// A single validation failure for a hit.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum HitError {
    #[error("visitor id should not be empty")]
    EmptyVisitorId,
    #[error("environment id should not be empty")]
    EmptyEnvironmentId,
    #[error("data source should be APP")]
    InvalidDataSource,
    #[error("event action should not be empty")]
    EmptyEventAction,
    #[error("transaction id should not be empty")]
    EmptyTransactionId,
    #[error("transaction affiliation should not be empty")]
    EmptyTransactionAffiliation,
    #[error("item transaction id should not be empty")]
    EmptyItemTransactionId,
    #[error("item name should not be empty")]
    EmptyItemName,
    #[error("variation group id should not be empty")]
    EmptyVariationGroupId,
    #[error("variation id should not be empty")]
    EmptyVariationId,
}

/// Fields shared by every hit except [`ActivationHit`], which has its own payload shape.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct BaseHit {
    /// Visitor id the hit is attributed to.
    #[serde(rename = "vid", skip_serializing_if = "String::is_empty", default)]
    pub visitor_id: String,
    /// Environment the hit belongs to.
    #[serde(rename = "cid", skip_serializing_if = "String::is_empty", default)]
    pub environment_id: String,
    /// Where the hit originates from. Always `APP` for this SDK.
    #[serde(rename = "ds", skip_serializing_if = "String::is_empty", default)]
    pub data_source: String,
    /// Delivery latency in milliseconds, computed right before the hit goes on the wire.
    #[serde(rename = "qt", skip_serializing_if = "Option::is_none", default)]
    pub queue_time: Option<i64>,
    /// Document location for page-style hits.
    #[serde(rename = "dl", skip_serializing_if = "String::is_empty", default)]
    pub document_location: String,
    /// When the hit was accepted by the processor. Not serialized.
    #[serde(skip)]
    pub created_at: Option<Timestamp>,
}

const DATA_SOURCE_APP: &str = "APP";

impl BaseHit {
    fn set_infos(&mut self, environment_id: &str, visitor_id: &str) {
        self.environment_id = environment_id.to_owned();
        self.visitor_id = visitor_id.to_owned();
        self.data_source = DATA_SOURCE_APP.to_owned();
        self.created_at = Some(Utc::now());
    }

    /// Clear the identifying fields. Used on batch members as the batch itself carries them.
    fn reset(&mut self) {
        self.environment_id = String::new();
        self.visitor_id = String::new();
        self.data_source = String::new();
    }

    fn validate(&self) -> Vec<HitError> {
        let mut errors = Vec::new();
        if self.visitor_id.is_empty() {
            errors.push(HitError::EmptyVisitorId);
        }
        if self.environment_id.is_empty() {
            errors.push(HitError::EmptyEnvironmentId);
        }
        if self.data_source != DATA_SOURCE_APP {
            errors.push(HitError::InvalidDataSource);
        }
        errors
    }

    fn compute_queue_time(&mut self) {
        if let Some(created_at) = self.created_at {
            self.queue_time = Some((Utc::now() - created_at).num_milliseconds());
        }
    }
}

/// A screen view hit.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PageHit {
    #[allow(missing_docs)]
    #[serde(flatten)]
    pub base: BaseHit,
}

/// A custom event hit.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct EventHit {
    #[allow(missing_docs)]
    #[serde(flatten)]
    pub base: BaseHit,
    /// Action name. Required.
    #[serde(rename = "ea")]
    pub action: String,
    #[allow(missing_docs)]
    #[serde(rename = "ec", skip_serializing_if = "String::is_empty", default)]
    pub category: String,
    #[allow(missing_docs)]
    #[serde(rename = "el", skip_serializing_if = "String::is_empty", default)]
    pub label: String,
    #[allow(missing_docs)]
    #[serde(rename = "ev", skip_serializing_if = "Option::is_none", default)]
    pub value: Option<i64>,
}

/// A purchase transaction hit.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct TransactionHit {
    #[allow(missing_docs)]
    #[serde(flatten)]
    pub base: BaseHit,
    /// Transaction id. Required.
    #[serde(rename = "tid")]
    pub transaction_id: String,
    /// Transaction affiliation. Required.
    #[serde(rename = "ta")]
    pub affiliation: String,
    #[allow(missing_docs)]
    #[serde(rename = "tr", skip_serializing_if = "Option::is_none", default)]
    pub revenue: Option<f64>,
    #[allow(missing_docs)]
    #[serde(rename = "ts", skip_serializing_if = "Option::is_none", default)]
    pub shipping: Option<f64>,
    #[allow(missing_docs)]
    #[serde(rename = "tt", skip_serializing_if = "Option::is_none", default)]
    pub tax: Option<f64>,
    #[allow(missing_docs)]
    #[serde(rename = "tc", skip_serializing_if = "String::is_empty", default)]
    pub currency: String,
    #[allow(missing_docs)]
    #[serde(rename = "tcc", skip_serializing_if = "String::is_empty", default)]
    pub coupon_code: String,
    #[allow(missing_docs)]
    #[serde(rename = "pm", skip_serializing_if = "String::is_empty", default)]
    pub payment_method: String,
    #[allow(missing_docs)]
    #[serde(rename = "sm", skip_serializing_if = "String::is_empty", default)]
    pub shipping_method: String,
    #[allow(missing_docs)]
    #[serde(rename = "icn", skip_serializing_if = "Option::is_none", default)]
    pub item_count: Option<u32>,
}

/// An item belonging to a transaction.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ItemHit {
    #[allow(missing_docs)]
    #[serde(flatten)]
    pub base: BaseHit,
    /// Parent transaction id. Required.
    #[serde(rename = "tid")]
    pub transaction_id: String,
    /// Item name. Required.
    #[serde(rename = "in")]
    pub name: String,
    #[allow(missing_docs)]
    #[serde(rename = "ip", skip_serializing_if = "Option::is_none", default)]
    pub price: Option<f64>,
    #[allow(missing_docs)]
    #[serde(rename = "iq", skip_serializing_if = "Option::is_none", default)]
    pub quantity: Option<u32>,
    #[allow(missing_docs)]
    #[serde(rename = "ic", skip_serializing_if = "String::is_empty", default)]
    pub code: String,
    #[allow(missing_docs)]
    #[serde(rename = "iv", skip_serializing_if = "String::is_empty", default)]
    pub category: String,
}

/// A campaign activation hit. Unlike the other variants it does not embed [`BaseHit`]: the
/// activation endpoint expects a minimal payload.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ActivationHit {
    #[allow(missing_docs)]
    #[serde(rename = "vid", skip_serializing_if = "String::is_empty", default)]
    pub visitor_id: String,
    #[allow(missing_docs)]
    #[serde(rename = "cid", skip_serializing_if = "String::is_empty", default)]
    pub environment_id: String,
    /// Variation group that was activated. Required.
    #[serde(rename = "caid")]
    pub variation_group_id: String,
    /// Variation that was activated. Required.
    #[serde(rename = "vaid")]
    pub variation_id: String,
    /// When the hit was accepted by the processor. Not serialized.
    #[serde(skip)]
    pub created_at: Option<Timestamp>,
    /// Delivery latency in seconds. Not serialized.
    #[serde(skip)]
    pub queue_time: Option<i64>,
}

/// A container hit whose payload is an ordered list of member hits.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct BatchHit {
    #[allow(missing_docs)]
    #[serde(flatten)]
    pub base: BaseHit,
    /// Member hits, in insertion order, with their identifying fields stripped.
    #[serde(rename = "h")]
    pub hits: Vec<Hit>,
}

impl BatchHit {
    /// Build a batch seeded from its first member: the member's base fields become the
    /// batch's own base, and the member is kept in the payload with its identifying fields
    /// stripped.
    pub(crate) fn from_first(mut first: Hit) -> BatchHit {
        let snapshot = first.base_snapshot();
        let mut base = BaseHit::default();
        base.set_infos(&snapshot.environment_id, &snapshot.visitor_id);
        first.reset_base();
        BatchHit {
            base,
            hits: vec![first],
        }
    }

    /// Append a member, stripping its identifying fields to keep the payload light.
    pub(crate) fn push(&mut self, mut hit: Hit) {
        hit.reset_base();
        self.hits.push(hit);
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// A telemetry record for the data-collect endpoint.
///
/// The `t` field on the wire is the variant tag, so a hit can never carry an unrecognized
/// type.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "t")]
pub enum Hit {
    /// Custom visitor event.
    #[serde(rename = "EVENT")]
    Event(EventHit),
    /// Screen or page view.
    #[serde(rename = "SCREENVIEW")]
    Page(PageHit),
    /// Purchase transaction.
    #[serde(rename = "TRANSACTION")]
    Transaction(TransactionHit),
    /// Transaction item.
    #[serde(rename = "ITEM")]
    Item(ItemHit),
    /// Campaign activation.
    #[serde(rename = "ACTIVATION")]
    Activation(ActivationHit),
    /// Container for other hits.
    #[serde(rename = "BATCH")]
    Batch(BatchHit),
}

impl Hit {
    #[allow(missing_docs)]
    pub fn hit_type(&self) -> HitType {
        match self {
            Hit::Event(_) => HitType::Event,
            Hit::Page(_) => HitType::Page,
            Hit::Transaction(_) => HitType::Transaction,
            Hit::Item(_) => HitType::Item,
            Hit::Activation(_) => HitType::Activation,
            Hit::Batch(_) => HitType::Batch,
        }
    }

    /// Stamp the hit with its environment id, visitor id, data source, and creation time.
    pub fn set_base_infos(&mut self, environment_id: &str, visitor_id: &str) {
        match self {
            Hit::Event(h) => h.base.set_infos(environment_id, visitor_id),
            Hit::Page(h) => h.base.set_infos(environment_id, visitor_id),
            Hit::Transaction(h) => h.base.set_infos(environment_id, visitor_id),
            Hit::Item(h) => h.base.set_infos(environment_id, visitor_id),
            Hit::Batch(h) => h.base.set_infos(environment_id, visitor_id),
            Hit::Activation(h) => {
                h.environment_id = environment_id.to_owned();
                h.visitor_id = visitor_id.to_owned();
                h.created_at = Some(Utc::now());
            }
        }
    }

    /// Check the required fields of this variant. Returns every failure, not just the first.
    pub fn validate(&self) -> Vec<HitError> {
        match self {
            Hit::Page(h) => h.base.validate(),
            Hit::Batch(h) => h.base.validate(),
            Hit::Event(h) => {
                let mut errors = h.base.validate();
                if h.action.is_empty() {
                    errors.push(HitError::EmptyEventAction);
                }
                errors
            }
            Hit::Transaction(h) => {
                let mut errors = h.base.validate();
                if h.transaction_id.is_empty() {
                    errors.push(HitError::EmptyTransactionId);
                }
                if h.affiliation.is_empty() {
                    errors.push(HitError::EmptyTransactionAffiliation);
                }
                errors
            }
            Hit::Item(h) => {
                let mut errors = h.base.validate();
                if h.transaction_id.is_empty() {
                    errors.push(HitError::EmptyItemTransactionId);
                }
                if h.name.is_empty() {
                    errors.push(HitError::EmptyItemName);
                }
                errors
            }
            Hit::Activation(h) => {
                let mut errors = Vec::new();
                if h.visitor_id.is_empty() {
                    errors.push(HitError::EmptyVisitorId);
                }
                if h.environment_id.is_empty() {
                    errors.push(HitError::EmptyEnvironmentId);
                }
                if h.variation_group_id.is_empty() {
                    errors.push(HitError::EmptyVariationGroupId);
                }
                if h.variation_id.is_empty() {
                    errors.push(HitError::EmptyVariationId);
                }
                errors
            }
        }
    }

    /// Strip the identifying fields, keeping the rest of the payload.
    pub(crate) fn reset_base(&mut self) {
        match self {
            Hit::Event(h) => h.base.reset(),
            Hit::Page(h) => h.base.reset(),
            Hit::Transaction(h) => h.base.reset(),
            Hit::Item(h) => h.base.reset(),
            Hit::Batch(h) => h.base.reset(),
            Hit::Activation(h) => {
                h.environment_id = String::new();
                h.visitor_id = String::new();
            }
        }
    }

    /// A copy of the hit's base fields, used to seed a batch.
    pub(crate) fn base_snapshot(&self) -> BaseHit {
        match self {
            Hit::Event(h) => h.base.clone(),
            Hit::Page(h) => h.base.clone(),
            Hit::Transaction(h) => h.base.clone(),
            Hit::Item(h) => h.base.clone(),
            Hit::Batch(h) => h.base.clone(),
            Hit::Activation(h) => BaseHit {
                visitor_id: h.visitor_id.clone(),
                environment_id: h.environment_id.clone(),
                created_at: h.created_at,
                ..BaseHit::default()
            },
        }
    }

    /// Stamp delivery latency right before the hit goes on the wire. For a batch this
    /// touches the members, which carry their own creation times.
    pub(crate) fn compute_queue_times(&mut self) {
        match self {
            Hit::Batch(batch) => {
                for hit in &mut batch.hits {
                    hit.compute_queue_times();
                }
            }
            Hit::Event(h) => h.base.compute_queue_time(),
            Hit::Page(h) => h.base.compute_queue_time(),
            Hit::Transaction(h) => h.base.compute_queue_time(),
            Hit::Item(h) => h.base.compute_queue_time(),
            Hit::Activation(h) => {
                // The activation endpoint counts queue time in seconds.
                if let Some(created_at) = h.created_at {
                    h.queue_time = Some((Utc::now() - created_at).num_seconds());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamped_event(action: &str) -> Hit {
        let mut hit = Hit::Event(EventHit {
            action: action.to_owned(),
            ..EventHit::default()
        });
        hit.set_base_infos("test_env", "test_vid");
        hit
    }

    #[test]
    fn event_valid_after_stamping() {
        let hit = stamped_event("click");
        assert!(hit.validate().is_empty());
    }

    #[test]
    fn event_requires_action() {
        let mut hit = Hit::Event(EventHit::default());
        hit.set_base_infos("test_env", "test_vid");
        assert_eq!(hit.validate(), vec![HitError::EmptyEventAction]);
    }

    #[test]
    fn unstamped_hit_is_invalid() {
        let hit = Hit::Page(PageHit::default());
        let errors = hit.validate();
        assert!(errors.contains(&HitError::EmptyVisitorId));
        assert!(errors.contains(&HitError::EmptyEnvironmentId));
        assert!(errors.contains(&HitError::InvalidDataSource));
    }

    #[test]
    fn transaction_requires_id_and_affiliation() {
        let mut hit = Hit::Transaction(TransactionHit::default());
        hit.set_base_infos("test_env", "test_vid");
        let errors = hit.validate();
        assert!(errors.contains(&HitError::EmptyTransactionId));
        assert!(errors.contains(&HitError::EmptyTransactionAffiliation));
    }

    #[test]
    fn item_requires_transaction_id_and_name() {
        let mut hit = Hit::Item(ItemHit::default());
        hit.set_base_infos("test_env", "test_vid");
        let errors = hit.validate();
        assert!(errors.contains(&HitError::EmptyItemTransactionId));
        assert!(errors.contains(&HitError::EmptyItemName));
    }

    #[test]
    fn activation_requires_group_and_variation() {
        let mut hit = Hit::Activation(ActivationHit::default());
        hit.set_base_infos("test_env", "test_vid");
        let errors = hit.validate();
        assert_eq!(
            errors,
            vec![HitError::EmptyVariationGroupId, HitError::EmptyVariationId]
        );
    }

    #[test]
    fn batch_takes_base_from_first_member_and_strips_members() {
        let mut batch = BatchHit::from_first(stamped_event("first"));
        batch.push(stamped_event("second"));
        batch.push(stamped_event("third"));

        assert_eq!(batch.base.visitor_id, "test_vid");
        assert_eq!(batch.base.environment_id, "test_env");
        assert_eq!(batch.len(), 3);

        let actions: Vec<_> = batch
            .hits
            .iter()
            .map(|hit| match hit {
                Hit::Event(e) => e.action.as_str(),
                _ => panic!("expected event"),
            })
            .collect();
        assert_eq!(actions, vec!["first", "second", "third"]);

        for hit in &batch.hits {
            let base = hit.base_snapshot();
            assert!(base.visitor_id.is_empty());
            assert!(base.environment_id.is_empty());
        }

        assert!(Hit::Batch(batch).validate().is_empty());
    }

    #[test]
    fn wire_field_names() {
        let hit = stamped_event("click");
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["t"], "EVENT");
        assert_eq!(json["vid"], "test_vid");
        assert_eq!(json["cid"], "test_env");
        assert_eq!(json["ds"], "APP");
        assert_eq!(json["ea"], "click");
        // Unset optional fields stay off the wire.
        assert!(json.get("ev").is_none());
        assert!(json.get("qt").is_none());
    }

    #[test]
    fn batch_wire_format_nests_members() {
        let mut batch = BatchHit::from_first(stamped_event("first"));
        batch.push(stamped_event("second"));
        let json = serde_json::to_value(&Hit::Batch(batch)).unwrap();

        assert_eq!(json["t"], "BATCH");
        assert_eq!(json["vid"], "test_vid");
        let members = json["h"].as_array().unwrap();
        assert_eq!(members.len(), 2);
        // Members carry no redundant identifying fields.
        assert!(members[0].get("vid").is_none());
        assert!(members[0].get("cid").is_none());
        assert_eq!(members[1]["ea"], "second");
    }

    #[test]
    fn queue_time_is_computed_from_creation() {
        let mut hit = stamped_event("click");
        hit.compute_queue_times();
        match &hit {
            Hit::Event(e) => {
                let qt = e.base.queue_time.expect("queue time should be set");
                assert!(qt >= 0);
            }
            _ => unreachable!(),
        }
    }
}
