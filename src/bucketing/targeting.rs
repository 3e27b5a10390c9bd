//! Targeting predicate evaluation against a visitor context.
use std::cmp::Ordering;

use crate::bucketing::{TargetingGroup, TargetingOperator, TargetingRule, TargetingValue, VariationGroup};
use crate::{Context, ContextValue};

/// Context key that matches every visitor.
const KEY_ALL_USERS: &str = "fs_all_users";
/// Context key that targets the visitor id itself.
const KEY_VISITOR_ID: &str = "fs_users";

/// Whether the group's targeting matches the visitor. A misconfigured predicate (type
/// mismatch, missing context key) never matches.
pub(crate) fn targeting_match(
    group: &VariationGroup,
    visitor_id: &str,
    context: &Context,
) -> bool {
    group
        .targeting
        .targeting_groups
        .iter()
        .any(|group| group.matches(visitor_id, context))
}

impl TargetingGroup {
    fn matches(&self, visitor_id: &str, context: &Context) -> bool {
        self.targetings
            .iter()
            .all(|rule| rule.matches(visitor_id, context))
    }
}

impl TargetingRule {
    fn matches(&self, visitor_id: &str, context: &Context) -> bool {
        match self.key.as_str() {
            KEY_ALL_USERS => true,
            KEY_VISITOR_ID => {
                let id = ContextValue::String(visitor_id.to_owned());
                self.operator.eval(Some(&id), &self.value)
            }
            key => self.operator.eval(context.get(key), &self.value),
        }
    }
}

impl TargetingOperator {
    /// Applying the operator to the values. Returns `false` if the operator cannot be
    /// applied or there's a misconfiguration.
    pub(crate) fn eval(
        &self,
        attribute: Option<&ContextValue>,
        expected: &TargetingValue,
    ) -> bool {
        self.try_eval(attribute, expected).unwrap_or(false)
    }

    /// Try applying the operator to the values, returning `None` if the operator cannot be
    /// applied.
    fn try_eval(
        &self,
        attribute: Option<&ContextValue>,
        expected: &TargetingValue,
    ) -> Option<bool> {
        let attribute = attribute?;
        match expected {
            TargetingValue::Single(value) => self.eval_single(attribute, value),
            TargetingValue::Multiple(values) => {
                // A list matches when any entry matches; negated operators require every
                // entry to miss.
                let mut any = false;
                for value in values {
                    any = self.positive().eval_single(attribute, value)? || any;
                }
                Some(if self.is_negated() { !any } else { any })
            }
        }
    }

    fn eval_single(&self, attribute: &ContextValue, expected: &ContextValue) -> Option<bool> {
        match self {
            Self::Equals | Self::NotEquals => {
                let equal = match (attribute, expected) {
                    (ContextValue::String(a), ContextValue::String(b)) => a == b,
                    (ContextValue::Number(a), ContextValue::Number(b)) => a == b,
                    (ContextValue::Boolean(a), ContextValue::Boolean(b)) => a == b,
                    _ => return None,
                };
                Some(if matches!(self, Self::Equals) {
                    equal
                } else {
                    !equal
                })
            }

            Self::GreaterThan | Self::GreaterThanOrEquals | Self::LowerThan | Self::LowerThanOrEquals => {
                let ordering = match (attribute, expected) {
                    (ContextValue::Number(a), ContextValue::Number(b)) => a.partial_cmp(b)?,
                    (ContextValue::String(a), ContextValue::String(b)) => a.as_str().cmp(b.as_str()),
                    _ => return None,
                };
                Some(match self {
                    Self::GreaterThan => ordering == Ordering::Greater,
                    Self::GreaterThanOrEquals => ordering != Ordering::Less,
                    Self::LowerThan => ordering == Ordering::Less,
                    Self::LowerThanOrEquals => ordering != Ordering::Greater,
                    _ => {
                        // unreachable
                        return None;
                    }
                })
            }

            Self::Contains | Self::NotContains => {
                let (ContextValue::String(a), ContextValue::String(b)) = (attribute, expected)
                else {
                    return None;
                };
                let contains = a.contains(b.as_str());
                Some(if matches!(self, Self::Contains) {
                    contains
                } else {
                    !contains
                })
            }

            Self::StartsWith => {
                let (ContextValue::String(a), ContextValue::String(b)) = (attribute, expected)
                else {
                    return None;
                };
                Some(a.starts_with(b.as_str()))
            }

            Self::EndsWith => {
                let (ContextValue::String(a), ContextValue::String(b)) = (attribute, expected)
                else {
                    return None;
                };
                Some(a.ends_with(b.as_str()))
            }
        }
    }

    fn positive(&self) -> TargetingOperator {
        match self {
            Self::NotEquals => Self::Equals,
            Self::NotContains => Self::Contains,
            other => *other,
        }
    }

    fn is_negated(&self) -> bool {
        matches!(self, Self::NotEquals | Self::NotContains)
    }
}
