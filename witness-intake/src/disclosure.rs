//! Conditional field disclosure
//!
//! Explanation fields appear only while their trigger option is selected.

use crate::types::FormSnapshot;

/// `trigger_field` holding `trigger_value` discloses `dependent`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisclosureRule {
    pub trigger_field: &'static str,
    pub trigger_value: &'static str,
    pub dependent: &'static str,
    /// Announced when the dependent field appears
    pub announcement: &'static str,
}

pub const DISCLOSURE_RULES: &[DisclosureRule] = &[
    DisclosureRule {
        trigger_field: "violations",
        trigger_value: "other",
        dependent: "violationOtherDescription",
        announcement: "Additional field appeared for describing other violations",
    },
    DisclosureRule {
        trigger_field: "agency",
        trigger_value: "unknown",
        dependent: "agencyUnknownDescription",
        announcement: "Additional field appeared for describing unknown agents",
    },
    DisclosureRule {
        trigger_field: "outcomes",
        trigger_value: "other",
        dependent: "outcomeOtherDescription",
        announcement: "Additional field appeared for describing other outcomes",
    },
];

/// Visibility decided for one dependent field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disclosure {
    pub rule: &'static DisclosureRule,
    pub visible: bool,
}

/// Evaluate every rule against the current values
pub fn evaluate(rules: &'static [DisclosureRule], snapshot: &FormSnapshot) -> Vec<Disclosure> {
    rules
        .iter()
        .map(|rule| Disclosure {
            rule,
            visible: snapshot
                .get(rule.trigger_field)
                .is_some_and(|value| value.contains(rule.trigger_value)),
        })
        .collect()
}
