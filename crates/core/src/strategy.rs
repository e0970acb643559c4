//! Bidding strategy resolution.
//!
//! The advertising platform reports a campaign's bidding strategy as a
//! numeric enum code (or its enum name over REST) plus a handful of optional
//! target sub-fields. Everything downstream works with the single
//! [`BiddingStrategy`] variant produced here.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const TARGET_CPA_CODE: i32 = 6;
pub const TARGET_ROAS_CODE: i32 = 8;
pub const MAXIMIZE_CONVERSIONS_CODE: i32 = 10;
pub const MAXIMIZE_CONVERSION_VALUE_CODE: i32 = 11;

const MICROS_PER_UNIT: f64 = 1_000_000.0;

/// Provider enum names and their numeric codes.
const STRATEGY_NAMES: &[(&str, i32)] = &[
    ("UNSPECIFIED", 0),
    ("UNKNOWN", 1),
    ("ENHANCED_CPC", 2),
    ("MANUAL_CPC", 3),
    ("MANUAL_CPM", 4),
    ("PAGE_ONE_PROMOTED", 5),
    ("TARGET_CPA", TARGET_CPA_CODE),
    ("TARGET_OUTRANK_SHARE", 7),
    ("TARGET_ROAS", TARGET_ROAS_CODE),
    ("TARGET_SPEND", 9),
    ("MAXIMIZE_CONVERSIONS", MAXIMIZE_CONVERSIONS_CODE),
    ("MAXIMIZE_CONVERSION_VALUE", MAXIMIZE_CONVERSION_VALUE_CODE),
    ("PERCENT_CPC", 12),
    ("MANUAL_CPV", 13),
    ("TARGET_CPM", 14),
    ("TARGET_IMPRESSION_SHARE", 15),
    ("COMMISSION", 16),
    ("INVALID", 17),
    ("MANUAL_CPA", 18),
];

/// Raw target sub-fields as reported by the platform. Micros are in
/// millionths of the account currency; ROAS values are plain ratios.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyFields {
    pub target_cpa_micros: Option<f64>,
    pub target_roas_ratio: Option<f64>,
    pub maximize_conversions_target_cpa_micros: Option<f64>,
    pub maximize_conversion_value_target_roas: Option<f64>,
}

/// Semantic bidding strategy. At most one of CPA/ROAS is meaningful per
/// variant; the `Maximize*` variants carry a target only when the platform
/// reported the corresponding sub-field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BiddingStrategy {
    TargetCpa(f64),
    MaximizeConversions(Option<f64>),
    TargetRoas(f64),
    MaximizeConversionValue(Option<f64>),
    Unknown,
}

/// A numeric target an operator may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum TargetField {
    #[serde(alias = "target_cpa", alias = "cpa")]
    TargetCpa,
    #[serde(alias = "target_roas", alias = "roas")]
    TargetRoas,
}

/// The concrete provider field that holds a campaign's target. The two
/// CPA slots (and the two ROAS slots) are mutually exclusive upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSlot {
    TargetCpa,
    MaximizeConversions,
    TargetRoas,
    MaximizeConversionValue,
}

/// Map a provider strategy code and its sub-fields to a [`BiddingStrategy`].
/// Unmapped codes resolve to [`BiddingStrategy::Unknown`].
pub fn resolve(code: i32, fields: &StrategyFields) -> BiddingStrategy {
    match code {
        TARGET_CPA_CODE => {
            BiddingStrategy::TargetCpa(present(fields.target_cpa_micros).map(micros_to_units).unwrap_or(0.0))
        }
        MAXIMIZE_CONVERSIONS_CODE => BiddingStrategy::MaximizeConversions(
            present(fields.maximize_conversions_target_cpa_micros).map(micros_to_units),
        ),
        TARGET_ROAS_CODE => BiddingStrategy::TargetRoas(present(fields.target_roas_ratio).unwrap_or(0.0)),
        MAXIMIZE_CONVERSION_VALUE_CODE => {
            BiddingStrategy::MaximizeConversionValue(present(fields.maximize_conversion_value_target_roas))
        }
        _ => BiddingStrategy::Unknown,
    }
}

/// Resolve from the provider's enum name, as the REST transport reports it.
pub fn resolve_named(name: &str, fields: &StrategyFields) -> BiddingStrategy {
    match code_from_name(name) {
        Some(code) => resolve(code, fields),
        None => BiddingStrategy::Unknown,
    }
}

pub fn code_from_name(name: &str) -> Option<i32> {
    let name = name.trim();
    STRATEGY_NAMES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|(_, code)| *code)
}

pub fn micros_to_units(micros: f64) -> f64 {
    micros / MICROS_PER_UNIT
}

pub fn units_to_micros(units: f64) -> i64 {
    (units * MICROS_PER_UNIT).round() as i64
}

// Zero means "not set" for the platform's scalar target fields.
fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

impl BiddingStrategy {
    pub fn provider_name(&self) -> &'static str {
        match self {
            BiddingStrategy::TargetCpa(_) => "TARGET_CPA",
            BiddingStrategy::MaximizeConversions(_) => "MAXIMIZE_CONVERSIONS",
            BiddingStrategy::TargetRoas(_) => "TARGET_ROAS",
            BiddingStrategy::MaximizeConversionValue(_) => "MAXIMIZE_CONVERSION_VALUE",
            BiddingStrategy::Unknown => "UNKNOWN",
        }
    }

    /// CPA target in account currency, if this strategy governs one.
    pub fn target_cpa(&self) -> Option<f64> {
        match self {
            BiddingStrategy::TargetCpa(v) => Some(*v),
            BiddingStrategy::MaximizeConversions(v) => *v,
            _ => None,
        }
    }

    /// ROAS target as a ratio, if this strategy governs one.
    pub fn target_roas(&self) -> Option<f64> {
        match self {
            BiddingStrategy::TargetRoas(v) => Some(*v),
            BiddingStrategy::MaximizeConversionValue(v) => *v,
            _ => None,
        }
    }

    /// The provider slot a change to `field` must be written to, or `None`
    /// when the current strategy does not support that target.
    pub fn slot_for(&self, field: TargetField) -> Option<TargetSlot> {
        match (field, self) {
            (TargetField::TargetCpa, BiddingStrategy::TargetCpa(_)) => Some(TargetSlot::TargetCpa),
            (TargetField::TargetCpa, BiddingStrategy::MaximizeConversions(Some(_))) => {
                Some(TargetSlot::MaximizeConversions)
            }
            (TargetField::TargetRoas, BiddingStrategy::TargetRoas(_)) => Some(TargetSlot::TargetRoas),
            (TargetField::TargetRoas, BiddingStrategy::MaximizeConversionValue(Some(_))) => {
                Some(TargetSlot::MaximizeConversionValue)
            }
            _ => None,
        }
    }

    pub fn supports(&self, field: TargetField) -> bool {
        self.slot_for(field).is_some()
    }
}

impl TargetField {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetField::TargetCpa => "targetCpa",
            TargetField::TargetRoas => "targetRoas",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "targetcpa" | "target_cpa" | "cpa" => Some(TargetField::TargetCpa),
            "targetroas" | "target_roas" | "roas" => Some(TargetField::TargetRoas),
            _ => None,
        }
    }
}

impl TargetSlot {
    /// Dotted field path in the provider's campaign resource.
    pub fn field_path(&self) -> &'static str {
        match self {
            TargetSlot::TargetCpa => "target_cpa.target_cpa_micros",
            TargetSlot::MaximizeConversions => "maximize_conversions.target_cpa_micros",
            TargetSlot::TargetRoas => "target_roas.target_roas",
            TargetSlot::MaximizeConversionValue => "maximize_conversion_value.target_roas",
        }
    }

    /// Encode an operator-facing value in the slot's wire unit.
    pub fn encode(&self, value: f64) -> serde_json::Value {
        match self {
            TargetSlot::TargetCpa | TargetSlot::MaximizeConversions => {
                // int64 fields travel as strings in the REST JSON mapping
                serde_json::Value::String(units_to_micros(value).to_string())
            }
            TargetSlot::TargetRoas | TargetSlot::MaximizeConversionValue => serde_json::json!(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> StrategyFields {
        StrategyFields::default()
    }

    #[test]
    fn unmapped_codes_resolve_to_unknown() {
        for code in [-1, 0, 1, 2, 3, 7, 9, 12, 13, 99, i32::MAX, i32::MIN] {
            assert_eq!(resolve(code, &fields()), BiddingStrategy::Unknown, "code {code}");
        }
    }

    #[test]
    fn target_cpa_converts_micros() {
        let f = StrategyFields {
            target_cpa_micros: Some(45_500_000.0),
            ..fields()
        };
        assert_eq!(resolve(TARGET_CPA_CODE, &f), BiddingStrategy::TargetCpa(45.5));
    }

    #[test]
    fn maximize_conversions_without_sub_field_carries_no_target() {
        let strategy = resolve(MAXIMIZE_CONVERSIONS_CODE, &fields());
        assert_eq!(strategy, BiddingStrategy::MaximizeConversions(None));
        assert!(!strategy.supports(TargetField::TargetCpa));
        assert_eq!(strategy.target_cpa(), None);
    }

    #[test]
    fn maximize_conversions_with_sub_field_writes_its_own_slot() {
        let f = StrategyFields {
            maximize_conversions_target_cpa_micros: Some(30_000_000.0),
            // sibling field is ignored for this strategy
            target_cpa_micros: Some(99_000_000.0),
            ..fields()
        };
        let strategy = resolve(MAXIMIZE_CONVERSIONS_CODE, &f);
        assert_eq!(strategy, BiddingStrategy::MaximizeConversions(Some(30.0)));
        assert_eq!(strategy.slot_for(TargetField::TargetCpa), Some(TargetSlot::MaximizeConversions));
        assert_eq!(strategy.slot_for(TargetField::TargetRoas), None);
    }

    #[test]
    fn roas_strategies_never_expose_cpa() {
        let f = StrategyFields {
            target_roas_ratio: Some(4.0),
            maximize_conversion_value_target_roas: Some(3.5),
            target_cpa_micros: Some(1_000_000.0),
            ..fields()
        };
        let target = resolve(TARGET_ROAS_CODE, &f);
        assert_eq!(target.target_roas(), Some(4.0));
        assert_eq!(target.target_cpa(), None);

        let max_value = resolve(MAXIMIZE_CONVERSION_VALUE_CODE, &f);
        assert_eq!(max_value.slot_for(TargetField::TargetRoas), Some(TargetSlot::MaximizeConversionValue));
        assert!(!max_value.supports(TargetField::TargetCpa));
    }

    #[test]
    fn zero_sub_field_counts_as_absent() {
        let f = StrategyFields {
            maximize_conversion_value_target_roas: Some(0.0),
            ..fields()
        };
        assert_eq!(
            resolve(MAXIMIZE_CONVERSION_VALUE_CODE, &f),
            BiddingStrategy::MaximizeConversionValue(None)
        );
    }

    #[test]
    fn provider_names_resolve_case_insensitively() {
        assert_eq!(code_from_name("target_roas"), Some(TARGET_ROAS_CODE));
        assert_eq!(code_from_name("MANUAL_CPC"), Some(3));
        assert_eq!(resolve_named("NOT_A_STRATEGY", &fields()), BiddingStrategy::Unknown);
        assert_eq!(resolve_named("MANUAL_CPC", &fields()), BiddingStrategy::Unknown);
    }

    #[test]
    fn cpa_slots_encode_micros_as_strings() {
        assert_eq!(TargetSlot::MaximizeConversions.encode(12.34), serde_json::json!("12340000"));
        assert_eq!(TargetSlot::TargetRoas.encode(4.5), serde_json::json!(4.5));
    }

    #[test]
    fn strategy_serializes_as_tagged_variant() {
        let json = serde_json::to_value(BiddingStrategy::TargetRoas(3.0)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "TARGET_ROAS", "value": 3.0}));
        let json = serde_json::to_value(BiddingStrategy::Unknown).unwrap();
        assert_eq!(json, serde_json::json!({"type": "UNKNOWN"}));
    }
}
