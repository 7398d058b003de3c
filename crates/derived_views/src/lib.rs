use core_types::{Dataset, DerivedViews, FlatFieldMap};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

pub const FIELD_PREFIX: &str = "stats.";

/// Device-class split ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioConfig {
    pub ratio_a: f64,
    pub ratio_b: f64,
}

impl Default for RatioConfig {
    fn default() -> Self {
        Self {
            ratio_a: 0.2,
            ratio_b: 0.7,
        }
    }
}

/// Projects the account aggregate into the three flat views. Pure; the same
/// dataset always yields the same views.
pub fn project(dataset: &Dataset, ratios: &RatioConfig) -> DerivedViews {
    let base = base_view(dataset);
    let ratio_a = scale(&base, ratios.ratio_a);
    let ratio_b = scale(&base, ratios.ratio_b);
    DerivedViews {
        base,
        ratio_a,
        ratio_b,
    }
}

fn base_view(dataset: &Dataset) -> FlatFieldMap {
    dataset
        .account
        .iter()
        .filter(|(_, v)| is_scalar(v))
        .map(|(k, v)| (format!("{FIELD_PREFIX}{k}"), v.clone()))
        .collect()
}

// null counts as absent so rewriters fall back to the document value
fn is_scalar(v: &Value) -> bool {
    matches!(v, Value::Number(_) | Value::String(_) | Value::Bool(_))
}

pub fn scale(view: &FlatFieldMap, ratio: f64) -> FlatFieldMap {
    view.iter()
        .map(|(k, v)| (k.clone(), scale_value(v, ratio)))
        .collect()
}

fn scale_value(v: &Value, ratio: f64) -> Value {
    match v.as_f64() {
        Some(x) if v.is_number() => Number::from_f64(x * ratio)
            .map(Value::Number)
            .unwrap_or_else(|| v.clone()),
        _ => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn dataset(account: Value) -> Dataset {
        serde_json::from_value(json!({ "accountCost": account })).expect("dataset")
    }

    fn close(v: &Value, expected: f64) -> bool {
        v.as_f64().is_some_and(|x| (x - expected).abs() < 1e-9)
    }

    #[test]
    fn ratio_views_scale_numeric_fields() {
        let ds = dataset(json!({"clicks": 100, "cost": 50.0}));
        let views = project(&ds, &RatioConfig { ratio_a: 0.2, ratio_b: 0.7 });

        assert_eq!(views.base["stats.clicks"], json!(100));
        assert_eq!(views.base["stats.cost"], json!(50.0));
        assert!(close(&views.ratio_a["stats.clicks"], 20.0));
        assert!(close(&views.ratio_a["stats.cost"], 10.0));
        assert!(close(&views.ratio_b["stats.clicks"], 70.0));
        assert!(close(&views.ratio_b["stats.cost"], 35.0));
    }

    #[test]
    fn every_numeric_field_obeys_the_ratio() {
        let ds = dataset(json!({
            "clicks": 2580, "impressions": 61428, "cost_per_click": 4.91,
            "cost": 12680.5, "conversions": 0, "video_views": 17
        }));
        let ratios = RatioConfig { ratio_a: 0.1, ratio_b: 0.7 };
        let views = project(&ds, &ratios);
        for (field, base) in &views.base {
            let b = base.as_f64().expect("numeric");
            assert!(close(&views.ratio_a[field], b * ratios.ratio_a), "{field}");
            assert!(close(&views.ratio_b[field], b * ratios.ratio_b), "{field}");
        }
    }

    #[test]
    fn non_numeric_fields_copy_through_and_null_is_absent() {
        let ds = dataset(json!({
            "currency": "USD", "active": true, "note": null, "nested": {"x": 1}
        }));
        let views = project(&ds, &RatioConfig::default());
        assert_eq!(views.ratio_a["stats.currency"], json!("USD"));
        assert_eq!(views.ratio_b["stats.active"], json!(true));
        assert!(!views.base.contains_key("stats.note"));
        assert!(!views.base.contains_key("stats.nested"));
        assert_eq!(views.base.len(), views.ratio_a.len());
    }

    #[test]
    fn empty_account_yields_empty_views() {
        let views = project(&Dataset::default(), &RatioConfig::default());
        assert!(views.is_empty());
        assert!(views.ratio_a.is_empty());
    }
}
