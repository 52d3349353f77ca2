//! Pricing feature schema
//!
//! The model was trained on a fixed, ordered set of 18 columns. The order
//! here is the column order of the training frame and must not change.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

pub const FEATURE_COUNT: usize = 18;

/// One model input column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Cost,
    CurrentPrice,
    OriginalPrice,
    Margin,
    Stock,
    MaxStock,
    MinStockLevel,
    DaysUntilExpiry,
    IsPerishable,
    ExpirationUrgency,
    StockLevel,
    TimeOfDay,
    DemandForecast,
    CompetitorPrice,
    Seasonality,
    MarketTrend,
    ClearanceRate,
    WasteReduction,
}

impl Feature {
    /// All features in training column order.
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::Cost,
        Feature::CurrentPrice,
        Feature::OriginalPrice,
        Feature::Margin,
        Feature::Stock,
        Feature::MaxStock,
        Feature::MinStockLevel,
        Feature::DaysUntilExpiry,
        Feature::IsPerishable,
        Feature::ExpirationUrgency,
        Feature::StockLevel,
        Feature::TimeOfDay,
        Feature::DemandForecast,
        Feature::CompetitorPrice,
        Feature::Seasonality,
        Feature::MarketTrend,
        Feature::ClearanceRate,
        Feature::WasteReduction,
    ];

    /// Wire name of the feature. The `priceFactors.*` names are flat keys
    /// containing a literal dot, not nested objects.
    pub fn name(&self) -> &'static str {
        match self {
            Feature::Cost => "cost",
            Feature::CurrentPrice => "currentPrice",
            Feature::OriginalPrice => "originalPrice",
            Feature::Margin => "margin",
            Feature::Stock => "stock",
            Feature::MaxStock => "maxStock",
            Feature::MinStockLevel => "minStockLevel",
            Feature::DaysUntilExpiry => "daysUntilExpiry",
            Feature::IsPerishable => "isPerishable",
            Feature::ExpirationUrgency => "priceFactors.expirationUrgency",
            Feature::StockLevel => "priceFactors.stockLevel",
            Feature::TimeOfDay => "priceFactors.timeOfDay",
            Feature::DemandForecast => "priceFactors.demandForecast",
            Feature::CompetitorPrice => "priceFactors.competitorPrice",
            Feature::Seasonality => "priceFactors.seasonality",
            Feature::MarketTrend => "priceFactors.marketTrend",
            Feature::ClearanceRate => "clearanceRate",
            Feature::WasteReduction => "wasteReduction",
        }
    }

    /// Column index in the training frame.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Feature::ALL.iter().copied().find(|f| f.name() == name)
    }
}

/// Column names in training order.
pub fn feature_names() -> Vec<&'static str> {
    Feature::ALL.iter().map(|f| f.name()).collect()
}

/// Coerce a JSON value to a feature value.
///
/// Numbers pass through, booleans become 1/0, strings are parsed as floats.
/// Anything else (null, arrays, objects, unparseable strings) is missing.
pub fn coerce_numeric(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// A single request row before imputation. `None` marks a missing value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct FeatureRecord {
    values: [Option<f64>; FEATURE_COUNT],
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, feature: Feature, value: f64) -> Self {
        self.set(feature, value);
        self
    }

    /// Non-finite values are stored as missing.
    pub fn set(&mut self, feature: Feature, value: f64) {
        self.values[feature.index()] = Some(value).filter(|v| v.is_finite());
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.values[feature.index()]
    }

    /// Values in training column order.
    pub fn values(&self) -> &[Option<f64>; FEATURE_COUNT] {
        &self.values
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    /// Build a record from a JSON object. Unknown keys are ignored.
    pub fn from_json_map(map: &Map<String, Value>) -> Self {
        let mut record = Self::default();
        for feature in Feature::ALL {
            record.values[feature.index()] = map.get(feature.name()).and_then(coerce_numeric);
        }
        record
    }
}

impl From<Map<String, Value>> for FeatureRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self::from_json_map(&map)
    }
}

impl Serialize for FeatureRecord {
    /// Present values only, as flat `name: value` pairs.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let present = Feature::ALL
            .iter()
            .filter_map(|f| self.get(*f).map(|v| (f.name(), v)));
        let mut map = serializer.serialize_map(Some(FEATURE_COUNT - self.missing_count()))?;
        for (name, value) in present {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

/// A fully numeric row after imputation, in training column order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRow(pub [f64; FEATURE_COUNT]);

impl FeatureRow {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.0[feature.index()]
    }
}
