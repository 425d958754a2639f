// =============================================================================
// Shared types used across the scoring engine
// =============================================================================
//
// The six canonical scoring dimensions are a closed set, so every per-dimension
// quantity (scores, weights, contributions, gap counters) lives in a fixed
// enum-keyed `DimensionMap` rather than a string-keyed map.
// =============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Index, IndexMut};

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

// =============================================================================
// Dimension
// =============================================================================

/// One analytical dimension producing a component score in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Technical,
    Volume,
    Orderflow,
    Orderbook,
    PriceStructure,
    Sentiment,
}

impl Dimension {
    pub const COUNT: usize = 6;

    pub const ALL: [Dimension; Dimension::COUNT] = [
        Dimension::Technical,
        Dimension::Volume,
        Dimension::Orderflow,
        Dimension::Orderbook,
        Dimension::PriceStructure,
        Dimension::Sentiment,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Volume => "volume",
            Self::Orderflow => "orderflow",
            Self::Orderbook => "orderbook",
            Self::PriceStructure => "price_structure",
            Self::Sentiment => "sentiment",
        }
    }

    /// Parse a dimension name as written in weight files. Case, dashes and
    /// underscores are ignored; `momentum` is accepted for `technical`.
    pub fn parse(name: &str) -> Option<Self> {
        let key: String = name
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();

        match key.as_str() {
            "technical" | "momentum" => Some(Self::Technical),
            "volume" => Some(Self::Volume),
            "orderflow" => Some(Self::Orderflow),
            "orderbook" => Some(Self::Orderbook),
            "pricestructure" => Some(Self::PriceStructure),
            "sentiment" => Some(Self::Sentiment),
            _ => None,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// DimensionMap
// =============================================================================

/// Fixed-size map with exactly one slot per [`Dimension`].
///
/// Serialises as a JSON object keyed by dimension name. Deserialisation fills
/// keys that are not present with `T::default()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionMap<T> {
    slots: [T; Dimension::COUNT],
}

impl<T> DimensionMap<T> {
    pub fn from_fn(mut f: impl FnMut(Dimension) -> T) -> Self {
        Self {
            slots: Dimension::ALL.map(&mut f),
        }
    }

    pub fn get(&self, dimension: Dimension) -> &T {
        &self.slots[dimension.index()]
    }

    pub fn set(&mut self, dimension: Dimension, value: T) {
        self.slots[dimension.index()] = value;
    }

    /// Builder-style `set`.
    pub fn with(mut self, dimension: Dimension, value: T) -> Self {
        self.set(dimension, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, &T)> {
        Dimension::ALL.into_iter().zip(self.slots.iter())
    }

    pub fn map<U>(&self, mut f: impl FnMut(Dimension, &T) -> U) -> DimensionMap<U> {
        DimensionMap::from_fn(|d| f(d, self.get(d)))
    }
}

impl<T: Default> Default for DimensionMap<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<Dimension> for DimensionMap<T> {
    type Output = T;

    fn index(&self, dimension: Dimension) -> &T {
        self.get(dimension)
    }
}

impl<T> IndexMut<Dimension> for DimensionMap<T> {
    fn index_mut(&mut self, dimension: Dimension) -> &mut T {
        &mut self.slots[dimension.index()]
    }
}

impl<T> DimensionMap<Option<T>> {
    /// Slots holding a value.
    pub fn present(&self) -> impl Iterator<Item = (Dimension, &T)> {
        self.iter().filter_map(|(d, v)| v.as_ref().map(|v| (d, v)))
    }

    pub fn present_count(&self) -> usize {
        self.slots.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.present_count() == 0
    }
}

impl<T: Serialize> Serialize for DimensionMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Dimension::COUNT))?;
        for (dimension, value) in self.iter() {
            map.serialize_entry(&dimension, value)?;
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de> + Default> Deserialize<'de> for DimensionMap<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<Dimension, T>::deserialize(deserializer)?;
        let mut out = Self::default();
        for (dimension, value) in raw {
            out.set(dimension, value);
        }
        Ok(out)
    }
}

/// Raw component scores for one symbol at one timestamp. `None` marks an
/// absent dimension.
pub type ComponentScores = DimensionMap<Option<f64>>;

// =============================================================================
// Decision / Side
// =============================================================================

/// Classification of an adjusted score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Sell,
    Neutral,
}

impl Decision {
    /// Trade direction implied by the decision, if any.
    pub fn side(self) -> Option<Side> {
        match self {
            Self::Buy => Some(Side::Long),
            Self::Sell => Some(Side::Short),
            Self::Neutral => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Position direction used by the risk integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_parse_accepts_aliases_and_separators() {
        assert_eq!(Dimension::parse("Technical"), Some(Dimension::Technical));
        assert_eq!(Dimension::parse("momentum"), Some(Dimension::Technical));
        assert_eq!(Dimension::parse("price_structure"), Some(Dimension::PriceStructure));
        assert_eq!(Dimension::parse("Price-Structure"), Some(Dimension::PriceStructure));
        assert_eq!(Dimension::parse("order flow"), Some(Dimension::Orderflow));
        assert_eq!(Dimension::parse("funding"), None);
    }

    #[test]
    fn dimension_map_serialises_as_named_object() {
        let scores = ComponentScores::default()
            .with(Dimension::Volume, Some(75.0))
            .with(Dimension::PriceStructure, Some(40.0));
        let v = serde_json::to_value(scores).unwrap();
        assert_eq!(v["volume"], serde_json::json!(75.0));
        assert_eq!(v["price_structure"], serde_json::json!(40.0));
        assert!(v["technical"].is_null());
    }

    #[test]
    fn dimension_map_deserialise_fills_missing_keys() {
        let scores: ComponentScores =
            serde_json::from_str(r#"{ "orderbook": 61.5, "sentiment": null }"#).unwrap();
        assert_eq!(scores[Dimension::Orderbook], Some(61.5));
        assert_eq!(scores[Dimension::Sentiment], None);
        assert_eq!(scores.present_count(), 1);
    }

    #[test]
    fn dimension_map_rejects_unknown_keys() {
        let parsed: Result<ComponentScores, _> = serde_json::from_str(r#"{ "funding": 10.0 }"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn decision_side_mapping() {
        assert_eq!(Decision::Buy.side(), Some(Side::Long));
        assert_eq!(Decision::Sell.side(), Some(Side::Short));
        assert_eq!(Decision::Neutral.side(), None);
        assert_eq!(Decision::Neutral.to_string(), "NEUTRAL");
    }
}
