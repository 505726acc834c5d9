//! # Query Compiler
//!
//! Turns a set of optional, typed search filters into the store's query
//! expression. The expression language is tiny:
//!
//! ```text
//! *                                  match every document
//! @averageSpeed:[50 +inf]            numeric range, -inf/+inf for open ends
//! @numberOfVehicles:[12 12]          exact value as a closed range
//! @location:[28.887 41.076 5 km]     geo radius, longitude first
//! @latitude:*41.07*                  wildcard substring
//! @latitude:%41.07%                  fuzzy (edit distance 1)
//! ```
//!
//! Clauses separated by a single space are ANDed by the store.
//! [`parser`] and [`executor`] read the same surface back for the
//! in-process store.

pub mod compiler;
pub mod executor;
pub mod parser;

pub use compiler::compile;

use serde::{Deserialize, Serialize};
use std::fmt;
use tq_core::{fields, GeoPoint, TrafficError};

/// The "match all documents" query.
pub const MATCH_ALL: &str = "*";
pub const NEG_INF: &str = "-inf";
pub const POS_INF: &str = "+inf";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    M,
    #[default]
    Km,
    Mi,
    Ft,
}

impl DistanceUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceUnit::M => "m",
            DistanceUnit::Km => "km",
            DistanceUnit::Mi => "mi",
            DistanceUnit::Ft => "ft",
        }
    }

    pub fn to_meters(&self, value: f64) -> f64 {
        match self {
            DistanceUnit::M => value,
            DistanceUnit::Km => value * 1000.0,
            DistanceUnit::Mi => value * 1609.34,
            DistanceUnit::Ft => value * 0.3048,
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DistanceUnit {
    type Err = TrafficError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" => Ok(DistanceUnit::M),
            "km" => Ok(DistanceUnit::Km),
            "mi" => Ok(DistanceUnit::Mi),
            "ft" => Ok(DistanceUnit::Ft),
            other => Err(TrafficError::invalid_filter(
                "unit",
                format!("unknown distance unit '{}'", other),
            )),
        }
    }
}

/// Search filters. Every field is optional; blank strings count as absent.
///
/// Numeric inputs are kept as the caller supplied them so that malformed
/// values can be rejected by [`compile`] instead of silently dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchFilters {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub radius: Option<String>,
    pub unit: Option<DistanceUnit>,
    pub min_speed: Option<String>,
    pub max_speed: Option<String>,
    pub vehicle_count: Option<String>,
    /// Use fuzzy rather than wildcard matching for coordinate text filters.
    pub fuzzy: bool,
}

impl SearchFilters {
    pub fn with_location(mut self, latitude: &str, longitude: &str, radius: &str) -> Self {
        self.latitude = Some(latitude.to_string());
        self.longitude = Some(longitude.to_string());
        self.radius = Some(radius.to_string());
        self
    }

    pub fn with_unit(mut self, unit: DistanceUnit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn with_latitude(mut self, latitude: &str) -> Self {
        self.latitude = Some(latitude.to_string());
        self
    }

    pub fn with_longitude(mut self, longitude: &str) -> Self {
        self.longitude = Some(longitude.to_string());
        self
    }

    pub fn with_speed(mut self, min: Option<&str>, max: Option<&str>) -> Self {
        self.min_speed = min.map(str::to_string);
        self.max_speed = max.map(str::to_string);
        self
    }

    pub fn with_vehicle_count(mut self, count: &str) -> Self {
        self.vehicle_count = Some(count.to_string());
        self
    }

    pub fn fuzzy(mut self) -> Self {
        self.fuzzy = true;
        self
    }
}

/// Space-joined clauses, or [`MATCH_ALL`] when there are none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompiledQuery {
    clauses: Vec<String>,
}

impl CompiledQuery {
    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn from_clauses(clauses: Vec<String>) -> Self {
        Self { clauses }
    }

    pub fn clauses(&self) -> &[String] {
        &self.clauses
    }

    pub fn is_match_all(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            write!(f, "{}", MATCH_ALL)
        } else {
            write!(f, "{}", self.clauses.join(" "))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Pagination {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 10,
        }
    }
}

/// Named projections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSet {
    #[default]
    All,
    Position,
    Speed,
}

impl FieldSet {
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            FieldSet::All => &[
                fields::ID,
                fields::TIMESTAMP,
                fields::LATITUDE,
                fields::LONGITUDE,
                fields::GEOHASH,
                fields::MIN_SPEED,
                fields::MAX_SPEED,
                fields::AVG_SPEED,
                fields::VEHICLE_COUNT,
            ],
            FieldSet::Position => &[
                fields::ID,
                fields::TIMESTAMP,
                fields::LATITUDE,
                fields::LONGITUDE,
                fields::GEOHASH,
            ],
            FieldSet::Speed => &[
                fields::ID,
                fields::TIMESTAMP,
                fields::MIN_SPEED,
                fields::MAX_SPEED,
                fields::AVG_SPEED,
                fields::VEHICLE_COUNT,
            ],
        }
    }
}

impl std::str::FromStr for FieldSet {
    type Err = TrafficError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(FieldSet::All),
            "position" => Ok(FieldSet::Position),
            "speed" => Ok(FieldSet::Speed),
            other => Err(TrafficError::Config(format!("unknown field set '{}'", other))),
        }
    }
}

/// One parsed query clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    MatchAll,
    Range {
        field: String,
        min: f64,
        max: f64,
    },
    Geo {
        field: String,
        center: GeoPoint,
        radius: f64,
        unit: DistanceUnit,
    },
    /// `*` may lead and/or trail the pattern.
    Wildcard { field: String, pattern: String },
    Fuzzy {
        field: String,
        term: String,
        distance: usize,
    },
    Term { field: String, value: String },
}

impl Clause {
    pub fn field(&self) -> Option<&str> {
        match self {
            Clause::MatchAll => None,
            Clause::Range { field, .. }
            | Clause::Geo { field, .. }
            | Clause::Wildcard { field, .. }
            | Clause::Fuzzy { field, .. }
            | Clause::Term { field, .. } => Some(field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiled_query_display() {
        assert_eq!(CompiledQuery::match_all().to_string(), "*");
        let q = CompiledQuery::from_clauses(vec!["@a:[1 2]".into(), "@b:*3*".into()]);
        assert_eq!(q.to_string(), "@a:[1 2] @b:*3*");
        assert!(!q.is_match_all());
    }

    #[test]
    fn test_units() {
        assert_eq!("KM".parse::<DistanceUnit>().unwrap(), DistanceUnit::Km);
        assert_eq!(DistanceUnit::Km.to_meters(0.1), 100.0);
        assert!("parsec".parse::<DistanceUnit>().is_err());
    }

    #[test]
    fn test_filters_deserialize_camel_case() {
        let filters: SearchFilters = serde_json::from_value(serde_json::json!({
            "minSpeed": "50",
            "vehicleCount": "3",
            "unit": "mi"
        }))
        .unwrap();
        assert_eq!(filters.min_speed.as_deref(), Some("50"));
        assert_eq!(filters.vehicle_count.as_deref(), Some("3"));
        assert_eq!(filters.unit, Some(DistanceUnit::Mi));
        assert!(!filters.fuzzy);
    }

    #[test]
    fn test_field_sets() {
        assert_eq!(FieldSet::All.fields().len(), 9);
        assert!(FieldSet::Speed.fields().contains(&"averageSpeed"));
        assert!(!FieldSet::Position.fields().contains(&"averageSpeed"));
        assert_eq!("speed".parse::<FieldSet>().unwrap(), FieldSet::Speed);
    }
}
