//! # tq-core
//!
//! The record model for point-in-time traffic observations.
//!
//! A [`TrafficObservation`] is one row of the source dataset. In the store it
//! becomes a flat field map under `<prefix>:<id>`, using the wire names in
//! [`fields`]:
//!
//! | Field              | Wire name          | Index type |
//! |--------------------|--------------------|------------|
//! | `id`               | `id`               | tag        |
//! | `timestamp`        | `dateTime`         | (stored)   |
//! | `latitude`         | `latitude`         | numeric    |
//! | `longitude`        | `longitude`        | numeric    |
//! | `geohash`          | `geohash`          | text       |
//! | `min_speed`        | `minimumSpeed`     | numeric    |
//! | `max_speed`        | `maximumSpeed`     | numeric    |
//! | `avg_speed`        | `averageSpeed`     | numeric    |
//! | `vehicle_count`    | `numberOfVehicles` | numeric    |
//! | (derived)          | `location`         | geo        |
//!
//! `location` is never part of the struct. It is derived from the
//! coordinate strings at write time via [`TrafficObservation::location`].

pub mod config;
pub mod error;

pub use config::{Config, DriverKind, IngestConfig, ParseErrorPolicy, SearchConfig, StoreConfig};
pub use error::{ErrorKind, ErrorReport, Result, TrafficError};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-side field names.
pub mod fields {
    pub const ID: &str = "id";
    pub const TIMESTAMP: &str = "dateTime";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
    pub const GEOHASH: &str = "geohash";
    pub const MIN_SPEED: &str = "minimumSpeed";
    pub const MAX_SPEED: &str = "maximumSpeed";
    pub const AVG_SPEED: &str = "averageSpeed";
    pub const VEHICLE_COUNT: &str = "numberOfVehicles";
    pub const LOCATION: &str = "location";

    /// Every scalar field written for a record, in write order.
    pub const SCALAR: [&str; 9] = [
        ID,
        TIMESTAMP,
        LATITUDE,
        LONGITUDE,
        GEOHASH,
        MIN_SPEED,
        MAX_SPEED,
        AVG_SPEED,
        VEHICLE_COUNT,
    ];
}

/// Source column order. The header row of an input file is skipped, so
/// this is documentation and the column count check, not a lookup table.
pub const SOURCE_COLUMNS: [&str; 8] = [
    "DATE_TIME",
    "LATITUDE",
    "LONGITUDE",
    "GEOHASH",
    "MINIMUM_SPEED",
    "MAXIMUM_SPEED",
    "AVERAGE_SPEED",
    "NUMBER_OF_VEHICLES",
];

/// One traffic observation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficObservation {
    pub id: String,
    /// Opaque, as recorded in the source.
    #[serde(rename = "dateTime")]
    pub timestamp: String,
    pub latitude: String,
    pub longitude: String,
    /// Precomputed spatial bucket from the source. Never recomputed.
    pub geohash: String,
    #[serde(rename = "minimumSpeed")]
    pub min_speed: u32,
    #[serde(rename = "maximumSpeed")]
    pub max_speed: u32,
    #[serde(rename = "averageSpeed")]
    pub avg_speed: u32,
    #[serde(rename = "numberOfVehicles")]
    pub vehicle_count: u32,
}

impl TrafficObservation {
    /// Fresh record identifier.
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().as_simple().to_string()
    }

    /// Build an observation from one data row in [`SOURCE_COLUMNS`] order.
    ///
    /// `row` is the 1-based line number in the source, used for error
    /// reporting only. A fresh id is assigned.
    pub fn from_columns(row: u64, columns: &[&str]) -> Result<Self> {
        if columns.len() < SOURCE_COLUMNS.len() {
            return Err(TrafficError::parse(
                row,
                format!(
                    "expected {} columns, found {}",
                    SOURCE_COLUMNS.len(),
                    columns.len()
                ),
            ));
        }

        let count = |idx: usize| -> Result<u32> {
            let raw = columns[idx].trim();
            raw.parse::<u32>().map_err(|_| {
                TrafficError::parse(
                    row,
                    format!("{} is not a non-negative integer: '{}'", SOURCE_COLUMNS[idx], raw),
                )
            })
        };

        Ok(Self {
            id: Self::new_id(),
            timestamp: columns[0].trim().to_string(),
            latitude: columns[1].trim().to_string(),
            longitude: columns[2].trim().to_string(),
            geohash: columns[3].trim().to_string(),
            min_speed: count(4)?,
            max_speed: count(5)?,
            avg_speed: count(6)?,
            vehicle_count: count(7)?,
        })
    }

    /// Derived geo-point, or why it cannot be derived.
    pub fn location(&self) -> std::result::Result<GeoPoint, CoordinateError> {
        GeoPoint::from_coordinates(&self.latitude, &self.longitude)
    }

    /// Scalar fields as `(wire name, value)` pairs, in [`fields::SCALAR`] order.
    pub fn field_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            (fields::ID, self.id.clone()),
            (fields::TIMESTAMP, self.timestamp.clone()),
            (fields::LATITUDE, self.latitude.clone()),
            (fields::LONGITUDE, self.longitude.clone()),
            (fields::GEOHASH, self.geohash.clone()),
            (fields::MIN_SPEED, self.min_speed.to_string()),
            (fields::MAX_SPEED, self.max_speed.to_string()),
            (fields::AVG_SPEED, self.avg_speed.to_string()),
            (fields::VEHICLE_COUNT, self.vehicle_count.to_string()),
        ]
    }
}

// =============================================================================
// Geo-point
// =============================================================================

/// Valid longitude range accepted by the store's geo encoding.
pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);
/// Valid latitude range accepted by the store's geo encoding.
pub const LATITUDE_RANGE: (f64, f64) = (-85.051_128_78, 85.051_128_78);

/// Earth radius used by the store for distance computations, in meters.
pub const EARTH_RADIUS_M: f64 = 6_372_797.560_856;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinateError {
    #[error("{axis} is not a number: '{raw}'")]
    NotANumber { axis: &'static str, raw: String },
    #[error("{axis} out of range: {value}")]
    OutOfRange { axis: &'static str, value: String },
}

/// Composite longitude/latitude value for geo-radius queries.
///
/// Encoded on the wire as `"<lon>,<lat>"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> std::result::Result<Self, CoordinateError> {
        check_axis("longitude", longitude, LONGITUDE_RANGE)?;
        check_axis("latitude", latitude, LATITUDE_RANGE)?;
        Ok(Self {
            longitude,
            latitude,
        })
    }

    /// Parse decimal coordinate strings. Latitude comes first here because
    /// that is the source column order; the wire encoding is lon-first.
    pub fn from_coordinates(
        latitude: &str,
        longitude: &str,
    ) -> std::result::Result<Self, CoordinateError> {
        let lat = parse_axis("latitude", latitude)?;
        let lon = parse_axis("longitude", longitude)?;
        Self::new(lon, lat)
    }

    /// Parse the `"<lon>,<lat>"` wire encoding.
    pub fn parse_encoded(raw: &str) -> std::result::Result<Self, CoordinateError> {
        let (lon, lat) = raw.split_once(',').ok_or_else(|| CoordinateError::NotANumber {
            axis: "location",
            raw: raw.to_string(),
        })?;
        Self::new(parse_axis("longitude", lon)?, parse_axis("latitude", lat)?)
    }

    /// Great-circle distance in meters.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.longitude, self.latitude)
    }
}

fn parse_axis(axis: &'static str, raw: &str) -> std::result::Result<f64, CoordinateError> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| CoordinateError::NotANumber {
            axis,
            raw: raw.to_string(),
        })?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CoordinateError::NotANumber {
            axis,
            raw: raw.to_string(),
        })
    }
}

fn check_axis(
    axis: &'static str,
    value: f64,
    (min, max): (f64, f64),
) -> std::result::Result<(), CoordinateError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(CoordinateError::OutOfRange {
            axis,
            value: value.to_string(),
        })
    }
}
