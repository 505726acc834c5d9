//! Filter → query-expression compilation.
//!
//! Clause order is fixed by category so the same filters always compile
//! to the same bytes: geo radius, speed range, vehicle count, then the
//! latitude and longitude text filters.

use super::{CompiledQuery, DistanceUnit, SearchFilters, NEG_INF, POS_INF};
use tq_core::{fields, CoordinateError, GeoPoint, Result, TrafficError};

/// Compile `filters` into a query expression.
///
/// Latitude, longitude and radius together produce a geo-radius clause.
/// Otherwise any coordinate that is present becomes a wildcard (or fuzzy)
/// text clause on its own field, and a lone radius is ignored.
pub fn compile(filters: &SearchFilters) -> Result<CompiledQuery> {
    let latitude = present(&filters.latitude);
    let longitude = present(&filters.longitude);
    let radius = present(&filters.radius);

    let mut clauses = Vec::new();

    let geo = match (latitude, longitude, radius) {
        (Some(lat), Some(lon), Some(r)) => {
            clauses.push(geo_clause(lat, lon, r, filters.unit.unwrap_or_default())?);
            true
        }
        _ => false,
    };

    if let Some(clause) = speed_clause(present(&filters.min_speed), present(&filters.max_speed))? {
        clauses.push(clause);
    }

    if let Some(raw) = present(&filters.vehicle_count) {
        let count = parse_count("vehicleCount", raw)?;
        clauses.push(format!("@{}:[{} {}]", fields::VEHICLE_COUNT, count, count));
    }

    if !geo {
        if let Some(raw) = latitude {
            clauses.push(text_clause("latitude", fields::LATITUDE, raw, filters.fuzzy)?);
        }
        if let Some(raw) = longitude {
            clauses.push(text_clause("longitude", fields::LONGITUDE, raw, filters.fuzzy)?);
        }
    }

    Ok(CompiledQuery::from_clauses(clauses))
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn geo_clause(lat: &str, lon: &str, radius: &str, unit: DistanceUnit) -> Result<String> {
    GeoPoint::from_coordinates(lat, lon).map_err(|e| {
        let filter = match &e {
            CoordinateError::NotANumber { axis, .. } | CoordinateError::OutOfRange { axis, .. }
                if *axis == "latitude" =>
            {
                "latitude"
            }
            _ => "longitude",
        };
        TrafficError::invalid_filter(filter, e.to_string())
    })?;

    let value = radius
        .parse::<f64>()
        .map_err(|_| TrafficError::invalid_filter("radius", format!("not a number: '{}'", radius)))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(TrafficError::invalid_filter(
            "radius",
            format!("must be a positive distance, got '{}'", radius),
        ));
    }

    Ok(format!(
        "@{}:[{} {} {} {}]",
        fields::LOCATION,
        lon,
        lat,
        radius,
        unit
    ))
}

/// `None` means the caller passed the unbounded marker for this end of
/// the range. The marker for the opposite end would empty the range, so
/// it is rejected.
fn parse_bound(filter: &'static str, raw: &str, lower: bool) -> Result<Option<u32>> {
    match (raw, lower) {
        (NEG_INF, true) | (POS_INF | "inf", false) => Ok(None),
        (NEG_INF | POS_INF | "inf", _) => Err(TrafficError::invalid_filter(
            filter,
            format!("'{}' is not a valid {} bound", raw, if lower { "lower" } else { "upper" }),
        )),
        _ => parse_count(filter, raw).map(Some),
    }
}

fn parse_count(filter: &'static str, raw: &str) -> Result<u32> {
    raw.parse::<u32>().map_err(|_| {
        TrafficError::invalid_filter(
            filter,
            format!("expected a non-negative integer, got '{}'", raw),
        )
    })
}

fn speed_clause(min: Option<&str>, max: Option<&str>) -> Result<Option<String>> {
    if min.is_none() && max.is_none() {
        return Ok(None);
    }
    let lower = min.map(|raw| parse_bound("minSpeed", raw, true)).transpose()?.flatten();
    let upper = max.map(|raw| parse_bound("maxSpeed", raw, false)).transpose()?.flatten();

    if let (Some(lo), Some(hi)) = (lower, upper) {
        if lo > hi {
            return Err(TrafficError::invalid_filter(
                "minSpeed",
                format!("{} is greater than maxSpeed {}", lo, hi),
            ));
        }
    }

    let lower = lower.map_or_else(|| NEG_INF.to_string(), |v| v.to_string());
    let upper = upper.map_or_else(|| POS_INF.to_string(), |v| v.to_string());
    Ok(Some(format!("@{}:[{} {}]", fields::AVG_SPEED, lower, upper)))
}

fn text_clause(filter: &'static str, field: &str, raw: &str, fuzzy: bool) -> Result<String> {
    let well_formed = raw.chars().any(|c| c.is_ascii_digit())
        && raw.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-');
    if !well_formed {
        return Err(TrafficError::invalid_filter(
            filter,
            format!("expected a decimal coordinate fragment, got '{}'", raw),
        ));
    }
    if fuzzy {
        Ok(format!("@{}:%{}%", field, raw))
    } else {
        Ok(format!("@{}:*{}*", field, raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tq_core::ErrorKind;

    fn compiled(filters: &SearchFilters) -> String {
        compile(filters).unwrap().to_string()
    }

    #[test]
    fn test_no_filters_is_match_all() {
        assert_eq!(compiled(&SearchFilters::default()), "*");
    }

    #[test]
    fn test_blank_values_are_absent() {
        let filters = SearchFilters {
            latitude: Some("  ".into()),
            min_speed: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(compiled(&filters), "*");
    }

    #[test]
    fn test_geo_clause_is_longitude_first() {
        let filters = SearchFilters::default().with_location("41.076", "28.887", "5");
        assert_eq!(compiled(&filters), "@location:[28.887 41.076 5 km]");
    }

    #[test]
    fn test_geo_clause_unit() {
        let filters = SearchFilters::default()
            .with_location("41.076", "28.887", "500")
            .with_unit(DistanceUnit::M);
        assert_eq!(compiled(&filters), "@location:[28.887 41.076 500 m]");
    }

    #[test]
    fn test_min_speed_only_has_unbounded_upper() {
        let filters = SearchFilters::default().with_speed(Some("50"), None);
        assert_eq!(compiled(&filters), "@averageSpeed:[50 +inf]");
    }

    #[test]
    fn test_max_speed_only_has_unbounded_lower() {
        let filters = SearchFilters::default().with_speed(None, Some("90"));
        assert_eq!(compiled(&filters), "@averageSpeed:[-inf 90]");
    }

    #[test]
    fn test_explicit_unbounded_markers() {
        let filters = SearchFilters::default().with_speed(Some("-inf"), Some("+inf"));
        assert_eq!(compiled(&filters), "@averageSpeed:[-inf +inf]");
    }

    #[test]
    fn test_reversed_unbounded_markers_are_rejected() {
        let err = compile(&SearchFilters::default().with_speed(Some("+inf"), Some("-inf")))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFilter);
        assert!(err.to_string().contains("minSpeed"));

        let err = compile(&SearchFilters::default().with_speed(None, Some("-inf"))).unwrap_err();
        assert!(err.to_string().contains("maxSpeed"));

        let err = compile(&SearchFilters::default().with_speed(Some("inf"), None)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFilter);
    }

    #[test]
    fn test_vehicle_count_is_closed_range() {
        let filters = SearchFilters::default().with_vehicle_count("12");
        assert_eq!(compiled(&filters), "@numberOfVehicles:[12 12]");
    }

    #[test]
    fn test_single_coordinate_is_text_mode() {
        let filters = SearchFilters::default().with_latitude("41.07");
        assert_eq!(compiled(&filters), "@latitude:*41.07*");

        let filters = SearchFilters::default().with_longitude("28.9").fuzzy();
        assert_eq!(compiled(&filters), "@longitude:%28.9%");
    }

    #[test]
    fn test_radius_without_both_coordinates_is_not_geo() {
        let mut filters = SearchFilters::default().with_latitude("41.07");
        filters.radius = Some("5".into());
        assert_eq!(compiled(&filters), "@latitude:*41.07*");
    }

    #[test]
    fn test_both_coordinates_without_radius() {
        let filters = SearchFilters::default()
            .with_latitude("41.07")
            .with_longitude("28.88");
        assert_eq!(compiled(&filters), "@latitude:*41.07* @longitude:*28.88*");
    }

    #[test]
    fn test_combination_order_is_fixed() {
        let filters = SearchFilters::default()
            .with_vehicle_count("3")
            .with_speed(Some("10"), Some("60"))
            .with_location("41.076", "28.887", "2");
        let expected = "@location:[28.887 41.076 2 km] @averageSpeed:[10 60] @numberOfVehicles:[3 3]";
        assert_eq!(compiled(&filters), expected);
        // Deterministic across calls.
        assert_eq!(compiled(&filters.clone()), expected);
    }

    #[test]
    fn test_malformed_inputs_are_invalid_filters() {
        let cases = vec![
            SearchFilters::default().with_speed(Some("fast"), None),
            SearchFilters::default().with_speed(Some("-5"), None),
            SearchFilters::default().with_speed(Some("70"), Some("20")),
            SearchFilters::default().with_vehicle_count("2.5"),
            SearchFilters::default().with_location("abc", "28.887", "5"),
            SearchFilters::default().with_location("41.076", "28.887", "-1"),
            SearchFilters::default().with_location("41.076", "28.887", "far"),
            SearchFilters::default().with_latitude("41.07*"),
        ];
        for filters in cases {
            let err = compile(&filters).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFilter, "{:?}", filters);
        }
    }

    #[test]
    fn test_invalid_filter_names_the_axis() {
        let err = compile(&SearchFilters::default().with_location("41.0", "500", "1")).unwrap_err();
        assert!(matches!(
            err,
            TrafficError::InvalidFilter {
                filter: "longitude",
                ..
            }
        ));
    }
}
