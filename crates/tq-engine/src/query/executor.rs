//! # Clause Evaluator
//!
//! Evaluates parsed clauses against one stored document (a flat field
//! map). A document that lacks the field a clause targets never matches
//! that clause.

use super::Clause;
use std::collections::HashMap;
use tq_core::GeoPoint;

/// True when the document satisfies every clause.
pub fn matches(doc: &HashMap<String, String>, clauses: &[Clause]) -> bool {
    clauses.iter().all(|clause| evaluate(doc, clause))
}

fn evaluate(doc: &HashMap<String, String>, clause: &Clause) -> bool {
    match clause {
        Clause::MatchAll => true,
        Clause::Range { field, min, max } => doc
            .get(field)
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .map_or(false, |v| v >= *min && v <= *max),
        Clause::Geo {
            field,
            center,
            radius,
            unit,
        } => doc
            .get(field)
            .and_then(|raw| GeoPoint::parse_encoded(raw).ok())
            .map_or(false, |point| {
                point.distance_m(center) <= unit.to_meters(*radius)
            }),
        Clause::Wildcard { field, pattern } => doc
            .get(field)
            .map_or(false, |raw| wildcard_match(&raw.to_lowercase(), &pattern.to_lowercase())),
        Clause::Fuzzy {
            field,
            term,
            distance,
        } => doc.get(field).map_or(false, |raw| {
            let term = term.to_lowercase();
            tokens(raw).any(|token| levenshtein(&token, &term) <= *distance)
        }),
        Clause::Term { field, value } => doc.get(field).map_or(false, |raw| {
            let value = value.to_lowercase();
            tokens(raw).any(|token| token == value)
        }),
    }
}

fn tokens(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn wildcard_match(value: &str, pattern: &str) -> bool {
    let leading = pattern.starts_with('*');
    let trailing = pattern.len() > 1 && pattern.ends_with('*');
    let core = pattern.trim_matches('*');
    match (leading, trailing) {
        (true, true) => value.contains(core),
        (true, false) => value.ends_with(core),
        (false, true) => value.starts_with(core),
        (false, false) => value == core,
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;

    fn doc(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn check(query: &str, d: &HashMap<String, String>) -> bool {
        matches(d, &parse(query).unwrap())
    }

    #[test]
    fn test_range() {
        let d = doc(&[("averageSpeed", "55")]);
        assert!(check("@averageSpeed:[50 +inf]", &d));
        assert!(check("@averageSpeed:[55 55]", &d));
        assert!(!check("@averageSpeed:[-inf 54]", &d));
        assert!(!check("@numberOfVehicles:[0 +inf]", &d));
    }

    #[test]
    fn test_geo_radius() {
        let d = doc(&[("location", "28.97,41.08")]);
        assert!(check("@location:[28.97 41.08 0.1 km]", &d));
        assert!(check("@location:[28.971 41.08 100 m]", &d));
        assert!(!check("@location:[29.5 41.08 5 km]", &d));
        assert!(!check("@location:[28.97 41.08 1 km]", &doc(&[("latitude", "41.08")])));
    }

    #[test]
    fn test_wildcard() {
        let d = doc(&[("latitude", "41.0763")]);
        assert!(check("@latitude:*07*", &d));
        assert!(check("@latitude:41.07*", &d));
        assert!(check("@latitude:*763", &d));
        assert!(!check("@latitude:*99*", &d));
    }

    #[test]
    fn test_fuzzy() {
        let d = doc(&[("latitude", "41.076")]);
        assert!(check("@latitude:%41.07%", &d));
        assert!(check("@latitude:%41.176%", &d));
        assert!(!check("@latitude:%40.1%", &d));
        assert!(check("@latitude:%%40.176%%", &d));
    }

    #[test]
    fn test_term_and_match_all() {
        let d = doc(&[("geohash", "SXK3XW")]);
        assert!(check("@geohash:sxk3xw", &d));
        assert!(!check("@geohash:sxk3", &d));
        assert!(check("*", &d));
    }

    #[test]
    fn test_conjunction() {
        let d = doc(&[("averageSpeed", "40"), ("numberOfVehicles", "7")]);
        assert!(check("@averageSpeed:[30 50] @numberOfVehicles:[7 7]", &d));
        assert!(!check("@averageSpeed:[30 50] @numberOfVehicles:[8 8]", &d));
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }
}
