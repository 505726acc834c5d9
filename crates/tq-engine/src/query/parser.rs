//! # Query Expression Parser
//!
//! Reads a compiled query string back into [`Clause`]s.
//!
//! Syntax:
//! ```text
//! *
//! @field:[min max]
//! @field:[lon lat radius unit]
//! @field:*fragment*   @field:prefix*   @field:%term%   @field:term
//! ```

use super::{Clause, DistanceUnit, MATCH_ALL, NEG_INF, POS_INF};
use tq_core::GeoPoint;

/// Parse a query string into its ANDed clauses.
pub fn parse(input: &str) -> Result<Vec<Clause>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("Syntax error: empty query".to_string());
    }

    let mut clauses = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }

        if let Some(after) = rest.strip_prefix(MATCH_ALL) {
            if after.is_empty() || after.starts_with(char::is_whitespace) {
                clauses.push(Clause::MatchAll);
                rest = after;
                continue;
            }
        }

        let body = rest
            .strip_prefix('@')
            .ok_or_else(|| format!("Syntax error at '{}'", rest))?;
        let colon = body
            .find(':')
            .ok_or_else(|| format!("Syntax error: missing ':' in '{}'", rest))?;
        let field = &body[..colon];
        if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("Syntax error: bad field name '{}'", field));
        }

        let after = &body[colon + 1..];
        if let Some(inner) = after.strip_prefix('[') {
            let close = inner
                .find(']')
                .ok_or_else(|| format!("Syntax error: unterminated '[' for @{}", field))?;
            clauses.push(parse_bracket(field, &inner[..close])?);
            rest = &inner[close + 1..];
        } else {
            let end = after.find(char::is_whitespace).unwrap_or(after.len());
            clauses.push(parse_token(field, &after[..end])?);
            rest = &after[end..];
        }
    }

    Ok(clauses)
}

fn parse_bracket(field: &str, inner: &str) -> Result<Clause, String> {
    let parts: Vec<&str> = inner.split_whitespace().collect();
    match parts.as_slice() {
        [min, max] => Ok(Clause::Range {
            field: field.to_string(),
            min: parse_bound(min)?,
            max: parse_bound(max)?,
        }),
        [lon, lat, radius, unit] => {
            let lon = parse_number(lon)?;
            let lat = parse_number(lat)?;
            let center = GeoPoint::new(lon, lat).map_err(|e| format!("Bad geo filter: {}", e))?;
            let radius = parse_number(radius)?;
            let unit = unit
                .parse::<DistanceUnit>()
                .map_err(|_| format!("Bad geo unit '{}'", unit))?;
            Ok(Clause::Geo {
                field: field.to_string(),
                center,
                radius,
                unit,
            })
        }
        _ => Err(format!("Syntax error: bad range '[{}]' for @{}", inner, field)),
    }
}

fn parse_bound(s: &str) -> Result<f64, String> {
    match s {
        NEG_INF => Ok(f64::NEG_INFINITY),
        POS_INF | "inf" => Ok(f64::INFINITY),
        _ => parse_number(s),
    }
}

fn parse_number(s: &str) -> Result<f64, String> {
    s.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| format!("Expected a number, got '{}'", s))
}

fn parse_token(field: &str, token: &str) -> Result<Clause, String> {
    if token.is_empty() {
        return Err(format!("Syntax error: empty value for @{}", field));
    }

    let distance = token.chars().take_while(|c| *c == '%').count();
    if distance > 0 {
        let closing = token.chars().rev().take_while(|c| *c == '%').count();
        if closing != distance || token.len() <= 2 * distance || distance > 3 {
            return Err(format!("Syntax error: bad fuzzy term '{}'", token));
        }
        return Ok(Clause::Fuzzy {
            field: field.to_string(),
            term: token[distance..token.len() - distance].to_string(),
            distance,
        });
    }

    if token.starts_with('*') || token.ends_with('*') {
        if token.trim_matches('*').is_empty() {
            return Err(format!("Syntax error: empty wildcard for @{}", field));
        }
        return Ok(Clause::Wildcard {
            field: field.to_string(),
            pattern: token.to_string(),
        });
    }

    Ok(Clause::Term {
        field: field.to_string(),
        value: token.to_string(),
    })
}
