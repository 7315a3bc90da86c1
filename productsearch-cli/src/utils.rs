//! Common utility functions shared across CLI commands.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use productsearch_core::BoundingPoly;
use serde_json::Value;

/// Parse a `key=value` product label.
pub fn parse_label(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{s}`")),
    }
}

/// Parse a normalized bounding polygon written as `x,y;x,y;x,y[;...]`.
pub fn parse_bounding_poly(s: &str) -> Result<BoundingPoly, String> {
    let points = s
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|point| {
            let (x, y) = point
                .split_once(',')
                .ok_or_else(|| format!("invalid vertex `{point}`, expected x,y"))?;
            let x: f32 = x
                .trim()
                .parse()
                .map_err(|e| format!("invalid x in `{point}`: {e}"))?;
            let y: f32 = y
                .trim()
                .parse()
                .map_err(|e| format!("invalid y in `{point}`: {e}"))?;
            if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
                return Err(format!("vertex `{point}` is outside the unit square"));
            }
            Ok((x, y))
        })
        .collect::<Result<Vec<_>, String>>()?;

    if points.len() < 3 {
        return Err(format!(
            "a bounding polygon needs at least 3 vertices, got {}",
            points.len()
        ));
    }
    Ok(BoundingPoly::normalized(points))
}

/// Format a timestamp as a human-readable UTC string. The epoch reads as "never".
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    if time == DateTime::<Utc>::UNIX_EPOCH {
        "never".to_string()
    } else {
        time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json(value: &Value) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}
