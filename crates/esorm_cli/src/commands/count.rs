//! Count command implementation.

use super::settings::parse_filters;
use esorm_gateway::{build_filter, Gateway};

/// Runs the count command.
pub fn run(
    gateway: &Gateway,
    index: &str,
    filters: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let terms = parse_filters(filters)?;
    let indices: Vec<&str> = index.split(',').collect();
    let total = gateway.count(&indices, &build_filter(&terms))?;
    println!("{total}");
    Ok(())
}
