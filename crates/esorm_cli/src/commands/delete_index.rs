//! Delete-index command implementation.

use esorm_gateway::Gateway;
use tracing::info;

/// Runs the delete-index command. Missing indices are ignored.
pub fn run(gateway: &Gateway, indices: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let names: Vec<&str> = indices.iter().map(String::as_str).collect();
    gateway.delete_index(&names)?;
    info!(indices = %names.join(","), "indices deleted");
    Ok(())
}
