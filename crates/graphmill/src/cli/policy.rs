use std::path::Path;

use anyhow::{Context, Result};
use graphmill_core::PolicyTable;

pub fn run(roles: &[String], table: Option<&Path>) -> Result<()> {
    let table = match table {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read {}", path.display()))?;
            PolicyTable::from_json(&json)?
        }
        None => PolicyTable::builtin(),
    };

    for role in roles {
        if table.get(role).is_none() {
            tracing::warn!(role = %role, "Unknown role ignored");
        }
    }

    let policy = table.merge_policies(roles);
    println!("{}", serde_json::to_string_pretty(&policy)?);
    Ok(())
}
