use anyhow::{bail, Result};
use graphmill_core::{generate_entity_id, NodeLabel, Properties};

pub fn run(label: &str, pairs: &[String]) -> Result<()> {
    let label: NodeLabel = label.parse()?;
    let properties = parse_pairs(pairs)?;
    println!("{}", generate_entity_id(label, &properties));
    Ok(())
}

fn parse_pairs(pairs: &[String]) -> Result<Properties> {
    let mut properties = Properties::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Expected key=value, got '{pair}'");
        };
        properties.insert(key.trim().to_string(), value.into());
    }
    Ok(properties)
}
