use anyhow::Result;

pub fn execute() -> Result<()> {
    let schema = dovetail_core::configs::schema_json()
        .map_err(|e| anyhow::anyhow!("Failed to generate schema: {}", e))?;
    println!("{}", schema);
    Ok(())
}
