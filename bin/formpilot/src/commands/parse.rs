use formpilot_pipeline::parse_resume;
use std::path::Path;

pub async fn run(file: &Path) -> anyhow::Result<()> {
    let profile = parse_resume(file).await?;
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}
