use formpilot_browser::ChromeLauncher;
use formpilot_core::Config;
use formpilot_pipeline::Pipeline;
use formpilot_providers::{create_provider, Provider};
use std::sync::Arc;

/// Run one application and print the result record. Returns whether the
/// run succeeded.
pub async fn run(config: Config, resume_url: &str, job_url: &str) -> anyhow::Result<bool> {
    let provider: Arc<dyn Provider> = Arc::from(create_provider(&config)?);
    let launcher = Arc::new(ChromeLauncher::new(config.browser.clone()));
    let pipeline = Pipeline::new(&config, provider, launcher);

    let result = pipeline.run(resume_url, job_url).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.is_success())
}
