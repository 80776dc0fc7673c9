use formpilot_browser::ChromeLauncher;
use formpilot_core::Config;
use formpilot_pipeline::{scrape_form_fields, RunContext};
use std::sync::Arc;

/// Print the fields the pipeline would see on `url`.
pub async fn run(config: Config, url: &str) -> anyhow::Result<()> {
    let launcher = Arc::new(ChromeLauncher::new(config.browser.clone()));
    let mut ctx = RunContext::create(&config.output.temp_root(), launcher)?;

    let outcome = async {
        let page = ctx.page().await?;
        tokio::time::timeout(config.timeouts.navigation(), page.navigate(url))
            .await
            .map_err(|_| anyhow::anyhow!("timed out loading {}", url))??;
        Ok::<_, anyhow::Error>(scrape_form_fields(page).await?)
    }
    .await;

    ctx.cleanup().await;
    let fields = outcome?;
    println!("{}", serde_json::to_string_pretty(&fields)?);
    Ok(())
}
