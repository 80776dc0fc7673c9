//! Fetching the résumé into the run's working directory.

use formpilot_browser::Page;
use formpilot_core::config::TimeoutConfig;
use formpilot_core::{Error, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::resume_parser::has_pdf_signature;
use crate::run::{within, RunContext};

/// True once the rendered résumé page has meaningful content.
pub const RESUME_READY_SCRIPT: &str = "(() => { \
    const body = document.body; \
    if (body && (body.innerText || '').trim().length > 100) return true; \
    return !!document.querySelector('.resume-container, .resume, #resume, main, article, section'); \
})()";

const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// File extension of the URL path, lowercased with its dot; `.pdf` when the
/// path has none or it looks odd.
fn extension_for(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
        })
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e))
        .unwrap_or_else(|| ".pdf".to_string())
}

/// Poll `script` until it evaluates to `true` or `limit` elapses.
pub async fn wait_for_condition(page: &dyn Page, script: &str, limit: Duration) -> Result<()> {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        match page.evaluate(script).await {
            Ok(v) if v.as_bool() == Some(true) => return Ok(()),
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Readiness check failed"),
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(Error::Timeout(format!(
                "page not ready after {}s",
                limit.as_secs()
            )));
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}

pub struct ResumeAcquirer {
    client: reqwest::Client,
    download_timeout: Duration,
    navigation_timeout: Duration,
    ready_timeout: Duration,
}

impl ResumeAcquirer {
    pub fn new(client: reqwest::Client, timeouts: &TimeoutConfig) -> Self {
        Self {
            client,
            download_timeout: timeouts.download(),
            navigation_timeout: timeouts.navigation(),
            ready_timeout: timeouts.page_ready(),
        }
    }

    /// Download `url` into the run directory. Anything that is not a PDF
    /// is treated as a web page and exported to PDF (or, failing that, a
    /// PNG screenshot) through the browser.
    pub async fn acquire(&self, url: &str, ctx: &mut RunContext) -> Result<PathBuf> {
        let downloaded = self.download(url, ctx.work_dir()).await?;
        let head = tokio::fs::read(&downloaded).await?;
        if has_pdf_signature(&head) {
            info!(path = %downloaded.display(), bytes = head.len(), "Downloaded PDF résumé");
            return Ok(downloaded);
        }
        info!(bytes = head.len(), "Résumé is not a PDF, rendering it in the browser");
        self.export(url, ctx).await
    }

    async fn download(&self, url: &str, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!("resume_{}{}", now_millis(), extension_for(url)));
        let secs = self.download_timeout.as_secs();
        match tokio::time::timeout(self.download_timeout, self.stream_to_file(url, &path)).await {
            Ok(res) => res.map(|_| path),
            Err(_) => Err(Error::Download(format!("download timed out after {}s", secs))),
        }
    }

    async fn stream_to_file(&self, url: &str, path: &Path) -> Result<()> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Download(format!("request failed: {}", e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Download(format!("HTTP {}", status.as_u16())));
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = resp.bytes_stream();
        let mut total = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Download(format!("body read failed: {}", e)))?;
            total += chunk.len();
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        debug!(bytes = total, path = %path.display(), "Download complete");
        Ok(())
    }

    async fn export(&self, url: &str, ctx: &mut RunContext) -> Result<PathBuf> {
        let dir = ctx.work_dir().to_path_buf();
        let page = ctx
            .page()
            .await
            .map_err(|e| Error::Download(format!("cannot render résumé page: {}", e)))?;

        match self.render_pdf(page, url).await {
            Ok(bytes) => {
                let path = dir.join(format!("resume_{}.pdf", now_millis()));
                tokio::fs::write(&path, &bytes).await?;
                info!(path = %path.display(), bytes = bytes.len(), "Exported résumé page to PDF");
                return Ok(path);
            }
            Err(e) => warn!(error = %e, "PDF export failed, falling back to a screenshot"),
        }

        let png = page
            .screenshot(true)
            .await
            .map_err(|e| Error::Download(format!("screenshot fallback failed: {}", e)))?;
        let path = dir.join(format!("resume_{}.png", now_millis()));
        tokio::fs::write(&path, &png).await?;
        info!(path = %path.display(), "Saved résumé page screenshot");
        Ok(path)
    }

    async fn render_pdf(&self, page: &dyn Page, url: &str) -> Result<Vec<u8>> {
        within(self.navigation_timeout, "résumé page load", page.navigate(url)).await?;
        wait_for_condition(page, RESUME_READY_SCRIPT, self.ready_timeout).await?;
        page.pdf().await
    }
}
