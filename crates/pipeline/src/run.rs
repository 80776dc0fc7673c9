//! Per-run resources: the scratch directory and the lazily launched page.

use formpilot_browser::{BrowserLauncher, Page};
use formpilot_core::{Error, Result};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Acquire,
    Extract,
    Navigate,
    Scrape,
    Map,
    Fill,
    Evidence,
    Cleanup,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Acquire => "acquire",
            Self::Extract => "extract",
            Self::Navigate => "navigate",
            Self::Scrape => "scrape",
            Self::Map => "map",
            Self::Fill => "fill",
            Self::Evidence => "evidence",
            Self::Cleanup => "cleanup",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run `fut` with a deadline; expiry becomes `Error::Timeout(what)`.
pub(crate) async fn within<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Timeout(format!("{} after {}ms", what, limit.as_millis()))),
    }
}

/// Owns everything one pipeline run allocates. Dropping it also releases
/// the resources, but `cleanup` does so with logging.
pub struct RunContext {
    work_dir: Option<TempDir>,
    launcher: Arc<dyn BrowserLauncher>,
    page: Option<Box<dyn Page>>,
}

impl RunContext {
    pub fn create(temp_root: &Path, launcher: Arc<dyn BrowserLauncher>) -> Result<Self> {
        std::fs::create_dir_all(temp_root)?;
        let work_dir = tempfile::Builder::new()
            .prefix("resume-")
            .tempdir_in(temp_root)?;
        debug!(dir = %work_dir.path().display(), "Created run working directory");
        Ok(Self {
            work_dir: Some(work_dir),
            launcher,
            page: None,
        })
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir
            .as_ref()
            .map(|d| d.path())
            .unwrap_or_else(|| Path::new("."))
    }

    /// The run's page, launching the browser on first use.
    pub async fn page(&mut self) -> Result<&dyn Page> {
        if self.page.is_none() {
            let page = self.launcher.launch(self.work_dir()).await?;
            self.page = Some(page);
        }
        self.page
            .as_deref()
            .ok_or_else(|| Error::Browser("browser page unavailable".to_string()))
    }

    /// Close the browser and delete the working directory. Failures are
    /// logged and swallowed.
    pub async fn cleanup(&mut self) {
        if let Some(page) = self.page.take() {
            match page.close().await {
                Ok(()) => info!("Browser closed"),
                Err(e) => warn!(error = %e, "Failed to close browser"),
            }
        }
        if let Some(dir) = self.work_dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!(dir = %path.display(), "Removed run working directory"),
                Err(e) => warn!(error = %e, dir = %path.display(), "Failed to remove working directory"),
            }
        }
    }
}
