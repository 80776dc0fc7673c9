//! Attaching the résumé file to the page.

use formpilot_browser::{ElementHandle, FileInputHint, Locator, Page};
use formpilot_core::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::filler::FillOutcome;
use crate::run::within;

/// File inputs that accept files directly, most specific first.
fn direct_locators() -> Vec<Locator> {
    vec![
        Locator::FileInput(FileInputHint::Resume),
        Locator::FileInput(FileInputHint::File),
        Locator::FileInput(FileInputHint::AnyVisible),
    ]
}

/// Elements that open a native file chooser when clicked.
fn trigger_locators() -> Vec<Locator> {
    let texts: Vec<String> = ["Upload", "Browse", "Select File"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    vec![
        Locator::TagWithText {
            tag: "button".to_string(),
            texts: texts.clone(),
        },
        Locator::TagWithText {
            tag: "a".to_string(),
            texts,
        },
        Locator::AnyClass(vec![
            "upload-button".to_string(),
            "browse-button".to_string(),
            "file-upload".to_string(),
        ]),
    ]
}

pub struct FileUploadHandler {
    element_timeout: Duration,
    chooser_timeout: Duration,
}

impl FileUploadHandler {
    pub fn new(element_timeout: Duration, chooser_timeout: Duration) -> Self {
        Self {
            element_timeout,
            chooser_timeout,
        }
    }

    async fn first_match(&self, page: &dyn Page, locator: &Locator) -> Option<ElementHandle> {
        match within(self.element_timeout, "element lookup", page.query_all(locator)).await {
            Ok(mut found) => {
                if found.is_empty() {
                    return None;
                }
                let first = found.remove(0);
                page.release(found).await;
                Some(first)
            }
            Err(e) => {
                debug!(locator = %locator.describe(), error = %e, "Lookup failed");
                None
            }
        }
    }

    /// Try direct file inputs, then chooser triggers. Never fails; the
    /// outcome says what happened.
    pub async fn upload(&self, page: &dyn Page, file: &Path) -> FillOutcome {
        if !file.exists() {
            warn!(file = %file.display(), "Résumé file is missing, nothing to upload");
            return FillOutcome::Skipped(format!("{} does not exist", file.display()));
        }
        let files = vec![file.to_path_buf()];

        for locator in direct_locators() {
            let Some(input) = self.first_match(page, &locator).await else {
                continue;
            };
            let attempt = self.set_direct(page, &input, &files).await;
            page.release(vec![input]).await;
            match attempt {
                Ok(()) => {
                    info!(via = %locator.describe(), "Uploaded résumé");
                    return FillOutcome::Uploaded {
                        via: locator.describe(),
                    };
                }
                Err(e) => debug!(via = %locator.describe(), error = %e, "Direct upload failed"),
            }
        }

        for locator in trigger_locators() {
            let Some(trigger) = self.first_match(page, &locator).await else {
                continue;
            };
            let limit = self.element_timeout + self.chooser_timeout;
            let attempt = within(
                limit,
                "file chooser upload",
                page.upload_via_chooser(&trigger, &files, self.chooser_timeout),
            )
            .await;
            page.release(vec![trigger]).await;
            match attempt {
                Ok(()) => {
                    info!(via = %locator.describe(), "Uploaded résumé through file chooser");
                    return FillOutcome::Uploaded {
                        via: locator.describe(),
                    };
                }
                Err(e) => debug!(via = %locator.describe(), error = %e, "Chooser upload failed"),
            }
        }

        warn!("No upload control accepted the résumé");
        FillOutcome::Skipped("no upload control found".to_string())
    }

    async fn set_direct(&self, page: &dyn Page, input: &ElementHandle, files: &[PathBuf]) -> Result<()> {
        within(self.element_timeout, "file input", page.upload_files(input, files)).await
    }
}
