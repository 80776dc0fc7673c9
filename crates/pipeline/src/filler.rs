//! Writes generated values into the live form.

use formpilot_browser::{ControlKind, ElementHandle, Locator, Page};
use formpilot_core::{Error, FieldValue, FieldValueMap, Result};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::run::within;
use crate::upload::FileUploadHandler;

/// Ways of finding the control for a key, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    ExactKey,
    Placeholder,
    AriaLabel,
    AnyUnfilled,
}

impl ResolveStrategy {
    pub const ORDER: [ResolveStrategy; 4] = [
        Self::ExactKey,
        Self::Placeholder,
        Self::AriaLabel,
        Self::AnyUnfilled,
    ];

    fn locator(&self, key: &str) -> Locator {
        match self {
            Self::ExactKey => Locator::ExactKey(key.to_string()),
            Self::Placeholder => Locator::PlaceholderContains(key.to_string()),
            Self::AriaLabel => Locator::AriaContains(key.to_string()),
            Self::AnyUnfilled => Locator::FormControl,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactKey => "exact_key",
            Self::Placeholder => "placeholder",
            Self::AriaLabel => "aria_label",
            Self::AnyUnfilled => "any_unfilled",
        }
    }
}

impl fmt::Display for ResolveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    Filled {
        strategy: ResolveStrategy,
        kind: ControlKind,
    },
    Uploaded {
        via: String,
    },
    Skipped(String),
}

/// Per-field outcomes in the order the fields were processed.
#[derive(Debug, Clone, Default)]
pub struct FillReport {
    pub outcomes: Vec<(String, FillOutcome)>,
}

impl FillReport {
    pub fn get(&self, key: &str) -> Option<&FillOutcome> {
        self.outcomes.iter().find(|(k, _)| k == key).map(|(_, o)| o)
    }

    pub fn filled(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| !matches!(o, FillOutcome::Skipped(_)))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.filled()
    }
}

pub struct FormFiller {
    element_timeout: Duration,
    uploader: FileUploadHandler,
}

impl FormFiller {
    pub fn new(element_timeout: Duration, uploader: FileUploadHandler) -> Self {
        Self {
            element_timeout,
            uploader,
        }
    }

    /// Fill every value. Individual field failures are recorded, never
    /// returned.
    pub async fn fill(&self, page: &dyn Page, values: &FieldValueMap, resume: &Path) -> FillReport {
        let mut used: HashSet<i64> = HashSet::new();
        let mut report = FillReport::default();

        for (key, value) in values.iter() {
            let outcome = match value {
                FieldValue::FileAttachment => self.uploader.upload(page, resume).await,
                FieldValue::Text(text) => self.fill_text(page, key, text, &mut used).await,
            };
            match &outcome {
                FillOutcome::Filled { strategy, kind } => {
                    debug!(key = %key, strategy = %strategy, kind = ?kind, "Filled field")
                }
                FillOutcome::Uploaded { via } => debug!(key = %key, via = %via, "Attached file"),
                FillOutcome::Skipped(reason) => {
                    warn!(key = %key, reason = %reason, "Could not fill field")
                }
            }
            report.outcomes.push((key.to_string(), outcome));
        }

        info!(
            filled = report.filled(),
            skipped = report.skipped(),
            "Form filling finished"
        );
        report
    }

    async fn fill_text(
        &self,
        page: &dyn Page,
        key: &str,
        value: &str,
        used: &mut HashSet<i64>,
    ) -> FillOutcome {
        for strategy in ResolveStrategy::ORDER {
            match self.try_strategy(page, strategy, key, value, used).await {
                Ok(Some(kind)) => return FillOutcome::Filled { strategy, kind },
                Ok(None) => {}
                Err(e) => debug!(key = %key, strategy = %strategy, error = %e, "Strategy failed"),
            }
        }
        FillOutcome::Skipped("no matching control accepted the value".to_string())
    }

    /// `Ok(None)` when the strategy found no unused candidate.
    async fn try_strategy(
        &self,
        page: &dyn Page,
        strategy: ResolveStrategy,
        key: &str,
        value: &str,
        used: &mut HashSet<i64>,
    ) -> Result<Option<ControlKind>> {
        let locator = strategy.locator(key);
        let candidates = within(self.element_timeout, "element lookup", page.query_all(&locator)).await?;
        let Some(element) = candidates.iter().find(|c| !used.contains(&c.node_id)).cloned() else {
            page.release(candidates).await;
            return Ok(None);
        };

        let applied = self.apply(page, &element, value).await;
        page.release(candidates).await;
        let kind = applied?;
        used.insert(element.node_id);
        Ok(Some(kind))
    }

    async fn apply(&self, page: &dyn Page, element: &ElementHandle, value: &str) -> Result<ControlKind> {
        let info = within(self.element_timeout, "describe element", page.describe(element)).await?;
        let kind = info.kind();
        match kind {
            ControlKind::Select => {
                within(self.element_timeout, "select option", page.select_option(element, value)).await?
            }
            ControlKind::Radio | ControlKind::Checkbox => {
                within(self.element_timeout, "check control", page.check(element)).await?
            }
            ControlKind::File => {
                return Err(Error::FieldFill(
                    "file input cannot take a text value".to_string(),
                ))
            }
            ControlKind::Text => {
                within(self.element_timeout, "fill element", page.fill(element, value)).await?
            }
        }
        Ok(kind)
    }
}
