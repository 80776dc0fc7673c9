//! Drives one application run from résumé URL to evidence screenshot.

use formpilot_browser::BrowserLauncher;
use formpilot_core::config::{NetworkConfig, OutputConfig, TimeoutConfig};
use formpilot_core::{Config, Error, PipelineResult, Result};
use formpilot_providers::{build_http_client, HttpClientOptions, Provider};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::acquire::ResumeAcquirer;
use crate::filler::FormFiller;
use crate::mapper::FieldMapper;
use crate::resume_parser::parse_resume;
use crate::run::{within, RunContext, Stage};
use crate::scraper::scrape_form_fields;
use crate::upload::FileUploadHandler;

pub struct Pipeline {
    mapper: FieldMapper,
    filler: FormFiller,
    launcher: Arc<dyn BrowserLauncher>,
    timeouts: TimeoutConfig,
    network: NetworkConfig,
    output: OutputConfig,
}

fn enter(stage: &mut Stage, next: Stage) {
    debug!(from = %stage, to = %next, "Stage transition");
    *stage = next;
}

/// `path` relative to the current directory when it lives below it.
fn display_path(path: &Path) -> String {
    if path.is_relative() {
        return path.display().to_string();
    }
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(&cwd).ok().map(|p| p.display().to_string()))
        .unwrap_or_else(|| path.display().to_string())
}

impl Pipeline {
    pub fn new(
        config: &Config,
        provider: Arc<dyn Provider>,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Self {
        let timeouts = config.timeouts.clone();
        let uploader = FileUploadHandler::new(timeouts.element(), timeouts.file_chooser());
        Self {
            mapper: FieldMapper::new(provider, timeouts.ai()),
            filler: FormFiller::new(timeouts.element(), uploader),
            launcher,
            timeouts,
            network: config.network.clone(),
            output: config.output.clone(),
        }
    }

    fn acquirer_for(&self, resume_url: &str) -> ResumeAcquirer {
        let opts = HttpClientOptions {
            global_proxy: self.network.proxy.as_deref(),
            no_proxy: &self.network.no_proxy,
            user_agent: self.network.user_agent.as_deref(),
            ..Default::default()
        };
        let client = build_http_client(resume_url, self.timeouts.download(), &opts);
        ResumeAcquirer::new(client, &self.timeouts)
    }

    /// Run the whole pipeline. Always returns a result record; the browser
    /// and the working directory are released before returning.
    pub async fn run(&self, resume_url: &str, job_url: &str) -> PipelineResult {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id);
        self.run_in_span(resume_url, job_url).instrument(span).await
    }

    async fn run_in_span(&self, resume_url: &str, job_url: &str) -> PipelineResult {
        info!(resume_url = %resume_url, job_url = %job_url, "Starting application run");
        let mut ctx = match RunContext::create(&self.output.temp_root(), self.launcher.clone()) {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(stage = %Stage::Init, kind = e.kind(), error = %e, "Run failed");
                return PipelineResult::Failed {
                    error: e.to_string(),
                };
            }
        };

        let mut stage = Stage::Init;
        let outcome = self.execute(&mut ctx, &mut stage, resume_url, job_url).await;
        let failed_at = stage;

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                enter(&mut stage, Stage::Failed);
                error!(stage = %failed_at, kind = e.kind(), error = %e, "Run failed");
                PipelineResult::Failed {
                    error: e.to_string(),
                }
            }
        };

        enter(&mut stage, Stage::Cleanup);
        ctx.cleanup().await;
        if result.is_success() {
            enter(&mut stage, Stage::Done);
            info!("Application run finished");
        }
        result
    }

    async fn execute(
        &self,
        ctx: &mut RunContext,
        stage: &mut Stage,
        resume_url: &str,
        job_url: &str,
    ) -> Result<PipelineResult> {
        enter(stage, Stage::Acquire);
        let resume_path = self.acquirer_for(resume_url).acquire(resume_url, ctx).await?;

        enter(stage, Stage::Extract);
        let profile = parse_resume(&resume_path).await?;

        enter(stage, Stage::Navigate);
        let page = ctx.page().await?;
        within(self.timeouts.navigation(), "job page load", page.navigate(job_url))
            .await
            .map_err(|e| match e {
                Error::Navigation(_) => e,
                other => Error::Navigation(format!("{}: {}", job_url, other)),
            })?;
        info!(url = %job_url, "Job page loaded");

        enter(stage, Stage::Scrape);
        let fields = scrape_form_fields(page).await?;

        enter(stage, Stage::Map);
        let values = self.mapper.map(&fields, &profile).await?;

        enter(stage, Stage::Fill);
        self.filler.fill(page, &values, &resume_path).await;

        enter(stage, Stage::Evidence);
        let png = page.screenshot(true).await?;
        let screenshot = self.write_evidence(&png).await?;
        info!(path = %screenshot.display(), "Saved evidence screenshot");

        Ok(PipelineResult::Success {
            form_fields: fields,
            filled_form_data: values,
            screenshot_path: display_path(&screenshot),
        })
    }

    async fn write_evidence(&self, png: &[u8]) -> Result<PathBuf> {
        let dir = self.output.screenshots_dir();
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!(
            "form-filled-{}.png",
            chrono::Utc::now().timestamp_millis()
        ));
        tokio::fs::write(&path, png).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{minimal_pdf, serve, FakeElement, FakeLauncher, FakeProvider, FakeState};
    use formpilot_core::{FieldValue, FILE_SENTINEL};
    use serde_json::json;

    struct Harness {
        temp_root: tempfile::TempDir,
        shots: tempfile::TempDir,
        config: Config,
    }

    fn harness() -> Harness {
        let temp_root = tempfile::tempdir().unwrap();
        let shots = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.output.temp_root = Some(temp_root.path().display().to_string());
        config.output.screenshots_dir = shots.path().display().to_string();
        config.timeouts.element_ms = 1000;
        config.timeouts.file_chooser_ms = 200;
        Harness {
            temp_root,
            shots,
            config,
        }
    }

    fn temp_root_is_empty(h: &Harness) -> bool {
        std::fs::read_dir(h.temp_root.path()).unwrap().next().is_none()
    }

    fn job_form() -> FakeState {
        let mut skills = FakeElement::input("text", "skills");
        skills.label = "Skills".into();
        FakeState {
            elements: vec![skills, FakeElement::input("file", "resume")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_successful_run() {
        let h = harness();
        let resume_url = serve(
            "/resume.pdf",
            200,
            "application/pdf",
            minimal_pdf(&["SKILLS: Go, Rust, C++"]),
        )
        .await;
        let launcher = FakeLauncher::new(job_form());
        let provider = Arc::new(FakeProvider::replying(
            "```json\n{\"skills\": \"Go, Rust, C++\", \"resume\": \"resume.pdf\"}\n```",
        ));
        let pipeline = Pipeline::new(&h.config, provider.clone(), Arc::new(launcher.clone()));

        let result = pipeline.run(&resume_url, "https://jobs.example.com/apply").await;

        let PipelineResult::Success {
            form_fields,
            filled_form_data,
            screenshot_path,
        } = &result
        else {
            panic!("run failed: {:?}", result);
        };
        assert_eq!(form_fields.len(), 2);
        assert_eq!(
            filled_form_data.get("skills"),
            Some(&FieldValue::Text("Go, Rust, C++".into()))
        );
        assert_eq!(filled_form_data.get("resume"), Some(&FieldValue::FileAttachment));
        assert!(screenshot_path.contains("form-filled-"));
        assert!(screenshot_path.ends_with(".png"));
        assert_eq!(std::fs::read_dir(h.shots.path()).unwrap().count(), 1);

        let page = launcher.page();
        assert_eq!(page.element(0).value, "Go, Rust, C++");
        assert_eq!(page.element(1).files.len(), 1);
        assert_eq!(launcher.state().navigations, vec!["https://jobs.example.com/apply"]);
        assert!(launcher.state().closed);
        assert_eq!(launcher.launch_count(), 1);
        assert!(temp_root_is_empty(&h));

        let prompt = &provider.last_messages()[1].content;
        assert!(prompt.contains("C++"));

        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(wire["status"], "success");
        assert_eq!(wire["filledFormData"]["resume"], json!(FILE_SENTINEL));
        assert_eq!(wire["formFields"][1]["type"], "file");
    }

    #[tokio::test]
    async fn test_download_404_fails_without_browser() {
        let h = harness();
        let resume_url = serve("/resume.pdf", 404, "text/plain", Vec::new()).await;
        let launcher = FakeLauncher::new(job_form());
        let provider = Arc::new(FakeProvider::replying("{}"));
        let pipeline = Pipeline::new(&h.config, provider.clone(), Arc::new(launcher.clone()));

        let result = pipeline.run(&resume_url, "https://jobs.example.com/apply").await;

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"status": "failed", "error": "HTTP 404"})
        );
        assert_eq!(launcher.launch_count(), 0);
        assert_eq!(provider.calls(), 0);
        assert!(temp_root_is_empty(&h));
        assert_eq!(std::fs::read_dir(h.shots.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_navigation_failure_cleans_up() {
        let h = harness();
        let resume_url = serve("/r.pdf", 200, "application/pdf", minimal_pdf(&["Jane Doe"])).await;
        let mut state = job_form();
        state.fail_navigation = true;
        let launcher = FakeLauncher::new(state);
        let provider = Arc::new(FakeProvider::replying("{}"));
        let pipeline = Pipeline::new(&h.config, provider.clone(), Arc::new(launcher.clone()));

        let result = pipeline.run(&resume_url, "https://nowhere.invalid/apply").await;

        let PipelineResult::Failed { error } = &result else {
            panic!("expected failure");
        };
        assert!(error.starts_with("Navigation error:"), "{}", error);
        assert!(launcher.state().closed);
        assert_eq!(provider.calls(), 0);
        assert!(temp_root_is_empty(&h));
    }

    #[tokio::test]
    async fn test_malformed_ai_response_skips_filling() {
        let h = harness();
        let resume_url = serve("/r.pdf", 200, "application/pdf", minimal_pdf(&["Jane Doe"])).await;
        let launcher = FakeLauncher::new(job_form());
        let provider = Arc::new(FakeProvider::replying("I'd rather not."));
        let pipeline = Pipeline::new(&h.config, provider, Arc::new(launcher.clone()));

        let result = pipeline.run(&resume_url, "https://jobs.example.com/apply").await;

        let PipelineResult::Failed { error } = &result else {
            panic!("expected failure");
        };
        assert!(error.starts_with("AI processing error:"), "{}", error);
        let page = launcher.page();
        assert_eq!(page.element(0).value, "");
        assert!(page.element(1).files.is_empty());
        assert_eq!(launcher.state().screenshots, 0);
        assert!(launcher.state().closed);
        assert!(temp_root_is_empty(&h));
    }

    #[tokio::test]
    async fn test_unmatched_fields_do_not_fail_the_run() {
        let h = harness();
        let resume_url = serve("/r.pdf", 200, "application/pdf", minimal_pdf(&["Jane Doe"])).await;
        let launcher = FakeLauncher::new(FakeState {
            elements: vec![FakeElement::input("text", "only")],
            ..Default::default()
        });
        let provider = Arc::new(FakeProvider::replying(
            r#"{"only": "x", "ghost": "y", "phantom": "z"}"#,
        ));
        let pipeline = Pipeline::new(&h.config, provider, Arc::new(launcher.clone()));

        let result = pipeline.run(&resume_url, "https://jobs.example.com/apply").await;

        assert!(result.is_success());
        assert_eq!(launcher.page().element(0).value, "x");
    }

    #[test]
    fn test_display_path_relative_to_cwd() {
        assert_eq!(display_path(Path::new("screenshots/a.png")), "screenshots/a.png");
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(display_path(&cwd.join("shots").join("a.png")), "shots/a.png");
        assert_eq!(display_path(Path::new("/definitely/elsewhere.png")), "/definitely/elsewhere.png");
    }
}
