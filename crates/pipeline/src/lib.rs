pub mod acquire;
pub mod filler;
pub mod mapper;
pub mod orchestrator;
pub mod prompts;
pub mod resume_parser;
pub mod run;
pub mod scraper;
pub mod upload;

#[cfg(test)]
mod testing;

pub use acquire::ResumeAcquirer;
pub use filler::{FillOutcome, FillReport, FormFiller, ResolveStrategy};
pub use mapper::FieldMapper;
pub use orchestrator::Pipeline;
pub use resume_parser::{extract_text_from_pdf, parse_resume, parse_resume_text};
pub use run::{RunContext, Stage};
pub use scraper::scrape_form_fields;
pub use upload::FileUploadHandler;
