use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Résumé could not be fetched or exported. The message is surfaced
    /// verbatim in the failure record (`HTTP 404`, not `Download error: ...`).
    #[error("{0}")]
    Download(String),

    #[error("Invalid PDF: {0}")]
    PdfInvalid(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("AI processing error: {0}")]
    AiProcessing(String),

    #[error("Field fill error: {0}")]
    FieldFill(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Short machine-friendly tag used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Download(_) => "download",
            Self::PdfInvalid(_) => "pdf_invalid",
            Self::Extraction(_) => "extraction",
            Self::Navigation(_) => "navigation",
            Self::AiProcessing(_) => "ai_processing",
            Self::FieldFill(_) => "field_fill",
            Self::Browser(_) => "browser",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Provider(_) => "provider",
            Self::Timeout(_) => "timeout",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
