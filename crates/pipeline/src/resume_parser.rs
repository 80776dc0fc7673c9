//! Résumé text extraction and best-effort section parsing.

use formpilot_core::types::{EducationEntry, ExperienceEntry};
use formpilot_core::{Error, ResumeProfile, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info, warn};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

/// Ten-digit numbers with an optional country code and separators.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?\d{1,3}[-.\s]?)?(?:\(\d{3}\)|\d{3})[-.\s]?\d{3}[-.\s]?\d{4}").unwrap()
});

/// A line holding only two or more capitalised words.
static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*([A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+)+)[ \t]*$").unwrap());

/// Section headers sit at the start of a line and are followed by a colon
/// or the end of the line.
static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(technical skills|skills|professional experience|work experience|work history|experience|academic background|education|professional summary|summary|profile)[ \t]*(?::|$)",
    )
    .unwrap()
});

static SKILL_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,•·;|\n]").unwrap());

const BULLETS: &[char] = &['-', '*', '•', '·', '▪', '◦', '–'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Skills,
    Experience,
    Education,
    Summary,
}

impl Section {
    fn from_header(header: &str) -> Self {
        let h = header.to_lowercase();
        if h.contains("skills") {
            Self::Skills
        } else if h.contains("experience") || h.contains("history") {
            Self::Experience
        } else if h.contains("education") || h.contains("academic") {
            Self::Education
        } else {
            Self::Summary
        }
    }
}

/// Section bodies keyed by section. The first header of each kind wins.
fn split_sections(text: &str) -> Vec<(Section, &str)> {
    let headers: Vec<(Section, usize, usize)> = HEADER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?;
            Some((Section::from_header(name.as_str()), whole.start(), whole.end()))
        })
        .collect();

    let mut sections: Vec<(Section, &str)> = Vec::new();
    for (i, (section, _, body_start)) in headers.iter().enumerate() {
        let body_end = headers.get(i + 1).map(|h| h.1).unwrap_or(text.len());
        if sections.iter().any(|(s, _)| s == section) {
            continue;
        }
        sections.push((*section, &text[*body_start..body_end]));
    }
    sections
}

fn section<'a>(sections: &[(Section, &'a str)], which: Section) -> Option<&'a str> {
    sections.iter().find(|(s, _)| *s == which).map(|(_, body)| *body)
}

fn strip_bullet(s: &str) -> &str {
    s.trim().trim_start_matches(BULLETS).trim()
}

fn parse_skills(body: &str) -> Vec<String> {
    SKILL_SPLIT_RE
        .split(body)
        .map(strip_bullet)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split one entry line into trimmed parts on `,`, `•` and `|`.
fn entry_parts(line: &str) -> Vec<&str> {
    strip_bullet(line)
        .split([',', '•', '|'])
        .map(str::trim)
        .collect()
}

fn parse_experience(body: &str) -> Vec<ExperienceEntry> {
    body.lines()
        .filter_map(|line| {
            let parts = entry_parts(line);
            let title = parts.first().copied().unwrap_or_default();
            let company = parts.get(1).copied().unwrap_or_default();
            if title.is_empty() || company.is_empty() {
                return None;
            }
            Some(ExperienceEntry {
                title: title.to_string(),
                company: company.to_string(),
                duration: parts.get(2).filter(|d| !d.is_empty()).map(|d| d.to_string()),
            })
        })
        .collect()
}

fn parse_education(body: &str) -> Vec<EducationEntry> {
    body.lines()
        .filter_map(|line| {
            let parts = entry_parts(line);
            let degree = parts.first().copied().unwrap_or_default();
            let institution = parts.get(1).copied().unwrap_or_default();
            if degree.is_empty() || institution.is_empty() {
                return None;
            }
            Some(EducationEntry {
                degree: degree.to_string(),
                institution: institution.to_string(),
                year: parts.get(2).filter(|y| !y.is_empty()).map(|y| y.to_string()),
            })
        })
        .collect()
}

/// First name-shaped line that is not itself a section header.
fn find_name(text: &str) -> Option<String> {
    NAME_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .find(|candidate| !HEADER_RE.is_match(candidate))
        .map(str::to_string)
}

/// Derive a profile from plain résumé text. Never fails; anything that is
/// not found is left empty.
pub fn parse_resume_text(text: &str) -> ResumeProfile {
    let sections = split_sections(text);
    let summary = section(&sections, Section::Summary)
        .map(|body| body.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty());

    ResumeProfile {
        name: find_name(text),
        email: EMAIL_RE.find(text).map(|m| m.as_str().to_string()),
        phone: PHONE_RE.find(text).map(|m| m.as_str().trim().to_string()),
        skills: section(&sections, Section::Skills)
            .map(parse_skills)
            .unwrap_or_default(),
        experience: section(&sections, Section::Experience)
            .map(parse_experience)
            .unwrap_or_default(),
        education: section(&sections, Section::Education)
            .map(parse_education)
            .unwrap_or_default(),
        summary,
    }
}

pub fn has_pdf_signature(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

/// Extract text from a PDF on the blocking pool. A PDF without any
/// non-whitespace text is an extraction error.
pub async fn extract_text_from_pdf(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    if !has_pdf_signature(&bytes) {
        return Err(Error::PdfInvalid(format!(
            "{} does not start with %PDF",
            path.display()
        )));
    }
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| Error::Extraction(format!("extractor aborted: {}", e)))?
        .map_err(|e| Error::Extraction(e.to_string()))?;
    if text.trim().is_empty() {
        return Err(Error::Extraction(format!(
            "{} contains no text",
            path.display()
        )));
    }
    Ok(text)
}

async fn read_plain_text(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    String::from_utf8(bytes)
        .map_err(|e| Error::Extraction(format!("file is neither PDF nor UTF-8 text: {}", e)))
}

/// Read the résumé at `path` as PDF, falling back to UTF-8 text.
pub async fn parse_resume(path: &Path) -> Result<ResumeProfile> {
    let text = match extract_text_from_pdf(path).await {
        Ok(text) => text,
        Err(pdf_err) => {
            warn!(error = %pdf_err, "PDF text extraction failed, reading as plain text");
            read_plain_text(path).await.map_err(|e| match e {
                Error::Extraction(msg) => Error::Extraction(format!("{} ({})", msg, pdf_err)),
                other => Error::Extraction(other.to_string()),
            })?
        }
    };
    debug!(chars = text.len(), "Extracted résumé text");

    let profile = parse_resume_text(&text);
    info!(
        has_name = profile.name.is_some(),
        has_email = profile.email.is_some(),
        skills = profile.skills.len(),
        experience = profile.experience.len(),
        education = profile.education.len(),
        "Parsed résumé"
    );
    Ok(profile)
}
