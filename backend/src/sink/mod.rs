//! Output sinks for render instructions.
//!
//! The engine never knows which document format was requested: it pushes
//! [`RenderInstruction`]s into a [`ReportSink`]. The format is resolved once,
//! from the `report_format` request parameter, into a [`DocumentKind`] that
//! travels with the buffered [`ReportDocument`] to whatever renders it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ReportError;
use crate::models::RenderInstruction;
use crate::params::RequestParams;

/// Receives render instructions in emission order.
pub trait ReportSink {
    /// Append one instruction.
    fn add(&mut self, instruction: RenderInstruction);

    /// Start a new page before the next group of `level` (1-based).
    fn add_page(&mut self, level: usize) {
        self.add(RenderInstruction::PageBreak { level });
    }
}

impl ReportSink for Vec<RenderInstruction> {
    fn add(&mut self, instruction: RenderInstruction) {
        self.push(instruction);
    }
}

// =============================================================================
// Formats
// =============================================================================

/// Requested output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportFormat {
    #[default]
    Pdf,
    Html,
    HtmlNoHeaders,
    Xls,
    Doc,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Html => "html",
            ReportFormat::HtmlNoHeaders => "html-no-headers",
            ReportFormat::Xls => "xls",
            ReportFormat::Doc => "doc",
        }
    }

    /// Human readable name, as offered on the options form.
    pub fn label(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "Portable Document Format (PDF)",
            ReportFormat::Html => "Hypertext Markup Language (HTML)",
            ReportFormat::HtmlNoHeaders => "HTML without document headers",
            ReportFormat::Xls => "Microsoft Excel (XLS)",
            ReportFormat::Doc => "Microsoft Word (DOC)",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Ok(ReportFormat::Pdf),
            "html" => Ok(ReportFormat::Html),
            "html-no-headers" => Ok(ReportFormat::HtmlNoHeaders),
            "xls" => Ok(ReportFormat::Xls),
            "doc" => Ok(ReportFormat::Doc),
            _ => Err(ReportError::invalid_param("report_format", s)),
        }
    }
}

/// Page orientation of paged formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    #[serde(rename = "L")]
    Landscape,
    #[serde(rename = "P")]
    Portrait,
}

impl FromStr for Orientation {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "L" => Ok(Orientation::Landscape),
            "P" => Ok(Orientation::Portrait),
            _ => Err(ReportError::invalid_param("page_orientation", s)),
        }
    }
}

/// Paper size of paged formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaperSize {
    #[default]
    A4,
    A3,
}

impl FromStr for PaperSize {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A4" => Ok(PaperSize::A4),
            "A3" => Ok(PaperSize::A3),
            _ => Err(ReportError::invalid_param("paper_size", s)),
        }
    }
}

/// Page layout of a PDF report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageSetup {
    pub orientation: Orientation,
    pub paper_size: PaperSize,
}

/// The concrete document a report is rendered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf { page: PageSetup },
    Html { headers: bool },
    Xls,
    Doc,
}

impl DocumentKind {
    /// Resolve the document kind from the request parameters.
    pub fn from_params(params: &RequestParams) -> Result<Self, ReportError> {
        let format: ReportFormat = match params.get("report_format") {
            Some(value) if !value.trim().is_empty() => value.parse()?,
            _ => ReportFormat::default(),
        };

        Ok(match format {
            ReportFormat::Pdf => DocumentKind::Pdf {
                page: PageSetup {
                    orientation: params.parse_or_default("page_orientation")?,
                    paper_size: params.parse_or_default("paper_size")?,
                },
            },
            ReportFormat::Html => DocumentKind::Html { headers: true },
            ReportFormat::HtmlNoHeaders => DocumentKind::Html { headers: false },
            ReportFormat::Xls => DocumentKind::Xls,
            ReportFormat::Doc => DocumentKind::Doc,
        })
    }

    pub fn format(&self) -> ReportFormat {
        match self {
            DocumentKind::Pdf { .. } => ReportFormat::Pdf,
            DocumentKind::Html { headers: true } => ReportFormat::Html,
            DocumentKind::Html { headers: false } => ReportFormat::HtmlNoHeaders,
            DocumentKind::Xls => ReportFormat::Xls,
            DocumentKind::Doc => ReportFormat::Doc,
        }
    }
}

// =============================================================================
// Document Sink
// =============================================================================

/// Buffers the render instructions of one report for its renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub title: String,
    pub kind: DocumentKind,
    pub instructions: Vec<RenderInstruction>,
}

impl ReportDocument {
    pub fn new(title: impl Into<String>, kind: DocumentKind) -> Self {
        Self {
            title: title.into(),
            kind,
            instructions: Vec::new(),
        }
    }

    /// Create the document selected by the request parameters.
    pub fn from_params(title: impl Into<String>, params: &RequestParams) -> Result<Self, ReportError> {
        Ok(Self::new(title, DocumentKind::from_params(params)?))
    }

    /// Number of pages the instructions span.
    pub fn page_count(&self) -> usize {
        1 + self
            .instructions
            .iter()
            .filter(|i| matches!(i, RenderInstruction::PageBreak { .. }))
            .count()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl ReportSink for ReportDocument {
    fn add(&mut self, instruction: RenderInstruction) {
        self.instructions.push(instruction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> RequestParams {
        RequestParams::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    #[test]
    fn test_default_format_is_landscape_a4_pdf() {
        let kind = DocumentKind::from_params(&RequestParams::default()).unwrap();
        assert_eq!(
            kind,
            DocumentKind::Pdf {
                page: PageSetup {
                    orientation: Orientation::Landscape,
                    paper_size: PaperSize::A4,
                }
            }
        );
    }

    #[test]
    fn test_pdf_page_setup_from_params() {
        let kind = DocumentKind::from_params(&params(&[
            ("report_format", "pdf"),
            ("page_orientation", "P"),
            ("paper_size", "A3"),
        ]))
        .unwrap();
        let DocumentKind::Pdf { page } = kind else {
            panic!("expected a PDF document, got {kind:?}");
        };
        assert_eq!(page.orientation, Orientation::Portrait);
        assert_eq!(page.paper_size, PaperSize::A3);
    }

    #[test]
    fn test_html_variants() {
        let with = DocumentKind::from_params(&params(&[("report_format", "html")])).unwrap();
        let without =
            DocumentKind::from_params(&params(&[("report_format", "html-no-headers")])).unwrap();
        assert_eq!(with, DocumentKind::Html { headers: true });
        assert_eq!(without, DocumentKind::Html { headers: false });
        assert_eq!(without.format(), ReportFormat::HtmlNoHeaders);
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let err = DocumentKind::from_params(&params(&[("report_format", "rtf")])).unwrap_err();
        assert!(matches!(err, ReportError::InvalidParam { ref name, .. } if name == "report_format"));
    }

    #[test]
    fn test_document_counts_pages() {
        let mut doc = ReportDocument::new("Sales", DocumentKind::Xls);
        doc.add(RenderInstruction::heading("North", 0));
        doc.add_page(1);
        doc.add(RenderInstruction::heading("South", 0));
        assert_eq!(doc.instructions.len(), 3);
        assert_eq!(doc.page_count(), 2);
    }
}
