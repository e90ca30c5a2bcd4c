//! Knowledge chunk and extraction types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Supported document types for ingestion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// PDF document
    Pdf,
    /// Microsoft Word document (.docx)
    Docx,
    /// Microsoft PowerPoint presentation (.pptx)
    Pptx,
    /// Plain text file
    Txt,
    /// Markdown file
    Markdown,
    /// Excel spreadsheet (.xlsx / .xls)
    Xlsx,
    /// HTML document
    Html,
    /// CSV file
    Csv,
    /// Raster image (requires tesseract OCR)
    Image,
    /// Unknown file type
    Unknown,
}

impl DocumentType {
    /// Detect document type from a filename extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "pptx" => Self::Pptx,
            "txt" | "text" => Self::Txt,
            "md" | "markdown" => Self::Markdown,
            "xlsx" | "xls" => Self::Xlsx,
            "html" | "htm" => Self::Html,
            "csv" => Self::Csv,
            "png" | "jpg" | "jpeg" | "bmp" | "tiff" | "tif" | "webp" => Self::Image,
            _ => Self::Unknown,
        }
    }

    /// Detect document type from a full filename
    pub fn from_filename(filename: &str) -> Self {
        filename
            .rsplit('.')
            .next()
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Get display name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "Word Document (.docx)",
            Self::Pptx => "PowerPoint (.pptx)",
            Self::Txt => "Text File",
            Self::Markdown => "Markdown",
            Self::Xlsx => "Excel Spreadsheet",
            Self::Html => "HTML",
            Self::Csv => "CSV",
            Self::Image => "Image",
            Self::Unknown => "Unknown",
        }
    }
}

/// Coarse document classification by content keywords
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocClass {
    BusinessLicense,
    FinancialStatement,
    BankStatement,
    TaxStatement,
    Other,
}

impl DocClass {
    /// Classify extracted text by keyword presence
    pub fn classify(text: &str) -> Self {
        let checks: &[(DocClass, &[&str])] = &[
            (
                Self::BusinessLicense,
                &["营业执照", "统一社会信用代码", "business license"],
            ),
            (
                Self::FinancialStatement,
                &["资产负债表", "利润表", "现金流量表", "balance sheet", "income statement"],
            ),
            (
                Self::BankStatement,
                &["银行流水", "账户明细", "交易流水", "bank statement"],
            ),
            (
                Self::TaxStatement,
                &["纳税申报", "完税证明", "税务", "tax return"],
            ),
        ];
        for (class, keywords) in checks {
            if keywords.iter().any(|k| text.contains(k)) {
                return *class;
            }
        }
        Self::Other
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BusinessLicense => "business_license",
            Self::FinancialStatement => "financial_statement",
            Self::BankStatement => "bank_statement",
            Self::TaxStatement => "tax_statement",
            Self::Other => "other",
        }
    }
}

/// Result of extracting text from an uploaded file
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// Plain text content
    pub content: String,
    /// Detected document type
    pub document_type: DocumentType,
    /// Content-based classification
    pub doc_class: DocClass,
    /// Extraction wall time in milliseconds
    pub extraction_ms: u64,
}

/// A unit of retrievable knowledge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    /// Unique chunk ID
    pub id: Uuid,
    /// Short title (filename, entity name, or heading)
    pub title: String,
    /// Text content
    pub content: String,
    /// Category (e.g. "loan_products", "bank_info", "policy")
    pub category: String,
    /// Free-form tags for lexical boosting
    #[serde(default)]
    pub tags: Vec<String>,
    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Embedding vector, absent when the backend was unavailable at write time
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub embedding: Option<Vec<f32>>,
    /// Content hash for deduplication
    pub content_hash: String,
    /// Creation timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Last content or embedding mutation
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl KnowledgeChunk {
    /// Create a new chunk; the content hash is derived from the content
    pub fn new(title: impl Into<String>, content: impl Into<String>, category: impl Into<String>) -> Self {
        let content = content.into();
        let content_hash = hash_content(&content);
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            content,
            category: category.into(),
            tags: Vec::new(),
            metadata: HashMap::new(),
            embedding: None,
            content_hash,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// SHA-256 hex digest of content for deduplication
pub fn hash_content(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_type_from_filename() {
        assert_eq!(DocumentType::from_filename("report.PDF"), DocumentType::Pdf);
        assert_eq!(DocumentType::from_filename("scan.jpeg"), DocumentType::Image);
        assert_eq!(DocumentType::from_filename("notes"), DocumentType::Unknown);
    }

    #[test]
    fn classifies_bank_statement() {
        let text = "招商银行 账户明细 2024年1月";
        assert_eq!(DocClass::classify(text), DocClass::BankStatement);
    }

    #[test]
    fn same_content_same_hash() {
        let a = KnowledgeChunk::new("a", "个人信用贷款额度最高50万元", "loan_products");
        let b = KnowledgeChunk::new("b", "个人信用贷款额度最高50万元", "loan_products");
        assert_eq!(a.content_hash, b.content_hash);
        assert_ne!(a.id, b.id);
    }
}
