//! Multi-format document extraction

use calamine::Reader;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::types::{DocClass, DocumentType, ExtractedDocument};

use super::ocr::OcrEngine;

/// Multi-format document extractor
///
/// Dispatches on the filename extension. Raster images and PDF-embedded
/// images go through the OCR engine when one is attached.
pub struct DocumentExtractor {
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl DocumentExtractor {
    pub fn new() -> Self {
        Self { ocr: None }
    }

    pub fn with_ocr(ocr: Arc<dyn OcrEngine>) -> Self {
        Self { ocr: Some(ocr) }
    }

    /// Extract plain text from an uploaded file
    pub async fn extract(&self, filename: &str, data: &[u8]) -> Result<ExtractedDocument> {
        let started = Instant::now();
        let document_type = DocumentType::from_filename(filename);

        if !document_type.is_supported() {
            let extension = filename.rsplit('.').next().unwrap_or("");
            return Err(Error::UnsupportedFileType(extension.to_string()));
        }

        let content = match document_type {
            DocumentType::Pdf => self.extract_pdf(filename, data).await?,
            DocumentType::Docx => Self::extract_docx(filename, data)?,
            DocumentType::Pptx => Self::extract_pptx(filename, data)?,
            DocumentType::Txt | DocumentType::Markdown => Self::extract_text(data),
            DocumentType::Html => Self::extract_html(data),
            DocumentType::Csv => Self::extract_csv(data),
            DocumentType::Xlsx => Self::extract_xlsx(filename, data)?,
            DocumentType::Image => self.extract_image(filename, data).await?,
            DocumentType::Unknown => unreachable!("unsupported types rejected above"),
        };

        let content = normalize_whitespace(&content);
        if content.is_empty() {
            return Err(Error::extraction(
                filename,
                "no readable text could be extracted",
            ));
        }

        let doc_class = DocClass::classify(&content);

        Ok(ExtractedDocument {
            content,
            document_type,
            doc_class,
            extraction_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// PDF text plus OCR over embedded raster images
    async fn extract_pdf(&self, filename: &str, data: &[u8]) -> Result<String> {
        let mut content = Self::extract_pdf_text(filename, data)?;

        if let Some(ocr) = &self.ocr {
            match Self::embedded_pdf_images(data) {
                Ok(images) if !images.is_empty() => {
                    tracing::debug!(count = images.len(), "running OCR over embedded PDF images");
                    for image in images {
                        match ocr.recognize(&image).await {
                            Ok(text) if !text.is_empty() => {
                                content.push('\n');
                                content.push_str(&text);
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::warn!("embedded image OCR failed: {}", e);
                            }
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("could not enumerate PDF images: {}", e);
                }
            }
        }

        Ok(content)
    }

    /// Extract PDF text with a timeout thread; pdf-extract can hang on
    /// pathological fonts
    fn extract_pdf_text(filename: &str, data: &[u8]) -> Result<String> {
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let data_vec = data.to_vec();
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let result = pdf_extract::extract_text_from_mem(&data_vec);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(Duration::from_secs(60)) {
            Ok(Ok(text)) => {
                let _ = handle.join();
                Ok(text)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                tracing::warn!("pdf-extract failed: {}, trying lopdf fallback", e);
                Self::extract_pdf_fallback(filename, data)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!("PDF extraction timed out after 60s, trying lopdf fallback");
                Self::extract_pdf_fallback(filename, data)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::warn!("PDF extraction thread crashed, trying lopdf fallback");
                Self::extract_pdf_fallback(filename, data)
            }
        }
    }

    /// Fallback extraction: walk content streams with lopdf and pull text
    /// between BT/ET operators
    fn extract_pdf_fallback(filename: &str, data: &[u8]) -> Result<String> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::extraction(filename, format!("failed to load PDF: {}", e)))?;

        let mut all_text = String::new();
        for (page_num, page_id) in doc.get_pages() {
            match doc.get_page_content(page_id) {
                Ok(content) => {
                    let text = Self::text_from_content_stream(&content);
                    if !text.is_empty() {
                        all_text.push_str(&text);
                        all_text.push('\n');
                    }
                }
                Err(e) => {
                    tracing::debug!("no content for page {}: {}", page_num, e);
                }
            }
        }

        if all_text.trim().is_empty() {
            return Err(Error::extraction(
                filename,
                "PDF has no extractable text, likely image-based or encrypted",
            ));
        }
        Ok(all_text)
    }

    /// Pull literal strings shown by Tj/TJ operators out of a content stream
    fn text_from_content_stream(content: &[u8]) -> String {
        let content_str = String::from_utf8_lossy(content);
        let mut text = String::new();
        let mut in_text_block = false;

        for line in content_str.lines() {
            let line = line.trim();
            match line {
                "BT" => in_text_block = true,
                "ET" => {
                    in_text_block = false;
                    text.push(' ');
                }
                _ if in_text_block && (line.ends_with("Tj") || line.ends_with("TJ")) => {
                    if let (Some(start), Some(end)) = (line.find('('), line.rfind(')')) {
                        if start < end {
                            let decoded = line[start + 1..end]
                                .replace("\\n", "\n")
                                .replace("\\(", "(")
                                .replace("\\)", ")")
                                .replace("\\\\", "\\");
                            text.push_str(&decoded);
                        }
                    }
                }
                _ => {}
            }
        }

        text
    }

    /// Collect embedded JPEG image streams (DCTDecode XObjects); other
    /// image encodings are skipped
    fn embedded_pdf_images(data: &[u8]) -> Result<Vec<Vec<u8>>> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::extraction("document.pdf", e.to_string()))?;

        let mut images = Vec::new();
        for (_, object) in doc.objects.iter() {
            let Ok(stream) = object.as_stream() else {
                continue;
            };
            let is_image = stream
                .dict
                .get(b"Subtype")
                .and_then(|s| s.as_name())
                .map(|n| n == b"Image")
                .unwrap_or(false);
            if !is_image {
                continue;
            }
            // DCTDecode streams are plain JPEG bytes the OCR engine can read
            let is_jpeg = stream
                .dict
                .get(b"Filter")
                .and_then(|f| f.as_name())
                .map(|n| n == b"DCTDecode")
                .unwrap_or(false);
            if is_jpeg {
                images.push(stream.content.clone());
            }
        }
        Ok(images)
    }

    /// Pure image upload: OCR is mandatory
    async fn extract_image(&self, filename: &str, data: &[u8]) -> Result<String> {
        let Some(ocr) = &self.ocr else {
            return Err(Error::extraction(
                filename,
                "image ingestion requires an OCR engine (install tesseract)",
            ));
        };
        ocr.recognize(data).await
    }

    fn extract_docx(filename: &str, data: &[u8]) -> Result<String> {
        let doc = docx_rs::read_docx(data)
            .map_err(|e| Error::extraction(filename, e.to_string()))?;

        let mut content = String::new();
        for child in doc.document.children {
            if let docx_rs::DocumentChild::Paragraph(p) = child {
                for child in p.children {
                    if let docx_rs::ParagraphChild::Run(run) = child {
                        for child in run.children {
                            if let docx_rs::RunChild::Text(t) = child {
                                content.push_str(&t.text);
                            }
                        }
                    }
                }
                content.push('\n');
            }
        }
        Ok(content)
    }

    fn extract_pptx(filename: &str, data: &[u8]) -> Result<String> {
        use std::io::Read;

        let cursor = std::io::Cursor::new(data);
        let mut archive = zip::ZipArchive::new(cursor)
            .map_err(|e| Error::extraction(filename, e.to_string()))?;

        let mut slide_names: Vec<String> = archive
            .file_names()
            .filter(|name| name.starts_with("ppt/slides/slide") && name.ends_with(".xml"))
            .map(|s| s.to_string())
            .collect();
        slide_names.sort_by_key(|name| {
            name.trim_start_matches("ppt/slides/slide")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(0)
        });

        let mut content = String::new();
        for slide_name in slide_names {
            if let Ok(mut file) = archive.by_name(&slide_name) {
                let mut xml = String::new();
                if file.read_to_string(&mut xml).is_ok() {
                    let slide_text = Self::pptx_slide_text(&xml);
                    if !slide_text.is_empty() {
                        content.push_str(&slide_text);
                        content.push('\n');
                    }
                }
            }
        }
        Ok(content)
    }

    /// Extract `<a:t>` text runs from a slide XML
    fn pptx_slide_text(xml: &str) -> String {
        use quick_xml::events::Event;
        use quick_xml::Reader;

        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut parts = Vec::new();
        let mut in_text = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
                Ok(Event::Text(e)) if in_text => {
                    if let Ok(text) = e.unescape() {
                        let trimmed = text.trim().to_string();
                        if !trimmed.is_empty() {
                            parts.push(trimmed);
                        }
                    }
                }
                Ok(Event::End(e)) if e.local_name().as_ref() == b"t" => in_text = false,
                Ok(Event::Eof) => break,
                Err(_) => break,
                _ => {}
            }
        }

        parts.join(" ")
    }

    fn extract_text(data: &[u8]) -> String {
        String::from_utf8_lossy(data).to_string()
    }

    fn extract_html(data: &[u8]) -> String {
        let html = String::from_utf8_lossy(data);
        let document = scraper::Html::parse_document(&html);

        let body_selector = scraper::Selector::parse("body").unwrap();
        let mut content = String::new();
        if let Some(body) = document.select(&body_selector).next() {
            for text in body.text() {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    if !content.is_empty() {
                        content.push(' ');
                    }
                    content.push_str(trimmed);
                }
            }
        }
        content
    }

    fn extract_csv(data: &[u8]) -> String {
        let mut reader = csv::Reader::from_reader(data);
        let mut content = String::new();

        if let Ok(headers) = reader.headers() {
            content.push_str(&headers.iter().collect::<Vec<_>>().join(" | "));
            content.push('\n');
        }
        for record in reader.records().flatten() {
            content.push_str(&record.iter().collect::<Vec<_>>().join(" | "));
            content.push('\n');
        }
        content
    }

    fn extract_xlsx(filename: &str, data: &[u8]) -> Result<String> {
        let cursor = std::io::Cursor::new(data.to_vec());
        let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
            .map_err(|e| Error::extraction(filename, e.to_string()))?;

        let mut content = String::new();
        for sheet_name in workbook.sheet_names().to_vec() {
            if let Ok(range) = workbook.worksheet_range(&sheet_name) {
                content.push_str(&format!("Sheet: {}\n", sheet_name));
                for row in range.rows() {
                    let row_text: Vec<String> = row
                        .iter()
                        .map(|cell| match cell {
                            calamine::Data::Empty => String::new(),
                            calamine::Data::String(s) => s.clone(),
                            calamine::Data::Float(f) => f.to_string(),
                            calamine::Data::Int(i) => i.to_string(),
                            calamine::Data::Bool(b) => b.to_string(),
                            calamine::Data::DateTime(dt) => dt.to_string(),
                            _ => String::new(),
                        })
                        .collect();
                    if !row_text.iter().all(|s| s.is_empty()) {
                        content.push_str(&row_text.join(" | "));
                        content.push('\n');
                    }
                }
            }
        }
        Ok(content)
    }
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapse blank lines and trim line edges
fn normalize_whitespace(text: &str) -> String {
    text.replace('\0', "")
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracts_plain_text() {
        let extractor = DocumentExtractor::new();
        let doc = extractor
            .extract("notes.txt", "个人经营贷款年利率4.35%。\n\n抵押率不超过70%。".as_bytes())
            .await
            .unwrap();
        assert_eq!(doc.document_type, DocumentType::Txt);
        assert!(doc.content.contains("4.35%"));
        assert!(!doc.content.contains("\n\n"));
    }

    #[tokio::test]
    async fn rejects_unknown_extension() {
        let extractor = DocumentExtractor::new();
        let err = extractor.extract("binary.exe", b"MZ").await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedFileType(_)));
    }

    #[tokio::test]
    async fn rejects_empty_content() {
        let extractor = DocumentExtractor::new();
        let err = extractor.extract("empty.txt", b"  \n ").await.unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[tokio::test]
    async fn extracts_csv_rows() {
        let extractor = DocumentExtractor::new();
        let csv = "产品,利率\n信用贷,4.35%\n抵押贷,3.85%\n";
        let doc = extractor.extract("rates.csv", csv.as_bytes()).await.unwrap();
        assert!(doc.content.contains("信用贷 | 4.35%"));
    }

    #[tokio::test]
    async fn extracts_html_body() {
        let extractor = DocumentExtractor::new();
        let html = "<html><head><title>x</title></head><body><p>贷款须知</p><p>还款方式</p></body></html>";
        let doc = extractor.extract("page.html", html.as_bytes()).await.unwrap();
        assert!(doc.content.contains("贷款须知"));
        assert!(doc.content.contains("还款方式"));
    }

    #[tokio::test]
    async fn images_without_ocr_fail_cleanly() {
        let extractor = DocumentExtractor::new();
        let err = extractor.extract("scan.png", &[0u8; 8]).await.unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[test]
    fn classifies_extracted_business_license() {
        assert_eq!(
            DocClass::classify("营业执照 统一社会信用代码 91310000"),
            DocClass::BusinessLicense
        );
    }
}
