//! Document ingestion: multi-format extraction, OCR, and chunking

mod chunker;
mod extractor;
pub mod ocr;

pub use chunker::TextChunker;
pub use extractor::DocumentExtractor;
pub use ocr::{OcrEngine, TesseractOcr};
