//! Deterministic sentence-aware text chunking

use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;

/// Text chunker with configurable size and overlap
///
/// Sizes are measured in characters, not bytes, so Chinese text chunks the
/// same as ASCII.
#[derive(Clone)]
pub struct TextChunker {
    /// Target chunk size in characters
    chunk_size: usize,
    /// Overlap carried from the previous chunk tail
    overlap: usize,
    /// Minimum chunk size (smaller fragments are merged into the final chunk)
    min_size: usize,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            min_size: 20,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            overlap: config.chunk_overlap,
            min_size: config.min_chunk_size,
        }
    }

    /// Split text into chunks
    ///
    /// Sentence boundaries are preferred; a sentence longer than the ceiling
    /// is split hard at the character limit. Text at or under the ceiling
    /// yields exactly one chunk. Empty input yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        if char_len(text) <= self.chunk_size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;

        for sentence in text.split_sentence_bounds() {
            let sentence_len = char_len(sentence);

            if sentence_len > self.chunk_size {
                // Pathological sentence: flush and split it hard
                if current_len >= self.min_size {
                    chunks.push(current.trim().to_string());
                }
                current = String::new();
                current_len = 0;
                for piece in split_hard(sentence, self.chunk_size) {
                    chunks.push(piece);
                }
                continue;
            }

            if current_len > 0 && current_len + sentence_len > self.chunk_size {
                if current_len >= self.min_size {
                    chunks.push(current.trim().to_string());
                    let overlap_text = self.overlap_tail(&current);
                    current_len = char_len(&overlap_text);
                    current = overlap_text;
                } else {
                    // Too small to stand alone, keep accumulating
                }
            }

            current.push_str(sentence);
            current_len += sentence_len;
        }

        let trimmed = current.trim();
        if !trimmed.is_empty() {
            if char_len(trimmed) >= self.min_size || chunks.is_empty() {
                chunks.push(trimmed.to_string());
            } else if let Some(last) = chunks.last_mut() {
                // Fold the runt into the previous chunk
                last.push_str(trimmed);
            }
        }

        chunks.retain(|c| !c.is_empty());
        chunks
    }

    /// Overlap text taken from the end of a chunk, at a break point if one
    /// exists in the window
    fn overlap_tail(&self, text: &str) -> String {
        let total = char_len(text);
        if total <= self.overlap {
            return text.to_string();
        }

        let start_char = total - self.overlap;
        let start = byte_index_of_char(text, start_char);
        let tail = &text[start..];

        // Prefer starting the overlap after a sentence or clause break
        for sep in ["。", ". ", "！", "？", "；", "，", " "] {
            if let Some(pos) = tail.find(sep) {
                let after = pos + sep.len();
                if after < tail.len() {
                    return tail[after..].to_string();
                }
            }
        }

        tail.to_string()
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(300, 50)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte index of the nth character
fn byte_index_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// Split an over-long sentence at hard character limits
fn split_hard(sentence: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = sentence.chars().collect();
    chars
        .chunks(limit)
        .map(|c| c.iter().collect::<String>().trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let chunker = TextChunker::new(300, 50);
        let text = "个人信用贷款产品说明。最高额度50万元。";
        let chunks = chunker.chunk(text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn text_at_exact_ceiling_is_one_chunk() {
        let chunker = TextChunker::new(300, 50);
        let text = "贷".repeat(300);
        assert_eq!(chunker.chunk(&text).len(), 1);
    }

    #[test]
    fn empty_text_yields_nothing() {
        let chunker = TextChunker::new(300, 50);
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n ").is_empty());
    }

    #[test]
    fn long_text_splits_with_coverage() {
        let chunker = TextChunker::new(100, 20);
        let text = (0..30)
            .map(|i| format!("这是第{}条贷款产品的详细说明信息。", i))
            .collect::<String>();
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            // overlap can push a chunk slightly past the ceiling
            assert!(chunk.chars().count() <= 100 + 20);
        }
        assert!(chunks.last().unwrap().contains("第29条"));
    }

    #[test]
    fn chunking_is_deterministic() {
        let chunker = TextChunker::new(120, 30);
        let text = "商业贷款利率由央行基准利率决定。个人住房贷款首付比例不低于百分之二十。\
                    经营性贷款需提供营业执照与银行流水。信用卡分期手续费按月收取。"
            .repeat(4);
        assert_eq!(chunker.chunk(&text), chunker.chunk(&text));
    }

    #[test]
    fn oversized_sentence_is_split() {
        let chunker = TextChunker::new(50, 10);
        let text = "字".repeat(180);
        let chunks = chunker.chunk(&text);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
    }
}
