//! Deterministic text splitting into retrieval-sized chunks.
//!
//! The splitter packs paragraphs up to a target size and falls back to
//! sentence and finally hard splits for oversized runs. A configurable
//! overlap carries trailing context from one chunk into the next so
//! answers spanning a boundary remain retrievable.

/// Text splitter with target size and overlap, both in characters.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            overlap: 150,
        }
    }
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            // Overlap must leave room for fresh content in every chunk.
            overlap: overlap.min(chunk_size / 2),
        }
    }

    /// Split `text` into a finite sequence of chunks.
    ///
    /// Whitespace-only input yields no chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut pieces: Vec<&str> = Vec::new();
        for paragraph in text.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            if paragraph.chars().count() <= self.chunk_size {
                pieces.push(paragraph);
            } else {
                split_sentences(paragraph, self.chunk_size, &mut pieces);
            }
        }

        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();
        for piece in pieces {
            let current_len = current.chars().count();
            let piece_len = piece.chars().count();
            if current_len > 0 && current_len + piece_len + 1 > self.chunk_size {
                let tail = overlap_tail(&current, self.overlap);
                chunks.push(std::mem::take(&mut current));
                current = tail;
                if !current.is_empty() {
                    current.push('\n');
                }
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(piece);
        }
        if !current.trim().is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

/// Split an oversized paragraph on sentence ends, hard-splitting any
/// sentence that alone exceeds the target size.
fn split_sentences<'a>(paragraph: &'a str, chunk_size: usize, out: &mut Vec<&'a str>) {
    let mut start = 0;
    let mut last_boundary = None;
    let mut count = 0usize;

    for (idx, ch) in paragraph.char_indices() {
        count += 1;
        if matches!(ch, '.' | '!' | '?' | '\n') {
            last_boundary = Some(idx + ch.len_utf8());
        }
        if count >= chunk_size {
            let end = last_boundary
                .filter(|&b| b > start)
                .unwrap_or(idx + ch.len_utf8());
            let piece = paragraph[start..end].trim();
            if !piece.is_empty() {
                out.push(piece);
            }
            start = end;
            last_boundary = None;
            // Chars consumed past the boundary stay counted toward the next piece.
            count = paragraph[start..idx + ch.len_utf8()].chars().count();
        }
    }
    let rest = paragraph[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
}

/// Trailing `overlap` characters of `chunk`, snapped to a word start.
fn overlap_tail(chunk: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let chars: Vec<char> = chunk.chars().collect();
    if chars.len() <= overlap {
        return chunk.to_string();
    }
    let tail: String = chars[chars.len() - overlap..].iter().collect();
    match tail.find(char::is_whitespace) {
        Some(pos) => tail[pos..].trim_start().to_string(),
        None => tail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let chunker = Chunker::default();
        assert!(chunker.split("").is_empty());
        assert!(chunker.split("   \n\n  \t ").is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunker = Chunker::default();
        let chunks = chunker.split("A short paragraph.");
        assert_eq!(chunks, vec!["A short paragraph.".to_string()]);
    }

    #[test]
    fn test_paragraphs_pack_up_to_target_size() {
        let chunker = Chunker::new(50, 0);
        let text = "First paragraph here.\n\nSecond one.\n\nThird paragraph is also here.";
        let chunks = chunker.split(text);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 60, "oversized chunk: {}", chunk);
        }
        // Nothing is lost.
        let joined = chunks.join("\n");
        assert!(joined.contains("First paragraph"));
        assert!(joined.contains("Second one."));
        assert!(joined.contains("Third paragraph"));
    }

    #[test]
    fn test_oversized_paragraph_splits_on_sentences() {
        let chunker = Chunker::new(40, 0);
        let text = "One sentence here. Another sentence follows. And a third one lands.";
        let chunks = chunker.split(text);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(!chunk.trim().is_empty());
        }
    }

    #[test]
    fn test_hard_split_without_boundaries() {
        let chunker = Chunker::new(20, 0);
        let text = "x".repeat(95);
        let chunks = chunker.split(&text);
        let total: usize = chunks.iter().map(|c| c.chars().count()).sum();
        assert_eq!(total, 95);
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
    }

    #[test]
    fn test_overlap_carries_tail_forward() {
        let chunker = Chunker::new(60, 20);
        let text = "alpha beta gamma delta.\n\nepsilon zeta eta theta iota kappa.";
        let chunks = chunker.split(text);
        if chunks.len() > 1 {
            // The second chunk starts with trailing words of the first.
            let first = &chunks[0];
            let carried = chunks[1].lines().next().unwrap_or("");
            assert!(first.ends_with(carried.trim()) || carried.is_empty());
        }
    }

    #[test]
    fn test_determinism() {
        let chunker = Chunker::default();
        let text = "Some repeated text. ".repeat(300);
        assert_eq!(chunker.split(&text), chunker.split(&text));
    }

    #[test]
    fn test_multibyte_input_does_not_panic() {
        let chunker = Chunker::new(10, 3);
        let text = "héllo wörld ünïcode tëxt — ellipsis… and more. ".repeat(20);
        let chunks = chunker.split(&text);
        assert!(!chunks.is_empty());
    }
}
