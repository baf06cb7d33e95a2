use crate::error::ConfigError;

/// A chunked passage before embedding, offsets in characters into the page text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassageDraft {
    pub page_number: usize,
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
}

/// Splitting policy for page text
///
/// Passages are at most `target_size` characters. Consecutive passages from
/// the same page share `overlap` trailing characters so context survives
/// chunk boundaries. Splits prefer paragraph and sentence boundaries within
/// a tolerance window below `target_size`, then whitespace, then a hard cut.
/// Deterministic: the same input and parameters always produce the same
/// passage sequence, which re-indexing relies on.
#[derive(Debug, Clone, Copy)]
pub struct ChunkPolicy {
    target_size: usize,
    overlap: usize,
}

impl ChunkPolicy {
    pub fn new(target_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        if target_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "chunking.target_size".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if overlap >= target_size {
            return Err(ConfigError::InvalidValue {
                key: "chunking.overlap".to_string(),
                reason: format!("must be less than target_size ({})", target_size),
            });
        }
        Ok(Self {
            target_size,
            overlap,
        })
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split one page's text into overlapping passages
    ///
    /// Produces zero passages for empty or whitespace-only input.
    pub fn chunk_page(&self, text: &str, page_number: usize) -> Vec<PassageDraft> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut drafts = Vec::new();
        let mut start = 0usize;

        while start < total {
            let hard_end = (start + self.target_size).min(total);
            let end = if hard_end == total {
                total
            } else {
                self.find_cut(&chars, start, hard_end)
            };

            let passage_text: String = chars[start..end].iter().collect();
            if !passage_text.trim().is_empty() {
                drafts.push(PassageDraft {
                    page_number,
                    text: passage_text,
                    char_start: start,
                    char_end: end,
                });
            }

            if end >= total {
                break;
            }

            // Step back by the overlap, but always make forward progress
            start = end.saturating_sub(self.overlap).max(start + 1);
        }

        drafts
    }

    /// Pick a cut point in (start, hard_end], preferring natural boundaries
    ///
    /// The tolerance window is the last 40% of the target span: a boundary
    /// earlier than that wastes too much of the passage budget, so we fall
    /// through to the next preference level instead.
    fn find_cut(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let min_cut = start + (self.target_size * 3) / 5;
        let min_cut = min_cut.min(hard_end.saturating_sub(1)).max(start + 1);

        // Paragraph boundary: blank line
        for i in (min_cut..hard_end).rev() {
            if chars[i] == '\n' && i > start && chars[i - 1] == '\n' {
                return i + 1;
            }
        }

        // Sentence boundary: terminator followed by whitespace
        for i in (min_cut..hard_end.saturating_sub(1)).rev() {
            if matches!(chars[i], '.' | '!' | '?') && chars[i + 1].is_whitespace() {
                return i + 1;
            }
        }

        // Any whitespace
        for i in (min_cut..hard_end).rev() {
            if chars[i].is_whitespace() {
                return i + 1;
            }
        }

        // Hard cut at the target size
        hard_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(target: usize, overlap: usize) -> ChunkPolicy {
        ChunkPolicy::new(target, overlap).unwrap()
    }

    #[test]
    fn test_rejects_overlap_not_less_than_target() {
        assert!(ChunkPolicy::new(100, 100).is_err());
        assert!(ChunkPolicy::new(100, 150).is_err());
        assert!(ChunkPolicy::new(0, 0).is_err());
        assert!(ChunkPolicy::new(100, 99).is_ok());
    }

    #[test]
    fn test_empty_input_yields_no_passages() {
        let p = policy(100, 20);
        assert!(p.chunk_page("", 1).is_empty());
        assert!(p.chunk_page("   \n\t  ", 1).is_empty());
    }

    #[test]
    fn test_short_page_is_one_passage() {
        let p = policy(100, 20);
        let drafts = p.chunk_page("The refund policy applies within 30 days.", 2);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].page_number, 2);
        assert_eq!(drafts[0].char_start, 0);
        assert_eq!(drafts[0].char_end, 41);
    }

    #[test]
    fn test_passages_respect_target_size() {
        let p = policy(80, 16);
        let text = "word ".repeat(100);
        let drafts = p.chunk_page(&text, 1);
        assert!(drafts.len() > 1);
        for draft in &drafts {
            assert!(draft.text.chars().count() <= 80);
        }
    }

    #[test]
    fn test_consecutive_passages_overlap() {
        let p = policy(80, 16);
        let text = "word ".repeat(100);
        let drafts = p.chunk_page(&text, 1);
        for pair in drafts.windows(2) {
            // Next passage starts exactly `overlap` characters before the
            // previous one ended (clamped by forward progress)
            assert!(pair[1].char_start < pair[0].char_end);
            assert_eq!(pair[0].char_end - pair[1].char_start, 16);
        }
    }

    #[test]
    fn test_prefers_sentence_boundary() {
        let p = policy(60, 10);
        // A sentence terminator sits inside the tolerance window
        let text = "This is the first sentence of the page. And this is the second one, which continues on.";
        let drafts = p.chunk_page(text, 1);
        assert!(drafts.len() >= 2);
        assert!(drafts[0].text.trim_end().ends_with('.'));
    }

    #[test]
    fn test_hard_cut_without_whitespace() {
        let p = policy(50, 10);
        let text = "x".repeat(120);
        let drafts = p.chunk_page(&text, 1);
        assert!(drafts.len() > 1);
        assert_eq!(drafts[0].text.len(), 50);
    }

    #[test]
    fn test_deterministic() {
        let p = policy(70, 14);
        let text = "Sentences here. More sentences there. ".repeat(20);
        let a = p.chunk_page(&text, 3);
        let b = p.chunk_page(&text, 3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_multibyte_text_is_boundary_safe() {
        let p = policy(40, 8);
        let text = "naïve café déjà-vu résumé ".repeat(15);
        let drafts = p.chunk_page(&text, 1);
        assert!(!drafts.is_empty());
        // Offsets are character offsets, so reslicing by chars must agree
        let chars: Vec<char> = text.chars().collect();
        for draft in &drafts {
            let expected: String = chars[draft.char_start..draft.char_end].iter().collect();
            assert_eq!(draft.text, expected);
        }
    }

    #[test]
    fn test_covers_entire_page() {
        let p = policy(90, 20);
        let text = "alpha beta gamma delta ".repeat(30);
        let drafts = p.chunk_page(&text, 1);
        assert_eq!(drafts.first().unwrap().char_start, 0);
        assert_eq!(
            drafts.last().unwrap().char_end,
            text.chars().count()
        );
    }
}
