//! Bounded-memory streaming chunker.
//!
//! Splits an unbounded stream of text lines into overlapping chunks without
//! ever holding the full source in memory: peak usage stays at
//! O(max chunk size + overlap) no matter how large the document is. Feed
//! lines with [`StreamingChunker::push_line`], drain ready chunks with
//! [`StreamingChunker::next_chunk`], then call
//! [`StreamingChunker::finish`] for the final undersized tail.
//!
//! ```rust
//! use botsmith::chunker::StreamingChunker;
//!
//! let source_text = "one line.\nanother line.";
//! let mut chunker = StreamingChunker::new(500, 100);
//! let mut chunks = Vec::new();
//! for line in source_text.lines() {
//!     chunker.push_line(line);
//!     while let Some(chunk) = chunker.next_chunk() {
//!         chunks.push(chunk);
//!     }
//! }
//! chunks.extend(chunker.finish());
//! assert_eq!(chunks.len(), 1);
//! ```

/// Line-fed chunker producing a finite, non-restartable chunk sequence.
///
/// Each emitted chunk is at most `max_size` bytes before trimming; the last
/// `overlap` bytes before every break point are re-seeded into the next
/// chunk so context carries across boundaries.
#[derive(Debug)]
pub struct StreamingChunker {
    max_size: usize,
    overlap: usize,
    buffer: String,
}

impl StreamingChunker {
    /// Create a chunker with the given maximum chunk size and overlap.
    ///
    /// The overlap is capped at half the chunk size so every extraction
    /// removes at least `max_size / 2 - overlap` bytes and the drain loop
    /// always makes forward progress.
    pub fn new(max_size: usize, overlap: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            max_size,
            overlap: overlap.min(max_size / 2),
            buffer: String::new(),
        }
    }

    /// Append one line to the working buffer.
    ///
    /// Empty lines contribute only the newline separator. A single long line
    /// may make several chunks ready at once; drain them all before pushing
    /// the next line to keep the buffer bounded.
    pub fn push_line(&mut self, line: &str) {
        self.buffer.push_str(line);
        self.buffer.push('\n');
    }

    /// Whether a full-size chunk is ready for extraction.
    pub fn ready(&self) -> bool {
        self.buffer.len() >= self.max_size
    }

    /// Extract the next ready chunk, or `None` while the buffer is still
    /// under the size threshold.
    ///
    /// The returned chunk is trimmed; it may be empty if the window held
    /// only whitespace, in which case callers should skip it downstream.
    pub fn next_chunk(&mut self) -> Option<String> {
        if !self.ready() {
            return None;
        }

        let cut = self.break_point();
        let chunk = self.buffer[..cut].trim().to_string();

        // Re-seed the trailing overlap in front of the remainder.
        let mut seed_start = cut.saturating_sub(self.overlap);
        while !self.buffer.is_char_boundary(seed_start) {
            seed_start -= 1;
        }
        self.buffer.drain(..seed_start);

        Some(chunk)
    }

    /// Consume the chunker, returning whatever remains in the buffer as a
    /// final, possibly undersized chunk. Returns `None` when the remainder
    /// is blank after trimming.
    pub fn finish(self) -> Option<String> {
        let tail = self.buffer.trim();
        if tail.is_empty() {
            None
        } else {
            Some(tail.to_string())
        }
    }

    /// Pick the break point for the next chunk: the last sentence terminator
    /// or newline in the window, provided it lies beyond half the target
    /// size; otherwise a hard cut at the target, which guarantees progress
    /// on unbroken text.
    fn break_point(&self) -> usize {
        let mut target = self.max_size.min(self.buffer.len());
        while !self.buffer.is_char_boundary(target) {
            target -= 1;
        }
        match self.buffer[..target].rfind(['.', '\n']) {
            Some(pos) if pos > self.max_size / 2 => pos + 1,
            _ => target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(text: &str, max_size: usize, overlap: usize) -> Vec<String> {
        let mut chunker = StreamingChunker::new(max_size, overlap);
        let mut chunks = Vec::new();
        for line in text.lines() {
            chunker.push_line(line);
            while let Some(chunk) = chunker.next_chunk() {
                if !chunk.is_empty() {
                    chunks.push(chunk);
                }
            }
        }
        chunks.extend(chunker.finish());
        chunks
    }

    #[test]
    fn twelve_hundred_chars_make_three_chunks() {
        // No terminators anywhere, so every cut is a hard cut at 500.
        let text = "abcdefghij".repeat(120);
        let chunks = drive(&text, 500, 100);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], &text[..500]);
        // Chunk 2 starts with the final 100 characters of chunk 1.
        assert_eq!(&chunks[1][..100], &chunks[0][400..]);
        assert_eq!(chunks[1], &text[400..900]);
        assert_eq!(chunks[2], &text[800..]);
    }

    #[test]
    fn overlap_invariant_holds_across_all_boundaries() {
        let text = "0123456789".repeat(400);
        let overlap = 50;
        let chunks = drive(&text, 300, overlap);

        assert!(chunks.len() > 3);
        for pair in chunks.windows(2) {
            let tail = &pair[0][pair[0].len() - overlap..];
            assert!(
                pair[1].starts_with(tail),
                "chunk must start with the previous chunk's overlap tail"
            );
        }
    }

    #[test]
    fn trimmed_concatenation_reconstructs_the_source() {
        let text = "xyzw".repeat(700);
        let overlap = 40;
        let chunks = drive(&text, 250, overlap);

        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.push_str(&chunk[overlap..]);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn prefers_sentence_terminator_in_second_half_of_window() {
        let mut text = "a".repeat(449);
        text.push('.');
        text.push_str(&"b".repeat(150));
        let chunks = drive(&text, 500, 100);

        assert!(chunks[0].ends_with('.'));
        assert_eq!(chunks[0].len(), 450);
    }

    #[test]
    fn ignores_terminator_before_half_the_window() {
        let mut text = "a".repeat(200);
        text.push('.');
        text.push_str(&"b".repeat(400));
        let chunks = drive(&text, 500, 100);

        // The period at index 200 is inside the first half, so the first
        // chunk is a hard cut at the target size.
        assert_eq!(chunks[0].len(), 500);
    }

    #[test]
    fn breaks_at_newline_between_lines() {
        let first = "c".repeat(400);
        let second = "d".repeat(300);
        let text = format!("{first}\n{second}");
        let chunks = drive(&text, 500, 0);

        // The newline at index 400 sits in the second half of the window.
        assert_eq!(chunks[0], first);
    }

    #[test]
    fn short_input_yields_single_final_chunk() {
        let chunks = drive("just a short note", 500, 100);
        assert_eq!(chunks, vec!["just a short note".to_string()]);
    }

    #[test]
    fn blank_input_yields_nothing() {
        assert!(drive("", 500, 100).is_empty());
        assert!(drive("\n\n   \n", 500, 100).is_empty());
    }

    #[test]
    fn multibyte_text_never_splits_a_character() {
        let text = "äöüßéñ".repeat(200);
        let chunks = drive(&text, 120, 30);
        assert!(!chunks.is_empty());
        let total: usize = chunks.iter().map(String::len).sum();
        assert!(total >= text.len());
    }

    #[test]
    fn overlap_is_capped_to_preserve_progress() {
        // Overlap larger than half the chunk size would stall the drain
        // loop; the constructor caps it.
        let chunks = drive(&"q".repeat(2000), 100, 90);
        assert!(chunks.len() >= 10);
    }
}
