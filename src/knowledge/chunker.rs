use crate::config::ChunkingConfig;

/// Splits ingested documents into overlapping windows for embedding
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

/// One window produced by [`Chunks`]. `start..end` is the raw byte span in
/// the source text; `text` is that span trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunk<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl TextChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            chunk_overlap: config.chunk_overlap,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Lazily split `text`. The returned iterator is `Clone`, so the same
    /// sequence can be replayed without re-reading the source.
    pub fn chunk<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            text,
            chunk_size: self.chunk_size,
            overlap: self.chunk_overlap,
            start: 0,
            done: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    chunk_size: usize,
    overlap: usize,
    start: usize,
    done: bool,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = TextChunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let text = self.text;
        let len = text.len();

        if self.done {
            return None;
        }

        // Short documents are kept whole
        if self.start == 0 && len <= self.chunk_size {
            self.done = true;
            if text.trim().is_empty() {
                return None;
            }
            return Some(TextChunk {
                text,
                start: 0,
                end: len,
            });
        }

        loop {
            if self.start >= len {
                self.done = true;
                return None;
            }

            let start = self.start;
            let mut end = floor_char_boundary(text, start + self.chunk_size);
            if end <= start {
                end = ceil_char_boundary(text, start + 1);
            }

            if end < len {
                if let Some(break_at) = find_break_point(&text[start..end]) {
                    if break_at > self.chunk_size / 2 {
                        end = start + break_at + 1;
                    }
                }
            }

            if end >= len {
                self.done = true;
            } else {
                let next = floor_char_boundary(text, end.saturating_sub(self.overlap));
                self.start = if next > start { next } else { end };
            }

            let trimmed = text[start..end].trim();
            if !trimmed.is_empty() {
                return Some(TextChunk {
                    text: trimmed,
                    start,
                    end,
                });
            }

            if self.done {
                return None;
            }
        }
    }
}

/// Last paragraph break or sentence end inside the window (byte offset of
/// the first break character)
fn find_break_point(window: &str) -> Option<usize> {
    let paragraph = window.rfind("\n\n");
    let sentence = window.rfind(". ").max(window.rfind(".\n"));
    paragraph.max(sentence)
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
