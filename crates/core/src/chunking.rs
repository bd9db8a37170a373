use crate::error::IngestError;
use std::collections::VecDeque;
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const SEPARATOR: &str = "\n";

/// Sizes are measured in characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, IngestError> {
        let config = Self {
            chunk_size,
            chunk_overlap,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Splits on newlines, then greedily packs the lines back into chunks of at
/// most `chunk_size` characters. Each new chunk starts with the trailing lines
/// of the previous one, up to `chunk_overlap` characters.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Result<Vec<String>, IngestError> {
    config.validate()?;

    let segments = text
        .split(SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .flat_map(|segment| window_segment(segment, config))
        .collect::<Vec<_>>();

    let chunks = merge_segments(&segments, config);
    debug!(
        characters = char_len(text),
        segments = segments.len(),
        chunks = chunks.len(),
        "split text into chunks"
    );
    Ok(chunks)
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// A single line longer than a chunk is cut into overlapping fixed windows.
fn window_segment(segment: &str, config: &ChunkingConfig) -> Vec<String> {
    if char_len(segment) <= config.chunk_size {
        return vec![segment.to_string()];
    }

    let chars: Vec<char> = segment.chars().collect();
    let step = config.chunk_size - config.chunk_overlap;
    let mut windows = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start = start.saturating_add(step);
    }
    windows
}

fn merge_segments(segments: &[String], config: &ChunkingConfig) -> Vec<String> {
    let separator_len = char_len(SEPARATOR);
    let mut chunks = Vec::new();
    let mut current: VecDeque<(&str, usize)> = VecDeque::new();
    let mut total = 0usize;

    for segment in segments {
        let len = char_len(segment);
        let joined = |current: &VecDeque<(&str, usize)>, total: usize| {
            total + len + if current.is_empty() { 0 } else { separator_len }
        };

        if joined(&current, total) > config.chunk_size && !current.is_empty() {
            push_joined(&mut chunks, &current);

            while total > config.chunk_overlap
                || (joined(&current, total) > config.chunk_size && total > 0)
            {
                let had_more = current.len() > 1;
                let Some((_, front_len)) = current.pop_front() else {
                    break;
                };
                total -= front_len + if had_more { separator_len } else { 0 };
            }
        }

        current.push_back((segment.as_str(), len));
        total += len + if current.len() > 1 { separator_len } else { 0 };
    }

    push_joined(&mut chunks, &current);
    chunks
}

fn push_joined(chunks: &mut Vec<String>, current: &VecDeque<(&str, usize)>) {
    let joined = current
        .iter()
        .map(|(segment, _)| *segment)
        .collect::<Vec<_>>()
        .join(SEPARATOR);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
