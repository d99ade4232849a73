//! crates/interview_core/src/chunking.rs
//!
//! Splits transcript turns into token-bounded, overlapping chunks for
//! embedding and vector storage.
//!
//! Token counts are estimated at four characters per token; there is no real
//! tokenizer behind these numbers.

use crate::domain::{Speaker, TranscriptChunk, TranscriptEntry};
use tracing::debug;

/// Number of characters of the turn text used in `original_message_id`.
const MESSAGE_ID_PREFIX_CHARS: usize = 50;

const MERGE_BELOW_TOKENS: usize = 10;
const SPLIT_ABOVE_TOKENS: usize = 200;
const HARD_CAP_TOKENS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingOptions {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_tokens: 200,
            overlap_tokens: 25,
        }
    }
}

//=========================================================================================
// Token Estimation & Sentence Splitting
//=========================================================================================

/// Estimates tokens as `ceil(chars / 4)` over the trimmed text.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.trim().chars().count();
    chars.div_ceil(4)
}

/// Splits after `.`, `!` or `?` when followed by whitespace, keeping the punctuation.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(_, next)) = chars.peek() {
            if next.is_whitespace() {
                let end = i + c.len_utf8();
                push_trimmed(&mut sentences, &text[start..end]);
                start = end;
            }
        }
    }
    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed(out: &mut Vec<String>, piece: &str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

//=========================================================================================
// Chunk Validation
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRecommendation {
    Keep,
    Split,
    Merge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkValidation {
    pub tokens: usize,
    pub is_valid: bool,
    pub recommendation: ChunkRecommendation,
    pub reason: &'static str,
}

/// Classifies a chunk by size. Advisory only; nothing enforces it.
pub fn validate_chunk_size(text: &str) -> ChunkValidation {
    let tokens = estimate_tokens(text);
    let (is_valid, recommendation, reason) = if tokens < MERGE_BELOW_TOKENS {
        (
            false,
            ChunkRecommendation::Merge,
            "Chunk too short - may lack semantic context",
        )
    } else if tokens > HARD_CAP_TOKENS {
        (
            false,
            ChunkRecommendation::Split,
            "Chunk too long - may lose semantic coherence",
        )
    } else if tokens > SPLIT_ABOVE_TOKENS {
        (
            true,
            ChunkRecommendation::Split,
            "Chunk is long but acceptable - consider splitting for better embeddings",
        )
    } else {
        (true, ChunkRecommendation::Keep, "Chunk size is optimal")
    };

    ChunkValidation {
        tokens,
        is_valid,
        recommendation,
        reason,
    }
}

//=========================================================================================
// Splitting
//=========================================================================================

/// Stable identifier linking every part back to the turn it came from.
pub fn original_message_id(entry: &TranscriptEntry) -> String {
    let prefix: String = entry.text.chars().take(MESSAGE_ID_PREFIX_CHARS).collect();
    format!(
        "{}:{}:{}",
        entry.timestamp.to_rfc3339(),
        entry.speaker.as_str(),
        prefix
    )
}

/// Last `ceil(0.75 * overlap_tokens)` words of a closed chunk.
fn overlap_words(text: &str, overlap_tokens: usize) -> Vec<&str> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let wanted = (overlap_tokens * 3).div_ceil(4);
    if words.len() <= wanted {
        return words;
    }
    words[words.len() - wanted..].to_vec()
}

/// Opens the next chunk with as much of the overlap as still fits next to `sentence`.
fn seed_next_chunk(previous: &str, sentence: &str, options: ChunkingOptions) -> String {
    let words = overlap_words(previous, options.overlap_tokens);
    for start in 0..words.len() {
        let seeded = format!("{} {}", words[start..].join(" "), sentence);
        if estimate_tokens(&seeded) <= options.max_tokens {
            return seeded;
        }
    }
    sentence.to_string()
}

/// Estimate for `current` and `sentence` joined by a single space.
fn joined_tokens(current: &str, sentence: &str) -> usize {
    let chars = current.trim().chars().count() + 1 + sentence.trim().chars().count();
    chars.div_ceil(4)
}

fn chunk_from(entry: &TranscriptEntry, text: String, turn_index: usize, part: usize, id: &str) -> TranscriptChunk {
    TranscriptChunk {
        speaker: entry.speaker,
        text,
        timestamp: entry.timestamp,
        turn_index,
        part_number: part,
        total_parts: 0,
        original_message_id: id.to_string(),
        topic: entry.topic.clone(),
        sentiment: entry.sentiment.clone(),
        confidence: entry.confidence,
        summary: entry.summary.clone(),
        keywords: entry.keywords.clone(),
    }
}

/// Splits one transcript turn into ordered, overlapping chunks.
///
/// A single sentence longer than `max_tokens` is kept whole, so that chunk
/// exceeds the ceiling.
pub fn split_turn(
    entry: &TranscriptEntry,
    turn_index: usize,
    options: ChunkingOptions,
) -> Vec<TranscriptChunk> {
    let sentences = split_sentences(&entry.text);
    if sentences.is_empty() {
        return Vec::new();
    }

    let mut texts: Vec<String> = Vec::new();
    let mut current = String::new();

    for sentence in sentences {
        if !current.is_empty() && joined_tokens(&current, &sentence) > options.max_tokens {
            let seeded = seed_next_chunk(&current, &sentence, options);
            texts.push(std::mem::take(&mut current));
            current = seeded;
        } else if current.is_empty() {
            current = sentence;
        } else {
            current.push(' ');
            current.push_str(&sentence);
        }
    }
    if !current.trim().is_empty() {
        texts.push(current);
    }

    let id = original_message_id(entry);
    let total = texts.len();
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let mut chunk = chunk_from(entry, text.trim().to_string(), turn_index, i + 1, &id);
            chunk.total_parts = total;
            chunk
        })
        .collect()
}

//=========================================================================================
// Whole Transcripts
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkingStats {
    pub original_entries: usize,
    pub processed_entries: usize,
    pub messages_split: usize,
    pub undersized_chunks: usize,
    pub average_tokens_before: f64,
    pub average_tokens_after: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ChunkedTranscript {
    pub chunks: Vec<TranscriptChunk>,
    pub stats: ChunkingStats,
}

/// Chunks every turn of a transcript. Turns within the ceiling pass through as part 1 of 1.
pub fn chunk_transcript(entries: &[TranscriptEntry], options: ChunkingOptions) -> ChunkedTranscript {
    let mut chunks = Vec::new();
    let mut messages_split = 0;
    let mut tokens_before = 0;

    for (turn_index, entry) in entries.iter().enumerate() {
        let tokens = estimate_tokens(&entry.text);
        if tokens == 0 {
            continue;
        }
        tokens_before += tokens;

        if tokens > options.max_tokens {
            let parts = split_turn(entry, turn_index, options);
            debug!(
                turn_index,
                tokens,
                parts = parts.len(),
                "Split long transcript turn"
            );
            if parts.len() > 1 {
                messages_split += 1;
            }
            chunks.extend(parts);
        } else {
            let id = original_message_id(entry);
            let mut chunk = chunk_from(entry, entry.text.trim().to_string(), turn_index, 1, &id);
            chunk.total_parts = 1;
            chunks.push(chunk);
        }
    }

    let tokens_after: usize = chunks.iter().map(|c| estimate_tokens(&c.text)).sum();
    let undersized_chunks = chunks
        .iter()
        .filter(|c| validate_chunk_size(&c.text).recommendation == ChunkRecommendation::Merge)
        .count();

    let stats = ChunkingStats {
        original_entries: entries.len(),
        processed_entries: chunks.len(),
        messages_split,
        undersized_chunks,
        average_tokens_before: average(tokens_before, entries.len()),
        average_tokens_after: average(tokens_after, chunks.len()),
    };

    ChunkedTranscript { chunks, stats }
}

fn average(total: usize, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

//=========================================================================================
// Metrics & Embedding Prompt
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkMetrics {
    pub tokens: usize,
    pub words: usize,
    pub characters: usize,
    pub sentences: usize,
}

pub fn chunk_metrics(chunk: &TranscriptChunk) -> ChunkMetrics {
    ChunkMetrics {
        tokens: estimate_tokens(&chunk.text),
        words: chunk.text.split_whitespace().count(),
        characters: chunk.text.chars().count(),
        sentences: split_sentences(&chunk.text).len(),
    }
}

/// Builds the text that gets embedded for a chunk, or `None` if it has no utterance.
pub fn embedding_prompt(chunk: &TranscriptChunk) -> Option<String> {
    let text = chunk.text.trim();
    if text.is_empty() {
        return None;
    }

    let speaker = chunk.speaker.as_str();
    let mut parts = vec![format!("Speaker: {speaker}"), format!("Utterance: {text}")];

    if text.chars().count() < 50 {
        parts.push(format!("Context: Brief {speaker} response in interview"));
    }

    if text.contains('?') {
        parts.push("Type: Question requiring response".to_string());
    } else {
        match chunk.speaker {
            Speaker::Participant => parts.push("Type: User response/answer".to_string()),
            Speaker::Agent => parts.push("Type: AI interviewer statement".to_string()),
            Speaker::Unknown => {}
        }
    }

    if let Some(summary) = chunk.summary.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("Summary: {summary}"));
    }
    if !chunk.keywords.is_empty() {
        parts.push(format!("Keywords: {}", chunk.keywords.join(", ")));
    }
    if chunk.total_parts > 1 {
        parts.push(format!(
            "Chunk: Part {} of {} (split message)",
            chunk.part_number, chunk.total_parts
        ));
        let original: String = chunk.original_message_id.chars().take(50).collect();
        parts.push(format!("Original: {original}..."));
    }

    Some(parts.join("\n"))
}
