//! Lecture data: the chunk queue built from a provider response, the playback
//! cursor and the whiteboard buffer the chunks are written onto.

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicI64, Ordering};

/// Token the system prompt asks the provider to place between teachable steps.
pub const CHUNK_SEPARATOR: &str = "|||";

/// One teachable step of a lecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LectureChunk {
    pub id: String,
    pub text: String,
    /// Informational only; the cursor in [`Lecture`] decides what plays next.
    pub is_played: bool,
}

static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Millisecond creation stamp, strictly increasing within the process so that
/// two queues built in the same millisecond still get distinct chunk ids.
fn creation_stamp() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_STAMP.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Splits a raw provider response into lecture chunks.
///
/// Segments are trimmed and empty ones dropped; order is playback order.
pub fn build_queue(response_text: &str) -> Vec<LectureChunk> {
    let stamp = creation_stamp();
    response_text
        .split(CHUNK_SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .enumerate()
        .map(|(i, text)| LectureChunk {
            id: format!("{stamp}-{i}"),
            text: text.to_string(),
            is_played: false,
        })
        .collect()
}

/// A chunk queue together with its playback cursor.
#[derive(Debug, Clone)]
pub struct Lecture {
    chunks: Vec<LectureChunk>,
    cursor: usize,
    /// Number of chunks already written onto the whiteboard.
    written: usize,
}

impl Lecture {
    pub fn new(chunks: Vec<LectureChunk>) -> Self {
        Self {
            chunks,
            cursor: 0,
            written: 0,
        }
    }

    pub fn chunks(&self) -> &[LectureChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> Option<&LectureChunk> {
        self.chunks.get(self.cursor)
    }

    /// True once the cursor has moved past the last chunk.
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.chunks.len()
    }

    /// Moves the cursor forward by one and returns the new position.
    pub fn advance(&mut self) -> usize {
        if self.cursor < self.chunks.len() {
            self.cursor += 1;
        }
        self.cursor
    }

    pub fn mark_current_played(&mut self) {
        if let Some(chunk) = self.chunks.get_mut(self.cursor) {
            chunk.is_played = true;
        }
    }

    /// Returns the current chunk's text if it has not been written yet and
    /// records it as written.
    pub fn take_unwritten_current(&mut self) -> Option<String> {
        if self.cursor < self.written {
            return None;
        }
        let text = self.chunks.get(self.cursor)?.text.clone();
        self.written = self.cursor + 1;
        Some(text)
    }
}

/// A piece of whiteboard content, as the front-end renders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum BoardSegment {
    Markdown(String),
    Diagram(String),
}

static SVG_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<svg.*?</svg>").expect("valid svg pattern"));

/// Everything written on the board during the current lecture.
#[derive(Debug, Clone, Default)]
pub struct Whiteboard {
    content: String,
    last_entry: Option<String>,
}

impl Whiteboard {
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn clear(&mut self) {
        self.content.clear();
        self.last_entry = None;
    }

    /// Appends `text` as a new paragraph. Appending the entry that was just
    /// written is a no-op; returns whether the buffer changed.
    pub fn append(&mut self, text: &str) -> bool {
        if self.last_entry.as_deref() == Some(text) {
            return false;
        }
        self.push_entry(text);
        true
    }

    /// Writes a lecture chunk. Chunks are written once each by the caller's
    /// cursor, so a chunk repeating the previous chunk's text is kept.
    pub fn write_chunk(&mut self, text: &str) {
        self.push_entry(text);
    }

    fn push_entry(&mut self, text: &str) {
        if !self.content.is_empty() {
            self.content.push_str("\n\n");
        }
        self.content.push_str(text);
        self.last_entry = Some(text.to_string());
    }

    /// Appends a doubt answer as a quoted block.
    pub fn append_doubt_answer(&mut self, answer: &str) -> bool {
        self.append(&format!("> **Doubt Solved:** {answer}"))
    }

    /// Splits the board into markdown and SVG diagram segments, dropping the
    /// code fences providers sometimes wrap diagrams in.
    pub fn segments(&self) -> Vec<BoardSegment> {
        let cleaned = self
            .content
            .replace("```xml", "")
            .replace("```svg", "")
            .replace("```", "");

        fn push_markdown(text: &str, segments: &mut Vec<BoardSegment>) {
            if !text.trim().is_empty() {
                segments.push(BoardSegment::Markdown(text.trim().to_string()));
            }
        }

        let mut segments = Vec::new();

        let mut last = 0;
        for diagram in SVG_BLOCK.find_iter(&cleaned) {
            push_markdown(&cleaned[last..diagram.start()], &mut segments);
            segments.push(BoardSegment::Diagram(diagram.as_str().to_string()));
            last = diagram.end();
        }
        push_markdown(&cleaned[last..], &mut segments);
        segments
    }
}
