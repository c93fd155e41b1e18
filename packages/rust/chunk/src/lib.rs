//! Splitting extracted articles into bounded, labeled chunks.
//!
//! Two interchangeable strategies produce [`ChunkUnit`]s whose text stays
//! within a size bound (~3000 characters, roughly 1000 tokens):
//!
//! - **Heading-based**: preferred when the structural markup has `h2`/`h3`
//!   headings. Each heading begins a chunk labeled with its text; the body
//!   runs until the next heading of the same or higher priority.
//! - **Paragraph-based**: the fallback for unstructured pages and for
//!   real-time ingested content. Paragraphs accumulate into a buffer that is
//!   flushed as "Part N" whenever the next paragraph would overflow the
//!   bound.
//!
//! Neither strategy ever returns zero chunks for non-empty input: when both
//! come up empty, the whole text becomes a single "Full Content" chunk.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use hrlex_shared::ChunkUnit;

/// Default chunk size bound in characters (~1000 tokens).
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 3000;

/// Paragraph fragments at or below this length are treated as noise
/// (breadcrumbs, button labels) and skipped by the paragraph strategy.
const MIN_PARAGRAPH_CHARS: usize = 50;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Tuning for both chunking strategies.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    /// Upper bound on chunk text length. A chunk may exceed it by at most
    /// one trailing paragraph or heading segment.
    pub max_chars: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }
}

// ---------------------------------------------------------------------------
// Document entry point
// ---------------------------------------------------------------------------

/// Chunk one extracted article, choosing the best available strategy.
///
/// Heading-based splitting is used when `content_html` carries `h2`/`h3`
/// headings, the paragraph strategy otherwise. Non-empty input always yields
/// at least one chunk.
pub fn chunk_document(content_html: &str, main_text: &str, opts: &ChunkOptions) -> Vec<ChunkUnit> {
    let mut chunks = if has_headings(content_html) {
        chunk_by_headings(content_html, opts)
    } else {
        Vec::new()
    };

    if chunks.is_empty() {
        chunks = chunk_text(main_text, opts);
    }

    debug!(chunks = chunks.len(), "chunked document");
    chunks
}

/// Chunk plain text with the paragraph strategy, falling back to a single
/// "Full Content" chunk so non-empty input never yields zero chunks. This is
/// the path real-time ingested pages take.
pub fn chunk_text(text: &str, opts: &ChunkOptions) -> Vec<ChunkUnit> {
    let chunks = chunk_by_paragraphs(text, opts);
    if chunks.is_empty() && !text.trim().is_empty() {
        return vec![ChunkUnit {
            label: "Full Content".into(),
            text: text.trim().to_string(),
        }];
    }
    chunks
}

/// Whether the markup has any `h2`/`h3` heading to split on.
fn has_headings(content_html: &str) -> bool {
    let doc = Html::parse_fragment(content_html);
    let sel = Selector::parse("h2, h3").expect("valid selector");
    doc.select(&sel).next().is_some()
}

// ---------------------------------------------------------------------------
// Heading-based strategy
// ---------------------------------------------------------------------------

/// Split on `h2`/`h3` headings in the structural markup.
///
/// Each heading starts a chunk labeled with its text ("Section N" when the
/// heading is empty). The body collects sibling content until the next
/// heading of the same or higher priority, so an `h2` section carries its
/// `h3` subsections' text while each `h3` still gets a chunk of its own.
/// Oversize sections are flushed at block granularity with
/// "<label> (Part N)" continuation labels.
pub fn chunk_by_headings(content_html: &str, opts: &ChunkOptions) -> Vec<ChunkUnit> {
    let doc = Html::parse_fragment(content_html);
    let heading_sel = Selector::parse("h2, h3").expect("valid selector");

    let mut chunks: Vec<ChunkUnit> = Vec::new();

    for (index, heading) in doc.select(&heading_sel).enumerate() {
        let heading_text = normalize_whitespace(&heading.text().collect::<String>());
        let label = if heading_text.is_empty() {
            format!("Section {}", index + 1)
        } else {
            heading_text
        };

        let level = heading_level(heading.value().name()).expect("selected element is a heading");

        let mut blocks: Vec<String> = Vec::new();
        for sibling in heading.next_siblings() {
            if let Some(el) = ElementRef::wrap(sibling) {
                if let Some(sibling_level) = heading_level(el.value().name()) {
                    if sibling_level <= level {
                        break;
                    }
                }
                let text = normalize_whitespace(&el.text().collect::<String>());
                if !text.is_empty() {
                    blocks.push(text);
                }
            } else if let Some(text) = sibling.value().as_text() {
                let text = normalize_whitespace(text);
                if !text.is_empty() {
                    blocks.push(text);
                }
            }
        }

        flush_blocks(&mut chunks, &label, &blocks, opts.max_chars);
    }

    chunks
}

/// Heading priority: `h1` is highest. Non-headings return `None`.
fn heading_level(tag: &str) -> Option<u8> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Accumulate `blocks` into bounded chunks under `label`, with continuation
/// labels for overflow.
fn flush_blocks(chunks: &mut Vec<ChunkUnit>, label: &str, blocks: &[String], max_chars: usize) {
    let mut buffer = String::new();
    let mut part = 1usize;

    for block in blocks {
        if !buffer.is_empty() && buffer.len() + 2 + block.len() > max_chars {
            chunks.push(ChunkUnit {
                label: part_label(label, part),
                text: std::mem::take(&mut buffer),
            });
            part += 1;
        }
        if !buffer.is_empty() {
            buffer.push_str("\n\n");
        }
        buffer.push_str(block);
    }

    if !buffer.trim().is_empty() {
        chunks.push(ChunkUnit {
            label: part_label(label, part),
            text: buffer,
        });
    }
}

fn part_label(label: &str, part: usize) -> String {
    if part == 1 {
        label.to_string()
    } else {
        format!("{label} (Part {part})")
    }
}

// ---------------------------------------------------------------------------
// Paragraph-based strategy
// ---------------------------------------------------------------------------

/// Split plain text on blank lines and accumulate into "Part N" chunks.
///
/// A paragraph that would overflow the buffer closes the current chunk and
/// starts the next one; a final non-empty buffer always flushes. A single
/// paragraph longer than the bound becomes its own oversize chunk rather
/// than being split mid-sentence.
pub fn chunk_by_paragraphs(text: &str, opts: &ChunkOptions) -> Vec<ChunkUnit> {
    static PARAGRAPH_SPLIT: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid regex"));

    let paragraphs: Vec<&str> = PARAGRAPH_SPLIT
        .split(text)
        .map(str::trim)
        .filter(|p| p.len() > MIN_PARAGRAPH_CHARS)
        .collect();

    let mut chunks: Vec<ChunkUnit> = Vec::new();
    let mut buffer = String::new();
    let mut part = 1usize;

    for paragraph in paragraphs {
        if !buffer.is_empty() && buffer.len() + paragraph.len() > opts.max_chars {
            chunks.push(ChunkUnit {
                label: format!("Part {part}"),
                text: std::mem::take(&mut buffer),
            });
            part += 1;
        }
        if !buffer.is_empty() {
            buffer.push_str("\n\n");
        }
        buffer.push_str(paragraph);
    }

    if !buffer.trim().is_empty() {
        chunks.push(ChunkUnit {
            label: format!("Part {part}"),
            text: buffer,
        });
    }

    chunks
}

/// Collapse internal whitespace runs and trim.
fn normalize_whitespace(text: &str) -> String {
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
    WS_RE.replace_all(text.trim(), " ").into_owned()
}
