//! Boundary-aware source splitter.
//!
//! Splits an oversized [`SourceUnit`] into [`Chunk`]s aligned to top-level
//! syntactic unit boundaries (functions and classes, found via a
//! tree-sitter Python parse). A chunk boundary never falls inside a unit:
//! whole units are accumulated greedily until adding the next one would
//! exceed `max_lines`. A single unit larger than `max_lines` becomes its
//! own oversized chunk — deliberate policy, not a failure.
//!
//! Each chunk after the first is prefixed with the last `overlap_lines`
//! raw lines of the previous chunk for continuity context; the overlap is
//! excluded from merge output downstream so it never duplicates
//! documentation.

use tracing::{debug, warn};
use tree_sitter::Parser;

use crate::error::{Error, Result};
use crate::fingerprint::fingerprint;
use crate::models::{Chunk, SourceUnit};

/// Result of splitting one source unit.
#[derive(Debug)]
pub struct SplitOutcome {
    pub chunks: Vec<Chunk>,
    /// True when the source had no top-level functions or classes and was
    /// emitted as a single chunk regardless of `max_lines`. Surfaced so
    /// callers can warn instead of silently truncating.
    pub fallback_single: bool,
}

/// A top-level syntactic unit's location, 1-indexed inclusive lines.
#[derive(Debug, Clone)]
struct UnitSpan {
    name: String,
    start_line: usize,
    end_line: usize,
}

/// Split `unit` into boundary-aligned chunks of at most `max_lines` lines
/// (except for single oversized units).
///
/// # Errors
///
/// Returns [`Error::InvalidSource`] if the content does not parse — no
/// partial chunks are ever produced for invalid input.
pub fn split(unit: &SourceUnit, max_lines: usize, overlap_lines: usize) -> Result<SplitOutcome> {
    let spans = parse_units(&unit.content)?;
    let lines: Vec<&str> = unit.content.split('\n').collect();
    let total_lines = lines.len();

    if spans.is_empty() {
        warn!(
            identifier = %unit.identifier,
            total_lines,
            "no top-level functions or classes; emitting a single chunk"
        );
        let content = unit.content.clone();
        return Ok(SplitOutcome {
            chunks: vec![Chunk {
                sequence_index: 0,
                start_line: 1,
                end_line: total_lines,
                fingerprint: fingerprint(&content),
                content,
                unit_names: Vec::new(),
            }],
            fallback_single: true,
        });
    }

    // Greedy grouping: whole units only. Groups tile the file — each one
    // ends where the next begins, so module-level code between units is
    // never dropped.
    let mut groups: Vec<(usize, usize, Vec<String>)> = Vec::new();
    let mut current_start = 1usize;
    let mut current_units: Vec<UnitSpan> = Vec::new();

    for span in spans {
        let potential_size = span.end_line - current_start + 1;
        if potential_size > max_lines && !current_units.is_empty() {
            groups.push((
                current_start,
                span.start_line - 1,
                current_units.iter().map(|u| u.name.clone()).collect(),
            ));
            current_start = span.start_line;
            current_units.clear();
        }
        current_units.push(span);
    }

    // Final group extends to end of file so trailing module-level code is
    // never dropped.
    groups.push((
        current_start,
        total_lines,
        current_units.iter().map(|u| u.name.clone()).collect(),
    ));

    let mut chunks = Vec::with_capacity(groups.len());
    let mut prev_raw: Option<String> = None;

    for (sequence_index, (start_line, end_line, unit_names)) in groups.into_iter().enumerate() {
        let raw = lines[start_line - 1..end_line].join("\n");

        let content = match (&prev_raw, overlap_lines) {
            (Some(prev), n) if n > 0 => {
                let prev_lines: Vec<&str> = prev.split('\n').collect();
                let tail_start = prev_lines.len().saturating_sub(n);
                let mut with_overlap = prev_lines[tail_start..].join("\n");
                with_overlap.push('\n');
                with_overlap.push_str(&raw);
                with_overlap
            }
            _ => raw.clone(),
        };

        debug!(
            sequence_index,
            start_line,
            end_line,
            units = unit_names.len(),
            "built chunk"
        );

        chunks.push(Chunk {
            sequence_index,
            start_line,
            end_line,
            fingerprint: fingerprint(&content),
            content,
            unit_names,
        });
        prev_raw = Some(raw);
    }

    Ok(SplitOutcome {
        chunks,
        fallback_single: false,
    })
}

/// Parse the source and return the top-level function/class spans in
/// source order.
fn parse_units(content: &str) -> Result<Vec<UnitSpan>> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::language())
        .map_err(|e| Error::InvalidSource(format!("failed to load grammar: {e}")))?;

    let tree = parser
        .parse(content, None)
        .ok_or_else(|| Error::InvalidSource("parser produced no tree".into()))?;

    let root = tree.root_node();
    if root.has_error() {
        return Err(Error::InvalidSource(
            "source contains syntax errors".into(),
        ));
    }

    let mut spans = Vec::new();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        let name_node = match child.kind() {
            "function_definition" | "class_definition" => child.child_by_field_name("name"),
            "decorated_definition" => child
                .child_by_field_name("definition")
                .and_then(|def| def.child_by_field_name("name")),
            _ => continue,
        };

        let name = name_node
            .and_then(|n| n.utf8_text(content.as_bytes()).ok())
            .unwrap_or("<anonymous>")
            .to_string();

        spans.push(UnitSpan {
            name,
            start_line: child.start_position().row + 1,
            end_line: child.end_position().row + 1,
        });
    }

    spans.sort_by_key(|s| s.start_line);
    Ok(spans)
}
