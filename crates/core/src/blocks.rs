//! Extracts the structured blocks the GM may embed in a reply.
//!
//! A reply is free text that can carry a numbered choices list and a block of
//! character-sheet fields, each fenced by its own marker pair, in any order and
//! any combination. Lines inside a block that do not fit the expected shape are
//! noise from a generative source and are skipped, never reported as errors.

use std::collections::BTreeMap;
use std::ops::Range;

pub const CHOICES_OPEN: &str = "[CHOICES]";
pub const CHOICES_CLOSE: &str = "[/CHOICES]";
pub const CHARACTER_OPEN: &str = "[CHARACTER]";
pub const CHARACTER_CLOSE: &str = "[/CHARACTER]";

/// Lower-cased field name to value, as proposed for the character sheet.
pub type CharacterFieldMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Choices,
    Character,
}

const BLOCKS: [(BlockKind, &str, &str); 2] = [
    (BlockKind::Choices, CHOICES_OPEN, CHOICES_CLOSE),
    (BlockKind::Character, CHARACTER_OPEN, CHARACTER_CLOSE),
];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedResponse {
    pub narrative: String,
    pub choices: Vec<String>,
    /// `None` when no block was present or the block contributed no usable field.
    pub character_updates: Option<CharacterFieldMap>,
}

pub fn parse(raw: &str) -> ParsedResponse {
    let mut narrative = raw.to_string();
    let mut choices = Vec::new();
    let mut fields = CharacterFieldMap::new();
    let mut stripped = false;

    // Rescan after every removal so no complete block survives in the narrative.
    while let Some((kind, whole, body)) = next_block(&narrative) {
        let body_text = &narrative[body];
        match kind {
            BlockKind::Choices => choices.extend(body_text.lines().filter_map(parse_choice_line)),
            BlockKind::Character => fields.extend(body_text.lines().filter_map(parse_field_line)),
        }
        narrative.replace_range(whole, "");
        stripped = true;
    }

    if stripped {
        narrative = narrative.trim().to_string();
    }

    ParsedResponse {
        narrative,
        choices,
        character_updates: (!fields.is_empty()).then_some(fields),
    }
}

/// Finds the earliest opening marker that has a matching close after it.
/// Returns the block kind, the byte range of the whole block and of its body.
fn next_block(text: &str) -> Option<(BlockKind, Range<usize>, Range<usize>)> {
    BLOCKS
        .iter()
        .filter_map(|&(kind, open, close)| {
            let start = text.find(open)?;
            let body_start = start + open.len();
            let body_end = body_start + text[body_start..].find(close)?;
            Some((kind, start..body_end + close.len(), body_start..body_end))
        })
        .min_by_key(|(_, whole, _)| whole.start)
}

/// `<digits>.<optional space><label>`, with the digits at the very start of the line.
fn parse_choice_line(line: &str) -> Option<String> {
    let line = line.trim_end();
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == line.len() {
        return None;
    }
    let label = rest.strip_prefix('.')?.trim();
    (!label.is_empty()).then(|| label.to_string())
}

/// `<field>: <value>`; bracketed values are unfilled placeholders.
fn parse_field_line(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim().to_lowercase();
    let value = value.trim();
    if name.is_empty() || value.is_empty() || value.starts_with('[') {
        return None;
    }
    Some((name, value.to_string()))
}
