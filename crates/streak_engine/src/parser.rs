//! Outcome parser — raw chat text to a validated [`Outcome`].
//!
//! Two independent matches are required: a period identifier and a face
//! value. The face is looked up in its primary `Result: 5` form first and
//! in the bracketed `[5]` form second. The face search never looks inside
//! the period token, so a period's digits are never mistaken for a face.

use std::fmt;
use std::sync::LazyLock;

use common::{Face, Outcome, RawMessage};
use regex::Regex;

/// Why a message did not yield an outcome. None of these are errors; chat
/// noise is expected and simply skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingPeriod,
    MissingFace,
    /// The face token matched structurally but its value is out of range.
    FaceOutOfRange(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingPeriod => f.write_str("no period identifier"),
            Rejection::MissingFace => f.write_str("no face value"),
            Rejection::FaceOutOfRange(raw) => write!(
                f,
                "face {} outside {}..={}",
                raw,
                Face::MIN,
                Face::MAX
            ),
        }
    }
}

// ASCII digits only; `\d` also matches digits of other scripts.
const PERIOD_LABELLED: &str =
    r"(?i)(?:period|issue|期号|第)\s*(?:no\.?)?\s*[:：#]?\s*([0-9]{6,}(?:-[0-9]{1,4})?)";
const PERIOD_BARE: &str = r"(?:^|[^0-9])([0-9]{6,}(?:-[0-9]{1,4})?)(?:[^0-9]|$)";
const FACE_PRIMARY: &str = r"(?i)(?:result|outcome|roll|结果|点数)\s*[:：=]\s*([0-9]+)";
const FACE_FALLBACK: &str = r"[\[【(（]\s*([0-9]+)\s*[\]】)）]";

// A pattern that fails to compile degrades to "no match"; the tests pin
// every one of them.
static RE_PERIOD_LABELLED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(PERIOD_LABELLED).ok());
static RE_PERIOD_BARE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(PERIOD_BARE).ok());
static RE_FACE_PRIMARY: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(FACE_PRIMARY).ok());
static RE_FACE_FALLBACK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(FACE_FALLBACK).ok());

/// Byte span and text of the first capture group of `re` in `text`.
fn first_capture<'t>(
    re: &LazyLock<Option<Regex>>,
    text: &'t str,
) -> Option<(usize, usize, &'t str)> {
    let re = re.as_ref()?;
    let group = re.captures(text)?.get(1)?;
    Some((group.start(), group.end(), group.as_str()))
}

fn find_period(text: &str) -> Option<(usize, usize, &str)> {
    first_capture(&RE_PERIOD_LABELLED, text).or_else(|| first_capture(&RE_PERIOD_BARE, text))
}

fn find_face(text: &str) -> Option<String> {
    first_capture(&RE_FACE_PRIMARY, text)
        .or_else(|| first_capture(&RE_FACE_FALLBACK, text))
        .map(|(_, _, raw)| raw.to_string())
}

/// Parse a transport message into an outcome.
///
/// Pure and deterministic: `observed_at` comes from `msg.received_at` and
/// `sequence_hint` from `msg.event_id`.
pub fn parse(msg: &RawMessage) -> Result<Outcome, Rejection> {
    let text = msg.text.as_str();

    let (start, end, period) = find_period(text).ok_or(Rejection::MissingPeriod)?;

    // Blank out the period token so its digits can't satisfy the face search.
    let mut masked = String::with_capacity(text.len());
    masked.push_str(&text[..start]);
    masked.extend(std::iter::repeat(' ').take(end - start));
    masked.push_str(&text[end..]);

    let raw_face = find_face(&masked).ok_or(Rejection::MissingFace)?;
    let face = raw_face
        .parse::<u8>()
        .ok()
        .and_then(Face::new)
        .ok_or_else(|| Rejection::FaceOutOfRange(raw_face.clone()))?;

    let source_name = if msg.source_name.trim().is_empty() {
        msg.source_id.clone()
    } else {
        msg.source_name.clone()
    };

    Ok(Outcome {
        period_id: period.to_string(),
        face,
        source_id: msg.source_id.clone(),
        source_name,
        observed_at: msg.received_at,
        sequence_hint: msg.event_id,
    })
}
