use thiserror::Error;

use crate::dsl::song::UnknownStance;
use crate::dsl::{Move, SongPart, TimeRange, join_tags};

/// Caller-facing rule violations. Messages are meant to be shown as-is.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("move name must not be empty")]
    EmptyMoveName,
    #[error("part name must not be empty")]
    EmptyPartName,
    #[error("end time ({end}) must be after start time ({start})")]
    InvalidTimeRange { start: f64, end: f64 },
    #[error("time {0} must be a finite number of seconds, zero or more")]
    InvalidTime(f64),
    #[error("{0} must be a single line")]
    LineBreak(&'static str),
    #[error("{field} must not start with '#' or '@': {text:?}")]
    ReservedLineStart { field: &'static str, text: String },
    #[error(transparent)]
    UnknownStance(#[from] UnknownStance),
    #[error("overlaps with part \"{name}\" ({start}-{end})")]
    Overlap {
        id: String,
        name: String,
        start: f64,
        end: f64,
    },
    #[error("a move named \"{0}\" already exists")]
    DuplicateMoveName(String),
}

/// Check the per-part rules that don't depend on sibling parts.
pub fn validate_part(name: &str, range: TimeRange) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyPartName);
    }
    check_single_line("part name", name)?;
    for time in [range.start, range.end] {
        // Part lines only accept plain unsigned decimals, so -0 is out too.
        if !time.is_nan() && (!time.is_finite() || time.is_sign_negative()) {
            return Err(ValidationError::InvalidTime(time));
        }
    }
    // Written so that NaN on either side fails.
    if !(range.end > range.start) {
        return Err(ValidationError::InvalidTimeRange {
            start: range.start,
            end: range.end,
        });
    }
    Ok(())
}

/// First part whose interval overlaps `candidate`, skipping `ignore_id`
/// (the part being edited).
pub fn find_overlap<'a>(
    candidate: TimeRange,
    existing: &'a [SongPart],
    ignore_id: Option<&str>,
) -> Option<&'a SongPart> {
    existing
        .iter()
        .filter(|p| Some(p.id.as_str()) != ignore_id)
        .find(|p| candidate.overlaps(&p.range()))
}

/// [`find_overlap`] as a validation result naming the colliding part.
pub fn check_overlap(
    candidate: TimeRange,
    existing: &[SongPart],
    ignore_id: Option<&str>,
) -> Result<(), ValidationError> {
    match find_overlap(candidate, existing, ignore_id) {
        Some(p) => Err(ValidationError::Overlap {
            id: p.id.clone(),
            name: p.name.clone(),
            start: p.start_time,
            end: p.end_time,
        }),
        None => Ok(()),
    }
}

/// Text stored on one line of a `.song` or `.moves` file.
pub fn check_single_line(field: &'static str, text: &str) -> Result<(), ValidationError> {
    if text.contains(['\n', '\r']) {
        Err(ValidationError::LineBreak(field))
    } else {
        Ok(())
    }
}

pub fn validate_move_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyMoveName);
    }
    check_single_line("move name", name)
}

/// A description line must not read back as a header or an id line.
pub fn validate_description(description: &str) -> Result<(), ValidationError> {
    check_single_line("description", description)?;
    check_line_start("description", description)
}

/// Everything a move block needs to parse back to the same move.
pub fn validate_move(mv: &Move) -> Result<(), ValidationError> {
    validate_move_name(&mv.name)?;
    validate_description(&mv.description)?;
    let tags = join_tags(&mv.tags);
    check_single_line("tags", &tags)?;
    check_line_start("tags", &tags)
}

fn check_line_start(field: &'static str, text: &str) -> Result<(), ValidationError> {
    if text.trim_start().starts_with(['#', '@']) {
        Err(ValidationError::ReservedLineStart {
            field,
            text: text.to_string(),
        })
    } else {
        Ok(())
    }
}

/// Existing move with the same name, ignoring case.
pub fn find_duplicate_name<'a>(name: &str, moves: &'a [Move]) -> Option<&'a Move> {
    let wanted = name.trim().to_lowercase();
    moves.iter().find(|m| m.name.trim().to_lowercase() == wanted)
}

pub fn check_duplicate_name(name: &str, moves: &[Move]) -> Result<(), ValidationError> {
    match find_duplicate_name(name, moves) {
        Some(existing) => Err(ValidationError::DuplicateMoveName(existing.name.clone())),
        None => Ok(()),
    }
}
