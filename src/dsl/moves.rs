use thiserror::Error;

use super::new_id;
use super::text::{join_tags, normalize_description, parse_tags};

/// A reusable technique in the move library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Move {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl Move {
    /// Tag match ignoring case.
    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = tag.to_lowercase();
        self.tags.iter().any(|t| t.to_lowercase() == wanted)
    }
}

/// Structural problem in a `.moves` file. Line numbers are 1-based.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoveFileError {
    #[error("line {line}: found new move before @id for {name}")]
    UnterminatedBlock { line: usize, name: String },
    #[error("line {line}: @id without an open move block")]
    StrayId { line: usize },
    #[error("line {line}: unexpected content outside a block")]
    ContentOutsideBlock { line: usize },
    #[error("line {line}: file ended without @id for {name}")]
    MissingId { line: usize, name: String },
}

impl MoveFileError {
    pub fn line(&self) -> usize {
        match self {
            Self::UnterminatedBlock { line, .. }
            | Self::StrayId { line }
            | Self::ContentOutsideBlock { line }
            | Self::MissingId { line, .. } => *line,
        }
    }
}

fn header_name(line: &str) -> String {
    match line.trim().strip_prefix('#') {
        Some(rest) => rest.trim().to_string(),
        None => line.trim().to_string(),
    }
}

fn build_move(id: String, name: String, description: Option<&str>, tags: Option<&str>) -> Move {
    Move {
        id,
        name,
        description: normalize_description(description.unwrap_or_default()),
        tags: parse_tags(tags.unwrap_or_default()),
    }
}

/// Parse a single client-submitted block (`# name`, description, tags) and
/// assign it a fresh id. The name is not validated here.
pub fn parse_block(text: &str) -> Move {
    let mut lines = text.trim().lines();
    let name = lines.next().map(header_name).unwrap_or_default();
    let description = lines.next();
    let tags = lines.next();
    build_move(new_id(), name, description, tags)
}

/// Three-line display form, without the id line.
pub fn serialize_block(mv: &Move) -> String {
    format!("# {}\n{}\n{}", mv.name, mv.description, join_tags(&mv.tags))
}

/// Block currently being collected.
struct OpenBlock<'a> {
    line: usize,
    name: String,
    content: Vec<&'a str>,
}

enum State<'a> {
    Outside,
    InBlock(OpenBlock<'a>),
}

/// Parse a whole `.moves` file. Any structural problem fails the parse; no
/// partial list is returned.
pub fn parse_moves(content: &str) -> Result<Vec<Move>, MoveFileError> {
    let mut moves = Vec::new();
    let mut state = State::Outside;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();

        state = match state {
            State::Outside => {
                if line.is_empty() {
                    State::Outside
                } else if line.starts_with('#') {
                    State::InBlock(OpenBlock {
                        line: line_no,
                        name: header_name(line),
                        content: Vec::new(),
                    })
                } else if line.starts_with('@') {
                    return Err(MoveFileError::StrayId { line: line_no });
                } else {
                    return Err(MoveFileError::ContentOutsideBlock { line: line_no });
                }
            }
            State::InBlock(mut block) => {
                if line.starts_with('#') {
                    return Err(MoveFileError::UnterminatedBlock {
                        line: line_no,
                        name: block.name,
                    });
                } else if let Some(id) = line.strip_prefix('@') {
                    if block.content.len() > 2 {
                        log::debug!(
                            "move {:?} (line {}): ignoring {} extra line(s)",
                            block.name,
                            block.line,
                            block.content.len() - 2
                        );
                    }
                    moves.push(build_move(
                        id.to_string(),
                        block.name,
                        block.content.first().copied(),
                        block.content.get(1).copied(),
                    ));
                    State::Outside
                } else {
                    block.content.push(raw);
                    State::InBlock(block)
                }
            }
        };
    }

    if let State::InBlock(block) = state {
        return Err(MoveFileError::MissingId {
            line: block.line,
            name: block.name,
        });
    }

    Ok(moves)
}

/// Serialize the whole library: blocks closed by `@id`, separated by a blank
/// line, trailing newline.
pub fn serialize_moves(moves: &[Move]) -> String {
    let mut out = moves
        .iter()
        .map(|mv| format!("{}\n@{}", serialize_block(mv), mv.id))
        .collect::<Vec<_>>()
        .join("\n\n");
    out.push('\n');
    out
}
