//! Plain-text formats for songs (`.song`) and the move library (`.moves`).
//!
//! Both formats are line oriented and share the helpers in [`text`]. The song
//! grammar is best-effort: unreadable part lines are skipped and reported. The
//! moves grammar is strict: any structural problem fails the whole parse.

pub mod moves;
pub mod song;
pub mod text;

pub use moves::{Move, MoveFileError, parse_block, parse_moves, serialize_block, serialize_moves};
pub use song::{
    ParsedSong, SkippedLine, SongFile, SongPart, Stance, TimeRange, parse_song, serialize_song,
};
pub use text::{join_tags, normalize_description, parse_tags};

/// Generate a fresh stable id (32 lowercase hex chars, URL-safe).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
