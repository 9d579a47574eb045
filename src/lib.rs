pub mod beats;
pub mod config;
pub mod db;
pub mod dsl;
pub mod library;
pub mod store;
pub mod suggest;
pub mod validate;

/// Audio file extensions accepted by `import`
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "aac", "opus", "ogg", "flac", "wav", "webm",
];

/// Extension of per-song files
pub const SONG_EXTENSION: &str = "song";

/// Default name of the move library file
pub const MOVES_FILE_NAME: &str = "all.moves";

/// Application name for XDG paths
pub const APP_NAME: &str = "choreo";
