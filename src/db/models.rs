/// Data for inserting a song row (import phase).
pub struct NewSong {
    pub name: String,
    pub artist: String,
    pub filepath: String,
    pub duration: f64,
    pub bpm: f64,
}

/// A song row read from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct SongRecord {
    pub id: i64,
    pub name: String,
    pub artist: String,
    /// Audio path relative to the library directory; also locates the `.song` file
    pub filepath: String,
    pub duration: f64,
    pub bpm: f64,
    pub created_at: String,
}
