use super::models::{NewSong, SongRecord};
use super::{Database, Result};
use rusqlite::{OptionalExtension, params};

const SONG_COLUMNS: &str = "id, name, artist, filepath, duration, bpm, created_at";

fn song_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SongRecord> {
    Ok(SongRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        artist: row.get(2)?,
        filepath: row.get(3)?,
        duration: row.get(4)?,
        bpm: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// SQLite stores NaN as NULL, which the NOT NULL columns refuse.
fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

impl Database {
    /// Insert a song row. Returns the new id.
    pub fn insert_song(&self, s: &NewSong) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO songs (name, artist, filepath, duration, bpm)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                s.name,
                s.artist,
                s.filepath,
                finite_or_zero(s.duration),
                finite_or_zero(s.bpm),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_song(&self, id: i64) -> Result<Option<SongRecord>> {
        let song = self
            .conn
            .query_row(
                &format!("SELECT {SONG_COLUMNS} FROM songs WHERE id = ?1"),
                params![id],
                song_from_row,
            )
            .optional()?;
        Ok(song)
    }

    pub fn find_song_by_filepath(&self, filepath: &str) -> Result<Option<SongRecord>> {
        let song = self
            .conn
            .query_row(
                &format!("SELECT {SONG_COLUMNS} FROM songs WHERE filepath = ?1"),
                params![filepath],
                song_from_row,
            )
            .optional()?;
        Ok(song)
    }

    /// All songs ordered by name (case-insensitive), then id.
    pub fn list_songs(&self) -> Result<Vec<SongRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SONG_COLUMNS} FROM songs ORDER BY name COLLATE NOCASE, id"
        ))?;

        let songs = stmt
            .query_map([], song_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(songs)
    }

    /// Delete a song row. Returns false if no row had that id.
    pub fn delete_song(&self, id: i64) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM songs WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    pub fn get_state(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM app_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_state(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO app_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}
