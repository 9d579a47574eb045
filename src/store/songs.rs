use std::path::{Path, PathBuf};

use super::{Result, StoreError, read_optional, with_file_lock, write_atomic};
use crate::SONG_EXTENSION;
use crate::dsl::{ParsedSong, SongFile, SongPart, Stance, TimeRange, new_id, parse_song, serialize_song};
use crate::validate::{check_overlap, check_single_line, validate_part};

/// Fields for a new part. The id is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewPart {
    pub name: String,
    pub start_time: f64,
    pub end_time: f64,
    pub stance: Stance,
}

/// Partial edit of a part; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct PartUpdate {
    pub name: Option<String>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub stance: Option<Stance>,
}

/// Make a song title safe to use as a file stem.
///
/// Path separators, characters Windows rejects and control characters become
/// `_`; surrounding whitespace and dots are trimmed. Empty input yields `untitled`.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Directory of `.song` files, one per song.
pub struct SongStore {
    dir: PathBuf,
}

impl SongStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the `.song` file for an audio `filepath` (same file stem).
    pub fn song_path(&self, filepath: &str) -> PathBuf {
        let stem = Path::new(filepath)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        self.dir
            .join(format!("{}.{SONG_EXTENSION}", sanitize_title(&stem)))
    }

    /// Write a brand-new song file. Fails if one already exists for its filepath.
    pub fn create(&self, song: &SongFile) -> Result<PathBuf> {
        check_single_line("song name", &song.name)?;
        check_single_line("artist", &song.artist)?;
        check_single_line("filepath", &song.filepath)?;
        for part in &song.parts {
            validate_part(&part.name, part.range())?;
        }

        let path = self.song_path(&song.filepath);
        with_file_lock(&path, || {
            if path.exists() {
                return Err(StoreError::AlreadyExists(path.clone()));
            }
            let mut song = song.clone();
            song.sort_parts();
            write_atomic(&path, &serialize_song(&song))?;
            log::info!("Created {}", path.display());
            Ok(path.clone())
        })
    }

    /// Read and parse a song file, logging any part lines that were dropped.
    pub fn load(&self, path: &Path) -> Result<ParsedSong> {
        let text = read_optional(path)?.ok_or_else(|| StoreError::NotFound {
            kind: "song file",
            id: path.display().to_string(),
        })?;
        let parsed = parse_song(&text);
        for skipped in &parsed.skipped {
            log::warn!(
                "{}:{}: unreadable part line skipped: {:?}",
                path.display(),
                skipped.line,
                skipped.content
            );
        }
        Ok(parsed)
    }

    /// Read-modify-write under the path lock. `f` errors leave the file untouched.
    fn modify<T>(&self, path: &Path, f: impl FnOnce(&mut SongFile) -> Result<T>) -> Result<T> {
        with_file_lock(path, || {
            let mut song = self.load(path)?.song;
            let out = f(&mut song)?;
            song.sort_parts();
            write_atomic(path, &serialize_song(&song))?;
            Ok(out)
        })
    }

    pub fn add_part(&self, path: &Path, new: NewPart) -> Result<SongPart> {
        let name = new.name.trim().to_string();
        let range = TimeRange::new(new.start_time, new.end_time);
        validate_part(&name, range)?;

        self.modify(path, |song| {
            check_overlap(range, &song.parts, None)?;
            let part = SongPart {
                id: new_id(),
                name,
                start_time: new.start_time,
                end_time: new.end_time,
                stance: new.stance,
            };
            song.parts.push(part.clone());
            log::info!("Added part {:?} ({}) to {}", part.name, part.id, path.display());
            Ok(part)
        })
    }

    /// Apply a partial edit. The part keeps its id.
    pub fn update_part(&self, path: &Path, id: &str, update: PartUpdate) -> Result<SongPart> {
        self.modify(path, |song| {
            let current = song.find_part(id).ok_or_else(|| StoreError::NotFound {
                kind: "part",
                id: id.to_string(),
            })?;

            let edited = SongPart {
                id: current.id.clone(),
                name: update
                    .name
                    .map(|n| n.trim().to_string())
                    .unwrap_or_else(|| current.name.clone()),
                start_time: update.start_time.unwrap_or(current.start_time),
                end_time: update.end_time.unwrap_or(current.end_time),
                stance: update.stance.unwrap_or(current.stance),
            };
            validate_part(&edited.name, edited.range())?;
            check_overlap(edited.range(), &song.parts, Some(id))?;

            if let Some(slot) = song.parts.iter_mut().find(|p| p.id == id) {
                *slot = edited.clone();
            }
            log::info!("Updated part {:?} ({}) in {}", edited.name, id, path.display());
            Ok(edited)
        })
    }

    pub fn remove_part(&self, path: &Path, id: &str) -> Result<SongPart> {
        self.modify(path, |song| {
            let idx = song
                .parts
                .iter()
                .position(|p| p.id == id)
                .ok_or_else(|| StoreError::NotFound {
                    kind: "part",
                    id: id.to_string(),
                })?;
            let removed = song.parts.remove(idx);
            log::info!("Removed part {:?} ({}) from {}", removed.name, id, path.display());
            Ok(removed)
        })
    }

    /// Delete a song file. Returns false if it did not exist.
    pub fn delete(&self, path: &Path) -> Result<bool> {
        with_file_lock(path, || match std::fs::remove_file(path) {
            Ok(()) => {
                log::info!("Deleted {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        })
    }
}
