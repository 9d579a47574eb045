//! Library layout and the multi-step operations that touch both the metadata
//! database and the files: import, delete, reindex and integrity checks.
//!
//! ```text
//! <library>/
//!   choreo.db
//!   all.moves
//!   audio/<title>.<ext>
//!   songs/<title>.song
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use walkdir::WalkDir;

use crate::beats::{self, BeatAnalysis};
use crate::config::BeatConfig;
use crate::db::Database;
use crate::db::models::{NewSong, SongRecord};
use crate::dsl::{SkippedLine, SongFile};
use crate::store::{MoveStore, SongStore, sanitize_title};
use crate::validate::check_single_line;
use crate::{SONG_EXTENSION, SUPPORTED_EXTENSIONS};

const AUDIO_DIR: &str = "audio";
const SONGS_DIR: &str = "songs";

pub struct Library {
    root: PathBuf,
    pub songs: SongStore,
    pub moves: MoveStore,
}

impl Library {
    pub fn open(root: impl Into<PathBuf>, moves_file: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            songs: SongStore::new(root.join(SONGS_DIR)),
            moves: MoveStore::new(moves_file),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join(AUDIO_DIR)
    }

    /// `.song` file for a metadata row.
    pub fn song_file(&self, record: &SongRecord) -> PathBuf {
        self.songs.song_path(&record.filepath)
    }

    /// Pick a stem free in both `audio/` and `songs/`: "title", "title-1", ...
    fn unique_stem(&self, title: &str, ext: &str) -> Result<String> {
        let base = sanitize_title(title);
        let taken = |stem: &str| {
            self.audio_dir().join(format!("{stem}.{ext}")).exists()
                || self.songs.dir().join(format!("{stem}.{SONG_EXTENSION}")).exists()
        };
        if !taken(&base) {
            return Ok(base);
        }
        for counter in 1..1000 {
            let candidate = format!("{base}-{counter}");
            if !taken(&candidate) {
                return Ok(candidate);
            }
        }
        bail!("Too many songs named \"{base}\"")
    }
}

/// Where the beats of an imported song come from.
pub enum BeatSource {
    /// Run the configured detector on the copied audio
    Detect,
    /// Read detector JSON saved earlier
    File(PathBuf),
    /// Leave bpm at 0 and beats empty
    Skip,
}

pub struct ImportOptions {
    pub audio: PathBuf,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub beats: BeatSource,
}

pub struct ImportResult {
    pub id: i64,
    pub song_path: PathBuf,
    pub song: SongFile,
}

/// Copy an audio file into the library, analyze it and register the song.
pub fn import_song(
    db: &Database,
    library: &Library,
    opts: ImportOptions,
    tools: &BeatConfig,
) -> Result<ImportResult> {
    let ext = opts
        .audio
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        bail!("Unsupported audio format: {}", opts.audio.display());
    }

    let title = opts
        .title
        .clone()
        .or_else(|| {
            opts.audio
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
        })
        .unwrap_or_default();
    check_single_line("song name", &title)?;
    if let Some(artist) = &opts.artist {
        check_single_line("artist", artist)?;
    }
    let stem = library.unique_stem(&title, &ext)?;

    let audio_dest = library.audio_dir().join(format!("{stem}.{ext}"));
    std::fs::create_dir_all(library.audio_dir())
        .with_context(|| format!("Failed to create {}", library.audio_dir().display()))?;
    std::fs::copy(&opts.audio, &audio_dest).with_context(|| {
        format!("Failed to copy {} -> {}", opts.audio.display(), audio_dest.display())
    })?;
    let filepath = format!("{AUDIO_DIR}/{stem}.{ext}");

    let duration = match beats::probe_duration(&tools.ffprobe, &audio_dest) {
        Ok(d) => d,
        Err(e) => {
            log::warn!("Could not read duration of {}: {e}", audio_dest.display());
            0.0
        }
    };

    let analysis = match &opts.beats {
        BeatSource::Detect => beats::detect_beats(&tools.command, &audio_dest).unwrap_or_else(|e| {
            log::warn!("Beat detection failed for {}: {e}", audio_dest.display());
            BeatAnalysis::default()
        }),
        BeatSource::File(path) => beats::load_beat_file(path)
            .with_context(|| format!("Failed to load beats from {}", path.display()))?,
        BeatSource::Skip => BeatAnalysis::default(),
    };

    let song = SongFile {
        name: title.trim().to_string(),
        artist: opts
            .artist
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| "unknown".to_string()),
        duration,
        bpm: analysis.bpm,
        filepath: filepath.clone(),
        beats: analysis.beats,
        parts: Vec::new(),
    };

    let song_path = match library.songs.create(&song) {
        Ok(path) => path,
        Err(e) => {
            std::fs::remove_file(&audio_dest).ok();
            return Err(e).context("Failed to write song file");
        }
    };
    let inserted = db.insert_song(&NewSong {
        name: song.name.clone(),
        artist: song.artist.clone(),
        filepath,
        duration: song.duration,
        bpm: song.bpm,
    });
    let id = match inserted {
        Ok(id) => id,
        Err(e) => {
            library.songs.delete(&song_path).ok();
            std::fs::remove_file(&audio_dest).ok();
            return Err(e).context("Failed to register song");
        }
    };

    log::info!("Imported \"{}\" as song {id}", song.name);
    Ok(ImportResult { id, song_path, song })
}

/// Look up a song row and its `.song` file.
pub fn find_song(db: &Database, library: &Library, id: i64) -> Result<(SongRecord, PathBuf)> {
    let record = db
        .get_song(id)
        .context("Query failed")?
        .with_context(|| format!("No song with id {id}"))?;
    let path = library.song_file(&record);
    Ok((record, path))
}

/// Remove the row, the `.song` file and the audio. Returns false if the id was unknown.
pub fn delete_song(db: &Database, library: &Library, id: i64) -> Result<bool> {
    let Some(record) = db.get_song(id).context("Query failed")? else {
        return Ok(false);
    };
    db.delete_song(id).context("Failed to delete song row")?;

    let song_path = library.song_file(&record);
    if !library.songs.delete(&song_path)? {
        log::warn!("Song file {} was already missing", song_path.display());
    }
    let audio = library.root().join(&record.filepath);
    match std::fs::remove_file(&audio) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("Audio file {} was already missing", audio.display());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to remove {}", audio.display()));
        }
    }
    log::info!("Deleted song {id} (\"{}\")", record.name);
    Ok(true)
}

fn song_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(SONG_EXTENSION))
        .collect();
    files.sort();
    files
}

pub struct ReindexResult {
    pub scanned: u64,
    pub added: u64,
    pub skipped: u64,
    pub errors: u64,
}

/// Register `.song` files that have no metadata row.
pub fn reindex(db: &Database, library: &Library) -> Result<ReindexResult> {
    let files = song_files(library.songs.dir());

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_message("Reindexing...");

    let mut result = ReindexResult {
        scanned: 0,
        added: 0,
        skipped: 0,
        errors: 0,
    };

    for path in &files {
        result.scanned += 1;
        pb.inc(1);

        let song = match library.songs.load(path) {
            Ok(parsed) => parsed.song,
            Err(e) => {
                log::warn!("Error reading {}: {e}", path.display());
                result.errors += 1;
                continue;
            }
        };
        if song.filepath.is_empty() || library.songs.song_path(&song.filepath) != *path {
            log::warn!(
                "{}: filepath {:?} does not point back to this file, skipping",
                path.display(),
                song.filepath
            );
            result.errors += 1;
            continue;
        }
        if db.find_song_by_filepath(&song.filepath)?.is_some() {
            result.skipped += 1;
            continue;
        }

        db.insert_song(&NewSong {
            name: song.name.clone(),
            artist: song.artist.clone(),
            filepath: song.filepath.clone(),
            duration: song.duration,
            bpm: song.bpm,
        })?;
        log::info!("Registered {}", path.display());
        result.added += 1;
    }

    pb.finish_with_message(format!(
        "Done: {} added, {} skipped, {} errors",
        result.added, result.skipped, result.errors
    ));
    Ok(result)
}

/// Integrity report over every file in the library.
pub struct CheckReport {
    pub songs_checked: usize,
    pub skipped_lines: Vec<(PathBuf, SkippedLine)>,
    pub unreadable_songs: Vec<(PathBuf, String)>,
    /// Number of moves, or the fatal parse error
    pub moves: std::result::Result<usize, String>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.skipped_lines.is_empty() && self.unreadable_songs.is_empty() && self.moves.is_ok()
    }
}

pub fn check(library: &Library) -> CheckReport {
    let mut report = CheckReport {
        songs_checked: 0,
        skipped_lines: Vec::new(),
        unreadable_songs: Vec::new(),
        moves: Ok(0),
    };

    for path in song_files(library.songs.dir()) {
        report.songs_checked += 1;
        match library.songs.load(&path) {
            Ok(parsed) => {
                report
                    .skipped_lines
                    .extend(parsed.skipped.into_iter().map(|s| (path.clone(), s)));
            }
            Err(e) => report.unreadable_songs.push((path, e.to_string())),
        }
    }

    report.moves = library
        .moves
        .load()
        .map(|m| m.len())
        .map_err(|e| e.to_string());
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, Library, Database) {
        let dir = tempfile::tempdir().unwrap();
        let library = Library::open(dir.path().join("lib"), dir.path().join("lib").join("all.moves"));
        let db = Database::open_in_memory().unwrap();
        (dir, library, db)
    }

    fn tools() -> BeatConfig {
        BeatConfig {
            command: vec!["choreo-no-such-detector".to_string()],
            ffprobe: "choreo-no-such-ffprobe".to_string(),
        }
    }

    fn audio_fixture(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"not really audio").unwrap();
        path
    }

    #[test]
    fn test_import_with_beat_file() {
        let (dir, library, db) = setup();
        let audio = audio_fixture(dir.path(), "Eye: Tiger.mp3");
        let beats = dir.path().join("beats.json");
        std::fs::write(&beats, r#"{"bpm": 109.0, "beats": [0.55, 1.1]}"#).unwrap();

        let result = import_song(
            &db,
            &library,
            ImportOptions {
                audio,
                title: None,
                artist: Some("Survivor".to_string()),
                beats: BeatSource::File(beats),
            },
            &tools(),
        )
        .unwrap();

        assert_eq!(result.song.filepath, "audio/Eye_ Tiger.mp3");
        assert_eq!(result.song.duration, 0.0);
        assert!(library.root().join("audio/Eye_ Tiger.mp3").exists());

        let record = db.get_song(result.id).unwrap().unwrap();
        assert_eq!(record.artist, "Survivor");
        assert_eq!(library.song_file(&record), result.song_path);

        let stored = library.songs.load(&result.song_path).unwrap().song;
        assert_eq!(stored.bpm, 109.0);
        assert_eq!(stored.beats, vec![0.55, 1.1]);
        assert_eq!(stored.name, "Eye: Tiger");
    }

    #[test]
    fn test_import_detector_failure_is_soft_and_names_are_unique() {
        let (dir, library, db) = setup();
        let audio = audio_fixture(dir.path(), "song.wav");
        let opts = || ImportOptions {
            audio: audio.clone(),
            title: Some("Same".to_string()),
            artist: None,
            beats: BeatSource::Detect,
        };

        let first = import_song(&db, &library, opts(), &tools()).unwrap();
        let second = import_song(&db, &library, opts(), &tools()).unwrap();
        assert_eq!(first.song.artist, "unknown");
        assert_eq!(first.song.bpm, 0.0);
        assert!(first.song.beats.is_empty());
        assert_eq!(first.song.filepath, "audio/Same.wav");
        assert_eq!(second.song.filepath, "audio/Same-1.wav");
        assert_eq!(db.list_songs().unwrap().len(), 2);
    }

    #[test]
    fn test_import_rejects_unknown_extension() {
        let (dir, library, db) = setup();
        let audio = audio_fixture(dir.path(), "notes.txt");
        let opts = ImportOptions {
            audio,
            title: None,
            artist: None,
            beats: BeatSource::Skip,
        };
        assert!(import_song(&db, &library, opts, &tools()).is_err());
    }

    #[test]
    fn test_import_rejects_multiline_title_before_copying() {
        let (dir, library, db) = setup();
        let audio = audio_fixture(dir.path(), "x.mp3");
        let opts = ImportOptions {
            audio,
            title: Some("Intro\nartist evil".to_string()),
            artist: None,
            beats: BeatSource::Skip,
        };
        assert!(import_song(&db, &library, opts, &tools()).is_err());
        assert!(!library.audio_dir().exists());
        assert!(db.list_songs().unwrap().is_empty());
    }

    #[test]
    fn test_delete_song_removes_everything() {
        let (dir, library, db) = setup();
        let audio = audio_fixture(dir.path(), "gone.mp3");
        let opts = ImportOptions {
            audio,
            title: None,
            artist: None,
            beats: BeatSource::Skip,
        };
        let result = import_song(&db, &library, opts, &tools()).unwrap();

        assert!(delete_song(&db, &library, result.id).unwrap());
        assert!(!result.song_path.exists());
        assert!(!library.root().join("audio/gone.mp3").exists());
        assert!(db.get_song(result.id).unwrap().is_none());
        assert!(!delete_song(&db, &library, result.id).unwrap());
    }

    #[test]
    fn test_reindex_registers_orphans() {
        let (_dir, library, db) = setup();
        let song = SongFile {
            name: "Orphan".to_string(),
            filepath: "audio/Orphan.mp3".to_string(),
            ..SongFile::default()
        };
        library.songs.create(&song).unwrap();
        std::fs::write(library.songs.dir().join("stray.song"), "name Stray\nfilepath audio/x.mp3\n").unwrap();

        let result = reindex(&db, &library).unwrap();
        assert_eq!(result.scanned, 2);
        assert_eq!(result.added, 1);
        assert_eq!(result.errors, 1);

        let again = reindex(&db, &library).unwrap();
        assert_eq!(again.added, 0);
        assert_eq!(again.skipped, 1);
    }

    #[test]
    fn test_check_reports_problems() {
        let (_dir, library, _db) = setup();
        std::fs::create_dir_all(library.songs.dir()).unwrap();
        std::fs::write(
            library.songs.dir().join("a.song"),
            "name A\n\n#BODY\nparts:\n0 1 Right Ok @1\nbroken line\n",
        )
        .unwrap();
        std::fs::write(library.root().join("all.moves"), "# a\nno id\n").unwrap();

        let report = check(&library);
        assert_eq!(report.songs_checked, 1);
        assert_eq!(report.skipped_lines.len(), 1);
        assert_eq!(report.skipped_lines[0].1.line, 6);
        assert!(report.moves.unwrap_err().contains("file ended without @id"));
    }

    #[test]
    fn test_check_clean_library() {
        let (_dir, library, _db) = setup();
        let report = check(&library);
        assert!(report.is_clean());
        assert_eq!(report.songs_checked, 0);
    }
}
