use anyhow::{Context, Result};
use choreo::db::Database;
use choreo::db::models::SongRecord;
use choreo::dsl::{Move, SongFile, Stance, join_tags, serialize_block};
use choreo::library::{self, BeatSource, ImportOptions, Library};
use choreo::store::{MoveFilter, NewPart, PartUpdate};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

/// app_state key holding the next suggestion model index
const ROTATION_KEY: &str = "suggest_rotation";

#[derive(Parser)]
#[command(name = "choreo", version, about = "Fight choreography notebook: songs, parts and moves")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Library directory (songs/, audio/, all.moves)
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy an audio file into the library and create its song file
    Import {
        /// Audio file to import
        audio: PathBuf,

        /// Song title (defaults to the file name)
        #[arg(short, long)]
        title: Option<String>,

        /// Artist name
        #[arg(short, long)]
        artist: Option<String>,

        /// Read beats from detector JSON instead of running the detector
        #[arg(long, conflicts_with = "no_beats")]
        beats_json: Option<PathBuf>,

        /// Skip beat detection entirely
        #[arg(long)]
        no_beats: bool,
    },

    /// List songs in the library
    Songs,

    /// Show a song with its parts
    Show {
        /// Song id
        id: i64,
    },

    /// Delete a song, its song file and its audio
    Delete {
        /// Song id
        id: i64,
    },

    /// Edit the timed parts of a song
    Part {
        #[command(subcommand)]
        command: PartCommand,
    },

    /// Manage the move library
    Move {
        #[command(subcommand)]
        command: MoveCommand,
    },

    /// Register song files that are missing from the database
    Reindex,

    /// Parse every library file and report problems
    Check,
}

#[derive(Subcommand)]
enum PartCommand {
    /// Add a part to a song
    Add {
        /// Song id
        song: i64,
        /// Part name
        name: String,
        /// Start time in seconds
        start: f64,
        /// End time in seconds
        end: f64,
        /// Right, Left or Centered
        #[arg(short, long, default_value = "Centered")]
        stance: String,
    },

    /// Change fields of an existing part
    Edit {
        /// Song id
        song: i64,
        /// Part id
        part: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        start: Option<f64>,
        #[arg(long)]
        end: Option<f64>,
        #[arg(long)]
        stance: Option<String>,
    },

    /// Remove a part
    Rm {
        /// Song id
        song: i64,
        /// Part id
        part: String,
    },
}

#[derive(Subcommand)]
enum MoveCommand {
    /// List moves, optionally filtered
    List {
        /// Only moves with this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Substring of name or description
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Print one move as a block
    Show {
        /// Move id
        id: String,
    },

    /// Add a move from a block ("# name", description, tags) on stdin or --file
    Add {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Replace a move from a block on stdin or --file
    Edit {
        /// Move id
        id: String,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Remove a move
    Rm {
        /// Move id
        id: String,
    },

    /// Ask a local Ollama model for a description
    Suggest {
        /// Move id
        id: String,

        /// Store the suggestion as the move's description
        #[arg(long)]
        apply: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = choreo::config::AppConfig::load();

    // Resolve paths: CLI > config > XDG default
    let library_dir = config.resolve_library_dir(cli.library);
    let db_path = config.resolve_db_path(cli.db_path, &library_dir);
    let moves_file = config.resolve_moves_file(&library_dir);
    log::info!("Library: {}", library_dir.display());
    log::info!("Database: {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let db = Database::open(&db_path).context("Failed to open database")?;
    let lib = Library::open(&library_dir, moves_file);

    match cli.command {
        Commands::Import {
            audio,
            title,
            artist,
            beats_json,
            no_beats,
        } => {
            let beats = match (beats_json, no_beats) {
                (Some(path), _) => BeatSource::File(path),
                (None, true) => BeatSource::Skip,
                (None, false) => BeatSource::Detect,
            };
            let result = library::import_song(
                &db,
                &lib,
                ImportOptions {
                    audio,
                    title,
                    artist,
                    beats,
                },
                &config.beats,
            )
            .context("Import failed")?;
            println!(
                "Imported song {}: {} ({:.1}s, {:.0} bpm, {} beats)",
                result.id,
                result.song.name,
                result.song.duration,
                result.song.bpm,
                result.song.beats.len()
            );
            println!("  {}", result.song_path.display());
        }

        Commands::Songs => {
            let songs = db.list_songs()?;
            if songs.is_empty() {
                println!("No songs. Use `choreo import <audio>` to add one.");
            } else {
                print_song_table(&songs);
            }
        }

        Commands::Show { id } => {
            let (record, path) = library::find_song(&db, &lib, id)?;
            let song = lib.songs.load(&path)?.song;
            print_song(&record, &song);
        }

        Commands::Delete { id } => {
            if library::delete_song(&db, &lib, id)? {
                println!("Deleted song {id}");
            } else {
                anyhow::bail!("No song with id {id}");
            }
        }

        Commands::Part { command } => run_part(&db, &lib, command)?,

        Commands::Move { command } => run_move(&db, &lib, &config, command)?,

        Commands::Reindex => {
            let result = library::reindex(&db, &lib).context("Reindex failed")?;
            println!(
                "Reindex complete: {} scanned, {} added, {} already known, {} errors",
                result.scanned, result.added, result.skipped, result.errors
            );
        }

        Commands::Check => {
            let report = library::check(&lib);
            for (path, skipped) in &report.skipped_lines {
                println!("{}:{}: unreadable part line: {}", path.display(), skipped.line, skipped.content);
            }
            for (path, err) in &report.unreadable_songs {
                println!("{}: {err}", path.display());
            }
            match &report.moves {
                Ok(count) => println!("{}: {count} moves", lib.moves.path().display()),
                Err(e) => println!("{}: {e}", lib.moves.path().display()),
            }
            println!("{} song files checked", report.songs_checked);
            if !report.is_clean() {
                anyhow::bail!("Library has problems");
            }
        }
    }

    Ok(())
}

fn run_part(db: &Database, lib: &Library, command: PartCommand) -> Result<()> {
    match command {
        PartCommand::Add {
            song,
            name,
            start,
            end,
            stance,
        } => {
            let (_, path) = library::find_song(db, lib, song)?;
            let part = lib.songs.add_part(
                &path,
                NewPart {
                    name,
                    start_time: start,
                    end_time: end,
                    stance: stance.parse::<Stance>()?,
                },
            )?;
            println!("Added part {}: {part}", part.id);
        }

        PartCommand::Edit {
            song,
            part,
            name,
            start,
            end,
            stance,
        } => {
            let (_, path) = library::find_song(db, lib, song)?;
            let update = PartUpdate {
                name,
                start_time: start,
                end_time: end,
                stance: stance.map(|s| s.parse::<Stance>()).transpose()?,
            };
            let edited = lib.songs.update_part(&path, &part, update)?;
            println!("Updated part {}: {edited}", edited.id);
        }

        PartCommand::Rm { song, part } => {
            let (_, path) = library::find_song(db, lib, song)?;
            let removed = lib.songs.remove_part(&path, &part)?;
            println!("Removed part {} ({})", removed.id, removed.name);
        }
    }
    Ok(())
}

fn run_move(
    db: &Database,
    lib: &Library,
    config: &choreo::config::AppConfig,
    command: MoveCommand,
) -> Result<()> {
    match command {
        MoveCommand::List { tag, search } => {
            let moves = lib.moves.list(&MoveFilter { tag, search })?;
            if moves.is_empty() {
                println!("No matching moves.");
            } else {
                print_move_table(&moves);
            }
        }

        MoveCommand::Show { id } => {
            let mv = lib.moves.get(&id)?;
            println!("{}", serialize_block(&mv));
            println!("@{}", mv.id);
        }

        MoveCommand::Add { file } => {
            let block = read_block(file)?;
            let mv = lib.moves.create(&block)?;
            println!("Added move {} ({})", mv.id, mv.name);
        }

        MoveCommand::Edit { id, file } => {
            let block = read_block(file)?;
            let mv = lib.moves.update(&id, &block)?;
            println!("Updated move {} ({})", mv.id, mv.name);
        }

        MoveCommand::Rm { id } => {
            let mv = lib.moves.remove(&id)?;
            println!("Removed move {} ({})", mv.id, mv.name);
        }

        MoveCommand::Suggest { id, apply } => {
            let mv = lib.moves.get(&id)?;
            let counter = db
                .get_state(ROTATION_KEY)?
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);

            let suggester = choreo::suggest::Suggester::new(&config.suggest);
            let suggestion = suggester
                .suggest(&mv.name, &mv.tags, counter)
                .context("Suggestion failed")?;
            db.set_state(ROTATION_KEY, &suggestion.next_counter.to_string())?;

            println!("[{}] {}", suggestion.model, suggestion.description);
            if apply {
                lib.moves.set_description(&id, &suggestion.description)?;
                println!("Saved as description of {}", mv.name);
            }
        }
    }
    Ok(())
}

/// Block text from a file, or stdin when no file is given.
fn read_block(file: Option<PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read block from stdin")?;
            Ok(text)
        }
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let head: String = text.chars().take(width - 3).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn print_song_table(songs: &[SongRecord]) {
    println!(
        "{:>5}  {:<30} {:<20} {:>6} {:>5}",
        "Id", "Name", "Artist", "Min", "BPM"
    );
    println!("{}", "-".repeat(72));

    for s in songs {
        println!(
            "{:>5}  {:<30} {:<20} {:>6.1} {:>5.0}",
            s.id,
            truncate(&s.name, 30),
            truncate(&s.artist, 20),
            s.duration / 60.0,
            s.bpm,
        );
    }
}

fn print_song(record: &SongRecord, song: &SongFile) {
    println!("{} - {} (id {})", song.name, song.artist, record.id);
    println!(
        "  {:.1}s, {:.0} bpm, {} beats, {}",
        song.duration,
        song.bpm,
        song.beats.len(),
        song.filepath
    );
    println!("  added {}", record.created_at);

    if song.parts.is_empty() {
        println!("\nNo parts yet.");
        return;
    }

    println!();
    println!(
        "{:>8} {:>8}  {:<8} {:<30} {}",
        "Start", "End", "Stance", "Name", "Id"
    );
    println!("{}", "-".repeat(90));
    for p in &song.parts {
        println!(
            "{:>8.2} {:>8.2}  {:<8} {:<30} {}",
            p.start_time,
            p.end_time,
            p.stance.as_str(),
            truncate(&p.name, 30),
            p.id
        );
    }
}

fn print_move_table(moves: &[Move]) {
    println!("{:<24} {:<40} {:<20} {}", "Name", "Description", "Tags", "Id");
    println!("{}", "-".repeat(100));

    for m in moves {
        println!(
            "{:<24} {:<40} {:<20} {}",
            truncate(&m.name, 24),
            truncate(&m.description, 40),
            truncate(&join_tags(&m.tags), 20),
            m.id
        );
    }
}
