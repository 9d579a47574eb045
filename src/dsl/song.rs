use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Separates the metadata section from the structured body.
pub const BODY_SENTINEL: &str = "#BODY";

/// Switches the body into part-parsing mode.
pub const PARTS_MARKER: &str = "parts:";

const DEFAULT_ARTIST: &str = "unknown";

// <start> <end> <stance> <name> @<id>
// The name is non-greedy so that it stops at the last ` @token` on the line.
static PART_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<start>\d+(?:\.\d+)?)
        \s+(?P<end>\d+(?:\.\d+)?)
        \s+(?P<stance>Right|Left|Centered)
        \s+(?P<name>.+?)
        \s+@(?P<id>\S+)$",
    )
    .unwrap()
});

/// Orientation of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stance {
    Right,
    Left,
    Centered,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown stance {0:?} (expected Right, Left or Centered)")]
pub struct UnknownStance(pub String);

impl Stance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Right => "Right",
            Self::Left => "Left",
            Self::Centered => "Centered",
        }
    }
}

impl FromStr for Stance {
    type Err = UnknownStance;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Right" => Ok(Self::Right),
            "Left" => Ok(Self::Left),
            "Centered" => Ok(Self::Centered),
            other => Err(UnknownStance(other.to_string())),
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open time interval `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Touching endpoints (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }
}

/// A named, timed, stance-tagged segment of a song.
#[derive(Debug, Clone, PartialEq)]
pub struct SongPart {
    pub id: String,
    pub name: String,
    pub start_time: f64,
    pub end_time: f64,
    pub stance: Stance,
}

impl SongPart {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }
}

/// Renders the on-disk part line (without newline).
impl fmt::Display for SongPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} @{}",
            self.start_time, self.end_time, self.stance, self.name, self.id
        )
    }
}

/// Contents of one `.song` file.
#[derive(Debug, Clone, PartialEq)]
pub struct SongFile {
    pub name: String,
    pub artist: String,
    pub duration: f64,
    pub bpm: f64,
    pub filepath: String,
    pub beats: Vec<f64>,
    pub parts: Vec<SongPart>,
}

impl Default for SongFile {
    fn default() -> Self {
        Self {
            name: String::new(),
            artist: DEFAULT_ARTIST.to_string(),
            duration: 0.0,
            bpm: 0.0,
            filepath: String::new(),
            beats: Vec::new(),
            parts: Vec::new(),
        }
    }
}

impl SongFile {
    pub fn find_part(&self, id: &str) -> Option<&SongPart> {
        self.parts.iter().find(|p| p.id == id)
    }

    /// Order parts by start time (stable for equal starts).
    pub fn sort_parts(&mut self) {
        self.parts.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    }
}

/// A part line that could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number in the source text
    pub line: usize,
    pub content: String,
}

/// Result of the best-effort song parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSong {
    pub song: SongFile,
    pub skipped: Vec<SkippedLine>,
}

enum Section {
    Metadata,
    Body,
    Parts,
}

/// Lenient numeric parse: unreadable text becomes NaN.
fn parse_number(value: &str) -> f64 {
    value.parse().unwrap_or(f64::NAN)
}

fn parse_part_line(line: &str) -> Option<SongPart> {
    let caps = PART_LINE_RE.captures(line)?;
    Some(SongPart {
        id: caps["id"].to_string(),
        name: caps["name"].to_string(),
        start_time: caps["start"].parse().ok()?,
        end_time: caps["end"].parse().ok()?,
        stance: caps["stance"].parse().ok()?,
    })
}

/// Parse a `.song` file. Never fails; unreadable part lines are returned in
/// [`ParsedSong::skipped`]. Parts are kept in file order.
pub fn parse_song(content: &str) -> ParsedSong {
    let mut song = SongFile::default();
    let mut skipped = Vec::new();
    let mut section = Section::Metadata;

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();

        match section {
            Section::Metadata => {
                if line == BODY_SENTINEL {
                    section = Section::Body;
                    continue;
                }
                if line.is_empty() {
                    continue;
                }
                let (key, value) = match line.split_once(' ') {
                    Some((k, v)) => (k, v.trim()),
                    None => (line, ""),
                };
                match key.to_ascii_lowercase().as_str() {
                    "name" => song.name = value.to_string(),
                    "artist" => song.artist = value.to_string(),
                    "duration" => song.duration = parse_number(value),
                    "bpm" => song.bpm = parse_number(value),
                    "filepath" => song.filepath = value.to_string(),
                    "beats" => {
                        song.beats = value.split_whitespace().map(parse_number).collect();
                    }
                    other => log::trace!("ignoring unknown song key {other:?}"),
                }
            }
            Section::Body => {
                if line == PARTS_MARKER {
                    section = Section::Parts;
                }
            }
            Section::Parts => {
                if line.is_empty() {
                    continue;
                }
                match parse_part_line(line) {
                    Some(part) => song.parts.push(part),
                    None => skipped.push(SkippedLine {
                        line: idx + 1,
                        content: raw.to_string(),
                    }),
                }
            }
        }
    }

    ParsedSong { song, skipped }
}

/// Serialize a song to the `.song` text form. Always ends with a newline.
pub fn serialize_song(song: &SongFile) -> String {
    let beats = song
        .beats
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(" ");

    let mut out = format!(
        "name {}\nartist {}\nduration {}\nbpm {}\nfilepath {}\nbeats {}\n",
        song.name, song.artist, song.duration, song.bpm, song.filepath, beats
    );

    if !song.parts.is_empty() {
        out.push('\n');
        out.push_str(BODY_SENTINEL);
        out.push('\n');
        out.push_str(PARTS_MARKER);
        out.push('\n');
        for part in &song.parts {
            out.push_str(&part.to_string());
            out.push('\n');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(id: &str, name: &str, start: f64, end: f64, stance: Stance) -> SongPart {
        SongPart {
            id: id.to_string(),
            name: name.to_string(),
            start_time: start,
            end_time: end,
            stance,
        }
    }

    fn sample_song() -> SongFile {
        SongFile {
            name: "Eye of the Tiger".to_string(),
            artist: "Survivor".to_string(),
            duration: 245.5,
            bpm: 109.0,
            filepath: "audio/Eye of the Tiger.mp3".to_string(),
            beats: vec![0.5, 1.05, 1.6],
            parts: vec![
                part("a1", "Intro", 0.0, 12.5, Stance::Centered),
                part("b2", "Verse one", 12.5, 40.0, Stance::Right),
            ],
        }
    }

    #[test]
    fn test_serialize_exact_layout() {
        let text = serialize_song(&sample_song());
        assert_eq!(
            text,
            "name Eye of the Tiger\n\
             artist Survivor\n\
             duration 245.5\n\
             bpm 109\n\
             filepath audio/Eye of the Tiger.mp3\n\
             beats 0.5 1.05 1.6\n\
             \n\
             #BODY\n\
             parts:\n\
             0 12.5 Centered Intro @a1\n\
             12.5 40 Right Verse one @b2\n"
        );
    }

    #[test]
    fn test_serialize_without_parts_has_no_body() {
        let mut song = sample_song();
        song.parts.clear();
        let text = serialize_song(&song);
        assert!(!text.contains(BODY_SENTINEL));
        assert!(text.ends_with("beats 0.5 1.05 1.6\n"));
    }

    #[test]
    fn test_round_trip() {
        let song = sample_song();
        let parsed = parse_song(&serialize_song(&song));
        assert!(parsed.skipped.is_empty());
        assert_eq!(parsed.song, song);
    }

    #[test]
    fn test_round_trip_empty_song() {
        let song = SongFile::default();
        let parsed = parse_song(&serialize_song(&song));
        assert_eq!(parsed.song, song);
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let parsed = parse_song("name Only a name\n");
        let song = parsed.song;
        assert_eq!(song.name, "Only a name");
        assert_eq!(song.artist, "unknown");
        assert_eq!(song.duration, 0.0);
        assert_eq!(song.bpm, 0.0);
        assert_eq!(song.filepath, "");
        assert!(song.beats.is_empty());
        assert!(song.parts.is_empty());
    }

    #[test]
    fn test_keys_case_insensitive_and_unknown_ignored() {
        let parsed = parse_song("NAME Loud\nArtist  Someone  \nmood angry\n\nBPM 90\n");
        assert_eq!(parsed.song.name, "Loud");
        assert_eq!(parsed.song.artist, "Someone");
        assert_eq!(parsed.song.bpm, 90.0);
    }

    #[test]
    fn test_bad_numbers_become_nan() {
        let parsed = parse_song("duration abc\nbpm \nbeats 1.0 x  2.5\n");
        assert!(parsed.song.duration.is_nan());
        assert!(parsed.song.bpm.is_nan());
        assert_eq!(parsed.song.beats.len(), 3);
        assert_eq!(parsed.song.beats[0], 1.0);
        assert!(parsed.song.beats[1].is_nan());
        assert_eq!(parsed.song.beats[2], 2.5);
    }

    #[test]
    fn test_malformed_part_lines_are_skipped() {
        let text = "name S\n\n#BODY\nparts:\n\
                    0 10 Centered Intro @id1\n\
                    10 20 Sideways Verse @id2\n\
                    garbage\n\
                    20 30 Left Chorus\n\
                    30 40 Right Bridge @id5\n";
        let parsed = parse_song(text);
        let names: Vec<_> = parsed.song.parts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Intro", "Bridge"]);
        let lines: Vec<_> = parsed.skipped.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![6, 7, 8]);
        assert_eq!(parsed.skipped[1].content, "garbage");
    }

    #[test]
    fn test_lines_before_parts_marker_are_ignored() {
        let text = "name S\n#BODY\nnotes here\n0 10 Left Early @x\nparts:\n10 20 Left Late @y\n";
        let parsed = parse_song(text);
        assert_eq!(parsed.song.parts.len(), 1);
        assert_eq!(parsed.song.parts[0].id, "y");
        assert!(parsed.skipped.is_empty());
    }

    #[test]
    fn test_sentinel_with_surrounding_whitespace() {
        let text = "name S\n   #BODY  \n parts: \n0 5 Right Hook @h\n";
        let parsed = parse_song(text);
        assert_eq!(parsed.song.parts.len(), 1);
    }

    #[test]
    fn test_part_name_with_spaces_and_at_sign() {
        let parsed = parse_song("#BODY\nparts:\n1.5 3 Left Combo @ speed @abc\n");
        let p = &parsed.song.parts[0];
        assert_eq!(p.name, "Combo @ speed");
        assert_eq!(p.id, "abc");
        assert_eq!(p.start_time, 1.5);
        assert_eq!(p.stance, Stance::Left);
    }

    #[test]
    fn test_crlf_input() {
        let parsed = parse_song("name S\r\nbpm 100\r\n\r\n#BODY\r\nparts:\r\n0 4 Right A @a\r\n");
        assert_eq!(parsed.song.name, "S");
        assert_eq!(parsed.song.bpm, 100.0);
        assert_eq!(parsed.song.parts.len(), 1);
    }

    #[test]
    fn test_sort_parts() {
        let mut song = SongFile::default();
        song.parts = vec![
            part("b", "B", 20.0, 30.0, Stance::Left),
            part("a", "A", 0.0, 10.0, Stance::Right),
        ];
        song.sort_parts();
        assert_eq!(song.parts[0].id, "a");
        assert!(song.find_part("b").is_some());
        assert!(song.find_part("zzz").is_none());
    }

    #[test]
    fn test_overlaps() {
        let a = TimeRange::new(0.0, 10.0);
        assert!(!a.overlaps(&TimeRange::new(10.0, 20.0)));
        assert!(a.overlaps(&TimeRange::new(5.0, 15.0)));
        assert!(a.overlaps(&TimeRange::new(2.0, 3.0)));
        assert!(TimeRange::new(2.0, 3.0).overlaps(&a));
    }

    #[test]
    fn test_stance_from_str() {
        assert_eq!("Right".parse::<Stance>(), Ok(Stance::Right));
        assert_eq!("Centered".parse::<Stance>(), Ok(Stance::Centered));
        assert_eq!(
            "right".parse::<Stance>(),
            Err(UnknownStance("right".to_string()))
        );
    }
}
