use std::path::Path;
use std::process::Command;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BeatError {
    #[error("{0} not found (needed for {1})")]
    ToolNotFound(String, &'static str),
    #[error("{tool} failed: {stderr}")]
    ToolFailed { tool: String, stderr: String },
    #[error("Unreadable {tool} output: {message}")]
    BadOutput { tool: String, message: String },
    #[error("No beat detection command configured")]
    NoCommand,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON printed by the beat-detection command: `{"bpm": 128.0, "beats": [0.52, ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BeatAnalysis {
    #[serde(default)]
    pub bpm: f64,
    #[serde(default)]
    pub beats: Vec<f64>,
}

/// Parse detector output. Beats are returned in ascending order.
pub fn parse_beat_output(stdout: &str) -> Result<BeatAnalysis, BeatError> {
    let mut analysis: BeatAnalysis =
        serde_json::from_str(stdout.trim()).map_err(|e| BeatError::BadOutput {
            tool: "beat detector".to_string(),
            message: e.to_string(),
        })?;
    analysis.beats.sort_by(f64::total_cmp);
    Ok(analysis)
}

/// Parse `ffprobe ... -of default=noprint_wrappers=1:nokey=1` output.
pub fn parse_duration_output(stdout: &str) -> Result<f64, BeatError> {
    let text = stdout.trim();
    text.parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| BeatError::BadOutput {
            tool: "ffprobe".to_string(),
            message: format!("expected a duration, got {text:?}"),
        })
}

fn run(program: &str, args: &[&str], purpose: &'static str) -> Result<String, BeatError> {
    let output = match Command::new(program).args(args).output() {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BeatError::ToolNotFound(program.to_string(), purpose));
        }
        Err(e) => return Err(e.into()),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BeatError::ToolFailed {
            tool: program.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Audio duration in seconds via ffprobe.
pub fn probe_duration(ffprobe: &str, audio: &Path) -> Result<f64, BeatError> {
    let audio = audio.to_string_lossy();
    let stdout = run(
        ffprobe,
        &[
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
            &*audio,
        ],
        "duration probing",
    )?;
    parse_duration_output(&stdout)
}

/// Run the configured detector (`command[0] command[1..] <audio>`) and parse its JSON.
pub fn detect_beats(command: &[String], audio: &Path) -> Result<BeatAnalysis, BeatError> {
    let (program, rest) = command.split_first().ok_or(BeatError::NoCommand)?;
    let audio = audio.to_string_lossy();
    let mut args: Vec<&str> = rest.iter().map(String::as_str).collect();
    args.push(&*audio);

    log::info!("Detecting beats: {} {}", program, args.join(" "));
    let stdout = run(program, &args, "beat detection")?;
    let analysis = parse_beat_output(&stdout)?;
    log::info!("  {} beats at {:.1} bpm", analysis.beats.len(), analysis.bpm);
    Ok(analysis)
}

/// Load a detector result saved to disk earlier.
pub fn load_beat_file(path: &Path) -> Result<BeatAnalysis, BeatError> {
    parse_beat_output(&std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_beat_output() {
        let a = parse_beat_output(r#"{"bpm": 123.0, "beats": [0.5, 1.0, 1.49]}"#).unwrap();
        assert_eq!(a.bpm, 123.0);
        assert_eq!(a.beats, vec![0.5, 1.0, 1.49]);
    }

    #[test]
    fn test_parse_beat_output_sorts_and_defaults() {
        let a = parse_beat_output("{\"beats\": [2.0, 1.0]}\n").unwrap();
        assert_eq!(a.bpm, 0.0);
        assert_eq!(a.beats, vec![1.0, 2.0]);
    }

    #[test]
    fn test_parse_beat_output_rejects_garbage() {
        assert!(matches!(
            parse_beat_output("Traceback (most recent call last)"),
            Err(BeatError::BadOutput { .. })
        ));
    }

    #[test]
    fn test_parse_duration_output() {
        assert_eq!(parse_duration_output("245.368000\n").unwrap(), 245.368);
        assert!(parse_duration_output("N/A").is_err());
        assert!(parse_duration_output("").is_err());
    }

    #[test]
    fn test_detect_beats_requires_command() {
        assert!(matches!(
            detect_beats(&[], Path::new("x.wav")),
            Err(BeatError::NoCommand)
        ));
    }

    #[test]
    fn test_missing_tool_reported() {
        let err = probe_duration("choreo-no-such-ffprobe", Path::new("x.wav")).unwrap_err();
        assert!(matches!(err, BeatError::ToolNotFound(_, _)));
    }

    #[test]
    fn test_load_beat_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beats.json");
        std::fs::write(&path, r#"{"bpm": 90.5, "beats": [0.66]}"#).unwrap();
        assert_eq!(load_beat_file(&path).unwrap().bpm, 90.5);
    }
}
