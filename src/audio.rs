use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::config::{AudioConfig, EncoderConfig};
use crate::error::{with_timeout, RenderError, Result};

/// One closed low-amplitude interval, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilenceInterval {
    pub start: f64,
    pub end: f64,
    pub duration: f64,
}

/// Silence intervals plus the cut boundaries derived from them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SilenceMarkerSet {
    pub duration_seconds: f64,
    pub silences: Vec<SilenceInterval>,
    /// 0, each silence end and the total duration; ascending, 3 decimals, no duplicates
    pub markers: Vec<f64>,
}

impl SilenceMarkerSet {
    pub fn from_intervals(duration_seconds: f64, silences: Vec<SilenceInterval>) -> Self {
        let round = |t: f64| (t * 1000.0).round() / 1000.0;

        let mut markers: Vec<f64> = std::iter::once(0.0)
            .chain(silences.iter().map(|s| s.end))
            .chain(std::iter::once(duration_seconds))
            .map(|t| round(t.max(0.0)))
            .collect();
        markers.sort_by(|a, b| a.total_cmp(b));
        markers.dedup();

        Self {
            duration_seconds,
            silences,
            markers,
        }
    }
}

static SILENCE_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"silence_start:\s*(-?[\d.]+)").expect("valid silence_start regex")
});

static SILENCE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"silence_end:\s*(-?[\d.]+)\s*\|\s*silence_duration:\s*(-?[\d.]+)")
        .expect("valid silence_end regex")
});

/// Parse `silencedetect` stderr into closed intervals.
///
/// An end pairs with the most recent unmatched start; with none pending the
/// start is inferred as `max(0, end - duration)`.
pub fn parse_silence_log(stderr: &str) -> Vec<SilenceInterval> {
    let mut pending: Vec<f64> = Vec::new();
    let mut intervals = Vec::new();

    for line in stderr.lines() {
        if let Some(start) = SILENCE_START
            .captures(line)
            .and_then(|c| c[1].parse::<f64>().ok())
        {
            pending.push(start);
            continue;
        }

        if let Some(captures) = SILENCE_END.captures(line) {
            let (Ok(end), Ok(duration)) = (captures[1].parse::<f64>(), captures[2].parse::<f64>())
            else {
                continue;
            };
            let start = pending
                .pop()
                .unwrap_or_else(|| (end - duration).max(0.0));
            intervals.push(SilenceInterval {
                start,
                end,
                duration,
            });
        }
    }

    intervals
}

/// ffmpeg/ffprobe driven silence analysis
#[derive(Debug, Clone)]
pub struct AudioAnalyzer {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    config: AudioConfig,
}

impl AudioAnalyzer {
    pub fn new(encoder: &EncoderConfig, audio: &AudioConfig) -> Self {
        Self {
            ffmpeg: encoder.ffmpeg_path.clone(),
            ffprobe: encoder.ffprobe_path.clone(),
            config: audio.clone(),
        }
    }

    /// Run `silencedetect` over the file and parse the intervals it reports
    pub async fn detect_silence(&self, audio_path: &Path) -> Result<Vec<SilenceInterval>> {
        let filter = format!(
            "silencedetect=n={}dB:d={}",
            self.config.noise_threshold_db, self.config.min_silence_secs
        );

        let mut command = tokio::process::Command::new(&self.ffmpeg);
        command
            .arg("-hide_banner")
            .arg("-i")
            .arg(audio_path)
            .args(["-af", &filter, "-f", "null", "-"])
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = with_timeout("Silence detection", self.config.timeout(), async {
            command.output().await.map_err(|e| {
                RenderError::execution(format!("Failed to run {}: {}", self.ffmpeg.display(), e))
            })
        })
        .await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(RenderError::execution(format!(
                "Silence detection failed for {}: {}",
                audio_path.display(),
                last_line(&stderr)
            )));
        }

        let intervals = parse_silence_log(&stderr);
        info!("🔇 Detected {} silence periods", intervals.len());
        Ok(intervals)
    }

    /// Total duration in seconds from the container format
    pub async fn probe_duration(&self, audio_path: &Path) -> Result<f64> {
        let mut command = tokio::process::Command::new(&self.ffprobe);
        command
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(audio_path)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = with_timeout("Duration probe", self.config.timeout(), async {
            command.output().await.map_err(|e| {
                RenderError::execution(format!("Failed to run {}: {}", self.ffprobe.display(), e))
            })
        })
        .await?;

        if !output.status.success() {
            return Err(RenderError::execution(format!(
                "ffprobe failed for {}",
                audio_path.display()
            )));
        }

        let probe: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        let duration = probe["format"]["duration"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| {
                RenderError::execution(format!("ffprobe reported no duration for {}", audio_path.display()))
            })?;

        debug!("⏱️ {} lasts {:.3}s", audio_path.display(), duration);
        Ok(duration)
    }

    pub async fn analyze(&self, audio_path: &Path) -> Result<SilenceMarkerSet> {
        if !audio_path.is_file() {
            return Err(RenderError::InvalidSpec(format!(
                "audio not found: {}",
                audio_path.display()
            )));
        }

        info!("🎵 Analyzing audio markers: {}", audio_path.display());
        let silences = self.detect_silence(audio_path).await?;
        let duration = self.probe_duration(audio_path).await?;
        Ok(SilenceMarkerSet::from_intervals(duration, silences))
    }
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("no output")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
Input #0, wav, from 'voice.wav':
[silencedetect @ 0x55d1] silence_start: 1.0
[silencedetect @ 0x55d1] silence_end: 2.5 | silence_duration: 1.5
size=N/A time=00:00:10.00 bitrate=N/A speed= 900x";

    #[test]
    fn test_repeated_parses_agree() {
        let first = parse_silence_log(LOG);
        let second = parse_silence_log(LOG);
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert!(SILENCE_END.is_match("silence_end: 4 | silence_duration: 1"));
        assert!(!SILENCE_START.is_match("silence_end: 4"));
    }

    #[test]
    fn test_markers_from_log() {
        let intervals = parse_silence_log(LOG);
        assert_eq!(
            intervals,
            vec![SilenceInterval {
                start: 1.0,
                end: 2.5,
                duration: 1.5
            }]
        );

        let set = SilenceMarkerSet::from_intervals(10.0, intervals);
        assert_eq!(set.markers, vec![0.0, 2.5, 10.0]);
    }

    #[test]
    fn test_end_without_start_infers_start() {
        let intervals = parse_silence_log(
            "silence_end: 4.25 | silence_duration: 1.0\nsilence_end: 0.3 | silence_duration: 0.5",
        );
        assert_eq!(intervals[0].start, 3.25);
        assert_eq!(intervals[1].start, 0.0);
    }

    #[test]
    fn test_end_pairs_with_latest_start() {
        let intervals = parse_silence_log(
            "silence_start: 1\nsilence_start: 5\nsilence_end: 6 | silence_duration: 1\nsilence_end: 8 | silence_duration: 7",
        );
        assert_eq!(intervals[0].start, 5.0);
        assert_eq!(intervals[1].start, 1.0);
    }

    #[test]
    fn test_markers_rounded_and_deduplicated() {
        let silences = vec![
            SilenceInterval { start: 0.0, end: 3.00004, duration: 3.0 },
            SilenceInterval { start: 2.0, end: 2.9999, duration: 1.0 },
            SilenceInterval { start: 6.0, end: 9.12345, duration: 3.1 },
        ];
        let set = SilenceMarkerSet::from_intervals(9.1234, silences);
        assert_eq!(set.markers, vec![0.0, 3.0, 9.123]);
    }

    #[tokio::test]
    async fn test_missing_audio_is_invalid_spec() {
        let analyzer = AudioAnalyzer::new(&EncoderConfig::default(), &AudioConfig::default());
        let err = analyzer
            .analyze(Path::new("/no/such/voice.wav"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid spec: audio not found"));
    }
}
