use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tracing::{debug, info};

use crate::config::EncoderConfig;
use crate::error::{RenderError, Result};
use crate::harness::FRAME_PATTERN;

/// Stream facts reported by ffprobe for an encoded artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_secs: f64,
    pub codec: String,
    pub frame_count: Option<u64>,
}

impl VideoInfo {
    /// Parse `ffprobe -print_format json -show_format -show_streams` output
    pub fn from_probe(json: &[u8]) -> Result<Self> {
        let probe: serde_json::Value = serde_json::from_slice(json)?;
        let video_stream = probe["streams"]
            .as_array()
            .and_then(|streams| streams.iter().find(|s| s["codec_type"] == "video"))
            .ok_or_else(|| RenderError::Verification("no video stream found".into()))?;

        let duration_secs = video_stream["duration"]
            .as_str()
            .or_else(|| probe["format"]["duration"].as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);

        Ok(Self {
            width: video_stream["width"].as_u64().unwrap_or(0) as u32,
            height: video_stream["height"].as_u64().unwrap_or(0) as u32,
            fps: video_stream["r_frame_rate"]
                .as_str()
                .and_then(parse_rate)
                .unwrap_or(0.0),
            duration_secs,
            codec: video_stream["codec_name"]
                .as_str()
                .unwrap_or("unknown")
                .to_string(),
            frame_count: video_stream["nb_frames"]
                .as_str()
                .and_then(|s| s.parse().ok()),
        })
    }
}

fn parse_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => rate.parse().ok(),
    }
}

/// Encodes captured PNG frame sequences with ffmpeg
#[derive(Debug, Clone)]
pub struct VideoEncoder {
    config: EncoderConfig,
}

impl VideoEncoder {
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// ffmpeg arguments for turning `frames_dir/frame_%06d.png` into `output`
    pub fn encode_args(&self, frames_dir: &Path, fps: u32, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y"]
            .into_iter()
            .map(OsString::from)
            .collect();

        args.push("-framerate".into());
        args.push(fps.to_string().into());
        args.push("-i".into());
        args.push(frames_dir.join(FRAME_PATTERN).into_os_string());
        args.push("-c:v".into());
        args.push(self.config.video_codec.clone().into());
        args.push("-pix_fmt".into());
        args.push(self.config.pixel_format.clone().into());
        args.push("-crf".into());
        args.push(self.config.crf.to_string().into());
        // yuv420p needs even dimensions
        args.push("-vf".into());
        args.push("pad=ceil(iw/2)*2:ceil(ih/2)*2".into());
        args.push("-movflags".into());
        args.push("+faststart".into());
        args.push(output.as_os_str().to_os_string());
        args
    }

    pub async fn encode_frames(&self, frames_dir: &Path, fps: u32, output: &Path) -> Result<()> {
        info!("🎞️ Encoding frames from {} at {} fps", frames_dir.display(), fps);

        let output_result = tokio::process::Command::new(&self.config.ffmpeg_path)
            .args(self.encode_args(frames_dir, fps, output))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                RenderError::execution(format!(
                    "Failed to run {}: {}",
                    self.config.ffmpeg_path.display(),
                    e
                ))
            })?;

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr);
            return Err(RenderError::execution(format!(
                "ffmpeg encode failed ({}): {}",
                output_result.status,
                stderr.trim()
            )));
        }

        info!("✅ Encoded {}", output.display());
        Ok(())
    }

    pub async fn probe_video(&self, path: &Path) -> Result<VideoInfo> {
        let output = tokio::process::Command::new(&self.config.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                RenderError::execution(format!(
                    "Failed to run {}: {}",
                    self.config.ffprobe_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(RenderError::execution(format!(
                "ffprobe failed for {}",
                path.display()
            )));
        }

        let info = VideoInfo::from_probe(&output.stdout)?;
        debug!("📹 Probed {}: {:?}", path.display(), info);
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_encode_args() {
        let encoder = VideoEncoder::new(&EncoderConfig::default());
        let args: Vec<String> = encoder
            .encode_args(Path::new("/w/frames"), 24, Path::new("/out/a.mp4"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let framerate = args.iter().position(|a| a == "-framerate").unwrap();
        assert_eq!(args[framerate + 1], "24");
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(
            PathBuf::from(&args[input + 1]),
            Path::new("/w/frames").join("frame_%06d.png")
        );
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "libx264"));
        assert_eq!(args.last().unwrap(), "/out/a.mp4");
    }

    #[test]
    fn test_probe_parsing() {
        let json = br#"{
            "streams": [
                { "codec_type": "audio", "codec_name": "aac" },
                { "codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720,
                  "r_frame_rate": "30000/1001", "nb_frames": "150" }
            ],
            "format": { "duration": "5.005" }
        }"#;

        let info = VideoInfo::from_probe(json).unwrap();
        assert_eq!((info.width, info.height), (1280, 720));
        assert_eq!(info.codec, "h264");
        assert!((info.fps - 29.97).abs() < 0.01);
        assert_eq!(info.duration_secs, 5.005);
        assert_eq!(info.frame_count, Some(150));
    }

    #[test]
    fn test_probe_without_video_stream() {
        let err = VideoInfo::from_probe(br#"{"streams": []}"#).unwrap_err();
        assert!(err.to_string().contains("no video stream"));
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("1/0"), None);
    }
}
