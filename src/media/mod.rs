use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::config::Config;
use crate::Result;

/// What a container holds, as far as the pipeline cares
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaProbe {
    /// Container duration in seconds, if the demuxer reports one
    pub duration_seconds: Option<f64>,

    /// Whether at least one audio stream is present
    pub has_audio: bool,
}

/// Local decode/encode backend used by the extract, trim and merge stages
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Inspect a media file
    async fn probe(&self, path: &Path) -> Result<MediaProbe>;

    /// Write the audio track of `source` to `target` as a standalone file
    async fn extract_audio(&self, source: &Path, target: &Path) -> Result<()>;

    /// Write the leading `max_seconds` of `source` to `target`
    async fn cut_leading(&self, source: &Path, target: &Path, max_seconds: f64) -> Result<()>;

    /// Concatenate `inputs` in the given order into `target`
    async fn concat(&self, inputs: &[PathBuf], target: &Path) -> Result<()>;

    /// Get the name of this backend
    fn name(&self) -> &'static str;
}

/// Toolkit backed by the `ffprobe` and `ffmpeg` binaries
pub struct FfmpegToolkit {
    ffmpeg_path: String,
    ffprobe_path: String,
    audio_bitrate: String,
}

impl FfmpegToolkit {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            audio_bitrate: "192k".to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            ffmpeg_path: config.tools.ffmpeg.clone(),
            ffprobe_path: config.tools.ffprobe.clone(),
            audio_bitrate: config.pipeline.audio_bitrate.clone(),
        }
    }

    /// Run ffmpeg with the given arguments, failing on a non-zero exit
    async fn run_ffmpeg(&self, args: &[String]) -> Result<()> {
        tracing::debug!("Running {} {}", self.ffmpeg_path, args.join(" "));

        let output = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-nostdin", "-y"])
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", self.ffmpeg_path))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffmpeg failed: {}", last_line(&error));
        }

        Ok(())
    }

    fn encode_args(&self, target: &Path) -> Vec<String> {
        vec![
            "-vn".to_string(),
            "-acodec".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            target.to_string_lossy().into_owned(),
        ]
    }
}

impl Default for FfmpegToolkit {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe(&self, path: &Path) -> Result<MediaProbe> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v", "quiet",
                "-print_format", "json",
                "-show_format",
                "-show_streams",
                &path.to_string_lossy(),
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", self.ffprobe_path))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to analyze {} with ffprobe: {}", path.display(), error.trim());
        }

        parse_probe(&output.stdout)
    }

    async fn extract_audio(&self, source: &Path, target: &Path) -> Result<()> {
        let mut args = vec!["-i".to_string(), source.to_string_lossy().into_owned()];
        args.extend(self.encode_args(target));
        self.run_ffmpeg(&args).await
    }

    async fn cut_leading(&self, source: &Path, target: &Path, max_seconds: f64) -> Result<()> {
        let mut args = vec![
            "-i".to_string(),
            source.to_string_lossy().into_owned(),
            "-t".to_string(),
            format!("{:.3}", max_seconds),
        ];
        args.extend(self.encode_args(target));
        self.run_ffmpeg(&args).await
    }

    async fn concat(&self, inputs: &[PathBuf], target: &Path) -> Result<()> {
        if inputs.is_empty() {
            anyhow::bail!("Nothing to concatenate");
        }

        let mut args = Vec::with_capacity(inputs.len() * 2 + 10);
        for input in inputs {
            args.push("-i".to_string());
            args.push(input.to_string_lossy().into_owned());
        }
        args.push("-filter_complex".to_string());
        args.push(concat_filter(inputs.len()));
        args.push("-map".to_string());
        args.push("[out]".to_string());
        args.extend(self.encode_args(target));

        self.run_ffmpeg(&args).await
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output
pub fn parse_probe(stdout: &[u8]) -> Result<MediaProbe> {
    let info: Value = serde_json::from_slice(stdout).context("ffprobe returned invalid JSON")?;

    let empty_vec = vec![];
    let streams = info["streams"].as_array().unwrap_or(&empty_vec);
    let audio_stream = streams
        .iter()
        .find(|stream| stream["codec_type"].as_str() == Some("audio"));

    // Container duration first, then the audio stream's own duration
    let duration_seconds = info["format"]["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            audio_stream
                .and_then(|stream| stream["duration"].as_str())
                .and_then(|d| d.parse::<f64>().ok())
        });

    Ok(MediaProbe {
        duration_seconds,
        has_audio: audio_stream.is_some(),
    })
}

/// Audio-only concat filter graph over `count` inputs, labelled `[out]`
pub fn concat_filter(count: usize) -> String {
    let inputs: String = (0..count).map(|index| format!("[{}:a]", index)).collect();
    format!("{}concat=n={}:v=0:a=1[out]", inputs, count)
}

fn last_line(stderr: &str) -> &str {
    stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("no diagnostic output")
        .trim()
}
