//! In-memory stand-ins for yt-dlp and ffmpeg.
//!
//! Fake media files are small JSON documents describing duration and audio presence; anything
//! that does not parse behaves like a corrupt container.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::media::{MediaProbe, MediaToolkit};
use crate::source::MediaSource;
use crate::stages::StageContext;
use crate::Result;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FakeMedia {
    pub duration: f64,
    pub audio: bool,
}

pub fn write_media(path: &Path, duration: f64, audio: bool) {
    let body = serde_json::to_vec(&FakeMedia { duration, audio }).unwrap();
    fs_err::write(path, body).unwrap();
}

pub fn write_corrupt(path: &Path) {
    fs_err::write(path, b"\x00\x01 not a container").unwrap();
}

async fn read_media(path: &Path) -> Result<FakeMedia> {
    let body = tokio::fs::read(path).await?;
    serde_json::from_slice(&body).map_err(|e| anyhow::anyhow!("Invalid data found: {}", e))
}

pub fn stage_context() -> StageContext {
    StageContext {
        workers: 4,
        item_timeout: Duration::from_secs(5),
        acquire_timeout: Duration::from_secs(5),
        merge_timeout: Duration::from_secs(5),
        cancel: CancellationToken::new(),
        show_progress: false,
    }
}

/// Toolkit that rewrites fake media descriptions instead of decoding anything
#[derive(Default)]
pub struct FakeToolkit {
    pub concat_calls: Mutex<Vec<Vec<PathBuf>>>,

    /// Concat writes a broken target and fails when any input name contains this
    pub undecodable: Option<&'static str>,

    /// Concat never finishes
    pub stall_concat: bool,

    /// Probe panics, standing in for an internal bug
    pub panic_on_probe: bool,
}

impl FakeToolkit {
    pub fn rejecting(marker: &'static str) -> Self {
        Self {
            undecodable: Some(marker),
            ..Self::default()
        }
    }
}

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn probe(&self, path: &Path) -> Result<MediaProbe> {
        if self.panic_on_probe {
            panic!("probe exploded on {}", path.display());
        }
        let media = read_media(path).await?;
        Ok(MediaProbe {
            duration_seconds: Some(media.duration),
            has_audio: media.audio,
        })
    }

    async fn extract_audio(&self, source: &Path, target: &Path) -> Result<()> {
        let media = read_media(source).await?;
        if !media.audio {
            anyhow::bail!("Output file does not contain any stream");
        }
        write_media(target, media.duration, true);
        Ok(())
    }

    async fn cut_leading(&self, source: &Path, target: &Path, max_seconds: f64) -> Result<()> {
        let media = read_media(source).await?;
        write_media(target, media.duration.min(max_seconds), media.audio);
        Ok(())
    }

    async fn concat(&self, inputs: &[PathBuf], target: &Path) -> Result<()> {
        self.concat_calls.lock().unwrap().push(inputs.to_vec());
        if self.stall_concat {
            std::future::pending::<()>().await;
        }
        if let Some(marker) = self.undecodable {
            if inputs.iter().any(|p| p.to_string_lossy().contains(marker)) {
                write_corrupt(target);
                anyhow::bail!("Error while decoding stream #0:0: Invalid data found when processing input");
            }
        }

        let mut total = 0.0;
        for input in inputs {
            total += read_media(input).await?.duration;
        }
        write_media(target, total, true);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// What the fake provider drops into the download directory
#[derive(Debug, Clone)]
pub enum FakeItem {
    Media { duration: f64, audio: bool },
    Corrupt,
}

/// Provider that writes a fixed list of files named like yt-dlp's autonumber template
#[derive(Default)]
pub struct FakeSource {
    pub items: Vec<FakeItem>,
    pub delay: Option<Duration>,
}

impl FakeSource {
    pub fn uniform(count: usize, duration: f64) -> Self {
        Self {
            items: vec![FakeItem::Media { duration, audio: true }; count],
            delay: None,
        }
    }
}

#[async_trait]
impl MediaSource for FakeSource {
    async fn fetch(&self, _query: &str, count: u32, destination: &Path) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        for (index, item) in self.items.iter().take(count as usize).enumerate() {
            let path = destination.join(format!("{:05}_item.mp4", index + 1));
            match item {
                FakeItem::Media { duration, audio } => write_media(&path, *duration, *audio),
                FakeItem::Corrupt => write_corrupt(&path),
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
