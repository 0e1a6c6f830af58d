use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::config::Config;
use crate::Result;

/// A provider that can search for media and download the hits into a directory
///
/// Implementations must tolerate per-item failures: one bad candidate never aborts the batch.
/// Files written to `destination` must sort by discovery order (zero-padded prefix).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Search for `query` and download up to `count` hits into `destination`
    async fn fetch(&self, query: &str, count: u32, destination: &Path) -> Result<()>;

    /// Get the name of this provider
    fn name(&self) -> &'static str;
}

/// YouTube search source using yt-dlp
pub struct YtDlpSource {
    yt_dlp_path: String,
    format: String,
    search_suffix: String,
    cookies_file: Option<PathBuf>,
}

impl YtDlpSource {
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            yt_dlp_path: config.tools.yt_dlp.clone(),
            format: config.tools.format.clone(),
            search_suffix: config.pipeline.search_suffix.clone(),
            cookies_file: config.tools.cookies_file.clone(),
        }
    }

    /// yt-dlp search expression for `count` hits
    fn search_term(&self, query: &str, count: u32) -> String {
        let suffix = self.search_suffix.trim();
        if suffix.is_empty() {
            format!("ytsearch{}:{}", count, query)
        } else {
            format!("ytsearch{}:{} {}", count, query, suffix)
        }
    }

    fn build_args(&self, query: &str, count: u32, destination: &Path) -> Vec<String> {
        let template = destination.join("%(autonumber)05d_%(title)s.%(ext)s");

        let mut args = vec![
            "--output".to_string(),
            template.to_string_lossy().into_owned(),
            "--format".to_string(),
            self.format.clone(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            // Skip unavailable or broken candidates instead of aborting the batch
            "--ignore-errors".to_string(),
            "--restrict-filenames".to_string(),
            "--no-progress".to_string(),
            "--newline".to_string(),
        ];

        if let Some(cookies) = &self.cookies_file {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().into_owned());
        }

        args.push(self.search_term(query, count));
        args
    }
}

impl Default for YtDlpSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaSource for YtDlpSource {
    async fn fetch(&self, query: &str, count: u32, destination: &Path) -> Result<()> {
        let args = self.build_args(query, count, destination);
        tracing::debug!("Running {} {}", self.yt_dlp_path, args.join(" "));

        let output = Command::new(&self.yt_dlp_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", self.yt_dlp_path))?;

        // With --ignore-errors a non-zero exit only means some candidates were skipped
        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            let skipped = error.lines().filter(|line| line.starts_with("ERROR")).count();
            tracing::warn!(
                "yt-dlp exited with {} ({} candidate(s) reported errors)",
                output.status,
                skipped
            );
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "YouTube"
    }
}
