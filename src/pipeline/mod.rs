use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::media::{FfmpegToolkit, MediaToolkit};
use crate::source::{MediaSource, YtDlpSource};
use crate::stages::{self, MergeSummary, StageContext, StageKind, StageReport};
use crate::staging::StagingScope;
use crate::validate::{PipelineRequest, RawArgs};
use crate::PipelineError;

/// Knobs of a single run that do not belong to the request itself
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub workers: usize,
    pub item_timeout: Duration,
    pub acquire_timeout: Duration,
    pub merge_timeout: Duration,
    pub staging_base: PathBuf,
    pub show_progress: bool,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.pipeline.workers,
            item_timeout: config.item_timeout(),
            acquire_timeout: config.acquire_timeout(),
            merge_timeout: config.merge_timeout(),
            staging_base: config.staging_base(),
            show_progress: true,
        }
    }
}

/// Result of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct MashupOutcome {
    pub output_path: PathBuf,
    pub summary: MergeSummary,
    pub stages: Vec<StageReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Download → extract → trim → merge, wrapped in a staging scope
pub struct MashupPipeline {
    source: Arc<dyn MediaSource>,
    toolkit: Arc<dyn MediaToolkit>,
    options: RunOptions,
}

impl MashupPipeline {
    /// Pipeline backed by yt-dlp and ffmpeg
    pub fn new(config: &Config) -> Self {
        Self::with_backends(
            Arc::new(YtDlpSource::from_config(config)),
            Arc::new(FfmpegToolkit::from_config(config)),
            RunOptions::from_config(config),
        )
    }

    pub fn with_backends(
        source: Arc<dyn MediaSource>,
        toolkit: Arc<dyn MediaToolkit>,
        options: RunOptions,
    ) -> Self {
        Self {
            source,
            toolkit,
            options,
        }
    }

    /// Show or hide the per-stage progress bars
    pub fn with_progress(mut self, show: bool) -> Self {
        self.options.show_progress = show;
        self
    }

    /// Validate raw front-end arguments, then run
    pub async fn run_raw(
        &self,
        args: &RawArgs,
        cancel: CancellationToken,
    ) -> Result<MashupOutcome, PipelineError> {
        let request = args.validate()?;
        self.run(&request, cancel).await
    }

    /// Run every stage for `request`.
    ///
    /// On success the mashup exists at the request's output path. On any error that path is
    /// absent. Staging directories are gone in both cases.
    pub async fn run(
        &self,
        request: &PipelineRequest,
        cancel: CancellationToken,
    ) -> Result<MashupOutcome, PipelineError> {
        let scope = StagingScope::acquire(&self.options.staging_base)?;
        tracing::info!(
            run_id = scope.run_id(),
            "Building mashup of {} x '{}' ({}s each) -> {}",
            request.item_count(),
            request.source_query(),
            request.clip_duration_secs(),
            request.output_path().display()
        );

        let ctx = StageContext {
            workers: self.options.workers,
            item_timeout: self.options.item_timeout,
            acquire_timeout: self.options.acquire_timeout,
            merge_timeout: self.options.merge_timeout,
            cancel,
            show_progress: self.options.show_progress,
        };

        let outcome = self.run_stages(request, &scope, &ctx).await;

        let cleanup_errors = scope.release_async().await;
        if cleanup_errors.is_empty() {
            tracing::info!("Temp files removed");
        }

        if let Err(e) = &outcome {
            tracing::error!("{}", e);
            remove_stale_output(request.output_path()).await;
        }

        outcome
    }

    async fn run_stages(
        &self,
        request: &PipelineRequest,
        scope: &StagingScope,
        ctx: &StageContext,
    ) -> Result<MashupOutcome, PipelineError> {
        let started_at = Utc::now();
        let mut reports = Vec::with_capacity(3);

        ensure_running(ctx)?;
        let raw = stages::acquire(
            self.source.as_ref(),
            request.source_query(),
            request.item_count(),
            scope.area(StageKind::Raw),
            ctx,
        )
        .await?;
        reports.push(raw.report(StageKind::Raw));

        ensure_running(ctx)?;
        let audio = stages::extract(
            self.toolkit.as_ref(),
            &raw.succeeded,
            scope.area(StageKind::Audio),
            ctx,
        )
        .await?;
        reports.push(audio.report(StageKind::Audio));

        ensure_running(ctx)?;
        let clips = stages::trim(
            self.toolkit.as_ref(),
            &audio.succeeded,
            request.clip_duration_secs(),
            scope.area(StageKind::Trimmed),
            ctx,
        )
        .await?;
        reports.push(clips.report(StageKind::Trimmed));

        ensure_running(ctx)?;
        let summary = stages::merge(
            self.toolkit.as_ref(),
            &clips.succeeded,
            request.output_path(),
            ctx,
        )
        .await?;

        Ok(MashupOutcome {
            output_path: request.output_path().to_path_buf(),
            summary,
            stages: reports,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

fn ensure_running(ctx: &StageContext) -> Result<(), PipelineError> {
    if ctx.cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

async fn remove_stale_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::warn!("Removed stale output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove output {}: {}", path.display(), e),
    }
}
