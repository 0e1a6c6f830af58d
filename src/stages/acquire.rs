use std::path::{Path, PathBuf};

use super::{StageContext, StageKind, StageResult, StagedItem};
use crate::source::MediaSource;
use crate::staging::StagingArea;
use crate::PipelineError;

/// Container extensions accepted from the provider
pub const MEDIA_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv"];

/// Search the provider once and collect whatever landed in the staging area.
///
/// The provider call is bounded by the acquisition timeout and the cancellation token; an
/// early end only shrinks the batch. Only an empty batch is fatal.
pub async fn acquire(
    source: &dyn MediaSource,
    query: &str,
    count: u32,
    area: &StagingArea,
    ctx: &StageContext,
) -> Result<StageResult, PipelineError> {
    tracing::info!("Searching {} for '{}' ({} items)", source.name(), query, count);

    let destination = area
        .ensure()
        .await
        .map_err(|e| PipelineError::Staging(format!("{}: {}", area.path().display(), e)))?;

    let progress = ctx.progress(u64::from(count), "Downloading media...");

    let fetched = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(anyhow::anyhow!("cancelled")),
        timed = tokio::time::timeout(ctx.acquire_timeout, source.fetch(query, count, destination)) => {
            timed.unwrap_or_else(|_| {
                Err(anyhow::anyhow!("timed out after {}s", ctx.acquire_timeout.as_secs()))
            })
        }
    };

    if let Err(e) = fetched {
        tracing::warn!("Download batch ended early: {:#}", e);
    }

    let found = list_media(destination).await.map_err(|e| PipelineError::Acquisition {
        reason: format!("cannot list {}: {}", destination.display(), e),
    })?;

    progress.set_position(found.len() as u64);
    progress.finish_with_message("Download complete");

    if found.is_empty() {
        return Err(PipelineError::Acquisition {
            reason: "no items produced".to_string(),
        });
    }

    let succeeded: Vec<StagedItem> = found
        .into_iter()
        .zip(1u32..)
        .map(|(path, ordinal)| StagedItem::new(ordinal, path, StageKind::Raw))
        .collect();

    let attempted = count as usize;
    let result = StageResult {
        failed: attempted.saturating_sub(succeeded.len()),
        succeeded,
        attempted,
    };

    tracing::info!("Downloaded {} of {} item(s)", result.succeeded.len(), attempted);
    Ok(result)
}

/// Media files in `dir`, sorted by name so the autonumber prefix fixes the order
async fn list_media(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut found = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && is_media_container(&path) {
            found.push(path);
        }
    }

    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(found)
}

fn is_media_container(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            MEDIA_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
