use anyhow::Context;

use super::{for_each_item, StageContext, StageKind, StageResult, StagedItem};
use crate::media::MediaToolkit;
use crate::staging::StagingArea;
use crate::PipelineError;

/// Keep the leading `max_seconds` of every audio artifact.
///
/// Tracks at or under the limit are copied through untouched; nothing is ever padded.
pub async fn trim(
    toolkit: &dyn MediaToolkit,
    items: &[StagedItem],
    max_seconds: u32,
    area: &StagingArea,
    ctx: &StageContext,
) -> Result<StageResult, PipelineError> {
    tracing::info!("Cutting first {}s from {} audio file(s)", max_seconds, items.len());

    let limit = f64::from(max_seconds);
    let progress = ctx.progress(items.len() as u64, "Trimming clips...");

    let result = for_each_item(items, ctx, &progress, |item| async move {
        let duration = toolkit
            .probe(&item.path)
            .await?
            .duration_seconds
            .context("unknown duration")?;

        let target = area.ensure().await?.join(format!("clip_{}", item.artifact_name("mp3")));
        if duration > limit {
            toolkit.cut_leading(&item.path, &target, limit).await?;
        } else {
            tokio::fs::copy(&item.path, &target).await?;
        }

        Ok::<_, anyhow::Error>(item.derive(target, StageKind::Trimmed))
    })
    .await;

    progress.finish_with_message("Trimming complete");

    if result.succeeded.is_empty() {
        return Err(PipelineError::Trim {
            reason: "no clips produced".to_string(),
        });
    }

    tracing::info!("Clipped {} file(s), skipped {}", result.succeeded.len(), result.failed);
    Ok(result)
}
