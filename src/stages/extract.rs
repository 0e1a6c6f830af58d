use super::{for_each_item, StageContext, StageKind, StageResult, StagedItem};
use crate::media::MediaToolkit;
use crate::staging::StagingArea;
use crate::PipelineError;

/// Pull the audio track out of every raw container.
///
/// Items without an audio track, and items that fail to decode or export, are skipped.
pub async fn extract(
    toolkit: &dyn MediaToolkit,
    items: &[StagedItem],
    area: &StagingArea,
    ctx: &StageContext,
) -> Result<StageResult, PipelineError> {
    tracing::info!("Converting {} item(s) to audio with {}", items.len(), toolkit.name());

    let progress = ctx.progress(items.len() as u64, "Extracting audio...");

    let result = for_each_item(items, ctx, &progress, |item| async move {
        let probe = toolkit.probe(&item.path).await?;
        if !probe.has_audio {
            anyhow::bail!("no audio track");
        }

        let target = area.ensure().await?.join(item.artifact_name("mp3"));
        toolkit.extract_audio(&item.path, &target).await?;
        Ok::<_, anyhow::Error>(item.derive(target, StageKind::Audio))
    })
    .await;

    progress.finish_with_message("Extraction complete");

    if result.succeeded.is_empty() {
        return Err(PipelineError::Extraction {
            reason: "no audio produced".to_string(),
        });
    }

    tracing::info!("Converted {} file(s), skipped {}", result.succeeded.len(), result.failed);
    Ok(result)
}
