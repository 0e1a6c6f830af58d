use std::path::{Path, PathBuf};

use super::{MergeSummary, StageContext, StagedItem};
use crate::media::MediaToolkit;
use crate::PipelineError;

/// A clip that passed the probe and is a candidate for the final concat
struct MergeInput {
    ordinal: u32,
    path: PathBuf,
    duration: f64,
}

/// Why one concat attempt did not produce a file
enum ConcatFailure {
    Cancelled,
    TimedOut,
    Rejected(anyhow::Error),
}

impl ConcatFailure {
    fn into_error(self, ctx: &StageContext) -> PipelineError {
        match self {
            ConcatFailure::Cancelled => PipelineError::Cancelled,
            ConcatFailure::TimedOut => PipelineError::Merge {
                reason: format!("timed out after {}s", ctx.merge_timeout.as_secs()),
            },
            ConcatFailure::Rejected(e) => PipelineError::Merge {
                reason: format!("{:#}", e),
            },
        }
    }
}

/// Concatenate the clips in ordinal order into `output`.
///
/// Clips that no longer decode are left out: unreadable headers are caught by the probe, and a
/// clip that only fails while the encoder reads it is found by retrying the clips one at a time.
/// The result is written next to `output` first and moved into place only once the encoder
/// succeeded, so a failed merge leaves no file behind.
pub async fn merge(
    toolkit: &dyn MediaToolkit,
    items: &[StagedItem],
    output: &Path,
    ctx: &StageContext,
) -> Result<MergeSummary, PipelineError> {
    tracing::info!("Merging {} clip(s) into '{}'", items.len(), output.display());

    let mut ordered: Vec<&StagedItem> = items.iter().collect();
    ordered.sort_by_key(|item| item.ordinal);

    let mut inputs: Vec<MergeInput> = Vec::with_capacity(ordered.len());
    for item in ordered {
        if ctx.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let probed = tokio::time::timeout(ctx.item_timeout, toolkit.probe(&item.path)).await;
        match probed {
            Ok(Ok(probe)) => match probe.duration_seconds {
                Some(duration) if probe.has_audio && duration > 0.0 => inputs.push(MergeInput {
                    ordinal: item.ordinal,
                    path: item.path.clone(),
                    duration,
                }),
                _ => tracing::warn!(ordinal = item.ordinal, "Skipping '{}' – empty clip", item.file_name()),
            },
            Ok(Err(e)) => {
                tracing::warn!(ordinal = item.ordinal, "Skipping '{}' – {:#}", item.file_name(), e)
            }
            Err(_) => {
                tracing::warn!(ordinal = item.ordinal, "Skipping '{}' – probe timed out", item.file_name())
            }
        }
    }

    if inputs.is_empty() {
        return Err(PipelineError::Merge {
            reason: "merged output is empty".to_string(),
        });
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| PipelineError::Merge {
            reason: format!("cannot create {}: {}", parent.display(), e),
        })?;
    }

    let partial = partial_path(output);
    let first_attempt = concat_bounded(toolkit, &inputs, &partial, ctx).await;
    let included = match first_attempt {
        Ok(()) => inputs,
        Err(ConcatFailure::Rejected(e)) if inputs.len() > 1 => {
            tracing::warn!("Concatenation failed, checking clips one by one: {:#}", e);
            let survivors = isolate_decodable(toolkit, inputs, &partial, ctx).await?;
            if survivors.is_empty() {
                return Err(ConcatFailure::Rejected(e).into_error(ctx));
            }
            if let Err(failure) = concat_bounded(toolkit, &survivors, &partial, ctx).await {
                discard(&partial).await;
                return Err(failure.into_error(ctx));
            }
            survivors
        }
        Err(failure) => {
            discard(&partial).await;
            return Err(failure.into_error(ctx));
        }
    };

    if let Err(e) = tokio::fs::rename(&partial, output).await {
        discard(&partial).await;
        return Err(PipelineError::Merge {
            reason: format!("cannot move result to {}: {}", output.display(), e),
        });
    }

    let summary = MergeSummary {
        total_duration_seconds: included.iter().map(|input| input.duration).sum(),
        items_included: included.len(),
    };

    tracing::info!(
        "Mashup saved as '{}' ({} clips, {:.1}s)",
        output.display(),
        summary.items_included,
        summary.total_duration_seconds
    );
    Ok(summary)
}

/// One encoder run over `inputs`, bounded by the merge timeout and the cancellation token
async fn concat_bounded(
    toolkit: &dyn MediaToolkit,
    inputs: &[MergeInput],
    target: &Path,
    ctx: &StageContext,
) -> Result<(), ConcatFailure> {
    let paths: Vec<PathBuf> = inputs.iter().map(|input| input.path.clone()).collect();
    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(ConcatFailure::Cancelled),
        timed = tokio::time::timeout(ctx.merge_timeout, toolkit.concat(&paths, target)) => match timed {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConcatFailure::Rejected(e)),
            Err(_) => Err(ConcatFailure::TimedOut),
        },
    }
}

/// Run the encoder over each clip alone and keep the ones it accepts
async fn isolate_decodable(
    toolkit: &dyn MediaToolkit,
    inputs: Vec<MergeInput>,
    scratch: &Path,
    ctx: &StageContext,
) -> Result<Vec<MergeInput>, PipelineError> {
    let mut survivors = Vec::with_capacity(inputs.len());

    for input in inputs {
        let attempt = concat_bounded(toolkit, std::slice::from_ref(&input), scratch, ctx).await;
        discard(scratch).await;

        match attempt {
            Ok(()) => survivors.push(input),
            Err(ConcatFailure::Cancelled) => return Err(PipelineError::Cancelled),
            Err(ConcatFailure::TimedOut) => {
                tracing::warn!(ordinal = input.ordinal, "Skipping '{}' – encoder timed out", input.path.display())
            }
            Err(ConcatFailure::Rejected(e)) => {
                tracing::warn!(ordinal = input.ordinal, "Skipping '{}' – {:#}", input.path.display(), e)
            }
        }
    }

    Ok(survivors)
}

/// Sibling of `output` the encoder writes to before the result is moved into place
fn partial_path(output: &Path) -> PathBuf {
    let name = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mashup".to_string());
    output.with_file_name(format!(".{}.partial.mp3", name))
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}
