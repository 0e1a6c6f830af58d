use futures_util::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod acquire;
pub mod extract;
pub mod merge;
pub mod trim;

pub use acquire::acquire;
pub use extract::extract;
pub use merge::merge;
pub use trim::trim;

/// Which stage produced an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageKind {
    Raw,
    Audio,
    Trimmed,
}

impl StageKind {
    /// Directory name of this stage's staging area
    pub fn dir_name(&self) -> &'static str {
        match self {
            StageKind::Raw => "raw",
            StageKind::Audio => "audio",
            StageKind::Trimmed => "clips",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Raw => write!(f, "download"),
            StageKind::Audio => write!(f, "extract"),
            StageKind::Trimmed => write!(f, "trim"),
        }
    }
}

/// One artifact handed between stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedItem {
    /// Position assigned at acquisition; fixes the merge order
    pub ordinal: u32,

    pub path: PathBuf,

    pub stage: StageKind,
}

impl StagedItem {
    pub fn new(ordinal: u32, path: PathBuf, stage: StageKind) -> Self {
        Self { ordinal, path, stage }
    }

    /// The artifact the next stage made from this one; the ordinal carries over
    pub fn derive(&self, path: PathBuf, stage: StageKind) -> Self {
        Self {
            ordinal: self.ordinal,
            path,
            stage,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{:05}", self.ordinal))
    }

    /// Name for an artifact derived from this item.
    ///
    /// The ordinal replaces any numeric prefix of the stem, so two items never map to the same
    /// file even when their names only differ by extension.
    pub fn artifact_name(&self, extension: &str) -> String {
        let stem = self.file_stem();
        let title = match stem.split_once('_') {
            Some((prefix, rest)) if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) => {
                rest
            }
            _ => stem.as_str(),
        };
        format!("{:05}_{}.{}", self.ordinal, title, extension)
    }
}

/// Outcome of one stage over a batch of items
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageResult {
    /// Items that made it through, in ordinal order
    pub succeeded: Vec<StagedItem>,

    pub attempted: usize,

    pub failed: usize,
}

impl StageResult {
    pub fn report(&self, stage: StageKind) -> StageReport {
        StageReport {
            stage,
            attempted: self.attempted,
            succeeded: self.succeeded.len(),
            failed: self.failed,
        }
    }
}

/// Per-stage counts kept for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: StageKind,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Final numbers of a successful merge
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MergeSummary {
    pub total_duration_seconds: f64,
    pub items_included: usize,
}

/// Limits shared by every stage of one run
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Maximum concurrent per-item jobs
    pub workers: usize,

    /// Upper bound for one per-item job
    pub item_timeout: Duration,

    /// Upper bound for the acquisition batch
    pub acquire_timeout: Duration,

    /// Upper bound for the final concatenation
    pub merge_timeout: Duration,

    /// Tripped on external interruption
    pub cancel: CancellationToken,

    pub show_progress: bool,
}

impl StageContext {
    pub(crate) fn progress(&self, len: u64, message: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let progress = ProgressBar::new(len);
        progress.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        progress.set_message(message.to_string());
        progress
    }
}

/// Run `job` for every item on a bounded pool and fold the outcomes back into ordinal order.
///
/// A job that errors, exceeds the item timeout or is cut short by cancellation counts as a
/// per-item failure; it never fails the stage on its own.
pub(crate) async fn for_each_item<F, Fut>(
    items: &[StagedItem],
    ctx: &StageContext,
    progress: &ProgressBar,
    job: F,
) -> StageResult
where
    F: Fn(StagedItem) -> Fut,
    Fut: Future<Output = crate::Result<StagedItem>>,
{
    let workers = ctx.workers.max(1);

    let mut outcomes: Vec<(u32, String, crate::Result<StagedItem>)> = stream::iter(items.iter().cloned())
        .map(|item| {
            let ordinal = item.ordinal;
            let name = item.file_name();
            let work = job(item);
            async move {
                let outcome = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => Err(anyhow::anyhow!("cancelled")),
                    timed = tokio::time::timeout(ctx.item_timeout, work) => match timed {
                        Ok(result) => result,
                        Err(_) => Err(anyhow::anyhow!(
                            "timed out after {}s",
                            ctx.item_timeout.as_secs_f64()
                        )),
                    },
                };
                progress.inc(1);
                (ordinal, name, outcome)
            }
        })
        .buffer_unordered(workers)
        .collect()
        .await;

    // Pool completion order is arbitrary
    outcomes.sort_by_key(|(ordinal, _, _)| *ordinal);

    let mut result = StageResult {
        succeeded: Vec::with_capacity(outcomes.len()),
        attempted: items.len(),
        failed: 0,
    };

    for (ordinal, name, outcome) in outcomes {
        match outcome {
            Ok(item) => result.succeeded.push(item),
            Err(e) => {
                tracing::warn!(ordinal, "Skipping '{}' – {:#}", name, e);
                result.failed += 1;
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::stage_context;

    fn items(count: u32) -> Vec<StagedItem> {
        (1..=count)
            .map(|ordinal| {
                StagedItem::new(ordinal, PathBuf::from(format!("{:05}_x.mp4", ordinal)), StageKind::Raw)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_results_are_resorted_by_ordinal() {
        let ctx = stage_context();
        let input = items(8);

        // Later ordinals finish first
        let result = for_each_item(&input, &ctx, &ProgressBar::hidden(), |item| async move {
            tokio::time::sleep(Duration::from_millis(u64::from(40 - item.ordinal * 4))).await;
            Ok(item.derive(item.path.with_extension("mp3"), StageKind::Audio))
        })
        .await;

        let ordinals: Vec<u32> = result.succeeded.iter().map(|i| i.ordinal).collect();
        assert_eq!(ordinals, (1..=8).collect::<Vec<_>>());
        assert_eq!(result.attempted, 8);
        assert_eq!(result.failed, 0);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let ctx = stage_context();
        let input = items(5);

        let result = for_each_item(&input, &ctx, &ProgressBar::hidden(), |item| async move {
            if item.ordinal % 2 == 0 {
                anyhow::bail!("corrupt");
            }
            Ok(item)
        })
        .await;

        let ordinals: Vec<u32> = result.succeeded.iter().map(|i| i.ordinal).collect();
        assert_eq!(ordinals, vec![1, 3, 5]);
        assert_eq!(result.failed, 2);
    }

    #[tokio::test]
    async fn test_timeout_is_a_per_item_failure() {
        let mut ctx = stage_context();
        ctx.item_timeout = Duration::from_millis(20);
        let input = items(3);

        let result = for_each_item(&input, &ctx, &ProgressBar::hidden(), |item| async move {
            if item.ordinal == 2 {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok(item)
        })
        .await;

        assert_eq!(result.succeeded.len(), 2);
        assert_eq!(result.failed, 1);
    }

    #[tokio::test]
    async fn test_cancellation_abandons_in_flight_items() {
        let ctx = stage_context();
        ctx.cancel.cancel();
        let input = items(4);

        let result = for_each_item(&input, &ctx, &ProgressBar::hidden(), |item| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(item)
        })
        .await;

        assert!(result.succeeded.is_empty());
        assert_eq!(result.failed, 4);
    }

    #[test]
    fn test_artifact_name_is_keyed_by_ordinal() {
        let item = |ordinal, name: &str| StagedItem::new(ordinal, PathBuf::from(name), StageKind::Raw);

        assert_eq!(item(1, "00001_Song_Title.mp4").artifact_name("mp3"), "00001_Song_Title.mp3");
        assert_eq!(item(2, "00002_a.b.webm").artifact_name("mp3"), "00002_a.b.mp3");
        assert_eq!(item(3, "clip.mp3").artifact_name("mp3"), "00003_clip.mp3");
        assert_ne!(
            item(1, "00001_song.mp4").artifact_name("mp3"),
            item(2, "00001_song.webm").artifact_name("mp3")
        );
    }

    #[test]
    fn test_derive_keeps_ordinal() {
        let raw = StagedItem::new(7, PathBuf::from("raw/00007_x.mp4"), StageKind::Raw);
        let audio = raw.derive(PathBuf::from("audio/00007_x.mp3"), StageKind::Audio);

        assert_eq!(audio.ordinal, 7);
        assert_eq!(audio.stage, StageKind::Audio);
        assert_eq!(audio.file_stem(), "00007_x");
    }
}
