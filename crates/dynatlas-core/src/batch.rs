//! Batched placement: many images, one commit per touched page.
//!
//! Items are sorted by descending area and placed one at a time through the same serial
//! placement path as [`Atlas::add`]. Surface commits are deferred until the whole batch is
//! done, so a batch touching P pages costs P commits regardless of its item count.

use crate::atlas::{Atlas, sort_for_placement};
use crate::error::{AtlasError, PlaceStatus, Result};
use crate::model::{Entry, SpriteMeta};
use crate::surface::SurfaceProvider;
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Poll;
use tracing::{debug, instrument};

/// One image of a batch. Names are required; an existing entry with the same name is replaced.
pub struct BatchItem<'a> {
    pub name: String,
    pub image: &'a RgbaImage,
    pub meta: SpriteMeta,
}

impl<'a> BatchItem<'a> {
    pub fn new(name: impl Into<String>, image: &'a RgbaImage) -> Self {
        Self {
            name: name.into(),
            image,
            meta: SpriteMeta::default(),
        }
    }

    pub fn with_meta(mut self, meta: SpriteMeta) -> Self {
        self.meta = meta;
        self
    }
}

#[derive(Debug)]
pub struct BatchItemResult {
    pub name: String,
    pub result: Result<Entry>,
}

impl BatchItemResult {
    pub fn status(&self) -> PlaceStatus {
        match &self.result {
            Ok(_) => PlaceStatus::Success,
            Err(e) => e.status(),
        }
    }
    pub fn entry(&self) -> Option<&Entry> {
        self.result.as_ref().ok()
    }
}

/// Outcome of a batch, with results in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<BatchItemResult>,
    /// Pages committed at the end of the batch.
    pub dirty_pages: Vec<usize>,
    /// Surface commits issued by the batch (one per dirty page).
    pub commits: usize,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn placed(&self) -> usize {
        self.results.iter().filter(|r| r.result.is_ok()).count()
    }
    pub fn failed(&self) -> usize {
        self.results.len() - self.placed()
    }
    pub fn is_complete_success(&self) -> bool {
        self.failed() == 0
    }
    pub fn get(&self, name: &str) -> Option<&BatchItemResult> {
        self.results.iter().rev().find(|r| r.name == name)
    }
    pub fn count_status(&self, status: PlaceStatus) -> usize {
        self.results.iter().filter(|r| r.status() == status).count()
    }
}

/// Cooperative cancellation flag shared between the host and an async batch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress snapshot handed to the async batch callback after each quantum.
pub struct BatchProgress<'r> {
    /// Results so far, in processing order.
    pub completed: &'r [BatchItemResult],
    pub processed: usize,
    pub total: usize,
}

impl BatchProgress<'_> {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f32 / self.total as f32
        }
    }
}

/// Working state of one batch: the placement order and results gathered so far.
struct BatchRun<'a> {
    items: Vec<Option<BatchItem<'a>>>,
    order: Vec<usize>,
    cursor: usize,
    completed: Vec<BatchItemResult>,
    completed_index: Vec<usize>,
    /// Results for items that never enter the order (duplicates).
    rejected: Vec<(usize, BatchItemResult)>,
}

impl<'a> BatchRun<'a> {
    fn prepare(items: Vec<BatchItem<'a>>) -> Self {
        let mut last_by_name: HashMap<&str, usize> = HashMap::new();
        for (i, item) in items.iter().enumerate() {
            last_by_name.insert(item.name.as_str(), i);
        }
        let mut order: Vec<usize> = Vec::with_capacity(items.len());
        let mut rejected = Vec::new();
        for (i, item) in items.iter().enumerate() {
            if last_by_name[item.name.as_str()] == i {
                order.push(i);
            } else {
                rejected.push((
                    i,
                    BatchItemResult {
                        name: item.name.clone(),
                        result: Err(AtlasError::InvalidInput(format!(
                            "duplicate name '{}' in batch, a later item wins",
                            item.name
                        ))),
                    },
                ));
            }
        }
        sort_for_placement(&mut order, |&i| {
            let (w, h) = items[i].image.dimensions();
            (w, h, i as u64)
        });
        Self {
            items: items.into_iter().map(Some).collect(),
            order,
            cursor: 0,
            completed: Vec::new(),
            completed_index: Vec::new(),
            rejected,
        }
    }

    fn total(&self) -> usize {
        self.order.len()
    }

    fn is_done(&self) -> bool {
        self.cursor >= self.order.len()
    }

    /// Places the next item. Each item is taken out of `items`, so it can be placed only once.
    fn step<S: SurfaceProvider>(&mut self, atlas: &mut Atlas<S>) {
        let index = self.order[self.cursor];
        self.cursor += 1;
        let Some(item) = self.items[index].take() else {
            return;
        };
        let result = place_item(atlas, &item);
        self.completed.push(BatchItemResult {
            name: item.name,
            result,
        });
        self.completed_index.push(index);
    }

    fn cancel_rest(&mut self) {
        while !self.is_done() {
            let index = self.order[self.cursor];
            self.cursor += 1;
            if let Some(item) = self.items[index].take() {
                self.rejected.push((
                    index,
                    BatchItemResult {
                        name: item.name,
                        result: Err(AtlasError::Cancelled),
                    },
                ));
            }
        }
    }

    fn into_results(self) -> Vec<BatchItemResult> {
        let mut slots: Vec<Option<BatchItemResult>> = Vec::with_capacity(self.items.len());
        slots.resize_with(self.items.len(), || None);
        for (index, res) in self.completed_index.into_iter().zip(self.completed) {
            slots[index] = Some(res);
        }
        for (index, res) in self.rejected {
            slots[index] = Some(res);
        }
        slots.into_iter().flatten().collect()
    }
}

fn place_item<S: SurfaceProvider>(atlas: &mut Atlas<S>, item: &BatchItem<'_>) -> Result<Entry> {
    let (w, h) = item.image.dimensions();
    // Reject before evicting so a bad image does not cost the old entry.
    atlas.check_size(w, h)?;
    let meta = match atlas.evict_name(&item.name)? {
        Some(old) if item.meta == SpriteMeta::default() => old,
        _ => item.meta,
    };
    let id = atlas.place(Some(item.name.clone()), w, h, Some(item.image), meta)?;
    atlas
        .entry(id)
        .cloned()
        .ok_or_else(|| AtlasError::UnknownEntry(id.to_string()))
}

/// Resolves once, after handing control back to the executor a single time.
async fn yield_now() {
    let mut yielded = false;
    futures::future::poll_fn(|cx| {
        if yielded {
            Poll::Ready(())
        } else {
            yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    })
    .await
}

impl<S: SurfaceProvider> Atlas<S> {
    /// Places every item (largest first) and commits each touched page exactly once.
    ///
    /// A failing item does not abort the batch; its error is reported in the result list.
    #[instrument(skip_all, fields(items = items.len()))]
    pub fn add_batch(&mut self, items: Vec<BatchItem<'_>>) -> Result<BatchReport> {
        let mut run = BatchRun::prepare(items);
        while !run.is_done() {
            run.step(self);
        }
        self.finish_batch(run, false)
    }

    /// Time-sliced [`Atlas::add_batch`]: places `items_per_quantum` items, reports progress,
    /// yields to the executor, and checks `cancel` before the next quantum.
    ///
    /// Cancellation does not roll back: items placed before it stay placed and are committed.
    #[instrument(skip_all, fields(items = items.len(), per_quantum = items_per_quantum))]
    pub async fn add_batch_async<F>(
        &mut self,
        items: Vec<BatchItem<'_>>,
        items_per_quantum: usize,
        mut on_progress: F,
        cancel: &CancelToken,
    ) -> Result<BatchReport>
    where
        F: FnMut(&BatchProgress<'_>),
    {
        let per_quantum = items_per_quantum.max(1);
        let mut run = BatchRun::prepare(items);
        let mut cancelled = false;
        while !run.is_done() {
            if cancel.is_cancelled() {
                debug!(processed = run.cursor, total = run.total(), "batch cancelled");
                run.cancel_rest();
                cancelled = true;
                break;
            }
            for _ in 0..per_quantum {
                if run.is_done() {
                    break;
                }
                run.step(self);
            }
            on_progress(&BatchProgress {
                completed: &run.completed,
                processed: run.cursor,
                total: run.total(),
            });
            if !run.is_done() {
                yield_now().await;
            }
        }
        self.finish_batch(run, cancelled)
    }

    fn finish_batch(&mut self, run: BatchRun<'_>, cancelled: bool) -> Result<BatchReport> {
        let dirty_pages = self.dirty_pages();
        let commits = self.commit_dirty_pages()?;
        let results = run.into_results();
        let report = BatchReport {
            results,
            dirty_pages,
            commits,
            cancelled,
        };
        debug!(
            placed = report.placed(),
            failed = report.failed(),
            commits,
            "batch finished"
        );
        Ok(report)
    }
}
