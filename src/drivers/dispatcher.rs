use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use crate::drivers::extractor::{ExtractionResult, Extractor, FilterBands, NORMALIZATION};
use crate::drivers::source::SampleBatch;
/// Queue depth above which a backlog warning is logged. Never a cap.
pub const BACKLOG_WARN: usize = 4;
/// One unit of work for the extraction worker.
#[derive(Clone, Debug)]
pub struct DispatchJob {
    pub batch: Arc<SampleBatch>,
    pub bands: FilterBands,
    pub interval_secs: f64,
}
/// Single background worker that runs the extractor over submitted batches
/// strictly in submission order.
///
/// The queue is unbounded. Extractor errors and panics are logged and turned
/// into [`ExtractionResult::neutral`], so one bad batch never stalls the
/// ones behind it. Dropping the dispatcher closes the queue and waits for the
/// worker to drain what is already queued.
pub struct ExtractionDispatcher {
    tx: Option<Sender<DispatchJob>>,
    pending: Arc<AtomicUsize>,
    worker: Option<JoinHandle<()>>,
}
impl ExtractionDispatcher {
    pub fn spawn<E, M>(mut extractor: E, results: Sender<M>) -> Self
    where
        E: Extractor + 'static,
        M: From<ExtractionResult> + Send + 'static,
    {
        let (tx, rx) = channel::<DispatchJob>();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);
        let worker = thread::spawn(move || {
            log::debug!("extraction worker started");
            for job in rx {
                let result = run_job(&mut extractor, &job);
                worker_pending.fetch_sub(1, Ordering::SeqCst);
                if results.send(M::from(result)).is_err() {
                    log::debug!("result receiver gone, dropping extraction result");
                }
            }
            log::debug!("extraction worker drained and stopped");
        });
        Self {
            tx: Some(tx),
            pending,
            worker: Some(worker),
        }
    }
    /// Enqueues a batch. `bands` is captured now, so later edits only affect
    /// later submissions.
    pub fn submit(&self, batch: Arc<SampleBatch>, bands: FilterBands, interval_secs: f64) {
        let depth = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        if depth > BACKLOG_WARN {
            log::warn!("extraction backlog at {depth} batches");
        }
        let job = DispatchJob {
            batch,
            bands,
            interval_secs,
        };
        let sent = self.tx.as_ref().map(|tx| tx.send(job).is_ok()).unwrap_or(false);
        if !sent {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            log::error!("extraction worker is gone, batch dropped");
        }
    }
    /// Batches submitted but not yet finished, including the one in flight.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
    /// Shared handle on the queue depth, for display.
    pub fn pending_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.pending)
    }
}
impl Drop for ExtractionDispatcher {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("extraction worker panicked");
            }
        }
    }
}
/// Normalizes, extracts and converts one job. Never fails.
pub fn run_job<E: Extractor + ?Sized>(extractor: &mut E, job: &DispatchJob) -> ExtractionResult {
    let ch0: Vec<f64> = job.batch.ch0.iter().map(|v| v / NORMALIZATION).collect();
    let ch1: Vec<f64> = job.batch.ch1.iter().map(|v| v / NORMALIZATION).collect();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        extractor.extract(&ch0, &ch1, job.interval_secs, &job.bands)
    }));
    match outcome {
        Ok(Ok(raw)) => ExtractionResult::from(raw),
        Ok(Err(e)) => {
            log::warn!(
                "extraction failed for batch at {} ms: {e}; publishing neutral result",
                job.batch.elapsed_ms
            );
            ExtractionResult::neutral()
        }
        Err(_) => {
            log::warn!(
                "extractor panicked on batch at {} ms; publishing neutral result",
                job.batch.elapsed_ms
            );
            ExtractionResult::neutral()
        }
    }
}
