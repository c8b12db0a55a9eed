//! Background training worker.
//!
//! Runs a [`TrainingService`] on its own thread and streams progress over an
//! `mpsc` channel, so a caller can keep serving predictions from the current
//! bundle while a replacement trains.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::{ModelBundle, ModelHandle, TrainingReport, TrainingService, TrainingStage};
use crate::domain::Dataset;
use crate::ports::BinaryClassifier;

/// Progress updates from the training worker.
#[derive(Debug)]
pub enum TrainingProgress<C> {
    /// A pipeline stage started
    Stage(TrainingStage),
    /// Training finished; the bundle was swapped in if a handle was given
    Complete {
        bundle: Arc<ModelBundle<C>>,
        report: TrainingReport,
    },
    /// Training failed; any current bundle is untouched
    Error(String),
}

/// Handle to a running training worker.
pub struct TrainingWorkerHandle<C> {
    progress_rx: Receiver<TrainingProgress<C>>,
    handle: JoinHandle<()>,
}

impl<C> TrainingWorkerHandle<C> {
    /// Next progress update, if one is ready (non-blocking).
    #[must_use]
    pub fn try_recv(&self) -> Option<TrainingProgress<C>> {
        self.progress_rx.try_recv().ok()
    }

    /// Block until the next update; `None` once the worker has finished.
    #[must_use]
    pub fn recv(&self) -> Option<TrainingProgress<C>> {
        self.progress_rx.recv().ok()
    }

    /// Drain updates until the worker reports completion or failure.
    pub fn wait(self) -> Option<TrainingProgress<C>> {
        let mut last = None;
        while let Ok(update) = self.progress_rx.recv() {
            if matches!(
                update,
                TrainingProgress::Complete { .. } | TrainingProgress::Error(_)
            ) {
                last = Some(update);
            }
        }
        if self.handle.join().is_err() {
            return Some(TrainingProgress::Error("Training thread panicked".into()));
        }
        last
    }
}

/// Spawns training jobs on background threads.
pub struct TrainingWorker;

impl TrainingWorker {
    /// Train in the background. When `target` is given, a successful result
    /// replaces its current bundle.
    pub fn spawn<C>(
        service: TrainingService<C>,
        dataset: Dataset,
        target: Option<Arc<ModelHandle<C>>>,
    ) -> TrainingWorkerHandle<C>
    where
        C: BinaryClassifier + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            Self::run(&service, &dataset, target.as_deref(), &tx);
        });
        TrainingWorkerHandle {
            progress_rx: rx,
            handle,
        }
    }

    fn run<C: BinaryClassifier>(
        service: &TrainingService<C>,
        dataset: &Dataset,
        target: Option<&ModelHandle<C>>,
        tx: &Sender<TrainingProgress<C>>,
    ) {
        let result = service.train_with_progress(dataset, |stage| {
            let _ = tx.send(TrainingProgress::Stage(stage));
        });

        match result {
            Ok((bundle, report)) => {
                let bundle = Arc::new(bundle);
                if let Some(handle) = target {
                    handle.replace_arc(Arc::clone(&bundle));
                    tracing::info!("Swapped in newly trained {} bundle", C::KIND);
                }
                let _ = tx.send(TrainingProgress::Complete { bundle, report });
            }
            Err(e) => {
                tracing::warn!("Background training failed: {e}");
                let _ = tx.send(TrainingProgress::Error(e.to_string()));
            }
        }
    }
}
