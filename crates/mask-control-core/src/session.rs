//! Last-submission-wins execution of the pipeline off the caller's thread.
//!
//! [`AnnotationSession`] owns one worker thread and a single pending slot: a
//! new submission replaces whatever is waiting, and an invocation already in
//! flight runs to completion. Every update the worker sends is tagged with
//! the generation of its submission so [`DisplaySlot`] can drop stale ones.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;

use image::DynamicImage;
use tracing::{debug, error};

use crate::domain::{RenderedImage, Verdict};
use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::ports::{ProgressEvent, ProgressSink};

/// Message from the worker to the presentation layer.
#[derive(Debug)]
pub enum SessionUpdate {
    /// The unannotated preview of a submission.
    Preview {
        /// Submission generation.
        generation: u64,
        /// Display-sized image.
        preview: DynamicImage,
    },
    /// A face was classified; carries the transient notice.
    Notice {
        /// Submission generation.
        generation: u64,
        /// Face index in detector order.
        index: usize,
        /// The decision for this face.
        verdict: Verdict,
    },
    /// The invocation finished.
    Rendered {
        /// Submission generation.
        generation: u64,
        /// The annotated image and its report.
        rendered: RenderedImage,
    },
    /// The invocation aborted.
    Failed {
        /// Submission generation.
        generation: u64,
        /// The fatal error.
        error: PipelineError,
    },
}

impl SessionUpdate {
    /// Generation of the submission this update belongs to.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        match self {
            Self::Preview { generation, .. }
            | Self::Notice { generation, .. }
            | Self::Rendered { generation, .. }
            | Self::Failed { generation, .. } => *generation,
        }
    }

    /// Returns true for the last update of an invocation.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Rendered { .. } | Self::Failed { .. })
    }
}

struct Submission {
    generation: u64,
    reference: String,
}

#[derive(Default)]
struct Mailbox {
    pending: Option<Submission>,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    mailbox: Mutex<Mailbox>,
    wakeup: Condvar,
}

/// Runs a [`Pipeline`] on a background thread, newest submission first.
pub struct AnnotationSession {
    shared: Arc<Shared>,
    latest: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl AnnotationSession {
    /// Starts the worker thread. Updates arrive on the returned receiver.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(pipeline: Pipeline) -> std::io::Result<(Self, Receiver<SessionUpdate>)> {
        let shared = Arc::new(Shared::default());
        let (tx, rx) = mpsc::channel();

        let worker = std::thread::Builder::new()
            .name("mask-control-worker".into())
            .spawn({
                let shared = Arc::clone(&shared);
                move || worker_loop(&pipeline, &shared, &tx)
            })?;

        let session = Self {
            shared,
            latest: Arc::new(AtomicU64::new(0)),
            worker: Some(worker),
        };
        Ok((session, rx))
    }

    /// Queues `reference` for annotation and returns its generation.
    ///
    /// A submission still waiting for the worker is discarded.
    pub fn submit(&self, reference: impl Into<String>) -> u64 {
        let mut mailbox = self
            .shared
            .mailbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(superseded) = mailbox.pending.replace(Submission {
            generation,
            reference: reference.into(),
        }) {
            debug!(
                "Submission {} superseded by {generation}",
                superseded.generation
            );
        }
        drop(mailbox);

        self.shared.wakeup.notify_one();
        generation
    }

    /// Generation of the most recent submission (0 before the first).
    #[must_use]
    pub fn latest_generation(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    /// A display slot that follows this session's submissions.
    #[must_use]
    pub fn display_slot(&self) -> DisplaySlot {
        DisplaySlot::new(Arc::clone(&self.latest))
    }
}

impl Drop for AnnotationSession {
    fn drop(&mut self) {
        self.shared
            .mailbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .shutdown = true;
        self.shared.wakeup.notify_all();

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Annotation worker panicked");
            }
        }
    }
}

fn worker_loop(pipeline: &Pipeline, shared: &Shared, tx: &Sender<SessionUpdate>) {
    loop {
        let submission = {
            let mut mailbox = shared
                .wakeup
                .wait_while(
                    shared.mailbox.lock().unwrap_or_else(PoisonError::into_inner),
                    |m| m.pending.is_none() && !m.shutdown,
                )
                .unwrap_or_else(PoisonError::into_inner);

            if mailbox.shutdown {
                break;
            }
            match mailbox.pending.take() {
                Some(submission) => submission,
                None => continue,
            }
        };

        let generation = submission.generation;
        debug!("Worker running submission {generation}: {}", submission.reference);

        let sink = ChannelSink {
            generation,
            tx: tx.clone(),
        };
        let update = match pipeline.run(&submission.reference, &sink) {
            Ok(rendered) => SessionUpdate::Rendered {
                generation,
                rendered,
            },
            Err(error) => SessionUpdate::Failed { generation, error },
        };

        if tx.send(update).is_err() {
            debug!("Update receiver dropped, stopping worker");
            break;
        }
    }
}

/// Forwards the events the presentation layer cares about.
struct ChannelSink {
    generation: u64,
    tx: Sender<SessionUpdate>,
}

impl ProgressSink for ChannelSink {
    fn on_event(&self, event: ProgressEvent) {
        let generation = self.generation;
        let update = match event {
            ProgressEvent::PreviewReady { preview } => SessionUpdate::Preview {
                generation,
                preview,
            },
            ProgressEvent::FaceClassified { index, verdict } => SessionUpdate::Notice {
                generation,
                index,
                verdict,
            },
            ProgressEvent::Stage(_) | ProgressEvent::FaceSkipped { .. } => return,
        };
        // A closed receiver is noticed by the worker loop
        let _ = self.tx.send(update);
    }
}

/// What the presentation layer currently shows.
#[derive(Debug, Clone)]
pub enum Displayed {
    /// The unannotated preview of the current submission.
    Preview(DynamicImage),
    /// The finished annotation.
    Rendered(RenderedImage),
}

/// Last-writer-wins guard in front of the display.
///
/// An update is accepted only if it belongs to the newest submission and is
/// not older than what is already shown. A failed invocation keeps the
/// previous image on screen.
pub struct DisplaySlot {
    latest: Arc<AtomicU64>,
    shown: u64,
    current: Option<Displayed>,
    last_error: Option<PipelineError>,
}

impl DisplaySlot {
    /// Creates an empty slot that compares against `latest`.
    #[must_use]
    pub fn new(latest: Arc<AtomicU64>) -> Self {
        Self {
            latest,
            shown: 0,
            current: None,
            last_error: None,
        }
    }

    /// Applies an update, returning false if it was stale and discarded.
    pub fn apply(&mut self, update: SessionUpdate) -> bool {
        let generation = update.generation();
        if generation != self.latest.load(Ordering::SeqCst) || generation < self.shown {
            debug!("Discarding stale update for generation {generation}");
            return false;
        }

        match update {
            SessionUpdate::Preview { preview, .. } => {
                self.current = Some(Displayed::Preview(preview));
                self.last_error = None;
                self.shown = generation;
            }
            SessionUpdate::Rendered { rendered, .. } => {
                self.current = Some(Displayed::Rendered(rendered));
                self.last_error = None;
                self.shown = generation;
            }
            SessionUpdate::Failed { error, .. } => {
                self.last_error = Some(error);
            }
            SessionUpdate::Notice { .. } => {}
        }
        true
    }

    /// The image on display, if any.
    #[must_use]
    pub const fn current(&self) -> Option<&Displayed> {
        self.current.as_ref()
    }

    /// The rendered image on display, if the current submission has finished.
    #[must_use]
    pub const fn rendered(&self) -> Option<&RenderedImage> {
        match &self.current {
            Some(Displayed::Rendered(rendered)) => Some(rendered),
            _ => None,
        }
    }

    /// Generation of the image on display.
    #[must_use]
    pub const fn shown_generation(&self) -> u64 {
        self.shown
    }

    /// Error of the newest invocation, if it failed.
    #[must_use]
    pub const fn last_error(&self) -> Option<&PipelineError> {
        self.last_error.as_ref()
    }
}
