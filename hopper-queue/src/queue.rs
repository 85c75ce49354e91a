//! The persistent queue engine.
//!
//! A queue is a directory pair under `<root_dir>/<queue_name>/`:
//!
//! ```text
//! <root_dir>/
//!   tmp/                      shared staging area for in-flight pushes
//!   <queue_name>/
//!     queued/                 messages available for pull
//!     pulled/                 messages owned by a worker (or orphaned)
//! ```
//!
//! A message lives in exactly one state directory at any instant, and every
//! state transition is a single atomic filesystem operation: a no-replace
//! link publishes a new message, and same-filesystem renames carry it
//! between states after that. The filesystem is the only concurrency
//! primitive in the engine: two workers racing for the same head file
//! resolve the race there, not with locks.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::fs;

use crate::{
    codec,
    config::QueueConfig,
    dir,
    error::{QueueError, Result},
    message::{Flag, Message},
    telemetry::{TelemetryEvent, TelemetrySink, TracingSink},
};

/// A named, durable queue plus its policy configuration.
#[derive(Debug)]
pub struct Queue {
    config: QueueConfig,
    queued: PathBuf,
    pulled: PathBuf,
    tmp: PathBuf,
    dead_letters: Option<Box<Queue>>,
    sink: Arc<dyn TelemetrySink>,
}

impl Queue {
    /// Initialize a queue with the default tracing telemetry sink.
    ///
    /// # Errors
    /// See [`Queue::init_with_sink`].
    pub async fn init(config: QueueConfig) -> Result<Self> {
        Self::init_with_sink(config, Arc::new(TracingSink)).await
    }

    /// Initialize a queue: validate the configuration, create the state
    /// directories, build the dead-letter queue (recursively, bottom-up, so
    /// a sink always exists before its parent), and recover any messages a
    /// previous process left behind in `pulled/`.
    ///
    /// Once this returns, `pulled/` contains only messages owned by live
    /// workers.
    ///
    /// # Errors
    /// Fails on invalid configuration or on any filesystem error during
    /// directory setup or crash recovery.
    pub async fn init_with_sink(config: QueueConfig, sink: Arc<dyn TelemetrySink>) -> Result<Self> {
        config.validate()?;

        let dead_letters = match config.dead_letters.as_deref() {
            Some(dl) => {
                let dlq = Box::pin(Self::init_with_sink(dl.clone(), Arc::clone(&sink))).await?;
                Some(Box::new(dlq))
            }
            None => None,
        };

        let base = config.root_dir.join(&config.queue_name);
        let queued = base.join("queued");
        let pulled = base.join("pulled");
        let tmp = config.root_dir.join("tmp");

        dir::setup(&queued).await?;
        dir::setup(&pulled).await?;
        dir::setup(&tmp).await?;

        let queue = Self {
            config,
            queued,
            pulled,
            tmp,
            dead_letters,
            sink,
        };

        tracing::info!(target: "hopper", queue = queue.name(), "initialising queue");
        queue.requeue_unfinished().await?;

        Ok(queue)
    }

    /// The queue's name.
    pub fn name(&self) -> &str {
        &self.config.queue_name
    }

    /// The configuration this queue was initialized with.
    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// The dead-letter queue, when one is configured.
    pub fn dead_letters(&self) -> Option<&Self> {
        self.dead_letters.as_deref()
    }

    /// Directory holding messages available for pull.
    pub fn queued_dir(&self) -> &Path {
        &self.queued
    }

    /// Directory holding messages currently owned by workers.
    pub fn pulled_dir(&self) -> &Path {
        &self.pulled
    }

    /// Snapshot of how many messages are waiting in `queued/`.
    ///
    /// # Errors
    /// Fails if the directory cannot be read.
    pub async fn len(&self) -> Result<usize> {
        dir::file_count(&self.queued).await
    }

    /// Durably enqueue an opaque payload.
    ///
    /// The payload is staged into `tmp/` (fsynced, size-checked) and then
    /// atomically published into `queued/`. If this returns `Ok`, the
    /// message survives a crash.
    ///
    /// # Errors
    /// Returns [`QueueError::Full`] at capacity, [`QueueError::TooLarge`]
    /// over the size bound, or the underlying I/O error.
    pub async fn push(&self, payload: &[u8]) -> Result<()> {
        let queued = dir::file_count(&self.queued).await?;
        self.sink.record(&TelemetryEvent::Length {
            queue: self.name().to_string(),
            length: queued,
        });

        // Advisory check: concurrent producers can overshoot by at most the
        // number of in-flight pushes.
        if let Some(max) = self.config.max_queued_messages
            && queued >= max
        {
            return Err(QueueError::Full { queued, max });
        }

        let staged = codec::write_payload(&self.tmp, payload, self.config.max_message_bytes).await?;
        match self.place_in_queued(&staged).await {
            Ok(path) => {
                self.sink.record(&TelemetryEvent::Push {
                    queue: self.name().to_string(),
                    items: 1,
                });
                tracing::debug!(
                    target: "hopper",
                    queue = self.name(),
                    file = %path.display(),
                    "message queued"
                );
                Ok(())
            }
            Err(e) => {
                // Do not leave the rejected payload behind in tmp/.
                let _ = fs::remove_file(&staged).await;
                Err(e)
            }
        }
    }

    /// Publish a staged payload into `queued/` under a free
    /// timestamp-derived name.
    ///
    /// A rename would silently replace an existing destination, so two
    /// same-millisecond pushes racing for one name could erase an
    /// already-durable message. Hard-linking the staged file into place is
    /// the atomic no-replace claim: the loser gets `AlreadyExists` and
    /// bumps the timestamp, and the staged copy is unlinked only once the
    /// claim has landed.
    async fn place_in_queued(&self, staged: &Path) -> Result<PathBuf> {
        let name = staged
            .file_name()
            .and_then(std::ffi::OsStr::to_str)
            .ok_or_else(|| QueueError::BadName(staged.display().to_string()))?;
        let mut stamp: u64 = name
            .parse()
            .map_err(|_| QueueError::BadName(name.to_string()))?;

        loop {
            let dest = self.queued.join(stamp.to_string());
            match fs::hard_link(staged, &dest).await {
                Ok(()) => {
                    // The message is already durable under its queued
                    // name; a stray staged copy is not worth failing the
                    // push over.
                    if let Err(e) = fs::remove_file(staged).await {
                        tracing::warn!(
                            target: "hopper",
                            queue = self.name(),
                            file = %staged.display(),
                            error = %e,
                            "staged payload left behind in tmp/"
                        );
                    }
                    return Ok(dest);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => stamp += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Claim the oldest queued message, transferring it into `pulled/`.
    ///
    /// Returns `None` when the queue is empty or another worker won the
    /// rename race. Expired messages encountered at the head are routed as
    /// [`Flag::Dead`] and the pull moves on to the next candidate, so a
    /// worker never sees a message past its TTL.
    ///
    /// # Errors
    /// Fails if the directory cannot be read or an expired head cannot be
    /// routed to the dead-letter queue.
    pub async fn pull(&self) -> Result<Option<Message>> {
        loop {
            let Some(head) = dir::first_file(&self.queued).await? else {
                return Ok(None);
            };

            let Ok(claimed) = dir::move_file(&head, &self.pulled, None).await else {
                // Another worker won the race for this head.
                return Ok(None);
            };

            let payload = match codec::read_payload(&claimed).await {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(
                        target: "hopper",
                        queue = self.name(),
                        file = %claimed.display(),
                        error = %e,
                        "payload unreadable; left in pulled/ for recovery"
                    );
                    return Ok(None);
                }
            };

            let message = match Message::from_path(claimed, payload) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(
                        target: "hopper",
                        queue = self.name(),
                        error = %e,
                        "claimed file has an unparseable name; left in pulled/"
                    );
                    return Ok(None);
                }
            };

            if let Some(ttl) = self.config.message_ttl_seconds
                && codec::now_ms().saturating_sub(message.timestamp_ms())
                    > ttl.saturating_mul(1000)
            {
                tracing::debug!(
                    target: "hopper",
                    queue = self.name(),
                    timestamp_ms = message.timestamp_ms(),
                    "message expired; routing as dead"
                );
                self.fail(&message, Flag::Dead).await?;
                continue;
            }

            self.sink.record(&TelemetryEvent::Pull {
                queue: self.name().to_string(),
                timestamp_ms: message.timestamp_ms(),
            });

            return Ok(Some(message));
        }
    }

    /// Terminal success: remove the message's file.
    ///
    /// Acknowledging a message twice is a caller bug and surfaces as an
    /// I/O error rather than being papered over.
    ///
    /// # Errors
    /// Fails if the file cannot be deleted.
    pub async fn acknowledge(&self, message: &Message) -> Result<()> {
        fs::remove_file(message.path()).await?;
        tracing::debug!(
            target: "hopper",
            queue = self.name(),
            timestamp_ms = message.timestamp_ms(),
            "message acknowledged"
        );
        Ok(())
    }

    /// Record a failed attempt and route the message accordingly.
    ///
    /// A [`Flag::Dead`] failure, or any failure once the retry budget is
    /// exhausted, is terminal: the message moves to the dead-letter queue
    /// with `.dead` appended, or is discarded when no dead-letter queue is
    /// configured. Any other failure renames the message back into
    /// `queued/` with the flag appended to its attempt history.
    ///
    /// # Errors
    /// Fails if the rename or delete cannot be performed.
    pub async fn fail(&self, message: &Message, flag: Flag) -> Result<()> {
        let exhausted = self
            .config
            .max_retries
            .is_some_and(|max| message.attempts().len() >= usize::try_from(max).unwrap_or(usize::MAX));

        if matches!(flag, Flag::Dead) || exhausted {
            match &self.dead_letters {
                Some(dlq) => {
                    let name = message.filename_with(&Flag::Dead);
                    dir::move_file(message.path(), &dlq.queued, Some(&name)).await?;
                    tracing::debug!(
                        target: "hopper",
                        queue = self.name(),
                        dead_letters = dlq.name(),
                        file = %name,
                        "message dead-lettered"
                    );
                }
                None => {
                    fs::remove_file(message.path()).await?;
                    tracing::debug!(
                        target: "hopper",
                        queue = self.name(),
                        timestamp_ms = message.timestamp_ms(),
                        "message discarded"
                    );
                }
            }
            return Ok(());
        }

        let name = message.filename_with(&flag);
        dir::move_file(message.path(), &self.queued, Some(&name)).await?;
        tracing::debug!(
            target: "hopper",
            queue = self.name(),
            file = %name,
            "message requeued"
        );
        Ok(())
    }

    /// Crash recovery: everything found in `pulled/` at init time was
    /// orphaned by a previous process and is failed back as a timeout.
    ///
    /// A file whose payload can no longer be read is routed as dead instead
    /// of being retried; a file whose name does not even parse is left in
    /// place for an operator, since no retry policy can be derived for it.
    async fn requeue_unfinished(&self) -> Result<()> {
        for path in dir::all_files(&self.pulled).await? {
            let (payload, flag) = match codec::read_payload(&path).await {
                Ok(payload) => (payload, Flag::Timeout),
                Err(e) => {
                    tracing::warn!(
                        target: "hopper",
                        queue = self.name(),
                        file = %path.display(),
                        error = %e,
                        "unreadable payload found during recovery; routing as dead"
                    );
                    (Vec::new().into(), Flag::Dead)
                }
            };

            match Message::from_path(path.clone(), payload) {
                Ok(message) => self.fail(&message, flag).await?,
                Err(e) => {
                    tracing::error!(
                        target: "hopper",
                        queue = self.name(),
                        file = %path.display(),
                        error = %e,
                        "unparseable filename in pulled/; leaving in place"
                    );
                }
            }
        }

        Ok(())
    }
}
