//! Per-connection worker state machine.
//!
//! A [`WorkerHandle`] sits on the connection's reader task. It answers
//! `CANCEL` on the spot and queues everything else to a single executor
//! ([`Worker`]), which owns the POSW context and runs COMMIT/OPEN on the
//! blocking pool one at a time. Queuing an INIT swaps in its fresh
//! cancellation token immediately, so a CANCEL that follows it in the
//! stream applies to it.
//!
//! ```text
//!            INIT               COMMIT              OPEN
//!   empty ─────────► initialized ──────► committed ─────► committed
//!     ▲                  │  ▲               │
//!     └──── INIT ────────┘  └── COMMIT ─────┘
//!   DISPOSE from any state ─► disposed (terminal)
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tollgate_pow::control::{Control, ProgressSink};
use tollgate_pow::open::OpenRequest;
use tollgate_pow::posw::{PoswContext, PoswParams};
use tollgate_pow::{ErrorKind, PowError};
use tollgate_types::progress::Progress;
use tollgate_types::protocol::{Command, Reply, Request};
use tollgate_types::wire::WireOpenEntry;

use crate::config::LimitsConfig;

/// Largest meaningful hashcash difficulty for a 256-bit digest.
const MAX_HASHCASH_BITS: u64 = 256;

/// Outbound message queue shared by the reader, the executor and progress
/// sinks.
pub type ReplySender = mpsc::UnboundedSender<Reply>;

/// Errors surfaced to the host as `ERROR` replies.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Pow(#[from] PowError),

    #[error("computation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl WorkerError {
    /// Stable snake_case reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Pow(e) => e.reason(),
            Self::Join(_) => "internal",
        }
    }
}

/// The cancellation token of the current context, reachable from both the
/// reader and the executor.
#[derive(Clone, Debug, Default)]
pub struct CancelSlot(Arc<Mutex<CancellationToken>>);

impl CancelSlot {
    /// Cancel whatever is running (or will run) under the current token.
    pub fn cancel(&self) {
        self.lock().cancel();
    }

    pub fn current(&self) -> CancellationToken {
        self.lock().clone()
    }

    /// Install and return a fresh token.
    fn renew(&self) -> CancellationToken {
        let fresh = CancellationToken::new();
        *self.lock() = fresh.clone();
        fresh
    }

    fn lock(&self) -> MutexGuard<'_, CancellationToken> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A command waiting for the executor.
#[derive(Debug)]
pub struct Job {
    pub command: Command,
    /// Correlation id to echo.
    pub rid: Value,
    /// Raw request parameters.
    pub params: Map<String, Value>,
    /// Token the command runs under. An INIT installs a fresh one in the
    /// slot when it is queued, so a later CANCEL always lands on it.
    pub token: CancellationToken,
}

impl Job {
    pub fn new(
        command: Command,
        rid: Value,
        params: Map<String, Value>,
        cancel: &CancelSlot,
    ) -> Self {
        let token = match command {
            Command::Init => cancel.renew(),
            _ => cancel.current(),
        };
        Self {
            command,
            rid,
            params,
            token,
        }
    }
}

/// Reader-side handle of a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    jobs: mpsc::UnboundedSender<Job>,
    cancel: CancelSlot,
    replies: ReplySender,
    executor: JoinHandle<()>,
}

impl WorkerHandle {
    /// Start an executor task that sends its replies to `replies`.
    pub fn spawn(limits: LimitsConfig, replies: ReplySender, cancel: CancelSlot) -> Self {
        let (jobs, queue) = mpsc::unbounded_channel();
        let worker = Worker::new(limits, replies.clone(), cancel.clone());
        let executor = tokio::spawn(worker.run(queue));
        Self {
            jobs,
            cancel,
            replies,
            executor,
        }
    }

    /// Route one parsed request.
    pub fn submit(&self, request: Request) {
        let Request { kind, rid, params } = request;
        let Some(command) = Command::parse(&kind) else {
            debug!(kind = %kind, "unknown command");
            self.reply(Reply::error(
                rid,
                "unknown_command",
                format!("unknown command {kind:?}"),
            ));
            return;
        };

        match command {
            Command::Cancel => {
                self.cancel.cancel();
                debug!("cancel requested");
                self.reply(Reply::CancelOk { rid });
                return;
            }
            // Interrupt running work now; teardown waits its turn in the queue.
            Command::Dispose => self.cancel.cancel(),
            _ => {}
        }

        let job = Job::new(command, rid, params, &self.cancel);
        if let Err(mpsc::error::SendError(job)) = self.jobs.send(job) {
            warn!(command = job.command.as_str(), "executor gone, dropping command");
        }
    }

    /// Report a line that could not be parsed.
    pub fn reject_line(&self, message: impl Into<String>) {
        self.reply(Reply::error(Value::Null, "parse_error", message));
    }

    /// Stop accepting commands and wait until queued ones have run.
    pub async fn finish(self) {
        drop(self.jobs);
        if let Err(e) = self.executor.await {
            warn!("worker executor failed: {}", e);
        }
    }

    fn reply(&self, reply: Reply) {
        // The writer only disappears when the connection is gone.
        let _ = self.replies.send(reply);
    }
}

/// Executor-side state: the single POSW context and its lifecycle.
pub struct Worker {
    limits: LimitsConfig,
    replies: ReplySender,
    cancel: CancelSlot,
    token: CancellationToken,
    context: Option<PoswContext>,
    disposed: bool,
}

impl Worker {
    pub fn new(limits: LimitsConfig, replies: ReplySender, cancel: CancelSlot) -> Self {
        let token = cancel.current();
        Self {
            limits,
            replies,
            cancel,
            token,
            context: None,
            disposed: false,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Drain `queue`, answering each job in order.
    pub async fn run(mut self, mut queue: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = queue.recv().await {
            let reply = self.execute(job).await;
            if self.replies.send(reply).is_err() {
                break;
            }
        }
        debug!("worker executor stopped");
    }

    /// Run one job to its completion reply.
    pub async fn execute(&mut self, job: Job) -> Reply {
        let command = job.command;
        let rid = job.rid.clone();
        debug!(command = command.as_str(), rid = %rid, "executing");
        match self.dispatch(job).await {
            Ok(reply) => reply,
            Err(err) => {
                let reason = err.reason();
                match &err {
                    WorkerError::Pow(e) if e.kind() == ErrorKind::Aborted => {
                        warn!(command = command.as_str(), "command aborted");
                    }
                    _ => debug!(command = command.as_str(), reason, "command failed: {}", err),
                }
                Reply::error(rid, reason, err.to_string())
            }
        }
    }

    async fn dispatch(&mut self, job: Job) -> Result<Reply, WorkerError> {
        let Job {
            command,
            rid,
            params,
            token,
        } = job;
        if command == Command::Dispose {
            self.dispose();
            return Ok(Reply::DisposeOk { rid });
        }
        if self.disposed {
            return Err(PowError::Disposed.into());
        }
        match command {
            Command::Init => self.init(rid, &params, token),
            Command::Commit => self.commit(rid).await,
            Command::Open => self.open(rid, &params).await,
            // Normally answered on the reader; harmless if it gets here.
            Command::Cancel | Command::Dispose => {
                self.cancel.cancel();
                Ok(Reply::CancelOk { rid })
            }
        }
    }

    fn init(
        &mut self,
        rid: Value,
        params: &Map<String, Value>,
        token: CancellationToken,
    ) -> Result<Reply, WorkerError> {
        self.context = None;
        self.token = token;
        let params = init_params(params, &self.limits)?;
        info!(
            steps = params.steps,
            hashcash_bits = params.hashcash_bits,
            segment_len = params.segment_len,
            "worker initialized"
        );
        self.context = Some(PoswContext::new(params)?);
        Ok(Reply::InitOk { rid })
    }

    async fn commit(&mut self, rid: Value) -> Result<Reply, WorkerError> {
        let mut context = self.context.take().ok_or(PowError::NotInitialized)?;
        let control = self.control(&context, &rid);
        let (context, result) = tokio::task::spawn_blocking(move || {
            let result = context.commit(&control);
            (context, result)
        })
        .await?;
        self.context = Some(context);

        let commitment = result?;
        info!(attempts = commitment.attempts, "commitment produced");
        Ok(Reply::CommitOk {
            rid,
            root_b64: commitment.root_b64(),
            nonce: commitment.nonce,
        })
    }

    async fn open(&mut self, rid: Value, params: &Map<String, Value>) -> Result<Reply, WorkerError> {
        let committed = self
            .context
            .as_ref()
            .is_some_and(|c| c.commitment().is_some());
        if !committed {
            return Err(PowError::CommitMissing.into());
        }
        let request = open_request(params)?;
        let context = self.context.take().ok_or(PowError::CommitMissing)?;
        let control = self.control(&context, &rid);
        let (context, result) = tokio::task::spawn_blocking(move || {
            let result = context.open(&request, &control);
            (context, result)
        })
        .await?;
        self.context = Some(context);

        let opens = result?.iter().map(WireOpenEntry::from).collect();
        Ok(Reply::OpenOk { rid, opens })
    }

    fn dispose(&mut self) {
        self.cancel.cancel();
        self.context = None;
        if !self.disposed {
            info!("worker disposed");
        }
        self.disposed = true;
    }

    fn control(&self, context: &PoswContext, rid: &Value) -> Control {
        let replies = self.replies.clone();
        let rid = rid.clone();
        let sink: Arc<dyn ProgressSink> = Arc::new(move |progress: Progress| {
            let _ = replies.send(Reply::progress(rid.clone(), progress));
        });
        context.params().control(self.token.clone()).with_sink(sink)
    }
}

/// A finite number, accepting numeric strings the way hosts sometimes send
/// them.
fn number(params: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = match params.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    value.filter(|v| v.is_finite())
}

/// Floor of a strictly positive number.
fn positive(params: &Map<String, Value>, key: &str) -> Option<u64> {
    number(params, key)
        .filter(|v| *v > 0.0)
        .map(|v| v.floor() as u64)
}

/// Floor of any number, raised to at least one.
fn cadence(params: &Map<String, Value>, key: &str) -> Option<u32> {
    number(params, key).map(|v| v.floor().clamp(1.0, f64::from(u32::MAX)) as u32)
}

/// Normalize INIT parameters.
pub fn init_params(
    params: &Map<String, Value>,
    limits: &LimitsConfig,
) -> Result<PoswParams, PowError> {
    let binding = params
        .get("bindingString")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let steps = positive(params, "steps").unwrap_or(1).max(1);
    if steps > u64::from(limits.max_steps) {
        return Err(PowError::Configuration(format!(
            "steps {steps} exceeds limit {}",
            limits.max_steps
        )));
    }
    let bits = positive(params, "hashcashBits").unwrap_or(0);
    if bits > MAX_HASHCASH_BITS {
        return Err(PowError::Configuration(format!(
            "hashcashBits {bits} exceeds {MAX_HASHCASH_BITS}"
        )));
    }
    let segment_len = positive(params, "segmentLen").unwrap_or(1);
    let yield_every = cadence(params, "yieldEvery").unwrap_or(limits.default_yield_every.max(1));
    let progress_every = cadence(params, "progressEvery").unwrap_or(yield_every);

    // Both bounds were checked against u32 limits above.
    let steps = u32::try_from(steps).unwrap_or(u32::MAX);
    let segment_len = u32::try_from(segment_len).unwrap_or(u32::MAX);
    Ok(PoswParams::new(binding, steps)?
        .with_hashcash_bits(bits as u32)
        .with_segment_len(segment_len)
        .with_cadence(yield_every, progress_every))
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn integer_list(params: &Map<String, Value>, key: &str) -> Result<Option<Vec<i64>>, PowError> {
    let Some(Value::Array(items)) = params.get(key) else {
        return Ok(None);
    };
    items
        .iter()
        .map(|v| integer(v).ok_or_else(|| PowError::IndicesInvalid(format!("{key} holds {v}"))))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Parse OPEN parameters. A missing or non-array `indices` yields an empty
/// request, which validation rejects.
pub fn open_request(params: &Map<String, Value>) -> Result<OpenRequest, PowError> {
    Ok(OpenRequest {
        indices: integer_list(params, "indices")?.unwrap_or_default(),
        seg_lens: integer_list(params, "segLens")?,
        spine_pos: integer_list(params, "spinePos")?,
    })
}
