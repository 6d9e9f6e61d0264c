//! Cooperative-cancellation execution workers and the four deterministic
//! artifact-producing executor lanes (`spec.md` §4.7/§4.7.1).

pub mod cancellation;
pub mod lanes;
pub mod pdf14;

pub use cancellation::CancellationRegistry;

use std::path::PathBuf;

use async_trait::async_trait;
use pulz_types::{ExecutionPlan, ExecutorOutcome, Lane, Proposal};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("execution was cancelled")]
    Cancelled,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// What an [`Executor`] needs to plan and run: where to write output files,
/// which mission (if any) this execution belongs to, and the cooperative
/// cancel signal it must poll between I/O steps (`spec` §5 "Cancellation and
/// timeouts").
pub struct ExecutionContext {
    pub output_dir: PathBuf,
    pub mission_id: Option<String>,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    /// Returns `Err(ExecutorError::Cancelled)` if the token has fired. Call
    /// this at every I/O boundary inside `run` (`spec` §9 design note on
    /// cooperative cancellation).
    pub fn check_cancelled(&self) -> Result<(), ExecutorError> {
        if self.cancel.is_cancelled() {
            Err(ExecutorError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A progress sink executors emit through while running, decoupled from how
/// the caller actually delivers events (broadcaster fan-out, telemetry
/// persistence, or both) — executors are polymorphic over the channel, not
/// inheriting from a base class (`spec` §9).
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn emit(&self, kind: &str, payload: Value);
}

/// A deterministic artifact-producing lane. `plan` estimates cost before
/// committing to `run`; `run` does the actual work and must poll
/// `ctx.cancel` between I/O operations.
#[async_trait]
pub trait Executor: Send + Sync {
    fn lane(&self) -> Lane;

    async fn plan(
        &self,
        proposal: &Proposal,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionPlan, ExecutorError>;

    async fn run(
        &self,
        execution_id: &str,
        proposal: &Proposal,
        ctx: &ExecutionContext,
        emit: &dyn ProgressSink,
    ) -> Result<ExecutorOutcome, ExecutorError>;
}

/// Resolves a [`Lane`] into its boxed [`Executor`] implementation.
pub fn resolve_executor(lane: Lane) -> Box<dyn Executor> {
    match lane {
        Lane::Html => Box::new(lanes::html::HtmlExecutor),
        Lane::Pdf => Box::new(lanes::pdf::PdfExecutor),
        Lane::Doc => Box::new(lanes::doc::DocExecutor),
        Lane::Site => Box::new(lanes::site::SiteExecutor),
    }
}

/// SHA-256 of `bytes`, lowercase hex — used to stamp every artifact row
/// post-write (`spec` §4.7 step 4).
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
