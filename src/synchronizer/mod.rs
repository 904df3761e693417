//! The synchronizer: a two-role, multi-stage handshake state machine.
//!
//! The initiator walks `CipherSuiteSelection → KeyVerification →
//! Synchronized`; the acceptor walks `CipherSuiteSelection → KeyExchange →
//! Synchronized`. Each `synchronize` call consumes one peer frame and may
//! emit the next outbound frame.
//!
//! A transcript accumulates every frame in both directions. The final
//! frame each side emits carries an HMAC over the whole transcript, and
//! each side verifies the peer's HMAC over the same accumulation, so
//! tampering with any earlier frame surfaces at the last stage.

mod acceptor;
mod context;
mod initiator;

pub use context::SynchronizerContext;

use std::sync::Weak;

use acceptor::AcceptingRoleExecutor;
use initiator::InitiatingRoleExecutor;

use crate::buffer::SecureBuffer;
use crate::catalog::SupportedAlgorithms;
use crate::error::SecurityError;
use crate::keystore::ExchangeRole;
use crate::package::{CipherPackage, VerificationStatus};

// ---------------------------------------------------------------------------
// Status and results
// ---------------------------------------------------------------------------

/// Where the exchange stands after a synchronizer call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynchronizationStatus {
    /// More frames are expected.
    Processing,
    /// The exchange completed; `finalize` will yield the cipher package.
    Ready,
    /// The exchange failed. Terminal; no further frames are processed.
    Error,
}

/// Status plus the next outbound frame (empty when there is none).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynchronizationResult {
    pub status: SynchronizationStatus,
    pub message: Vec<u8>,
}

impl SynchronizationResult {
    fn new(status: SynchronizationStatus, message: Vec<u8>) -> Self {
        Self { status, message }
    }

    fn error() -> Self {
        Self::new(SynchronizationStatus::Error, Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Transcript tracker
// ---------------------------------------------------------------------------

/// Per-executor bookkeeping: the stage, the status, and the signed
/// transcript accumulated as frames flow.
struct Tracker<Stage: Copy> {
    status: SynchronizationStatus,
    stage: Stage,
    transaction: SecureBuffer,
}

impl<Stage: Copy> Tracker<Stage> {
    fn new(initial: Stage) -> Self {
        Self {
            status: SynchronizationStatus::Processing,
            stage: initial,
            transaction: SecureBuffer::from_vec(Vec::new()),
        }
    }

    fn status(&self) -> SynchronizationStatus {
        self.status
    }

    fn set_error(&mut self) {
        self.status = SynchronizationStatus::Error;
    }

    fn stage(&self) -> Stage {
        self.stage
    }

    fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
    }

    fn is_transaction_empty(&self) -> bool {
        self.transaction.is_empty()
    }

    /// Append a frame to the transcript.
    fn record(&mut self, frame: &[u8]) {
        self.transaction.append(frame);
    }

    /// Append `message` to the transcript, sign the whole transcript, and
    /// attach the signature to both the message and the transcript.
    fn sign_transaction(
        &mut self,
        package: &CipherPackage,
        message: &mut Vec<u8>,
    ) -> Result<(), SecurityError> {
        self.transaction.append(message);
        let content_size = message.len();
        package.sign(self.transaction.as_slice(), message)?;
        self.transaction.append(&message[content_size..]);
        Ok(())
    }

    /// Append `message` (which ends with the peer's signature) to the
    /// transcript and verify the signature over everything before it.
    fn verify_transaction(&mut self, package: &CipherPackage, message: &[u8]) -> VerificationStatus {
        self.transaction.append(message);
        package.verify(self.transaction.as_slice())
    }

    /// Mark the exchange complete and erase the transcript.
    fn finalize(&mut self, stage: Stage) {
        self.status = SynchronizationStatus::Ready;
        self.transaction.erase();
        self.stage = stage;
    }
}

// ---------------------------------------------------------------------------
// Role executors
// ---------------------------------------------------------------------------

trait RoleExecutor: Send {
    fn stages(&self) -> u32;
    fn status(&self) -> SynchronizationStatus;
    fn synchronized(&self) -> bool;
    fn initialize(&mut self, context: &mut SynchronizerContext) -> SynchronizationResult;
    fn synchronize(
        &mut self,
        context: &mut SynchronizerContext,
        frame: &[u8],
    ) -> SynchronizationResult;
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

/// One peer's half of a key-synchronization exchange.
pub struct Synchronizer {
    context: SynchronizerContext,
    executor: Box<dyn RoleExecutor>,
}

impl Synchronizer {
    pub fn new(role: ExchangeRole, supported_algorithms: Weak<SupportedAlgorithms>) -> Self {
        let context = SynchronizerContext::new(role, supported_algorithms);
        let executor: Box<dyn RoleExecutor> = match role {
            ExchangeRole::Initiator => Box::new(InitiatingRoleExecutor::new()),
            ExchangeRole::Acceptor => Box::new(AcceptingRoleExecutor::new()),
        };
        Self { context, executor }
    }

    pub fn role(&self) -> ExchangeRole {
        self.context.role()
    }

    /// Number of frames this role expects to process.
    pub fn stages(&self) -> u32 {
        self.executor.stages()
    }

    pub fn status(&self) -> SynchronizationStatus {
        self.executor.status()
    }

    pub fn synchronized(&self) -> bool {
        self.executor.synchronized()
    }

    /// Produce the first outbound frame (initiator) or arm the state
    /// machine (acceptor, which emits nothing).
    pub fn initialize(&mut self) -> SynchronizationResult {
        self.executor.initialize(&mut self.context)
    }

    /// Feed one peer frame through the state machine.
    pub fn synchronize(&mut self, frame: &[u8]) -> SynchronizationResult {
        if self.executor.status() == SynchronizationStatus::Error {
            return SynchronizationResult::error();
        }
        self.executor.synchronize(&mut self.context, frame)
    }

    /// Yield the cipher package after both sides report `Ready`. The
    /// synchronizer is inert afterwards.
    pub fn finalize(&mut self) -> Option<CipherPackage> {
        if self.executor.synchronized() {
            self.context.release_package()
        } else {
            None
        }
    }
}
