//! The initiating role executor.
//!
//! Stage one sends the proposal (from `initialize`), consumes the
//! acceptor's selection response, performs the key exchange, and answers
//! with public key, salt, optional supplemental data, encrypted
//! verification data, and the transcript signature. Stage two consumes the
//! acceptor's verification frame and closes the exchange.

use crate::agreement::KeyAgreementModel;
use crate::buffer::{PublicKey, Salt};
use crate::error::SecurityError;
use crate::package::VerificationStatus;
use crate::synchronizer::context::SynchronizerContext;
use crate::synchronizer::{RoleExecutor, SynchronizationResult, SynchronizationStatus, Tracker};
use crate::wire::{self, Reader, MAX_ALGORITHM_NAME_SIZE, MAX_PUBLIC_KEY_SIZE, MAX_SALT_SIZE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    CipherSuiteSelection,
    KeyVerification,
    Synchronized,
}

const STAGE_COUNT: u32 = 2;

/// Selection response floor: three u16 name lengths.
const MIN_SELECTION_RESPONSE_SIZE: usize = 3 * 2;

/// Selection response ceiling: three bounded names, a u32-prefixed public
/// key, and a u16-prefixed salt.
const MAX_SELECTION_RESPONSE_SIZE: usize =
    3 * (2 + MAX_ALGORITHM_NAME_SIZE) + 4 + MAX_PUBLIC_KEY_SIZE + 2 + MAX_SALT_SIZE;

pub(super) struct InitiatingRoleExecutor {
    tracker: Tracker<Stage>,
}

impl InitiatingRoleExecutor {
    pub(super) fn new() -> Self {
        Self { tracker: Tracker::new(Stage::CipherSuiteSelection) }
    }

    fn execute_selection_stage(
        &mut self,
        context: &mut SynchronizerContext,
        response: &[u8],
    ) -> SynchronizationResult {
        let mut request = match self.on_selection_response(context, response) {
            Ok(request) => request,
            Err(_) => {
                self.tracker.set_error();
                return SynchronizationResult::error();
            }
        };

        self.tracker.record(response);
        self.tracker.set_stage(Stage::KeyVerification);

        // Sign the whole transcript so the acceptor can audit every frame
        // exchanged so far.
        let Some(package) = context.package() else {
            self.tracker.set_error();
            return SynchronizationResult::error();
        };
        if self.tracker.sign_transaction(package, &mut request).is_err() {
            self.tracker.set_error();
            return SynchronizationResult::error();
        }

        SynchronizationResult::new(self.tracker.status(), request)
    }

    fn on_selection_response(
        &mut self,
        context: &mut SynchronizerContext,
        response: &[u8],
    ) -> Result<Vec<u8>, SecurityError> {
        if response.len() < MIN_SELECTION_RESPONSE_SIZE
            || response.len() > MAX_SELECTION_RESPONSE_SIZE
        {
            return Err(SecurityError::Malformed("selection response size"));
        }

        let mut reader = Reader::new(response);
        let key_agreement = reader.take_name()?.to_string();
        let cipher = reader.take_name()?.to_string();
        let hash_function = reader.take_name()?.to_string();

        let suite = context.create_mutual_suite(&key_agreement, &cipher, &hash_function)?;

        let mut model = KeyAgreementModel::create(&key_agreement)?;
        let public_key = model.setup_key_exchange(&suite)?;

        // The remainder must be exactly the peer's public key and salt.
        let peer_key_size = reader.take_u32()? as usize;
        if peer_key_size != public_key.len() {
            return Err(SecurityError::Malformed("public key size"));
        }
        let peer_public_key = PublicKey::new(reader.take_bytes(peer_key_size)?.to_vec());

        let peer_salt_size = reader.take_u16()? as usize;
        if peer_salt_size != context.salt_size() {
            return Err(SecurityError::Malformed("salt size"));
        }
        let peer_salt = Salt::new(reader.take_bytes(peer_salt_size)?.to_vec());

        if !reader.is_exhausted() {
            return Err(SecurityError::Malformed("trailing bytes"));
        }

        let (shared_secret, supplemental) = model.compute_shared_secret(&peer_public_key)?;

        // Echo the negotiated names, then our public key and salt.
        let mut request = Vec::new();
        wire::put_chunk_u16(&mut request, key_agreement.as_bytes());
        wire::put_chunk_u16(&mut request, cipher.as_bytes());
        wire::put_chunk_u16(&mut request, hash_function.as_bytes());
        wire::put_chunk_u32(&mut request, public_key.as_slice());

        {
            let salt = context.setup_key_share(suite, public_key)?;
            wire::put_chunk_u16(&mut request, salt.as_slice());
        }

        context.set_peer_public_key_and_salt(peer_public_key, &peer_salt)?;

        // The keystore moves into the cipher package here; the encrypted
        // verification payload proves the derivation to the peer.
        let encrypted_verification = context.generate_session_keys(shared_secret)?;

        request.extend_from_slice(supplemental.as_slice());
        request.extend_from_slice(&encrypted_verification);

        Ok(request)
    }

    fn execute_verification_stage(
        &mut self,
        context: &mut SynchronizerContext,
        response: &[u8],
    ) -> SynchronizationResult {
        if !self.on_verification_response(context, response) {
            self.tracker.set_error();
            return SynchronizationResult::error();
        }

        let Some(package) = context.package() else {
            self.tracker.set_error();
            return SynchronizationResult::error();
        };
        if self.tracker.verify_transaction(package, response) != VerificationStatus::Success {
            self.tracker.set_error();
            return SynchronizationResult::error();
        }

        self.tracker.finalize(Stage::Synchronized);
        SynchronizationResult::new(self.tracker.status(), Vec::new())
    }

    fn on_verification_response(&self, context: &SynchronizerContext, response: &[u8]) -> bool {
        let verification_size = context.verification_data_size();
        if response.len() != verification_size + context.signature_size() {
            return false;
        }

        context.verify_key_share(&response[..verification_size]) == VerificationStatus::Success
    }
}

impl RoleExecutor for InitiatingRoleExecutor {
    fn stages(&self) -> u32 {
        STAGE_COUNT
    }

    fn status(&self) -> SynchronizationStatus {
        self.tracker.status()
    }

    fn synchronized(&self) -> bool {
        self.tracker.status() == SynchronizationStatus::Ready
    }

    fn initialize(&mut self, context: &mut SynchronizerContext) -> SynchronizationResult {
        if !self.tracker.is_transaction_empty() {
            self.tracker.set_error();
            return SynchronizationResult::error();
        }

        let request = match context.proposal_frame() {
            Ok(request) => request,
            Err(_) => {
                self.tracker.set_error();
                return SynchronizationResult::error();
            }
        };

        debug_assert_eq!(self.tracker.stage(), Stage::CipherSuiteSelection);
        self.tracker.record(&request);
        SynchronizationResult::new(self.tracker.status(), request)
    }

    fn synchronize(
        &mut self,
        context: &mut SynchronizerContext,
        frame: &[u8],
    ) -> SynchronizationResult {
        match self.tracker.stage() {
            Stage::CipherSuiteSelection => self.execute_selection_stage(context, frame),
            Stage::KeyVerification => self.execute_verification_stage(context, frame),
            Stage::Synchronized => {
                self.tracker.set_error();
                SynchronizationResult::error()
            }
        }
    }
}
