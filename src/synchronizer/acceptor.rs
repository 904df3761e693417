//! The accepting role executor.
//!
//! Stage one consumes the initiator's proposal, selects one algorithm per
//! category in catalog order, and answers with the selection, this side's
//! public key, and its salt half. Stage two consumes the initiator's
//! key-exchange frame, derives the session keys, audits the transcript,
//! and answers with the encrypted verification payload and this side's
//! transcript signature.

use crate::agreement::KeyAgreementModel;
use crate::buffer::{PublicKey, Salt, SupplementalData};
use crate::catalog::AlgorithmCategory;
use crate::error::SecurityError;
use crate::package::VerificationStatus;
use crate::suite::CipherSuite;
use crate::synchronizer::context::SynchronizerContext;
use crate::synchronizer::{RoleExecutor, SynchronizationResult, SynchronizationStatus, Tracker};
use crate::wire::{
    self, Reader, MAX_ALGORITHM_LIST_SIZE, MAX_ALGORITHM_NAME_SIZE, MAX_PUBLIC_KEY_SIZE,
    MAX_SALT_SIZE,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    CipherSuiteSelection,
    KeyExchange,
    Synchronized,
}

const STAGE_COUNT: u32 = 3;

/// Proposal ceiling: three packed algorithm lists.
const MAX_PROPOSAL_SIZE: usize = 3 * MAX_ALGORITHM_LIST_SIZE;

/// Key-exchange frame floor: three u16 name lengths.
const MIN_KEY_EXCHANGE_SIZE: usize = 3 * 2;

pub(super) struct AcceptingRoleExecutor {
    tracker: Tracker<Stage>,
    model: Option<KeyAgreementModel>,
}

impl AcceptingRoleExecutor {
    pub(super) fn new() -> Self {
        Self { tracker: Tracker::new(Stage::CipherSuiteSelection), model: None }
    }

    fn execute_selection_stage(
        &mut self,
        context: &mut SynchronizerContext,
        request: &[u8],
    ) -> SynchronizationResult {
        let response = match self.on_selection_request(context, request) {
            Ok(response) => response,
            Err(_) => {
                self.tracker.set_error();
                return SynchronizationResult::error();
            }
        };

        self.tracker.record(request);
        self.tracker.record(&response);
        self.tracker.set_stage(Stage::KeyExchange);

        SynchronizationResult::new(self.tracker.status(), response)
    }

    fn on_selection_request(
        &mut self,
        context: &mut SynchronizerContext,
        request: &[u8],
    ) -> Result<Vec<u8>, SecurityError> {
        if request.len() > MAX_PROPOSAL_SIZE {
            return Err(SecurityError::Malformed("proposal size"));
        }

        let catalog = context
            .supported_algorithms()
            .ok_or(SecurityError::NotReady("supported algorithms released"))?;

        let mut reader = Reader::new(request);
        let offered_agreements = reader.take_algorithm_list()?;
        let offered_ciphers = reader.take_algorithm_list()?;
        let offered_hashes = reader.take_algorithm_list()?;
        if !reader.is_exhausted() {
            return Err(SecurityError::Malformed("trailing bytes"));
        }

        // Catalog order decides each category; the peer's ordering carries
        // no weight.
        let (agreement_level, key_agreement) = catalog
            .first_match(AlgorithmCategory::KeyAgreement, &offered_agreements)
            .ok_or(SecurityError::RejectedAlgorithm("no mutual key agreement".to_string()))?;
        let (cipher_level, cipher) = catalog
            .first_match(AlgorithmCategory::Cipher, &offered_ciphers)
            .ok_or(SecurityError::RejectedAlgorithm("no mutual cipher".to_string()))?;
        let (hash_level, hash_function) = catalog
            .first_match(AlgorithmCategory::HashFunction, &offered_hashes)
            .ok_or(SecurityError::RejectedAlgorithm("no mutual hash function".to_string()))?;

        let level = agreement_level.min(cipher_level).min(hash_level);
        let suite = CipherSuite::new(level, key_agreement, cipher, hash_function)?;

        let mut model = KeyAgreementModel::create(key_agreement)?;
        let public_key = model.setup_key_exchange(&suite)?;
        self.model = Some(model);

        let mut response = Vec::new();
        wire::put_chunk_u16(&mut response, suite.key_agreement_name().as_bytes());
        wire::put_chunk_u16(&mut response, suite.cipher_name().as_bytes());
        wire::put_chunk_u16(&mut response, suite.hash_function_name().as_bytes());
        wire::put_chunk_u32(&mut response, public_key.as_slice());

        {
            let salt = context.setup_key_share(suite, public_key)?;
            wire::put_chunk_u16(&mut response, salt.as_slice());
        }

        Ok(response)
    }

    fn execute_key_exchange_stage(
        &mut self,
        context: &mut SynchronizerContext,
        request: &[u8],
    ) -> SynchronizationResult {
        let mut response = match self.on_key_exchange_request(context, request) {
            Ok(response) => response,
            Err(_) => {
                self.tracker.set_error();
                return SynchronizationResult::error();
            }
        };

        let Some(package) = context.package() else {
            self.tracker.set_error();
            return SynchronizationResult::error();
        };

        // Audit every frame the initiator has seen, then countersign the
        // transcript with our own key.
        if self.tracker.verify_transaction(package, request) != VerificationStatus::Success {
            self.tracker.set_error();
            return SynchronizationResult::error();
        }
        if self.tracker.sign_transaction(package, &mut response).is_err() {
            self.tracker.set_error();
            return SynchronizationResult::error();
        }

        self.tracker.finalize(Stage::Synchronized);
        SynchronizationResult::new(self.tracker.status(), response)
    }

    fn on_key_exchange_request(
        &mut self,
        context: &mut SynchronizerContext,
        request: &[u8],
    ) -> Result<Vec<u8>, SecurityError> {
        let model = self.model.as_mut().ok_or(SecurityError::NotReady("model not created"))?;
        let supplemental_size = if model.has_supplemental_data() {
            model.supplemental_data_size()?
        } else {
            0
        };

        let maximum_size = 3 * (2 + MAX_ALGORITHM_NAME_SIZE)
            + 4
            + MAX_PUBLIC_KEY_SIZE
            + 2
            + MAX_SALT_SIZE
            + supplemental_size
            + context.verification_data_size()
            + context.signature_size();
        if request.len() < MIN_KEY_EXCHANGE_SIZE || request.len() > maximum_size {
            return Err(SecurityError::Malformed("key exchange frame size"));
        }

        let mut reader = Reader::new(request);

        // The initiator echoes the selected names; any drift is tampering
        // or a misbehaving peer.
        {
            let suite = context.suite().ok_or(SecurityError::NotReady("no suite selected"))?;
            if reader.take_name()? != suite.key_agreement_name()
                || reader.take_name()? != suite.cipher_name()
                || reader.take_name()? != suite.hash_function_name()
            {
                return Err(SecurityError::Malformed("selected algorithm echo"));
            }
        }

        let peer_key_size = reader.take_u32()? as usize;
        if peer_key_size != context.public_key_size() {
            return Err(SecurityError::Malformed("public key size"));
        }
        let peer_public_key = PublicKey::new(reader.take_bytes(peer_key_size)?.to_vec());

        let peer_salt_size = reader.take_u16()? as usize;
        if peer_salt_size != context.salt_size() {
            return Err(SecurityError::Malformed("salt size"));
        }
        let peer_salt = Salt::new(reader.take_bytes(peer_salt_size)?.to_vec());

        let shared_secret = if model.has_supplemental_data() {
            let supplemental =
                SupplementalData::new(reader.take_bytes(supplemental_size)?.to_vec());
            model.compute_shared_secret_from_supplemental(&supplemental)?
        } else {
            model.compute_shared_secret(&peer_public_key)?.0
        };

        context.set_peer_public_key_and_salt(peer_public_key, &peer_salt)?;

        // The keystore moves into the cipher package here.
        let encrypted_verification = context.generate_session_keys(shared_secret)?;

        let peer_verification = reader.take_bytes(context.verification_data_size())?;
        if context.verify_key_share(peer_verification) != VerificationStatus::Success {
            return Err(SecurityError::VerificationFailed);
        }

        // Only the transcript signature may remain; it is audited against
        // the full transcript by the caller.
        if reader.remaining() != context.signature_size() {
            return Err(SecurityError::Malformed("trailing bytes"));
        }

        Ok(encrypted_verification)
    }
}

impl RoleExecutor for AcceptingRoleExecutor {
    fn stages(&self) -> u32 {
        STAGE_COUNT
    }

    fn status(&self) -> SynchronizationStatus {
        self.tracker.status()
    }

    fn synchronized(&self) -> bool {
        self.tracker.status() == SynchronizationStatus::Ready
    }

    fn initialize(&mut self, _context: &mut SynchronizerContext) -> SynchronizationResult {
        // The acceptor speaks only in response to the initiator.
        SynchronizationResult::new(self.tracker.status(), Vec::new())
    }

    fn synchronize(
        &mut self,
        context: &mut SynchronizerContext,
        frame: &[u8],
    ) -> SynchronizationResult {
        match self.tracker.stage() {
            Stage::CipherSuiteSelection => self.execute_selection_stage(context, frame),
            Stage::KeyExchange => self.execute_key_exchange_stage(context, frame),
            Stage::Synchronized => {
                self.tracker.set_error();
                SynchronizationResult::error()
            }
        }
    }
}
