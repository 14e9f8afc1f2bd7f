// Consensus-critical. Changes require a protocol review + tests.
//! Proof-of-audit chain validation.
//!
//! An audit block attests to a run of previously accepted proof-of-stake and
//! proof-of-work blocks. Its `audited` list must pick up exactly where the
//! preceding audit block stopped, name that block in `prev_poa`, never
//! reference an audit block, never repeat the preceding block's entries and
//! respect the minimum spacing between audit blocks.
//!
//! Validation resolves the preceding audit block once ([`AuditState`]) and
//! then runs independent checks in a fixed order; the first failure wins.
//! Every chain read goes through the injected [`ChainView`].

use std::collections::HashSet;

use auditchain_core::{
    audited_merkle_root, block_hash, mined_hash, Block, BlockHash, Hash32, PoSBlockSummary,
};
use tracing::{debug, warn};

use crate::chain::{BlockIndexEntry, ChainView};
use crate::classify::is_poa_by_version;
use crate::error::{AuditError, ConsensusError};
use crate::params::{ConsensusParams, Network};
use crate::pow::check_proof_of_work;

/// The audit block preceding a candidate, with its body.
#[derive(Clone, Debug)]
pub struct PriorAudit {
    /// Index entry of the preceding audit block.
    pub entry: BlockIndexEntry,
    /// Its body, read through the chain view.
    pub block: Block,
}

impl PriorAudit {
    /// Height of the last block the preceding audit covered.
    pub fn last_audited_height(&self) -> Result<u32, AuditError> {
        self.block
            .audited
            .last()
            .map(|summary| summary.height)
            .ok_or(AuditError::MalformedAuditBlock(
                "preceding audit block audits nothing",
            ))
    }
}

/// Position of a candidate in the audit chain.
#[derive(Clone, Debug)]
pub enum AuditState {
    /// No audit block between `start_poa_height` and the candidate.
    NoPriorAudit,
    /// The nearest preceding audit block.
    HasPriorAudit(Box<PriorAudit>),
}

impl AuditState {
    /// Preceding audit block, if any.
    pub fn prior(&self) -> Option<&PriorAudit> {
        match self {
            Self::NoPriorAudit => None,
            Self::HasPriorAudit(prior) => Some(prior.as_ref()),
        }
    }
}

/// Summary of an accepted audit block, for callers' logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditReport {
    /// Height the block was validated at.
    pub height: u32,
    /// Hash of the preceding audit block, `None` for the first one.
    pub prior: Option<BlockHash>,
    /// Height of the first audited entry.
    pub first_audited: u32,
    /// Height of the last audited entry.
    pub last_audited: u32,
    /// Number of audited entries.
    pub entries: usize,
}

/// Validates proof-of-audit blocks against one chain snapshot.
///
/// Holds no state besides its borrows; build one per validation call (or per
/// batch under the same read lock).
pub struct AuditChainValidator<'a, C: ChainView + ?Sized> {
    chain: &'a C,
    params: &'a ConsensusParams,
}

impl<'a, C: ChainView + ?Sized> AuditChainValidator<'a, C> {
    /// Create a validator over `chain`.
    pub fn new(chain: &'a C, params: &'a ConsensusParams) -> Self {
        Self { chain, params }
    }

    /// Validate `block` as an audit block at `insertion` height.
    ///
    /// `insertion` is `None` to append to the active tip. A block already on
    /// the active chain is re-validated at its recorded height.
    pub fn validate(
        &self,
        block: &Block,
        insertion: Option<u32>,
    ) -> Result<AuditReport, ConsensusError> {
        let result = self.validate_inner(block, insertion);
        if let Err(err) = &result {
            warn!(
                time = block.header.time,
                entries = block.audited.len(),
                error = %err,
                "audit block rejected"
            );
        }
        result
    }

    fn validate_inner(
        &self,
        block: &Block,
        insertion: Option<u32>,
    ) -> Result<AuditReport, ConsensusError> {
        if !is_poa_by_version(&block.header) {
            return Err(AuditError::MalformedAuditBlock("not an audit block").into());
        }
        block.validate_sanity()?;

        let height = self.insertion_height(block, insertion)?;
        let parent_height = height - 1;

        self.check_audit_size(block)?;
        self.check_audit_merkle(block)?;
        self.check_no_poa_in_audit(block)?;

        let state = self.resolve(parent_height)?;
        self.check_prev_poa_link(block, &state)?;
        self.check_no_overlap(block, &state)?;
        self.check_spacing(block, &state, parent_height)?;
        self.check_audit_coverage(block, &state, parent_height)?;
        self.check_poa_work(block, parent_height)?;

        let (first_audited, last_audited) = match (block.audited.first(), block.audited.last()) {
            (Some(first), Some(last)) => (first.height, last.height),
            _ => return Err(AuditError::MalformedAuditBlock("audit block audits nothing").into()),
        };
        Ok(AuditReport {
            height,
            prior: state.prior().map(|prior| prior.entry.hash),
            first_audited,
            last_audited,
            entries: block.audited.len(),
        })
    }

    /// Resolve the height a candidate is validated at.
    pub fn insertion_height(
        &self,
        block: &Block,
        insertion: Option<u32>,
    ) -> Result<u32, ConsensusError> {
        let Some(tip) = self.chain.tip_height() else {
            return Err(AuditError::MalformedAuditBlock("audit block on an empty chain").into());
        };
        let height = match insertion {
            Some(height) => height,
            None => {
                let hash = block_hash(&block.header)?;
                match self.chain.entry_by_hash(&hash) {
                    Some(entry) if self.chain.is_active(&entry) => entry.height,
                    _ => tip.saturating_add(1),
                }
            }
        };
        if height == 0 {
            return Err(AuditError::MalformedAuditBlock("audit block at genesis height").into());
        }
        if height > tip.saturating_add(1) {
            return Err(AuditError::MalformedAuditBlock("insertion height beyond tip").into());
        }
        Ok(height)
    }

    /// Find the nearest audit block at or below `parent_height`.
    ///
    /// Scans downward while `height > start_poa_height`.
    pub fn resolve(&self, parent_height: u32) -> Result<AuditState, ConsensusError> {
        let mut height = parent_height;
        while height > self.params.start_poa_height {
            let entry = self.chain.require_at(height)?;
            if is_poa_by_version(&entry.header) {
                let block = self.chain.read_block(&entry)?;
                debug!(
                    prior_height = entry.height,
                    prior = %entry.hash,
                    "resolved preceding audit block"
                );
                return Ok(AuditState::HasPriorAudit(Box::new(PriorAudit { entry, block })));
            }
            height -= 1;
        }
        debug!(parent_height, "no preceding audit block");
        Ok(AuditState::NoPriorAudit)
    }

    /// At least `min_num_pos_blocks_audited` entries.
    pub fn check_audit_size(&self, block: &Block) -> Result<(), AuditError> {
        let min = self.params.min_num_pos_blocks_audited as usize;
        if block.audited.len() < min {
            return Err(AuditError::InsufficientAuditSize {
                len: block.audited.len(),
                min,
            });
        }
        Ok(())
    }

    /// Header commits to the audited list through an unmutated Merkle tree.
    pub fn check_audit_merkle(&self, block: &Block) -> Result<(), ConsensusError> {
        let header = block
            .header
            .pos_audited_merkle_root()
            .ok_or(AuditError::MalformedAuditBlock("not an audit block"))?;
        let computed = audited_merkle_root(&block.audited)?;
        if computed.mutated || computed.root != header {
            return Err(AuditError::AuditMerkleMismatch {
                computed: computed.root,
                header,
            }
            .into());
        }
        Ok(())
    }

    /// No entry points at an audit block, by hash or by active-chain height.
    ///
    /// Every entry hash must be in the block index; an unknown hash cannot be
    /// shown to name a regular block.
    pub fn check_no_poa_in_audit(&self, block: &Block) -> Result<(), AuditError> {
        for summary in &block.audited {
            let Some(by_hash) = self.chain.entry_by_hash(&summary.hash) else {
                return Err(AuditError::AuditCoverageMismatch {
                    height: summary.height,
                    reason: "audited hash not in the block index",
                });
            };
            let at_height = self.chain.entry_at(summary.height);
            let hits_audit = std::iter::once(&by_hash)
                .chain(at_height.as_ref())
                .any(|entry| is_poa_by_version(&entry.header));
            if hits_audit {
                return Err(AuditError::AuditReferencesAuditBlock {
                    height: summary.height,
                    hash: summary.hash,
                });
            }
        }
        Ok(())
    }

    /// `prev_poa` names the preceding audit block, or is null for the first.
    pub fn check_prev_poa_link(&self, block: &Block, state: &AuditState) -> Result<(), AuditError> {
        let found = block
            .header
            .prev_poa()
            .ok_or(AuditError::MalformedAuditBlock("not an audit block"))?;
        let expected = state
            .prior()
            .map_or_else(Hash32::zero, |prior| prior.entry.hash);
        if found != expected {
            return Err(AuditError::BrokenAuditChain { expected, found });
        }
        Ok(())
    }

    /// No entry repeats one of the immediately preceding audit block's.
    ///
    /// Older audit blocks are not consulted; the coverage walk keeps honest
    /// candidates clear of them.
    pub fn check_no_overlap(&self, block: &Block, state: &AuditState) -> Result<(), AuditError> {
        let Some(prior) = state.prior() else {
            return Ok(());
        };
        let seen: HashSet<&PoSBlockSummary> = prior.block.audited.iter().collect();
        if let Some(dup) = block.audited.iter().find(|summary| seen.contains(summary)) {
            return Err(AuditError::DuplicateAudit {
                height: dup.height,
                prior: prior.entry.hash,
            });
        }
        Ok(())
    }

    /// At least `poa_block_time` seconds after the preceding audit block.
    pub fn check_spacing(
        &self,
        block: &Block,
        state: &AuditState,
        parent_height: u32,
    ) -> Result<(), AuditError> {
        if parent_height < self.params.poa_time_bypass_height {
            return Ok(());
        }
        let Some(prior) = state.prior() else {
            return Ok(());
        };

        let elapsed = i64::from(block.header.time) - i64::from(prior.entry.time());
        debug!(
            elapsed,
            required = self.params.poa_block_time,
            "audit spacing"
        );
        if elapsed <= 0 || elapsed < i64::from(self.params.poa_block_time) {
            return Err(AuditError::AuditTooSoon {
                elapsed,
                required: self.params.poa_block_time,
            });
        }
        Ok(())
    }

    /// The audited list equals the chain window it must cover.
    pub fn check_audit_coverage(
        &self,
        block: &Block,
        state: &AuditState,
        parent_height: u32,
    ) -> Result<(), ConsensusError> {
        match state.prior() {
            None => self.first_audit_coverage(block, parent_height),
            Some(prior) => self.continued_coverage(block, prior, parent_height),
        }
    }

    // Entry i must be the block at last_pow_height + 1 + i.
    fn first_audit_coverage(&self, block: &Block, parent_height: u32) -> Result<(), ConsensusError> {
        let mut height = self.params.last_pow_height;
        for summary in &block.audited {
            height = height.checked_add(1).ok_or(AuditError::AuditCoverageMismatch {
                height,
                reason: "audit window overflows height",
            })?;
            if height > parent_height {
                return Err(AuditError::AuditCoverageMismatch {
                    height,
                    reason: "audited entry beyond the parent block",
                }
                .into());
            }
            let entry = self.chain.require_at(height)?;
            if !summary_matches(summary, &entry) {
                return Err(AuditError::AuditCoverageMismatch {
                    height,
                    reason: "audited entry differs from the chain",
                }
                .into());
            }
        }
        Ok(())
    }

    // Walk forward from the last audited height, consuming one entry per
    // eligible block. Stops when the entries run out, the period is full or
    // the parent is reached. A short contiguous list is a valid prefix; the
    // size rule bounds how short.
    fn continued_coverage(
        &self,
        block: &Block,
        prior: &PriorAudit,
        parent_height: u32,
    ) -> Result<(), ConsensusError> {
        let period = self.params.poa_block_period as usize;
        let mut entries = block.audited.iter();
        let mut consumed = 0usize;
        let mut height = prior.last_audited_height()?.saturating_add(1);

        while height <= parent_height
            && consumed < period
            && !entries.as_slice().is_empty()
        {
            let entry = self.chain.require_at(height)?;
            if height > self.params.last_pow_height && !is_poa_by_version(&entry.header) {
                let Some(summary) = entries.next() else {
                    break;
                };
                if !summary_matches(summary, &entry) {
                    return Err(AuditError::AuditCoverageMismatch {
                        height,
                        reason: "audited entry differs from the chain",
                    }
                    .into());
                }
                consumed += 1;
            }
            match height.checked_add(1) {
                Some(next) => height = next,
                None => break,
            }
        }

        if let Some(extra) = entries.next() {
            return Err(AuditError::AuditCoverageMismatch {
                height: extra.height,
                reason: "audited entries left unconsumed",
            }
            .into());
        }
        Ok(())
    }

    /// Mined hash meets the header target unless a bypass applies.
    pub fn check_poa_work(&self, block: &Block, parent_height: u32) -> Result<(), ConsensusError> {
        if self.params.skip_pow_check
            || self.params.network == Network::Test
            || parent_height < self.params.poa_work_bypass_height
        {
            return Ok(());
        }
        let hash = mined_hash(&block.header)?;
        check_proof_of_work(&hash, block.header.bits, self.params)
            .map_err(AuditError::PoAWorkInsufficient)?;
        Ok(())
    }
}

/// Validate `block` as a proof-of-audit block. See [`AuditChainValidator`].
pub fn validate_audit_block<C: ChainView + ?Sized>(
    chain: &C,
    block: &Block,
    insertion: Option<u32>,
    params: &ConsensusParams,
) -> Result<AuditReport, ConsensusError> {
    AuditChainValidator::new(chain, params).validate(block, insertion)
}

fn summary_matches(summary: &PoSBlockSummary, entry: &BlockIndexEntry) -> bool {
    summary.hash == entry.hash && summary.height == entry.height && summary.time == entry.time()
}
