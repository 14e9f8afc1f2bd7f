use auditchain_consensus::{
    encode_compact, validate_audit_block, validate_block, AuditError, BlockIndexEntry, BlockKind,
    ChainView, ConsensusError, ConsensusParams, MemoryChain, Network, PowError,
};
use auditchain_core::{
    audited_merkle_root, Block, BlockHeader, Hash32, HeaderKind, OutPoint, PoSBlockSummary,
    Transaction, TxIn, TxOut,
};

const GENESIS_TIME: u32 = 1_600_000_000;
const POA_BLOCK_TIME: u32 = 3_600;

fn params() -> ConsensusParams {
    ConsensusParams {
        last_pow_height: 10,
        start_poa_height: 70,
        poa_block_period: 59,
        poa_block_time: POA_BLOCK_TIME,
        min_num_pos_blocks_audited: 59,
        poa_time_bypass_height: 0,
        poa_work_bypass_height: 0,
        ..ConsensusParams::regtest()
    }
}

fn bits() -> u32 {
    encode_compact(&params().pow_limit())
}

fn time_at(height: u32) -> u32 {
    GENESIS_TIME + height * 60
}

fn coinbase(height: u32) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxIn {
            prevout: OutPoint::null(),
            script_sig: height.to_le_bytes().to_vec(),
        }],
        outputs: vec![TxOut {
            value: 50,
            script_pubkey: vec![0x51],
        }],
        lock_time: 0,
    }
}

fn coinstake(height: u32) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxIn {
            prevout: OutPoint {
                txid: Hash32([0x5a; 32]),
                index: height,
            },
            script_sig: vec![],
        }],
        outputs: vec![
            TxOut {
                value: 0,
                script_pubkey: vec![],
            },
            TxOut {
                value: 60,
                script_pubkey: vec![0x51],
            },
        ],
        lock_time: 0,
    }
}

fn regular(prev: Hash32, height: u32, stake: bool) -> Block {
    let mut txs = vec![coinbase(height)];
    if stake {
        txs.push(coinstake(height));
    }
    Block {
        header: BlockHeader {
            version: 4,
            kind: HeaderKind::Chained { prev_block: prev },
            merkle_root: Hash32::zero(),
            time: time_at(height),
            bits: bits(),
            nonce: 0,
            accumulator_checkpoint: Hash32::zero(),
        },
        txs,
        audited: vec![],
        signature: if stake { vec![0x30; 70] } else { vec![] },
    }
}

fn audit(prev_poa: Hash32, time: u32, audited: Vec<PoSBlockSummary>) -> Block {
    let root = audited_merkle_root(&audited).unwrap().root;
    Block {
        header: BlockHeader {
            version: 4,
            kind: HeaderKind::Audit {
                prev_poa,
                pos_audited_merkle_root: root,
            },
            merkle_root: Hash32::zero(),
            time,
            bits: bits(),
            nonce: 0,
            accumulator_checkpoint: Hash32::zero(),
        },
        txs: vec![coinbase(time)],
        audited,
        signature: vec![],
    }
}

fn summary(entry: &BlockIndexEntry) -> PoSBlockSummary {
    PoSBlockSummary {
        hash: entry.hash,
        time: entry.time(),
        height: entry.height,
    }
}

fn summaries(chain: &MemoryChain, heights: impl IntoIterator<Item = u32>) -> Vec<PoSBlockSummary> {
    heights
        .into_iter()
        .map(|h| summary(&chain.entry_at(h).unwrap()))
        .collect()
}

/// Genesis, proof-of-work blocks 1..=10, proof-of-stake blocks 11..=70.
fn chain_to_70() -> MemoryChain {
    let mut chain = MemoryChain::new();
    let mut prev = Hash32::zero();
    for height in 0..=70 {
        prev = chain.push(regular(prev, height, height > 10)).unwrap().hash;
    }
    chain
}

/// First audit block at height 71, covering heights 11..=69.
fn first_audit(chain: &MemoryChain) -> Block {
    audit(Hash32::zero(), time_at(71), summaries(chain, 11..=69))
}

/// Chain through height 130 with the first audit block at 71.
fn chain_to_130() -> (MemoryChain, BlockIndexEntry) {
    let mut chain = chain_to_70();
    let first = chain.push(first_audit(&chain)).unwrap();
    let mut prev = first.hash;
    for height in 72..=130 {
        prev = chain.push(regular(prev, height, true)).unwrap().hash;
    }
    (chain, first)
}

fn second_window() -> Vec<u32> {
    std::iter::once(70).chain(72..=129).collect()
}

#[test]
fn first_audit_block_passes() {
    let chain = chain_to_70();
    let candidate = first_audit(&chain);
    assert_eq!(candidate.audited.len(), 59);

    let report = validate_audit_block(&chain, &candidate, None, &params()).unwrap();
    assert_eq!(report.height, 71);
    assert_eq!(report.prior, None);
    assert_eq!((report.first_audited, report.last_audited), (11, 69));
}

#[test]
fn short_first_audit_is_rejected_on_size() {
    let chain = chain_to_70();
    let candidate = audit(Hash32::zero(), time_at(71), summaries(&chain, 11..=68));
    assert!(matches!(
        validate_audit_block(&chain, &candidate, None, &params()),
        Err(ConsensusError::Audit(AuditError::InsufficientAuditSize { len: 58, min: 59 }))
    ));
}

#[test]
fn short_first_audit_passes_with_lower_minimum() {
    let params = ConsensusParams {
        min_num_pos_blocks_audited: 1,
        ..params()
    };
    let chain = chain_to_70();
    let candidate = audit(Hash32::zero(), time_at(71), summaries(&chain, 11..=68));
    let report = validate_audit_block(&chain, &candidate, None, &params).unwrap();
    assert_eq!(report.entries, 58);
}

#[test]
fn second_audit_block_passes() {
    let (chain, first) = chain_to_130();
    let audited = summaries(&chain, second_window());
    assert_eq!(audited.len(), 59);

    let candidate = audit(first.hash, first.time() + POA_BLOCK_TIME, audited);
    let report = validate_audit_block(&chain, &candidate, None, &params()).unwrap();
    assert_eq!(report.height, 131);
    assert_eq!(report.prior, Some(first.hash));
    assert_eq!((report.first_audited, report.last_audited), (70, 129));
}

#[test]
fn short_second_audit_passes_with_lower_minimum() {
    let lenient = ConsensusParams {
        min_num_pos_blocks_audited: 1,
        ..params()
    };
    let (chain, first) = chain_to_130();
    let heights: Vec<u32> = std::iter::once(70).chain(72..=100).collect();
    let candidate = audit(
        first.hash,
        first.time() + POA_BLOCK_TIME,
        summaries(&chain, heights),
    );
    let report = validate_audit_block(&chain, &candidate, None, &lenient).unwrap();
    assert_eq!(report.entries, 30);
    assert_eq!((report.first_audited, report.last_audited), (70, 100));

    // Still rejected under the default minimum.
    assert!(matches!(
        validate_audit_block(&chain, &candidate, None, &params()),
        Err(ConsensusError::Audit(AuditError::InsufficientAuditSize { len: 30, min: 59 }))
    ));
}

#[test]
fn second_audit_repeating_an_entry_is_a_duplicate() {
    let (chain, first) = chain_to_130();
    let heights = std::iter::once(69).chain(std::iter::once(70)).chain(72..=128);
    let candidate = audit(
        first.hash,
        first.time() + POA_BLOCK_TIME,
        summaries(&chain, heights),
    );
    assert!(matches!(
        validate_audit_block(&chain, &candidate, None, &params()),
        Err(ConsensusError::Audit(AuditError::DuplicateAudit { height: 69, prior }))
            if prior == first.hash
    ));
}

#[test]
fn second_audit_too_soon() {
    let (chain, first) = chain_to_130();
    let candidate = audit(
        first.hash,
        first.time() + POA_BLOCK_TIME - 1,
        summaries(&chain, second_window()),
    );
    assert!(matches!(
        validate_audit_block(&chain, &candidate, None, &params()),
        Err(ConsensusError::Audit(AuditError::AuditTooSoon {
            elapsed: 3_599,
            required: POA_BLOCK_TIME,
        }))
    ));

    // Below the legacy bypass height spacing is not enforced.
    let grandfathered = ConsensusParams {
        poa_time_bypass_height: 1_000,
        ..params()
    };
    validate_audit_block(&chain, &candidate, None, &grandfathered).unwrap();
}

#[test]
fn audit_referencing_audit_block_is_rejected() {
    let (chain, first) = chain_to_130();
    let heights = std::iter::once(70).chain(71..=128);
    let audited = summaries(&chain, heights);
    assert!(audited.iter().any(|s| s.hash == first.hash));

    let candidate = audit(first.hash, first.time() + POA_BLOCK_TIME, audited);
    assert!(matches!(
        validate_audit_block(&chain, &candidate, None, &params()),
        Err(ConsensusError::Audit(AuditError::AuditReferencesAuditBlock { height: 71, hash }))
            if hash == first.hash
    ));
}

#[test]
fn second_audit_must_link_to_first() {
    let (chain, first) = chain_to_130();
    let candidate = audit(
        Hash32::zero(),
        first.time() + POA_BLOCK_TIME,
        summaries(&chain, second_window()),
    );
    assert!(matches!(
        validate_audit_block(&chain, &candidate, None, &params()),
        Err(ConsensusError::Audit(AuditError::BrokenAuditChain { expected, found }))
            if expected == first.hash && found == Hash32::zero()
    ));
}

#[test]
fn revalidating_accepted_audit_blocks_is_stable() {
    let (mut chain, first) = chain_to_130();
    let second = audit(
        first.hash,
        first.time() + POA_BLOCK_TIME,
        summaries(&chain, second_window()),
    );
    let second_entry = chain.push(second.clone()).unwrap();
    let first_block = chain.read_block(&first).unwrap();
    let params = params();

    for _ in 0..2 {
        let report = validate_audit_block(&chain, &first_block, None, &params).unwrap();
        assert_eq!(report.height, 71);
        let report = validate_audit_block(&chain, &first_block, Some(71), &params).unwrap();
        assert_eq!(report.height, 71);

        let report = validate_audit_block(&chain, &second, None, &params).unwrap();
        assert_eq!(report.height, second_entry.height);
        assert_eq!(report.prior, Some(first.hash));
    }
}

#[test]
fn unreadable_prior_audit_is_reported_as_store_failure() {
    let (mut chain, first) = chain_to_130();
    chain.forget_body(&first.hash);
    let candidate = audit(
        first.hash,
        first.time() + POA_BLOCK_TIME,
        summaries(&chain, second_window()),
    );
    let err = validate_audit_block(&chain, &candidate, None, &params()).unwrap_err();
    assert!(matches!(err, ConsensusError::BlockStoreUnavailable(_)));
    assert!(!err.is_consensus_violation());
}

#[test]
fn audit_work_is_enforced_off_test_networks() {
    let enforcing = ConsensusParams {
        skip_pow_check: false,
        ..params()
    };
    let chain = chain_to_70();
    let mut candidate = first_audit(&chain);

    // About half of all mined hashes clear the regtest ceiling.
    let mut passing = None;
    let mut failing = None;
    for nonce in 0..64u32 {
        candidate.header.nonce = nonce;
        match validate_audit_block(&chain, &candidate, None, &enforcing) {
            Ok(_) => passing = passing.or(Some(nonce)),
            Err(ConsensusError::Audit(AuditError::PoAWorkInsufficient(
                PowError::HashExceedsTarget { .. },
            ))) => failing = failing.or(Some(nonce)),
            Err(other) => panic!("unexpected error {other}"),
        }
    }
    assert!(passing.is_some());
    candidate.header.nonce = failing.expect("some nonce misses the target");

    let testnet = ConsensusParams {
        network: Network::Test,
        ..enforcing.clone()
    };
    validate_audit_block(&chain, &candidate, None, &testnet).unwrap();

    let legacy = ConsensusParams {
        poa_work_bypass_height: 71,
        ..enforcing
    };
    validate_audit_block(&chain, &candidate, None, &legacy).unwrap();
}

#[test]
fn dispatcher_routes_every_kind() {
    let (chain, first) = chain_to_130();
    let params = params();

    let pos = chain.entry_at(100).unwrap();
    let pos_block = chain.read_block(&pos).unwrap();
    // On-schedule spacing keeps the stake-era target unchanged.
    assert_eq!(
        validate_block(&chain, &pos_block, None, &params).unwrap(),
        BlockKind::ProofOfStake
    );

    let audit_block = chain.read_block(&first).unwrap();
    assert_eq!(
        validate_block(&chain, &audit_block, None, &params).unwrap(),
        BlockKind::ProofOfAudit
    );

    let genesis = chain.read_block(&chain.entry_at(0).unwrap()).unwrap();
    assert_eq!(
        validate_block(&chain, &genesis, None, &params).unwrap(),
        BlockKind::ProofOfWork
    );
}
