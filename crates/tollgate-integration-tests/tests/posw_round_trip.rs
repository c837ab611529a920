//! Integration test: POSW commit, challenge, open and verify.
//!
//! Exercises the gate's full POSW path without a running worker:
//! 1. Normalize INIT parameters derived from a matched `ChallengeConfig`
//! 2. Commit (with and without a hashcash target)
//! 3. Sample a challenge on the verifier side
//! 4. Open, ship the entries as JSON, decode them again
//! 5. Verify, and check that tampered or replayed answers are refused

use serde_json::Value;

use tollgate_integration_tests::{decode_commit, decode_opens, encode_opens, posw_challenge};
use tollgate_pow::control::Control;
use tollgate_pow::open::{OpenEntry, OpenRequest};
use tollgate_pow::posw::{PoswContext, PoswParams};
use tollgate_pow::verify::{verify_openings, PoswStatement};
use tollgate_pow::{PowError, VerifyFailure};
use tollgate_types::contracts::ChallengeConfig;
use tollgate_types::wire::WireCommit;
use tollgate_worker::config::LimitsConfig;
use tollgate_worker::worker::init_params;

const BINDING: &str = "sess|7f3a|/login";

fn config(steps: u32, hashcash_bits: u32) -> ChallengeConfig {
    ChallengeConfig {
        powcheck: true,
        steps,
        hashcash_bits,
        segment_len: 8,
        sample_k: 12,
        spine_k: 3,
    }
}

struct Prover {
    params: PoswParams,
    ctx: PoswContext,
    commit: WireCommit,
}

fn commit(config: &ChallengeConfig) -> Prover {
    let params = init_params(&config.to_init_params(BINDING), &LimitsConfig::default())
        .expect("INIT params should normalize");
    let mut ctx = PoswContext::new(params.clone()).expect("context should allocate");
    let commitment = ctx
        .commit(&Control::detached())
        .expect("COMMIT should succeed");
    assert!(commitment.attempts >= 1);
    Prover {
        params,
        ctx,
        commit: WireCommit::from(&commitment),
    }
}

/// Open `challenge` and round-trip the answer through JSON text.
fn answer(prover: &Prover, challenge: &OpenRequest) -> Vec<OpenEntry> {
    let entries = prover
        .ctx
        .open(challenge, &Control::detached())
        .expect("OPEN should succeed");
    let text = encode_opens(&entries).to_string();
    let parsed: Value = serde_json::from_str(&text).expect("opens should be JSON");
    decode_opens(&parsed).expect("opens should decode")
}

fn statement(prover: &Prover) -> PoswStatement {
    let text = serde_json::to_string(&prover.commit).expect("commit should serialize");
    let wire: WireCommit = serde_json::from_str(&text).expect("commit should parse");
    let commitment = decode_commit(&wire).expect("commit should decode");
    PoswStatement::new(&prover.params, &commitment)
}

#[test]
fn honest_prover_passes_sampled_challenge() {
    // =========================================================
    // Step 1: Commit under the matched configuration
    // =========================================================
    let cfg = config(256, 0);
    let prover = commit(&cfg);
    assert_eq!(prover.commit.root_b64.len(), 43);
    assert_eq!(prover.commit.nonce.len(), 22);

    // =========================================================
    // Step 2: Verifier samples a challenge with midpoints
    // =========================================================
    let challenge = posw_challenge(&cfg, b"ticket-mac-1").expect("challenge");
    assert_eq!(challenge.indices.len(), 12);
    assert!(challenge.indices.contains(&1));
    assert!(challenge.indices.contains(&256));
    assert_eq!(challenge.spine_pos.as_ref().map(Vec::len), Some(3));

    // =========================================================
    // Step 3: Open, transport, verify
    // =========================================================
    let entries = answer(&prover, &challenge);
    assert_eq!(entries.iter().filter(|e| e.mid.is_some()).count(), 3);
    let first = entries.iter().find(|e| e.i == 1).expect("index 1 opened");
    assert_eq!(first.prev, 0, "segments reaching genesis start at 0");

    verify_openings(&statement(&prover), &challenge, &entries)
        .expect("honest answer should verify");
}

#[test]
fn hashcash_commitment_verifies_and_requires_final_index() {
    let cfg = config(32, 3);
    let prover = commit(&cfg);
    let statement = statement(&prover);
    assert_eq!(statement.hashcash_bits, 3);

    let challenge = posw_challenge(&cfg, b"ticket-mac-2").expect("challenge");
    let entries = answer(&prover, &challenge);
    verify_openings(&statement, &challenge, &entries).expect("hashcash answer should verify");

    // Without index L the verifier cannot check the hashcash target.
    let partial = OpenRequest::new([5, 9]);
    let entries = answer(&prover, &partial);
    let err = verify_openings(&statement, &partial, &entries).expect_err("must need index L");
    assert_eq!(err.reason(), "hashcash_missing");
}

#[test]
fn tampered_state_is_rejected() {
    let cfg = config(64, 0);
    let prover = commit(&cfg);
    let challenge = posw_challenge(&cfg, b"ticket-mac-3").expect("challenge");
    let mut entries = answer(&prover, &challenge);

    entries[2].h_curr[7] ^= 0x01;
    let bad_index = entries[2].i;
    let err = verify_openings(&statement(&prover), &challenge, &entries)
        .expect_err("tampered entry must fail");
    assert!(
        matches!(
            err,
            PowError::Verification(VerifyFailure::ProofFailed { index }) if index == bad_index
        ),
        "unexpected error: {err:?}"
    );
}

#[test]
fn answer_for_another_binding_fails_seed_check() {
    let cfg = config(64, 0);
    let prover = commit(&cfg);
    let challenge = posw_challenge(&cfg, b"ticket-mac-4").expect("challenge");
    let entries = answer(&prover, &challenge);

    let mut statement = statement(&prover);
    statement.binding = "sess|other|/login".to_string();
    let err = verify_openings(&statement, &challenge, &entries).expect_err("wrong binding");
    assert_eq!(err.reason(), "seed_failed");
}

#[test]
fn replayed_answer_does_not_satisfy_new_challenge() {
    let cfg = config(128, 0);
    let prover = commit(&cfg);
    let first = posw_challenge(&cfg, b"ticket-mac-5").expect("challenge");
    let second = posw_challenge(&cfg, b"ticket-mac-6").expect("challenge");
    assert_ne!(first, second);

    let entries = answer(&prover, &first);
    let err = verify_openings(&statement(&prover), &second, &entries)
        .expect_err("replay must fail");
    assert_eq!(err.reason(), "malformed");
}

#[test]
fn open_before_commit_is_commit_missing() {
    let params = PoswParams::new(BINDING, 16).expect("params");
    let ctx = PoswContext::new(params).expect("context");
    let err = ctx
        .open(&OpenRequest::new([1]), &Control::detached())
        .expect_err("no commitment yet");
    assert_eq!(err.reason(), "commit_missing");
}
