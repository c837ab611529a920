//! Integration test: memory-hard graph spot checks.
//!
//! A prover materializes the graph and commits; a verifier samples indices
//! from a PRF, receives openings as JSON and checks them against the root.
//! Cheating provers that commit to a corrupted page are caught by the
//! equation check on any child of that page.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use tollgate_pow::control::Control;
use tollgate_pow::mhg::{
    parents_of, sample_indices, verify_open_batch, MhgOpening, MhgParams, MhgProver, MhgStatement,
};
use tollgate_pow::{PowError, VerifyFailure};
use tollgate_types::progress::{Phase, Progress};
use tollgate_types::wire::WireMhgOpening;

const NONCE: &[u8] = b"integration-nonce";

fn seed() -> Vec<u8> {
    b"mhg-integration-seed".to_vec()
}

fn statement_for(prover: &MhgProver) -> MhgStatement {
    MhgStatement {
        seed: seed(),
        nonce: NONCE.to_vec(),
        root: prover.root(),
        params: *prover.params(),
    }
}

/// Ship openings through JSON and decode them on the verifier side.
fn transport(opens: &[MhgOpening]) -> Vec<MhgOpening> {
    let wire: Vec<WireMhgOpening> = opens.iter().map(WireMhgOpening::from).collect();
    let text = serde_json::to_string(&wire).expect("openings should serialize");
    let back: Vec<WireMhgOpening> = serde_json::from_str(&text).expect("openings should parse");
    back.iter()
        .map(MhgOpening::try_from)
        .collect::<Result<Vec<_>, _>>()
        .expect("openings should decode")
}

#[test]
fn sampled_openings_verify() {
    let params = MhgParams::new(256).expect("params");
    let prover =
        MhgProver::build(&seed(), NONCE, params, &Control::detached()).expect("graph should build");

    let indices = sample_indices(255, 16, b"challenge-seed").expect("sample");
    assert_eq!(indices.len(), 16);
    assert_eq!(&indices[..2], &[1, 255]);

    let opens = transport(&prover.open(&indices).expect("open"));
    verify_open_batch(&statement_for(&prover), &opens).expect("honest openings should verify");
}

#[test]
fn corrupted_page_fails_equation_check() {
    let params = MhgParams::new(128).expect("params");
    let honest =
        MhgProver::build(&seed(), NONCE, params, &Control::detached()).expect("graph should build");

    // Corrupt page 100 and commit to the corrupted set.
    let mut pages: Vec<Vec<u8>> = (0..128)
        .map(|i| honest.page(i).expect("page").to_vec())
        .collect();
    pages[100][0] ^= 0x01;
    let cheat = MhgProver::from_pages(&seed(), params, pages, &Control::detached())
        .expect("commit to corrupted pages");
    assert_ne!(cheat.root(), honest.root());

    // Page 101 always has page 100 as its first parent.
    assert_eq!(parents_of(101, &seed()).expect("parents").p0, 100);
    let opens = transport(&cheat.open(&[101]).expect("open"));
    let err = verify_open_batch(&statement_for(&cheat), &opens).expect_err("must be caught");
    assert!(
        matches!(
            err,
            PowError::Verification(VerifyFailure::EquationFailed { index: 101 })
        ),
        "unexpected error: {err:?}"
    );

    // Opening the corrupted page itself fails against its honest parents.
    let own = transport(&cheat.open(&[100]).expect("open"));
    let err = verify_open_batch(&statement_for(&cheat), &own).expect_err("child mismatch");
    assert_eq!(err.reason(), "equation_failed");
}

#[test]
fn openings_do_not_transfer_between_nonces() {
    let params = MhgParams::new(64).expect("params");
    let prover = MhgProver::build(&seed(), NONCE, params, &Control::detached()).expect("build");
    let opens = prover.open(&[10, 20, 30]).expect("open");

    let mut statement = statement_for(&prover);
    statement.nonce = b"fresh-nonce".to_vec();
    let err = verify_open_batch(&statement, &opens).expect_err("stale nonce");
    assert_eq!(err.reason(), "equation_failed");
}

#[test]
fn build_reports_progress_and_honours_cancellation() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let token = CancellationToken::new();
    let control = Control::new(token.clone())
        .with_cadence(16, 32)
        .with_sink(Arc::new(move |p: Progress| {
            if p.phase == Phase::Pages {
                sink.lock().expect("lock").push(p.done);
            }
        }));

    let params = MhgParams::new(128).expect("params");
    MhgProver::build(&seed(), NONCE, params, &control).expect("build");
    assert_eq!(*seen.lock().expect("lock"), vec![32, 64, 96, 128]);

    token.cancel();
    let err = MhgProver::build(&seed(), NONCE, params, &control).expect_err("cancelled");
    assert_eq!(err.reason(), "aborted");
}
