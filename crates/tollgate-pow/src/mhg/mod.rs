//! Memory-hard graph.
//!
//! A DAG of `pages` fixed-size pages. Page 0 is derived from the key
//! material alone; page `i >= 1` is mixed from three parents
//! `(i - 1, p1, p2)`, where `p1` and `p2` are sampled from `0..i` by a
//! seeded PRF. Computing the last page therefore requires keeping (or
//! recomputing) a large fraction of the graph.
//!
//! - [`graph`]: PRF draws, parent selection, challenge sampling
//! - [`mix`]: AES-CBC page mixer and genesis page
//! - [`prover`]: full materialization, commitment and openings
//! - [`verify`]: batch spot-check verification

pub mod graph;
pub mod mix;
pub mod prover;
pub mod verify;

pub use graph::{parents_of, sample_indices, Parents};
pub use mix::{mix_page, MixContext};
pub use prover::{MhgOpening, MhgParams, MhgProver};
pub use verify::{verify_open_batch, MhgStatement};
