//! Reference vector generator for tollgate.
//!
//! Writes `tests/fixtures/test_vectors.json` with the outputs of every
//! deterministic primitive a host or verifier must reproduce bit-for-bit:
//! domain hashes, the POSW chain and root, Merkle proofs, MHG parent
//! selection, challenge sampling, page mixing and graph commitments.
//!
//! Usage:
//!   tollgate-testvec              # Generate test_vectors.json
//!   tollgate-testvec --verify     # Verify test_vectors.json matches this build

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use tollgate_crypto::encoding::b64u_encode;
use tollgate_crypto::hash::{hash, Domain};
use tollgate_pow::control::Control;
use tollgate_pow::merkle::{leaf_hash, MerkleTree};
use tollgate_pow::mhg::graph::{draw32, parents_of, sample_indices};
use tollgate_pow::mhg::{mix_page, MhgParams, MhgProver, MixContext};
use tollgate_pow::posw::{chain_seed, PoswContext, PoswParams};

const FIXTURE_PATH: &str = "tests/fixtures/test_vectors.json";

#[derive(Serialize, Deserialize)]
struct TestVectors {
    version: String,
    generated_by: String,
    vectors: BTreeMap<String, TestVector>,
}

#[derive(Serialize, Deserialize)]
struct TestVector {
    description: String,
    inputs: BTreeMap<String, String>,
    outputs: BTreeMap<String, String>,
}

type Vectors = BTreeMap<String, TestVector>;
type Result<T> = anyhow::Result<T>;

fn entry(pairs: &[(&str, String)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn mhg_seed() -> Vec<u8> {
    (1..=16).collect()
}

fn generate_hash_vectors() -> Vectors {
    let mut vectors = BTreeMap::new();

    for domain in Domain::ALL {
        let prefix = String::from_utf8_lossy(domain.prefix()).into_owned();
        let digest = hash(domain, &[b"tollgate"]);
        vectors.insert(
            format!("hash_domain_{}", domain_name(domain)),
            TestVector {
                description: format!("SHA-256(\"{prefix}\" || \"tollgate\")"),
                inputs: entry(&[("prefix", prefix), ("data", "tollgate".to_string())]),
                outputs: entry(&[("hash", hex::encode(digest))]),
            },
        );
    }

    vectors
}

fn domain_name(domain: Domain) -> &'static str {
    match domain {
        Domain::PoswSeed => "posw_seed",
        Domain::PoswStep => "posw_step",
        Domain::MerkleLeaf => "merkle_leaf",
        Domain::MerkleNode => "merkle_node",
        Domain::Hashcash => "hashcash",
        Domain::MhgPrf => "mhg_prf",
        Domain::MhgKey => "mhg_key",
        Domain::MhgPa => "mhg_pa",
        Domain::MhgPb => "mhg_pb",
    }
}

fn generate_posw_vectors() -> Result<Vectors> {
    let mut vectors = BTreeMap::new();
    let binding = "session-1";
    let nonce = "AAAAAAAAAAAAAAAAAAAAAA";

    let params = PoswParams::new(binding, 4)?;
    let mut ctx = PoswContext::new(params)?;
    let commitment = ctx.commit_with(&Control::detached(), || nonce.to_string())?;
    let chain = ctx.chain();

    vectors.insert(
        "posw_chain_steps4".to_string(),
        TestVector {
            description: "POSW chain for binding \"session-1\", fixed nonce, L = 4".to_string(),
            inputs: entry(&[
                ("binding", binding.to_string()),
                ("nonce", nonce.to_string()),
                ("steps", "4".to_string()),
            ]),
            outputs: entry(&[
                ("seed", hex::encode(chain_seed(binding.as_bytes(), nonce.as_bytes()))),
                ("chain_1", hex::encode(chain[1])),
                ("chain_4", hex::encode(chain[4])),
                ("root_b64", commitment.root_b64()),
            ]),
        },
    );

    let proof = ctx.tree().proof(2)?;
    vectors.insert(
        "posw_merkle_proof_leaf2".to_string(),
        TestVector {
            description: "Inclusion proof of leaf 2 in the L = 4 POSW tree".to_string(),
            inputs: entry(&[("leaf_index", "2".to_string()), ("leaf_count", "5".to_string())]),
            outputs: entry(&[
                ("leaf", hex::encode(leaf_hash(2, &chain[2]))),
                (
                    "siblings",
                    proof.siblings.iter().map(hex::encode).collect::<Vec<_>>().join(","),
                ),
                (
                    "dirs",
                    proof.dirs.iter().map(|&d| if d { '1' } else { '0' }).collect(),
                ),
            ]),
        },
    );

    Ok(vectors)
}

fn generate_merkle_vectors() -> Result<Vectors> {
    let mut vectors = BTreeMap::new();

    // Odd level counts exercise the self-paired trailing node.
    for count in [1usize, 2, 3, 7] {
        let leaves: Vec<_> = (0..count)
            .map(|i| leaf_hash(i as u32, &[i as u8; 4]))
            .collect();
        let tree = MerkleTree::from_leaves(leaves)?;
        vectors.insert(
            format!("merkle_root_{count}_leaves"),
            TestVector {
                description: format!(
                    "Merkle root over leaf(i, [i; 4]) for i in 0..{count}"
                ),
                inputs: entry(&[("leaf_count", count.to_string())]),
                outputs: entry(&[
                    ("root", hex::encode(tree.root())),
                    ("height", tree.height().to_string()),
                ]),
            },
        );
    }

    Ok(vectors)
}

fn generate_mhg_graph_vectors() -> Result<Vectors> {
    let mut vectors = BTreeMap::new();
    let seed = mhg_seed();

    vectors.insert(
        "mhg_draw32".to_string(),
        TestVector {
            description: "PRF draw for label \"p1\", i = 37, ctr = 0".to_string(),
            inputs: entry(&[("seed", hex::encode(&seed))]),
            outputs: entry(&[("value", draw32(&seed, "p1", 37, 0).to_string())]),
        },
    );

    for i in [1u32, 2, 3, 37, 1000] {
        let parents = parents_of(i, &seed)?;
        vectors.insert(
            format!("mhg_parents_{i}"),
            TestVector {
                description: format!("Parent triple of page {i}"),
                inputs: entry(&[("seed", hex::encode(&seed)), ("i", i.to_string())]),
                outputs: entry(&[
                    ("p0", parents.p0.to_string()),
                    ("p1", parents.p1.to_string()),
                    ("p2", parents.p2.to_string()),
                ]),
            },
        );
    }

    for (max_index, count) in [(64u32, 8u32), (5, 10)] {
        let sample = sample_indices(max_index, count, &seed)?;
        vectors.insert(
            format!("mhg_sample_{max_index}_{count}"),
            TestVector {
                description: format!("Challenge sample of {count} indices in 1..={max_index}"),
                inputs: entry(&[
                    ("seed", hex::encode(&seed)),
                    ("max_index", max_index.to_string()),
                    ("count", count.to_string()),
                ]),
                outputs: entry(&[(
                    "indices",
                    sample.iter().map(u32::to_string).collect::<Vec<_>>().join(","),
                )]),
            },
        );
    }

    Ok(vectors)
}

fn generate_mhg_mix_vectors() -> Result<Vectors> {
    let mut vectors = BTreeMap::new();
    let seed = mhg_seed();
    let nonce = b"tollgate-nonce";

    for page_bytes in [64usize, 40] {
        let genesis = MixContext::new(&seed, nonce).genesis(page_bytes)?;
        vectors.insert(
            format!("mhg_genesis_{page_bytes}"),
            TestVector {
                description: format!("Genesis page of {page_bytes} bytes"),
                inputs: entry(&[
                    ("seed", hex::encode(&seed)),
                    ("nonce", String::from_utf8_lossy(nonce).into_owned()),
                ]),
                outputs: entry(&[("page", hex::encode(genesis))]),
            },
        );
    }

    let p0: Vec<u8> = (0..64).collect();
    let p1: Vec<u8> = (0..64).map(|b: u8| b.wrapping_mul(3)).collect();
    let p2 = vec![0xA5u8; 64];
    for rounds in [1u32, 2] {
        let parents = [p0.as_slice(), p1.as_slice(), p2.as_slice()];
        let page = mix_page(&seed, nonce, 7, parents, 64, rounds)?;
        vectors.insert(
            format!("mhg_mix_7_r{rounds}"),
            TestVector {
                description: format!("mix of page 7 from fixed parents, {rounds} round(s)"),
                inputs: entry(&[
                    ("p0", hex::encode(&p0)),
                    ("p1", hex::encode(&p1)),
                    ("p2", hex::encode(&p2)),
                ]),
                outputs: entry(&[("page", hex::encode(page))]),
            },
        );
    }

    let params = MhgParams::new(16)?;
    let prover = MhgProver::build(&seed, nonce, params, &Control::detached())?;
    let last = prover.page(15).context("page 15 missing")?;
    vectors.insert(
        "mhg_graph_16_pages".to_string(),
        TestVector {
            description: "16-page graph, 64-byte pages, 2 rounds".to_string(),
            inputs: entry(&[
                ("seed", hex::encode(&seed)),
                ("nonce", String::from_utf8_lossy(nonce).into_owned()),
            ]),
            outputs: entry(&[
                ("root", hex::encode(prover.root())),
                ("root_b64", b64u_encode(&prover.root())),
                ("page_15", hex::encode(last)),
            ]),
        },
    );

    Ok(vectors)
}

fn generate_all_vectors() -> Result<TestVectors> {
    let mut all_vectors = BTreeMap::new();

    all_vectors.extend(generate_hash_vectors());
    all_vectors.extend(generate_posw_vectors()?);
    all_vectors.extend(generate_merkle_vectors()?);
    all_vectors.extend(generate_mhg_graph_vectors()?);
    all_vectors.extend(generate_mhg_mix_vectors()?);

    Ok(TestVectors {
        version: "1.0".to_string(),
        generated_by: "tollgate-testvec".to_string(),
        vectors: all_vectors,
    })
}

fn verify_vectors(vectors: &TestVectors) -> Result<bool> {
    let regenerated = generate_all_vectors()?;
    let mut all_pass = true;

    for (name, expected) in &vectors.vectors {
        match regenerated.vectors.get(name) {
            Some(actual) if actual.outputs == expected.outputs => eprintln!("PASS: {name}"),
            Some(actual) => {
                eprintln!("FAIL: {name}");
                eprintln!("  expected: {:?}", expected.outputs);
                eprintln!("  actual:   {:?}", actual.outputs);
                all_pass = false;
            }
            None => {
                eprintln!("MISSING: {name}");
                all_pass = false;
            }
        }
    }

    Ok(all_pass)
}

fn write_vectors(path: &Path, vectors: &TestVectors) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(vectors)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    eprintln!("Generated {} test vectors to {}", vectors.vectors.len(), path.display());
    Ok(())
}

fn main() -> Result<()> {
    let verify = std::env::args().any(|a| a == "--verify");
    let path = Path::new(FIXTURE_PATH);

    let vectors = if verify && path.exists() {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).with_context(|| format!("parsing {FIXTURE_PATH}"))?
    } else {
        if verify {
            eprintln!("No existing test vectors found at {FIXTURE_PATH}. Generating...");
        }
        let vectors = generate_all_vectors()?;
        write_vectors(path, &vectors)?;
        vectors
    };

    if verify_vectors(&vectors)? {
        eprintln!("All test vectors verified successfully.");
        Ok(())
    } else {
        anyhow::bail!("test vector verification failed")
    }
}
