//! Data contracts of the external collaborators.
//!
//! tollgate does not implement the edge routing compiler, the inner-header
//! transport, or the verification aggregator. It only consumes and produces
//! the shapes below.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Maximum clock skew, in seconds, accepted by the inner-header transport
/// between a payload's expiry and the receiver's clock.
pub const INNER_MAX_SKEW_SECS: u64 = 3;

/// Domain prefix the aggregator client hashes with a ticket MAC to pick a
/// shard URL.
pub const SITEVERIFY_SHARD_PREFIX: &str = "siteverify|";

/// Challenge parameters from the configuration matched for a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeConfig {
    /// Whether a proof-of-work challenge is issued at all.
    #[serde(default)]
    pub powcheck: bool,
    /// Chain length requested in INIT.
    #[serde(default = "default_steps")]
    pub steps: u32,
    /// Leading zero bits the hashcash digest must carry.
    #[serde(default)]
    pub hashcash_bits: u32,
    /// Default segment length for OPEN.
    #[serde(default = "default_one")]
    pub segment_len: u32,
    /// Number of indices the verifier samples for OPEN.
    #[serde(default = "default_sample_k")]
    pub sample_k: u32,
    /// Number of sampled positions that also request a midpoint.
    #[serde(default)]
    pub spine_k: u32,
}

fn default_steps() -> u32 {
    1
}

fn default_one() -> u32 {
    1
}

fn default_sample_k() -> u32 {
    16
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            powcheck: false,
            steps: default_steps(),
            hashcash_bits: 0,
            segment_len: default_one(),
            sample_k: default_sample_k(),
            spine_k: 0,
        }
    }
}

impl ChallengeConfig {
    /// Build the parameter object of an `INIT` request for `binding`.
    pub fn to_init_params(&self, binding: &str) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("bindingString".to_string(), Value::from(binding));
        params.insert("steps".to_string(), Value::from(self.steps));
        params.insert("hashcashBits".to_string(), Value::from(self.hashcash_bits));
        params.insert("segmentLen".to_string(), Value::from(self.segment_len));
        params
    }
}

/// Authenticated payload carried by the inner-header transport
/// (`HMAC-SHA256(payload "." expiry)`), after decoding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InnerPayload {
    /// Envelope version; only `1` is accepted.
    pub v: u32,
    /// Matched rule id.
    pub id: i64,
    /// Matched configuration.
    pub c: Value,
    /// Derived request facts.
    pub d: Value,
    /// Strategy block.
    pub s: Value,
}

impl InnerPayload {
    /// Whether an envelope expiring at `expiry` may be accepted at `now`
    /// (both Unix seconds): not expired, and not further ahead than the
    /// allowed skew.
    pub fn expiry_acceptable(expiry: u64, now: u64) -> bool {
        expiry >= now && expiry <= now.saturating_add(INNER_MAX_SKEW_SECS)
    }

    /// Extract the challenge parameters from the matched configuration.
    pub fn challenge_config(&self) -> serde_json::Result<ChallengeConfig> {
        serde_json::from_value(self.c.clone())
    }
}

/// Proof-of-work consumption record forwarded to the aggregator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowConsume {
    /// Committed Merkle root, base64url.
    pub root_b64: String,
    /// Nonce the commitment was produced under.
    pub nonce: String,
}

/// Request sent to the verification aggregator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteverifyRequest {
    /// Ticket MAC; also the sharding key.
    pub ticket_mac: String,
    /// Provider tokens presented by the client.
    pub token: Map<String, Value>,
    /// Provider settings from the matched configuration.
    pub providers: Map<String, Value>,
    /// Checks the aggregator should run.
    pub checks: Map<String, Value>,
    /// Proof-of-work commitment to mark as spent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pow_consume: Option<PowConsume>,
}

impl SiteverifyRequest {
    /// Index into a list of `shard_count` aggregator URLs: the first four
    /// bytes of `SHA-256("siteverify|" ‖ ticketMac)`, big-endian, modulo the
    /// count. `None` for an empty list.
    pub fn shard_index(&self, shard_count: usize) -> Option<usize> {
        if shard_count == 0 {
            return None;
        }
        let digest = Sha256::new()
            .chain_update(SITEVERIFY_SHARD_PREFIX)
            .chain_update(&self.ticket_mac)
            .finalize();
        let bucket = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        Some(bucket as usize % shard_count)
    }
}

/// Aggregator verdict.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SiteverifyResponse {
    /// Overall verdict.
    pub ok: bool,
    /// Failure reason; empty on success.
    #[serde(default)]
    pub reason: String,
    /// Per-check results.
    #[serde(default)]
    pub checks: Map<String, Value>,
    /// Per-provider results.
    #[serde(default)]
    pub providers: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_challenge_config_defaults() {
        let config: ChallengeConfig = serde_json::from_value(json!({})).expect("parse");
        assert_eq!(config, ChallengeConfig::default());
        assert!(!config.powcheck);
        assert_eq!(config.steps, 1);
    }

    #[test]
    fn test_init_params_from_config() {
        let config = ChallengeConfig {
            powcheck: true,
            steps: 4096,
            hashcash_bits: 3,
            segment_len: 8,
            ..ChallengeConfig::default()
        };
        let params = config.to_init_params("sess|abc");
        assert_eq!(params["bindingString"], "sess|abc");
        assert_eq!(params["steps"], 4096);
        assert_eq!(params["hashcashBits"], 3);
        assert_eq!(params["segmentLen"], 8);
    }

    #[test]
    fn test_inner_payload_config() {
        let payload: InnerPayload = serde_json::from_value(json!({
            "v": 1, "id": 3,
            "c": {"powcheck": true, "steps": 64, "hashcashBits": 2},
            "d": {}, "s": {}
        }))
        .expect("parse");
        let config = payload.challenge_config().expect("config");
        assert_eq!(config.steps, 64);
        assert_eq!(config.hashcash_bits, 2);
        assert_eq!(config.segment_len, 1);
    }

    #[test]
    fn test_inner_expiry_window() {
        let now = 1_700_000_000;
        assert!(InnerPayload::expiry_acceptable(now, now));
        assert!(InnerPayload::expiry_acceptable(now + 3, now));
        assert!(!InnerPayload::expiry_acceptable(now + 4, now));
        assert!(!InnerPayload::expiry_acceptable(now - 1, now));
    }

    #[test]
    fn test_shard_index() {
        let request = SiteverifyRequest {
            ticket_mac: "ticket-mac".to_string(),
            token: Map::new(),
            providers: Map::new(),
            checks: Map::new(),
            pow_consume: None,
        };
        assert_eq!(request.shard_index(0), None);
        assert_eq!(request.shard_index(1), Some(0));

        // SHA-256("siteverify|ticket-mac") starts 0x56ef..., bucket 1458530657.
        assert_eq!(request.shard_index(2), Some(1));
        assert_eq!(request.shard_index(3), Some(2));
        assert_eq!(request.shard_index(7), Some(3));
    }

    #[test]
    fn test_siteverify_shapes() {
        let request = SiteverifyRequest {
            ticket_mac: "mac".to_string(),
            token: Map::new(),
            providers: Map::new(),
            checks: Map::new(),
            pow_consume: None,
        };
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value["ticketMac"], "mac");
        assert!(value.get("powConsume").is_none());

        let response: SiteverifyResponse =
            serde_json::from_value(json!({"ok": false, "reason": "pow_failed"})).expect("parse");
        assert!(!response.ok);
        assert_eq!(response.reason, "pow_failed");
    }
}
