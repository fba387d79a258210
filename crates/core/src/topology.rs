//! Shard topology: routing strong fingerprints to storage accounts.
//!
//! A topology is built once from configuration and never mutated. Routing is
//! a pure function of the universe, namespace, fingerprint and account set, so
//! every process with the same configuration agrees on where a record lives.

use crate::fingerprint::StrongFingerprint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

/// One physical storage partition.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShardAccount {
    /// A member of the jump-hash ring.
    Sharding {
        unique_id: String,
        shard: u32,
        purpose: String,
    },
    /// A dedicated account outside the ring.
    NonSharding { name: String },
}

impl ShardAccount {
    pub fn sharding(unique_id: impl Into<String>, shard: u32, purpose: impl Into<String>) -> Self {
        Self::Sharding {
            unique_id: unique_id.into(),
            shard,
            purpose: purpose.into(),
        }
    }

    pub fn non_sharding(name: impl Into<String>) -> Self {
        Self::NonSharding { name: name.into() }
    }

    /// Account name as used by the storage provider.
    pub fn name(&self) -> String {
        match self {
            Self::Sharding {
                unique_id,
                shard,
                purpose,
            } => format!("{unique_id}{shard}{purpose}"),
            Self::NonSharding { name } => name.clone(),
        }
    }

    pub fn is_sharding(&self) -> bool {
        matches!(self, Self::Sharding { .. })
    }

    fn shard_index(&self) -> Option<u32> {
        match self {
            Self::Sharding { shard, .. } => Some(*shard),
            Self::NonSharding { .. } => None,
        }
    }
}

impl fmt::Display for ShardAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// How keys are spread over the configured accounts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardingAlgorithm {
    #[default]
    JumpHash,
    SingleAccount,
}

/// Jump consistent hash (Lamping & Veach).
///
/// Maps `key` to a bucket in `[0, buckets)`. Growing `buckets` by one moves
/// about `1 / (buckets + 1)` of keys, all of them onto the new bucket.
/// Returns 0 when `buckets` is 0.
pub fn jump_consistent_hash(mut key: u64, buckets: u32) -> u32 {
    if buckets == 0 {
        return 0;
    }
    let mut b: i64 = -1;
    let mut j: i64 = 0;
    while j < i64::from(buckets) {
        b = j;
        key = key.wrapping_mul(2_862_933_555_777_941_757).wrapping_add(1);
        j = ((b + 1) as f64 * ((1u64 << 31) as f64 / ((key >> 33) + 1) as f64)) as i64;
    }
    b as u32
}

/// Check that a universe or namespace can be embedded as one key segment.
///
/// Allowed: ASCII alphanumerics, `-` and `_`, at most 64 characters.
pub fn validate_name(kind: &str, name: &str) -> crate::Result<()> {
    if name.is_empty() || name.len() > 64 {
        return Err(crate::Error::InvalidTopology(format!(
            "{kind} must be 1-64 characters, got {}",
            name.len()
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(crate::Error::InvalidTopology(format!(
            "{kind} {name:?} contains characters other than [A-Za-z0-9_-]"
        )));
    }
    Ok(())
}

/// Immutable routing table for one universe/namespace.
#[derive(Clone, Debug)]
pub struct ShardedTopology {
    universe: String,
    namespace: String,
    algorithm: ShardingAlgorithm,
    /// Sharding accounts ordered by shard index.
    ring: Vec<ShardAccount>,
    non_sharding: Option<ShardAccount>,
    non_sharding_namespaces: HashSet<String>,
}

impl ShardedTopology {
    /// Build a topology, checking that every key will have somewhere to go.
    pub fn new(
        universe: impl Into<String>,
        namespace: impl Into<String>,
        algorithm: ShardingAlgorithm,
        accounts: Vec<ShardAccount>,
        non_sharding_namespaces: impl IntoIterator<Item = String>,
    ) -> crate::Result<Self> {
        let universe = universe.into();
        let namespace = namespace.into();
        validate_name("universe", &universe)?;
        validate_name("namespace", &namespace)?;

        let mut ring = Vec::new();
        let mut non_sharding = None;
        for account in accounts {
            if account.is_sharding() {
                ring.push(account);
            } else if non_sharding.replace(account).is_some() {
                return Err(crate::Error::InvalidTopology(
                    "at most one non-sharding account may be configured".to_string(),
                ));
            }
        }
        ring.sort_by_key(|a| a.shard_index());

        let mut seen = HashSet::new();
        for account in &ring {
            if !seen.insert(account.shard_index()) {
                return Err(crate::Error::InvalidTopology(format!(
                    "duplicate shard index for account {account}"
                )));
            }
        }

        if ring.is_empty() && non_sharding.is_none() {
            return Err(crate::Error::InvalidTopology(
                "no storage accounts configured".to_string(),
            ));
        }

        let non_sharding_namespaces: HashSet<String> =
            non_sharding_namespaces.into_iter().collect();
        if non_sharding.is_none() && non_sharding_namespaces.contains(&namespace) {
            return Err(crate::Error::InvalidTopology(format!(
                "namespace {namespace} is designated to the non-sharding account but none is configured"
            )));
        }

        Ok(Self {
            universe,
            namespace,
            algorithm,
            ring,
            non_sharding,
            non_sharding_namespaces,
        })
    }

    /// The same layout serving a different namespace.
    pub fn with_namespace(&self, namespace: &str) -> crate::Result<Self> {
        Self::new(
            self.universe.clone(),
            namespace.to_string(),
            self.algorithm,
            self.all_accounts().into_iter().cloned().collect(),
            self.non_sharding_namespaces.iter().cloned(),
        )
    }

    pub fn universe(&self) -> &str {
        &self.universe
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn algorithm(&self) -> ShardingAlgorithm {
        self.algorithm
    }

    /// The 64-bit value fed to the jump hash for `key`.
    pub fn routing_hash(&self, key: &StrongFingerprint) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.universe.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.namespace.as_bytes());
        hasher.update([0u8]);
        hasher.update(key.to_bytes());
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(prefix)
    }

    /// The account that owns `key`. Never fails for a constructed topology.
    pub fn route(&self, key: &StrongFingerprint) -> &ShardAccount {
        if let Some(account) = self.fixed_account() {
            return account;
        }
        let bucket = jump_consistent_hash(self.routing_hash(key), self.ring.len() as u32);
        &self.ring[bucket as usize]
    }

    /// Distinct accounts that may hold records for this namespace.
    pub fn accounts(&self) -> Vec<&ShardAccount> {
        match self.fixed_account() {
            Some(account) => vec![account],
            None => self.ring.iter().collect(),
        }
    }

    /// Every configured account, whether or not this namespace routes to it.
    pub fn all_accounts(&self) -> Vec<&ShardAccount> {
        self.ring.iter().chain(self.non_sharding.iter()).collect()
    }

    /// Account used for every key, if routing bypasses the ring.
    fn fixed_account(&self) -> Option<&ShardAccount> {
        if let Some(dedicated) = &self.non_sharding
            && (self.non_sharding_namespaces.contains(&self.namespace)
                || self.algorithm == ShardingAlgorithm::SingleAccount
                || self.ring.is_empty())
        {
            return Some(dedicated);
        }
        match self.algorithm {
            // Without a dedicated account, single-account mode pins to the lowest shard.
            ShardingAlgorithm::SingleAccount => self.ring.first(),
            ShardingAlgorithm::JumpHash => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{Selector, WeakFingerprint};
    use crate::hash::ContentHash;

    fn ring(n: u32) -> Vec<ShardAccount> {
        (0..n).map(|i| ShardAccount::sharding("acct", i, "meta")).collect()
    }

    fn key(i: u32) -> StrongFingerprint {
        StrongFingerprint::new(
            WeakFingerprint::compute(format!("weak-{i}").as_bytes()),
            Selector::new(ContentHash::compute(&i.to_le_bytes()), None),
        )
    }

    fn topology(accounts: Vec<ShardAccount>) -> ShardedTopology {
        ShardedTopology::new(
            "u",
            "default",
            ShardingAlgorithm::JumpHash,
            accounts,
            Vec::<String>::new(),
        )
        .expect("valid topology")
    }

    #[test]
    fn test_jump_hash_known_values() {
        assert_eq!(jump_consistent_hash(0, 1), 0);
        assert_eq!(jump_consistent_hash(123_456, 0), 0);
        for k in 0..1000u64 {
            assert!(jump_consistent_hash(k, 7) < 7);
        }
    }

    #[test]
    fn test_account_names() {
        assert_eq!(ShardAccount::sharding("abc", 3, "md").name(), "abc3md");
        assert_eq!(ShardAccount::non_sharding("solo").name(), "solo");
    }

    #[test]
    fn test_routing_is_stable() {
        let a = topology(ring(8));
        let b = topology(ring(8));
        for i in 0..500 {
            assert_eq!(a.route(&key(i)), b.route(&key(i)));
            assert_eq!(a.route(&key(i)), a.route(&key(i)));
        }
    }

    #[test]
    fn test_account_order_in_config_does_not_matter() {
        let mut reversed = ring(6);
        reversed.reverse();
        let a = topology(ring(6));
        let b = topology(reversed);
        for i in 0..200 {
            assert_eq!(a.route(&key(i)), b.route(&key(i)));
        }
    }

    #[test]
    fn test_adding_account_remaps_bounded_fraction_onto_new_account() {
        let before = topology(ring(10));
        let after = topology(ring(11));
        let total = 10_000;
        let mut moved = 0;
        for i in 0..total {
            let old = before.route(&key(i));
            let new = after.route(&key(i));
            if old != new {
                moved += 1;
                assert_eq!(new, &ShardAccount::sharding("acct", 10, "meta"));
            }
        }
        let fraction = moved as f64 / total as f64;
        assert!(
            (0.06..0.12).contains(&fraction),
            "moved fraction {fraction} outside expected range"
        );
    }

    #[test]
    fn test_keys_spread_over_all_accounts() {
        let t = topology(ring(4));
        let used: HashSet<_> = (0..400).map(|i| t.route(&key(i)).name()).collect();
        assert_eq!(used.len(), 4);
    }

    #[test]
    fn test_namespace_and_universe_change_routing_hash() {
        let a = topology(ring(4));
        let b = ShardedTopology::new(
            "u",
            "other",
            ShardingAlgorithm::JumpHash,
            ring(4),
            Vec::<String>::new(),
        )
        .unwrap();
        let c = ShardedTopology::new(
            "v",
            "default",
            ShardingAlgorithm::JumpHash,
            ring(4),
            Vec::<String>::new(),
        )
        .unwrap();
        assert_ne!(a.routing_hash(&key(1)), b.routing_hash(&key(1)));
        assert_ne!(a.routing_hash(&key(1)), c.routing_hash(&key(1)));
    }

    #[test]
    fn test_designated_namespace_uses_non_sharding_account() {
        let mut accounts = ring(4);
        accounts.push(ShardAccount::non_sharding("solo"));
        let t = ShardedTopology::new(
            "u",
            "pinned",
            ShardingAlgorithm::JumpHash,
            accounts,
            ["pinned".to_string()],
        )
        .unwrap();
        for i in 0..50 {
            assert_eq!(t.route(&key(i)).name(), "solo");
        }
        assert_eq!(t.accounts().len(), 1);
        assert_eq!(t.all_accounts().len(), 5);
    }

    #[test]
    fn test_single_account_algorithm() {
        let t = ShardedTopology::new(
            "u",
            "n",
            ShardingAlgorithm::SingleAccount,
            ring(3),
            Vec::<String>::new(),
        )
        .unwrap();
        for i in 0..50 {
            assert_eq!(t.route(&key(i)).name(), "acct0meta");
        }
    }

    #[test]
    fn test_empty_ring_falls_back_to_non_sharding() {
        let t = topology(vec![ShardAccount::non_sharding("solo")]);
        assert_eq!(t.route(&key(7)).name(), "solo");
    }

    #[test]
    fn test_with_namespace_keeps_accounts() {
        let mut accounts = ring(3);
        accounts.push(ShardAccount::non_sharding("solo"));
        let base = ShardedTopology::new(
            "u",
            "default",
            ShardingAlgorithm::JumpHash,
            accounts,
            ["pinned".to_string()],
        )
        .unwrap();
        assert_eq!(base.accounts().len(), 3);

        let pinned = base.with_namespace("pinned").unwrap();
        assert_eq!(pinned.namespace(), "pinned");
        assert_eq!(pinned.route(&key(1)).name(), "solo");
        assert_eq!(pinned.all_accounts().len(), 4);

        assert!(base.with_namespace("bad/name").is_err());
        assert!(base.with_namespace("").is_err());
    }

    #[test]
    fn test_invalid_topologies_are_rejected() {
        assert!(
            ShardedTopology::new(
                "u",
                "n",
                ShardingAlgorithm::JumpHash,
                vec![],
                Vec::<String>::new(),
            )
            .is_err()
        );
        let dup = vec![
            ShardAccount::sharding("a", 0, "m"),
            ShardAccount::sharding("b", 0, "m"),
        ];
        assert!(
            ShardedTopology::new(
                "u",
                "n",
                ShardingAlgorithm::JumpHash,
                dup,
                Vec::<String>::new(),
            )
            .is_err()
        );
        assert!(
            ShardedTopology::new(
                "u",
                "n",
                ShardingAlgorithm::JumpHash,
                ring(2),
                ["n".to_string()]
            )
            .is_err()
        );
    }
}
