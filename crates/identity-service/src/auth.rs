//! Authentication registry: PIN bootstrap, admin keys, credential sets,
//! nonces and per-credential creation quotas.
//!
//! The registry is process-wide and guarded by the facade; none of it is
//! persisted (a restarted conode starts with a fresh registry and is
//! re-admitted through the PIN flow).

use shared_crypto::PublicKey;
use std::collections::{HashMap, HashSet};

/// How many chains a single credential may create before an operator
/// resets its counter.
pub const DEFAULT_CHAIN_QUOTA: i8 = 5;

/// Registry state. All mutation goes through the owning facade's lock.
#[derive(Default)]
pub struct AuthRegistry {
    /// One-time PINs awaiting first-admin registration.
    ///
    /// Consumed PINs are intentionally kept; see the admission notes in
    /// DESIGN.md before changing this.
    pins: HashSet<String>,
    /// Keys permitted to sign StoreKeys admissions.
    admin_keys: Vec<PublicKey>,
    /// Keys allowed to authenticate a creation under public auth.
    keys: Vec<PublicKey>,
    /// Attendee rings for anonymous (linkable ring) auth.
    sets: Vec<Vec<PublicKey>>,
    /// Outstanding authentication nonces.
    nonces: HashSet<Vec<u8>>,
    /// Remaining creations per ring-signature tag.
    tag_limits: HashMap<String, i8>,
    /// Remaining creations per public key string.
    point_limits: HashMap<String, i8>,
}

impl AuthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // --- PIN bootstrap ---

    pub fn add_pin(&mut self, pin: String) {
        self.pins.insert(pin);
    }

    pub fn has_pin(&self, pin: &str) -> bool {
        self.pins.contains(pin)
    }

    pub fn pins(&self) -> impl Iterator<Item = &String> {
        self.pins.iter()
    }

    /// Register a first admin: the key becomes both an admission signer
    /// and a public-auth credential.
    pub fn admit_admin(&mut self, public: PublicKey) {
        self.admin_keys.push(public);
        self.keys.push(public);
    }

    // --- admission ---

    pub fn admin_keys(&self) -> &[PublicKey] {
        &self.admin_keys
    }

    pub fn add_set(&mut self, attendees: Vec<PublicKey>) {
        self.sets.push(attendees);
    }

    pub fn sets(&self) -> &[Vec<PublicKey>] {
        &self.sets
    }

    pub fn add_keys(&mut self, publics: impl IntoIterator<Item = PublicKey>) {
        self.keys.extend(publics);
    }

    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    // --- nonces ---

    pub fn add_nonce(&mut self, nonce: Vec<u8>) {
        self.nonces.insert(nonce);
    }

    pub fn has_nonce(&self, nonce: &[u8]) -> bool {
        self.nonces.contains(nonce)
    }

    pub fn remove_nonce(&mut self, nonce: &[u8]) {
        self.nonces.remove(nonce);
    }

    // --- creation quotas ---
    //
    // The request path only checks the counters; the decrement happens in
    // the identity-propagation handler so all replicas stay converged.

    /// Check a tag's remaining quota, initialising it on first sight.
    /// Returns false when the credential has no creations left.
    pub fn tag_quota_available(&mut self, tag: &str) -> bool {
        *self
            .tag_limits
            .entry(tag.to_string())
            .or_insert(DEFAULT_CHAIN_QUOTA)
            > 0
    }

    /// Check a public key's remaining quota, initialising on first sight.
    pub fn point_quota_available(&mut self, pub_str: &str) -> bool {
        *self
            .point_limits
            .entry(pub_str.to_string())
            .or_insert(DEFAULT_CHAIN_QUOTA)
            > 0
    }

    /// Consume one creation from a tag's quota. Returns false on an
    /// exhausted counter (the caller logs; this cannot happen when the
    /// request path checked first).
    pub fn decrement_tag(&mut self, tag: &str) -> bool {
        let n = self
            .tag_limits
            .entry(tag.to_string())
            .or_insert(DEFAULT_CHAIN_QUOTA);
        if *n <= 0 {
            return false;
        }
        *n -= 1;
        true
    }

    /// Consume one creation from a public key's quota.
    pub fn decrement_point(&mut self, pub_str: &str) -> bool {
        let n = self
            .point_limits
            .entry(pub_str.to_string())
            .or_insert(DEFAULT_CHAIN_QUOTA);
        if *n <= 0 {
            return false;
        }
        *n -= 1;
        true
    }

    pub fn tag_quota(&self, tag: &str) -> Option<i8> {
        self.tag_limits.get(tag).copied()
    }

    pub fn point_quota(&self, pub_str: &str) -> Option<i8> {
        self.point_limits.get(pub_str).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::SchnorrKeyPair;

    #[test]
    fn test_pin_is_not_consumed() {
        let mut auth = AuthRegistry::new();
        auth.add_pin("123456".to_string());

        assert!(auth.has_pin("123456"));
        auth.admit_admin(SchnorrKeyPair::from_seed(b"admin").public());
        // Still valid after a successful registration.
        assert!(auth.has_pin("123456"));
    }

    #[test]
    fn test_admit_admin_registers_both_roles() {
        let mut auth = AuthRegistry::new();
        let pk = SchnorrKeyPair::from_seed(b"admin").public();
        auth.admit_admin(pk);
        assert_eq!(auth.admin_keys(), &[pk]);
        assert_eq!(auth.keys(), &[pk]);
    }

    #[test]
    fn test_nonce_single_use() {
        let mut auth = AuthRegistry::new();
        auth.add_nonce(vec![1, 2, 3]);
        assert!(auth.has_nonce(&[1, 2, 3]));
        auth.remove_nonce(&[1, 2, 3]);
        assert!(!auth.has_nonce(&[1, 2, 3]));
    }

    #[test]
    fn test_quota_initialises_and_counts_down() {
        let mut auth = AuthRegistry::new();
        assert!(auth.tag_quota_available("tag-a"));
        assert_eq!(auth.tag_quota("tag-a"), Some(DEFAULT_CHAIN_QUOTA));

        for _ in 0..DEFAULT_CHAIN_QUOTA {
            assert!(auth.decrement_tag("tag-a"));
        }
        assert_eq!(auth.tag_quota("tag-a"), Some(0));
        assert!(!auth.tag_quota_available("tag-a"));
        assert!(!auth.decrement_tag("tag-a"));
        // Monotone: never goes below zero, never resets.
        assert_eq!(auth.tag_quota("tag-a"), Some(0));
    }

    #[test]
    fn test_point_quota_is_independent_per_credential() {
        let mut auth = AuthRegistry::new();
        assert!(auth.decrement_point("aa"));
        assert_eq!(auth.point_quota("aa"), Some(DEFAULT_CHAIN_QUOTA - 1));
        assert_eq!(auth.point_quota("bb"), None);
        assert!(auth.point_quota_available("bb"));
    }
}
