//! Challenge verification logic.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use warden_common::{VerifyError, constants::STORE_TTL_GRACE_SECS};

use super::StoredChallenge;
use crate::clock::Clock;
use crate::store::{Key, Store};

/// Longest challenge id or solution accepted from a client
const MAX_INPUT_LEN: usize = 128;

/// Challenge verifier service
pub struct ChallengeVerifier {
    clock: Arc<dyn Clock>,
}

impl ChallengeVerifier {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Verify a proof-of-work solution.
    ///
    /// On success the challenge is deleted before returning, so a second
    /// verification with the same id yields `NotFound`.
    pub async fn verify(
        &self,
        store: &Store,
        challenge_id: &str,
        solution: &str,
    ) -> Result<(), VerifyError> {
        if !is_well_formed(challenge_id) || !is_well_formed(solution) {
            return Err(VerifyError::Malformed);
        }

        let key = Key::challenge(challenge_id);
        let Some(raw) = store.get(&key).await else {
            return Err(VerifyError::NotFound);
        };

        let challenge: StoredChallenge = match serde_json::from_str(&raw) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(challenge_id = %challenge_id, error = %e, "Discarding unreadable challenge");
                store.delete(&key).await;
                return Err(VerifyError::NotFound);
            }
        };

        let now = self.clock.timestamp();
        if challenge.is_expired_at(now) {
            store.delete(&key).await;
            tracing::debug!(challenge_id = %challenge_id, "Challenge expired");
            return Err(VerifyError::Expired);
        }

        let digest = solution_digest(&challenge.id, &challenge.nonce, solution);
        if !challenge.difficulty.is_met_by(&digest) {
            tracing::debug!(
                challenge_id = %challenge_id,
                difficulty = challenge.difficulty.value(),
                "Proof-of-work rejected"
            );
            return Err(VerifyError::Invalid);
        }

        // Single use
        if !store.delete(&key).await {
            let remaining = (challenge.expires_at - now).max(0) as u64 + STORE_TTL_GRACE_SECS;
            tracing::warn!(challenge_id = %challenge_id, "Remote delete unconfirmed, tombstoning challenge");
            store.bury(&key, Duration::from_secs(remaining)).await;
        }

        tracing::info!(challenge_id = %challenge_id, "Challenge verified");
        Ok(())
    }
}

/// Lowercase hex SHA-256 of `id ++ nonce ++ solution`
pub fn solution_digest(id: &str, nonce: &str, solution: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(nonce.as_bytes());
    hasher.update(solution.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn is_well_formed(input: &str) -> bool {
    !input.is_empty()
        && input.len() <= MAX_INPUT_LEN
        && input.bytes().all(|b| b.is_ascii_graphic())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::ChallengeGenerator;
    use crate::challenge::test_support::{solve, wrong_solution};
    use crate::clock::ManualClock;
    use crate::config::StorageConfig;
    use crate::store::testing::FakeNode;
    use warden_common::Difficulty;

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Store,
        generator: ChallengeGenerator,
        verifier: ChallengeVerifier,
    }

    fn fixture(ttl: u64) -> Fixture {
        let clock = Arc::new(ManualClock::new());
        Fixture {
            store: Store::local_only(clock.clone()),
            generator: ChallengeGenerator::new(ttl, clock.clone()),
            verifier: ChallengeVerifier::new(clock.clone()),
            clock,
        }
    }

    #[test]
    fn test_solution_digest_known_vector() {
        // sha256("abc")
        assert_eq!(
            solution_digest("a", "b", "c"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_challenge_is_consumed_once() {
        let f = fixture(300);
        let challenge = f.generator.generate(&f.store, Difficulty::new(4)).await.unwrap();
        let solution = solve(&challenge);

        assert_eq!(
            f.verifier.verify(&f.store, &challenge.id, &solution).await,
            Ok(())
        );
        assert_eq!(
            f.verifier.verify(&f.store, &challenge.id, &solution).await,
            Err(VerifyError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_expired_challenge_is_removed() {
        let f = fixture(60);
        let challenge = f.generator.generate(&f.store, Difficulty::new(1)).await.unwrap();
        let solution = solve(&challenge);

        f.clock.advance_secs(61);
        assert_eq!(
            f.verifier.verify(&f.store, &challenge.id, &solution).await,
            Err(VerifyError::Expired)
        );
        assert!(!f.store.exists(&Key::challenge(&challenge.id)).await);
        assert_eq!(
            f.verifier.verify(&f.store, &challenge.id, &solution).await,
            Err(VerifyError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_challenge_valid_at_expiry_instant() {
        let f = fixture(60);
        let challenge = f.generator.generate(&f.store, Difficulty::new(1)).await.unwrap();

        f.clock.advance_secs(60);
        assert_eq!(
            f.verifier.verify(&f.store, &challenge.id, &solve(&challenge)).await,
            Ok(())
        );
    }

    #[tokio::test]
    async fn test_failed_primary_delete_cannot_be_replayed() {
        let a = FakeNode::spawn("master").await;
        let b = FakeNode::spawn("slave").await;
        let clock = Arc::new(ManualClock::new());
        let config = StorageConfig {
            nodes: vec![a.address.clone(), b.address.clone()],
            timeout_ms: 300,
            ..Default::default()
        };
        let store = Store::new(&config, clock.clone());
        let generator = ChallengeGenerator::new(300, clock.clone());
        let verifier = ChallengeVerifier::new(clock.clone());

        let challenge = generator.generate(&store, Difficulty::new(1)).await.unwrap();
        let qualified = store.qualify(&Key::challenge(&challenge.id));
        let record = a.value(&qualified).unwrap();
        b.insert(&qualified, &record);
        let solution = solve(&challenge);

        // Read served by the replica, delete to the primary fails
        a.set_broken(true);
        assert_eq!(verifier.verify(&store, &challenge.id, &solution).await, Ok(()));

        a.set_broken(false);
        clock.advance_secs(31);
        assert_eq!(a.value(&qualified), Some(record));
        assert_eq!(
            verifier.verify(&store, &challenge.id, &solution).await,
            Err(VerifyError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_wrong_solution_keeps_challenge() {
        let f = fixture(300);
        let challenge = f.generator.generate(&f.store, Difficulty::new(2)).await.unwrap();

        assert_eq!(
            f.verifier
                .verify(&f.store, &challenge.id, &wrong_solution(&challenge))
                .await,
            Err(VerifyError::Invalid)
        );
        assert_eq!(
            f.verifier.verify(&f.store, &challenge.id, &solve(&challenge)).await,
            Ok(())
        );
    }

    #[tokio::test]
    async fn test_malformed_input() {
        let f = fixture(300);
        assert_eq!(
            f.verifier.verify(&f.store, "", "123").await,
            Err(VerifyError::Malformed)
        );
        assert_eq!(
            f.verifier.verify(&f.store, "abc", "").await,
            Err(VerifyError::Malformed)
        );
        assert_eq!(
            f.verifier.verify(&f.store, "a b", "1").await,
            Err(VerifyError::Malformed)
        );
        assert_eq!(
            f.verifier.verify(&f.store, &"x".repeat(200), "1").await,
            Err(VerifyError::Malformed)
        );
        assert_eq!(
            f.verifier.verify(&f.store, "never-issued", "1").await,
            Err(VerifyError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_unreadable_record_is_discarded() {
        let f = fixture(300);
        f.store.set(&Key::challenge("junk"), "not json", 60).await;

        assert_eq!(
            f.verifier.verify(&f.store, "junk", "1").await,
            Err(VerifyError::NotFound)
        );
        assert!(!f.store.exists(&Key::challenge("junk")).await);
    }
}
