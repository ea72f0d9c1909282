//! Admission control for concurrent identical queries
//!
//! Guarantees at most one in-flight synthesis per semantic fingerprint.
//! Colliding queries are detected by embedding similarity against the
//! registered in-flight set. Under the `serialize` policy followers wait
//! for the leader's outcome on a watch channel; under `race` they proceed
//! independently and the store's insert keeps only the first entry.
//!
//! Leader cleanup happens on guard drop, so followers never hang on a
//! leader that failed or was cancelled.

use docmind_common::config::AdmissionPolicy;
use docmind_common::embeddings::cosine_similarity;
use docmind_common::metrics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Terminal state of a leader's pipeline run
#[derive(Debug, Clone, Copy, PartialEq)]
enum FlightOutcome {
    Pending,
    /// Leader produced (or adopted) this memory entry
    Completed(i64),
    /// Leader failed or was dropped before completing
    Abandoned,
}

struct Flight {
    id: u64,
    embedding: Vec<f32>,
    rx: watch::Receiver<FlightOutcome>,
}

type FlightList = Arc<Mutex<Vec<Flight>>>;

/// Decision for one admitted query
pub enum AdmissionOutcome {
    /// Caller leads: run the pipeline and report through the guard
    Leader(FlightGuard),
    /// A colliding leader finished first with this memory entry
    Completed(i64),
    /// Proceed with a full pipeline without coordination (race policy,
    /// or a serialize leader that failed)
    Proceed,
}

/// Leader handle. Dropping it without [`FlightGuard::complete`] marks the
/// flight abandoned and releases any waiting followers.
pub struct FlightGuard {
    flights: FlightList,
    flight_id: u64,
    tx: watch::Sender<FlightOutcome>,
    done: bool,
}

impl FlightGuard {
    /// Report success: waiting followers answer from `memory_id`
    pub fn complete(mut self, memory_id: i64) {
        self.tx.send_replace(FlightOutcome::Completed(memory_id));
        self.deregister();
        self.done = true;
    }

    fn deregister(&self) {
        let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());
        flights.retain(|f| f.id != self.flight_id);
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if !self.done {
            self.tx.send_replace(FlightOutcome::Abandoned);
            self.deregister();
        }
    }
}

/// In-process registry of in-flight synthesis runs
pub struct AdmissionRegistry {
    flights: FlightList,
    policy: AdmissionPolicy,
    threshold: f32,
    next_id: AtomicU64,
}

impl AdmissionRegistry {
    pub fn new(policy: AdmissionPolicy, threshold: f32) -> Self {
        Self {
            flights: Arc::new(Mutex::new(Vec::new())),
            policy,
            threshold,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Number of registered in-flight leaders
    pub fn in_flight(&self) -> usize {
        self.flights.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Admit a query for synthesis.
    ///
    /// Registers the caller as leader when no in-flight embedding is within
    /// the collision threshold. Otherwise the policy decides: `serialize`
    /// waits for the leader's outcome, `race` proceeds immediately.
    pub async fn admit(&self, embedding: &[f32]) -> AdmissionOutcome {
        let policy_label = match self.policy {
            AdmissionPolicy::Serialize => "serialize",
            AdmissionPolicy::Race => "race",
        };

        let colliding_rx = {
            let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());

            let existing = flights
                .iter()
                .find(|f| cosine_similarity(&f.embedding, embedding) >= self.threshold)
                .map(|f| f.rx.clone());

            match existing {
                Some(rx) => Some(rx),
                None => {
                    // No collision: register as leader while still holding
                    // the lock so a concurrent twin cannot also lead
                    let (tx, rx) = watch::channel(FlightOutcome::Pending);
                    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                    flights.push(Flight {
                        id,
                        embedding: embedding.to_vec(),
                        rx,
                    });

                    metrics::record_admission(policy_label, true);
                    return AdmissionOutcome::Leader(FlightGuard {
                        flights: self.flights.clone(),
                        flight_id: id,
                        tx,
                        done: false,
                    });
                }
            }
        };

        metrics::record_admission(policy_label, false);

        let Some(mut rx) = colliding_rx else {
            return AdmissionOutcome::Proceed;
        };

        if self.policy == AdmissionPolicy::Race {
            tracing::debug!("Colliding query proceeding under race policy");
            return AdmissionOutcome::Proceed;
        }

        tracing::debug!("Colliding query waiting for in-flight leader");
        let decision = match rx
            .wait_for(|outcome| !matches!(outcome, FlightOutcome::Pending))
            .await
        {
            Ok(outcome) => match *outcome {
                FlightOutcome::Completed(memory_id) => AdmissionOutcome::Completed(memory_id),
                _ => AdmissionOutcome::Proceed,
            },
            // Sender gone without a terminal value; treat as abandoned
            Err(_) => AdmissionOutcome::Proceed,
        };
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize_registry() -> Arc<AdmissionRegistry> {
        Arc::new(AdmissionRegistry::new(AdmissionPolicy::Serialize, 0.95))
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_first_caller_leads() {
        let registry = serialize_registry();
        let _guard = match registry.admit(&[1.0, 0.0]).await {
            AdmissionOutcome::Leader(g) => g,
            _ => panic!("expected leader"),
        };
        assert_eq!(registry.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_follower_receives_leader_result() {
        let registry = serialize_registry();

        let guard = match registry.admit(&[1.0, 0.0]).await {
            AdmissionOutcome::Leader(g) => g,
            _ => panic!("expected leader"),
        };

        let r2 = registry.clone();
        let follower = tokio::spawn(async move { r2.admit(&[0.999, 0.001]).await });
        settle().await;

        guard.complete(42);

        match follower.await.unwrap() {
            AdmissionOutcome::Completed(id) => assert_eq!(id, 42),
            AdmissionOutcome::Leader(_) => panic!("follower became leader"),
            AdmissionOutcome::Proceed => panic!("follower proceeded uncoordinated"),
        }
        assert_eq!(registry.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_follower_proceeds_when_leader_drops() {
        let registry = serialize_registry();

        let guard = match registry.admit(&[1.0, 0.0]).await {
            AdmissionOutcome::Leader(g) => g,
            _ => panic!("expected leader"),
        };

        let r2 = registry.clone();
        let follower = tokio::spawn(async move { r2.admit(&[1.0, 0.0]).await });
        settle().await;

        drop(guard);

        match follower.await.unwrap() {
            AdmissionOutcome::Proceed => {}
            _ => panic!("expected uncoordinated proceed after leader failure"),
        }
        assert_eq!(registry.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_distinct_queries_do_not_collide() {
        let registry = serialize_registry();

        let _g1 = match registry.admit(&[1.0, 0.0]).await {
            AdmissionOutcome::Leader(g) => g,
            _ => panic!("expected leader"),
        };

        let _g2 = match registry.admit(&[0.0, 1.0]).await {
            AdmissionOutcome::Leader(g) => g,
            _ => panic!("orthogonal embedding should lead independently"),
        };
        assert_eq!(registry.in_flight(), 2);
    }

    #[tokio::test]
    async fn test_race_policy_never_waits() {
        let registry = Arc::new(AdmissionRegistry::new(AdmissionPolicy::Race, 0.95));

        let _guard = match registry.admit(&[1.0, 0.0]).await {
            AdmissionOutcome::Leader(g) => g,
            _ => panic!("expected leader"),
        };

        // A colliding caller returns immediately instead of waiting
        match registry.admit(&[1.0, 0.0]).await {
            AdmissionOutcome::Proceed => {}
            _ => panic!("race policy should proceed"),
        }
    }
}
