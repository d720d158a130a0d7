//! Background job: drop expired access passes.
//!
//! Reads already ignore expired passes; the sweep bounds memory held by
//! passes nobody presents again.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;

use crate::pass::PassStore;

/// Spawn the sweep task. Call this once at startup.
pub fn spawn(store: PassStore, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let evicted = store.evict_expired();
            if evicted > 0 {
                tracing::debug!(evicted, live = store.len(), "swept expired access passes");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::{Fingerprint, FingerprintInputs, PassRecord};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_on_interval() {
        let store = PassStore::new(16);
        let fp = Fingerprint::from_inputs(&FingerprintInputs::new("10.0.0.1", "t"), true, true);
        store.set("a".into(), PassRecord::new(fp, Instant::now() + Duration::from_secs(10), 1));

        let handle = spawn(store.clone(), Duration::from_secs(60));

        time::sleep(Duration::from_secs(61)).await;
        assert!(store.is_empty());

        handle.abort();
    }
}
