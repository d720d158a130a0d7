//! Racing consumes against the same pass.
//!
//! A pass with N uses must be accepted exactly N times no matter how many
//! threads hit it at once, and the remaining-use counts handed back to the
//! winners must be N-1, N-2, ..., 0 with no repeats.

use std::sync::{Arc, Barrier};
use std::thread;

use passgate::config::PassConfig;
use passgate::pass::{ConsumeOutcome, FingerprintInputs, PassService, PassStore, RejectReason};

const MAX_USES: u32 = 10;
const CALLERS: usize = 100;
const ROUNDS: usize = 100;

fn service() -> PassService {
    PassService::new(
        PassStore::new(10_000),
        &PassConfig {
            max_uses: MAX_USES as i64,
            ttl_secs: 600,
            ..PassConfig::default()
        },
    )
}

fn client() -> FingerprintInputs {
    FingerprintInputs::new("203.0.113.7", "Mozilla/5.0")
}

/// Fire `CALLERS` consumes at one token from `threads` OS threads released
/// together by a barrier.
fn race(passes: &PassService, token: &str, threads: usize) -> Vec<ConsumeOutcome> {
    let barrier = Arc::new(Barrier::new(threads));
    let per_thread = CALLERS / threads;
    let extra = CALLERS % threads;

    thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let barrier = barrier.clone();
                let calls = per_thread + usize::from(i < extra);
                s.spawn(move || {
                    let inputs = client();
                    barrier.wait();
                    (0..calls)
                        .map(|_| passes.consume(Some(token), &inputs))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|h| h.join().expect("consumer thread panicked"))
            .collect()
    })
}

fn assert_exactly_max_uses(outcomes: &[ConsumeOutcome]) {
    assert_eq!(outcomes.len(), CALLERS);

    let mut remaining: Vec<u32> = outcomes
        .iter()
        .filter_map(|o| match o {
            ConsumeOutcome::Accepted { remaining_uses } => Some(*remaining_uses),
            ConsumeOutcome::Rejected(_) => None,
        })
        .collect();
    assert_eq!(remaining.len(), MAX_USES as usize, "accepted count");

    remaining.sort_unstable();
    let expected: Vec<u32> = (0..MAX_USES).collect();
    assert_eq!(remaining, expected, "each remaining count observed exactly once");

    for o in outcomes.iter().filter(|o| !o.is_accepted()) {
        assert_eq!(o.reason(), Some(RejectReason::UnknownOrExpiredPass));
    }
}

#[test]
fn test_concurrent_consume_never_exceeds_max_uses() {
    let passes = service();
    for round in 0..ROUNDS {
        // 2..=17 threads, cycling so interleavings differ between rounds
        let threads = 2 + (round * 7) % 16;
        let pass = passes.issue(&client()).unwrap();

        let outcomes = race(&passes, &pass.token, threads);

        assert_exactly_max_uses(&outcomes);
        assert!(passes.store().get(&pass.token).is_none());
    }
    assert!(passes.store().is_empty());
}

#[test]
fn test_one_caller_per_thread() {
    let passes = service();
    for _ in 0..10 {
        let pass = passes.issue(&client()).unwrap();
        let outcomes = race(&passes, &pass.token, CALLERS);
        assert_exactly_max_uses(&outcomes);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_consume_from_tasks() {
    let passes = service();
    for _ in 0..20 {
        let pass = passes.issue(&client()).unwrap();

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let passes = passes.clone();
                let token = pass.token.clone();
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    passes.consume(Some(token.as_str()), &client())
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(CALLERS);
        for h in handles {
            outcomes.push(h.await.unwrap());
        }
        assert_exactly_max_uses(&outcomes);
    }
}

#[test]
fn test_independent_tokens_do_not_interfere() {
    let passes = service();
    let tokens: Vec<String> = (0..8).map(|_| passes.issue(&client()).unwrap().token).collect();

    let accepted: Vec<usize> = thread::scope(|s| {
        let handles: Vec<_> = tokens
            .iter()
            .map(|token| {
                let passes = &passes;
                s.spawn(move || {
                    let inputs = client();
                    (0..25)
                        .filter(|_| passes.consume(Some(token.as_str()), &inputs).is_accepted())
                        .count()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(accepted.iter().all(|&n| n == MAX_USES as usize));
}

#[test]
fn test_mismatched_racers_do_not_steal_uses() {
    let passes = service();
    let pass = passes.issue(&client()).unwrap();

    let stolen = thread::scope(|s| {
        let thieves: Vec<_> = (0..8)
            .map(|i| {
                let passes = &passes;
                let token = pass.token.as_str();
                s.spawn(move || {
                    let inputs = FingerprintInputs::new(format!("198.51.100.{}", i), "Mozilla/5.0");
                    (0..50)
                        .filter(|_| passes.consume(Some(token), &inputs).is_accepted())
                        .count()
                })
            })
            .collect();
        thieves.into_iter().map(|h| h.join().unwrap()).sum::<usize>()
    });

    assert_eq!(stolen, 0);
    assert_eq!(passes.store().get(&pass.token).unwrap().remaining_uses(), MAX_USES);
}
