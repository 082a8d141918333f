//! Property tests for request/answer correlation.
//!
//! Whatever order answers come back in, each submitter receives exactly the
//! answer that named its own request id.

use std::sync::Arc;

use proptest::prelude::*;
use sync_broker::domain::{BrokerError, RendezvousEngine, RequestId, ResolveOutcome, Submission};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Submit `count` requests one after another and learn their ids through
/// the consumer side.
async fn submit_all(
    engine: &Arc<RendezvousEngine>,
    count: usize,
) -> Vec<(RequestId, JoinHandle<Result<String, BrokerError>>)> {
    let mut submitted = Vec::with_capacity(count);
    for i in 0..count {
        let handle = {
            let engine = Arc::clone(engine);
            let submission =
                Submission::new("ask", format!("node-{}", i), "graph").with_prompt(format!("p{}", i));
            tokio::spawn(async move { engine.submit(submission).await.map(|answer| answer.content) })
        };

        // `current` moves to the newest submission once the task has run.
        let id = loop {
            let work = engine.await_work().await;
            if work.prompt == format!("p{}", i) {
                break work.id;
            }
            tokio::task::yield_now().await;
        };
        submitted.push((id, handle));
    }
    submitted
}

fn shuffled_indices() -> impl Strategy<Value = Vec<usize>> {
    (1usize..8).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn each_submitter_gets_its_own_answer(order in shuffled_indices()) {
        let rt = runtime();
        rt.block_on(async {
            let engine = Arc::new(RendezvousEngine::default());
            let submitted = submit_all(&engine, order.len()).await;

            for &i in &order {
                let outcome = engine.resolve(submitted[i].0, format!("answer-{}", i));
                assert_eq!(outcome, Ok(ResolveOutcome::Delivered));
            }

            for (i, (_, handle)) in submitted.into_iter().enumerate() {
                assert_eq!(handle.await.unwrap(), Ok(format!("answer-{}", i)));
            }

            assert!(!engine.status().has_pending_request);
            assert_eq!(engine.status().waiting_submitters, 0);
        });
    }

    #[test]
    fn resolved_ids_are_never_accepted_twice(order in shuffled_indices()) {
        let rt = runtime();
        rt.block_on(async {
            let engine = Arc::new(RendezvousEngine::default());
            let submitted = submit_all(&engine, order.len()).await;

            for &i in &order {
                let id = submitted[i].0;
                assert!(engine.resolve(id, "first".into()).is_ok());
                assert!(matches!(
                    engine.resolve(id, "again".into()),
                    Err(BrokerError::UnknownRequestId { request_id, .. }) if request_id == id
                ));
            }

            let stats = engine.stats();
            assert_eq!(stats.resolved, order.len() as u64);
            assert_eq!(stats.unknown, order.len() as u64);
        });
    }
}
