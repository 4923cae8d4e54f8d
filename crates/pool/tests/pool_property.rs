//! Property tests for pool acquire/release invariants.
//!
//! After any sequence of acquires, releases and bogus releases,
//! `available + in_use <= capacity` and the counts match what the caller
//! actually holds.

mod common;

use std::time::Duration;

use common::{Ticket, ticket_pool};
use keyward_pool::{PoolConfig, ReuseOrder};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Acquire,
    Release,
    BogusRelease,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Acquire),
        2 => Just(Op::Release),
        1 => Just(Op::BogusRelease),
    ]
}

// ---------------------------------------------------------------------------
// Property: counts stay within capacity and match the held set
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn counts_never_exceed_capacity(
        capacity in 1usize..6,
        ops in proptest::collection::vec(op(), 1..40),
        reuse in prop_oneof![Just(ReuseOrder::Fifo), Just(ReuseOrder::Lifo)],
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let (pool, created) = ticket_pool(PoolConfig { max_size: capacity, reuse });
            let mut held: Vec<Ticket> = Vec::new();

            for op in &ops {
                match op {
                    Op::Acquire => {
                        if let Some(ticket) = pool.acquire_timeout(Duration::ZERO).await.unwrap() {
                            held.push(ticket);
                        } else {
                            prop_assert_eq!(held.len(), capacity);
                        }
                    }
                    Op::Release => {
                        if let Some(ticket) = held.pop() {
                            prop_assert!(pool.release(ticket).is_ok());
                        }
                    }
                    Op::BogusRelease => {
                        prop_assert!(pool.release(Ticket(u64::MAX)).is_err());
                    }
                }

                let snapshot = pool.snapshot();
                prop_assert!(snapshot.total() <= capacity);
                prop_assert_eq!(snapshot.in_use, held.len());
                prop_assert!(
                    created.load(std::sync::atomic::Ordering::SeqCst) <= capacity as u64
                );
            }
            Ok(())
        })?;
    }
}
