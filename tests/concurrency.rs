//! Concurrent transfer tests
//!
//! Transfers run as independent tasks on a multi-threaded runtime, started
//! together behind a barrier so they race on the same accounts.

use rand::Rng;
use std::sync::Arc;
use tokio::sync::Barrier;

use wallet_eng::{Amount, Engine, MemoryStore, StoreError, TransferError, UserId};

type SharedEngine = Arc<Engine<MemoryStore>>;

async fn engine_with(balances: &[f64]) -> (SharedEngine, Vec<UserId>) {
    let engine = Engine::new(MemoryStore::new());
    let mut users = Vec::new();
    for &b in balances {
        let user = UserId::new();
        engine
            .open_account_with_balance(user, Amount::from_float(b))
            .await
            .unwrap();
        users.push(user);
    }
    (Arc::new(engine), users)
}

/// Spawn one task per `(from, to, amount)`, released all at once.
async fn race(
    engine: &SharedEngine,
    transfers: Vec<(UserId, UserId, f64)>,
) -> Vec<Result<(), TransferError>> {
    let barrier = Arc::new(Barrier::new(transfers.len()));
    let handles: Vec<_> = transfers
        .into_iter()
        .map(|(from, to, amount)| {
            let engine = Arc::clone(engine);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                engine.transfer(from, &to.to_string(), amount).await
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

fn is_expected_loss(result: &Result<(), TransferError>) -> bool {
    matches!(
        result,
        Err(TransferError::InsufficientBalance(..))
            | Err(TransferError::Failed(StoreError::Conflict(_)))
    )
}

async fn assert_no_negative_balance(engine: &SharedEngine) {
    for account in engine.store().snapshot().await {
        assert!(
            !account.balance.is_negative(),
            "account {} went negative: {}",
            account.owner,
            account.balance
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_racing_overdrafts_only_one_wins() {
    for _ in 0..50 {
        let (engine, users) = engine_with(&[100.0, 0.0]).await;
        let (a, b) = (users[0], users[1]);

        let results = race(&engine, vec![(a, b, 60.0), (a, b, 60.0)]).await;

        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1, "results: {results:?}");
        assert!(results.iter().filter(|r| r.is_err()).all(is_expected_loss));
        assert_eq!(engine.balance(a).await.unwrap(), Amount::from_float(40.0));
        assert_eq!(engine.balance(b).await.unwrap(), Amount::from_float(60.0));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_withdrawals_never_overdraw() {
    const ATTEMPTS: usize = 40;
    let (engine, users) = engine_with(&[100.0, 0.0, 0.0, 0.0]).await;
    let source = users[0];

    let transfers = (0..ATTEMPTS)
        .map(|i| (source, users[1 + i % 3], 7.0))
        .collect();
    let results = race(&engine, transfers).await;

    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert!(wins <= 14, "{wins} withdrawals of 7 succeeded from 100");
    assert!(results.iter().filter(|r| r.is_err()).all(is_expected_loss));

    let remaining = engine.balance(source).await.unwrap();
    assert_eq!(
        remaining,
        Amount::from_float(100.0 - 7.0 * wins as f64)
    );
    assert_eq!(
        engine.store().total_balance().await.unwrap(),
        Amount::from_float(100.0)
    );
    assert_no_negative_balance(&engine).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposite_directions_do_not_deadlock() {
    let (engine, users) = engine_with(&[500.0, 500.0]).await;
    let (a, b) = (users[0], users[1]);

    let transfers = (0..64)
        .map(|i| if i % 2 == 0 { (a, b, 10.0) } else { (b, a, 10.0) })
        .collect();
    let results = race(&engine, transfers).await;

    assert!(results.iter().filter(|r| r.is_err()).all(is_expected_loss));
    assert_eq!(
        engine.store().total_balance().await.unwrap(),
        Amount::from_float(1000.0)
    );
    assert_no_negative_balance(&engine).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn random_transfers_conserve_total() {
    let balances = [120.0, 80.0, 40.0, 10.0, 0.0, 250.0];
    let (engine, users) = engine_with(&balances).await;
    let expected_total: f64 = balances.iter().sum();

    let transfers = {
        let mut rng = rand::thread_rng();
        (0..200)
            .map(|_| {
                let from = rng.gen_range(0..users.len());
                let to = (from + rng.gen_range(1..users.len())) % users.len();
                let amount = rng.gen_range(1..60) as f64;
                (users[from], users[to], amount)
            })
            .collect()
    };
    let results = race(&engine, transfers).await;

    assert!(results.iter().filter(|r| r.is_err()).all(is_expected_loss));
    assert_eq!(
        engine.store().total_balance().await.unwrap(),
        Amount::from_float(expected_total)
    );
    assert_no_negative_balance(&engine).await;
}
