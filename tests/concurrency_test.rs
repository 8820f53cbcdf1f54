mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use argentum::application::AppError;
use common::{PASSWORD, open, open_funded, test_service};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deposits_are_not_lost() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let id = open(&service, "Alice").await?.id;

    let mut handles = Vec::new();
    for _ in 0..100 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move { service.deposit(id, 1).await }));
    }
    for handle in handles {
        handle.await??;
    }

    assert_eq!(service.check_balance(id).await?, 100);
    assert_eq!(service.history(id).await?.len(), 100);
    assert!(service.reconcile().await?.is_consistent());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposing_transfers_conserve_money() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let alice = open_funded(&service, "Alice", 100).await?;
    let bob = open_funded(&service, "Bob", 100).await?;

    let mut handles = Vec::new();
    for i in 0..30 {
        let service = Arc::clone(&service);
        let (from, to) = if i % 2 == 0 { (alice, bob) } else { (bob, alice) };
        handles.push(tokio::spawn(async move {
            service.transfer(from, to, 1).await.map(|_| ())
        }));
    }
    for i in 0..30 {
        let service = Arc::clone(&service);
        let (from, to) = if i % 2 == 0 { (bob, alice) } else { (alice, bob) };
        handles.push(tokio::spawn(async move {
            service.transfer(from, to, 1).await.map(|_| ())
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let a = service.check_balance(alice).await?;
    let b = service.check_balance(bob).await?;
    assert_eq!(a + b, 200);
    // Equal traffic in both directions
    assert_eq!(a, 100);
    assert_eq!(b, 100);

    let report = service.reconcile().await?;
    assert!(report.is_consistent(), "issues: {:?}", report.issues());
    assert_eq!(report.entries_checked, 2 + 60 * 2);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_half_a_transfer() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let alice = open_funded(&service, "Alice", 100).await?;
    let bob = open_funded(&service, "Bob", 100).await?;
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let service = Arc::clone(&service);
        let done = Arc::clone(&done);
        tokio::spawn(async move {
            let mut reads = 0usize;
            // At least one read even if every transfer finishes first
            loop {
                let finished = done.load(Ordering::SeqCst);

                let report = service.reconcile().await?;
                anyhow::ensure!(
                    report.is_consistent(),
                    "inconsistent mid-flight: {:?}",
                    report.issues()
                );

                let (accounts, entries) = service.repository().ledger_snapshot().await?;
                let total: i64 = accounts.iter().map(|a| a.balance).sum();
                anyhow::ensure!(total == 200, "balance sum {} while transfers run", total);
                let legs = entries.iter().filter(|e| e.is_transfer()).count();
                anyhow::ensure!(legs % 2 == 0, "odd number of transfer legs: {}", legs);

                reads += 1;
                if finished {
                    return Ok::<usize, anyhow::Error>(reads);
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let mut handles = Vec::new();
    for i in 0..200 {
        let service = Arc::clone(&service);
        let (from, to) = if i % 2 == 0 { (alice, bob) } else { (bob, alice) };
        handles.push(tokio::spawn(async move {
            service.transfer(from, to, 30).await.map(|_| ())
        }));
    }
    for handle in handles {
        handle.await??;
    }
    done.store(true, Ordering::SeqCst);

    let reads = reader.await??;
    assert!(reads >= 1);
    assert_eq!(service.check_balance(alice).await?, 100);
    assert_eq!(service.check_balance(bob).await?, 100);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_withdrawals_never_overdraw() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let id = open_funded(&service, "Alice", 50).await?;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move { service.withdraw(id, 10).await }));
    }

    let mut succeeded = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => succeeded += 1,
            Err(AppError::InsufficientFunds { .. }) => refused += 1,
            Err(e) => return Err(e.into()),
        }
    }

    assert_eq!(succeeded, 5);
    assert_eq!(refused, 15);
    assert_eq!(service.check_balance(id).await?, 0);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_account_creation_assigns_unique_ids() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);

    let mut handles = Vec::new();
    for i in 0..20 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let email = format!("user{}@example.com", i);
            service.open_account("User", "Tester", &email, PASSWORD).await
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let account = handle.await??;
        assert!(ids.insert(account.id), "duplicate id {}", account.id);
    }

    assert_eq!(ids.len(), 20);
    assert_eq!(service.list_accounts().await?.len(), 20);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_terminate_races_with_deposits() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let id = open(&service, "Alice").await?.id;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move { service.deposit(id, 1).await }));
    }
    let terminator = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.terminate_account(id).await })
    };

    let mut committed = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => committed += 1,
            Err(AppError::TerminatedAccount(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    terminator.await??;

    // Every deposit that reported success is in the balance, and nothing else
    let account = service.get_account(id).await?;
    assert!(account.terminated);
    assert_eq!(account.balance, committed);
    assert_eq!(service.history(id).await?.len() as i64, committed);

    Ok(())
}
