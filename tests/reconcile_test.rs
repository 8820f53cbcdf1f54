mod common;

use anyhow::Result;
use argentum::domain::replay_balance;
use common::{open, open_funded, test_service};
use sqlx::sqlite::SqlitePoolOptions;

#[tokio::test]
async fn test_empty_ledger_is_consistent() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let report = service.reconcile().await?;
    assert!(report.is_consistent());
    assert_eq!(report.accounts_checked, 0);
    assert_eq!(report.entries_checked, 0);

    Ok(())
}

#[tokio::test]
async fn test_replay_matches_stored_balances() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let alice = open_funded(&service, "Alice", 50).await?;
    let bob = open_funded(&service, "Bob", 10).await?;
    let carol = open(&service, "Carol").await?.id;

    service.transfer(alice, bob, 70).await?;
    service.withdraw(bob, 30).await?;
    service.transfer(bob, carol, 15).await?;
    service.deposit(alice, 5).await?;
    // Refused operations leave no trace on the ledger
    assert!(service.withdraw(carol, 100).await.is_err());
    service.terminate_account(carol).await?;

    let report = service.reconcile().await?;
    assert!(report.is_consistent(), "issues: {:?}", report.issues());
    assert_eq!(report.accounts_checked, 3);
    assert_eq!(report.entries_checked, 2 + 2 + 1 + 2 + 1);

    let entries = service.repository().list_entries().await?;
    for account in service.list_accounts().await? {
        assert_eq!(replay_balance(account.id, &entries), account.balance);
    }
    assert_eq!(service.check_balance(alice).await?, -15);
    assert_eq!(service.check_balance(bob).await?, 35);
    assert_eq!(service.check_balance(carol).await?, 15);

    Ok(())
}

#[tokio::test]
async fn test_tampered_balance_is_reported() -> Result<()> {
    let (service, temp) = test_service().await?;
    let alice = open_funded(&service, "Alice", 50).await?;

    // Edit the balance behind the service's back
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite://{}", temp.path().join("test.db").display()))
        .await?;
    sqlx::query("UPDATE accounts SET balance = 999 WHERE id = ?")
        .bind(alice.get())
        .execute(&pool)
        .await?;
    pool.close().await;

    let report = service.reconcile().await?;
    assert!(!report.is_consistent());
    assert_eq!(report.mismatches.len(), 1);
    assert_eq!(report.mismatches[0].account_id, alice);
    assert_eq!(report.mismatches[0].stored, 999);
    assert_eq!(report.mismatches[0].replayed, 50);
    assert_eq!(report.issues().len(), 1);

    Ok(())
}
