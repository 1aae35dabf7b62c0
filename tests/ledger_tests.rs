mod common;

use common::{FaultyAccountStore, FaultyTransactionLog, SlowTransactionLog, TestLedger};
use ledger_engine::error::AppError;
use ledger_engine::models::{AccountType, TransactionStatus, TransactionType};
use ledger_engine::repositories::{AccountStore, InMemoryTransactionLog, TransactionLog};
use ledger_engine::services::{LedgerEngine, LedgerRequest, QueryService};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_withdrawal_records_completed_transaction() {
    let ledger = TestLedger::new();
    let account = ledger.open("owner-a", dec!(5000.00)).await;

    let receipt = ledger
        .engine
        .withdraw(account.id, dec!(100.00), None)
        .await
        .expect("Withdrawal failed");

    assert_eq!(ledger.balance(account.id).await, dec!(4900.00));
    assert_eq!(receipt.from_balance, Some(dec!(4900.00)));

    let history = ledger.log.list_by_account(account.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].transaction_type, TransactionType::Withdrawal);
    assert_eq!(history[0].status, TransactionStatus::Completed);
    assert_eq!(history[0].amount, dec!(100.00));
    assert_eq!(history[0].from_account_id, Some(account.id));
    assert_eq!(history[0].to_account_id, None);
}

#[tokio::test]
async fn test_insufficient_funds_transfer_logs_failure() {
    let ledger = TestLedger::new();
    let a = ledger.open("owner-a", dec!(200.00)).await;
    let b = ledger.open("owner-b", dec!(0.00)).await;

    let err = ledger
        .engine
        .transfer(a.id, b.id, dec!(300.00), Some("x".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientFunds(_)));

    assert_eq!(ledger.balance(a.id).await, dec!(200.00));
    assert_eq!(ledger.balance(b.id).await, dec!(0.00));

    let history = ledger.log.list_recent(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].transaction_type, TransactionType::Transfer);
    assert_eq!(history[0].status, TransactionStatus::Failed);
    assert_eq!(history[0].amount, dec!(300.00));
}

#[tokio::test]
async fn test_transfer_moves_funds() {
    let ledger = TestLedger::new();
    let a = ledger.open("owner-a", dec!(500.00)).await;
    let b = ledger.open("owner-b", dec!(100.00)).await;

    let receipt = ledger
        .engine
        .transfer(a.id, b.id, dec!(150.00), Some("rent".to_string()))
        .await
        .expect("Transfer failed");

    assert_eq!(ledger.balance(a.id).await, dec!(350.00));
    assert_eq!(ledger.balance(b.id).await, dec!(250.00));
    assert_eq!(receipt.from_balance, Some(dec!(350.00)));
    assert_eq!(receipt.to_balance, Some(dec!(250.00)));

    let tx = receipt.transaction;
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(tx.from_account_id, Some(a.id));
    assert_eq!(tx.to_account_id, Some(b.id));
    assert_eq!(tx.amount, dec!(150.00));
    assert_eq!(tx.description, "rent");
    assert_eq!(ledger.log.len().await, 1);
}

#[tokio::test]
async fn test_same_account_transfer_is_rejected_without_record() {
    let ledger = TestLedger::new();
    let a = ledger.open("owner-a", dec!(100.00)).await;

    let err = ledger
        .engine
        .transfer(a.id, a.id, dec!(10.00), Some(String::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::SameAccountTransfer(_)));
    assert_eq!(ledger.balance(a.id).await, dec!(100.00));
    assert!(ledger.log.is_empty().await);
}

#[tokio::test]
async fn test_non_positive_amounts_are_rejected_without_record() {
    let ledger = TestLedger::new();
    let a = ledger.open("owner-a", dec!(100.00)).await;
    let b = ledger.open("owner-b", dec!(100.00)).await;

    let err = ledger.engine.deposit(a.id, dec!(-5.00), None).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidAmount(_)));

    let err = ledger.engine.withdraw(a.id, Decimal::ZERO, None).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidAmount(_)));

    let err = ledger.engine.transfer(a.id, b.id, dec!(-1), None).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidAmount(_)));

    assert_eq!(ledger.balance(a.id).await, dec!(100.00));
    assert!(ledger.log.is_empty().await);
}

#[tokio::test]
async fn test_unknown_account_is_rejected_without_record() {
    let ledger = TestLedger::new();
    let a = ledger.open("owner-a", dec!(100.00)).await;

    let err = ledger.engine.deposit(Uuid::new_v4(), dec!(1), None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = ledger
        .engine
        .transfer(a.id, Uuid::new_v4(), dec!(1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    assert_eq!(ledger.balance(a.id).await, dec!(100.00));
    assert!(ledger.log.is_empty().await);
}

#[tokio::test]
async fn test_default_descriptions() {
    let ledger = TestLedger::new();
    let a = ledger.open("owner-a", dec!(100.00)).await;
    let b = ledger.open("owner-b", dec!(0)).await;

    let deposit = ledger.engine.deposit(a.id, dec!(1), None).await.unwrap();
    let withdrawal = ledger.engine.withdraw(a.id, dec!(1), Some("  ".to_string())).await.unwrap();
    let transfer = ledger.engine.transfer(a.id, b.id, dec!(1), None).await.unwrap();

    assert_eq!(deposit.transaction.description, "Cash deposit");
    assert_eq!(withdrawal.transaction.description, "Cash withdrawal");
    assert_eq!(transfer.transaction.description, "Fund transfer");
}

#[tokio::test]
async fn test_failed_credit_rolls_back_debit() {
    let store = Arc::new(FaultyAccountStore::new());
    let log = Arc::new(InMemoryTransactionLog::new());
    let engine = LedgerEngine::new(store.clone(), log.clone());

    let a = store.create("owner-a", AccountType::Checking, dec!(500)).await.unwrap();
    let b = store.create("owner-b", AccountType::Savings, dec!(0)).await.unwrap();
    store.fail_credits_to(b.id);

    let err = engine.transfer(a.id, b.id, dec!(100), None).await.unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));

    assert_eq!(store.get(a.id).await.unwrap().balance, dec!(500));
    assert_eq!(store.get(b.id).await.unwrap().balance, dec!(0));

    let history = log.list_recent(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TransactionStatus::Failed);

    let query = QueryService::new(store.clone(), log.clone());
    assert!(query.reconcile(a.id).await.unwrap().balanced);
    assert!(query.reconcile(b.id).await.unwrap().balanced);
}

#[tokio::test]
async fn test_unrecordable_completion_reverts_balances() {
    let store = Arc::new(ledger_engine::repositories::InMemoryAccountStore::new());
    let log = Arc::new(FaultyTransactionLog::new());
    let engine = LedgerEngine::new(store.clone(), log.clone());

    let a = store.create("owner-a", AccountType::Checking, dec!(500)).await.unwrap();
    let b = store.create("owner-b", AccountType::Savings, dec!(20)).await.unwrap();
    log.fail_completions(true);

    let err = engine.transfer(a.id, b.id, dec!(100), None).await.unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));
    let err = engine.deposit(b.id, dec!(5), None).await.unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));

    assert_eq!(store.get(a.id).await.unwrap().balance, dec!(500));
    assert_eq!(store.get(b.id).await.unwrap().balance, dec!(20));

    let history = log.list_recent(10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|tx| tx.status == TransactionStatus::Failed));

    let query = QueryService::new(store.clone(), log.clone());
    assert!(query.reconcile(a.id).await.unwrap().balanced);
    assert!(query.reconcile(b.id).await.unwrap().balanced);
}

#[tokio::test]
async fn test_unrecordable_failure_frees_idempotency_key() {
    let store = Arc::new(ledger_engine::repositories::InMemoryAccountStore::new());
    let log = Arc::new(FaultyTransactionLog::new());
    let engine = LedgerEngine::new(store.clone(), log.clone());
    let account = store.create("owner-a", AccountType::Checking, dec!(100)).await.unwrap();

    log.fail_completions(true);
    log.fail_failures(true);
    let request = LedgerRequest::deposit(account.id, dec!(25)).with_idempotency_key("deposit-7");
    engine.execute(request.clone()).await.unwrap_err();

    assert_eq!(store.get(account.id).await.unwrap().balance, dec!(100));
    let stuck = log.list_recent(10).await.unwrap();
    assert_eq!(stuck[0].status, TransactionStatus::Pending);

    // No failed outcome was stored, so the retry runs for real.
    log.fail_completions(false);
    log.fail_failures(false);
    let receipt = engine.execute(request).await.unwrap();
    assert_eq!(receipt.transaction.status, TransactionStatus::Completed);
    assert_eq!(store.get(account.id).await.unwrap().balance, dec!(125));
}

#[tokio::test]
async fn test_history_is_stable_without_mutations() {
    let ledger = TestLedger::new();
    let a = ledger.open("owner-a", dec!(300)).await;
    let b = ledger.open("owner-b", dec!(0)).await;
    ledger.engine.transfer(a.id, b.id, dec!(50), None).await.unwrap();
    ledger.engine.withdraw(a.id, dec!(1000), None).await.unwrap_err();
    ledger.engine.deposit(a.id, dec!(7.25), None).await.unwrap();

    let first = ledger.queries.history(a.id).await.unwrap();
    let second = ledger.queries.history(a.id).await.unwrap();

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_operation_completes_after_caller_is_dropped() {
    let store = Arc::new(ledger_engine::repositories::InMemoryAccountStore::new());
    let log = Arc::new(SlowTransactionLog {
        inner: InMemoryTransactionLog::new(),
        delay: Duration::from_millis(200),
    });
    let engine = LedgerEngine::new(store.clone(), log.clone());
    let account = store.create("owner-a", AccountType::Checking, dec!(10)).await.unwrap();

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), engine.deposit(account.id, dec!(5), None)).await;
    assert!(abandoned.is_err(), "deposit should still be in flight");

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(store.get(account.id).await.unwrap().balance, dec!(15));
    let history = log.inner.list_by_account(account.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TransactionStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() {
    let ledger = TestLedger::new();
    let account = ledger.open("owner-a", dec!(100)).await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let engine = ledger.engine.clone();
        handles.push(tokio::spawn(async move {
            engine.withdraw(account.id, dec!(15), None).await
        }));
    }

    let mut succeeded = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AppError::InsufficientFunds(_)) => insufficient += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(succeeded, 6);
    assert_eq!(insufficient, 14);
    assert_eq!(ledger.balance(account.id).await, dec!(10));

    let history = ledger.log.list_by_account(account.id).await.unwrap();
    let completed = history
        .iter()
        .filter(|tx| tx.status == TransactionStatus::Completed)
        .count();
    let failed = history
        .iter()
        .filter(|tx| tx.status == TransactionStatus::Failed)
        .count();
    assert_eq!((completed, failed), (6, 14));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposing_transfers_conserve_total() {
    let ledger = TestLedger::new();
    let a = ledger.open("owner-a", dec!(1000)).await;
    let b = ledger.open("owner-b", dec!(1000)).await;
    let c = ledger.open("owner-c", dec!(1000)).await;
    let ids = [a.id, b.id, c.id];

    let mut handles = Vec::new();
    for i in 0..60 {
        let engine = ledger.engine.clone();
        let from = ids[i % 3];
        let to = ids[(i + 1 + i / 3) % 3];
        let amount = Decimal::new(((i % 7) as i64 + 1) * 2_550, 2);
        handles.push(tokio::spawn(async move {
            engine.transfer(from, to, amount, None).await
        }));
    }
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) | Err(AppError::InsufficientFunds(_)) | Err(AppError::SameAccountTransfer(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    let mut total = Decimal::ZERO;
    for id in ids {
        let balance = ledger.balance(id).await;
        assert!(balance >= Decimal::ZERO);
        total += balance;
        assert!(ledger.queries.reconcile(id).await.unwrap().balanced);
    }
    assert_eq!(total, dec!(3000));

    let pending = ledger
        .log
        .list_recent(1_000)
        .await
        .unwrap()
        .into_iter()
        .filter(|tx| tx.status == TransactionStatus::Pending)
        .count();
    assert_eq!(pending, 0);
}
