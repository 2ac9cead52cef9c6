//! Concurrent imports into the same ledger
//!
//! The per-account lock must serialize duplicate detection and commit, so
//! racing imports of one statement land it exactly once.
//!
//! Run with: cargo test --test concurrent_import_test -- --nocapture

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

use balanceline_core::services::{ImportRequest, NewAccount};

use common::{cents, march_statement, TestLedger, BANK, PASSWORD};

const THREAD_COUNT: usize = 4;

#[test]
fn test_racing_imports_of_one_statement_land_once() {
    let ledger = TestLedger::new();
    let archive = Arc::new(march_statement().archive(PASSWORD));
    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let committed = Arc::new(AtomicUsize::new(0));
    let duplicated = Arc::new(AtomicUsize::new(0));
    let account_id = ledger.account.id;

    let mut handles = vec![];
    for thread_id in 0..THREAD_COUNT {
        let service = ledger.ctx.import_service.clone();
        let archive = Arc::clone(&archive);
        let barrier = Arc::clone(&barrier);
        let committed = Arc::clone(&committed);
        let duplicated = Arc::clone(&duplicated);

        handles.push(thread::spawn(move || {
            barrier.wait();
            let start = Instant::now();
            let result = service
                .import(ImportRequest::new(archive.to_vec(), account_id, BANK).with_password(PASSWORD))
                .unwrap();
            println!(
                "Thread {}: {} new, {} duplicate in {:?}",
                thread_id,
                result.committed_count,
                result.duplicate_count,
                start.elapsed()
            );
            committed.fetch_add(result.committed_count, Ordering::SeqCst);
            duplicated.fetch_add(result.duplicate_count, Ordering::SeqCst);
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(committed.load(Ordering::SeqCst), 10);
    assert_eq!(duplicated.load(Ordering::SeqCst), 10 * (THREAD_COUNT - 1));
    assert_eq!(ledger.transaction_count(), 10);
    assert_eq!(ledger.balance(), Some(cents(378400)));
    assert_eq!(
        ledger.ctx.batch_service.list(Some(account_id)).unwrap().len(),
        THREAD_COUNT
    );
}

#[test]
fn test_imports_into_different_accounts_do_not_interfere() {
    let ledger = TestLedger::new();
    let second = ledger
        .ctx
        .account_service
        .create(NewAccount {
            name: "Joint".to_string(),
            account_number: Some("5555-4321".to_string()),
            ..Default::default()
        })
        .unwrap();
    let archive = Arc::new(march_statement().archive(PASSWORD));
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [ledger.account.id, second.id]
        .into_iter()
        .map(|account_id| {
            let service = ledger.ctx.import_service.clone();
            let archive = Arc::clone(&archive);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service
                    .import(
                        ImportRequest::new(archive.to_vec(), account_id, BANK)
                            .with_password(PASSWORD),
                    )
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        let result = handle.join().unwrap();
        assert_eq!(result.committed_count, 10);
        assert_eq!(result.new_account_balance, cents(378400));
    }
    assert_eq!(
        ledger.ctx.account_service.get(second.id).unwrap().balance,
        Some(cents(378400))
    );
}

#[test]
fn test_account_lock_is_free_after_import() {
    let ledger = TestLedger::new();
    ledger
        .ctx
        .import_service
        .import(
            ImportRequest::new(march_statement().archive(PASSWORD), ledger.account.id, BANK)
                .with_password(PASSWORD),
        )
        .unwrap();

    let locks = balanceline_core::services::AccountLocks::new(ledger.dir.path());
    let guard = locks.try_acquire(ledger.account.id).unwrap();
    assert!(guard.is_some());
}
