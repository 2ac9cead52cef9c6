//! Imports driven from an async runtime

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use balanceline_core::domain::ImportState;
use balanceline_core::ports::ProgressObserver;
use balanceline_core::services::ImportRequest;

use common::{cents, march_statement, TestLedger, BANK, PASSWORD};

#[derive(Default)]
struct CountingObserver {
    transitions: AtomicUsize,
    committed: AtomicUsize,
}

impl ProgressObserver for CountingObserver {
    fn on_transition(&self, _from: ImportState, to: ImportState) {
        self.transitions.fetch_add(1, Ordering::SeqCst);
        if to == ImportState::Committed {
            self.committed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn test_import_async_commits() {
    let ledger = TestLedger::new();
    let observer = Arc::new(CountingObserver::default());

    let result = ledger
        .ctx
        .import_service
        .import_async(
            ImportRequest::new(march_statement().archive(PASSWORD), ledger.account.id, BANK)
                .with_password(PASSWORD),
            observer.clone(),
        )
        .await
        .unwrap();

    assert_eq!(result.committed_count, 10);
    assert_eq!(observer.transitions.load(Ordering::SeqCst), 7);
    assert_eq!(observer.committed.load(Ordering::SeqCst), 1);
    assert_eq!(ledger.balance(), Some(cents(378400)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parallel_async_imports_land_once() {
    let ledger = TestLedger::new();
    let archive = march_statement().archive(PASSWORD);

    let requests = (0..3).map(|_| {
        let service = ledger.ctx.import_service.clone();
        let request = ImportRequest::new(archive.clone(), ledger.account.id, BANK)
            .with_password(PASSWORD);
        async move {
            service
                .import_async(request, Arc::new(CountingObserver::default()))
                .await
        }
    });
    let handles: Vec<_> = requests.map(tokio::spawn).collect();

    let mut committed = 0;
    for handle in handles {
        committed += handle.await.unwrap().unwrap().committed_count;
    }
    assert_eq!(committed, 10);
    assert_eq!(ledger.transaction_count(), 10);
}

#[tokio::test]
async fn test_import_async_reports_wrong_password() {
    let ledger = TestLedger::new();

    let err = ledger
        .ctx
        .import_service
        .import_async(
            ImportRequest::new(march_statement().archive(PASSWORD), ledger.account.id, BANK)
                .with_password("wrong"),
            Arc::new(CountingObserver::default()),
        )
        .await
        .unwrap_err();

    assert!(err.is_wrong_password());
    assert_eq!(ledger.transaction_count(), 0);
}
