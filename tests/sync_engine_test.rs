mod common;

use common::{d, fast_settings, id, ScriptedVendor, MIN_INTERVAL};
use market_sync::calendar::TradingCalendar;
use market_sync::data_provider::{ObservationSource, RateLimitedFetcher};
use market_sync::domain_types::{FetchWindow, InstrumentId, ObservationField, SyncStream};
use market_sync::storage::{MemoryObservationStore, ObservationStore};
use market_sync::sync::{BatchOrchestrator, OutcomeStatus};
use rust_decimal_macros::dec;
use std::sync::Arc;

type Fetcher = RateLimitedFetcher<ScriptedVendor>;

/// 2023-12-28 到 2024-03-01 剛好 40 個交易日
fn earliest() -> chrono::NaiveDate {
    d(2023, 12, 28)
}

fn setup() -> (Arc<Fetcher>, Arc<MemoryObservationStore>) {
    let fetcher = Arc::new(RateLimitedFetcher::new(
        ScriptedVendor::default(),
        fast_settings(),
    ));
    let store = Arc::new(MemoryObservationStore::default());
    (fetcher, store)
}

fn orchestrator(
    fetcher: &Arc<Fetcher>,
    store: &Arc<MemoryObservationStore>,
    stream: SyncStream,
) -> BatchOrchestrator {
    BatchOrchestrator::new(
        Arc::new(TradingCalendar::cn_exchange()),
        fetcher.clone(),
        store.clone(),
        stream,
        earliest(),
    )
}

fn trading_days(start: chrono::NaiveDate, end: chrono::NaiveDate) -> Vec<chrono::NaiveDate> {
    TradingCalendar::cn_exchange().trading_days_between(start, end)
}

#[tokio::test(start_paused = true)]
async fn test_moutai_full_history_then_no_work() {
    let (fetcher, store) = setup();
    let orchestrator = orchestrator(&fetcher, &store, SyncStream::Price);
    let moutai = id("sh600519");

    let first = orchestrator.run(&[moutai.clone()], d(2024, 3, 1)).await.unwrap();
    let outcome = first.outcome("sh600519").unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Stored);
    assert_eq!(
        outcome.window,
        Some(FetchWindow::new(earliest(), d(2024, 3, 1)).unwrap())
    );
    assert_eq!(outcome.records_fetched, 40);
    assert_eq!(outcome.rows_affected, 40);
    assert_eq!(store.row_count_for(&moutai), 40);

    let second = orchestrator.run(&[moutai.clone()], d(2024, 3, 1)).await.unwrap();
    assert_eq!(second.outcome("sh600519").unwrap().status, OutcomeStatus::NoWork);
    assert_eq!(second.rows_affected, 0);
    assert_eq!(fetcher.client().calls_for(&moutai).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_weekend_as_of_adjusts_back_to_friday() {
    let (fetcher, store) = setup();
    let orchestrator = orchestrator(&fetcher, &store, SyncStream::Price);

    // 2024-03-02 為週六
    let run = orchestrator.run(&[id("sh600519")], d(2024, 3, 2)).await.unwrap();
    let window = run.outcome("sh600519").unwrap().window.unwrap();
    assert_eq!(window.end(), d(2024, 3, 1));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_runs_are_idempotent() {
    let (fetcher, store) = setup();
    let orchestrator = orchestrator(&fetcher, &store, SyncStream::Price);
    let universe = [id("sh600519"), id("sz000001"), id("sz300750"), id("sh688981")];

    let first = orchestrator.run(&universe, d(2024, 3, 1)).await.unwrap();
    assert_eq!(first.counts.stored, 4);

    let second = orchestrator.run(&universe, d(2024, 3, 1)).await.unwrap();
    assert_eq!(second.counts.no_work, 4);
    assert_eq!(second.rows_affected, 0);
    assert_eq!(store.row_count(), 4 * 40);
}

#[tokio::test(start_paused = true)]
async fn test_incremental_window_starts_after_last_persisted() {
    let (fetcher, store) = setup();
    let orchestrator = orchestrator(&fetcher, &store, SyncStream::Price);
    let moutai = id("sh600519");

    orchestrator.run(&[moutai.clone()], d(2024, 2, 8)).await.unwrap();
    let last = store
        .last_persisted_date(&moutai, SyncStream::Price)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last, d(2024, 2, 8));

    // 2024-02-25 為週日；春節休市到 2/16
    let run = orchestrator.run(&[moutai.clone()], d(2024, 2, 25)).await.unwrap();
    let outcome = run.outcome("sh600519").unwrap();
    let window = outcome.window.unwrap();
    assert!(window.start() > last);
    assert_eq!(window.start(), d(2024, 2, 19));
    assert_eq!(window.end(), d(2024, 2, 23));
    assert_eq!(outcome.last_persisted, Some(last));
    assert_eq!(outcome.rows_affected, 5);
}

#[tokio::test(start_paused = true)]
async fn test_vendor_calls_respect_min_interval() {
    let (fetcher, store) = setup();
    let orchestrator = orchestrator(&fetcher, &store, SyncStream::Price);

    orchestrator
        .run(&[id("sh600519"), id("sz000001"), id("sz000002")], d(2024, 3, 1))
        .await
        .unwrap();

    let calls = fetcher.client().calls();
    assert_eq!(calls.len(), 3);
    for pair in calls.windows(2) {
        let gap = pair[1].2.duration_since(pair[0].2);
        assert!(gap >= MIN_INTERVAL, "呼叫間隔 {:?} 小於最小間隔", gap);
    }
}

#[tokio::test(start_paused = true)]
async fn test_absent_fields_do_not_erase_stored_values() {
    let (fetcher, store) = setup();
    let orchestrator = orchestrator(&fetcher, &store, SyncStream::Price);
    let moutai = id("sh600519");
    orchestrator.run(&[moutai.clone()], d(2024, 3, 1)).await.unwrap();

    let day = d(2024, 2, 20);
    let before = store.get(&moutai, day).unwrap();
    assert_eq!(before.get(ObservationField::PeTtm), Some(dec!(28.41)));

    // 之後的抓取沒有估值因子，收盤價被修正
    fetcher.client().drop_factors(&moutai);
    fetcher.client().override_close(&moutai, "200.00");
    fetcher.open().await.unwrap();
    let records = fetcher
        .fetch(&moutai, FetchWindow::new(day, day).unwrap())
        .await
        .unwrap();
    fetcher.close().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get(ObservationField::PeTtm), None);

    let written = store.upsert(&records).await.unwrap();
    assert_eq!(written.affected_rows, 1);

    let after = store.get(&moutai, day).unwrap();
    assert_eq!(after.get(ObservationField::Close), Some(dec!(200.00)));
    assert_eq!(after.get(ObservationField::PeTtm), Some(dec!(28.41)));
    assert_eq!(after.get(ObservationField::Pb), Some(dec!(9.87)));
}

#[tokio::test(start_paused = true)]
async fn test_factor_stream_fills_in_later() {
    let (fetcher, store) = setup();
    let moutai = id("sh600519");
    fetcher.client().drop_factors(&moutai);

    let price = orchestrator(&fetcher, &store, SyncStream::Price);
    price.run(&[moutai.clone()], d(2024, 3, 1)).await.unwrap();
    assert_eq!(
        store
            .last_persisted_date(&moutai, SyncStream::Factor)
            .await
            .unwrap(),
        None
    );

    fetcher.client().restore_factors(&moutai);
    let factor = orchestrator(&fetcher, &store, SyncStream::Factor);
    let run = factor.run(&[moutai.clone()], d(2024, 3, 1)).await.unwrap();
    let outcome = run.outcome("sh600519").unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Stored);
    assert_eq!(outcome.rows_affected, 40);
    assert_eq!(store.row_count_for(&moutai), 40);

    let again = factor.run(&[moutai.clone()], d(2024, 3, 1)).await.unwrap();
    assert_eq!(again.outcome("sh600519").unwrap().status, OutcomeStatus::NoWork);
}

#[tokio::test(start_paused = true)]
async fn test_one_failure_does_not_affect_others() {
    let failing = id("sz000001");
    let healthy = id("sh600519");

    let (fetcher_a, store_a) = setup();
    fetcher_a.client().fail(&failing);
    let run_a = orchestrator(&fetcher_a, &store_a, SyncStream::Price)
        .run(&[failing.clone(), healthy.clone()], d(2024, 3, 1))
        .await
        .unwrap();

    let (fetcher_b, store_b) = setup();
    let run_b = orchestrator(&fetcher_b, &store_b, SyncStream::Price)
        .run(&[healthy.clone()], d(2024, 3, 1))
        .await
        .unwrap();

    let failed = run_a.outcome("sz000001").unwrap();
    assert_eq!(failed.status, OutcomeStatus::Failed);
    assert_eq!(failed.error_kind.as_deref(), Some("fetch_failed"));
    assert_eq!(fetcher_a.client().calls_for(&failing).len(), 3);
    assert_eq!(store_a.row_count_for(&failing), 0);

    let a = run_a.outcome("sh600519").unwrap();
    let b = run_b.outcome("sh600519").unwrap();
    assert_eq!(a.status, b.status);
    assert_eq!(a.rows_affected, b.rows_affected);
    for day in trading_days(earliest(), d(2024, 3, 1)) {
        assert_eq!(store_a.get(&healthy, day), store_b.get(&healthy, day));
    }
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_is_isolated() {
    let (fetcher, store) = setup();
    let broken = id("sz000002");
    store.fail_writes_for(&broken);

    let run = orchestrator(&fetcher, &store, SyncStream::Price)
        .run(&[broken.clone(), id("sh600519")], d(2024, 3, 1))
        .await
        .unwrap();

    assert_eq!(run.outcome("sz000002").unwrap().status, OutcomeStatus::Failed);
    assert_eq!(
        run.outcome("sz000002").unwrap().error_kind.as_deref(),
        Some("storage")
    );
    assert_eq!(run.outcome("sh600519").unwrap().status, OutcomeStatus::Stored);
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_price_becomes_absent() {
    let (fetcher, store) = setup();
    let moutai = id("sh600519");
    fetcher.client().garble_close(&moutai);

    let run = orchestrator(&fetcher, &store, SyncStream::Price)
        .run(&[moutai.clone()], d(2024, 3, 1))
        .await
        .unwrap();
    assert_eq!(run.outcome("sh600519").unwrap().status, OutcomeStatus::Stored);

    let row = store.get(&moutai, d(2024, 3, 1)).unwrap();
    assert_eq!(row.get(ObservationField::Close), None);
    assert_eq!(row.get(ObservationField::Open), Some(dec!(100.00)));
    assert_eq!(row.get(ObservationField::Volume), Some(dec!(1200300)));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_lets_in_flight_instrument_finish() {
    let (fetcher, store) = setup();
    let orchestrator = orchestrator(&fetcher, &store, SyncStream::Price);
    let cancel = orchestrator.cancel_signal();

    // 第一個標的在限速等待時收到取消
    tokio::spawn(async move {
        tokio::time::sleep(MIN_INTERVAL / 2).await;
        cancel.cancel();
    });

    let universe: Vec<InstrumentId> = ["sh600519", "sz000001", "sz000002"]
        .iter()
        .map(|raw| id(raw))
        .collect();
    let run = orchestrator.run(&universe, d(2024, 3, 1)).await.unwrap();

    assert_eq!(run.outcome("sh600519").unwrap().status, OutcomeStatus::Stored);
    assert_eq!(run.counts.skipped, 2);
    assert_eq!(
        run.outcome("sz000002").unwrap().error_kind.as_deref(),
        Some("cancelled")
    );
    assert_eq!(fetcher.client().calls().len(), 1);
}
