//! Optimistic concurrency and store timeout tests.

mod common;

use common::{dec, item, MemoryHarness, ScriptedStore};
use order_service::error::OrderError;
use order_service::services::{InMemoryOrderStore, OrderService};
use service_core::retry::{retry_with_backoff, RetryConfig};
use std::sync::Arc;
use std::time::Duration;

fn harness_with(store: impl FnOnce(Arc<InMemoryOrderStore>) -> ScriptedStore) -> MemoryHarness {
    let inner = Arc::new(InMemoryOrderStore::new());
    let scripted = Arc::new(store(inner.clone()));
    MemoryHarness::with_store(inner, scripted)
}

#[tokio::test]
async fn concurrent_adds_on_same_revision_conflict_once() {
    let h = harness_with(|inner| ScriptedStore::new(inner).with_read_barrier(2));
    let order = h.create(vec![item(1, "10.00")]).await;

    let (first, second) = tokio::join!(
        h.service
            .add_line_item(&h.ctx, order.order_id, item(1, "20.00")),
        h.service
            .add_line_item(&h.ctx, order.order_id, item(1, "30.00")),
    );

    let (winner, loser_input) = match (first, second) {
        (Ok(order), Err(OrderError::ConcurrentModification)) => (order, item(1, "30.00")),
        (Err(OrderError::ConcurrentModification), Ok(order)) => (order, item(1, "20.00")),
        other => panic!("expected exactly one conflict, got {:?}", other),
    };
    assert_eq!(winner.revision, order.revision + 1);

    let retried = h
        .service
        .add_line_item(&h.ctx, order.order_id, loser_input)
        .await
        .unwrap();

    assert_eq!(retried.line_items.len(), 3);
    assert_eq!(retried.gross_total, dec("60.00"));
    assert_eq!(retried.revision, order.revision + 2);
}

#[tokio::test]
async fn retrying_callers_both_land_their_items() {
    let h = harness_with(|inner| ScriptedStore::new(inner).with_read_barrier(2));
    let order = h.create(vec![]).await;
    let retry = RetryConfig::quick();

    let (first, second) = tokio::join!(
        retry_with_backoff(&retry, "add_line_item", || {
            h.service
                .add_line_item(&h.ctx, order.order_id, item(2, "12.50"))
        }),
        retry_with_backoff(&retry, "add_line_item", || {
            h.service
                .add_line_item(&h.ctx, order.order_id, item(1, "5.00"))
        }),
    );
    first.unwrap();
    second.unwrap();

    let totals = h.service.fetch_totals(&h.ctx, order.order_id).await.unwrap();
    assert_eq!(totals.gross_total, dec("30.00"));
    assert_eq!(totals.net_total, dec("30.00"));
}

#[tokio::test]
async fn discount_and_removal_race_never_breaks_invariants() {
    let h = harness_with(|inner| ScriptedStore::new(inner).with_read_barrier(2));
    let order = h.create(vec![item(1, "100.00"), item(1, "20.00")]).await;
    let big_item = order.line_items[0].line_item_id;

    // Each change is valid on its own; together they would leave a 50.00
    // discount on a 20.00 order.
    let (discount, removal) = tokio::join!(
        h.service
            .set_discount(&h.ctx, order.order_id, dec("50.00")),
        h.service
            .remove_line_item(&h.ctx, order.order_id, big_item),
    );
    assert!(discount.is_ok() != removal.is_ok());

    let current = h.service.get_order(&h.ctx, order.order_id).await.unwrap();
    assert!(current.discount <= current.gross_total);
    assert_eq!(current.net_total, current.gross_total - current.discount);

    if discount.is_ok() {
        let err = h
            .service
            .remove_line_item(&h.ctx, order.order_id, big_item)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "discount_exceeds_total");
    }
}

#[tokio::test]
async fn slow_store_surfaces_as_unavailable_without_partial_write() {
    let inner = Arc::new(InMemoryOrderStore::new());
    let scripted = Arc::new(
        ScriptedStore::new(inner.clone()).with_write_delay(Duration::from_millis(200)),
    );
    let mut h = MemoryHarness::with_store(inner.clone(), scripted);

    // Create through an unthrottled service so the order exists.
    let setup = MemoryHarness {
        store: inner.clone(),
        service: OrderService::new(inner.clone()),
        ctx: h.ctx,
        customer_id: h.customer_id,
        vehicle_id: h.vehicle_id,
    };
    let order = setup.create(vec![item(1, "10.00")]).await;

    h.service = h
        .service
        .clone()
        .with_store_timeout(Duration::from_millis(20));

    let err = h
        .service
        .add_line_item(&h.ctx, order.order_id, item(1, "5.00"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::StoreUnavailable(_)));
    assert_eq!(err.code(), "store_unavailable");

    let unchanged = setup.service.get_order(&setup.ctx, order.order_id).await.unwrap();
    assert_eq!(unchanged.revision, order.revision);
    assert_eq!(unchanged.line_items.len(), 1);
    assert_eq!(unchanged.gross_total, dec("10.00"));
}
