//! End-to-end stock scenarios through the service facade.

use rust_decimal::Decimal;

use stockledger_alerts::{AlertClosure, AlertFilter, AlertKind};
use stockledger_catalog::NewProduct;
use stockledger_core::{InventoryError, PartyId, ProductId};
use stockledger_documents::{DocumentFilter, DocumentKind, LineItem, ReturnKind};
use stockledger_engine::{EngineConfig, InMemoryInventoryService};
use stockledger_ledger::{Direction, MovementFilter, Reason};

fn service() -> InMemoryInventoryService {
    stockledger_observability::init_for_tests();
    InMemoryInventoryService::in_memory(EngineConfig::default())
}

fn product(svc: &InMemoryInventoryService, sku: &str, stock: i64, minimum: i64) -> ProductId {
    svc.create_product(
        NewProduct::new(sku, format!("Product {sku}"), Decimal::new(1500, 2))
            .with_purchase_price(Decimal::new(900, 2))
            .with_minimum_stock(minimum),
        stock,
    )
    .unwrap()
    .id_typed()
}

fn line(product_id: ProductId, quantity: i64) -> LineItem {
    LineItem::new(product_id, quantity, Decimal::new(1500, 2))
}

fn stock(svc: &InMemoryInventoryService, id: ProductId) -> i64 {
    svc.get_product(id).unwrap().stock()
}

#[test]
fn low_then_critical_then_recovered() {
    let svc = service();
    let p = product(&svc, "SKU-A", 10, 5);
    assert_eq!(svc.open_alert_count(), 0);

    // A: sale of 6 leaves 4, one open low alert.
    svc.sale(None, Some("POS-01".into()), vec![line(p, 6)]).unwrap();
    assert_eq!(stock(&svc, p), 4);
    let open = svc.alerts(&AlertFilter::open());
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].kind, AlertKind::Low);
    let low_id = open[0].id;

    // B: sale of 4 empties the shelf; low resolved, critical opened.
    svc.sale(None, None, vec![line(p, 4)]).unwrap();
    assert_eq!(stock(&svc, p), 0);
    let low = svc.alert(low_id).unwrap();
    assert!(low.is_read());
    assert_eq!(low.closure, Some(AlertClosure::Superseded));
    let open = svc.alerts(&AlertFilter::open());
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].kind, AlertKind::Critical);

    // C: purchase of 20 resolves everything.
    svc.purchase(PartyId::new(), Some("INV-100".into()), vec![line(p, 20)])
        .unwrap();
    assert_eq!(stock(&svc, p), 20);
    assert_eq!(svc.open_alert_count(), 0);
    assert_eq!(svc.alerts(&AlertFilter::default()).len(), 2);
}

#[test]
fn oversell_is_rejected_without_trace() {
    let svc = service();
    let p = product(&svc, "SKU-D", 3, 1);
    let history_before = svc.movements(&MovementFilter::for_product(p), None, None).unwrap().total;

    // D: 5 requested against 3.
    let err = svc.sale(None, None, vec![line(p, 5)]).unwrap_err();
    assert_eq!(
        err,
        InventoryError::InsufficientStock {
            product_id: p,
            line_no: Some(1),
            available: 3,
            requested: 5,
        }
    );
    assert_eq!(stock(&svc, p), 3);
    assert_eq!(
        svc.movements(&MovementFilter::for_product(p), None, None).unwrap().total,
        history_before
    );
    assert!(svc.list_documents(&DocumentFilter::default()).unwrap().is_empty());
}

#[test]
fn document_with_unknown_product_leaves_no_movements() {
    let svc = service();
    let a = product(&svc, "SKU-1", 0, 0);
    let c = product(&svc, "SKU-3", 0, 0);

    // F: line 2 names a product that does not exist.
    let err = svc
        .purchase(PartyId::new(), None, vec![line(a, 5), line(ProductId::new(), 5), line(c, 5)])
        .unwrap_err();
    assert!(matches!(err, InventoryError::NotFound(_)));

    assert_eq!(stock(&svc, a), 0);
    assert_eq!(stock(&svc, c), 0);
    let purchases = MovementFilter {
        reason: Some(Reason::Purchase),
        ..Default::default()
    };
    assert_eq!(svc.movements(&purchases, None, None).unwrap().total, 0);
}

#[test]
fn returns_move_stock_by_kind() {
    let svc = service();
    let p = product(&svc, "SKU-R", 10, 2);
    let supplier = PartyId::new();
    let purchase = svc.purchase(supplier, None, vec![line(p, 5)]).unwrap();
    let sale = svc.sale(None, None, vec![line(p, 4)]).unwrap();
    assert_eq!(stock(&svc, p), 11);

    let customer_return = svc
        .return_goods(ReturnKind::Customer, Some(sale.id), "wrong size", vec![line(p, 1)])
        .unwrap();
    assert_eq!(customer_return.kind, DocumentKind::CustomerReturn);
    assert_eq!(stock(&svc, p), 12);

    svc.return_goods(ReturnKind::Supplier, Some(purchase.id), "damaged in transit", vec![line(p, 2)])
        .unwrap();
    assert_eq!(stock(&svc, p), 10);

    // Outbound returns are guarded like sales.
    let err = svc
        .return_goods(ReturnKind::Supplier, None, "recall", vec![line(p, 11)])
        .unwrap_err();
    assert!(matches!(err, InventoryError::InsufficientStock { .. }));

    let returns = MovementFilter {
        reason: Some(Reason::Return),
        ..Default::default()
    };
    let page = svc.movements(&returns, None, None).unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.movements[0].direction, Direction::Out);
}

#[test]
fn multi_line_document_is_one_unit() {
    let svc = service();
    let a = product(&svc, "SKU-A", 10, 0);
    let b = product(&svc, "SKU-B", 1, 0);

    let err = svc.sale(None, None, vec![line(a, 2), line(b, 2)]).unwrap_err();
    assert!(matches!(err, InventoryError::InsufficientStock { line_no: Some(2), .. }));
    assert_eq!((stock(&svc, a), stock(&svc, b)), (10, 1));

    let sale = svc
        .sale(None, None, vec![line(a, 2), line(b, 1), line(a, 3)])
        .unwrap();
    assert_eq!(sale.total, Decimal::new(9000, 2));
    assert_eq!((stock(&svc, a), stock(&svc, b)), (5, 0));

    let history = svc.movements(&MovementFilter::for_document(sale.id), None, None).unwrap();
    assert_eq!(history.total, 3);
    for line in &sale.lines {
        assert!(history.movements.iter().any(|m| m.id == line.movement_id && m.line_no == Some(line.line_no)));
    }
}

#[test]
fn reversal_restores_stock_and_history_is_replayable() {
    let svc = service();
    let p = product(&svc, "SKU-X", 4, 1);
    let purchase = svc.purchase(PartyId::new(), None, vec![line(p, 6)]).unwrap();
    let sale = svc.sale(None, None, vec![line(p, 8)]).unwrap();

    // Purchase stock already sold: reversal cannot take it back out.
    assert!(matches!(
        svc.reverse_document(purchase.id),
        Err(InventoryError::InsufficientStock { .. })
    ));

    svc.reverse_document(sale.id).unwrap();
    assert_eq!(stock(&svc, p), 10);
    assert!(matches!(svc.reverse_document(sale.id), Err(InventoryError::Conflict(_))));
    assert_eq!(svc.get_document(sale.id).unwrap(), sale);

    svc.adjustment(p, Direction::Out, 3, Some("shrinkage".into())).unwrap();
    let reconciliation = svc.reconcile(p).unwrap();
    assert!(reconciliation.is_consistent());
    assert_eq!(reconciliation.replay.stock, 7);
    assert_eq!(reconciliation.replay.movements, 5);
}

#[test]
fn cursor_walks_history_oldest_first() {
    let svc = service();
    let p = product(&svc, "SKU-C", 0, 0);
    for qty in 1..=5 {
        svc.adjustment(p, Direction::In, qty, None).unwrap();
    }

    let stocks: Vec<i64> = svc
        .movement_cursor(MovementFilter::for_product(p))
        .map(|m| m.unwrap().stock_after)
        .collect();
    assert_eq!(stocks, vec![1, 3, 6, 10, 15]);

    let newest = svc.movements(&MovementFilter::for_product(p), Some(2), None).unwrap();
    assert_eq!(newest.movements[0].stock_after, 15);
    assert!(newest.has_more);
}

#[test]
fn acknowledged_alert_reopens_on_next_sale() {
    let svc = service();
    let p = product(&svc, "SKU-K", 6, 5);
    svc.sale(None, None, vec![line(p, 2)]).unwrap();
    assert_eq!(svc.mark_all_alerts_read(), 1);
    assert_eq!(svc.open_alert_count(), 0);

    let first = svc.alerts(&AlertFilter::default())[0].id;
    assert_eq!(svc.mark_alert_read(first).unwrap().closure, Some(AlertClosure::Acknowledged));

    svc.sale(None, None, vec![line(p, 1)]).unwrap();
    assert_eq!(svc.open_alert_count(), 1);
}

#[test]
fn overflowing_adjustment_is_rejected_and_releases_locks() {
    let svc = service();
    let p = product(&svc, "SKU-MAX", 1, 0);

    let err = svc.adjustment(p, Direction::In, i64::MAX, None).unwrap_err();
    assert!(matches!(err, InventoryError::Validation(ref msg) if msg.contains("overflow")));
    assert_eq!(stock(&svc, p), 1);
    assert_eq!(svc.movements(&MovementFilter::for_product(p), None, None).unwrap().total, 1);

    svc.adjustment(p, Direction::In, 2, None).unwrap();
    assert_eq!(stock(&svc, p), 3);
    assert!(svc.reconcile(p).unwrap().is_consistent());
}

#[test]
fn out_of_range_document_total_is_rejected_before_stock_moves() {
    let svc = service();
    let p = product(&svc, "SKU-BIG", 0, 0);
    let huge = LineItem::new(p, 1_000_000_000_000_000_000, Decimal::from(100_000_000_000_i64));

    let err = svc.purchase(PartyId::new(), None, vec![huge]).unwrap_err();
    assert!(matches!(err, InventoryError::Validation(ref msg) if msg.contains("line 1")));
    assert_eq!(stock(&svc, p), 0);
    assert!(svc.list_documents(&DocumentFilter::default()).unwrap().is_empty());

    svc.purchase(PartyId::new(), None, vec![line(p, 4)]).unwrap();
    assert_eq!(stock(&svc, p), 4);
}
