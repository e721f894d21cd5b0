//! Random document sequences against a simple stock model.

use proptest::prelude::*;
use rust_decimal::Decimal;

use stockledger_catalog::NewProduct;
use stockledger_core::{InventoryError, PartyId, ProductId};
use stockledger_documents::{LineItem, ReturnKind};
use stockledger_engine::{EngineConfig, InMemoryInventoryService};
use stockledger_ledger::{Direction, Movement, MovementFilter};

#[derive(Debug, Clone)]
enum Op {
    Purchase(usize, i64),
    Sale(usize, i64),
    CustomerReturn(usize, i64),
    Adjust(usize, Direction, i64),
}

fn op() -> impl Strategy<Value = Op> {
    let direction = prop_oneof![Just(Direction::In), Just(Direction::Out)];
    prop_oneof![
        3 => (0usize..2, 1i64..20).prop_map(|(p, q)| Op::Purchase(p, q)),
        4 => (0usize..2, 1i64..20).prop_map(|(p, q)| Op::Sale(p, q)),
        1 => (0usize..2, 1i64..5).prop_map(|(p, q)| Op::CustomerReturn(p, q)),
        2 => (0usize..2, direction, 1i64..10).prop_map(|(p, d, q)| Op::Adjust(p, d, q)),
    ]
}

fn line(product_id: ProductId, quantity: i64) -> LineItem {
    LineItem::new(product_id, quantity, Decimal::new(199, 2))
}

fn history(svc: &InMemoryInventoryService, id: ProductId) -> Vec<Movement> {
    svc.movement_cursor(MovementFilter::for_product(id))
        .collect::<Result<_, _>>()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: recorded stock always equals the model, never goes negative,
    /// and replays from the ledger as initial + inbound - outbound.
    #[test]
    fn stock_matches_model_and_ledger(
        initial in prop::collection::vec(0i64..15, 2),
        ops in prop::collection::vec(op(), 1..40),
    ) {
        stockledger_observability::init_for_tests();
        let svc = InMemoryInventoryService::in_memory(EngineConfig::default());
        let ids: Vec<ProductId> = initial
            .iter()
            .enumerate()
            .map(|(i, &stock)| {
                svc.create_product(NewProduct::new(format!("P-{i}"), "Part", Decimal::ONE), stock)
                    .unwrap()
                    .id_typed()
            })
            .collect();
        let mut model = initial.clone();

        for op in ops {
            let (idx, delta, result) = match op {
                Op::Purchase(p, q) => (p, q, svc.purchase(PartyId::new(), None, vec![line(ids[p], q)]).map(|_| ())),
                Op::Sale(p, q) => (p, -q, svc.sale(None, None, vec![line(ids[p], q)]).map(|_| ())),
                Op::CustomerReturn(p, q) => (
                    p,
                    q,
                    svc.return_goods(ReturnKind::Customer, None, "changed mind", vec![line(ids[p], q)]).map(|_| ()),
                ),
                Op::Adjust(p, direction, q) => {
                    let delta = if direction == Direction::In { q } else { -q };
                    (p, delta, svc.adjustment(ids[p], direction, q, None).map(|_| ()))
                }
            };

            match result {
                Ok(()) => model[idx] += delta,
                Err(InventoryError::InsufficientStock { available, .. }) => {
                    prop_assert!(model[idx] + delta < 0);
                    prop_assert_eq!(available, model[idx]);
                }
                Err(err) => prop_assert!(false, "unexpected error: {err}"),
            }
        }

        for (i, &id) in ids.iter().enumerate() {
            let recorded = svc.get_product(id).unwrap().stock();
            prop_assert_eq!(recorded, model[i]);
            prop_assert!(recorded >= 0);
            prop_assert!(svc.reconcile(id).unwrap().is_consistent());

            let (inbound, outbound) = history(&svc, id).iter().fold((0, 0), |(inb, outb), m| match m.direction {
                Direction::In => (inb + m.quantity, outb),
                Direction::Out => (inb, outb + m.quantity),
            });
            // Initial stock is itself the first inbound movement.
            prop_assert_eq!(recorded, inbound - outbound);
        }
    }
}
