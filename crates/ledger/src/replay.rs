//! Rebuild a product's stock from its movement history.

use serde::{Deserialize, Serialize};

use stockledger_core::{InventoryError, InventoryResult, ProductId};

use crate::movement::Movement;

/// Result of replaying one product's movements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replay {
    pub product_id: Option<ProductId>,
    /// Stock after the last replayed movement (0 for an empty history).
    pub stock: i64,
    pub movements: usize,
    /// Sequence of the last replayed movement.
    pub last_sequence: Option<u64>,
}

/// Fold movements (in append order) into a stock figure.
///
/// Every movement must belong to the same product and continue the previous
/// movement's `stock_after`; the first movement must start from zero. A gap
/// anywhere means the history and the snapshot can no longer be trusted and
/// surfaces as `Conflict`.
pub fn replay<'a>(movements: impl IntoIterator<Item = &'a Movement>) -> InventoryResult<Replay> {
    let mut state = Replay {
        product_id: None,
        stock: 0,
        movements: 0,
        last_sequence: None,
    };

    for m in movements {
        match state.product_id {
            None => state.product_id = Some(m.product_id),
            Some(p) if p != m.product_id => {
                return Err(InventoryError::conflict(format!(
                    "replay mixes products {p} and {}",
                    m.product_id
                )));
            }
            Some(_) => {}
        }
        if m.stock_before != state.stock {
            return Err(InventoryError::conflict(format!(
                "movement {} (sequence {}) starts at {} but history reached {}",
                m.id, m.sequence, m.stock_before, state.stock
            )));
        }
        let next = m.direction.apply(state.stock, m.quantity);
        if next != Some(m.stock_after) {
            return Err(InventoryError::conflict(format!(
                "movement {} records {} after but applies to {:?}",
                m.id, m.stock_after, next
            )));
        }
        state.stock = m.stock_after;
        state.movements += 1;
        state.last_sequence = Some(m.sequence);
    }

    Ok(state)
}
