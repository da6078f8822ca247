use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::ConnectionTrait;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entities::{ingredient, order_item};
use crate::errors::ServiceError;
use crate::repositories::{IngredientRepository, ProductRepository, ProductWithRecipe};

/// Net stock change per ingredient; decrements are negative.
pub type LedgerDeltas = BTreeMap<Uuid, Decimal>;

/// Result of a successful consumption.
#[derive(Debug, Clone, Default)]
pub struct ConsumptionOutcome {
    pub deltas: LedgerDeltas,
    /// Touched ingredients now below their minimum stock
    pub below_minimum: Vec<ingredient::Model>,
}

/// Products an item consumes: its halves when it has any, else its product.
fn products_of(item: &order_item::Model) -> Vec<Uuid> {
    if item.customization.halves.is_empty() {
        vec![item.product_id]
    } else {
        item.customization.halves.clone()
    }
}

/// Every product id the items reference, halves included.
pub fn referenced_products(items: &[order_item::Model]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = items.iter().flat_map(products_of).collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Computes merged ledger deltas for the items against the given catalog.
///
/// Per item: each COMPOSED product contributes `recipe quantity × item
/// quantity` for every recipe ingredient not removed on the item. When at
/// least one of the item's products is COMPOSED, its extra ingredients are
/// added once on top. SIMPLE products contribute nothing. Amounts are summed
/// per ingredient across all items.
pub fn compute_ledger_deltas(
    items: &[order_item::Model],
    catalog: &HashMap<Uuid, ProductWithRecipe>,
) -> Result<LedgerDeltas, ServiceError> {
    let mut consumed: BTreeMap<Uuid, Decimal> = BTreeMap::new();

    for item in items {
        let units = Decimal::from(item.quantity);
        let customization = &item.customization;
        let mut any_composed = false;

        for product_id in products_of(item) {
            let entry = catalog.get(&product_id).ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", product_id))
            })?;
            if !entry.product.is_composed() {
                continue;
            }
            any_composed = true;

            for line in &entry.recipe {
                if customization.is_removed(&line.ingredient_id) {
                    continue;
                }
                *consumed.entry(line.ingredient_id).or_default() += line.quantity * units;
            }
        }

        if any_composed {
            for extra in &customization.extra_ingredients {
                if customization.is_removed(&extra.ingredient_id) {
                    continue;
                }
                *consumed.entry(extra.ingredient_id).or_default() += extra.quantity;
            }
        }
    }

    Ok(consumed
        .into_iter()
        .filter(|(_, amount)| !amount.is_zero())
        .map(|(id, amount)| (id, -amount))
        .collect())
}

/// Consumes inventory for an order's items on `db`.
///
/// Recipes are read through the same connection, so inside a transaction
/// they are the recipes in force at send time. Each delta is one atomic
/// in-store increment; stock may go negative. The caller guarantees this
/// runs once per order.
#[instrument(skip(db, items), fields(items = items.len()))]
pub async fn consume<C: ConnectionTrait>(
    db: &C,
    items: &[order_item::Model],
) -> Result<ConsumptionOutcome, ServiceError> {
    let catalog = ProductRepository::new(db)
        .find_many_with_recipes(&referenced_products(items))
        .await?;
    let deltas = compute_ledger_deltas(items, &catalog)?;

    let ledger = IngredientRepository::new(db);
    for (ingredient_id, delta) in &deltas {
        ledger.apply_delta(*ingredient_id, *delta).await?;
        counter!("comanda.inventory.decrement", 1);
        debug!(ingredient_id = %ingredient_id, delta = %delta, "Applied ledger delta");
    }

    let touched: Vec<Uuid> = deltas.keys().copied().collect();
    let below_minimum = ledger
        .find_many(&touched)
        .await?
        .into_iter()
        .filter(|i| i.is_below_minimum())
        .collect();

    Ok(ConsumptionOutcome {
        deltas,
        below_minimum,
    })
}
