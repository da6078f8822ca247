use rust_decimal::Decimal;
use sea_orm::ConnectionTrait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::entities::order_item;
use crate::errors::ServiceError;
use crate::repositories::{OrderRepository, ProductRepository};

/// Computes order totals from catalog prices.
///
/// Each item is billed at its own product's price times its quantity, plus
/// a flat surcharge per distinct extra ingredient per unit.
#[derive(Clone, Copy, Debug)]
pub struct BillingCalculator {
    extra_surcharge: Decimal,
}

impl BillingCalculator {
    pub fn new(extra_surcharge: Decimal) -> Self {
        Self { extra_surcharge }
    }

    pub fn extra_surcharge(&self) -> Decimal {
        self.extra_surcharge
    }

    pub fn total_for_items(
        &self,
        items: &[order_item::Model],
        prices: &HashMap<Uuid, Decimal>,
    ) -> Result<Decimal, ServiceError> {
        items.iter().try_fold(Decimal::ZERO, |total, item| {
            let price = prices.get(&item.product_id).ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", item.product_id))
            })?;
            let units = Decimal::from(item.quantity);
            let extras = Decimal::from(item.customization.distinct_extra_count() as u64);
            Ok(total + price * units + self.extra_surcharge * extras * units)
        })
    }

    /// Reads the order's items and current prices on `db`. Read-only.
    pub async fn total<C: ConnectionTrait>(
        &self,
        db: &C,
        order_id: Uuid,
    ) -> Result<Decimal, ServiceError> {
        let orders = OrderRepository::new(db);
        orders.get(order_id).await?;
        let items = orders.items(order_id).await?;

        let mut ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        ids.sort();
        ids.dedup();
        let prices = ProductRepository::new(db)
            .find_many_with_recipes(&ids)
            .await?
            .into_iter()
            .map(|(id, p)| (id, p.product.price))
            .collect();

        self.total_for_items(&items, &prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order_item::{ExtraIngredient, ItemCustomization};
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn item(product_id: Uuid, quantity: i32, extras: &[Uuid]) -> order_item::Model {
        order_item::Model {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            position: 0,
            product_id,
            product_name: "p".into(),
            quantity,
            notes: None,
            customization: ItemCustomization {
                extra_ingredients: extras
                    .iter()
                    .map(|id| ExtraIngredient {
                        ingredient_id: *id,
                        quantity: dec!(10),
                    })
                    .collect(),
                ..Default::default()
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn price_times_quantity_plus_extra_surcharge() {
        let pizza = Uuid::new_v4();
        let prices = HashMap::from([(pizza, dec!(1200))]);
        let calc = BillingCalculator::new(dec!(100));

        let total = calc
            .total_for_items(&[item(pizza, 3, &[Uuid::new_v4()])], &prices)
            .unwrap();

        assert_eq!(total, dec!(3900));
    }

    #[rstest]
    #[case(0, dec!(2400))]
    #[case(1, dec!(2600))]
    #[case(2, dec!(2800))]
    fn surcharge_scales_with_distinct_extras(#[case] extras: usize, #[case] expected: Decimal) {
        let pizza = Uuid::new_v4();
        let prices = HashMap::from([(pizza, dec!(1200))]);
        let ids: Vec<Uuid> = (0..extras).map(|_| Uuid::new_v4()).collect();
        let total = BillingCalculator::new(dec!(100))
            .total_for_items(&[item(pizza, 2, &ids)], &prices)
            .unwrap();
        assert_eq!(total, expected);
    }

    #[test]
    fn repeated_extra_counts_once() {
        let pizza = Uuid::new_v4();
        let cheese = Uuid::new_v4();
        let prices = HashMap::from([(pizza, dec!(1000))]);
        let total = BillingCalculator::new(dec!(100))
            .total_for_items(&[item(pizza, 1, &[cheese, cheese])], &prices)
            .unwrap();
        assert_eq!(total, dec!(1100));
    }

    #[test]
    fn sums_across_items() {
        let pizza = Uuid::new_v4();
        let soda = Uuid::new_v4();
        let prices = HashMap::from([(pizza, dec!(1200)), (soda, dec!(650.50))]);
        let total = BillingCalculator::new(dec!(100))
            .total_for_items(&[item(pizza, 1, &[]), item(soda, 2, &[])], &prices)
            .unwrap();
        assert_eq!(total, dec!(2501.00));
    }

    #[test]
    fn empty_order_totals_zero() {
        let total = BillingCalculator::new(dec!(100))
            .total_for_items(&[], &HashMap::new())
            .unwrap();
        assert_eq!(total, Decimal::ZERO);
    }

    #[test]
    fn missing_product_is_not_found() {
        let result = BillingCalculator::new(dec!(100))
            .total_for_items(&[item(Uuid::new_v4(), 1, &[])], &HashMap::new());
        assert_matches!(result, Err(ServiceError::NotFound(_)));
    }
}
