// Core engines
pub mod billing;
pub mod inventory_consumption;
pub mod order_lifecycle;

// Catalog and tenant administration
pub mod ingredients;
pub mod products;
pub mod tenants;

pub use billing::BillingCalculator;
pub use inventory_consumption::{compute_ledger_deltas, ConsumptionOutcome, LedgerDeltas};
pub use order_lifecycle::{AppendItemRequest, OrderLifecycle, OrderTransition};
