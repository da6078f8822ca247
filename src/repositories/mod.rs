//! Typed accessors over one tenant's store.
//!
//! Each repository borrows any `ConnectionTrait`, so the same calls run on a
//! pooled handle or inside an open transaction.

pub mod ingredient_repository;
pub mod order_repository;
pub mod product_repository;

pub use ingredient_repository::IngredientRepository;
pub use order_repository::{OrderRepository, OrderWithItems};
pub use product_repository::{ProductRepository, ProductWithRecipe, RecipeLine};
