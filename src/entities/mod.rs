pub mod ingredient;
pub mod order;
pub mod order_item;
pub mod product;
pub mod product_ingredient;
pub mod tenant;
