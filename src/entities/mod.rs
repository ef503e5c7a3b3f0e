pub mod brand;
pub mod cart;
pub mod order;
pub mod order_item;
pub mod product;
pub mod product_variant;
pub mod promotion;
pub mod promotion_usage;
