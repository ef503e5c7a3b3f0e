// Placement pipeline, in gate order
pub mod stock;
pub mod promotions;
pub mod order_numbers;
pub mod orders;

// Post-commit bookkeeping
pub mod inventory;
pub mod carts;
