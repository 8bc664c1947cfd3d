pub mod error;
pub mod quantity;
