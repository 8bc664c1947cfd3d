pub mod bundle;
pub mod catalog;
pub mod labels;
pub mod resources;
