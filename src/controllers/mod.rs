pub mod bundle;
pub mod volume;
