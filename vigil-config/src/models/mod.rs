pub mod audit;
pub mod encryption;
