pub mod filter;
pub mod pdf;
pub mod upload;
