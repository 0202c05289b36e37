pub mod header;
pub mod stream;
