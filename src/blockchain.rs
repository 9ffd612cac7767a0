// Re-exports `blockchain/core.rs`.

pub mod core;
pub use self::core::*;
