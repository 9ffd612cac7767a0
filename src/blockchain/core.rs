// Chain, hashing, balances and validation.
pub mod chain;
pub mod hash;
pub mod state;
pub mod validation;

pub use chain::*;
pub use state::*;
pub use validation::*;
