pub mod amount;
pub mod config;
pub mod csv;
pub mod engine;
pub mod model;
pub mod store;

pub use amount::Amount;
pub use config::EngineConfig;
pub use engine::{AccountError, Engine, RunSummary, TransferError, ValidationError};
pub use model::{Account, TransferCommand, TransferRequest, UserId};
pub use store::{AccountStore, MemoryStore, StoreError};
