pub mod contract;
pub mod model;
pub mod pool;

pub use contract::{ContractTransaction, SmartContract};
pub use model::{Transaction, TxStatus, TxType};
pub use pool::{DEFAULT_MAX_PENDING, TransactionPool};
