pub mod balance;
pub mod block;
pub mod orphans;
pub mod tree;

pub use balance::{BalanceKind, BalanceView, BlockBalances};
pub use block::Block;
pub use orphans::{DEFAULT_MAX_ORPHANS, OrphanPool};
pub use tree::{BlockTree, InsertOutcome, TreeEvent};

/// Upper bound on ordinary transactions sealed into one locally produced block.
pub const MAX_TXS_PER_BLOCK: usize = 500;
