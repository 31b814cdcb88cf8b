mod ledger;
pub mod streak;

pub use ledger::{
    ArchivedTotals, Metadata, RewardLedger, RewardSource, RewardTransaction, TransactionType,
};
pub use streak::StreakPolicy;
