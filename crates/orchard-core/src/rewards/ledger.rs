//! Reward ledger: balance plus an append-only transaction log.
//!
//! The ledger is the only authority on the balance. Every mutation is
//! computed first, checked against the ledger invariants, and only then
//! committed, so a rejected operation leaves no trace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Earned,
    Spent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardSource {
    FocusSession,
    TaskCompletion,
    StreakBonus,
    AppUnlock,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardTransaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: u64,
    pub source: RewardSource,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// Carry-forward totals of transactions removed by archival.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedTotals {
    pub earned: u64,
    pub spent: u64,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardLedger {
    balance: u64,
    total_earned: u64,
    total_spent: u64,
    #[serde(default)]
    transactions: Vec<RewardTransaction>,
    #[serde(default)]
    archived: ArchivedTotals,
}

#[derive(Debug, Clone, Copy)]
struct Totals {
    balance: u64,
    earned: u64,
    spent: u64,
}

impl RewardLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn total_earned(&self) -> u64 {
        self.total_earned
    }

    pub fn total_spent(&self) -> u64 {
        self.total_spent
    }

    pub fn transactions(&self) -> &[RewardTransaction] {
        &self.transactions
    }

    pub fn archived(&self) -> ArchivedTotals {
        self.archived
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> impl Iterator<Item = &RewardTransaction> {
        self.transactions.iter().rev().take(limit)
    }

    pub fn can_afford(&self, amount: u64) -> bool {
        amount <= self.balance
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn credit(
        &mut self,
        amount: u64,
        source: RewardSource,
        description: impl Into<String>,
        metadata: Metadata,
        now: DateTime<Utc>,
    ) -> Result<&RewardTransaction, EngineError> {
        self.apply(TransactionType::Earned, amount, source, description.into(), metadata, now)
    }

    pub fn debit(
        &mut self,
        amount: u64,
        source: RewardSource,
        description: impl Into<String>,
        metadata: Metadata,
        now: DateTime<Utc>,
    ) -> Result<&RewardTransaction, EngineError> {
        if amount > self.balance {
            return Err(EngineError::InsufficientBalance {
                requested: amount,
                balance: self.balance,
            });
        }
        self.apply(TransactionType::Spent, amount, source, description.into(), metadata, now)
    }

    /// Remove transactions created before `cutoff`, folding their amounts
    /// into the archived totals. Returns how many were archived.
    pub fn archive_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let (old, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.transactions)
            .into_iter()
            .partition(|tx| tx.created_at < cutoff);

        for tx in &old {
            match tx.kind {
                TransactionType::Earned => self.archived.earned += tx.amount,
                TransactionType::Spent => self.archived.spent += tx.amount,
            }
        }
        self.archived.count += old.len() as u64;
        self.transactions = kept;
        old.len()
    }

    /// Verify `balance == earned - spent`, and that the log (plus archived
    /// totals) sums to the recorded totals.
    pub fn check_integrity(&self) -> Result<(), EngineError> {
        self.verify(
            Totals {
                balance: self.balance,
                earned: self.total_earned,
                spent: self.total_spent,
            },
            None,
        )
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn apply(
        &mut self,
        kind: TransactionType,
        amount: u64,
        source: RewardSource,
        description: String,
        metadata: Metadata,
        now: DateTime<Utc>,
    ) -> Result<&RewardTransaction, EngineError> {
        if amount == 0 {
            return Err(EngineError::InvalidAmount);
        }

        let next = match kind {
            TransactionType::Earned => (
                self.balance.checked_add(amount),
                self.total_earned.checked_add(amount),
                Some(self.total_spent),
            ),
            TransactionType::Spent => (
                self.balance.checked_sub(amount),
                Some(self.total_earned),
                self.total_spent.checked_add(amount),
            ),
        };
        let (Some(balance), Some(earned), Some(spent)) = next else {
            let err = EngineError::IntegrityViolation(format!(
                "{kind:?} of {amount} overflows ledger (balance {}, earned {}, spent {})",
                self.balance, self.total_earned, self.total_spent
            ));
            tracing::error!(error = %err, ?source, "ledger mutation rejected");
            return Err(err);
        };

        let tx = RewardTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            amount,
            source,
            description,
            metadata,
            created_at: now,
        };

        let candidate = Totals {
            balance,
            earned,
            spent,
        };
        if let Err(err) = self.verify(candidate, Some(&tx)) {
            tracing::error!(
                error = %err,
                ?kind,
                amount,
                ?source,
                balance = self.balance,
                total_earned = self.total_earned,
                total_spent = self.total_spent,
                "ledger mutation rejected"
            );
            return Err(err);
        }

        self.balance = candidate.balance;
        self.total_earned = candidate.earned;
        self.total_spent = candidate.spent;
        self.transactions.push(tx);
        tracing::debug!(?kind, amount, ?source, balance = self.balance, "ledger updated");

        let committed = self.transactions.len() - 1;
        Ok(&self.transactions[committed])
    }

    fn verify(&self, totals: Totals, pending: Option<&RewardTransaction>) -> Result<(), EngineError> {
        if totals.earned.checked_sub(totals.spent) != Some(totals.balance) {
            return Err(EngineError::IntegrityViolation(format!(
                "balance {} != earned {} - spent {}",
                totals.balance, totals.earned, totals.spent
            )));
        }

        let mut earned = u128::from(self.archived.earned);
        let mut spent = u128::from(self.archived.spent);
        for tx in self.transactions.iter().chain(pending) {
            match tx.kind {
                TransactionType::Earned => earned += u128::from(tx.amount),
                TransactionType::Spent => spent += u128::from(tx.amount),
            }
        }
        if earned != u128::from(totals.earned) || spent != u128::from(totals.spent) {
            return Err(EngineError::IntegrityViolation(format!(
                "transaction log sums (earned {earned}, spent {spent}) do not match totals \
                 (earned {}, spent {})",
                totals.earned, totals.spent
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn credit_then_debit() {
        let mut ledger = RewardLedger::new();
        ledger
            .credit(40, RewardSource::FocusSession, "focus", Metadata::new(), now())
            .unwrap();
        let tx = ledger
            .debit(30, RewardSource::AppUnlock, "unlock", Metadata::new(), now())
            .unwrap();
        assert_eq!(tx.kind, TransactionType::Spent);
        assert_eq!(ledger.balance(), 10);
        assert_eq!(ledger.total_earned(), 40);
        assert_eq!(ledger.total_spent(), 30);
        assert_eq!(ledger.transactions().len(), 2);
        ledger.check_integrity().unwrap();
    }

    #[test]
    fn overdraft_is_rejected_without_effect() {
        let mut ledger = RewardLedger::new();
        ledger
            .credit(5, RewardSource::Manual, "gift", Metadata::new(), now())
            .unwrap();
        let err = ledger
            .debit(6, RewardSource::AppUnlock, "unlock", Metadata::new(), now())
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientBalance {
                requested: 6,
                balance: 5
            }
        );
        assert_eq!(ledger.balance(), 5);
        assert_eq!(ledger.transactions().len(), 1);
    }

    #[test]
    fn zero_amounts_are_rejected() {
        let mut ledger = RewardLedger::new();
        assert_eq!(
            ledger
                .credit(0, RewardSource::Manual, "", Metadata::new(), now())
                .unwrap_err(),
            EngineError::InvalidAmount
        );
        assert_eq!(
            ledger
                .debit(0, RewardSource::AppUnlock, "", Metadata::new(), now())
                .unwrap_err(),
            EngineError::InvalidAmount
        );
        assert!(ledger.transactions().is_empty());
    }

    #[test]
    fn overflow_is_an_integrity_violation() {
        let mut ledger = RewardLedger::new();
        ledger
            .credit(u64::MAX, RewardSource::Manual, "", Metadata::new(), now())
            .unwrap();
        let err = ledger
            .credit(1, RewardSource::Manual, "", Metadata::new(), now())
            .unwrap_err();
        assert!(matches!(err, EngineError::IntegrityViolation(_)));
        assert_eq!(ledger.balance(), u64::MAX);
        assert_eq!(ledger.transactions().len(), 1);
    }

    #[test]
    fn tampered_totals_fail_integrity() {
        let json = serde_json::json!({
            "balance": 10,
            "totalEarned": 10,
            "totalSpent": 0,
            "transactions": []
        });
        let ledger: RewardLedger = serde_json::from_value(json).unwrap();
        assert!(ledger.check_integrity().is_err());

        let json = serde_json::json!({
            "balance": 5,
            "totalEarned": 10,
            "totalSpent": 0,
            "transactions": []
        });
        let ledger: RewardLedger = serde_json::from_value(json).unwrap();
        assert!(ledger.check_integrity().is_err());
    }

    #[test]
    fn archival_keeps_sums_reconciled() {
        let mut ledger = RewardLedger::new();
        ledger
            .credit(20, RewardSource::FocusSession, "", Metadata::new(), now() - Duration::days(40))
            .unwrap();
        ledger
            .debit(5, RewardSource::AppUnlock, "", Metadata::new(), now() - Duration::days(35))
            .unwrap();
        ledger
            .credit(3, RewardSource::TaskCompletion, "", Metadata::new(), now())
            .unwrap();

        let archived = ledger.archive_before(now() - Duration::days(30));
        assert_eq!(archived, 2);
        assert_eq!(ledger.transactions().len(), 1);
        assert_eq!(
            ledger.archived(),
            ArchivedTotals {
                earned: 20,
                spent: 5,
                count: 2
            }
        );
        assert_eq!(ledger.balance(), 18);
        ledger.check_integrity().unwrap();

        ledger
            .debit(18, RewardSource::AppUnlock, "", Metadata::new(), now())
            .unwrap();
        assert_eq!(ledger.balance(), 0);
    }

    #[test]
    fn recent_is_newest_first() {
        let mut ledger = RewardLedger::new();
        for amount in 1..=4 {
            ledger
                .credit(amount, RewardSource::Manual, "", Metadata::new(), now())
                .unwrap();
        }
        let amounts: Vec<u64> = ledger.recent(2).map(|tx| tx.amount).collect();
        assert_eq!(amounts, vec![4, 3]);
    }

    #[test]
    fn transaction_serializes_type_field() {
        let mut ledger = RewardLedger::new();
        let tx = ledger
            .credit(2, RewardSource::StreakBonus, "streak", Metadata::new(), now())
            .unwrap()
            .clone();
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "earned");
        assert_eq!(json["source"], "streak_bonus");
        assert!(json.get("createdAt").is_some());
    }
}
