//! C8 Point Ledger: append-only balance changes, payment linkage, expiry.

use crate::error::CoreError;
use crate::ledger::{AppendOnlyLog, LogEntryKind};
use crate::types::{PointTransaction, PointTransactionType, PointsSummary};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

pub struct PointLedger {
    log: AppendOnlyLog,
}

impl PointLedger {
    pub fn new() -> Self {
        Self {
            log: AppendOnlyLog::new(),
        }
    }

    pub fn from_log(log: AppendOnlyLog) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &AppendOnlyLog {
        &self.log
    }

    fn transactions_for(&self, user_id: &str) -> Vec<PointTransaction> {
        self.log
            .entries_for_subject(user_id)
            .filter(|e| e.kind == LogEntryKind::PointTransaction)
            .filter_map(|e| serde_json::from_value(e.payload.clone()).ok())
            .collect()
    }

    /// Balance is the sum of every entry for the user: an original grant
    /// and its `refunded`/`expired` inverse (if any) cancel out exactly.
    pub fn balance(&self, user_id: &str) -> i64 {
        self.transactions_for(user_id).iter().map(|tx| tx.amount).sum()
    }

    pub fn credit(
        &mut self,
        user_id: &str,
        amount: i64,
        tx_type: PointTransactionType,
        payment_id: Option<String>,
        referrer_user_id: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<PointTransaction, CoreError> {
        if amount <= 0 {
            return Err(CoreError::Validation(
                "credit amount must be positive".to_string(),
            ));
        }
        let tx = PointTransaction {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            amount,
            tx_type,
            payment_id,
            referrer_user_id,
            created_at: Utc::now(),
            expires_at,
            source_tx_id: None,
        };
        self.log
            .append(user_id, LogEntryKind::PointTransaction, &tx)?;
        Ok(tx)
    }

    /// Fails `insufficient_points` if the resulting balance would go negative.
    pub fn debit(
        &mut self,
        user_id: &str,
        amount: i64,
        tx_type: PointTransactionType,
        payment_id: Option<String>,
    ) -> Result<PointTransaction, CoreError> {
        if amount <= 0 {
            return Err(CoreError::Validation(
                "debit amount must be positive".to_string(),
            ));
        }
        if self.balance(user_id) < amount {
            return Err(CoreError::InsufficientPoints);
        }
        let tx = PointTransaction {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            amount: -amount,
            tx_type,
            payment_id,
            referrer_user_id: None,
            created_at: Utc::now(),
            expires_at: None,
            source_tx_id: None,
        };
        self.log
            .append(user_id, LogEntryKind::PointTransaction, &tx)?;
        Ok(tx)
    }

    /// Writes inverse entries for every row that referenced `payment_id`.
    pub fn reverse_by_payment(&mut self, payment_id: &str) -> Result<Vec<PointTransaction>, CoreError> {
        let referencing: Vec<PointTransaction> = self
            .log
            .entries()
            .iter()
            .filter(|e| e.kind == LogEntryKind::PointTransaction)
            .filter_map(|e| serde_json::from_value::<PointTransaction>(e.payload.clone()).ok())
            .filter(|tx| tx.payment_id.as_deref() == Some(payment_id))
            .collect();

        let mut reversed = Vec::with_capacity(referencing.len());
        for tx in referencing {
            let inverse = PointTransaction {
                id: Uuid::new_v4().to_string(),
                user_id: tx.user_id.clone(),
                amount: -tx.amount,
                tx_type: PointTransactionType::Refunded,
                payment_id: tx.payment_id.clone(),
                referrer_user_id: tx.referrer_user_id.clone(),
                created_at: Utc::now(),
                expires_at: None,
                source_tx_id: Some(tx.id.clone()),
            };
            self.log
                .append(&tx.user_id, LogEntryKind::PointTransaction, &inverse)?;
            reversed.push(inverse);
        }
        Ok(reversed)
    }

    /// Periodic sweep: write an inverse `expired` entry for every row whose
    /// `expires_at` has passed and that does not already have one — a
    /// second sweep over the same grant is a no-op. Append-only entries
    /// can't be mutated in place, so "already expired" is determined by
    /// scanning for an `expired` row whose `source_tx_id` points back at
    /// the candidate, not by a flag on the candidate itself.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<Vec<PointTransaction>, CoreError> {
        let all: Vec<PointTransaction> = self
            .log
            .entries()
            .iter()
            .filter(|e| e.kind == LogEntryKind::PointTransaction)
            .filter_map(|e| serde_json::from_value::<PointTransaction>(e.payload.clone()).ok())
            .collect();

        let already_expired: std::collections::HashSet<&str> = all
            .iter()
            .filter(|tx| tx.tx_type == PointTransactionType::Expired)
            .filter_map(|tx| tx.source_tx_id.as_deref())
            .collect();

        let expiring: Vec<&PointTransaction> = all
            .iter()
            .filter(|tx| tx.amount > 0 && !already_expired.contains(tx.id.as_str()))
            .filter(|tx| tx.expires_at.map(|exp| exp < now).unwrap_or(false))
            .collect();

        let mut expired = Vec::with_capacity(expiring.len());
        for tx in expiring {
            let inverse = PointTransaction {
                id: Uuid::new_v4().to_string(),
                user_id: tx.user_id.clone(),
                amount: -tx.amount,
                tx_type: PointTransactionType::Expired,
                payment_id: None,
                referrer_user_id: None,
                created_at: now,
                expires_at: None,
                source_tx_id: Some(tx.id.clone()),
            };
            self.log
                .append(&tx.user_id, LogEntryKind::PointTransaction, &inverse)?;
            expired.push(inverse);
        }
        Ok(expired)
    }

    pub fn summary(&self, user_id: &str, now: DateTime<Utc>) -> PointsSummary {
        let txs = self.transactions_for(user_id);
        let balance = txs.iter().map(|t| t.amount).sum();
        let total_earned = txs.iter().filter(|t| t.amount > 0).map(|t| t.amount).sum();
        let total_spent = txs
            .iter()
            .filter(|t| t.amount < 0 && t.tx_type == PointTransactionType::Spent)
            .map(|t| -t.amount)
            .sum();
        let today_start = now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
        let today_earned = txs
            .iter()
            .filter(|t| t.amount > 0 && t.created_at >= today_start)
            .map(|t| t.amount)
            .sum();
        PointsSummary {
            balance,
            total_earned,
            total_spent,
            today_earned,
        }
    }

    pub fn history(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Vec<PointTransaction> {
        self.transactions_for(user_id)
            .into_iter()
            .filter(|tx| from.map(|f| tx.created_at >= f).unwrap_or(true))
            .filter(|tx| to.map(|t| tx.created_at <= t).unwrap_or(true))
            .collect()
    }

    /// Read-side fallback for historical `earned_referral` rows that lack a
    /// `payment_id`: matches within a configurable window around `paid_at`.
    pub fn fallback_referral_match(
        &self,
        referrer_id: &str,
        paid_at: DateTime<Utc>,
        window: chrono::Duration,
    ) -> Option<PointTransaction> {
        self.transactions_for(referrer_id)
            .into_iter()
            .filter(|tx| tx.tx_type == PointTransactionType::EarnedReferral && tx.payment_id.is_none())
            .find(|tx| (tx.created_at - paid_at).num_seconds().abs() <= window.num_seconds())
    }
}

impl Default for PointLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_then_debit_tracks_balance() {
        let mut ledger = PointLedger::new();
        ledger
            .credit("u1", 1000, PointTransactionType::EarnedPurchase, None, None, None)
            .unwrap();
        assert_eq!(ledger.balance("u1"), 1000);
        ledger
            .debit("u1", 400, PointTransactionType::Spent, Some("pay-1".to_string()))
            .unwrap();
        assert_eq!(ledger.balance("u1"), 600);
    }

    #[test]
    fn debit_beyond_balance_fails() {
        let mut ledger = PointLedger::new();
        ledger
            .credit("u1", 100, PointTransactionType::EarnedPurchase, None, None, None)
            .unwrap();
        let err = ledger
            .debit("u1", 200, PointTransactionType::Spent, None)
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientPoints));
    }

    #[test]
    fn reverse_by_payment_restores_balance() {
        let mut ledger = PointLedger::new();
        ledger
            .credit("u1", 1000, PointTransactionType::EarnedPurchase, None, None, None)
            .unwrap();
        let pre = ledger.balance("u1");
        ledger
            .credit(
                "u2",
                100,
                PointTransactionType::EarnedReferral,
                Some("pay-1".to_string()),
                Some("u1".to_string()),
                None,
            )
            .unwrap();
        ledger.reverse_by_payment("pay-1").unwrap();
        assert_eq!(ledger.balance("u1"), pre);
        assert_eq!(ledger.balance("u2"), 0);
    }

    #[test]
    fn expire_writes_inverse_for_past_expiry() {
        let mut ledger = PointLedger::new();
        let past = Utc::now() - Duration::days(1);
        ledger
            .credit("u1", 500, PointTransactionType::EarnedPurchase, None, None, Some(past))
            .unwrap();
        let expired = ledger.expire(Utc::now()).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(ledger.balance("u1"), 0);
    }

    #[test]
    fn expire_is_idempotent_across_repeated_sweeps() {
        let mut ledger = PointLedger::new();
        let past = Utc::now() - Duration::days(1);
        ledger
            .credit("u1", 500, PointTransactionType::EarnedPurchase, None, None, Some(past))
            .unwrap();

        let first_sweep = ledger.expire(Utc::now()).unwrap();
        assert_eq!(first_sweep.len(), 1);
        assert_eq!(ledger.balance("u1"), 0);

        let second_sweep = ledger.expire(Utc::now()).unwrap();
        assert!(second_sweep.is_empty());
        assert_eq!(ledger.balance("u1"), 0);
    }

    #[test]
    fn balance_never_negative_invariant_enforced_by_debit() {
        let mut ledger = PointLedger::new();
        ledger
            .credit("u1", 50, PointTransactionType::EarnedPurchase, None, None, None)
            .unwrap();
        assert!(ledger.debit("u1", 50, PointTransactionType::Spent, None).is_ok());
        assert_eq!(ledger.balance("u1"), 0);
        assert!(ledger.debit("u1", 1, PointTransactionType::Spent, None).is_err());
    }
}
