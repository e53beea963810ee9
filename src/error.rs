// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Domain errors raised by ledger mutations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Plan {plan_id} is locked until {unlock_date}")]
    StillLocked {
        plan_id: i64,
        unlock_date: DateTime<Utc>,
    },

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Investment plan not found: {0}")]
    PlanNotFound(i64),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(i64),

    /// The row changed between the read and the guarded write.
    #[error("Concurrent modification of {0}; retry the operation")]
    ConcurrentModification(String),

    #[error("Price oracle unavailable for {symbol}: {reason}")]
    OracleUnavailable { symbol: String, reason: String },

    #[error("{entity} does not belong to user {user_id}")]
    NotOwner { entity: String, user_id: String },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Investment plan {0} is already completed")]
    PlanCompleted(i64),

    #[error("Transaction {id} is already {status}")]
    TransactionNotPending { id: i64, status: String },

    #[error("Transaction {id} is a {actual}, expected {expected}")]
    WrongTransactionType {
        id: i64,
        expected: String,
        actual: String,
    },

    #[error("Cannot swap {0} into itself")]
    SameAsset(String),

    #[error("Corrupt value '{value}' in {column}")]
    Corrupt { column: String, value: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl EngineError {
    /// True for failures a caller may resolve by simply retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::ConcurrentModification(_) | EngineError::OracleUnavailable { .. }
        ) || matches!(
            self,
            EngineError::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::DatabaseBusy
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
