//! Test fixtures: a small account ledger model with a command set that
//! can succeed, abort, fail after mutating, or panic.

use crate::command::{Command, CommandError, Context, Query};
use crate::model::Model;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Barrier};

/// Which lifecycle hooks have fired on this instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Hooks {
    pub snapshot_restored: bool,
    pub journal_restored: bool,
    pub starting: bool,
}

/// Account ledger used as the model under test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Ledger {
    pub accounts: BTreeMap<String, i64>,
    /// Shared handle, for observing reference identity across the
    /// engine boundary.
    pub motto: Arc<String>,
    /// Timestamp of the last applied command, for replay determinism.
    pub applied_at: u64,
    #[serde(skip)]
    pub hooks: Hooks,
}

impl Ledger {
    pub fn balance(&self, account: &str) -> i64 {
        self.accounts.get(account).copied().unwrap_or(0)
    }

    pub fn total(&self) -> i64 {
        self.accounts.values().sum()
    }
}

impl Model for Ledger {
    fn snapshot_restored(&mut self) {
        self.hooks.snapshot_restored = true;
    }

    fn journal_restored(&mut self) {
        self.hooks.journal_restored = true;
    }

    fn starting(&mut self) {
        self.hooks.starting = true;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum LedgerCommand {
    /// Creates an account with a zero balance.
    Open { account: String },
    /// Adds to an account balance.
    Deposit { account: String, amount: i64 },
    /// Subtracts from an account balance; aborts when insufficient.
    Withdraw { account: String, amount: i64 },
    /// Replaces the shared motto.
    SetMotto { motto: String },
    /// Mutates the account, then reports an unexpected failure.
    FailAfterDeposit { account: String, amount: i64 },
    /// Mutates the account, then panics.
    PanicAfterDeposit { account: String },
}

pub(crate) fn open(account: &str) -> LedgerCommand {
    LedgerCommand::Open {
        account: account.into(),
    }
}

pub(crate) fn deposit(account: &str, amount: i64) -> LedgerCommand {
    LedgerCommand::Deposit {
        account: account.into(),
        amount,
    }
}

pub(crate) fn withdraw(account: &str, amount: i64) -> LedgerCommand {
    LedgerCommand::Withdraw {
        account: account.into(),
        amount,
    }
}

impl Command<Ledger> for LedgerCommand {
    type Output = i64;

    fn prepare(&self, model: &Ledger, _ctx: &Context) -> Result<(), CommandError> {
        match self {
            Self::Withdraw { account, .. } if !model.accounts.contains_key(account) => {
                Err(CommandError::abort(format!("no such account: {account}")))
            }
            _ => Ok(()),
        }
    }

    fn execute(&self, model: &mut Ledger, ctx: &Context) -> Result<i64, CommandError> {
        model.applied_at = ctx.timestamp;
        match self {
            Self::Open { account } => {
                model.accounts.insert(account.clone(), 0);
                Ok(0)
            }
            Self::Deposit { account, amount } => {
                let balance = model.accounts.entry(account.clone()).or_insert(0);
                *balance += amount;
                Ok(*balance)
            }
            Self::Withdraw { account, amount } => {
                let balance = model.accounts.entry(account.clone()).or_insert(0);
                if *balance < *amount {
                    return Err(CommandError::abort(format!(
                        "insufficient balance in {account}"
                    )));
                }
                *balance -= amount;
                Ok(*balance)
            }
            Self::SetMotto { motto } => {
                model.motto = Arc::new(motto.clone());
                Ok(0)
            }
            Self::FailAfterDeposit { account, amount } => {
                *model.accounts.entry(account.clone()).or_insert(0) += amount;
                Err(CommandError::failed("disk on fire"))
            }
            Self::PanicAfterDeposit { account } => {
                *model.accounts.entry(account.clone()).or_insert(0) += 1;
                panic!("ledger invariant violated");
            }
        }
    }
}

/// Returns an account balance; aborts for unknown accounts.
pub(crate) struct BalanceQuery {
    pub account: String,
}

impl Query<Ledger> for BalanceQuery {
    type Output = i64;

    fn query(&self, model: &Ledger, _ctx: &Context) -> Result<i64, CommandError> {
        model
            .accounts
            .get(&self.account)
            .copied()
            .ok_or_else(|| CommandError::abort(format!("no such account: {}", self.account)))
    }
}

/// Returns the shared motto handle, exposing reference identity.
pub(crate) struct MottoQuery;

impl Query<Ledger> for MottoQuery {
    type Output = Arc<String>;

    fn query(&self, model: &Ledger, _ctx: &Context) -> Result<Arc<String>, CommandError> {
        Ok(Arc::clone(&model.motto))
    }
}

/// Reports which lifecycle hooks have fired on the live model.
pub(crate) struct HooksQuery;

impl Query<Ledger> for HooksQuery {
    type Output = Hooks;

    fn query(&self, model: &Ledger, _ctx: &Context) -> Result<Hooks, CommandError> {
        Ok(model.hooks)
    }
}

/// Reads the ledger total twice around a pair of rendezvous points, so
/// a test can commit a concurrent command between the reads and assert
/// what view the query observes for its whole duration.
pub(crate) struct GatedTotalQuery {
    pub entered: Arc<Barrier>,
    pub resume: Arc<Barrier>,
}

impl Query<Ledger> for GatedTotalQuery {
    type Output = (i64, i64);

    fn query(&self, model: &Ledger, _ctx: &Context) -> Result<(i64, i64), CommandError> {
        let before = model.total();
        self.entered.wait();
        self.resume.wait();
        Ok((before, model.total()))
    }
}
