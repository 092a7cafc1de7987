//! Events — one transaction as seen from the aggregated entity.
//!
//! RULE: Derived columns are computed once, at construction.
//! Nothing downstream of `Event::from_balances` mutates an event.

use crate::types::Step;
use serde::{Deserialize, Serialize};

/// The nine numeric columns every window statistic is computed over.
/// Order is stable: it fixes the layout of every result row and the
/// generated column names. Append only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseColumn {
    OldBalanceOrig,
    NewBalanceOrig,
    OldBalanceDest,
    NewBalanceDest,
    BalanceChngOrig,
    BalanceChngDest,
    BalanceDelta,
    DeltaOrigChngRatio,
    DeltaDestChngRatio,
}

impl BaseColumn {
    pub const COUNT: usize = 9;

    pub const ALL: [BaseColumn; BaseColumn::COUNT] = [
        BaseColumn::OldBalanceOrig,
        BaseColumn::NewBalanceOrig,
        BaseColumn::OldBalanceDest,
        BaseColumn::NewBalanceDest,
        BaseColumn::BalanceChngOrig,
        BaseColumn::BalanceChngDest,
        BaseColumn::BalanceDelta,
        BaseColumn::DeltaOrigChngRatio,
        BaseColumn::DeltaDestChngRatio,
    ];

    /// Column name as it appears in the transaction log and in
    /// generated feature names.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OldBalanceOrig     => "oldbalanceOrg",
            Self::NewBalanceOrig     => "newbalanceOrig",
            Self::OldBalanceDest     => "oldbalanceDest",
            Self::NewBalanceDest     => "newbalanceDest",
            Self::BalanceChngOrig    => "balanceChngOrig",
            Self::BalanceChngDest    => "balanceChngDest",
            Self::BalanceDelta       => "balanceDelta",
            Self::DeltaOrigChngRatio => "delta_orig_chng_ratio",
            Self::DeltaDestChngRatio => "delta_dest_chng_ratio",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// One transaction belonging to an entity.
///
/// Values are `None` when the source cell was blank. Missing raw balances
/// make every derived column that depends on them missing too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub step:   Step,
    pub values: [Option<f64>; BaseColumn::COUNT],
}

impl Event {
    /// Build an event from the four raw balances, deriving the rest.
    /// Division uses plain IEEE-754 semantics: x/0 = ±Inf, 0/0 = NaN.
    pub fn from_balances(
        step: Step,
        old_balance_orig: Option<f64>,
        new_balance_orig: Option<f64>,
        old_balance_dest: Option<f64>,
        new_balance_dest: Option<f64>,
    ) -> Self {
        let chng_orig = new_balance_orig.zip(old_balance_orig).map(|(n, o)| n - o);
        let chng_dest = new_balance_dest.zip(old_balance_dest).map(|(n, o)| n - o);
        let delta = chng_orig.zip(chng_dest).map(|(o, d)| o + d);
        let orig_ratio = delta.zip(chng_orig).map(|(d, o)| d / o);
        let dest_ratio = delta.zip(chng_dest).map(|(d, c)| d / c);

        Self {
            step,
            values: [
                old_balance_orig,
                new_balance_orig,
                old_balance_dest,
                new_balance_dest,
                chng_orig,
                chng_dest,
                delta,
                orig_ratio,
                dest_ratio,
            ],
        }
    }

    pub fn value(&self, column: BaseColumn) -> Option<f64> {
        self.values[column.index()]
    }
}
