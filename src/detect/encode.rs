//! Dense integer codes for the nominal grouping-key columns.
//!
//! Encoders are fitted fresh on every batch; codes are only meaningful
//! within the batch that produced them.

use std::collections::{BTreeSet, HashMap};

use crate::ingest::ReconciliationRecord;

/// Maps each distinct value of one column to a code in `[0, len)`,
/// assigned in lexicographic order.
#[derive(Debug, Clone, Default)]
pub struct CategoricalEncoder {
    codes: HashMap<String, u32>,
}

impl CategoricalEncoder {
    pub fn fit<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let distinct: BTreeSet<&str> = values.into_iter().collect();
        let codes = distinct
            .into_iter()
            .enumerate()
            .map(|(code, value)| (value.to_string(), code as u32))
            .collect();
        Self { codes }
    }

    /// Code for `value`, or `None` if it was not seen during fitting.
    pub fn code(&self, value: &str) -> Option<u32> {
        self.codes.get(value).copied()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Encoded grouping key of one row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupCodes {
    pub account: u32,
    pub primary_account: u32,
    pub secondary_account: u32,
    pub au: u32,
}

/// One independent encoder per grouping-key column.
#[derive(Debug, Clone, Default)]
pub struct GroupEncoders {
    pub account: CategoricalEncoder,
    pub primary_account: CategoricalEncoder,
    pub secondary_account: CategoricalEncoder,
    pub au: CategoricalEncoder,
}

impl GroupEncoders {
    pub fn fit<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a ReconciliationRecord> + Clone,
    {
        Self {
            account: CategoricalEncoder::fit(records.clone().into_iter().map(|r| r.account.as_str())),
            primary_account: CategoricalEncoder::fit(
                records.clone().into_iter().map(|r| r.primary_account.as_str()),
            ),
            secondary_account: CategoricalEncoder::fit(
                records.clone().into_iter().map(|r| r.secondary_account.as_str()),
            ),
            au: CategoricalEncoder::fit(records.into_iter().map(|r| r.au.as_str())),
        }
    }

    /// Fit on `records` and return the codes of each record, in input order.
    pub fn fit_transform(records: &[ReconciliationRecord]) -> (Self, Vec<GroupCodes>) {
        let encoders = Self::fit(records);
        // Every value below was seen by `fit`.
        let codes = records
            .iter()
            .map(|r| GroupCodes {
                account: encoders.account.codes[r.account.as_str()],
                primary_account: encoders.primary_account.codes[r.primary_account.as_str()],
                secondary_account: encoders.secondary_account.codes[r.secondary_account.as_str()],
                au: encoders.au.codes[r.au.as_str()],
            })
            .collect();
        (encoders, codes)
    }
}
