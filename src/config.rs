//! Runtime configuration.

use crate::circulation::DEFAULT_FEE_PER_DAY;
use crate::money::Money;
use std::path::{Path, PathBuf};

/// File name of the ledger inside the root directory.
pub const LEDGER_FILE_NAME: &str = "librecords.db";

/// Password an administrator reset assigns.
///
/// A fixed, publicly known value: callers should prompt the user to change
/// it after logging in.
pub const DEFAULT_RESET_PASSWORD: &str = "123456";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding the ledger file.
    pub root: PathBuf,
    /// Late fee charged per overdue day.
    pub fee_per_day: Money,
    /// Password assigned by an administrator reset.
    pub reset_password: String,
}

impl Config {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Config {
            root: root.into(),
            fee_per_day: DEFAULT_FEE_PER_DAY,
            reset_password: DEFAULT_RESET_PASSWORD.to_string(),
        }
    }

    pub fn with_fee_per_day(mut self, fee_per_day: Money) -> Self {
        self.fee_per_day = fee_per_day;
        self
    }

    /// Full path of the ledger file.
    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(LEDGER_FILE_NAME)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for Config {
    /// Ledger in the current working directory.
    fn default() -> Self {
        Config::new(".")
    }
}
