//! In-memory ledger: the three record stores and their file lifecycle.
//!
//! The whole file is read into memory on open and rewritten in full on save;
//! nothing is persisted incrementally.

use crate::codec::{self, Header};
use crate::error::{LibraryError, Result};
use crate::record::{name_key, Account, Book, BorrowRecord, Role, ADMIN_ID};
use crate::store::{Handle, RecordStore};
use crate::timestamp::Timestamp;
use log::{debug, info};
use std::fs;
use std::path::Path;

/// Credentials of the administrator seeded into a new ledger.
pub const ADMIN_NAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin";

/// All accounts, books and borrow records.
///
/// # Invariants
///
/// - Account `1` exists and has role [`Role::Admin`]
/// - No two accounts share a name, no two books share an ISBN
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ledger {
    pub accounts: RecordStore<Account>,
    pub books: RecordStore<Book>,
    pub borrows: RecordStore<BorrowRecord>,
}

impl Ledger {
    /// A ledger holding only the built-in administrator.
    pub fn seeded(now: Timestamp) -> Self {
        let mut ledger = Ledger::default();
        ledger.accounts.append(Account::new(
            ADMIN_ID,
            ADMIN_NAME,
            ADMIN_PASSWORD,
            Role::Admin,
            now,
        ));
        ledger
    }

    /// Assembles decoded stores. Account #1 must exist with the admin role.
    pub(crate) fn from_stores(
        accounts: RecordStore<Account>,
        books: RecordStore<Book>,
        borrows: RecordStore<BorrowRecord>,
    ) -> Result<Self> {
        let ledger = Ledger {
            accounts,
            books,
            borrows,
        };
        if !ledger.has_admin() {
            return Err(LibraryError::corrupt(format!(
                "built-in administrator (account #{}) is missing",
                ADMIN_ID
            )));
        }
        Ok(ledger)
    }

    /// Opens the ledger file at `path`, creating a seeded one if it does not
    /// exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            let ledger = Ledger::seeded(Timestamp::now());
            ledger.save(path)?;
            info!("Created new ledger at {}", path.display());
            return Ok(ledger);
        }

        let bytes = fs::read(path)?;
        let ledger = codec::decode(&bytes)?;
        info!(
            "Opened ledger {} ({} accounts, {} books, {} borrow records)",
            path.display(),
            ledger.accounts.len(),
            ledger.books.len(),
            ledger.borrows.len()
        );
        Ok(ledger)
    }

    /// Overwrites the file at `path` with the current state.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = codec::encode(self);
        fs::write(path, &bytes)?;
        debug!("Saved {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    /// Releases the in-memory stores.
    pub fn close(mut self) {
        self.accounts.clear();
        self.books.clear();
        self.borrows.clear();
        debug!("Ledger closed");
    }

    /// Header describing the current contents.
    pub fn header(&self) -> Header {
        Header::current(
            self.accounts.len() as u32,
            self.books.len() as u32,
            self.borrows.len() as u32,
        )
    }

    pub fn account_by_name(&self, name: &str) -> Option<Handle> {
        let key = name_key(name);
        self.accounts.match_first(|a| a.is_named(name, key))
    }

    pub fn account_by_id(&self, id: u32) -> Option<Handle> {
        self.accounts.match_first(|a| a.id == id)
    }

    pub fn book_by_isbn(&self, isbn: &str) -> Option<Handle> {
        self.books.match_first(|b| b.isbn == isbn)
    }

    /// Account with the given identifier, or `AccountIdNotFound`.
    pub fn account(&self, id: u32) -> Result<&Account> {
        self.account_by_id(id)
            .and_then(|h| self.accounts.get(h))
            .ok_or(LibraryError::AccountIdNotFound(id))
    }

    /// Number of books `borrower` has out right now.
    pub fn active_loans(&self, borrower: u32) -> usize {
        self.borrows
            .values()
            .filter(|r| r.borrower == borrower && r.is_active())
            .count()
    }

    /// Active loans of `borrower` in insertion order.
    pub fn active_loan_handles(&self, borrower: u32) -> Vec<Handle> {
        self.borrows
            .iter()
            .filter(|(_, r)| r.borrower == borrower && r.is_active())
            .map(|(h, _)| h)
            .collect()
    }

    /// Identifier for a newly registered account.
    ///
    /// Borrow records are scanned too, so an identifier that appears in the
    /// loan history of a removed account is never handed out again.
    pub fn next_account_id(&self) -> Result<u32> {
        let highest = self
            .accounts
            .values()
            .map(|a| a.id)
            .chain(self.borrows.values().map(|r| r.borrower))
            .max()
            .unwrap_or(ADMIN_ID);
        highest
            .max(ADMIN_ID)
            .checked_add(1)
            .ok_or_else(|| LibraryError::invalid("account identifiers exhausted"))
    }

    fn has_admin(&self) -> bool {
        self.account_by_id(ADMIN_ID)
            .and_then(|h| self.accounts.get(h))
            .map(|a| a.role == Role::Admin)
            .unwrap_or(false)
    }
}
