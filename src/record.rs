//! Account, book and borrow record models.
//!
//! Text fields carry the capacities of their fixed-width on-disk buffers;
//! [`check_text`] enforces them before any record is created or changed.

use crate::error::{LibraryError, Result};
use crate::money::Money;
use crate::timestamp::Timestamp;
use std::fmt;

/// On-disk buffer sizes. One byte of each is kept for the NUL terminator.
pub const NAME_CAPACITY: usize = 16;
pub const PASSWORD_CAPACITY: usize = 16;
pub const ISBN_CAPACITY: usize = 24;
pub const AUTHOR_CAPACITY: usize = 32;
pub const TITLE_CAPACITY: usize = 64;

/// Identifier of the built-in administrator.
pub const ADMIN_ID: u32 = 1;

/// Account role; decides which operations the access policy grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    #[default]
    Regular,
    Manager,
    Admin,
}

impl Role {
    /// Numeric code used in the ledger file.
    pub fn code(self) -> u32 {
        match self {
            Role::Regular => 0,
            Role::Manager => 1,
            Role::Admin => 2,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Role::Regular),
            1 => Some(Role::Manager),
            2 => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Regular => "regular",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lookup key of an account name (31-bit, djb2 family).
///
/// Bytes are folded in as signed chars so keys stay identical to those in
/// ledger files written by the legacy tool.
pub fn name_key(name: &str) -> u32 {
    let mut hash: u32 = 5381;
    for byte in name.bytes() {
        let c = byte as i8 as i32 as u32;
        hash = hash.wrapping_add((hash << 5).wrapping_add(c));
    }
    hash & 0x7fff_ffff
}

/// Validates a text field against its fixed-width capacity.
pub fn check_text(field: &str, value: &str, capacity: usize) -> Result<()> {
    if value.is_empty() {
        return Err(LibraryError::invalid(format!("{} must not be empty", field)));
    }
    if value.len() >= capacity {
        return Err(LibraryError::invalid(format!(
            "{} must be shorter than {} bytes",
            field, capacity
        )));
    }
    if value.contains('\0') {
        return Err(LibraryError::invalid(format!(
            "{} must not contain NUL characters",
            field
        )));
    }
    Ok(())
}

/// A registered library user.
///
/// # Invariants
///
/// - `key == name_key(&name)`
/// - `balance` may be negative: that is an unpaid late fee, and it blocks
///   new loans until cleared
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Account {
    pub role: Role,
    pub name: String,
    /// Stored in clear text, as the legacy format does.
    pub password: String,
    pub key: u32,
    pub id: u32,
    pub balance: Money,
    pub registered: Timestamp,
}

impl Account {
    pub fn new(id: u32, name: &str, password: &str, role: Role, registered: Timestamp) -> Self {
        Account {
            role,
            name: name.to_string(),
            password: password.to_string(),
            key: name_key(name),
            id,
            balance: Money::ZERO,
            registered,
        }
    }

    /// Returns `true` if this account is the one registered as `name`.
    ///
    /// The precomputed `key` is compared first; the name comparison settles
    /// key collisions.
    pub fn is_named(&self, name: &str, key: u32) -> bool {
        self.key == key && self.name == name
    }

    /// Returns `true` if unpaid fees block borrowing.
    pub fn owes_fees(&self) -> bool {
        self.balance.is_negative()
    }

    /// Adds funds. Returns `false` (unchanged) on overflow.
    pub fn credit(&mut self, amount: Money) -> bool {
        match self.balance.checked_add(amount) {
            Some(balance) => {
                self.balance = balance;
                true
            }
            None => false,
        }
    }

    /// Removes funds; the balance may go negative. Returns `false`
    /// (unchanged) on overflow.
    pub fn debit(&mut self, amount: Money) -> bool {
        match self.balance.checked_sub(amount) {
            Some(balance) => {
                self.balance = balance;
                true
            }
            None => false,
        }
    }
}

/// A title held by the library and the number of copies on the shelf.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Book {
    pub stock: u64,
    pub isbn: String,
    pub author: String,
    pub title: String,
    pub introduced: Timestamp,
}

impl Book {
    pub fn new(isbn: &str, title: &str, author: &str, stock: u64, introduced: Timestamp) -> Self {
        Book {
            stock,
            isbn: isbn.to_string(),
            author: author.to_string(),
            title: title.to_string(),
            introduced,
        }
    }

    /// Returns `true` if `title` and `author` describe this same book.
    pub fn same_edition(&self, title: &str, author: &str) -> bool {
        self.title == title && self.author == author
    }

    /// Takes one copy off the shelf. Returns `false` if none is left.
    pub fn take_copy(&mut self) -> bool {
        if self.stock == 0 {
            return false;
        }
        self.stock -= 1;
        true
    }

    /// Puts one copy back on the shelf.
    pub fn put_back(&mut self) {
        self.stock = self.stock.saturating_add(1);
    }
}

/// Lifecycle state of a [`BorrowRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanState {
    Active,
    Returned,
}

impl fmt::Display for LoanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoanState::Active => f.write_str("active"),
            LoanState::Returned => f.write_str("returned"),
        }
    }
}

/// One loan of one copy of a book.
///
/// `isbn` and `borrower` are back-references resolved by lookup; the book or
/// account they name may have been removed since.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BorrowRecord {
    pub isbn: String,
    pub loan_days: u32,
    pub borrower: u32,
    pub borrowed: Timestamp,
    /// [`Timestamp::UNRETURNED`] while the loan is active.
    pub returned: Timestamp,
}

impl BorrowRecord {
    pub fn new(isbn: &str, borrower: u32, loan_days: u32, borrowed: Timestamp) -> Self {
        BorrowRecord {
            isbn: isbn.to_string(),
            loan_days,
            borrower,
            borrowed,
            returned: Timestamp::UNRETURNED,
        }
    }

    pub fn state(&self) -> LoanState {
        if self.returned.is_unreturned() {
            LoanState::Active
        } else {
            LoanState::Returned
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == LoanState::Active
    }
}
