//! Error types for the library core.

use crate::money::Money;
use thiserror::Error;

/// Result type alias for library operations
pub type Result<T> = std::result::Result<T, LibraryError>;

/// Coarse classification of a [`LibraryError`], used by callers that only
/// need to know which class of refusal occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    PermissionDenied,
    InvalidInput,
    StateViolation,
    BalanceViolation,
    PersistenceFailure,
}

/// Errors that can occur during library operation.
///
/// Every variant is recoverable at the operation boundary; none of them
/// leaves the ledger partially mutated.
#[derive(Error, Debug)]
pub enum LibraryError {
    /// No account with the given name
    #[error("Account '{0}' does not exist")]
    AccountNotFound(String),

    /// No account with the given identifier
    #[error("Account #{0} does not exist")]
    AccountIdNotFound(u32),

    /// No book with the given ISBN
    #[error("Book with ISBN '{0}' does not exist")]
    BookNotFound(String),

    /// Borrow record selector points at nothing
    #[error("Borrow record {0} does not exist")]
    RecordNotFound(String),

    /// Account name already registered
    #[error("Account '{0}' already exists")]
    AccountExists(String),

    /// ISBN reused with a different title or author
    #[error("ISBN '{isbn}' is already registered as \"{title}\" by {author}")]
    IsbnConflict {
        isbn: String,
        title: String,
        author: String,
    },

    /// Access policy refused the operation
    #[error("{operation} is not available to {role} accounts")]
    PermissionDenied { role: String, operation: String },

    /// Operation needs a logged-in session
    #[error("Not logged in")]
    NotLoggedIn,

    /// Wrong password for an existing account
    #[error("Wrong password for account '{0}'")]
    InvalidCredentials(String),

    /// Malformed or out-of-range input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Book exists but every copy is lent out
    #[error("Book with ISBN '{0}' is out of stock")]
    OutOfStock(String),

    /// Second return of the same borrow record
    #[error("Borrow record for ISBN '{0}' has already been returned")]
    AlreadyReturned(String),

    /// The seeded administrator can never be removed or reset
    #[error("Account #{0} is the built-in administrator and is protected")]
    ProtectedAccount(u32),

    /// Account still has books out
    #[error("Account #{id} still has {count} unreturned book(s)")]
    OutstandingLoans { id: u32, count: usize },

    /// Account still owes late fees
    #[error("Account #{id} has unpaid late fees (balance {balance})")]
    OutstandingFees { id: u32, balance: Money },

    /// Negative balance blocks new loans
    #[error("Borrowing is suspended until late fees are paid (balance {0})")]
    NegativeBalance(Money),

    /// Failed to open, create, read or write the ledger file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ledger file content does not match its header
    #[error("Corrupt ledger file: {0}")]
    Corrupt(String),

    /// CSV reading or writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl LibraryError {
    /// Returns the refusal class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LibraryError::AccountNotFound(_)
            | LibraryError::AccountIdNotFound(_)
            | LibraryError::BookNotFound(_)
            | LibraryError::RecordNotFound(_) => ErrorKind::NotFound,
            LibraryError::AccountExists(_) | LibraryError::IsbnConflict { .. } => {
                ErrorKind::Conflict
            }
            LibraryError::PermissionDenied { .. }
            | LibraryError::NotLoggedIn
            | LibraryError::InvalidCredentials(_) => ErrorKind::PermissionDenied,
            LibraryError::InvalidInput(_) | LibraryError::OutOfStock(_) => {
                ErrorKind::InvalidInput
            }
            LibraryError::AlreadyReturned(_)
            | LibraryError::ProtectedAccount(_)
            | LibraryError::OutstandingLoans { .. }
            | LibraryError::OutstandingFees { .. } => ErrorKind::StateViolation,
            LibraryError::NegativeBalance(_) => ErrorKind::BalanceViolation,
            LibraryError::Io(_) | LibraryError::Corrupt(_) | LibraryError::Csv(_) => {
                ErrorKind::PersistenceFailure
            }
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        LibraryError::InvalidInput(message.into())
    }

    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        LibraryError::Corrupt(message.into())
    }
}
