//! # libsys
//!
//! A single-user library management core: accounts with roles and
//! balances, a book catalogue with stock counts, and borrow records with
//! late fees, all persisted to one fixed-layout binary ledger file.
//!
//! ## Design Principles
//!
//! - **Validate, then mutate**: every precondition is checked before any
//!   record changes, so a refused operation leaves the ledger untouched
//! - **Exact money**: balances are integer minor units, parsed and printed
//!   through `rust_decimal`
//! - **Stable handles**: records live in a generational arena, so a stale
//!   handle is detected instead of aliasing a reused slot
//! - **Legacy-compatible storage**: the ledger file keeps the byte layout
//!   of earlier releases
//!
//! ## Example
//!
//! ```no_run
//! use libsys::{Config, Library};
//!
//! let mut library = Library::open_or_create(Config::new(".")).unwrap();
//! library.login("admin", "admin").unwrap();
//! library.add_book("978-0", "Dune", "Herbert", 2).unwrap();
//! library.shutdown().unwrap();
//! ```

pub mod circulation;
pub mod codec;
pub mod config;
pub mod error;
pub mod import;
pub mod ledger;
pub mod library;
pub mod money;
pub mod policy;
pub mod record;
pub mod report;
pub mod store;
pub mod timestamp;

pub use circulation::{CirculationEngine, ReturnReceipt};
pub use config::Config;
pub use error::{ErrorKind, LibraryError, Result};
pub use import::ImportSummary;
pub use ledger::Ledger;
pub use library::{AddBookOutcome, BookQuery, Library, Profile, Session};
pub use money::Money;
pub use policy::Permission;
pub use record::{Account, Book, BorrowRecord, LoanState, Role};
pub use store::{Handle, RecordStore};
pub use timestamp::Timestamp;
