//! Borrow/return workflow and account cancellation.
//!
//! A borrow record moves from `Active` to `Returned` exactly once. Every
//! precondition is checked before the first mutation, so a refused operation
//! leaves the ledger untouched.

use crate::error::{LibraryError, Result};
use crate::ledger::Ledger;
use crate::money::Money;
use crate::policy::{self, Permission};
use crate::record::{Account, BorrowRecord, ADMIN_ID};
use crate::store::Handle;
use crate::timestamp::Timestamp;
use log::{debug, info, warn};

/// Late fee charged per overdue day: 0.30 in minor units.
pub const DEFAULT_FEE_PER_DAY: Money = Money::from_minor(30);

/// Outcome of a successful return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnReceipt {
    pub isbn: String,
    pub borrower: u32,
    /// Whole days between borrowing and returning.
    pub elapsed_days: i64,
    /// Days past the agreed loan duration; zero when on time.
    pub overdue_days: i64,
    pub fee: Money,
    /// Borrower balance after the fee was charged.
    pub balance: Money,
}

impl ReturnReceipt {
    pub fn is_late(&self) -> bool {
        self.overdue_days > 0
    }
}

/// Applies borrow, return and cancellation rules to a [`Ledger`].
///
/// Holds no ledger state itself; the ledger, the acting account and the
/// current time are passed into every operation.
#[derive(Debug, Clone, Copy)]
pub struct CirculationEngine {
    fee_per_day: Money,
}

impl CirculationEngine {
    pub fn new(fee_per_day: Money) -> Self {
        CirculationEngine { fee_per_day }
    }

    pub fn fee_per_day(&self) -> Money {
        self.fee_per_day
    }

    /// Overdue days and fee for a loan of `loan_days` kept `elapsed_days`.
    pub fn late_fee(&self, loan_days: u32, elapsed_days: i64) -> Result<(i64, Money)> {
        let overdue = elapsed_days - i64::from(loan_days);
        if overdue <= 0 {
            return Ok((0, Money::ZERO));
        }
        let fee = self
            .fee_per_day
            .checked_mul(overdue)
            .ok_or_else(|| LibraryError::invalid(format!("late fee for {} days overflows", overdue)))?;
        Ok((overdue, fee))
    }

    /// Lends one copy of `isbn` to `actor_id` for `days` days.
    ///
    /// Checked in order: borrow permission, non-negative balance, book
    /// exists, copy on the shelf, positive duration.
    pub fn borrow(
        &self,
        ledger: &mut Ledger,
        actor_id: u32,
        isbn: &str,
        days: i64,
        now: Timestamp,
    ) -> Result<Handle> {
        let actor = ledger.account(actor_id)?;
        policy::ensure_access(actor.role, Permission::BORROW)?;
        if actor.owes_fees() {
            debug!("Account #{} blocked from borrowing, balance {}", actor_id, actor.balance);
            return Err(LibraryError::NegativeBalance(actor.balance));
        }

        let book_handle = ledger
            .book_by_isbn(isbn)
            .ok_or_else(|| LibraryError::BookNotFound(isbn.to_string()))?;
        let in_stock = ledger
            .books
            .get(book_handle)
            .map(|b| b.stock > 0)
            .unwrap_or(false);
        if !in_stock {
            return Err(LibraryError::OutOfStock(isbn.to_string()));
        }

        let loan_days = u32::try_from(days)
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| LibraryError::invalid(format!("loan duration {} is not a positive number of days", days)))?;

        if let Some(book) = ledger.books.get_mut(book_handle) {
            book.take_copy();
        }
        let handle = ledger
            .borrows
            .append(BorrowRecord::new(isbn, actor_id, loan_days, now));

        info!(
            "Account #{} borrowed '{}' for {} day(s)",
            actor_id, isbn, loan_days
        );
        Ok(handle)
    }

    /// Returns the loan `record` on behalf of `actor_id`.
    ///
    /// Non-privileged actors may only return their own loans; actors holding
    /// `WITHDRAW_RECORD` may return anyone's. A record that is already
    /// returned is refused without charging or restocking again.
    pub fn return_record(
        &self,
        ledger: &mut Ledger,
        actor_id: u32,
        record: Handle,
        now: Timestamp,
    ) -> Result<ReturnReceipt> {
        let role = ledger.account(actor_id)?.role;
        policy::ensure_access(role, Permission::RETURN)?;

        let loan = ledger
            .borrows
            .get(record)
            .ok_or_else(|| LibraryError::RecordNotFound("selected".to_string()))?;
        if !loan.is_active() {
            return Err(LibraryError::AlreadyReturned(loan.isbn.clone()));
        }
        if loan.borrower != actor_id {
            policy::ensure_access(role, Permission::WITHDRAW_RECORD)?;
        }

        let elapsed_days = loan.borrowed.whole_days_until(&now).ok_or_else(|| {
            LibraryError::corrupt(format!("borrow record for '{}' has an invalid date", loan.isbn))
        })?;
        let (overdue_days, fee) = self.late_fee(loan.loan_days, elapsed_days)?;
        let isbn = loan.isbn.clone();
        let borrower_id = loan.borrower;

        let borrower_handle = ledger
            .account_by_id(borrower_id)
            .ok_or(LibraryError::AccountIdNotFound(borrower_id))?;
        let book_handle = ledger
            .book_by_isbn(&isbn)
            .ok_or_else(|| LibraryError::BookNotFound(isbn.clone()))?;
        let balance = ledger
            .accounts
            .get(borrower_handle)
            .and_then(|a| a.balance.checked_sub(fee))
            .ok_or_else(|| LibraryError::invalid("late fee overflows the borrower balance"))?;

        if let Some(loan) = ledger.borrows.get_mut(record) {
            loan.returned = now;
        }
        if let Some(borrower) = ledger.accounts.get_mut(borrower_handle) {
            borrower.debit(fee);
        }
        if let Some(book) = ledger.books.get_mut(book_handle) {
            book.put_back();
        }

        if overdue_days > 0 {
            info!(
                "Account #{} returned '{}' {} day(s) late, charged {}",
                borrower_id, isbn, overdue_days, fee
            );
            if balance.is_negative() {
                warn!(
                    "Account #{} balance is {}; borrowing suspended until paid",
                    borrower_id, balance
                );
            }
        } else {
            info!("Account #{} returned '{}' on time", borrower_id, isbn);
        }

        Ok(ReturnReceipt {
            isbn,
            borrower: borrower_id,
            elapsed_days,
            overdue_days,
            fee,
            balance,
        })
    }

    /// Removes account `target_id` at the request of `actor_id`.
    ///
    /// The built-in administrator is never removable. Anyone else must have
    /// no books out and no unpaid fees. Removing an account other than one's
    /// own requires account administration rights.
    pub fn cancel_account(
        &self,
        ledger: &mut Ledger,
        actor_id: u32,
        target_id: u32,
    ) -> Result<Account> {
        if target_id == ADMIN_ID {
            return Err(LibraryError::ProtectedAccount(target_id));
        }

        let role = ledger.account(actor_id)?.role;
        policy::ensure_access(role, Permission::CANCEL_ACCOUNT)?;
        if target_id != actor_id {
            policy::ensure_account_admin(role)?;
        }

        let handle = ledger
            .account_by_id(target_id)
            .ok_or(LibraryError::AccountIdNotFound(target_id))?;
        let count = ledger.active_loans(target_id);
        if count > 0 {
            return Err(LibraryError::OutstandingLoans {
                id: target_id,
                count,
            });
        }
        let target = ledger
            .accounts
            .get(handle)
            .cloned()
            .ok_or(LibraryError::AccountIdNotFound(target_id))?;
        if target.owes_fees() {
            return Err(LibraryError::OutstandingFees {
                id: target_id,
                balance: target.balance,
            });
        }

        ledger.accounts.erase(handle);
        info!("Account #{} ('{}') cancelled", target_id, target.name);
        Ok(target)
    }
}

impl Default for CirculationEngine {
    fn default() -> Self {
        Self::new(DEFAULT_FEE_PER_DAY)
    }
}
