//! CSV listings of books, loans and accounts.
//!
//! Rows are written in ledger (insertion) order so output is deterministic.

use crate::error::Result;
use crate::ledger::Ledger;
use crate::money::Money;
use crate::record::{Account, Book, BorrowRecord};
use crate::timestamp::Timestamp;
use serde::Serialize;
use std::io::Write;

/// One row of a book listing.
#[derive(Debug, Serialize)]
pub struct BookRow<'a> {
    pub isbn: &'a str,
    pub title: &'a str,
    pub author: &'a str,
    pub stock: u64,
    pub introduced: Timestamp,
}

impl<'a> From<&'a Book> for BookRow<'a> {
    fn from(book: &'a Book) -> Self {
        BookRow {
            isbn: &book.isbn,
            title: &book.title,
            author: &book.author,
            stock: book.stock,
            introduced: book.introduced,
        }
    }
}

/// One row of a loan listing, with back-references resolved.
///
/// `index` is the 1-based position used to select the loan for returning.
#[derive(Debug, Serialize)]
pub struct LoanRow<'a> {
    pub index: usize,
    pub isbn: &'a str,
    pub title: &'a str,
    pub author: &'a str,
    pub borrower: &'a str,
    pub loan_days: u32,
    pub borrowed: Timestamp,
    pub returned: Timestamp,
    pub state: String,
}

impl<'a> LoanRow<'a> {
    /// Builds a row; a missing book or account shows up as empty fields.
    pub fn resolve(ledger: &'a Ledger, index: usize, record: &'a BorrowRecord) -> Self {
        let book = ledger
            .book_by_isbn(&record.isbn)
            .and_then(|h| ledger.books.get(h));
        let borrower = ledger
            .account_by_id(record.borrower)
            .and_then(|h| ledger.accounts.get(h));

        LoanRow {
            index,
            isbn: &record.isbn,
            title: book.map(|b| b.title.as_str()).unwrap_or(""),
            author: book.map(|b| b.author.as_str()).unwrap_or(""),
            borrower: borrower.map(|a| a.name.as_str()).unwrap_or(""),
            loan_days: record.loan_days,
            borrowed: record.borrowed,
            returned: record.returned,
            state: record.state().to_string(),
        }
    }
}

/// One row of the administrator's account listing.
#[derive(Debug, Serialize)]
pub struct AccountRow<'a> {
    pub id: u32,
    pub name: &'a str,
    pub role: &'static str,
    pub balance: Money,
    pub active_loans: usize,
    pub registered: Timestamp,
}

pub fn write_books<'a, W, I>(writer: W, books: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a Book>,
{
    let mut csv_writer = csv::Writer::from_writer(writer);
    for book in books {
        csv_writer.serialize(BookRow::from(book))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_loans<W: Write>(writer: W, rows: &[LoanRow<'_>]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_accounts<'a, W, I>(writer: W, ledger: &Ledger, accounts: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a Account>,
{
    let mut csv_writer = csv::Writer::from_writer(writer);
    for account in accounts {
        csv_writer.serialize(AccountRow {
            id: account.id,
            name: &account.name,
            role: account.role.as_str(),
            balance: account.balance,
            active_loans: ledger.active_loans(account.id),
            registered: account.registered,
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}
