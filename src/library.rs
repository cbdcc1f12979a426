//! Library service facade.
//!
//! Owns the ledger, the single login session and the ledger path, and
//! exposes every user-facing operation. Each operation resolves the session
//! account, runs the access policy, then mutates the ledger in memory; the
//! file is only written by [`Library::save`] and [`Library::shutdown`].

use crate::circulation::{CirculationEngine, ReturnReceipt};
use crate::config::Config;
use crate::error::{LibraryError, Result};
use crate::import::{BookImportRecord, ImportSummary, NewBook};
use crate::ledger::Ledger;
use crate::money::Money;
use crate::policy::{self, Permission};
use crate::record::{
    check_text, Account, Book, BorrowRecord, Role, ADMIN_ID, AUTHOR_CAPACITY, ISBN_CAPACITY,
    NAME_CAPACITY, PASSWORD_CAPACITY, TITLE_CAPACITY,
};
use crate::report::LoanRow;
use crate::store::Handle;
use crate::timestamp::Timestamp;
use csv::{ReaderBuilder, Trim};
use log::{debug, info, warn};
use std::io::Read;
use std::str::FromStr;

/// The logged-in account and when it logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub account_id: u32,
    pub established: Timestamp,
}

/// Summary of the session account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: u32,
    pub name: String,
    pub role: Role,
    pub balance: Money,
    pub active_loans: usize,
    pub registered: Timestamp,
    pub logged_in: Timestamp,
}

/// How a book search matches.
#[derive(Debug, Clone, Copy)]
pub enum BookQuery<'a> {
    /// Exact ISBN; a miss is `NotFound`.
    Isbn(&'a str),
    /// Substring of the title.
    Title(&'a str),
    /// Substring of the author.
    Author(&'a str),
}

/// Result of adding copies of a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddBookOutcome {
    /// A new title was introduced with this many copies.
    Added { stock: u64 },
    /// Copies were added to an existing title.
    Restocked { stock: u64 },
}

/// The library service.
///
/// At most one session is open at a time; logging in replaces the previous
/// session.
pub struct Library {
    config: Config,
    ledger: Ledger,
    engine: CirculationEngine,
    session: Option<Session>,
}

impl Library {
    /// Opens the ledger under `config.root`, creating it on first run.
    pub fn open_or_create(config: Config) -> Result<Self> {
        let ledger = Ledger::open(&config.ledger_path())?;
        Ok(Library::with_ledger(config, ledger))
    }

    /// Wraps an already loaded ledger.
    pub fn with_ledger(config: Config, ledger: Ledger) -> Self {
        let engine = CirculationEngine::new(config.fee_per_day);
        Library {
            config,
            ledger,
            engine,
            session: None,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Writes the ledger file.
    pub fn save(&self) -> Result<()> {
        self.ledger.save(&self.config.ledger_path())
    }

    /// Saves and releases the ledger.
    pub fn shutdown(self) -> Result<()> {
        self.save()?;
        self.ledger.close();
        info!("Library shut down");
        Ok(())
    }

    // ---- accounts and sessions ----

    /// Registers a regular account. Needs no session.
    pub fn register(&mut self, name: &str, password: &str) -> Result<Account> {
        check_text("account name", name, NAME_CAPACITY)?;
        check_text("password", password, PASSWORD_CAPACITY)?;
        if self.ledger.account_by_name(name).is_some() {
            return Err(LibraryError::AccountExists(name.to_string()));
        }

        let id = self.ledger.next_account_id()?;
        let account = Account::new(id, name, password, Role::Regular, Timestamp::now());
        self.ledger.accounts.append(account.clone());
        info!("Registered account #{} '{}'", id, name);
        Ok(account)
    }

    /// Authenticates and opens a session, ending any previous one.
    pub fn login(&mut self, name: &str, password: &str) -> Result<&Session> {
        let account = self
            .ledger
            .account_by_name(name)
            .and_then(|h| self.ledger.accounts.get(h))
            .ok_or_else(|| LibraryError::AccountNotFound(name.to_string()))?;
        if account.password != password {
            debug!("Rejected login for '{}'", name);
            return Err(LibraryError::InvalidCredentials(name.to_string()));
        }

        let account_id = account.id;
        if let Some(previous) = self.session.take() {
            debug!("Ending session of account #{}", previous.account_id);
        }
        info!("Account #{} '{}' logged in", account_id, name);
        Ok(&*self.session.insert(Session {
            account_id,
            established: Timestamp::now(),
        }))
    }

    pub fn logout(&mut self) -> Option<Session> {
        let session = self.session.take();
        if let Some(s) = &session {
            debug!("Account #{} logged out", s.account_id);
        }
        session
    }

    /// Account behind the current session.
    pub fn current_account(&self) -> Result<&Account> {
        let session = self.session.as_ref().ok_or(LibraryError::NotLoggedIn)?;
        self.ledger.account(session.account_id)
    }

    pub fn profile(&self) -> Result<Profile> {
        let account = self.current_account()?;
        let logged_in = self
            .session
            .as_ref()
            .map(|s| s.established)
            .unwrap_or_default();
        Ok(Profile {
            id: account.id,
            name: account.name.clone(),
            role: account.role,
            balance: account.balance,
            active_loans: self.ledger.active_loans(account.id),
            registered: account.registered,
            logged_in,
        })
    }

    /// Adds funds to the session account; returns the new balance.
    pub fn recharge(&mut self, amount: &str) -> Result<Money> {
        let (id, role) = self.actor()?;
        policy::ensure_access(role, Permission::RECHARGE)?;
        let amount = positive_amount(amount)?;

        let account = self.account_mut(id)?;
        if !account.credit(amount) {
            return Err(LibraryError::invalid("balance would overflow"));
        }
        let balance = account.balance;
        info!("Account #{} recharged {}, balance {}", id, amount, balance);
        Ok(balance)
    }

    /// Cancels the session account and ends the session.
    pub fn cancel_account(&mut self) -> Result<Account> {
        let (id, _) = self.actor()?;
        let removed = self.engine.cancel_account(&mut self.ledger, id, id)?;
        self.session = None;
        Ok(removed)
    }

    // ---- account administration ----

    pub fn accounts(&self) -> Result<Vec<&Account>> {
        self.ensure_admin()?;
        Ok(self.ledger.accounts.values().collect())
    }

    /// Identifier of the account registered as `name`.
    pub fn find_account(&self, name: &str) -> Result<u32> {
        self.ensure_admin()?;
        self.ledger
            .account_by_name(name)
            .and_then(|h| self.ledger.accounts.get(h))
            .map(|a| a.id)
            .ok_or_else(|| LibraryError::AccountNotFound(name.to_string()))
    }

    /// Resets the password of account `id` to the configured default.
    pub fn reset_password(&mut self, id: u32) -> Result<()> {
        self.ensure_admin()?;
        if self.ledger.account_by_id(id).is_none() {
            return Err(LibraryError::AccountIdNotFound(id));
        }
        if id == ADMIN_ID {
            return Err(LibraryError::ProtectedAccount(id));
        }

        let password = self.config.reset_password.clone();
        self.account_mut(id)?.password = password;
        warn!("Password of account #{} reset to the default", id);
        Ok(())
    }

    /// Removes another account. The session account cannot remove itself
    /// this way; it uses [`Library::cancel_account`].
    pub fn remove_account(&mut self, id: u32) -> Result<Account> {
        let (actor, _) = self.ensure_admin()?;
        if id == actor {
            return Err(LibraryError::invalid(
                "the logged-in account cannot remove itself",
            ));
        }
        self.engine.cancel_account(&mut self.ledger, actor, id)
    }

    /// Charges a positive amount to account `id`; returns its new balance.
    pub fn deduct(&mut self, id: u32, amount: &str) -> Result<Money> {
        let (_, role) = self.ensure_admin()?;
        policy::ensure_access(role, Permission::DEDUCT)?;
        let amount = positive_amount(amount)?;

        let account = self.account_mut(id)?;
        if !account.debit(amount) {
            return Err(LibraryError::invalid("balance would overflow"));
        }
        let balance = account.balance;
        info!("Deducted {} from account #{}, balance {}", amount, id, balance);
        Ok(balance)
    }

    // ---- books ----

    pub fn list_books(&self) -> Result<Vec<&Book>> {
        let (_, role) = self.actor()?;
        policy::ensure_access(role, Permission::QUERY)?;
        Ok(self.ledger.books.values().collect())
    }

    pub fn search_book(&self, query: BookQuery<'_>) -> Result<Vec<&Book>> {
        let (_, role) = self.actor()?;
        policy::ensure_access(role, Permission::QUERY)?;

        let books = &self.ledger.books;
        match query {
            BookQuery::Isbn(isbn) => self
                .ledger
                .book_by_isbn(isbn)
                .and_then(|h| books.get(h))
                .map(|b| vec![b])
                .ok_or_else(|| LibraryError::BookNotFound(isbn.to_string())),
            BookQuery::Title(part) => Ok(books.values().filter(|b| b.title.contains(part)).collect()),
            BookQuery::Author(part) => {
                Ok(books.values().filter(|b| b.author.contains(part)).collect())
            }
        }
    }

    /// Adds `quantity` copies of a book.
    ///
    /// An ISBN already on file must come with the same title and author;
    /// its stock is then increased instead of creating a second entry.
    pub fn add_book(
        &mut self,
        isbn: &str,
        title: &str,
        author: &str,
        quantity: i64,
    ) -> Result<AddBookOutcome> {
        let (_, role) = self.actor()?;
        policy::ensure_service(role, Permission::LIBRARY_SERVICE)?;
        policy::ensure_access(role, Permission::ADD_BOOK)?;
        check_text("ISBN", isbn, ISBN_CAPACITY)?;
        check_text("title", title, TITLE_CAPACITY)?;
        check_text("author", author, AUTHOR_CAPACITY)?;

        let existing = self.ledger.book_by_isbn(isbn);
        if let Some(book) = existing.and_then(|h| self.ledger.books.get(h)) {
            if !book.same_edition(title, author) {
                return Err(LibraryError::IsbnConflict {
                    isbn: book.isbn.clone(),
                    title: book.title.clone(),
                    author: book.author.clone(),
                });
            }
        }
        let quantity = u64::try_from(quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| LibraryError::invalid("at least one copy must be added"))?;

        match existing.and_then(|h| self.ledger.books.get_mut(h)) {
            Some(book) => {
                book.stock = book
                    .stock
                    .checked_add(quantity)
                    .ok_or_else(|| LibraryError::invalid("stock would overflow"))?;
                info!("Restocked '{}' with {} copies, now {}", isbn, quantity, book.stock);
                Ok(AddBookOutcome::Restocked { stock: book.stock })
            }
            None => {
                self.ledger
                    .books
                    .append(Book::new(isbn, title, author, quantity, Timestamp::now()));
                info!("Added '{}' \"{}\" with {} copies", isbn, title, quantity);
                Ok(AddBookOutcome::Added { stock: quantity })
            }
        }
    }

    /// Changes the title and/or author of an existing book.
    pub fn modify_book(
        &mut self,
        isbn: &str,
        title: Option<&str>,
        author: Option<&str>,
    ) -> Result<Book> {
        let (_, role) = self.actor()?;
        policy::ensure_service(role, Permission::LIBRARY_SERVICE)?;
        policy::ensure_access(role, Permission::MODIFY_BOOK)?;
        if let Some(title) = title {
            check_text("title", title, TITLE_CAPACITY)?;
        }
        if let Some(author) = author {
            check_text("author", author, AUTHOR_CAPACITY)?;
        }

        let book = self
            .ledger
            .book_by_isbn(isbn)
            .and_then(|h| self.ledger.books.get_mut(h))
            .ok_or_else(|| LibraryError::BookNotFound(isbn.to_string()))?;
        if let Some(title) = title {
            book.title = title.to_string();
        }
        if let Some(author) = author {
            book.author = author.to_string();
        }
        info!("Updated book '{}'", isbn);
        Ok(book.clone())
    }

    /// Adds books from CSV rows `isbn,title,author,quantity`.
    ///
    /// Records are read one at a time. Invalid or refused rows are logged
    /// at warn level and skipped; only permission and I/O failures abort.
    pub fn import_books<R: Read>(&mut self, reader: R) -> Result<ImportSummary> {
        let (_, role) = self.actor()?;
        policy::ensure_service(role, Permission::LIBRARY_SERVICE)?;
        policy::ensure_access(role, Permission::ADD_BOOK)?;

        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut summary = ImportSummary::default();
        for (row_idx, result) in csv_reader.deserialize::<BookImportRecord>().enumerate() {
            let row_num = row_idx + 2; // 1-indexed, accounting for header row

            let book = match result.map(|record| record.parse()) {
                Ok(Some(book)) => book,
                Ok(None) => {
                    warn!("Row {}: Failed to parse book record", row_num);
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Row {}: CSV parse error: {}", row_num, e);
                    summary.skipped += 1;
                    continue;
                }
            };

            let NewBook {
                isbn,
                title,
                author,
                quantity,
            } = book;
            match self.add_book(&isbn, &title, &author, quantity) {
                Ok(AddBookOutcome::Added { .. }) => summary.added += 1,
                Ok(AddBookOutcome::Restocked { .. }) => summary.restocked += 1,
                Err(e) => {
                    warn!("Row {}: {}", row_num, e);
                    summary.skipped += 1;
                }
            }
        }

        info!(
            "Imported books: {} added, {} restocked, {} skipped",
            summary.added, summary.restocked, summary.skipped
        );
        Ok(summary)
    }

    // ---- loans ----

    /// Borrows one copy of `isbn` for `days` days.
    pub fn borrow(&mut self, isbn: &str, days: i64) -> Result<BorrowRecord> {
        let (id, _) = self.actor()?;
        let handle = self
            .engine
            .borrow(&mut self.ledger, id, isbn, days, Timestamp::now())?;
        self.ledger
            .borrows
            .get(handle)
            .cloned()
            .ok_or_else(|| LibraryError::RecordNotFound("just created".to_string()))
    }

    /// Loans visible to the session account.
    ///
    /// Roles with the record service see every record, indexed by position
    /// in the ledger (the index accepted by [`Library::return_record`]).
    /// Everyone else sees their own active loans, indexed for
    /// [`Library::return_book`].
    pub fn loans(&self) -> Result<Vec<LoanRow<'_>>> {
        let (id, role) = self.actor()?;
        let ledger = &self.ledger;

        if policy::requires_service(role, Permission::RECORD_SERVICE) {
            return Ok(ledger
                .borrows
                .values()
                .enumerate()
                .map(|(i, r)| LoanRow::resolve(ledger, i + 1, r))
                .collect());
        }

        Ok(ledger
            .borrows
            .values()
            .filter(|r| r.borrower == id && r.is_active())
            .enumerate()
            .map(|(i, r)| LoanRow::resolve(ledger, i + 1, r))
            .collect())
    }

    /// Returns the `index`-th (1-based) active loan of the session account.
    pub fn return_book(&mut self, index: usize) -> Result<ReturnReceipt> {
        let (id, _) = self.actor()?;
        let handle = index
            .checked_sub(1)
            .and_then(|i| self.ledger.active_loan_handles(id).get(i).copied())
            .ok_or_else(|| LibraryError::RecordNotFound(format!("#{}", index)))?;
        self.return_handle(id, handle)
    }

    /// Returns the `index`-th (1-based) borrow record of the whole ledger.
    /// Needs the record service.
    pub fn return_record(&mut self, index: usize) -> Result<ReturnReceipt> {
        let (id, role) = self.actor()?;
        policy::ensure_service(role, Permission::RECORD_SERVICE)?;
        let handle = index
            .checked_sub(1)
            .and_then(|i| self.ledger.borrows.nth(i))
            .ok_or_else(|| LibraryError::RecordNotFound(format!("#{}", index)))?;
        self.return_handle(id, handle)
    }

    fn return_handle(&mut self, actor: u32, handle: Handle) -> Result<ReturnReceipt> {
        self.engine
            .return_record(&mut self.ledger, actor, handle, Timestamp::now())
    }

    // ---- helpers ----

    /// Identifier and role of the session account.
    fn actor(&self) -> Result<(u32, Role)> {
        let account = self.current_account()?;
        Ok((account.id, account.role))
    }

    fn ensure_admin(&self) -> Result<(u32, Role)> {
        let (id, role) = self.actor()?;
        policy::ensure_account_admin(role)?;
        Ok((id, role))
    }

    fn account_mut(&mut self, id: u32) -> Result<&mut Account> {
        self.ledger
            .account_by_id(id)
            .and_then(|h| self.ledger.accounts.get_mut(h))
            .ok_or(LibraryError::AccountIdNotFound(id))
    }
}

fn positive_amount(text: &str) -> Result<Money> {
    let amount = Money::from_str(text)?;
    if !amount.is_positive() {
        return Err(LibraryError::invalid(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    Ok(amount)
}
