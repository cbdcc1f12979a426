//! libsys CLI
//!
//! Runs one library operation per invocation against the ledger file in
//! `--root`, then saves it. Commands other than `register` log in first
//! with `--user` and `--password`.
//!
//! # Usage
//!
//! ```bash
//! libsys register alice secret
//! libsys --user admin --password admin add-book 978-0 Dune Herbert 2
//! libsys --user alice --password secret borrow 978-0 14
//! libsys --user alice --password secret loans > loans.csv
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `info` or `debug` to control logging verbosity

use clap::{ArgGroup, Parser, Subcommand};
use libsys::report::{write_accounts, write_books, write_loans};
use libsys::{AddBookOutcome, BookQuery, Config, Library, LibraryError, Money, Result};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;

/// libsys - library accounts, books and loans
#[derive(Parser)]
#[command(name = "libsys")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding the ledger file
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Account to log in as
    #[arg(long, global = true)]
    user: Option<String>,

    /// Password of --user
    #[arg(long, global = true)]
    password: Option<String>,

    /// Late fee charged per overdue day (e.g. 0.30)
    #[arg(long, global = true)]
    fee_per_day: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a regular account
    Register { name: String, password: String },

    /// List every book
    Books,

    /// Search books by exact ISBN or by title/author substring
    #[command(group(ArgGroup::new("by").required(true).args(["isbn", "title", "author"])))]
    Search {
        #[arg(long)]
        isbn: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        author: Option<String>,
    },

    /// Add copies of a book
    AddBook {
        isbn: String,
        title: String,
        author: String,
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },

    /// Change the title and/or author of a book
    ModifyBook {
        isbn: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        author: Option<String>,
    },

    /// Add books from a CSV file with columns isbn,title,author,quantity
    ImportBooks { path: PathBuf },

    /// Borrow one copy of a book
    Borrow {
        isbn: String,
        /// Loan duration in days
        #[arg(allow_negative_numbers = true)]
        days: i64,
    },

    /// List loans (own active loans, or every record for record managers)
    Loans,

    /// Return a loan by the index shown in `loans`
    Return {
        index: usize,
        /// Select from every borrow record instead of own active loans
        #[arg(long)]
        any: bool,
    },

    /// Add funds to the logged-in account
    Recharge {
        #[arg(allow_negative_numbers = true)]
        amount: String,
    },

    /// Show the logged-in account
    Profile,

    /// Cancel the logged-in account
    Cancel,

    /// List every account
    Accounts,

    /// Print the identifier of an account
    FindAccount { name: String },

    /// Reset an account password to the default
    ResetPassword { id: u32 },

    /// Remove another account
    RemoveAccount { id: u32 },

    /// Charge an amount to an account
    Deduct {
        id: u32,
        #[arg(allow_negative_numbers = true)]
        amount: String,
    },
}

fn main() {
    env_logger::init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::new(&cli.root);
    if let Some(fee) = &cli.fee_per_day {
        let fee = Money::from_str(fee)?;
        if fee.is_negative() {
            return Err(LibraryError::InvalidInput(
                "late fee must not be negative".to_string(),
            ));
        }
        config = config.with_fee_per_day(fee);
    }

    let mut library = Library::open_or_create(config)?;

    if !matches!(cli.command, Commands::Register { .. }) {
        if let Some(user) = &cli.user {
            let password = cli.password.as_deref().unwrap_or("");
            library.login(user, password)?;
        }
    }

    execute(&mut library, cli.command)?;
    library.shutdown()
}

fn execute(library: &mut Library, command: Commands) -> Result<()> {
    let stdout = io::stdout();

    match command {
        Commands::Register { name, password } => {
            let account = library.register(&name, &password)?;
            println!("Registered account #{} '{}'", account.id, account.name);
        }
        Commands::Books => {
            write_books(stdout.lock(), library.list_books()?)?;
        }
        Commands::Search {
            isbn,
            title,
            author,
        } => {
            let query = match (&isbn, &title, &author) {
                (Some(isbn), _, _) => BookQuery::Isbn(isbn),
                (_, Some(title), _) => BookQuery::Title(title),
                (_, _, Some(author)) => BookQuery::Author(author),
                _ => {
                    return Err(LibraryError::InvalidInput(
                        "one of --isbn, --title or --author is required".to_string(),
                    ))
                }
            };
            write_books(stdout.lock(), library.search_book(query)?)?;
        }
        Commands::AddBook {
            isbn,
            title,
            author,
            quantity,
        } => match library.add_book(&isbn, &title, &author, quantity)? {
            AddBookOutcome::Added { stock } => println!("Added '{}' with {} copies", isbn, stock),
            AddBookOutcome::Restocked { stock } => {
                println!("Restocked '{}', now {} copies", isbn, stock)
            }
        },
        Commands::ModifyBook {
            isbn,
            title,
            author,
        } => {
            let book = library.modify_book(&isbn, title.as_deref(), author.as_deref())?;
            println!("Updated '{}': \"{}\" by {}", book.isbn, book.title, book.author);
        }
        Commands::ImportBooks { path } => {
            let file = File::open(path)?;
            let summary = library.import_books(BufReader::new(file))?;
            println!(
                "Imported books: {} added, {} restocked, {} skipped",
                summary.added, summary.restocked, summary.skipped
            );
        }
        Commands::Borrow { isbn, days } => {
            let record = library.borrow(&isbn, days)?;
            println!(
                "Borrowed '{}' for {} day(s) on {}",
                record.isbn, record.loan_days, record.borrowed
            );
        }
        Commands::Loans => {
            write_loans(stdout.lock(), &library.loans()?)?;
        }
        Commands::Return { index, any } => {
            let receipt = if any {
                library.return_record(index)?
            } else {
                library.return_book(index)?
            };
            if receipt.is_late() {
                println!(
                    "Returned '{}' {} day(s) late; charged {}, balance {}",
                    receipt.isbn, receipt.overdue_days, receipt.fee, receipt.balance
                );
            } else {
                println!("Returned '{}' on time", receipt.isbn);
            }
        }
        Commands::Recharge { amount } => {
            let balance = library.recharge(&amount)?;
            println!("Balance: {}", balance);
        }
        Commands::Profile => {
            let profile = library.profile()?;
            println!("id: {}", profile.id);
            println!("name: {}", profile.name);
            println!("role: {}", profile.role);
            println!("balance: {}", profile.balance);
            println!("active loans: {}", profile.active_loans);
            println!("registered: {}", profile.registered);
            println!("logged in: {}", profile.logged_in);
        }
        Commands::Cancel => {
            let account = library.cancel_account()?;
            println!("Cancelled account #{} '{}'", account.id, account.name);
        }
        Commands::Accounts => {
            let accounts = library.accounts()?;
            write_accounts(stdout.lock(), library.ledger(), accounts)?;
        }
        Commands::FindAccount { name } => {
            println!("{}", library.find_account(&name)?);
        }
        Commands::ResetPassword { id } => {
            library.reset_password(id)?;
            println!("Password of account #{} reset", id);
        }
        Commands::RemoveAccount { id } => {
            let account = library.remove_account(id)?;
            println!("Removed account #{} '{}'", account.id, account.name);
        }
        Commands::Deduct { id, amount } => {
            let balance = library.deduct(id, &amount)?;
            println!("Account #{} balance: {}", id, balance);
        }
    }

    Ok(())
}
