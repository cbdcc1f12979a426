//! Fixed-width binary format of the ledger file.
//!
//! ```text
//! header          24 bytes
//! accounts        account_count × account_size
//! books           book_count    × book_size
//! borrow records  borrow_count  × borrow_size
//! ```
//!
//! All integers are little-endian and every field sits at a fixed offset;
//! text is stored in NUL-padded buffers. The layout is byte-compatible with
//! files written by the legacy x86-64 tool.

use crate::error::{LibraryError, Result};
use crate::ledger::Ledger;
use crate::money::Money;
use crate::record::{
    name_key, Account, Book, BorrowRecord, Role, AUTHOR_CAPACITY, ISBN_CAPACITY, NAME_CAPACITY,
    PASSWORD_CAPACITY, TITLE_CAPACITY,
};
use crate::store::RecordStore;
use crate::timestamp::Timestamp;
use log::{debug, warn};

pub const HEADER_SIZE: usize = 24;
pub const TIMESTAMP_SIZE: usize = 8;

/// Leading block of the ledger file: per-kind record size and count.
///
/// Sizes describe the layout the file was written with; counts drive how
/// many records of each kind follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub account_size: u16,
    pub book_size: u16,
    pub borrow_size: u16,
    pub account_count: u32,
    pub book_count: u32,
    pub borrow_count: u32,
}

impl Header {
    /// Header for the given counts with sizes taken from the current layout.
    pub fn current(account_count: u32, book_count: u32, borrow_count: u32) -> Self {
        Header {
            account_size: Account::SIZE as u16,
            book_size: Book::SIZE as u16,
            borrow_size: BorrowRecord::SIZE as u16,
            account_count,
            book_count,
            borrow_count,
        }
    }

    /// Same counts, sizes re-derived from the current layout.
    pub fn restamped(self) -> Self {
        Header::current(self.account_count, self.book_count, self.borrow_count)
    }

    /// Total file length this header declares.
    pub fn declared_len(&self) -> Option<u64> {
        let part = |count: u32, size: u16| u64::from(count).checked_mul(u64::from(size));
        let total = part(self.account_count, self.account_size)?
            .checked_add(part(self.book_count, self.book_size)?)?
            .checked_add(part(self.borrow_count, self.borrow_size)?)?;
        total.checked_add(HEADER_SIZE as u64)
    }

    pub fn encode_into(&self, buf: &mut [u8]) {
        let mut w = Writer::new(buf);
        w.put_u16(self.account_size);
        w.put_u16(self.book_size);
        w.put_u16(self.borrow_size);
        w.put_u16(0);
        w.put_u32(self.account_count);
        w.put_u32(self.book_count);
        w.put_u32(self.borrow_count);
        w.put_u32(0);
    }

    pub fn decode_from(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(LibraryError::corrupt(format!(
                "file is {} bytes, shorter than the {}-byte header",
                bytes.len(),
                HEADER_SIZE
            )));
        }
        let mut r = Reader::new(&bytes[..HEADER_SIZE]);
        let account_size = r.u16();
        let book_size = r.u16();
        let borrow_size = r.u16();
        r.skip(2);
        Ok(Header {
            account_size,
            book_size,
            borrow_size,
            account_count: r.u32(),
            book_count: r.u32(),
            borrow_count: r.u32(),
        })
    }
}

/// A record kind with a fixed-width binary image.
pub trait FixedRecord: Sized {
    /// Image size in bytes.
    const SIZE: usize;
    /// Human-readable kind name for diagnostics.
    const KIND: &'static str;

    /// Writes the image into `buf`, which is exactly `SIZE` bytes long.
    fn encode_into(&self, buf: &mut [u8]);

    /// Reads a record from an image of exactly `SIZE` bytes.
    fn decode_from(buf: &[u8]) -> Result<Self>;
}

impl FixedRecord for Account {
    const SIZE: usize = 56;
    const KIND: &'static str = "account";

    fn encode_into(&self, buf: &mut [u8]) {
        let mut w = Writer::new(buf);
        w.put_u32(self.role.code());
        w.put_text(&self.name, NAME_CAPACITY);
        w.put_text(&self.password, PASSWORD_CAPACITY);
        w.put_u32(self.key);
        w.put_u32(self.id);
        w.put_i32(self.balance.minor());
        w.put_timestamp(&self.registered);
    }

    fn decode_from(buf: &[u8]) -> Result<Self> {
        let mut r = Reader::new(buf);
        let code = r.u32();
        let role = Role::from_code(code)
            .ok_or_else(|| LibraryError::corrupt(format!("unknown account role code {}", code)))?;
        let name = r.text(NAME_CAPACITY, "account name")?;
        let password = r.text(PASSWORD_CAPACITY, "password")?;
        let mut key = r.u32();
        let id = r.u32();
        if key != name_key(&name) {
            warn!("Account #{} has a stale name key; recomputing it", id);
            key = name_key(&name);
        }
        Ok(Account {
            role,
            name,
            password,
            key,
            id,
            balance: Money::from_minor(r.i32()),
            registered: r.timestamp(),
        })
    }
}

impl FixedRecord for Book {
    const SIZE: usize = 136;
    const KIND: &'static str = "book";

    fn encode_into(&self, buf: &mut [u8]) {
        let mut w = Writer::new(buf);
        w.put_u64(self.stock);
        w.put_text(&self.isbn, ISBN_CAPACITY);
        w.put_text(&self.author, AUTHOR_CAPACITY);
        w.put_text(&self.title, TITLE_CAPACITY);
        w.put_timestamp(&self.introduced);
    }

    fn decode_from(buf: &[u8]) -> Result<Self> {
        let mut r = Reader::new(buf);
        Ok(Book {
            stock: r.u64(),
            isbn: r.text(ISBN_CAPACITY, "ISBN")?,
            author: r.text(AUTHOR_CAPACITY, "author")?,
            title: r.text(TITLE_CAPACITY, "title")?,
            introduced: r.timestamp(),
        })
    }
}

impl FixedRecord for BorrowRecord {
    const SIZE: usize = 48;
    const KIND: &'static str = "borrow record";

    fn encode_into(&self, buf: &mut [u8]) {
        let mut w = Writer::new(buf);
        w.put_text(&self.isbn, ISBN_CAPACITY);
        w.put_u32(self.loan_days);
        w.put_u32(self.borrower);
        w.put_timestamp(&self.borrowed);
        w.put_timestamp(&self.returned);
    }

    fn decode_from(buf: &[u8]) -> Result<Self> {
        let mut r = Reader::new(buf);
        Ok(BorrowRecord {
            isbn: r.text(ISBN_CAPACITY, "ISBN")?,
            loan_days: r.u32(),
            borrower: r.u32(),
            borrowed: r.timestamp(),
            returned: r.timestamp(),
        })
    }
}

/// Serializes the whole ledger. Sizes in the header always describe the
/// current layout.
pub fn encode(ledger: &Ledger) -> Vec<u8> {
    let header = ledger.header();
    let mut out = vec![0u8; HEADER_SIZE];
    header.encode_into(&mut out);

    append_records(&mut out, &ledger.accounts);
    append_records(&mut out, &ledger.books);
    append_records(&mut out, &ledger.borrows);

    debug!(
        "Encoded {} accounts, {} books, {} borrow records ({} bytes)",
        header.account_count,
        header.book_count,
        header.borrow_count,
        out.len()
    );
    out
}

/// Deserializes a ledger image.
///
/// The header counts are checked against the byte length before any record
/// is read, so a truncated file is reported instead of decoded into garbage.
pub fn decode(bytes: &[u8]) -> Result<Ledger> {
    let header = Header::decode_from(bytes)?;

    let declared = header
        .declared_len()
        .ok_or_else(|| LibraryError::corrupt("header declares an impossible file length"))?;
    if (bytes.len() as u64) < declared {
        return Err(LibraryError::corrupt(format!(
            "header declares {} bytes of records but the file holds {}",
            declared,
            bytes.len()
        )));
    }
    if (bytes.len() as u64) > declared {
        warn!(
            "Ignoring {} trailing bytes after the last declared record",
            bytes.len() as u64 - declared
        );
    }

    let mut offset = HEADER_SIZE;
    let accounts = read_records::<Account>(
        bytes,
        &mut offset,
        header.account_count,
        header.account_size,
    )?;
    let books = read_records::<Book>(bytes, &mut offset, header.book_count, header.book_size)?;
    let borrows = read_records::<BorrowRecord>(
        bytes,
        &mut offset,
        header.borrow_count,
        header.borrow_size,
    )?;

    Ledger::from_stores(accounts, books, borrows)
}

fn append_records<T: FixedRecord>(out: &mut Vec<u8>, store: &RecordStore<T>) {
    for record in store.values() {
        let start = out.len();
        out.resize(start + T::SIZE, 0);
        record.encode_into(&mut out[start..]);
    }
}

/// Reads `count` images of `stored_size` bytes each.
///
/// Images written with a different layout size are zero-extended or cut to
/// the current size.
fn read_records<T: FixedRecord>(
    bytes: &[u8],
    offset: &mut usize,
    count: u32,
    stored_size: u16,
) -> Result<RecordStore<T>> {
    let stored_size = usize::from(stored_size);
    if count > 0 && stored_size == 0 {
        return Err(LibraryError::corrupt(format!(
            "{} {} records declared with a record size of zero",
            count,
            T::KIND
        )));
    }
    if count > 0 && stored_size != T::SIZE {
        warn!(
            "File stores {} records as {} bytes, current layout is {} bytes",
            T::KIND,
            stored_size,
            T::SIZE
        );
    }

    let mut store = RecordStore::new();
    let mut image = vec![0u8; T::SIZE];
    for _ in 0..count {
        let raw = &bytes[*offset..*offset + stored_size];
        let kept = stored_size.min(T::SIZE);
        image.fill(0);
        image[..kept].copy_from_slice(&raw[..kept]);
        store.append(T::decode_from(&image)?);
        *offset += stored_size;
    }
    Ok(store)
}

/// Sequential little-endian writer over a fixed buffer.
struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Writer { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn put_u16(&mut self, v: u16) {
        self.put(&v.to_le_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.put(&v.to_le_bytes());
    }

    fn put_i32(&mut self, v: i32) {
        self.put(&v.to_le_bytes());
    }

    fn put_u64(&mut self, v: u64) {
        self.put(&v.to_le_bytes());
    }

    /// NUL-padded text; the last byte of the field is always NUL.
    ///
    /// Overlong text is cut on a character boundary.
    fn put_text(&mut self, text: &str, capacity: usize) {
        let len = floor_char_boundary(text, capacity - 1);
        let field = &mut self.buf[self.pos..self.pos + capacity];
        field.fill(0);
        field[..len].copy_from_slice(&text.as_bytes()[..len]);
        self.pos += capacity;
    }

    fn put_timestamp(&mut self, ts: &Timestamp) {
        self.put(&ts.year.to_le_bytes());
        self.put(&[
            ts.month as u8,
            ts.day as u8,
            ts.weekday as u8,
            ts.hour as u8,
            ts.min as u8,
            ts.sec as u8,
        ]);
    }
}

/// Largest index `<= max` that falls on a character boundary of `text`.
fn floor_char_boundary(text: &str, max: usize) -> usize {
    if max >= text.len() {
        return text.len();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Sequential little-endian reader over a fixed buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    fn i8(&mut self) -> i8 {
        self.take::<1>()[0] as i8
    }

    /// Text up to the first NUL; bytes after it are ignored.
    ///
    /// Legacy writers could fill a field with no terminator. Such text is
    /// cut to `capacity - 1` bytes on a character boundary, the same limit
    /// the writer applies, so a decoded record encodes back unchanged.
    fn text(&mut self, capacity: usize, field: &str) -> Result<String> {
        let raw = &self.buf[self.pos..self.pos + capacity];
        self.pos += capacity;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(capacity);
        let text = std::str::from_utf8(&raw[..end])
            .map_err(|_| LibraryError::corrupt(format!("{} is not valid UTF-8", field)))?;
        if end == capacity {
            warn!("Unterminated {} cut to {} bytes", field, capacity - 1);
        }
        Ok(text[..floor_char_boundary(text, capacity - 1)].to_string())
    }

    fn timestamp(&mut self) -> Timestamp {
        Timestamp {
            year: i16::from_le_bytes(self.take()),
            month: self.i8(),
            day: self.i8(),
            weekday: self.i8(),
            hour: self.i8(),
            min: self.i8(),
            sec: self.i8(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::record::ADMIN_ID;

    fn stamp(day: i8) -> Timestamp {
        Timestamp {
            year: 2026,
            month: 3,
            day,
            weekday: 3,
            hour: 14,
            min: 5,
            sec: 9,
        }
    }

    fn sample_ledger() -> Ledger {
        let mut ledger = Ledger::seeded(stamp(1));
        let mut alice = Account::new(7, "alice", "pw1", Role::Regular, stamp(2));
        alice.balance = Money::from_minor(-90);
        ledger.accounts.append(alice);
        ledger
            .accounts
            .append(Account::new(8, "mgr", "secret", Role::Manager, stamp(2)));
        ledger
            .books
            .append(Book::new("978-0-13-468599-1", "The Rust Programming Language", "Klabnik", 4, stamp(3)));
        ledger
            .books
            .append(Book::new("A1", "T", "X", 0, stamp(3)));
        ledger
            .borrows
            .append(BorrowRecord::new("A1", 7, 3, stamp(4)));
        let mut returned = BorrowRecord::new("978-0-13-468599-1", 7, 14, stamp(4));
        returned.returned = stamp(20);
        ledger.borrows.append(returned);
        ledger
    }

    #[test]
    fn test_record_sizes_match_legacy_layout() {
        assert_eq!(Account::SIZE, 56);
        assert_eq!(Book::SIZE, 136);
        assert_eq!(BorrowRecord::SIZE, 48);
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let ledger = sample_ledger();
        let bytes = encode(&ledger);
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded, ledger);
        assert_eq!(decoded.header(), ledger.header());
    }

    #[test]
    fn test_encoded_length_and_header_bytes() {
        let ledger = sample_ledger();
        let bytes = encode(&ledger);

        assert_eq!(bytes.len(), HEADER_SIZE + 3 * 56 + 2 * 136 + 2 * 48);
        assert_eq!(&bytes[0..8], &[56, 0, 136, 0, 48, 0, 0, 0]);
        assert_eq!(&bytes[8..24], &[3, 0, 0, 0, 2, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_account_field_offsets() {
        let mut account = Account::new(0x0102_0304, "bob", "pw", Role::Manager, stamp(9));
        account.balance = Money::from_minor(-1);
        let mut buf = [0u8; Account::SIZE];
        account.encode_into(&mut buf);

        assert_eq!(&buf[0..4], &[1, 0, 0, 0]);
        assert_eq!(&buf[4..8], b"bob\0");
        assert!(buf[7..20].iter().all(|&b| b == 0));
        assert_eq!(&buf[20..23], b"pw\0");
        assert_eq!(&buf[40..44], &[4, 3, 2, 1]);
        assert_eq!(&buf[44..48], &[0xff, 0xff, 0xff, 0xff]);
        assert_eq!(&buf[48..50], &2026i16.to_le_bytes());
        assert_eq!(buf[51], 9);
    }

    #[test]
    fn test_unreturned_sentinel_encodes_year_minus_one() {
        let record = BorrowRecord::new("A1", 2, 3, stamp(1));
        let mut buf = [0u8; BorrowRecord::SIZE];
        record.encode_into(&mut buf);

        assert_eq!(&buf[40..42], &[0xff, 0xff]);
        assert!(BorrowRecord::decode_from(&buf).unwrap().is_active());
    }

    #[test]
    fn test_text_after_nul_is_ignored() {
        let mut buf = [0u8; Account::SIZE];
        Account::new(2, "alice", "pw", Role::Regular, stamp(1)).encode_into(&mut buf);
        // legacy writers left stack garbage after the terminator
        buf[10] = b'Z';

        let decoded = Account::decode_from(&buf).unwrap();
        assert_eq!(decoded.name, "alice");
    }

    #[test]
    fn test_truncated_file_is_persistence_failure() {
        let bytes = encode(&sample_ledger());
        let err = decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);

        let err = decode(&bytes[..10]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
    }

    #[test]
    fn test_inflated_count_is_persistence_failure() {
        let mut bytes = encode(&sample_ledger());
        bytes[12..16].copy_from_slice(&1_000_000u32.to_le_bytes());

        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, LibraryError::Corrupt(_)));
    }

    #[test]
    fn test_trailing_bytes_are_ignored() {
        let ledger = sample_ledger();
        let mut bytes = encode(&ledger);
        bytes.extend_from_slice(&[0xAA; 5]);

        assert_eq!(decode(&bytes).unwrap(), ledger);
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let mut bytes = encode(&sample_ledger());
        bytes[HEADER_SIZE] = 9;

        let err = decode(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let mut bytes = encode(&sample_ledger());
        bytes[HEADER_SIZE + 4] = 0xff;

        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_larger_stored_records_are_cut_to_current_layout() {
        let ledger = Ledger::seeded(stamp(1));
        let mut bytes = vec![0u8; HEADER_SIZE];
        Header {
            account_size: 60,
            ..Header::current(1, 0, 0)
        }
        .encode_into(&mut bytes);
        let mut image = [0u8; Account::SIZE];
        ledger.accounts.values().next().unwrap().encode_into(&mut image);
        bytes.extend_from_slice(&image);
        bytes.extend_from_slice(&[0xEE; 4]);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, ledger);
        assert_eq!(decoded.header().account_size, 56);
    }

    #[test]
    fn test_smaller_stored_records_are_zero_extended() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        Header {
            borrow_size: 32,
            ..Header::current(1, 0, 1)
        }
        .encode_into(&mut bytes);
        let mut admin = [0u8; Account::SIZE];
        Ledger::seeded(stamp(1))
            .accounts
            .values()
            .next()
            .unwrap()
            .encode_into(&mut admin);
        bytes.extend_from_slice(&admin);
        let mut image = [0u8; BorrowRecord::SIZE];
        BorrowRecord::new("A1", 5, 2, stamp(1)).encode_into(&mut image);
        bytes.extend_from_slice(&image[..32]);

        let decoded = decode(&bytes).unwrap();
        let record = decoded.borrows.values().next().unwrap();
        assert_eq!(record.isbn, "A1");
        assert_eq!(record.borrower, 5);
        assert_eq!(record.borrowed, Timestamp::default());
    }

    #[test]
    fn test_zero_record_size_with_records_is_rejected() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        Header {
            book_size: 0,
            ..Header::current(0, 2, 0)
        }
        .encode_into(&mut bytes);

        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_restamped_keeps_counts() {
        let header = Header {
            account_size: 1,
            book_size: 2,
            borrow_size: 3,
            account_count: 4,
            book_count: 5,
            borrow_count: 6,
        };
        assert_eq!(header.restamped(), Header::current(4, 5, 6));
    }

    #[test]
    fn test_unterminated_legacy_name_is_cut_and_round_trips() {
        let mut bytes = encode(&Ledger::seeded(stamp(1)));
        let name = HEADER_SIZE + 4;
        bytes[name..name + NAME_CAPACITY].copy_from_slice(b"abcdefghijklmnop");

        let ledger = decode(&bytes).unwrap();
        let admin = ledger.accounts.values().next().unwrap();
        assert_eq!(admin.name, "abcdefghijklmno");
        assert_eq!(admin.key, name_key("abcdefghijklmno"));
        assert!(ledger.account_by_name("abcdefghijklmno").is_some());

        let again = decode(&encode(&ledger)).unwrap();
        assert_eq!(again, ledger);
    }

    #[test]
    fn test_unterminated_name_is_cut_on_char_boundary() {
        let mut bytes = encode(&Ledger::seeded(stamp(1)));
        let name = HEADER_SIZE + 4;
        let mut field = [b'a'; NAME_CAPACITY];
        field[14..].copy_from_slice("é".as_bytes());
        bytes[name..name + NAME_CAPACITY].copy_from_slice(&field);

        let ledger = decode(&bytes).unwrap();
        assert_eq!(ledger.accounts.values().next().unwrap().name, "a".repeat(14));
        assert_eq!(decode(&encode(&ledger)).unwrap(), ledger);
    }

    #[test]
    fn test_overlong_text_is_written_on_char_boundary() {
        let mut ledger = Ledger::seeded(stamp(1));
        let long = format!("{}é", "b".repeat(14));
        ledger
            .accounts
            .append(Account::new(2, &long, "pw", Role::Regular, stamp(1)));

        let decoded = decode(&encode(&ledger)).unwrap();
        let account = decoded.account(2).unwrap();
        assert_eq!(account.name, "b".repeat(14));
        assert_eq!(decode(&encode(&decoded)).unwrap(), decoded);
    }

    #[test]
    fn test_missing_admin_is_rejected() {
        let mut ledger = Ledger::default();
        ledger
            .accounts
            .append(Account::new(2, "alice", "pw", Role::Regular, stamp(1)));
        let err = decode(&encode(&ledger)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);

        let mut ledger = Ledger::default();
        ledger
            .accounts
            .append(Account::new(ADMIN_ID, "admin", "pw", Role::Regular, stamp(1)));
        let err = decode(&encode(&ledger)).unwrap_err();
        assert!(matches!(err, LibraryError::Corrupt(_)));
    }

    #[test]
    fn test_seeded_ledger_round_trips_admin() {
        let ledger = Ledger::seeded(stamp(1));
        let decoded = decode(&encode(&ledger)).unwrap();
        let admin = decoded.accounts.values().next().unwrap();

        assert_eq!(admin.id, ADMIN_ID);
        assert_eq!(admin.role, Role::Admin);
    }
}
