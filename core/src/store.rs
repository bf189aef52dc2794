//! Flat CSV record store: one UTF-8 CSV file per table under `data_dir`,
//! header row first, one record per line (quoted fields may span lines).
//! A single process-wide mutex serializes every file operation across all
//! tables. Whole-file read, linear scan, whole-file rewrite: no index,
//! no WAL, no cross-table transactions.
//!
//! Failure policy: reads degrade (malformed or unreadable file logs a
//! warning and reads as empty), writes and appends propagate `StoreError`.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One record at the storage boundary: column name → string value.
pub type Row = HashMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failure on {table}: {source}")]
    Io {
        table: String,
        #[source]
        source: std::io::Error,
    },
}

/// Shared flat-file store. Construct once at startup and hand an
/// `Arc<FlatStore>` to every accessor.
pub struct FlatStore {
    data_dir: PathBuf,
    lock: Mutex<()>,
}

impl FlatStore {
    /// Open a store rooted at `data_dir`, creating the directory if needed.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(|source| StoreError::Io {
            table: data_dir.display().to_string(),
            source,
        })?;
        Ok(Self {
            data_dir,
            lock: Mutex::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn filepath(&self, table: &str) -> PathBuf {
        self.data_dir.join(table)
    }

    /// All rows of `table` in file order. Missing table reads as empty;
    /// malformed content logs a warning and reads as empty (caller cannot
    /// tell an empty table from a corrupt one).
    pub fn read(&self, table: &str) -> Vec<Row> {
        let _guard = self.lock.lock().expect("store mutex");
        self.load(table)
    }

    /// Replace the entire table with `rows`, header first. Existing content
    /// is discarded.
    pub fn write(&self, table: &str, rows: &[Row], columns: &[&str]) -> Result<(), StoreError> {
        let _guard = self.lock.lock().expect("store mutex");
        self.save(table, rows, columns)
    }

    /// Append exactly one row, creating the table with a header if absent.
    /// Existing rows are never rewritten or reordered.
    pub fn append(&self, table: &str, row: &Row, columns: &[&str]) -> Result<(), StoreError> {
        let _guard = self.lock.lock().expect("store mutex");
        self.append_unlocked(table, row, columns)
    }

    /// Next auto-increment value for `id_field`: max existing + 1, or 1 for
    /// an empty or missing table. Rows whose id is missing or non-numeric
    /// are skipped. Not atomic with a later `append`; creators should use
    /// [`FlatStore::append_with_next_id`] instead.
    pub fn get_next_id(&self, table: &str, id_field: &str) -> u64 {
        let _guard = self.lock.lock().expect("store mutex");
        next_id_of(&self.load(table), id_field)
    }

    /// Allocate the next id and append the row built from it under one lock
    /// acquisition, so two concurrent creators cannot observe the same id.
    pub fn append_with_next_id(
        &self,
        table: &str,
        id_field: &str,
        columns: &[&str],
        build_row: impl FnOnce(u64) -> Row,
    ) -> Result<u64, StoreError> {
        let _guard = self.lock.lock().expect("store mutex");
        let id = next_id_of(&self.load(table), id_field);
        self.append_unlocked(table, &build_row(id), columns)?;
        Ok(id)
    }

    /// First row where `row[field] == value` (exact string match).
    pub fn find_by_field(&self, table: &str, field: &str, value: &str) -> Option<Row> {
        let _guard = self.lock.lock().expect("store mutex");
        self.load(table)
            .into_iter()
            .find(|row| row.get(field).is_some_and(|v| v.as_str() == value))
    }

    /// Every row where `row[field] == value`, in file order.
    pub fn find_all_by_field(&self, table: &str, field: &str, value: &str) -> Vec<Row> {
        let _guard = self.lock.lock().expect("store mutex");
        self.load(table)
            .into_iter()
            .filter(|row| row.get(field).is_some_and(|v| v.as_str() == value))
            .collect()
    }

    /// Replace the first row matching `field == value` with `new_row`
    /// (position preserved) and rewrite the table. Returns whether a row
    /// was replaced.
    pub fn update_by_field(
        &self,
        table: &str,
        field: &str,
        value: &str,
        new_row: Row,
        columns: &[&str],
    ) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().expect("store mutex");
        let mut rows = self.load(table);
        let Some(slot) = rows
            .iter_mut()
            .find(|row| row.get(field).is_some_and(|v| v.as_str() == value))
        else {
            return Ok(false);
        };
        *slot = new_row;
        self.save(table, &rows, columns)?;
        Ok(true)
    }

    /// Remove every row matching `field == value` and rewrite the table.
    /// Returns whether anything was removed; an empty or missing table is
    /// not an error.
    pub fn delete_by_field(
        &self,
        table: &str,
        field: &str,
        value: &str,
        columns: &[&str],
    ) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().expect("store mutex");
        let rows = self.load(table);
        let kept: Vec<Row> = rows
            .iter()
            .filter(|row| !row.get(field).is_some_and(|v| v.as_str() == value))
            .cloned()
            .collect();
        if kept.len() == rows.len() {
            return Ok(false);
        }
        self.save(table, &kept, columns)?;
        Ok(true)
    }

    // Callers below hold the lock.

    fn load(&self, table: &str) -> Vec<Row> {
        let path = self.filepath(table);
        if !path.exists() {
            return Vec::new();
        }
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("reading {} failed, treating as empty: {}", table, e);
                return Vec::new();
            }
        };
        let records = match parse_csv(&text) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("decoding {} failed, treating as empty: {}", table, e);
                return Vec::new();
            }
        };
        let mut iter = records.into_iter();
        let Some(header) = iter.next() else {
            return Vec::new();
        };
        iter.map(|record| {
            header
                .iter()
                .zip(record)
                .map(|(col, val)| (col.clone(), val))
                .collect()
        })
        .collect()
    }

    fn save(&self, table: &str, rows: &[Row], columns: &[&str]) -> Result<(), StoreError> {
        let mut out = encode_record(columns.iter().copied());
        for row in rows {
            out.push_str(&encode_record(
                columns.iter().map(|c| row.get(*c).map_or("", String::as_str)),
            ));
        }
        fs::write(self.filepath(table), out).map_err(|source| StoreError::Io {
            table: table.to_string(),
            source,
        })
    }

    fn append_unlocked(&self, table: &str, row: &Row, columns: &[&str]) -> Result<(), StoreError> {
        let path = self.filepath(table);
        let io_err = |source| StoreError::Io {
            table: table.to_string(),
            source,
        };
        if !path.exists() {
            fs::write(&path, encode_record(columns.iter().copied())).map_err(io_err)?;
        }
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        let line = encode_record(columns.iter().map(|c| row.get(*c).map_or("", String::as_str)));
        file.write_all(line.as_bytes()).map_err(io_err)
    }
}

fn next_id_of(rows: &[Row], id_field: &str) -> u64 {
    rows.iter()
        .filter_map(|row| row.get(id_field)?.parse::<u64>().ok())
        .max()
        .map_or(1, |max| max + 1)
}

/// Timestamp in the table format: `YYYY-MM-DD HH:MM:SS` local time.
/// Lexicographic order on these strings is chronological order, which the
/// message merge relies on.
pub fn now_stamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

// --- CSV codec (RFC 4180 quoting, UTF-8) ---

#[derive(Debug, thiserror::Error)]
enum CsvError {
    #[error("unterminated quoted field")]
    UnterminatedQuote,
}

/// Quote a field only when it contains the delimiter, a double quote, or a
/// line break; embedded quotes are doubled.
fn encode_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        let mut quoted = String::with_capacity(field.len() + 2);
        quoted.push('"');
        for ch in field.chars() {
            if ch == '"' {
                quoted.push('"');
            }
            quoted.push(ch);
        }
        quoted.push('"');
        quoted
    } else {
        field.to_string()
    }
}

fn encode_record<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    let mut line = fields.map(encode_field).collect::<Vec<_>>().join(",");
    line.push('\n');
    line
}

/// Parse a whole file into records. Quoted fields may contain delimiters,
/// doubled quotes, and line breaks. Blank lines are skipped.
fn parse_csv(input: &str) -> Result<Vec<Vec<String>>, CsvError> {
    let mut records = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut chars = input.chars().peekable();

    let end_record = |records: &mut Vec<Vec<String>>, fields: &mut Vec<String>, current: &mut String| {
        fields.push(std::mem::take(current));
        // A lone empty field is a blank line, not a record.
        if fields.len() > 1 || !fields[0].is_empty() {
            records.push(std::mem::take(fields));
        } else {
            fields.clear();
        }
    };

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(ch);
            }
            continue;
        }
        match ch {
            '"' if !field_started && current.is_empty() => {
                in_quotes = true;
                field_started = true;
            }
            ',' => {
                fields.push(std::mem::take(&mut current));
                field_started = false;
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                end_record(&mut records, &mut fields, &mut current);
                field_started = false;
            }
            '\n' => {
                end_record(&mut records, &mut fields, &mut current);
                field_started = false;
            }
            _ => {
                current.push(ch);
                field_started = true;
            }
        }
    }
    if in_quotes {
        return Err(CsvError::UnterminatedQuote);
    }
    if field_started || !current.is_empty() || !fields.is_empty() {
        end_record(&mut records, &mut fields, &mut current);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> FlatStore {
        let dir = std::env::temp_dir().join(format!("linguachat-store-{}", uuid::Uuid::new_v4()));
        FlatStore::new(dir).expect("temp store")
    }

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const COLS: &[&str] = &["ID", "Name", "Note"];

    #[test]
    fn next_id_is_one_for_missing_or_empty_table() {
        let store = temp_store();
        assert_eq!(store.get_next_id("absent.csv", "ID"), 1);
        store.write("empty.csv", &[], COLS).unwrap();
        assert_eq!(store.get_next_id("empty.csv", "ID"), 1);
    }

    #[test]
    fn next_id_is_max_plus_one_and_skips_bad_values() {
        let store = temp_store();
        for id in ["3", "7", "not-a-number", "", "5"] {
            store
                .append("t.csv", &row(&[("ID", id), ("Name", "x")]), COLS)
                .unwrap();
        }
        assert_eq!(store.get_next_id("t.csv", "ID"), 8);
    }

    #[test]
    fn append_read_round_trips_awkward_values() {
        let store = temp_store();
        let tricky = row(&[
            ("ID", "1"),
            ("Name", "says \"hi\", loudly"),
            ("Note", "line one\nline two, with comma"),
        ]);
        store.append("t.csv", &tricky, COLS).unwrap();
        let rows = store.read("t.csv");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Name"], "says \"hi\", loudly");
        assert_eq!(rows[0]["Note"], "line one\nline two, with comma");
    }

    #[test]
    fn append_preserves_existing_rows_and_order() {
        let store = temp_store();
        for id in 1..=3u64 {
            let id = id.to_string();
            store
                .append("t.csv", &row(&[("ID", &id), ("Name", "n")]), COLS)
                .unwrap();
        }
        let rows = store.read("t.csv");
        let ids: Vec<&str> = rows.iter().map(|r| r["ID"].as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
    }

    #[test]
    fn update_replaces_only_the_first_match_in_place() {
        let store = temp_store();
        for (id, name) in [("1", "a"), ("2", "b"), ("3", "c")] {
            store
                .append("t.csv", &row(&[("ID", id), ("Name", name)]), COLS)
                .unwrap();
        }
        let updated = store
            .update_by_field("t.csv", "ID", "2", row(&[("ID", "2"), ("Name", "B")]), COLS)
            .unwrap();
        assert!(updated);
        let rows = store.read("t.csv");
        let names: Vec<&str> = rows.iter().map(|r| r["Name"].as_str()).collect();
        assert_eq!(names, ["a", "B", "c"]);

        let missed = store
            .update_by_field("t.csv", "ID", "9", row(&[("ID", "9")]), COLS)
            .unwrap();
        assert!(!missed);
    }

    #[test]
    fn delete_removes_all_matches_and_keeps_order() {
        let store = temp_store();
        for (id, name) in [("1", "x"), ("2", "keep"), ("1", "y"), ("3", "keep")] {
            store
                .append("t.csv", &row(&[("ID", id), ("Name", name)]), COLS)
                .unwrap();
        }
        assert!(store.delete_by_field("t.csv", "ID", "1", COLS).unwrap());
        let rows = store.read("t.csv");
        let ids: Vec<&str> = rows.iter().map(|r| r["ID"].as_str()).collect();
        assert_eq!(ids, ["2", "3"]);

        assert!(!store.delete_by_field("t.csv", "ID", "1", COLS).unwrap());
        assert!(!store.delete_by_field("missing.csv", "ID", "1", COLS).unwrap());
    }

    #[test]
    fn allocate_and_append_hands_out_increasing_ids() {
        let store = temp_store();
        let first = store
            .append_with_next_id("t.csv", "ID", COLS, |id| {
                row(&[("ID", &id.to_string()), ("Name", "first")])
            })
            .unwrap();
        let second = store
            .append_with_next_id("t.csv", "ID", COLS, |id| {
                row(&[("ID", &id.to_string()), ("Name", "second")])
            })
            .unwrap();
        assert_eq!((first, second), (1, 2));
        assert_eq!(store.read("t.csv").len(), 2);
    }

    #[test]
    fn malformed_table_reads_as_empty() {
        let store = temp_store();
        store
            .append("t.csv", &row(&[("ID", "1"), ("Name", "a")]), COLS)
            .unwrap();
        std::fs::write(store.data_dir().join("t.csv"), "ID,Name\n\"broken").unwrap();
        assert!(store.read("t.csv").is_empty());
        // Invalid UTF-8 degrades the same way.
        std::fs::write(store.data_dir().join("t.csv"), [0xff, 0xfe, 0x00]).unwrap();
        assert!(store.read("t.csv").is_empty());
    }

    #[test]
    fn find_by_field_is_exact_string_match() {
        let store = temp_store();
        store
            .append("t.csv", &row(&[("ID", "10"), ("Name", "Ann")]), COLS)
            .unwrap();
        assert!(store.find_by_field("t.csv", "ID", "1").is_none());
        assert_eq!(store.find_by_field("t.csv", "ID", "10").unwrap()["Name"], "Ann");
        assert!(store.find_by_field("t.csv", "Name", "ann").is_none());
    }
}
