//! SQLite-backed telephony stores
//!
//! Reads a snapshot of the device's message and contact providers laid out
//! with the provider's own column names (`sms`, `mms`, `part`, `addr`).
//! Desktop tools and tests point the engine at such a file; writer helpers
//! exist for building snapshots.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use log::warn;
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::traits::{
    ContactStore, DirectRecord, LineNumberSource, MessageStore, MultimediaAddress,
    MultimediaHeader,
};
use super::AddressKind;
use crate::address::{addresses_match, normalize};
use crate::models::{Contact, ThreadId};

/// MIME type of the part holding a multimedia message's text
const TEXT_PLAIN: &str = "text/plain";

/// Keep the rows that map cleanly; a row with a mistyped column is logged
/// and dropped without failing the rest of the read
fn collect_rows<T>(rows: impl Iterator<Item = rusqlite::Result<T>>, table: &str) -> Vec<T> {
    let mut out = Vec::new();
    for row in rows {
        match row {
            Ok(value) => out.push(value),
            Err(e) => warn!("Skipping malformed {table} row: {e}"),
        }
    }
    out
}

/// Snapshot schema
///
/// `user_version` tracks which migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: provider tables
        M::up(
            r#"
            CREATE TABLE sms (
                _id INTEGER PRIMARY KEY,
                thread_id TEXT,
                address TEXT,
                body TEXT,
                date INTEGER NOT NULL DEFAULT 0,  -- milliseconds
                type INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX idx_sms_thread_date ON sms(thread_id, date DESC);

            CREATE TABLE mms (
                _id INTEGER PRIMARY KEY,
                thread_id TEXT,
                date INTEGER NOT NULL DEFAULT 0,  -- seconds
                msg_box INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX idx_mms_thread_date ON mms(thread_id, date DESC);

            CREATE TABLE part (
                _id INTEGER PRIMARY KEY,
                mid INTEGER NOT NULL,
                ct TEXT,
                text TEXT
            );

            CREATE INDEX idx_part_mid ON part(mid);

            CREATE TABLE addr (
                _id INTEGER PRIMARY KEY,
                msg_id INTEGER NOT NULL,
                address TEXT,
                type INTEGER NOT NULL
            );

            CREATE INDEX idx_addr_msg_id ON addr(msg_id);
            "#,
        ),
        // Migration 2: address book and own line numbers
        M::up(
            r#"
            CREATE TABLE contacts (
                _id INTEGER PRIMARY KEY,
                display_name TEXT NOT NULL,
                number TEXT NOT NULL
            );

            CREATE TABLE line_numbers (
                number TEXT PRIMARY KEY
            );
            "#,
        ),
    ])
}

/// Message, contact and line-number stores over one SQLite snapshot
pub struct SqliteMessageStore {
    conn: Mutex<Connection>,
}

impl SqliteMessageStore {
    /// Open (or create) a snapshot database
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // Readers dominate; WAL lets writer helpers run alongside them
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }

    /// Write a direct-message row
    pub fn insert_direct(&self, record: &DirectRecord) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO sms (_id, thread_id, address, body, date, type)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                record.id,
                record.thread_id,
                record.address,
                record.body,
                record.timestamp_ms,
                record.kind
            ],
        )?;
        Ok(())
    }

    /// Write a multimedia message with an optional text part and its addresses
    pub fn insert_multimedia(
        &self,
        header: &MultimediaHeader,
        body: Option<&str>,
        addresses: &[MultimediaAddress],
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO mms (_id, thread_id, date, msg_box) VALUES (?, ?, ?, ?)",
            params![
                header.id,
                header.thread_id,
                header.timestamp_secs,
                header.message_box
            ],
        )?;
        if let Some(body) = body {
            tx.execute(
                "INSERT INTO part (mid, ct, text) VALUES (?, ?, ?)",
                params![header.id, TEXT_PLAIN, body],
            )?;
        }
        {
            let mut stmt =
                tx.prepare("INSERT INTO addr (msg_id, address, type) VALUES (?, ?, ?)")?;
            for addr in addresses {
                stmt.execute(params![header.id, addr.address, addr.kind.code()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Attach a non-text part (image, smil) to a multimedia message
    pub fn insert_part(&self, message_id: i64, content_type: &str, text: Option<&str>) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO part (mid, ct, text) VALUES (?, ?, ?)",
            params![message_id, content_type, text],
        )?;
        Ok(())
    }

    pub fn insert_contact(&self, contact: &Contact) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO contacts (display_name, number) VALUES (?, ?)",
            params![contact.name, contact.phone_number],
        )?;
        Ok(())
    }

    pub fn insert_line_number(&self, number: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR IGNORE INTO line_numbers (number) VALUES (?)",
            [number],
        )?;
        Ok(())
    }

    fn query_direct(&self, thread_id: Option<&ThreadId>) -> Result<Vec<DirectRecord>> {
        let conn = self.conn()?;
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(DirectRecord {
                id: row.get(0)?,
                thread_id: row.get(1)?,
                address: row.get(2)?,
                body: row.get(3)?,
                timestamp_ms: row.get(4)?,
                kind: row.get(5)?,
            })
        };

        let rows = match thread_id {
            Some(thread_id) => {
                let mut stmt = conn.prepare(
                    "SELECT _id, thread_id, address, body, date, type FROM sms
                     WHERE thread_id = ? ORDER BY date DESC",
                )?;
                let rows = collect_rows(stmt.query_map([thread_id.as_str()], map_row)?, "sms");
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT _id, thread_id, address, body, date, type FROM sms
                     ORDER BY date DESC",
                )?;
                let rows = collect_rows(stmt.query_map([], map_row)?, "sms");
                rows
            }
        };
        Ok(rows)
    }

    fn query_multimedia(&self, thread_id: Option<&ThreadId>) -> Result<Vec<MultimediaHeader>> {
        let conn = self.conn()?;
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(MultimediaHeader {
                id: row.get(0)?,
                thread_id: row.get(1)?,
                timestamp_secs: row.get(2)?,
                message_box: row.get(3)?,
            })
        };

        let rows = match thread_id {
            Some(thread_id) => {
                let mut stmt = conn.prepare(
                    "SELECT _id, thread_id, date, msg_box FROM mms
                     WHERE thread_id = ? ORDER BY date DESC",
                )?;
                let rows = collect_rows(stmt.query_map([thread_id.as_str()], map_row)?, "mms");
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT _id, thread_id, date, msg_box FROM mms ORDER BY date DESC",
                )?;
                let rows = collect_rows(stmt.query_map([], map_row)?, "mms");
                rows
            }
        };
        Ok(rows)
    }
}

impl MessageStore for SqliteMessageStore {
    fn direct_messages(&self) -> Result<Vec<DirectRecord>> {
        self.query_direct(None)
    }

    fn direct_messages_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<DirectRecord>> {
        self.query_direct(Some(thread_id))
    }

    fn multimedia_headers(&self) -> Result<Vec<MultimediaHeader>> {
        self.query_multimedia(None)
    }

    fn multimedia_headers_for_thread(
        &self,
        thread_id: &ThreadId,
    ) -> Result<Vec<MultimediaHeader>> {
        self.query_multimedia(Some(thread_id))
    }

    fn multimedia_body(&self, id: i64) -> Result<Option<String>> {
        let conn = self.conn()?;
        let text: Option<Option<String>> = conn
            .query_row(
                "SELECT text FROM part WHERE mid = ? AND ct = ? ORDER BY _id LIMIT 1",
                params![id, TEXT_PLAIN],
                |row| row.get(0),
            )
            .optional()?;
        Ok(text.flatten())
    }

    fn multimedia_addresses(&self, id: i64) -> Result<Vec<MultimediaAddress>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT address, type FROM addr WHERE msg_id = ? ORDER BY _id")?;
        let rows = collect_rows(
            stmt.query_map([id], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i32>(1)?))
            })?,
            "addr",
        );

        Ok(rows
            .into_iter()
            .filter_map(|(address, code)| {
                address.map(|a| MultimediaAddress::new(a, AddressKind::from_code(code)))
            })
            .collect())
    }
}

impl ContactStore for SqliteMessageStore {
    fn lookup_display_name(&self, address: &str) -> Result<Option<String>> {
        // Numbers are stored as typed by the user, so matching happens here
        // rather than in SQL
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT display_name, number FROM contacts ORDER BY _id")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let Ok(number) = row.get::<_, String>(1) else {
                continue;
            };
            if addresses_match(&number, address) {
                return Ok(Some(row.get(0)?));
            }
        }
        Ok(None)
    }

    fn list_all(&self) -> Result<Vec<Contact>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT display_name, number FROM contacts ORDER BY display_name, _id")?;
        let contacts = collect_rows(
            stmt.query_map([], |row| {
                Ok(Contact::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?,
            "contacts",
        );

        let mut seen = std::collections::HashSet::new();
        Ok(contacts
            .into_iter()
            .filter(|c| seen.insert(normalize(&c.phone_number)))
            .collect())
    }
}

impl LineNumberSource for SqliteMessageStore {
    fn line_numbers(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT number FROM line_numbers")?;
        let numbers = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(numbers)
    }
}
