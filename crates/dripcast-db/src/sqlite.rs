//! SQLite record store.
//!
//! Three tables: `recipients`, `messages` and `deliveries`. The composite
//! primary key on `deliveries` is what makes a second insert for the same
//! pair fail, and the foreign keys cascade deletions of either parent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dripcast_core::error::{DripError, Result};
use dripcast_core::traits::RecordStore;
use dripcast_core::types::{
    ChannelAddress, DelayHours, DeliveryRecord, Message, MessageId, NewMessage, NewRecipient,
    Recipient, RecipientId, Snapshot,
};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const RECIPIENT_COLUMNS: &str = "id, name, address, role, registered_at";
const MESSAGE_COLUMNS: &str = "id, title, body, delay_hours, link";
const DELIVERY_COLUMNS: &str = "recipient_id, message_id, sent_at";

/// SQLite-backed record store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database file. Call `init_schema` before use.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| DripError::Store(format!("DB open: {e}")))?;

        // WAL keeps reads cheap while the scheduler writes delivery records
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        Self::from_connection(conn)
    }

    /// Private in-memory database (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DripError::Store(format!("DB open: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(store_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DripError::Store(format!("Lock: {e}")))
    }

    /// Row counts: (recipients, messages, deliveries).
    pub fn counts(&self) -> Result<(usize, usize, usize)> {
        let conn = self.lock()?;
        let count = |table: &str| -> Result<usize> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| {
                r.get::<_, i64>(0)
            })
            .map(|n| n as usize)
            .map_err(store_err)
        };
        Ok((count("recipients")?, count("messages")?, count("deliveries")?))
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS recipients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                address INTEGER NOT NULL UNIQUE,     -- telegram chat id
                role TEXT NOT NULL DEFAULT 'user',
                registered_at TEXT NOT NULL          -- RFC 3339, UTC
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                delay_hours REAL NOT NULL,
                link TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS deliveries (
                recipient_id INTEGER NOT NULL REFERENCES recipients(id) ON DELETE CASCADE,
                message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                sent_at TEXT NOT NULL,
                PRIMARY KEY (recipient_id, message_id)
            );

            CREATE INDEX IF NOT EXISTS idx_deliveries_message ON deliveries(message_id);
            ",
        )
        .map_err(|e| DripError::Store(format!("Migration: {e}")))?;
        tracing::debug!("🗄️ Record store schema ready");
        Ok(())
    }

    async fn list_recipients(&self) -> Result<Vec<Recipient>> {
        let conn = self.lock()?;
        query_recipients(&conn)
    }

    async fn list_messages(&self) -> Result<Vec<Message>> {
        let conn = self.lock()?;
        query_messages(&conn)
    }

    async fn list_delivery_records(&self) -> Result<Vec<DeliveryRecord>> {
        let conn = self.lock()?;
        query_deliveries(&conn)
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(store_err)?;
        let snapshot = Snapshot {
            recipients: query_recipients(&tx)?,
            messages: query_messages(&tx)?,
            deliveries: query_deliveries(&tx)?,
        };
        tx.commit().map_err(store_err)?;
        Ok(snapshot)
    }

    async fn find_recipient_by_address(
        &self,
        address: ChannelAddress,
    ) -> Result<Option<Recipient>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {RECIPIENT_COLUMNS} FROM recipients WHERE address = ?1"),
            [address.0],
            recipient_from_row,
        )
        .optional()
        .map_err(store_err)
    }

    async fn find_delivery_record(
        &self,
        recipient_id: RecipientId,
        message_id: MessageId,
    ) -> Result<Option<DeliveryRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE recipient_id = ?1 AND message_id = ?2"
            ),
            params![recipient_id.0, message_id.0],
            delivery_from_row,
        )
        .optional()
        .map_err(store_err)
    }

    async fn insert_delivery_record(&self, record: &DeliveryRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO deliveries (recipient_id, message_id, sent_at) VALUES (?1, ?2, ?3)",
            params![
                record.recipient_id.0,
                record.message_id.0,
                record.sent_at.to_rfc3339()
            ],
        )
        .map_err(|e| match constraint_kind(&e) {
            Some(Constraint::Key) => DripError::DuplicateKey {
                recipient_id: record.recipient_id.0,
                message_id: record.message_id.0,
            },
            Some(Constraint::ForeignKey) => DripError::NotFound(format!(
                "recipient {} or message {} no longer exists",
                record.recipient_id, record.message_id
            )),
            None => store_err(e),
        })?;
        Ok(())
    }

    async fn insert_recipient(&self, recipient: NewRecipient) -> Result<Recipient> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO recipients (name, address, role, registered_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                recipient.name,
                recipient.address.0,
                recipient.role,
                recipient.registered_at.to_rfc3339()
            ],
        )
        .map_err(|e| match constraint_kind(&e) {
            Some(Constraint::Key) => DripError::Validation(format!(
                "address {} is already registered",
                recipient.address
            )),
            _ => store_err(e),
        })?;
        let id = RecipientId(conn.last_insert_rowid());
        tracing::info!("👤 Recipient registered: '{}' ({})", recipient.name, id);
        Ok(Recipient {
            id,
            name: recipient.name,
            address: recipient.address,
            role: recipient.role,
            registered_at: recipient.registered_at,
        })
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (title, body, delay_hours, link) VALUES (?1, ?2, ?3, ?4)",
            params![
                message.title,
                message.body,
                message.delay.hours(),
                message.link
            ],
        )
        .map_err(store_err)?;
        let id = MessageId(conn.last_insert_rowid());
        tracing::info!("📝 Message added: '{}' ({}, +{}h)", message.title, id, message.delay.hours());
        Ok(Message {
            id,
            title: message.title,
            body: message.body,
            delay: message.delay,
            link: message.link,
        })
    }

    async fn delete_recipient(&self, id: RecipientId) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(store_err)?;
        tx.execute("DELETE FROM deliveries WHERE recipient_id = ?1", [id.0])
            .map_err(store_err)?;
        let removed = tx
            .execute("DELETE FROM recipients WHERE id = ?1", [id.0])
            .map_err(store_err)?;
        tx.commit().map_err(store_err)?;
        Ok(removed > 0)
    }

    async fn delete_message(&self, id: MessageId) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(store_err)?;
        tx.execute("DELETE FROM deliveries WHERE message_id = ?1", [id.0])
            .map_err(store_err)?;
        let removed = tx
            .execute("DELETE FROM messages WHERE id = ?1", [id.0])
            .map_err(store_err)?;
        tx.commit().map_err(store_err)?;
        Ok(removed > 0)
    }
}

// ─── Row mapping ──────────────────────────────────────────

fn query_recipients(conn: &Connection) -> Result<Vec<Recipient>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {RECIPIENT_COLUMNS} FROM recipients ORDER BY id"))
        .map_err(store_err)?;
    let rows = stmt
        .query_map([], recipient_from_row)
        .map_err(store_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(store_err)?;
    Ok(rows)
}

fn query_messages(conn: &Connection) -> Result<Vec<Message>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY id"))
        .map_err(store_err)?;
    let rows = stmt
        .query_map([], message_from_row)
        .map_err(store_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(store_err)?;
    Ok(rows)
}

fn query_deliveries(conn: &Connection) -> Result<Vec<DeliveryRecord>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM deliveries ORDER BY recipient_id, message_id"
        ))
        .map_err(store_err)?;
    let rows = stmt
        .query_map([], delivery_from_row)
        .map_err(store_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(store_err)?;
    Ok(rows)
}

fn recipient_from_row(row: &Row<'_>) -> rusqlite::Result<Recipient> {
    Ok(Recipient {
        id: RecipientId(row.get(0)?),
        name: row.get(1)?,
        address: ChannelAddress(row.get(2)?),
        role: row.get(3)?,
        registered_at: parse_timestamp(4, row.get(4)?)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: MessageId(row.get(0)?),
        title: row.get(1)?,
        body: row.get(2)?,
        delay: DelayHours::from_stored(row.get(3)?),
        link: row.get(4)?,
    })
}

fn delivery_from_row(row: &Row<'_>) -> rusqlite::Result<DeliveryRecord> {
    Ok(DeliveryRecord {
        recipient_id: RecipientId(row.get(0)?),
        message_id: MessageId(row.get(1)?),
        sent_at: parse_timestamp(2, row.get(2)?)?,
    })
}

/// Bad timestamps fail the read instead of silently becoming "now".
fn parse_timestamp(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

enum Constraint {
    Key,
    ForeignKey,
}

fn constraint_kind(e: &rusqlite::Error) -> Option<Constraint> {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => match err.extended_code {
            rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE => {
                Some(Constraint::Key)
            }
            rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some(Constraint::ForeignKey),
            _ => None,
        },
        _ => None,
    }
}

fn store_err(e: rusqlite::Error) -> DripError {
    DripError::Store(e.to_string())
}
