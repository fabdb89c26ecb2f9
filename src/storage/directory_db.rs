use async_trait::async_trait;
use rusqlite::{OptionalExtension, Row, params};
use std::path::Path;

use super::database::Database;
use crate::collaborators::{CollaboratorResult, OrderLookup, ProfileLookup};
use crate::common::clock::{from_millis, to_millis};
use crate::common::{OrderSummary, Profile, normalize_identity};
use crate::error::{ChatResult, CollaboratorError};

fn row_to_order(row: &Row) -> rusqlite::Result<OrderSummary> {
    Ok(OrderSummary {
        id: row.get(0)?,
        identity: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        attachment_key: row.get(4)?,
        pickup_location: row.get(5)?,
        delivery_location: row.get(6)?,
        receiver_name: row.get(7)?,
        weight: row.get(8)?,
        created_at: from_millis(row.get(9)?),
    })
}

/// Customer profiles and order summaries used to decorate inbox threads.
///
/// Account and order management live elsewhere; this table set only mirrors
/// the fields the chat reads.
pub struct DirectoryDatabase {
    db: Database,
}

impl DirectoryDatabase {
    pub fn with_path<P: AsRef<Path>>(path: P) -> ChatResult<Self> {
        let directory = Self {
            db: Database::new(path)?,
        };
        directory.init_schema()?;
        Ok(directory)
    }

    pub fn in_memory() -> ChatResult<Self> {
        let directory = Self {
            db: Database::in_memory()?,
        };
        directory.init_schema()?;
        Ok(directory)
    }

    fn init_schema(&self) -> ChatResult<()> {
        let conn = self.db.connection()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS profiles (
                identity TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                avatar_key TEXT
            );
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                identity TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'Pending',
                attachment_key TEXT,
                pickup_location TEXT NOT NULL DEFAULT '',
                delivery_location TEXT NOT NULL DEFAULT '',
                receiver_name TEXT NOT NULL DEFAULT '',
                weight TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_orders_identity_created
                ON orders(identity, created_at);",
        )?;
        Ok(())
    }

    pub fn upsert_profile(&self, profile: &Profile) -> ChatResult<()> {
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO profiles (identity, display_name, avatar_key)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(identity) DO UPDATE SET
                display_name = excluded.display_name,
                avatar_key = excluded.avatar_key",
            params![
                normalize_identity(&profile.identity),
                profile.display_name,
                profile.avatar_key
            ],
        )?;
        Ok(())
    }

    pub fn insert_order(&self, order: &OrderSummary) -> ChatResult<()> {
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT OR REPLACE INTO orders
             (id, identity, description, status, attachment_key,
              pickup_location, delivery_location, receiver_name, weight, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                order.id,
                normalize_identity(&order.identity),
                order.description,
                order.status,
                order.attachment_key,
                order.pickup_location,
                order.delivery_location,
                order.receiver_name,
                order.weight,
                to_millis(order.created_at),
            ],
        )?;
        Ok(())
    }

    fn find_profile(&self, identity: &str) -> ChatResult<Option<Profile>> {
        let conn = self.db.connection()?;
        let profile = conn
            .query_row(
                "SELECT identity, display_name, avatar_key FROM profiles WHERE identity = ?1",
                params![identity],
                |row| {
                    Ok(Profile {
                        identity: row.get(0)?,
                        display_name: row.get(1)?,
                        avatar_key: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    fn find_latest_order(&self, identity: &str) -> ChatResult<Option<OrderSummary>> {
        let conn = self.db.connection()?;
        let order = conn
            .query_row(
                "SELECT id, identity, description, status, attachment_key,
                        pickup_location, delivery_location, receiver_name, weight, created_at
                 FROM orders
                 WHERE identity = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1",
                params![identity],
                row_to_order,
            )
            .optional()?;
        Ok(order)
    }
}

#[async_trait]
impl ProfileLookup for DirectoryDatabase {
    async fn lookup_by_identity(&self, identity: &str) -> CollaboratorResult<Option<Profile>> {
        self.find_profile(&normalize_identity(identity))
            .map_err(|err| CollaboratorError::Request(err.to_string()))
    }
}

#[async_trait]
impl OrderLookup for DirectoryDatabase {
    async fn latest_for_identity(
        &self,
        identity: &str,
    ) -> CollaboratorResult<Option<OrderSummary>> {
        self.find_latest_order(&normalize_identity(identity))
            .map_err(|err| CollaboratorError::Request(err.to_string()))
    }
}
