//! SQLite-backed device container.

use std::str::FromStr;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::crypto::KeyPair;
use crate::logger::Logger;
use crate::store::{Device, StoreError, StoreResult};
use crate::types::JID;

/// Schema upgrades, applied in order. Index + 1 is the resulting version.
const UPGRADES: &[&str] = &[
    "CREATE TABLE device (
        jid             TEXT    PRIMARY KEY,
        registration_id INTEGER NOT NULL,
        noise_key       BLOB    NOT NULL,
        identity_key    BLOB    NOT NULL,
        adv_secret_key  BLOB    NOT NULL,
        platform        TEXT    NOT NULL DEFAULT '',
        business_name   TEXT    NOT NULL DEFAULT '',
        push_name       TEXT    NOT NULL DEFAULT ''
    )",
    "CREATE TABLE contacts (
        our_jid   TEXT NOT NULL REFERENCES device(jid) ON DELETE CASCADE ON UPDATE CASCADE,
        their_jid TEXT NOT NULL,
        push_name TEXT NOT NULL,
        PRIMARY KEY (our_jid, their_jid)
    )",
];

/// Handle to the session database. Cheap to clone.
#[derive(Clone)]
pub struct Container {
    pool: SqlitePool,
    log: Arc<dyn Logger>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl Container {
    /// Open (creating if missing) the database at `url`, with foreign keys
    /// enforced, and bring the schema up to date.
    pub async fn open(url: &str, log: Arc<dyn Logger>) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let container = Self { pool, log };
        container.upgrade().await?;
        Ok(container)
    }

    async fn upgrade(&self) -> StoreResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;
        let current: Option<i64> = sqlx::query_scalar("SELECT version FROM version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        let current = current.unwrap_or(0).max(0) as usize;

        for (index, statement) in UPGRADES.iter().enumerate().skip(current) {
            let version = index + 1;
            self.log
                .infof(format_args!("Upgrading database to v{version}"));
            let mut tx = self.pool.begin().await?;
            sqlx::query(statement).execute(&mut *tx).await?;
            sqlx::query("DELETE FROM version").execute(&mut *tx).await?;
            sqlx::query("INSERT INTO version (version) VALUES (?)")
                .bind(version as i64)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }
        Ok(())
    }

    /// Schema version currently applied.
    pub async fn version(&self) -> StoreResult<i64> {
        let version = sqlx::query_scalar("SELECT version FROM version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(version.unwrap_or(0))
    }

    /// First stored device, or a fresh unsaved one if the store is empty.
    pub async fn get_first_device(&self) -> StoreResult<Device> {
        let row = sqlx::query(
            "SELECT jid, registration_id, noise_key, identity_key, adv_secret_key,
                    platform, business_name, push_name
             FROM device LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let device = device_from_row(&row)?;
                self.log.debugf(format_args!(
                    "Loaded device {} (noise key {})",
                    device.id.as_ref().map(JID::to_string).unwrap_or_default(),
                    device.noise_key.fingerprint()
                ));
                Ok(device)
            }
            None => {
                self.log
                    .debugf(format_args!("No stored device, creating a new one"));
                Ok(Device::new())
            }
        }
    }

    /// Insert or update a paired device.
    pub async fn put_device(&self, device: &Device) -> StoreResult<()> {
        let jid = device.id.as_ref().ok_or(StoreError::NoDeviceId)?;
        sqlx::query(
            "INSERT INTO device (jid, registration_id, noise_key, identity_key, adv_secret_key,
                                 platform, business_name, push_name)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (jid) DO UPDATE SET
                platform = excluded.platform,
                business_name = excluded.business_name,
                push_name = excluded.push_name",
        )
        .bind(jid.to_string())
        .bind(device.registration_id as i64)
        .bind(device.noise_key.private.as_slice())
        .bind(device.identity_key.private.as_slice())
        .bind(device.adv_secret_key.as_slice())
        .bind(&device.platform)
        .bind(&device.business_name)
        .bind(&device.push_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove a device and, through the foreign key, everything it owns.
    pub async fn delete_device(&self, jid: &JID) -> StoreResult<()> {
        sqlx::query("DELETE FROM device WHERE jid = ?")
            .bind(jid.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remember the display name a contact announced.
    pub async fn put_push_name(&self, our: &JID, their: &JID, push_name: &str) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO contacts (our_jid, their_jid, push_name) VALUES (?, ?, ?)
             ON CONFLICT (our_jid, their_jid) DO UPDATE SET push_name = excluded.push_name",
        )
        .bind(our.to_string())
        .bind(their.to_non_ad().to_string())
        .bind(push_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_push_name(&self, our: &JID, their: &JID) -> StoreResult<Option<String>> {
        let name = sqlx::query_scalar(
            "SELECT push_name FROM contacts WHERE our_jid = ? AND their_jid = ?",
        )
        .bind(our.to_string())
        .bind(their.to_non_ad().to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(name)
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn device_from_row(row: &SqliteRow) -> StoreResult<Device> {
    let jid: String = row.try_get("jid")?;
    let id: JID = jid
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("device jid {jid:?}: {e}")))?;

    let key = |column: &str| -> StoreResult<KeyPair> {
        let bytes: Vec<u8> = row.try_get(column)?;
        KeyPair::from_slice(&bytes)
            .ok_or_else(|| StoreError::Corrupt(format!("{column} has {} bytes", bytes.len())))
    };
    let noise_key = key("noise_key")?;
    let identity_key = key("identity_key")?;

    let adv: Vec<u8> = row.try_get("adv_secret_key")?;
    let adv_secret_key: [u8; 32] = adv
        .as_slice()
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("adv_secret_key has {} bytes", adv.len())))?;

    let registration_id: i64 = row.try_get("registration_id")?;

    Ok(Device {
        id: Some(id),
        registration_id: registration_id as u32,
        noise_key,
        identity_key,
        adv_secret_key,
        platform: row.try_get("platform")?,
        business_name: row.try_get("business_name")?,
        push_name: row.try_get("push_name")?,
    })
}
