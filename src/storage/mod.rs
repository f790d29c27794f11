use crate::catalog::{Platform, Track, TrackKey};
use crate::ledger::{Entry, PlayRecord};
use anyhow::Context;
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};

/// Durable per-track progress, keyed by `(platform, id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub platform: Platform,
    pub id: String,
    pub name: String,
    pub artist: String,
    pub album: Option<String>,
    pub pic: Option<String>,
    pub play_time: f64,
    pub duration: f64,
    pub save_time: i64,
}

impl StoredRecord {
    pub fn key(&self) -> TrackKey {
        TrackKey::new(self.platform, self.id.clone())
    }

    pub fn from_entry(entry: &Entry, save_time: i64) -> Self {
        let t = &entry.track;
        Self {
            platform: t.platform,
            id: t.id.clone(),
            name: t.name.clone(),
            artist: t.artist.clone(),
            album: t.album.clone(),
            pic: t.pic.clone(),
            play_time: entry.record.offset,
            duration: entry.record.duration,
            save_time,
        }
    }

    pub fn into_entry(self) -> Entry {
        Entry {
            track: Track {
                platform: self.platform,
                id: self.id,
                name: self.name,
                artist: self.artist,
                album: self.album,
                pic: self.pic,
            },
            record: PlayRecord {
                offset: self.play_time.max(0.0),
                duration: self.duration.max(0.0),
                stamp: self.save_time,
            },
        }
    }
}

pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }

        let conn = Connection::open(path).with_context(|| format!("open {}", path.display()))?;
        let s = Self { conn };
        s.init_schema()?;
        Ok(s)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let s = Self {
            conn: Connection::open_in_memory().context("open in-memory db")?,
        };
        s.init_schema()?;
        Ok(s)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(
                r#"
CREATE TABLE IF NOT EXISTS play_records (
  platform TEXT NOT NULL,
  id TEXT NOT NULL,
  name TEXT NOT NULL,
  artist TEXT NOT NULL,
  album TEXT,
  pic TEXT,
  play_time REAL NOT NULL DEFAULT 0,
  duration REAL NOT NULL DEFAULT 0,
  save_time INTEGER NOT NULL,
  PRIMARY KEY (platform, id)
);

CREATE INDEX IF NOT EXISTS idx_records_save_time ON play_records(save_time DESC);
"#,
            )
            .context("init schema")?;
        Ok(())
    }

    /// All records, most recently saved first.
    pub fn list(&self) -> anyhow::Result<Vec<StoredRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
SELECT platform, id, name, artist, album, pic, play_time, duration, save_time
FROM play_records
ORDER BY save_time DESC
"#,
            )
            .context("prepare list records")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    StoredRecord {
                        platform: Platform::default(),
                        id: row.get(1)?,
                        name: row.get(2)?,
                        artist: row.get(3)?,
                        album: row.get(4)?,
                        pic: row.get(5)?,
                        play_time: row.get(6)?,
                        duration: row.get(7)?,
                        save_time: row.get(8)?,
                    },
                ))
            })
            .context("query records")?;

        let mut records = Vec::new();
        for row in rows {
            let (platform, mut record) = row.context("read record row")?;
            match platform.parse() {
                Ok(p) => {
                    record.platform = p;
                    records.push(record);
                }
                Err(_) => tracing::warn!(%platform, id = %record.id, "skipping record with unknown platform"),
            }
        }
        Ok(records)
    }

    /// Last write wins.
    pub fn upsert(&self, record: &StoredRecord) -> anyhow::Result<()> {
        upsert_with(&self.conn, record).context("upsert record")?;
        Ok(())
    }

    pub fn delete(&self, key: &TrackKey) -> anyhow::Result<()> {
        self.conn
            .execute(
                "DELETE FROM play_records WHERE platform=?1 AND id=?2",
                params![key.platform.as_str(), key.id],
            )
            .context("delete record")?;
        Ok(())
    }

    pub fn delete_all(&self) -> anyhow::Result<()> {
        self.conn
            .execute("DELETE FROM play_records", [])
            .context("delete all records")?;
        Ok(())
    }

    /// Insert many records in one transaction.
    pub fn batch_insert(&mut self, records: &[StoredRecord]) -> anyhow::Result<()> {
        let tx = self.conn.transaction().context("begin batch insert")?;
        for record in records {
            upsert_with(&tx, record).with_context(|| format!("batch insert {}", record.key()))?;
        }
        tx.commit().context("commit batch insert")?;
        Ok(())
    }
}

fn upsert_with(conn: &Connection, r: &StoredRecord) -> rusqlite::Result<usize> {
    conn.execute(
        r#"
INSERT INTO play_records(platform, id, name, artist, album, pic, play_time, duration, save_time)
VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
ON CONFLICT(platform, id) DO UPDATE SET
  name=excluded.name,
  artist=excluded.artist,
  album=excluded.album,
  pic=excluded.pic,
  play_time=excluded.play_time,
  duration=excluded.duration,
  save_time=excluded.save_time
"#,
        params![
            r.platform.as_str(),
            r.id,
            r.name,
            r.artist,
            r.album,
            r.pic,
            r.play_time,
            r.duration,
            r.save_time
        ],
    )
}

/// Opens the database per operation so calls can run on `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct StorageHandle {
    path: PathBuf,
}

impl StorageHandle {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn open(&self) -> anyhow::Result<Storage> {
        Storage::open(&self.path)
    }

    pub fn list(&self) -> anyhow::Result<Vec<StoredRecord>> {
        self.open()?.list()
    }

    pub fn upsert(&self, record: &StoredRecord) -> anyhow::Result<()> {
        self.open()?.upsert(record)
    }

    pub fn delete(&self, key: &TrackKey) -> anyhow::Result<()> {
        self.open()?.delete(key)
    }

    pub fn delete_all(&self) -> anyhow::Result<()> {
        self.open()?.delete_all()
    }

    pub fn batch_insert(&self, records: &[StoredRecord]) -> anyhow::Result<()> {
        self.open()?.batch_insert(records)
    }
}
