// Persistent gamification counters and the reply classification that feeds
// them. Counters live in a small key/value table so they survive restarts.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;

pub const INSIGHTS_KEY: &str = "insightsExplored";
pub const BADGES_KEY: &str = "badgesEarned";
// Key used by earlier builds, before the counter was renamed.
const LEGACY_INSIGHTS_KEY: &str = "propertiesViewed";

/// A badge is earned on every fifth qualifying insight.
pub const BADGE_INTERVAL: u64 = 5;

// Backend replies that count as an "insight explored". The backend emits
// free-text answers, so classification is substring matching against the
// known section headers it produces.
const TRIGGER_PHRASES: &[&str] = &[
    "Here are some properties",
    "Commonly used marketing mediums:",
    "Common social media platforms used:",
    "Common digital marketing services used:",
    "Most customer leads are generated through:",
    "Satisfaction with lead quality:",
    "Opinion on digital marketing cost:",
];

/// Whether a bot reply qualifies for the exploration counter.
pub fn is_insight_reply(reply: &str) -> bool {
    TRIGGER_PHRASES.iter().any(|phrase| reply.contains(phrase))
        || (reply.contains("For **") && reply.contains("Marketing mediums:"))
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProgressSnapshot {
    pub insights_explored: u64,
    pub badges_earned: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct InsightOutcome {
    pub snapshot: ProgressSnapshot,
    pub badge_awarded: bool,
}

/// Counter storage. Production code opens the on-disk database per use;
/// tests construct an in-memory store.
pub struct ProgressStore {
    conn: Connection,
}

impl ProgressStore {
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS counters (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )",
            [],
        )?;
        let store = Self { conn };
        store.migrate_legacy_key()?;
        Ok(store)
    }

    // Carry a propertiesViewed value over to insightsExplored once, then
    // drop the old key.
    fn migrate_legacy_key(&self) -> rusqlite::Result<()> {
        if self.read(INSIGHTS_KEY)?.is_none() {
            if let Some(value) = self.read(LEGACY_INSIGHTS_KEY)? {
                self.write(INSIGHTS_KEY, value)?;
                self.conn.execute(
                    "DELETE FROM counters WHERE key = ?1",
                    params![LEGACY_INSIGHTS_KEY],
                )?;
            }
        }
        Ok(())
    }

    fn read(&self, key: &str) -> rusqlite::Result<Option<u64>> {
        let value: Option<i64> = self
            .conn
            .query_row(
                "SELECT value FROM counters WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.map(|n| n.max(0) as u64))
    }

    fn write(&self, key: &str, value: u64) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO counters (key, value) VALUES (?1, ?2)",
            params![key, value as i64],
        )?;
        Ok(())
    }

    /// Read a counter, treating an absent key as zero.
    pub fn get(&self, key: &str) -> rusqlite::Result<u64> {
        Ok(self.read(key)?.unwrap_or(0))
    }

    pub fn snapshot(&self) -> rusqlite::Result<ProgressSnapshot> {
        Ok(ProgressSnapshot {
            insights_explored: self.get(INSIGHTS_KEY)?,
            badges_earned: self.get(BADGES_KEY)?,
        })
    }

    /// Count one qualifying reply. Awards a badge whenever the exploration
    /// counter lands on a multiple of BADGE_INTERVAL.
    pub fn record_insight(&self) -> rusqlite::Result<InsightOutcome> {
        let insights = self.get(INSIGHTS_KEY)? + 1;
        self.write(INSIGHTS_KEY, insights)?;

        let mut badges = self.get(BADGES_KEY)?;
        let badge_awarded = insights % BADGE_INTERVAL == 0;
        if badge_awarded {
            badges += 1;
            self.write(BADGES_KEY, badges)?;
        }

        Ok(InsightOutcome {
            snapshot: ProgressSnapshot {
                insights_explored: insights,
                badges_earned: badges,
            },
            badge_awarded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("insight-chat-test-{}.db", uuid::Uuid::new_v4()))
    }

    #[test]
    fn badge_awarded_on_every_fifth_insight() {
        let store = ProgressStore::open_in_memory().unwrap();
        for n in 1..=12u64 {
            let outcome = store.record_insight().unwrap();
            assert_eq!(outcome.snapshot.insights_explored, n);
            assert_eq!(outcome.badge_awarded, n % 5 == 0, "insight #{n}");
            assert_eq!(outcome.snapshot.badges_earned, n / 5);
        }
    }

    #[test]
    fn counters_survive_reopen() {
        let path = temp_db_path();
        {
            let store = ProgressStore::open(&path).unwrap();
            for _ in 0..3 {
                store.record_insight().unwrap();
            }
        }
        let store = ProgressStore::open(&path).unwrap();
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.insights_explored, 3);
        assert_eq!(snapshot.badges_earned, 0);
        drop(store);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn legacy_key_migrates_into_insights() {
        let path = temp_db_path();
        {
            let store = ProgressStore::open(&path).unwrap();
            store.write(LEGACY_INSIGHTS_KEY, 7).unwrap();
            // Drop the key the migration would otherwise find populated.
            store
                .conn
                .execute("DELETE FROM counters WHERE key = ?1", params![INSIGHTS_KEY])
                .unwrap();
        }
        let store = ProgressStore::open(&path).unwrap();
        assert_eq!(store.get(INSIGHTS_KEY).unwrap(), 7);
        assert_eq!(store.get(LEGACY_INSIGHTS_KEY).unwrap(), 0);
        drop(store);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn property_listing_reply_qualifies() {
        assert!(is_insight_reply(
            "Here are some properties nearby that match your criteria:<br>"
        ));
        assert!(is_insight_reply("Commonly used marketing mediums: print, radio"));
    }

    #[test]
    fn compound_trigger_requires_both_phrases() {
        assert!(is_insight_reply("For **Skyline Towers**, Marketing mediums: digital"));
        assert!(!is_insight_reply("For **Skyline Towers** we have three units left"));
        assert!(!is_insight_reply("Marketing mediums: digital"));
    }

    #[test]
    fn plain_reply_does_not_qualify() {
        assert!(!is_insight_reply(
            "Hello! I'm your Real Estate Chatbot. How can I help you today?"
        ));
        assert!(!is_insight_reply(""));
    }
}
