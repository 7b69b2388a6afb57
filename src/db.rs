//! SQLite catalog storage.
//!
//! The catalog lives in a single `song` table. It is written once (import)
//! and read once at startup; everything after that happens against the
//! in-memory [`Catalog`].

use crate::catalog::{Catalog, CatalogEntry, FeatureVector, TempoCategory};
use anyhow::{Context, Result};
use log::info;
use rusqlite::Connection;
use std::path::Path;

/// Open (or create) the catalog database at `db_path`.
pub fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open catalog database at {}", db_path.display()))?;
    Ok(conn)
}

/// Create the `song` table if missing and insert `entries`. Meant to run
/// once per import.
pub fn init(entries: &[CatalogEntry], db_path: &Path) -> Result<Connection> {
    let mut conn = connect(db_path).context("Connection refused when initializing catalog DB")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS song (
            id           INTEGER PRIMARY KEY,
            title        TEXT    NOT NULL,
            artist       TEXT    NOT NULL,
            genre        TEXT    NOT NULL,
            mood_key     TEXT    NOT NULL,
            tempo        TEXT    NOT NULL,
            bpm          REAL    NOT NULL,
            popularity   REAL    NOT NULL,
            valence      REAL    NOT NULL,
            energy       REAL    NOT NULL,
            danceability REAL    NOT NULL,
            acousticness REAL    NOT NULL,
            tempo_norm   REAL    NOT NULL
        )",
        (),
    )
    .context("Invalid SQL command when creating song table")?;

    insert(entries, &mut conn)
        .context("Failed to insert songs into catalog database while initializing")?;

    Ok(conn)
}

/// Batch insert inside one transaction.
fn insert(entries: &[CatalogEntry], conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO song (title, artist, genre, mood_key, tempo, bpm, popularity,
                               valence, energy, danceability, acousticness, tempo_norm)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;

        for entry in entries {
            let f = entry.features.0;
            stmt.execute((
                &entry.title,
                &entry.artist,
                &entry.genre,
                &entry.mood_key,
                entry.tempo_category.as_str(),
                entry.bpm,
                entry.popularity,
                f[0],
                f[1],
                f[2],
                f[3],
                f[4],
            ))
            .with_context(|| {
                format!(
                    "Invalid SQL statement when inserting song '{}' by '{}'",
                    entry.title, entry.artist
                )
            })?;
        }
    }

    tx.commit().context("Committing SQL transaction failed")?;
    Ok(())
}

/// Load the full catalog in row order. Row order is the stable tie-break
/// order the engine depends on.
pub fn load_catalog(conn: &Connection) -> Result<Catalog> {
    let mut stmt = conn
        .prepare("SELECT id, title, artist, genre, mood_key, tempo, bpm, popularity,
                         valence, energy, danceability, acousticness, tempo_norm
                  FROM song ORDER BY id")
        .context("Invalid SQL statement when selecting songs")?;

    let song_iter = stmt
        .query_map([], |row| {
            let tempo: String = row.get(5)?;
            Ok(CatalogEntry {
                id: row.get(0)?,
                title: row.get(1)?,
                artist: row.get(2)?,
                genre: row.get(3)?,
                mood_key: row.get(4)?,
                tempo_category: TempoCategory::parse(&tempo).unwrap_or(TempoCategory::Medium),
                bpm: row.get(6)?,
                popularity: row.get(7)?,
                features: FeatureVector([
                    row.get(8)?,
                    row.get(9)?,
                    row.get(10)?,
                    row.get(11)?,
                    row.get(12)?,
                ]),
            })
        })
        .context("Cannot query songs")?;

    let mut entries: Vec<CatalogEntry> = Vec::new();
    for entry in song_iter {
        entries.push(entry.context("Queried song row failed to decode")?);
    }

    info!("Loaded {} songs from catalog database", entries.len());
    Ok(Catalog::new(entries))
}

/// Import a JSON array of catalog entries and write it to the database.
/// Existing content is replaced.
pub fn import_json(json_path: &Path, db_path: &Path) -> Result<usize> {
    let raw = std::fs::read_to_string(json_path)
        .with_context(|| format!("Failed to read catalog file {}", json_path.display()))?;
    let entries: Vec<CatalogEntry> = serde_json::from_str(&raw).with_context(|| {
        format!(
            "Catalog file {} is not a valid song array",
            json_path.display()
        )
    })?;

    let conn = connect(db_path)?;
    conn.execute("DROP TABLE IF EXISTS song", ())
        .context("Failed to clear existing song table")?;
    drop(conn);

    init(&entries, db_path)?;
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entries() -> Vec<CatalogEntry> {
        vec![
            CatalogEntry {
                id: 1,
                title: "Bohemian Rhapsody".to_string(),
                artist: "Queen".to_string(),
                genre: "rock".to_string(),
                mood_key: "epic powerful".to_string(),
                tempo_category: TempoCategory::Medium,
                bpm: 110.0,
                popularity: 95.0,
                features: FeatureVector([0.4, 0.6, 0.4, 0.3, 0.5]),
            },
            CatalogEntry {
                id: 2,
                title: "Levitating".to_string(),
                artist: "Dua Lipa".to_string(),
                genre: "pop".to_string(),
                mood_key: "happy energetic".to_string(),
                tempo_category: TempoCategory::Fast,
                bpm: 126.0,
                popularity: 88.0,
                features: FeatureVector([0.9, 0.8, 0.9, 0.1, 0.7]),
            },
        ]
    }

    #[test]
    fn test_init_and_load_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db_path = dir.path().join("catalog.db");

        init(&sample_entries(), &db_path)?;
        let conn = connect(&db_path)?;
        let catalog = load_catalog(&conn)?;

        assert_eq!(catalog.len(), 2);
        let first = &catalog.entries()[0];
        assert_eq!(first.title, "Bohemian Rhapsody");
        assert_eq!(first.tempo_category, TempoCategory::Medium);
        assert!((first.features.0[0] - 0.4).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_load_preserves_insertion_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db_path = dir.path().join("catalog.db");

        init(&sample_entries(), &db_path)?;
        let conn = connect(&db_path)?;
        let catalog = load_catalog(&conn)?;

        let titles: Vec<&str> = catalog.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Bohemian Rhapsody", "Levitating"]);
        Ok(())
    }

    #[test]
    fn test_import_json_replaces_content() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db_path = dir.path().join("catalog.db");
        let json_path = dir.path().join("songs.json");

        init(&sample_entries(), &db_path)?;

        let single = serde_json::to_string(&sample_entries()[..1])?;
        std::fs::write(&json_path, single)?;

        let count = import_json(&json_path, &db_path)?;
        assert_eq!(count, 1);

        let conn = connect(&db_path)?;
        let catalog = load_catalog(&conn)?;
        assert_eq!(catalog.len(), 1, "Import should replace, not append");
        Ok(())
    }
}
