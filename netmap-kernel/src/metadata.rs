/*!
MÉTADONNÉES DES BÂTIMENTS - Lecture de la base SQLite BuildingInfo

RÔLE :
Transforme la base binaire récupérée à chaque cycle en liste de sites (titre,
coordonnées, codes du flux rattachés au marqueur).

FONCTIONNEMENT :
- Les octets reçus sont posés dans un fichier temporaire puis ouverts en lecture seule
- Colonne Devices : liste séparée par des virgules, espaces ignorés, codes normalisés
- Base illisible ou table/colonnes absentes -> MetadataError, le cycle est abandonné
*/

use crate::index::normalize_key;
use crate::models::Site;
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use std::io::Write;
use tracing::{debug, warn};

pub const SITE_QUERY: &str = "SELECT Title, Latitude, Longitude, Devices FROM BuildingInfo";

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata is not a readable SQLite database: {0}")]
    Open(#[source] rusqlite::Error),
    #[error("metadata does not match the BuildingInfo layout: {0}")]
    QueryShape(#[source] rusqlite::Error),
    #[error("cannot stage metadata on disk: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for MetadataError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(err.code, ErrorCode::NotADatabase | ErrorCode::CannotOpen) =>
            {
                MetadataError::Open(e)
            }
            _ => MetadataError::QueryShape(e),
        }
    }
}

pub fn load_sites(bytes: &[u8]) -> Result<Vec<Site>, MetadataError> {
    let mut staged = tempfile::NamedTempFile::new()?;
    staged.write_all(bytes)?;
    staged.flush()?;

    let conn = Connection::open_with_flags(
        staged.path(),
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let sites = query_sites(&conn)?;
    debug!("[metadata] loaded {} sites", sites.len());
    Ok(sites)
}

pub fn query_sites(conn: &Connection) -> Result<Vec<Site>, MetadataError> {
    let mut stmt = conn.prepare(SITE_QUERY)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, Value>(0)?,
            row.get::<_, Value>(1)?,
            row.get::<_, Value>(2)?,
            row.get::<_, Value>(3)?,
        ))
    })?;

    let mut sites = Vec::new();
    for row in rows {
        let (title, lat, lon, devices) = row?;
        let title = text(&title).unwrap_or_default();
        let (Some(latitude), Some(longitude)) = (coordinate(&lat), coordinate(&lon)) else {
            warn!("[metadata] skipping site '{title}': unusable coordinates");
            continue;
        };
        sites.push(Site {
            title,
            latitude,
            longitude,
            location_keys: text(&devices).as_deref().map(split_devices).unwrap_or_default(),
        });
    }
    Ok(sites)
}

/// "RY, SN ,07" -> ["RY", "SN", "7"]
pub fn split_devices(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(normalize_key)
        .collect()
}

/// Colonnes sans type strict : un code purement numérique arrive en INTEGER ou REAL
fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(v) => Some(v.to_string()),
        Value::Real(v) => Some(v.to_string()),
        Value::Text(s) => Some(s.clone()),
        Value::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    }
}

fn coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Real(v) => Some(*v),
        Value::Integer(v) => Some(*v as f64),
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_devices() {
        assert_eq!(split_devices("RY, SN ,07"), vec!["RY", "SN", "7"]);
        assert_eq!(split_devices("RY,,  "), vec!["RY"]);
        assert!(split_devices("").is_empty());
    }

    #[test]
    fn test_load_sites() {
        let bytes = fixture::building_db(&[
            ("Ryder Hall", 42.3366, -71.0907, "RY"),
            ("Snell Library", 42.3384, -71.0882, "SN, SNL ,012"),
        ]);
        let sites = load_sites(&bytes).unwrap();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].title, "Ryder Hall");
        assert_eq!(sites[1].location_keys, vec!["SN", "SNL", "12"]);
        assert!((sites[1].latitude - 42.3384).abs() < 1e-9);
    }

    #[test]
    fn test_text_coordinates_and_null_devices() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("b.db")).unwrap();
        conn.execute_batch(
            "CREATE TABLE BuildingInfo (Title, Latitude, Longitude, Devices);
             INSERT INTO BuildingInfo VALUES ('Annex', '42.1', '-71.2', NULL);
             INSERT INTO BuildingInfo VALUES ('Nowhere', 'n/a', '-71.2', 'ZZ');",
        )
        .unwrap();
        let sites = query_sites(&conn).unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].title, "Annex");
        assert!(sites[0].location_keys.is_empty());
    }

    #[test]
    fn test_numeric_cells_are_read_as_codes() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("n.db")).unwrap();
        conn.execute_batch(
            "CREATE TABLE BuildingInfo (Title, Latitude, Longitude, Devices NUMERIC);
             INSERT INTO BuildingInfo VALUES ('Building 12', 42.2, -71.3, 12);
             INSERT INTO BuildingInfo VALUES (7, 42.3, -71.4, '07, RY');
             INSERT INTO BuildingInfo VALUES ('Annex', 42.4, -71.5, 3.0);",
        )
        .unwrap();
        let sites = query_sites(&conn).unwrap();
        assert_eq!(sites.len(), 3);
        assert_eq!(sites[0].location_keys, vec!["12"]);
        assert_eq!(sites[1].title, "7");
        assert_eq!(sites[1].location_keys, vec!["7", "RY"]);
        assert_eq!(sites[2].location_keys, vec!["3"]);
    }

    #[test]
    fn test_wrong_layout_is_query_shape_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE Buildings (Name TEXT);").unwrap();
        drop(conn);
        let bytes = std::fs::read(&path).unwrap();
        assert!(matches!(load_sites(&bytes), Err(MetadataError::QueryShape(_))));
    }

    #[test]
    fn test_garbage_bytes_are_not_a_database() {
        let bytes = b"this is definitely not an sqlite file, just some plain text padding".repeat(20);
        assert!(matches!(load_sites(&bytes), Err(MetadataError::Open(_))));
    }
}
