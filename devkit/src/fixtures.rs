/*!
Constructeurs de fixtures : flux CSV et base BuildingInfo

Facilite l'écriture des tests avec:
- FeedBuilder : lignes d'équipements, lignes incomplètes, ligne d'horodatage TIME
- MetadataBuilder : base SQLite sérialisée telle que servie au kernel
*/

use anyhow::Result;
use rusqlite::{params, Connection};

#[derive(Debug, Clone, Default)]
pub struct FeedBuilder {
    rows: Vec<Vec<String>>,
}

impl FeedBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(mut self, code: &str, description: &str, device: &str, status: &str) -> Self {
        self.rows.push(vec![code.into(), description.into(), device.into(), status.into()]);
        self
    }

    /// Ligne brute, éventuellement incomplète ("" = cellule vide)
    pub fn raw(mut self, cells: &[&str]) -> Self {
        self.rows.push(cells.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn timestamp(mut self, ts: &str) -> Self {
        self.rows.push(vec!["TIME".into(), "generated".into(), ts.into(), "up".into()]);
        self
    }

    /// Horodatage au format du flux réel ("2024-03-01 10:15:00")
    pub fn timestamp_now(self) -> Self {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.timestamp(&now)
    }

    pub fn build(&self) -> Result<String> {
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
        writer.write_record(["Code", "Description", "Device", "Status"])?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("csv flush: {e}"))?;
        Ok(String::from_utf8(bytes)?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetadataBuilder {
    sites: Vec<(String, f64, f64, Option<String>)>,
}

impl MetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `devices` : liste séparée par des virgules, comme dans la base réelle
    pub fn site(mut self, title: &str, latitude: f64, longitude: f64, devices: &str) -> Self {
        self.sites.push((title.into(), latitude, longitude, Some(devices.into())));
        self
    }

    pub fn site_without_devices(mut self, title: &str, latitude: f64, longitude: f64) -> Self {
        self.sites.push((title.into(), latitude, longitude, None));
        self
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        serialize_db(|conn| {
            conn.execute_batch(
                "CREATE TABLE BuildingInfo (Title TEXT, Latitude REAL, Longitude REAL, Devices TEXT);",
            )?;
            for (title, lat, lon, devices) in &self.sites {
                conn.execute(
                    "INSERT INTO BuildingInfo (Title, Latitude, Longitude, Devices) VALUES (?1, ?2, ?3, ?4)",
                    params![title, lat, lon, devices],
                )?;
            }
            Ok(())
        })
    }

    /// Base valide mais sans la table BuildingInfo
    pub fn wrong_layout() -> Result<Vec<u8>> {
        serialize_db(|conn| {
            conn.execute_batch("CREATE TABLE Buildings (Name TEXT, Codes TEXT);")?;
            Ok(())
        })
    }
}

fn serialize_db<F>(fill: F) -> Result<Vec<u8>>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("buildings.db");
    {
        let conn = Connection::open(&path)?;
        fill(&conn)?;
    }
    Ok(std::fs::read(&path)?)
}
