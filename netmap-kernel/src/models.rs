use serde::{Deserialize, Serialize};

/// État d'un équipement tel que rapporté par le flux
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Up,
    Down,
    /// Statut absent du référentiel (sentinelle "unknown" ou valeur illisible)
    Unknown,
}

/// Ligne valide du flux : un équipement rattaché à un bâtiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub location_key: String,
    pub description: String,
    pub device_id: String,
    pub status: DeviceStatus,
    /// Libellé brut reçu (affiché tel quel dans la table réseau)
    pub raw_status: String,
}

/// Ligne brute du flux, conservée telle quelle quand elle est incomplète
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    /// Numéro de ligne dans le fichier source (en-tête = 1)
    pub line: u64,
    pub code: Option<String>,
    pub description: Option<String>,
    pub device: Option<String>,
    pub status: Option<String>,
}

impl RawRow {
    /// Colonnes obligatoires absentes ou vides
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("Code", &self.code),
            ("Description", &self.description),
            ("Device", &self.device),
            ("Status", &self.status),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Verdict tri-état d'un bâtiment, recalculé à chaque cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Healthy,
    Unhealthy,
    Unknown,
}

/// Site physique issu de la base de métadonnées (table BuildingInfo)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Codes du flux rattachés à ce marqueur, dans l'ordre de la base
    pub location_keys: Vec<String>,
}
