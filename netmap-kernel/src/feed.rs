/*!
PARSEUR DU FLUX DE STATUT - Lecture CSV ligne à ligne

RÔLE :
Transforme le flux tabulaire (Code, Description, Device, Status) en équipements
typés et isole les lignes incomplètes dans un ensemble d'erreurs.

FONCTIONNEMENT :
- En-tête obligatoire, colonnes reconnues sans tenir compte de la casse
- Ligne avec une cellule obligatoire vide ou absente -> erreurs (jamais indexée)
- Ligne dont le code est la sentinelle (TIME par défaut) -> horodatage du flux
  (colonne Device), jamais traitée comme un équipement
- Mode flux : `rows()` rend chaque ligne dès qu'elle est lue
- Mode complet : `parse()` ne rend la main qu'une fois tout le flux consommé
*/

use crate::config::FeedRules;
use crate::index::normalize_key;
use crate::models::{DeviceRecord, DeviceStatus, RawRow};
use std::io;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed header has no '{0}' column")]
    MissingColumn(&'static str),
    #[error("feed could not be read: {0}")]
    Csv(#[from] csv::Error),
}

/// Classement d'une ligne du flux
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Device(DeviceRecord),
    Timestamp(String),
    Malformed(RawRow),
}

/// Résultat d'un flux consommé en entier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseResult {
    pub records: Vec<DeviceRecord>,
    pub errors: Vec<RawRow>,
    /// Dernier horodatage rencontré
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    code: usize,
    description: usize,
    device: usize,
    status: usize,
}

impl Columns {
    fn locate(headers: &csv::ByteRecord) -> Result<Self, FeedError> {
        let find = |name: &'static str| {
            headers
                .iter()
                .map(String::from_utf8_lossy)
                .position(|h| h.trim_start_matches('\u{feff}').trim().eq_ignore_ascii_case(name))
                .ok_or(FeedError::MissingColumn(name))
        };
        Ok(Self {
            code: find("Code")?,
            description: find("Description")?,
            device: find("Device")?,
            status: find("Status")?,
        })
    }

    /// Cellules non UTF-8 décodées avec remplacement (U+FFFD) : la ligne reste lisible
    fn raw_row(&self, record: &csv::ByteRecord) -> RawRow {
        let cell = |idx: usize| {
            record
                .get(idx)
                .map(String::from_utf8_lossy)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        RawRow {
            line: record.position().map(|p| p.line()).unwrap_or_default(),
            code: cell(self.code),
            description: cell(self.description),
            device: cell(self.device),
            status: cell(self.status),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedParser {
    rules: FeedRules,
}

impl FeedParser {
    pub fn new(rules: &FeedRules) -> Self {
        Self { rules: rules.clone() }
    }

    /// Lecture incrémentale : une issue par ligne de données, dans l'ordre du flux
    pub fn rows<R: io::Read>(&self, reader: R) -> Result<FeedRows<'_, R>, FeedError> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let columns = Columns::locate(csv.byte_headers()?)?;
        Ok(FeedRows {
            parser: self,
            columns,
            records: csv.into_byte_records(),
        })
    }

    /// Consomme tout le flux avant de rendre le résultat
    pub fn parse<R: io::Read>(&self, reader: R) -> Result<ParseResult, FeedError> {
        let mut result = ParseResult::default();
        for outcome in self.rows(reader)? {
            match outcome? {
                RowOutcome::Device(record) => result.records.push(record),
                RowOutcome::Timestamp(ts) => result.timestamp = Some(ts),
                RowOutcome::Malformed(row) => result.errors.push(row),
            }
        }
        debug!(
            "[feed] parsed {} devices, {} malformed rows",
            result.records.len(),
            result.errors.len()
        );
        Ok(result)
    }

    pub fn parse_str(&self, text: &str) -> Result<ParseResult, FeedError> {
        self.parse(text.as_bytes())
    }

    pub fn classify(&self, row: RawRow) -> RowOutcome {
        match row {
            RawRow {
                code: Some(code),
                description: Some(description),
                device: Some(device_id),
                status: Some(raw_status),
                ..
            } => {
                if code == self.rules.timestamp_key {
                    return RowOutcome::Timestamp(device_id);
                }
                let status = self.status_of(&raw_status, &device_id);
                RowOutcome::Device(DeviceRecord {
                    location_key: normalize_key(&code),
                    description,
                    device_id,
                    status,
                    raw_status,
                })
            }
            malformed => RowOutcome::Malformed(malformed),
        }
    }

    /// Seul le littéral "down" configuré vaut Down
    fn status_of(&self, raw: &str, device_id: &str) -> DeviceStatus {
        if raw == self.rules.down_status {
            DeviceStatus::Down
        } else if raw == self.rules.up_status {
            DeviceStatus::Up
        } else {
            if raw != self.rules.missing_status {
                debug!("[feed] unrecognised status '{raw}' for {device_id}, treating as unknown");
            }
            DeviceStatus::Unknown
        }
    }
}

/// Itérateur du mode flux
pub struct FeedRows<'p, R> {
    parser: &'p FeedParser,
    columns: Columns,
    records: csv::ByteRecordsIntoIter<R>,
}

impl<R: io::Read> Iterator for FeedRows<'_, R> {
    type Item = Result<RowOutcome, FeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e.into())),
        };
        let row = self.columns.raw_row(&record);
        Some(Ok(self.parser.classify(row)))
    }
}
