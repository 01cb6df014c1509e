/*!
VUES DÉRIVÉES - Ce que les consommateurs affichent à partir d'un snapshot

- Marqueurs de carte avec icône selon le verdict
- Résumé : compteurs, libellé "bons/(bons+mauvais) (inconnus)", fraîcheur du flux
- Table réseau (option : masquer les équipements Up) et table des lignes en erreur

Fonctions pures : un snapshot en entrée, des structures sérialisables en sortie.
*/

use crate::config::IconConf;
use crate::models::{DeviceStatus, Verdict};
use crate::snapshot::{Snapshot, VerdictCounters};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerView {
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    pub location_keys: Vec<String>,
    pub verdict: Verdict,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub version: u64,
    pub built_at: String,
    pub feed_timestamp: Option<String>,
    pub freshness: Option<String>,
    pub healthy: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub total: usize,
    pub errors: usize,
    pub label: String,
    pub error_label: String,
    pub sites: VerdictCounters,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TableFilter {
    #[serde(default)]
    pub hide_up: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub code: String,
    pub description: String,
    pub device: String,
    /// Libellé brut du flux
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRowView {
    pub line: u64,
    pub code: Option<String>,
    pub description: Option<String>,
    pub device: Option<String>,
    pub status: Option<String>,
    pub missing: Vec<&'static str>,
}

pub fn markers(snapshot: &Snapshot, icons: &IconConf) -> Vec<MarkerView> {
    snapshot
        .sites
        .iter()
        .map(|site| MarkerView {
            title: site.title.clone(),
            latitude: site.latitude,
            longitude: site.longitude,
            location_keys: site.location_keys.clone(),
            verdict: site.verdict,
            icon: icons.asset(site.verdict).to_string(),
        })
        .collect()
}

pub fn summary(snapshot: &Snapshot) -> Summary {
    let c = &snapshot.counters;
    Summary {
        version: snapshot.version,
        built_at: snapshot.built_at.format(&Rfc3339).unwrap_or_default(),
        feed_timestamp: snapshot.feed_timestamp.clone(),
        freshness: snapshot.feed_timestamp.as_ref().map(|ts| format!("(Newest Data: {ts})")),
        healthy: c.healthy,
        unhealthy: c.unhealthy,
        unknown: c.unknown,
        total: c.total(),
        errors: snapshot.errors.len(),
        label: counter_label(c),
        error_label: error_label(c, snapshot.errors.len()),
        sites: snapshot.site_counters,
    }
}

/// "0/1 (1)" : sains / (sains + en panne), codes inconnus entre parenthèses.
///
/// Les lignes en erreur n'y figurent pas ; voir `error_label` pour la forme
/// du tableau de bord historique.
pub fn counter_label(c: &VerdictCounters) -> String {
    format!("{}/{} ({})", c.healthy, c.healthy + c.unhealthy, c.unknown)
}

/// "0/1 (2)" : même fraction, nombre de lignes en erreur entre parenthèses
pub fn error_label(c: &VerdictCounters, errors: usize) -> String {
    format!("{}/{} ({})", c.healthy, c.healthy + c.unhealthy, errors)
}

pub fn network_table(snapshot: &Snapshot, filter: TableFilter) -> Vec<TableRow> {
    snapshot
        .locations
        .groups()
        .flat_map(|(_, group)| group.iter())
        .filter(|device| !(filter.hide_up && device.status == DeviceStatus::Up))
        .map(|device| TableRow {
            code: device.location_key.clone(),
            description: device.description.clone(),
            device: device.device_id.clone(),
            status: device.raw_status.clone(),
        })
        .collect()
}

pub fn error_table(snapshot: &Snapshot) -> Vec<ErrorRowView> {
    snapshot
        .errors
        .iter()
        .map(|row| ErrorRowView {
            line: row.line,
            code: row.code.clone(),
            description: row.description.clone(),
            device: row.device.clone(),
            status: row.status.clone(),
            missing: row.missing_fields(),
        })
        .collect()
}
