/*!
RÉSOLUTION DU VERDICT - Santé tri-état d'un bâtiment

Règles, dans l'ordre, avec arrêt au premier cas rencontré :
1. code absent de l'index -> Unknown
2. parcours des équipements dans l'ordre du flux : premier Down -> Unhealthy
3. dans le même parcours : premier statut inconnu -> Unknown
4. parcours terminé sans Down ni inconnu -> Healthy

L'ordre de rencontre départage Down et inconnu, pas la gravité :
[inconnu, Down] donne Unknown.
*/

use crate::index::LocationIndex;
use crate::models::{DeviceRecord, DeviceStatus, Verdict};

pub fn resolve(key: &str, index: &LocationIndex) -> Verdict {
    match index.get(key) {
        Some(devices) => scan(devices),
        None => Verdict::Unknown,
    }
}

/// Parcours d'un groupe, arrêt au premier équipement qui n'est pas Up
pub fn scan(devices: &[DeviceRecord]) -> Verdict {
    for device in devices {
        match device.status {
            DeviceStatus::Up => continue,
            DeviceStatus::Down => return Verdict::Unhealthy,
            DeviceStatus::Unknown => return Verdict::Unknown,
        }
    }
    Verdict::Healthy
}

/// Marqueur regroupant plusieurs codes : même parcours code par code, dans
/// l'ordre donné, arrêt au premier Unhealthy ou Unknown. Sans code -> Unknown.
pub fn resolve_aliases<'k, I, F>(keys: I, mut resolve_one: F) -> Verdict
where
    I: IntoIterator<Item = &'k str>,
    F: FnMut(&str) -> Verdict,
{
    let mut any = false;
    for key in keys {
        any = true;
        match resolve_one(key) {
            Verdict::Healthy => continue,
            other => return other,
        }
    }
    if any {
        Verdict::Healthy
    } else {
        Verdict::Unknown
    }
}

pub fn resolve_site(keys: &[String], index: &LocationIndex) -> Verdict {
    resolve_aliases(keys.iter().map(String::as_str), |key| resolve(key, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(code: &str, statuses: &[DeviceStatus]) -> Vec<DeviceRecord> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, status)| DeviceRecord {
                location_key: code.into(),
                description: "closet".into(),
                device_id: format!("{code}-{i}"),
                status: *status,
                raw_status: format!("{status:?}").to_lowercase(),
            })
            .collect()
    }

    use DeviceStatus::{Down, Unknown, Up};

    #[test]
    fn test_absent_key_is_unknown() {
        let index = LocationIndex::build(group("A", &[Up]));
        assert_eq!(resolve("B", &index), Verdict::Unknown);
        assert_eq!(resolve("A", &index), Verdict::Healthy);
    }

    #[test]
    fn test_all_up_is_healthy() {
        assert_eq!(scan(&group("A", &[Up, Up, Up])), Verdict::Healthy);
    }

    #[test]
    fn test_unknown_before_down_reports_unknown() {
        assert_eq!(scan(&group("A", &[Unknown, Down])), Verdict::Unknown);
        assert_eq!(scan(&group("A", &[Up, Unknown, Up, Down])), Verdict::Unknown);
    }

    #[test]
    fn test_down_before_unknown_reports_unhealthy() {
        assert_eq!(scan(&group("A", &[Down, Unknown])), Verdict::Unhealthy);
        assert_eq!(scan(&group("A", &[Up, Up, Down])), Verdict::Unhealthy);
    }

    #[test]
    fn test_aliases_stop_at_first_non_healthy_code() {
        let mut records = group("A", &[Up]);
        records.extend(group("B", &[Unknown]));
        records.extend(group("C", &[Down]));
        let index = LocationIndex::build(records);

        let keys = |ks: &[&str]| ks.iter().map(|k| k.to_string()).collect::<Vec<_>>();
        assert_eq!(resolve_site(&keys(&["A", "C", "B"]), &index), Verdict::Unhealthy);
        assert_eq!(resolve_site(&keys(&["A", "B", "C"]), &index), Verdict::Unknown);
        assert_eq!(resolve_site(&keys(&["A", "Z", "C"]), &index), Verdict::Unknown);
        assert_eq!(resolve_site(&keys(&["A"]), &index), Verdict::Healthy);
        assert_eq!(resolve_site(&[], &index), Verdict::Unknown);
    }

    #[test]
    fn test_aliases_short_circuit() {
        let mut calls = Vec::new();
        let verdict = resolve_aliases(["A", "B", "C"], |key| {
            calls.push(key.to_string());
            if key == "B" { Verdict::Unhealthy } else { Verdict::Healthy }
        });
        assert_eq!(verdict, Verdict::Unhealthy);
        assert_eq!(calls, vec!["A", "B"]);
    }
}
