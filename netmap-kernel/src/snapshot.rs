/*!
SNAPSHOT - Vue complète et cohérente d'un cycle de rafraîchissement

RÔLE :
Assemble index, erreurs, verdicts et compteurs d'un cycle. Un snapshot est
reconstruit de zéro à chaque cycle puis remplace l'ancien en entier : aucune
fusion incrémentale, donc aucun groupe qui accumule des lignes d'un cycle à l'autre.

FONCTIONNEMENT :
- Un verdict par code distinct, calculé une seule fois (mémoïsé dans `verdicts`)
- Compteurs = décompte des verdicts finaux, jamais incrémentés en cours de route
- Marqueurs de sites résolus à partir des verdicts mémoïsés
*/

use crate::feed::ParseResult;
use crate::index::{normalize_key, LocationIndex};
use crate::models::{RawRow, Site, Verdict};
use crate::resolver::{resolve, resolve_aliases};
use serde::Serialize;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VerdictCounters {
    pub healthy: usize,
    pub unhealthy: usize,
    pub unknown: usize,
}

impl VerdictCounters {
    pub fn tally<I>(verdicts: I) -> Self
    where
        I: IntoIterator<Item = Verdict>,
    {
        let mut counters = Self::default();
        for verdict in verdicts {
            match verdict {
                Verdict::Healthy => counters.healthy += 1,
                Verdict::Unhealthy => counters.unhealthy += 1,
                Verdict::Unknown => counters.unknown += 1,
            }
        }
        counters
    }

    pub fn get(&self, verdict: Verdict) -> usize {
        match verdict {
            Verdict::Healthy => self.healthy,
            Verdict::Unhealthy => self.unhealthy,
            Verdict::Unknown => self.unknown,
        }
    }

    pub fn total(&self) -> usize {
        self.healthy + self.unhealthy + self.unknown
    }
}

/// Site de la carte avec son verdict consolidé
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteMarker {
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    pub location_keys: Vec<String>,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Attribuée par le store au remplacement (0 = aucun cycle publié)
    pub version: u64,
    pub cycle_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub built_at: OffsetDateTime,
    /// Horodatage porté par la ligne sentinelle du flux
    pub feed_timestamp: Option<String>,
    pub locations: LocationIndex,
    pub verdicts: BTreeMap<String, Verdict>,
    pub errors: Vec<RawRow>,
    pub counters: VerdictCounters,
    pub sites: Vec<SiteMarker>,
    pub site_counters: VerdictCounters,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            version: 0,
            cycle_id: None,
            built_at: OffsetDateTime::now_utc(),
            feed_timestamp: None,
            locations: LocationIndex::default(),
            verdicts: BTreeMap::new(),
            errors: Vec::new(),
            counters: VerdictCounters::default(),
            sites: Vec::new(),
            site_counters: VerdictCounters::default(),
        }
    }

    pub fn build(parsed: ParseResult, sites: &[Site], cycle_id: Uuid) -> Self {
        let ParseResult { records, errors, timestamp } = parsed;
        let locations = LocationIndex::build(records);

        let verdicts: BTreeMap<String, Verdict> = locations
            .keys()
            .map(|key| (key.to_string(), resolve(key, &locations)))
            .collect();
        let counters = VerdictCounters::tally(verdicts.values().copied());

        let sites: Vec<SiteMarker> = sites
            .iter()
            .map(|site| SiteMarker {
                title: site.title.clone(),
                latitude: site.latitude,
                longitude: site.longitude,
                location_keys: site.location_keys.clone(),
                verdict: resolve_aliases(site.location_keys.iter().map(String::as_str), |key| {
                    verdicts.get(&normalize_key(key)).copied().unwrap_or(Verdict::Unknown)
                }),
            })
            .collect();
        let site_counters = VerdictCounters::tally(sites.iter().map(|s| s.verdict));

        Self {
            version: 0,
            cycle_id: Some(cycle_id),
            built_at: OffsetDateTime::now_utc(),
            feed_timestamp: timestamp,
            locations,
            verdicts,
            errors,
            counters,
            sites,
            site_counters,
        }
    }

    /// Verdict mémoïsé ; un code inconnu du flux vaut Unknown
    pub fn verdict(&self, key: &str) -> Verdict {
        self.verdicts.get(&normalize_key(key)).copied().unwrap_or(Verdict::Unknown)
    }

    /// Invariants : verdicts et compteurs en phase avec les groupes
    pub fn is_consistent(&self) -> bool {
        let keys_match = self.verdicts.len() == self.locations.len()
            && self.locations.keys().all(|key| self.verdicts.contains_key(key));
        let groups_filled = self.locations.groups().all(|(_, group)| !group.is_empty());
        keys_match
            && groups_filled
            && self.counters == VerdictCounters::tally(self.verdicts.values().copied())
            && self.site_counters == VerdictCounters::tally(self.sites.iter().map(|s| s.verdict))
    }
}
