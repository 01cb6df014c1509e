/*!
INDEX DES BÂTIMENTS - Regroupement des équipements par code de bâtiment

RÔLE :
Construit, pour un cycle, la table code -> équipements dans l'ordre d'arrivée du flux.

FONCTIONNEMENT :
- Les codes sont normalisés en chaîne avant insertion et recherche :
  "07", "7" et "7.0" désignent le même bâtiment
- L'ordre des équipements d'un groupe suit l'ordre du flux (le verdict en dépend)
- L'ordre des codes suit leur première apparition
*/

use crate::models::DeviceRecord;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

/// Normalise un code de bâtiment : les codes numériques sont réécrits sous
/// leur forme canonique, les autres sont seulement débarrassés des espaces.
pub fn normalize_key(raw: &str) -> String {
    let trimmed = raw.trim();
    if !is_numeric_literal(trimmed) {
        return trimmed.to_string();
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n == 0.0 => "0".to_string(),
        Ok(n) if n.abs() < MAX_EXACT_FLOAT => n.to_string(),
        _ => trimmed.to_string(),
    }
}

/// 2^53 : au-delà, deux codes distincts tomberaient sur le même f64
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// `-?(\d+\.?|\.\d+|\d+\.\d+)([eE][-+]?\d+)?`
fn is_numeric_literal(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);
    let (mantissa, exponent) = match body.find(|c: char| c == 'e' || c == 'E') {
        Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
        None => (body, None),
    };
    let digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    let (int, frac) = match mantissa.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (mantissa, None),
    };
    let mantissa_ok = digits(int)
        && frac.map_or(true, digits)
        && (!int.is_empty() || frac.is_some_and(|f| !f.is_empty()));
    let exponent_ok = exponent.map_or(true, |e| {
        let e = e.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(e);
        !e.is_empty() && digits(e)
    });
    mantissa_ok && exponent_ok
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationIndex {
    order: Vec<String>,
    groups: HashMap<String, Vec<DeviceRecord>>,
}

impl LocationIndex {
    pub fn build<I>(records: I) -> Self
    where
        I: IntoIterator<Item = DeviceRecord>,
    {
        let mut index = Self::default();
        for record in records {
            index.insert(record);
        }
        index
    }

    pub fn insert(&mut self, mut record: DeviceRecord) {
        let key = normalize_key(&record.location_key);
        record.location_key = key.clone();
        match self.groups.get_mut(&key) {
            Some(group) => group.push(record),
            None => {
                self.order.push(key.clone());
                self.groups.insert(key, vec![record]);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&[DeviceRecord]> {
        self.groups.get(&normalize_key(key)).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.groups.contains_key(&normalize_key(key))
    }

    /// Codes dans l'ordre de première apparition
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &[DeviceRecord])> {
        self.order
            .iter()
            .filter_map(|key| self.groups.get(key).map(|group| (key.as_str(), group.as_slice())))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn device_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}

impl Serialize for LocationIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, group) in self.groups() {
            map.serialize_entry(key, group)?;
        }
        map.end()
    }
}
