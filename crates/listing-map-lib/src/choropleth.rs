//! Choropleth classification
//!
//! Boundaries and statistics are named independently, so they are joined by name:
//! exact match on the upper-cased boundary name first, then the closest statistics key
//! by edit distance if it is close enough. Joined values are bucketed into five classes
//! at the 20/40/60/80th percentiles and mapped onto a per-category color ramp.
//!
//! Classification never fails. Missing or malformed input produces a lookup where every
//! region takes the fallback color.

use crate::{ChoroplethConfig, DataSource, PaintValue, Rgba, normalize_name};
use serde::Serialize;
use std::collections::BTreeMap;

/// Number of color classes per ramp
pub const BUCKETS: usize = 5;

/// Levenshtein distance over Unicode scalar values
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// How a boundary name was joined to the statistics table
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JoinMatch {
    Exact { key: String },
    Fuzzy { key: String, distance: usize },
    Unmatched,
}

impl JoinMatch {
    pub fn key(&self) -> Option<&str> {
        match self {
            JoinMatch::Exact { key } | JoinMatch::Fuzzy { key, .. } => Some(key),
            JoinMatch::Unmatched => None,
        }
    }
}

/// Join one boundary name against name-keyed statistics.
///
/// Among equidistant fuzzy candidates the first key in sorted order wins.
pub fn join_name<V>(name: &str, table: &BTreeMap<String, V>, max_distance: usize) -> JoinMatch {
    let normalized = normalize_name(name);
    if table.contains_key(&normalized) {
        return JoinMatch::Exact { key: normalized };
    }

    let mut best: Option<(&String, usize)> = None;
    for key in table.keys() {
        let distance = edit_distance(&normalized, key);
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((key, distance));
        }
    }
    match best {
        Some((key, distance)) if distance <= max_distance => JoinMatch::Fuzzy {
            key: key.clone(),
            distance,
        },
        _ => JoinMatch::Unmatched,
    }
}

/// Percentile thresholds over strictly positive values
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Thresholds {
    pub p20: f64,
    pub p40: f64,
    pub p60: f64,
    pub p80: f64,
}

impl Thresholds {
    /// Take the sorted values at `floor(count * q)` for q in 0.2..0.8.
    /// `None` when no strictly positive, finite value is present.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut sorted: Vec<f64> = values
            .into_iter()
            .filter(|v| v.is_finite() && *v > 0.0)
            .collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);
        let at = |q: f64| sorted[((sorted.len() as f64 * q).floor() as usize).min(sorted.len() - 1)];
        Some(Self {
            p20: at(0.2),
            p40: at(0.4),
            p60: at(0.6),
            p80: at(0.8),
        })
    }

    /// Bucket index for a value; `None` for zero, negative or non-finite values
    pub fn bucket(&self, value: f64) -> Option<usize> {
        if !value.is_finite() || value <= 0.0 {
            return None;
        }
        Some(if value <= self.p20 {
            0
        } else if value <= self.p40 {
            1
        } else if value <= self.p60 {
            2
        } else if value <= self.p80 {
            3
        } else {
            4
        })
    }
}

/// Per-region colors plus the default for everything else
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColorLookup {
    /// Region id to color
    pub colors: BTreeMap<String, Rgba>,
    pub fallback: Rgba,
    pub thresholds: Option<Thresholds>,
    /// Region id to how its name was joined
    pub joins: BTreeMap<String, JoinMatch>,
}

impl ColorLookup {
    /// Every region in the fallback color
    pub fn flat(fallback: Rgba) -> Self {
        Self {
            colors: BTreeMap::new(),
            fallback,
            thresholds: None,
            joins: BTreeMap::new(),
        }
    }

    pub fn color_for(&self, region_id: &str) -> Rgba {
        self.colors.get(region_id).copied().unwrap_or(self.fallback)
    }

    /// Region ids whose name found no statistics key
    pub fn unmatched(&self) -> Vec<&str> {
        self.joins
            .iter()
            .filter(|(_, join)| **join == JoinMatch::Unmatched)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Single paint update keyed on the feature property holding the region id
    pub fn to_paint(&self, property: &str) -> PaintValue {
        PaintValue::ColorLookup {
            property: property.to_string(),
            colors: self.colors.clone(),
            fallback: self.fallback,
        }
    }
}

/// Joins boundaries to statistics and assigns ramp colors
#[derive(Clone, Debug)]
pub struct ChoroplethClassifier {
    sale_ramp: Option<[Rgba; BUCKETS]>,
    rental_ramp: Option<[Rgba; BUCKETS]>,
    fallback: Rgba,
    max_edit_distance: usize,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ChoroplethClassifier {
    pub fn new(config: &ChoroplethConfig) -> Self {
        let ramp = |colors: &[Rgba], category: &str| {
            let ramp = <[Rgba; BUCKETS]>::try_from(colors).ok();
            if ramp.is_none() {
                tracing::warn!(
                    "{category} ramp has {} colors instead of {BUCKETS}; coloring falls back to flat",
                    colors.len()
                );
            }
            ramp
        };
        Self {
            sale_ramp: ramp(&config.sale_ramp, "Sale"),
            rental_ramp: ramp(&config.rental_ramp, "Rental"),
            fallback: config.fallback_color,
            max_edit_distance: config.max_edit_distance,
        }
    }

    pub fn fallback(&self) -> Rgba {
        self.fallback
    }

    pub fn ramp(&self, category: DataSource) -> Option<&[Rgba; BUCKETS]> {
        match category {
            DataSource::Sale => self.sale_ramp.as_ref(),
            DataSource::Rental => self.rental_ramp.as_ref(),
        }
    }

    /// Classify `(region id, display name)` boundaries against a name-keyed table
    pub fn classify<'a>(
        &self,
        boundaries: impl IntoIterator<Item = (&'a str, &'a str)>,
        table: &BTreeMap<String, f64>,
        category: DataSource,
    ) -> ColorLookup {
        let mut lookup = ColorLookup::flat(self.fallback);
        let Some(ramp) = self.ramp(category) else {
            return lookup;
        };

        let joined: Vec<(&str, Option<f64>)> = boundaries
            .into_iter()
            .map(|(id, name)| {
                let join = join_name(name, table, self.max_edit_distance);
                let value = join.key().and_then(|key| table.get(key).copied());
                if let JoinMatch::Fuzzy { key, distance } = &join {
                    tracing::debug!("Joined {name:?} to {key:?} at distance {distance}");
                }
                lookup.joins.insert(id.to_string(), join);
                (id, value)
            })
            .collect();

        let Some(thresholds) = Thresholds::from_values(joined.iter().filter_map(|(_, v)| *v)) else {
            return lookup;
        };
        for (id, value) in joined {
            if let Some(bucket) = value.and_then(|v| thresholds.bucket(v)) {
                lookup.colors.insert(id.to_string(), ramp[bucket]);
            }
        }
        lookup.thresholds = Some(thresholds);
        lookup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn classifier() -> ChoroplethClassifier {
        ChoroplethClassifier::new(&ChoroplethConfig::default())
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("LJUBLANA", "LJUBLJANA"), 1);
        assert_eq!(edit_distance("ŠIŠKA", "SISKA"), 2);
        assert_eq!(edit_distance("same", "same"), 0);
    }

    #[test]
    fn test_join_exact_fuzzy_unmatched() {
        let stats = table(&[("LJUBLJANA", 100.0)]);
        assert_eq!(
            join_name("Ljubljana", &stats, 2),
            JoinMatch::Exact { key: "LJUBLJANA".to_string() }
        );
        assert_eq!(
            join_name("LJUBLANA", &stats, 2),
            JoinMatch::Fuzzy { key: "LJUBLJANA".to_string(), distance: 1 }
        );
        assert_eq!(join_name("KRANJ", &stats, 2), JoinMatch::Unmatched);
        assert_eq!(join_name("KRANJ", &BTreeMap::<String, f64>::new(), 2), JoinMatch::Unmatched);
    }

    #[test]
    fn test_join_tie_takes_first_sorted_key() {
        let stats = table(&[("KOPEB", 1.0), ("KOPEA", 2.0)]);
        assert_eq!(
            join_name("KOPER", &stats, 2),
            JoinMatch::Fuzzy { key: "KOPEA".to_string(), distance: 1 }
        );
    }

    #[test]
    fn test_thresholds_scenario() {
        let t = Thresholds::from_values([5.0, 10.0, 15.0, 20.0, 100.0]).unwrap();
        assert_eq!(t.p20, 10.0);
        assert_eq!(t.p40, 15.0);
        assert_eq!(t.p60, 20.0);
        assert_eq!(t.p80, 100.0);
        assert_eq!(t.bucket(12.0), Some(1));
        assert_eq!(t.bucket(10.0), Some(0));
        assert_eq!(t.bucket(0.0), None);
        assert_eq!(t.bucket(f64::NAN), None);
    }

    #[test]
    fn test_thresholds_ignore_non_positive() {
        assert!(Thresholds::from_values([0.0, -3.0, f64::NAN]).is_none());
        let t = Thresholds::from_values([0.0, 7.0]).unwrap();
        assert_eq!(t.p20, 7.0);
        assert_eq!(t.p80, 7.0);
    }

    #[test]
    fn test_buckets_are_monotonic() {
        let values: Vec<f64> = (1..=37).map(|i| (i * i) as f64 * 0.7).collect();
        let t = Thresholds::from_values(values.iter().copied()).unwrap();
        let mut sorted = values.clone();
        sorted.push(1e9);
        sorted.sort_by(f64::total_cmp);
        let buckets: Vec<usize> = sorted.iter().map(|v| t.bucket(*v).unwrap()).collect();
        assert!(buckets.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*buckets.last().unwrap(), 4);
    }

    #[test]
    fn test_classify_colors_and_fallback() {
        let classifier = classifier();
        let stats = table(&[
            ("LJUBLJANA", 100.0),
            ("MARIBOR", 5.0),
            ("CELJE", 10.0),
            ("KOPER", 15.0),
            ("NOVO MESTO", 20.0),
            ("PTUJ", 0.0),
        ]);
        let boundaries = [
            ("1", "Ljubljana"),
            ("2", "Maribor"),
            ("3", "Celje"),
            ("4", "Koper"),
            ("5", "Novo mesto"),
            ("6", "Ptuj"),
            ("7", "Kranj"),
        ];
        let lookup = classifier.classify(boundaries, &stats, DataSource::Sale);
        let ramp = classifier.ramp(DataSource::Sale).unwrap();

        assert_eq!(lookup.color_for("2"), ramp[0]);
        assert_eq!(lookup.color_for("3"), ramp[0]);
        assert_eq!(lookup.color_for("4"), ramp[1]);
        assert_eq!(lookup.color_for("5"), ramp[2]);
        assert_eq!(lookup.color_for("1"), ramp[3]);
        // zero value and unmatched name take the fallback
        assert_eq!(lookup.color_for("6"), lookup.fallback);
        assert_eq!(lookup.color_for("7"), lookup.fallback);
        assert_eq!(lookup.unmatched(), vec!["7"]);
    }

    #[test]
    fn test_categories_use_their_own_ramp() {
        let classifier = classifier();
        let stats = table(&[("A", 1.0)]);
        let sale = classifier.classify([("a", "A")], &stats, DataSource::Sale);
        let rental = classifier.classify([("a", "A")], &stats, DataSource::Rental);
        assert_ne!(sale.color_for("a"), rental.color_for("a"));
    }

    #[test]
    fn test_malformed_ramp_degrades_to_flat() {
        let config = ChoroplethConfig {
            sale_ramp: vec![Rgba::rgb(0, 0, 0)],
            ..ChoroplethConfig::default()
        };
        let classifier = ChoroplethClassifier::new(&config);
        let lookup = classifier.classify([("1", "A")], &table(&[("A", 3.0)]), DataSource::Sale);
        assert!(lookup.colors.is_empty());
        assert_eq!(lookup.color_for("1"), config.fallback_color);
    }

    #[test]
    fn test_to_paint() {
        let lookup = ColorLookup::flat(Rgba::rgb(1, 1, 1));
        match lookup.to_paint("id") {
            PaintValue::ColorLookup { property, colors, fallback } => {
                assert_eq!(property, "id");
                assert!(colors.is_empty());
                assert_eq!(fallback, Rgba::rgb(1, 1, 1));
            }
            other => panic!("unexpected paint {other:?}"),
        }
    }
}
