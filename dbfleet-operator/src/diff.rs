//! Collection diffing.
//!
//! Splits a desired and an observed collection into disjoint create, update,
//! delete and keep sets, matching items by a natural key.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

use dbfleet_api::deployment::CustomZoneMapping;

#[derive(Debug, Clone, PartialEq)]
pub struct SetDiff<'a, D, O> {
    /// Desired items with no observed counterpart, in desired order.
    pub to_create: Vec<&'a D>,
    /// Matched pairs whose content differs.
    pub to_update: Vec<(&'a D, &'a O)>,
    /// Observed items with no desired counterpart, in observed order.
    pub to_delete: Vec<&'a O>,
    /// Matched pairs that are already equal.
    pub to_keep: Vec<(&'a D, &'a O)>,
}

impl<D, O> SetDiff<'_, D, O> {
    /// True when applying the diff would not change anything.
    pub fn is_converged(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Diffs two collections of the same item type.
pub fn diff<'a, T, K, KF, EF>(
    desired: &'a [T],
    observed: &'a [T],
    key_of: KF,
    equals: EF,
) -> SetDiff<'a, T, T>
where
    K: Eq + Hash,
    KF: Fn(&T) -> K,
    EF: Fn(&T, &T) -> bool,
{
    diff_by(desired, observed, &key_of, &key_of, equals)
}

/// Diffs collections whose desired and observed items have different shapes.
///
/// When the desired side repeats a key only the first occurrence is matched;
/// later ones are ignored.
pub fn diff_by<'a, D, O, K, DK, OK, EF>(
    desired: &'a [D],
    observed: &'a [O],
    desired_key: DK,
    observed_key: OK,
    equals: EF,
) -> SetDiff<'a, D, O>
where
    K: Eq + Hash,
    DK: Fn(&D) -> K,
    OK: Fn(&O) -> K,
    EF: Fn(&D, &O) -> bool,
{
    let mut by_key: HashMap<K, &'a O> = HashMap::with_capacity(observed.len());
    for o in observed {
        by_key.entry(observed_key(o)).or_insert(o);
    }

    let mut result = SetDiff {
        to_create: Vec::new(),
        to_update: Vec::new(),
        to_delete: Vec::new(),
        to_keep: Vec::new(),
    };
    let mut seen = HashSet::with_capacity(desired.len());

    for d in desired {
        let key = desired_key(d);
        match by_key.get(&key) {
            Some(&o) if seen.insert(observed_key(o)) => {
                if equals(d, o) {
                    result.to_keep.push((d, o));
                } else {
                    result.to_update.push((d, o));
                }
            }
            Some(_) => {}
            None => {
                if seen.insert(key) {
                    result.to_create.push(d);
                }
            }
        }
    }

    for o in observed {
        if !seen.contains(&observed_key(o)) {
            result.to_delete.push(o);
        }
    }

    result
}

/// Decides how to converge custom zone mappings.
///
/// `existing` maps location to provider zone id, `zone_names` maps zone id
/// to zone name. Mappings can only be removed all at once, so any mismatch
/// that is not a pure addition forces a full delete followed by a create of
/// the whole desired set. Returns `(should_create, should_delete)`.
pub fn compare_zone_mappings(
    existing: &BTreeMap<String, String>,
    desired: &[CustomZoneMapping],
    zone_names: &BTreeMap<String, String>,
) -> (bool, bool) {
    if desired.is_empty() {
        return (false, !existing.is_empty());
    }

    let mut should_create = false;
    let mut should_delete = false;

    for mapping in desired {
        match existing.get(&mapping.location) {
            None => should_create = true,
            Some(zone_id) => {
                if zone_names.get(zone_id) != Some(&mapping.zone) {
                    should_create = true;
                    should_delete = true;
                }
            }
        }
    }

    if existing.len() > desired.len() {
        should_create = true;
        should_delete = true;
    }

    (should_create, should_delete)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        name: &'static str,
        value: u32,
    }

    fn make_item(name: &'static str, value: u32) -> Item {
        Item { name, value }
    }

    fn make_mapping(location: &str, zone: &str) -> CustomZoneMapping {
        CustomZoneMapping {
            location: location.to_string(),
            zone: zone.to_string(),
        }
    }

    fn zones() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("z1".to_string(), "Zone 1".to_string()),
            ("z2".to_string(), "Zone 2".to_string()),
        ])
    }

    #[test]
    fn test_diff_partitions() {
        let desired = vec![make_item("a", 1), make_item("b", 2), make_item("c", 3)];
        let observed = vec![make_item("b", 2), make_item("c", 30), make_item("d", 4)];

        let d = diff(&desired, &observed, |i| i.name, |a, b| a == b);
        assert_eq!(d.to_create, vec![&desired[0]]);
        assert_eq!(d.to_keep, vec![(&desired[1], &observed[0])]);
        assert_eq!(d.to_update, vec![(&desired[2], &observed[1])]);
        assert_eq!(d.to_delete, vec![&observed[2]]);
        assert!(!d.is_converged());
    }

    #[test]
    fn test_diff_of_applied_result_is_empty() {
        let desired = vec![make_item("a", 1), make_item("b", 2)];
        let d = diff(&desired, &desired, |i| i.name, |a, b| a == b);
        assert!(d.is_converged());
        assert_eq!(d.to_keep.len(), 2);
    }

    #[test]
    fn test_diff_empty_sides() {
        let items = vec![make_item("a", 1)];
        let d = diff(&[], &items, |i: &Item| i.name, |a, b| a == b);
        assert_eq!(d.to_delete.len(), 1);
        let d = diff(&items, &[], |i: &Item| i.name, |a, b| a == b);
        assert_eq!(d.to_create.len(), 1);
    }

    #[test]
    fn test_diff_by_heterogeneous_items() {
        let desired = vec!["a", "b"];
        let observed = vec![make_item("b", 0), make_item("z", 0)];
        let d = diff_by(&desired, &observed, |s| *s, |i| i.name, |_, _| true);
        assert_eq!(d.to_create, vec![&"a"]);
        assert_eq!(d.to_keep.len(), 1);
        assert_eq!(d.to_delete, vec![&observed[1]]);
    }

    #[test]
    fn test_duplicate_desired_keys_match_once() {
        let desired = vec![make_item("a", 1), make_item("a", 2)];
        let d = diff(&desired, &[], |i| i.name, |a, b| a == b);
        assert_eq!(d.to_create, vec![&desired[0]]);
    }

    #[test]
    fn test_zone_mapping_synced() {
        let existing = BTreeMap::from([("US".to_string(), "z1".to_string())]);
        let desired = vec![make_mapping("US", "Zone 1")];
        assert_eq!(compare_zone_mappings(&existing, &desired, &zones()), (false, false));
    }

    #[test]
    fn test_zone_mapping_wrong_zone() {
        let existing = BTreeMap::from([("US".to_string(), "z1".to_string())]);
        let desired = vec![make_mapping("US", "Zone 2")];
        assert_eq!(compare_zone_mappings(&existing, &desired, &zones()), (true, true));
    }

    #[test]
    fn test_zone_mapping_shrink() {
        let existing = BTreeMap::from([
            ("US".to_string(), "z1".to_string()),
            ("DE".to_string(), "z2".to_string()),
        ]);
        let desired = vec![make_mapping("US", "Zone 1")];
        assert_eq!(compare_zone_mappings(&existing, &desired, &zones()), (true, true));
    }

    #[test]
    fn test_zone_mapping_desired_empty() {
        let existing = BTreeMap::from([("US".to_string(), "z1".to_string())]);
        assert_eq!(compare_zone_mappings(&existing, &[], &zones()), (false, true));
        assert_eq!(
            compare_zone_mappings(&BTreeMap::new(), &[], &zones()),
            (false, false)
        );
    }

    #[test]
    fn test_zone_mapping_growth() {
        let existing = BTreeMap::from([("US".to_string(), "z1".to_string())]);
        let desired = vec![make_mapping("US", "Zone 1"), make_mapping("DE", "Zone 2")];
        assert_eq!(compare_zone_mappings(&existing, &desired, &zones()), (true, false));
    }
}
