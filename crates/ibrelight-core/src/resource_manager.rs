//! Bounded unit assignment.
//!
//! A [`ResourceManager`] maps logical keys (a texture binding, a uniform block)
//! onto a fixed number of hardware units. Units are handed out in order and are
//! never recycled: once a key has a unit it keeps it for the lifetime of the
//! manager, and re-assigning the key only replaces the bound resource.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{CoreError, CoreResult};

/// Fixed-capacity key → unit → resource table.
#[derive(Debug, Clone)]
pub struct ResourceManager<K, T> {
    kind: &'static str,
    units: Vec<Option<T>>,
    keys: HashMap<K, usize>,
    next_unit: usize,
}

impl<K, T> ResourceManager<K, T>
where
    K: Eq + Hash + Clone,
{
    /// Creates a manager with `length` units for resources of the given kind.
    ///
    /// `kind` is only used in error messages ("texture", "uniform buffer").
    #[must_use]
    pub fn new(kind: &'static str, length: usize) -> Self {
        let mut units = Vec::with_capacity(length);
        units.resize_with(length, || None);
        Self {
            kind,
            units,
            keys: HashMap::new(),
            next_unit: 0,
        }
    }

    /// Binds `resource` to the unit owned by `key`, assigning a fresh unit if the
    /// key has never been seen.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NoAvailableUnits`] when `key` is new and every unit
    /// is already taken.
    pub fn assign_by_key(&mut self, key: K, resource: T) -> CoreResult<usize> {
        if let Some(&unit) = self.keys.get(&key) {
            self.units[unit] = Some(resource);
            return Ok(unit);
        }

        if self.next_unit >= self.units.len() {
            return Err(CoreError::NoAvailableUnits {
                kind: self.kind,
                capacity: self.units.len(),
            });
        }

        let unit = self.next_unit;
        self.next_unit += 1;
        self.units[unit] = Some(resource);
        self.keys.insert(key, unit);
        Ok(unit)
    }

    /// Returns the unit assigned to `key`, if any.
    #[must_use]
    pub fn unit_for_key(&self, key: &K) -> Option<usize> {
        self.keys.get(key).copied()
    }

    /// Returns the resource bound to `unit`, if any.
    #[must_use]
    pub fn resource_by_unit(&self, unit: usize) -> Option<&T> {
        self.units.get(unit).and_then(Option::as_ref)
    }

    /// Returns the resource bound through `key`, if any.
    #[must_use]
    pub fn resource_by_key(&self, key: &K) -> Option<&T> {
        self.unit_for_key(key)
            .and_then(|unit| self.resource_by_unit(unit))
    }

    /// Total number of units.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.units.len()
    }

    /// Number of units consumed so far.
    #[must_use]
    pub fn assigned_count(&self) -> usize {
        self.next_unit
    }

    /// The resource kind this manager hands out units for.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Iterates `(key, unit, resource)` for every assigned key.
    pub fn iter(&self) -> impl Iterator<Item = (&K, usize, &T)> {
        self.keys.iter().filter_map(|(key, &unit)| {
            self.units[unit].as_ref().map(|resource| (key, unit, resource))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_assign_new_keys_in_order() {
        let mut manager = ResourceManager::new("texture", 3);
        assert_eq!(manager.assign_by_key(10, "a").unwrap(), 0);
        assert_eq!(manager.assign_by_key(20, "b").unwrap(), 1);
        assert_eq!(manager.assign_by_key(30, "c").unwrap(), 2);
        assert_eq!(manager.assigned_count(), 3);
    }

    #[test]
    fn test_reassign_keeps_unit_and_replaces_resource() {
        let mut manager = ResourceManager::new("texture", 2);
        let unit = manager.assign_by_key("albedo", 1).unwrap();
        assert_eq!(manager.assign_by_key("albedo", 2).unwrap(), unit);
        assert_eq!(manager.assigned_count(), 1);
        assert_eq!(manager.resource_by_unit(unit), Some(&2));
        assert_eq!(manager.resource_by_key(&"albedo"), Some(&2));
    }

    #[test]
    fn test_overflow_names_kind() {
        let mut manager = ResourceManager::new("uniform buffer", 1);
        manager.assign_by_key(0, ()).unwrap();
        let err = manager.assign_by_key(1, ()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::NoAvailableUnits {
                kind: "uniform buffer",
                capacity: 1
            }
        ));
        // A known key still succeeds once the table is full.
        assert_eq!(manager.assign_by_key(0, ()).unwrap(), 0);
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let mut manager: ResourceManager<u32, ()> = ResourceManager::new("texture", 0);
        assert!(manager.assign_by_key(0, ()).is_err());
        assert!(manager.unit_for_key(&0).is_none());
    }

    proptest! {
        #[test]
        fn prop_units_bounded_unique_and_stable(
            capacity in 0usize..8,
            keys in proptest::collection::vec(0u8..12, 0..40),
        ) {
            let mut manager = ResourceManager::new("texture", capacity);
            let mut seen: HashMap<u8, usize> = HashMap::new();

            for (step, key) in keys.into_iter().enumerate() {
                let before = manager.assigned_count();
                match manager.assign_by_key(key, step) {
                    Ok(unit) => {
                        prop_assert!(unit < capacity);
                        if let Some(&previous) = seen.get(&key) {
                            prop_assert_eq!(previous, unit);
                            prop_assert_eq!(manager.assigned_count(), before);
                        } else {
                            prop_assert!(seen.values().all(|&u| u != unit));
                            prop_assert_eq!(manager.assigned_count(), before + 1);
                            seen.insert(key, unit);
                        }
                        prop_assert_eq!(manager.resource_by_unit(unit), Some(&step));
                    }
                    Err(CoreError::NoAvailableUnits { .. }) => {
                        prop_assert!(!seen.contains_key(&key));
                        prop_assert_eq!(seen.len(), capacity);
                        prop_assert_eq!(manager.assigned_count(), before);
                    }
                    Err(other) => prop_assert!(false, "unexpected error {other}"),
                }
            }
        }
    }
}
