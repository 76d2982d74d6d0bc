//! Keyed, insertion-ordered entity collection.
//!
//! Lookups go through a hash index; iteration follows a sequence index so the
//! order entities were first inserted is stable across overwrites and across
//! a snapshot round trip. There is no internal locking: a repository is only
//! ever reached through the lock of its owning [`StateAggregate`].
//!
//! [`StateAggregate`]: crate::state::aggregate::StateAggregate

use crate::core::error::{CoreError, CoreResult};
use crate::model::{normalize_key, EntityKind};
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
struct Slot<T> {
    sequence: u64,
    value: T,
}

/// Keyed collection of one entity kind.
#[derive(Debug, Clone)]
pub struct Repository<T> {
    kind: EntityKind,
    entries: HashMap<String, Slot<T>>,
    order: BTreeMap<u64, String>,
    next_sequence: u64,
}

impl<T> Repository<T> {
    /// Create an empty repository for the given kind.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_sequence: 0,
        }
    }

    /// Entity kind stored here.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(&normalize_key(key)).map(|slot| &slot.value)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.entries
            .get_mut(&normalize_key(key))
            .map(|slot| &mut slot.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&normalize_key(key))
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> + '_ {
        self.order.values()
    }

    /// Values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.iter().map(|(_, value)| value)
    }

    /// Key/value pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &T)> + '_ {
        self.order.values().filter_map(move |key| {
            self.entries
                .get(key)
                .map(|slot| (key, &slot.value))
        })
    }

    /// Insert or overwrite. An overwrite keeps the original position.
    ///
    /// Returns the previous value, if any.
    pub fn put(&mut self, key: &str, value: T) -> Option<T> {
        let key = normalize_key(key);
        if let Some(slot) = self.entries.get_mut(&key) {
            return Some(std::mem::replace(&mut slot.value, value));
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.order.insert(sequence, key.clone());
        self.entries.insert(key, Slot { sequence, value });
        None
    }

    /// Insert-only variant of [`put`](Self::put).
    pub fn insert(&mut self, key: &str, value: T) -> CoreResult<()> {
        if self.contains_key(key) {
            return Err(CoreError::DuplicateKey {
                kind: self.kind,
                key: normalize_key(key),
            });
        }
        self.put(key, value);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> CoreResult<T> {
        let key = normalize_key(key);
        match self.entries.remove(&key) {
            Some(slot) => {
                self.order.remove(&slot.sequence);
                Ok(slot.value)
            }
            None => Err(CoreError::NotFound {
                kind: self.kind,
                key,
            }),
        }
    }

    /// Keep only entries matching the predicate. Returns the removed count.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) -> usize {
        let doomed: Vec<String> = self
            .iter()
            .filter(|(_, value)| !keep(value))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            if let Some(slot) = self.entries.remove(key) {
                self.order.remove(&slot.sequence);
            }
        }
        doomed.len()
    }

    /// Keys of entries matching the predicate, in insertion order.
    pub fn keys_where(&self, mut predicate: impl FnMut(&T) -> bool) -> Vec<String> {
        self.iter()
            .filter(|(_, value)| predicate(value))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

impl<T: PartialEq> PartialEq for Repository<T> {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.len() == other.len() && self.iter().eq(other.iter())
    }
}

// Serialized as an ordered sequence of (key, value) pairs.

impl<T: Serialize> Serialize for Repository<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for entry in self.iter() {
            seq.serialize_element(&entry)?;
        }
        seq.end()
    }
}

/// Entries without a kind tag; the owning state assigns the kind.
pub(crate) struct RepositoryEntries<T>(pub Vec<(String, T)>);

impl<'de, T: Deserialize<'de>> Deserialize<'de> for RepositoryEntries<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<(String, T)>::deserialize(deserializer).map(RepositoryEntries)
    }
}

impl<T> RepositoryEntries<T> {
    pub(crate) fn into_repository(self, kind: EntityKind) -> Repository<T> {
        let mut repository = Repository::new(kind);
        for (key, value) in self.0 {
            repository.put(&key, value);
        }
        repository
    }
}
