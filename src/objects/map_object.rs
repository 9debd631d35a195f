use std::cell::RefCell;

use rustc_hash::FxHashMap;

use super::{ObjectFactory, ObjectPtr};
use crate::errors::{RtResult, RuntimeError, RuntimeErrorKind};

type Bucket = Vec<(ObjectPtr, ObjectPtr)>;

/// Hash map keyed by the object domain hash. Keys sharing a hash live in one
/// bucket and are told apart by domain equality.
#[derive(Default)]
pub struct MapObject {
    buckets: RefCell<FxHashMap<u64, Bucket>>,
}

impl MapObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: Vec<(ObjectPtr, ObjectPtr)>, f: &ObjectFactory<'_>) -> RtResult<Self> {
        let map = Self::new();
        for (key, value) in pairs {
            map.set(key, value, f)?;
        }
        Ok(map)
    }

    // snapshot of one bucket, so user `__eq__` never runs under a borrow
    fn bucket(&self, hash: u64) -> Bucket {
        self.buckets
            .borrow()
            .get(&hash)
            .cloned()
            .unwrap_or_default()
    }

    fn position(bucket: &Bucket, key: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<Option<usize>> {
        for (i, (stored, _)) in bucket.iter().enumerate() {
            if stored.loose_eq(key, f)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    fn lookup(&self, key: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<Option<ObjectPtr>> {
        let hash = key.obj_hash(f)?;
        let bucket = self.bucket(hash);
        Ok(Self::position(&bucket, key, f)?.map(|i| bucket[i].1.clone()))
    }

    pub fn get(&self, key: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        self.lookup(key, f)?
            .ok_or_else(|| RuntimeError::new(RuntimeErrorKind::KeyNotFound(key.print())))
    }

    /// Replaces the value of an equal key in place, else appends to the bucket.
    pub fn set(&self, key: ObjectPtr, value: ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<()> {
        let hash = key.obj_hash(f)?;
        let bucket = self.bucket(hash);
        let slot = Self::position(&bucket, &key, f)?;
        let mut buckets = self.buckets.borrow_mut();
        let entries = buckets.entry(hash).or_default();
        match slot {
            Some(i) if i < entries.len() => entries[i].1 = value,
            _ => entries.push((key, value)),
        }
        Ok(())
    }

    pub fn contains(&self, key: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<bool> {
        Ok(self.lookup(key, f)?.is_some())
    }

    pub fn remove(&self, key: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        let hash = key.obj_hash(f)?;
        let bucket = self.bucket(hash);
        let Some(i) = Self::position(&bucket, key, f)? else {
            return Err(RuntimeError::new(RuntimeErrorKind::KeyNotFound(key.print())));
        };
        let mut buckets = self.buckets.borrow_mut();
        let Some(entries) = buckets.get_mut(&hash) else {
            return Err(RuntimeError::new(RuntimeErrorKind::KeyNotFound(key.print())));
        };
        let (_, value) = entries.remove(i);
        if entries.is_empty() {
            buckets.remove(&hash);
        }
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.buckets.borrow().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.borrow().is_empty()
    }

    pub fn items(&self) -> Vec<(ObjectPtr, ObjectPtr)> {
        self.buckets
            .borrow()
            .values()
            .flat_map(|bucket| bucket.iter().cloned())
            .collect()
    }

    pub fn keys(&self) -> Vec<ObjectPtr> {
        self.items().into_iter().map(|(k, _)| k).collect()
    }

    pub fn values(&self) -> Vec<ObjectPtr> {
        self.items().into_iter().map(|(_, v)| v).collect()
    }

    /// Same size and every key maps to an equal value on both sides.
    pub fn equal(&self, other: &MapObject, f: &ObjectFactory<'_>) -> RtResult<bool> {
        if std::ptr::eq(self, other) {
            return Ok(true);
        }
        if self.len() != other.len() {
            return Ok(false);
        }
        for (key, value) in self.items() {
            let Some(theirs) = other.lookup(&key, f)? else {
                return Ok(false);
            };
            if !value.loose_eq(&theirs, f)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
