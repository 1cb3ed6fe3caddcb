//! In-process [`Store`] implementation.
//!
//! Backs the worker when no external store is deployed alongside it, and all
//! engine tests. TTLs are enforced lazily: expired entries are dropped the
//! next time their key is touched.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};

use super::hll::HyperLogLog;
use super::{Store, StoreError};

#[derive(Debug, Clone)]
enum Value {
    Counter(i64),
    Sketch(HyperLogLog),
    Set(FxHashSet<i64>),
    SortedSet(FxHashMap<i64, f64>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Counter(_) => "counter",
            Value::Sketch(_) => "sketch",
            Value::Set(_) => "set",
            Value::SortedSet(_) => "zset",
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// Shared in-memory store. Cloning is cheap only through `Arc`; the struct
/// itself owns the data.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<FxHashMap<String, Entry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut FxHashMap<String, Entry>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))?;
        let now = Instant::now();
        entries.retain(|_, entry| entry.live(now));
        f(&mut entries)
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
    }
}

/// Sorted-set members ordered by descending score. Equal scores fall back to
/// ascending member id so reads are deterministic.
fn rev_ordered(members: &FxHashMap<i64, f64>) -> Vec<(i64, f64)> {
    let mut ordered: Vec<(i64, f64)> = members.iter().map(|(&m, &s)| (m, s)).collect();
    ordered.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ordered
}

#[async_trait]
impl Store for MemoryStore {
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: Value::Counter(0),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Counter(current) => {
                    *current += delta;
                    Ok(*current)
                }
                _ => Err(wrong_type(key)),
            }
        })
    }

    async fn get_counter(&self, key: &str) -> Result<i64, StoreError> {
        self.with_entries(|entries| match entries.get(key).map(|entry| &entry.value) {
            None => Ok(0),
            Some(Value::Counter(current)) => Ok(*current),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn sketch_add(&self, key: &str, member: &[u8]) -> Result<(), StoreError> {
        self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: Value::Sketch(HyperLogLog::new()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Sketch(sketch) => {
                    sketch.insert(member);
                    Ok(())
                }
                _ => Err(wrong_type(key)),
            }
        })
    }

    async fn sketch_count(&self, key: &str) -> Result<u64, StoreError> {
        self.with_entries(|entries| match entries.get(key).map(|entry| &entry.value) {
            None => Ok(0),
            Some(Value::Sketch(sketch)) => Ok(sketch.count()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.with_entries(|entries| {
            if let Some(entry) = entries.get_mut(key) {
                entry.expires_at = Some(Instant::now() + ttl);
            }
            Ok(())
        })
    }

    async fn set_add(&self, key: &str, member: i64) -> Result<(), StoreError> {
        self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: Value::Set(FxHashSet::default()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Set(members) => {
                    members.insert(member);
                    Ok(())
                }
                _ => Err(wrong_type(key)),
            }
        })
    }

    async fn set_members(&self, key: &str) -> Result<Vec<i64>, StoreError> {
        self.with_entries(|entries| match entries.get(key).map(|entry| &entry.value) {
            None => Ok(Vec::new()),
            Some(Value::Set(members)) => {
                let mut result: Vec<i64> = members.iter().copied().collect();
                result.sort_unstable();
                Ok(result)
            }
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn zset_upsert(&self, key: &str, member: i64, score: f64) -> Result<(), StoreError> {
        self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: Value::SortedSet(FxHashMap::default()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::SortedSet(members) => {
                    members.insert(member, score);
                    Ok(())
                }
                _ => Err(wrong_type(key)),
            }
        })
    }

    async fn zset_remove(&self, key: &str, member: i64) -> Result<(), StoreError> {
        self.with_entries(|entries| match entries.get_mut(key).map(|entry| &mut entry.value) {
            None => Ok(()),
            Some(Value::SortedSet(members)) => {
                members.remove(&member);
                Ok(())
            }
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn zset_rev_rank(&self, key: &str, member: i64) -> Result<Option<u64>, StoreError> {
        self.with_entries(|entries| match entries.get(key).map(|entry| &entry.value) {
            None => Ok(None),
            Some(Value::SortedSet(members)) => Ok(rev_ordered(members)
                .iter()
                .position(|(m, _)| *m == member)
                .map(|rank| rank as u64)),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn zset_score(&self, key: &str, member: i64) -> Result<Option<f64>, StoreError> {
        self.with_entries(|entries| match entries.get(key).map(|entry| &entry.value) {
            None => Ok(None),
            Some(Value::SortedSet(members)) => Ok(members.get(&member).copied()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn zset_rev_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<i64>, StoreError> {
        self.with_entries(|entries| match entries.get(key).map(|entry| &entry.value) {
            None => Ok(Vec::new()),
            Some(Value::SortedSet(members)) => {
                let ordered = rev_ordered(members);
                let len = ordered.len() as i64;
                let from = if start < 0 { (len + start).max(0) } else { start };
                let to = if stop < 0 { len + stop } else { stop.min(len - 1) };
                if from > to || from >= len {
                    return Ok(Vec::new());
                }
                Ok(ordered[from as usize..=(to as usize)]
                    .iter()
                    .map(|(m, _)| *m)
                    .collect())
            }
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn zset_trim_below(&self, key: &str, watermark: f64) -> Result<u64, StoreError> {
        self.with_entries(|entries| match entries.get_mut(key).map(|entry| &mut entry.value) {
            None => Ok(0),
            Some(Value::SortedSet(members)) => {
                let before = members.len();
                members.retain(|_, score| *score >= watermark);
                Ok((before - members.len()) as u64)
            }
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn zset_len(&self, key: &str) -> Result<u64, StoreError> {
        self.with_entries(|entries| match entries.get(key).map(|entry| &entry.value) {
            None => Ok(0),
            Some(Value::SortedSet(members)) => Ok(members.len() as u64),
            Some(_) => Err(wrong_type(key)),
        })
    }
}
