//! Ordered associative table.
//!
//! A table is an append log of (key, value) entries plus an index from the
//! hashable key form to the latest entry for that key. `insert` appends
//! without deduplication (the constructor primitive); `set` overwrites.
//! Lookups always see the most recent entry for a key.

use crate::string::StringId;
use crate::value::Value;
use indexmap::IndexMap;

/// The hashable form of a table key. Nil and NaN keys are rejected before
/// conversion, so every valid key has exactly one `TableKey` form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableKey {
    /// Number key, stored as raw bits (NaN excluded).
    Number(u64),
    Str(StringId),
    Boolean(bool),
    Address(i64),
    Index(u64),
    /// Reference key (table, closure, pointer): arena kind + index.
    Handle(u8, u32),
}

fn key_of(key: Value) -> Result<TableKey, &'static str> {
    match key {
        Value::Nil => Err("table key is nil"),
        Value::Number(n) if n.is_nan() => Err("table key is NaN"),
        // Normalize -0.0 so both zeros are one key
        Value::Number(n) => Ok(TableKey::Number((n + 0.0).to_bits())),
        Value::Str(id) => Ok(TableKey::Str(id)),
        Value::Boolean(b) => Ok(TableKey::Boolean(b)),
        Value::Address(a) => Ok(TableKey::Address(a)),
        Value::Index(i) => Ok(TableKey::Index(i)),
        Value::Table(id) => Ok(TableKey::Handle(0, id.index())),
        Value::Closure(id) => Ok(TableKey::Handle(1, id.index())),
        Value::Pointer(id) => Ok(TableKey::Handle(2, id.index())),
    }
}

#[derive(Debug, Default)]
pub struct Table {
    /// Append log of entries; superseded entries stay in place.
    entries: Vec<(Value, Value)>,
    /// Latest entry position per key, in first-insertion order.
    index: IndexMap<TableKey, usize>,
}

impl Table {
    pub fn new() -> Self {
        Table::default()
    }

    /// Append an entry without deduplication. The new entry becomes the
    /// visible one for its key.
    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), &'static str> {
        let k = key_of(key)?;
        let pos = self.entries.len();
        self.entries.push((key, value));
        self.index.insert(k, pos);
        Ok(())
    }

    /// Overwrite the entry for `key`, appending if absent.
    pub fn set(&mut self, key: Value, value: Value) -> Result<(), &'static str> {
        let k = key_of(key)?;
        if let Some(&pos) = self.index.get(&k) {
            self.entries[pos].1 = value;
            Ok(())
        } else {
            let pos = self.entries.len();
            self.entries.push((key, value));
            self.index.insert(k, pos);
            Ok(())
        }
    }

    /// Look up the most recent value for `key`.
    pub fn get(&self, key: Value) -> Option<Value> {
        let k = key_of(key).ok()?;
        self.index.get(&k).map(|&pos| self.entries[pos].1)
    }

    pub fn has(&self, key: Value) -> bool {
        key_of(key)
            .map(|k| self.index.contains_key(&k))
            .unwrap_or(false)
    }

    /// Number of live (deduplicated) keys.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of raw entries in the append log, duplicates included.
    pub fn raw_len(&self) -> usize {
        self.entries.len()
    }

    /// The i-th live key, in first-insertion order.
    pub fn key_at(&self, position: usize) -> Option<Value> {
        let (_, &pos) = self.index.get_index(position)?;
        Some(self.entries[pos].0)
    }

    /// The value of the i-th live key, in first-insertion order.
    pub fn value_at(&self, position: usize) -> Option<Value> {
        let (_, &pos) = self.index.get_index(position)?;
        Some(self.entries[pos].1)
    }

    /// Iterate live entries in first-insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.index.values().map(|&pos| {
            let (k, v) = &self.entries[pos];
            (k, v)
        })
    }
}
