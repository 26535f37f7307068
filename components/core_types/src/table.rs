//! Insertion-ordered tables.
//!
//! Tables keep their entries in an [`IndexMap`] so that traversal order is
//! stable. Assigning `nil` to an existing key leaves a tombstone in place,
//! which keeps `next` valid while a script clears fields during traversal;
//! tombstones are compacted only when a new key is inserted.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{RuntimeError, ScriptError, Value};

/// Minimum number of tombstones before compaction is considered.
const COMPACT_THRESHOLD: usize = 16;

/// A hashable table key. Wraps a non-nil, non-NaN scalar value.
#[derive(Clone, Debug)]
pub struct TableKey(Value);

impl TableKey {
    /// Validate and normalize a key.
    pub fn new(key: Value) -> Result<Self, ScriptError> {
        match key.scalar() {
            Value::Nil => Err(RuntimeError::new("table index is nil").into()),
            Value::Number(n) if n.is_nan() => Err(RuntimeError::new("table index is NaN").into()),
            Value::Number(n) if n == 0.0 => Ok(TableKey(Value::Number(0.0))),
            other => Ok(TableKey(other)),
        }
    }

    /// The key as a value.
    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl PartialEq for TableKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.raw_equals(&other.0)
    }
}

impl Eq for TableKey {}

impl Hash for TableKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::Boolean(b) => (1u8, *b).hash(state),
            Value::Number(n) => (2u8, n.to_bits()).hash(state),
            Value::String(s) => (3u8, &**s).hash(state),
            Value::Table(t) => (4u8, t.addr()).hash(state),
            Value::Function(c) => (5u8, Arc::as_ptr(c) as *const u8 as usize).hash(state),
            Value::Callback(c) => (6u8, c.addr()).hash(state),
            Value::UserData(u) => (7u8, u.addr()).hash(state),
            Value::Coroutine(c) => (8u8, c.addr()).hash(state),
            Value::Nil | Value::Tuple(_) => 0u8.hash(state),
        }
    }
}

/// An associative array with an optional metatable.
#[derive(Default)]
pub struct Table {
    entries: IndexMap<TableKey, Value>,
    tombstones: usize,
    metatable: Option<TableRef>,
}

impl Table {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw lookup; missing keys yield `nil`.
    pub fn get(&self, key: &Value) -> Value {
        match TableKey::new(key.clone()) {
            Ok(k) => self.entries.get(&k).cloned().unwrap_or_default(),
            Err(_) => Value::Nil,
        }
    }

    /// Raw lookup by string key.
    pub fn get_str(&self, key: &str) -> Value {
        self.get(&Value::from(key))
    }

    /// Raw assignment. Assigning `nil` removes the entry.
    pub fn set(&mut self, key: Value, value: Value) -> Result<(), ScriptError> {
        let key = TableKey::new(key)?;
        let value = value.scalar();

        if value.is_nil() {
            if let Some(slot) = self.entries.get_mut(&key) {
                if !slot.is_nil() {
                    *slot = Value::Nil;
                    self.tombstones += 1;
                }
            }
            return Ok(());
        }

        match self.entries.get_mut(&key) {
            Some(slot) => {
                if slot.is_nil() {
                    self.tombstones -= 1;
                }
                *slot = value;
            }
            None => {
                self.compact_if_needed();
                self.entries.insert(key, value);
            }
        }
        Ok(())
    }

    /// Raw assignment by string key.
    pub fn set_str(&mut self, key: &str, value: Value) {
        // string keys are always valid
        let _ = self.set(Value::from(key), value);
    }

    /// Append at position `#t + 1`.
    pub fn append(&mut self, value: Value) {
        let next = self.length() + 1;
        let _ = self.set(Value::from(next), value);
    }

    /// Border of the sequence part: the largest `n` with `t[n] ~= nil`
    /// such that every index below it is also non-nil.
    pub fn length(&self) -> usize {
        let mut n = 0usize;
        while !self.get(&Value::from(n + 1)).is_nil() {
            n += 1;
        }
        n
    }

    /// Number of live entries.
    pub fn count(&self) -> usize {
        self.entries.len() - self.tombstones
    }

    /// Entry following `key` in traversal order; `nil` starts the traversal.
    pub fn next(&self, key: &Value) -> Result<Option<(Value, Value)>, ScriptError> {
        let start = if key.is_nil() {
            0
        } else {
            let k = TableKey::new(key.clone())?;
            match self.entries.get_index_of(&k) {
                Some(idx) => idx + 1,
                None => return Err(RuntimeError::new("invalid key to 'next'").into()),
            }
        };

        Ok(self
            .entries
            .iter()
            .skip(start)
            .find(|(_, v)| !v.is_nil())
            .map(|(k, v)| (k.value().clone(), v.clone())))
    }

    /// Snapshot of every live entry in traversal order.
    pub fn pairs(&self) -> Vec<(Value, Value)> {
        self.entries
            .iter()
            .filter(|(_, v)| !v.is_nil())
            .map(|(k, v)| (k.value().clone(), v.clone()))
            .collect()
    }

    /// Metatable, if one is set.
    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.clone()
    }

    /// Replace the metatable.
    pub fn set_metatable(&mut self, metatable: Option<TableRef>) {
        self.metatable = metatable;
    }

    fn compact_if_needed(&mut self) {
        if self.tombstones >= COMPACT_THRESHOLD && self.tombstones * 2 >= self.entries.len() {
            self.entries.retain(|_, v| !v.is_nil());
            self.tombstones = 0;
        }
    }
}

/// Shared handle to a [`Table`].
///
/// Locks are only held for the duration of a single raw access, never
/// across a call back into the virtual machine.
#[derive(Clone, Default)]
pub struct TableRef(Arc<RwLock<Table>>);

impl TableRef {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing table.
    pub fn from_table(table: Table) -> Self {
        TableRef(Arc::new(RwLock::new(table)))
    }

    /// Build a sequence from values, indexed from 1.
    pub fn from_sequence(values: impl IntoIterator<Item = Value>) -> Self {
        let mut table = Table::new();
        for (i, v) in values.into_iter().enumerate() {
            let _ = table.set(Value::from(i + 1), v);
        }
        Self::from_table(table)
    }

    /// Shared read access.
    pub fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.0.read()
    }

    /// Exclusive write access.
    pub fn write(&self) -> RwLockWriteGuard<'_, Table> {
        self.0.write()
    }

    /// Raw lookup.
    pub fn get(&self, key: &Value) -> Value {
        self.read().get(key)
    }

    /// Raw lookup by string key.
    pub fn get_str(&self, key: &str) -> Value {
        self.read().get_str(key)
    }

    /// Raw assignment.
    pub fn set(&self, key: Value, value: Value) -> Result<(), ScriptError> {
        self.write().set(key, value)
    }

    /// Raw assignment by string key.
    pub fn set_str(&self, key: &str, value: Value) {
        self.write().set_str(key, value)
    }

    /// Sequence border.
    pub fn length(&self) -> usize {
        self.read().length()
    }

    /// Metatable, if one is set.
    pub fn metatable(&self) -> Option<TableRef> {
        self.read().metatable()
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &TableRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Identity address.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const u8 as usize
    }
}

impl std::fmt::Debug for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TableRef({:#x})", self.addr())
    }
}
