//! Static-field storage.
//!
//! A process-wide (per-engine) mapping from (declaring-type full name,
//! field name) to [`Value`]. The first write creates the entry; a read
//! before any write yields null, which doubles as the default for
//! reference kinds and as zero once primitives are coerced.

use rustc_hash::FxHashMap;

use crate::engine::value::Value;

/// Storage for static fields, keyed by declaring type and field name.
#[derive(Debug, Default)]
pub struct StaticStore {
    fields: FxHashMap<(String, String), Value>,
}

impl StaticStore {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        StaticStore::default()
    }

    /// Reads a static field; null before the first write.
    #[must_use]
    pub fn load(&self, type_full_name: &str, field: &str) -> Value {
        self.fields
            .get(&(type_full_name.to_string(), field.to_string()))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Writes a static field, creating the entry on first write.
    pub fn store(&mut self, type_full_name: &str, field: &str, value: Value) {
        self.fields
            .insert((type_full_name.to_string(), field.to_string()), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_before_write_is_null() {
        let store = StaticStore::new();
        assert!(store.load("Demo.Counters", "total").is_null());
    }

    #[test]
    fn read_returns_most_recent_write() {
        let mut store = StaticStore::new();
        store.store("Demo.Counters", "total", Value::Int32(1));
        store.store("Demo.Counters", "total", Value::Int32(2));

        assert!(matches!(store.load("Demo.Counters", "total"), Value::Int32(2)));
        // Different key, untouched
        assert!(store.load("Demo.Counters", "other").is_null());
        assert!(store.load("Demo.Gauges", "total").is_null());
    }
}
