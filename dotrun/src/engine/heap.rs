//! The managed heap: object store and array store.
//!
//! Both stores are append-only vectors; an allocation returns a stable
//! integer handle that is never reused and never dangles (handles only come
//! from prior allocations). Nothing is reclaimed: the engine is short-lived
//! and garbage collection is out of scope.

use rustc_hash::FxHashMap;

use crate::{
    engine::{error::RuntimeError, value::Value},
    metadata::typesystem::TypeDesc,
};
use std::sync::Arc;

/// A class instance on the heap: declared type plus a field-name map.
#[derive(Debug)]
pub struct ObjectInstance {
    /// Declared type of the instance.
    pub ty: Arc<TypeDesc>,
    /// Field values by name.
    pub fields: FxHashMap<String, Value>,
}

/// The engine's object and array stores.
#[derive(Debug, Default)]
pub struct ManagedHeap {
    objects: Vec<ObjectInstance>,
    arrays: Vec<Vec<Value>>,
}

impl ManagedHeap {
    /// Creates an empty heap.
    #[must_use]
    pub fn new() -> Self {
        ManagedHeap::default()
    }

    /// Allocates an object of the given type.
    ///
    /// Every declared field is created with its type-appropriate zero
    /// (integers 0, floats 0.0, booleans false, references null); the
    /// constructor call that follows populates them.
    pub fn alloc_object(&mut self, ty: Arc<TypeDesc>) -> usize {
        let fields = ty
            .fields
            .iter()
            .map(|f| (f.name.clone(), Value::default_for(&f.kind)))
            .collect();

        self.objects.push(ObjectInstance { ty, fields });
        self.objects.len() - 1
    }

    /// Allocates an array of `len` slots, each initialized to null.
    pub fn alloc_array(&mut self, len: usize) -> usize {
        self.arrays.push(vec![Value::Null; len]);
        self.arrays.len() - 1
    }

    /// Returns the number of objects allocated so far.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Returns the number of arrays allocated so far.
    #[must_use]
    pub fn array_count(&self) -> usize {
        self.arrays.len()
    }

    /// Returns the object behind a handle.
    ///
    /// # Errors
    /// Returns an internal error for a handle the store never issued.
    pub fn object(&self, handle: usize) -> Result<&ObjectInstance, RuntimeError> {
        self.objects
            .get(handle)
            .ok_or_else(|| RuntimeError::Internal(format!("unknown object handle {handle}")))
    }

    /// Reads an instance field by name.
    ///
    /// # Errors
    /// Returns an internal error if the handle or the field does not exist;
    /// a missing field on load is fatal.
    pub fn load_field(&self, handle: usize, field: &str) -> Result<Value, RuntimeError> {
        let object = self.object(handle)?;
        object.fields.get(field).cloned().ok_or_else(|| {
            RuntimeError::Internal(format!(
                "type {} has no field '{field}'",
                object.ty.full_name()
            ))
        })
    }

    /// Writes an instance field by name, creating it on first write.
    ///
    /// Creation on write keeps runtime-provided objects (exceptions,
    /// reflection handles) usable without declared field lists.
    ///
    /// # Errors
    /// Returns an internal error for a handle the store never issued.
    pub fn store_field(
        &mut self,
        handle: usize,
        field: &str,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let object = self
            .objects
            .get_mut(handle)
            .ok_or_else(|| RuntimeError::Internal(format!("unknown object handle {handle}")))?;
        object.fields.insert(field.to_string(), value);
        Ok(())
    }

    /// Returns the length of an array.
    ///
    /// # Errors
    /// Returns an internal error for a handle the store never issued.
    pub fn array_len(&self, handle: usize) -> Result<usize, RuntimeError> {
        self.arrays
            .get(handle)
            .map(Vec::len)
            .ok_or_else(|| RuntimeError::Internal(format!("unknown array handle {handle}")))
    }

    /// Reads an array element with bounds checking.
    ///
    /// # Errors
    /// Returns an index error for an out-of-range index.
    pub fn array_get(&self, handle: usize, index: i64) -> Result<Value, RuntimeError> {
        let array = self
            .arrays
            .get(handle)
            .ok_or_else(|| RuntimeError::Internal(format!("unknown array handle {handle}")))?;

        usize::try_from(index)
            .ok()
            .and_then(|i| array.get(i))
            .cloned()
            .ok_or(RuntimeError::IndexOutOfRange {
                index,
                length: array.len(),
            })
    }

    /// Writes an array element with bounds checking.
    ///
    /// # Errors
    /// Returns an index error for an out-of-range index.
    pub fn array_set(&mut self, handle: usize, index: i64, value: Value) -> Result<(), RuntimeError> {
        let array = self
            .arrays
            .get_mut(handle)
            .ok_or_else(|| RuntimeError::Internal(format!("unknown array handle {handle}")))?;
        let length = array.len();

        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| array.get_mut(i))
            .ok_or(RuntimeError::IndexOutOfRange { index, length })?;
        *slot = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        signatures::ElemKind,
        typesystem::{FieldDesc, TypeAttributes},
    };
    use crate::metadata::token::Token;

    fn type_with_fields() -> Arc<TypeDesc> {
        Arc::new(TypeDesc {
            token: Token::new(0x02000002),
            namespace: "Demo".to_string(),
            name: "Point".to_string(),
            attributes: TypeAttributes::empty(),
            assembly: "demo".to_string(),
            fields: vec![
                Arc::new(FieldDesc {
                    name: "x".to_string(),
                    ordinal: 0,
                    kind: ElemKind::I4,
                }),
                Arc::new(FieldDesc {
                    name: "label".to_string(),
                    ordinal: 1,
                    kind: ElemKind::String,
                }),
            ],
            methods: Vec::new(),
        })
    }

    #[test]
    fn handles_are_strictly_increasing() {
        let mut heap = ManagedHeap::new();
        let ty = type_with_fields();

        let a = heap.alloc_object(Arc::clone(&ty));
        let b = heap.alloc_object(Arc::clone(&ty));
        let c = heap.alloc_array(4);
        let d = heap.alloc_array(0);

        assert!(a < b);
        assert!(c < d);
        assert_eq!(heap.object_count(), 2);
        assert_eq!(heap.array_count(), 2);
    }

    #[test]
    fn fields_default_by_kind() {
        let mut heap = ManagedHeap::new();
        let handle = heap.alloc_object(type_with_fields());

        assert!(matches!(heap.load_field(handle, "x").unwrap(), Value::Int32(0)));
        assert!(heap.load_field(handle, "label").unwrap().is_null());
        assert!(heap.load_field(handle, "missing").is_err());
    }

    #[test]
    fn field_store_and_reload() {
        let mut heap = ManagedHeap::new();
        let handle = heap.alloc_object(type_with_fields());

        heap.store_field(handle, "x", Value::Int32(9)).unwrap();
        assert!(matches!(heap.load_field(handle, "x").unwrap(), Value::Int32(9)));

        // First write creates undeclared fields (runtime-provided objects)
        heap.store_field(handle, "_message", Value::Str("boom".into()))
            .unwrap();
        assert!(heap.load_field(handle, "_message").is_ok());
    }

    #[test]
    fn array_bounds_are_checked() {
        let mut heap = ManagedHeap::new();
        let handle = heap.alloc_array(3);

        assert_eq!(heap.array_len(handle).unwrap(), 3);
        assert!(heap.array_get(handle, 0).unwrap().is_null());

        heap.array_set(handle, 2, Value::Int32(30)).unwrap();
        assert!(matches!(heap.array_get(handle, 2).unwrap(), Value::Int32(30)));

        assert!(matches!(
            heap.array_get(handle, 3),
            Err(RuntimeError::IndexOutOfRange { index: 3, length: 3 })
        ));
        assert!(heap.array_set(handle, -1, Value::Null).is_err());
    }
}
