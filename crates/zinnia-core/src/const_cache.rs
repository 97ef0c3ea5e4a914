//! Deduplicated compile-time constants.
//!
//! Constants that need a storage slot (strings, structured literals passed
//! by address) are interned here so equal values share one slot. Functions
//! compiled on different threads share one cache through an `Arc`.

use num_bigint::BigInt;
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::const_value::ConstValue;
use crate::types::TypeId;

/// Handle of an interned constant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ConstHandle(pub u32);

/// Hashable mirror of [`ConstValue`]; floats compare by total order.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
enum CacheKey {
    Integer(BigInt),
    Float(OrderedFloat<f32>),
    Double(OrderedFloat<f64>),
    String(String),
    Char(u16),
    Boolean(bool),
    Structured(Vec<CacheKey>),
    Zero,
    Null,
}

impl From<&ConstValue> for CacheKey {
    fn from(value: &ConstValue) -> Self {
        match value {
            ConstValue::Integer(v) => CacheKey::Integer(v.clone()),
            ConstValue::Float(v) => CacheKey::Float(OrderedFloat(*v)),
            ConstValue::Double(v) => CacheKey::Double(OrderedFloat(*v)),
            ConstValue::String(v) => CacheKey::String(v.clone()),
            ConstValue::Char(v) => CacheKey::Char(*v),
            ConstValue::Boolean(v) => CacheKey::Boolean(*v),
            ConstValue::Structured(members) => {
                CacheKey::Structured(members.iter().map(CacheKey::from).collect())
            }
            ConstValue::Zero => CacheKey::Zero,
            ConstValue::Null => CacheKey::Null,
        }
    }
}

#[derive(Default)]
struct CacheInner {
    index: FxHashMap<(CacheKey, TypeId), ConstHandle>,
    entries: Vec<(ConstValue, TypeId)>,
}

/// Thread-safe constant interner.
#[derive(Default)]
pub struct ConstCache {
    inner: Mutex<CacheInner>,
}

impl ConstCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The handle of `(value, ty)`, inserting it on first use.
    pub fn get_or_insert(&self, value: &ConstValue, ty: TypeId) -> ConstHandle {
        let key = (CacheKey::from(value), ty);
        let mut inner = self.inner.lock();
        if let Some(&handle) = inner.index.get(&key) {
            return handle;
        }

        let handle = ConstHandle(inner.entries.len() as u32);
        inner.entries.push((value.clone(), ty));
        inner.index.insert(key, handle);
        tracing::trace!(handle = handle.0, %value, "interned constant");
        handle
    }

    pub fn get(&self, handle: ConstHandle) -> Option<(ConstValue, TypeId)> {
        self.inner.lock().entries.get(handle.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

impl std::fmt::Debug for ConstCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstCache").field("len", &self.len()).finish()
    }
}
