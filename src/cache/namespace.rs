// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Typed cache namespaces.
//!
//! Every logical data kind gets a [`Namespace<V>`]. Keys minted from it carry
//! the value type, so the scheduler hands back a `V` without the caller ever
//! casting. The string form is `"{namespace}:{id}"`, which keeps keys
//! readable for pattern invalidation (`"payments:company_123*"`).

use std::fmt;
use std::marker::PhantomData;

/// A family of cache keys that all map to values of type `V`.
pub struct Namespace<V> {
    name: &'static str,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Namespace<V> {
    pub const fn new(name: &'static str) -> Self {
        Self { name, _marker: PhantomData }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Key for one entity in this namespace.
    pub fn key(&self, id: impl fmt::Display) -> TypedKey<V> {
        TypedKey {
            key: format!("{}:{}", self.name, id),
            _marker: PhantomData,
        }
    }

    /// Pattern matching every key of this namespace.
    pub fn pattern(&self) -> String {
        format!("{}:*", self.name)
    }
}

impl<V> Clone for Namespace<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Namespace<V> {}

impl<V> fmt::Debug for Namespace<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Namespace").field(&self.name).finish()
    }
}

/// A cache key bound to its value type.
pub struct TypedKey<V> {
    key: String,
    _marker: PhantomData<fn() -> V>,
}

impl<V> TypedKey<V> {
    /// Wrap a raw key. Prefer [`Namespace::key`] so keys stay grouped.
    pub fn raw(key: impl Into<String>) -> Self {
        Self { key: key.into(), _marker: PhantomData }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl<V> AsRef<str> for TypedKey<V> {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

impl<V> Clone for TypedKey<V> {
    fn clone(&self) -> Self {
        Self::raw(self.key.clone())
    }
}

impl<V> PartialEq for TypedKey<V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<V> Eq for TypedKey<V> {}

impl<V> fmt::Debug for TypedKey<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedKey").field(&self.key).finish()
    }
}

impl<V> fmt::Display for TypedKey<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
