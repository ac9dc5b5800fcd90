// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote document store boundary.
//!
//! The store itself is an external collaborator; the read layer only needs
//! [`DocumentStore::read`]. [`InMemoryStore`] evaluates requests locally and
//! keeps a log of every read it served, for tests and demos.

pub mod memory;
pub mod traits;

pub use memory::InMemoryStore;
pub use traits::{DocumentStore, StoreError};
