// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use thiserror::Error;

use crate::store::StoreError;

/// Why a scheduled fetch did not produce a value.
///
/// Cloneable so one outcome can reach every waiter of a task.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Fetch for '{key}' failed after {attempts} attempts: {source}")]
    Exhausted {
        key: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("No fetch function registered for '{0}'")]
    UnknownKey(String),

    #[error("Value cached under '{0}' has a different type")]
    TypeMismatch(String),

    #[error("Scheduler dropped before '{0}' completed")]
    Abandoned(String),
}

impl FetchError {
    /// Store failure behind an exhausted fetch, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Exhausted { source, .. } => Some(source),
            _ => None,
        }
    }
}
