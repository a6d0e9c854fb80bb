//! The function cache: every compiled function, keyed `jitId:op`.
//!
//! Entries are added at most once and never removed or replaced, so a handle
//! holding a key stays valid for the registry's lifetime. The registry is
//! shared through an `Arc`; an engine can be built on a fresh one (tests,
//! isolated callers) or on one shared with other engines.
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::ir::{FnKey, JitFn};

pub type FnTable = HashMap<FnKey, Arc<JitFn>>;

#[derive(Debug, Default)]
pub struct JitRegistry {
    fns: RwLock<FnTable>,
}

impl JitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn contains(&self, key: &FnKey) -> bool {
        self.read().contains_key(key)
    }

    pub fn get(&self, key: &FnKey) -> Option<Arc<JitFn>> {
        self.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Add functions whose keys are not taken yet. Returns how many were new.
    pub fn define_all(&self, fns: impl IntoIterator<Item = JitFn>) -> usize {
        let mut table = self.fns.write().unwrap_or_else(PoisonError::into_inner);
        let mut added = 0;
        for f in fns {
            if let Some(existing) = table.get(&f.key) {
                if existing.code != f.code {
                    warn!(key = %f.key, "redefinition ignored; keeping the registered body");
                } else {
                    trace!(key = %f.key, "already registered");
                }
                continue;
            }
            trace!(key = %f.key, "registered");
            table.insert(f.key.clone(), Arc::new(f));
            added += 1;
        }
        added
    }

    /// Every registered function, sorted by key.
    pub fn functions(&self) -> Vec<Arc<JitFn>> {
        let mut out: Vec<Arc<JitFn>> = self.read().values().cloned().collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    pub fn snapshot(&self, roots: IndexMap<String, String>) -> JitSnapshot {
        let functions = self.functions().iter().map(|f| JitFn::clone(f)).collect();
        JitSnapshot { functions, roots }
    }

    /// Load a snapshot. Existing entries win over snapshot entries.
    pub fn restore(&self, snapshot: JitSnapshot) -> usize {
        let total = snapshot.functions.len();
        let added = self.define_all(snapshot.functions);
        debug!(added, skipped = total - added, "restored compiled functions");
        added
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, FnTable> {
        self.fns.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Persistable form of a registry: the functions plus named entry points
/// (`name -> jitId`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JitSnapshot {
    pub functions: Vec<JitFn>,
    #[serde(default)]
    pub roots: IndexMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Check, Code, Kind, OpKind};

    fn string_check() -> JitFn {
        JitFn::new("string", Code::IsType(Check::Is(Kind::String)))
    }

    #[test]
    fn keys_are_defined_at_most_once() {
        let reg = JitRegistry::new();
        assert_eq!(reg.define_all([string_check()]), 1);
        let other = JitFn::new("string", Code::IsType(Check::Always));
        assert_eq!(reg.define_all([other]), 0);
        let kept = reg.get(&FnKey::new("string", OpKind::IsType)).unwrap();
        assert_eq!(kept.code, Code::IsType(Check::Is(Kind::String)));
    }

    #[test]
    fn snapshots_restore_into_an_empty_registry() {
        let reg = JitRegistry::new();
        reg.define_all([string_check()]);
        let mut roots = IndexMap::new();
        roots.insert("Name".to_string(), "string".to_string());
        let snap = reg.snapshot(roots);

        let text = serde_json::to_string(&snap).unwrap();
        let back: JitSnapshot = serde_json::from_str(&text).unwrap();
        let fresh = JitRegistry::new();
        assert_eq!(fresh.restore(back), 1);
        assert!(fresh.contains(&FnKey::new("string", OpKind::IsType)));
    }
}
