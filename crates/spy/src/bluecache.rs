use std::fmt::Write as _;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::fqn::{Fqn, FqnTable};
use crate::function::FuncRef;
use crate::object::{Key, Object};

/// Argument-key list; call sites rarely exceed a handful of arguments.
pub type ArgsKey = SmallVec<[Key; 4]>;

/// Memoization key: function identity plus the structural keys of the
/// arguments.
pub type CacheKey = (usize, ArgsKey);

/// Stores and records the results of blue function calls.
///
/// Blue functions are required to be pure (equal keys ⇒ equal results), so
/// the cache both enforces call-order-independent semantics and makes
/// generic specialization idempotent: specializing the same generic with the
/// same type arguments always yields the same function object.
#[derive(Debug, Default)]
pub struct BlueCache {
    data: AHashMap<CacheKey, Object>,
    /// func identity → (fqn, entry count), for the debug summary.
    funcs: AHashMap<usize, (Fqn, u64)>,
}

impl BlueCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn args_key(args: &[Object]) -> ArgsKey {
        args.iter().map(Object::spy_key).collect()
    }

    pub fn record(&mut self, func: &FuncRef, args_key: ArgsKey, result: Object) {
        self.funcs
            .entry(func.id())
            .and_modify(|e| e.1 += 1)
            .or_insert((func.fqn(), 1));
        self.data.insert((func.id(), args_key), result);
    }

    pub fn lookup(&self, func: &FuncRef, args_key: &[Key]) -> Option<Object> {
        // an allocation-free probe would need a borrowed key type; argument
        // lists are short enough that rebuilding the key does not matter
        self.data
            .get(&(func.id(), args_key.iter().cloned().collect::<ArgsKey>()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Entries-per-function summary, used by the CLI for debugging.
    pub fn summary(&self, fqns: &FqnTable) -> String {
        let mut rows: Vec<(u64, String)> = self
            .funcs
            .values()
            .map(|(fqn, n)| (*n, fqns.render(*fqn)))
            .collect();
        rows.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        let mut out = String::from("Entries | Function\n");
        for (n, name) in rows {
            let _ = writeln!(out, "{n:>7} | {name}");
        }
        out
    }
}
