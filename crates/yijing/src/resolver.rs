use crate::{HexagramCode, Reading, Tables, TrigramCode};
use std::sync::Arc;

/// Appended to the composed name when a code has no hexagram table entry.
pub const FALLBACK_SUFFIX: &str = "卦";

/// The outcome of resolving a reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub name: String,
    pub code: HexagramCode,
}

/// Maps readings to hexagram names through a pair of lookup tables.
///
/// Resolution is a pure function of the reading and the tables and never
/// fails. When the six-bit code is absent from the hexagram table the name is
/// composed as `lower trigram name + upper trigram name + "卦"`, where *upper*
/// is code characters `0..3` and *lower* is characters `3..6`. A trigram code
/// missing from its table contributes an empty string.
///
/// Cloning is cheap; the tables are shared.
#[derive(Debug, Clone)]
pub struct Resolver {
    tables: Arc<Tables>,
}

impl Resolver {
    pub fn new(tables: Tables) -> Self {
        Self {
            tables: Arc::new(tables),
        }
    }

    pub fn from_shared(tables: Arc<Tables>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn resolve(&self, reading: &Reading) -> Resolution {
        let code = reading.code();
        Resolution {
            name: self.name_for(&code),
            code,
        }
    }

    /// Resolves a code directly, for callers that already hold one.
    pub fn name_for(&self, code: &HexagramCode) -> String {
        if let Some(entry) = self.tables.hexagram(code) {
            return entry.name.clone();
        }

        let upper = self.trigram_name(&code.upper());
        let lower = self.trigram_name(&code.lower());
        format!("{lower}{upper}{FALLBACK_SUFFIX}")
    }

    fn trigram_name(&self, code: &TrigramCode) -> &str {
        self.tables
            .trigram(code)
            .map(|entry| entry.name.as_str())
            .unwrap_or_default()
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(Tables::builtin())
    }
}
