//! Deployment regions.
//!
//! Every identifier carries a 2-bit region code; the mapping from region
//! names ("asia", "us-east", ...) to codes is fixed at startup and must be
//! identical across all deployments, since shard routing derives from it.

use std::collections::HashMap;

/// 2-bit region code embedded in every identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionCode(u8);

impl RegionCode {
    pub const MAX: u8 = 0b11;

    /// Returns `None` when the code does not fit the 2-bit field.
    pub fn new(code: u8) -> Option<Self> {
        (code <= Self::MAX).then_some(Self(code))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for RegionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Region name → code table.
#[derive(Debug, Clone)]
pub struct RegionTable {
    codes: HashMap<String, RegionCode>,
}

impl RegionTable {
    /// Builds the table from configured name → code pairs.
    ///
    /// Rejects codes outside the 2-bit range; the offending name is reported
    /// so misconfiguration is visible at startup rather than at write time.
    pub fn new(entries: &HashMap<String, u8>) -> Result<Self, String> {
        let mut codes = HashMap::with_capacity(entries.len());
        for (name, code) in entries {
            let code = RegionCode::new(*code)
                .ok_or_else(|| format!("region '{}' has out-of-range code {}", name, code))?;
            codes.insert(name.clone(), code);
        }
        Ok(Self { codes })
    }

    pub fn resolve(&self, name: &str) -> Option<RegionCode> {
        self.codes.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl Default for RegionTable {
    /// The three launch regions.
    fn default() -> Self {
        let mut codes = HashMap::new();
        codes.insert("asia".to_string(), RegionCode(0));
        codes.insert("us-east".to_string(), RegionCode(1));
        codes.insert("eu-central".to_string(), RegionCode(2));
        Self { codes }
    }
}
