use std::collections::HashMap;

use crate::error::AsmError;

/// Label name to value, in position units. Names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    map: HashMap<String, u64>,
}

impl LabelTable {
    pub fn define(&mut self, name: &str, val: u64, line: usize) -> Result<(), AsmError> {
        if self.map.contains_key(name) {
            return Err(AsmError::LabelRedeclared { name: name.to_string(), line });
        }
        self.map.insert(name.to_string(), val);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.map.get(name).copied()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Entries ordered by value, then name.
    pub fn entries(&self) -> Vec<(&str, u64)> {
        let mut v: Vec<(&str, u64)> = self.map.iter().map(|(k, &v)| (k.as_str(), v)).collect();
        v.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        v
    }
}
