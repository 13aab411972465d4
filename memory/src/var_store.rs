use log::warn;

use crate::MemoryError;

/// Bounded key/value store behind `set`, `print` and `echo $VAR`.
#[derive(Debug, Clone)]
pub struct VarStore<const VAR_MEM_SIZE: usize> {
    entries: Vec<Option<(String, String)>>,
}

impl<const VAR_MEM_SIZE: usize> VarStore<VAR_MEM_SIZE> {
    pub fn init() -> Self {
        Self {
            entries: vec![None; VAR_MEM_SIZE],
        }
    }

    /// Overwrites `key` if present, otherwise takes the first free entry.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), MemoryError> {
        if let Some((_, v)) = self
            .entries
            .iter_mut()
            .flatten()
            .find(|(k, _)| k == key)
        {
            *v = value.to_string();
            return Ok(());
        }
        match self.entries.iter_mut().find(|entry| entry.is_none()) {
            Some(entry) => {
                *entry = Some((key.to_string(), value.to_string()));
                Ok(())
            }
            None => {
                warn!("Variable store full, dropping {}", key);
                Err(MemoryError::VarStoreFull)
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .flatten()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
