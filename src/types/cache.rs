//! A memo of parsed type signatures, shared by readers that decode many blocks
//! with the same header.

use std::sync::{Arc, RwLock};

use hashbrown::HashMap;

use super::descriptor::TypeDescriptor;
use super::parser::parse_type;
use crate::error::ParseError;

/// Parse results keyed by the exact signature text.
///
/// The cache is explicit state owned by whoever creates it; nothing in the
/// crate keeps a global instance. Failed parses are not cached.
#[derive(Debug, Default)]
pub struct TypeCache {
    entries: RwLock<HashMap<String, Arc<TypeDescriptor>>>,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_parse(&self, signature: &str) -> Result<Arc<TypeDescriptor>, ParseError> {
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(found) = entries.get(signature) {
                return Ok(Arc::clone(found));
            }
        }
        let parsed = Arc::new(parse_type(signature)?);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .entry(signature.to_string())
            .or_insert_with(|| Arc::clone(&parsed));
        Ok(Arc::clone(entry))
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
