//! Importer registry - selects a statement importer by bank identifier

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::adapters::{builtin_grammars, GrammarImporter};
use crate::domain::result::{ParseError, Result};
use crate::domain::BankGrammar;
use crate::ports::StatementImporter;

#[derive(Clone, Default)]
pub struct ImporterRegistry {
    importers: BTreeMap<String, Arc<dyn StatementImporter>>,
}

impl ImporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in grammars plus user grammars; a user
    /// grammar with a built-in's id replaces it
    pub fn with_grammars(user_grammars: &[BankGrammar]) -> Result<Self> {
        let mut registry = Self::new();
        for grammar in builtin_grammars().into_iter().chain(user_grammars.iter().cloned()) {
            registry.register(Arc::new(GrammarImporter::new(grammar)?));
        }
        Ok(registry)
    }

    /// Register an importer, replacing any with the same bank id
    pub fn register(&mut self, importer: Arc<dyn StatementImporter>) {
        self.importers
            .insert(importer.bank_id().to_string(), importer);
    }

    pub fn get(&self, bank_id: &str) -> std::result::Result<Arc<dyn StatementImporter>, ParseError> {
        self.importers
            .get(bank_id)
            .cloned()
            .ok_or_else(|| ParseError::UnknownBank(bank_id.to_string()))
    }

    /// (bank id, display name) pairs in id order
    pub fn banks(&self) -> Vec<(String, String)> {
        self.importers
            .values()
            .map(|i| (i.bank_id().to_string(), i.display_name().to_string()))
            .collect()
    }
}
