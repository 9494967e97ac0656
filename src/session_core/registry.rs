//! Explicit stage registry
//!
//! Maps stage names to constructor closures, populated once at program
//! start. Stage discovery never introspects loaded code; everything runnable
//! is registered here by hand.

use super::error::StageError;
use super::stage::Stage;
use std::collections::HashMap;

type StageBuilder = Box<dyn Fn() -> Box<dyn Stage>>;

#[derive(Default)]
pub struct StageRegistry {
    builders: HashMap<String, StageBuilder>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        builder: impl Fn() -> Box<dyn Stage> + 'static,
    ) {
        self.builders.insert(name.into(), Box::new(builder));
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.builders.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build one stage by name; unknown names list what is registered.
    pub fn build(&self, name: &str) -> Result<Box<dyn Stage>, StageError> {
        match self.builders.get(name) {
            Some(builder) => Ok(builder()),
            None => Err(StageError::ContractViolation(format!(
                "unknown stage '{}' (registered: {})",
                name,
                self.names().join(", ")
            ))),
        }
    }

    /// Build an ordered chain of stages from a name list.
    pub fn build_chain(&self, names: &[String]) -> Result<Vec<Box<dyn Stage>>, StageError> {
        names.iter().map(|name| self.build(name)).collect()
    }
}
