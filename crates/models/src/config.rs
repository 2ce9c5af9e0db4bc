use serde::Deserialize;

use crate::store;

/// Configuration of the models layer.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    /// Document store holding articles and logins. Defaults to an in-memory
    /// store, which forgets everything when the process exits.
    #[serde(default)]
    pub store: store::Config,
}

impl Config {
    /// Connect to the configured store and wrap it in a workflow engine.
    pub fn workflow(&self) -> Result<crate::Workflow, store::StoreError> {
        store::connect(&self.store).map(crate::Workflow::new)
    }
}
