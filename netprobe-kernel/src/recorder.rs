use crate::execution::ExecutionOutcome;
use crate::models::{ResultRecord, Tool};
use crate::store::{ResultStore, StoreError};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::debug;

/// Projette les résultats d'exécution en lignes d'historique
#[derive(Clone)]
pub struct ResultRecorder {
    store: Arc<dyn ResultStore>,
}

impl ResultRecorder {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self { store }
    }

    /// Enregistre un succès (output) ou un échec (error).
    /// Un timeout n'est jamais persisté.
    pub fn save(&self, tool: Tool, hostname: &str, outcome: &ExecutionOutcome) -> Result<(), StoreError> {
        let (output, error) = match outcome {
            ExecutionOutcome::Success(stdout) => (Some(stdout.clone()), None),
            ExecutionOutcome::Failure { stderr, .. } => (None, Some(stderr.clone())),
            ExecutionOutcome::Timeout => {
                debug!(tool = tool.label(), hostname, "timeout outcome, nothing recorded");
                return Ok(());
            }
        };

        let record = ResultRecord {
            id: 0,
            hostname: hostname.to_string(),
            output,
            error,
            timestamp: OffsetDateTime::now_utc(),
        };
        let id = self.store.append(tool, record)?;
        debug!(tool = tool.label(), hostname, id, "result recorded");
        Ok(())
    }

    pub fn history(&self, tool: Tool) -> Result<Vec<ResultRecord>, StoreError> {
        self.store.list_all(tool)
    }
}
