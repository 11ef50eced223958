/**
 * DISPATCHER - Pipeline d'admission et d'exécution d'une requête
 *
 * RÔLE :
 * Point d'entrée métier par requête : rate limiter, puis outil, puis historique.
 *
 * FONCTIONNEMENT :
 * - admit() : consulte le rate limiter (appelé par le middleware HTTP sur toutes les routes)
 * - execute() : valide la cible, lance l'outil avec son timeout, enregistre le résultat
 * - handle() : admit() + execute() pour un appel unique
 * - Les erreurs internes ne sortent jamais telles quelles (voir http.rs)
 */

use crate::config::ToolsConf;
use crate::execution::{CommandInvoker, CommandSpec, ExecutionError, ExecutionOutcome};
use crate::models::{ResultRecord, Tool, ToolResponse, UnknownTool};
use crate::rate_limit::{Admission, RateLimiter};
use crate::recorder::ResultRecorder;
use crate::store::StoreError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Longueur max d'un nom DNS complet
const MAX_TARGET_LEN: usize = 253;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("too many requests")]
    RateLimited,
    #[error("invalid hostname")]
    InvalidTarget,
    #[error(transparent)]
    UnknownTool(#[from] UnknownTool),
    #[error("{tool} timed out after {timeout:?}")]
    TimedOut { tool: Tool, timeout: Duration },
    #[error("{tool} could not run: {source}")]
    Execution {
        tool: Tool,
        #[source]
        source: ExecutionError,
    },
    #[error("{tool} result could not be stored: {source}")]
    Storage {
        tool: Tool,
        #[source]
        source: StoreError,
    },
    #[error("{tool} history unavailable: {source}")]
    History {
        tool: Tool,
        #[source]
        source: StoreError,
    },
}

pub struct Dispatcher {
    limiter: Arc<RateLimiter>,
    invoker: Arc<dyn CommandInvoker>,
    recorder: ResultRecorder,
    tools: ToolsConf,
}

impl Dispatcher {
    pub fn new(
        limiter: Arc<RateLimiter>,
        invoker: Arc<dyn CommandInvoker>,
        recorder: ResultRecorder,
        tools: ToolsConf,
    ) -> Self {
        Self { limiter, invoker, recorder, tools }
    }

    pub fn admit(&self, client_id: &str, now: Instant) -> Result<(), DispatchError> {
        match self.limiter.check(client_id, now) {
            Admission::Admit => Ok(()),
            Admission::Reject => Err(DispatchError::RateLimited),
        }
    }

    /// Traitement complet d'une requête outil pour `client_id`
    pub async fn handle(
        &self,
        client_id: &str,
        tool: &str,
        target: &str,
        now: Instant,
    ) -> Result<ToolResponse, DispatchError> {
        self.admit(client_id, now)?;
        let tool: Tool = tool.parse()?;
        self.execute(tool, target).await
    }

    pub async fn execute(&self, tool: Tool, target: &str) -> Result<ToolResponse, DispatchError> {
        validate_target(target)?;
        info!(tool = tool.label(), hostname = target, "received {} request", tool.activity());

        let spec = CommandSpec::for_tool(tool, target);
        let timeout = self.tools.timeout_for(tool);
        let outcome = self.invoker.run(&spec, timeout).await.map_err(|source| {
            error!(tool = tool.label(), hostname = target, "execution error: {source}");
            DispatchError::Execution { tool, source }
        })?;

        let response = match &outcome {
            ExecutionOutcome::Success(stdout) => ToolResponse::output(target, stdout.clone()),
            ExecutionOutcome::Failure { stderr, exit_code } => {
                warn!(tool = tool.label(), hostname = target, exit_code, "{} failed", tool.activity());
                ToolResponse::error(target, stderr.clone())
            }
            ExecutionOutcome::Timeout => {
                error!(tool = tool.label(), hostname = target, ?timeout, "{} timed out", tool.activity());
                return Err(DispatchError::TimedOut { tool, timeout });
            }
        };

        // écriture disque hors des workers async
        let recorder = self.recorder.clone();
        let hostname = target.to_string();
        tokio::task::spawn_blocking(move || recorder.save(tool, &hostname, &outcome))
            .await
            .unwrap_or_else(|e| Err(StoreError::Unavailable(e.to_string())))
            .map_err(|source| {
                error!(tool = tool.label(), hostname = target, "failed to store result: {source}");
                DispatchError::Storage { tool, source }
            })?;
        info!(tool = tool.label(), hostname = target, "{} finished, result saved", tool.activity());
        Ok(response)
    }

    pub async fn history(&self, tool: Tool) -> Result<Vec<ResultRecord>, DispatchError> {
        // le store peut être verrouillé par un ajout en cours
        let recorder = self.recorder.clone();
        tokio::task::spawn_blocking(move || recorder.history(tool))
            .await
            .unwrap_or_else(|e| Err(StoreError::Unavailable(e.to_string())))
            .map_err(|source| {
                error!(tool = tool.label(), "failed to read history: {source}");
                DispatchError::History { tool, source }
            })
    }
}

/// Refuse les cibles qui seraient lues comme une option par l'outil lui-même
fn validate_target(target: &str) -> Result<(), DispatchError> {
    if target.is_empty()
        || target.len() > MAX_TARGET_LEN
        || target.starts_with('-')
        || target.contains('\0')
    {
        return Err(DispatchError::InvalidTarget);
    }
    Ok(())
}
