//! crdready establish – wait for submitted CustomResourceDefinitions to
//! become usable.
//!
//! Each definition is polled until `Established=True` (success),
//! `NamesAccepted=False` (permanent naming conflict), or the attempt budget
//! in [`PollConfig`] runs out. Batches poll every definition independently
//! and report all failures together, ordered by name.

#![forbid(unsafe_code)]

use std::time::Instant;

use crdready_core::{ConditionType, ResourceDefinition};
use crdready_kubehub::{DefinitionStore, StoreError};
use futures::future::join_all;
use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod config;
mod error;

pub use config::{PollConfig, ENV_BACKOFF_FACTOR, ENV_INTERVAL_MS, ENV_MAX_ATTEMPTS};
pub use error::{AggregateError, EstablishError};

/// Terminal state of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Established,
    PermanentlyRejected { reason: String },
    TimedOut,
}

/// Terminal state implied by a single snapshot, if any.
///
/// Only `Established=True` and `NamesAccepted=False` are terminal; every
/// other combination means "not yet".
pub fn observe(def: &ResourceDefinition) -> Option<PollOutcome> {
    if def.is_condition_true(ConditionType::Established) {
        return Some(PollOutcome::Established);
    }
    if def.is_condition_false(ConditionType::NamesAccepted) {
        let reason = def.condition(ConditionType::NamesAccepted).map(|c| c.reason.clone()).unwrap_or_default();
        return Some(PollOutcome::PermanentlyRejected { reason });
    }
    None
}

/// Polls definitions through a [`DefinitionStore`] with exponential backoff.
#[derive(Debug, Clone, Default)]
pub struct Establisher {
    config: PollConfig,
    cancel: Option<CancellationToken>,
}

impl Establisher {
    pub fn new(config: PollConfig) -> Self {
        Self { config, cancel: None }
    }

    /// Abort pending waits when `token` fires; they fail with [`EstablishError::Cancelled`].
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Sleep for `delay`; `false` when cancelled first.
    async fn pause(&self, delay: std::time::Duration) -> bool {
        match &self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => false,
                _ = tokio::time::sleep(delay) => true,
            },
            None => {
                tokio::time::sleep(delay).await;
                true
            }
        }
    }

    /// Fetch `name`; `None` when cancelled before the store answers.
    async fn fetch<S>(&self, store: &S, name: &str) -> Option<Result<ResourceDefinition, StoreError>>
    where
        S: DefinitionStore + ?Sized,
    {
        match &self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => None,
                res = store.get(name) => Some(res),
            },
            None => Some(store.get(name).await),
        }
    }

    /// Poll `name` until a terminal outcome or budget exhaustion.
    ///
    /// A missing object counts as "not yet". Other store failures and
    /// cancellation end the poll with an error.
    pub async fn poll<S>(&self, store: &S, name: &str) -> Result<PollOutcome, EstablishError>
    where
        S: DefinitionStore + ?Sized,
    {
        let attempts = self.config.attempts();
        let mut delays = self.config.backoff();
        for attempt in 1..=attempts {
            if self.cancelled() {
                return Err(EstablishError::Cancelled { name: name.to_string() });
            }
            counter!("establish_attempts_total", 1u64);
            let Some(fetched) = self.fetch(store, name).await else {
                return Err(EstablishError::Cancelled { name: name.to_string() });
            };
            match fetched {
                Ok(snapshot) => {
                    if let Some(outcome) = observe(&snapshot) {
                        return Ok(outcome);
                    }
                }
                Err(e) if e.is_not_found() => debug!(crd = %name, attempt, "not visible yet"),
                Err(e) => return Err(EstablishError::Fetch { name: name.to_string(), source: e }),
            }
            let Some(delay) = delays.next() else { break };
            debug!(crd = %name, attempt, of = attempts, delay_ms = delay.as_millis() as u64, "not established yet; backing off");
            if !self.pause(delay).await {
                return Err(EstablishError::Cancelled { name: name.to_string() });
            }
        }
        Ok(PollOutcome::TimedOut)
    }

    /// Wait for one definition to become established.
    pub async fn ensure_established<S>(&self, store: &S, def: &ResourceDefinition) -> Result<(), EstablishError>
    where
        S: DefinitionStore + ?Sized,
    {
        let started = Instant::now();
        let name = def.name.as_str();
        let res = match self.poll(store, name).await {
            Ok(PollOutcome::Established) => Ok(()),
            Ok(PollOutcome::PermanentlyRejected { reason }) => Err(EstablishError::Conflict { name: name.to_string(), reason }),
            Ok(PollOutcome::TimedOut) => Err(EstablishError::Timeout { name: name.to_string() }),
            Err(e) => Err(e),
        };
        histogram!("establish_wait_ms", started.elapsed().as_secs_f64() * 1000.0);
        match &res {
            Ok(()) => {
                counter!("establish_outcomes_total", 1u64, "outcome" => "established");
                info!(crd = %name, "established");
            }
            Err(e) => {
                counter!("establish_outcomes_total", 1u64, "outcome" => e.outcome());
                warn!(crd = %name, error = %e, "not established");
            }
        }
        res
    }

    /// Wait for every definition concurrently. All failures are collected,
    /// none short-circuits the others.
    pub async fn ensure_established_all<S>(&self, store: &S, defs: &[ResourceDefinition]) -> Result<(), AggregateError>
    where
        S: DefinitionStore + ?Sized,
    {
        let results = join_all(defs.iter().map(|d| self.ensure_established(store, d))).await;
        let errors: Vec<EstablishError> = results.into_iter().filter_map(Result::err).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AggregateError::new(errors))
        }
    }
}

/// [`Establisher::ensure_established`] with the environment-derived budget.
pub async fn ensure_established<S>(store: &S, def: &ResourceDefinition) -> Result<(), EstablishError>
where
    S: DefinitionStore + ?Sized,
{
    Establisher::new(PollConfig::from_env()).ensure_established(store, def).await
}

/// [`Establisher::ensure_established_all`] with the environment-derived budget.
pub async fn ensure_established_all<S>(store: &S, defs: &[ResourceDefinition]) -> Result<(), AggregateError>
where
    S: DefinitionStore + ?Sized,
{
    Establisher::new(PollConfig::from_env()).ensure_established_all(store, defs).await
}
