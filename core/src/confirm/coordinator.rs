// Confirmation Coordinator
// Awaits exactly one correlated response, race-free against cancellation

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use warden_protocol::{ConfirmationMessage, ConfirmationOutcome};

use crate::confirm::bus::{ConfirmationBus, Subscription, Topic};

/// Errors from a confirmation wait.
#[derive(Debug, thiserror::Error)]
pub enum ConfirmError {
    #[error("confirmation wait cancelled")]
    Cancelled,
    /// Programming error: a correlation id was awaited twice. Logged
    /// loudly; never silently ignored.
    #[error("coordinator leak: {0}")]
    Leak(String),
}

/// Resolved confirmation: the effective outcome plus any modified
/// arguments the approver supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationReply {
    pub outcome: ConfirmationOutcome,
    pub payload: Option<serde_json::Value>,
}

/// Hands out single-use correlated waits on the response topic.
#[derive(Clone)]
pub struct ConfirmationCoordinator {
    bus: ConfirmationBus,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl ConfirmationCoordinator {
    pub fn new(bus: ConfirmationBus) -> Self {
        Self {
            bus,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Start a wait for `correlation_id`. Subscribes to the response topic
    /// *before* returning, so the caller can publish its request without
    /// racing the response.
    pub fn begin(
        &self,
        correlation_id: impl Into<String>,
    ) -> Result<PendingConfirmation, ConfirmError> {
        let correlation_id = correlation_id.into();
        {
            let mut in_flight = self.lock_in_flight();
            if !in_flight.insert(correlation_id.clone()) {
                error!(%correlation_id, "correlation id already has a wait in flight");
                debug_assert!(false, "duplicate confirmation wait for {correlation_id}");
                return Err(ConfirmError::Leak(format!(
                    "correlation id `{correlation_id}` already in flight"
                )));
            }
        }
        let subscription = self.bus.subscribe(Topic::Responses);
        Ok(PendingConfirmation {
            correlation_id,
            subscription,
            coordinator: self.clone(),
            cleaned: false,
        })
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock_in_flight().len()
    }

    fn finish(&self, correlation_id: &str) {
        self.lock_in_flight().remove(correlation_id);
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashSet<String>> {
        match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// A single confirmation wait. Resolves exactly once; cleanup (unsubscribe
/// plus in-flight removal) runs exactly once on every path, with drop as
/// the backstop.
pub struct PendingConfirmation {
    correlation_id: String,
    subscription: Subscription,
    coordinator: ConfirmationCoordinator,
    cleaned: bool,
}

impl PendingConfirmation {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Wait until the matching response arrives or `cancel` fires,
    /// whichever happens first. Responses for other correlation ids are
    /// ignored; once resolved, the subscription is gone, so a late or
    /// duplicate response for this id is a no-op.
    ///
    /// There is no timeout of its own: bounded waiting comes from the
    /// caller's cancellation token.
    pub async fn wait(
        mut self,
        cancel: &CancellationToken,
    ) -> Result<ConfirmationReply, ConfirmError> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(correlation_id = %self.correlation_id, "confirmation wait cancelled");
                    self.cleanup();
                    return Err(ConfirmError::Cancelled);
                }
                message = self.subscription.recv() => match message {
                    Some(ConfirmationMessage::Response(response))
                        if response.correlation_id == self.correlation_id =>
                    {
                        let reply = ConfirmationReply {
                            outcome: response.resolved_outcome(),
                            payload: response.payload,
                        };
                        debug!(
                            correlation_id = %self.correlation_id,
                            outcome = ?reply.outcome,
                            "confirmation resolved"
                        );
                        self.cleanup();
                        return Ok(reply);
                    }
                    Some(_) => continue,
                    None => {
                        warn!(
                            correlation_id = %self.correlation_id,
                            "confirmation channel closed before a response arrived"
                        );
                        self.cleanup();
                        return Err(ConfirmError::Cancelled);
                    }
                }
            }
        }
    }

    fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        self.subscription.unsubscribe();
        self.coordinator.finish(&self.correlation_id);
    }
}

impl Drop for PendingConfirmation {
    fn drop(&mut self) {
        self.cleanup();
    }
}
