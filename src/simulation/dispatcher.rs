//! Simulation dispatch

use super::classifier::{classify, ErrorKind, Verdict};
use super::fees::FeeEstimate;
use super::SimulationOutcome;
use crate::sdk::{RouteSimulation, SdkError};

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, warn};

/// Run a route simulation and fold every possible result into an outcome.
///
/// `Ok(Some(route))` becomes `CaRoute`, `Ok(None)` becomes `DirectOperation`
/// with `fallback_fees`, and failures are classified. A panic inside the
/// simulation is reported as `UNKNOWN`.
pub async fn dispatch<F, Fut>(
    simulate: F,
    operation: &str,
    fallback_fees: FeeEstimate,
) -> SimulationOutcome
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<RouteSimulation>, SdkError>>,
{
    let result = AssertUnwindSafe(async move { simulate().await })
        .catch_unwind()
        .await;

    let outcome = match result {
        Ok(Ok(Some(route))) => SimulationOutcome::CaRoute {
            fees: route.intent.fees.clone(),
            insufficient_balance: route.intent.is_available_balance_insufficient,
            raw: route,
        },
        Ok(Ok(None)) => SimulationOutcome::DirectOperation { fallback_fees },
        Ok(Err(err)) => match classify(&err) {
            Verdict::DirectOperation => SimulationOutcome::DirectOperation { fallback_fees },
            Verdict::Failure { kind, retryable } => {
                warn!("Simulation for {} failed ({}): {}", operation, kind.as_str(), err.message);
                SimulationOutcome::Error {
                    kind,
                    message: err.message,
                    retryable,
                }
            }
        },
        Err(_) => {
            error!("Simulation for {} panicked", operation);
            SimulationOutcome::error(ErrorKind::Unknown, "simulation panicked")
        }
    };

    debug!("Simulation for {} -> {}", operation, outcome.label());
    crate::metrics::record_simulation(operation, &outcome);
    outcome
}
