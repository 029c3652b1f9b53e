//! Periodic pull of resolutions made directly in the remote ticketing system.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::resolution::ResolutionLoop;
use crate::error::DeskError;
use crate::escalation::ticketing::{REMOTE_CLOSED, RemoteTicket, Ticketing};
use crate::store::SupportStore;
use crate::types::{ResolutionEvent, Ticket, TicketStatus};

const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Follow-ups this short are acknowledgements, not solutions.
const MIN_FOLLOWUP_CHARS: usize = 10;

/// Technician recorded when the remote system does not say who solved it.
const REMOTE_TECHNICIAN: &str = "helpdesk";

/// Last follow-up longer than `MIN_FOLLOWUP_CHARS`, else the remote solution.
pub fn pick_solution(followups: &[String], remote: &RemoteTicket) -> Option<String> {
    followups
        .iter()
        .rev()
        .map(|f| f.trim())
        .find(|f| f.chars().count() > MIN_FOLLOWUP_CHARS)
        .map(str::to_owned)
        .or_else(|| remote.solution.clone().filter(|s| !s.trim().is_empty()))
}

pub fn spawn(
    store: Arc<dyn SupportStore>,
    ticketing: Arc<dyn Ticketing>,
    resolution: Arc<ResolutionLoop>,
    interval_secs: u64,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(interval_secs.max(1));
        let mut consecutive_failures: u32 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("resolution sync task shutting down");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }

            match run_cycle(store.as_ref(), ticketing.as_ref(), &resolution).await {
                Ok(count) => {
                    consecutive_failures = 0;
                    if count > 0 {
                        tracing::info!(resolved = count, "resolution sync cycle complete");
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    tracing::warn!(error = %e, consecutive_failures, "resolution sync cycle failed");
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        tracing::error!(
                            "resolution sync: {} consecutive failures, ticketing may be down",
                            MAX_CONSECUTIVE_FAILURES
                        );
                        consecutive_failures = 0;
                    }
                }
            }
        }
    })
}

/// Check every open mirrored ticket once. Returns how many were resolved.
///
/// A failure on one ticket is logged and does not stop the others; only a
/// store failure aborts the cycle.
pub async fn run_cycle(
    store: &dyn SupportStore,
    ticketing: &dyn Ticketing,
    resolution: &ResolutionLoop,
) -> Result<usize, DeskError> {
    let mut resolved = 0;
    for ticket in store.open_mirrored_tickets().await? {
        match sync_ticket(&ticket, ticketing, resolution).await {
            Ok(true) => resolved += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!(ticket = %ticket.id, error = %e, "could not sync remote resolution"),
        }
    }
    Ok(resolved)
}

async fn sync_ticket(
    ticket: &Ticket,
    ticketing: &dyn Ticketing,
    resolution: &ResolutionLoop,
) -> Result<bool, DeskError> {
    let Some(external_id) = ticket.external_id.as_deref() else {
        return Ok(false);
    };
    let remote = match ticketing.fetch_remote_ticket(external_id).await {
        Ok(remote) => remote,
        Err(e) => {
            tracing::warn!(ticket = %ticket.id, external_id, error = %e, "remote ticket fetch failed");
            return Ok(false);
        }
    };
    if !remote.is_finished() {
        return Ok(false);
    }

    let followups = ticketing.list_followups(external_id).await.unwrap_or_else(|e| {
        tracing::warn!(ticket = %ticket.id, error = %e, "could not list follow-ups");
        Vec::new()
    });
    let Some(solution) = pick_solution(&followups, &remote) else {
        tracing::debug!(ticket = %ticket.id, "remote ticket finished without a solution text");
        return Ok(false);
    };

    let status = if remote.status == REMOTE_CLOSED { TicketStatus::Closed } else { TicketStatus::Resolved };
    let event = ResolutionEvent {
        ticket_id: ticket.id,
        technician_name: REMOTE_TECHNICIAN.to_owned(),
        technician_email: None,
        solution_text: solution,
        status,
    };
    resolution.record_resolution(event).await?;
    Ok(true)
}
