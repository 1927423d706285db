//! The acknowledgment ledger: track, confirm, list, and sweep.

use super::notify::{AgentDirectory, CommandNotifier, LogNotifier, Notifier, StaticDirectory};
use super::types::{PendingAck, RetryPolicy, SweepReport};
use crate::config::Config;
use crate::context::ProjectContext;
use crate::error::{LatchError, Result};
use crate::events::{Event, EventAction, EventLog};
use crate::identity;
use crate::store::{Change, Commit, Snapshot, VersionedFile};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Pending acknowledgments of one project, backed by a versioned file.
///
/// Every mutation goes through the optimistic read-decide-commit protocol of
/// [`VersionedFile`], so concurrent `track`, `confirm`, and `sweep` calls from
/// any number of processes never silently overwrite each other.
pub struct AckLedger {
    store: VersionedFile<PendingAck>,
    policy: RetryPolicy,
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn AgentDirectory>,
    events: Option<EventLog>,
}

impl AckLedger {
    pub fn new(
        store: VersionedFile<PendingAck>,
        policy: RetryPolicy,
        notifier: Arc<dyn Notifier>,
        directory: Arc<dyn AgentDirectory>,
    ) -> Self {
        Self {
            store,
            policy,
            notifier,
            directory,
            events: None,
        }
    }

    /// Ledger for `ctx` wired up from `config`: `notify_command` (or logging
    /// when unset) for delivery, the `agents` list for discovery.
    pub fn open(ctx: &ProjectContext, config: &Config) -> Result<Self> {
        let notifier: Arc<dyn Notifier> = match &config.notify_command {
            Some(template) => Arc::new(CommandNotifier::parse(template)?),
            None => Arc::new(LogNotifier),
        };
        let directory = Arc::new(StaticDirectory::new(config.agents.clone()));
        let store = VersionedFile::new(ctx.ledger_path(), config.write_retry());

        Ok(
            Self::new(store, config.ack_retry_policy(), notifier, directory)
                .with_events(EventLog::new(ctx.events_file())),
        )
    }

    /// Record state changes to `events`.
    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Register a message that `recipient` must confirm. Returns its id.
    ///
    /// The initial send is the caller's business; the ledger only resends.
    pub fn track(&self, sender: &str, recipient: &str, payload: Value) -> Result<String> {
        identity::validate("sender", sender)?;
        identity::validate("recipient", recipient)?;

        let entry = PendingAck::new(sender, recipient, payload, &self.policy, Utc::now());
        let message_id = entry.message_id.clone();

        self.store.update(|items| {
            items.push(entry.clone());
            Change::Modified(())
        })?;

        debug!(message_id = %message_id, sender, recipient, "tracking acknowledgment");
        self.record_event(
            Event::new(EventAction::AckTrack)
                .by(sender)
                .with_subject(message_id.as_str())
                .with_details(json!({ "recipient": recipient })),
        );
        Ok(message_id)
    }

    /// Remove `message_id` from the ledger. Returns whether it was pending;
    /// confirming twice is not an error.
    pub fn confirm(&self, message_id: &str) -> Result<bool> {
        let removed = self.store.update(|items| {
            match items.iter().position(|entry| entry.message_id == message_id) {
                Some(index) => Change::Modified(Some(items.remove(index))),
                None => Change::Unchanged(None),
            }
        })?;

        match removed {
            Some(entry) => {
                debug!(message_id, recipient = %entry.recipient, "acknowledged");
                self.record_event(
                    Event::new(EventAction::AckConfirm)
                        .by(entry.recipient.as_str())
                        .with_subject(message_id)
                        .with_details(json!({
                            "sender": entry.sender,
                            "retry_count": entry.retry_count,
                        })),
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Entries still awaiting confirmation, optionally only those addressed
    /// to `recipient`, oldest first.
    pub fn pending(&self, recipient: Option<&str>) -> Result<Vec<PendingAck>> {
        if let Some(recipient) = recipient {
            identity::validate("recipient", recipient)?;
        }

        let mut items: Vec<PendingAck> = self
            .store
            .load()?
            .items
            .into_iter()
            .filter(|entry| recipient.is_none_or(|r| r == entry.recipient))
            .collect();
        items.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));
        Ok(items)
    }

    /// Resend or escalate every overdue entry as of now.
    pub fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now())
    }

    /// Resend or escalate every entry due at `now`.
    ///
    /// Deliveries happen between the read and the conditional commit, with
    /// no lock held. If another writer commits in the meantime this attempt
    /// is thrown away and the sweep starts over from a fresh read, so a
    /// resend may repeat but a concurrently tracked or confirmed entry is
    /// never lost or resurrected.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let retry = self.store.retry();

        for attempt in 0..retry.attempts {
            let Snapshot { version, items } = self.store.load()?;
            let mut report = SweepReport {
                attempts: attempt + 1,
                ..SweepReport::default()
            };
            let mut kept = Vec::with_capacity(items.len());

            for mut entry in items {
                if !entry.is_due(now) {
                    kept.push(entry);
                    continue;
                }
                report.processed += 1;

                if entry.retry_count < self.policy.max_retries {
                    entry.retry_count += 1;
                    self.resend(&entry);
                    entry.next_retry_at = self.policy.next_retry_at(now, entry.retry_count);
                    report.resent += 1;
                    kept.push(entry);
                } else {
                    self.escalate(&entry);
                    report.escalated += 1;
                }
            }

            if report.processed == 0 {
                return Ok(report);
            }

            match self.store.commit(version, &kept)? {
                Commit::Applied { .. } => {
                    if report.escalated > 0 || report.resent > 0 {
                        info!(
                            resent = report.resent,
                            escalated = report.escalated,
                            attempts = report.attempts,
                            "sweep committed"
                        );
                    }
                    return Ok(report);
                }
                Commit::VersionMismatch { expected, found } => {
                    debug!(attempt, expected, found, "ledger changed during sweep, starting over");
                    if attempt + 1 < retry.attempts {
                        thread::sleep(retry.delay(attempt));
                    }
                }
            }
        }

        warn!(
            path = %self.store.path().display(),
            attempts = retry.attempts,
            "sweep gave up; ledger left unchanged for the next cycle"
        );
        Err(LatchError::Contention(format!(
            "sweep of '{}' lost to concurrent writers {} times",
            self.store.path().display(),
            retry.attempts
        )))
    }

    fn resend(&self, entry: &PendingAck) {
        let text = format!(
            "[ack {}] from {} (resend {}/{}): {}",
            entry.message_id,
            entry.sender,
            entry.retry_count,
            self.policy.max_retries,
            entry.payload_text()
        );
        let delivered = self.deliver(&entry.recipient, &text);

        self.record_event(
            Event::new(EventAction::AckResend)
                .by(entry.sender.as_str())
                .with_subject(entry.message_id.as_str())
                .with_details(json!({
                    "recipient": entry.recipient,
                    "retry_count": entry.retry_count,
                    "delivered": delivered,
                })),
        );
    }

    /// Broadcast to every live agent except the unresponsive recipient.
    fn escalate(&self, entry: &PendingAck) {
        let text = format!(
            "[escalation] {} did not acknowledge {} from {} after {} resends: {}",
            entry.recipient,
            entry.message_id,
            entry.sender,
            entry.retry_count,
            entry.payload_text()
        );

        let agents = match self.directory.live_agents() {
            Ok(agents) => agents,
            Err(e) => {
                warn!(
                    message_id = %entry.message_id,
                    error = %e,
                    "agent discovery failed during escalation"
                );
                Vec::new()
            }
        };

        let mut notified = Vec::new();
        for agent in agents.iter().filter(|a| **a != entry.recipient) {
            if self.deliver(agent, &text) {
                notified.push(agent.clone());
            }
        }

        info!(
            message_id = %entry.message_id,
            recipient = %entry.recipient,
            notified = notified.len(),
            "escalated unacknowledged message"
        );
        self.record_event(
            Event::new(EventAction::AckEscalate)
                .by(entry.sender.as_str())
                .with_subject(entry.message_id.as_str())
                .with_details(json!({
                    "recipient": entry.recipient,
                    "retry_count": entry.retry_count,
                    "notified": notified,
                })),
        );
    }

    /// Failures are logged and reported as not delivered.
    fn deliver(&self, recipient: &str, text: &str) -> bool {
        match self.notifier.deliver(recipient, text) {
            Ok(true) => true,
            Ok(false) => {
                warn!(recipient, "delivery not confirmed by transport");
                false
            }
            Err(e) => {
                warn!(recipient, error = %e, "delivery failed");
                false
            }
        }
    }

    fn record_event(&self, event: Event) {
        if let Some(events) = &self.events {
            events.record(event);
        }
    }
}
