// src/services/campaign_service.rs
// DOCUMENTATION: Email campaigns: editing, recipients, throttled sending, tracking
// PURPOSE: Draft -> (scheduled) -> sending -> sent|failed, cancellable before the end

use crate::config::Config;
use crate::db::{CampaignRepository, ComplianceRepository, PersonRepository};
use crate::errors::CrmError;
use crate::models::*;
use crate::services::email_client::{EmailMessage, EmailSender};
use crate::services::template::{self, MessageContext, TrackingLinks};
use crate::services::EventPublisher;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use serde_json::json;
use sqlx::PgPool;
use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

/// Messages sent between two cancellation checks
const CANCEL_CHECK_EVERY: usize = 25;

/// Actor recorded for actions taken through public tracking links
pub const TRACKING_ACTOR: &str = "tracking-link";

pub struct CampaignService;

impl CampaignService {
    pub async fn create(
        pool: &PgPool,
        actor: &str,
        req: CreateCampaignRequest,
    ) -> Result<Campaign, CrmError> {
        req.validate()?;
        CampaignRepository::create(pool, &req, actor).await
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Campaign, CrmError> {
        CampaignRepository::get_by_id(pool, id).await
    }

    pub async fn search(pool: &PgPool, query: CampaignQuery) -> Result<Paginated<Campaign>, CrmError> {
        let (campaigns, total) = CampaignRepository::search(pool, &query).await?;
        Ok(Paginated::new(campaigns, total, query.page_params()))
    }

    /// Content changes are only accepted on drafts
    pub async fn update(pool: &PgPool, id: Uuid, req: UpdateCampaignRequest) -> Result<Campaign, CrmError> {
        req.validate()?;
        let campaign = CampaignRepository::get_by_id(pool, id).await?;
        if campaign.status != CampaignStatus::Draft {
            return Err(CrmError::Conflict(format!(
                "campaign {} is {}, only drafts can be edited",
                id, campaign.status
            )));
        }

        CampaignRepository::update(pool, id, &req)
            .await?
            .ok_or_else(|| CrmError::Conflict(format!("campaign {} changed concurrently", id)))
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), CrmError> {
        let campaign = CampaignRepository::get_by_id(pool, id).await?;
        if !matches!(campaign.status, CampaignStatus::Draft | CampaignStatus::Cancelled) {
            return Err(CrmError::Conflict(format!(
                "campaign {} is {}, only draft or cancelled campaigns can be deleted",
                id, campaign.status
            )));
        }

        if CampaignRepository::delete(pool, id).await? == 0 {
            return Err(CrmError::Conflict(format!("campaign {} changed concurrently", id)));
        }
        log::info!("Deleted campaign {}", id);
        Ok(())
    }

    /// Add contactable people matched by the selectors, one row per email
    pub async fn add_recipients(
        pool: &PgPool,
        id: Uuid,
        req: AddRecipientsRequest,
    ) -> Result<AddRecipientsResponse, CrmError> {
        if req.is_empty() {
            return Err(CrmError::InvalidInput(
                "give person_ids, organisation_ids or a category".to_string(),
            ));
        }

        let campaign = CampaignRepository::get_by_id(pool, id).await?;
        if !campaign.status.is_editable() {
            return Err(CrmError::Conflict(format!(
                "campaign {} is {}, recipients can no longer change",
                id, campaign.status
            )));
        }

        let candidates = CampaignRepository::recipient_candidates(pool, &req).await?;
        let existing: HashSet<String> = CampaignRepository::existing_emails(pool, id)
            .await?
            .into_iter()
            .collect();

        let (rows, mut response) = select_recipients(&candidates, &existing);
        let inserted = CampaignRepository::insert_recipients(pool, id, &rows).await?;

        // Rows lost to a concurrent insert of the same email
        response.already_present += rows.len() as u64 - inserted;
        response.added = inserted;

        log::info!(
            "Campaign {}: {} recipient(s) added, {} excluded, {} already present",
            id,
            response.added,
            response.excluded,
            response.already_present
        );
        Ok(response)
    }

    pub async fn recipients(
        pool: &PgPool,
        id: Uuid,
        query: RecipientQuery,
    ) -> Result<Paginated<CampaignRecipient>, CrmError> {
        CampaignRepository::get_by_id(pool, id).await?;
        let (recipients, total) = CampaignRepository::recipients(pool, id, &query).await?;
        Ok(Paginated::new(recipients, total, query.page_params()))
    }

    pub async fn schedule(pool: &PgPool, id: Uuid, req: ScheduleCampaignRequest) -> Result<Campaign, CrmError> {
        ensure_future(req.scheduled_at, Utc::now())?;
        let campaign = CampaignRepository::get_by_id(pool, id).await?;
        Self::ensure_has_recipients(pool, id).await?;

        let scheduled = CampaignRepository::transition(
            pool,
            id,
            &[CampaignStatus::Draft, CampaignStatus::Scheduled],
            CampaignStatus::Scheduled,
            Some(req.scheduled_at),
        )
        .await?
        .ok_or_else(|| invalid_transition(campaign.status, CampaignStatus::Scheduled))?;

        log::info!("Campaign {} scheduled for {}", id, req.scheduled_at);
        Ok(scheduled)
    }

    /// Stop a campaign; a running send stops at its next cancellation check
    pub async fn cancel(pool: &PgPool, id: Uuid) -> Result<Campaign, CrmError> {
        let campaign = CampaignRepository::get_by_id(pool, id).await?;
        let cancelled = CampaignRepository::transition(
            pool,
            id,
            &[CampaignStatus::Draft, CampaignStatus::Scheduled, CampaignStatus::Sending],
            CampaignStatus::Cancelled,
            None,
        )
        .await?
        .ok_or_else(|| invalid_transition(campaign.status, CampaignStatus::Cancelled))?;

        log::info!("Campaign {} cancelled (was {})", id, campaign.status);
        Ok(cancelled)
    }

    pub async fn stats(pool: &PgPool, id: Uuid) -> Result<CampaignStats, CrmError> {
        let campaign = CampaignRepository::get_by_id(pool, id).await?;
        let counters = CampaignRepository::counters(pool, id).await?;
        Ok(CampaignStats::from_counters(id, campaign.status, counters))
    }

    /// Open pixel hit; true when this was the first open
    pub async fn track_open(pool: &PgPool, recipient_id: Uuid) -> Result<bool, CrmError> {
        CampaignRepository::record_open(pool, recipient_id).await
    }

    /// Click hit; returns the URL to redirect to
    pub async fn track_click(pool: &PgPool, recipient_id: Uuid, url: &str) -> Result<String, CrmError> {
        if !template::is_trackable(url) {
            return Err(CrmError::InvalidInput("only http(s) URLs can be followed".to_string()));
        }

        let recipient = CampaignRepository::get_recipient(pool, recipient_id).await?;
        let campaign = CampaignRepository::get_by_id(pool, recipient.campaign_id).await?;
        if !template::is_campaign_link(&campaign.body_template, url) {
            log::warn!("Refused click redirect for recipient {} to {}", recipient_id, url);
            return Err(CrmError::InvalidInput("url is not a link of this campaign".to_string()));
        }

        if CampaignRepository::record_click(pool, recipient_id).await? {
            log::debug!("First click for recipient {}", recipient_id);
        }
        Ok(url.to_string())
    }

    /// Unsubscribe link: opt the person out and keep the consent trail
    pub async fn unsubscribe(
        pool: &PgPool,
        publisher: &EventPublisher,
        recipient_id: Uuid,
        ip: Option<String>,
    ) -> Result<CampaignRecipient, CrmError> {
        let recipient = CampaignRepository::get_recipient(pool, recipient_id).await?;
        let first = CampaignRepository::record_unsubscribe(pool, recipient_id).await?;

        if let Some(person_id) = recipient.person_id {
            let person = PersonRepository::get_any(pool, person_id).await?;
            if !person.email_opt_out && !person.is_anonymized {
                PersonRepository::set_email_opt_out(pool, person_id, true).await?;

                let entry = NewComplianceLog::person(TRACKING_ACTOR, ComplianceAction::ConsentWithdrawn, person_id)
                    .with_details(json!({
                        "channel": "email",
                        "campaign_id": recipient.campaign_id,
                        "recipient_id": recipient_id,
                    }))
                    .with_ip(ip);
                ComplianceRepository::insert(pool, &entry).await?;

                publisher.emit(
                    "person.updated",
                    &json!({ "id": person_id, "email_opt_out": true, "source": "unsubscribe" }),
                );
            }
        }

        if first {
            log::info!("Recipient {} unsubscribed from campaign {}", recipient_id, recipient.campaign_id);
        }
        CampaignRepository::get_recipient(pool, recipient_id).await
    }

    async fn ensure_has_recipients(pool: &PgPool, id: Uuid) -> Result<(), CrmError> {
        let counters = CampaignRepository::counters(pool, id).await?;
        if counters.pending == 0 {
            return Err(CrmError::InvalidInput(format!("campaign {} has no pending recipients", id)));
        }
        Ok(())
    }
}

/// Split candidates into rows to insert and the response counters
/// DOCUMENTATION: emails compare case-insensitively against the campaign and the batch
fn select_recipients(
    candidates: &[RecipientCandidate],
    existing: &HashSet<String>,
) -> (Vec<(Uuid, String)>, AddRecipientsResponse) {
    let mut response = AddRecipientsResponse::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut rows = Vec::new();

    for candidate in candidates {
        if !candidate.is_contactable() {
            response.excluded += 1;
            continue;
        }

        let email = candidate.email.as_deref().unwrap_or_default().trim().to_lowercase();
        if existing.contains(&email) {
            response.already_present += 1;
        } else if !seen.insert(email.clone()) {
            response.excluded += 1;
        } else {
            rows.push((candidate.person_id, email));
        }
    }

    (rows, response)
}

fn ensure_future(at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), CrmError> {
    if at <= now {
        return Err(CrmError::InvalidInput(format!("scheduled_at ({}) must be in the future", at)));
    }
    Ok(())
}

fn invalid_transition(from: CampaignStatus, to: CampaignStatus) -> CrmError {
    CrmError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

/// A run only fails when nothing went out and something was attempted
fn final_status(sent: u64, failed: u64) -> CampaignStatus {
    if sent == 0 && failed > 0 {
        CampaignStatus::Failed
    } else {
        CampaignStatus::Sent
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct RunTotals {
    sent: u64,
    failed: u64,
    skipped: u64,
    cancelled: bool,
}

impl RunTotals {
    /// Whole-campaign totals, including deliveries made before a restart
    fn from_counters(counters: &RecipientCounters) -> Self {
        Self {
            sent: counters.sent.max(0) as u64,
            failed: counters.failed.max(0) as u64,
            skipped: counters.skipped.max(0) as u64,
            cancelled: false,
        }
    }
}

/// Background sending engine, shared with handlers and the scheduler
#[derive(Clone)]
pub struct CampaignSender {
    pool: PgPool,
    publisher: EventPublisher,
    email: Arc<dyn EmailSender>,
    links: TrackingLinks,
    default_from: String,
    rate_per_second: u32,
}

impl CampaignSender {
    pub fn new(pool: PgPool, publisher: EventPublisher, email: Arc<dyn EmailSender>, config: &Config) -> Self {
        Self {
            pool,
            publisher,
            email,
            links: TrackingLinks::new(&config.public_base_url),
            default_from: config.email_from.clone(),
            rate_per_second: config.email_rate_per_second,
        }
    }

    /// Move to `sending` and hand the run to a background task
    pub async fn start(&self, id: Uuid, actor: &str) -> Result<Campaign, CrmError> {
        let campaign = CampaignRepository::get_by_id(&self.pool, id).await?;
        CampaignService::ensure_has_recipients(&self.pool, id).await?;

        let sending = CampaignRepository::transition(
            &self.pool,
            id,
            &[CampaignStatus::Draft, CampaignStatus::Scheduled],
            CampaignStatus::Sending,
            None,
        )
        .await?
        .ok_or_else(|| invalid_transition(campaign.status, CampaignStatus::Sending))?;

        log::info!(
            "Campaign {} sending started by {} through the {} provider",
            id,
            actor,
            self.email.name()
        );

        self.spawn_run(sending.clone());
        Ok(sending)
    }

    /// Pick up runs a previous process left in `sending`.
    /// Only `pending` recipients are delivered, so nothing already sent goes out twice
    pub async fn resume_interrupted(&self) -> Result<usize, CrmError> {
        let ids = CampaignRepository::interrupted_runs(&self.pool).await?;
        for id in &ids {
            let campaign = CampaignRepository::get_by_id(&self.pool, *id).await?;
            log::warn!("Resuming interrupted campaign {} ({})", campaign.id, campaign.name);
            self.spawn_run(campaign);
        }
        Ok(ids.len())
    }

    fn spawn_run(&self, campaign: Campaign) {
        let sender = self.clone();
        tokio::spawn(async move {
            sender.run(campaign).await;
        });
    }

    async fn run(&self, campaign: Campaign) {
        let id = campaign.id;
        match self.deliver_all(&campaign).await {
            Ok(totals) if totals.cancelled => {
                log::warn!(
                    "Campaign {} cancelled mid-run after {} sent, {} failed",
                    id,
                    totals.sent,
                    totals.failed
                );
            }
            Ok(totals) => {
                let totals = match CampaignRepository::counters(&self.pool, id).await {
                    Ok(counters) => RunTotals::from_counters(&counters),
                    Err(e) => {
                        log::warn!("Campaign {} counters unavailable, reporting this run only: {}", id, e);
                        totals
                    }
                };
                if let Err(e) = self.finish(&campaign, totals).await {
                    log::error!("Campaign {} could not be finalised: {}", id, e);
                }
            }
            Err(e) => {
                log::error!("Campaign {} aborted: {}", id, e);
                let failed = CampaignRepository::transition(
                    &self.pool,
                    id,
                    &[CampaignStatus::Sending],
                    CampaignStatus::Failed,
                    None,
                )
                .await;
                if let Err(e) = failed {
                    log::error!("Campaign {} could not be marked failed: {}", id, e);
                }
            }
        }
    }

    async fn deliver_all(&self, campaign: &Campaign) -> Result<RunTotals, CrmError> {
        let messages = CampaignRepository::pending_messages(&self.pool, campaign.id).await?;
        let quota = Quota::per_second(NonZeroU32::new(self.rate_per_second).unwrap_or(NonZeroU32::MIN));
        let limiter = RateLimiter::direct(quota);
        let from = campaign.from_email.clone().unwrap_or_else(|| self.default_from.clone());

        log::info!("Campaign {}: {} message(s) to send", campaign.id, messages.len());
        let mut totals = RunTotals::default();

        for (index, message) in messages.iter().enumerate() {
            if index > 0 && index % CANCEL_CHECK_EVERY == 0 && self.is_cancelled(campaign.id).await? {
                totals.cancelled = true;
                return Ok(totals);
            }

            if message.blocked {
                CampaignRepository::mark_recipient(
                    &self.pool,
                    message.recipient_id,
                    RecipientStatus::Skipped,
                    Some("opted out or anonymised"),
                )
                .await?;
                totals.skipped += 1;
                continue;
            }

            let email = self.compose(campaign, &from, message);
            limiter.until_ready().await;

            match self.email.send(&email).await {
                Ok(()) => {
                    CampaignRepository::mark_recipient(&self.pool, message.recipient_id, RecipientStatus::Sent, None)
                        .await?;
                    totals.sent += 1;
                }
                Err(e) => {
                    log::warn!("Campaign {}: send to {} failed: {}", campaign.id, message.email, e);
                    let error = e.to_string();
                    CampaignRepository::mark_recipient(
                        &self.pool,
                        message.recipient_id,
                        RecipientStatus::Failed,
                        Some(&error),
                    )
                    .await?;
                    totals.failed += 1;
                }
            }
        }

        Ok(totals)
    }

    fn compose(&self, campaign: &Campaign, from: &str, message: &OutboundMessage) -> EmailMessage {
        let unsubscribe_url = self.links.unsubscribe_url(message.recipient_id);
        let ctx = MessageContext {
            first_name: message.first_name.clone().unwrap_or_default(),
            last_name: message.last_name.clone().unwrap_or_default(),
            email: message.email.clone(),
            organisation: message.organisation_name.clone().unwrap_or_default(),
            unsubscribe_url: unsubscribe_url.clone(),
        };

        EmailMessage {
            from: from.to_string(),
            to: message.email.clone(),
            subject: template::render(&campaign.subject, &ctx, false),
            html: template::build_html(&campaign.body_template, &ctx, &self.links, message.recipient_id),
            unsubscribe_url: Some(unsubscribe_url),
        }
    }

    async fn is_cancelled(&self, id: Uuid) -> Result<bool, CrmError> {
        let campaign = CampaignRepository::get_by_id(&self.pool, id).await?;
        Ok(campaign.status == CampaignStatus::Cancelled)
    }

    async fn finish(&self, campaign: &Campaign, totals: RunTotals) -> Result<(), CrmError> {
        let status = final_status(totals.sent, totals.failed);
        let Some(done) =
            CampaignRepository::transition(&self.pool, campaign.id, &[CampaignStatus::Sending], status, None).await?
        else {
            log::warn!("Campaign {} left sending state before completion", campaign.id);
            return Ok(());
        };

        log::info!(
            "Campaign {} {}: {} sent, {} failed, {} skipped",
            done.id,
            done.status,
            totals.sent,
            totals.failed,
            totals.skipped
        );

        self.publisher.emit(
            "campaign.sent",
            &json!({
                "campaign_id": done.id,
                "name": done.name,
                "status": done.status,
                "sent": totals.sent,
                "failed": totals.failed,
                "skipped": totals.skipped,
            }),
        );

        self.publisher
            .notify_quietly(CreateNotificationRequest {
                recipient: done.created_by.clone(),
                kind: NotificationKind::Campaign,
                title: format!("Campaign \"{}\" {}", done.name, done.status),
                message: Some(format!(
                    "{} sent, {} failed, {} skipped",
                    totals.sent, totals.failed, totals.skipped
                )),
                link: Some(format!("/campaigns/{}", done.id)),
                resource_type: Some("campaign".to_string()),
                resource_id: Some(done.id),
            })
            .await;

        Ok(())
    }
}

/// Periodically start scheduled campaigns whose time has come.
/// Runs interrupted by a previous shutdown are resumed first
pub fn start_scheduler(sender: CampaignSender, interval_secs: u64) {
    tokio::spawn(async move {
        match sender.resume_interrupted().await {
            Ok(0) => {}
            Ok(n) => log::info!("Resumed {} interrupted campaign run(s)", n),
            Err(e) => log::error!("Interrupted campaigns could not be resumed: {}", e),
        }

        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            interval.tick().await;

            let due = match CampaignRepository::due_scheduled(&sender.pool, Utc::now()).await {
                Ok(due) => due,
                Err(e) => {
                    log::error!("Campaign scheduler query failed: {}", e);
                    continue;
                }
            };

            for id in due {
                if let Err(e) = sender.start(id, "scheduler").await {
                    log::warn!("Scheduled campaign {} not started: {}", id, e);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn candidate(email: Option<&str>) -> RecipientCandidate {
        RecipientCandidate {
            person_id: Uuid::new_v4(),
            first_name: "Lea".to_string(),
            last_name: "Weber".to_string(),
            email: email.map(str::to_string),
            organisation_name: None,
            email_opt_out: false,
            is_anonymized: false,
            is_active: true,
        }
    }

    #[test]
    fn test_select_recipients_dedupes_and_excludes() {
        let mut opted_out = candidate(Some("out@example.com"));
        opted_out.email_opt_out = true;
        let mut anonymised = candidate(Some("anon@example.com"));
        anonymised.is_anonymized = true;

        let candidates = vec![
            candidate(Some("Lea.Weber@Example.com")),
            candidate(Some("lea.weber@example.com")),
            candidate(Some("already@example.com")),
            candidate(None),
            opted_out,
            anonymised,
            candidate(Some("new@example.com")),
        ];
        let existing: HashSet<String> = ["already@example.com".to_string()].into_iter().collect();

        let (rows, response) = select_recipients(&candidates, &existing);
        let emails: Vec<&str> = rows.iter().map(|(_, e)| e.as_str()).collect();

        assert_eq!(emails, vec!["lea.weber@example.com", "new@example.com"]);
        assert_eq!(response.already_present, 1);
        // duplicate email, no email, opted out, anonymised
        assert_eq!(response.excluded, 4);
        assert_eq!(response.added, 0);
    }

    #[test]
    fn test_schedule_must_be_in_future() {
        let now = Utc::now();
        assert!(ensure_future(now + ChronoDuration::minutes(5), now).is_ok());
        assert!(matches!(ensure_future(now, now), Err(CrmError::InvalidInput(_))));
        assert!(ensure_future(now - ChronoDuration::days(1), now).is_err());
    }

    #[test]
    fn test_final_status() {
        assert_eq!(final_status(10, 0), CampaignStatus::Sent);
        assert_eq!(final_status(9, 1), CampaignStatus::Sent);
        assert_eq!(final_status(0, 3), CampaignStatus::Failed);
        // Everyone skipped: nothing failed
        assert_eq!(final_status(0, 0), CampaignStatus::Sent);
    }

    #[test]
    fn test_resumed_run_reports_whole_campaign() {
        // 40 delivered before the restart, the last 10 by the resumed run
        let counters = RecipientCounters {
            total: 52,
            pending: 0,
            sent: 48,
            failed: 2,
            skipped: 2,
            ..Default::default()
        };
        let totals = RunTotals::from_counters(&counters);
        assert_eq!(
            totals,
            RunTotals {
                sent: 48,
                failed: 2,
                skipped: 2,
                cancelled: false
            }
        );
        assert_eq!(final_status(totals.sent, totals.failed), CampaignStatus::Sent);

        let nothing_went_out = RecipientCounters {
            failed: 5,
            ..Default::default()
        };
        let totals = RunTotals::from_counters(&nothing_went_out);
        assert_eq!(final_status(totals.sent, totals.failed), CampaignStatus::Failed);
    }

    #[test]
    fn test_invalid_transition_error() {
        match invalid_transition(CampaignStatus::Sent, CampaignStatus::Sending) {
            CrmError::InvalidTransition { from, to } => {
                assert_eq!(from, "sent");
                assert_eq!(to, "sending");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
