use chrono::Duration;
use tracing::{debug, info, warn};

use crate::config::DUPLICATE_LOOKUP_WINDOW_SECS;
use crate::mirror::calendar::CalendarService;
use crate::mirror::entry::{derive_span, EntryBody};
use crate::mirror::MirrorRecord;
use crate::types::Domain;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
    SkippedDuplicate,
    Created { link: Option<String> },
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorSummary {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl MirrorSummary {
    pub fn from_outcomes(outcomes: &[MirrorOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match outcome {
                MirrorOutcome::SkippedDuplicate => summary.skipped += 1,
                MirrorOutcome::Created { .. } => summary.created += 1,
                MirrorOutcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }
}

/// Creates one calendar entry per record unless a matching entry already
/// exists.
///
/// The existence check asks the calendar for entries starting within a
/// one-minute window whose text matches the record's title. It is a
/// heuristic: renamed entries or clock skew produce missed duplicates, and
/// unrelated same-minute entries sharing a keyword produce false skips.
pub struct CalendarMirror {
    service: Box<dyn CalendarService>,
}

impl CalendarMirror {
    pub fn new(service: Box<dyn CalendarService>) -> Self {
        Self { service }
    }

    /// One outcome per record, in input order. Records are handled one at a
    /// time; a failure never stops the remaining records and nothing already
    /// created is rolled back.
    pub async fn mirror<R: MirrorRecord + Sync>(
        &self,
        domain: Domain,
        records: &[R],
        calendar_id: &str,
    ) -> Vec<MirrorOutcome> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            outcomes.push(self.mirror_one(domain, record, calendar_id).await);
        }

        let summary = MirrorSummary::from_outcomes(&outcomes);
        info!(
            domain = %domain,
            calendar_id,
            created = summary.created,
            skipped = summary.skipped,
            failed = summary.failed,
            "[{domain}] mirror done"
        );
        outcomes
    }

    async fn mirror_one<R: MirrorRecord + Sync>(
        &self,
        domain: Domain,
        record: &R,
        calendar_id: &str,
    ) -> MirrorOutcome {
        let key = record.label();
        let Some(start) = record.start() else {
            warn!(domain = %domain, key = %key, "[{domain}] no start time, not mirrored");
            return MirrorOutcome::Failed("no start time".to_string());
        };
        let Some((entry_start, entry_end)) = derive_span(start, record.end()) else {
            return MirrorOutcome::Failed(format!("unrepresentable start time {start}"));
        };
        let Some(window_start) = entry_start.instant() else {
            return MirrorOutcome::Failed(format!("unrepresentable start time {start}"));
        };
        let window_end = window_start + Duration::seconds(DUPLICATE_LOOKUP_WINDOW_SECS);

        match self
            .service
            .list_entries(calendar_id, window_start, window_end, &record.search_text())
            .await
        {
            Ok(existing) if !existing.is_empty() => {
                let found = &existing[0];
                debug!(
                    domain = %domain,
                    key = %key,
                    entry_id = %found.id,
                    entry_summary = found.summary.as_deref().unwrap_or(""),
                    "[{domain}] already on calendar @ {start}"
                );
                return MirrorOutcome::SkippedDuplicate;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(domain = %domain, key = %key, "[{domain}] duplicate lookup failed, creating anyway: {e}");
            }
        }

        let body = EntryBody::new(&record.summary(), &record.description(), entry_start, entry_end);
        match self.service.create_entry(calendar_id, &body).await {
            Ok(created) => {
                info!(
                    domain = %domain,
                    key = %key,
                    entry_id = %created.id,
                    link = created.html_link.as_deref().unwrap_or(""),
                    "[{domain}] created entry @ {start}"
                );
                MirrorOutcome::Created { link: created.html_link }
            }
            Err(e) => {
                warn!(domain = %domain, key = %key, "[{domain}] create failed @ {start}: {e}");
                MirrorOutcome::Failed(e.to_string())
            }
        }
    }
}
