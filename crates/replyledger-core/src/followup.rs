//! Follow-up analysis over a tenant's stored messages.
//!
//! Everything here is derived on demand and never persisted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::calendar::{HolidayCalendar, working_days_between};
use crate::directory::Company;
use crate::settings::Settings;
use crate::store::{Direction, StoredMessage};

/// Outbound messages at which a company counts as heavily chased.
pub const NON_COMPLIANT_SENT: usize = 10;

/// Where a company stands after its last outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpStatus {
    /// An inbound message arrived at or after the last outbound one.
    Replied,
    /// Waiting, within the threshold.
    Pending,
    /// Reaches the threshold today; overdue on the next working day.
    DueTomorrow,
    /// Past the threshold.
    Overdue,
}

impl FollowUpStatus {
    /// Display label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Replied => "replied",
            Self::Pending => "pending",
            Self::DueTomorrow => "due tomorrow",
            Self::Overdue => "overdue",
        }
    }
}

impl std::fmt::Display for FollowUpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Follow-up state of one company that has been emailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverdueRecord {
    /// Company reference code.
    pub company_ref: String,
    /// Company display name.
    pub company_name: String,
    /// Company primary email.
    pub email: String,
    /// Most recent outbound message.
    pub last_outbound: DateTime<Utc>,
    /// Most recent reply at or after `last_outbound`.
    pub last_inbound: Option<DateTime<Utc>>,
    /// Working days since `last_outbound`; zero once replied.
    pub working_days_elapsed: u32,
    /// Whether `working_days_elapsed` exceeds the threshold.
    pub overdue: bool,
    /// Finer-grained status.
    pub status: FollowUpStatus,
}

/// Message counts for one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyActivity {
    /// Company reference code.
    pub company_ref: String,
    /// Company display name.
    pub name: String,
    /// Outbound messages.
    pub sent: usize,
    /// Inbound messages.
    pub received: usize,
    /// Inbound messages at or after the last outbound one.
    pub replies_since_last_outbound: usize,
    /// Most recent message in either direction.
    pub last_contact: Option<DateTime<Utc>>,
    /// Working days since `last_contact`.
    pub days_since_last_contact: Option<u32>,
    /// Emailed at least [`NON_COMPLIANT_SENT`] times.
    pub non_compliant: bool,
}

/// Tenant-wide dashboard numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OverviewStats {
    /// Companies in the directory.
    pub total_companies: usize,
    /// Companies past the threshold.
    pub overdue: usize,
    /// Companies at the threshold.
    pub due_tomorrow: usize,
    /// Outbound messages dated today (UTC).
    pub sent_today: usize,
    /// Companies emailed at least once that never replied.
    pub zero_replies: usize,
    /// Companies emailed at least [`NON_COMPLIANT_SENT`] times.
    pub emailed_ten_plus: usize,
}

/// Computes follow-up state against a holiday calendar and threshold.
#[derive(Debug, Clone, Copy)]
pub struct FollowUpAnalyzer<'a> {
    calendar: &'a HolidayCalendar,
    threshold: u32,
}

#[derive(Default)]
struct Timeline<'m> {
    outbound: Vec<&'m StoredMessage>,
    inbound: Vec<&'m StoredMessage>,
}

impl Timeline<'_> {
    fn last_outbound(&self) -> Option<DateTime<Utc>> {
        self.outbound.iter().map(|m| m.timestamp).max()
    }

    /// Inbound messages that answer `since`. Same instant counts as a reply.
    fn replies_since(&self, since: DateTime<Utc>) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.inbound
            .iter()
            .map(|m| m.timestamp)
            .filter(move |ts| *ts >= since)
    }

    fn last_contact(&self) -> Option<DateTime<Utc>> {
        self.outbound
            .iter()
            .chain(&self.inbound)
            .map(|m| m.timestamp)
            .max()
    }
}

fn timelines(messages: &[StoredMessage]) -> HashMap<&str, Timeline<'_>> {
    let mut by_company: HashMap<&str, Timeline<'_>> = HashMap::new();
    for message in messages {
        let timeline = by_company.entry(message.company_ref.as_str()).or_default();
        match message.direction {
            Direction::Outbound => timeline.outbound.push(message),
            Direction::Inbound => timeline.inbound.push(message),
        }
    }
    by_company
}

impl<'a> FollowUpAnalyzer<'a> {
    /// Create an analyzer using the threshold from `settings`.
    #[must_use]
    pub const fn new(calendar: &'a HolidayCalendar, settings: &Settings) -> Self {
        Self::with_threshold(calendar, settings.followup_threshold())
    }

    /// Create an analyzer with an explicit threshold.
    #[must_use]
    pub const fn with_threshold(calendar: &'a HolidayCalendar, threshold: u32) -> Self {
        Self {
            calendar,
            threshold,
        }
    }

    /// Threshold in working days.
    #[must_use]
    pub const fn threshold(&self) -> u32 {
        self.threshold
    }

    const fn status(&self, replied: bool, elapsed: u32) -> FollowUpStatus {
        if replied {
            FollowUpStatus::Replied
        } else if elapsed > self.threshold {
            FollowUpStatus::Overdue
        } else if elapsed == self.threshold {
            FollowUpStatus::DueTomorrow
        } else {
            FollowUpStatus::Pending
        }
    }

    /// Follow-up record for every company with at least one outbound message.
    ///
    /// Ordered by descending working days elapsed, then reference code.
    #[must_use]
    pub fn evaluate(
        &self,
        companies: &[Company],
        messages: &[StoredMessage],
        now: DateTime<Utc>,
    ) -> Vec<OverdueRecord> {
        let by_company = timelines(messages);

        let mut records: Vec<OverdueRecord> = companies
            .iter()
            .filter_map(|company| {
                let timeline = by_company.get(company.reference.as_str())?;
                let last_outbound = timeline.last_outbound()?;
                let last_inbound = timeline.replies_since(last_outbound).max();

                let elapsed = if last_inbound.is_some() {
                    0
                } else {
                    working_days_between(last_outbound, now, self.calendar)
                };
                let status = self.status(last_inbound.is_some(), elapsed);

                Some(OverdueRecord {
                    company_ref: company.reference.clone(),
                    company_name: company.name.clone(),
                    email: company.email.clone(),
                    last_outbound,
                    last_inbound,
                    working_days_elapsed: elapsed,
                    overdue: status == FollowUpStatus::Overdue,
                    status,
                })
            })
            .collect();

        records.sort_by(|a, b| {
            b.working_days_elapsed
                .cmp(&a.working_days_elapsed)
                .then_with(|| a.company_ref.cmp(&b.company_ref))
        });
        records
    }

    /// Only the overdue records, in report order.
    #[must_use]
    pub fn overdue_only(
        &self,
        companies: &[Company],
        messages: &[StoredMessage],
        now: DateTime<Utc>,
    ) -> Vec<OverdueRecord> {
        let mut records = self.evaluate(companies, messages, now);
        records.retain(|record| record.overdue);
        records
    }

    /// Per-company message counts, in directory order.
    #[must_use]
    pub fn activity(
        &self,
        companies: &[Company],
        messages: &[StoredMessage],
        now: DateTime<Utc>,
    ) -> Vec<CompanyActivity> {
        let by_company = timelines(messages);
        let empty = Timeline::default();

        companies
            .iter()
            .map(|company| {
                let timeline = by_company
                    .get(company.reference.as_str())
                    .unwrap_or(&empty);
                let sent = timeline.outbound.len();
                let replies = timeline
                    .last_outbound()
                    .map_or(0, |last| timeline.replies_since(last).count());
                let last_contact = timeline.last_contact();

                CompanyActivity {
                    company_ref: company.reference.clone(),
                    name: company.name.clone(),
                    sent,
                    received: timeline.inbound.len(),
                    replies_since_last_outbound: replies,
                    last_contact,
                    days_since_last_contact: last_contact
                        .map(|last| working_days_between(last, now, self.calendar)),
                    non_compliant: sent >= NON_COMPLIANT_SENT,
                }
            })
            .collect()
    }

    /// Tenant-wide counts.
    #[must_use]
    pub fn overview(
        &self,
        companies: &[Company],
        messages: &[StoredMessage],
        now: DateTime<Utc>,
    ) -> OverviewStats {
        let records = self.evaluate(companies, messages, now);
        let activity = self.activity(companies, messages, now);
        let today = now.date_naive();

        OverviewStats {
            total_companies: companies.len(),
            overdue: records.iter().filter(|r| r.overdue).count(),
            due_tomorrow: records
                .iter()
                .filter(|r| r.status == FollowUpStatus::DueTomorrow)
                .count(),
            sent_today: messages
                .iter()
                .filter(|m| m.direction == Direction::Outbound && m.timestamp.date_naive() == today)
                .count(),
            zero_replies: activity
                .iter()
                .filter(|a| a.sent > 0 && a.received == 0)
                .count(),
            emailed_ten_plus: activity.iter().filter(|a| a.non_compliant).count(),
        }
    }
}
