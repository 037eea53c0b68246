//! Attendance history and statistics.
//!
//! [`HistoryClient`] reads the signed-in user's attendances and the
//! server-side statistics. When the statistics endpoint fails,
//! [`HistoryClient::my_stats`] computes the same numbers from the history.
//! The free functions aggregate a list of records locally, for views that
//! need a different cut.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{response, ApiRequest, Transport};
use crate::error::AttendanceError;
use crate::model::{numeric, AttendanceRecord, Event};

/// API path for the signed-in user's attendances.
pub const MY_ATTENDANCES_PATH: &str = "/attendances/my";

/// API path for the signed-in user's statistics.
pub const MY_STATS_PATH: &str = "/attendances/my/stats";

/// Records kept in [`AttendanceSummary::recent`].
pub const RECENT_LIMIT: usize = 5;

/// Upper bound on pages walked by [`HistoryClient::all`].
pub const MAX_PAGES: u32 = 100;

/// Paging and server-side filters for [`HistoryClient::mine`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Page to fetch, starting at 1.
    pub page: Option<u32>,
    /// Records per page.
    pub limit: Option<u32>,
    /// Only verified (or only unverified) records.
    pub verified: Option<bool>,
    /// First check-in day, inclusive.
    pub start_date: Option<NaiveDate>,
    /// Last check-in day, inclusive.
    pub end_date: Option<NaiveDate>,
    /// Text the event name must contain.
    pub event_name: Option<String>,
}

impl HistoryQuery {
    /// Same filters, another page. Page 0 is treated as page 1.
    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page.max(1));
        self
    }

    fn event_name(&self) -> Option<&str> {
        self.event_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// The `GET` request for this query.
    #[must_use]
    pub fn to_request(&self) -> ApiRequest {
        let mut request = ApiRequest::get(MY_ATTENDANCES_PATH);
        if let Some(page) = self.page {
            request = request.with_query("page", page.max(1));
        }
        if let Some(limit) = self.limit {
            request = request.with_query("limit", limit);
        }
        if let Some(verified) = self.verified {
            request = request.with_query("verified", verified);
        }
        if let Some(start) = self.start_date {
            request = request.with_query("start_date", start.format("%Y-%m-%d"));
        }
        if let Some(end) = self.end_date {
            request = request.with_query("end_date", end.format("%Y-%m-%d"));
        }
        if let Some(name) = self.event_name() {
            request = request.with_query("event_name", name);
        }
        request
    }

    /// Apply the filters to records already fetched.
    ///
    /// Servers that ignore a filter parameter return unfiltered pages; this
    /// narrows them the same way.
    #[must_use]
    pub fn apply(&self, records: &[AttendanceRecord]) -> Vec<AttendanceRecord> {
        let mut records = records.to_vec();
        if let Some(verified) = self.verified {
            records = filter_by_verified(&records, verified);
        }
        if self.start_date.is_some() || self.end_date.is_some() {
            let from = self
                .start_date
                .and_then(|day| day.and_hms_opt(0, 0, 0))
                .map(|start| Utc.from_utc_datetime(&start));
            let to = self
                .end_date
                .and_then(|day| day.and_hms_nano_opt(23, 59, 59, 999_999_999))
                .map(|end| Utc.from_utc_datetime(&end));
            records = filter_by_date_range(&records, from, to);
        }
        if let Some(name) = self.event_name() {
            records = search_by_event_name(&records, name);
        }
        records
    }
}

/// One page of the attendance history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPage {
    /// Records on this page.
    pub attendances: Vec<AttendanceRecord>,
    /// Records across all pages.
    pub total: u64,
    /// This page's number, starting at 1.
    pub current_page: u32,
    /// Last page number, when the server paginates.
    pub last_page: Option<u32>,
}

impl HistoryPage {
    /// True when the server reports pages after this one.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.last_page.is_some_and(|last| self.current_page < last)
    }
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    current_page: Option<u32>,
    #[serde(default)]
    last_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct HistoryPayload {
    attendances: Vec<AttendanceRecord>,
    #[serde(default)]
    pagination: Option<Pagination>,
    #[serde(flatten)]
    top_level: Pagination,
}

/// Attendance statistics, from the server or computed from records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSummary {
    /// All records.
    #[serde(rename = "total_attendances")]
    pub total: usize,
    /// Records the server verified.
    #[serde(rename = "verified_attendances")]
    pub verified: usize,
    /// Records outside the radius.
    #[serde(rename = "unverified_attendances")]
    pub unverified: usize,
    /// Distinct events attended.
    pub events_attended: usize,
    /// Mean distance in meters, rounded to centimeters.
    #[serde(deserialize_with = "numeric::deserialize")]
    pub average_distance: f64,
    /// Most recent records, newest first.
    #[serde(rename = "recent_attendances", default)]
    pub recent: Vec<AttendanceRecord>,
}

impl AttendanceSummary {
    /// Summarize `records`.
    #[must_use]
    pub fn from_records(records: &[AttendanceRecord]) -> Self {
        let verified = records.iter().filter(|r| r.verified).count();
        let events_attended = records
            .iter()
            .map(|r| r.event_id)
            .collect::<HashSet<_>>()
            .len();

        let mut recent = records.to_vec();
        recent.sort_by(|a, b| b.checked_in_at.cmp(&a.checked_in_at));
        recent.truncate(RECENT_LIMIT);

        Self {
            total: records.len(),
            verified,
            unverified: records.len() - verified,
            events_attended,
            average_distance: round_centimeters(average_distance(records)),
            recent,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatsPayload {
    stats: AttendanceSummary,
}

/// Where a [`StatsReport`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsSource {
    /// The statistics endpoint.
    Server,
    /// Computed from the attendance history.
    Local,
}

/// Statistics and their origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    /// Origin of the numbers.
    pub source: StatsSource,
    /// The numbers.
    #[serde(flatten)]
    pub summary: AttendanceSummary,
}

/// Reads history and statistics through a [`Transport`].
#[derive(Debug)]
pub struct HistoryClient<T> {
    transport: T,
}

impl<T: Transport> HistoryClient<T> {
    /// Create a client over `transport`.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch one page of the user's attendances.
    ///
    /// # Errors
    ///
    /// Returns [`AttendanceError::Network`] when the request fails, or the
    /// mapped server failure.
    pub async fn mine(&self, query: &HistoryQuery) -> Result<HistoryPage, AttendanceError> {
        let requested = query.page.unwrap_or(1).max(1);
        debug!(?query, "Fetching attendance history");

        let response = self.transport.send(query.to_request()).await?;
        let payload: HistoryPayload = response::decode(&response).map_err(|e| {
            warn!(status = response.status, kind = %e.kind(), "History request failed");
            e
        })?;

        let pagination = payload.pagination.unwrap_or_default();
        let total = pagination
            .total
            .or(payload.top_level.total)
            .unwrap_or(payload.attendances.len() as u64);
        let page = HistoryPage {
            total,
            current_page: pagination
                .current_page
                .or(payload.top_level.current_page)
                .unwrap_or(requested),
            last_page: pagination.last_page.or(payload.top_level.last_page),
            attendances: payload.attendances,
        };
        info!(
            page = page.current_page,
            records = page.attendances.len(),
            total,
            "History page loaded"
        );
        Ok(page)
    }

    /// Fetch every page matching `query`, starting at its page.
    ///
    /// Stops at the last page the server reports, or after [`MAX_PAGES`].
    ///
    /// # Errors
    ///
    /// Returns the first failing page's error.
    pub async fn all(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        let mut records = Vec::new();
        let mut page_number = query.page.unwrap_or(1).max(1);
        for _ in 0..MAX_PAGES {
            let page = self.mine(&query.clone().with_page(page_number)).await?;
            let more = page.has_more();
            records.extend(page.attendances);
            if !more {
                return Ok(records);
            }
            page_number += 1;
        }
        warn!(pages = MAX_PAGES, "History page limit reached");
        Ok(records)
    }

    /// Fetch the server-side statistics.
    ///
    /// # Errors
    ///
    /// Returns [`AttendanceError::Network`] when the request fails, or the
    /// mapped server failure.
    pub async fn stats(&self) -> Result<AttendanceSummary, AttendanceError> {
        debug!("Fetching attendance statistics");
        let response = self.transport.send(ApiRequest::get(MY_STATS_PATH)).await?;
        let payload: StatsPayload = response::decode(&response).map_err(|e| {
            warn!(status = response.status, kind = %e.kind(), "Stats request failed");
            e
        })?;
        Ok(payload.stats)
    }

    /// Statistics from the server, or computed from the history when the
    /// statistics endpoint fails.
    ///
    /// # Errors
    ///
    /// Returns the statistics error when the user must sign in again, when
    /// the history can't be read either, or when the history is empty.
    pub async fn my_stats(&self) -> Result<StatsReport, AttendanceError> {
        let err = match self.stats().await {
            Ok(summary) => {
                return Ok(StatsReport {
                    source: StatsSource::Server,
                    summary,
                });
            }
            Err(err) if err.kind().requires_reauthentication() => return Err(err),
            Err(err) => err,
        };

        info!(kind = %err.kind(), "Computing statistics from the attendance history");
        match self.all(&HistoryQuery::default()).await {
            Ok(records) if !records.is_empty() => Ok(StatsReport {
                source: StatsSource::Local,
                summary: AttendanceSummary::from_records(&records),
            }),
            Ok(_) => Err(err),
            Err(fallback) => {
                warn!(kind = %fallback.kind(), "History unavailable for local statistics");
                Err(err)
            }
        }
    }
}

/// Records for one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventAttendances {
    /// Event id.
    pub event_id: u64,
    /// The event, when any record embedded it.
    pub event: Option<Event>,
    /// Records in input order.
    pub attendances: Vec<AttendanceRecord>,
    /// Verified records.
    pub verified_count: usize,
    /// Mean distance in meters.
    pub average_distance: f64,
    /// Earliest check-in.
    pub first_check_in: DateTime<Utc>,
    /// Latest check-in.
    pub last_check_in: DateTime<Utc>,
}

/// Records checked in on one UTC day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayAttendances {
    /// The day.
    pub date: NaiveDate,
    /// Records in input order.
    pub attendances: Vec<AttendanceRecord>,
    /// Distinct events that day.
    pub events_count: usize,
}

fn average_distance(records: &[AttendanceRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = records.len() as f64;
    records.iter().map(|r| r.distance_meters).sum::<f64>() / count
}

fn round_centimeters(meters: f64) -> f64 {
    (meters * 100.0).round() / 100.0
}

/// Group records by event, ordered by event id.
#[must_use]
pub fn group_by_event(records: &[AttendanceRecord]) -> Vec<EventAttendances> {
    let mut groups: BTreeMap<u64, Vec<AttendanceRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.event_id).or_default().push(record.clone());
    }

    groups
        .into_iter()
        .filter_map(|(event_id, attendances)| {
            let first_check_in = attendances.iter().map(|r| r.checked_in_at).min()?;
            let last_check_in = attendances.iter().map(|r| r.checked_in_at).max()?;
            Some(EventAttendances {
                event_id,
                event: attendances.iter().find_map(|r| r.event.clone()),
                verified_count: attendances.iter().filter(|r| r.verified).count(),
                average_distance: average_distance(&attendances),
                first_check_in,
                last_check_in,
                attendances,
            })
        })
        .collect()
}

/// Group records by UTC check-in day, newest day first.
#[must_use]
pub fn group_by_date(records: &[AttendanceRecord]) -> Vec<DayAttendances> {
    let mut days: BTreeMap<NaiveDate, Vec<AttendanceRecord>> = BTreeMap::new();
    for record in records {
        days.entry(record.checked_in_at.date_naive())
            .or_default()
            .push(record.clone());
    }

    days.into_iter()
        .rev()
        .map(|(date, attendances)| DayAttendances {
            date,
            events_count: attendances
                .iter()
                .map(|r| r.event_id)
                .collect::<HashSet<_>>()
                .len(),
            attendances,
        })
        .collect()
}

/// Keep only verified (or only unverified) records.
#[must_use]
pub fn filter_by_verified(records: &[AttendanceRecord], verified: bool) -> Vec<AttendanceRecord> {
    records
        .iter()
        .filter(|r| r.verified == verified)
        .cloned()
        .collect()
}

/// Keep records checked in within `[from, to]`. Either bound may be open.
#[must_use]
pub fn filter_by_date_range(
    records: &[AttendanceRecord],
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Vec<AttendanceRecord> {
    records
        .iter()
        .filter(|r| from.map_or(true, |from| r.checked_in_at >= from))
        .filter(|r| to.map_or(true, |to| r.checked_in_at <= to))
        .cloned()
        .collect()
}

/// Records whose event name or description contains `term`, ignoring case.
///
/// A blank term matches everything. Records without an embedded event never
/// match a non-blank term.
#[must_use]
pub fn search_by_event_name(records: &[AttendanceRecord], term: &str) -> Vec<AttendanceRecord> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return records.to_vec();
    }

    records
        .iter()
        .filter(|r| {
            r.event.as_ref().is_some_and(|event| {
                event.name.to_lowercase().contains(&term)
                    || event
                        .description
                        .as_ref()
                        .is_some_and(|d| d.to_lowercase().contains(&term))
            })
        })
        .cloned()
        .collect()
}
