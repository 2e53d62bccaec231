//! Which slots are due for each publishing target.
//!
//! Pure functions of the catalog snapshot and an explicit reference time.
use chrono::{DateTime, Duration, FixedOffset, NaiveDate};

use crate::model::{Slot, SocialPolicy};

/// Tolerated clock skew between the scheduler and the catalog's publish times.
pub const SOCIAL_FORWARD_BUFFER_SECS: i64 = 120;

/// Unpublished slots with media, oldest first. The caller stops at the first
/// failure so later slots never overtake an earlier one.
pub fn select_for_video_publish(slots: &[Slot]) -> Vec<&Slot> {
    let mut due: Vec<&Slot> = slots
        .iter()
        .filter(|s| s.video_platform_id.is_none() && s.has_media())
        .collect();
    due.sort_by_key(|s| s.nr);
    due
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocialSelection<'a> {
    Candidate(&'a Slot),
    /// Nothing due and unposted at all.
    NoEligibleCandidate,
    /// `TodayOnly`: the slot for `date` is missing, already posted or not yet due.
    NotDueToday { date: NaiveDate },
}

impl<'a> SocialSelection<'a> {
    pub fn candidate(&self) -> Option<&'a Slot> {
        match self {
            SocialSelection::Candidate(slot) => Some(slot),
            _ => None,
        }
    }
}

fn is_social_candidate(slot: &Slot, reference_time: DateTime<FixedOffset>) -> bool {
    let horizon = reference_time + Duration::seconds(SOCIAL_FORWARD_BUFFER_SECS);
    slot.post_id.is_none() && slot.has_media() && slot.publish_date <= horizon
}

/// At most one slot to post this run. "Today" is the calendar date of
/// `reference_time` in its own offset.
pub fn select_for_social_post(
    slots: &[Slot],
    reference_time: DateTime<FixedOffset>,
    policy: SocialPolicy,
) -> SocialSelection<'_> {
    let mut eligible = slots
        .iter()
        .filter(|s| is_social_candidate(s, reference_time));

    match policy {
        SocialPolicy::BacklogOldest => eligible
            .min_by_key(|s| s.nr)
            .map(SocialSelection::Candidate)
            .unwrap_or(SocialSelection::NoEligibleCandidate),
        SocialPolicy::TodayOnly => {
            let today = reference_time.date_naive();
            eligible
                .find(|s| s.publish_date.with_timezone(reference_time.offset()).date_naive() == today)
                .map(SocialSelection::Candidate)
                .unwrap_or(SocialSelection::NotDueToday { date: today })
        }
    }
}
