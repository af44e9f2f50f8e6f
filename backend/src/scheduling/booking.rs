// Booking state machine: write-time validation and cancellation

use chrono::{DateTime, Duration, NaiveDate, Utc};
use flowdesk_shared::{Booking, BookingBlock, BookingLink, BookingStatus};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::availability::{compute_slots, confirmed_on, day_bounds, fits_schedule, is_slot_free};
use crate::error::{DomainError, DomainResult};
use crate::store::{BookingRepository, StoreError};
use crate::workflows::{EventSink, TriggerEvent};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BookerInfo {
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub notes: Option<String>,
}

/// Re-checks every constraint for a requested start at write time, in the
/// order: active, notice, daily cap, schedule fit, overlap.
///
/// `bookings` and `blocks` must cover the requested day.
pub fn validate_request(
    link: &BookingLink,
    start: DateTime<Utc>,
    bookings: &[Booking],
    blocks: &[BookingBlock],
    now: DateTime<Utc>,
) -> DomainResult<()> {
    if !link.is_active {
        return Err(DomainError::LinkInactive);
    }

    let notice = Duration::hours(i64::from(link.minimum_notice_hours));
    if start <= now || start - now < notice {
        return Err(DomainError::NoticeTooShort {
            hours: link.minimum_notice_hours,
        });
    }

    if let Some(cap) = link.max_bookings_per_day {
        if confirmed_on(bookings, start.date_naive()) >= usize::try_from(cap).unwrap_or(0) {
            return Err(DomainError::DailyLimitReached);
        }
    }

    if !fits_schedule(link, start) {
        return Err(DomainError::OutsideAvailability);
    }

    let end = start + Duration::minutes(i64::from(link.duration_minutes));
    if !is_slot_free(start, end, bookings, blocks) {
        return Err(DomainError::SlotUnavailable);
    }

    Ok(())
}

pub struct BookingService {
    bookings: Arc<dyn BookingRepository>,
    events: Arc<dyn EventSink>,
}

impl BookingService {
    pub fn new(bookings: Arc<dyn BookingRepository>, events: Arc<dyn EventSink>) -> Self {
        Self { bookings, events }
    }

    async fn link_by_slug(&self, slug: &str) -> DomainResult<BookingLink> {
        self.bookings
            .find_link_by_slug(slug)
            .await?
            .ok_or_else(|| DomainError::not_found("Booking link", slug))
    }

    /// Bookings and blocks relevant to `date`. The window starts a day early
    /// so a booking running past midnight still blocks the morning.
    async fn day_context(
        &self,
        link: &BookingLink,
        date: NaiveDate,
    ) -> DomainResult<(Vec<Booking>, Vec<BookingBlock>)> {
        let (day_start, day_end) = day_bounds(date);
        let from = day_start - Duration::days(1);

        let bookings = self.bookings.bookings_between(link.id, from, day_end).await?;
        let blocks = self
            .bookings
            .blocks_between(link.owner_id, link.id, day_start, day_end)
            .await?;
        Ok((bookings, blocks))
    }

    pub async fn available_slots(&self, slug: &str, date: NaiveDate) -> DomainResult<Vec<DateTime<Utc>>> {
        let link = self.link_by_slug(slug).await?;
        let (bookings, blocks) = self.day_context(&link, date).await?;

        Ok(compute_slots(&link, date, &bookings, &blocks, Utc::now()))
    }

    /// Book `start` on the link. Never trusts a previously listed slot.
    pub async fn book(&self, slug: &str, start: DateTime<Utc>, booker: BookerInfo) -> DomainResult<Booking> {
        booker.validate()?;
        let link = self.link_by_slug(slug).await?;
        let now = Utc::now();

        let (bookings, blocks) = self.day_context(&link, start.date_naive()).await?;
        if let Err(e) = validate_request(&link, start, &bookings, &blocks, now) {
            warn!("Booking on '{}' at {} rejected: {}", link.slug, start, e);
            return Err(e);
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            link_id: link.id,
            owner_id: link.owner_id,
            booker_name: booker.name.trim().to_string(),
            booker_email: booker.email.trim().to_string(),
            notes: booker.notes.filter(|n| !n.trim().is_empty()),
            scheduled_at: start,
            ends_at: start + Duration::minutes(i64::from(link.duration_minutes)),
            status: if link.requires_confirmation {
                BookingStatus::Pending
            } else {
                BookingStatus::Confirmed
            },
            cancellation_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            created_at: now,
        };

        match self.bookings.insert_booking(&booking).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(_)) => {
                warn!("Booking on '{}' at {} lost the slot to a concurrent request", link.slug, start);
                return Err(DomainError::SlotUnavailable);
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            "Booking {} on '{}' at {} ({})",
            booking.id, link.slug, booking.scheduled_at, booking.status
        );

        self.events
            .publish(TriggerEvent::booking_created(link.workspace_id, &booking))
            .await;

        Ok(booking)
    }

    /// `pending|confirmed -> cancelled`, on behalf of a workspace member.
    pub async fn cancel(
        &self,
        workspace_id: Uuid,
        booking_id: Uuid,
        reason: Option<String>,
        actor_id: Uuid,
    ) -> DomainResult<Booking> {
        let mut booking = self
            .bookings
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Booking", booking_id))?;
        let link = self
            .bookings
            .find_link(booking.link_id)
            .await?
            .filter(|l| l.workspace_id == workspace_id)
            .ok_or_else(|| DomainError::not_found("Booking", booking_id))?;

        cancel(&mut booking, reason, actor_id.to_string(), Utc::now())?;

        if !self.bookings.cancel_booking(&booking).await? {
            return Err(DomainError::InvalidTransition {
                document: "booking",
                from: BookingStatus::Cancelled.to_string(),
                action: "cancel",
            });
        }

        info!("Booking {} on '{}' cancelled", booking.id, link.slug);

        self.events
            .publish(TriggerEvent::booking_cancelled(workspace_id, &booking, actor_id))
            .await;

        Ok(booking)
    }
}

pub fn cancel(
    booking: &mut Booking,
    reason: Option<String>,
    actor: String,
    now: DateTime<Utc>,
) -> DomainResult<()> {
    match booking.status {
        BookingStatus::Pending | BookingStatus::Confirmed => {
            booking.status = BookingStatus::Cancelled;
            booking.cancellation_reason = reason.filter(|r| !r.trim().is_empty());
            booking.cancelled_by = Some(actor);
            booking.cancelled_at = Some(now);
            Ok(())
        }
        BookingStatus::Cancelled => Err(DomainError::InvalidTransition {
            document: "booking",
            from: booking.status.to_string(),
            action: "cancel",
        }),
    }
}
