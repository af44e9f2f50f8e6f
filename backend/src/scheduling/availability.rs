// Availability Scheduler - turns a weekly schedule into bookable slots

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use flowdesk_shared::{Booking, BookingBlock, BookingLink, BookingStatus, TimeRange};

/// `[start, end)` overlaps `[other_start, other_end)`: the candidate starts
/// inside the other, ends inside it, or fully contains it.
pub fn overlaps(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    other_start: DateTime<Utc>,
    other_end: DateTime<Utc>,
) -> bool {
    (start >= other_start && start < other_end)
        || (end > other_start && end <= other_end)
        || (start <= other_start && end >= other_end)
}

/// No confirmed booking and no block intersects `[start, end)`. Pending and
/// cancelled bookings never block a slot.
pub fn is_slot_free(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    bookings: &[Booking],
    blocks: &[BookingBlock],
) -> bool {
    let booked = bookings
        .iter()
        .filter(|b| b.status == BookingStatus::Confirmed)
        .any(|b| overlaps(start, end, b.scheduled_at, b.ends_at));
    let blocked = blocks
        .iter()
        .any(|b| overlaps(start, end, b.starts_at, b.ends_at));

    !booked && !blocked
}

pub(crate) fn at(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    date.and_time(time).and_utc()
}

pub(crate) fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = at(date, NaiveTime::MIN);
    (start, start + Duration::days(1))
}

pub(crate) fn confirmed_on(bookings: &[Booking], date: NaiveDate) -> usize {
    bookings
        .iter()
        .filter(|b| b.status == BookingStatus::Confirmed && b.scheduled_at.date_naive() == date)
        .count()
}

fn slot_step(link: &BookingLink) -> Option<Duration> {
    (link.duration_minutes > 0)
        .then(|| Duration::minutes(i64::from(link.duration_minutes + link.buffer_minutes.max(0))))
}

/// Candidate starts of one range: the cursor steps by duration plus buffer
/// and stops once `cursor + duration + buffer` would pass the range end.
fn grid(date: NaiveDate, range: &TimeRange, step: Duration) -> impl Iterator<Item = DateTime<Utc>> {
    let start = at(date, range.start);
    let end = at(date, range.end);
    std::iter::successors(Some(start), move |cursor| Some(*cursor + step))
        .take_while(move |cursor| *cursor + step <= end)
}

/// Ordered bookable start times for `date`.
///
/// `bookings` and `blocks` must cover the whole day; anything else passed in
/// is ignored by the overlap test.
pub fn compute_slots(
    link: &BookingLink,
    date: NaiveDate,
    bookings: &[Booking],
    blocks: &[BookingBlock],
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    if !link.is_active {
        return Vec::new();
    }

    let notice = Duration::hours(i64::from(link.minimum_notice_hours));
    let (_, day_end) = day_bounds(date);
    if day_end - now < notice {
        return Vec::new();
    }

    if let Some(cap) = link.max_bookings_per_day {
        if confirmed_on(bookings, date) >= usize::try_from(cap).unwrap_or(0) {
            return Vec::new();
        }
    }

    let schedule = link.availability.day(date.weekday());
    if !schedule.is_bookable() {
        return Vec::new();
    }
    let Some(step) = slot_step(link) else {
        return Vec::new();
    };
    let duration = Duration::minutes(i64::from(link.duration_minutes));

    let mut slots: Vec<DateTime<Utc>> = schedule
        .slots
        .iter()
        .flat_map(|range| grid(date, range, step))
        .filter(|start| *start > now && *start - now >= notice)
        .filter(|start| is_slot_free(*start, *start + duration, bookings, blocks))
        .collect();

    slots.sort();
    slots.dedup();
    slots
}

/// `start` lies on the slot grid of an enabled range for its weekday.
pub fn fits_schedule(link: &BookingLink, start: DateTime<Utc>) -> bool {
    let date = start.date_naive();
    let schedule = link.availability.day(date.weekday());
    if !schedule.is_bookable() {
        return false;
    }
    let Some(step) = slot_step(link) else {
        return false;
    };

    schedule
        .slots
        .iter()
        .any(|range| grid(date, range, step).any(|candidate| candidate == start))
}
