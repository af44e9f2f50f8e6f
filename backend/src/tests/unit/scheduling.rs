// Booking scenarios through the service and the in-memory store

use chrono::Weekday;
use flowdesk_shared::{BookingBlock, BookingStatus};
use uuid::Uuid;

use crate::error::DomainError;
use crate::scheduling::validate_request;
use crate::tests::fixtures::{at, booker, booking_link, future_weekday};
use crate::tests::TestContext;
use crate::workflows::TriggerType;

#[tokio::test]
async fn test_open_day_lists_every_grid_slot() {
    let ctx = TestContext::new().await;
    let link = booking_link(ctx.workspace.id);
    ctx.store.add_link(link.clone()).await;
    let day = future_weekday(Weekday::Mon);

    let slots = ctx.bookings().available_slots(&link.slug, day).await.unwrap();

    assert_eq!(slots, vec![at(day, 9, 0), at(day, 9, 30)]);
}

#[tokio::test]
async fn test_second_booking_of_same_slot_is_rejected() {
    let ctx = TestContext::new().await;
    let link = booking_link(ctx.workspace.id);
    ctx.store.add_link(link.clone()).await;
    let day = future_weekday(Weekday::Tue);
    let service = ctx.bookings();

    let first = service.book(&link.slug, at(day, 9, 0), booker()).await.unwrap();
    assert_eq!(first.status, BookingStatus::Confirmed);
    assert_eq!(first.ends_at, at(day, 9, 30));

    let second = service.book(&link.slug, at(day, 9, 0), booker()).await;
    assert!(matches!(second, Err(DomainError::SlotUnavailable)));

    let slots = service.available_slots(&link.slug, day).await.unwrap();
    assert_eq!(slots, vec![at(day, 9, 30)]);
    assert_eq!(ctx.store.bookings().await.len(), 1);
}

#[tokio::test]
async fn test_booking_publishes_event() {
    let ctx = TestContext::new().await;
    let link = booking_link(ctx.workspace.id);
    ctx.store.add_link(link.clone()).await;
    let day = future_weekday(Weekday::Wed);

    let booking = ctx.bookings().book(&link.slug, at(day, 9, 30), booker()).await.unwrap();

    let events = ctx.events.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].trigger_type, TriggerType::BookingCreated);
    assert_eq!(events[0].workspace_id, ctx.workspace.id);
    assert_eq!(events[0].payload["booking_id"], booking.id.to_string());
}

#[tokio::test]
async fn test_pending_bookings_leave_the_slot_listed() {
    let ctx = TestContext::new().await;
    let mut link = booking_link(ctx.workspace.id);
    link.requires_confirmation = true;
    ctx.store.add_link(link.clone()).await;
    let day = future_weekday(Weekday::Thu);

    let booking = ctx.bookings().book(&link.slug, at(day, 9, 0), booker()).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);

    let slots = ctx.bookings().available_slots(&link.slug, day).await.unwrap();
    assert!(slots.contains(&at(day, 9, 0)));
}

#[tokio::test]
async fn test_daily_cap_rejects_further_bookings() {
    let ctx = TestContext::new().await;
    let mut link = booking_link(ctx.workspace.id);
    link.max_bookings_per_day = Some(1);
    ctx.store.add_link(link.clone()).await;
    let day = future_weekday(Weekday::Fri);
    let service = ctx.bookings();

    service.book(&link.slug, at(day, 9, 0), booker()).await.unwrap();
    let second = service.book(&link.slug, at(day, 9, 30), booker()).await;

    assert!(matches!(second, Err(DomainError::DailyLimitReached)));
    assert!(service.available_slots(&link.slug, day).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_start_off_the_schedule_is_rejected() {
    let ctx = TestContext::new().await;
    let link = booking_link(ctx.workspace.id);
    ctx.store.add_link(link.clone()).await;
    let day = future_weekday(Weekday::Sat);
    let service = ctx.bookings();

    let late = service.book(&link.slug, at(day, 11, 0), booker()).await;
    assert!(matches!(late, Err(DomainError::OutsideAvailability)));

    let off_grid = service.book(&link.slug, at(day, 9, 10), booker()).await;
    assert!(matches!(off_grid, Err(DomainError::OutsideAvailability)));
}

#[tokio::test]
async fn test_start_inside_notice_window_is_rejected() {
    let ctx = TestContext::new().await;
    let mut link = booking_link(ctx.workspace.id);
    // Thirty days of notice, while the requested day is at most two weeks out
    link.minimum_notice_hours = 24 * 30;
    ctx.store.add_link(link.clone()).await;
    let day = future_weekday(Weekday::Mon);

    let result = ctx.bookings().book(&link.slug, at(day, 9, 0), booker()).await;

    assert!(matches!(result, Err(DomainError::NoticeTooShort { hours: 720 })));
    assert!(ctx.store.bookings().await.is_empty());
    assert!(ctx.events.events().await.is_empty());
}

#[test]
fn test_write_time_notice_check() {
    let mut link = booking_link(Uuid::new_v4());
    link.minimum_notice_hours = 2;
    let day = future_weekday(Weekday::Tue);

    assert!(validate_request(&link, at(day, 9, 0), &[], &[], at(day, 7, 0)).is_ok());
    assert!(matches!(
        validate_request(&link, at(day, 9, 30), &[], &[], at(day, 8, 0)),
        Err(DomainError::NoticeTooShort { hours: 2 })
    ));

    link.minimum_notice_hours = 0;
    assert!(matches!(
        validate_request(&link, at(day, 9, 0), &[], &[], at(day, 9, 0)),
        Err(DomainError::NoticeTooShort { .. })
    ));
    assert!(matches!(
        validate_request(&link, at(day, 9, 0), &[], &[], at(day, 9, 15)),
        Err(DomainError::NoticeTooShort { .. })
    ));
}

#[tokio::test]
async fn test_inactive_link_offers_nothing() {
    let ctx = TestContext::new().await;
    let mut link = booking_link(ctx.workspace.id);
    link.is_active = false;
    ctx.store.add_link(link.clone()).await;
    let day = future_weekday(Weekday::Mon);

    assert!(ctx.bookings().available_slots(&link.slug, day).await.unwrap().is_empty());
    let attempt = ctx.bookings().book(&link.slug, at(day, 9, 0), booker()).await;
    assert!(matches!(attempt, Err(DomainError::LinkInactive)));
}

#[tokio::test]
async fn test_owner_block_hides_overlapping_slots() {
    let ctx = TestContext::new().await;
    let link = booking_link(ctx.workspace.id);
    ctx.store.add_link(link.clone()).await;
    let day = future_weekday(Weekday::Tue);
    ctx.store
        .add_block(BookingBlock {
            id: Uuid::new_v4(),
            owner_id: link.owner_id,
            link_id: None,
            starts_at: at(day, 9, 0),
            ends_at: at(day, 9, 15),
            reason: Some("Dentist".to_string()),
        })
        .await;

    let slots = ctx.bookings().available_slots(&link.slug, day).await.unwrap();
    assert_eq!(slots, vec![at(day, 9, 30)]);

    let attempt = ctx.bookings().book(&link.slug, at(day, 9, 0), booker()).await;
    assert!(matches!(attempt, Err(DomainError::SlotUnavailable)));
}

#[tokio::test]
async fn test_invalid_booker_email_is_rejected() {
    let ctx = TestContext::new().await;
    let link = booking_link(ctx.workspace.id);
    ctx.store.add_link(link.clone()).await;
    let mut info = booker();
    info.email = "not-an-email".to_string();

    let attempt = ctx
        .bookings()
        .book(&link.slug, at(future_weekday(Weekday::Mon), 9, 0), info)
        .await;

    match attempt {
        Err(DomainError::Invalid { field, .. }) => assert_eq!(field, "email"),
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_frees_the_slot_once() {
    let ctx = TestContext::new().await;
    let link = booking_link(ctx.workspace.id);
    ctx.store.add_link(link.clone()).await;
    let day = future_weekday(Weekday::Wed);
    let service = ctx.bookings();
    let actor = Uuid::new_v4();

    let booking = service.book(&link.slug, at(day, 9, 0), booker()).await.unwrap();
    let cancelled = service
        .cancel(ctx.workspace.id, booking.id, Some("Conflict".to_string()), actor)
        .await
        .unwrap();

    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(cancelled.cancelled_by, Some(actor.to_string()));
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Conflict"));
    assert!(service.available_slots(&link.slug, day).await.unwrap().contains(&at(day, 9, 0)));
    assert_eq!(
        ctx.events.types().await,
        vec![TriggerType::BookingCreated, TriggerType::BookingCancelled]
    );

    let again = service.cancel(ctx.workspace.id, booking.id, None, actor).await;
    assert!(matches!(again, Err(DomainError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_cancel_from_another_workspace_is_not_found() {
    let ctx = TestContext::new().await;
    let link = booking_link(ctx.workspace.id);
    ctx.store.add_link(link.clone()).await;
    let booking = ctx
        .bookings()
        .book(&link.slug, at(future_weekday(Weekday::Thu), 9, 0), booker())
        .await
        .unwrap();

    let attempt = ctx
        .bookings()
        .cancel(Uuid::new_v4(), booking.id, None, Uuid::new_v4())
        .await;

    assert!(matches!(attempt, Err(DomainError::NotFound { entity: "Booking", .. })));
}
