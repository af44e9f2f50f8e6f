// Shared setup for integration tests
use std::sync::Once;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use flowdesk_backend::config::{Config, NumberingConfig, OutboxConfig, SmtpConfig};
use flowdesk_shared::{
    BookingLink, Client, DaySchedule, MeetingLocation, TimeRange, WeeklySchedule, Workspace,
};
use uuid::Uuid;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init()
            .ok();
    });
}

pub fn config() -> Config {
    Config {
        database_url: String::new(),
        server_addr: "127.0.0.1:0".to_string(),
        jwt_secret: "integration-secret".to_string(),
        smtp: SmtpConfig {
            host: String::new(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from_email: "noreply@flowdesk.test".to_string(),
            from_name: "Flowdesk".to_string(),
            use_tls: false,
        },
        numbering: NumberingConfig::default(),
        outbox: OutboxConfig {
            max_attempts: 2,
            ..OutboxConfig::default()
        },
    }
}

pub fn workspace() -> Workspace {
    Workspace {
        id: Uuid::new_v4(),
        name: "Northwind Studio".to_string(),
        email: Some("hello@northwind.test".to_string()),
    }
}

pub fn client(workspace_id: Uuid) -> Client {
    Client {
        id: Uuid::new_v4(),
        workspace_id,
        name: "Ada Lovelace".to_string(),
        email: Some("ada@example.com".to_string()),
        company: Some("Analytical Engines".to_string()),
    }
}

/// Every day 09:00 to 10:00, 30 minute meetings.
pub fn booking_link(workspace_id: Uuid) -> BookingLink {
    let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
    let ten = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
    let day = DaySchedule::open(vec![TimeRange::new(nine, ten)]);

    BookingLink {
        id: Uuid::new_v4(),
        workspace_id,
        owner_id: Uuid::new_v4(),
        slug: "discovery".to_string(),
        title: "Discovery call".to_string(),
        duration_minutes: 30,
        buffer_minutes: 0,
        minimum_notice_hours: 24,
        max_bookings_per_day: None,
        requires_confirmation: false,
        is_active: true,
        availability: WeeklySchedule {
            monday: day.clone(),
            tuesday: day.clone(),
            wednesday: day.clone(),
            thursday: day.clone(),
            friday: day.clone(),
            saturday: day.clone(),
            sunday: day,
        },
        location: MeetingLocation::default(),
        created_at: Utc::now(),
    }
}

/// 09:00 UTC ten days from now.
pub fn bookable_start() -> DateTime<Utc> {
    let date = (Utc::now() + Duration::days(10)).date_naive();
    date.and_time(NaiveTime::from_hms_opt(9, 0, 0).unwrap()).and_utc()
}
