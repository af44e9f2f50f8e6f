use chrono::{DateTime, NaiveTime, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when a stored status string does not name a known status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

macro_rules! status_strings {
    ($ty:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    other => Err(UnknownStatus(other.to_string())),
                }
            }
        }
    };
}

// ============================================
// Booking
// ============================================

/// Time-of-day range inside one weekday, serialized as `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub enabled: bool,
    #[serde(default)]
    pub slots: Vec<TimeRange>,
}

impl DaySchedule {
    pub fn open(slots: Vec<TimeRange>) -> Self {
        Self { enabled: true, slots }
    }

    pub fn is_bookable(&self) -> bool {
        self.enabled && !self.slots.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeeklySchedule {
    pub monday: DaySchedule,
    pub tuesday: DaySchedule,
    pub wednesday: DaySchedule,
    pub thursday: DaySchedule,
    pub friday: DaySchedule,
    pub saturday: DaySchedule,
    pub sunday: DaySchedule,
}

impl WeeklySchedule {
    pub fn day(&self, weekday: Weekday) -> &DaySchedule {
        match weekday {
            Weekday::Mon => &self.monday,
            Weekday::Tue => &self.tuesday,
            Weekday::Wed => &self.wednesday,
            Weekday::Thu => &self.thursday,
            Weekday::Fri => &self.friday,
            Weekday::Sat => &self.saturday,
            Weekday::Sun => &self.sunday,
        }
    }

    pub fn day_mut(&mut self, weekday: Weekday) -> &mut DaySchedule {
        match weekday {
            Weekday::Mon => &mut self.monday,
            Weekday::Tue => &mut self.tuesday,
            Weekday::Wed => &mut self.wednesday,
            Weekday::Thu => &mut self.thursday,
            Weekday::Fri => &mut self.friday,
            Weekday::Sat => &mut self.saturday,
            Weekday::Sun => &mut self.sunday,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeetingLocation {
    InPerson { address: String },
    Phone { number: Option<String> },
    Video { url: Option<String> },
    Custom { details: String },
}

impl Default for MeetingLocation {
    fn default() -> Self {
        Self::Video { url: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingLink {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub owner_id: Uuid,
    pub slug: String,
    pub title: String,
    pub duration_minutes: i32,
    pub buffer_minutes: i32,
    pub minimum_notice_hours: i32,
    pub max_bookings_per_day: Option<i32>,
    pub requires_confirmation: bool,
    pub is_active: bool,
    pub availability: WeeklySchedule,
    pub location: MeetingLocation,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

status_strings!(BookingStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub link_id: Uuid,
    pub owner_id: Uuid,
    pub booker_name: String,
    pub booker_email: String,
    pub notes: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: BookingStatus,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Owner-defined unavailable interval. `link_id = None` blocks every link
/// of the owner.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingBlock {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub link_id: Option<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub reason: Option<String>,
}

// ============================================
// Documents
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Proposal,
    Contract,
}

status_strings!(DocumentKind {
    Proposal => "proposal",
    Contract => "contract",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl LineItem {
    pub fn amount(&self) -> Decimal {
        self.quantity * self.unit_price
    }
}

/// One block of document content. `kind` is the free-form section tag
/// (`header`, `text`, `pricing`, `clause`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<LineItem>,
}

impl Section {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            title: None,
            body: None,
            items: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_items(mut self, items: Vec<LineItem>) -> Self {
        self.items = items;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentContent {
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl DocumentContent {
    pub fn subtotal(&self) -> Decimal {
        self.sections
            .iter()
            .flat_map(|s| s.items.iter())
            .map(LineItem::amount)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Draft,
    Sent,
    Viewed,
    Accepted,
    Declined,
    /// Never stored; see [`Proposal::effective_status`].
    Expired,
}

status_strings!(ProposalStatus {
    Draft => "draft",
    Sent => "sent",
    Viewed => "viewed",
    Accepted => "accepted",
    Declined => "declined",
    Expired => "expired",
});

impl ProposalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Declined)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub client_id: Uuid,
    pub number: String,
    pub title: String,
    pub content: DocumentContent,
    pub subtotal: Decimal,
    pub discount: Option<Decimal>,
    /// Percent, e.g. `8.25`.
    pub tax_rate: Option<Decimal>,
    pub total: Decimal,
    pub valid_until: Option<DateTime<Utc>>,
    pub status: ProposalStatus,
    pub access_token: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub view_count: i32,
    pub accepted_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
    pub signer_name: Option<String>,
    pub signer_email: Option<String>,
    pub signature_data: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    /// Recompute `subtotal` and `total` from the line items of every section.
    pub fn compute_totals(&mut self) {
        let subtotal = self.content.subtotal();
        let discounted = subtotal - self.discount.unwrap_or(Decimal::ZERO);
        let tax = match self.tax_rate {
            Some(rate) => discounted * rate / Decimal::ONE_HUNDRED,
            None => Decimal::ZERO,
        };

        self.subtotal = subtotal.round_dp(2);
        self.total = (discounted + tax).round_dp(2);
    }

    pub fn is_past_validity(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_some_and(|deadline| now > deadline)
    }

    /// Stored status with `expired` derived for open proposals past their deadline.
    pub fn effective_status(&self, now: DateTime<Utc>) -> ProposalStatus {
        match self.status {
            ProposalStatus::Sent | ProposalStatus::Viewed if self.is_past_validity(now) => {
                ProposalStatus::Expired
            }
            status => status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    Sent,
    Viewed,
    Signed,
    Cancelled,
    Completed,
}

status_strings!(ContractStatus {
    Draft => "draft",
    Sent => "sent",
    Viewed => "viewed",
    Signed => "signed",
    Cancelled => "cancelled",
    Completed => "completed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyType {
    Company,
    Individual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PartyType,
    pub name: String,
    pub email: Option<String>,
    pub role: String,
    pub signed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub client_id: Option<Uuid>,
    pub proposal_id: Option<Uuid>,
    pub number: String,
    pub title: String,
    pub content: DocumentContent,
    pub parties: Vec<Party>,
    pub status: ContractStatus,
    pub fully_signed: bool,
    pub fully_signed_at: Option<DateTime<Utc>>,
    pub effective_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub access_token: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub view_count: i32,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    /// AND over every party's `signed` flag. A contract without parties is
    /// never considered signed.
    pub fn all_parties_signed(&self) -> bool {
        !self.parties.is_empty() && self.parties.iter().all(|p| p.signed)
    }

    pub fn party(&self, party_id: &str) -> Option<&Party> {
        self.parties.iter().find(|p| p.id == party_id)
    }

    pub fn party_mut(&mut self, party_id: &str) -> Option<&mut Party> {
        self.parties.iter_mut().find(|p| p.id == party_id)
    }
}

/// Append-only audit row, one per individual signing act.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureLog {
    pub id: Uuid,
    pub document_type: DocumentKind,
    pub document_id: Uuid,
    pub signer_name: String,
    pub signer_email: Option<String>,
    pub signature_data: String,
    pub signed_at: DateTime<Utc>,
}

// ============================================
// Referenced entities
// ============================================

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub company: Option<String>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub client_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub priority: String,
    pub status: String,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub source_workflow_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardCard {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub board_id: Uuid,
    pub column_name: String,
    pub title: String,
    pub client_id: Option<Uuid>,
    pub position: i32,
    pub updated_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub client_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}
