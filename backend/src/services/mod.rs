pub mod email;
pub mod outbox;

pub use email::{DisabledMailer, EmailMessage, EmailService, MailError, MailSender};
#[cfg(test)]
pub use email::MockMailSender;
pub use outbox::{DispatchSummary, OutboxDispatcher, OutboxEntry, OutboxStatus};
