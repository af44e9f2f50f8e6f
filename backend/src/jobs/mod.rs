// Background jobs, driven by tokio-cron-scheduler

pub mod outbox_dispatch;
pub mod scheduler;

pub use outbox_dispatch::OutboxDispatchJob;
pub use scheduler::{JobError, JobExecutionLog, JobResult, JobScheduler, JobStatus};
