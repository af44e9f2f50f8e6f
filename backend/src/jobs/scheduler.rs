// Job Scheduler - Runs background jobs on cron schedules

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info};
use uuid::Uuid;

use super::OutboxDispatchJob;
use crate::config::OutboxConfig;

/// Execution logs kept in memory per scheduler.
const LOG_CAPACITY: usize = 100;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Job execution error: {0}")]
    ExecutionError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: JobStatus,
    pub items_processed: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum JobStatus {
    Completed,
    PartialFailure,
    Failed,
}

/// Six-field cron expression (with seconds) firing every `interval_secs`.
/// Intervals of a minute or more are rounded down to whole minutes.
pub fn cron_expression(interval_secs: u64) -> String {
    match interval_secs {
        0 => "* * * * * *".to_string(),
        1..=59 => format!("*/{} * * * * *", interval_secs),
        _ => {
            let minutes = (interval_secs / 60).min(59);
            format!("0 */{} * * * *", minutes)
        }
    }
}

async fn record(logs: &RwLock<Vec<JobExecutionLog>>, log: JobExecutionLog) {
    let mut logs = logs.write().await;
    logs.push(log);
    if logs.len() > LOG_CAPACITY {
        logs.remove(0);
    }
}

/// One outbox dispatch run, recorded in `logs` whatever its outcome.
async fn run_outbox_dispatch(job: &OutboxDispatchJob, logs: &RwLock<Vec<JobExecutionLog>>) -> JobExecutionLog {
    let started_at = Utc::now();
    let log = match job.run().await {
        Ok(summary) => JobExecutionLog {
            id: Uuid::new_v4(),
            job_name: "Outbox Dispatch".to_string(),
            started_at,
            completed_at: Utc::now(),
            status: if summary.retried + summary.dead == 0 {
                JobStatus::Completed
            } else {
                JobStatus::PartialFailure
            },
            items_processed: summary.sent + summary.retried + summary.dead,
            error: None,
        },
        Err(e) => {
            error!("Outbox dispatch failed: {}", e);
            JobExecutionLog {
                id: Uuid::new_v4(),
                job_name: "Outbox Dispatch".to_string(),
                started_at,
                completed_at: Utc::now(),
                status: JobStatus::Failed,
                items_processed: 0,
                error: Some(e.to_string()),
            }
        }
    };
    record(logs, log.clone()).await;
    log
}

pub struct JobScheduler {
    scheduler: TokioScheduler,
    outbox_job: OutboxDispatchJob,
    config: OutboxConfig,
    execution_logs: Arc<RwLock<Vec<JobExecutionLog>>>,
}

impl JobScheduler {
    pub async fn new(outbox_job: OutboxDispatchJob, config: OutboxConfig) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            outbox_job,
            config,
            execution_logs: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting background job scheduler");

        self.schedule_outbox_dispatch().await?;
        self.scheduler.start().await?;

        info!("Background job scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down background job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule_outbox_dispatch(&self) -> JobResult<()> {
        let cron_expr = cron_expression(self.config.interval_secs);
        let outbox_job = self.outbox_job.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let outbox_job = outbox_job.clone();
            let logs = logs.clone();

            Box::pin(async move {
                run_outbox_dispatch(&outbox_job, &logs).await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled outbox dispatch ({})", cron_expr);

        Ok(())
    }

    pub async fn execution_logs(&self) -> Vec<JobExecutionLog> {
        self.execution_logs.read().await.clone()
    }

    /// Runs a job immediately, outside its schedule, and records the run.
    pub async fn run_job_now(&self, job_name: &str) -> JobResult<JobExecutionLog> {
        match job_name {
            "outbox_dispatch" => {
                let log = run_outbox_dispatch(&self.outbox_job, &self.execution_logs).await;
                if log.status == JobStatus::Failed {
                    return Err(JobError::ExecutionError(log.error.unwrap_or_default()));
                }
                Ok(log)
            }
            _ => Err(JobError::ConfigError(format!("Unknown job: {}", job_name))),
        }
    }
}
