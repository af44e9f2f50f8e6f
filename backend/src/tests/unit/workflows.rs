// Workflow engine scenarios: matching, ordered execution, failure isolation

use chrono::Utc;
use flowdesk_shared::BoardCard;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::services::{DisabledMailer, MailError, MockMailSender, OutboxStatus};
use crate::store::WorkflowRepository;
use crate::tests::fixtures::workflow;
use crate::tests::TestContext;
use crate::workflows::{
    Action, ActionStep, EventData, EventSource, ExecutionStatus, InvoicePaidFilter,
    TaskCompletedFilter, Trigger, TriggerEvent, TriggerType, UnrecognizedAction,
    WorkflowDefinition,
};

fn task_done(ctx: &TestContext) -> TriggerEvent {
    TriggerEvent::task_completed(
        ctx.workspace.id,
        Uuid::new_v4(),
        "Send kickoff deck",
        Some(ctx.client.id),
        Uuid::new_v4(),
    )
}

fn on_task_done() -> Trigger {
    Trigger::TaskCompleted(TaskCompletedFilter::default())
}

fn accepting_mailer() -> MockMailSender {
    let mut mailer = MockMailSender::new();
    mailer.expect_send_email().returning(|_, _, _| Ok(()));
    mailer
}

#[tokio::test]
async fn test_invoice_threshold_filters_events() {
    let ctx = TestContext::new().await;
    let engine = ctx.engine(Arc::new(DisabledMailer));
    let trigger = Trigger::InvoicePaid(InvoicePaidFilter {
        client_id: None,
        amount_threshold: Some(Decimal::from(100)),
    });
    engine
        .create_workflow(
            ctx.workspace.id,
            workflow("Big invoice", trigger, vec![Action::create_task("Thank {{client_name}}").into()]),
        )
        .await
        .unwrap();

    let paid = |amount: i64| {
        TriggerEvent::invoice_paid(
            ctx.workspace.id,
            Uuid::new_v4(),
            "INV-0042",
            ctx.client.id,
            Decimal::from(amount),
        )
    };

    assert_eq!(engine.trigger_workflows(&paid(150)).await.unwrap().len(), 1);
    assert!(engine.trigger_workflows(&paid(50)).await.unwrap().is_empty());
    assert_eq!(engine.trigger_workflows(&paid(100)).await.unwrap().len(), 1);

    let tasks = ctx.store.tasks().await;
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].title, format!("Thank {}", ctx.client.name));
}

#[tokio::test]
async fn test_failed_step_does_not_stop_later_steps() {
    let ctx = TestContext::new().await;
    let engine = ctx.engine(Arc::new(DisabledMailer));
    engine
        .create_workflow(
            ctx.workspace.id,
            workflow(
                "Ordered",
                on_task_done(),
                vec![
                    Action::create_task("A").into(),
                    // no card_id anywhere, so this step fails
                    Action::move_card("Done").into(),
                    Action::create_task("C").into(),
                ],
            ),
        )
        .await
        .unwrap();

    let executions = engine.trigger_workflows(&task_done(&ctx)).await.unwrap();

    assert_eq!(executions.len(), 1);
    let execution = &executions[0];
    assert_eq!(execution.status, ExecutionStatus::Completed);
    let flags: Vec<bool> = execution.result.action_results.iter().map(|o| o.success).collect();
    assert_eq!(flags, vec![true, false, true]);
    assert!(execution.result.action_results[1]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("card_id"));

    let titles: Vec<String> = ctx.store.tasks().await.into_iter().map(|t| t.title).collect();
    assert_eq!(titles, vec!["A".to_string(), "C".to_string()]);

    let stored = ctx.store.executions().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, ExecutionStatus::Completed);
    assert!(stored[0].completed_at.is_some());
}

#[tokio::test]
async fn test_disabled_and_foreign_workflows_do_not_run() {
    let ctx = TestContext::new().await;
    let engine = ctx.engine(Arc::new(DisabledMailer));
    let mut disabled = workflow("Off", on_task_done(), vec![Action::create_task("x").into()]);
    disabled.enabled = false;
    engine.create_workflow(ctx.workspace.id, disabled).await.unwrap();
    engine
        .create_workflow(
            Uuid::new_v4(),
            workflow("Elsewhere", on_task_done(), vec![Action::create_task("y").into()]),
        )
        .await
        .unwrap();

    let executions = engine.trigger_workflows(&task_done(&ctx)).await.unwrap();

    assert!(executions.is_empty());
    assert!(ctx.store.tasks().await.is_empty());
}

#[tokio::test]
async fn test_email_sent_to_client_with_interpolated_subject() {
    let ctx = TestContext::new().await;
    let expected_to = ctx.client.email.clone().unwrap_or_default();
    let expected_subject = format!("Thanks, {}", ctx.client.name);

    let mut mailer = MockMailSender::new();
    mailer
        .expect_send_email()
        .withf(move |to, template, message| {
            *to == expected_to && template == "workflow_notification" && message.subject == expected_subject
        })
        .times(1)
        .returning(|_, _, _| Ok(()));

    let engine = ctx.engine(Arc::new(mailer));
    engine
        .create_workflow(
            ctx.workspace.id,
            workflow(
                "Thank you",
                on_task_done(),
                vec![Action::send_email("Thanks, {{client_name}}", "{{task_title}} is done").into()],
            ),
        )
        .await
        .unwrap();

    let executions = engine.trigger_workflows(&task_done(&ctx)).await.unwrap();

    assert!(executions[0].result.action_results[0].success);
    assert!(ctx.store.outbox_entries().await.is_empty());
}

#[tokio::test]
async fn test_failed_delivery_is_queued_in_outbox() {
    let ctx = TestContext::new().await;
    let mut mailer = MockMailSender::new();
    mailer
        .expect_send_email()
        .returning(|_, _, _| Err(MailError::NotConfigured));

    let engine = ctx.engine(Arc::new(mailer));
    engine
        .create_workflow(
            ctx.workspace.id,
            workflow("Notify", on_task_done(), vec![Action::send_email("Hi", "Body").into()]),
        )
        .await
        .unwrap();

    let executions = engine.trigger_workflows(&task_done(&ctx)).await.unwrap();

    assert!(!executions[0].result.action_results[0].success);
    let queued = ctx.store.outbox_entries().await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].status, OutboxStatus::Pending);
    assert_eq!(queued[0].max_attempts, 3);
}

#[tokio::test]
async fn test_move_card_and_chat_message() {
    let ctx = TestContext::new().await;
    let card = BoardCard {
        id: Uuid::new_v4(),
        workspace_id: ctx.workspace.id,
        board_id: Uuid::new_v4(),
        column_name: "Lead".to_string(),
        title: ctx.client.name.clone(),
        client_id: Some(ctx.client.id),
        position: 0,
        updated_at: Utc::now(),
    };
    ctx.store.add_card(card.clone()).await;

    let engine = ctx.engine(Arc::new(accepting_mailer()));
    engine
        .create_workflow(
            ctx.workspace.id,
            workflow(
                "Won",
                Trigger::InvoicePaid(InvoicePaidFilter::default()),
                vec![
                    Action::move_card("Won").into(),
                    Action::send_chat_message("Payment for {{invoice_number}} received").into(),
                ],
            ),
        )
        .await
        .unwrap();

    let mut payload = EventData::new();
    payload.insert("card_id".to_string(), json!(card.id));
    payload.insert("client_id".to_string(), json!(ctx.client.id));
    payload.insert("invoice_number".to_string(), json!("INV-7"));
    let event = TriggerEvent::new(ctx.workspace.id, TriggerType::InvoicePaid, payload, EventSource::System);

    let executions = engine.trigger_workflows(&event).await.unwrap();

    assert!(executions[0].result.action_results.iter().all(|o| o.success));
    assert_eq!(ctx.store.card(card.id).await.map(|c| c.column_name), Some("Won".to_string()));
    let messages = ctx.store.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body, "Payment for INV-7 received");
}

#[tokio::test]
async fn test_stored_unknown_action_fails_only_that_step() {
    let ctx = TestContext::new().await;
    let stored = WorkflowDefinition {
        id: Uuid::new_v4(),
        workspace_id: ctx.workspace.id,
        name: "Legacy".to_string(),
        description: None,
        trigger: on_task_done(),
        actions: vec![
            ActionStep::Unrecognized(UnrecognizedAction {
                action_type: "send_fax".to_string(),
                config: json!({}),
            }),
            Action::create_task("Still runs").into(),
        ],
        enabled: true,
        created_at: Utc::now(),
    };
    ctx.store.insert_workflow(&stored).await.unwrap();

    let engine = ctx.engine(Arc::new(DisabledMailer));
    let executions = engine.trigger_workflows(&task_done(&ctx)).await.unwrap();

    let outcomes = &executions[0].result.action_results;
    assert!(!outcomes[0].success);
    assert_eq!(outcomes[0].action_type, "send_fax");
    assert!(outcomes[1].success);
}

#[tokio::test]
async fn test_missing_workspace_fails_the_whole_run() {
    let ctx = TestContext::new().await;
    let orphan = Uuid::new_v4();
    let engine = ctx.engine(Arc::new(DisabledMailer));
    engine
        .create_workflow(orphan, workflow("Orphan", on_task_done(), vec![Action::create_task("x").into()]))
        .await
        .unwrap();

    let event = TriggerEvent::task_completed(orphan, Uuid::new_v4(), "t", None, Uuid::new_v4());
    let executions = engine.trigger_workflows(&event).await.unwrap();

    assert_eq!(executions[0].status, ExecutionStatus::Failed);
    assert!(executions[0].error_message.is_some());
    assert!(ctx.store.tasks().await.is_empty());
}

#[tokio::test]
async fn test_history_is_newest_first() {
    let ctx = TestContext::new().await;
    let engine = ctx.engine(Arc::new(DisabledMailer));
    let definition = engine
        .create_workflow(
            ctx.workspace.id,
            workflow("Twice", on_task_done(), vec![Action::create_task("x").into()]),
        )
        .await
        .unwrap();

    let first = engine.trigger_workflows(&task_done(&ctx)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = engine.trigger_workflows(&task_done(&ctx)).await.unwrap();

    let history = engine
        .execution_history(ctx.workspace.id, Some(definition.id), 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second[0].id);
    assert_eq!(history[1].id, first[0].id);

    let limited = engine.execution_history(ctx.workspace.id, None, 0).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn test_create_rejects_workflow_without_actions() {
    let ctx = TestContext::new().await;
    let engine = ctx.engine(Arc::new(DisabledMailer));

    let attempt = engine
        .create_workflow(ctx.workspace.id, workflow("Empty", on_task_done(), vec![]))
        .await;

    assert!(attempt.is_err());
    assert!(engine.list_workflows(ctx.workspace.id).await.unwrap().is_empty());
}
