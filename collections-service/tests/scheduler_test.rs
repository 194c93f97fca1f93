mod common;

use collections_service::models::{
    Channel, DebtStatus, PlanTier, ReminderStatus, UpdateReminderSettings,
};
use collections_service::services::MockBehavior;
use collections_service::CollectionsError;
use common::{date, Harness};

#[tokio::test]
async fn test_offsets_fire_once_on_their_dates() {
    let h = Harness::on(date(2024, 3, 3)).await;
    let customer = h.customer(Some("ravi@example.com"), None).await;
    let debt = h.debt(&customer, "1000", date(2024, 3, 10)).await;
    h.template(Channel::Email, "Reminder for {{invoiceNumber}}", true)
        .await;
    h.enable_reminders(Channel::Email, vec![3, -7, -1]).await;

    let first = h.engine().run_tick().await.unwrap();
    assert_eq!(first.date, Some(date(2024, 3, 3)));
    assert_eq!(first.users, 1);
    assert_eq!(first.debts_considered, 1);
    assert_eq!(first.sent.len(), 1);
    assert_eq!(first.sent[0].offset_days, -7);
    assert_eq!(first.sent[0].debt_id, debt.debt_id);

    let rerun = h.engine().run_tick().await.unwrap();
    assert!(rerun.sent.is_empty());
    assert_eq!(rerun.skipped_already_sent, 1);

    h.clock.set_date(date(2024, 3, 9));
    let day_before = h.engine().run_tick().await.unwrap();
    assert_eq!(day_before.sent.len(), 1);
    assert_eq!(day_before.sent[0].offset_days, -1);

    h.clock.set_date(date(2024, 3, 10));
    let due_day = h.engine().run_tick().await.unwrap();
    assert!(due_day.sent.is_empty());
    assert_eq!(due_day.skipped_already_sent, 0);

    h.clock.set_date(date(2024, 3, 13));
    let after = h.engine().run_tick().await.unwrap();
    assert_eq!(after.sent.len(), 1);
    assert_eq!(after.sent[0].offset_days, 3);
    assert_eq!(after.status_changes, 1);

    let overdue = h.engine().get_debt(h.user_id, debt.debt_id).await.unwrap();
    assert_eq!(overdue.status, DebtStatus::Overdue);

    let mut offsets: Vec<_> = h
        .engine()
        .list_reminders(h.user_id, debt.debt_id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.offset_days)
        .collect();
    offsets.sort();
    assert_eq!(offsets, vec![Some(-7), Some(-1), Some(3)]);
    assert_eq!(h.email.send_count(), 3);
}

#[tokio::test]
async fn test_manual_send_does_not_block_scheduled_offset() {
    let h = Harness::on(date(2024, 3, 9)).await;
    let customer = h.customer(Some("ravi@example.com"), None).await;
    let debt = h.debt(&customer, "1000", date(2024, 3, 10)).await;
    h.template(Channel::Email, "Reminder", true).await;
    h.enable_reminders(Channel::Email, vec![-1]).await;

    h.engine()
        .send_reminder(h.user_id, debt.debt_id, Channel::Email, None)
        .await
        .unwrap();
    let report = h.engine().run_tick().await.unwrap();
    assert_eq!(report.sent.len(), 1);
}

#[tokio::test]
async fn test_disabled_settings_and_paid_debts_are_skipped() {
    let h = Harness::on(date(2024, 3, 9)).await;
    let customer = h.customer(Some("ravi@example.com"), None).await;
    let paid = h.debt(&customer, "1000", date(2024, 3, 10)).await;
    h.template(Channel::Email, "Reminder", true).await;

    let nothing = h.engine().run_tick().await.unwrap();
    assert_eq!(nothing.users, 0);
    assert!(nothing.sent.is_empty());

    h.enable_reminders(Channel::Email, vec![-1]).await;
    h.engine()
        .mark_paid(h.user_id, paid.debt_id, None)
        .await
        .unwrap();
    let report = h.engine().run_tick().await.unwrap();
    assert_eq!(report.users, 1);
    assert!(report.sent.is_empty());
    assert_eq!(h.email.send_count(), 0);
}

#[tokio::test]
async fn test_quota_refusals_are_reported_without_reminders() {
    let h = Harness::on(date(2024, 3, 9)).await;
    h.set_plan(PlanTier::Free, None).await;
    let customer = h.customer(None, Some("+919800000001")).await;
    let debt = h.debt(&customer, "1000", date(2024, 3, 10)).await;
    h.template(Channel::Whatsapp, "Reminder", true).await;
    h.enable_reminders(Channel::Whatsapp, vec![-1]).await;

    let report = h.engine().run_tick().await.unwrap();
    assert!(report.sent.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(report.quota_denied.len(), 1);
    assert_eq!(report.quota_denied[0].code, "plan_not_eligible");
    assert_eq!(report.quota_denied[0].reminder_id, None);
    assert!(h
        .engine()
        .list_reminders(h.user_id, debt.debt_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_failed_offset_is_retried_on_next_tick() {
    let h = Harness::on(date(2024, 3, 9)).await;
    let customer = h.customer(Some("ravi@example.com"), None).await;
    let debt = h.debt(&customer, "1000", date(2024, 3, 10)).await;
    h.template(Channel::Email, "Reminder", true).await;
    h.enable_reminders(Channel::Email, vec![-1]).await;
    h.email.set_behavior(MockBehavior::Fail);

    let failed = h.engine().run_tick().await.unwrap();
    assert!(failed.sent.is_empty());
    assert_eq!(failed.failed.len(), 1);
    assert_eq!(failed.failed[0].code, "send_failed");
    assert!(failed.failed[0].reminder_id.is_some());

    h.email.set_behavior(MockBehavior::Succeed);
    let retried = h.engine().run_tick().await.unwrap();
    assert_eq!(retried.sent.len(), 1);
    assert_eq!(retried.skipped_already_sent, 0);

    let statuses: Vec<_> = h
        .engine()
        .list_reminders(h.user_id, debt.debt_id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.status)
        .collect();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.contains(&ReminderStatus::Failed));
    assert!(statuses.contains(&ReminderStatus::Sent));
}

#[tokio::test]
async fn test_missing_recipient_is_a_tick_failure() {
    let h = Harness::on(date(2024, 3, 9)).await;
    let customer = h.customer(None, None).await;
    h.debt(&customer, "1000", date(2024, 3, 10)).await;
    h.template(Channel::Email, "Reminder", true).await;
    h.enable_reminders(Channel::Email, vec![-1]).await;

    let report = h.engine().run_tick().await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].code, "missing_recipient");
    assert_eq!(report.failed[0].reminder_id, None);
}

#[tokio::test]
async fn test_configured_template_overrides_channel_default() {
    let h = Harness::on(date(2024, 3, 9)).await;
    let customer = h.customer(Some("ravi@example.com"), None).await;
    h.debt(&customer, "1000", date(2024, 3, 10)).await;
    h.template(Channel::Email, "Default body", true).await;
    let chosen = h.template(Channel::Email, "Chosen body", false).await;

    h.engine()
        .put_reminder_settings(
            h.user_id,
            UpdateReminderSettings {
                enabled: true,
                reminder_days: vec![-1],
                default_template_id: Some(chosen.template_id),
                default_channel: Channel::Email,
            },
        )
        .await
        .unwrap();

    let report = h.engine().run_tick().await.unwrap();
    assert_eq!(report.sent.len(), 1);
    assert_eq!(h.email.sent_messages()[0].body, "Chosen body");
}

#[tokio::test]
async fn test_settings_reject_template_from_other_channel() {
    let h = Harness::on(date(2024, 3, 9)).await;
    let whatsapp = h.template(Channel::Whatsapp, "Reminder", false).await;

    let wrong = h
        .engine()
        .put_reminder_settings(
            h.user_id,
            UpdateReminderSettings {
                enabled: true,
                reminder_days: vec![-1],
                default_template_id: Some(whatsapp.template_id),
                default_channel: Channel::Email,
            },
        )
        .await;
    assert!(matches!(
        wrong,
        Err(CollectionsError::NoTemplateConfigured { .. })
    ));

    let unknown = h
        .engine()
        .put_reminder_settings(
            h.user_id,
            UpdateReminderSettings {
                enabled: true,
                reminder_days: vec![-1],
                default_template_id: Some(uuid::Uuid::new_v4()),
                default_channel: Channel::Email,
            },
        )
        .await;
    assert!(matches!(unknown, Err(CollectionsError::NotFound(_))));

    let settings = h.engine().reminder_settings(h.user_id).await.unwrap();
    assert!(!settings.enabled);
}

#[tokio::test]
async fn test_tick_marks_overdue_without_reminder_settings() {
    let h = Harness::on(date(2024, 3, 10)).await;
    let customer = h.customer(Some("ravi@example.com"), None).await;
    let debt = h.debt(&customer, "1000", date(2024, 3, 10)).await;
    assert_eq!(debt.status, DebtStatus::Pending);

    h.clock.set_date(date(2024, 4, 10));
    let report = h.engine().run_tick().await.unwrap();
    assert_eq!(report.users, 0);
    assert_eq!(report.debts_considered, 1);
    assert_eq!(report.status_changes, 1);
    assert!(report.sent.is_empty());

    let stored = h.engine().get_debt(h.user_id, debt.debt_id).await.unwrap();
    assert_eq!(stored.status, DebtStatus::Overdue);
    assert_eq!(h.email.send_count(), 0);
}
