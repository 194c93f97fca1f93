mod common;

use collections_service::models::{Channel, PlanTier, ReminderStatus};
use collections_service::services::{MemoryStore, MockBehavior, ProviderError};
use collections_service::CollectionsError;
use common::{date, dispatch_config, FlakyReminderStore, Harness};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const EMAIL_BODY: &str = "Hi {{customerName}}, {{amount}} {{currency}} for {{invoiceNumber}} \
was due on {{dueDate}}. Regards, {{userName}} at {{companyName}}. {{unknown}}";

#[tokio::test]
async fn test_email_reminder_renders_template() {
    let h = Harness::on(date(2024, 3, 20)).await;
    let customer = h.customer(Some("ravi@example.com"), None).await;
    let debt = h.debt(&customer, "1500.00", date(2024, 3, 10)).await;
    let template = h.template(Channel::Email, EMAIL_BODY, true).await;

    let reminder = h
        .engine()
        .send_reminder(h.user_id, debt.debt_id, Channel::Email, None)
        .await
        .unwrap();
    assert_eq!(reminder.status, ReminderStatus::Sent);
    assert_eq!(reminder.template_id, template.template_id);
    assert_eq!(reminder.offset_days, None);
    assert!(reminder.provider_message_id.is_some());

    let sent = h.email.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ravi@example.com");
    assert_eq!(sent[0].subject.as_deref(), Some("Invoice INV-042"));
    assert_eq!(
        sent[0].body,
        "Hi Ravi Kumar, 1500 INR for INV-042 was due on 10/03/2024. \
Regards, Asha at Acme Traders. {{unknown}}"
    );

    let logged = h
        .engine()
        .list_reminders(h.user_id, debt.debt_id)
        .await
        .unwrap();
    assert_eq!(logged, vec![reminder]);
}

#[tokio::test]
async fn test_missing_template_is_refused_before_sending() {
    let h = Harness::on(date(2024, 3, 20)).await;
    let customer = h.customer(Some("ravi@example.com"), Some("+919800000001")).await;
    let debt = h.debt(&customer, "100", date(2024, 3, 10)).await;
    let whatsapp = h.template(Channel::Whatsapp, "Pay {{amount}}", false).await;

    let none = h
        .engine()
        .send_reminder(h.user_id, debt.debt_id, Channel::Email, None)
        .await;
    assert!(matches!(none, Err(CollectionsError::NoTemplateConfigured { .. })));

    let wrong_channel = h
        .engine()
        .send_reminder(
            h.user_id,
            debt.debt_id,
            Channel::Email,
            Some(whatsapp.template_id),
        )
        .await;
    assert!(matches!(
        wrong_channel,
        Err(CollectionsError::NoTemplateConfigured { .. })
    ));
    assert_eq!(h.email.send_count(), 0);
}

#[tokio::test]
async fn test_whatsapp_without_phone_consumes_nothing() {
    let h = Harness::on(date(2024, 3, 20)).await;
    h.set_plan(PlanTier::Basic, None).await;
    let customer = h.customer(Some("ravi@example.com"), Some("   ")).await;
    let debt = h.debt(&customer, "100", date(2024, 3, 10)).await;
    h.template(Channel::Whatsapp, "Pay {{amount}}", true).await;

    let result = h
        .engine()
        .send_reminder(h.user_id, debt.debt_id, Channel::Whatsapp, None)
        .await;
    assert!(matches!(result, Err(CollectionsError::MissingRecipient { .. })));

    assert_eq!(h.whatsapp.send_count(), 0);
    assert!(h
        .engine()
        .list_reminders(h.user_id, debt.debt_id)
        .await
        .unwrap()
        .is_empty());
    let quota = h.engine().quota_status(h.user_id).await.unwrap();
    assert_eq!(quota.whatsapp_used, 0);
    assert_eq!(quota.whatsapp_reserved, 0);
}

#[tokio::test]
async fn test_free_plan_cannot_send_whatsapp() {
    let h = Harness::on(date(2024, 3, 20)).await;
    h.set_plan(PlanTier::Free, Some(50)).await;
    let customer = h.customer(None, Some("+919800000001")).await;
    let debt = h.debt(&customer, "100", date(2024, 3, 10)).await;
    h.template(Channel::Whatsapp, "Pay {{amount}}", true).await;

    let result = h
        .engine()
        .send_reminder(h.user_id, debt.debt_id, Channel::Whatsapp, None)
        .await;
    assert!(matches!(result, Err(CollectionsError::PlanNotEligible { .. })));
    assert_eq!(h.whatsapp.send_count(), 0);
}

#[tokio::test]
async fn test_email_is_not_metered_on_free_plan() {
    let h = Harness::on(date(2024, 3, 20)).await;
    let customer = h.customer(Some("ravi@example.com"), None).await;
    let debt = h.debt(&customer, "100", date(2024, 3, 10)).await;
    h.template(Channel::Email, "Pay {{amount}}", true).await;

    for _ in 0..3 {
        h.engine()
            .send_reminder(h.user_id, debt.debt_id, Channel::Email, None)
            .await
            .unwrap();
    }
    let quota = h.engine().quota_status(h.user_id).await.unwrap();
    assert!(quota.email_unmetered);
    assert_eq!(quota.whatsapp_used, 0);
}

#[tokio::test]
async fn test_whatsapp_quota_limit_is_enforced() {
    let h = Harness::on(date(2024, 3, 20)).await;
    h.set_plan(PlanTier::Basic, Some(2)).await;
    let customer = h.customer(None, Some("+919800000001")).await;
    let debt = h.debt(&customer, "100", date(2024, 3, 10)).await;
    h.template(Channel::Whatsapp, "Pay {{amount}}", true).await;

    for _ in 0..2 {
        h.engine()
            .send_reminder(h.user_id, debt.debt_id, Channel::Whatsapp, None)
            .await
            .unwrap();
    }
    let third = h
        .engine()
        .send_reminder(h.user_id, debt.debt_id, Channel::Whatsapp, None)
        .await;
    assert!(matches!(third, Err(CollectionsError::QuotaExceeded { limit: 2 })));

    let quota = h.engine().quota_status(h.user_id).await.unwrap();
    assert_eq!(quota.whatsapp_limit, 2);
    assert_eq!(quota.whatsapp_used, 2);
    assert_eq!(quota.whatsapp_remaining, 0);
    assert_eq!(h.whatsapp.send_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_share_last_quota_slot() {
    let h = Arc::new(Harness::on(date(2024, 3, 20)).await);
    h.set_plan(PlanTier::Pro, Some(1)).await;
    let customer = h.customer(None, Some("+919800000001")).await;
    h.template(Channel::Whatsapp, "Pay {{amount}}", true).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let debt = h.debt(&customer, "100", date(2024, 3, 10)).await;
        let h = h.clone();
        handles.push(tokio::spawn(async move {
            h.engine()
                .send_reminder(h.user_id, debt.debt_id, Channel::Whatsapp, None)
                .await
        }));
    }

    let mut sent = 0;
    let mut denied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => sent += 1,
            Err(CollectionsError::QuotaExceeded { .. }) => denied += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(sent, 1);
    assert_eq!(denied, 7);
    assert_eq!(h.whatsapp.send_count(), 1);

    let quota = h.engine().quota_status(h.user_id).await.unwrap();
    assert_eq!(quota.whatsapp_used, 1);
    assert_eq!(quota.whatsapp_reserved, 0);
}

#[tokio::test]
async fn test_failed_send_is_logged_and_releases_quota() {
    let h = Harness::on(date(2024, 3, 20)).await;
    h.set_plan(PlanTier::Basic, None).await;
    let customer = h.customer(None, Some("+919800000001")).await;
    let debt = h.debt(&customer, "100", date(2024, 3, 10)).await;
    h.template(Channel::Whatsapp, "Pay {{amount}}", true).await;
    h.whatsapp.set_behavior(MockBehavior::Fail);

    let result = h
        .engine()
        .send_reminder(h.user_id, debt.debt_id, Channel::Whatsapp, None)
        .await;
    let reminder_id = match result {
        Err(CollectionsError::SendFailed { reminder_id, .. }) => reminder_id,
        other => panic!("expected SendFailed, got {:?}", other),
    };

    let logged = h
        .engine()
        .list_reminders(h.user_id, debt.debt_id)
        .await
        .unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].reminder_id, reminder_id);
    assert_eq!(logged[0].status, ReminderStatus::Failed);
    assert!(logged[0].error_message.is_some());

    let quota = h.engine().quota_status(h.user_id).await.unwrap();
    assert_eq!(quota.whatsapp_used, 0);
    assert_eq!(quota.whatsapp_reserved, 0);
}

#[tokio::test]
async fn test_hung_provider_times_out() {
    let h = Harness::with_timeout(date(2024, 3, 20), Duration::from_millis(50)).await;
    let customer = h.customer(Some("ravi@example.com"), None).await;
    let debt = h.debt(&customer, "100", date(2024, 3, 10)).await;
    h.template(Channel::Email, "Pay {{amount}}", true).await;
    h.email.set_behavior(MockBehavior::Hang(Duration::from_secs(5)));

    let result = h
        .engine()
        .send_reminder(h.user_id, debt.debt_id, Channel::Email, None)
        .await;
    assert!(matches!(
        result,
        Err(CollectionsError::SendFailed {
            source: ProviderError::Timeout(_),
            ..
        })
    ));

    let logged = h
        .engine()
        .list_reminders(h.user_id, debt.debt_id)
        .await
        .unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].status, ReminderStatus::Failed);
}

#[tokio::test]
async fn test_delivery_confirmation() {
    let h = Harness::on(date(2024, 3, 20)).await;
    let customer = h.customer(Some("ravi@example.com"), None).await;
    let debt = h.debt(&customer, "100", date(2024, 3, 10)).await;
    h.template(Channel::Email, "Pay {{amount}}", true).await;

    let sent = h
        .engine()
        .send_reminder(h.user_id, debt.debt_id, Channel::Email, None)
        .await
        .unwrap();
    let delivered = h
        .engine()
        .mark_reminder_delivered(h.user_id, sent.reminder_id)
        .await
        .unwrap();
    assert_eq!(delivered.status, ReminderStatus::Delivered);
    let again = h
        .engine()
        .mark_reminder_delivered(h.user_id, sent.reminder_id)
        .await
        .unwrap();
    assert_eq!(again.status, ReminderStatus::Delivered);

    h.email.set_behavior(MockBehavior::Fail);
    let failed_id = match h
        .engine()
        .send_reminder(h.user_id, debt.debt_id, Channel::Email, None)
        .await
    {
        Err(CollectionsError::SendFailed { reminder_id, .. }) => reminder_id,
        other => panic!("expected SendFailed, got {:?}", other),
    };
    let conflict = h
        .engine()
        .mark_reminder_delivered(h.user_id, failed_id)
        .await;
    assert!(matches!(conflict, Err(CollectionsError::Conflict(_))));

    let missing = h
        .engine()
        .mark_reminder_delivered(h.user_id, uuid::Uuid::new_v4())
        .await;
    assert!(matches!(missing, Err(CollectionsError::NotFound(_))));
}

#[tokio::test]
async fn test_monthly_reset_clears_usage() {
    let h = Harness::on(date(2024, 3, 20)).await;
    h.set_plan(PlanTier::Basic, None).await;
    let customer = h.customer(None, Some("+919800000001")).await;
    let debt = h.debt(&customer, "100", date(2024, 3, 10)).await;
    h.template(Channel::Whatsapp, "Pay {{amount}}", true).await;

    h.engine()
        .send_reminder(h.user_id, debt.debt_id, Channel::Whatsapp, None)
        .await
        .unwrap();
    assert_eq!(
        h.engine().quota_status(h.user_id).await.unwrap().whatsapp_used,
        1
    );

    let reset = h.engine().reset_quotas().await.unwrap();
    assert!(reset >= 1);

    let quota = h.engine().quota_status(h.user_id).await.unwrap();
    assert_eq!(quota.period, "2024-03");
    assert_eq!(quota.whatsapp_used, 0);
    assert_eq!(quota.whatsapp_remaining, 100);
}

#[tokio::test]
async fn test_unusable_date_format_falls_back_to_iso() {
    let h = Harness::with_config(
        date(2024, 3, 20),
        dispatch_config(Duration::from_secs(5), "%Q"),
    )
    .await;
    let customer = h.customer(Some("ravi@example.com"), None).await;
    let debt = h.debt(&customer, "100", date(2024, 3, 10)).await;
    h.template(Channel::Email, "Due {{dueDate}}", true).await;

    let reminder = h
        .engine()
        .send_reminder(h.user_id, debt.debt_id, Channel::Email, None)
        .await
        .unwrap();
    assert_eq!(reminder.status, ReminderStatus::Sent);
    assert_eq!(h.email.sent_messages()[0].body, "Due 2024-03-10");
}

#[tokio::test]
async fn test_sent_reminder_log_is_retried_once() {
    let memory = Arc::new(MemoryStore::new());
    let flaky = Arc::new(FlakyReminderStore::new(memory.clone()));
    let h = Harness::build(
        date(2024, 3, 20),
        dispatch_config(Duration::from_secs(5), "%d/%m/%Y"),
        memory,
        flaky.clone(),
    )
    .await;
    h.set_plan(PlanTier::Basic, None).await;
    let customer = h.customer(None, Some("+919800000001")).await;
    let debt = h.debt(&customer, "100", date(2024, 3, 10)).await;
    h.template(Channel::Whatsapp, "Pay {{amount}}", true).await;

    flaky.fail_next_inserts(1);
    let reminder = h
        .engine()
        .send_reminder(h.user_id, debt.debt_id, Channel::Whatsapp, None)
        .await
        .unwrap();
    assert_eq!(flaky.insert_attempts.load(Ordering::SeqCst), 2);
    let logged = h
        .engine()
        .list_reminders(h.user_id, debt.debt_id)
        .await
        .unwrap();
    assert_eq!(logged, vec![reminder]);

    flaky.fail_next_inserts(2);
    let lost = h
        .engine()
        .send_reminder(h.user_id, debt.debt_id, Channel::Whatsapp, None)
        .await;
    assert!(matches!(lost, Err(CollectionsError::Storage(_))));
    assert_eq!(flaky.insert_attempts.load(Ordering::SeqCst), 4);

    // The provider accepted both messages, so both count against the plan.
    assert_eq!(h.whatsapp.send_count(), 2);
    let quota = h.engine().quota_status(h.user_id).await.unwrap();
    assert_eq!(quota.whatsapp_used, 2);
    assert_eq!(quota.whatsapp_reserved, 0);
}
