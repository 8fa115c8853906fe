//! Payment lifecycle against in-memory stores: checkout, capture through the
//! gateway webhook, partial and full refunds, saved cards.

mod support;

use std::str::FromStr;

use bigdecimal::BigDecimal;
use support::{charge_success_body, dec, sign, Harness, CARD_AUTHORIZATION};
use uuid::Uuid;
use voguevault_payments::database::order_repository::Customer;
use voguevault_payments::error::ErrorCode;
use voguevault_payments::payments::types::GatewayStatus;
use voguevault_payments::services::notification::NotificationType;
use voguevault_payments::services::InitiatePaymentOptions;

struct Checkout {
    payment_id: Uuid,
    reference: String,
    order_id: Uuid,
    customer: Customer,
}

async fn checkout(harness: &Harness, order_number: &str, total: i64) -> Checkout {
    let customer = harness.store.seed_customer("ada@example.com");
    let order = harness.store.seed_order(&customer, order_number, dec(total));

    let (order, customer) = harness
        .orchestrator
        .load_checkout(order.id, customer.id)
        .await
        .unwrap();
    let session = harness
        .orchestrator
        .initiate_payment(&order, &customer, InitiatePaymentOptions::default())
        .await
        .unwrap();

    Checkout {
        payment_id: session.payment_id,
        reference: session.reference,
        order_id: order.id,
        customer,
    }
}

#[tokio::test]
async fn test_checkout_capture_and_refund_lifecycle() {
    let harness = Harness::new();
    let Checkout { payment_id, reference, order_id, .. } = checkout(&harness, "ORD-1", 5000).await;

    assert!(reference.starts_with("ORD-1_"));
    let pending = harness.store.payment(payment_id);
    assert_eq!(pending.status, "pending");
    assert_eq!(pending.payment_method, "paystack");
    assert!(pending.paystack_authorization_url.is_some());

    // Gateway confirms through the webhook
    let body = charge_success_body(&reference, 1001, 500_000);
    let outcome = harness
        .processor
        .process_webhook(&body, Some(&sign(&body)))
        .await
        .unwrap();
    assert!(!outcome.duplicate);
    assert_eq!(outcome.payment_id, Some(payment_id));

    let captured = harness.store.payment(payment_id);
    assert_eq!(captured.status, "captured");
    assert_eq!(captured.paystack_transaction_id.as_deref(), Some("4099260516"));
    assert_eq!(captured.card_last4.as_deref(), Some("4081"));
    assert!(captured.paid_at.is_some());
    assert_eq!(harness.store.order(order_id).payment_status, "paid");

    let methods = harness.store.methods();
    assert_eq!(methods.len(), 1);
    assert!(methods[0].is_default);

    // Partial refund
    let first = harness
        .orchestrator
        .process_refund(payment_id, dec(2000), Some("damaged item".to_string()), None)
        .await
        .unwrap();
    assert_eq!(first.payment.status, "partially_refunded");
    assert_eq!(first.payment.refunded_amount, dec(2000));
    assert_eq!(first.refund.status, "processed");
    assert!(first.refund.refund_reference.starts_with(&format!("REF_{}_", payment_id)));
    assert!(!first.order_refunded);
    assert_eq!(harness.store.order(order_id).payment_status, "paid");

    // Over the remaining balance
    let err = harness
        .orchestrator
        .process_refund(payment_id, dec(3001), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::RefundExceedsBalance);
    assert_eq!(err.status_code(), 400);

    // Remainder
    let second = harness
        .orchestrator
        .process_refund(payment_id, dec(3000), None, None)
        .await
        .unwrap();
    assert_eq!(second.payment.status, "refunded");
    assert_eq!(second.payment.refunded_amount, dec(5000));
    assert!(second.order_refunded);
    assert_eq!(harness.store.order(order_id).payment_status, "refunded");

    let calls = harness.gateway.refund_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], ("4099260516".to_string(), Some(dec(2000))));

    let kinds: Vec<_> = harness
        .notifier
        .sent()
        .into_iter()
        .map(|n| n.notification_type)
        .collect();
    assert_eq!(
        kinds,
        vec![
            NotificationType::PaymentConfirmation,
            NotificationType::RefundProcessed,
            NotificationType::RefundProcessed,
        ]
    );
}

#[tokio::test]
async fn test_verification_is_idempotent() {
    let harness = Harness::new();
    let Checkout { payment_id, reference, .. } = checkout(&harness, "ORD-2", 1500).await;

    let first = harness
        .orchestrator
        .handle_successful_payment(&reference)
        .await
        .unwrap();
    assert!(!first.already_captured);
    assert!(first.payment_method_saved);

    let second = harness
        .orchestrator
        .handle_successful_payment(&reference)
        .await
        .unwrap();
    assert!(second.already_captured);
    assert_eq!(second.payment.id, payment_id);
    assert_eq!(second.payment.status, "captured");

    assert_eq!(harness.notifier.sent().len(), 1);
    assert_eq!(harness.store.methods().len(), 1);
}

#[tokio::test]
async fn test_underpaid_transaction_is_not_captured() {
    let harness = Harness::new();
    let Checkout { payment_id, reference, order_id, .. } = checkout(&harness, "ORD-3", 5000).await;
    harness.gateway.verify_amount(dec(4000));

    let err = harness
        .orchestrator
        .handle_successful_payment(&reference)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::AmountMismatch);
    assert_eq!(err.status_code(), 409);
    assert_eq!(harness.store.payment(payment_id).status, "pending");
    assert_eq!(harness.store.order(order_id).payment_status, "pending");
}

#[tokio::test]
async fn test_unsuccessful_verification_leaves_payment_pending() {
    let harness = Harness::new();
    let Checkout { payment_id, reference, .. } = checkout(&harness, "ORD-4", 800).await;
    harness.gateway.verify_reports(GatewayStatus::Abandoned);

    let err = harness
        .orchestrator
        .handle_successful_payment(&reference)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 502);
    assert_eq!(harness.store.payment(payment_id).status, "pending");
}

#[tokio::test]
async fn test_paid_order_cannot_be_checked_out_again() {
    let harness = Harness::new();
    let Checkout { reference, order_id, .. } = checkout(&harness, "ORD-5", 1200).await;
    harness
        .orchestrator
        .handle_successful_payment(&reference)
        .await
        .unwrap();

    let order = harness.store.order(order_id);
    let (_, customer) = harness
        .orchestrator
        .load_checkout(order_id, order.user_id)
        .await
        .unwrap();
    let err = harness
        .orchestrator
        .initiate_payment(&order, &customer, InitiatePaymentOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::OrderAlreadyPaid);
}

#[tokio::test]
async fn test_gateway_refusal_marks_payment_failed() {
    let harness = Harness::new();
    harness.gateway.fail_initialize();
    let customer = harness.store.seed_customer("ada@example.com");
    let order = harness.store.seed_order(&customer, "ORD-6", dec(900));

    let err = harness
        .orchestrator
        .initiate_payment(&order, &customer, InitiatePaymentOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 502);

    let payments = harness.store.payments();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, "failed");
}

#[tokio::test]
async fn test_checkout_of_foreign_order_is_forbidden() {
    let harness = Harness::new();
    let owner = harness.store.seed_customer("owner@example.com");
    let intruder = harness.store.seed_customer("intruder@example.com");
    let order = harness.store.seed_order(&owner, "ORD-7", dec(1000));

    let err = harness
        .orchestrator
        .load_checkout(order.id, intruder.id)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 403);
}

#[tokio::test]
async fn test_refund_rejected_by_gateway_releases_balance() {
    let harness = Harness::new();
    let Checkout { payment_id, reference, .. } = checkout(&harness, "ORD-8", 5000).await;
    harness
        .orchestrator
        .handle_successful_payment(&reference)
        .await
        .unwrap();

    harness.gateway.fail_refunds();
    let err = harness
        .orchestrator
        .process_refund(payment_id, dec(5000), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 502);

    let refunds = harness.store.refunds();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].status, "failed");
    assert!(refunds[0].error_message.is_some());

    let payment = harness.store.payment(payment_id);
    assert_eq!(payment.status, "captured");
    assert_eq!(payment.refunded_amount, dec(0));
}

#[tokio::test]
async fn test_refund_of_pending_payment_is_rejected() {
    let harness = Harness::new();
    let Checkout { payment_id, .. } = checkout(&harness, "ORD-9", 5000).await;

    let err = harness
        .orchestrator
        .process_refund(payment_id, dec(100), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidPaymentState);
    assert!(harness.gateway.refund_calls().is_empty());
}

#[tokio::test]
async fn test_refund_amount_must_be_whole_kobo() {
    let harness = Harness::new();
    let Checkout { payment_id, reference, .. } = checkout(&harness, "ORD-10", 5000).await;
    harness
        .orchestrator
        .handle_successful_payment(&reference)
        .await
        .unwrap();

    let err = harness
        .orchestrator
        .process_refund(payment_id, BigDecimal::from_str("10.005").unwrap(), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_failure_notice_after_capture_is_ignored() {
    let harness = Harness::new();
    let Checkout { payment_id, reference, .. } = checkout(&harness, "ORD-11", 700).await;
    harness
        .orchestrator
        .handle_successful_payment(&reference)
        .await
        .unwrap();

    let payment = harness
        .orchestrator
        .handle_failed_payment(&reference, "Declined")
        .await
        .unwrap();
    assert_eq!(payment.id, payment_id);
    assert_eq!(harness.store.payment(payment_id).status, "captured");
}

#[tokio::test]
async fn test_saved_card_charge_for_order() {
    let harness = Harness::new();
    let first = checkout(&harness, "ORD-12", 2500).await;
    harness
        .orchestrator
        .handle_successful_payment(&first.reference)
        .await
        .unwrap();
    let customer_id = first.customer.id;
    let second_order = harness.store.seed_order(&first.customer, "ORD-13", dec(1800));

    let charge = harness
        .orchestrator
        .charge_saved_card(customer_id, CARD_AUTHORIZATION, dec(1800), Some(second_order.id))
        .await
        .unwrap();
    assert_eq!(charge.status, GatewayStatus::Success);
    assert!(charge.reference.starts_with(&format!("charge_{}_", customer_id)));

    let payment = charge.payment.expect("order charge records a payment");
    assert_eq!(payment.status, "captured");
    assert_eq!(payment.payment_method, "saved_card");
    assert_eq!(harness.store.order(second_order.id).payment_status, "paid");
}

#[tokio::test]
async fn test_declined_saved_card_marks_payment_failed() {
    let harness = Harness::new();
    let first = checkout(&harness, "ORD-14", 2500).await;
    harness
        .orchestrator
        .handle_successful_payment(&first.reference)
        .await
        .unwrap();
    let customer_id = first.customer.id;
    let next_order = harness.store.seed_order(&first.customer, "ORD-15", dec(600));

    harness.gateway.charge_reports(GatewayStatus::Failed);
    let err = harness
        .orchestrator
        .charge_saved_card(customer_id, CARD_AUTHORIZATION, dec(600), Some(next_order.id))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::PaymentProviderError);
    assert_eq!(err.status_code(), 502);

    let payment = harness
        .store
        .payments()
        .into_iter()
        .find(|p| p.order_id == next_order.id)
        .expect("declined charge still records a payment");
    assert_eq!(payment.status, "failed");
    assert_eq!(payment.failure_reason.as_deref(), Some("Declined"));
    assert_eq!(harness.store.order(next_order.id).payment_status, "pending");
}

#[tokio::test]
async fn test_pending_saved_card_charge_is_an_error() {
    let harness = Harness::new();
    let first = checkout(&harness, "ORD-16", 2500).await;
    harness
        .orchestrator
        .handle_successful_payment(&first.reference)
        .await
        .unwrap();

    harness.gateway.charge_reports(GatewayStatus::Pending);
    let err = harness
        .orchestrator
        .charge_saved_card(first.customer.id, CARD_AUTHORIZATION, dec(700), None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::PaymentProviderError);
}

#[tokio::test]
async fn test_saved_card_charge_must_cover_order_total() {
    let harness = Harness::new();
    let first = checkout(&harness, "ORD-12", 2500).await;
    harness
        .orchestrator
        .handle_successful_payment(&first.reference)
        .await
        .unwrap();
    let order = harness.store.seed_order(&first.customer, "ORD-13", dec(5000));

    let err = harness
        .orchestrator
        .charge_saved_card(first.customer.id, CARD_AUTHORIZATION, dec(1), Some(order.id))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert_eq!(harness.store.order(order.id).payment_status, "pending");
    assert!(harness.store.payments().iter().all(|p| p.order_id != order.id));
}

#[tokio::test]
async fn test_unknown_saved_card_is_not_found() {
    let harness = Harness::new();
    let customer = harness.store.seed_customer("ada@example.com");

    let err = harness
        .orchestrator
        .charge_saved_card(customer.id, "AUTH_missing99", dec(100), None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::PaymentMethodNotFound);
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_default_payment_method_switches() {
    use voguevault_payments::database::repository::{NewPaymentMethod, PaymentMethodStore};

    let harness = Harness::new();
    let customer = harness.store.seed_customer("ada@example.com");
    let card = |code: &str| NewPaymentMethod {
        customer_id: customer.id,
        authorization_code: code.to_string(),
        customer_code: None,
        card_last4: Some("1111".to_string()),
        card_type: Some("visa".to_string()),
        card_exp_month: None,
        card_exp_year: None,
        card_bank: None,
        channel: Some("card".to_string()),
    };

    let first = harness.store.save_payment_method(card("AUTH_first001")).await.unwrap();
    let second = harness.store.save_payment_method(card("AUTH_second02")).await.unwrap();
    assert!(first.is_default);
    assert!(!second.is_default);

    let updated = harness
        .orchestrator
        .set_default_payment_method(customer.id, second.id)
        .await
        .unwrap();
    assert!(updated.is_default);

    let methods = harness.orchestrator.payment_methods(customer.id).await.unwrap();
    assert_eq!(methods.iter().filter(|m| m.is_default).count(), 1);
    assert_eq!(methods[0].id, second.id);

    let err = harness
        .orchestrator
        .set_default_payment_method(customer.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
}
