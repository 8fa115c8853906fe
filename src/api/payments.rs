//! /api/v1/payments handlers

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::error::{AppError, AppResult, AuthError, ValidationError};
use crate::middleware::error::{
    get_request_id_from_headers, success_response, success_response_with_message, tag_request_id,
};
use crate::services::InitiatePaymentOptions;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct InitializePaymentBody {
    pub order_id: Option<Uuid>,
    pub callback_url: Option<String>,
    pub channels: Option<Vec<String>>,
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
pub struct RefundBody {
    pub amount: Option<BigDecimal>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChargeSavedCardBody {
    pub authorization_code: Option<String>,
    pub amount: Option<BigDecimal>,
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveAccountQuery {
    pub account_number: Option<String>,
    pub bank_code: Option<String>,
}

fn required<T>(value: Option<T>, field: &str) -> AppResult<T> {
    value.ok_or_else(|| {
        AppError::validation(ValidationError::MissingField {
            field: field.to_string(),
        })
    })
}

fn required_text(value: Option<String>, field: &str) -> AppResult<String> {
    required(value.filter(|v| !v.trim().is_empty()), field)
}

/// Owners see their own payments; admins see everything.
fn ensure_owner(user: &AuthUser, owner_id: Uuid) -> AppResult<()> {
    if user.is_admin() || user.user_id == owner_id {
        Ok(())
    } else {
        Err(AppError::auth(AuthError::Forbidden {
            reason: "resource belongs to another customer".to_string(),
        }))
    }
}

/// POST /initialize
pub async fn initialize_payment(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    payload: Result<Json<InitializePaymentBody>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let result: AppResult<_> = async {
        let Json(body) = payload?;
        let order_id = required(body.order_id, "order_id")?;

        let (order, customer) = state
            .orchestrator
            .load_checkout(order_id, user.user_id)
            .await?;
        state
            .orchestrator
            .initiate_payment(
                &order,
                &customer,
                InitiatePaymentOptions {
                    callback_url: body.callback_url,
                    channels: body.channels,
                    metadata: body.metadata,
                },
            )
            .await
    }
    .await;

    let session = result.map_err(tag_request_id(request_id))?;
    Ok((
        StatusCode::CREATED,
        success_response_with_message(session, "Payment initialized"),
    ))
}

/// GET /verify/{reference}
pub async fn verify_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let result: AppResult<_> = async {
        let Path(reference) = path?;
        state.orchestrator.handle_successful_payment(&reference).await
    }
    .await;

    let confirmation = result.map_err(tag_request_id(request_id))?;
    let message = if confirmation.already_captured {
        "Payment already verified"
    } else {
        "Payment verified"
    };
    Ok(success_response_with_message(confirmation, message))
}

/// GET /{payment_id}
pub async fn get_payment(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let result: AppResult<_> = async {
        let Path(payment_id) = path?;
        let details = state.orchestrator.payment(payment_id).await?;
        ensure_owner(&user, details.payment.customer_id)?;
        Ok(details)
    }
    .await;

    Ok(success_response(result.map_err(tag_request_id(request_id))?))
}

/// GET /orders/{order_id}
pub async fn order_payments(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let result: AppResult<_> = async {
        let Path(order_id) = path?;
        let order = state.orchestrator.find_order(order_id).await?;
        ensure_owner(&user, order.user_id)?;
        state.orchestrator.payments_for_order(order_id).await
    }
    .await;

    Ok(success_response(result.map_err(tag_request_id(request_id))?))
}

/// POST /{payment_id}/refund
pub async fn refund_payment(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<RefundBody>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let result: AppResult<_> = async {
        let Path(payment_id) = path?;
        let Json(body) = payload?;
        let amount = required(body.amount, "amount")?;
        let reason = required_text(body.reason, "reason")?;

        let details = state.orchestrator.payment(payment_id).await?;
        ensure_owner(&user, details.payment.customer_id)?;

        info!(payment_id = %payment_id, requested_by = %user.user_id, "refund requested");
        state
            .orchestrator
            .process_refund(payment_id, amount, Some(reason), Some(user.user_id))
            .await
    }
    .await;

    let settlement = result.map_err(tag_request_id(request_id))?;
    Ok(success_response_with_message(
        json!({
            "refund": settlement.refund,
            "payment": settlement.payment,
            "order_refunded": settlement.order_refunded,
        }),
        "Refund processed",
    ))
}

/// POST /charge-saved-card
pub async fn charge_saved_card(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    payload: Result<Json<ChargeSavedCardBody>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let result: AppResult<_> = async {
        let Json(body) = payload?;
        let authorization_code = required_text(body.authorization_code, "authorization_code")?;
        let amount = required(body.amount, "amount")?;

        state
            .orchestrator
            .charge_saved_card(user.user_id, &authorization_code, amount, body.order_id)
            .await
    }
    .await;

    let charge = result.map_err(tag_request_id(request_id))?;
    Ok(success_response_with_message(charge, "Card charged"))
}

/// GET /customer/payment-methods
pub async fn list_payment_methods(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let methods = state
        .orchestrator
        .payment_methods(user.user_id)
        .await
        .map_err(tag_request_id(get_request_id_from_headers(&headers)))?;
    Ok(success_response(methods))
}

/// POST /customer/payment-methods/{method_id}/set-default
pub async fn set_default_payment_method(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let result: AppResult<_> = async {
        let Path(method_id) = path?;
        state
            .orchestrator
            .set_default_payment_method(user.user_id, method_id)
            .await
    }
    .await;

    let method = result.map_err(tag_request_id(request_id))?;
    Ok(success_response_with_message(method, "Default payment method updated"))
}

/// GET /banks
pub async fn list_banks(
    State(state): State<AppState>,
    _user: AuthUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let banks = state
        .orchestrator
        .list_banks()
        .await
        .map_err(tag_request_id(get_request_id_from_headers(&headers)))?;
    Ok(success_response(banks))
}

/// GET /banks/resolve?account_number=&bank_code=
pub async fn resolve_account(
    State(state): State<AppState>,
    _user: AuthUser,
    headers: HeaderMap,
    query: Result<Query<ResolveAccountQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let result: AppResult<_> = async {
        let Query(params) = query?;
        let account_number = required_text(params.account_number, "account_number")?;
        let bank_code = required_text(params.bank_code, "bank_code")?;
        state
            .orchestrator
            .resolve_account(&account_number, &bank_code)
            .await
    }
    .await;

    Ok(success_response(result.map_err(tag_request_id(request_id))?))
}
