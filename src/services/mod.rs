//! Services module for payment workflows and gateway notifications

pub mod notification;
pub mod payment_orchestrator;
pub mod webhook_events;
pub mod webhook_processor;

pub use crate::services::payment_orchestrator::{
    InitiatePaymentOptions, OrchestratorConfig, PaymentConfirmation, PaymentDetails,
    PaymentOrchestrator, PaymentSession, SavedCardCharge,
};
pub use crate::services::webhook_processor::{
    RetrySummary, WebhookOutcome, WebhookProcessor, WebhookProcessorError,
};
