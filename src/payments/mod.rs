//! Payment gateway integration: wire types, the gateway trait, the Paystack
//! client and the money rules shared by the stores.

pub mod error;
pub mod provider;
pub mod providers;
pub mod reference;
pub mod refund;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use provider::PaymentGateway;
pub use providers::paystack::{PaystackConfig, PaystackProvider};
pub use types::{PaymentStatus, RefundStatus};
