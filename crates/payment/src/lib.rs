//! Payment processor.
//!
//! Captures payment for every `ORDER_CREATED` exactly once per order, however
//! often the event is delivered, and refunds captured payments when a
//! delivery fails.

pub mod consumer;
pub mod error;
pub mod gateway;
pub mod model;
pub mod repository;
pub mod service;

pub use consumer::PaymentEventConsumer;
pub use error::{PaymentError, Result};
pub use gateway::{
    APPROVED_RESPONSE, ChargeRequest, DECLINED_RESPONSE, GatewayConfig, GatewayOutcome,
    PaymentGateway, REFUND_RESPONSE, ScriptedGateway, SimulatedGateway, new_transaction_id,
};
pub use model::{Payment, PaymentMethod, PaymentRequest, PaymentState};
pub use repository::{InMemoryPaymentRepository, PaymentRepository};
pub use service::PaymentService;
