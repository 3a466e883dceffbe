//! Payment records.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ParseStatusError, PaymentId, PaymentStatus, RestaurantId, UserId};
use serde::{Deserialize, Serialize};

/// Lifecycle of a payment record.
///
/// ```text
/// Pending ──► Processing ──► Success ──► Refunded
///                  │
///                  └───────► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    #[default]
    Pending,
    Processing,
    Success,
    Failed,
    Refunded,
}

impl PaymentState {
    /// Only captured payments can be refunded.
    pub fn can_refund(&self) -> bool {
        matches!(self, PaymentState::Success)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentState::Success | PaymentState::Failed | PaymentState::Refunded
        )
    }

    /// The status reported to the order for this state, if any.
    pub fn order_payment_status(&self) -> PaymentStatus {
        match self {
            PaymentState::Pending | PaymentState::Processing => PaymentStatus::Pending,
            PaymentState::Success => PaymentStatus::Completed,
            PaymentState::Failed => PaymentStatus::Failed,
            PaymentState::Refunded => PaymentStatus::Refunded,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "PENDING",
            PaymentState::Processing => "PROCESSING",
            PaymentState::Success => "SUCCESS",
            PaymentState::Failed => "FAILED",
            PaymentState::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    CreditCard,
    DebitCard,
    Upi,
    NetBanking,
    Wallet,
    CashOnDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::DebitCard => "DEBIT_CARD",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::NetBanking => "NET_BANKING",
            PaymentMethod::Wallet => "WALLET",
            PaymentMethod::CashOnDelivery => "CASH_ON_DELIVERY",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREDIT_CARD" => Ok(PaymentMethod::CreditCard),
            "DEBIT_CARD" => Ok(PaymentMethod::DebitCard),
            "UPI" => Ok(PaymentMethod::Upi),
            "NET_BANKING" => Ok(PaymentMethod::NetBanking),
            "WALLET" => Ok(PaymentMethod::Wallet),
            "CASH_ON_DELIVERY" => Ok(PaymentMethod::CashOnDelivery),
            _ => Err(ParseStatusError {
                kind: "payment method",
                value: s.to_string(),
            }),
        }
    }
}

/// What the processor needs to capture payment for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub restaurant_id: Option<RestaurantId>,
    pub amount: Money,
    pub method: PaymentMethod,
}

/// One payment per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub restaurant_id: Option<RestaurantId>,
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentState,
    /// Set only when the gateway approved the charge.
    pub transaction_id: Option<String>,
    pub gateway_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// A new record in PROCESSING, about to be sent to the gateway.
    pub fn processing(request: &PaymentRequest) -> Self {
        Self {
            id: PaymentId::new(),
            order_id: request.order_id,
            user_id: request.user_id,
            restaurant_id: request.restaurant_id,
            amount: request.amount,
            method: request.method,
            status: PaymentState::Processing,
            transaction_id: None,
            gateway_response: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}
