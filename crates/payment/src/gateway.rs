//! Payment gateway abstraction.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{Money, OrderId};
use rand::Rng;

pub const APPROVED_RESPONSE: &str = "Payment processed successfully";
pub const DECLINED_RESPONSE: &str = "Insufficient funds";
pub const REFUND_RESPONSE: &str = "Refund processed";

/// A charge sent to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub order_id: OrderId,
    pub amount: Money,
}

/// Gateway verdict. A charge always resolves to one of the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    Approved { transaction_id: String },
    Declined { reason: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> GatewayOutcome;
}

/// Mints a transaction id of the form `TXN<unix-millis><4 digits>`.
pub fn new_transaction_id() -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("TXN{}{:04}", Utc::now().timestamp_millis(), suffix)
}

/// Simulated gateway settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Probability in [0, 1] that a charge is approved.
    pub success_rate: f64,
    pub min_latency: Duration,
    pub max_latency: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            success_rate: 0.95,
            min_latency: Duration::from_millis(2000),
            max_latency: Duration::from_millis(3000),
        }
    }
}

/// Gateway that waits a random bounded time and approves with a fixed
/// probability.
///
/// The wait is a timer, so only the task handling this charge is held up.
#[derive(Debug, Clone, Default)]
pub struct SimulatedGateway {
    config: GatewayConfig,
}

impl SimulatedGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn roll(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let min = self.config.min_latency;
        let max = self.config.max_latency.max(min);
        let latency = if max > min {
            rng.gen_range(min..=max)
        } else {
            min
        };
        let approved = rng.gen_bool(self.config.success_rate.clamp(0.0, 1.0));
        (latency, approved)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, request: &ChargeRequest) -> GatewayOutcome {
        let (latency, approved) = self.roll();
        tracing::debug!(order_id = %request.order_id, latency_ms = latency.as_millis() as u64, "calling payment gateway");
        tokio::time::sleep(latency).await;

        if approved {
            GatewayOutcome::Approved {
                transaction_id: new_transaction_id(),
            }
        } else {
            GatewayOutcome::Declined {
                reason: DECLINED_RESPONSE.to_string(),
            }
        }
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    queued: VecDeque<bool>,
    decline_by_default: bool,
    charges: Vec<ChargeRequest>,
}

/// Deterministic gateway for tests.
///
/// Answers queued verdicts first, then the default (approve unless switched).
#[derive(Debug, Clone, Default)]
pub struct ScriptedGateway {
    state: Arc<RwLock<ScriptState>>,
}

impl ScriptedGateway {
    /// Approves every charge.
    pub fn approving() -> Self {
        Self::default()
    }

    /// Declines every charge.
    pub fn declining() -> Self {
        let gateway = Self::default();
        gateway.state.write().unwrap().decline_by_default = true;
        gateway
    }

    /// Queues a verdict for the next unanswered charge.
    pub fn push_outcome(&self, approve: bool) {
        self.state.write().unwrap().queued.push_back(approve);
    }

    /// Every charge received so far.
    pub fn charges(&self) -> Vec<ChargeRequest> {
        self.state.read().unwrap().charges.clone()
    }

    pub fn charge_count(&self) -> usize {
        self.state.read().unwrap().charges.len()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn charge(&self, request: &ChargeRequest) -> GatewayOutcome {
        let approve = {
            let mut state = self.state.write().unwrap();
            state.charges.push(request.clone());
            let default = !state.decline_by_default;
            state.queued.pop_front().unwrap_or(default)
        };

        if approve {
            GatewayOutcome::Approved {
                transaction_id: new_transaction_id(),
            }
        } else {
            GatewayOutcome::Declined {
                reason: DECLINED_RESPONSE.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn charge() -> ChargeRequest {
        ChargeRequest {
            order_id: OrderId::new(),
            amount: Money::from_units(30),
        }
    }

    #[test]
    fn test_transaction_id_format() {
        let id = new_transaction_id();
        assert!(id.starts_with("TXN"));
        assert!(id[3..].chars().all(|c| c.is_ascii_digit()));
        assert!(id.len() > 3 + 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_gateway_latency_is_bounded() {
        let gateway = SimulatedGateway::new(GatewayConfig {
            success_rate: 1.0,
            min_latency: Duration::from_millis(2000),
            max_latency: Duration::from_millis(3000),
        });

        let started = tokio::time::Instant::now();
        let outcome = gateway.charge(&charge()).await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(2000));
        assert!(elapsed <= Duration::from_millis(3001));
        assert!(matches!(outcome, GatewayOutcome::Approved { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_gateway_zero_success_rate_declines() {
        let gateway = SimulatedGateway::new(GatewayConfig {
            success_rate: 0.0,
            min_latency: Duration::ZERO,
            max_latency: Duration::ZERO,
        });

        let outcome = gateway.charge(&charge()).await;

        assert_eq!(
            outcome,
            GatewayOutcome::Declined {
                reason: DECLINED_RESPONSE.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_scripted_gateway_follows_queue_then_default() {
        let gateway = ScriptedGateway::approving();
        gateway.push_outcome(false);

        assert!(matches!(
            gateway.charge(&charge()).await,
            GatewayOutcome::Declined { .. }
        ));
        assert!(matches!(
            gateway.charge(&charge()).await,
            GatewayOutcome::Approved { .. }
        ));
        assert_eq!(gateway.charge_count(), 2);

        let declining = ScriptedGateway::declining();
        assert!(matches!(
            declining.charge(&charge()).await,
            GatewayOutcome::Declined { .. }
        ));
    }
}
