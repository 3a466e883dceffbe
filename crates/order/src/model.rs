//! Order model and the placement request.

use chrono::{DateTime, Utc};
use common::{MenuItemId, Money, OrderId, OrderStatus, PartnerId, PaymentStatus, RestaurantId, UserId};
use serde::{Deserialize, Serialize};

use crate::{OrderError, Result};

/// Pricing defaults applied when a request leaves them out.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderConfig {
    pub default_delivery_fee: Money,
    pub default_discount: Money,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            default_delivery_fee: Money::from_units(50),
            default_discount: Money::zero(),
        }
    }
}

/// A line item as requested by the customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub menu_item_id: MenuItemId,
    pub item_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

/// Request to place an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub restaurant_id: RestaurantId,
    #[serde(default)]
    pub address_id: Option<i64>,
    #[serde(default)]
    pub special_instructions: Option<String>,
    pub items: Vec<NewOrderItem>,
    #[serde(default)]
    pub delivery_fee: Option<Money>,
    #[serde(default)]
    pub discount: Option<Money>,
}

impl NewOrder {
    /// Creates a request with no items and default pricing.
    pub fn new(user_id: UserId, restaurant_id: RestaurantId) -> Self {
        Self {
            user_id,
            restaurant_id,
            address_id: None,
            special_instructions: None,
            items: Vec::new(),
            delivery_fee: None,
            discount: None,
        }
    }

    /// Adds a line item.
    pub fn item(
        mut self,
        menu_item_id: MenuItemId,
        item_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        self.items.push(NewOrderItem {
            menu_item_id,
            item_name: item_name.into(),
            quantity,
            unit_price,
        });
        self
    }

    pub fn delivery_fee(mut self, fee: Money) -> Self {
        self.delivery_fee = Some(fee);
        self
    }

    pub fn discount(mut self, discount: Money) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn address_id(mut self, address_id: i64) -> Self {
        self.address_id = Some(address_id);
        self
    }

    pub fn special_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.special_instructions = Some(instructions.into());
        self
    }

    /// Checks the request shape. Runs before any lookup or state change.
    pub fn validate(&self, config: &OrderConfig) -> Result<()> {
        if self.items.is_empty() {
            return Err(OrderError::Validation("order has no items".to_string()));
        }
        for item in &self.items {
            if item.quantity == 0 {
                return Err(OrderError::Validation(format!(
                    "quantity for menu item {} must be greater than 0",
                    item.menu_item_id
                )));
            }
            if item.unit_price.is_negative() {
                return Err(OrderError::Validation(format!(
                    "unit price for menu item {} must not be negative",
                    item.menu_item_id
                )));
            }
        }

        let fee = self.delivery_fee.unwrap_or(config.default_delivery_fee);
        let discount = self.discount.unwrap_or(config.default_discount);
        if fee.is_negative() {
            return Err(OrderError::Validation("delivery fee must not be negative".to_string()));
        }
        if discount.is_negative() {
            return Err(OrderError::Validation("discount must not be negative".to_string()));
        }

        let mut subtotals = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let subtotal = item.unit_price.checked_multiply(item.quantity).ok_or_else(|| {
                OrderError::Validation(format!(
                    "subtotal for menu item {} is too large",
                    item.menu_item_id
                ))
            })?;
            subtotals.push(subtotal);
        }
        let gross = Money::checked_sum(subtotals)
            .and_then(|total| total.checked_add(fee))
            .ok_or_else(|| OrderError::Validation("order amount is too large".to_string()))?;
        if discount > gross {
            return Err(OrderError::Validation(format!(
                "discount {discount} exceeds order amount {gross}"
            )));
        }
        Ok(())
    }
}

/// A priced line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub menu_item_id: MenuItemId,
    pub item_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub restaurant_id: RestaurantId,
    pub delivery_partner_id: Option<PartnerId>,
    pub address_id: Option<i64>,
    pub special_instructions: Option<String>,
    pub items: Vec<OrderItem>,
    pub total_amount: Money,
    pub delivery_fee: Money,
    pub discount: Money,
    pub final_amount: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub order_time: DateTime<Utc>,
    pub delivery_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Prices a validated request into a new PLACED/PENDING order.
    ///
    /// The request must have passed [`NewOrder::validate`], which rejects
    /// amounts that do not fit.
    pub fn place(request: NewOrder, config: &OrderConfig) -> Self {
        let items: Vec<OrderItem> = request
            .items
            .into_iter()
            .map(|item| OrderItem {
                subtotal: item.unit_price.multiply(item.quantity),
                menu_item_id: item.menu_item_id,
                item_name: item.item_name,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();

        let total_amount: Money = items.iter().map(|i| i.subtotal).sum();
        let delivery_fee = request.delivery_fee.unwrap_or(config.default_delivery_fee);
        let discount = request.discount.unwrap_or(config.default_discount);
        let now = Utc::now();

        Self {
            id: OrderId::new(),
            user_id: request.user_id,
            restaurant_id: request.restaurant_id,
            delivery_partner_id: None,
            address_id: request.address_id,
            special_instructions: request.special_instructions,
            items,
            total_amount,
            delivery_fee,
            discount,
            final_amount: total_amount + delivery_fee - discount,
            status: OrderStatus::Placed,
            payment_status: PaymentStatus::Pending,
            order_time: now,
            delivery_time: None,
            updated_at: now,
        }
    }

    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }
}
