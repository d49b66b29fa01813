use crate::entities::{order, order_item, payment_collection, shipping_method};
use crate::errors::ServiceError;
use crate::models::status::{PaymentCollectionStatus, PaymentStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decimal places kept for every persisted money amount.
pub const MONEY_SCALE: u32 = 2;

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp(MONEY_SCALE)
}

pub fn ensure_non_negative(field: &str, amount: Decimal) -> Result<(), ServiceError> {
    if amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "{} must not be negative",
            field
        )));
    }
    Ok(())
}

fn too_large(field: &str) -> ServiceError {
    ServiceError::ValidationError(format!("{} amount is too large", field))
}

/// Adds up `amounts`, rejecting a sum that does not fit in a `Decimal`.
pub fn checked_sum<I>(field: &str, amounts: I) -> Result<Decimal, ServiceError>
where
    I: IntoIterator<Item = Decimal>,
{
    amounts.into_iter().try_fold(Decimal::ZERO, |acc, amount| {
        acc.checked_add(amount).ok_or_else(|| too_large(field))
    })
}

/// unit price × quantity
pub fn line_subtotal(unit_price: Decimal, quantity: i32) -> Result<Decimal, ServiceError> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(|| too_large("Line item"))
}

pub fn line_total(
    subtotal: Decimal,
    tax_total: Decimal,
    discount_total: Decimal,
) -> Result<Decimal, ServiceError> {
    subtotal
        .checked_add(tax_total)
        .and_then(|gross| gross.checked_sub(discount_total))
        .ok_or_else(|| too_large("Line item"))
}

/// The monetary components of an order.
///
/// `total == item_total + tax_total + shipping_total - discount_total` for every value
/// produced by [`OrderTotals::compute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub item_total: Decimal,
    pub shipping_total: Decimal,
    pub tax_total: Decimal,
    pub discount_total: Decimal,
    pub total: Decimal,
}

impl OrderTotals {
    pub fn zero() -> Self {
        Self {
            item_total: Decimal::ZERO,
            shipping_total: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            discount_total: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }

    /// Recomputes every component from the order's lines and shipping methods.
    pub fn compute(
        items: &[order_item::Model],
        shipping_methods: &[shipping_method::Model],
    ) -> Result<Self, ServiceError> {
        let mut subtotals = Vec::with_capacity(items.len());
        for item in items {
            // The line total is rendered per item, so it has to fit as well.
            item.total()?;
            subtotals.push(item.subtotal()?);
        }
        let item_total = round_money(checked_sum("Item total", subtotals)?);
        let tax_total = round_money(checked_sum("Tax total", items.iter().map(|i| i.tax_total))?);
        let discount_total = round_money(checked_sum(
            "Discount total",
            items.iter().map(|i| i.discount_total),
        )?);
        let shipping_total = round_money(checked_sum(
            "Shipping total",
            shipping_methods.iter().map(|s| s.amount),
        )?);
        let total = item_total
            .checked_add(tax_total)
            .and_then(|t| t.checked_add(shipping_total))
            .and_then(|t| t.checked_sub(discount_total))
            .ok_or_else(|| too_large("Order total"))?;

        let totals = Self {
            item_total,
            shipping_total,
            tax_total,
            discount_total,
            total,
        };
        totals.validate()?;
        Ok(totals)
    }

    /// Reads the stored components of an order row.
    pub fn of(order: &order::Model) -> Self {
        Self {
            item_total: order.item_total,
            shipping_total: order.shipping_total,
            tax_total: order.tax_total,
            discount_total: order.discount_total,
            total: order.total,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.item_total
            .checked_add(self.tax_total)
            .and_then(|t| t.checked_add(self.shipping_total))
            .and_then(|t| t.checked_sub(self.discount_total))
            == Some(self.total)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        ensure_non_negative("item_total", self.item_total)?;
        ensure_non_negative("shipping_total", self.shipping_total)?;
        ensure_non_negative("tax_total", self.tax_total)?;
        ensure_non_negative("discount_total", self.discount_total)?;
        ensure_non_negative("total", self.total)?;
        if !self.is_consistent() {
            return Err(ServiceError::InternalError(format!(
                "Order total {} does not match its components",
                self.total
            )));
        }
        Ok(())
    }

    pub fn apply_to(&self, order: &mut order::Model) {
        order.item_total = self.item_total;
        order.shipping_total = self.shipping_total;
        order.tax_total = self.tax_total;
        order.discount_total = self.discount_total;
        order.total = self.total;
    }
}

/// Sum of amounts settled through payment collections marked as paid.
pub fn paid_total(collections: &[payment_collection::Model]) -> Result<Decimal, ServiceError> {
    checked_sum(
        "Paid total",
        collections
            .iter()
            .filter(|c| c.status == PaymentCollectionStatus::Paid)
            .map(|c| c.captured_amount),
    )
}

pub fn refunded_total(collections: &[payment_collection::Model]) -> Result<Decimal, ServiceError> {
    checked_sum("Refunded total", collections.iter().map(|c| c.refunded_amount))
}

/// Derives an order's payment status from its collections.
pub fn derive_payment_status(
    order_total: Decimal,
    collections: &[payment_collection::Model],
) -> Result<PaymentStatus, ServiceError> {
    let paid = paid_total(collections)?;
    let status = if paid > Decimal::ZERO && paid >= order_total {
        PaymentStatus::Paid
    } else if paid > Decimal::ZERO {
        PaymentStatus::PartiallyPaid
    } else if collections
        .iter()
        .any(|c| c.status != PaymentCollectionStatus::Canceled)
    {
        PaymentStatus::Awaiting
    } else {
        PaymentStatus::NotPaid
    };
    Ok(status)
}
