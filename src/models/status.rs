use crate::errors::ServiceError;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle status of an order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OrderStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "canceled")]
    Canceled,
    #[sea_orm(string_value = "requires_action")]
    RequiresAction,
    #[sea_orm(string_value = "archived")]
    Archived,
}

/// Payment progress of an order, derived from its payment collections.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PaymentStatus {
    #[sea_orm(string_value = "not_paid")]
    NotPaid,
    #[sea_orm(string_value = "awaiting")]
    Awaiting,
    #[sea_orm(string_value = "captured")]
    Captured,
    #[sea_orm(string_value = "partially_paid")]
    PartiallyPaid,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "canceled")]
    Canceled,
    #[sea_orm(string_value = "requires_action")]
    RequiresAction,
}

/// Fulfillment progress of an order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum FulfillmentStatus {
    #[sea_orm(string_value = "not_fulfilled")]
    NotFulfilled,
    #[sea_orm(string_value = "partially_fulfilled")]
    PartiallyFulfilled,
    #[sea_orm(string_value = "fulfilled")]
    Fulfilled,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "canceled")]
    Canceled,
    #[sea_orm(string_value = "requires_action")]
    RequiresAction,
}

/// Status of a payment collection.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PaymentCollectionStatus {
    #[sea_orm(string_value = "not_paid")]
    NotPaid,
    #[sea_orm(string_value = "awaiting")]
    Awaiting,
    #[sea_orm(string_value = "authorized")]
    Authorized,
    #[sea_orm(string_value = "partially_authorized")]
    PartiallyAuthorized,
    #[sea_orm(string_value = "captured")]
    Captured,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "canceled")]
    Canceled,
}

impl PaymentCollectionStatus {
    /// Money has moved or is reserved; the collection must not be removed.
    pub fn holds_funds(self) -> bool {
        matches!(self, Self::Authorized | Self::Captured)
    }
}

/// Parses a free-text status name for `field` case-insensitively.
///
/// Unknown values fail with a validation error that lists every accepted name.
pub fn parse_status<T>(field: &str, raw: &str) -> Result<T, ServiceError>
where
    T: ActiveEnum<Value = String> + FromStr,
{
    T::from_str(raw.trim()).map_err(|_| {
        ServiceError::ValidationError(format!(
            "Invalid {} '{}'. Accepted values: {}",
            field,
            raw,
            T::values().join(", ")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case("paid", PaymentStatus::Paid)]
    #[case("PAID", PaymentStatus::Paid)]
    #[case("Partially_Paid", PaymentStatus::PartiallyPaid)]
    #[case("  not_paid ", PaymentStatus::NotPaid)]
    fn parses_payment_status_case_insensitively(#[case] raw: &str, #[case] expected: PaymentStatus) {
        let parsed: PaymentStatus = parse_status("payment status", raw).unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn unknown_status_lists_accepted_values() {
        let err = parse_status::<FulfillmentStatus>("fulfillment status", "delivered").unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(ref msg) if msg.contains("delivered")
            && msg.contains("not_fulfilled, partially_fulfilled, fulfilled, shipped, canceled, requires_action"));
    }

    #[test]
    fn display_matches_stored_value() {
        assert_eq!(OrderStatus::RequiresAction.to_string(), "requires_action");
        assert_eq!(OrderStatus::RequiresAction.to_value(), "requires_action");
        assert_eq!(
            serde_json::to_string(&FulfillmentStatus::PartiallyFulfilled).unwrap(),
            "\"partially_fulfilled\""
        );
    }

    #[test]
    fn only_authorized_or_captured_collections_hold_funds() {
        assert!(PaymentCollectionStatus::Authorized.holds_funds());
        assert!(PaymentCollectionStatus::Captured.holds_funds());
        assert!(!PaymentCollectionStatus::Awaiting.holds_funds());
        assert!(!PaymentCollectionStatus::Paid.holds_funds());
    }
}
