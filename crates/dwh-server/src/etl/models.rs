//! Record shapes flowing through the pipeline
//!
//! `RawRecord` → `StagingRecord` → `CleanedRecord` → dimension rows and `FactRow`.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::Serialize;

/// Placeholder written into text columns that were empty after cleaning
pub const UNKNOWN: &str = "Unknown";

/// Source columns, in staging-table order
pub const COLUMNS: [&str; 12] = [
    "order_id",
    "purchase_date",
    "customer_id",
    "customer_gender",
    "customer_age",
    "product_category",
    "product_name",
    "product_price",
    "quantity",
    "order_total",
    "payment_method",
    "shipping_region",
];

/// Columns that must be present for a row to be staged
pub const REQUIRED_COLUMNS: [&str; 4] =
    ["order_id", "purchase_date", "customer_id", "product_category"];

/// One line of the source file. `None` is a missing cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct RawRecord {
    pub order_id: Option<String>,
    pub purchase_date: Option<String>,
    pub customer_id: Option<String>,
    pub customer_gender: Option<String>,
    pub customer_age: Option<String>,
    pub product_category: Option<String>,
    pub product_name: Option<String>,
    pub product_price: Option<String>,
    pub quantity: Option<String>,
    pub order_total: Option<String>,
    pub payment_method: Option<String>,
    pub shipping_region: Option<String>,
}

impl RawRecord {
    /// Cell by source column name
    pub fn get(&self, column: &str) -> Option<&str> {
        let value = match column {
            "order_id" => &self.order_id,
            "purchase_date" => &self.purchase_date,
            "customer_id" => &self.customer_id,
            "customer_gender" => &self.customer_gender,
            "customer_age" => &self.customer_age,
            "product_category" => &self.product_category,
            "product_name" => &self.product_name,
            "product_price" => &self.product_price,
            "quantity" => &self.quantity,
            "order_total" => &self.order_total,
            "payment_method" => &self.payment_method,
            "shipping_region" => &self.shipping_region,
            _ => return None,
        };
        value.as_deref()
    }

    /// Mutable cell by source column name
    pub fn get_mut(&mut self, column: &str) -> Option<&mut Option<String>> {
        match column {
            "order_id" => Some(&mut self.order_id),
            "purchase_date" => Some(&mut self.purchase_date),
            "customer_id" => Some(&mut self.customer_id),
            "customer_gender" => Some(&mut self.customer_gender),
            "customer_age" => Some(&mut self.customer_age),
            "product_category" => Some(&mut self.product_category),
            "product_name" => Some(&mut self.product_name),
            "product_price" => Some(&mut self.product_price),
            "quantity" => Some(&mut self.quantity),
            "order_total" => Some(&mut self.order_total),
            "payment_method" => Some(&mut self.payment_method),
            "shipping_region" => Some(&mut self.shipping_region),
            _ => None,
        }
    }
}

/// A row of `temp_orders`: the raw record plus its staging sequence number
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StagingRecord {
    pub staging_id: i64,
    #[sqlx(flatten)]
    pub raw: RawRecord,
}

/// Typed, null-normalized projection of a staging row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanedRecord {
    pub order_id: i64,
    /// `None` when the date did not match `%d/%m/%y`
    pub purchase_date: Option<NaiveDate>,
    pub customer_id: i64,
    pub customer_gender: String,
    pub customer_age: i32,
    pub product_category: String,
    pub product_name: String,
    pub product_price: BigDecimal,
    pub quantity: i32,
    pub order_total: BigDecimal,
    pub payment_method: Option<String>,
    pub shipping_region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerRow {
    pub customer_id: i64,
    pub gender: String,
    pub age: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ProductRow {
    pub category: String,
    pub product_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRow {
    pub full_date: NaiveDate,
    pub year: i32,
    pub quarter: i32,
    pub month: i32,
    pub day: i32,
    pub day_of_week: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PaymentRow {
    pub method_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RegionRow {
    pub region_name: String,
}

/// One order with all five dimension references resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactRow {
    pub order_id: i64,
    pub date_id: i64,
    pub customer_id: i64,
    pub product_id: i64,
    pub payment_method_id: i64,
    pub shipping_region_id: i64,
    pub price: BigDecimal,
    pub quantity: i32,
    pub order_total: BigDecimal,
}
