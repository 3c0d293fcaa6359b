//! Read-only warehouse queries

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;

/// One fact row joined to all five dimensions
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct OrderView {
    pub order_id: i64,
    pub order_total: f64,
    pub quantity: i32,
    pub price: f64,
    pub full_date: NaiveDate,
    pub customer_id: i64,
    pub gender: String,
    pub age: i32,
    pub category: String,
    pub product_name: String,
    pub payment_method: String,
    pub region_name: String,
}

const SELECT_ORDER_VIEWS: &str = r#"
    SELECT f.order_id, f.order_total::DOUBLE PRECISION AS order_total, f.quantity,
           f.price::DOUBLE PRECISION AS price,
           d.full_date,
           c.customer_id, c.gender, c.age,
           p.category, p.product_name,
           pm.method_name AS payment_method,
           s.region_name
    FROM fact_orders f
    JOIN dim_dates d ON f.date_id = d.date_id
    JOIN dim_customers c ON f.customer_id = c.customer_id
    JOIN dim_products p ON f.product_id = p.product_id
    JOIN dim_payments pm ON f.payment_method_id = pm.payment_method_id
    JOIN dim_shipping_regions s ON f.shipping_region_id = s.shipping_region_id
    ORDER BY f.order_id
"#;

pub async fn fetch_order_views(pool: &PgPool) -> Result<Vec<OrderView>, sqlx::Error> {
    sqlx::query_as::<_, OrderView>(SELECT_ORDER_VIEWS)
        .fetch_all(pool)
        .await
}

/// Row counts of every warehouse table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TableCounts {
    pub staging: i64,
    pub customers: i64,
    pub products: i64,
    pub dates: i64,
    pub payments: i64,
    pub shipping_regions: i64,
    pub facts: i64,
}

pub async fn fetch_table_counts(pool: &PgPool) -> Result<TableCounts, sqlx::Error> {
    sqlx::query_as::<_, TableCounts>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM temp_orders) AS staging,
            (SELECT COUNT(*) FROM dim_customers) AS customers,
            (SELECT COUNT(*) FROM dim_products) AS products,
            (SELECT COUNT(*) FROM dim_dates) AS dates,
            (SELECT COUNT(*) FROM dim_payments) AS payments,
            (SELECT COUNT(*) FROM dim_shipping_regions) AS shipping_regions,
            (SELECT COUNT(*) FROM fact_orders) AS facts
        "#,
    )
    .fetch_one(pool)
    .await
}
