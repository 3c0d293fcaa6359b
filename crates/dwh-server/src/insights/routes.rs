use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::analysis::{self, Crosstab, DescriptiveStats, GroupTotal, MonthlyExtremes, MonthlyTotal};
use super::queries::{fetch_order_views, fetch_table_counts, TableCounts};
use crate::api::response::ApiResponse;
use crate::error::AppError;

/// Products listed at each end of the ranking when `n` is not given
pub const DEFAULT_RANKING_SIZE: usize = 10;

pub fn insights_routes() -> Router<PgPool> {
    Router::new()
        .route("/summary", get(summary))
        .route("/counts", get(counts))
        .route("/categories", get(categories))
        .route("/regions", get(regions))
        .route("/trends", get(trends))
        .route("/products", get(products))
        .route("/customers", get(customers))
        .route("/correlations", get(correlations))
}

async fn summary(State(pool): State<PgPool>) -> Result<ApiResponse<DescriptiveStats>, AppError> {
    let views = fetch_order_views(&pool).await?;
    Ok(ApiResponse::success(analysis::descriptive_stats(&views)))
}

async fn counts(State(pool): State<PgPool>) -> Result<ApiResponse<TableCounts>, AppError> {
    Ok(ApiResponse::success(fetch_table_counts(&pool).await?))
}

async fn categories(State(pool): State<PgPool>) -> Result<ApiResponse<Vec<GroupTotal>>, AppError> {
    let views = fetch_order_views(&pool).await?;
    Ok(ApiResponse::success(analysis::sales_by_category(&views)))
}

async fn regions(State(pool): State<PgPool>) -> Result<ApiResponse<Vec<GroupTotal>>, AppError> {
    let views = fetch_order_views(&pool).await?;
    Ok(ApiResponse::success(analysis::sales_by_region(&views)))
}

#[derive(Debug, Serialize)]
pub struct TrendReport {
    pub monthly: Vec<MonthlyTotal>,
    pub extremes: Option<MonthlyExtremes>,
}

async fn trends(State(pool): State<PgPool>) -> Result<ApiResponse<TrendReport>, AppError> {
    let views = fetch_order_views(&pool).await?;
    let monthly = analysis::monthly_sales(&views);
    let extremes = analysis::monthly_extremes(&monthly);
    Ok(ApiResponse::success(TrendReport { monthly, extremes }))
}

#[derive(Debug, Deserialize)]
pub struct RankingQuery {
    pub n: Option<usize>,
}

async fn products(
    State(pool): State<PgPool>,
    Query(query): Query<RankingQuery>,
) -> Result<ApiResponse<analysis::ProductRanking>, AppError> {
    let n = query.n.unwrap_or(DEFAULT_RANKING_SIZE);
    if n == 0 {
        return Err(AppError::BadRequest("n must be at least 1".to_string()));
    }
    let views = fetch_order_views(&pool).await?;
    Ok(ApiResponse::success_with_meta(
        analysis::product_ranking(&views, n),
        serde_json::json!({ "n": n }),
    ))
}

#[derive(Debug, Serialize)]
pub struct CustomerReport {
    pub by_age: Vec<analysis::AgeSales>,
    pub by_gender: Vec<GroupTotal>,
}

async fn customers(State(pool): State<PgPool>) -> Result<ApiResponse<CustomerReport>, AppError> {
    let views = fetch_order_views(&pool).await?;
    Ok(ApiResponse::success(CustomerReport {
        by_age: analysis::sales_by_age(&views),
        by_gender: analysis::sales_by_gender(&views),
    }))
}

#[derive(Debug, Serialize)]
pub struct CorrelationReport {
    /// Pearson r between order total and customer age; null when undefined
    pub order_total_age: Option<f64>,
    pub category_payment: Crosstab,
}

async fn correlations(State(pool): State<PgPool>) -> Result<ApiResponse<CorrelationReport>, AppError> {
    let views = fetch_order_views(&pool).await?;
    Ok(ApiResponse::success(CorrelationReport {
        order_total_age: analysis::order_total_age_correlation(&views),
        category_payment: analysis::category_payment_crosstab(&views),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn lazy_pool() -> PgPool {
        sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy("postgresql://nobody@127.0.0.1:1/nothing")
            .unwrap()
    }

    #[tokio::test]
    async fn test_products_rejects_zero_n() {
        let app = insights_routes().with_state(lazy_pool());

        let response = app
            .oneshot(Request::builder().uri("/products?n=0").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unreachable_database_is_server_error() {
        let app = insights_routes().with_state(lazy_pool());

        let response = app
            .oneshot(Request::builder().uri("/summary").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_server_error());
    }
}
