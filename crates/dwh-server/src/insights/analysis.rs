//! Descriptive analytics over joined order rows
//!
//! Everything here is pure: the inputs are rows already fetched from the
//! warehouse and the outputs are plain serializable structs.

use chrono::Datelike;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::queries::OrderView;

/// Mean, median and mode of one measure
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub mean: f64,
    pub median: f64,
    /// Most frequent value; the smallest one on ties
    pub mode: f64,
}

impl Summary {
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        // Runs of equal values in sorted order; strict `>` keeps the first (smallest)
        let mut mode = sorted[0];
        let mut best_run = 0;
        let mut run_start = 0;
        for i in 1..=sorted.len() {
            if i == sorted.len() || sorted[i] != sorted[run_start] {
                let run = i - run_start;
                if run > best_run {
                    best_run = run;
                    mode = sorted[run_start];
                }
                run_start = i;
            }
        }

        Some(Self { mean, median, mode })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DescriptiveStats {
    pub orders: usize,
    pub order_total: Option<Summary>,
    pub quantity: Option<Summary>,
    pub price: Option<Summary>,
    pub age: Option<Summary>,
}

pub fn descriptive_stats(views: &[OrderView]) -> DescriptiveStats {
    let column = |f: fn(&OrderView) -> f64| views.iter().map(f).collect::<Vec<_>>();
    DescriptiveStats {
        orders: views.len(),
        order_total: Summary::of(&column(|v| v.order_total)),
        quantity: Summary::of(&column(|v| f64::from(v.quantity))),
        price: Summary::of(&column(|v| v.price)),
        age: Summary::of(&column(|v| f64::from(v.age))),
    }
}

/// Order-total sum for one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotal {
    pub key: String,
    pub total: f64,
    pub orders: usize,
}

fn group_totals<'a>(views: &'a [OrderView], key: impl Fn(&'a OrderView) -> &'a str) -> Vec<GroupTotal> {
    let mut groups: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for view in views {
        let entry = groups.entry(key(view)).or_default();
        entry.0 += view.order_total;
        entry.1 += 1;
    }
    groups
        .into_iter()
        .map(|(key, (total, orders))| GroupTotal {
            key: key.to_string(),
            total,
            orders,
        })
        .collect()
}

fn by_total_desc(a: &GroupTotal, b: &GroupTotal) -> Ordering {
    b.total.total_cmp(&a.total).then_with(|| a.key.cmp(&b.key))
}

/// Sales per product category, largest first
pub fn sales_by_category(views: &[OrderView]) -> Vec<GroupTotal> {
    let mut totals = group_totals(views, |v| v.category.as_str());
    totals.sort_by(by_total_desc);
    totals
}

/// Sales per shipping region, largest first
pub fn sales_by_region(views: &[OrderView]) -> Vec<GroupTotal> {
    let mut totals = group_totals(views, |v| v.region_name.as_str());
    totals.sort_by(by_total_desc);
    totals
}

/// Sales per gender, ordered by gender label
pub fn sales_by_gender(views: &[OrderView]) -> Vec<GroupTotal> {
    group_totals(views, |v| v.gender.as_str())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotal {
    /// `YYYY-MM`
    pub month: String,
    pub total: f64,
}

/// Sales per calendar month, chronological
pub fn monthly_sales(views: &[OrderView]) -> Vec<MonthlyTotal> {
    let mut months: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for view in views {
        *months
            .entry((view.full_date.year(), view.full_date.month()))
            .or_default() += view.order_total;
    }
    months
        .into_iter()
        .map(|((year, month), total)| MonthlyTotal {
            month: format!("{year:04}-{month:02}"),
            total,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyExtremes {
    pub best: MonthlyTotal,
    pub worst: MonthlyTotal,
}

/// Best and worst month; the earliest month wins ties
pub fn monthly_extremes(months: &[MonthlyTotal]) -> Option<MonthlyExtremes> {
    let first = months.first()?;
    let mut best = first;
    let mut worst = first;
    for month in &months[1..] {
        if month.total > best.total {
            best = month;
        }
        if month.total < worst.total {
            worst = month;
        }
    }
    Some(MonthlyExtremes {
        best: best.clone(),
        worst: worst.clone(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRanking {
    /// Best sellers, largest first
    pub top: Vec<GroupTotal>,
    /// Worst sellers, still largest first
    pub bottom: Vec<GroupTotal>,
}

/// Top and bottom `n` products by total sales
pub fn product_ranking(views: &[OrderView], n: usize) -> ProductRanking {
    let mut totals = group_totals(views, |v| v.product_name.as_str());
    totals.sort_by(by_total_desc);

    let top = totals.iter().take(n).cloned().collect();
    let bottom = totals[totals.len().saturating_sub(n)..].to_vec();
    ProductRanking { top, bottom }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeSales {
    pub age: i32,
    pub total: f64,
    pub quantity: i64,
}

/// Sales and units per customer age, youngest first
pub fn sales_by_age(views: &[OrderView]) -> Vec<AgeSales> {
    let mut ages: BTreeMap<i32, (f64, i64)> = BTreeMap::new();
    for view in views {
        let entry = ages.entry(view.age).or_default();
        entry.0 += view.order_total;
        entry.1 += i64::from(view.quantity);
    }
    ages.into_iter()
        .map(|(age, (total, quantity))| AgeSales { age, total, quantity })
        .collect()
}

/// Pearson correlation coefficient. `None` with fewer than two points or when
/// either series is constant.
pub fn pearson_correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);

    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

pub fn order_total_age_correlation(views: &[OrderView]) -> Option<f64> {
    let totals: Vec<f64> = views.iter().map(|v| v.order_total).collect();
    let ages: Vec<f64> = views.iter().map(|v| f64::from(v.age)).collect();
    pearson_correlation(&totals, &ages)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrosstabRow {
    pub category: String,
    /// Aligned with [`Crosstab::payment_methods`]
    pub counts: Vec<u64>,
}

/// Order counts per (category, payment method)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Crosstab {
    pub payment_methods: Vec<String>,
    pub rows: Vec<CrosstabRow>,
}

pub fn category_payment_crosstab(views: &[OrderView]) -> Crosstab {
    let methods: BTreeSet<&str> = views.iter().map(|v| v.payment_method.as_str()).collect();
    let column: HashMap<&str, usize> = methods.iter().enumerate().map(|(i, m)| (*m, i)).collect();

    let mut rows: BTreeMap<&str, Vec<u64>> = BTreeMap::new();
    for view in views {
        let counts = rows
            .entry(view.category.as_str())
            .or_insert_with(|| vec![0; methods.len()]);
        if let Some(&i) = column.get(view.payment_method.as_str()) {
            counts[i] += 1;
        }
    }

    Crosstab {
        payment_methods: methods.into_iter().map(str::to_string).collect(),
        rows: rows
            .into_iter()
            .map(|(category, counts)| CrosstabRow {
                category: category.to_string(),
                counts,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn view(order_id: i64, total: f64, date: (i32, u32, u32), category: &str, name: &str) -> OrderView {
        OrderView {
            order_id,
            order_total: total,
            quantity: 1,
            price: total,
            full_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            customer_id: order_id,
            gender: if order_id % 2 == 0 { "M".into() } else { "F".into() },
            age: 20 + order_id as i32,
            category: category.into(),
            product_name: name.into(),
            payment_method: if order_id % 2 == 0 { "Cash".into() } else { "Card".into() },
            region_name: "North".into(),
        }
    }

    fn sample() -> Vec<OrderView> {
        vec![
            view(1, 500.0, (2024, 3, 1), "Electronics", "Phone"),
            view(2, 20.0, (2024, 3, 15), "Books", "Novel"),
            view(3, 20.0, (2024, 4, 2), "Books", "Atlas"),
            view(4, 900.0, (2024, 5, 9), "Electronics", "Laptop"),
        ]
    }

    #[test]
    fn test_summary_mean_median_mode() {
        let s = Summary::of(&[3.0, 1.0, 2.0, 2.0]).unwrap();
        assert_eq!(s.mean, 2.0);
        assert_eq!(s.median, 2.0);
        assert_eq!(s.mode, 2.0);

        let s = Summary::of(&[5.0, 1.0, 3.0]).unwrap();
        assert_eq!(s.median, 3.0);
        // All values unique: smallest wins
        assert_eq!(s.mode, 1.0);

        assert!(Summary::of(&[]).is_none());
    }

    #[test]
    fn test_descriptive_stats() {
        let stats = descriptive_stats(&sample());
        assert_eq!(stats.orders, 4);
        let totals = stats.order_total.unwrap();
        assert_eq!(totals.mean, 360.0);
        assert_eq!(totals.median, 260.0);
        assert_eq!(totals.mode, 20.0);
    }

    #[test]
    fn test_sales_by_category_sorted_desc() {
        let totals = sales_by_category(&sample());
        assert_eq!(totals[0].key, "Electronics");
        assert_eq!(totals[0].total, 1400.0);
        assert_eq!(totals[0].orders, 2);
        assert_eq!(totals[1].key, "Books");
    }

    #[test]
    fn test_monthly_sales_and_extremes() {
        let months = monthly_sales(&sample());
        assert_eq!(
            months.iter().map(|m| m.month.as_str()).collect::<Vec<_>>(),
            vec!["2024-03", "2024-04", "2024-05"]
        );
        assert_eq!(months[0].total, 520.0);

        let extremes = monthly_extremes(&months).unwrap();
        assert_eq!(extremes.best.month, "2024-05");
        assert_eq!(extremes.worst.month, "2024-04");
        assert!(monthly_extremes(&[]).is_none());
    }

    #[test]
    fn test_product_ranking() {
        let ranking = product_ranking(&sample(), 2);
        let top: Vec<_> = ranking.top.iter().map(|g| g.key.as_str()).collect();
        let bottom: Vec<_> = ranking.bottom.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(top, vec!["Laptop", "Phone"]);
        assert_eq!(bottom, vec!["Atlas", "Novel"]);

        let ranking = product_ranking(&sample(), 10);
        assert_eq!(ranking.top.len(), 4);
        assert_eq!(ranking.bottom.len(), 4);
    }

    #[test]
    fn test_sales_by_age_and_gender() {
        let ages = sales_by_age(&sample());
        assert_eq!(ages.len(), 4);
        assert_eq!(ages[0].age, 21);
        assert_eq!(ages[0].quantity, 1);

        let genders = sales_by_gender(&sample());
        assert_eq!(genders[0].key, "F");
        assert_eq!(genders[0].total, 520.0);
        assert_eq!(genders[1].total, 920.0);
    }

    #[test]
    fn test_pearson_correlation() {
        let r = pearson_correlation(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap();
        assert!((r - 1.0).abs() < 1e-12);

        let r = pearson_correlation(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]).unwrap();
        assert!((r + 1.0).abs() < 1e-12);

        assert!(pearson_correlation(&[1.0, 1.0], &[2.0, 3.0]).is_none());
        assert!(pearson_correlation(&[1.0], &[2.0]).is_none());
    }

    #[test]
    fn test_crosstab() {
        let tab = category_payment_crosstab(&sample());
        assert_eq!(tab.payment_methods, vec!["Card", "Cash"]);
        assert_eq!(tab.rows[0].category, "Books");
        assert_eq!(tab.rows[0].counts, vec![1, 1]);
        assert_eq!(tab.rows[1].category, "Electronics");
        assert_eq!(tab.rows[1].counts, vec![1, 1]);
    }
}
