//! Test fixtures for lineage integration tests
//!
//! A small e-commerce warehouse: two raw tables, a staging layer and a mart.

use columnflow_catalog::InMemoryCatalog;
use columnflow_sql::BatchStatement;

pub fn users_columns() -> Vec<&'static str> {
    vec!["id", "email", "name", "created_at", "is_active"]
}

pub fn orders_columns() -> Vec<&'static str> {
    vec!["id", "user_id", "total_amount", "status", "created_at"]
}

/// Catalog with `raw.users`, `raw.orders` and a monthly order partition
pub fn warehouse_catalog() -> InMemoryCatalog {
    let catalog = InMemoryCatalog::new()
        .with_table("raw.users", users_columns())
        .with_table("raw.orders", orders_columns());
    catalog.add_partition("raw.orders_2024_01", "raw.orders");
    catalog
}

pub const ACTIVE_USERS: &str = "
    CREATE VIEW staging.active_users AS
    SELECT id, email, name
    FROM raw.users
    WHERE is_active";

pub const PAID_ORDERS: &str = "
    CREATE TABLE staging.paid_orders AS
    WITH paid AS (
        SELECT o.id, o.user_id, o.total_amount
        FROM raw.orders o
        WHERE o.status = 'paid'
    )
    SELECT id, user_id, total_amount AS amount FROM paid";

pub const CUSTOMER_REVENUE: &str = "
    CREATE TABLE mart.customer_revenue AS
    SELECT u.email, SUM(p.amount) AS revenue, COUNT(*) AS order_count
    FROM staging.active_users u
    JOIN staging.paid_orders p ON p.user_id = u.id
    GROUP BY u.email";

/// Mart first, so the batch has to reorder
pub fn warehouse_batch() -> Vec<BatchStatement> {
    vec![
        BatchStatement::new("customer_revenue", CUSTOMER_REVENUE),
        BatchStatement::new("active_users", ACTIVE_USERS),
        BatchStatement::new("paid_orders", PAID_ORDERS),
    ]
}
