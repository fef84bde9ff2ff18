//! Test fixtures for catalog integration tests
//!
//! Column lists for a small e-commerce warehouse.

use columnflow_catalog::InMemoryCatalog;

/// Users table columns
pub fn users_columns() -> Vec<&'static str> {
    vec!["id", "email", "name", "created_at", "is_active"]
}

/// Orders table columns
pub fn orders_columns() -> Vec<&'static str> {
    vec!["id", "user_id", "total_amount", "status", "created_at"]
}

/// Catalog with `raw.users`, `raw.orders`, and two monthly order partitions
pub fn warehouse_catalog() -> InMemoryCatalog {
    let catalog = InMemoryCatalog::new()
        .with_table("raw.users", users_columns())
        .with_table("raw.orders", orders_columns());
    catalog.add_partition("raw.orders_2024_01", "raw.orders");
    catalog.add_partition("raw.orders_2024_02", "raw.orders");
    catalog
}

/// The same warehouse as a JSON catalog file body
pub fn warehouse_json() -> &'static str {
    r#"{
        "tables": {
            "raw.users": ["id", "email", "name", "created_at", "is_active"],
            "raw.orders": ["id", "user_id", "total_amount", "status", "created_at"]
        },
        "partitions": {
            "raw.orders_2024_01": "raw.orders",
            "raw.orders_2024_02": "raw.orders"
        }
    }"#
}
