//! Integration tests for the catalog collaborators

mod fixtures;

use columnflow_catalog::{
    CatalogError, CatalogProvider, InMemoryCatalog, PartitionResolver, RelationName,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn json_catalog_matches_builder_catalog() {
    let from_json = InMemoryCatalog::from_json_str(fixtures::warehouse_json()).unwrap();
    let built = fixtures::warehouse_catalog();

    for relation in ["raw.users", "raw.orders"] {
        let name = RelationName::parse(relation);
        assert_eq!(
            from_json.lookup_columns(&name).unwrap(),
            built.lookup_columns(&name).unwrap()
        );
    }

    assert_eq!(from_json.parent_of("raw.orders_2024_02"), built.parent_of("raw.orders_2024_02"));
}

#[test]
fn catalog_file_roundtrip() {
    let dir = std::env::temp_dir().join(format!("columnflow-catalog-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("catalog.json");
    std::fs::write(&path, fixtures::warehouse_json()).unwrap();

    let catalog = InMemoryCatalog::from_file(&path).unwrap();
    assert_eq!(catalog.table_count(), 2);
    assert!(catalog.has_table("RAW.USERS"));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_file_is_a_load_error() {
    let err = InMemoryCatalog::from_file(std::path::Path::new("/nonexistent/catalog.json"))
        .err()
        .unwrap();
    assert!(matches!(err, CatalogError::LoadError(_)));
}

#[test]
fn clones_share_state() {
    let catalog = fixtures::warehouse_catalog();
    let clone = catalog.clone();

    catalog.add_table("raw.products", ["id", "sku"]);

    assert!(clone.has_table("raw.products"));
}

#[test]
fn usable_as_trait_objects() {
    let catalog = Arc::new(fixtures::warehouse_catalog().with_name("fixture"));
    let provider: Arc<dyn CatalogProvider> = catalog.clone();
    let partitions: Arc<dyn PartitionResolver> = catalog;

    assert_eq!(provider.name(), "fixture");
    assert_eq!(
        provider.lookup_columns(&RelationName::parse("users")).unwrap(),
        fixtures::users_columns()
    );
    assert_eq!(partitions.parent_of("RAW.ORDERS_2024_01"), Some("raw.orders".to_string()));
}

#[test]
fn lookup_failure_is_reported() {
    let catalog = fixtures::warehouse_catalog().with_lookup_failure();

    let err = catalog.lookup_columns(&RelationName::parse("raw.users")).unwrap_err();
    assert!(matches!(err, CatalogError::LookupFailed(_)));
}
