mod common;

use common::campus;
use modelbind::{AppError, Filter, SchemaInstance};
use serde_json::json;

#[tokio::test]
async fn create_then_read_back_by_identity() {
    let c = campus();
    let created = c
        .create("StudentCreate", json!({ "name": "Ann", "email": "ann@campus.edu", "api_token": "s3cret" }))
        .await;
    assert_eq!(created, json!({ "id": 1, "name": "Ann", "email": "ann@campus.edu", "dorm_id": null }));

    let filter = c.instance("StudentGet", json!({ "id": 1 }));
    let found = c.engine.get_objects(&filter, false).await.unwrap();
    assert_eq!(found, vec![created]);
}

#[tokio::test]
async fn hidden_columns_are_stored_but_never_returned() {
    let c = campus();
    let created = c
        .create("StudentCreate", json!({ "name": "Ann", "api_token": "s3cret" }))
        .await;
    assert!(created.get("api_token").is_none());
    assert_eq!(c.storage.rows("students").await[0]["api_token"], json!("s3cret"));
}

#[tokio::test]
async fn filter_is_a_conjunction_of_set_fields() {
    let c = campus();
    c.create("StudentCreate", json!({ "name": "Ann", "email": "a@campus.edu" })).await;
    c.create("StudentCreate", json!({ "name": "Ann", "email": "b@campus.edu" })).await;
    c.create("StudentCreate", json!({ "name": "Bob", "email": "a@campus.edu" })).await;

    let both = c.instance("StudentGet", json!({ "name": "Ann", "email": "a@campus.edu" }));
    let found = c.engine.get_objects(&both, false).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["id"], json!(1));

    let by_name = c.instance("StudentGet", json!({ "name": "Ann" }));
    assert_eq!(c.engine.get_objects(&by_name, false).await.unwrap().len(), 2);

    let all = c.instance("StudentGet", json!({}));
    assert_eq!(c.engine.get_objects(&all, false).await.unwrap().len(), 3);
}

#[tokio::test]
async fn no_match_is_an_empty_list() {
    let c = campus();
    let filter = c.instance("StudentGet", json!({ "name": "Nobody" }));
    assert!(c.engine.get_objects(&filter, false).await.unwrap().is_empty());
}

#[tokio::test]
async fn filtering_on_an_unknown_column_is_rejected() {
    let c = campus();
    let model = c.model.registry.model("StudentGet").unwrap().clone();
    let filter = SchemaInstance::new(model).with("shoe_size", json!(42));
    let err = c.engine.get_objects(&filter, false).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)), "{err:?}");
}

#[tokio::test]
async fn missing_required_field_fails_validation() {
    let c = campus();
    let registry = &c.model.registry;
    let model = registry.model("StudentCreate").unwrap();
    let err = SchemaInstance::from_json(registry, model, json!({ "email": "x@campus.edu" })).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "{err:?}");

    let programmatic = SchemaInstance::new(model.clone()).with("email", json!("x@campus.edu"));
    let err = c.engine.create(&programmatic, false).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "{err:?}");
    assert_eq!(c.count("students").await, 0);
}

#[tokio::test]
async fn update_touches_only_the_matched_row_and_set_fields() {
    let c = campus();
    c.create("StudentCreate", json!({ "name": "Ann", "email": "ann@campus.edu" })).await;
    c.create("StudentCreate", json!({ "name": "Bob", "email": "bob@campus.edu" })).await;

    let patch = c.instance("StudentUpdate", json!({ "name": "Annie" }));
    let students = c.model.registry.entity("students").unwrap().clone();
    let updated = c
        .engine
        .update(&patch, &Filter::by_identity(&students, json!(1)), false)
        .await
        .unwrap();
    assert_eq!(updated["name"], json!("Annie"));
    assert_eq!(updated["email"], json!("ann@campus.edu"));

    let rows = c.storage.rows("students").await;
    assert_eq!(rows[0]["name"], json!("Annie"));
    assert_eq!(rows[1]["name"], json!("Bob"));
    assert_eq!(rows[1]["email"], json!("bob@campus.edu"));
}

#[tokio::test]
async fn update_with_no_match_is_not_found() {
    let c = campus();
    let patch = c.instance("StudentUpdate", json!({ "name": "Ghost" }));
    let err = c
        .engine
        .update(&patch, &Filter::new().eq("id", json!(99)), false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "{err:?}");

    let err = c
        .engine
        .update_bulk(&patch, &Filter::new().eq("id", json!(99)), false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "{err:?}");
}

#[tokio::test]
async fn single_update_over_many_matches_is_ambiguous() {
    let c = campus();
    c.create("StudentCreate", json!({ "name": "Ann" })).await;
    c.create("StudentCreate", json!({ "name": "Ann" })).await;

    let patch = c.instance("StudentUpdate", json!({ "email": "ann@campus.edu" }));
    let by_name = Filter::new().eq("name", json!("Ann"));
    let err = c.engine.update(&patch, &by_name, false).await.unwrap_err();
    assert!(matches!(err, AppError::AmbiguousUpdate { matched: 2 }), "{err:?}");
    assert!(c.storage.rows("students").await.iter().all(|r| r["email"].is_null()));

    let updated = c.engine.update_bulk(&patch, &by_name, false).await.unwrap();
    assert_eq!(updated.len(), 2);
    assert!(c
        .storage
        .rows("students")
        .await
        .iter()
        .all(|r| r["email"] == json!("ann@campus.edu")));
}

#[tokio::test]
async fn unique_violation_is_a_storage_constraint() {
    let c = campus();
    c.create("DormCreate", json!({ "name": "North" })).await;
    let dup = c.instance("DormCreate", json!({ "name": "North" }));
    let err = c.engine.create(&dup, false).await.unwrap_err();
    assert!(matches!(err, AppError::StorageConstraint(_)), "{err:?}");
    assert_eq!(c.count("dorms").await, 1);
}

#[tokio::test]
async fn declared_rules_are_checked_at_the_boundary() {
    let c = campus();
    let registry = &c.model.registry;
    let model = registry.model("StudentCreate").unwrap();
    let err = SchemaInstance::from_json(registry, model, json!({ "name": "Ann", "email": "not-an-email" }))
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "{err:?}");

    let long = "x".repeat(101);
    let err = SchemaInstance::from_json(registry, model, json!({ "name": long })).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "{err:?}");
}
