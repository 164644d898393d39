mod common;

use common::campus;
use modelbind::{AppError, ConfigError, Include, Serializer, Storage};
use serde_json::json;

#[tokio::test]
async fn back_references_are_cut_on_the_current_path() {
    let c = campus();
    c.create("StudentCreate", json!({ "name": "Ann", "dorm": { "name": "North" }, "courses": [{ "title": "Math" }] }))
        .await;
    c.create("StudentCreate", json!({ "name": "Bob", "courses": [1] })).await;

    let filter = c.instance("CourseGet", json!({ "id": 1 }));
    let courses = c.engine.get_objects(&filter, true).await.unwrap();
    assert_eq!(
        courses,
        vec![json!({
            "id": 1,
            "title": "Math",
            "students": [
                {
                    "id": 1, "name": "Ann", "email": null, "dorm_id": 1,
                    "dorm": { "id": 1, "name": "North" },
                    "courses": []
                },
                {
                    "id": 2, "name": "Bob", "email": null, "dorm_id": null,
                    "dorm": null,
                    "courses": []
                }
            ]
        })]
    );
}

#[tokio::test]
async fn siblings_off_the_path_are_still_embedded() {
    let c = campus();
    c.create("StudentCreate", json!({ "name": "Ann", "courses": [{ "title": "Math" }, { "title": "Art" }] }))
        .await;
    c.create("StudentCreate", json!({ "name": "Bob", "courses": [2] })).await;

    let filter = c.instance("StudentGet", json!({ "id": 1 }));
    let ann = c.engine.get_objects(&filter, true).await.unwrap().remove(0);

    // Ann -> Art -> students: Ann is on the path, Bob is not.
    let art = &ann["courses"][1];
    assert_eq!(art["title"], json!("Art"));
    let names: Vec<_> = art["students"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("Bob")]);
    // Bob -> courses: Art is on the path, nothing else is linked.
    assert_eq!(art["students"][0]["courses"], json!([]));
}

#[tokio::test]
async fn include_relations_false_emits_columns_only() {
    let c = campus();
    c.create("StudentCreate", json!({ "name": "Ann", "dorm": { "name": "North" } })).await;
    let filter = c.instance("StudentGet", json!({}));
    let rows = c.engine.get_objects(&filter, false).await.unwrap();
    assert_eq!(rows, vec![json!({ "id": 1, "name": "Ann", "email": null, "dorm_id": 1 })]);
}

#[tokio::test]
async fn unknown_relation_name_is_a_config_error() {
    let c = campus();
    c.create("StudentCreate", json!({ "name": "Ann" })).await;

    let registry = &c.model.registry;
    let students = registry.entity("students").unwrap();
    let row = c.storage.rows("students").await.remove(0);
    let mut session = c.storage.begin().await.unwrap();
    let err = Serializer::new(registry)
        .serialize(session.as_mut(), students, &row, &Include::Fields(vec!["roommates".into()]))
        .await
        .unwrap_err();
    session.rollback().await.unwrap();
    assert!(
        matches!(err, AppError::Config(ConfigError::UnknownRelation { ref field, .. }) if field == "roommates"),
        "{err:?}"
    );
}
