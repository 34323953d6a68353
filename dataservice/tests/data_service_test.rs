//! 데이터 서비스 통합 테스트 (in-memory SQLite)

use dataservice::service::db::query::CteBody;
use dataservice::service::db::{
    AlterAction, ColumnDefinition, ColumnType, Condition, ConditionMap, DataService, DataServiceConfig,
    IsolationBoundary, OrderBy, QuerySpec, Row, TableBlueprint,
};
use dataservice::DataError;
use serde_json::{json, Value};

fn service() -> DataService {
    let config = DataServiceConfig::new().with_connection("central", "sqlite::memory:");
    DataService::new(config).unwrap()
}

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

fn conditions(value: Value) -> ConditionMap {
    value.as_object().cloned().unwrap()
}

fn users_blueprint() -> TableBlueprint {
    TableBlueprint::new(vec![
        ColumnDefinition::new("id", ColumnType::BigIncrements),
        ColumnDefinition::new("name", ColumnType::String).length(100).not_null(),
        ColumnDefinition::new("email", ColumnType::String).length(255).encrypted(),
    ])
}

async fn service_with_users() -> DataService {
    let service = service();
    service.create_table("central", "users", &users_blueprint()).await.unwrap();
    service
        .insert_many(
            "central",
            "users",
            vec![
                row(json!({"name": "kim", "email": "same@x.io"})),
                row(json!({"name": "lee", "email": "same@x.io"})),
                row(json!({"name": "park", "email": "other@x.io"})),
            ],
        )
        .await
        .unwrap();
    service
}

#[tokio::test]
async fn test_encrypted_columns_are_stored_as_ciphertext() {
    let service = service_with_users().await;

    let raw = service
        .select_raw("central", "SELECT email, email_hash FROM users ORDER BY id", vec![])
        .await
        .unwrap();
    let first = raw[0]["email"].as_str().unwrap();
    let second = raw[1]["email"].as_str().unwrap();

    assert!(first.starts_with("enc:c20p:1:"));
    assert_ne!(first, second);
    assert_eq!(raw[0]["email_hash"], raw[1]["email_hash"]);
    assert_ne!(raw[0]["email_hash"], raw[2]["email_hash"]);
}

#[tokio::test]
async fn test_equality_search_on_encrypted_column() {
    let service = service_with_users().await;

    let rows = service
        .fetch("central", "users", &conditions(json!({"email": "same@x.io"})))
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row["email"], json!("same@x.io"));
        assert!(!row.contains_key("email_hash"));
    }

    let count = service
        .fetch_count("central", "users", &conditions(json!({"email": ["same@x.io", "other@x.io"]})))
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_range_search_on_encrypted_column_is_rejected() {
    let service = service_with_users().await;

    let spec = QuerySpec::new().filter(Condition::new("email", "LIKE", "same%"));
    let err = service.query("central", "users", &spec).await.unwrap_err();
    assert!(matches!(err, DataError::QuerySpec(_)));
}

#[tokio::test]
async fn test_update_reencrypts_values() {
    let service = service_with_users().await;

    let affected = service
        .edit(
            "central",
            "users",
            row(json!({"email": "new@x.io"})),
            &conditions(json!({"name": "park"})),
        )
        .await
        .unwrap();
    assert_eq!(affected.affected_rows, 1);

    let rows = service
        .fetch("central", "users", &conditions(json!({"email": "new@x.io"})))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], json!("park"));
}

#[tokio::test]
async fn test_key_rotation_keeps_old_rows_readable() {
    let service = service_with_users().await;

    let version = service.rotate_encryption_key(None).unwrap();
    assert_eq!(version, 2);

    service
        .insert("central", "users", row(json!({"name": "choi", "email": "same@x.io"})))
        .await
        .unwrap();

    let raw = service
        .select_raw("central", "SELECT email FROM users WHERE name = ?", vec![json!("choi")])
        .await
        .unwrap();
    assert!(raw[0]["email"].as_str().unwrap().starts_with("enc:c20p:2:"));

    let rows = service
        .fetch("central", "users", &conditions(json!({"email": "same@x.io"})))
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn test_soft_delete_and_restore() {
    let service = service();
    let blueprint = TableBlueprint::new(vec![
        ColumnDefinition::new("id", ColumnType::Increments),
        ColumnDefinition::new("title", ColumnType::String),
    ])
    .soft_delete();
    service.create_table("central", "posts", &blueprint).await.unwrap();
    service
        .insert_many(
            "central",
            "posts",
            vec![row(json!({"title": "a"})), row(json!({"title": "b"}))],
        )
        .await
        .unwrap();

    let first = [Condition::eq("id", 1)];
    let deleted = service.delete("central", "posts", &first).await.unwrap();
    assert_eq!(deleted.affected_rows, 1);

    let visible = service.fetch("central", "posts", &ConditionMap::new()).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0]["title"], json!("b"));

    let everything = service
        .query("central", "posts", &QuerySpec::new().with_trashed().order_by(OrderBy::asc("id")))
        .await
        .unwrap();
    assert_eq!(everything.len(), 2);
    assert!(!everything[0]["deleted_at"].is_null());

    service.restore("central", "posts", &first).await.unwrap();
    assert_eq!(service.fetch_count("central", "posts", &ConditionMap::new()).await.unwrap(), 2);

    service.permanent_delete("central", "posts", &first).await.unwrap();
    let remaining = service
        .query("central", "posts", &QuerySpec::new().with_trashed())
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn test_alter_add_then_drop_column() {
    let service = service_with_users().await;

    service
        .alter_table(
            "central",
            "users",
            vec![AlterAction::Add(ColumnDefinition::new("nickname", ColumnType::String).length(50))],
        )
        .await
        .unwrap();
    service
        .edit(
            "central",
            "users",
            row(json!({"nickname": "k"})),
            &conditions(json!({"name": "kim"})),
        )
        .await
        .unwrap();
    let rows = service
        .fetch("central", "users", &conditions(json!({"nickname": "k"})))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    service
        .alter_table("central", "users", vec![AlterAction::Drop { name: "nickname".into() }])
        .await
        .unwrap();
    let rows = service.fetch("central", "users", &ConditionMap::new()).await.unwrap();
    assert!(!rows[0].contains_key("nickname"));
}

#[tokio::test]
async fn test_dropping_encrypted_column_removes_its_hash() {
    let service = service_with_users().await;

    service
        .alter_table("central", "users", vec![AlterAction::Drop { name: "email".into() }])
        .await
        .unwrap();

    let raw = service.select_raw("central", "SELECT * FROM users", vec![]).await.unwrap();
    assert!(!raw[0].contains_key("email"));
    assert!(!raw[0].contains_key("email_hash"));
    assert!(service.codec().columns("central", "users").is_empty());
}

#[tokio::test]
async fn test_failed_schema_step_is_reported() {
    let service = service_with_users().await;

    let err = service
        .alter_table(
            "central",
            "users",
            vec![
                AlterAction::Add(ColumnDefinition::new("nickname", ColumnType::String)),
                AlterAction::Drop { name: "missing".into() },
            ],
        )
        .await
        .unwrap_err();

    match err {
        DataError::SchemaOperation { step, statement, .. } => {
            assert_eq!(step, 3);
            assert!(statement.contains("DROP COLUMN"));
        }
        other => panic!("unexpected error {other:?}"),
    }

    // 앞선 단계는 유지됨
    service
        .edit(
            "central",
            "users",
            row(json!({"nickname": "still here"})),
            &conditions(json!({"name": "kim"})),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_grant_is_not_supported_on_sqlite() {
    let service = service_with_users().await;

    let err = service
        .grant("central", "users", &["SELECT".to_string()], "reader")
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::SqlCompilation { .. }));
}

#[tokio::test]
async fn test_upsert_updates_existing_rows() {
    let service = service();
    let blueprint = TableBlueprint::new(vec![
        ColumnDefinition::new("sku", ColumnType::String).length(32).unique(),
        ColumnDefinition::new("stock", ColumnType::Integer),
    ]);
    service.create_table("central", "items", &blueprint).await.unwrap();
    service
        .insert("central", "items", row(json!({"sku": "A-1", "stock": 1})))
        .await
        .unwrap();

    service
        .upsert(
            "central",
            "items",
            vec![row(json!({"sku": "A-1", "stock": 5})), row(json!({"sku": "B-2", "stock": 2}))],
            &["sku".to_string()],
            None,
        )
        .await
        .unwrap();

    let rows = service
        .fetch("central", "items", &conditions(json!({"sku": "A-1"})))
        .await
        .unwrap();
    assert_eq!(rows[0]["stock"], json!(5));
    assert_eq!(service.fetch_count("central", "items", &ConditionMap::new()).await.unwrap(), 2);
}

#[tokio::test]
async fn test_tenant_connections_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let template = format!("sqlite://{}/tenant_{{id}}.db", dir.path().display());
    let config = DataServiceConfig::new()
        .with_connection("central", "sqlite::memory:")
        .with_tenant_template(template);
    let service = DataService::new(config).unwrap();

    let acme = service.registry().resolve("tenant_acme").unwrap();
    assert_eq!(acme, service.registry().resolve("tenant_acme").unwrap());
    assert_eq!(acme.isolation, IsolationBoundary::Tenant("acme".to_string()));
    assert!(matches!(
        service.registry().resolve("tenant_../etc"),
        Err(DataError::ConnectionNotFound(_))
    ));

    let blueprint = TableBlueprint::new(vec![ColumnDefinition::new("name", ColumnType::String)]);
    for tenant in ["tenant_acme", "tenant_beta"] {
        service.create_table(tenant, "notes", &blueprint).await.unwrap();
    }
    service
        .insert("tenant_acme", "notes", row(json!({"name": "only acme"})))
        .await
        .unwrap();

    assert_eq!(service.fetch_count("tenant_acme", "notes", &ConditionMap::new()).await.unwrap(), 1);
    assert_eq!(service.fetch_count("tenant_beta", "notes", &ConditionMap::new()).await.unwrap(), 0);

    service.close().await;
}

#[tokio::test]
async fn test_encrypt_decrypt_round_trip() {
    let service = service();

    let ciphertext = service.encrypt("central", "민감한 값").unwrap();
    assert!(ciphertext.starts_with("enc:"));
    assert_eq!(service.decrypt("central", &ciphertext).unwrap(), "민감한 값");

    let mut tampered = ciphertext.clone();
    tampered.pop();
    tampered.push(if ciphertext.ends_with('A') { 'B' } else { 'A' });
    assert!(matches!(service.decrypt("central", &tampered), Err(DataError::Decryption(_))));
}

#[tokio::test]
async fn test_health_check() {
    let service = service();
    assert!(service.health_check("central").await.unwrap());
    assert!(service.health_check("missing").await.is_err());
}

#[tokio::test]
async fn test_secret_column_survives_add_and_drop_in_one_alter() {
    let service = service();
    let blueprint = TableBlueprint::new(vec![
        ColumnDefinition::new("id", ColumnType::BigIncrements),
        ColumnDefinition::new("secret", ColumnType::Text).encrypted(),
    ]);
    service.create_table("central", "vault", &blueprint).await.unwrap();
    service
        .insert("central", "vault", row(json!({"secret": "s3cr3t"})))
        .await
        .unwrap();

    let outcome = service
        .alter_table(
            "central",
            "vault",
            vec![
                AlterAction::Add(ColumnDefinition::new("age", ColumnType::Integer)),
                AlterAction::Drop { name: "age".into() },
            ],
        )
        .await
        .unwrap();
    assert!(outcome.statements[0].contains("ADD COLUMN"));
    assert!(outcome.statements.last().unwrap().contains("DROP COLUMN"));

    let raw = service.select_raw("central", "SELECT * FROM vault", vec![]).await.unwrap();
    assert!(!raw[0].contains_key("age"));
    assert!(raw[0].contains_key("secret_hash"));

    let rows = service.fetch("central", "vault", &ConditionMap::new()).await.unwrap();
    assert_eq!(rows[0]["secret"], json!("s3cr3t"));
}

#[tokio::test]
async fn test_alter_actions_build_on_each_other() {
    let service = service_with_users().await;
    let secret = || AlterAction::Add(ColumnDefinition::new("secret", ColumnType::String).encrypted());

    service
        .alter_table("central", "users", vec![secret(), AlterAction::Drop { name: "secret".into() }])
        .await
        .unwrap();
    let raw = service.select_raw("central", "SELECT * FROM users", vec![]).await.unwrap();
    assert!(!raw[0].contains_key("secret"));
    assert!(!raw[0].contains_key("secret_hash"));
    let columns: Vec<String> = service
        .codec()
        .columns("central", "users")
        .into_iter()
        .map(|spec| spec.column)
        .collect();
    assert_eq!(columns, vec!["email".to_string()]);

    let err = service
        .alter_table(
            "central",
            "users",
            vec![
                secret(),
                AlterAction::Rename {
                    name: "secret".into(),
                    to: "s2".into(),
                },
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::QuerySpec(_)));
    let raw = service.select_raw("central", "SELECT * FROM users", vec![]).await.unwrap();
    assert!(!raw[0].contains_key("secret"));
}

#[tokio::test]
async fn test_union_and_cte_reads_are_scoped() {
    let service = service_with_users().await;
    let archive = TableBlueprint::new(vec![ColumnDefinition::new("name", ColumnType::String)]).soft_delete();
    service.create_table("central", "archive", &archive).await.unwrap();
    service
        .insert("central", "archive", row(json!({"name": "gone"})))
        .await
        .unwrap();
    service
        .delete("central", "archive", &[Condition::eq("name", "gone")])
        .await
        .unwrap();

    // 본문의 암호화 조건과 UNION 쪽 soft delete
    let spec = QuerySpec::new()
        .select(["name"])
        .filter(Condition::eq("email", "other@x.io"))
        .union("archive", QuerySpec::new().select(["name"]), true);
    let rows = service.query("central", "users", &spec).await.unwrap();
    assert_eq!(rows, vec![row(json!({"name": "park"}))]);

    // UNION 쪽 암호화 조건
    let spec = QuerySpec::new().select(["name"]).union(
        "users",
        QuerySpec::new().select(["name"]).filter(Condition::eq("email", "same@x.io")),
        true,
    );
    let rows = service.query("central", "archive", &spec).await.unwrap();
    assert_eq!(rows.len(), 2);

    let trashed = service
        .query("central", "archive", &spec.clone().with_trashed())
        .await
        .unwrap();
    assert_eq!(trashed.len(), 3);

    // CTE 본문의 암호화 조건
    let spec = QuerySpec::new().select(["name"]).with_cte(
        "matches",
        CteBody::Query {
            table: "users".into(),
            query: Box::new(QuerySpec::new().filter(Condition::eq("email", "other@x.io"))),
        },
    );
    let rows = service.query("central", "matches", &spec).await.unwrap();
    assert_eq!(rows, vec![row(json!({"name": "park"}))]);
}

#[tokio::test]
async fn test_encrypted_lookup_respects_json_types() {
    let service = service();
    let blueprint = TableBlueprint::new(vec![
        ColumnDefinition::new("id", ColumnType::Increments),
        ColumnDefinition::new("code", ColumnType::String).encrypted(),
    ]);
    service.create_table("central", "codes", &blueprint).await.unwrap();
    service
        .insert("central", "codes", row(json!({"code": "5"})))
        .await
        .unwrap();

    let by_number = service
        .fetch("central", "codes", &conditions(json!({"code": 5})))
        .await
        .unwrap();
    assert!(by_number.is_empty());

    let by_text = service
        .fetch("central", "codes", &conditions(json!({"code": "5"})))
        .await
        .unwrap();
    assert_eq!(by_text.len(), 1);
    assert_eq!(by_text[0]["code"], json!("5"));
}
