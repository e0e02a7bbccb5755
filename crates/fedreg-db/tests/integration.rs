use fedreg_db::{create_pool, run_migrations, DbRuntimeSettings};

#[test]
fn db_initialization_works() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("fedreg.db");
    let pool = create_pool(
        path.to_str().expect("utf-8 path"),
        DbRuntimeSettings::default(),
    )
    .expect("failed to create pool");

    let conn = pool.get().expect("failed to get connection");
    let applied = run_migrations(&conn).expect("failed to run migrations");
    assert_eq!(applied, 4);

    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .expect("failed to prepare table query");
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .expect("failed to execute table query")
        .map(|r| r.expect("failed to read table name"))
        .collect();

    assert_eq!(
        tables,
        vec![
            "_fedreg_migrations",
            "allowed_entities",
            "blocked_entities",
            "entities",
            "entity_revisions",
            "has_entity",
            "metadata",
            "subscriptions",
            "users",
        ]
    );
}

#[test]
fn schema_is_shared_across_pooled_connections() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("fedreg.db");
    let pool = create_pool(
        path.to_str().expect("utf-8 path"),
        DbRuntimeSettings::default(),
    )
    .expect("failed to create pool");

    {
        let conn = pool.get().expect("failed to get connection");
        run_migrations(&conn).expect("failed to run migrations");
        conn.execute("INSERT INTO users (user_id) VALUES ('admin')", [])
            .expect("failed to insert user");
    }

    let a = pool.get().expect("failed to get first connection");
    let b = pool.get().expect("failed to get second connection");
    let count: i64 = b
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .expect("failed to count users");
    assert_eq!(count, 1);
    drop(a);
}
