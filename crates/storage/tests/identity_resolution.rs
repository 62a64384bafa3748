#![forbid(unsafe_code)]

use crm_core::{ActorId, CallerContext, Entity, EntityType};
use crm_storage::{
    CreateEntityRequest, DB_FILE_NAME, EntityRef, ListTrashRequest, SqliteStore, StoreError,
};
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use std::path::PathBuf;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("crm_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn agent(id: &str) -> CallerContext {
    CallerContext::owner(ActorId::try_new(id).expect("actor id"))
}

fn broker(id: &str) -> CallerContext {
    CallerContext::all(ActorId::try_new(id).expect("actor id"))
}

fn create(
    store: &mut SqliteStore,
    ctx: &CallerContext,
    entity_type: EntityType,
    title: &str,
) -> Entity {
    store
        .create_entity(
            ctx,
            CreateEntityRequest {
                entity_type,
                title: title.to_string(),
                owner_id: None,
                raw_status: None,
                volume: None,
                commission: None,
            },
        )
        .expect("create entity")
}

#[test]
fn created_entities_get_three_identifiers() {
    let storage_dir = temp_dir("created_entities_get_three_identifiers");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let ctx = agent("agent-a");

    let first = create(&mut store, &ctx, EntityType::Escrow, "12 Elm St");
    let second = create(&mut store, &ctx, EntityType::Escrow, "14 Elm St");
    let listing = create(&mut store, &ctx, EntityType::Listing, "9 Oak Ave");

    assert!(first.display_id.starts_with("ESC-"));
    assert!(first.display_id.ends_with("-001"), "{}", first.display_id);
    assert!(second.display_id.ends_with("-002"), "{}", second.display_id);
    assert!(listing.display_id.starts_with("LST-"));
    assert!(listing.display_id.ends_with("-001"), "{}", listing.display_id);

    assert!(first.external_id.starts_with("escrow-"));
    assert_ne!(first.external_id, second.external_id);
    assert!(second.surrogate_id > first.surrogate_id);
    assert_eq!(first.raw_status, "active");
    assert_eq!(first.revision, 1);
    assert_eq!(first.updated_by.as_deref(), Some("agent-a"));
}

#[test]
fn every_identifier_form_fetches_the_same_row() {
    let storage_dir = temp_dir("every_identifier_form_fetches_the_same_row");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let ctx = agent("agent-a");
    let escrow = create(&mut store, &ctx, EntityType::Escrow, "12 Elm St");

    let bare_uuid = escrow
        .external_id
        .strip_prefix("escrow-")
        .expect("external prefix")
        .to_ascii_uppercase();
    let tokens = [
        escrow.surrogate_id.to_string(),
        format!("  {}  ", escrow.surrogate_id),
        escrow.display_id.clone(),
        escrow.display_id.to_ascii_lowercase(),
        escrow.external_id.clone(),
        bare_uuid,
    ];
    for token in tokens {
        let fetched = store
            .resolve_and_fetch(&ctx, &EntityRef::new(EntityType::Escrow, token.clone()))
            .unwrap_or_else(|err| panic!("token {token:?} failed: {err}"));
        assert_eq!(fetched, escrow, "token {token:?}");
    }
}

#[test]
fn malformed_and_missing_are_distinct() {
    let storage_dir = temp_dir("malformed_and_missing_are_distinct");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let ctx = agent("agent-a");
    let escrow = create(&mut store, &ctx, EntityType::Escrow, "12 Elm St");

    for token in ["", "escrow-xyz", "'; DROP TABLE escrows; --", "LST-2025-001"] {
        match store.resolve_and_fetch(&ctx, &EntityRef::new(EntityType::Escrow, token)) {
            Err(StoreError::Malformed { .. }) => {}
            other => panic!("expected Malformed for {token:?}, got {other:?}"),
        }
    }

    for token in ["0", "999999", "ESC-1999-001", "escrow-00000000-0000-4000-8000-000000000000"] {
        match store.resolve_and_fetch(&ctx, &EntityRef::new(EntityType::Escrow, token)) {
            Err(StoreError::NotFound { kind, .. }) => assert_eq!(kind, "escrow"),
            other => panic!("expected NotFound for {token:?}, got {other:?}"),
        }
    }

    let as_listing = store.resolve_and_fetch(
        &ctx,
        &EntityRef::new(EntityType::Listing, escrow.display_id.clone()),
    );
    assert!(matches!(as_listing, Err(StoreError::Malformed { .. })));

    let escrows = Connection::open(storage_dir.join(DB_FILE_NAME))
        .expect("open raw")
        .query_row("SELECT COUNT(1) FROM escrows", [], |row| row.get::<_, i64>(0))
        .expect("count escrows");
    assert_eq!(escrows, 1);
}

#[test]
fn owner_scope_hides_foreign_rows() {
    let storage_dir = temp_dir("owner_scope_hides_foreign_rows");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let alice = agent("alice");
    let bob = agent("bob");
    let escrow = create(&mut store, &alice, EntityType::Escrow, "12 Elm St");

    let target = EntityRef::new(EntityType::Escrow, escrow.display_id.clone());
    assert!(matches!(
        store.resolve_and_fetch(&bob, &target),
        Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(
        store.soft_delete(&bob, &target, None),
        Err(StoreError::NotFound { .. })
    ));
    assert_eq!(
        store
            .resolve_and_fetch(&broker("manager"), &target)
            .expect("broker sees all")
            .owner_id,
        "alice"
    );
}

#[test]
fn owner_scope_cannot_create_for_someone_else() {
    let storage_dir = temp_dir("owner_scope_cannot_create_for_someone_else");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let request = CreateEntityRequest {
        entity_type: EntityType::Client,
        title: "Jordan Lee".to_string(),
        owner_id: Some("bob".to_string()),
        raw_status: None,
        volume: None,
        commission: None,
    };

    let err = store
        .create_entity(&agent("alice"), request.clone())
        .expect_err("owner scope must not assign");
    assert!(matches!(err, StoreError::InvalidInput(_)));

    let client = store
        .create_entity(&broker("manager"), request)
        .expect("broker assigns owner");
    assert_eq!(client.owner_id, "bob");
    assert_eq!(client.updated_by.as_deref(), Some("manager"));
}

#[test]
fn intake_validates_status_and_money() {
    let storage_dir = temp_dir("intake_validates_status_and_money");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let ctx = agent("agent-a");

    let bad_status = store.create_entity(
        &ctx,
        CreateEntityRequest {
            entity_type: EntityType::Escrow,
            title: "12 Elm St".to_string(),
            owner_id: None,
            raw_status: Some("in_escrow".to_string()),
            volume: None,
            commission: None,
        },
    );
    assert!(matches!(bad_status, Err(StoreError::InvalidInput(_))));

    let money_on_lead = store.create_entity(
        &ctx,
        CreateEntityRequest {
            entity_type: EntityType::Lead,
            title: "Walk-in".to_string(),
            owner_id: None,
            raw_status: None,
            volume: Some(Decimal::from(10)),
            commission: None,
        },
    );
    assert!(matches!(money_on_lead, Err(StoreError::InvalidInput(_))));

    let lead = store
        .create_entity(
            &ctx,
            CreateEntityRequest {
                entity_type: EntityType::Lead,
                title: "Walk-in".to_string(),
                owner_id: None,
                raw_status: Some("Contacted".to_string()),
                volume: None,
                commission: None,
            },
        )
        .expect("create lead");
    assert_eq!(lead.raw_status, "contacted");

    let escrow = store
        .create_entity(
            &ctx,
            CreateEntityRequest {
                entity_type: EntityType::Escrow,
                title: "12 Elm St".to_string(),
                owner_id: None,
                raw_status: None,
                volume: Some(Decimal::new(52_500_050, 2)),
                commission: Some(Decimal::new(13_125, 0)),
            },
        )
        .expect("create escrow");
    let fetched = store
        .resolve_and_fetch(&ctx, &EntityRef::new(EntityType::Escrow, escrow.display_id))
        .expect("fetch escrow");
    assert_eq!(fetched.volume, Some(Decimal::new(52_500_050, 2)));
    assert_eq!(fetched.commission, Some(Decimal::from(13_125)));
}

#[test]
fn deleted_rows_leave_default_reads_but_keep_identifiers() {
    let storage_dir = temp_dir("deleted_rows_leave_default_reads_but_keep_identifiers");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let ctx = agent("agent-a");
    let escrow = create(&mut store, &ctx, EntityType::Escrow, "12 Elm St");
    let target = EntityRef::new(EntityType::Escrow, escrow.external_id.clone());

    store.soft_delete(&ctx, &target, None).expect("delete");
    assert!(matches!(
        store.resolve_and_fetch(&ctx, &target),
        Err(StoreError::NotFound { .. })
    ));

    let trash = store
        .list_trash(
            &ctx,
            ListTrashRequest {
                entity_type: EntityType::Escrow,
                limit: 10,
                offset: 0,
            },
        )
        .expect("list trash");
    assert_eq!(trash.len(), 1);
    assert_eq!(trash[0].display_id, escrow.display_id);

    let next = create(&mut store, &ctx, EntityType::Escrow, "16 Elm St");
    assert_ne!(next.display_id, escrow.display_id);
    assert!(next.surrogate_id > escrow.surrogate_id);

    let registered = Connection::open(storage_dir.join(DB_FILE_NAME))
        .expect("open raw")
        .query_row(
            "SELECT surrogate_id FROM external_ids WHERE external_id=?1 AND entity_type='escrow'",
            params![escrow.external_id],
            |row| row.get::<_, i64>(0),
        )
        .expect("registry row");
    assert_eq!(registered, escrow.surrogate_id);
}

#[test]
fn data_survives_reopen() {
    let storage_dir = temp_dir("data_survives_reopen");
    let display_id = {
        let mut store = SqliteStore::open(&storage_dir).expect("open store");
        create(&mut store, &agent("agent-a"), EntityType::Appointment, "Showing").display_id
    };

    let mut store = SqliteStore::open(&storage_dir).expect("reopen store");
    let fetched = store
        .resolve_and_fetch(
            &agent("agent-a"),
            &EntityRef::new(EntityType::Appointment, display_id.clone()),
        )
        .expect("fetch after reopen");
    assert_eq!(fetched.raw_status, "scheduled");

    let next = create(&mut store, &agent("agent-a"), EntityType::Appointment, "Showing 2");
    assert!(next.display_id.ends_with("-002"), "{}", next.display_id);
}

#[test]
fn foreign_schema_version_is_refused() {
    let storage_dir = temp_dir("foreign_schema_version_is_refused");
    drop(SqliteStore::open(&storage_dir).expect("open store"));

    Connection::open(storage_dir.join(DB_FILE_NAME))
        .expect("open raw")
        .execute(
            "UPDATE meta SET value='legacy' WHERE key='schema_version'",
            [],
        )
        .expect("rewrite schema version");

    match SqliteStore::open(&storage_dir) {
        Err(StoreError::InvalidInput(message)) => assert!(message.starts_with("RESET_REQUIRED")),
        other => panic!("expected RESET_REQUIRED, got {other:?}"),
    }
}
