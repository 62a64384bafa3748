#![forbid(unsafe_code)]

use crm_core::{ActorId, CallerContext, Category, EntityType, SummaryFilter, TabCounts};
use crm_storage::{CreateEntityRequest, EntityRef, SetArchivedRequest, SqliteStore, StoreError};
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

fn escrow(
    store: &mut SqliteStore,
    ctx: &CallerContext,
    raw_status: &str,
    volume: Option<i64>,
) -> crm_core::Entity {
    store
        .create_entity(
            ctx,
            CreateEntityRequest {
                entity_type: EntityType::Escrow,
                title: format!("{raw_status} escrow"),
                owner_id: None,
                raw_status: Some(raw_status.to_string()),
                volume: volume.map(Decimal::from),
                commission: volume.map(|v| Decimal::from(v) * Decimal::new(3, 2)),
            },
        )
        .expect("create escrow")
}

#[test]
fn escrow_stat_cards_match_dashboard_example() {
    let storage_dir = temp_dir("escrow_stat_cards_match_dashboard_example");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let ctx = agent("agent-a");

    escrow(&mut store, &ctx, "active", Some(400_000));
    escrow(&mut store, &ctx, "active", None);
    escrow(&mut store, &ctx, "pending", Some(650_000));
    escrow(&mut store, &ctx, "closed", Some(500_000));
    escrow(&mut store, &ctx, "closed", Some(700_000));
    escrow(&mut store, &ctx, "cancelled", Some(300_000));

    let summary = store
        .summarize(&ctx, EntityType::Escrow, SummaryFilter::default())
        .expect("summarize");
    assert!(summary.tracks_money);
    assert_eq!(summary.get(Category::Active).count, 3);
    assert_eq!(summary.get(Category::Won).count, 2);
    assert_eq!(summary.get(Category::Won).volume, Decimal::from(1_200_000));
    assert_eq!(summary.get(Category::Won).commission, Decimal::from(36_000));
    assert_eq!(summary.get(Category::Lost).count, 1);

    let active = summary.get(Category::Active);
    assert_eq!(active.priced_count, 2);
    assert_eq!(active.average_volume(), Some(Decimal::from(525_000)));
}

#[test]
fn archived_and_deleted_rows_follow_the_filter() {
    let storage_dir = temp_dir("archived_and_deleted_rows_follow_the_filter");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let ctx = agent("agent-a");

    escrow(&mut store, &ctx, "closed", Some(100));
    let archived = escrow(&mut store, &ctx, "closed", Some(200));
    let deleted = escrow(&mut store, &ctx, "closed", Some(400));
    store
        .set_archived(
            &ctx,
            SetArchivedRequest {
                target: EntityRef::new(EntityType::Escrow, archived.display_id),
                archived: true,
                expected_revision: None,
            },
        )
        .expect("archive");
    store
        .soft_delete(&ctx, &EntityRef::new(EntityType::Escrow, deleted.display_id), None)
        .expect("delete");

    let won_volume = |filter: SummaryFilter| {
        store
            .summarize(&ctx, EntityType::Escrow, filter)
            .expect("summarize")
            .get(Category::Won)
            .volume
    };
    assert_eq!(won_volume(SummaryFilter::default()), Decimal::from(100));
    assert_eq!(
        won_volume(SummaryFilter {
            include_archived: true,
            include_deleted: false,
        }),
        Decimal::from(300)
    );
    assert_eq!(
        won_volume(SummaryFilter {
            include_archived: false,
            include_deleted: true,
        }),
        Decimal::from(500)
    );
    assert_eq!(
        won_volume(SummaryFilter {
            include_archived: true,
            include_deleted: true,
        }),
        Decimal::from(700)
    );

    let tabs = store
        .tab_counts(&ctx, EntityType::Escrow)
        .expect("tab counts");
    assert_eq!(
        tabs,
        TabCounts {
            active: 0,
            won: 1,
            lost: 0,
            archived: 1,
        }
    );
}

#[test]
fn summaries_respect_caller_scope() {
    let storage_dir = temp_dir("summaries_respect_caller_scope");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let alice = agent("alice");
    let bob = agent("bob");

    escrow(&mut store, &alice, "closed", Some(500_000));
    escrow(&mut store, &bob, "closed", Some(700_000));

    let mine = store
        .summarize(&alice, EntityType::Escrow, SummaryFilter::default())
        .expect("alice summary");
    assert_eq!(mine.get(Category::Won).volume, Decimal::from(500_000));

    let broker = CallerContext::all(ActorId::try_new("manager").expect("actor id"));
    let everyone = store
        .summarize(&broker, EntityType::Escrow, SummaryFilter::default())
        .expect("broker summary");
    assert_eq!(everyone.get(Category::Won).count, 2);
    assert_eq!(everyone.get(Category::Won).volume, Decimal::from(1_200_000));
}

#[test]
fn count_only_types_report_zero_money() {
    let storage_dir = temp_dir("count_only_types_report_zero_money");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let ctx = agent("agent-a");
    for status in ["scheduled", "completed", "no_show", "no_show"] {
        store
            .create_entity(
                &ctx,
                CreateEntityRequest {
                    entity_type: EntityType::Appointment,
                    title: "Showing".to_string(),
                    owner_id: None,
                    raw_status: Some(status.to_string()),
                    volume: None,
                    commission: None,
                },
            )
            .expect("create appointment");
    }

    let summary = store
        .summarize(&ctx, EntityType::Appointment, SummaryFilter::default())
        .expect("summarize");
    assert!(!summary.tracks_money);
    assert_eq!(summary.get(Category::Active).count, 1);
    assert_eq!(summary.get(Category::Won).count, 1);
    assert_eq!(summary.get(Category::Lost).count, 2);
    assert_eq!(summary.get(Category::Lost).volume, Decimal::ZERO);
}

#[test]
fn oversized_amounts_are_rejected_and_capped_sums_stay_exact() {
    let storage_dir = temp_dir("oversized_amounts_are_rejected_and_capped_sums_stay_exact");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let ctx = agent("agent-a");
    let request = |volume: Decimal| CreateEntityRequest {
        entity_type: EntityType::Escrow,
        title: "Tower".to_string(),
        owner_id: None,
        raw_status: Some("closed".to_string()),
        volume: Some(volume),
        commission: None,
    };

    let err = store
        .create_entity(&ctx, request(Decimal::MAX))
        .expect_err("amount past the cap must fail");
    assert!(matches!(err, StoreError::InvalidInput(_)), "{err:?}");
    assert_eq!(err.status_class().as_u16(), 400);

    let cap = Decimal::from(1_000_000_000_000_000i64);
    store
        .create_entity(&ctx, request(cap + Decimal::new(1, 2)))
        .expect_err("one cent past the cap must fail");
    store.create_entity(&ctx, request(cap)).expect("cap itself is accepted");
    store.create_entity(&ctx, request(cap)).expect("cap itself is accepted");

    let summary = store
        .summarize(&ctx, EntityType::Escrow, SummaryFilter::default())
        .expect("summarize");
    assert_eq!(summary.get(Category::Won).count, 2);
    assert_eq!(summary.get(Category::Won).volume, cap * Decimal::from(2));
}
