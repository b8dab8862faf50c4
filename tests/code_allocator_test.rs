// ==========================================
// 编码分配器集成测试
// ==========================================
// 测试目标: 最小空缺、前提校验、软删保留、并发互斥、机构隔离
// ==========================================


use foodapp_inquiry::domain::ScopedTable;
use foodapp_inquiry::repository::{CodeSequenceAllocator, RepositoryError, DEFAULT_ORG_ID};
use foodapp_inquiry::logging;
use rusqlite::{params, Connection, TransactionBehavior};
use std::collections::BTreeSet;
use std::thread;
use uuid::Uuid;

fn insert_category(conn: &Connection, org_id: &str, name: &str, code: &str, sort: i64, deleted: bool) {
    conn.execute(
        "INSERT INTO base_category (id, name, code, sort, org_id, is_deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![Uuid::new_v4().to_string(), name, code, sort, org_id, deleted as i64],
    )
    .expect("Failed to insert category");
}

fn allocate(conn: &mut Connection, table: ScopedTable, org_id: &str) -> Result<(String, i64), RepositoryError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .expect("Failed to begin tx");
    let allocated = CodeSequenceAllocator::allocate(&tx, table, org_id)?;
    tx.commit().expect("Failed to commit");
    Ok((allocated.code, allocated.sort))
}

#[test]
fn test_allocates_lowest_gap() {
    logging::init_test();
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");
    let mut conn = test_helpers::open_db(&db_path);
    let base = org.sort_base();

    for (i, suffix) in [1, 2, 4].iter().enumerate() {
        insert_category(
            &conn,
            &org.id,
            &format!("品类{}", i),
            &format!("{}{:03}", org.code, suffix),
            base + suffix,
            false,
        );
    }

    let (code, sort) = allocate(&mut conn, ScopedTable::Category, &org.id).unwrap();
    assert_eq!(code, format!("{}003", org.code));
    assert_eq!(sort, base + 3);
}

#[test]
fn test_malformed_codes_are_ignored() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");
    let mut conn = test_helpers::open_db(&db_path);

    insert_category(&conn, &org.id, "甲", &format!("{}0x1", org.code), 5, false);
    insert_category(&conn, &org.id, "乙", &format!("{}0001", org.code), 6, false);
    insert_category(&conn, &org.id, "丙", "ZZ001", 7, false);

    let (code, sort) = allocate(&mut conn, ScopedTable::Category, &org.id).unwrap();
    assert_eq!(code, format!("{}001", org.code));
    assert_eq!(sort, org.sort_base() + 1);
}

#[test]
fn test_soft_deleted_codes_stay_reserved() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");
    let mut conn = test_helpers::open_db(&db_path);
    let base = org.sort_base();

    insert_category(&conn, &org.id, "已删除", &format!("{}001", org.code), base + 1, true);

    let (code, sort) = allocate(&mut conn, ScopedTable::Category, &org.id).unwrap();
    assert_eq!(code, format!("{}002", org.code));
    assert_eq!(sort, base + 2);
}

#[test]
fn test_default_org_fails_precondition() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let mut conn = test_helpers::open_db(&db_path);

    let err = allocate(&mut conn, ScopedTable::Goods, DEFAULT_ORG_ID).unwrap_err();
    assert!(err.is_allocation_precondition(), "unexpected error: {:?}", err);

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM base_goods", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn test_empty_org_code_fails_precondition() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let mut conn = test_helpers::open_db(&db_path);
    conn.execute(
        "INSERT INTO base_org (id, name, code, parent_id, sort) VALUES ('blank', '无编码', '', 'blank', 9)",
        [],
    )
    .unwrap();

    let err = allocate(&mut conn, ScopedTable::Supplier, "blank").unwrap_err();
    assert!(matches!(err, RepositoryError::AllocationPrecondition { .. }));
}

#[test]
fn test_missing_org_is_not_found() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let mut conn = test_helpers::open_db(&db_path);

    let err = allocate(&mut conn, ScopedTable::Market, "no-such-org").unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));
}

#[test]
fn test_orgs_allocate_independently() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let a = test_helpers::create_org(&db_path, "甲市");
    let b = test_helpers::create_org(&db_path, "乙市");
    assert_ne!(a.code, b.code);
    let mut conn = test_helpers::open_db(&db_path);

    insert_category(&conn, &a.id, "已有", &format!("{}001", a.code), a.sort_base() + 1, false);

    let (code_a, _) = allocate(&mut conn, ScopedTable::Category, &a.id).unwrap();
    let (code_b, sort_b) = allocate(&mut conn, ScopedTable::Category, &b.id).unwrap();
    assert_eq!(code_a, format!("{}002", a.code));
    assert_eq!(code_b, format!("{}001", b.code));
    assert_eq!(sort_b, b.sort_base() + 1);
}

#[test]
fn test_next_suffix_with_base() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");
    let mut conn = test_helpers::open_db(&db_path);
    let base = org.sort_base();
    insert_category(&conn, &org.id, "甲", &format!("{}001", org.code), base + 1, false);

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .unwrap();
    let by_code =
        CodeSequenceAllocator::next_suffix(&tx, ScopedTable::Category, &org.id, None, true).unwrap();
    let by_sort =
        CodeSequenceAllocator::next_suffix(&tx, ScopedTable::Category, &org.id, Some(base), false)
            .unwrap();
    assert_eq!(by_code, 2);
    assert_eq!(by_sort, 2);

    let err = CodeSequenceAllocator::next_suffix(
        &tx,
        ScopedTable::Category,
        &org.id,
        Some(base + 7),
        false,
    )
    .unwrap_err();
    assert!(matches!(err, RepositoryError::ValidationError(_)));
}

#[test]
fn test_sequence_exhausted() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");
    let mut conn = test_helpers::open_db(&db_path);
    let base = org.sort_base();

    {
        let tx = conn.transaction().unwrap();
        for suffix in 1..=999i64 {
            insert_category(
                &tx,
                &org.id,
                &format!("品类{}", suffix),
                &format!("{}{:03}", org.code, suffix),
                base + suffix,
                false,
            );
        }
        tx.commit().unwrap();
    }

    let err = allocate(&mut conn, ScopedTable::Category, &org.id).unwrap_err();
    assert!(matches!(err, RepositoryError::SequenceExhausted { .. }));
}

#[test]
fn test_concurrent_allocations_are_distinct() {
    logging::init_test();
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let db_path = db_path.clone();
            let org_id = org.id.clone();
            thread::spawn(move || {
                let mut conn = test_helpers::open_db(&db_path);
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .unwrap();
                let allocated =
                    CodeSequenceAllocator::allocate(&tx, ScopedTable::Market, &org_id).unwrap();
                tx.execute(
                    "INSERT INTO base_market (id, name, code, sort, org_id) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        Uuid::new_v4().to_string(),
                        format!("市场{}", i),
                        allocated.code,
                        allocated.sort,
                        org_id
                    ],
                )
                .unwrap();
                tx.commit().unwrap();
                allocated.sort
            })
        })
        .collect();

    let sorts: BTreeSet<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let expected: BTreeSet<i64> = (1..=8).map(|s| org.sort_base() + s).collect();
    assert_eq!(sorts, expected);
}
