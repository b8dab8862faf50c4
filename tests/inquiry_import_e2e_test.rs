// ==========================================
// 询价导入端到端测试
// ==========================================
// 测试目标: 标准样例落库、结构拒绝零写入、重复导入不重复建实体、
//          事务整体回滚、分配前提、行级错误定位
// ==========================================


use chrono::NaiveDate;
use foodapp_inquiry::importer::{
    CalamineWorkbookParser, ImportContext, ImportError, ImportErrorKind, InquiryImporter,
};
use foodapp_inquiry::logging;
use foodapp_inquiry::repository::{InquiryRepository, InquiryTableCounts, DEFAULT_ORG_ID};
use test_helpers::{inquiry_workbook, rows_workbook, sample_workbook, standard_header, TEST_TITLE};

fn counts(db_path: &str, org_id: &str) -> InquiryTableCounts {
    InquiryRepository::new(db_path)
        .unwrap()
        .count_rows(org_id)
        .unwrap()
}

#[test]
fn test_sample_workbook_is_materialized() {
    logging::init_test();
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");
    let importer = InquiryImporter::new(&db_path).unwrap();

    let inquiry_id = importer.import(&org.id, &sample_workbook()).unwrap();

    let repo = InquiryRepository::new(&db_path).unwrap();
    let inquiry = repo.find_inquiry(&inquiry_id).unwrap().unwrap();
    assert_eq!(inquiry.org_id, org.id);
    assert_eq!(inquiry.title, TEST_TITLE);
    assert_eq!(inquiry.inquiry_date, NaiveDate::from_ymd_opt(2025, 9, 1).unwrap());
    assert_eq!(
        inquiry.markets,
        [
            Some("富万家超市".to_string()),
            Some("育英巷菜市场".to_string()),
            Some("大润发".to_string())
        ]
    );

    let details = repo.list_avg_details(&inquiry_id).unwrap();
    assert_eq!(details.len(), 1);
    let detail = &details[0];
    assert_eq!(detail.guide_price, None);
    assert_eq!(detail.avg_price, Some(3.5));
    assert_eq!(detail.market_prices, [Some(3.2), Some(3.4), Some(3.1)]);

    let prices = repo.list_goods_prices(&inquiry_id).unwrap();
    assert_eq!(prices.len(), 1);
    let price = &prices[0];
    assert_eq!(price.goods_id, detail.goods_id);
    assert!((price.unit_price - 2.9).abs() < 1e-9);
    assert!((price.float_ratio - 0.12).abs() < 1e-9);

    let conn = test_helpers::open_db(&db_path);
    let supplier_name: String = conn
        .query_row(
            "SELECT name FROM supplier WHERE id = ?1",
            [&price.supplier_id],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(supplier_name, "恒阳");

    let (goods_name, category_name): (String, String) = conn
        .query_row(
            "SELECT g.name, c.name FROM base_goods g JOIN base_category c ON c.id = g.category_id
             WHERE g.id = ?1",
            [&detail.goods_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(goods_name, "青椒");
    assert_eq!(category_name, "蔬菜类");
}

#[test]
fn test_summary_reports_per_sheet_counts() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");
    let importer = InquiryImporter::new(&db_path).unwrap();

    let summary = importer
        .import_with_context(&ImportContext::new(), &org.id, &rows_workbook(5))
        .unwrap();
    assert_eq!(summary.sheets.len(), 1);
    let sheet = &summary.sheets[0];
    assert_eq!(sheet.category_name, "蔬菜类");
    assert_eq!(sheet.rows, 5);
    assert_eq!(sheet.goods_created, 5);
    assert_eq!(sheet.suppliers_created, 1);
    assert_eq!(sheet.prices_written, 5);
    assert_eq!(summary.total_rows(), 5);
}

#[test]
fn test_invalid_title_writes_nothing() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");
    let importer = InquiryImporter::new(&db_path).unwrap();

    let bytes = inquiry_workbook(
        "都匀市主要食品价格表",
        "蔬菜类",
        standard_header(),
        vec![vec!["青椒", "新鲜", "斤", "3.5", "3.2", "3.4", "3.1", "2.9"]],
    );
    let err = importer.import(&org.id, &bytes).unwrap_err();
    assert!(matches!(err, ImportError::InvalidTitle { .. }));
    assert_eq!(err.kind(), ImportErrorKind::Structural);
    assert_eq!(counts(&db_path, &org.id), InquiryTableCounts::default());
}

#[test]
fn test_missing_market_column_is_named() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");
    let importer = InquiryImporter::new(&db_path).unwrap();

    let header = vec![
        "品名",
        "规格标准",
        "单位",
        "本期均价",
        "富万家超市",
        "育英巷菜市场",
        "恒阳本期结算价（下浮12%）",
    ];
    let bytes = inquiry_workbook(
        TEST_TITLE,
        "蔬菜类",
        header,
        vec![vec!["青椒", "新鲜", "斤", "3.5", "3.2", "3.4", "2.9"]],
    );
    let err = importer.import(&org.id, &bytes).unwrap_err();
    match &err {
        ImportError::MissingMarketColumn { sheet, column } => {
            assert_eq!(sheet, "蔬菜类");
            assert_eq!(column, "大润发");
        }
        other => panic!("Expected MissingMarketColumn, got {:?}", other),
    }
    assert!(err.to_string().contains("大润发"));
    assert_eq!(counts(&db_path, &org.id), InquiryTableCounts::default());
}

#[test]
fn test_unmatched_supplier_header_is_ignored() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");
    let importer = InquiryImporter::new(&db_path).unwrap();

    let mut header = standard_header();
    header.push("金鼎结算价");
    let bytes = inquiry_workbook(
        TEST_TITLE,
        "蔬菜类",
        header,
        vec![vec!["青椒", "新鲜", "斤", "3.5", "3.2", "3.4", "3.1", "2.9", "2.5"]],
    );
    let inquiry_id = importer.import(&org.id, &bytes).unwrap();

    let prices = InquiryRepository::new(&db_path)
        .unwrap()
        .list_goods_prices(&inquiry_id)
        .unwrap();
    assert_eq!(prices.len(), 1);
    assert_eq!(counts(&db_path, &org.id).suppliers, 1);
}

#[test]
fn test_no_supplier_column_is_rejected() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");
    let importer = InquiryImporter::new(&db_path).unwrap();

    let mut header = standard_header();
    header.pop();
    header.push("恒阳结算价");
    let bytes = inquiry_workbook(
        TEST_TITLE,
        "蔬菜类",
        header,
        vec![vec!["青椒", "新鲜", "斤", "3.5", "3.2", "3.4", "3.1", "2.9"]],
    );
    let err = importer.import(&org.id, &bytes).unwrap_err();
    assert!(matches!(err, ImportError::NoSupplierColumn { .. }));
}

#[test]
fn test_reimport_reuses_shared_entities() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");
    let importer = InquiryImporter::new(&db_path).unwrap();

    let first = importer.import(&org.id, &rows_workbook(3)).unwrap();
    let second = importer.import(&org.id, &rows_workbook(3)).unwrap();
    assert_ne!(first, second);

    let c = counts(&db_path, &org.id);
    assert_eq!(c.inquiries, 2);
    assert_eq!(c.goods, 3);
    assert_eq!(c.suppliers, 1);
    assert_eq!(c.categories, 1);
    assert_eq!(c.markets, 3);
    assert_eq!(c.avg_details, 6);
    assert_eq!(c.goods_prices, 6);
}

#[test]
fn test_duplicate_row_upserts_price() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");
    let importer = InquiryImporter::new(&db_path).unwrap();

    let bytes = inquiry_workbook(
        TEST_TITLE,
        "蔬菜类",
        standard_header(),
        vec![
            vec!["青椒", "新鲜", "斤", "3.5", "3.2", "3.4", "3.1", "2.9"],
            vec!["青椒", "新鲜", "斤", "3.6", "3.3", "3.5", "3.2", "2.7"],
        ],
    );
    let inquiry_id = importer.import(&org.id, &bytes).unwrap();

    let repo = InquiryRepository::new(&db_path).unwrap();
    let details = repo.list_avg_details(&inquiry_id).unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].avg_price, Some(3.6));
    let prices = repo.list_goods_prices(&inquiry_id).unwrap();
    assert_eq!(prices.len(), 1);
    assert!((prices[0].unit_price - 2.7).abs() < 1e-9);
}

#[test]
fn test_blank_item_name_ends_sheet_and_blank_prices_are_absent() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");
    let importer = InquiryImporter::new(&db_path).unwrap();

    let bytes = inquiry_workbook(
        TEST_TITLE,
        "蔬菜类",
        standard_header(),
        vec![
            vec!["青椒", "新鲜", "斤", "3.5", "-", "", "3.1", ""],
            vec!["", "", "", "", "", "", "", ""],
            vec!["合计", "", "", "", "", "", "", ""],
        ],
    );
    let summary = importer
        .import_with_context(&ImportContext::new(), &org.id, &bytes)
        .unwrap();
    assert_eq!(summary.total_rows(), 1);

    let repo = InquiryRepository::new(&db_path).unwrap();
    let details = repo.list_avg_details(&summary.inquiry_id).unwrap();
    assert_eq!(details[0].market_prices, [None, None, Some(3.1)]);
    // 无报价不写供应商价格，也不创建供应商
    assert!(repo.list_goods_prices(&summary.inquiry_id).unwrap().is_empty());
    assert_eq!(counts(&db_path, &org.id).suppliers, 0);
}

#[test]
fn test_missing_spec_reports_row_and_rolls_back() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");
    let importer = InquiryImporter::new(&db_path).unwrap();

    let bytes = inquiry_workbook(
        TEST_TITLE,
        "蔬菜类",
        standard_header(),
        vec![
            vec!["青椒", "新鲜", "斤", "3.5", "3.2", "3.4", "3.1", "2.9"],
            vec!["白菜", "", "斤", "1.5", "1.2", "1.4", "1.1", "0.9"],
        ],
    );
    let err = importer.import(&org.id, &bytes).unwrap_err();
    match &err {
        ImportError::DataRow { sheet, row, message } => {
            assert_eq!(sheet, "蔬菜类");
            assert_eq!(*row, 4);
            assert!(message.contains("规格标准"));
        }
        other => panic!("Expected DataRow, got {:?}", other),
    }
    assert_eq!(counts(&db_path, &org.id), InquiryTableCounts::default());
}

#[test]
fn test_failure_on_last_row_rolls_back_everything() {
    logging::init_test();
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");

    let conn = test_helpers::open_db(&db_path);
    conn.execute_batch(
        "CREATE TRIGGER fail_on_fiftieth_detail
         BEFORE INSERT ON base_goods_avg_detail
         WHEN (SELECT COUNT(*) FROM base_goods_avg_detail WHERE inquiry_id = NEW.inquiry_id) >= 49
         BEGIN
             SELECT RAISE(ABORT, 'injected failure');
         END;",
    )
    .unwrap();
    let before = counts(&db_path, &org.id);

    let importer = InquiryImporter::new(&db_path).unwrap();
    let err = importer.import(&org.id, &rows_workbook(50)).unwrap_err();
    assert_eq!(err.kind(), ImportErrorKind::Persistence);
    assert!(err.to_string().contains("第52行"), "unexpected error: {}", err);

    assert_eq!(counts(&db_path, &org.id), before);
    assert_eq!(before, InquiryTableCounts::default());

    // 去掉故障后同一文件可以完整导入
    conn.execute_batch("DROP TRIGGER fail_on_fiftieth_detail;").unwrap();
    importer.import(&org.id, &rows_workbook(50)).unwrap();
    assert_eq!(counts(&db_path, &org.id).avg_details, 50);
}

#[test]
fn test_default_org_fails_allocation_precondition() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let importer = InquiryImporter::new(&db_path).unwrap();

    let err = importer.import(DEFAULT_ORG_ID, &sample_workbook()).unwrap_err();
    assert_eq!(err.kind(), ImportErrorKind::AllocationPrecondition);
    assert_eq!(counts(&db_path, DEFAULT_ORG_ID), InquiryTableCounts::default());
}

#[test]
fn test_empty_input_is_rejected() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");
    let importer = InquiryImporter::new(&db_path).unwrap();

    let err = importer.import(&org.id, &[]).unwrap_err();
    assert_eq!(err.kind(), ImportErrorKind::Input);
    let err = importer.import("  ", &sample_workbook()).unwrap_err();
    assert_eq!(err.kind(), ImportErrorKind::Input);
}

#[test]
fn test_calamine_parser_imports_same_rows() {
    let (_tmp, db_path) = test_helpers::create_test_db().unwrap();
    let org = test_helpers::create_org(&db_path, "都匀市");
    let importer = InquiryImporter::new(&db_path)
        .unwrap()
        .with_parser(Box::new(CalamineWorkbookParser));

    let summary = importer
        .import_with_context(&ImportContext::new(), &org.id, &rows_workbook(5))
        .unwrap();
    assert_eq!(summary.total_rows(), 5);

    let after = counts(&db_path, &org.id);
    assert_eq!(after.inquiries, 1);
    assert_eq!(after.goods, 5);
    assert_eq!(after.avg_details, 5);
    assert_eq!(after.goods_prices, 5);
}
