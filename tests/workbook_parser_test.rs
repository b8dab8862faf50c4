// ==========================================
// 工作簿解析集成测试
// ==========================================
// 测试目标: 完整 .xlsx 解析、共享字符串、两种解析器输出一致
// ==========================================


use foodapp_inquiry::importer::{
    locate_header, CalamineWorkbookParser, ImportError, OoxmlWorkbookParser, Sheet,
    WorkbookParser,
};
use test_helpers::XlsxBuilder;

fn two_sheet_builder() -> XlsxBuilder {
    XlsxBuilder::new()
        .sheet(
            "蔬菜类",
            vec![
                vec!["", "2025年9月中旬都匀市主要食品价格参考价"],
                vec![],
                vec!["品名", "规格标准", "单位", "本期均价", "备注"],
                vec!["青椒", "新鲜", "斤", "3.5", "", "A&B"],
                vec!["白菜", "新鲜", "斤", "1,200", "", ""],
            ],
        )
        .sheet(
            "肉类",
            vec![vec!["品名", "单位"], vec!["猪肉", "斤"]],
        )
}

fn assert_same_cells(a: &Sheet, b: &Sheet) {
    assert_eq!(a.name, b.name);
    let rows = a.rows.len().max(b.rows.len());
    let cols = a.width().max(b.width());
    for r in 0..rows {
        for c in 0..cols {
            assert_eq!(a.cell(r, c), b.cell(r, c), "cell ({}, {}) differs", r, c);
        }
    }
}

#[test]
fn test_ooxml_parser_reads_inline_strings() {
    let bytes = two_sheet_builder().build();
    let workbook = OoxmlWorkbookParser.parse(&bytes).unwrap();

    assert_eq!(workbook.sheet_names(), vec!["蔬菜类", "肉类"]);
    let veg = workbook.sheet("蔬菜类").unwrap();
    assert_eq!(veg.cell(0, 0), "");
    assert_eq!(veg.cell(0, 1), "2025年9月中旬都匀市主要食品价格参考价");
    assert!(veg.text(1, 0).is_none());
    assert_eq!(veg.cell(3, 0), "青椒");
    assert_eq!(veg.cell(3, 5), "A&B");
    assert_eq!(veg.number(3, 3), Some(3.5));

    let header = locate_header(veg, "品名", 20).unwrap();
    assert_eq!(header.index, 2);
    assert_eq!(header.column("本期均价"), Some(3));
}

#[test]
fn test_ooxml_parser_reads_shared_strings() {
    let bytes = two_sheet_builder().with_shared_strings().build();
    let workbook = OoxmlWorkbookParser.parse(&bytes).unwrap();

    let veg = workbook.first_sheet().unwrap();
    assert_eq!(veg.cell(2, 0), "品名");
    assert_eq!(veg.cell(3, 1), "新鲜");
    assert_eq!(veg.cell(4, 1), "新鲜");
    // 千分位文本
    assert_eq!(veg.cell(4, 3), "1,200");
    assert_eq!(veg.number(4, 3), Some(1200.0));

    let meat = workbook.sheet("肉类").unwrap();
    assert_eq!(meat.cell(1, 0), "猪肉");

    let map = workbook.to_map();
    assert_eq!(map.len(), 2);
    assert_eq!(map["肉类"][1][0], "猪肉");
    assert_eq!(map["蔬菜类"][2][3], "本期均价");
}

#[test]
fn test_parsers_agree_on_cell_text() {
    for builder in [two_sheet_builder(), two_sheet_builder().with_shared_strings()] {
        let bytes = builder.build();
        let ooxml = OoxmlWorkbookParser.parse(&bytes).unwrap();
        let calamine = CalamineWorkbookParser.parse(&bytes).unwrap();

        assert_eq!(ooxml.sheet_names(), calamine.sheet_names());
        for (a, b) in ooxml.sheets.iter().zip(calamine.sheets.iter()) {
            assert_same_cells(a, b);
        }
    }
}

#[test]
fn test_not_a_zip_is_workbook_error() {
    let err = OoxmlWorkbookParser.parse(b"not a workbook").unwrap_err();
    assert!(matches!(err, ImportError::Workbook(_)));

    let err = CalamineWorkbookParser.parse(b"not a workbook").unwrap_err();
    assert!(matches!(err, ImportError::Workbook(_)));
}

#[test]
fn test_out_of_range_cell_refs_are_workbook_errors() {
    let wide = XlsxBuilder::new()
        .raw_sheet(
            "蔬菜类",
            r#"<worksheet><sheetData><row r="1"><c r="ZZZZZZZZZZZZZZ1" t="inlineStr"><is><t>x</t></is></c></row></sheetData></worksheet>"#,
        )
        .build();
    let err = OoxmlWorkbookParser.parse(&wide).unwrap_err();
    assert!(matches!(err, ImportError::Workbook(_)), "unexpected error: {:?}", err);

    let tall = XlsxBuilder::new()
        .raw_sheet(
            "蔬菜类",
            r#"<worksheet><sheetData><row r="2000000"><c r="A2000000"><v>1</v></c></row></sheetData></worksheet>"#,
        )
        .build();
    let err = OoxmlWorkbookParser.parse(&tall).unwrap_err();
    assert!(matches!(err, ImportError::Workbook(_)), "unexpected error: {:?}", err);
}
