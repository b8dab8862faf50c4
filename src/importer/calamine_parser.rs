// ==========================================
// 食品询价管理 - calamine 工作簿解析器（备选实现）
// ==========================================
// 与 OoxmlWorkbookParser 输出同构的 Workbook:
// - 行列下标以 A1 为原点（calamine 的 Range 从首个非空单元格开始，需要偏移）
// - 单元格以 Display 文本输出并去除首尾空白
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use crate::importer::workbook_parser::{Sheet, Workbook, WorkbookParser};
use calamine::{open_workbook_from_rs, Reader, Xlsx};
use std::io::Cursor;

pub struct CalamineWorkbookParser;

impl WorkbookParser for CalamineWorkbookParser {
    fn parse(&self, bytes: &[u8]) -> ImportResult<Workbook> {
        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e: calamine::XlsxError| ImportError::Workbook(e.to_string()))?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| ImportError::Workbook(format!("解析 sheet 失败 ({}): {}", name, e)))?;

            let (row_offset, col_offset) = range
                .start()
                .map(|(r, c)| (r as usize, c as usize))
                .unwrap_or((0, 0));

            let mut rows: Vec<Vec<String>> = vec![Vec::new(); row_offset];
            for data_row in range.rows() {
                let mut row = vec![String::new(); col_offset];
                row.extend(data_row.iter().map(|cell| cell.to_string().trim().to_string()));
                rows.push(row);
            }
            sheets.push(Sheet::new(name, rows));
        }

        Ok(Workbook { sheets })
    }

    fn name(&self) -> &'static str {
        "calamine"
    }
}
