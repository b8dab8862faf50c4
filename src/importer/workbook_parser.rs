// ==========================================
// 食品询价管理 - 工作簿解析器
// ==========================================
// 默认实现直接读取 .xlsx 的 zip 包与 XML 部件，不依赖表格引擎:
//   xl/workbook.xml             sheet 名称与关系 id
//   xl/_rels/workbook.xml.rels  关系 id -> worksheet 路径
//   xl/sharedStrings.xml        共享字符串表（可选）
//   xl/worksheets/*.xml         <row><c r t><v>/<is><t>
// 单元格统一输出为去除首尾空白的文本，不解释数字/日期格式。
// ==========================================

use crate::importer::data_cleaner::{non_empty, normalize_header, parse_price};
use crate::importer::error::{ImportError, ImportResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use zip::ZipArchive;

// ==========================================
// Workbook / Sheet
// ==========================================

/// 单个工作表：行优先的文本矩阵（行宽可能不一致）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 原始单元格文本，越界返回空串
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// 非空文本单元格
    pub fn text(&self, row: usize, col: usize) -> Option<&str> {
        non_empty(self.cell(row, col))
    }

    /// 数值单元格（无法解析视为缺失）
    pub fn number(&self, row: usize, col: usize) -> Option<f64> {
        parse_price(self.cell(row, col))
    }

    /// 最宽行的列数
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// 在左上角 rows x cols 区域内按行优先查找第一个满足条件的非空单元格
    pub fn find_in_area(
        &self,
        rows: usize,
        cols: usize,
        pred: impl Fn(&str) -> bool,
    ) -> Option<(usize, usize, &str)> {
        for r in 0..rows.min(self.rows.len()) {
            for c in 0..cols {
                if let Some(text) = self.text(r, c) {
                    if pred(text) {
                        return Some((r, c, text));
                    }
                }
            }
        }
        None
    }
}

/// 工作簿：按 workbook.xml 中的顺序保存工作表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn first_sheet(&self) -> Option<&Sheet> {
        self.sheets.first()
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// 名称 -> 行 的映射视图
    pub fn to_map(&self) -> HashMap<String, Vec<Vec<String>>> {
        self.sheets
            .iter()
            .map(|s| (s.name.clone(), s.rows.clone()))
            .collect()
    }
}

// ==========================================
// WorkbookParser Trait
// ==========================================
pub trait WorkbookParser: Send + Sync {
    /// 将上传的字节流解析为工作簿
    fn parse(&self, bytes: &[u8]) -> ImportResult<Workbook>;

    /// 解析器名称（日志用）
    fn name(&self) -> &'static str;
}

// ==========================================
// 列字母 <-> 下标
// ==========================================

/// Excel 列数上限（XFD）
pub const MAX_COLUMNS: usize = 16_384;

/// Excel 行数上限
pub const MAX_ROWS: usize = 1_048_576;

/// 单元格引用转 0 基列下标："A1" -> 0, "AA7" -> 26
///
/// 没有列字母或超出 XFD 时返回 None。
pub fn column_index(cell_ref: &str) -> Option<usize> {
    let mut idx: usize = 0;
    let mut seen = false;
    for b in cell_ref.bytes() {
        let upper = b.to_ascii_uppercase();
        if !upper.is_ascii_uppercase() {
            break;
        }
        seen = true;
        idx = idx
            .checked_mul(26)?
            .checked_add((upper - b'A' + 1) as usize)?;
        if idx > MAX_COLUMNS {
            return None;
        }
    }
    if seen {
        Some(idx - 1)
    } else {
        None
    }
}

/// 0 基列下标转列字母：0 -> "A", 26 -> "AA"
pub fn column_letters(mut idx: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (idx % 26) as u8);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

// ==========================================
// 表头定位
// ==========================================

/// 定位到的表头行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRow {
    /// 0 基行下标
    pub index: usize,
    /// 标准化后的表头文本，下标即列号
    pub cells: Vec<String>,
    columns: HashMap<String, usize>,
}

impl HeaderRow {
    pub fn from_cells(index: usize, raw: &[String]) -> Self {
        let cells: Vec<String> = raw.iter().map(|c| normalize_header(c)).collect();
        let mut columns = HashMap::new();
        for (col, name) in cells.iter().enumerate() {
            if !name.is_empty() {
                // 同名列以最左侧为准
                columns.entry(name.clone()).or_insert(col);
            }
        }
        Self {
            index,
            cells,
            columns,
        }
    }

    /// 按表头名查找列下标（名称同样先标准化）
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.get(&normalize_header(name)).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// 非空表头 (列号, 文本)
    pub fn named_columns(&self) -> impl Iterator<Item = (usize, &str)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_empty())
            .map(|(i, c)| (i, c.as_str()))
    }
}

/// 在前 max_rows 行中查找表头
///
/// 选择包含锚点列名、且非空单元格最多的一行；并列时取靠上的行。
/// 用于跳过表头上方的合并单元格标题行。
pub fn locate_header(sheet: &Sheet, anchor: &str, max_rows: usize) -> Option<HeaderRow> {
    let anchor = normalize_header(anchor);
    let mut best: Option<(usize, usize)> = None;

    for (idx, row) in sheet.rows.iter().take(max_rows).enumerate() {
        let has_anchor = row.iter().any(|c| normalize_header(c) == anchor);
        if !has_anchor {
            continue;
        }
        let filled = row.iter().filter(|c| !c.trim().is_empty()).count();
        if best.map_or(true, |(_, n)| filled > n) {
            best = Some((idx, filled));
        }
    }

    best.map(|(idx, _)| HeaderRow::from_cells(idx, &sheet.rows[idx]))
}

// ==========================================
// OoxmlWorkbookParser - 默认实现
// ==========================================
pub struct OoxmlWorkbookParser;

struct SheetEntry {
    name: String,
    rel_id: String,
}

impl WorkbookParser for OoxmlWorkbookParser {
    fn parse(&self, bytes: &[u8]) -> ImportResult<Workbook> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ImportError::Workbook(format!("无法读取压缩文件: {}", e)))?;

        let workbook_xml = read_part(&mut archive, "xl/workbook.xml")?
            .ok_or_else(|| ImportError::Workbook("缺少 xl/workbook.xml".to_string()))?;
        let entries = parse_workbook_xml(&workbook_xml)?;

        let rels_xml = read_part(&mut archive, "xl/_rels/workbook.xml.rels")?
            .ok_or_else(|| ImportError::Workbook("缺少 workbook 关联文件".to_string()))?;
        let rels = parse_relationships(&rels_xml)?;

        let shared_strings = match read_part(&mut archive, "xl/sharedStrings.xml")? {
            Some(xml) => parse_shared_strings(&xml)?,
            None => Vec::new(),
        };

        let mut sheets = Vec::with_capacity(entries.len());
        for entry in entries {
            let target = rels.get(&entry.rel_id).ok_or_else(|| {
                ImportError::Workbook(format!("未找到 sheet 对应关系: {}", entry.name))
            })?;
            let path = resolve_part_path(target);
            let xml = read_part(&mut archive, &path)?
                .ok_or_else(|| ImportError::Workbook(format!("缺少 sheet 文件: {}", path)))?;
            let rows = parse_worksheet(&xml, &shared_strings).map_err(|e| {
                ImportError::Workbook(format!("解析 sheet 失败 ({}): {}", entry.name, e))
            })?;
            sheets.push(Sheet::new(entry.name, rows));
        }

        Ok(Workbook { sheets })
    }

    fn name(&self) -> &'static str {
        "ooxml"
    }
}

/// 读取 zip 内的部件；不存在返回 None
fn read_part<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> ImportResult<Option<Vec<u8>>> {
    let mut file = match archive.by_name(name) {
        Ok(f) => f,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|e| ImportError::Workbook(format!("读取 {} 失败: {}", name, e)))?;
    Ok(Some(buf))
}

/// 关系目标转 zip 内路径，处理绝对路径与 ".."
fn resolve_part_path(target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(abs) => abs.to_string(),
        None => format!("xl/{}", target),
    };
    let mut parts: Vec<&str> = Vec::new();
    for seg in joined.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

fn attr_value(e: &BytesStart<'_>, local: &[u8]) -> ImportResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ImportError::Workbook(err.to_string()))?;
        if attr.key.local_name().as_ref() == local {
            let value = attr.unescape_value()?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn parse_workbook_xml(xml: &[u8]) -> ImportResult<Vec<SheetEntry>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut entries = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let name = attr_value(&e, b"name")?.unwrap_or_default();
                let rel_id = attr_value(&e, b"id")?.unwrap_or_default();
                if !name.trim().is_empty() && !rel_id.trim().is_empty() {
                    entries.push(SheetEntry { name, rel_id });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(entries)
}

fn parse_relationships(xml: &[u8]) -> ImportResult<HashMap<String, String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rels = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) =
                    (attr_value(&e, b"Id")?, attr_value(&e, b"Target")?)
                {
                    rels.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

/// 共享字符串：每个 <si> 拼接其下所有 <t> 文本（含富文本 <r><t>）
fn parse_shared_strings(xml: &[u8]) -> ImportResult<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_t = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(t) if in_t && !in_phonetic => current.push_str(&t.unescape()?),
            Event::CData(t) if in_t && !in_phonetic => {
                current.push_str(&String::from_utf8_lossy(&t.into_inner()))
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_t = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// 正在解析的单元格
#[derive(Default)]
struct CellState {
    col: usize,
    kind: String,
    value: String,
    inline: String,
    has_inline: bool,
}

impl CellState {
    fn resolve(self, shared: &[String]) -> String {
        let text = if self.has_inline {
            self.inline
        } else if self.kind == "s" {
            self.value
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| shared.get(i).cloned())
                .unwrap_or(self.value)
        } else {
            self.value
        };
        text.trim().to_string()
    }
}

/// <c r=".."> 的列下标；无引用时沿用 next_col
fn cell_column(cell_ref: Option<String>, next_col: usize) -> ImportResult<usize> {
    let col = match cell_ref {
        Some(r) if r.trim_start().starts_with(|c: char| c.is_ascii_alphabetic()) => {
            column_index(r.trim()).ok_or_else(|| {
                ImportError::Workbook(format!("单元格引用超出范围: {}", r.trim()))
            })?
        }
        _ => next_col,
    };
    if col >= MAX_COLUMNS {
        return Err(ImportError::Workbook(format!(
            "列数超出上限 {}",
            MAX_COLUMNS
        )));
    }
    Ok(col)
}

/// <row r=".."> 的 0 基行下标；无引用时沿用 fallback
fn row_position(row_ref: Option<String>, fallback: usize) -> ImportResult<usize> {
    let index = match row_ref.as_deref().map(str::trim) {
        Some(r) if !r.is_empty() && r.bytes().all(|b| b.is_ascii_digit()) => r
            .parse::<usize>()
            .ok()
            .filter(|n| *n <= MAX_ROWS)
            .ok_or_else(|| ImportError::Workbook(format!("行号超出范围: {}", r)))?
            .saturating_sub(1),
        _ => fallback,
    };
    if index >= MAX_ROWS {
        return Err(ImportError::Workbook(format!("行数超出上限 {}", MAX_ROWS)));
    }
    Ok(index)
}

fn place(row: &mut Vec<String>, col: usize, value: String) {
    if col >= row.len() {
        row.resize(col + 1, String::new());
    }
    row[col] = value;
}

/// 解析 worksheet XML
///
/// - 行号取 <row r="..">，缺省时顺延
/// - 列号取 <c r="..">，缺省时为上一个单元格的下一列
fn parse_worksheet(xml: &[u8], shared: &[String]) -> ImportResult<Vec<Vec<String>>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();

    let mut current_row: Option<(usize, Vec<String>)> = None;
    let mut next_col = 0usize;
    let mut cell: Option<CellState> = None;
    let mut in_value = false;
    let mut in_inline_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    let index = row_position(attr_value(&e, b"r")?, rows.len())?;
                    current_row = Some((index.max(rows.len()), Vec::new()));
                    next_col = 0;
                }
                b"c" => {
                    let col = cell_column(attr_value(&e, b"r")?, next_col)?;
                    next_col = col + 1;
                    cell = Some(CellState {
                        col,
                        kind: attr_value(&e, b"t")?.unwrap_or_default(),
                        ..CellState::default()
                    });
                }
                b"v" => in_value = true,
                b"is" => {
                    if let Some(c) = cell.as_mut() {
                        c.has_inline = true;
                    }
                }
                b"t" => in_inline_text = cell.as_ref().map_or(false, |c| c.has_inline),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" => {
                    let index = row_position(attr_value(&e, b"r")?, rows.len())?;
                    while rows.len() <= index {
                        rows.push(Vec::new());
                    }
                }
                b"c" => {
                    let col = cell_column(attr_value(&e, b"r")?, next_col)?;
                    next_col = col + 1;
                    // 空单元格只占位
                    if let Some((_, row)) = current_row.as_mut() {
                        if col >= row.len() {
                            row.resize(col + 1, String::new());
                        }
                    }
                }
                _ => {}
            },
            Event::Text(t) => {
                if let Some(c) = cell.as_mut() {
                    if in_value {
                        c.value.push_str(&t.unescape()?);
                    } else if in_inline_text {
                        c.inline.push_str(&t.unescape()?);
                    }
                }
            }
            Event::CData(t) => {
                if let Some(c) = cell.as_mut() {
                    let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                    if in_value {
                        c.value.push_str(&text);
                    } else if in_inline_text {
                        c.inline.push_str(&text);
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"t" => in_inline_text = false,
                b"c" => {
                    if let (Some(state), Some((_, row))) = (cell.take(), current_row.as_mut()) {
                        let col = state.col;
                        place(row, col, state.resolve(shared));
                    }
                }
                b"row" => {
                    if let Some((index, row)) = current_row.take() {
                        while rows.len() < index {
                            rows.push(Vec::new());
                        }
                        rows.push(row);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("c7"), Some(2));
        assert_eq!(column_index("Z3"), Some(25));
        assert_eq!(column_index("AA10"), Some(26));
        assert_eq!(column_index("AZ1"), Some(51));
        assert_eq!(column_index("12"), None);
        assert_eq!(column_index("XFD1"), Some(MAX_COLUMNS - 1));
        assert_eq!(column_index("XFE1"), None);
        assert_eq!(column_index("ZZZZZZZZZZZZZZ1"), None);
    }

    #[test]
    fn test_parse_worksheet_rejects_out_of_range_refs() {
        let wide = r#"<worksheet><sheetData><row r="1"><c r="ZZZZZZZZZZZZZZ1"><v>1</v></c></row></sheetData></worksheet>"#;
        let err = parse_worksheet(wide.as_bytes(), &[]).unwrap_err();
        assert!(matches!(err, ImportError::Workbook(_)));

        let empty_wide = r#"<worksheet><sheetData><row r="1"><c r="XFE1"/></row></sheetData></worksheet>"#;
        assert!(parse_worksheet(empty_wide.as_bytes(), &[]).is_err());

        let tall = r#"<worksheet><sheetData><row r="99999999999"><c r="A99999999999"><v>1</v></c></row></sheetData></worksheet>"#;
        let err = parse_worksheet(tall.as_bytes(), &[]).unwrap_err();
        assert!(matches!(err, ImportError::Workbook(_)));

        let empty_tall = r#"<worksheet><sheetData><row r="1048577"/></sheetData></worksheet>"#;
        assert!(parse_worksheet(empty_tall.as_bytes(), &[]).is_err());

        let last = r#"<worksheet><sheetData><row r="3"><c r="XFD3"><v>x</v></c></row></sheetData></worksheet>"#;
        let rows = parse_worksheet(last.as_bytes(), &[]).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].len(), MAX_COLUMNS);
        assert_eq!(rows[2][MAX_COLUMNS - 1], "x");
    }

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(51), "AZ");
        assert_eq!(column_letters(702), "AAA");
    }

    #[test]
    fn test_resolve_part_path() {
        assert_eq!(resolve_part_path("worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(resolve_part_path("/xl/worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
        assert_eq!(resolve_part_path("../xl/worksheets/s.xml"), "xl/worksheets/s.xml");
    }

    #[test]
    fn test_parse_worksheet_shared_inline_and_gaps() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="inlineStr"><is><t> 青椒 </t></is></c></row>
    <row r="3"><c r="B3"><v>3.5</v></c><c><v>4</v></c><c r="E3" t="str"><v>a&amp;b</v></c></row>
  </sheetData>
</worksheet>"#
            .as_bytes();
        let shared = vec!["品名".to_string()];
        let rows = parse_worksheet(xml, &shared).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["品名", "", "青椒"]);
        assert!(rows[1].is_empty());
        assert_eq!(rows[2], vec!["", "3.5", "4", "", "a&b"]);
    }

    #[test]
    fn test_parse_shared_strings_concatenates_runs() {
        let xml = r#"<sst><si><t>本期</t></si><si><r><t>恒阳</t></r><r><t>本期结算价</t></r></si><si/></sst>"#
            .as_bytes();
        let strings = parse_shared_strings(xml).unwrap();
        assert_eq!(strings, vec!["本期", "恒阳本期结算价", ""]);
    }

    #[test]
    fn test_locate_header_prefers_fullest_row_with_anchor() {
        let rows = vec![
            vec!["2025年9月上旬都匀市主要食品价格参考价".to_string()],
            vec!["品名".to_string(), "".to_string()],
            vec![
                "品名".to_string(),
                "规格\n标准".to_string(),
                "单位".to_string(),
            ],
            vec!["青椒".to_string(), "新鲜".to_string(), "斤".to_string()],
        ];
        let sheet = Sheet::new("蔬菜", rows);
        let header = locate_header(&sheet, "品名", 20).unwrap();
        assert_eq!(header.index, 2);
        assert_eq!(header.column("规格标准"), Some(1));
        assert!(locate_header(&sheet, "单价", 20).is_none());
    }

    #[test]
    fn test_locate_header_respects_scan_limit() {
        let mut rows = vec![vec!["x".to_string()]; 25];
        rows.push(vec!["品名".to_string()]);
        let sheet = Sheet::new("s", rows);
        assert!(locate_header(&sheet, "品名", 20).is_none());
    }
}
