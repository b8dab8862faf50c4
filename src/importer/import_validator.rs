// ==========================================
// 食品询价管理 - 询价表结构校验
// ==========================================
// 标题: <年>年<月>月[上|中|下][旬]<固定短语>参考价
// 表头: 必需列 + 三个询价市场列 + 至少一个供应商结算价列
// 供应商列: <名称>本期结算价（下浮<百分比>%）
// 不匹配供应商格式的其他列忽略，不影响校验
// ==========================================

use crate::config::import_rules::ImportRules;
use crate::domain::types::TenDay;
use crate::importer::data_cleaner::round_to;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::workbook_parser::{HeaderRow, Sheet};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::warn;

static TITLE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})年(\d{1,2})月(?:([上中下])旬?)?").expect("title regex")
});

static CATEGORY_IN_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"主要([^市场]+)市场").expect("category regex"));

static SUPPLIER_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)本期结算价[（(]下浮(\d+(?:\.\d+)?)[%％][）)]$").expect("supplier regex")
});

/// 标题解析结果
#[derive(Debug, Clone, PartialEq)]
pub struct TitleInfo {
    pub title: String,
    pub inquiry_date: NaiveDate,
    pub ten_day: TenDay,
    /// 年月旬与后缀之间的短语，如“都匀市主要食品价格”
    pub phrase: String,
}

impl TitleInfo {
    /// 标题中“主要X市场”的 X，作为品类兜底
    pub fn category_hint(&self) -> Option<String> {
        CATEGORY_IN_TITLE_RE
            .captures(&self.title)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// 供应商结算价列
#[derive(Debug, Clone, PartialEq)]
pub struct SupplierColumn {
    pub col: usize,
    pub name: String,
    /// 下浮比例，0.12 表示下浮 12%
    pub ratio: f64,
    pub header: String,
}

/// 询价市场列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketColumn {
    pub col: usize,
    pub name: String,
}

/// 校验通过的 sheet 列布局
#[derive(Debug, Clone, PartialEq)]
pub struct SheetLayout {
    pub header_row: usize,
    pub name_col: usize,
    pub spec_col: usize,
    pub unit_col: usize,
    pub avg_price_col: usize,
    pub guide_price_col: Option<usize>,
    pub markets: Vec<MarketColumn>,
    pub suppliers: Vec<SupplierColumn>,
    /// 被忽略的表头
    pub ignored: Vec<String>,
}

/// 解析供应商列表头
///
/// # 返回
/// - Some((名称, 比例)): 比例为 0..=1 的小数，保留 4 位
/// - None: 不符合供应商列格式
pub fn parse_supplier_header(header: &str) -> Option<(String, f64)> {
    let caps = SUPPLIER_HEADER_RE.captures(header.trim())?;
    let name = caps.get(1)?.as_str().trim();
    let pct: f64 = caps.get(2)?.as_str().parse().ok()?;
    if name.is_empty() || !(0.0..=100.0).contains(&pct) {
        return None;
    }
    Some((name.to_string(), round_to(pct / 100.0, 4)))
}

// ==========================================
// ImportValidator
// ==========================================
pub struct ImportValidator {
    rules: ImportRules,
}

impl ImportValidator {
    pub fn new(rules: ImportRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ImportRules {
        &self.rules
    }

    /// 在首个 sheet 的左上区域查找标题
    ///
    /// 优先取包含后缀（参考价）的单元格，否则取第一个非空单元格。
    pub fn find_title<'a>(&self, sheet: &'a Sheet) -> Option<&'a str> {
        let (rows, cols) = (self.rules.title_scan_rows, self.rules.title_scan_cols);
        sheet
            .find_in_area(rows, cols, |t| t.contains(self.rules.title_suffix.as_str()))
            .or_else(|| sheet.find_in_area(rows, cols, |_| true))
            .map(|(_, _, text)| text)
    }

    /// 校验标题并解析业务日期
    pub fn validate_title(&self, raw: &str) -> ImportResult<TitleInfo> {
        let title = raw.trim();
        let invalid = |reason: &str| ImportError::InvalidTitle {
            title: title.to_string(),
            reason: reason.to_string(),
        };

        let caps = TITLE_PREFIX_RE
            .captures(title)
            .ok_or_else(|| invalid("标题需以“YYYY年M月”开头"))?;

        let year: i32 = caps[1].parse().map_err(|_| invalid("年份无效"))?;
        let month: u32 = caps[2].parse().map_err(|_| invalid("月份无效"))?;
        if !(1..=12).contains(&month) {
            return Err(invalid("月份需在 1-12 之间"));
        }
        let ten_day = caps
            .get(3)
            .and_then(|m| TenDay::from_marker(m.as_str()))
            .unwrap_or(TenDay::Early);

        let prefix_len = caps.get(0).map_or(0, |m| m.end());
        let rest = &title[prefix_len..];
        let phrase = rest
            .strip_suffix(self.rules.title_suffix.as_str())
            .ok_or_else(|| invalid(&format!("标题需以“{}”结尾", self.rules.title_suffix)))?
            .trim();
        if phrase.is_empty() {
            return Err(invalid("缺少标题短语"));
        }

        let inquiry_date = NaiveDate::from_ymd_opt(year, month, ten_day.first_day())
            .ok_or_else(|| invalid("日期无效"))?;

        Ok(TitleInfo {
            title: title.to_string(),
            inquiry_date,
            ten_day,
            phrase: phrase.to_string(),
        })
    }

    /// 校验 sheet 表头并得出列布局
    pub fn validate_columns(&self, sheet: &str, header: &HeaderRow) -> ImportResult<SheetLayout> {
        let rules = &self.rules;

        for column in &rules.required_headers {
            if !header.contains(column) {
                return Err(ImportError::MissingColumn {
                    sheet: sheet.to_string(),
                    column: column.clone(),
                });
            }
        }
        let required = |name: &str| {
            header.column(name).ok_or_else(|| ImportError::MissingColumn {
                sheet: sheet.to_string(),
                column: name.to_string(),
            })
        };

        let mut markets = Vec::with_capacity(rules.market_headers.len());
        for name in &rules.market_headers {
            let col = header
                .column(name)
                .ok_or_else(|| ImportError::MissingMarketColumn {
                    sheet: sheet.to_string(),
                    column: name.clone(),
                })?;
            markets.push(MarketColumn {
                col,
                name: name.clone(),
            });
        }

        let mut suppliers = Vec::new();
        let mut ignored = Vec::new();
        let mut seen = HashSet::new();
        for (col, text) in header.named_columns() {
            if rules.is_fixed_header(text) {
                continue;
            }
            match parse_supplier_header(text) {
                Some((name, ratio)) => {
                    if !seen.insert(name.clone()) {
                        return Err(ImportError::DuplicateSupplierColumn {
                            sheet: sheet.to_string(),
                            column: text.to_string(),
                        });
                    }
                    suppliers.push(SupplierColumn {
                        col,
                        name,
                        ratio,
                        header: text.to_string(),
                    });
                }
                None => ignored.push(text.to_string()),
            }
        }

        if suppliers.is_empty() {
            return Err(ImportError::NoSupplierColumn {
                sheet: sheet.to_string(),
            });
        }
        if !ignored.is_empty() {
            warn!(sheet = %sheet, columns = ?ignored, "忽略无法识别的表头列");
        }

        Ok(SheetLayout {
            header_row: header.index,
            name_col: required(rules.name_header())?,
            spec_col: required(rules.spec_header())?,
            unit_col: required(rules.unit_header())?,
            avg_price_col: required(rules.avg_price_header())?,
            guide_price_col: header.column(&rules.guide_price_header),
            markets,
            suppliers,
            ignored,
        })
    }

    /// 标题 + 表头整体校验
    pub fn validate(
        &self,
        title: &str,
        sheet: &str,
        header: &HeaderRow,
    ) -> ImportResult<(TitleInfo, SheetLayout)> {
        let info = self.validate_title(title)?;
        let layout = self.validate_columns(sheet, header)?;
        Ok((info, layout))
    }
}

impl Default for ImportValidator {
    fn default() -> Self {
        Self::new(ImportRules::default())
    }
}
