// ==========================================
// 食品询价管理 - 询价领域模型
// ==========================================
// 一次导入 = 一张询价单（表头）+ 均价明细 + 供应商报价
// 明细/报价引用的商品、供应商必须先在同一机构内解析或创建
// ==========================================

use crate::domain::types::TenDay;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

// ==========================================
// PriceInquiry - 询价单表头
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceInquiry {
    pub id: String,
    pub org_id: String,
    pub title: String,
    pub inquiry_date: NaiveDate,
    pub markets: [Option<String>; 3], // 三个询价市场名称快照
}

impl PriceInquiry {
    pub fn year(&self) -> i32 {
        self.inquiry_date.year()
    }

    pub fn month(&self) -> u32 {
        self.inquiry_date.month()
    }

    pub fn ten_day(&self) -> TenDay {
        TenDay::from_day(self.inquiry_date.day())
    }
}

// ==========================================
// GoodsAvgDetail - 均价明细（每张询价单每个商品一行）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodsAvgDetail {
    pub id: String,
    pub inquiry_id: String,
    pub goods_id: String,
    pub org_id: String,
    pub guide_price: Option<f64>, // 发改委指导价
    pub avg_price: Option<f64>,   // 本期均价
    pub market_prices: [Option<f64>; 3],
}

// ==========================================
// GoodsPrice - 供应商报价
// ==========================================
// 唯一键: (inquiry_id, supplier_id, goods_id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodsPrice {
    pub id: String,
    pub inquiry_id: String,
    pub supplier_id: String,
    pub goods_id: String,
    pub org_id: String,
    pub unit_price: f64,
    pub float_ratio: f64,
}

// ==========================================
// 导入结果
// ==========================================

/// 单个 sheet 的导入统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetSummary {
    pub sheet_name: String,
    pub category_id: String,
    pub category_name: String,
    pub rows: usize,
    pub goods_created: usize,
    pub goods_matched: usize,
    pub suppliers_created: usize,
    pub suppliers_updated: usize,
    pub prices_written: usize,
}

/// 整个工作簿的导入结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub inquiry_id: String,
    pub org_id: String,
    pub title: String,
    pub inquiry_date: NaiveDate,
    pub sheets: Vec<SheetSummary>,
    pub elapsed_ms: u64,
}

impl ImportSummary {
    pub fn total_rows(&self) -> usize {
        self.sheets.iter().map(|s| s.rows).sum()
    }
}
