// ==========================================
// 食品询价管理 - 基础资料领域模型
// ==========================================
// 机构内实体: Category / Goods / Market / Supplier（派生 code/sort）
// 全局字典:   Unit / Spec / MealTime（按 name 唯一，无派生编码）
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// Category - 品类
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub code: Option<String>,
    pub sort: i64,
    pub pinyin: Option<String>,
    pub org_id: String,
}

// ==========================================
// Goods - 商品
// ==========================================
// 自然键: (org_id, name, spec_id, unit_id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goods {
    pub id: String,
    pub name: String,
    pub code: Option<String>,
    pub sort: i64,
    pub pinyin: Option<String>,
    pub spec_id: String,
    pub unit_id: String,
    pub category_id: String,
    pub org_id: String,
}

// ==========================================
// Market - 询价市场
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub name: String,
    pub code: Option<String>,
    pub sort: i64,
    pub org_id: String,
}

// ==========================================
// Supplier - 供应商
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: String,
    pub name: String,
    pub code: Option<String>,
    pub sort: i64,
    pub pinyin: Option<String>,
    pub description: String,
    pub float_ratio: f64, // 结算下浮比例（0.12 表示下浮 12%）
    pub org_id: String,
}

// ==========================================
// DictEntry - 全局字典项（单位/规格/餐次）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictEntry {
    pub id: String,
    pub name: String,
    pub sort: i64,
}

pub type Unit = DictEntry;
pub type Spec = DictEntry;
pub type MealTime = DictEntry;
