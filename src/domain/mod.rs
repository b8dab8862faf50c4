// ==========================================
// 食品询价管理 - 领域模型层
// ==========================================
// 职责: 定义领域实体与类型
// 红线: 不含数据访问逻辑
// ==========================================

pub mod catalog;
pub mod inquiry;
pub mod organization;
pub mod types;

// 重导出核心类型
pub use catalog::{Category, DictEntry, Goods, Market, MealTime, Spec, Supplier, Unit};
pub use inquiry::{GoodsAvgDetail, GoodsPrice, ImportSummary, PriceInquiry, SheetSummary};
pub use organization::{Organization, MAX_SUFFIX, SORT_BASE_FACTOR};
pub use types::{DictTable, ResolveOutcome, ScopedTable, TenDay};
