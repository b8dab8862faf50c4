// ==========================================
// 食品询价管理 - 领域类型定义
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 旬 (Ten-day period)
// ==========================================
// 存储格式: 1=上旬 2=中旬 3=下旬
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TenDay {
    Early,  // 上旬
    Middle, // 中旬
    Late,   // 下旬
}

impl TenDay {
    /// 由日（1..=31）推导所属旬
    pub fn from_day(day: u32) -> Self {
        match day {
            0..=10 => TenDay::Early,
            11..=20 => TenDay::Middle,
            _ => TenDay::Late,
        }
    }

    /// 由标题中的“上/中/下”识别
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "上" => Some(TenDay::Early),
            "中" => Some(TenDay::Middle),
            "下" => Some(TenDay::Late),
            _ => None,
        }
    }

    /// 该旬的首日
    pub fn first_day(&self) -> u32 {
        match self {
            TenDay::Early => 1,
            TenDay::Middle => 11,
            TenDay::Late => 21,
        }
    }

    pub fn to_db_value(&self) -> i64 {
        match self {
            TenDay::Early => 1,
            TenDay::Middle => 2,
            TenDay::Late => 3,
        }
    }
}

impl fmt::Display for TenDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenDay::Early => write!(f, "上旬"),
            TenDay::Middle => write!(f, "中旬"),
            TenDay::Late => write!(f, "下旬"),
        }
    }
}

// ==========================================
// 机构内派生编码的实体表
// ==========================================
// 每张表在每个机构下独立分配 code/sort 后缀
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopedTable {
    Category,
    Goods,
    Market,
    Supplier,
}

impl ScopedTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            ScopedTable::Category => "base_category",
            ScopedTable::Goods => "base_goods",
            ScopedTable::Market => "base_market",
            ScopedTable::Supplier => "supplier",
        }
    }

    /// 作用域列（均为 org_id）
    pub fn scope_column(&self) -> &'static str {
        "org_id"
    }
}

impl fmt::Display for ScopedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table_name())
    }
}

// ==========================================
// 全局字典表（无派生编码）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DictTable {
    Unit,
    Spec,
    MealTime,
}

impl DictTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            DictTable::Unit => "base_unit",
            DictTable::Spec => "base_spec",
            DictTable::MealTime => "menu_meal",
        }
    }

    /// 中文名称（用于错误信息）
    pub fn label(&self) -> &'static str {
        match self {
            DictTable::Unit => "单位",
            DictTable::Spec => "规格标准",
            DictTable::MealTime => "餐次",
        }
    }
}

// ==========================================
// find-or-create 结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolveOutcome {
    Matched, // 命中已有记录
    Created, // 新建
    Updated, // 命中并就地更新（如供应商浮动比例、商品品类）
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_day_from_day() {
        assert_eq!(TenDay::from_day(1), TenDay::Early);
        assert_eq!(TenDay::from_day(10), TenDay::Early);
        assert_eq!(TenDay::from_day(11), TenDay::Middle);
        assert_eq!(TenDay::from_day(21), TenDay::Late);
        assert_eq!(TenDay::from_day(31), TenDay::Late);
    }

    #[test]
    fn test_ten_day_marker_round_trip_first_day() {
        let late = TenDay::from_marker("下").unwrap();
        assert_eq!(late.first_day(), 21);
        assert_eq!(TenDay::from_day(late.first_day()), late);
        assert!(TenDay::from_marker("末").is_none());
    }
}
