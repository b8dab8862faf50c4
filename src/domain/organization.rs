// ==========================================
// 食品询价管理 - 机构领域模型
// ==========================================
// 机构是所有派生编码的命名空间:
//   base = org.sort * 1000
//   child.code = org.code + 三位后缀
// ==========================================

use serde::{Deserialize, Serialize};

/// 每个机构下单表可分配的最大后缀
pub const MAX_SUFFIX: i64 = 999;

/// 机构 sort 到派生 sort 基数的倍率
pub const SORT_BASE_FACTOR: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub code: String,
    pub parent_id: String,
    pub description: String,
    pub sort: i64,
    pub pinyin: Option<String>,
    pub is_deleted: bool,
}

impl Organization {
    /// 派生 sort 的基数
    pub fn sort_base(&self) -> i64 {
        self.sort * SORT_BASE_FACTOR
    }

    /// 由机构 sort 生成两位编码（"01"、"12"...）
    pub fn code_from_sort(sort: i64) -> String {
        format!("{:02}", sort)
    }
}
