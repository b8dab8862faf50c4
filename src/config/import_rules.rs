// ==========================================
// 食品询价管理 - 导入规则与读取 Trait
// ==========================================
// 职责: 定义询价表结构约定（锚点列、必需列、询价市场列等）
// 红线: 不包含配置写入
// ==========================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;

/// 询价表结构约定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRules {
    /// 表头锚点列（品名）
    pub anchor_header: String,
    /// 必需列，顺序为: 品名、规格标准、单位、本期均价
    pub required_headers: Vec<String>,
    /// 三个询价市场列（顺序即 market_1..3）
    pub market_headers: Vec<String>,
    /// 指导价列（可选）
    pub guide_price_header: String,
    /// 表头扫描行数上限
    pub header_scan_rows: usize,
    /// 标题扫描区域（行 x 列）
    pub title_scan_rows: usize,
    pub title_scan_cols: usize,
    /// 标题固定后缀
    pub title_suffix: String,
}

impl Default for ImportRules {
    fn default() -> Self {
        Self {
            anchor_header: "品名".to_string(),
            required_headers: vec![
                "品名".to_string(),
                "规格标准".to_string(),
                "单位".to_string(),
                "本期均价".to_string(),
            ],
            market_headers: vec![
                "富万家超市".to_string(),
                "育英巷菜市场".to_string(),
                "大润发".to_string(),
            ],
            guide_price_header: "发改委指导价".to_string(),
            header_scan_rows: 20,
            title_scan_rows: 3,
            title_scan_cols: 5,
            title_suffix: "参考价".to_string(),
        }
    }
}

impl ImportRules {
    /// 必需列中的第 i 列；配置缺项时回落到默认列名
    fn required(&self, idx: usize) -> &str {
        self.required_headers
            .get(idx)
            .map(String::as_str)
            .unwrap_or(match idx {
                0 => "品名",
                1 => "规格标准",
                2 => "单位",
                _ => "本期均价",
            })
    }

    pub fn name_header(&self) -> &str {
        self.required(0)
    }

    pub fn spec_header(&self) -> &str {
        self.required(1)
    }

    pub fn unit_header(&self) -> &str {
        self.required(2)
    }

    pub fn avg_price_header(&self) -> &str {
        self.required(3)
    }

    /// 已知的固定列（非供应商列）
    pub fn is_fixed_header(&self, header: &str) -> bool {
        header == self.guide_price_header
            || self.required_headers.iter().any(|h| h == header)
            || self.market_headers.iter().any(|h| h == header)
    }
}

// ==========================================
// ImportRulesReader Trait
// ==========================================
// 实现者: ConfigManager（config_kv 覆写）
#[async_trait]
pub trait ImportRulesReader: Send + Sync {
    /// 读取导入规则（缺失项使用默认值）
    async fn get_import_rules(&self) -> Result<ImportRules, Box<dyn Error + Send + Sync>>;
}

/// 固定规则（测试与 CLI 默认使用）
pub struct StaticImportRules(pub ImportRules);

#[async_trait]
impl ImportRulesReader for StaticImportRules {
    async fn get_import_rules(&self) -> Result<ImportRules, Box<dyn Error + Send + Sync>> {
        Ok(self.0.clone())
    }
}
