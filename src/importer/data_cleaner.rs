// ==========================================
// 食品询价管理 - 单元格清洗
// ==========================================
// 职责: 表头标准化 / 价格文本解析 / 比例取整
// 规则: 无法解析的数值视为缺失，不报错
// ==========================================

/// 表示“无数据”的占位文本
const ABSENT_MARKERS: &[&str] = &["-", "—", "--", "——", "/"];

/// 标准化表头文本：去掉所有空白（含换行、全角空格）
pub fn normalize_header(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// 去除首尾空白，空串返回 None
pub fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// 解析价格文本
///
/// - 去除千分位逗号（半角/全角）与末尾“元”
/// - 空白及 `-`、`—`、`--`、`——`、`/` 视为缺失
/// - 保留两位小数
///
/// # 返回
/// - Some(price): 可解析的有限数值
/// - None: 缺失或无法解析
pub fn parse_price(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || ABSENT_MARKERS.contains(&trimmed) {
        return None;
    }

    let cleaned: String = trimmed
        .trim_end_matches('元')
        .chars()
        .filter(|c| *c != ',' && *c != '，' && !c.is_whitespace())
        .collect();

    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(round_to(value, 2))
}

/// 四舍五入到指定小数位
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}
