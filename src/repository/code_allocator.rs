// ==========================================
// 食品询价管理 - 机构内编码/排序分配器
// ==========================================
// 规则:
//   base       = org.sort * 1000
//   child.code = org.code + 三位后缀（001..999）
//   child.sort = base + 后缀
// 后缀取已用集合中的最小缺口（无缺口则为最大值 + 1）。
// 已软删的行仍占用后缀，编码不回收。
// ==========================================
// 并发: SQLite 没有 SELECT ... FOR UPDATE。
// 调用方必须处于 IMMEDIATE 事务中；lock_organization 先对机构行
// 做一次空更新以持有写锁，再扫描兄弟行。
// ==========================================

use crate::domain::organization::{Organization, MAX_SUFFIX};
use crate::domain::types::ScopedTable;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::BTreeSet;
use tracing::debug;

/// 已加锁的机构命名空间快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgNamespace {
    pub org_id: String,
    pub code: String,
    pub sort: i64,
}

impl OrgNamespace {
    pub fn base(&self) -> i64 {
        self.sort * crate::domain::organization::SORT_BASE_FACTOR
    }
}

impl From<&Organization> for OrgNamespace {
    fn from(org: &Organization) -> Self {
        Self {
            org_id: org.id.clone(),
            code: org.code.clone(),
            sort: org.sort,
        }
    }
}

/// 一次分配的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedCode {
    pub code: String,
    pub sort: i64,
}

// ==========================================
// 纯函数
// ==========================================

/// 从 1 开始查找第一个未被占用的正整数
///
/// # 示例
/// {1,2,4} -> 3；{} -> 1；{1,2,3} -> 4
pub fn first_gap(used: &BTreeSet<i64>) -> i64 {
    let mut next = 1;
    for &n in used.range(1..) {
        if n == next {
            next += 1;
        } else if n > next {
            break;
        }
    }
    next
}

/// code 后缀格式化: prefix + 三位补零
pub fn format_code(prefix: &str, suffix: i64) -> String {
    format!("{}{:03}", prefix, suffix)
}

/// 从已有 code 中剥离前缀得到后缀
///
/// 只接受 `prefix + 恰好三位数字`，其余格式视为无关编码返回 None。
pub fn parse_code_suffix(prefix: &str, code: &str) -> Option<i64> {
    let rest = code.strip_prefix(prefix)?;
    if rest.len() != 3 || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// 校验机构能否派生子编码
pub fn check_namespace(org_id: &str, code: &str, sort: i64) -> RepositoryResult<()> {
    if code.trim().is_empty() {
        return Err(RepositoryError::AllocationPrecondition {
            org_id: org_id.to_string(),
            reason: "机构编码为空，无法派生子编码".to_string(),
        });
    }
    if sort < 0 {
        return Err(RepositoryError::AllocationPrecondition {
            org_id: org_id.to_string(),
            reason: format!("机构 sort 非法: {}", sort),
        });
    }
    Ok(())
}

// ==========================================
// CodeSequenceAllocator
// ==========================================
pub struct CodeSequenceAllocator;

impl CodeSequenceAllocator {
    /// 读取机构 code/sort（不加锁）
    pub fn read_namespace(conn: &Connection, org_id: &str) -> RepositoryResult<OrgNamespace> {
        let row = conn
            .query_row(
                "SELECT code, sort FROM base_org WHERE id = ?1 AND is_deleted = 0",
                params![org_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        match row {
            Some((code, sort)) => Ok(OrgNamespace {
                org_id: org_id.to_string(),
                code,
                sort,
            }),
            None => Err(RepositoryError::NotFound {
                entity: "Organization".to_string(),
                id: org_id.to_string(),
            }),
        }
    }

    /// 锁定机构行并返回其命名空间
    ///
    /// 前提校验在加锁之前完成：机构编码为空或 sort < 0 时直接失败。
    pub fn lock_organization(tx: &Transaction, org_id: &str) -> RepositoryResult<OrgNamespace> {
        let ns = Self::read_namespace(tx, org_id)?;
        check_namespace(org_id, &ns.code, ns.sort)?;

        tx.execute(
            "UPDATE base_org SET updated_at = updated_at WHERE id = ?1",
            params![org_id],
        )?;

        // 加锁后重读，防止加锁前快照已过期
        let locked = Self::read_namespace(tx, org_id)?;
        check_namespace(org_id, &locked.code, locked.sort)?;
        Ok(locked)
    }

    /// 扫描 table 中属于该机构的 code，返回下一个 code 后缀
    pub fn next_code_suffix(
        tx: &Transaction,
        table: ScopedTable,
        ns: &OrgNamespace,
    ) -> RepositoryResult<i64> {
        let sql = format!(
            "SELECT code FROM {} WHERE {} = ?1 AND code IS NOT NULL AND code <> ''",
            table.table_name(),
            table.scope_column()
        );
        let mut stmt = tx.prepare(&sql)?;
        let codes = stmt.query_map(params![ns.org_id], |row| row.get::<_, String>(0))?;

        let mut used = BTreeSet::new();
        for code in codes {
            if let Some(n) = parse_code_suffix(&ns.code, &code?) {
                used.insert(n);
            }
        }
        Self::checked_gap(table, ns, &used)
    }

    /// 扫描 (base, base+999] 内的 sort，返回下一个 sort 后缀
    pub fn next_sort_suffix(
        tx: &Transaction,
        table: ScopedTable,
        ns: &OrgNamespace,
    ) -> RepositoryResult<i64> {
        let base = ns.base();
        let sql = format!(
            "SELECT sort FROM {} WHERE {} = ?1 AND sort > ?2 AND sort <= ?3",
            table.table_name(),
            table.scope_column()
        );
        let mut stmt = tx.prepare(&sql)?;
        let sorts = stmt.query_map(params![ns.org_id, base, base + MAX_SUFFIX], |row| {
            row.get::<_, i64>(0)
        })?;

        let mut used = BTreeSet::new();
        for sort in sorts {
            used.insert(sort? - base);
        }
        Self::checked_gap(table, ns, &used)
    }

    /// 通用后缀查询
    ///
    /// # 参数
    /// - table: 目标实体表
    /// - org_id: 作用域键
    /// - base: 数值基数；为 None 时按 code 前缀扫描，否则按 sort 窗口扫描
    /// - lock_parent: 是否先锁定机构行
    pub fn next_suffix(
        tx: &Transaction,
        table: ScopedTable,
        org_id: &str,
        base: Option<i64>,
        lock_parent: bool,
    ) -> RepositoryResult<i64> {
        let ns = if lock_parent {
            Self::lock_organization(tx, org_id)?
        } else {
            let ns = Self::read_namespace(tx, org_id)?;
            check_namespace(org_id, &ns.code, ns.sort)?;
            ns
        };

        match base {
            None => Self::next_code_suffix(tx, table, &ns),
            Some(base) if base == ns.base() => Self::next_sort_suffix(tx, table, &ns),
            Some(base) => Err(RepositoryError::ValidationError(format!(
                "sort 基数 {} 与机构基数 {} 不一致",
                base,
                ns.base()
            ))),
        }
    }

    /// 锁定机构并为一条新记录分配 code + sort
    ///
    /// # 返回
    /// - Ok(AllocatedCode): 新的 code 与 sort
    /// - Err(AllocationPrecondition): 机构编码为空或 sort 非法
    /// - Err(SequenceExhausted): 后缀超过 999
    pub fn allocate(
        tx: &Transaction,
        table: ScopedTable,
        org_id: &str,
    ) -> RepositoryResult<AllocatedCode> {
        let ns = Self::lock_organization(tx, org_id)?;
        let code_suffix = Self::next_code_suffix(tx, table, &ns)?;
        let sort_suffix = Self::next_sort_suffix(tx, table, &ns)?;

        let allocated = AllocatedCode {
            code: format_code(&ns.code, code_suffix),
            sort: ns.base() + sort_suffix,
        };
        debug!(
            table = table.table_name(),
            org_id = %org_id,
            code = %allocated.code,
            sort = allocated.sort,
            "分配编码"
        );
        Ok(allocated)
    }

    fn checked_gap(
        table: ScopedTable,
        ns: &OrgNamespace,
        used: &BTreeSet<i64>,
    ) -> RepositoryResult<i64> {
        let next = first_gap(used);
        if next > MAX_SUFFIX {
            return Err(RepositoryError::SequenceExhausted {
                table: table.table_name().to_string(),
                org_id: ns.org_id.clone(),
            });
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(v: &[i64]) -> BTreeSet<i64> {
        v.iter().copied().collect()
    }

    #[test]
    fn test_first_gap_fills_lowest_hole() {
        assert_eq!(first_gap(&set(&[1, 2, 4])), 3);
        assert_eq!(first_gap(&set(&[])), 1);
        assert_eq!(first_gap(&set(&[1, 2, 3])), 4);
        assert_eq!(first_gap(&set(&[2, 3])), 1);
        assert_eq!(first_gap(&set(&[-5, 0, 1])), 2);
    }

    #[test]
    fn test_parse_code_suffix_ignores_malformed() {
        assert_eq!(parse_code_suffix("01", "01007"), Some(7));
        assert_eq!(parse_code_suffix("01", "01abc"), None);
        assert_eq!(parse_code_suffix("01", "0100"), None);
        assert_eq!(parse_code_suffix("01", "010001"), None);
        assert_eq!(parse_code_suffix("01", "02001"), None);
    }

    #[test]
    fn test_format_code() {
        assert_eq!(format_code("03", 12), "03012");
        assert_eq!(format_code("12", 999), "12999");
    }

    #[test]
    fn test_check_namespace_rejects_bad_org() {
        assert!(check_namespace("o", "", 1)
            .unwrap_err()
            .is_allocation_precondition());
        assert!(check_namespace("o", "01", -1)
            .unwrap_err()
            .is_allocation_precondition());
        assert!(check_namespace("o", "01", 0).is_ok());
    }
}
