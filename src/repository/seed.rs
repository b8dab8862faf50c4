// ==========================================
// 食品询价管理 - 种子数据
// ==========================================
// 启动时加载一次:
// - 默认单位/规格/餐次（按 name upsert，冲突时更新 sort）
// - 默认根机构（固定 UUID，code "00"，sort -1，不可派生子编码）
// - 默认品类（挂在默认机构下，code 为 NULL）
// ==========================================

use crate::domain::types::DictTable;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::search_key::pinyin_key;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_ORG_ID: &str = "6f1a9b16-8e3a-4c7f-b2d3-9c0f5b8a12e4";
pub const DEFAULT_ORG_NAME: &str = "默认机构";
pub const DEFAULT_ORG_CODE: &str = "00";
pub const DEFAULT_ORG_DESCRIPTION: &str = "系统初始组织（种子数据）";

pub const DEFAULT_UNITS: &[&str] = &[
    "个", "包", "件", "盒", "KG", "支", "条", "瓶", "本", "台", "箱", "卷", "袋", "只", "份",
];

pub const DEFAULT_SPECS: &[&str] = &["新鲜", "新鲜散装", "新鲜不杀", "500g", "180g", "250g", "1.25L"];

pub const DEFAULT_MEAL_TIMES: &[&str] = &["早餐", "午餐", "晚餐"];

pub const DEFAULT_CATEGORIES: &[&str] = &[
    "肉类", "干货", "牛奶", "豆类淀粉制品", "调料", "果蔬", "鲜（冻）水产品", "蛋类", "豆制品",
    "面筋制品",
];

/// 种子加载结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub units: usize,
    pub specs: usize,
    pub meal_times: usize,
    pub categories: usize,
    pub default_org_created: bool,
}

fn upsert_dict(conn: &Connection, table: DictTable, names: &[&str]) -> RepositoryResult<usize> {
    let sql = format!(
        "INSERT INTO {} (id, name, sort) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO UPDATE SET sort = excluded.sort",
        table.table_name()
    );
    let mut stmt = conn.prepare(&sql)?;
    for (idx, name) in names.iter().enumerate() {
        stmt.execute(params![Uuid::new_v4().to_string(), name, idx as i64 + 1])?;
    }
    Ok(names.len())
}

fn ensure_default_org(conn: &Connection) -> RepositoryResult<bool> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM base_org WHERE id = ?1 OR code = ?2 LIMIT 1",
            params![DEFAULT_ORG_ID, DEFAULT_ORG_CODE],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if exists {
        return Ok(false);
    }

    conn.execute(
        "INSERT INTO base_org (id, name, code, parent_id, description, sort, pinyin)
         VALUES (?1, ?2, ?3, ?1, ?4, -1, ?5)",
        params![
            DEFAULT_ORG_ID,
            DEFAULT_ORG_NAME,
            DEFAULT_ORG_CODE,
            DEFAULT_ORG_DESCRIPTION,
            pinyin_key(DEFAULT_ORG_NAME)
        ],
    )?;
    Ok(true)
}

/// 默认品类：按 (默认机构, name) 存在则恢复并更新 sort，否则新建
///
/// 默认机构 sort 为 -1，不派生编码，code 保持 NULL。
fn upsert_default_categories(conn: &Connection) -> RepositoryResult<usize> {
    for (idx, name) in DEFAULT_CATEGORIES.iter().enumerate() {
        let sort = idx as i64 + 1;
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM base_category WHERE org_id = ?1 AND name = ?2
                 ORDER BY is_deleted ASC LIMIT 1",
                params![DEFAULT_ORG_ID, name],
                |row| row.get(0),
            )
            .optional()?;
        match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE base_category SET is_deleted = 0, sort = ?1, updated_at = datetime('now')
                     WHERE id = ?2",
                    params![sort, id],
                )?;
            }
            None => {
                conn.execute(
                    "INSERT INTO base_category (id, name, code, sort, pinyin, org_id)
                     VALUES (?1, ?2, NULL, ?3, ?4, ?5)",
                    params![
                        Uuid::new_v4().to_string(),
                        name,
                        sort,
                        pinyin_key(name),
                        DEFAULT_ORG_ID
                    ],
                )?;
            }
        }
    }
    Ok(DEFAULT_CATEGORIES.len())
}

/// 加载全部种子数据（幂等）
pub fn ensure_defaults(conn: &mut Connection) -> RepositoryResult<SeedReport> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

    // 默认品类依赖默认机构
    let default_org_created = ensure_default_org(&tx)?;
    let report = SeedReport {
        units: upsert_dict(&tx, DictTable::Unit, DEFAULT_UNITS)?,
        specs: upsert_dict(&tx, DictTable::Spec, DEFAULT_SPECS)?,
        meal_times: upsert_dict(&tx, DictTable::MealTime, DEFAULT_MEAL_TIMES)?,
        categories: upsert_default_categories(&tx)?,
        default_org_created,
    };

    tx.commit()
        .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

    info!(
        units = report.units,
        specs = report.specs,
        meal_times = report.meal_times,
        categories = report.categories,
        default_org_created = report.default_org_created,
        "种子数据已加载"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};

    #[test]
    fn test_ensure_defaults_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();

        let first = ensure_defaults(&mut conn).unwrap();
        assert!(first.default_org_created);
        let second = ensure_defaults(&mut conn).unwrap();
        assert!(!second.default_org_created);

        let units: i64 = conn
            .query_row("SELECT COUNT(*) FROM base_unit", [], |r| r.get(0))
            .unwrap();
        assert_eq!(units, DEFAULT_UNITS.len() as i64);

        let sort: i64 = conn
            .query_row(
                "SELECT sort FROM base_spec WHERE name = '1.25L'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(sort, 7);

        let mut stmt = conn
            .prepare(
                "SELECT name, code, org_id, pinyin FROM base_category
                 WHERE is_deleted = 0 ORDER BY sort ASC",
            )
            .unwrap();
        let categories: Vec<(String, Option<String>, String, Option<String>)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(second.categories, DEFAULT_CATEGORIES.len());
        assert_eq!(categories.len(), DEFAULT_CATEGORIES.len());
        let names: Vec<&str> = categories.iter().map(|c| c.0.as_str()).collect();
        assert_eq!(names, DEFAULT_CATEGORIES.to_vec());
        assert!(categories.iter().all(|c| c.1.is_none() && c.2 == DEFAULT_ORG_ID));
        assert_eq!(categories[0].3.as_deref(), Some("roulei"));
    }

    #[test]
    fn test_deleted_default_category_is_restored() {
        let mut conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        ensure_defaults(&mut conn).unwrap();

        conn.execute(
            "UPDATE base_category SET is_deleted = 1 WHERE name = '果蔬'",
            [],
        )
        .unwrap();
        ensure_defaults(&mut conn).unwrap();

        let (rows, deleted): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), SUM(is_deleted) FROM base_category WHERE name = '果蔬'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!((rows, deleted), (1, 0));
    }
}
