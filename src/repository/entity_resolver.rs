// ==========================================
// 食品询价管理 - 实体解析（find-or-create）
// ==========================================
// 职责: 按自然键查找有效记录，未命中则新建
// - 机构内实体（品类/商品/市场/供应商）通过 CodeSequenceAllocator 派生 code/sort
// - 全局字典（单位/规格/餐次）按 name 唯一，不派生编码
// 约束: *_tx 函数必须在 IMMEDIATE 事务中调用
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::catalog::{Category, DictEntry, Goods, Market, Supplier};
use crate::domain::types::{DictTable, ResolveOutcome, ScopedTable};
use crate::repository::code_allocator::CodeSequenceAllocator;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::search_key::pinyin_key;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// 浮动比例变更判定容差
const RATIO_EPSILON: f64 = 0.0001;

/// 解析结果：实体 + 命中/新建/更新
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub entity: T,
    pub outcome: ResolveOutcome,
}

impl<T> Resolved<T> {
    fn matched(entity: T) -> Self {
        Self {
            entity,
            outcome: ResolveOutcome::Matched,
        }
    }

    fn created(entity: T) -> Self {
        Self {
            entity,
            outcome: ResolveOutcome::Created,
        }
    }

    pub fn is_created(&self) -> bool {
        self.outcome == ResolveOutcome::Created
    }

    pub fn is_updated(&self) -> bool {
        self.outcome == ResolveOutcome::Updated
    }
}

fn natural_name(field: &str, raw: &str) -> RepositoryResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(RepositoryError::ValidationError(format!("{}不能为空", field)));
    }
    Ok(name.to_string())
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// ==========================================
// EntityResolver
// ==========================================
pub struct EntityResolver {
    conn: Arc<Mutex<Connection>>,
}

impl EntityResolver {
    /// 创建新的 EntityResolver 实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 在独立 IMMEDIATE 事务中执行 f 并提交
    fn in_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction) -> RepositoryResult<T>,
    ) -> RepositoryResult<T> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        let value = f(&tx)?;
        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(value)
    }

    // ===== 独立事务入口 =====

    pub fn get_or_create_category(
        &self,
        org_id: &str,
        name: &str,
    ) -> RepositoryResult<Resolved<Category>> {
        self.in_transaction(|tx| Self::get_or_create_category_tx(tx, org_id, name))
    }

    pub fn get_or_create_market(
        &self,
        org_id: &str,
        name: &str,
    ) -> RepositoryResult<Resolved<Market>> {
        self.in_transaction(|tx| Self::get_or_create_market_tx(tx, org_id, name))
    }

    pub fn get_or_create_dict(
        &self,
        table: DictTable,
        name: &str,
    ) -> RepositoryResult<Resolved<DictEntry>> {
        self.in_transaction(|tx| Self::get_or_create_dict_tx(tx, table, name))
    }

    pub fn get_or_create_goods(
        &self,
        org_id: &str,
        name: &str,
        category_id: &str,
        spec_id: &str,
        unit_id: &str,
    ) -> RepositoryResult<Resolved<Goods>> {
        self.in_transaction(|tx| {
            Self::get_or_create_goods_tx(tx, org_id, name, category_id, spec_id, unit_id)
        })
    }

    pub fn get_or_create_supplier(
        &self,
        org_id: &str,
        name: &str,
        float_ratio: f64,
    ) -> RepositoryResult<Resolved<Supplier>> {
        self.in_transaction(|tx| Self::get_or_create_supplier_tx(tx, org_id, name, float_ratio))
    }

    // ==========================================
    // 事务内实现
    // ==========================================

    /// 品类 find-or-create
    pub fn get_or_create_category_tx(
        tx: &Transaction,
        org_id: &str,
        name: &str,
    ) -> RepositoryResult<Resolved<Category>> {
        let name = natural_name("品类名称", name)?;
        let existing = tx
            .query_row(
                "SELECT id, name, code, sort, pinyin, org_id FROM base_category
                 WHERE org_id = ?1 AND name = ?2 AND is_deleted = 0",
                params![org_id, name],
                |row| {
                    Ok(Category {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        code: row.get(2)?,
                        sort: row.get(3)?,
                        pinyin: row.get(4)?,
                        org_id: row.get(5)?,
                    })
                },
            )
            .optional()?;
        if let Some(category) = existing {
            return Ok(Resolved::matched(category));
        }

        let allocated = CodeSequenceAllocator::allocate(tx, ScopedTable::Category, org_id)?;
        let category = Category {
            id: new_id(),
            pinyin: pinyin_key(&name),
            name,
            code: Some(allocated.code),
            sort: allocated.sort,
            org_id: org_id.to_string(),
        };
        tx.execute(
            "INSERT INTO base_category (id, name, code, sort, pinyin, org_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                category.id,
                category.name,
                category.code,
                category.sort,
                category.pinyin,
                category.org_id
            ],
        )?;
        debug!(org_id = %org_id, name = %category.name, "新建品类");
        Ok(Resolved::created(category))
    }

    /// 询价市场 find-or-create
    pub fn get_or_create_market_tx(
        tx: &Transaction,
        org_id: &str,
        name: &str,
    ) -> RepositoryResult<Resolved<Market>> {
        let name = natural_name("市场名称", name)?;
        let existing = tx
            .query_row(
                "SELECT id, name, code, sort, org_id FROM base_market
                 WHERE org_id = ?1 AND name = ?2 AND is_deleted = 0",
                params![org_id, name],
                |row| {
                    Ok(Market {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        code: row.get(2)?,
                        sort: row.get(3)?,
                        org_id: row.get(4)?,
                    })
                },
            )
            .optional()?;
        if let Some(market) = existing {
            return Ok(Resolved::matched(market));
        }

        let allocated = CodeSequenceAllocator::allocate(tx, ScopedTable::Market, org_id)?;
        let market = Market {
            id: new_id(),
            name,
            code: Some(allocated.code),
            sort: allocated.sort,
            org_id: org_id.to_string(),
        };
        tx.execute(
            "INSERT INTO base_market (id, name, code, sort, org_id) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![market.id, market.name, market.code, market.sort, market.org_id],
        )?;
        debug!(org_id = %org_id, name = %market.name, "新建询价市场");
        Ok(Resolved::created(market))
    }

    /// 单位/规格/餐次 find-or-create
    ///
    /// 全局字典不按机构隔离，新建记录 sort 为 0。
    pub fn get_or_create_dict_tx(
        tx: &Transaction,
        table: DictTable,
        name: &str,
    ) -> RepositoryResult<Resolved<DictEntry>> {
        let name = natural_name(table.label(), name)?;
        let select = format!(
            "SELECT id, name, sort, is_deleted FROM {} WHERE name = ?1",
            table.table_name()
        );
        let existing = tx
            .query_row(&select, params![name], |row| {
                Ok((
                    DictEntry {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        sort: row.get(2)?,
                    },
                    row.get::<_, i64>(3)? != 0,
                ))
            })
            .optional()?;

        match existing {
            Some((entry, false)) => Ok(Resolved::matched(entry)),
            // name 全局唯一，已删除的同名项直接恢复
            Some((entry, true)) => {
                let restore = format!(
                    "UPDATE {} SET is_deleted = 0, updated_at = datetime('now') WHERE id = ?1",
                    table.table_name()
                );
                tx.execute(&restore, params![entry.id])?;
                Ok(Resolved {
                    entity: entry,
                    outcome: ResolveOutcome::Updated,
                })
            }
            None => {
                let entry = DictEntry {
                    id: new_id(),
                    name,
                    sort: 0,
                };
                let insert = format!(
                    "INSERT INTO {} (id, name, sort) VALUES (?1, ?2, ?3)",
                    table.table_name()
                );
                tx.execute(&insert, params![entry.id, entry.name, entry.sort])?;
                debug!(table = table.table_name(), name = %entry.name, "新建字典项");
                Ok(Resolved::created(entry))
            }
        }
    }

    /// 商品 find-or-create
    ///
    /// 自然键 (org_id, name, spec_id, unit_id)；命中但品类不同时迁移到新品类。
    pub fn get_or_create_goods_tx(
        tx: &Transaction,
        org_id: &str,
        name: &str,
        category_id: &str,
        spec_id: &str,
        unit_id: &str,
    ) -> RepositoryResult<Resolved<Goods>> {
        let name = natural_name("品名", name)?;
        let existing = tx
            .query_row(
                "SELECT id, name, code, sort, pinyin, spec_id, unit_id, category_id, org_id
                 FROM base_goods
                 WHERE org_id = ?1 AND name = ?2 AND spec_id = ?3 AND unit_id = ?4
                   AND is_deleted = 0",
                params![org_id, name, spec_id, unit_id],
                |row| {
                    Ok(Goods {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        code: row.get(2)?,
                        sort: row.get(3)?,
                        pinyin: row.get(4)?,
                        spec_id: row.get(5)?,
                        unit_id: row.get(6)?,
                        category_id: row.get(7)?,
                        org_id: row.get(8)?,
                    })
                },
            )
            .optional()?;

        if let Some(mut goods) = existing {
            if goods.category_id == category_id {
                return Ok(Resolved::matched(goods));
            }
            tx.execute(
                "UPDATE base_goods SET category_id = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![category_id, goods.id],
            )?;
            debug!(goods_id = %goods.id, from = %goods.category_id, to = %category_id, "商品迁移品类");
            goods.category_id = category_id.to_string();
            return Ok(Resolved {
                entity: goods,
                outcome: ResolveOutcome::Updated,
            });
        }

        let allocated = CodeSequenceAllocator::allocate(tx, ScopedTable::Goods, org_id)?;
        let goods = Goods {
            id: new_id(),
            pinyin: pinyin_key(&name),
            name,
            code: Some(allocated.code),
            sort: allocated.sort,
            spec_id: spec_id.to_string(),
            unit_id: unit_id.to_string(),
            category_id: category_id.to_string(),
            org_id: org_id.to_string(),
        };
        tx.execute(
            "INSERT INTO base_goods (id, name, code, sort, pinyin, spec_id, unit_id, category_id, org_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                goods.id,
                goods.name,
                goods.code,
                goods.sort,
                goods.pinyin,
                goods.spec_id,
                goods.unit_id,
                goods.category_id,
                goods.org_id
            ],
        )?;
        Ok(Resolved::created(goods))
    }

    /// 供应商 find-or-create
    ///
    /// 已存在且浮动比例不同则就地更新（以最后一次导入为准）。
    pub fn get_or_create_supplier_tx(
        tx: &Transaction,
        org_id: &str,
        name: &str,
        float_ratio: f64,
    ) -> RepositoryResult<Resolved<Supplier>> {
        let name = natural_name("供应商名称", name)?;
        if !float_ratio.is_finite() || float_ratio < 0.0 {
            return Err(RepositoryError::ValidationError(format!(
                "供应商 {} 浮动比例非法: {}",
                name, float_ratio
            )));
        }

        let existing = tx
            .query_row(
                "SELECT id, name, code, sort, pinyin, description, float_ratio, org_id FROM supplier
                 WHERE org_id = ?1 AND name = ?2 AND is_deleted = 0",
                params![org_id, name],
                |row| {
                    Ok(Supplier {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        code: row.get(2)?,
                        sort: row.get(3)?,
                        pinyin: row.get(4)?,
                        description: row.get(5)?,
                        float_ratio: row.get(6)?,
                        org_id: row.get(7)?,
                    })
                },
            )
            .optional()?;

        if let Some(mut supplier) = existing {
            if (supplier.float_ratio - float_ratio).abs() <= RATIO_EPSILON {
                return Ok(Resolved::matched(supplier));
            }
            tx.execute(
                "UPDATE supplier SET float_ratio = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![float_ratio, supplier.id],
            )?;
            debug!(
                supplier = %supplier.name,
                old_ratio = supplier.float_ratio,
                new_ratio = float_ratio,
                "更新供应商浮动比例"
            );
            supplier.float_ratio = float_ratio;
            return Ok(Resolved {
                entity: supplier,
                outcome: ResolveOutcome::Updated,
            });
        }

        let allocated = CodeSequenceAllocator::allocate(tx, ScopedTable::Supplier, org_id)?;
        let supplier = Supplier {
            id: new_id(),
            description: format!("{}（自动导入）", name),
            pinyin: pinyin_key(&name),
            name,
            code: Some(allocated.code),
            sort: allocated.sort,
            float_ratio,
            org_id: org_id.to_string(),
        };
        tx.execute(
            "INSERT INTO supplier (id, name, code, sort, pinyin, description, float_ratio, org_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                supplier.id,
                supplier.name,
                supplier.code,
                supplier.sort,
                supplier.pinyin,
                supplier.description,
                supplier.float_ratio,
                supplier.org_id
            ],
        )?;
        debug!(org_id = %org_id, name = %supplier.name, "新建供应商");
        Ok(Resolved::created(supplier))
    }
}
