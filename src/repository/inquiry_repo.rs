// ==========================================
// 食品询价管理 - 询价单仓储
// ==========================================
// 表: base_price_inquiry / base_goods_avg_detail / base_goods_price
// 写入函数 (*_tx) 由导入编排器在同一事务中调用
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::inquiry::{GoodsAvgDetail, GoodsPrice, PriceInquiry};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// 各询价相关表的行数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InquiryTableCounts {
    pub inquiries: i64,
    pub avg_details: i64,
    pub goods_prices: i64,
    pub goods: i64,
    pub suppliers: i64,
    pub categories: i64,
    pub markets: i64,
}

pub struct InquiryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl InquiryRepository {
    /// 创建新的 InquiryRepository 实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 事务内写入
    // ==========================================

    /// 插入询价单表头
    pub fn insert_inquiry_tx(tx: &Transaction, inquiry: &PriceInquiry) -> RepositoryResult<()> {
        let [m1, m2, m3] = &inquiry.markets;
        tx.execute(
            r#"
            INSERT INTO base_price_inquiry (
                id, org_id, inquiry_title, inquiry_date,
                inquiry_year, inquiry_month, inquiry_ten_day,
                market_1, market_2, market_3
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                inquiry.id,
                inquiry.org_id,
                inquiry.title,
                inquiry.inquiry_date.format("%Y-%m-%d").to_string(),
                inquiry.year(),
                inquiry.month(),
                inquiry.ten_day().to_db_value(),
                m1,
                m2,
                m3,
            ],
        )?;
        Ok(())
    }

    /// 写入均价明细，(inquiry_id, goods_id) 冲突时覆盖价格
    pub fn upsert_avg_detail_tx(tx: &Transaction, detail: &GoodsAvgDetail) -> RepositoryResult<()> {
        let [p1, p2, p3] = detail.market_prices;
        tx.execute(
            r#"
            INSERT INTO base_goods_avg_detail (
                id, goods_id, guide_price, avg_price,
                market1_price, market2_price, market3_price,
                inquiry_id, org_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(inquiry_id, goods_id) DO UPDATE SET
                guide_price = excluded.guide_price,
                avg_price = excluded.avg_price,
                market1_price = excluded.market1_price,
                market2_price = excluded.market2_price,
                market3_price = excluded.market3_price,
                is_deleted = 0,
                updated_at = datetime('now')
            "#,
            params![
                detail.id,
                detail.goods_id,
                detail.guide_price,
                detail.avg_price,
                p1,
                p2,
                p3,
                detail.inquiry_id,
                detail.org_id,
            ],
        )?;
        Ok(())
    }

    /// 写入供应商报价，(inquiry_id, supplier_id, goods_id) 冲突时就地更新
    pub fn upsert_goods_price_tx(tx: &Transaction, price: &GoodsPrice) -> RepositoryResult<()> {
        tx.execute(
            r#"
            INSERT INTO base_goods_price (
                id, goods_id, supplier_id, inquiry_id, unit_price, float_ratio, org_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(inquiry_id, supplier_id, goods_id) DO UPDATE SET
                unit_price = excluded.unit_price,
                float_ratio = excluded.float_ratio,
                is_deleted = 0,
                updated_at = datetime('now')
            "#,
            params![
                price.id,
                price.goods_id,
                price.supplier_id,
                price.inquiry_id,
                price.unit_price,
                price.float_ratio,
                price.org_id,
            ],
        )?;
        Ok(())
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 按主键查询询价单
    pub fn find_inquiry(&self, id: &str) -> RepositoryResult<Option<PriceInquiry>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT id, org_id, inquiry_title, inquiry_date, market_1, market_2, market_3
                FROM base_price_inquiry WHERE id = ?1 AND is_deleted = 0
                "#,
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        [
                            row.get::<_, Option<String>>(4)?,
                            row.get::<_, Option<String>>(5)?,
                            row.get::<_, Option<String>>(6)?,
                        ],
                    ))
                },
            )
            .optional()?;

        let Some((id, org_id, title, date, markets)) = row else {
            return Ok(None);
        };
        let inquiry_date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
            RepositoryError::ValidationError(format!("询价日期格式错误 ({}): {}", date, e))
        })?;
        Ok(Some(PriceInquiry {
            id,
            org_id,
            title,
            inquiry_date,
            markets,
        }))
    }

    /// 某询价单下的全部均价明细
    pub fn list_avg_details(&self, inquiry_id: &str) -> RepositoryResult<Vec<GoodsAvgDetail>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, inquiry_id, goods_id, org_id, guide_price, avg_price,
                   market1_price, market2_price, market3_price
            FROM base_goods_avg_detail
            WHERE inquiry_id = ?1 AND is_deleted = 0
            ORDER BY created_at, id
            "#,
        )?;
        let details = stmt
            .query_map(params![inquiry_id], |row| {
                Ok(GoodsAvgDetail {
                    id: row.get(0)?,
                    inquiry_id: row.get(1)?,
                    goods_id: row.get(2)?,
                    org_id: row.get(3)?,
                    guide_price: row.get(4)?,
                    avg_price: row.get(5)?,
                    market_prices: [row.get(6)?, row.get(7)?, row.get(8)?],
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(details)
    }

    /// 某询价单下的全部供应商报价
    pub fn list_goods_prices(&self, inquiry_id: &str) -> RepositoryResult<Vec<GoodsPrice>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, inquiry_id, supplier_id, goods_id, org_id, unit_price, float_ratio
            FROM base_goods_price
            WHERE inquiry_id = ?1 AND is_deleted = 0
            ORDER BY created_at, id
            "#,
        )?;
        let prices = stmt
            .query_map(params![inquiry_id], |row| {
                Ok(GoodsPrice {
                    id: row.get(0)?,
                    inquiry_id: row.get(1)?,
                    supplier_id: row.get(2)?,
                    goods_id: row.get(3)?,
                    org_id: row.get(4)?,
                    unit_price: row.get(5)?,
                    float_ratio: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(prices)
    }

    /// 统计某机构下各表行数（含已删除）
    pub fn count_rows(&self, org_id: &str) -> RepositoryResult<InquiryTableCounts> {
        let conn = self.get_conn()?;
        let count = |table: &str| -> RepositoryResult<i64> {
            let sql = format!("SELECT COUNT(*) FROM {} WHERE org_id = ?1", table);
            Ok(conn.query_row(&sql, params![org_id], |row| row.get(0))?)
        };
        Ok(InquiryTableCounts {
            inquiries: count("base_price_inquiry")?,
            avg_details: count("base_goods_avg_detail")?,
            goods_prices: count("base_goods_price")?,
            goods: count("base_goods")?,
            suppliers: count("supplier")?,
            categories: count("base_category")?,
            markets: count("base_market")?,
        })
    }
}
