// ==========================================
// 食品询价管理 - 询价表导入编排
// ==========================================
// 流程: 解析 → 标题校验 → 各 sheet 表头定位/列校验
//      → 开启 IMMEDIATE 事务 → 询价单表头 → 逐 sheet 逐行解析实体并写入
//      → 提交 | 回滚
// 约束:
// - 整个导入在一个事务中完成，任何错误都整体回滚
// - 结构错误在开启事务前返回，不写入任何数据
// - 每个 sheet、每一行处理前检查取消/超时
// ==========================================

use crate::config::import_rules::ImportRules;
use crate::db::open_sqlite_connection;
use crate::domain::catalog::Category;
use crate::domain::inquiry::{GoodsAvgDetail, GoodsPrice, ImportSummary, PriceInquiry, SheetSummary};
use crate::domain::types::{DictTable, ResolveOutcome};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::import_validator::{ImportValidator, SheetLayout, TitleInfo};
use crate::importer::workbook_parser::{locate_header, OoxmlWorkbookParser, Sheet, WorkbookParser};
use crate::repository::code_allocator::{check_namespace, CodeSequenceAllocator};
use crate::repository::entity_resolver::EntityResolver;
use crate::repository::error::RepositoryError;
use crate::repository::inquiry_repo::InquiryRepository;
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// ImportContext - 取消与超时
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ImportContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl ImportContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置相对超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// 使用外部取消令牌
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 已取消或已超时则返回 Cancelled
    pub fn check(&self) -> ImportResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ImportError::Cancelled);
            }
        }
        Ok(())
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// 通过结构校验、待写入的 sheet
struct PreparedSheet<'a> {
    sheet: &'a Sheet,
    layout: SheetLayout,
}

// ==========================================
// InquiryImporter
// ==========================================
pub struct InquiryImporter {
    conn: Arc<Mutex<Connection>>,
    parser: Box<dyn WorkbookParser>,
    validator: ImportValidator,
}

impl InquiryImporter {
    /// 打开数据库并使用默认解析器与规则
    pub fn new(db_path: &str) -> ImportResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    /// 从已有连接创建
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            parser: Box::new(OoxmlWorkbookParser),
            validator: ImportValidator::default(),
        }
    }

    /// 替换工作簿解析器
    pub fn with_parser(mut self, parser: Box<dyn WorkbookParser>) -> Self {
        self.parser = parser;
        self
    }

    /// 替换导入规则
    pub fn with_rules(mut self, rules: ImportRules) -> Self {
        self.validator = ImportValidator::new(rules);
        self
    }

    /// 导入询价工作簿，返回新询价单 id
    pub fn import(&self, org_id: &str, bytes: &[u8]) -> ImportResult<String> {
        self.import_with_context(&ImportContext::new(), org_id, bytes)
            .map(|summary| summary.inquiry_id)
    }

    /// 导入询价工作簿（可取消），返回导入统计
    ///
    /// # 参数
    /// - ctx: 取消令牌与截止时间
    /// - org_id: 所属机构
    /// - bytes: .xlsx 文件内容
    ///
    /// # 返回
    /// - Ok(ImportSummary): 已提交
    /// - Err(ImportError): 已回滚，数据库中不存在本次导入的任何行
    #[instrument(skip(self, ctx, bytes), fields(org_id = %org_id, size = bytes.len(), parser = self.parser.name()))]
    pub fn import_with_context(
        &self,
        ctx: &ImportContext,
        org_id: &str,
        bytes: &[u8],
    ) -> ImportResult<ImportSummary> {
        let started = Instant::now();
        let org_id = org_id.trim();
        if org_id.is_empty() {
            return Err(ImportError::InvalidInput("org_id 不能为空".to_string()));
        }
        if bytes.is_empty() {
            return Err(ImportError::InvalidInput("文件内容为空".to_string()));
        }
        ctx.check()?;
        info!("开始导入询价表");

        // === Opened ===
        let workbook = self.parser.parse(bytes)?;
        let sheets: Vec<&Sheet> = workbook.sheets.iter().filter(|s| !s.is_empty()).collect();
        let first = sheets.first().ok_or(ImportError::EmptyWorkbook)?;

        // === TitleValidated ===
        let raw_title = self
            .validator
            .find_title(first)
            .ok_or_else(|| ImportError::InvalidTitle {
                title: String::new(),
                reason: "未找到标题".to_string(),
            })?;
        let title = self.validator.validate_title(raw_title)?;
        debug!(title = %title.title, date = %title.inquiry_date, "标题校验通过");

        // === HeaderLocated / ColumnsValidated（全部 sheet 先行校验） ===
        let rules = self.validator.rules();
        let mut prepared = Vec::with_capacity(sheets.len());
        for sheet in sheets {
            ctx.check()?;
            let header = locate_header(sheet, &rules.anchor_header, rules.header_scan_rows)
                .ok_or_else(|| ImportError::HeaderNotFound {
                    sheet: sheet.name.clone(),
                })?;
            let layout = self.validator.validate_columns(&sheet.name, &header)?;
            debug!(
                sheet = %sheet.name,
                header_row = layout.header_row + 1,
                suppliers = layout.suppliers.len(),
                "表头校验通过"
            );
            prepared.push(PreparedSheet { sheet, layout });
        }

        let mut conn = self
            .conn
            .lock()
            .map_err(|e| ImportError::from(RepositoryError::LockError(e.to_string())))?;

        // 分配前提在加锁前校验
        let ns = CodeSequenceAllocator::read_namespace(&conn, org_id)
            .map_err(|e| ImportError::repository("读取机构", e))?;
        check_namespace(org_id, &ns.code, ns.sort)
            .map_err(|e| ImportError::repository("读取机构", e))?;

        // 写锁被其他导入占用时持续等待，每轮等待时长为连接的 busy_timeout
        let mut waited_rounds = 0u32;
        let tx = loop {
            match conn.transaction_with_behavior(TransactionBehavior::Immediate) {
                Ok(tx) => break tx,
                Err(e) if is_busy(&e) => {
                    waited_rounds += 1;
                    if let Err(cancelled) = ctx.check() {
                        warn!(rounds = waited_rounds, "等待写锁时取消");
                        return Err(cancelled);
                    }
                    debug!(rounds = waited_rounds, "写锁被占用，继续等待");
                }
                Err(e) => {
                    return Err(ImportError::repository(
                        "开启事务",
                        RepositoryError::DatabaseTransactionError(e.to_string()),
                    ))
                }
            }
        };

        let outcome = self.write_all(ctx, &tx, org_id, &title, &prepared);
        let (inquiry_id, sheet_summaries) = match outcome {
            Ok(v) => v,
            Err(e) => {
                // tx 析构时回滚
                warn!(error = %e, "导入失败，事务回滚");
                return Err(e);
            }
        };

        // 提交前最后一次检查，超时则整体放弃
        if let Err(e) = ctx.check() {
            warn!("提交前检测到取消，事务回滚");
            return Err(e);
        }
        tx.commit().map_err(|e| {
            ImportError::repository(
                "提交事务",
                RepositoryError::DatabaseTransactionError(e.to_string()),
            )
        })?;

        let summary = ImportSummary {
            inquiry_id,
            org_id: org_id.to_string(),
            title: title.title.clone(),
            inquiry_date: title.inquiry_date,
            sheets: sheet_summaries,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            inquiry_id = %summary.inquiry_id,
            sheets = summary.sheets.len(),
            rows = summary.total_rows(),
            elapsed_ms = summary.elapsed_ms,
            "询价表导入完成"
        );
        Ok(summary)
    }

    /// 事务内写入：表头 + 各 sheet
    fn write_all(
        &self,
        ctx: &ImportContext,
        tx: &Transaction,
        org_id: &str,
        title: &TitleInfo,
        prepared: &[PreparedSheet<'_>],
    ) -> ImportResult<(String, Vec<SheetSummary>)> {
        let rules = self.validator.rules();

        let mut markets: [Option<String>; 3] = [None, None, None];
        for (slot, name) in markets.iter_mut().zip(rules.market_headers.iter()) {
            let market = EntityResolver::get_or_create_market_tx(tx, org_id, name)
                .map_err(|e| ImportError::repository(format!("询价市场 {}", name), e))?;
            *slot = Some(market.entity.name);
        }

        let inquiry = PriceInquiry {
            id: Uuid::new_v4().to_string(),
            org_id: org_id.to_string(),
            title: title.title.clone(),
            inquiry_date: title.inquiry_date,
            markets,
        };
        InquiryRepository::insert_inquiry_tx(tx, &inquiry)
            .map_err(|e| ImportError::repository("创建询价记录", e))?;

        let mut summaries = Vec::with_capacity(prepared.len());
        for item in prepared {
            ctx.check()?;
            let summary = self.write_sheet(ctx, tx, org_id, title, &inquiry.id, item)?;
            summaries.push(summary);
        }
        Ok((inquiry.id, summaries))
    }

    /// 写入单个 sheet
    fn write_sheet(
        &self,
        ctx: &ImportContext,
        tx: &Transaction,
        org_id: &str,
        title: &TitleInfo,
        inquiry_id: &str,
        item: &PreparedSheet<'_>,
    ) -> ImportResult<SheetSummary> {
        let sheet = item.sheet;
        let layout = &item.layout;
        let rules = self.validator.rules();

        let category = self.resolve_category(tx, org_id, title, sheet, layout)?;
        let mut summary = SheetSummary {
            sheet_name: sheet.name.clone(),
            category_id: category.id.clone(),
            category_name: category.name.clone(),
            ..SheetSummary::default()
        };

        for row_idx in (layout.header_row + 1)..sheet.rows.len() {
            ctx.check()?;
            let row_no = row_idx + 1;
            let at = || format!("sheet {} 第{}行", sheet.name, row_no);
            let row_err = |message: String| ImportError::DataRow {
                sheet: sheet.name.clone(),
                row: row_no,
                message,
            };

            // 品名为空即数据结束
            let Some(goods_name) = sheet.text(row_idx, layout.name_col) else {
                debug!(sheet = %sheet.name, row = row_no, "遇到空品名，结束本 sheet");
                break;
            };
            let spec_name = sheet
                .text(row_idx, layout.spec_col)
                .ok_or_else(|| row_err(format!("{}不能为空", rules.spec_header())))?;
            let unit_name = sheet
                .text(row_idx, layout.unit_col)
                .ok_or_else(|| row_err(format!("{}不能为空", rules.unit_header())))?;

            let spec = EntityResolver::get_or_create_dict_tx(tx, DictTable::Spec, spec_name)
                .map_err(|e| ImportError::repository(at(), e))?;
            let unit = EntityResolver::get_or_create_dict_tx(tx, DictTable::Unit, unit_name)
                .map_err(|e| ImportError::repository(at(), e))?;
            let goods = EntityResolver::get_or_create_goods_tx(
                tx,
                org_id,
                goods_name,
                &category.id,
                &spec.entity.id,
                &unit.entity.id,
            )
            .map_err(|e| ImportError::repository(at(), e))?;
            match goods.outcome {
                ResolveOutcome::Created => summary.goods_created += 1,
                ResolveOutcome::Matched | ResolveOutcome::Updated => summary.goods_matched += 1,
            }

            let mut market_prices = [None; 3];
            for (slot, market) in market_prices.iter_mut().zip(layout.markets.iter()) {
                *slot = sheet.number(row_idx, market.col);
            }
            let detail = GoodsAvgDetail {
                id: Uuid::new_v4().to_string(),
                inquiry_id: inquiry_id.to_string(),
                goods_id: goods.entity.id.clone(),
                org_id: org_id.to_string(),
                guide_price: layout.guide_price_col.and_then(|c| sheet.number(row_idx, c)),
                avg_price: sheet.number(row_idx, layout.avg_price_col),
                market_prices,
            };
            InquiryRepository::upsert_avg_detail_tx(tx, &detail)
                .map_err(|e| ImportError::repository(at(), e))?;

            for column in &layout.suppliers {
                let Some(unit_price) = sheet.number(row_idx, column.col).filter(|p| *p > 0.0)
                else {
                    continue;
                };
                let supplier = EntityResolver::get_or_create_supplier_tx(
                    tx,
                    org_id,
                    &column.name,
                    column.ratio,
                )
                .map_err(|e| ImportError::repository(format!("{} 列[{}]", at(), column.header), e))?;
                match supplier.outcome {
                    ResolveOutcome::Created => summary.suppliers_created += 1,
                    ResolveOutcome::Updated => summary.suppliers_updated += 1,
                    ResolveOutcome::Matched => {}
                }

                let price = GoodsPrice {
                    id: Uuid::new_v4().to_string(),
                    inquiry_id: inquiry_id.to_string(),
                    supplier_id: supplier.entity.id,
                    goods_id: goods.entity.id.clone(),
                    org_id: org_id.to_string(),
                    unit_price,
                    float_ratio: column.ratio,
                };
                InquiryRepository::upsert_goods_price_tx(tx, &price)
                    .map_err(|e| ImportError::repository(format!("{} 列[{}]", at(), column.header), e))?;
                summary.prices_written += 1;
            }

            summary.rows += 1;
        }

        debug!(
            sheet = %summary.sheet_name,
            rows = summary.rows,
            goods_created = summary.goods_created,
            prices = summary.prices_written,
            "sheet 写入完成"
        );
        Ok(summary)
    }

    /// sheet 名即品类；sheet 名为空时取标题中的“主要X市场”
    fn resolve_category(
        &self,
        tx: &Transaction,
        org_id: &str,
        title: &TitleInfo,
        sheet: &Sheet,
        layout: &SheetLayout,
    ) -> ImportResult<Category> {
        let name = match sheet.name.trim() {
            "" => title.category_hint().ok_or_else(|| ImportError::DataRow {
                sheet: sheet.name.clone(),
                row: layout.header_row + 1,
                message: "无法确定品类名称".to_string(),
            })?,
            name => name.to_string(),
        };
        let category = EntityResolver::get_or_create_category_tx(tx, org_id, &name)
            .map_err(|e| ImportError::repository(format!("sheet {} 品类", sheet.name), e))?;
        Ok(category.entity)
    }
}
