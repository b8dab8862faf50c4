// ==========================================
// 食品询价管理 - 命令行入口
// ==========================================
// 子命令: init / create-org / list-orgs / import / show-inquiry / set-config
// 输出: 成功结果以 JSON 写入 stdout；错误以 JSON 写入 stderr
// ==========================================

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use foodapp_inquiry::api::ApiError;
use foodapp_inquiry::app::{get_default_config_path, get_default_db_path, AppState};
use foodapp_inquiry::config::AppConfig;
use foodapp_inquiry::{logging, APP_NAME, VERSION};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "foodapp-inquiry", version, about = "食品询价管理 - 询价表导入")]
struct Cli {
    /// 配置文件路径（不存在时写入默认配置）
    #[arg(long, global = true, env = "FOODAPP_CONFIG")]
    config: Option<PathBuf>,

    /// 数据库路径（覆盖配置文件）
    #[arg(long, global = true, env = "FOODAPP_DB_PATH")]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 建表并加载种子数据
    Init,
    /// 新建机构（code/sort 自动分配）
    CreateOrg {
        name: String,
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// 列出有效机构
    ListOrgs,
    /// 导入询价工作簿
    Import {
        /// 所属机构 id
        #[arg(long)]
        org: String,
        /// .xlsx 文件
        file: PathBuf,
    },
    /// 查看询价单及明细
    ShowInquiry { id: String },
    /// 写入全局配置（导入规则覆写）
    SetConfig { key: String, value: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(get_default_config_path);
    let config = match AppConfig::load(&config_path) {
        Ok(loaded) => loaded.config,
        Err(e) => {
            eprintln!("配置加载失败 {}: {:#}", config_path.display(), e);
            AppConfig::default()
        }
    };
    logging::init_with_level(&config.log.level);
    tracing::info!(version = VERSION, "{} 启动", APP_NAME);

    let db_path = cli
        .db
        .clone()
        .or_else(|| Some(config.db.path.clone()).filter(|p| !p.is_empty()))
        .unwrap_or_else(get_default_db_path);

    let state = match AppState::new(db_path, &config) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("初始化失败: {:#}", e);
            return ExitCode::from(2);
        }
    };

    match run(cli.command, &state).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match serde_json::to_string(&e.to_response()) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("{}", e),
            }
            ExitCode::from(1)
        }
    }
}

async fn run(command: Command, state: &AppState) -> Result<(), ApiError> {
    match command {
        Command::Init => print_json(&state.seed_report),
        Command::CreateOrg {
            name,
            parent,
            description,
        } => {
            let org = state
                .org_api
                .create_org(&name, parent.as_deref(), description.as_deref())?;
            print_json(&org)
        }
        Command::ListOrgs => print_json(&state.org_api.list_orgs()?),
        Command::Import { org, file } => {
            let summary = state.import_api.import_inquiry_file(&org, &file).await?;
            print_json(&summary)
        }
        Command::ShowInquiry { id } => {
            let (inquiry, details, prices) = state.org_api.get_inquiry(&id)?;
            print_json(&serde_json::json!({
                "inquiry": inquiry,
                "details": details,
                "prices": prices,
            }))
        }
        Command::SetConfig { key, value } => {
            state
                .config_manager
                .set_global_config_value(&key, &value)
                .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
            print_json(&serde_json::json!({ "key": key, "value": value }))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ApiError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::InternalError(format!("序列化失败: {}", e)))?;
    println!("{}", json);
    Ok(())
}
