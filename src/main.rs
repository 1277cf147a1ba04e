//! AniWay Notify CLI
//!
//! 订阅通知推送、查看和整理收件箱

use anyhow::{Context, Result};
use aniway_notify::{
    resolve_target, target_for, Category, ClientConfig, ConnectionState, HttpNotificationApi,
    NotificationApi, NotificationEvent, NotificationKind, NotificationSession, StatusFilter,
};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "anotify")]
#[command(about = "AniWay Notify - 通知推送客户端")]
#[command(version)]
struct Cli {
    /// API 基础 URL（覆盖配置文件和 ANIWAY_BASE_URL）
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// 用户 ID（覆盖配置文件和 ANIWAY_USER_ID）
    #[arg(long, global = true)]
    user_id: Option<u64>,
    /// Bearer token（覆盖配置文件和 ANIWAY_TOKEN）
    #[arg(long, global = true)]
    token: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 订阅推送，持续打印新通知（Ctrl-C 退出）
    Watch,
    /// 拉取一页通知
    List {
        /// 页码（从 0 开始）
        #[arg(long, default_value = "0")]
        page: usize,
        /// 只显示指定分类（updates / social / important）
        #[arg(long)]
        category: Option<String>,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 查看未读数
    Unread,
    /// 标记指定通知为已读
    MarkRead {
        /// 通知 ID
        #[arg(required = true)]
        ids: Vec<u64>,
    },
    /// 全部标记为已读
    MarkAll,
    /// 删除全部通知
    Clear,
    /// 查看私信 / 频道 / 好友请求摘要
    Summary,
    /// 解析通知的跳转目标
    Target {
        /// 通知类型（如 COMMENT_REPLY）
        kind: String,
        /// payload JSON
        #[arg(long)]
        payload: Option<String>,
    },
}

fn format_event(event: &NotificationEvent) -> String {
    let marker = if event.is_unread() { "●" } else { " " };
    let target = target_for(event).unwrap_or_else(|| "-".to_string());
    format!(
        "{} #{} {} [{}/{}] → {}",
        marker,
        event.id,
        event.kind.title(),
        event.kind.category().as_str(),
        event.kind.as_str(),
        target
    )
}

async fn watch(config: &ClientConfig) -> Result<()> {
    let identity = config.identity()?;
    let session = NotificationSession::from_config(config, None)?;
    let mut inserted = session.store().subscribe();
    let mut health = session.supervisor().subscribe();

    let page = session.sign_in(identity).await?;
    let snapshot = session.store().snapshot();
    println!(
        "已加载 {} 条通知，未读 {}{}",
        snapshot.items.len(),
        snapshot.unread,
        if page.has_more { "（还有更多）" } else { "" }
    );

    let threshold = config.degraded_after_failures;
    let mut degraded = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            received = inserted.recv() => match received {
                Ok(event) => {
                    println!("{}", format_event(&event));
                    println!("  未读: {}", session.store().unread());
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Output lagged behind notifications"),
                Err(RecvError::Closed) => break,
            },
            changed = health.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = health.borrow_and_update().clone();
                if current.state == ConnectionState::Connected {
                    degraded = false;
                } else if !degraded && current.is_degraded(threshold) {
                    degraded = true;
                    warn!(
                        failures = current.consecutive_failures,
                        "Notification stream keeps failing, still retrying"
                    );
                }
            }
        }
    }

    session.sign_out();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    // 例如: RUST_LOG=debug anotify watch
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("aniway_notify=info,anotify=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::auto_load()?
        .with_base_url(cli.base_url)
        .with_user_id(cli.user_id)
        .with_token(cli.token);

    match cli.command {
        Commands::Watch => watch(&config).await?,
        Commands::List {
            page,
            category,
            json,
        } => {
            let category = category
                .map(|raw| {
                    Category::parse(&raw).with_context(|| format!("unknown category: {}", raw))
                })
                .transpose()?;
            let api = HttpNotificationApi::from_config(&config)?;
            let mut response = api
                .fetch_page(&config.identity()?, StatusFilter::All, page, config.page_size)
                .await?;
            if let Some(category) = category {
                response.items.retain(|n| n.kind.category() == category);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("第 {} 页，{} 条，未读 {}:\n", page, response.items.len(), response.unread_count);
                for event in &response.items {
                    println!("  {}", format_event(event));
                }
            }
        }
        Commands::Unread => {
            let api = HttpNotificationApi::from_config(&config)?;
            println!("{}", api.unread_count(&config.identity()?).await?);
        }
        Commands::MarkRead { ids } => {
            let api = HttpNotificationApi::from_config(&config)?;
            let changed = api.mark_read(&config.identity()?, &ids).await?;
            println!("已标记 {} 条为已读", changed);
        }
        Commands::MarkAll => {
            let api = HttpNotificationApi::from_config(&config)?;
            let changed = api.mark_all_read(&config.identity()?).await?;
            println!("已标记 {} 条为已读", changed);
        }
        Commands::Clear => {
            let api = HttpNotificationApi::from_config(&config)?;
            let deleted = api.delete_all(&config.identity()?).await?;
            println!("已删除 {} 条通知", deleted);
        }
        Commands::Summary => {
            let api = HttpNotificationApi::from_config(&config)?;
            let summary = api.inbox_summary(&config.identity()?).await?;
            println!("私信未读: {}", summary.direct_unread);
            println!("频道未读: {}", summary.channel_unread);
            println!("好友请求: {}", summary.pending_friend_requests);
        }
        Commands::Target { kind, payload } => {
            let payload = payload
                .map(|raw| serde_json::from_str::<serde_json::Value>(&raw))
                .transpose()
                .context("--payload must be valid JSON")?;
            println!("分类: {}", Category::of(&kind).as_str());
            match resolve_target(NotificationKind::parse(&kind), payload.as_ref()) {
                Some(target) => println!("{}", target),
                None => eprintln!("类型 {} 没有跳转目标", kind),
            }
        }
    }

    Ok(())
}
