//! 主应用程序入口
//!
//! 退出码：0 正常；1 配置错误；2 启动时必需的协作者不可达。

use std::process::ExitCode;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use domain::{MessageStore, ObjectStore, RoomDirectory, TokenValidator};
use gateway::{router, AppState, Hub};
use infrastructure::{
    create_pg_pool, Bus, HmacTokenValidator, HttpObjectStore, LocalBus, MemoryMessageStore,
    MemoryObjectStore, MemoryRoomDirectory, PgMessageStore, PgRoomDirectory, RedisBus,
    RemoteTokenValidator,
};

const EXIT_CONFIG: u8 = 1;
const EXIT_DEPENDENCY: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match AppConfig::load() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!(error = %e, "配置加载失败");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}

async fn run(config: Arc<AppConfig>) -> Result<(), ExitCode> {
    // 消息总线：配置了 BUS_ADDR 时接入集群，否则退化为单实例进程内总线
    let bus: Arc<dyn Bus> = match &config.bus_addr {
        Some(addr) => {
            let redis_bus = RedisBus::connect(addr, config.bus_auth.as_deref())
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "无法连接消息总线");
                    ExitCode::from(EXIT_DEPENDENCY)
                })?;
            Arc::new(redis_bus)
        }
        None => {
            tracing::info!("BUS_ADDR 未设置，使用进程内总线（单实例模式）");
            Arc::new(LocalBus::new())
        }
    };

    // Token 校验：远程服务优先，否则本地 HMAC
    let token_validator: Arc<dyn TokenValidator> = match &config.token_validator_addr {
        Some(addr) => {
            let validator = RemoteTokenValidator::new(addr).map_err(|e| {
                tracing::error!(error = %e, "token 校验客户端初始化失败");
                ExitCode::from(EXIT_DEPENDENCY)
            })?;
            Arc::new(validator)
        }
        None => {
            // load() 已保证二者至少有其一
            let secret = config
                .token_shared_secret
                .as_deref()
                .expect("validated config");
            Arc::new(HmacTokenValidator::new(secret))
        }
    };

    // 持久化：配置了 STORE_DSN 时使用 Postgres，否则内存存储
    let (room_directory, message_store): (Arc<dyn RoomDirectory>, Arc<dyn MessageStore>) =
        match &config.store_dsn {
            Some(dsn) => {
                let pool = create_pg_pool(dsn).await.map_err(|e| {
                    tracing::error!(error = %e, "无法连接消息存储");
                    ExitCode::from(EXIT_DEPENDENCY)
                })?;
                (
                    Arc::new(PgRoomDirectory::new(pool.clone())),
                    Arc::new(PgMessageStore::new(pool)),
                )
            }
            None => {
                tracing::warn!("STORE_DSN 未设置，使用内存存储（数据不落盘）");
                (
                    Arc::new(MemoryRoomDirectory::new()),
                    Arc::new(MemoryMessageStore::new()),
                )
            }
        };

    let object_store: Arc<dyn ObjectStore> = match &config.upload_endpoint {
        Some(endpoint) => {
            let store = HttpObjectStore::new(
                endpoint,
                &config.upload_bucket,
                config.upload_public_base.as_deref(),
            )
            .map_err(|e| {
                tracing::error!(error = %e, "对象存储客户端初始化失败");
                ExitCode::from(EXIT_DEPENDENCY)
            })?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("UPLOAD_ENDPOINT 未设置，附件保存在内存中");
            Arc::new(MemoryObjectStore::new())
        }
    };

    // 指标后端
    let metrics_handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        tracing::error!(error = %e, "metrics recorder 安装失败");
        ExitCode::from(EXIT_CONFIG)
    })?;
    gateway::metrics::describe();

    let hub = Hub::spawn(Arc::clone(&bus), config.reg_cap);

    let state = AppState::new(
        Arc::clone(&config),
        Arc::clone(&hub),
        bus,
        token_validator,
        room_directory,
        message_store,
        object_store,
        Some(metrics_handle),
    );

    let app = router(state);
    let listen_addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, addr = %listen_addr, "监听失败");
            ExitCode::from(EXIT_CONFIG)
        })?;

    tracing::info!(addr = %listen_addr, "chatfleet 服务已启动");

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // 先停 Hub 订阅，再关闭所有连接写端，各任务随之退出
    hub.shutdown().await;

    if let Err(e) = serve_result {
        tracing::error!(error = %e, "服务异常退出");
        return Err(ExitCode::from(EXIT_DEPENDENCY));
    }

    tracing::info!("服务正常退出");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c 监听失败");
    }
}
