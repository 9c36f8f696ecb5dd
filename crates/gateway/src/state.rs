use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use config::AppConfig;
use domain::{MessageStore, ObjectStore, RoomDirectory, TokenValidator};
use infrastructure::Bus;

use crate::admission::Admission;
use crate::hub::Hub;

/// 网关共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub hub: Arc<Hub>,
    pub bus: Arc<dyn Bus>,
    pub token_validator: Arc<dyn TokenValidator>,
    pub room_directory: Arc<dyn RoomDirectory>,
    pub message_store: Arc<dyn MessageStore>,
    pub object_store: Arc<dyn ObjectStore>,
    pub admission: Arc<Admission>,
    /// Prometheus 渲染句柄；未安装 recorder（部分测试）时为 None
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        hub: Arc<Hub>,
        bus: Arc<dyn Bus>,
        token_validator: Arc<dyn TokenValidator>,
        room_directory: Arc<dyn RoomDirectory>,
        message_store: Arc<dyn MessageStore>,
        object_store: Arc<dyn ObjectStore>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let admission = Arc::new(Admission::new(Arc::clone(&room_directory)));
        Self {
            config,
            hub,
            bus,
            token_validator,
            room_directory,
            message_store,
            object_store,
            admission,
            metrics,
        }
    }
}
