pub mod api;
pub mod logging;

use sentinel_engine::Engine;
use std::sync::Arc;

pub use api::create_router;

// 查询 API 共享状态（供 main.rs 和测试使用）
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Arc<Self> {
        Arc::new(Self { engine })
    }
}
