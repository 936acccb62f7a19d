pub mod api;
pub mod core;
pub mod infra;
pub mod models;

pub mod ax_state {
    use crate::infra::config::Settings;
    use crate::infra::db_external::PoolManager;

    pub struct AppState {
        pub pool_manager: PoolManager,
        pub settings: Settings,
    }
}
