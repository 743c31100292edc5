mod balance;
mod chain;
mod delegates;
mod health;
pub mod models;
mod stats;

use actix_web::web::{self, ServiceConfig};

pub use models::AppState;

/// Read-only routes; nothing here mutates node state.
pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(chain::get_chain)
            .service(chain::get_block)
            .service(chain::get_head)
            .service(balance::get_balance)
            .service(delegates::get_delegates)
            .service(delegates::get_reputation)
            .service(stats::get_stats),
    );
}
