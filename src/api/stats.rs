use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, StatsResponse};
use crate::node::lock;

#[get("/stats/")]
pub async fn get_stats(state: web::Data<AppState>) -> impl Responder {
    let node = lock(&state.node);
    let tree = node.tree();
    let head = node.get_head();
    HttpResponse::Ok().json(StatsResponse {
        blocks: tree.len(),
        height: head.map(|b| b.index),
        head: head.map(|b| b.hash.clone()),
        cumulative_weight: head.map(|b| b.cumulative_weight),
        leaves: tree.leaf_count(),
        orphans: tree.orphan_count(),
        pending_transactions: node.pending_len(),
        block_interval_secs: node.config().schedule.block_interval_secs,
    })
}
