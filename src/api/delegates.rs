use actix_web::{HttpResponse, Responder, get, web};
use chrono::Utc;

use super::models::{AppState, DelegatesResponse, ReputationResponse};
use crate::node::lock;

#[get("/delegates/")]
pub async fn get_delegates(state: web::Data<AppState>) -> impl Responder {
    let node = lock(&state.node);
    let delegates = node.get_delegate_roster();
    HttpResponse::Ok().json(DelegatesResponse {
        size: delegates.len(),
        delegates,
    })
}

/// Activity ranking, idle penalty evaluated at request time.
#[get("/reputation/")]
pub async fn get_reputation(state: web::Data<AppState>) -> impl Responder {
    let accounts = lock(&state.node).reputation(Utc::now().timestamp_millis());
    HttpResponse::Ok().json(ReputationResponse { accounts })
}
