use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, BalanceResponse};
use crate::node::lock;

/// Wallet and stake balance on the canonical chain.
#[get("/balance/{address}/")]
pub async fn get_balance(state: web::Data<AppState>, path: web::Path<(String,)>) -> impl Responder {
    let address = path.into_inner().0;
    let (wallet, stake) = lock(&state.node).balance(&address);
    HttpResponse::Ok().json(BalanceResponse {
        address,
        wallet,
        stake,
    })
}
