use actix_web::{HttpResponse, Responder, get, web};
use log::debug;

use super::models::{AppState, ChainQuery, ChainResponse};
use crate::node::lock;

/// Root-to-head chain, or root-to-`from` when given.
#[get("/chain/")]
pub async fn get_chain(state: web::Data<AppState>, query: web::Query<ChainQuery>) -> impl Responder {
    let node = lock(&state.node);
    let chain = node.get_chain(query.from.as_deref());
    if chain.is_empty() && query.from.is_some() {
        debug!("GET /chain/ - unknown from={:?}", query.from);
        return HttpResponse::NotFound().body("unknown block");
    }
    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        head: node.get_head().map(|b| b.hash.as_str()),
        chain,
    })
}

#[get("/block/{hash}/")]
pub async fn get_block(state: web::Data<AppState>, path: web::Path<(String,)>) -> impl Responder {
    let hash = path.into_inner().0;
    let node = lock(&state.node);
    match node.get_block(&hash) {
        Some(block) => HttpResponse::Ok().json(block),
        None => HttpResponse::NotFound().body("unknown block"),
    }
}

#[get("/head/")]
pub async fn get_head(state: web::Data<AppState>) -> impl Responder {
    let node = lock(&state.node);
    match node.get_head() {
        Some(block) => HttpResponse::Ok().json(block),
        None => HttpResponse::NotFound().body("no head yet"),
    }
}
