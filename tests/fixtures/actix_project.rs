// @openapi
use actix_web::{delete, get, post, web, HttpRequest, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Serialize)]
pub struct Order {
    pub id: u64,
    pub total: f64,
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct NewOrder {
    pub total: f64,
}

/// Places an order.
/// @tag orders
#[post("/orders")]
async fn create_order(user: AuthUser, body: web::Json<NewOrder>) -> HttpResponse {
    if body.total <= 0.0 {
        return HttpResponse::BadRequest().json(json!({"error": "empty order"}));
    }
    let order = Order {
        id: 1,
        total: body.total,
        note: None,
    };
    HttpResponse::Created().json(order)
}

/// Cancels an order.
#[delete("/orders/{id}")]
async fn cancel_order(req: HttpRequest, path: web::Path<u64>) -> impl Responder {
    require_admin(&req)?;
    orders_repo.delete(path.into_inner());
    HttpResponse::NoContent().finish()
}

#[get("/version")]
async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
