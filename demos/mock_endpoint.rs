//! A stand-in for the Dark Visitors API that prints every visit it receives.
//!
//! ```text
//! cargo run --example mock_endpoint
//! ```
//!
//! Point the proxy at it with `endpoint http://127.0.0.1:8090/visits`.

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    http::{header, HeaderMap, StatusCode},
    routing::post,
    Router,
};

async fn receive_visit(headers: HeaderMap, body: Bytes) -> StatusCode {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("<none>");

    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(visit) => {
            println!("Authorization: {}", auth);
            println!("{}", serde_json::to_string_pretty(&visit).unwrap_or_default());
            StatusCode::ACCEPTED
        }
        Err(e) => {
            println!("Rejected malformed visit: {}", e);
            StatusCode::BAD_REQUEST
        }
    }
}

#[tokio::main]
async fn main() {
    let app = Router::new().route("/visits", post(receive_visit));

    let addr = SocketAddr::from(([127, 0, 0, 1], 8090));
    println!("Mock visits endpoint listening on http://{}/visits", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
