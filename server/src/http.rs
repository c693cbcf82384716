//! HTTP surface of the packet tunnel
//!
//! One route: `GET /` shows a status banner and `POST /` carries packets.
//! Game clients identify themselves with the `osu!` user agent and send
//! their session token in `osu-token`; the login reply hands the token back
//! in `cho-token`.

use crate::dispatcher::Bancho;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use log::debug;
use std::future::Future;
use tokio::net::TcpListener;

pub const CLIENT_USER_AGENT: &str = "osu!";
pub const TOKEN_HEADER: &str = "osu-token";
pub const REPLY_TOKEN_HEADER: &str = "cho-token";

pub fn router(bancho: Bancho) -> Router {
    Router::new()
        .route("/", get(banner).post(tunnel))
        .with_state(bancho)
}

async fn banner(State(bancho): State<Bancho>) -> String {
    format!(
        "bancho\n{} players online\n{} matches\n",
        bancho.online_count().await,
        bancho.match_count().await
    )
}

async fn tunnel(State(bancho): State<Bancho>, headers: HeaderMap, body: Bytes) -> Response {
    let agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok());
    if agent != Some(CLIENT_USER_AGENT) {
        debug!("Rejected tunnel request from {:?}", agent);
        return "no".into_response();
    }

    let token = headers
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    let reply = bancho.handle_request(token, &body).await;

    let mut response = reply.body.into_response();
    if token.is_none() {
        let issued = reply.token.as_deref().unwrap_or("no");
        if let Ok(value) = HeaderValue::from_str(issued) {
            response.headers_mut().insert(REPLY_TOKEN_HEADER, value);
        }
    }
    response
}

/// Serves the tunnel on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, bancho: Bancho, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(bancho))
        .with_graceful_shutdown(shutdown)
        .await
}
