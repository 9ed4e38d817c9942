//! chainmirror-api: HTTP routes over the depository contract and its mirror.
//!
//! | Route | Backed by |
//! |---|---|
//! | `GET  /basic/currentNonce?account=` | ledger `Current` |
//! | `GET  /basic/total` | ledger `Total` |
//! | `POST /basic/putValue` | signed write (`PutValue`) |
//! | `POST /basic/putUntrustValue` | unsigned write (`PutUntrustValue`) |
//! | `GET  /basic/getValue?index=&kid=` | ledger read |
//! | `POST /basic/verifyValue` | ledger read + compare |
//! | `GET  /basic/depositories` | mirror list |
//! | `GET  /basic/depositories/:kid` | mirror lookup |
//! | `GET  /hf/metadata` | contract metadata |

pub mod error;
pub mod handlers;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::ApiState;

pub fn build_router(state: ApiState) -> Router {
    let basic = Router::new()
        .route("/currentNonce", get(handlers::current_nonce))
        .route("/total", get(handlers::total))
        .route("/putValue", post(handlers::put_value))
        .route("/putUntrustValue", post(handlers::put_untrust_value))
        .route("/getValue", get(handlers::get_value))
        .route("/verifyValue", post(handlers::verify_value))
        .route("/depositories", get(handlers::list_depositories))
        .route("/depositories/:kid", get(handlers::get_depository));

    Router::new()
        .nest("/basic", basic)
        .route("/hf/metadata", get(handlers::metadata))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    state: ApiState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "http server listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
