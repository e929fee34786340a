use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware,
    response::Response,
};
use tower_http::trace::TraceLayer;

use crate::{
    adapters::middleware::{request_id_middleware, request_timing_middleware},
    core::GatewayService,
};

/// HTTP handler adapting axum requests to the gateway pipeline.
#[derive(Clone)]
pub struct HttpHandler {
    gateway_service: Arc<GatewayService>,
}

impl HttpHandler {
    pub fn new(gateway_service: Arc<GatewayService>) -> Self {
        Self { gateway_service }
    }

    /// Run one request through the gateway.
    pub async fn handle_request(
        &self,
        req: Request,
        client_addr: Option<SocketAddr>,
    ) -> Response {
        self.gateway_service
            .handle_request(req, client_addr)
            .await
            .map(Body::from)
    }

    /// Router sending every method and path to the gateway, wrapped in the
    /// request-id, timing and HTTP trace layers.
    pub fn router(self) -> Router {
        Router::new()
            .fallback(gateway_fallback)
            .with_state(self)
            .layer(middleware::from_fn(request_timing_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .layer(TraceLayer::new_for_http())
    }
}

async fn gateway_fallback(State(handler): State<HttpHandler>, req: Request) -> Response {
    // Present when served with `into_make_service_with_connect_info`.
    let client_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    handler.handle_request(req, client_addr).await
}
