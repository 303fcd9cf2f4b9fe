//! Dashboard handlers: owner charts and the public stats snapshot

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};

use super::{authenticate, internal_error, serve, HandlerContext, Reply};
use crate::services::stats;
use crate::types::{ChartData, EmptyPayload, PublicDashboardEvent, Request, SuccessResponse};

/// New clients per day over the last 30 days
pub(crate) async fn clients_chart(ctx: &HandlerContext, request: Request<EmptyPayload>) -> Reply<ChartData> {
    let user_id = authenticate(&request, &ctx.jwt_secret)?;

    stats::clients_chart(ctx.store.as_ref(), user_id, ctx.utc_offset)
        .await
        .map(|chart| SuccessResponse::new(request.id, chart))
        .map_err(|e| internal_error(request.id, "build clients chart", e))
}

/// New appointments per day over the last 30 days
pub(crate) async fn appointments_chart(
    ctx: &HandlerContext,
    request: Request<EmptyPayload>,
) -> Reply<ChartData> {
    let user_id = authenticate(&request, &ctx.jwt_secret)?;

    stats::appointments_chart(ctx.store.as_ref(), user_id, ctx.utc_offset)
        .await
        .map(|chart| SuccessResponse::new(request.id, chart))
        .map_err(|e| internal_error(request.id, "build appointments chart", e))
}

/// Snapshot for a new public subscriber. Later updates arrive on the
/// `public_dashboard` subject.
pub(crate) async fn public_subscribe(
    ctx: &HandlerContext,
    request: Request<EmptyPayload>,
) -> Reply<PublicDashboardEvent> {
    ctx.stats
        .initial_event()
        .await
        .map(|event| SuccessResponse::new(request.id, event))
        .map_err(|e| internal_error(request.id, "compute dashboard stats", e))
}

/// Handle painel.dashboard.clients_chart_data messages
pub async fn handle_clients_chart(client: Client, subscriber: Subscriber, ctx: Arc<HandlerContext>) -> Result<()> {
    serve(client, subscriber, "dashboard.clients_chart_data", |request| {
        let ctx = Arc::clone(&ctx);
        async move { clients_chart(&ctx, request).await }
    })
    .await
}

/// Handle painel.dashboard.appointments_data messages
pub async fn handle_appointments_chart(
    client: Client,
    subscriber: Subscriber,
    ctx: Arc<HandlerContext>,
) -> Result<()> {
    serve(client, subscriber, "dashboard.appointments_data", |request| {
        let ctx = Arc::clone(&ctx);
        async move { appointments_chart(&ctx, request).await }
    })
    .await
}

/// Handle painel.public_dashboard.subscribe messages; no authentication
pub async fn handle_public_subscribe(
    client: Client,
    subscriber: Subscriber,
    ctx: Arc<HandlerContext>,
) -> Result<()> {
    serve(client, subscriber, "public_dashboard.subscribe", |request| {
        let ctx = Arc::clone(&ctx);
        async move { public_subscribe(&ctx, request).await }
    })
    .await
}
