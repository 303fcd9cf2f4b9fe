//! Client message handlers

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client as NatsClient, Subscriber};
use tracing::{error, info};

use super::{authenticate, internal_error, save_error, serve, HandlerContext, Reply};
use crate::services::csv_import::ImportError;
use crate::types::{
    Client, ClientAttributes, ClientDetail, CsvImportAccepted, CsvImportRequest, DeleteResponse,
    ErrorResponse, IdRequest, ListClientsRequest, ListResponse, Request, SuccessResponse,
    UpdateClientRequest,
};

const NOT_FOUND: &str = "Cliente não encontrado";

pub(crate) async fn create(ctx: &HandlerContext, request: Request<ClientAttributes>) -> Reply<Client> {
    let user_id = authenticate(&request, &ctx.jwt_secret)?;

    match ctx.clients.create(user_id, &request.payload).await {
        Ok(client) => Ok(SuccessResponse::new(request.id, client)),
        Err(e) => Err(save_error(request.id, "create client", e)),
    }
}

pub(crate) async fn list(
    ctx: &HandlerContext,
    request: Request<ListClientsRequest>,
) -> Reply<ListResponse<Client>> {
    let user_id = authenticate(&request, &ctx.jwt_secret)?;
    let params = request.payload;

    let (items, total) = ctx
        .store
        .list_clients(user_id, &params)
        .await
        .map_err(|e| internal_error(request.id, "list clients", e))?;

    Ok(SuccessResponse::new(
        request.id,
        ListResponse {
            items,
            total,
            limit: params.limit,
            offset: params.offset,
        },
    ))
}

pub(crate) async fn get(ctx: &HandlerContext, request: Request<IdRequest>) -> Reply<ClientDetail> {
    let user_id = authenticate(&request, &ctx.jwt_secret)?;

    match ctx.store.get_client(user_id, request.payload.id).await {
        Ok(Some(client)) => Ok(SuccessResponse::new(request.id, ClientDetail::from(client))),
        Ok(None) => Err(ErrorResponse::not_found(request.id, NOT_FOUND)),
        Err(e) => Err(internal_error(request.id, "get client", e)),
    }
}

pub(crate) async fn update(
    ctx: &HandlerContext,
    request: Request<UpdateClientRequest>,
) -> Reply<Client> {
    let user_id = authenticate(&request, &ctx.jwt_secret)?;
    let UpdateClientRequest { id, attributes } = &request.payload;

    match ctx.clients.update(user_id, *id, attributes).await {
        Ok(Some(client)) => Ok(SuccessResponse::new(request.id, client)),
        Ok(None) => Err(ErrorResponse::not_found(request.id, NOT_FOUND)),
        Err(e) => Err(save_error(request.id, "update client", e)),
    }
}

pub(crate) async fn delete(ctx: &HandlerContext, request: Request<IdRequest>) -> Reply<DeleteResponse> {
    let user_id = authenticate(&request, &ctx.jwt_secret)?;

    match ctx.clients.delete(user_id, request.payload.id).await {
        Ok(true) => Ok(SuccessResponse::new(request.id, DeleteResponse { deleted: true })),
        Ok(false) => Err(ErrorResponse::not_found(request.id, NOT_FOUND)),
        Err(e) => Err(internal_error(request.id, "delete client", e)),
    }
}

pub(crate) async fn import_csv(
    ctx: &HandlerContext,
    request: Request<CsvImportRequest>,
) -> Reply<CsvImportAccepted> {
    let user_id = authenticate(&request, &ctx.jwt_secret)?;

    match ctx
        .imports
        .start_import(user_id, request.payload, ctx.queue.as_ref())
        .await
    {
        Ok(accepted) => {
            info!("User {} started CSV import {}", user_id, accepted.import_report_id);
            Ok(SuccessResponse::new(request.id, accepted))
        }
        Err(ImportError::Validation(message)) => Err(
            ErrorResponse::new(request.id, "VALIDATION_ERROR", message).with_status(422),
        ),
        Err(e @ ImportError::Internal(_)) => {
            error!("Failed to start CSV import: {:#}", e);
            Err(ErrorResponse::new(request.id, "INTERNAL_ERROR", e.user_message()).with_status(e.status()))
        }
    }
}

/// Handle painel.client.create messages
pub async fn handle_create(client: NatsClient, subscriber: Subscriber, ctx: Arc<HandlerContext>) -> Result<()> {
    serve(client, subscriber, "client.create", |request| {
        let ctx = Arc::clone(&ctx);
        async move { create(&ctx, request).await }
    })
    .await
}

/// Handle painel.client.list messages
pub async fn handle_list(client: NatsClient, subscriber: Subscriber, ctx: Arc<HandlerContext>) -> Result<()> {
    serve(client, subscriber, "client.list", |request| {
        let ctx = Arc::clone(&ctx);
        async move { list(&ctx, request).await }
    })
    .await
}

/// Handle painel.client.get messages
pub async fn handle_get(client: NatsClient, subscriber: Subscriber, ctx: Arc<HandlerContext>) -> Result<()> {
    serve(client, subscriber, "client.get", |request| {
        let ctx = Arc::clone(&ctx);
        async move { get(&ctx, request).await }
    })
    .await
}

/// Handle painel.client.update messages
pub async fn handle_update(client: NatsClient, subscriber: Subscriber, ctx: Arc<HandlerContext>) -> Result<()> {
    serve(client, subscriber, "client.update", |request| {
        let ctx = Arc::clone(&ctx);
        async move { update(&ctx, request).await }
    })
    .await
}

/// Handle painel.client.delete messages
pub async fn handle_delete(client: NatsClient, subscriber: Subscriber, ctx: Arc<HandlerContext>) -> Result<()> {
    serve(client, subscriber, "client.delete", |request| {
        let ctx = Arc::clone(&ctx);
        async move { delete(&ctx, request).await }
    })
    .await
}

/// Handle painel.client.import_csv messages
pub async fn handle_import_csv(client: NatsClient, subscriber: Subscriber, ctx: Arc<HandlerContext>) -> Result<()> {
    serve(client, subscriber, "client.import_csv", |request| {
        let ctx = Arc::clone(&ctx);
        async move { import_csv(&ctx, request).await }
    })
    .await
}
