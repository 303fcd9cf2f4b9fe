//! Appointment message handlers

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use chrono::Utc;

use super::{authenticate, internal_error, save_error, serve, HandlerContext, Reply};
use crate::types::{
    AppointmentInput, AppointmentView, DeleteResponse, ErrorResponse, IdRequest,
    ListAppointmentsRequest, ListResponse, Request, SuccessResponse, UpdateAppointmentRequest,
};

const NOT_FOUND: &str = "Compromisso não encontrado";

pub(crate) async fn create(
    ctx: &HandlerContext,
    request: Request<AppointmentInput>,
) -> Reply<AppointmentView> {
    let user_id = authenticate(&request, &ctx.jwt_secret)?;

    match ctx.appointments.create(user_id, &request.payload).await {
        Ok(appointment) => Ok(SuccessResponse::new(
            request.id,
            AppointmentView::at(appointment, Utc::now()),
        )),
        Err(e) => Err(save_error(request.id, "create appointment", e)),
    }
}

pub(crate) async fn list(
    ctx: &HandlerContext,
    request: Request<ListAppointmentsRequest>,
) -> Reply<ListResponse<AppointmentView>> {
    let user_id = authenticate(&request, &ctx.jwt_secret)?;
    let params = request.payload;
    let now = Utc::now();

    let (appointments, total) = ctx
        .store
        .list_appointments(user_id, &params, now)
        .await
        .map_err(|e| internal_error(request.id, "list appointments", e))?;

    Ok(SuccessResponse::new(
        request.id,
        ListResponse {
            items: appointments
                .into_iter()
                .map(|a| AppointmentView::at(a, now))
                .collect(),
            total,
            limit: params.limit,
            offset: params.offset,
        },
    ))
}

pub(crate) async fn get(ctx: &HandlerContext, request: Request<IdRequest>) -> Reply<AppointmentView> {
    let user_id = authenticate(&request, &ctx.jwt_secret)?;

    match ctx.store.get_appointment(user_id, request.payload.id).await {
        Ok(Some(appointment)) => Ok(SuccessResponse::new(
            request.id,
            AppointmentView::at(appointment, Utc::now()),
        )),
        Ok(None) => Err(ErrorResponse::not_found(request.id, NOT_FOUND)),
        Err(e) => Err(internal_error(request.id, "get appointment", e)),
    }
}

pub(crate) async fn update(
    ctx: &HandlerContext,
    request: Request<UpdateAppointmentRequest>,
) -> Reply<AppointmentView> {
    let user_id = authenticate(&request, &ctx.jwt_secret)?;
    let UpdateAppointmentRequest { id, input } = &request.payload;

    match ctx.appointments.update(user_id, *id, input).await {
        Ok(Some(appointment)) => Ok(SuccessResponse::new(
            request.id,
            AppointmentView::at(appointment, Utc::now()),
        )),
        Ok(None) => Err(ErrorResponse::not_found(request.id, NOT_FOUND)),
        Err(e) => Err(save_error(request.id, "update appointment", e)),
    }
}

pub(crate) async fn delete(ctx: &HandlerContext, request: Request<IdRequest>) -> Reply<DeleteResponse> {
    let user_id = authenticate(&request, &ctx.jwt_secret)?;

    match ctx.appointments.delete(user_id, request.payload.id).await {
        Ok(true) => Ok(SuccessResponse::new(request.id, DeleteResponse { deleted: true })),
        Ok(false) => Err(ErrorResponse::not_found(request.id, NOT_FOUND)),
        Err(e) => Err(internal_error(request.id, "delete appointment", e)),
    }
}

/// Handle painel.appointment.create messages
pub async fn handle_create(client: Client, subscriber: Subscriber, ctx: Arc<HandlerContext>) -> Result<()> {
    serve(client, subscriber, "appointment.create", |request| {
        let ctx = Arc::clone(&ctx);
        async move { create(&ctx, request).await }
    })
    .await
}

/// Handle painel.appointment.list messages
pub async fn handle_list(client: Client, subscriber: Subscriber, ctx: Arc<HandlerContext>) -> Result<()> {
    serve(client, subscriber, "appointment.list", |request| {
        let ctx = Arc::clone(&ctx);
        async move { list(&ctx, request).await }
    })
    .await
}

/// Handle painel.appointment.get messages
pub async fn handle_get(client: Client, subscriber: Subscriber, ctx: Arc<HandlerContext>) -> Result<()> {
    serve(client, subscriber, "appointment.get", |request| {
        let ctx = Arc::clone(&ctx);
        async move { get(&ctx, request).await }
    })
    .await
}

/// Handle painel.appointment.update messages
pub async fn handle_update(client: Client, subscriber: Subscriber, ctx: Arc<HandlerContext>) -> Result<()> {
    serve(client, subscriber, "appointment.update", |request| {
        let ctx = Arc::clone(&ctx);
        async move { update(&ctx, request).await }
    })
    .await
}

/// Handle painel.appointment.delete messages
pub async fn handle_delete(client: Client, subscriber: Subscriber, ctx: Arc<HandlerContext>) -> Result<()> {
    serve(client, subscriber, "appointment.delete", |request| {
        let ctx = Arc::clone(&ctx);
        async move { delete(&ctx, request).await }
    })
    .await
}
