//! Import report handlers

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};

use super::{authenticate, internal_error, serve, HandlerContext, Reply};
use crate::types::{
    EmptyPayload, ErrorResponse, IdRequest, ImportReportView, LatestImportReport, Request,
    SuccessResponse,
};

/// Reports shown on the import history page
const RECENT_REPORTS: i64 = 20;
const NOT_FOUND: &str = "Relatório não encontrado";
const NO_IMPORTS: &str = "Nenhuma importação encontrada.";

pub(crate) async fn list(
    ctx: &HandlerContext,
    request: Request<EmptyPayload>,
) -> Reply<Vec<ImportReportView>> {
    let user_id = authenticate(&request, &ctx.jwt_secret)?;

    let reports = ctx
        .store
        .list_import_reports(user_id, RECENT_REPORTS)
        .await
        .map_err(|e| internal_error(request.id, "list import reports", e))?;

    Ok(SuccessResponse::new(
        request.id,
        reports.into_iter().map(ImportReportView::from).collect(),
    ))
}

pub(crate) async fn get(ctx: &HandlerContext, request: Request<IdRequest>) -> Reply<ImportReportView> {
    let user_id = authenticate(&request, &ctx.jwt_secret)?;

    match ctx.store.get_import_report(user_id, request.payload.id).await {
        Ok(Some(report)) => Ok(SuccessResponse::new(request.id, ImportReportView::from(report))),
        Ok(None) => Err(ErrorResponse::not_found(request.id, NOT_FOUND)),
        Err(e) => Err(internal_error(request.id, "get import report", e)),
    }
}

pub(crate) async fn latest(
    ctx: &HandlerContext,
    request: Request<EmptyPayload>,
) -> Reply<LatestImportReport> {
    let user_id = authenticate(&request, &ctx.jwt_secret)?;

    let latest = ctx
        .store
        .latest_import_report(user_id)
        .await
        .map_err(|e| internal_error(request.id, "get latest import report", e))?;

    let payload = match latest {
        Some(report) => LatestImportReport {
            import_report_id: Some(report.id),
            notice: None,
        },
        None => LatestImportReport {
            import_report_id: None,
            notice: Some(NO_IMPORTS.to_string()),
        },
    };
    Ok(SuccessResponse::new(request.id, payload))
}

/// Handle painel.import_report.list messages
pub async fn handle_list(client: Client, subscriber: Subscriber, ctx: Arc<HandlerContext>) -> Result<()> {
    serve(client, subscriber, "import_report.list", |request| {
        let ctx = Arc::clone(&ctx);
        async move { list(&ctx, request).await }
    })
    .await
}

/// Handle painel.import_report.get messages
pub async fn handle_get(client: Client, subscriber: Subscriber, ctx: Arc<HandlerContext>) -> Result<()> {
    serve(client, subscriber, "import_report.get", |request| {
        let ctx = Arc::clone(&ctx);
        async move { get(&ctx, request).await }
    })
    .await
}

/// Handle painel.import_report.latest messages
pub async fn handle_latest(client: Client, subscriber: Subscriber, ctx: Arc<HandlerContext>) -> Result<()> {
    serve(client, subscriber, "import_report.latest", |request| {
        let ctx = Arc::clone(&ctx);
        async move { latest(&ctx, request).await }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::handlers::testing::{context, error_of, request};
    use crate::types::ImportStatus;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_latest_without_imports_has_notice() {
        let t = context();
        let reply = latest(&t.ctx, request(Uuid::new_v4(), EmptyPayload {}))
            .await
            .unwrap();
        let json = serde_json::to_value(&reply.payload).unwrap();
        assert!(json["import_report_id"].is_null());
        assert_eq!(json["notice"], "Nenhuma importação encontrada.");
    }

    #[tokio::test]
    async fn test_latest_and_get_after_completed_import() {
        let t = context();
        let owner = Uuid::new_v4();
        let report = t.store.create_import_report(owner, Some("a.csv"), 3).await.unwrap();
        t.ctx
            .imports
            .process_import(report.id, "nome,cpf\nAna,39053344705\n")
            .await
            .unwrap();

        let reply = latest(&t.ctx, request(owner, EmptyPayload {})).await.unwrap();
        assert_eq!(reply.payload.import_report_id, Some(report.id));
        assert!(reply.payload.notice.is_none());

        let view = get(&t.ctx, request(owner, IdRequest { id: report.id }))
            .await
            .unwrap()
            .payload;
        assert_eq!(view.report.status, ImportStatus::Completed);
        assert_eq!(view.report.total_lines, 1);
        assert_eq!(view.error_rate, 100.0);
        assert_eq!(view.errors_list.len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_report_is_not_found() {
        let t = context();
        let report = t.store.create_import_report(Uuid::new_v4(), None, 0).await.unwrap();

        let error = error_of(get(&t.ctx, request(Uuid::new_v4(), IdRequest { id: report.id })).await);
        assert_eq!(error.error.status, 404);
        assert_eq!(error.error.message, "Relatório não encontrado");
    }

    #[tokio::test]
    async fn test_list_caps_at_twenty_newest_first() {
        let t = context();
        let owner = Uuid::new_v4();
        for _ in 0..22 {
            t.store.create_import_report(owner, None, 1).await.unwrap();
        }
        let newest = t.store.create_import_report(owner, Some("last.csv"), 1).await.unwrap();

        let reports = list(&t.ctx, request(owner, EmptyPayload {})).await.unwrap().payload;
        assert_eq!(reports.len(), 20);
        assert_eq!(reports[0].report.id, newest.id);
    }
}
