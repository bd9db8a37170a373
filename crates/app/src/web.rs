use crate::render::{self, PageView};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use pdf_chat_core::{
    ConversationalResponder, IngestError, IngestionPipeline, PdfDocument, Session, SessionError,
    SessionRegistry,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

pub const UPLOAD_FIELD: &str = "pdfs";

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    pub pipeline: Arc<IngestionPipeline>,
    pub responder: Arc<ConversationalResponder>,
    pub title: Arc<str>,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/", get(new_session))
        .route("/sessions/:id", get(show_session))
        .route("/sessions/:id/process", post(process_documents))
        .route("/sessions/:id/ask", post(ask_question))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn new_session(State(state): State<AppState>) -> Redirect {
    let id = state.sessions.create().await;
    Redirect::to(&format!("/sessions/{id}"))
}

fn render_session(state: &AppState, session: &Session, error: Option<&str>) -> Html<String> {
    Html(render::page(&PageView {
        title: &state.title,
        session_id: session.id(),
        turns: session.history().turns(),
        last_ingestion: session.last_ingestion(),
        error,
    }))
}

fn session_not_found(id: Uuid) -> Response {
    (
        StatusCode::NOT_FOUND,
        Html(format!("<p>Unknown session {id}. <a href=\"/\">Start a new one</a>.</p>")),
    )
        .into_response()
}

/// User-facing status for a failed action. Prior session state is untouched
/// in every case.
fn error_status(error: &SessionError) -> StatusCode {
    match error {
        SessionError::Ingest(IngestError::PdfParse { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::Ingest(_) | SessionError::EmptyQuestion => StatusCode::BAD_REQUEST,
        SessionError::NotReady => StatusCode::CONFLICT,
        SessionError::Index(_) | SessionError::Provider(_) => StatusCode::BAD_GATEWAY,
    }
}

fn error_message(error: &SessionError) -> String {
    if error.is_retryable() {
        format!("{error}. This looks temporary; please try again.")
    } else {
        error.to_string()
    }
}

async fn show_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let Some(session) = state.sessions.get(&id).await else {
        return session_not_found(id);
    };
    let session = session.lock().await;
    render_session(&state, &session, None).into_response()
}

async fn read_uploads(multipart: &mut Multipart) -> Result<Vec<PdfDocument>, String> {
    let mut documents = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| format!("upload failed: {error}"))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|error| format!("upload of '{file_name}' failed: {error}"))?;

        // Browsers send one empty part when no file was picked.
        if file_name.is_empty() && bytes.is_empty() {
            continue;
        }
        let file_name = if file_name.is_empty() {
            format!("upload-{}.pdf", documents.len() + 1)
        } else {
            file_name
        };
        documents.push(PdfDocument::new(file_name, bytes.to_vec()));
    }
    Ok(documents)
}

async fn process_documents(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Response {
    let Some(session) = state.sessions.get(&id).await else {
        return session_not_found(id);
    };
    let mut session = session.lock().await;

    let documents = match read_uploads(&mut multipart).await {
        Ok(documents) => documents,
        Err(message) => {
            warn!(session = %id, reason = %message, "upload rejected");
            return (
                StatusCode::BAD_REQUEST,
                render_session(&state, &session, Some(&message)),
            )
                .into_response();
        }
    };

    info!(session = %id, files = documents.len(), "processing upload");
    let outcome = session.process(&state.pipeline, &documents).await.map(|_| ());
    match outcome {
        Ok(()) => Redirect::to(&format!("/sessions/{id}")).into_response(),
        Err(error) => {
            warn!(session = %id, %error, "processing failed");
            let message = error_message(&error);
            (
                error_status(&error),
                render_session(&state, &session, Some(&message)),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AskForm {
    pub question: String,
}

async fn ask_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(form): Form<AskForm>,
) -> Response {
    let Some(session) = state.sessions.get(&id).await else {
        return session_not_found(id);
    };
    let mut session = session.lock().await;

    let outcome = session.ask(&state.responder, &form.question).await.map(|_| ());
    match outcome {
        Ok(()) => render_session(&state, &session, None).into_response(),
        Err(error) => {
            warn!(session = %id, %error, "question failed");
            let message = error_message(&error);
            (
                error_status(&error),
                render_session(&state, &session, Some(&message)),
            )
                .into_response()
        }
    }
}
