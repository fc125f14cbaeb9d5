use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tokio::task::JoinError;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::display::png_data_uri;
use crate::error::PipelineError;
use crate::face_mesh::DetectorProvider;
use crate::loader::{check_content_type, check_upload_name, ACCEPTED_EXTENSIONS};
use crate::pipeline::{process_upload, PipelineOptions, PipelineReport};

pub const UPLOAD_FIELD: &str = "file";

pub struct AppState<P> {
    pub config: AppConfig,
    pub provider: P,
    pub options: PipelineOptions,
}

impl<P> AppState<P> {
    pub fn new(config: AppConfig, provider: P, options: PipelineOptions) -> Self {
        Self { config, provider, options }
    }
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Upload error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("Worker failed: {0}")]
    Join(#[from] JoinError),
}

impl WebError {
    fn status(&self) -> StatusCode {
        match self {
            WebError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebError::Multipart(err) => err.status(),
            WebError::Pipeline(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            WebError::Pipeline(_) | WebError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {}", self);
        } else {
            warn!("rejected upload: {}", self);
        }
        let body = page(
            "Upload failed",
            &format!("{}<p class=\"error\">{}</p>", upload_form(), escape_html(&self.to_string())),
        );
        (status, Html(body)).into_response()
    }
}

pub fn router<P>(state: Arc<AppState<P>>) -> Router
where
    P: DetectorProvider + Send + Sync + 'static,
{
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(index::<P>).post(upload::<P>))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index<P>(State(state): State<Arc<AppState<P>>>) -> Html<String>
where
    P: DetectorProvider + Send + Sync + 'static,
{
    Html(page(&state.config.page_title, &upload_form()))
}

async fn upload<P>(State(state): State<Arc<AppState<P>>>, mut multipart: Multipart) -> Result<Html<String>, WebError>
where
    P: DetectorProvider + Send + Sync + 'static,
{
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        upload = Some((file_name, content_type, bytes));
        break;
    }
    let (file_name, content_type, bytes) =
        upload.ok_or_else(|| WebError::BadRequest(format!("Missing \"{UPLOAD_FIELD}\" field")))?;
    let file_name = file_name.unwrap_or_else(|| "upload".to_string());
    info!("received {} ({} bytes)", file_name, bytes.len());

    check_upload_name(&file_name)?;
    if let Some(content_type) = content_type.as_deref() {
        check_content_type(content_type)?;
    }

    let worker = state.clone();
    let report = tokio::task::spawn_blocking(move || process_upload(&bytes, &worker.provider, &worker.options)).await??;
    Ok(Html(render_report(&state.config.page_title, &file_name, &report)?))
}

fn render_report(title: &str, file_name: &str, report: &PipelineReport) -> Result<String, PipelineError> {
    let original = png_data_uri(&report.original)?;
    let rendered = png_data_uri(&report.rendered)?;
    let notice = if report.status.face_found() {
        String::new()
    } else {
        format!("<p class=\"notice\">{}. Showing the original image.</p>", report.status)
    };
    let messages = report
        .messages
        .iter()
        .map(|message| format!("<li>{}</li>", escape_html(message)))
        .collect::<String>();
    let body = format!(
        "{form}\
         <h2>{file_name}</h2>\
         <figure><img src=\"{original}\" alt=\"original\"><figcaption>Original Image</figcaption></figure>\
         {notice}\
         <figure><img src=\"{rendered}\" alt=\"landmarks\"><figcaption>Facial Landmarks</figcaption></figure>\
         <ul class=\"diagnostics\">{messages}</ul>",
        form = upload_form(),
        file_name = escape_html(file_name),
    );
    Ok(page(title, &body))
}

fn upload_form() -> String {
    let accept = ACCEPTED_EXTENSIONS.map(|ext| format!(".{ext}")).join(",");
    format!(
        "<form method=\"post\" enctype=\"multipart/form-data\">\
         <input type=\"file\" name=\"{UPLOAD_FIELD}\" accept=\"{accept}\" required>\
         <button type=\"submit\">Upload an image</button></form>"
    )
}

fn page(title: &str, body: &str) -> String {
    let title = escape_html(title);
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title>\
         <style>body{{font-family:sans-serif;margin:0;display:flex}}\
         aside{{width:16rem;padding:1rem;background:#f0f2f6}}main{{padding:1rem;flex:1}}\
         img{{max-width:100%}}.error{{color:#b00020}}.notice{{color:#8a6d00}}</style></head>\
         <body><aside><h3>About</h3><p>Upload a portrait (JPEG or PNG). \
         The face mesh is drawn over the detected face.</p></aside>\
         <main><h1>{title}</h1>{body}</main></body></html>"
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
