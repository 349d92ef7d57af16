//! Actix Web HTTP server.
//!
//! Exposes OpenAI-compatible endpoints:
//! - `POST /v1/chat/completions`
//! - `GET /v1/models` (also `GET`/`POST /models`)
//! - `GET /health`

use crate::{
    auth,
    config::{CorsConfig, ProxyConfig},
    error::ProxyError,
    models,
    streaming::{self, ChunkEnvelope},
    types::{ChatCompletion, ChatCompletionRequest},
    upstream::UpstreamClient,
};
use actix_cors::Cors;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use capi_protocol::{collect_answer, FrameEncoder, StreamAssembler, StreamState};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub upstream: UpstreamClient,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let upstream = UpstreamClient::new(&config.upstream)?;
        Ok(Self { config, upstream })
    }
}

pub async fn serve(config: ProxyConfig) -> Result<()> {
    let addr = config.bind_addr();
    info!(addr = %addr, upstream = %config.upstream.endpoint(), "capi listening");

    let state = web::Data::new(AppState::new(config)?);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(json_config(state.config.server.max_body_bytes))
            .wrap(cors(&state.config.cors))
            .configure(routes)
    })
    .bind(&addr)
    .with_context(|| format!("failed to bind {}", addr))?
    .run()
    .await
    .context("server error")?;

    Ok(())
}

/// Register every route on an app or test service.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/v1/chat/completions", web::post().to(handle_chat_completions))
        .route("/v1/models", web::get().to(handle_models))
        .route("/models", web::get().to(handle_models))
        .route("/models", web::post().to(handle_models));
}

/// JSON extractor settings: body limit and malformed bodies as 400s.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default().limit(limit).error_handler(|err, _req| {
        warn!(error = %err, "rejected request body");
        ProxyError::InvalidRequest(err.to_string()).into()
    })
}

fn cors(config: &CorsConfig) -> Cors {
    if config.permissive {
        Cors::permissive()
    } else {
        Cors::default()
    }
}

async fn health_check() -> &'static str {
    "OK"
}

async fn handle_models() -> HttpResponse {
    HttpResponse::Ok().json(models::available_models())
}

async fn handle_chat_completions(
    state: web::Data<AppState>,
    req_http: HttpRequest,
    body: web::Json<ChatCompletionRequest>,
) -> Result<HttpResponse, ProxyError> {
    let req = body.into_inner();
    req.validate()?;
    let token = auth::extract_token(req_http.headers())?;

    let transcript = req.transcript();
    info!(
        model = %req.model,
        stream = req.stream,
        messages = req.messages.len(),
        transcript_bytes = transcript.len(),
        "chat completion request"
    );

    let encoder = FrameEncoder::new(state.config.session.identifiers_for_request());
    let frame = encoder.encode(&transcript, &req.model)?;
    let upstream = state.upstream.stream_chat(&token, frame).await?;

    if req.stream {
        let assembler = StreamAssembler::new();
        let envelope = ChunkEnvelope {
            id: assembler.state().response_id().to_string(),
            created: assembler.state().created(),
            model: req.model,
        };
        let events = assembler.into_stream(upstream.bytes_stream());

        return Ok(HttpResponse::Ok()
            .content_type("text/event-stream")
            .insert_header(("cache-control", "no-cache"))
            .streaming(streaming::sse_frames(events, envelope)));
    }

    let stream_state = StreamState::new();
    let answer = collect_answer(upstream.bytes_stream()).await?;
    debug!(
        response_id = %stream_state.response_id(),
        answer_len = answer.len(),
        "answer assembled"
    );

    Ok(HttpResponse::Ok().json(ChatCompletion::new(
        stream_state.response_id().to_string(),
        stream_state.created(),
        req.model,
        answer,
    )))
}
