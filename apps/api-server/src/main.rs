//! api-server — HTTP front end for the member registry workspace.
//!
//! Serves the greeting pages and a small JSON API over `MemberService`:
//! - Greetings: `/hello`, `/hello-mvc`, `/hello-string`, `/hello-api` (stateless).
//! - Members: `GET /members`, `POST /members`, `GET /members/:id`.
//! - Storage: in-memory, or SQLite (direct or template repository) when the
//!   `sqlite` feature is enabled; chosen once at startup.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # in-memory storage, JSON logs
//! STORAGE_PROVIDER=memory LOG_FORMAT=json cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.
//!

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use domain::adapters::memory_repo::MemoryMemberRepository;
use domain::service::MemberService;
use domain::{CoreError, Member, MemberId, MemberRepository};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Storage chosen at startup; the SQL variants are feature-gated.
enum RepoKind {
    Memory(MemoryMemberRepository),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite_adapter::SqliteMemberRepository),
    #[cfg(feature = "sqlite")]
    SqliteTemplate(sqlite_adapter::TemplateMemberRepository),
}

struct AnyRepo {
    kind: RepoKind,
}

impl AnyRepo {
    fn memory() -> Self {
        Self {
            kind: RepoKind::Memory(MemoryMemberRepository::new()),
        }
    }

    #[cfg(feature = "sqlite")]
    fn sqlite(path: &std::path::Path, use_template: bool) -> Result<Self, CoreError> {
        let data_source = Arc::new(sqlite_adapter::DataSource::open(path)?);
        let kind = if use_template {
            RepoKind::SqliteTemplate(sqlite_adapter::TemplateMemberRepository::new(data_source))
        } else {
            RepoKind::Sqlite(sqlite_adapter::SqliteMemberRepository::new(data_source))
        };
        Ok(Self { kind })
    }
}

impl MemberRepository for AnyRepo {
    fn save(&self, member: Member) -> Result<Member, CoreError> {
        match &self.kind {
            RepoKind::Memory(r) => r.save(member),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.save(member),
            #[cfg(feature = "sqlite")]
            RepoKind::SqliteTemplate(r) => r.save(member),
        }
    }

    fn find_by_id(&self, id: MemberId) -> Result<Option<Member>, CoreError> {
        match &self.kind {
            RepoKind::Memory(r) => r.find_by_id(id),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.find_by_id(id),
            #[cfg(feature = "sqlite")]
            RepoKind::SqliteTemplate(r) => r.find_by_id(id),
        }
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Member>, CoreError> {
        match &self.kind {
            RepoKind::Memory(r) => r.find_by_name(name),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.find_by_name(name),
            #[cfg(feature = "sqlite")]
            RepoKind::SqliteTemplate(r) => r.find_by_name(name),
        }
    }

    fn find_all(&self) -> Result<Vec<Member>, CoreError> {
        match &self.kind {
            RepoKind::Memory(r) => r.find_all(),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.find_all(),
            #[cfg(feature = "sqlite")]
            RepoKind::SqliteTemplate(r) => r.find_all(),
        }
    }
}

#[derive(Clone)]
struct AppState {
    members: Arc<MemberService<AnyRepo>>,
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.log_summary();

    let repo = match build_repo(&cfg) {
        Ok(r) => r,
        Err(e) => {
            error!(err = %e, storage = cfg.storage_provider.as_str(), "failed to init storage");
            std::process::exit(1);
        }
    };
    let state = AppState {
        members: Arc::new(MemberService::new(repo)),
    };

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let mut app = router(state)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid));

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin.clone()]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, err = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(%addr, "api-server listening");
    if let Err(e) = axum::serve(listener, app).await {
        error!(err = %e, "server error");
        std::process::exit(1);
    }
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Construct the repository named by config; storage failures abort startup.
fn build_repo(cfg: &config::Config) -> Result<AnyRepo, CoreError> {
    match cfg.storage_provider {
        config::StorageProvider::Memory => Ok(AnyRepo::memory()),
        #[cfg(feature = "sqlite")]
        config::StorageProvider::Sqlite => AnyRepo::sqlite(&cfg.db_path, false),
        #[cfg(feature = "sqlite")]
        config::StorageProvider::SqliteTemplate => AnyRepo::sqlite(&cfg.db_path, true),
        #[cfg(not(feature = "sqlite"))]
        other => Err(CoreError::Repository(format!(
            "storage provider {} needs the sqlite feature",
            other.as_str()
        ))),
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/hello", get(hello))
        .route("/hello-mvc", get(hello_mvc))
        .route("/hello-string", get(hello_string))
        .route("/hello-api", get(hello_api))
        .route("/members", get(list_members).post(join_member))
        .route("/members/:id", get(get_member))
        .with_state(state)
}

// ============ Greeting controller ============

#[derive(Deserialize)]
struct NameParam {
    name: String,
}

#[derive(Serialize)]
struct HelloOut {
    name: String,
}

async fn hello() -> Html<String> {
    Html(render_hello("hello!!"))
}

async fn hello_mvc(Query(p): Query<NameParam>) -> Html<String> {
    Html(render_hello_template(&p.name))
}

async fn hello_string(Query(p): Query<NameParam>) -> String {
    format!("hello {}", p.name)
}

async fn hello_api(Query(p): Query<NameParam>) -> Json<HelloOut> {
    Json(HelloOut { name: p.name })
}

fn render_hello(data: &str) -> String {
    http_common::html_page(
        "Hello",
        &format!("<p>Hello. {}</p>", http_common::html_escape(data)),
    )
}

fn render_hello_template(name: &str) -> String {
    http_common::html_page(
        "Hello",
        &format!("<p>hello {}</p>", http_common::html_escape(name)),
    )
}

// ============ Members ============

#[derive(Deserialize)]
struct JoinReq {
    name: String,
}

#[derive(Serialize)]
struct JoinOut {
    id: u64,
}

#[derive(Serialize)]
struct MemberOut {
    id: Option<u64>,
    name: String,
}

#[derive(Serialize)]
struct MembersOut {
    members: Vec<MemberOut>,
}

fn member_to_out(m: Member) -> MemberOut {
    MemberOut {
        id: m.id.map(|id| id.get()),
        name: m.name,
    }
}

fn error_response(e: &CoreError) -> Response {
    match e {
        CoreError::DuplicateMember => (
            StatusCode::CONFLICT,
            Json(http_common::json_error_with_message(
                "conflict",
                &e.to_string(),
            )),
        )
            .into_response(),
        CoreError::Repository(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(http_common::json_err("internal")),
        )
            .into_response(),
    }
}

async fn join_member(State(state): State<AppState>, Json(req): Json<JoinReq>) -> Response {
    match state.members.join(Member::new(req.name.clone())) {
        Ok(id) => {
            info!(member_id = %id, name = %req.name, "member joined");
            (StatusCode::CREATED, Json(JoinOut { id: id.get() })).into_response()
        }
        Err(e @ CoreError::DuplicateMember) => {
            warn!(name = %req.name, "join rejected: duplicate name");
            error_response(&e)
        }
        Err(e) => {
            error!(name = %req.name, err = %e, "join failed");
            error_response(&e)
        }
    }
}

async fn list_members(State(state): State<AppState>) -> Response {
    match state.members.find_members() {
        Ok(members) => {
            let members: Vec<MemberOut> = members.into_iter().map(member_to_out).collect();
            Json(MembersOut { members }).into_response()
        }
        Err(e) => {
            error!(err = %e, "list members failed");
            error_response(&e)
        }
    }
}

async fn get_member(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let id = MemberId::new(id);
    match state.members.find_one(id) {
        Ok(Some(member)) => Json(member_to_out(member)).into_response(),
        Ok(None) => {
            warn!(member_id = %id, "member not found");
            (
                StatusCode::NOT_FOUND,
                Json(http_common::json_err("not_found")),
            )
                .into_response()
        }
        Err(e) => {
            error!(member_id = %id, err = %e, "member lookup failed");
            error_response(&e)
        }
    }
}
