//! Integration test helpers
//!
//! An in-process fake of the SISREC REST backend, bound to a random local
//! port, plus token minting with a throwaway signing key.

#![allow(dead_code)]

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use sisrec_auth::client::HttpAuthBackend;
use sisrec_auth::session::{DurableStorage, SessionStore};
use sisrec_core::SisrecConfig;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, Mutex};
use tokio::net::TcpListener;

// Tracing is initialized once per test binary
static TRACING: LazyLock<()> = LazyLock::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(std::io::sink)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
});

pub const SIGNING_KEY: &[u8] = b"sisrec-test-signing-key";

/// Seconds since epoch, offset by `delta`
pub fn epoch_plus(delta: i64) -> i64 {
    chrono::Utc::now().timestamp() + delta
}

/// Sign a token over the given claims the way the backend would
pub fn mint_token(claims: &Value) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(SIGNING_KEY),
    )
    .expect("Failed to sign test token")
}

/// Account known to the fake backend
#[derive(Clone)]
pub struct FakeAccount {
    pub password: String,
    pub claims: Value,
    /// Explicit identity payload; `None` makes the backend answer with a bare token
    pub user: Option<Value>,
}

#[derive(Clone, Default)]
struct BackendState {
    accounts: Arc<HashMap<String, FakeAccount>>,
    /// Tokens the backend still honors
    issued: Arc<Mutex<HashSet<String>>>,
    logouts: Arc<Mutex<Vec<String>>>,
}

/// Running fake backend
pub struct TestBackend {
    pub address: String,
    state: BackendState,
}

impl TestBackend {
    pub async fn spawn(accounts: HashMap<String, FakeAccount>) -> Self {
        LazyLock::force(&TRACING);

        let state = BackendState {
            accounts: Arc::new(accounts),
            ..Default::default()
        };

        let app = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/logout", post(logout))
            .route("/api/visitas", get(list_visits))
            .route("/api/relatorios", get(broken_report))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            address: format!("http://127.0.0.1:{}", port),
            state,
        }
    }

    pub fn config(&self) -> SisrecConfig {
        let mut config = SisrecConfig::default();
        config.backend.base_url = format!("{}/api", self.address);
        config.backend.timeout_seconds = 5;
        config.backend.logout_timeout_ms = 1000;
        config
    }

    pub fn store(&self, storage: Arc<dyn DurableStorage>) -> Arc<SessionStore> {
        let config = self.config();
        let backend = Arc::new(HttpAuthBackend::new(&config.backend).unwrap());
        Arc::new(SessionStore::new(storage, backend, &config))
    }

    /// Stop honoring every token issued so far
    pub fn revoke_all(&self) {
        self.state.issued.lock().unwrap().clear();
    }

    pub fn logouts(&self) -> Vec<String> {
        self.state.logouts.lock().unwrap().clone()
    }
}

/// Config pointing at a port nothing listens on
pub async fn unreachable_config() -> SisrecConfig {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut config = SisrecConfig::default();
    config.backend.base_url = format!("http://127.0.0.1:{}/api", port);
    config.backend.timeout_seconds = 2;
    config
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn login(State(state): State<BackendState>, Json(body): Json<Value>) -> impl IntoResponse {
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();

    let Some(account) = state.accounts.get(email).filter(|a| a.password == password) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Credenciais inválidas" })),
        );
    };

    let token = mint_token(&account.claims);
    state.issued.lock().unwrap().insert(token.clone());

    let body = match &account.user {
        Some(user) => json!({ "token": token, "user": user }),
        None => json!({ "token": token }),
    };
    (StatusCode::OK, Json(body))
}

async fn logout(State(state): State<BackendState>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = bearer(&headers) {
        state.issued.lock().unwrap().remove(&token);
        state.logouts.lock().unwrap().push(token);
    }
    StatusCode::NO_CONTENT
}

async fn list_visits(State(state): State<BackendState>, headers: HeaderMap) -> impl IntoResponse {
    let honored = bearer(&headers)
        .map(|token| state.issued.lock().unwrap().contains(&token))
        .unwrap_or(false);

    if !honored {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Token inválido" })),
        );
    }

    (
        StatusCode::OK,
        Json(json!([
            { "id": 1, "visitante": "Vera", "status": "AGENDADA" },
            { "id": 2, "visitante": "Caio", "status": "REALIZADA" }
        ])),
    )
}

async fn broken_report() -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "Falha ao gerar relatório" })),
    )
}
