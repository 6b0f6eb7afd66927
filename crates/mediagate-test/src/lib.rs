//! Helpers for testing the gateway and its services.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all
//!    console output is captured by the test runner.
//!
//!  - When using [`tempdir`], make sure that the handle to the temp directory
//!    is held for the entire lifetime of the test. When dropped too early,
//!    the directory is silently deleted under the code being tested. To
//!    avoid this, assign it to a variable in the test function
//!    (e.g. `let _cache_dir = mediagate_test::tempdir()`).
//!
//!  - When using [`FakeDrive`], make sure that the server is held until all
//!    requests to it have been made, e.g. `let drive = FakeDrive::spawn(..)`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;
use url::Url;

use mediagate_sources::{CloudDriveSourceConfig, SourceConfig, SourceId};

pub use tempfile::TempDir;

/// Username the fake drive accepts.
pub const DRIVE_USERNAME: &str = "gatekeeper";
/// Password the fake drive accepts.
pub const DRIVE_PASSWORD: &str = "hunter2";
/// The folder the fake drive serves files from.
pub const DRIVE_FOLDER: &str = "media";

const DRIVE_TOKEN: &str = "test-session-token";
const DRIVE_FOLDER_ID: u64 = 7;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from mediagate crates
///    and mutes all other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("mediagate_service=trace,mediagate=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped. Use it
/// as a guard to automatically clean up after tests.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

/// Counters describing the fake drive's observed traffic.
#[derive(Debug, Default, Clone, Copy)]
pub struct DriveStats {
    /// Successful login handshakes.
    pub logins: usize,
    /// Logout calls, successful or not.
    pub logouts: usize,
    /// File content downloads served.
    pub fetches: usize,
}

#[derive(Clone)]
struct DriveState {
    files: Arc<HashMap<String, Vec<u8>>>,
    stats: Arc<Mutex<DriveStats>>,
}

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct FolderQuery {
    name: String,
}

async fn login(State(state): State<DriveState>, Json(body): Json<LoginBody>) -> impl IntoResponse {
    if body.username == DRIVE_USERNAME && body.password == DRIVE_PASSWORD {
        state.stats.lock().unwrap().logins += 1;
        Json(json!({ "auth": DRIVE_TOKEN })).into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

async fn logout(State(state): State<DriveState>) -> impl IntoResponse {
    state.stats.lock().unwrap().logouts += 1;
    Json(json!({ "ok": true }))
}

async fn lookup_folder(
    State(_state): State<DriveState>,
    Query(query): Query<FolderQuery>,
) -> impl IntoResponse {
    if query.name == DRIVE_FOLDER {
        Json(json!({ "folderid": DRIVE_FOLDER_ID })).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn fetch_file(
    State(state): State<DriveState>,
    Path((folder_id, name)): Path<(u64, String)>,
) -> impl IntoResponse {
    if folder_id != DRIVE_FOLDER_ID {
        return StatusCode::NOT_FOUND.into_response();
    }
    match state.files.get(&name) {
        Some(bytes) => {
            state.stats.lock().unwrap().fetches += 1;
            bytes.clone().into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// An in-process cloud-drive lookalike.
///
/// Speaks the session/folder/file protocol the cloud-drive downloader
/// expects and records traffic counters for assertions.
pub struct FakeDrive {
    addr: SocketAddr,
    stats: Arc<Mutex<DriveStats>>,
}

impl FakeDrive {
    /// Spawns the drive on an ephemeral port, serving the given files.
    pub async fn spawn(files: Vec<(&str, Vec<u8>)>) -> Self {
        let state = DriveState {
            files: Arc::new(
                files
                    .into_iter()
                    .map(|(name, bytes)| (name.to_owned(), bytes))
                    .collect(),
            ),
            stats: Arc::default(),
        };
        let stats = state.stats.clone();

        let app = Router::new()
            .route("/login", post(login))
            .route("/logout", post(logout))
            .route("/folders", get(lookup_folder))
            .route("/folders/:folder_id/files/:name", get(fetch_file))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, stats }
    }

    /// The drive's base URL.
    pub fn url(&self) -> Url {
        format!("http://{}", self.addr).parse().unwrap()
    }

    /// A source config pointing at this drive with valid credentials.
    pub fn source_config(&self, id: &str) -> Arc<CloudDriveSourceConfig> {
        Arc::new(CloudDriveSourceConfig {
            id: SourceId::new(id),
            base_url: self.url(),
            username: DRIVE_USERNAME.to_owned(),
            password: DRIVE_PASSWORD.to_owned(),
            folder: DRIVE_FOLDER.to_owned(),
        })
    }

    /// A [`SourceConfig`] variant for use in a gateway config.
    pub fn source(&self, id: &str) -> SourceConfig {
        SourceConfig::CloudDrive(self.source_config(id))
    }

    /// A snapshot of the traffic counters.
    pub fn stats(&self) -> DriveStats {
        *self.stats.lock().unwrap()
    }
}
