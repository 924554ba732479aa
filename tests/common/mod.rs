use std::sync::Arc;

use anyhow::{anyhow, ensure, Result};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{NaiveDate, NaiveDateTime};
use equiptrack::auth::jwt::JwtService;
use equiptrack::auth::password::hash_password;
use equiptrack::clock::ManualClock;
use equiptrack::config::AppConfig;
use equiptrack::db;
use equiptrack::domain::Role;
use equiptrack::lifecycle::LifecycleEngine;
use equiptrack::reminders::ReminderPolicy;
use equiptrack::routes;
use equiptrack::state::AppState;
use equiptrack::store::MemoryStore;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub fn start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 10)
        .and_then(|day| day.and_hms_opt(9, 0, 0))
        .expect("valid start time")
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/equiptrack_test".to_string(),
        database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        jwt_secret: "test-secret".to_string(),
        jwt_issuer: "test-issuer".to_string(),
        jwt_audience: "test-audience".to_string(),
        jwt_expiry_minutes: 60,
        cors_allowed_origin: None,
        calibration_reminder_days: 30,
        rental_reminder_days: 7,
        notification_webhook_url: None,
        reminder_worker_interval_secs: 60,
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let config = test_config();
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let engine = Arc::new(LifecycleEngine::new(
            store.clone(),
            clock.clone(),
            ReminderPolicy::default(),
        ));
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(engine, config, jwt);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            store,
            clock,
            router,
        })
    }

    pub async fn insert_user(&self, username: &str, password: &str, role: Role) -> Result<Uuid> {
        let password_hash = hash_password(password)?;
        let username = username.to_string();
        let user = self
            .state
            .run(move |engine| engine.create_user(&username, &password_hash, role))
            .await
            .map_err(|err| anyhow!("failed to insert user: {}", err.status()))?;
        Ok(user.id)
    }

    /// Creates a user and returns a bearer token for it.
    #[allow(dead_code)]
    pub async fn user_with_token(&self, username: &str, role: Role) -> Result<(Uuid, String)> {
        let password = format!("{username}-password");
        let id = self.insert_user(username, &password, role).await?;
        let token = self.login_token(username, &password).await?;
        Ok((id, token))
    }

    pub async fn login_token(&self, username: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            username: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json(
                "/api/auth/login",
                &LoginPayload { username, password },
                None,
            )
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = read_json(response).await?;
        Ok(parsed.access_token)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PATCH, path, payload, token).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let builder = Request::builder().method(Method::DELETE).uri(path);
        let builder = if let Some(token) = token {
            builder.header("authorization", format!("Bearer {token}"))
        } else {
            builder
        };
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

#[allow(dead_code)]
pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn read_json<T: DeserializeOwned>(response: hyper::Response<Body>) -> Result<T> {
    let body = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&body)?)
}
