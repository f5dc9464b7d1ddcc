use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Extension, Form, Router};
use axum_extra::extract::cookie::{Key, PrivateCookieJar};
use bcrypt::hash;
use eyre::Result;
use log::{debug, error, info};

use crate::client::ImageClient;
use crate::config::{Config, UserStoreConfig};
use crate::domain::auth::{LoginRequest, SignupRequest};
use crate::domain::flash::Flash;
use crate::domain::image::{GenerationOutcome, PromptRequest};
use crate::error::Error;
use crate::extensions::{
    csrf_token, end_session, push_flash, start_session, take_flash, verify_csrf,
    AuthenticatedUser, LOGIN_PATH,
};
use crate::rate_limit::RateLimiter;
use crate::repository::sessions::SessionRepository;
use crate::repository::sqlite::SqliteUserStore;
use crate::repository::users::{MemoryUserStore, UserStore};
use crate::routes::Api;
use crate::service::auth::AuthService;
use crate::service::images::ImageService;

mod client;
mod config;
mod domain;
mod error;
mod extensions;
mod pages;
mod rate_limit;
mod repository;
mod routes;
mod service;
#[cfg(test)]
mod tests;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    // setup log
    env_logger::init();
    info!("server starts with logging");

    let config = Config::load()?;

    // repositories
    let user_store: Arc<dyn UserStore> = match &config.user_store {
        UserStoreConfig::Sqlite { database_url } => {
            Arc::new(SqliteUserStore::connect(database_url).await?)
        }
        UserStoreConfig::Memory { admin_password } => Arc::new(MemoryUserStore::with_admin(
            hash(admin_password, config.bcrypt_cost)?,
        )),
    };
    let image_client = Arc::new(ImageClient::new(
        config.api_url.clone(),
        config.api_key.clone(),
        config.model.clone(),
    ));

    let session_repository = SessionRepository::new(config.session_ttl);

    // API
    let api = Api {
        auth_service: AuthService::new(
            user_store.clone(),
            session_repository.clone(),
            config.bcrypt_cost,
        )?,
        image_service: ImageService {
            image_client,
            user_store,
        },
    };
    let limiter = RateLimiter::new(config.rate_limit_per_hour, config.rate_limit_per_day)?;
    spawn_housekeeping(limiter.clone(), session_repository);

    let router = router(api, config.cookie_key(), limiter);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("listening on {}", config.bind_addr);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Periodically forgets expired sessions and idle rate-limit clients.
fn spawn_housekeeping(limiter: RateLimiter, sessions: SessionRepository) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        loop {
            interval.tick().await;
            limiter.retain_recent();
            let evicted = sessions.evict_expired();
            debug!(
                "Housekeeping: evicted {} sessions, {} live, {} rate-limited clients tracked",
                evicted,
                sessions.count(),
                limiter.tracked_clients()
            );
        }
    });
}

fn router(api: Api, key: Key, limiter: RateLimiter) -> Router {
    Router::new()
        .route("/", get(index).post(generate))
        .route("/image", get(get_image))
        .route("/login", get(login_page).post(login))
        .route("/register", get(register_page).post(register))
        .route("/logout", get(logout))
        .route("/test", get(test_endpoint))
        .layer(middleware::from_fn_with_state(limiter, rate_limit::limit))
        .layer(Extension(api))
        .with_state(key)
}

async fn index(
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    jar: PrivateCookieJar,
) -> impl IntoResponse {
    let (jar, flash) = take_flash(jar);
    (
        jar,
        pages::index(&user.username, user.has_image(), flash.as_ref()),
    )
}

async fn generate(
    Extension(api): Extension<Api>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    jar: PrivateCookieJar,
    Form(request): Form<PromptRequest>,
) -> Response {
    let (jar, pending) = take_flash(jar);
    let (has_image, flash) = match api.generate_image(user.id, request).await {
        Ok(GenerationOutcome::Generated(_)) => (true, None),
        Ok(GenerationOutcome::Rejected(status)) => (
            user.has_image(),
            Some(Flash::danger(format!(
                "Image generation failed (status {status})"
            ))),
        ),
        Err(e) => match report_into_flash(e) {
            Ok(flash) => (user.has_image(), Some(flash)),
            Err(response) => return response,
        },
    };
    let flash = flash.or(pending);
    (
        jar,
        pages::index(&user.username, has_image, flash.as_ref()),
    )
        .into_response()
}

async fn get_image(
    Extension(api): Extension<Api>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
) -> Response {
    match api.latest_image(user.id).await {
        Ok(Some(bytes)) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "No image generated yet.").into_response(),
        Err(e) => report_into_response(e).into_response(),
    }
}

async fn login_page(jar: PrivateCookieJar) -> impl IntoResponse {
    let (jar, flash) = take_flash(jar);
    let (jar, csrf) = csrf_token(jar);
    (jar, pages::login(flash.as_ref(), &csrf))
}

async fn login(
    Extension(api): Extension<Api>,
    jar: PrivateCookieJar,
    Form(request): Form<LoginRequest>,
) -> Response {
    let result = match verify_csrf(&jar, &request.csrf_token) {
        Ok(()) => api.login(request).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(token) => {
            let jar = start_session(jar, token, api.session_ttl());
            let jar = push_flash(jar, Flash::success("Login successful!"));
            (jar, Redirect::to("/")).into_response()
        }
        Err(e) => match report_into_flash(e) {
            Ok(flash) => {
                let (jar, csrf) = csrf_token(jar);
                (jar, pages::login(Some(&flash), &csrf)).into_response()
            }
            Err(response) => response,
        },
    }
}

async fn register_page(jar: PrivateCookieJar) -> impl IntoResponse {
    let (jar, flash) = take_flash(jar);
    let (jar, csrf) = csrf_token(jar);
    (jar, pages::register(flash.as_ref(), &csrf))
}

async fn register(
    Extension(api): Extension<Api>,
    jar: PrivateCookieJar,
    Form(request): Form<SignupRequest>,
) -> Response {
    let result = match verify_csrf(&jar, &request.csrf_token) {
        Ok(()) => api.signup(request).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(token) => {
            let jar = start_session(jar, token, api.session_ttl());
            let jar = push_flash(jar, Flash::success("Registration successful!"));
            (jar, Redirect::to("/")).into_response()
        }
        Err(e) => match report_into_flash(e) {
            Ok(flash) => {
                let (jar, csrf) = csrf_token(jar);
                (jar, pages::register(Some(&flash), &csrf)).into_response()
            }
            Err(response) => response,
        },
    }
}

async fn logout(
    Extension(api): Extension<Api>,
    AuthenticatedUser { user, token }: AuthenticatedUser,
    jar: PrivateCookieJar,
) -> impl IntoResponse {
    api.logout(token);
    info!("User {} logged out", user.username);
    let jar = push_flash(end_session(jar), Flash::info("You have been logged out."));
    (jar, Redirect::to(LOGIN_PATH))
}

async fn test_endpoint() -> &'static str {
    "This is a test endpoint."
}

fn report_into_response(e: eyre::Report) -> (StatusCode, String) {
    error!("Error occurred: {:?}", e);
    match e.downcast::<Error>() {
        Ok(error) => error.into_response_tuple(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "".to_string()),
    }
}

/// Errors the user can fix become a flash message for the re-rendered page;
/// anything else is turned into an error response.
fn report_into_flash(e: eyre::Report) -> Result<Flash, Response> {
    match e.downcast::<Error>() {
        Ok(error) => match error.flash_category() {
            Some(category) => {
                debug!("Request failed: {}", error);
                Ok(Flash::new(category, error.to_string()))
            }
            None => {
                error!("Error occurred: {:?}", error);
                Err(error.into_response_tuple().into_response())
            }
        },
        Err(e) => Err(report_into_response(e).into_response()),
    }
}
