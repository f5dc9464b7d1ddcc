use std::collections::HashMap;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use axum::http::Request;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lazy_static::lazy_static;
use tower::ServiceExt;

use super::*;
use crate::repository::users::ADMIN_USERNAME;

const TEST_COST: u32 = 4;
const ADMIN_PASSWORD: &str = "hunter2";
const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 13];

lazy_static! {
    static ref ADMIN_HASH: String = hash(ADMIN_PASSWORD, TEST_COST).unwrap();
}

fn test_router(image_client: ImageClient, limiter: RateLimiter) -> Router {
    router_with(
        Arc::new(MemoryUserStore::with_admin(ADMIN_HASH.clone())),
        SessionRepository::default(),
        image_client,
        limiter,
    )
}

fn router_with(
    user_store: Arc<dyn UserStore>,
    sessions: SessionRepository,
    image_client: ImageClient,
    limiter: RateLimiter,
) -> Router {
    let api = Api {
        auth_service: AuthService::new(user_store.clone(), sessions, TEST_COST).unwrap(),
        image_service: ImageService {
            image_client: Arc::new(image_client),
            user_store,
        },
    };
    router(api, Key::from(&[7u8; 64]), limiter)
}

fn unlimited() -> RateLimiter {
    RateLimiter::new(1_000_000, 1_000_000).unwrap()
}

/// Answers every prompt with the prompt itself, base64 encoded.
fn echo_client() -> ImageClient {
    let mut client = ImageClient::faux();
    faux::when!(client.generate)
        .then(|prompt| Ok(GenerationOutcome::Generated(STANDARD.encode(prompt))));
    client
}

/// Minimal cookie-keeping client driving the router in-process.
struct Browser {
    router: Router,
    cookies: HashMap<String, String>,
}

impl Browser {
    fn new(router: Router) -> Self {
        Browser {
            router,
            cookies: HashMap::new(),
        }
    }

    async fn send(&mut self, request: axum::http::request::Builder, body: Body) -> Response {
        let cookie_header = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        let request = if cookie_header.is_empty() {
            request
        } else {
            request.header(COOKIE, cookie_header)
        };
        let response = self
            .router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        for set_cookie in response.headers().get_all(SET_COOKIE) {
            let set_cookie = set_cookie.to_str().unwrap();
            let pair = set_cookie.split(';').next().unwrap();
            let (name, value) = pair.split_once('=').unwrap();
            if value.is_empty() {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_string(), value.to_string());
            }
        }
        response
    }

    async fn get(&mut self, uri: &str) -> Response {
        self.send(Request::get(uri), Body::empty()).await
    }

    async fn post_form(&mut self, uri: &str, form: &str) -> Response {
        let request = Request::post(uri).header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        self.send(request, Body::from(form.to_string())).await
    }

    /// Opens the form page first so the submission carries this client's token.
    async fn submit_credentials(&mut self, uri: &str, form: &str) -> Response {
        let page = body_text(self.get(uri).await).await;
        let token = form_token(&page);
        self.post_form(uri, &format!("{form}&csrf_token={token}")).await
    }

    async fn login_as_admin(&mut self) {
        let response = self
            .submit_credentials("/login", &format!("username=admin&password={ADMIN_PASSWORD}"))
            .await;
        assert_redirect(&response, "/");
        assert!(self.cookies.contains_key("session"));
    }
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

fn form_token(page: &str) -> String {
    let (_, rest) = page
        .split_once(r#"name="csrf_token" value=""#)
        .expect("page has no csrf field");
    rest.split('"').next().unwrap().to_string()
}

fn assert_redirect(response: &Response, location: &str) {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[LOCATION], location);
}

#[tokio::test]
async fn test_protected_routes_redirect_to_login() {
    let mut browser = Browser::new(test_router(ImageClient::faux(), unlimited()));

    for uri in ["/", "/image", "/logout"] {
        let response = browser.get(uri).await;
        assert_redirect(&response, "/login");
    }
    let response = browser.post_form("/", "image=fox").await;
    assert_redirect(&response, "/login");
}

#[tokio::test]
async fn test_forged_session_cookie_is_rejected() {
    let mut browser = Browser::new(test_router(ImageClient::faux(), unlimited()));
    browser
        .cookies
        .insert("session".to_string(), uuid::Uuid::new_v4().to_string());

    let response = browser.get("/").await;
    assert_redirect(&response, "/login");
}

#[tokio::test]
async fn test_login_page_renders() {
    let mut browser = Browser::new(test_router(ImageClient::faux(), unlimited()));
    let response = browser.get("/login").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains(r#"action="/login""#));
    assert!(body.contains(r#"name="password""#));
}

#[tokio::test]
async fn test_failed_login_establishes_no_session() {
    let mut browser = Browser::new(test_router(ImageClient::faux(), unlimited()));

    for form in [
        "username=admin&password=wrong",
        "username=mallory&password=hunter2",
    ] {
        let response = browser.submit_credentials("/login", form).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains(r#"<div class="flash danger">Invalid credentials</div>"#));
        assert!(!browser.cookies.contains_key("session"));
    }

    let response = browser.get("/").await;
    assert_redirect(&response, "/login");
}

#[tokio::test]
async fn test_login_requires_both_fields() {
    let mut browser = Browser::new(test_router(ImageClient::faux(), unlimited()));
    let response = browser.submit_credentials("/login", "username=+++").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response)
        .await
        .contains("Username and password are required"));
    assert!(!browser.cookies.contains_key("session"));
}

#[tokio::test]
async fn test_login_shows_flash_once() {
    let mut browser = Browser::new(test_router(ImageClient::faux(), unlimited()));
    browser.login_as_admin().await;

    let response = browser.get("/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Login successful!"));
    assert!(body.contains(ADMIN_USERNAME));
    assert!(body.contains("No image generated yet."));

    let body = body_text(browser.get("/").await).await;
    assert!(!body.contains("Login successful!"));
}

#[tokio::test]
async fn test_image_not_found_before_generation() {
    let mut browser = Browser::new(test_router(ImageClient::faux(), unlimited()));
    browser.login_as_admin().await;

    let response = browser.get("/image").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "No image generated yet.");
}

#[tokio::test]
async fn test_generated_image_is_served_as_png() {
    let mut client = ImageClient::faux();
    faux::when!(client.generate).then(|prompt| {
        assert_eq!(prompt, "a red fox");
        Ok(GenerationOutcome::Generated(STANDARD.encode(PNG_BYTES)))
    });
    let mut browser = Browser::new(test_router(client, unlimited()));
    browser.login_as_admin().await;

    let response = browser.post_form("/", "image=a+red+fox").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains(r#"<img src="/image""#));

    let response = browser.get("/image").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "image/png");
    assert_eq!(body_bytes(response).await, PNG_BYTES);
}

#[tokio::test]
async fn test_rejected_generation_keeps_previous_image() {
    let mut client = ImageClient::faux();
    let mut calls = 0;
    faux::when!(client.generate).then(move |_| {
        calls += 1;
        if calls == 1 {
            Ok(GenerationOutcome::Generated(STANDARD.encode(PNG_BYTES)))
        } else {
            Ok(GenerationOutcome::Rejected(500))
        }
    });
    let mut browser = Browser::new(test_router(client, unlimited()));
    browser.login_as_admin().await;

    browser.post_form("/", "image=first").await;
    let response = browser.post_form("/", "image=second").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Image generation failed (status 500)"));
    assert!(body.contains(r#"<img src="/image""#));

    let response = browser.get("/image").await;
    assert_eq!(body_bytes(response).await, PNG_BYTES);
}

#[tokio::test]
async fn test_blank_prompt_is_not_sent() {
    // an unstubbed faux method panics if it is ever called
    let mut browser = Browser::new(test_router(ImageClient::faux(), unlimited()));
    browser.login_as_admin().await;

    let response = browser.post_form("/", "image=++").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains(r#"<div class="flash warning">Please describe the image you want</div>"#));
}

#[tokio::test]
async fn test_logout_ends_session() {
    let mut browser = Browser::new(test_router(ImageClient::faux(), unlimited()));
    browser.login_as_admin().await;
    let old_session = browser.cookies["session"].clone();

    let response = browser.get("/logout").await;
    assert_redirect(&response, "/login");
    assert!(!browser.cookies.contains_key("session"));

    let response = browser.get("/").await;
    assert_redirect(&response, "/login");

    let body = body_text(browser.get("/login").await).await;
    assert!(body.contains("You have been logged out."));

    // the old cookie is dead server-side too
    browser.cookies.insert("session".to_string(), old_session);
    let response = browser.get("/").await;
    assert_redirect(&response, "/login");
}

#[tokio::test]
async fn test_register_logs_in() {
    let mut browser = Browser::new(test_router(ImageClient::faux(), unlimited()));
    let response = browser
        .submit_credentials("/register", "username=alice&password=wonderland")
        .await;
    assert_redirect(&response, "/");

    let body = body_text(browser.get("/").await).await;
    assert!(body.contains("Registration successful!"));
    assert!(body.contains("alice"));

    browser.get("/logout").await;
    let response = browser
        .submit_credentials("/login", "username=alice&password=wonderland")
        .await;
    assert_redirect(&response, "/");
}

#[tokio::test]
async fn test_register_duplicate_username() {
    let mut browser = Browser::new(test_router(ImageClient::faux(), unlimited()));
    let response = browser
        .submit_credentials("/register", "username=admin&password=takeover")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains(r#"<div class="flash warning">Username already exists</div>"#));
    assert!(!browser.cookies.contains_key("session"));

    let response = browser
        .submit_credentials("/login", "username=admin&password=takeover")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    browser.login_as_admin().await;
}

#[tokio::test]
async fn test_users_keep_their_own_images() {
    let router = test_router(echo_client(), unlimited());
    let mut admin = Browser::new(router.clone());
    let mut alice = Browser::new(router);
    admin.login_as_admin().await;
    alice
        .submit_credentials("/register", "username=alice&password=wonderland")
        .await;

    let (first, second) = tokio::join!(
        admin.post_form("/", "image=admin+prompt"),
        alice.post_form("/", "image=alice+prompt"),
    );
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);

    assert_eq!(body_bytes(admin.get("/image").await).await, b"admin prompt");
    assert_eq!(body_bytes(alice.get("/image").await).await, b"alice prompt");
}

#[tokio::test]
async fn test_rate_limit() {
    let limiter = RateLimiter::new(2, 10).unwrap();
    let mut browser = Browser::new(test_router(ImageClient::faux(), limiter));

    for _ in 0..2 {
        let response = browser.get("/test").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "This is a test endpoint.");
    }
    let response = browser.get("/test").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_login_without_csrf_token_is_rejected() {
    let mut browser = Browser::new(test_router(ImageClient::faux(), unlimited()));

    // no form page visited, so no token cookie either
    let response = browser
        .post_form("/login", &format!("username=admin&password={ADMIN_PASSWORD}"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains(r#"<div class="flash danger">The form has expired, please try again</div>"#));
    assert!(!browser.cookies.contains_key("session"));

    // the re-rendered form hands out a token that works
    let token = form_token(&body);
    let response = browser
        .post_form(
            "/login",
            &format!("username=admin&password={ADMIN_PASSWORD}&csrf_token={token}"),
        )
        .await;
    assert_redirect(&response, "/");
}

#[tokio::test]
async fn test_login_with_foreign_csrf_token_is_rejected() {
    let router = test_router(ImageClient::faux(), unlimited());
    let mut attacker = Browser::new(router.clone());
    let mut victim = Browser::new(router);

    let attacker_token = form_token(&body_text(attacker.get("/login").await).await);
    victim.get("/login").await;
    assert!(victim.cookies.contains_key("csrf"));

    for token in [attacker_token.as_str(), "bogus", ""] {
        let response = victim
            .post_form(
                "/login",
                &format!("username=admin&password={ADMIN_PASSWORD}&csrf_token={token}"),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response)
            .await
            .contains("The form has expired, please try again"));
        assert!(!victim.cookies.contains_key("session"));
    }
}

#[tokio::test]
async fn test_register_without_csrf_token_creates_no_account() {
    let mut browser = Browser::new(test_router(ImageClient::faux(), unlimited()));
    let response = browser
        .post_form("/register", "username=alice&password=wonderland")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response)
        .await
        .contains("The form has expired, please try again"));
    assert!(!browser.cookies.contains_key("session"));

    let response = browser
        .submit_credentials("/login", "username=alice&password=wonderland")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Invalid credentials"));
}

#[tokio::test]
async fn test_session_expires_with_its_cookie() {
    let sessions = SessionRepository::new(Duration::from_secs(1));
    let mut browser = Browser::new(router_with(
        Arc::new(MemoryUserStore::with_admin(ADMIN_HASH.clone())),
        sessions.clone(),
        ImageClient::faux(),
        unlimited(),
    ));

    let page = body_text(browser.get("/login").await).await;
    let token = form_token(&page);
    let response = browser
        .post_form(
            "/login",
            &format!("username=admin&password={ADMIN_PASSWORD}&csrf_token={token}"),
        )
        .await;
    assert_redirect(&response, "/");
    let session_cookie = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("session="))
        .unwrap()
        .to_string();
    assert!(session_cookie.contains("Max-Age=1"));

    assert_eq!(browser.get("/").await.status(), StatusCode::OK);
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_redirect(&browser.get("/").await, "/login");
    assert_eq!(sessions.count(), 0);
}

#[tokio::test]
async fn test_sqlite_register_login_generate() {
    let user_store: Arc<dyn UserStore> = Arc::new(SqliteUserStore::in_memory().await.unwrap());
    let mut browser = Browser::new(router_with(
        user_store.clone(),
        SessionRepository::default(),
        echo_client(),
        unlimited(),
    ));

    let response = browser
        .submit_credentials("/register", "username=alice&password=wonderland")
        .await;
    assert_redirect(&response, "/");
    browser.get("/logout").await;

    let response = browser
        .submit_credentials("/login", "username=alice&password=wonderland")
        .await;
    assert_redirect(&response, "/");

    let response = browser.post_form("/", "image=a+sqlite+fox").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(browser.get("/image").await).await, b"a sqlite fox");

    let stored = user_store.find_by_username("alice").await.unwrap().unwrap();
    assert_eq!(stored.latest_image, Some(STANDARD.encode("a sqlite fox")));

    let mut other = Browser::new(browser.router.clone());
    let response = other
        .submit_credentials("/register", "username=alice&password=takeover")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Username already exists"));
}
