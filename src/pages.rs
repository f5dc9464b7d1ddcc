use axum::response::Html;

use crate::domain::flash::Flash;

const STYLE: &str = r#"
body { font-family: sans-serif; max-width: 40rem; margin: 2rem auto; padding: 0 1rem; }
form { display: flex; flex-direction: column; gap: 0.5rem; margin-bottom: 1rem; }
.flash { padding: 0.5rem 1rem; border-radius: 4px; margin-bottom: 1rem; }
.flash.success { background: #d1e7dd; }
.flash.danger { background: #f8d7da; }
.flash.warning { background: #fff3cd; }
.flash.info { background: #cff4fc; }
img { max-width: 100%; }
"#;

pub fn escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn layout(title: &str, flash: Option<&Flash>, body: &str) -> Html<String> {
    let flash = flash
        .map(|flash| {
            format!(
                r#"<div class="flash {}">{}</div>"#,
                flash.category.as_str(),
                escape(&flash.message)
            )
        })
        .unwrap_or_default();
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>{STYLE}</style>
</head>
<body>
<h1>{title}</h1>
{flash}
{body}
</body>
</html>
"#
    ))
}

pub fn index(username: &str, has_image: bool, flash: Option<&Flash>) -> Html<String> {
    let image = if has_image {
        r#"<img src="/image" alt="Latest generated image">"#
    } else {
        "<p>No image generated yet.</p>"
    };
    let body = format!(
        r#"<p>Logged in as <strong>{}</strong> · <a href="/logout">Log out</a></p>
<form method="post" action="/">
<label for="image">Describe an image</label>
<input id="image" name="image" type="text" required>
<button type="submit">Generate</button>
</form>
{image}"#,
        escape(username)
    );
    layout("Image generator", flash, &body)
}

pub fn login(flash: Option<&Flash>, csrf_token: &str) -> Html<String> {
    let body = credentials_form("/login", "Login", csrf_token)
        + r#"<p>No account yet? <a href="/register">Register</a></p>"#;
    layout("Login", flash, &body)
}

pub fn register(flash: Option<&Flash>, csrf_token: &str) -> Html<String> {
    let body = credentials_form("/register", "Register", csrf_token)
        + r#"<p>Already registered? <a href="/login">Log in</a></p>"#;
    layout("Register", flash, &body)
}

fn credentials_form(action: &str, submit: &str, csrf_token: &str) -> String {
    format!(
        r#"<form method="post" action="{action}">
<input type="hidden" name="csrf_token" value="{}">
<label for="username">Username</label>
<input id="username" name="username" type="text" required>
<label for="password">Password</label>
<input id="password" name="password" type="password" required>
<button type="submit">{submit}</button>
</form>
"#,
        escape(csrf_token)
    )
}
