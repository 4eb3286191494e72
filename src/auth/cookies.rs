use rocket::http::{Cookie, CookieJar, SameSite};
use time::Duration as TimeDuration;

use crate::auth::AuthConfig;
use crate::auth::jwt::SignedAccessToken;
use crate::auth::refresh_store::RefreshTokenIssued;

// Host-only, HTTP-only, whole-path carriers. No Domain attribute is ever set.
fn carrier(name: &str, value: String, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .max_age(TimeDuration::seconds(max_age_secs))
        .build()
}

/// The access cookie lives exactly as long as the token it carries.
pub fn set_access_cookie(cookies: &CookieJar<'_>, config: &AuthConfig, token: &SignedAccessToken) {
    cookies.add(carrier(
        &config.access_cookie_name,
        token.token.clone(),
        config.access_token_ttl_secs,
        config.cookie_secure,
    ));
}

pub fn set_refresh_cookie(cookies: &CookieJar<'_>, config: &AuthConfig, token: &RefreshTokenIssued) {
    cookies.add(carrier(
        &config.refresh_cookie_name,
        token.token.clone(),
        config.refresh_token_ttl_secs,
        config.cookie_secure,
    ));
}

pub fn clear_auth_cookies(cookies: &CookieJar<'_>, config: &AuthConfig) {
    for name in [&config.access_cookie_name, &config.refresh_cookie_name] {
        let cookie = Cookie::build((name.clone(), String::new()))
            .path("/")
            .removal()
            .build();
        cookies.add(cookie);
    }
}

pub fn access_cookie_value(cookies: &CookieJar<'_>, config: &AuthConfig) -> Option<String> {
    cookies
        .get(&config.access_cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

pub fn refresh_cookie_value(cookies: &CookieJar<'_>, config: &AuthConfig) -> Option<String> {
    cookies
        .get(&config.refresh_cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}
