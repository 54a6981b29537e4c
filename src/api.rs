// src/api.rs
use crate::auth::{
    expired_session_cookie, hash_password, session_cookie, verify_password, SessionStore,
    SESSION_COOKIE,
};
use crate::db::Database;
use crate::error::AppError;
use crate::ledger;
use crate::models::{LoginForm, QuoteForm, RegisterForm, TradeForm};
use crate::quote::QuoteSource;
use crate::views::{self, Apology};
use log::{error, info};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::header::{HeaderMap, HeaderValue, CACHE_CONTROL, EXPIRES, PRAGMA, SET_COOKIE};
use warp::http::{StatusCode, Uri};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Largest form body accepted by any POST route.
pub const FORM_LIMIT: u64 = 16 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub quotes: Arc<dyn QuoteSource>,
    pub sessions: SessionStore,
    pub starting_cash: Decimal,
}

/// The logged-in user behind a request, with the cookie that proved it.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: i64,
    pub token: String,
}

pub fn routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let index = warp::path::end()
        .and(warp::get())
        .and(require_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(index_handler);

    let buy_form = warp::path!("buy")
        .and(warp::get())
        .and(require_session(state.clone()))
        .map(|_: CurrentUser| html(views::buy()));

    let buy = warp::path!("buy")
        .and(warp::post())
        .and(require_session(state.clone()))
        .and(with_state(state.clone()))
        .and(form_body())
        .and_then(buy_handler);

    let sell_form = warp::path!("sell")
        .and(warp::get())
        .and(require_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(sell_form_handler);

    let sell = warp::path!("sell")
        .and(warp::post())
        .and(require_session(state.clone()))
        .and(with_state(state.clone()))
        .and(form_body())
        .and_then(sell_handler);

    let quote_form = warp::path!("quote")
        .and(warp::get())
        .and(require_session(state.clone()))
        .map(|_: CurrentUser| html(views::quote()));

    let quote = warp::path!("quote")
        .and(warp::post())
        .and(require_session(state.clone()))
        .and(with_state(state.clone()))
        .and(form_body())
        .and_then(quote_handler);

    let history = warp::path!("history")
        .and(warp::get())
        .and(require_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(history_handler);

    let login_form = warp::path!("login")
        .and(warp::get())
        .and(warp::cookie::optional::<String>(SESSION_COOKIE))
        .and(with_state(state.clone()))
        .and_then(login_form_handler);

    let login = warp::path!("login")
        .and(warp::post())
        .and(warp::cookie::optional::<String>(SESSION_COOKIE))
        .and(with_state(state.clone()))
        .and(form_body())
        .and_then(login_handler);

    let logout = warp::path!("logout")
        .and(warp::get())
        .and(warp::cookie::optional::<String>(SESSION_COOKIE))
        .and(with_state(state.clone()))
        .and_then(logout_handler);

    let register_form = warp::path!("register")
        .and(warp::get())
        .map(|| html(views::register()));

    let register = warp::path!("register")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(form_body())
        .and_then(register_handler);

    let mut no_cache = HeaderMap::new();
    no_cache.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    no_cache.insert(EXPIRES, HeaderValue::from_static("0"));
    no_cache.insert(PRAGMA, HeaderValue::from_static("no-cache"));

    index
        .or(buy_form)
        .or(buy)
        .or(sell_form)
        .or(sell)
        .or(quote_form)
        .or(quote)
        .or(history)
        .or(login_form)
        .or(login)
        .or(logout)
        .or(register_form)
        .or(register)
        .recover(handle_rejection)
        .with(warp::reply::with::headers(no_cache))
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Extracts the current user or rejects with `AppError::Unauthenticated`,
/// which the recover handler turns into a redirect to the login page.
fn require_session(
    state: AppState,
) -> impl Filter<Extract = (CurrentUser,), Error = Rejection> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE)
        .and(with_state(state))
        .and_then(authenticate)
}

async fn authenticate(token: Option<String>, state: AppState) -> Result<CurrentUser, Rejection> {
    let token = token.ok_or_else(|| warp::reject::custom(AppError::Unauthenticated))?;
    match state.sessions.user_for(&token).await {
        Some(user_id) => Ok(CurrentUser { user_id, token }),
        None => Err(warp::reject::custom(AppError::Unauthenticated)),
    }
}

fn form_body<T: DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(FORM_LIMIT).and(warp::body::form())
}

fn html(page: String) -> Response {
    warp::reply::html(page).into_response()
}

fn redirect_to(location: &'static str) -> Response {
    warp::redirect::see_other(Uri::from_static(location)).into_response()
}

fn with_cookie(mut response: Response, cookie: String) -> Response {
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

async fn index_handler(user: CurrentUser, state: AppState) -> Result<Response, Rejection> {
    let portfolio = ledger::view_portfolio(&state.db, state.quotes.as_ref(), user.user_id)
        .await
        .map_err(warp::reject::custom)?;
    let flash = state.sessions.take_flash(&user.token).await;
    Ok(html(views::index(&portfolio, flash.as_deref())))
}

async fn buy_handler(
    user: CurrentUser,
    state: AppState,
    form: TradeForm,
) -> Result<Response, Rejection> {
    let symbol = ledger::parse_symbol(form.symbol.as_deref()).map_err(warp::reject::custom)?;
    let shares = ledger::parse_shares(form.shares.as_deref()).map_err(warp::reject::custom)?;

    let tx = ledger::buy(&state.db, state.quotes.as_ref(), user.user_id, &symbol, shares)
        .await
        .map_err(warp::reject::custom)?;

    state
        .sessions
        .set_flash(&user.token, format!("Bought {} shares of {}", shares, tx.symbol))
        .await;
    Ok(redirect_to("/"))
}

async fn sell_form_handler(user: CurrentUser, state: AppState) -> Result<Response, Rejection> {
    let symbols = ledger::owned_symbols(&state.db, user.user_id)
        .await
        .map_err(warp::reject::custom)?;
    Ok(html(views::sell(&symbols)))
}

async fn sell_handler(
    user: CurrentUser,
    state: AppState,
    form: TradeForm,
) -> Result<Response, Rejection> {
    let symbol = ledger::parse_symbol(form.symbol.as_deref()).map_err(warp::reject::custom)?;
    let shares = ledger::parse_shares(form.shares.as_deref()).map_err(warp::reject::custom)?;

    let tx = ledger::sell(&state.db, state.quotes.as_ref(), user.user_id, &symbol, shares)
        .await
        .map_err(warp::reject::custom)?;

    state
        .sessions
        .set_flash(&user.token, format!("Sold {} shares of {}", shares, tx.symbol))
        .await;
    Ok(redirect_to("/"))
}

async fn quote_handler(
    _user: CurrentUser,
    state: AppState,
    form: QuoteForm,
) -> Result<Response, Rejection> {
    let symbol = ledger::parse_symbol(form.symbol.as_deref()).map_err(warp::reject::custom)?;
    let quote = ledger::quote(state.quotes.as_ref(), &symbol)
        .await
        .map_err(warp::reject::custom)?;
    Ok(html(views::quoted(&quote)))
}

async fn history_handler(user: CurrentUser, state: AppState) -> Result<Response, Rejection> {
    let transactions = ledger::history(&state.db, user.user_id)
        .await
        .map_err(warp::reject::custom)?;
    Ok(html(views::history(&transactions)))
}

async fn login_form_handler(
    token: Option<String>,
    state: AppState,
) -> Result<Response, Rejection> {
    if let Some(token) = token {
        state.sessions.end(&token).await;
    }
    Ok(with_cookie(html(views::login()), expired_session_cookie()))
}

async fn login_handler(
    token: Option<String>,
    state: AppState,
    form: LoginForm,
) -> Result<Response, Rejection> {
    if let Some(token) = token {
        state.sessions.end(&token).await;
    }

    let (username, password) = match (non_empty(form.username), non_empty(form.password)) {
        (Some(username), Some(password)) => (username, password),
        _ => return Err(warp::reject::custom(AppError::MissingCredentials)),
    };

    let user = state
        .db
        .find_user_by_username(&username)
        .await
        .map_err(warp::reject::custom)?
        .filter(|user| verify_password(&password, &user.hash))
        .ok_or_else(|| warp::reject::custom(AppError::InvalidCredentials))?;

    let cookie = state
        .sessions
        .start(user.id)
        .await
        .map_err(warp::reject::custom)?;
    info!("User {} logged in", user.username);
    Ok(with_cookie(redirect_to("/"), session_cookie(&cookie)))
}

async fn logout_handler(token: Option<String>, state: AppState) -> Result<Response, Rejection> {
    if let Some(token) = token {
        state.sessions.end(&token).await;
    }
    Ok(with_cookie(redirect_to("/login"), expired_session_cookie()))
}

async fn register_handler(state: AppState, form: RegisterForm) -> Result<Response, Rejection> {
    let (username, password, confirmation) = match (
        non_empty(form.username),
        non_empty(form.password),
        non_empty(form.confirmation),
    ) {
        (Some(u), Some(p), Some(c)) => (u, p, c),
        _ => {
            return Err(warp::reject::custom(AppError::Validation(
                "must fill all fields".into(),
            )))
        }
    };
    if password != confirmation {
        return Err(warp::reject::custom(AppError::Validation(
            "passwords do not match".into(),
        )));
    }

    let hash = hash_password(&password).map_err(warp::reject::custom)?;
    let user_id = state
        .db
        .create_user(&username, &hash, state.starting_cash)
        .await
        .map_err(warp::reject::custom)?;

    let cookie = state
        .sessions
        .start(user_id)
        .await
        .map_err(warp::reject::custom)?;
    info!("Registered user {} with id {}", username, user_id);
    Ok(with_cookie(redirect_to("/"), session_cookie(&cookie)))
}

fn apology(status: StatusCode, message: impl Into<String>) -> Response {
    let apology = Apology {
        status,
        message: message.into(),
    };
    warp::reply::with_status(warp::reply::html(views::apology(&apology)), status).into_response()
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    if let Some(app_err) = err.find::<AppError>() {
        if let AppError::Unauthenticated = app_err {
            return Ok(redirect_to("/login"));
        }
        if app_err.is_internal() {
            error!("Request failed: {}", app_err);
        }
        return Ok(apology(app_err.status(), app_err.user_message()));
    }

    if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(apology(StatusCode::PAYLOAD_TOO_LARGE, "form too large"));
    }
    if err.find::<warp::reject::LengthRequired>().is_some() {
        return Ok(apology(StatusCode::LENGTH_REQUIRED, "content length required"));
    }
    if err.find::<warp::body::BodyDeserializeError>().is_some() {
        return Ok(apology(StatusCode::BAD_REQUEST, "malformed form data"));
    }
    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(apology(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"));
    }
    if err.is_not_found() {
        return Ok(apology(StatusCode::NOT_FOUND, "page not found"));
    }

    error!("Unhandled rejection: {:?}", err);
    Ok(apology(StatusCode::INTERNAL_SERVER_ERROR, "something went wrong"))
}
