//! Read-only reporting surface.

use crate::analytics::{DomainCount, Engagement, ErrorBreakdown, RecentJob, SummaryStats};
use crate::server::auth::removal_cookie;
use crate::server::{error::AppError, AppContext};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use readly_db::models::DailyCount;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const DASHBOARD_RECENT_LIMIT: usize = 50;
const STATS_RECENT_LIMIT: usize = 20;

pub fn admin_routes() -> Router<AppContext> {
    Router::new()
        .route("/admin", get(login_page))
        .route("/admin/login", post(login))
        .route("/admin/logout", get(logout))
        .route("/admin/dashboard", get(dashboard))
        .route("/admin/stats", get(stats))
}

fn found(location: &'static str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn login_form(error: Option<&str>) -> Html<String> {
    let error = error
        .map(|e| format!("<p class=\"error\">{}</p>", e))
        .unwrap_or_default();
    Html(format!(
        "<!doctype html>\
         <html><head><title>Readly Admin</title></head><body>\
         <h1>Readly Admin</h1>{}\
         <form method=\"post\" action=\"/admin/login\">\
         <input type=\"password\" name=\"password\" autofocus>\
         <button type=\"submit\">Sign in</button>\
         </form></body></html>",
        error
    ))
}

/// Login form, or straight to the dashboard with a valid cookie.
async fn login_page(State(ctx): State<AppContext>, jar: CookieJar) -> Response {
    if ctx.admin.authorize_cookie(&jar).is_ok() {
        return found("/admin/dashboard");
    }
    login_form(None).into_response()
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub password: String,
}

async fn login(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let cookie = ctx.admin.session_cookie()?;

    if ctx.admin.verify_password(&form.password).is_err() {
        warn!("Rejected admin login");
        return Ok((StatusCode::UNAUTHORIZED, login_form(Some("Invalid password"))).into_response());
    }

    info!("Admin logged in");
    Ok((jar.add(cookie), found("/admin/dashboard")).into_response())
}

async fn logout(jar: CookieJar) -> Response {
    (jar.add(removal_cookie()), found("/admin")).into_response()
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub stats: SummaryStats,
    pub engagement: Engagement,
    pub daily_trend: Vec<DailyCount>,
    pub recent: Vec<RecentJob>,
    pub environment: String,
}

async fn dashboard(
    State(ctx): State<AppContext>,
    jar: CookieJar,
) -> Result<Json<DashboardResponse>, AppError> {
    ctx.admin.authorize_cookie(&jar)?;

    let now = Utc::now();
    let analytics = &ctx.analytics;

    Ok(Json(DashboardResponse {
        stats: analytics.summary(now)?,
        engagement: analytics.engagement(now)?,
        daily_trend: analytics.daily_trend(ctx.config.analytics.trend_days, now)?,
        recent: analytics.recent_jobs(DASHBOARD_RECENT_LIMIT)?,
        environment: ctx.config.server.environment.clone(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: SummaryStats,
    pub engagement: Engagement,
    pub top_domains: Vec<DomainCount>,
    pub daily_trend: Vec<DailyCount>,
    pub error_breakdown: Vec<ErrorBreakdown>,
    pub recent: Vec<RecentJob>,
}

async fn stats(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    Query(params): Query<StatsParams>,
) -> Result<Json<StatsResponse>, AppError> {
    let token = jar
        .get(crate::server::auth::ADMIN_COOKIE_NAME)
        .map(|c| c.value().to_string());
    ctx.admin
        .authorize(params.password.as_deref(), token.as_deref())?;

    let now = Utc::now();
    let analytics = &ctx.analytics;

    Ok(Json(StatsResponse {
        stats: analytics.summary(now)?,
        engagement: analytics.engagement(now)?,
        top_domains: analytics.top_domains(ctx.config.analytics.top_domains)?,
        daily_trend: analytics.daily_trend(ctx.config.analytics.trend_days, now)?,
        error_breakdown: analytics.error_breakdown()?,
        recent: analytics.recent_jobs(STATS_RECENT_LIMIT)?,
    }))
}
