//! HTML page handlers.

use std::fmt::Write as _;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use chrono::{Local, NaiveTime, Utc};
use tracing::debug;

use super::forms::{
    errors_html, EmailForm, LoginForm, LoginQuery, ProfileForm, RecordForm, ReminderForm,
    SetPasswordForm,
};
use super::session::{expired_cookie, safe_next, session_cookie, session_token};
use super::{layout, message_page, AppState, CurrentUser};
use crate::analytics::{Dashboard, DayValue};
use crate::auth::client_ip;
use crate::error::{Error, Result, ValidationErrors};
use crate::notification::DailyReminderSetting;
use crate::record::HealthRecord;
use crate::template::{escape, opt1, render, table_row};
use crate::user::{Registration, User};

const WELCOME: &str = include_str!("templates/welcome.html");
const LOGIN: &str = include_str!("templates/login.html");
const REGISTER: &str = include_str!("templates/register.html");
const DASHBOARD: &str = include_str!("templates/dashboard.html");
const RECORD_FORM: &str = include_str!("templates/record_form.html");
const RECORD_DETAIL: &str = include_str!("templates/record_detail.html");
const PROFILE: &str = include_str!("templates/profile.html");
const NOTIFICATIONS: &str = include_str!("templates/notifications.html");
const REMINDER_SETTINGS: &str = include_str!("templates/reminder_settings.html");
const PATIENTS: &str = include_str!("templates/patients.html");
const FOODS: &str = include_str!("templates/foods.html");
const PASSWORD_RESET: &str = include_str!("templates/password_reset.html");
const PASSWORD_RESET_CONFIRM: &str = include_str!("templates/password_reset_confirm.html");

const CORRECT_ERRORS: &str = "Please correct the errors below.";
const DEFAULT_REMINDER_HOUR: u32 = 9;
const RECENT_RECORDS: usize = 7;

/// Render a page for a signed-in user, consuming any pending flash message.
pub(super) async fn page(
    state: &AppState,
    current: &CurrentUser,
    title: &str,
    content: &str,
) -> Result<Response> {
    let flash = state.tracker.take_flash(&current.token).await?;
    Ok(layout(title, Some(&current.user), flash.as_deref(), content).into_response())
}

/// Queue a flash message and redirect.
pub(super) async fn redirect_with_flash(
    state: &AppState,
    current: &CurrentUser,
    to: &str,
    message: &str,
) -> Result<Response> {
    state.tracker.flash(&current.token, message).await?;
    Ok(Redirect::to(to).into_response())
}

fn is_form_error(error: &Error) -> bool {
    matches!(error, Error::Validation(_) | Error::Registration { .. })
}

/// Rate-limit key: the socket peer. Forwarded headers are client-controlled.
fn rate_limit_key(peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    peer.map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string())
}

// === Public pages ===

pub(super) async fn welcome(current: Option<CurrentUser>) -> Response {
    layout("Welcome", current.as_ref().map(|c| &c.user), None, WELCOME).into_response()
}

pub(super) async fn foods(
    State(state): State<AppState>,
    current: Option<CurrentUser>,
) -> Result<Response> {
    let rows: String = state
        .tracker
        .foods()
        .await?
        .iter()
        .map(|f| {
            table_row(&[
                f.name.clone(),
                f.description.clone(),
                f.calories.map(|c| format!("{c} kcal")).unwrap_or_default(),
            ])
        })
        .collect();
    let content = render(FOODS, &[("rows", rows)]);
    match current {
        Some(current) => page(&state, &current, "Food recommendations", &content).await,
        None => Ok(layout("Food recommendations", None, None, &content).into_response()),
    }
}

// === Registration and login ===

fn register_page(state: &AppState, form: &Registration, error: Option<&Error>) -> Response {
    let content = render(
        REGISTER,
        &[
            ("errors", error.map(errors_html).unwrap_or_default()),
            ("username", escape(&form.username)),
            ("email", escape(&form.email)),
            ("first_name", escape(&form.first_name)),
            ("last_name", escape(&form.last_name)),
            ("password_help", escape(&state.tracker.password_policy().help_text())),
        ],
    );
    layout("Register", None, None, &content).into_response()
}

pub(super) async fn register_form(
    State(state): State<AppState>,
    current: Option<CurrentUser>,
) -> Response {
    if current.is_some() {
        return Redirect::to("/dashboard/").into_response();
    }
    register_page(&state, &Registration::default(), None)
}

pub(super) async fn register(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Form(form): Form<Registration>,
) -> Result<Response> {
    state.tracker.check_rate_limit("register", &rate_limit_key(peer.as_ref()))?;
    match state.tracker.register(&form).await {
        Ok(_) => Ok(Redirect::to("/login/?registered=1").into_response()),
        Err(e) if is_form_error(&e) => Ok(register_page(&state, &form, Some(&e))),
        Err(e) => Err(e),
    }
}

fn login_page(next: &str, username: &str, message: Option<&str>, flash: Option<&str>) -> Response {
    let errors = message
        .map(|m| format!("<div class=\"errors\">{}</div>", escape(m)))
        .unwrap_or_default();
    let content = render(
        LOGIN,
        &[
            ("errors", errors),
            ("next", super::session::encode_component(next)),
            ("username", escape(username)),
        ],
    );
    layout("Log in", None, flash, &content).into_response()
}

pub(super) async fn login_form(
    current: Option<CurrentUser>,
    Query(query): Query<LoginQuery>,
) -> Response {
    let next = safe_next(query.next.as_deref());
    if current.is_some() {
        return Redirect::to(next).into_response();
    }
    let flash = query
        .registered
        .is_some()
        .then_some("Registration successful. Please log in.");
    login_page(next, "", None, flash)
}

pub(super) async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Query(query): Query<LoginQuery>,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    state.tracker.check_rate_limit("login", &rate_limit_key(peer.as_ref()))?;
    let ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));

    let next = safe_next(query.next.as_deref());
    match state
        .tracker
        .login(&form.username, &form.password, ip.as_deref(), Utc::now())
        .await
    {
        Ok((_, token)) => {
            let config = state.tracker.config();
            let cookie = session_cookie(
                &token,
                config.session_ttl().num_seconds(),
                config.server.secure_cookies,
            );
            Ok(([(header::SET_COOKIE, cookie)], Redirect::to(next)).into_response())
        }
        Err(Error::AccountLocked { until }) => {
            let message = format!(
                "Your account is locked after too many failed logins. Try again after {}.",
                until.with_timezone(&Local).format("%H:%M")
            );
            Ok(login_page(next, &form.username, Some(&message), None))
        }
        Err(Error::AuthenticationFailed) => Ok(login_page(
            next,
            &form.username,
            Some("Invalid username or password."),
            None,
        )),
        Err(e) => Err(e),
    }
}

pub(super) async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    if let Some(token) = session_token(&headers) {
        state.tracker.logout(&token).await?;
    }
    Ok(([(header::SET_COOKIE, expired_cookie())], Redirect::to("/login/")).into_response())
}

// === Dashboard ===

fn day_value(day: Option<&DayValue>) -> String {
    day.map_or_else(|| "-".to_string(), |d| format!("{} ({:.1})", d.date, d.value))
}

fn correlation(value: Option<f64>) -> String {
    value.map_or_else(|| "Not enough data".to_string(), |v| format!("{v:.2}"))
}

fn latest_html(latest: Option<&HealthRecord>) -> String {
    let Some(r) = latest else {
        return "<p>No records yet. <a href=\"/add/\">Add your first one</a>.</p>".to_string();
    };
    let mut html = format!(
        "<p><a href=\"/records/{}/\">{}</a>: {:.1} h sleep, {:.1} L water, mood {}</p>",
        r.id,
        r.date,
        r.sleep_hours,
        r.water_intake,
        r.mood.label()
    );
    if let Some(weight) = r.weight {
        let _ = write!(html, "<p>Weight {weight:.1} kg</p>");
    }
    if let (Some(bmi), Some(category)) = (r.bmi(), r.bmi_category()) {
        let _ = write!(html, "<p>BMI {bmi:.1} ({category})</p>");
    }
    html
}

fn record_rows(records: &[HealthRecord]) -> String {
    let mut rows = String::new();
    for r in records {
        let _ = writeln!(
            rows,
            "<tr><td><a href=\"/records/{id}/\">{date}</a></td><td>{sleep:.1}</td><td>{water:.1}</td>\
             <td>{weight}</td><td>{mood}</td><td><a href=\"/records/{id}/edit/\">Edit</a></td></tr>",
            id = r.id,
            date = r.date,
            sleep = r.sleep_hours,
            water = r.water_intake,
            weight = opt1(r.weight),
            mood = r.mood.label(),
        );
    }
    if rows.is_empty() {
        rows.push_str("<tr><td colspan=\"6\">No records yet.</td></tr>\n");
    }
    rows
}

/// Dashboard page body.
pub(super) fn render_dashboard(
    user: &User,
    dashboard: &Dashboard,
    recent: &[HealthRecord],
) -> Result<String> {
    let progress = &dashboard.goal_progress;
    let mood_rows: String = dashboard
        .mood_histogram
        .iter()
        .map(|m| table_row(&[m.mood.label().to_string(), m.count.to_string()]))
        .collect();
    let week_rows: String = dashboard
        .weeks
        .iter()
        .rev()
        .map(|w| {
            table_row(&[
                w.week_start.to_string(),
                w.records.to_string(),
                format!("{:.1}", w.avg_sleep),
                format!("{:.1}", w.avg_water),
                opt1(w.avg_weight),
            ])
        })
        .collect();
    // Keep "</script>" inside the JSON from closing the tag.
    let chart_json = serde_json::to_string(&dashboard.charts)?.replace("</", "<\\/");

    Ok(render(
        DASHBOARD,
        &[
            ("name", escape(&user.full_name())),
            ("latest", latest_html(dashboard.latest.as_ref())),
            ("progress_weight", format!("{:.0}", progress.weight)),
            ("progress_sleep", format!("{:.0}", progress.sleep)),
            ("progress_water", format!("{:.0}", progress.water)),
            ("achievement", format!("{:.0}", progress.achievement())),
            ("weekly_count", dashboard.weekly_stats.records_count.to_string()),
            ("weekly_sleep", format!("{:.1}", dashboard.weekly_stats.avg_sleep)),
            ("weekly_water", format!("{:.1}", dashboard.weekly_stats.avg_water)),
            ("sleep_streak", dashboard.weekly.sleep_streak.to_string()),
            ("water_streak", dashboard.weekly.water_streak.to_string()),
            ("monthly_total", dashboard.monthly.total_records.to_string()),
            ("sleep_met", dashboard.monthly.sleep_goal_achieved.to_string()),
            ("water_met", dashboard.monthly.water_goal_achieved.to_string()),
            ("sleep_pct", format!("{:.0}", dashboard.monthly.sleep_goal_percentage)),
            ("water_pct", format!("{:.0}", dashboard.monthly.water_goal_percentage)),
            ("best_sleep", day_value(dashboard.weekly.best_sleep_day.as_ref())),
            ("worst_sleep", day_value(dashboard.weekly.worst_sleep_day.as_ref())),
            ("best_water", day_value(dashboard.weekly.best_water_day.as_ref())),
            ("worst_water", day_value(dashboard.weekly.worst_water_day.as_ref())),
            ("mood_rows", mood_rows),
            ("corr_sleep", correlation(dashboard.correlations.sleep)),
            ("corr_water", correlation(dashboard.correlations.water)),
            ("corr_weight", correlation(dashboard.correlations.weight)),
            ("week_rows", week_rows),
            ("recent_rows", record_rows(recent)),
            ("total_records", dashboard.total_records.to_string()),
            ("chart_json", chart_json),
        ],
    ))
}

pub(super) async fn dashboard(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Response> {
    let today = Local::now().date_naive();
    let dashboard = state.tracker.dashboard(&current.user, today).await?;
    let recent = state
        .tracker
        .recent_records(&current.user, RECENT_RECORDS)
        .await?;
    let content = render_dashboard(&current.user, &dashboard, &recent)?;
    page(&state, &current, "Dashboard", &content).await
}

// === Records ===

fn record_form_page(
    heading: &str,
    action: &str,
    form: &RecordForm,
    error: Option<&Error>,
) -> String {
    let errors = error
        .map(|e| format!("<p>{CORRECT_ERRORS}</p>{}", errors_html(e)))
        .unwrap_or_default();
    render(
        RECORD_FORM,
        &[
            ("heading", escape(heading)),
            ("action", escape(action)),
            ("errors", errors),
            ("date", escape(&form.date)),
            ("sleep_hours", escape(&form.sleep_hours)),
            ("water_intake", escape(&form.water_intake)),
            ("weight", escape(&form.weight)),
            ("height", escape(&form.height)),
            ("weight_goal", escape(&form.weight_goal)),
            ("mood_options", form.mood_options()),
            ("notes", escape(&form.notes)),
        ],
    )
}

pub(super) async fn add_record_form(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Response> {
    let form = RecordForm::blank(Local::now().date_naive(), &current.user);
    let content = record_form_page("Add Health Record", "/add/", &form, None);
    page(&state, &current, "Add Health Record", &content).await
}

pub(super) async fn add_record(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<RecordForm>,
) -> Result<Response> {
    let saved = match form.parse() {
        Ok(input) => state.tracker.add_record(&current.user, &input, Utc::now()).await,
        Err(e) => Err(e),
    };
    match saved {
        Ok(_) => {
            let message = "Health record added successfully!";
            redirect_with_flash(&state, &current, "/dashboard/", message).await
        }
        Err(e) if is_form_error(&e) => {
            let content = record_form_page("Add Health Record", "/add/", &form, Some(&e));
            page(&state, &current, "Add Health Record", &content).await
        }
        Err(e) => Err(e),
    }
}

pub(super) async fn record_detail(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response> {
    let r = state.tracker.record(&current.user, id).await?;
    let bmi = match (r.bmi(), r.bmi_category()) {
        (Some(bmi), Some(category)) => format!("{bmi:.1} ({category})"),
        _ => "-".to_string(),
    };
    let content = render(
        RECORD_DETAIL,
        &[
            ("id", r.id.to_string()),
            ("date", r.date.to_string()),
            ("sleep_hours", format!("{:.1}", r.sleep_hours)),
            ("water_intake", format!("{:.1}", r.water_intake)),
            ("weight", r.weight.map_or_else(|| "-".to_string(), |w| format!("{w:.1} kg"))),
            ("height", r.height.map_or_else(|| "-".to_string(), |h| format!("{h:.1} cm"))),
            ("bmi", bmi),
            (
                "weight_goal",
                r.weight_goal.map_or_else(|| "-".to_string(), |g| format!("{g:.1} kg")),
            ),
            (
                "weight_progress",
                r.weight_progress().map_or_else(|| "-".to_string(), |p| format!("{p:.1}%")),
            ),
            ("mood", r.mood.label().to_string()),
            ("notes", escape(r.notes.as_deref().unwrap_or(""))),
            (
                "last_modified",
                r.last_modified.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
            ),
        ],
    );
    page(&state, &current, "Health Record", &content).await
}

pub(super) async fn edit_record_form(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response> {
    let record = state.tracker.record(&current.user, id).await?;
    let action = format!("/records/{id}/edit/");
    let form = RecordForm::from_record(&record);
    let content = record_form_page("Edit Health Record", &action, &form, None);
    page(&state, &current, "Edit Health Record", &content).await
}

pub(super) async fn edit_record(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<RecordForm>,
) -> Result<Response> {
    let saved = match form.parse() {
        Ok(input) => {
            state
                .tracker
                .update_record(&current.user, id, &input, Utc::now())
                .await
        }
        Err(e) => Err(e),
    };
    match saved {
        Ok(_) => {
            let to = format!("/records/{id}/");
            redirect_with_flash(&state, &current, &to, "Health record updated successfully!").await
        }
        Err(e) if is_form_error(&e) => {
            let action = format!("/records/{id}/edit/");
            let content = record_form_page("Edit Health Record", &action, &form, Some(&e));
            page(&state, &current, "Edit Health Record", &content).await
        }
        Err(e) => Err(e),
    }
}

// === Profile ===

fn profile_page(user: &User, form: &ProfileForm, error: Option<&Error>) -> String {
    let errors = error
        .map(|e| format!("<p>{CORRECT_ERRORS}</p>{}", errors_html(e)))
        .unwrap_or_default();
    render(
        PROFILE,
        &[
            ("username", escape(&user.username)),
            ("role", user.role.label().to_string()),
            ("date_joined", user.date_joined.format("%B %d, %Y").to_string()),
            ("errors", errors),
            ("first_name", escape(&form.first_name)),
            ("last_name", escape(&form.last_name)),
            ("email", escape(&form.email)),
            ("age", escape(&form.age)),
            ("gender_options", form.gender_options()),
            ("weight_goal", escape(&form.weight_goal)),
            ("sleep_goal", escape(&form.sleep_goal)),
            ("water_goal", escape(&form.water_goal)),
        ],
    )
}

pub(super) async fn profile_form(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Response> {
    let content = profile_page(&current.user, &ProfileForm::from_user(&current.user), None);
    page(&state, &current, "Profile", &content).await
}

pub(super) async fn update_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<ProfileForm>,
) -> Result<Response> {
    let saved = match form.parse() {
        Ok(update) => state.tracker.update_profile(&current.user, &update).await,
        Err(e) => Err(e),
    };
    match saved {
        Ok(_) => {
            redirect_with_flash(&state, &current, "/profile/", "Profile updated successfully!").await
        }
        Err(e) if is_form_error(&e) => {
            let content = profile_page(&current.user, &form, Some(&e));
            page(&state, &current, "Profile", &content).await
        }
        Err(e) => Err(e),
    }
}

// === Notifications and reminders ===

pub(super) async fn notifications(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Response> {
    let notifications = state.tracker.notifications(&current.user).await?;
    let mut rows = String::new();
    for n in &notifications {
        let _ = writeln!(
            rows,
            "<tr{class}><td>{when}</td><td>{kind}</td><td>{title}</td><td>{message}</td></tr>",
            class = if n.is_read { "" } else { " class=\"unread\"" },
            when = n.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            kind = n.kind.label(),
            title = escape(&n.title),
            message = escape(&n.message),
        );
    }
    if rows.is_empty() {
        rows.push_str("<tr><td colspan=\"4\">No notifications.</td></tr>\n");
    }
    let content = render(NOTIFICATIONS, &[("rows", rows)]);
    page(&state, &current, "Notifications", &content).await
}

pub(super) async fn daily_reminder(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Response> {
    let raised = state
        .tracker
        .daily_check_in(&current.user, Local::now().date_naive(), Utc::now())
        .await?;
    let message = if raised {
        "Daily reminder set! Check your notifications."
    } else {
        "Great job! You've already logged your health data today."
    };
    redirect_with_flash(&state, &current, "/dashboard/", message).await
}

fn reminder_page(form: &ReminderForm, error: Option<&Error>) -> String {
    let checked = |flag: &Option<String>| if flag.is_some() { "checked" } else { "" }.to_string();
    render(
        REMINDER_SETTINGS,
        &[
            ("errors", error.map(errors_html).unwrap_or_default()),
            ("reminder_time", escape(&form.reminder_time)),
            ("send_email", checked(&form.send_email)),
            ("send_in_app", checked(&form.send_in_app)),
        ],
    )
}

pub(super) async fn reminder_settings_form(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Response> {
    let setting = match state.tracker.reminder_setting(&current.user).await? {
        Some(setting) => setting,
        None => DailyReminderSetting::new(
            current.user.id,
            NaiveTime::from_hms_opt(DEFAULT_REMINDER_HOUR, 0, 0).unwrap_or_default(),
        ),
    };
    let content = reminder_page(&ReminderForm::from_setting(&setting), None);
    page(&state, &current, "Daily reminder", &content).await
}

pub(super) async fn save_reminder_settings(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<ReminderForm>,
) -> Result<Response> {
    let saved = match form.parse(current.user.id) {
        Ok(setting) => state.tracker.save_reminder_setting(&current.user, &setting).await,
        Err(e) => Err(e),
    };
    match saved {
        Ok(()) => {
            let message = "Daily reminder settings updated!";
            redirect_with_flash(&state, &current, "/dashboard/", message).await
        }
        Err(e) if is_form_error(&e) => {
            let content = reminder_page(&form, Some(&e));
            page(&state, &current, "Daily reminder", &content).await
        }
        Err(e) => Err(e),
    }
}

// === Staff ===

pub(super) async fn patients(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Response> {
    let patients = state.tracker.patients(&current.user).await?;
    let mut rows = String::new();
    for p in &patients {
        let _ = writeln!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td><a href=\"/export/json/?user_id={}\">Export JSON</a></td></tr>",
            escape(&p.username),
            escape(&p.full_name()),
            escape(&p.email),
            p.date_joined.format("%Y-%m-%d"),
            p.last_login
                .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
            p.id
        );
    }
    if rows.is_empty() {
        rows.push_str("<tr><td colspan=\"6\">No patients yet.</td></tr>\n");
    }
    let content = render(PATIENTS, &[("rows", rows)]);
    page(&state, &current, "Patients", &content).await
}

// === Password reset ===

pub(super) async fn password_reset_form() -> Response {
    layout("Reset your password", None, None, PASSWORD_RESET).into_response()
}

pub(super) async fn password_reset(
    State(state): State<AppState>,
    Form(form): Form<EmailForm>,
) -> Result<Response> {
    state
        .tracker
        .request_password_reset(&form.email, Utc::now())
        .await?;
    Ok(Redirect::to("/password_reset/done/").into_response())
}

pub(super) async fn password_reset_done() -> Response {
    message_page(
        StatusCode::OK,
        None,
        "Password reset sent",
        "We've emailed you instructions for setting your password, if an account exists with the \
         email you entered. You should receive them shortly.",
    )
}

pub(super) async fn password_reset_complete() -> Response {
    message_page(
        StatusCode::OK,
        None,
        "Password reset complete",
        "Your password has been set. You may go ahead and log in now.",
    )
}

fn invalid_reset_link() -> Response {
    message_page(
        StatusCode::OK,
        None,
        "Password reset unsuccessful",
        "The password reset link was invalid, possibly because it has already been used. \
         Please request a new password reset.",
    )
}

fn reset_confirm_page(state: &AppState, token: &str, error: Option<&Error>) -> Response {
    let content = render(
        PASSWORD_RESET_CONFIRM,
        &[
            ("errors", error.map(errors_html).unwrap_or_default()),
            ("token", escape(token)),
            ("password_help", escape(&state.tracker.password_policy().help_text())),
        ],
    );
    layout("Choose a new password", None, None, &content).into_response()
}

pub(super) async fn reset_confirm_form(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response> {
    if state.tracker.reset_token_valid(&token, Utc::now()).await? {
        Ok(reset_confirm_page(&state, &token, None))
    } else {
        debug!("Invalid password reset link opened");
        Ok(invalid_reset_link())
    }
}

pub(super) async fn reset_confirm(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Form(form): Form<SetPasswordForm>,
) -> Result<Response> {
    match state
        .tracker
        .reset_password(&token, &form.new_password1, &form.new_password2, Utc::now())
        .await
    {
        Ok(()) => Ok(Redirect::to("/password_reset/complete/").into_response()),
        Err(e)
            if e
                .validation_errors()
                .is_some_and(|errors| errors.get(ValidationErrors::NON_FIELD).is_some()) =>
        {
            Ok(invalid_reset_link())
        }
        Err(e) if is_form_error(&e) => Ok(reset_confirm_page(&state, &token, Some(&e))),
        Err(e) => Err(e),
    }
}
