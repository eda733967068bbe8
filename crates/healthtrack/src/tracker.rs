//! Application service.
//!
//! [`Tracker`] owns the storage, mailer and security policies and exposes
//! every user-facing operation. The web handlers and the CLI both go through
//! it; neither touches [`Storage`] directly.
//!
//! Time is passed in (`now`, `today`) so that callers decide the clock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::analytics::{Dashboard, Period, PeriodSummary};
use crate::auth::{
    generate_token, hash_password, hash_token, verify_password, LockoutPolicy, PasswordPolicy,
    Session, PASSWORD_RESET_TTL_HOURS,
};
use crate::backup::{BackupEntry, BackupInfo, BackupManager};
use crate::config::Config;
use crate::error::{Error, Result, ValidationErrors};
use crate::export::records_csv;
use crate::export::records_json;
use crate::export::report::{PdfConverter, Report, REPORT_RECORD_LIMIT};
use crate::food::{FoodRecommendation, NewFood};
use crate::mailer::{self, Email, Mailer};
use crate::notification::{DailyReminderSetting, NewNotification, Notification};
use crate::rate_limit::RateLimiter;
use crate::record::{HealthRecord, RecordInput};
use crate::reminders;
use crate::storage::{Storage, StorageStats};
use crate::user::{NewUser, ProfileUpdate, Registration, Role, User};

/// Weight change that counts as a milestone, in kg.
pub const MILESTONE_STEP_KG: f64 = 5.0;

/// Roles allowed to see other users' data.
pub const STAFF_ROLES: [Role; 2] = [Role::Admin, Role::Doctor];

const INVALID_RESET_LINK: &str =
    "The password reset link was invalid, possibly because it has already been used.";

/// The health tracker service.
#[derive(Debug)]
pub struct Tracker {
    storage: Mutex<Storage>,
    config: Config,
    mailer: Arc<dyn Mailer>,
    rate_limiter: RateLimiter,
    password_policy: PasswordPolicy,
    lockout: LockoutPolicy,
}

impl Tracker {
    /// Build a tracker around an open storage.
    #[must_use]
    pub fn new(storage: Storage, config: Config, mailer: Arc<dyn Mailer>) -> Self {
        let rate_limiter = RateLimiter::new(
            config.security.rate_limit_requests,
            config.rate_limit_window(),
        );
        Self {
            storage: Mutex::new(storage),
            password_policy: PasswordPolicy::from(&config.security),
            lockout: LockoutPolicy::from(&config.security),
            rate_limiter,
            mailer,
            config,
        }
    }

    /// Open the configured database and mailer.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the mail
    /// settings are invalid.
    pub fn open(config: Config) -> Result<Self> {
        let storage = Storage::open(config.database_path())?;
        let mailer = mailer::from_config(&config.mail)?;
        Ok(Self::new(storage, config, mailer))
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Password rules in force.
    #[must_use]
    pub fn password_policy(&self) -> PasswordPolicy {
        self.password_policy
    }

    /// Drop rate-limit windows that have run out.
    pub fn prune_rate_limits(&self) {
        self.rate_limiter.prune(std::time::Instant::now());
    }

    /// Count a login or registration attempt from `client`.
    ///
    /// # Errors
    ///
    /// Returns `Error::RateLimited` when the client is over its limit.
    pub fn check_rate_limit(&self, endpoint: &str, client: &str) -> Result<()> {
        self.rate_limiter.check(endpoint, client)
    }

    // === Accounts ===

    /// Register a patient account.
    ///
    /// # Errors
    ///
    /// Returns `Error::Registration` with the first failing rule.
    pub async fn register(&self, form: &Registration) -> Result<User> {
        self.create_user(form, Role::Patient).await
    }

    /// Create an account with a given role.
    ///
    /// # Errors
    ///
    /// Returns `Error::Registration` with the first failing rule.
    pub async fn create_user(&self, form: &Registration, role: Role) -> Result<User> {
        form.validate_shape()?;
        if let Some(message) = self.password_policy.violation(&form.password1) {
            return Err(Error::registration(message));
        }

        let username = form.username.trim();
        let email = form.email.trim();
        let password = form.password1.clone();
        let password_hash = blocking(move || hash_password(&password)).await??;

        // Check and insert under one lock so concurrent sign-ups cannot race.
        let storage = self.storage.lock().await;
        if storage.username_exists(username)? {
            return Err(Error::registration("Username already exists."));
        }
        if storage.email_exists(email, None)? {
            return Err(Error::registration("Email already exists."));
        }
        let id = storage.insert_user(&NewUser {
            username: username.to_string(),
            email: email.to_string(),
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
            password_hash,
            role,
        })?;
        info!("Registered user {} ({})", username, role.label());
        require_user(&storage, id)
    }

    /// Check credentials, applying the lockout policy.
    ///
    /// `login` may be a username or an email address.
    ///
    /// # Errors
    ///
    /// Returns `Error::AccountLocked` for a locked account and
    /// `Error::AuthenticationFailed` for unknown users or wrong passwords.
    pub async fn authenticate(
        &self,
        login: &str,
        password: &str,
        client_ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let user = self.storage.lock().await.find_user_by_login(login.trim())?;
        let Some(user) = user else {
            warn!("Login attempt for unknown account {:?}", login);
            return Err(Error::AuthenticationFailed);
        };

        if let Some(until) = user.account_locked_until.filter(|until| *until > now) {
            warn!("Login attempt for locked account {}", user.username);
            return Err(Error::AccountLocked { until });
        }

        // Argon2 is slow; keep it off the storage lock and the async workers.
        let password = password.to_string();
        let stored_hash = user.password_hash.clone();
        let valid = blocking(move || verify_password(&password, &stored_hash)).await?;

        let storage = self.storage.lock().await;
        if valid {
            storage.record_login_success(user.id, client_ip, now)?;
            info!("User {} logged in", user.username);
            require_user(&storage, user.id)
        } else {
            let attempts = storage.record_login_failure(
                user.id,
                self.lockout.max_failed_logins,
                now + self.lockout.lockout,
            )?;
            match self.lockout.locked_until(attempts, now) {
                Some(until) => warn!(
                    "Account {} locked until {} after {} failed logins",
                    user.username, until, attempts
                ),
                None => warn!("Failed login {} for {}", attempts, user.username),
            }
            Err(Error::AuthenticationFailed)
        }
    }

    /// Authenticate and start a session, returning the user and cookie token.
    ///
    /// # Errors
    ///
    /// See [`Tracker::authenticate`].
    pub async fn login(
        &self,
        login: &str,
        password: &str,
        client_ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(User, String)> {
        let user = self.authenticate(login, password, client_ip, now).await?;
        let token = self.start_session(user.id, now).await?;
        Ok((user, token))
    }

    /// Start a session for a user and return the raw cookie token.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn start_session(&self, user_id: i64, now: DateTime<Utc>) -> Result<String> {
        let (session, token) = Session::start(user_id, now, self.config.session_ttl());
        self.storage.lock().await.insert_session(&session)?;
        Ok(token)
    }

    /// The user behind a session cookie, if the session is valid.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn session_user(&self, token: &str, now: DateTime<Utc>) -> Result<Option<User>> {
        let storage = self.storage.lock().await;
        let Some(session) = storage.get_session(&hash_token(token), now)? else {
            return Ok(None);
        };
        storage.get_user(session.user_id)
    }

    /// End a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn logout(&self, token: &str) -> Result<()> {
        if self.storage.lock().await.delete_session(&hash_token(token))? {
            debug!("Session ended");
        }
        Ok(())
    }

    /// Queue a message for the next page the session sees.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn flash(&self, token: &str, message: &str) -> Result<()> {
        self.storage
            .lock()
            .await
            .set_flash(&hash_token(token), message)
    }

    /// Take the queued message, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn take_flash(&self, token: &str) -> Result<Option<String>> {
        self.storage.lock().await.take_flash(&hash_token(token))
    }

    /// Save profile changes and return the updated user.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for out-of-range values or an email used
    /// by another account.
    pub async fn update_profile(&self, user: &User, profile: &ProfileUpdate) -> Result<User> {
        profile.validate()?;
        let mut profile = profile.clone();
        profile.email = profile.email.trim().to_string();

        let storage = self.storage.lock().await;
        if storage.email_exists(&profile.email, Some(user.id))? {
            return Err(Error::field("email", "This email address is already in use."));
        }
        storage.update_profile(user.id, &profile)?;
        info!("Profile updated for {}", user.username);
        require_user(&storage, user.id)
    }

    /// Email a reset link when the address belongs to an account.
    ///
    /// Unknown addresses succeed silently.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails. Mail delivery
    /// failures are only logged.
    pub async fn request_password_reset(&self, email: &str, now: DateTime<Utc>) -> Result<()> {
        let email = email.trim();
        let message = {
            let storage = self.storage.lock().await;
            let Some(user) = storage.find_user_by_email(email)? else {
                debug!("Password reset requested for unknown address");
                return Ok(());
            };
            let token = generate_token();
            storage.insert_password_reset(
                &hash_token(&token),
                user.id,
                now,
                now + Duration::hours(PASSWORD_RESET_TTL_HOURS),
            )?;
            let link = format!(
                "{}/reset/{}/",
                self.config.server.base_url.trim_end_matches('/'),
                token
            );
            Email::password_reset(&user.email, &user.username, &link)
        };

        if let Err(e) = self.mailer.send(&message).await {
            warn!("Failed to send password reset email: {}", e);
        }
        Ok(())
    }

    /// Whether a reset token can still be used.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn reset_token_valid(&self, token: &str, now: DateTime<Utc>) -> Result<bool> {
        let user = self
            .storage
            .lock()
            .await
            .find_password_reset(&hash_token(token), now)?;
        Ok(user.is_some())
    }

    /// Set a new password through a reset token.
    ///
    /// The token, every other pending token and all sessions of the user are
    /// invalidated.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for an invalid token, mismatched
    /// passwords or a policy violation.
    pub async fn reset_password(
        &self,
        token: &str,
        password1: &str,
        password2: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let user_id = self
            .storage
            .lock()
            .await
            .find_password_reset(&hash_token(token), now)?
            .ok_or_else(|| Error::field(ValidationErrors::NON_FIELD, INVALID_RESET_LINK))?;

        if password1 != password2 {
            return Err(Error::field(
                "new_password2",
                "The two password fields didn't match.",
            ));
        }
        if let Some(message) = self.password_policy.violation(password1) {
            return Err(Error::field("new_password1", message));
        }

        let password = password1.to_string();
        let password_hash = blocking(move || hash_password(&password)).await??;
        let storage = self.storage.lock().await;
        storage.set_password_hash(user_id, &password_hash)?;
        storage.clear_credentials_state(user_id)?;
        info!("Password reset for user {}", user_id);
        Ok(())
    }

    /// Accounts, optionally filtered by role.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
        self.storage.lock().await.list_users(role)
    }

    /// Patients, for doctors and admins.
    ///
    /// # Errors
    ///
    /// Returns `Error::PermissionDenied` for other roles.
    pub async fn patients(&self, viewer: &User) -> Result<Vec<User>> {
        if let Err(e) = viewer.require_role(&STAFF_ROLES) {
            warn!("{} denied access to the patient list", viewer.username);
            return Err(e);
        }
        self.list_users(Some(Role::Patient)).await
    }

    /// Look up an account by username.
    ///
    /// # Errors
    ///
    /// Returns a field error on `username` if the user does not exist.
    pub async fn user_by_username(&self, username: &str) -> Result<User> {
        find_by_username(&*self.storage.lock().await, username)
    }

    /// Clear a lockout by username.
    ///
    /// # Errors
    ///
    /// Returns a field error on `username` if the user does not exist.
    pub async fn unlock_user(&self, username: &str) -> Result<User> {
        let storage = self.storage.lock().await;
        let user = find_by_username(&storage, username)?;
        storage.unlock_user(user.id)?;
        info!("Unlocked account {}", user.username);
        require_user(&storage, user.id)
    }

    // === Records ===

    /// Log a record for `user`.
    ///
    /// A weight-goal notification is raised when the record has a weight and
    /// a goal is known.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for out-of-range values.
    pub async fn add_record(
        &self,
        user: &User,
        input: &RecordInput,
        now: DateTime<Utc>,
    ) -> Result<HealthRecord> {
        input.validate()?;
        let storage = self.storage.lock().await;
        let record = storage.insert_record(user.id, input, Some(user.id), now)?;
        notify_weight_goal(&storage, user, &record, now)?;
        info!("User {} logged a record for {}", user.username, record.date);
        Ok(record)
    }

    /// Edit a record the user may access.
    ///
    /// Besides the weight-goal notification, a change of at least
    /// [`MILESTONE_STEP_KG`] raises a milestone notification for the owner.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound`, `Error::PermissionDenied` or
    /// `Error::Validation`.
    pub async fn update_record(
        &self,
        user: &User,
        id: i64,
        input: &RecordInput,
        now: DateTime<Utc>,
    ) -> Result<HealthRecord> {
        input.validate()?;
        let storage = self.storage.lock().await;
        let previous = accessible_record(&storage, user, id)?;
        let record = storage.update_record(id, input, Some(user.id), now)?;

        let owner = if previous.user_id == user.id {
            user.clone()
        } else {
            require_user(&storage, previous.user_id)?
        };
        notify_weight_goal(&storage, &owner, &record, now)?;
        if let (Some(before), Some(after)) = (previous.weight, record.weight) {
            if let Some(milestone) =
                NewNotification::weight_milestone(owner.id, before, after, MILESTONE_STEP_KG)
            {
                storage.insert_notification(&milestone, now)?;
            }
        }
        info!("User {} edited record {}", user.username, id);
        Ok(record)
    }

    /// A record the user may access.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` or `Error::PermissionDenied`.
    pub async fn record(&self, user: &User, id: i64) -> Result<HealthRecord> {
        let storage = self.storage.lock().await;
        accessible_record(&storage, user, id)
    }

    /// A user's newest records, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn recent_records(&self, user: &User, limit: usize) -> Result<Vec<HealthRecord>> {
        self.storage.lock().await.recent_records(user.id, limit)
    }

    /// Dashboard analytics for `user`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn dashboard(&self, user: &User, today: NaiveDate) -> Result<Dashboard> {
        let records = self.storage.lock().await.records_for_user(user.id)?;
        Ok(Dashboard::build(user, &records, today))
    }

    // === Notifications ===

    /// A user's notifications, newest first; all of them become read.
    ///
    /// The returned list shows the read state from before the visit.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn notifications(&self, user: &User) -> Result<Vec<Notification>> {
        let storage = self.storage.lock().await;
        let notifications = storage.list_notifications(user.id)?;
        storage.mark_all_notifications_read(user.id)?;
        Ok(notifications)
    }

    /// Unread notification count.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn unread_count(&self, user: &User) -> Result<i64> {
        self.storage.lock().await.unread_count(user.id)
    }

    /// Mark one of the user's notifications read.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` when the user has no such notification.
    pub async fn mark_notification_read(&self, user: &User, id: i64) -> Result<()> {
        if self
            .storage
            .lock()
            .await
            .mark_notification_read(user.id, id)?
        {
            Ok(())
        } else {
            Err(Error::NotFound {
                entity: "notification",
                id,
            })
        }
    }

    /// Mark every notification read.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_all_read(&self, user: &User) -> Result<usize> {
        self.storage.lock().await.mark_all_notifications_read(user.id)
    }

    /// Raise a check-in reminder unless the user already logged today.
    ///
    /// Returns whether a reminder was raised.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn daily_check_in(
        &self,
        user: &User,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let storage = self.storage.lock().await;
        if storage.has_record_on(user.id, today)? {
            return Ok(false);
        }
        storage.insert_notification(&NewNotification::check_in(user.id), now)?;
        Ok(true)
    }

    /// The user's reminder setting, if saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn reminder_setting(&self, user: &User) -> Result<Option<DailyReminderSetting>> {
        self.storage.lock().await.get_reminder_setting(user.id)
    }

    /// Save the user's reminder setting.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn save_reminder_setting(
        &self,
        user: &User,
        setting: &DailyReminderSetting,
    ) -> Result<()> {
        let setting = DailyReminderSetting {
            user_id: user.id,
            ..setting.clone()
        };
        self.storage.lock().await.save_reminder_setting(&setting)
    }

    /// Send the reminders due at `at` and return how many settings matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails. Mail delivery
    /// failures are only logged.
    pub async fn dispatch_reminders(&self, at: NaiveTime) -> Result<usize> {
        let pass = {
            let storage = self.storage.lock().await;
            let pass = reminders::collect_due(&storage, at, Utc::now())?;
            storage.purge_expired(Utc::now())?;
            pass
        };
        if !pass.emails.is_empty() {
            let delivered = reminders::deliver(self.mailer.as_ref(), &pass.emails).await;
            debug!("Delivered {}/{} reminder emails", delivered, pass.emails.len());
        }
        Ok(pass.matched)
    }

    /// Raise weekly summaries for active users.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn weekly_summaries(&self, today: NaiveDate, now: DateTime<Utc>) -> Result<usize> {
        reminders::weekly_summaries(&*self.storage.lock().await, today, now)
    }

    // === Exports ===

    /// CSV of the user's records, optionally within inclusive dates.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation or serialization fails.
    pub async fn export_csv(
        &self,
        user: &User,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<String> {
        let records = self
            .storage
            .lock()
            .await
            .records_between(user.id, start, end)?;
        records_csv::to_string(&records)
    }

    /// JSON export of `owner_id`'s records with a download file name.
    ///
    /// # Errors
    ///
    /// Returns `Error::PermissionDenied` when a non-staff user asks for
    /// someone else's records, `Error::NotFound` for an unknown owner.
    pub async fn export_json(
        &self,
        viewer: &User,
        owner_id: i64,
        now: DateTime<Local>,
    ) -> Result<(String, String)> {
        if !viewer.can_access_user(owner_id) {
            warn!("{} denied export of user {}", viewer.username, owner_id);
            return Err(Error::permission_denied(
                "You don't have permission to export these records.",
            ));
        }

        let storage = self.storage.lock().await;
        let owner = storage.get_user(owner_id)?.ok_or(Error::NotFound {
            entity: "user",
            id: owner_id,
        })?;
        let records = storage.records_for_user(owner_id)?;

        let mut usernames = HashMap::new();
        for id in records
            .iter()
            .flat_map(|r| [r.created_by, r.last_modified_by])
            .flatten()
        {
            if let std::collections::hash_map::Entry::Vacant(slot) = usernames.entry(id) {
                if let Some(u) = storage.get_user(id)? {
                    slot.insert(u.username);
                }
            }
        }

        let body = records_json::to_string(&records, &usernames)?;
        Ok((crate::export::json_filename(&owner.username, now), body))
    }

    /// Report over the user's newest records.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn report(&self, user: &User, today: NaiveDate) -> Result<Report> {
        let storage = self.storage.lock().await;
        let recent = storage.recent_records(user.id, REPORT_RECORD_LIMIT)?;
        let total = storage.count_records(user.id)?;
        Ok(Report::build(
            user,
            recent,
            usize::try_from(total).unwrap_or(0),
            today,
        ))
    }

    /// The report as PDF bytes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Export` when no converter is available or it fails.
    pub async fn report_pdf(&self, user: &User, today: NaiveDate) -> Result<Vec<u8>> {
        let html = self.report(user, today).await?.to_html();
        let converter = PdfConverter::new(self.config.export.pdf_converter.clone());
        blocking(move || converter.convert(&html)).await?
    }

    /// Weekly or monthly summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn summary(
        &self,
        user: &User,
        period: Period,
        today: NaiveDate,
    ) -> Result<PeriodSummary> {
        let start = today - Duration::days(period.days());
        let records = self
            .storage
            .lock()
            .await
            .records_between(user.id, Some(start), Some(today))?;
        Ok(PeriodSummary::build(period, &records, today))
    }

    // === Foods ===

    /// Every food recommendation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn foods(&self) -> Result<Vec<FoodRecommendation>> {
        self.storage.lock().await.list_foods()
    }

    /// Add a food recommendation.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for a blank name.
    pub async fn add_food(&self, food: NewFood, now: DateTime<Utc>) -> Result<i64> {
        let food = food.normalized()?;
        let id = self.storage.lock().await.insert_food(&food, now)?;
        info!("Added food recommendation {}", food.name);
        Ok(id)
    }

    // === Maintenance ===

    /// Database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn stats(&self) -> Result<StorageStats> {
        self.storage.lock().await.stats()
    }

    /// Backup manager for the configured directory.
    #[must_use]
    pub fn backups(&self) -> BackupManager {
        BackupManager::new(self.config.backup_dir(), self.config.backup.max_backups)
    }

    /// Write a backup now.
    ///
    /// # Errors
    ///
    /// Returns `Error::Backup` if the backup cannot be written.
    pub async fn create_backup(&self, now: DateTime<Local>) -> Result<PathBuf> {
        let storage = self.storage.lock().await;
        self.backups().create(&storage, now)
    }

    /// Archives, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup directory cannot be read.
    pub fn list_backups(&self) -> Result<Vec<BackupEntry>> {
        self.backups().list()
    }

    /// Replace the database contents with a backup.
    ///
    /// # Errors
    ///
    /// Returns `Error::Restore` if the backup cannot be loaded.
    pub async fn restore_backup(&self, path: &Path) -> Result<BackupInfo> {
        let mut storage = self.storage.lock().await;
        self.backups().restore(&mut storage, path)
    }
}

/// Run CPU-bound or blocking work off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::internal(format!("blocking task failed: {e}")))
}

fn require_user(storage: &Storage, id: i64) -> Result<User> {
    storage
        .get_user(id)?
        .ok_or(Error::NotFound { entity: "user", id })
}

fn find_by_username(storage: &Storage, username: &str) -> Result<User> {
    storage
        .find_user_by_username(username)?
        .ok_or_else(|| Error::field("username", format!("No user named {username}.")))
}

fn accessible_record(storage: &Storage, user: &User, id: i64) -> Result<HealthRecord> {
    let record = storage.get_record(id)?.ok_or(Error::NotFound {
        entity: "health record",
        id,
    })?;
    if !user.can_access_record(&record) {
        warn!("{} denied access to record {}", user.username, id);
        return Err(Error::permission_denied(
            "You don't have permission to access this record.",
        ));
    }
    Ok(record)
}

fn notify_weight_goal(
    storage: &Storage,
    owner: &User,
    record: &HealthRecord,
    now: DateTime<Utc>,
) -> Result<()> {
    let Some(weight) = record.weight else {
        return Ok(());
    };
    if let Some(goal) = record.weight_goal.or(owner.goals.weight) {
        storage.insert_notification(&NewNotification::weight_goal(owner.id, weight, goal), now)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::mailer::test_support::RecordingMailer;

    pub const PASSWORD: &str = "Secret123";

    pub fn tracker() -> Tracker {
        tracker_with_mailer(Arc::new(RecordingMailer::default()))
    }

    pub fn tracker_with_mailer(mailer: Arc<dyn Mailer>) -> Tracker {
        Tracker::new(Storage::open_in_memory().unwrap(), Config::default(), mailer)
    }

    pub fn registration(username: &str) -> Registration {
        Registration {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            password1: PASSWORD.to_string(),
            password2: PASSWORD.to_string(),
        }
    }

    pub async fn user(tracker: &Tracker, username: &str, role: Role) -> User {
        tracker
            .create_user(&registration(username), role)
            .await
            .unwrap()
    }
}
