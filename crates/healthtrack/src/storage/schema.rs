//! `SQLite` schema definitions for healthtrack.
//!
//! Dates are stored as `YYYY-MM-DD`, times of day as `HH:MM` and timestamps
//! as RFC 3339 text.

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// SQL statement to create the users table.
pub const CREATE_USERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'PATIENT',
    is_verified INTEGER NOT NULL DEFAULT 0,
    age INTEGER,
    gender TEXT,
    weight_goal REAL,
    sleep_goal REAL,
    water_goal REAL,
    last_login_ip TEXT,
    failed_login_attempts INTEGER NOT NULL DEFAULT 0,
    account_locked_until TEXT,
    date_joined TEXT NOT NULL,
    last_login TEXT
)
";

/// SQL statement to create the health records table.
pub const CREATE_HEALTH_RECORDS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS health_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    date TEXT NOT NULL,
    sleep_hours REAL NOT NULL,
    water_intake REAL NOT NULL,
    weight REAL,
    height REAL,
    weight_goal REAL,
    mood TEXT NOT NULL,
    notes TEXT,
    created_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
    last_modified_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    last_modified TEXT NOT NULL
)
";

/// Records are almost always read per user in date order.
pub const CREATE_RECORDS_USER_DATE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_health_records_user_date ON health_records(user_id, date DESC)
";

/// SQL statement to create the notifications table.
pub const CREATE_NOTIFICATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    notification_type TEXT NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    is_read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    scheduled_for TEXT
)
";

/// SQL statement to create an index for per-user notification listing.
pub const CREATE_NOTIFICATIONS_USER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at DESC)
";

/// SQL statement to create the daily reminder settings table.
pub const CREATE_REMINDER_SETTINGS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS reminder_settings (
    user_id INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    reminder_time TEXT NOT NULL,
    send_email INTEGER NOT NULL DEFAULT 0,
    send_in_app INTEGER NOT NULL DEFAULT 1
)
";

/// SQL statement to create the food recommendations table.
pub const CREATE_FOOD_RECOMMENDATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS food_recommendations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    calories INTEGER,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the login sessions table.
pub const CREATE_SESSIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    token_hash TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    flash TEXT
)
";

/// SQL statement to create the password reset token table.
pub const CREATE_PASSWORD_RESETS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS password_resets (
    token_hash TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
)
";

/// Statements for schema version 1: accounts, records and notifications.
pub const V1_STATEMENTS: &[&str] = &[
    CREATE_USERS_TABLE,
    CREATE_HEALTH_RECORDS_TABLE,
    CREATE_RECORDS_USER_DATE_INDEX,
    CREATE_NOTIFICATIONS_TABLE,
    CREATE_NOTIFICATIONS_USER_INDEX,
    CREATE_REMINDER_SETTINGS_TABLE,
    CREATE_FOOD_RECOMMENDATIONS_TABLE,
];

/// Statements for schema version 2: server-side sessions and password resets.
pub const V2_STATEMENTS: &[&str] = &[CREATE_SESSIONS_TABLE, CREATE_PASSWORD_RESETS_TABLE];

/// Domain tables in the order rows must be deleted to respect foreign keys.
pub const DOMAIN_TABLES_DELETE_ORDER: &[&str] = &[
    "sessions",
    "password_resets",
    "notifications",
    "reminder_settings",
    "health_records",
    "food_recommendations",
    "users",
];
