use log::{error, info, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tauri::{AppHandle, Emitter, Manager};

pub mod api;
pub mod progress;

pub use api::{ApiError, BackendClient, LoginReply};
pub use progress::{ProgressSnapshot, ProgressStore};

// App name - different for dev vs prod to easily distinguish them
#[cfg(debug_assertions)]
const APP_NAME: &str = "Insight Chat (Dev)";
#[cfg(not(debug_assertions))]
const APP_NAME: &str = "Insight Chat";

/// Shown in place of a bot reply when the /chat request fails for any reason.
pub const FALLBACK_BOT_MESSAGE: &str =
    "Sorry, I'm having trouble connecting or processing your request. Please try again later.";

/// Announced in the transcript each time a badge is earned.
pub const BADGE_BOT_MESSAGE: &str =
    "🎉 Congratulations! You earned a 'Marketing Explorer' badge!";

/// Trivia feature greeting. The quiz itself is not implemented.
pub const QUIZ_WELCOME_MESSAGE: &str = "Welcome to the Marketing Trivia! I'll ask you some \
    questions. For instance, 'Which digital marketing service focuses on content and SEO?'";

/// Inline rejection for signup input that fails local validation.
pub const SIGNUP_TOO_SHORT_MESSAGE: &str =
    "Username must be at least 3 characters and password at least 6 characters.";

/// Contextual notice shown on the login form after a successful signup.
pub const SIGNUP_SWITCH_MESSAGE: &str =
    "Account created! Please log in with your new credentials.";

/// Generic text for transport-level failures on the auth endpoints.
pub const GENERIC_NETWORK_MESSAGE: &str =
    "Unable to reach the server. Please try again later.";

// The active page session. The frontend picks the mode once at page load;
// chat transcript and auth view state live in their own statics so commands
// never hold the mode lock across a request.
static CURRENT_MODE: Lazy<Mutex<Option<PageMode>>> = Lazy::new(|| Mutex::new(None));
static AUTH_STATE: Lazy<Mutex<AuthState>> = Lazy::new(|| Mutex::new(AuthState::default()));
static TRANSCRIPT: Lazy<Mutex<Transcript>> = Lazy::new(|| Mutex::new(Transcript::default()));

/// Which page the webview loaded. Chosen explicitly by the frontend at
/// startup rather than by probing for elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageMode {
    Auth,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// One displayed chat message. Text may embed simple markup and is rendered
/// verbatim by the frontend.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub sent_at: String,
}

/// Append-only message list for the current chat page session. Never
/// persisted; a page reload starts empty.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    fn append(&mut self, text: impl Into<String>, sender: Sender) -> TranscriptEntry {
        let entry = TranscriptEntry {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            sender,
            sent_at: chrono::Utc::now().to_rfc3339(),
        };
        self.entries.push(entry.clone());
        entry
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthView {
    Login,
    Signup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub text: String,
    pub kind: NoticeKind,
}

impl Notice {
    fn new(text: impl Into<String>, kind: NoticeKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// View state for the login/signup page: which form is showing and the
/// per-form notice areas. Form field contents stay in the webview.
#[derive(Debug, Clone, Serialize)]
pub struct AuthState {
    pub active_view: AuthView,
    pub login_notice: Option<Notice>,
    pub signup_notice: Option<Notice>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            active_view: AuthView::Login,
            login_notice: None,
            signup_notice: None,
        }
    }
}

impl AuthState {
    /// Swap the visible form and clear both notice areas. Idempotent.
    pub fn toggle(&mut self, target: AuthView) {
        self.active_view = target;
        self.login_notice = None;
        self.signup_notice = None;
    }
}

/// Result of a signup or login attempt, including the auth view state after
/// the attempt so the frontend can render in one pass.
#[derive(Debug, Clone, Serialize)]
pub struct AuthOutcome {
    pub success: bool,
    pub message: String,
    pub kind: NoticeKind,
    pub redirect: Option<String>,
    pub view: AuthState,
}

/// Everything one send added to the transcript, plus the counters afterward.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub entries: Vec<TranscriptEntry>,
    pub progress: ProgressSnapshot,
}

// ============== Config ==============

fn default_api_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
        }
    }
}

/// Get the app data directory name based on build type.
/// In debug builds, use "insight-chat-dev" to separate data from production.
fn get_app_data_dir_name() -> &'static str {
    if cfg!(debug_assertions) {
        "insight-chat-dev"
    } else {
        "insight-chat"
    }
}

fn get_data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(get_app_data_dir_name());
    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

fn get_config_path() -> PathBuf {
    get_data_dir().join("config.json")
}

fn get_progress_db_path() -> PathBuf {
    get_data_dir().join("progress.db")
}

/// Load app config from the config file, falling back to defaults.
#[tauri::command]
fn load_app_config() -> Result<AppConfig, String> {
    let path = get_config_path();
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let json =
        std::fs::read_to_string(&path).map_err(|e| format!("Failed to read config: {}", e))?;
    let config: AppConfig =
        serde_json::from_str(&json).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(config)
}

/// Save app config to the config file.
#[tauri::command]
fn save_app_config(config: AppConfig) -> Result<(), String> {
    let path = get_config_path();
    let json = serde_json::to_string_pretty(&config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(&path, json).map_err(|e| format!("Failed to write config: {}", e))?;
    Ok(())
}

fn backend_client() -> Result<BackendClient, String> {
    let config = load_app_config()?;
    Ok(BackendClient::new(config.api_base_url))
}

fn progress_store() -> Result<ProgressStore, String> {
    ProgressStore::open(get_progress_db_path()).map_err(|e| e.to_string())
}

// ============== Core rounds ==============
//
// The command layer is a thin wrapper over these so tests can drive the
// same logic against a mock backend without a running webview.

/// Local signup validation; failures never reach the backend.
pub fn validate_signup(username: &str, password: &str) -> Result<(), &'static str> {
    if username.chars().count() < 3 || password.chars().count() < 6 {
        Err(SIGNUP_TOO_SHORT_MESSAGE)
    } else {
        Ok(())
    }
}

fn auth_error_text(err: &ApiError) -> String {
    match err {
        ApiError::Backend { message, .. } => message.clone(),
        ApiError::Network(_) => GENERIC_NETWORK_MESSAGE.to_string(),
    }
}

/// Run one signup attempt against the backend and fold the result into the
/// auth view state. On success the active view switches to the login form.
pub async fn signup_round(
    client: &BackendClient,
    state: &Mutex<AuthState>,
    username: &str,
    password: &str,
) -> AuthOutcome {
    if let Err(message) = validate_signup(username, password) {
        let mut auth = state.lock();
        auth.signup_notice = Some(Notice::new(message, NoticeKind::Error));
        return AuthOutcome {
            success: false,
            message: message.to_string(),
            kind: NoticeKind::Error,
            redirect: None,
            view: auth.clone(),
        };
    }

    match client.signup(username, password).await {
        Ok(message) => {
            let mut auth = state.lock();
            auth.active_view = AuthView::Login;
            auth.signup_notice = None;
            // Server confirmation first, then the switch hint, in one notice.
            auth.login_notice = Some(Notice::new(
                format!("{} {}", message, SIGNUP_SWITCH_MESSAGE),
                NoticeKind::Success,
            ));
            AuthOutcome {
                success: true,
                message,
                kind: NoticeKind::Success,
                redirect: None,
                view: auth.clone(),
            }
        }
        Err(err) => {
            if matches!(err, ApiError::Network(_)) {
                error!("signup request failed: {}", err);
            }
            let message = auth_error_text(&err);
            let mut auth = state.lock();
            auth.signup_notice = Some(Notice::new(message.clone(), NoticeKind::Error));
            AuthOutcome {
                success: false,
                message,
                kind: NoticeKind::Error,
                redirect: None,
                view: auth.clone(),
            }
        }
    }
}

/// Run one login attempt. No local validation; a successful response may
/// carry a redirect target the frontend navigates to.
pub async fn login_round(
    client: &BackendClient,
    state: &Mutex<AuthState>,
    username: &str,
    password: &str,
) -> AuthOutcome {
    match client.login(username, password).await {
        Ok(reply) => {
            let mut auth = state.lock();
            auth.login_notice = Some(Notice::new(reply.message.clone(), NoticeKind::Success));
            AuthOutcome {
                success: true,
                message: reply.message,
                kind: NoticeKind::Success,
                redirect: reply.redirect,
                view: auth.clone(),
            }
        }
        Err(err) => {
            if matches!(err, ApiError::Network(_)) {
                error!("login request failed: {}", err);
            }
            let message = auth_error_text(&err);
            let mut auth = state.lock();
            auth.login_notice = Some(Notice::new(message.clone(), NoticeKind::Error));
            AuthOutcome {
                success: false,
                message,
                kind: NoticeKind::Error,
                redirect: None,
                view: auth.clone(),
            }
        }
    }
}

fn emit_chat_entry(app: Option<&AppHandle>, entry: &TranscriptEntry) {
    if let Some(app) = app {
        let _ = app.emit("chat-message", entry);
    }
}

/// Run one chat turn: append the user message, post it, append the reply
/// (or the fallback apology), and update the counters for qualifying
/// replies. Trimmed-empty input is a no-op with no network call.
///
/// Overlapping turns are deliberately not serialized; concurrent sends
/// interleave in arrival order.
pub async fn chat_round(
    client: &BackendClient,
    store: &Mutex<ProgressStore>,
    transcript: &Mutex<Transcript>,
    app: Option<&AppHandle>,
    text: &str,
) -> Result<ChatTurn, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        let progress = store.lock().snapshot().map_err(|e| e.to_string())?;
        return Ok(ChatTurn {
            entries: Vec::new(),
            progress,
        });
    }

    let mut appended = Vec::new();
    {
        let entry = transcript.lock().append(trimmed, Sender::User);
        emit_chat_entry(app, &entry);
        appended.push(entry);
    }

    match client.chat(trimmed).await {
        Ok(reply) => {
            let entry = transcript.lock().append(&reply, Sender::Bot);
            emit_chat_entry(app, &entry);
            appended.push(entry);

            if progress::is_insight_reply(&reply) {
                let outcome = store.lock().record_insight().map_err(|e| e.to_string())?;
                if outcome.badge_awarded {
                    let badge = transcript.lock().append(BADGE_BOT_MESSAGE, Sender::Bot);
                    emit_chat_entry(app, &badge);
                    appended.push(badge);
                }
                if let Some(app) = app {
                    let _ = app.emit("progress-updated", outcome.snapshot);
                }
            }
        }
        Err(err) => {
            warn!("chat request failed: {}", err);
            let entry = transcript.lock().append(FALLBACK_BOT_MESSAGE, Sender::Bot);
            emit_chat_entry(app, &entry);
            appended.push(entry);
        }
    }

    let progress = store.lock().snapshot().map_err(|e| e.to_string())?;
    Ok(ChatTurn {
        entries: appended,
        progress,
    })
}

// ============== Commands ==============

fn require_mode(expected: PageMode) -> Result<(), String> {
    match *CURRENT_MODE.lock() {
        Some(mode) if mode == expected => Ok(()),
        Some(other) => Err(format!("command unavailable in {:?} mode", other)),
        None => Err("page not activated".to_string()),
    }
}

/// Called once by the frontend after it decides which page it loaded.
/// Re-activating resets the per-page state (page reload semantics).
#[tauri::command]
fn activate_page(mode: PageMode) -> Result<(), String> {
    {
        let mut current = CURRENT_MODE.lock();
        *current = Some(mode);
    }
    match mode {
        PageMode::Auth => *AUTH_STATE.lock() = AuthState::default(),
        PageMode::Chat => *TRANSCRIPT.lock() = Transcript::default(),
    }
    info!("page activated in {:?} mode", mode);
    Ok(())
}

#[tauri::command]
async fn submit_signup(username: String, password: String) -> Result<AuthOutcome, String> {
    require_mode(PageMode::Auth)?;
    let client = backend_client()?;
    Ok(signup_round(&client, &AUTH_STATE, &username, &password).await)
}

#[tauri::command]
async fn submit_login(
    app: AppHandle,
    username: String,
    password: String,
) -> Result<AuthOutcome, String> {
    require_mode(PageMode::Auth)?;
    let client = backend_client()?;
    let outcome = login_round(&client, &AUTH_STATE, &username, &password).await;
    if let Some(target) = &outcome.redirect {
        let _ = app.emit("auth-redirect", target.clone());
    }
    Ok(outcome)
}

#[tauri::command]
fn toggle_view(target: AuthView) -> Result<AuthState, String> {
    require_mode(PageMode::Auth)?;
    let mut auth = AUTH_STATE.lock();
    auth.toggle(target);
    Ok(auth.clone())
}

#[tauri::command]
fn auth_view_state() -> Result<AuthState, String> {
    require_mode(PageMode::Auth)?;
    Ok(AUTH_STATE.lock().clone())
}

#[tauri::command]
async fn send_message(app: AppHandle, text: String) -> Result<ChatTurn, String> {
    require_mode(PageMode::Chat)?;
    let client = backend_client()?;
    let store = Mutex::new(progress_store()?);
    chat_round(&client, &store, &TRANSCRIPT, Some(&app), &text).await
}

/// Placeholder trivia feature: greets and does nothing further.
#[tauri::command]
fn trigger_quiz(app: AppHandle) -> Result<TranscriptEntry, String> {
    require_mode(PageMode::Chat)?;
    let entry = TRANSCRIPT.lock().append(QUIZ_WELCOME_MESSAGE, Sender::Bot);
    emit_chat_entry(Some(&app), &entry);
    Ok(entry)
}

#[tauri::command]
fn load_transcript() -> Result<Vec<TranscriptEntry>, String> {
    require_mode(PageMode::Chat)?;
    Ok(TRANSCRIPT.lock().entries().to_vec())
}

/// Current counters for UI init, read straight from the store.
#[tauri::command]
fn load_progress() -> Result<ProgressSnapshot, String> {
    require_mode(PageMode::Chat)?;
    progress_store()?.snapshot().map_err(|e| e.to_string())
}

// ============== App setup ==============

fn setup_app(app: &tauri::App) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(window) = app.get_webview_window("main") {
        let _ = window.set_title(APP_NAME);
    }
    info!("{} starting, data dir: {:?}", APP_NAME, get_data_dir());
    Ok(())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(
            tauri_plugin_log::Builder::new()
                .target(tauri_plugin_log::Target::new(
                    tauri_plugin_log::TargetKind::LogDir {
                        file_name: Some("insight-chat".into()),
                    },
                ))
                .max_file_size(5_000_000)
                .build(),
        )
        .setup(|app| setup_app(app))
        .invoke_handler(tauri::generate_handler![
            activate_page,
            submit_signup,
            submit_login,
            toggle_view,
            auth_view_state,
            send_message,
            trigger_quiz,
            load_transcript,
            load_progress,
            save_app_config,
            load_app_config
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signup_validation_boundaries() {
        assert!(validate_signup("ab", "longenough").is_err());
        assert!(validate_signup("abc", "12345").is_err());
        assert!(validate_signup("abc", "123456").is_ok());
        assert!(validate_signup("", "").is_err());
    }

    #[test]
    fn toggle_clears_both_notices() {
        let mut auth = AuthState::default();
        auth.login_notice = Some(Notice::new("bad password", NoticeKind::Error));
        auth.toggle(AuthView::Signup);
        assert_eq!(auth.active_view, AuthView::Signup);
        assert!(auth.login_notice.is_none());
        assert!(auth.signup_notice.is_none());

        auth.signup_notice = Some(Notice::new("taken", NoticeKind::Error));
        auth.toggle(AuthView::Login);
        assert_eq!(auth.active_view, AuthView::Login);
        assert!(auth.login_notice.is_none());
        assert!(auth.signup_notice.is_none());
    }

    // The only in-crate test that touches CURRENT_MODE; integration tests
    // run in their own binary.
    #[test]
    fn progress_command_requires_chat_page() {
        assert_eq!(load_progress().unwrap_err(), "page not activated");
        activate_page(PageMode::Auth).unwrap();
        assert!(load_progress()
            .unwrap_err()
            .contains("unavailable in Auth mode"));
    }

    #[test]
    fn transcript_appends_in_order() {
        let mut transcript = Transcript::default();
        transcript.append("hi", Sender::User);
        transcript.append("Hello! I'm your Real Estate Chatbot.", Sender::Bot);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.entries()[0].sender, Sender::User);
        assert_eq!(transcript.entries()[0].text, "hi");
        assert_eq!(transcript.entries()[1].sender, Sender::Bot);
    }
}
