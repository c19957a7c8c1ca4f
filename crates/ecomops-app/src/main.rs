use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ecomops_api::{ApiClient, ReportFile};
use ecomops_app::provider::HttpAuthProvider;
use ecomops_app::store::FileTokenStore;
use ecomops_app::transport::ReqwestTransport;
use ecomops_app::{
    APP_VERSION, AppConfig, AppError, AppServices, CancellationToken, LoadOutcome, PageController,
    PageOpen, PollOutcome, ProgressPoller, ThreadSleeper, UploadOutcome, app_version,
    recovery_tokens_from_link,
};
use ecomops_auth::{AuthClient, Credentials};
use ecomops_core::{ReportType, UploadForm, Website};
use ecomops_ui::{ButtonGroup, Page, PageView, StatusMessage, Tone};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(
    name = "ecomops",
    version = APP_VERSION,
    about = "Seller reports: upload exports and read the sales dashboard"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an account; the password is read from stdin.
    Signup {
        #[arg(long)]
        email: String,
    },
    /// Sign in and cache the session tokens.
    Login {
        #[arg(long)]
        email: String,
    },
    /// Sign out and wipe the token cache.
    Logout,
    /// Send the signup confirmation email again.
    Resend {
        #[arg(long)]
        email: String,
    },
    /// Print the dashboard widgets.
    Dashboard {
        /// Also load the outstanding-by-website financial summary.
        #[arg(long)]
        financial: bool,
    },
    /// Upload a report export and follow its processing.
    Upload {
        #[arg(long)]
        website: String,
        #[arg(long = "report-type")]
        report_type: String,
        /// Reporting window start, `YYYY-MM-DD`.
        #[arg(long)]
        start: String,
        /// Reporting window end, `YYYY-MM-DD`.
        #[arg(long)]
        end: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long = "payment-type")]
        payment_type: Option<String>,
        /// Replace an existing report without asking.
        #[arg(long)]
        yes: bool,
    },
    /// Rebuild the dashboard summary and wait for it.
    Rebuild,
    /// Change the password of the signed-in account.
    ChangePassword,
    /// Email a password recovery link.
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    /// Set a new password using the link from the recovery email.
    ResetPassword {
        #[arg(long)]
        link: String,
    },
    /// Print the application version.
    Version,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Signup { .. } => "signup",
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::Resend { .. } => "resend",
            Self::Dashboard { .. } => "dashboard",
            Self::Upload { .. } => "upload",
            Self::Rebuild => "rebuild",
            Self::ChangePassword => "change-password",
            Self::ForgotPassword { .. } => "forgot-password",
            Self::ResetPassword { .. } => "reset-password",
            Self::Version => "version",
        }
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let cli = Cli::parse();
    if let Err(error) = run(cli.command) {
        eprintln!("ecomops: {error}");
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<(), AppError> {
    if let Command::Version = command {
        println!("ecomops {}", app_version());
        return Ok(());
    }

    let config = AppConfig::from_env()?;
    let services = build_services(&config)?;
    let poller = ProgressPoller::new(config.poll, Arc::new(ThreadSleeper));
    let cancel = CancellationToken::new();
    let assume_yes = matches!(command, Command::Upload { yes: true, .. });
    let mut view = TerminalView::new(assume_yes);
    info!(stage = "cli", action = "start", command = command.name(), version = app_version());

    match command {
        Command::Signup { email } => {
            let credentials = Credentials::new(email, prompt("Password")?);
            let mut page = PageController::new(Page::Signup, services, &mut view);
            succeeded(page.submit_signup(&credentials), "signup")
        }
        Command::Login { email } => {
            let credentials = Credentials::new(email, prompt("Password")?);
            let mut page = PageController::new(Page::Login, services, &mut view);
            succeeded(page.submit_login(&credentials), "login")
        }
        Command::Logout => {
            let mut page = PageController::new(Page::Dashboard, services, &mut view);
            if page.open() == PageOpen::Ready {
                page.logout();
            }
            Ok(())
        }
        Command::Resend { email } => {
            let mut page = PageController::new(Page::Signup, services, &mut view);
            succeeded(page.submit_resend(&email), "resend")
        }
        Command::Dashboard { financial } => {
            let mut page = PageController::new(Page::Dashboard, services, &mut view);
            if let PageOpen::Redirected(_) = page.open() {
                return Err(AppError::Failed("not logged in".to_string()));
            }
            match page.load_dashboard(financial) {
                LoadOutcome::Loaded(_) => Ok(()),
                LoadOutcome::Unavailable(reason) => Err(AppError::Failed(reason)),
                LoadOutcome::Redirected => Err(AppError::Failed("session ended".to_string())),
            }
        }
        Command::Upload {
            website,
            report_type,
            start,
            end,
            file,
            payment_type,
            ..
        } => {
            let form = UploadForm {
                website: selected(
                    ButtonGroup::new("website", Website::ALL.map(|site| site.as_str())),
                    &website,
                )?,
                report_type: selected(
                    ButtonGroup::new("report_type", ReportType::ALL.map(|kind| kind.as_str())),
                    &report_type,
                )?,
                start_date: start,
                end_date: end,
                payment_type,
            };
            let file = read_report(&file)?;

            let mut page = PageController::new(Page::Upload, services, &mut view);
            if let PageOpen::Redirected(_) = page.open() {
                return Err(AppError::Failed("not logged in".to_string()));
            }
            match page.submit_upload(&form, &file) {
                UploadOutcome::Uploaded(receipt) => {
                    match page.track_upload(&form, &receipt, &poller, &cancel) {
                        PollOutcome::Finished(_) | PollOutcome::Exhausted { .. } => Ok(()),
                        other => Err(AppError::Failed(format!("processing ended: {other:?}"))),
                    }
                }
                UploadOutcome::Declined => Ok(()),
                UploadOutcome::Invalid(message) | UploadOutcome::Failed(message) => {
                    Err(AppError::Failed(message))
                }
                UploadOutcome::Redirected => Err(AppError::Failed("session ended".to_string())),
            }
        }
        Command::Rebuild => {
            let mut page = PageController::new(Page::Dashboard, services, &mut view);
            if let PageOpen::Redirected(_) = page.open() {
                return Err(AppError::Failed("not logged in".to_string()));
            }
            match page.rebuild_summary(&poller, &cancel) {
                PollOutcome::Finished(_) => Ok(()),
                other => Err(AppError::Failed(format!("rebuild ended: {other:?}"))),
            }
        }
        Command::ChangePassword => {
            let mut page = PageController::new(Page::ChangePassword, services, &mut view);
            if let PageOpen::Redirected(_) = page.open() {
                return Err(AppError::Failed("not logged in".to_string()));
            }
            let current = prompt("Current password")?;
            let new_password = prompt("New password")?;
            succeeded(page.submit_change_password(&current, &new_password), "change-password")
        }
        Command::ForgotPassword { email } => {
            let mut page = PageController::new(Page::ForgotPassword, services, &mut view);
            succeeded(page.submit_forgot_password(&email), "forgot-password")
        }
        Command::ResetPassword { link } => {
            let (access, refresh) = recovery_tokens_from_link(&link).ok_or_else(|| {
                AppError::Usage("recovery link carries no session tokens".to_string())
            })?;
            services.auth.provider().set_session(&access, &refresh)?;
            let new_password = prompt("New password")?;
            let mut page = PageController::new(Page::ResetPassword, services, &mut view);
            succeeded(page.submit_reset_password(&new_password), "reset-password")
        }
        Command::Version => Ok(()),
    }
}

fn build_services(config: &AppConfig) -> Result<AppServices, AppError> {
    let (auth_url, anon_key) = config.auth_settings()?;
    let provider = HttpAuthProvider::new(auth_url, anon_key, config.http_timeout_ms)?;
    let transport = ReqwestTransport::new(config.http_timeout_ms)?;
    Ok(AppServices {
        auth: AuthClient::new(Arc::new(provider)),
        store: Arc::new(FileTokenStore::open(&config.token_file)?),
        api: ApiClient::new(&config.api_base, Arc::new(transport))?,
        reset_redirect: config.reset_redirect.clone(),
    })
}

fn read_report(path: &Path) -> Result<ReportFile, AppError> {
    let bytes = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    Ok(ReportFile::new(file_name, bytes))
}

fn selected(mut group: ButtonGroup, choice: &str) -> Result<String, AppError> {
    if !group.select(choice) {
        return Err(AppError::Usage(format!(
            "unknown {} '{choice}'",
            group.field().replace('_', " ")
        )));
    }
    Ok(group.value().unwrap_or(choice).to_string())
}

fn succeeded(ok: bool, command: &str) -> Result<(), AppError> {
    if ok {
        Ok(())
    } else {
        Err(AppError::Failed(format!("{command} did not succeed")))
    }
}

fn prompt(label: &str) -> Result<String, AppError> {
    eprint!("{label}: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Terminal rendition of a page: fragments and status on stdout, alerts
/// on stderr, confirmations on stdin.
struct TerminalView {
    assume_yes: bool,
}

impl TerminalView {
    fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl PageView for TerminalView {
    fn set_html(&mut self, element_id: &str, html: &str) {
        let text = strip_tags(html);
        if text.contains('\n') {
            println!("[{element_id}]\n{text}");
        } else {
            println!("[{element_id}] {text}");
        }
    }

    fn set_status(&mut self, message: StatusMessage) {
        let prefix = match message.tone {
            Tone::Success => "ok",
            Tone::Error => "error",
            Tone::Info => "..",
        };
        println!("{prefix}: {}", message.text);
    }

    fn alert(&mut self, message: &str) {
        eprintln!("! {message}");
    }

    fn confirm(&mut self, message: &str) -> bool {
        eprintln!("{message}");
        if self.assume_yes {
            eprintln!("[y/N] y (--yes)");
            return true;
        }
        eprint!("[y/N] ");
        let _ = io::stderr().flush();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }

    fn redirect(&mut self, page: Page) {
        println!("-> {}", page.path());
    }
}

fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut tag = String::new();
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                if tag == "/li" || tag == "/div" || tag == "/h3" {
                    text.push('\n');
                }
            }
            _ if in_tag => tag.push(c),
            _ => text.push(c),
        }
    }
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .trim_end()
        .to_string()
}
