//! Staff desk - line console for looking up guests and registering drinks
//!
//! Talks to a running gateway over HTTP, or with `--offline` to an
//! in-process ledger seeded from the config file.
//!
//! Commands once logged in:
//! - `<code>`        typed code (non-alphanumerics dropped, cut to 6)
//! - `scan <code>`   scanner payload (trim + uppercase only)
//! - `+`             register a drink for the guest on screen
//! - `back`          back to the scanner
//! - `logout`, `quit`
//!
//! A bare word that is also a well-formed code (`logout` is six letters) is
//! looked up first and only runs as a command when no guest holds that code.

use clap::Parser;
use drinks_gateway::domain::{parse_code, DrinksError, GuestRecord, InputSource};
use drinks_gateway::infra::Config;
use drinks_gateway::io::RemoteBackend;
use drinks_gateway::services::{Authenticator, GuestLedger, GuestStore, Session, SessionGate};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Drinks desk - staff console for the drinks gateway
#[derive(Parser, Debug)]
#[command(name = "drinks-desk", version, about)]
struct Args {
    /// Gateway base URL
    #[arg(long, default_value = "http://127.0.0.1:5001")]
    url: String,

    /// Run against an in-process ledger instead of a gateway
    #[arg(long)]
    offline: bool,

    /// Config file for offline mode (seeds and credentials)
    #[arg(short, long)]
    config: Option<String>,

    /// Log in at startup with this email
    #[arg(long)]
    email: Option<String>,

    /// Password for --email
    #[arg(long)]
    password: Option<String>,

    /// HTTP timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Login { email: String, password: String },
    Scan(String),
    Typed(String),
    Drink,
    Back,
    Logout,
    Help,
    Quit,
    /// Word that reads both as a command and as a guest code
    CodeOrCommand(String, Box<Command>),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    match parse_keyword(line) {
        Command::Typed(raw) => Command::Typed(raw),
        command if parse_code(line, InputSource::Scanned).is_ok() => {
            Command::CodeOrCommand(line.to_string(), Box::new(command))
        }
        command => command,
    }
}

fn parse_keyword(line: &str) -> Command {
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    match head.to_ascii_lowercase().as_str() {
        "+" | "drink" => Command::Drink,
        "back" => Command::Back,
        "logout" => Command::Logout,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "scan" => Command::Scan(rest.to_string()),
        "login" => {
            let (email, password) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            Command::Login { email: email.to_string(), password: password.trim().to_string() }
        }
        _ => Command::Typed(line.to_string()),
    }
}

const HELP: &str = "\
login <email> <password>   open a session
<code>                     look up a typed code
scan <payload>             look up a scanned code
+                          register a drink for the guest on screen
back                       back to the scanner
logout                     close the session (a guest coded LOGOUT is shown instead)
quit                       leave";

fn render_card(guest: &GuestRecord) -> String {
    let status = if guest.can_consume_more() {
        format!("{} left", guest.remaining())
    } else {
        "LIMIT REACHED".to_string()
    };
    format!(
        "{} [{}]\n  drinks: {} / {}  ({})",
        guest.display_name(),
        guest.code,
        guest.consumed,
        guest.allowance,
        status
    )
}

enum Flow {
    Continue,
    Quit,
}

struct Desk {
    auth: Arc<dyn Authenticator>,
    store: Arc<dyn GuestStore>,
    session: Session,
    current: Option<GuestRecord>,
}

impl Desk {
    fn new(auth: Arc<dyn Authenticator>, store: Arc<dyn GuestStore>) -> Self {
        Self { auth, store, session: Session::new(), current: None }
    }

    fn prompt(&self) -> &'static str {
        match (self.session.is_authenticated(), &self.current) {
            (false, _) => "login> ",
            (true, None) => "scan> ",
            (true, Some(_)) => "guest> ",
        }
    }

    /// Apply one command, returning the text to show
    async fn handle(&mut self, command: Command) -> (Flow, String) {
        let command = match command {
            Command::CodeOrCommand(raw, fallback) => match self.show_if_known(&raw).await {
                Some(card) => return (Flow::Continue, card),
                None => *fallback,
            },
            command => command,
        };

        let output = match command {
            Command::Quit => return (Flow::Quit, String::new()),
            Command::Help => HELP.to_string(),
            Command::Login { email, password } => {
                match self.session.login(self.auth.as_ref(), &email, &password).await {
                    Ok(()) => "Logged in. Scan or type a guest code.".to_string(),
                    Err(e) => e.to_string(),
                }
            }
            _ if !self.session.is_authenticated() => DrinksError::Unauthorized.to_string(),
            Command::Logout => {
                self.session.logout(self.auth.as_ref()).await;
                self.current = None;
                "Logged out.".to_string()
            }
            Command::Back => {
                self.current = None;
                "Ready to scan.".to_string()
            }
            Command::Scan(raw) => self.show(&raw, InputSource::Scanned).await,
            Command::Typed(raw) | Command::CodeOrCommand(raw, _) => {
                self.show(&raw, InputSource::Manual).await
            }
            Command::Drink => self.drink().await,
        };
        (Flow::Continue, output)
    }

    async fn show(&mut self, raw: &str, source: InputSource) -> String {
        let code = match parse_code(raw, source) {
            Ok(code) => code,
            Err(e) => return e.to_string(),
        };

        match self.store.lookup(&code).await {
            Ok(guest) => {
                let card = render_card(&guest);
                self.current = Some(guest);
                card
            }
            Err(e) => e.to_string(),
        }
    }

    /// Card for `raw` when a guest holds it, `None` when there is no such guest
    async fn show_if_known(&mut self, raw: &str) -> Option<String> {
        if !self.session.is_authenticated() {
            return None;
        }
        let code = parse_code(raw, InputSource::Manual).ok()?;

        match self.store.lookup(&code).await {
            Ok(guest) => {
                let card = render_card(&guest);
                self.current = Some(guest);
                Some(card)
            }
            Err(DrinksError::GuestNotFound { .. }) => None,
            Err(e) => Some(e.to_string()),
        }
    }

    async fn drink(&mut self) -> String {
        let Some(code) = self.current.as_ref().map(|guest| guest.code.clone()) else {
            return "No guest on screen.".to_string();
        };

        match self.store.register_drink(&code).await {
            Ok(guest) => {
                let card = format!("Drink registered.\n{}", render_card(&guest));
                self.current = Some(guest);
                card
            }
            Err(e) => e.to_string(),
        }
    }
}

fn build_desk(args: &Args) -> anyhow::Result<Desk> {
    if args.offline {
        let config = Config::load_from_path(&Config::resolve_config_path(args.config.as_deref()));
        let ledger = Arc::new(GuestLedger::from_config(&config));
        let gate = Arc::new(SessionGate::from_config(&config));
        Ok(Desk::new(gate, ledger))
    } else {
        let backend = Arc::new(RemoteBackend::new(&args.url, Duration::from_millis(args.timeout_ms))?);
        Ok(Desk::new(backend.clone(), backend))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Console output goes to stdout, keep logs quiet unless asked
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut desk = build_desk(&args)?;

    if args.offline {
        println!("drinks-desk (offline)");
    } else {
        println!("drinks-desk -> {}", args.url);
    }

    if let (Some(email), Some(password)) = (&args.email, &args.password) {
        let command = Command::Login { email: email.clone(), password: password.clone() };
        let (_, output) = desk.handle(command).await;
        println!("{}", output);
    } else {
        println!("Type `login <email> <password>` or `help`.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}", desk.prompt());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let (flow, output) = desk.handle(parse_command(&line)).await;
        if !output.is_empty() {
            println!("{}", output);
        }
        if let Flow::Quit = flow {
            break;
        }
    }

    desk.session.logout(desk.auth.as_ref()).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_desk() -> Desk {
        let config = Config::default();
        Desk::new(
            Arc::new(SessionGate::from_config(&config)),
            Arc::new(GuestLedger::from_config(&config)),
        )
    }

    async fn run(desk: &mut Desk, line: &str) -> String {
        desk.handle(parse_command(line)).await.1
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("+"), Command::Drink);
        assert_eq!(parse_command(" BACK "), Command::Back);
        assert_eq!(parse_command("scan  abc123 "), Command::Scan("abc123".to_string()));
        assert_eq!(parse_command("ab-12"), Command::Typed("ab-12".to_string()));
        assert_eq!(
            parse_command("logout"),
            Command::CodeOrCommand("logout".to_string(), Box::new(Command::Logout))
        );
        assert_eq!(
            parse_command("login atendente@teste.com 123456"),
            Command::Login {
                email: "atendente@teste.com".to_string(),
                password: "123456".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_requires_login() {
        let mut desk = offline_desk();
        assert_eq!(run(&mut desk, "ABC123").await, "Not logged in");
        assert_eq!(run(&mut desk, "login atendente@teste.com nope").await, "Invalid credentials");
        assert_eq!(desk.prompt(), "login> ");
    }

    #[tokio::test]
    async fn test_guest_flow_until_limit() {
        let mut desk = offline_desk();
        run(&mut desk, "login atendente@teste.com 123456").await;
        assert_eq!(desk.prompt(), "scan> ");

        let card = run(&mut desk, "abc123").await;
        assert!(card.contains("João Silva [ABC123]"));
        assert!(card.contains("0 / 3"));
        assert_eq!(desk.prompt(), "guest> ");

        for _ in 0..3 {
            assert!(run(&mut desk, "+").await.starts_with("Drink registered."));
        }
        assert!(desk.current.as_ref().is_some_and(|g| !g.can_consume_more()));
        assert_eq!(run(&mut desk, "+").await, "Guest ABC123 reached the drink limit (3)");

        run(&mut desk, "back").await;
        assert_eq!(run(&mut desk, "+").await, "No guest on screen.");
    }

    #[tokio::test]
    async fn test_errors_are_shown() {
        let mut desk = offline_desk();
        run(&mut desk, "login atendente@teste.com 123456").await;

        assert_eq!(run(&mut desk, "ZZZ999").await, "Guest ZZZ999 not found");
        assert!(run(&mut desk, "ab-12").await.starts_with("Invalid code"));
        assert!(run(&mut desk, "scan usr_a49fd8").await.starts_with("Invalid code"));
        assert!(run(&mut desk, "scan  def456 ").await.contains("Guest DEF456 [DEF456]"));
    }

    #[tokio::test]
    async fn test_guest_code_that_spells_a_command() {
        let config = Config::default().with_guests(vec![GuestRecord::new(
            "LOGOUT".parse().unwrap(),
            Some("Ana Costa"),
            2,
        )]);
        let mut desk = Desk::new(
            Arc::new(SessionGate::from_config(&config)),
            Arc::new(GuestLedger::from_config(&config)),
        );
        run(&mut desk, "login atendente@teste.com 123456").await;

        let card = run(&mut desk, "logout").await;
        assert!(card.contains("Ana Costa [LOGOUT]"));
        assert!(desk.session.is_authenticated());
        assert!(run(&mut desk, "+").await.starts_with("Drink registered."));
    }

    #[tokio::test]
    async fn test_logout_clears_screen() {
        let mut desk = offline_desk();
        run(&mut desk, "login atendente@teste.com 123456").await;
        run(&mut desk, "XYZ789").await;
        assert_eq!(run(&mut desk, "logout").await, "Logged out.");
        assert!(desk.current.is_none());
        assert_eq!(run(&mut desk, "XYZ789").await, "Not logged in");
    }
}
