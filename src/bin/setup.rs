//! Interactive setup wizard.
//!
//! Asks for the bot token and the update source, then writes `config.toml`
//! to the project root (`RUSTBOT_ROOT`, or the current directory).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use rustbot_dispatch::config::Config;

// ── Config formatting ──────────────────────────────────────────────────────────

struct ConfigParams<'a> {
    tg_token: &'a str,
    handler_timeout_ms: u64,
    drop_pending_updates: bool,
    allowed_updates: &'a str,
    /// `None` selects long polling.
    webhook: Option<WebhookParams<'a>>,
}

struct WebhookParams<'a> {
    domain: &'a str,
    path: &'a str,
    port: u16,
    secret_token: &'a str,
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
fn format_config(p: &ConfigParams<'_>) -> String {
    let kinds: Vec<String> = p
        .allowed_updates
        .split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("\"{s}\""))
        .collect();
    let kinds_str = kinds.join(", ");

    let tg_token = p.tg_token;
    let handler_timeout_ms = p.handler_timeout_ms;
    let drop_pending_updates = p.drop_pending_updates;

    let source = match &p.webhook {
        Some(w) => {
            let path_line = if w.path.is_empty() {
                "# path = \"/hook\"  (defaults to a secret path)".to_owned()
            } else {
                format!("path = \"{}\"", w.path)
            };
            let secret_line = if w.secret_token.is_empty() {
                "# secret_token = \"...\"".to_owned()
            } else {
                format!("secret_token = \"{}\"", w.secret_token)
            };
            format!(
                r#"[webhook]
domain = "{}"
{path_line}
host = "0.0.0.0"
port = {}
{secret_line}
"#,
                w.domain, w.port
            )
        }
        None => r#"[polling]
timeout_secs = 50
limit = 100
"#
        .to_owned(),
    };

    format!(
        r#"[telegram]
bot_token = "{tg_token}"
handler_timeout_ms = {handler_timeout_ms}
webhook_reply = true

[launch]
drop_pending_updates = {drop_pending_updates}
allowed_updates = [{kinds_str}]

{source}
[context]
"#
    )
}

// ── CLI mode ───────────────────────────────────────────────────────────────────

fn run_cli(project_root: &Path) -> Result<()> {
    use std::io::{self, Write};

    println!("=== RustBot Dispatch Setup ===\n");

    let read_line = |prompt: &str| -> Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut buf = String::new();
        io::stdin().read_line(&mut buf)?;
        Ok(buf.trim().to_owned())
    };

    let or_default = |s: String, default: &str| {
        if s.is_empty() {
            default.to_owned()
        } else {
            s
        }
    };

    let tg_token = read_line("Telegram bot token: ")?;
    let handler_timeout_ms = or_default(read_line("Handler timeout in ms [90000]: ")?, "90000")
        .parse::<u64>()
        .context("Handler timeout must be a number")?;
    let drop_pending = read_line("Drop pending updates on launch? [y/N]: ")?;
    let allowed_updates = read_line("Allowed update kinds (comma-separated, empty = all): ")?;
    let mode = or_default(read_line("Update source (polling/webhook) [polling]: ")?, "polling");

    let (domain, path, port, secret_token);
    let webhook = if mode == "webhook" {
        domain = read_line("Public domain (e.g. https://example.com): ")?;
        path = read_line("Hook path (empty = secret path): ")?;
        port = or_default(read_line("Listen port [8443]: ")?, "8443")
            .parse::<u16>()
            .context("Port must be a number between 0 and 65535")?;
        secret_token = read_line("Secret token (optional): ")?;
        Some(WebhookParams {
            domain: &domain,
            path: &path,
            port,
            secret_token: &secret_token,
        })
    } else {
        None
    };

    let config = format_config(&ConfigParams {
        tg_token: &tg_token,
        handler_timeout_ms,
        drop_pending_updates: drop_pending.eq_ignore_ascii_case("y"),
        allowed_updates: &allowed_updates,
        webhook,
    });

    Config::parse(&config).context("Generated config is invalid")?;

    let config_path = project_root.join("config.toml");
    std::fs::write(&config_path, &config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;

    println!("\n✓  config.toml saved to {}", config_path.display());
    println!("   Run the bot with:  cargo run --bin rustbot-dispatch");
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    // Resolve project root: prefer RUSTBOT_ROOT env, fall back to cwd.
    let project_root =
        PathBuf::from(std::env::var("RUSTBOT_ROOT").unwrap_or_else(|_| ".".to_string()));

    run_cli(&project_root)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
