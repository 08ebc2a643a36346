//! Console command parsing and handlers.
//!
//! Each line typed at the prompt is parsed into a [`Command`] and run
//! against the shared [`AppState`]. Handlers return the text to print.

use std::sync::atomic::Ordering;

use anyhow::{anyhow, bail, Context};
use guardhub_core::bus::payload_from_value;
use guardhub_core::notify::{describe_chain, NotifyRequest, Severity};
use guardhub_core::{AppEvent, RequestError, RequestStatus, SoundCue};
use tracing::info;

use crate::ledger::{format_amount, parse_amount, InvoiceId, NewInvoice};
use crate::settings::save_settings;
use crate::state::{AppState, Branch};

pub const HELP: &str = "\
commands:
  play <cue>                          play a sound cue (welcome, click, success, add, delete, error, download, notification)
  mute | unmute                       toggle sound cues
  volume <0..1>                       set cue volume
  status                              sound, request and bus diagnostics
  emit <event> [json]                 emit a bus event, e.g. emit data:refresh
  notify [--sticky] <severity> <title> [text]
                                      show a toast (success, error, warning, info)
  branch <id> <name>                  switch branch
  invoice add <customer> <amount>     create an invoice in the current branch
  invoice fail                        make the next ledger write fail
  invoice rm <id>                     delete an invoice
  invoice batch <customer> <amount> <count>
  invoices                            list invoices of the current branch
  toasts                              list visible toasts
  set toast <ms> | timeout <ms|off> | preload <on|off>
                                      change a saved setting (applies on next start)
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play(String),
    Mute,
    Unmute,
    Volume(f32),
    Status,
    Emit {
        event: AppEvent,
        payload: Option<serde_json::Value>,
    },
    Notify {
        severity: Severity,
        title: String,
        description: Option<String>,
        sticky: bool,
    },
    Branch(Branch),
    InvoiceAdd {
        customer: String,
        amount_cents: u64,
    },
    InvoiceFail,
    InvoiceRemove(InvoiceId),
    InvoiceBatch {
        customer: String,
        amount_cents: u64,
        count: usize,
    },
    Invoices,
    Toasts,
    Set(SettingChange),
    Help,
    Quit,
}

/// One edit to the saved host settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingChange {
    ToastDurationMs(u64),
    RequestTimeoutMs(Option<u64>),
    PreloadSounds(bool),
}

pub enum Outcome {
    Continue(String),
    Quit,
}

/// Parse one console line. Blank lines yield `None`.
pub fn parse(line: &str) -> anyhow::Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = split_word(line);
    let rest = rest.trim();

    let command = match verb.to_ascii_lowercase().as_str() {
        "play" => Command::Play(required(rest, "play <cue>")?.to_string()),
        "mute" => Command::Mute,
        "unmute" => Command::Unmute,
        "volume" => {
            let v = required(rest, "volume <0..1>")?;
            Command::Volume(v.parse().with_context(|| format!("invalid volume '{v}'"))?)
        }
        "status" => Command::Status,
        "emit" => {
            let (name, json) = split_word(required(rest, "emit <event> [json]")?);
            let event: AppEvent = name.parse()?;
            let json = json.trim();
            let payload = if json.is_empty() {
                None
            } else {
                Some(serde_json::from_str(json).context("payload is not valid JSON")?)
            };
            Command::Emit { event, payload }
        }
        "notify" => {
            let usage = "notify [--sticky] <severity> <title> [description]";
            let (rest, sticky) = match rest.strip_prefix("--sticky") {
                Some(tail) => (tail.trim(), true),
                None => (rest, false),
            };
            let (severity, tail) = split_word(required(rest, usage)?);
            let severity: Severity = severity.parse().map_err(|e: String| anyhow!(e))?;
            let (title, description) = split_word(required(tail.trim(), usage)?);
            let description = Some(description.trim().to_string()).filter(|d| !d.is_empty());
            Command::Notify {
                severity,
                title: title.to_string(),
                description,
                sticky,
            }
        }
        "branch" => {
            let (id, name) = split_word(required(rest, "branch <id> <name>")?);
            let name = name.trim();
            Command::Branch(Branch {
                id: id.to_string(),
                name: if name.is_empty() { id } else { name }.to_string(),
            })
        }
        "invoice" => parse_invoice(rest)?,
        "invoices" => Command::Invoices,
        "toasts" => Command::Toasts,
        "set" => Command::Set(parse_setting(rest)?),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{other}' (try 'help')"),
    };
    Ok(Some(command))
}

fn parse_invoice(rest: &str) -> anyhow::Result<Command> {
    let args: Vec<&str> = rest.split_whitespace().collect();
    match args.as_slice() {
        ["add", customer, amount] => Ok(Command::InvoiceAdd {
            customer: customer.to_string(),
            amount_cents: parse_amount(amount)?,
        }),
        ["fail"] => Ok(Command::InvoiceFail),
        ["rm", id] => Ok(Command::InvoiceRemove(
            id.parse().with_context(|| format!("invalid invoice id '{id}'"))?,
        )),
        ["batch", customer, amount, count] => Ok(Command::InvoiceBatch {
            customer: customer.to_string(),
            amount_cents: parse_amount(amount)?,
            count: count
                .parse()
                .with_context(|| format!("invalid count '{count}'"))?,
        }),
        _ => bail!("usage: invoice add <customer> <amount> | fail | rm <id> | batch <customer> <amount> <count>"),
    }
}

fn parse_setting(rest: &str) -> anyhow::Result<SettingChange> {
    let args: Vec<&str> = rest.split_whitespace().collect();
    let change = match args.as_slice() {
        ["toast", ms] => SettingChange::ToastDurationMs(parse_ms(ms)?),
        ["timeout", "off"] => SettingChange::RequestTimeoutMs(None),
        ["timeout", ms] => SettingChange::RequestTimeoutMs(Some(parse_ms(ms)?)),
        ["preload", "on"] => SettingChange::PreloadSounds(true),
        ["preload", "off"] => SettingChange::PreloadSounds(false),
        _ => bail!("usage: set toast <ms> | timeout <ms|off> | preload <on|off>"),
    };
    Ok(change)
}

fn parse_ms(raw: &str) -> anyhow::Result<u64> {
    raw.parse()
        .with_context(|| format!("invalid milliseconds '{raw}'"))
}

fn split_word(s: &str) -> (&str, &str) {
    s.split_once(char::is_whitespace).unwrap_or((s, ""))
}

fn required<'a>(s: &'a str, usage: &str) -> anyhow::Result<&'a str> {
    if s.is_empty() {
        bail!("usage: {usage}");
    }
    Ok(s)
}

/// Run one command.
///
/// Request failures have already been toasted by the hooks; they come back
/// here as a one-line summary rather than an error.
pub async fn execute(state: &AppState, command: Command) -> anyhow::Result<Outcome> {
    state.commands_run.fetch_add(1, Ordering::Relaxed);
    let sound = &state.services.sound;

    let output = match command {
        Command::Play(name) => {
            sound.play_named(&name);
            match name.parse::<SoundCue>() {
                Ok(cue) => format!("played {cue} ({:?})", sound.load_state(cue)),
                Err(()) => format!("'{name}' is not a cue; played the default tone"),
            }
        }
        Command::Mute => {
            sound.set_enabled(false);
            "sound cues off".to_string()
        }
        Command::Unmute => {
            sound.set_enabled(true);
            "sound cues on".to_string()
        }
        Command::Volume(v) => {
            sound.set_volume(v);
            format!("volume {:.2}", sound.volume())
        }
        Command::Status => {
            let diag = state.diagnostics_snapshot();
            let settings = sound.settings();
            format!(
                "branch: {}\nsound: enabled={} volume={:.2}\ninvoices query: {:?}\ndiagnostics: {}",
                state.branch().name,
                settings.enabled,
                settings.volume,
                state.invoices.status(),
                serde_json::to_string(&diag)?,
            )
        }
        Command::Emit { event, payload } => {
            let payload = match payload {
                Some(value) => Some(
                    payload_from_value(value).ok_or_else(|| anyhow!("payload must be a JSON object"))?,
                ),
                None => None,
            };
            let delivered = state.services.bus.emit(event, payload.as_ref());
            format!("{event}: delivered to {delivered} subscriber(s)")
        }
        Command::Notify {
            severity,
            title,
            description,
            sticky,
        } => {
            let mut request = NotifyRequest::new(severity, title);
            if let Some(d) = description {
                request = request.description(d);
            }
            if sticky {
                request = request.sticky();
            }
            let handle = state.services.notifier.notify(request);
            format!("toast #{}", handle.id())
        }
        Command::Branch(branch) => {
            let name = branch.name.clone();
            state.switch_branch(branch);
            format!("branch is now {name}")
        }
        Command::InvoiceAdd {
            customer,
            amount_cents,
        } => {
            let new = NewInvoice {
                branch_id: state.branch().id,
                customer,
                amount_cents,
            };
            match state.create_invoice.mutate(new).await {
                Ok(invoice) => format!(
                    "invoice #{} {} {}",
                    invoice.id,
                    invoice.customer,
                    format_amount(invoice.amount_cents)
                ),
                Err(e) => failed(state, &e),
            }
        }
        Command::InvoiceFail => {
            state.ledger.fail_next_write();
            "next ledger write will fail".to_string()
        }
        Command::InvoiceRemove(id) => match state.delete_invoice.mutate(id).await {
            Ok(invoice) => format!("deleted invoice #{}", invoice.id),
            Err(e) => failed(state, &e),
        },
        Command::InvoiceBatch {
            customer,
            amount_cents,
            count,
        } => {
            let branch_id = state.branch().id;
            let inputs = (0..count)
                .map(|_| NewInvoice {
                    branch_id: branch_id.clone(),
                    customer: customer.clone(),
                    amount_cents,
                })
                .collect();
            match state.create_invoice.batch().mutate_batch(inputs).await {
                Ok(None) => "nothing to create".to_string(),
                Ok(Some(created)) => format!("created {} invoice(s)", created.len()),
                Err(e) => failed(state, &e),
            }
        }
        Command::Invoices => {
            let snapshot = state.invoices.state();
            let rows = snapshot.data.unwrap_or_default();
            let mut out = format!(
                "{} invoice(s) in {} [{}]",
                rows.len(),
                state.branch().name,
                status_label(snapshot.status)
            );
            for invoice in rows {
                out.push_str(&format!(
                    "\n  #{:<4} {:<20} {:>12}",
                    invoice.id,
                    invoice.customer,
                    format_amount(invoice.amount_cents)
                ));
            }
            out
        }
        Command::Toasts => {
            let toasts = state.toasts.active();
            if toasts.is_empty() {
                "no toasts".to_string()
            } else {
                toasts
                    .iter()
                    .map(|t| {
                        format!(
                            "[{:?}] {}{}",
                            t.severity,
                            t.title,
                            t.description
                                .as_deref()
                                .map(|d| format!(": {d}"))
                                .unwrap_or_default()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        Command::Set(change) => {
            let mut settings = state.settings.lock();
            match change {
                SettingChange::ToastDurationMs(ms) => settings.toast_duration_ms = ms,
                SettingChange::RequestTimeoutMs(ms) => settings.request_timeout_ms = ms,
                SettingChange::PreloadSounds(on) => settings.preload_sounds = on,
            }
            settings.normalize();
            save_settings(&state.settings_path, &settings)
                .with_context(|| format!("saving {}", state.settings_path.display()))?;
            format!(
                "saved: toast {} ms, timeout {}, preload {} (applies on next start)",
                settings.toast_duration_ms,
                settings
                    .request_timeout_ms
                    .map_or_else(|| "off".to_string(), |ms| format!("{ms} ms")),
                if settings.preload_sounds { "on" } else { "off" },
            )
        }
        Command::Help => HELP.to_string(),
        Command::Quit => {
            let diag = state.diagnostics_snapshot();
            info!(
                commands_run = diag.commands_run,
                commands_failed = diag.commands_failed,
                events_emitted = diag.events_emitted,
                "app diagnostics snapshot on quit"
            );
            return Ok(Outcome::Quit);
        }
    };
    Ok(Outcome::Continue(output))
}

fn failed(state: &AppState, err: &RequestError) -> String {
    state.commands_failed.fetch_add(1, Ordering::Relaxed);
    format!("failed: {}", describe_chain(err.messages().as_slice()))
}

fn status_label(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Idle => "idle",
        RequestStatus::Loading => "loading",
        RequestStatus::Success => "up to date",
        RequestStatus::Error => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use guardhub_core::Services;

    use crate::ledger::Ledger;
    use crate::settings::{load_settings, AppSettings};

    fn app() -> AppState {
        let (services, toasts) = Services::headless();
        AppState::new(
            services,
            toasts,
            Arc::new(Ledger::new(Duration::ZERO)),
            AppSettings::default(),
            PathBuf::from("unused-settings.json"),
        )
    }

    async fn run(state: &AppState, line: &str) -> String {
        let command = parse(line).unwrap().unwrap();
        match execute(state, command).await.unwrap() {
            Outcome::Continue(out) => out,
            Outcome::Quit => "quit".into(),
        }
    }

    #[test]
    fn parses_the_command_set() {
        assert_eq!(parse("  ").unwrap(), None);
        assert_eq!(parse("volume 0.3").unwrap(), Some(Command::Volume(0.3)));
        assert_eq!(
            parse("branch B7 Navi Mumbai").unwrap(),
            Some(Command::Branch(Branch {
                id: "B7".into(),
                name: "Navi Mumbai".into()
            }))
        );
        assert_eq!(
            parse("invoice add Acme 1200.50").unwrap(),
            Some(Command::InvoiceAdd {
                customer: "Acme".into(),
                amount_cents: 120_050
            })
        );
        assert_eq!(
            parse("notify warning Rota gaps 3 shifts uncovered").unwrap(),
            Some(Command::Notify {
                severity: Severity::Warning,
                title: "Rota".into(),
                description: Some("gaps 3 shifts uncovered".into()),
                sticky: false,
            })
        );
        assert_eq!(
            parse("notify --sticky info Backup").unwrap(),
            Some(Command::Notify {
                severity: Severity::Info,
                title: "Backup".into(),
                description: None,
                sticky: true,
            })
        );
        assert_eq!(
            parse("set timeout off").unwrap(),
            Some(Command::Set(SettingChange::RequestTimeoutMs(None)))
        );
        assert_eq!(
            parse("set toast 2500").unwrap(),
            Some(Command::Set(SettingChange::ToastDurationMs(2500)))
        );
        assert!(matches!(
            parse(r#"emit branch:changed {"branchId":"B1"}"#).unwrap(),
            Some(Command::Emit {
                event: AppEvent::BranchChanged,
                payload: Some(_)
            })
        ));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse("fly away").is_err());
        assert!(parse("emit branch:renamed").is_err());
        assert!(parse("volume loud").is_err());
        assert!(parse("invoice rm x").is_err());
        assert!(parse("notify shout hello").is_err());
        assert!(parse("set toast soon").is_err());
        assert!(parse("set preload maybe").is_err());
    }

    #[tokio::test]
    async fn invoice_commands_drive_the_hooks() {
        let state = app();

        let out = run(&state, "invoice add Acme 250").await;
        assert!(out.starts_with("invoice #1 Acme 250.00"), "{out}");
        assert_eq!(state.services.refresh.value(), 1);

        run(&state, "invoice fail").await;
        let out = run(&state, "invoice add Acme 10").await;
        assert!(out.starts_with("failed:"), "{out}");
        assert_eq!(state.create_invoice.status(), RequestStatus::Error);
        assert_eq!(state.services.refresh.value(), 1);

        let out = run(&state, "invoice batch Globex 5 3").await;
        assert_eq!(out, "created 3 invoice(s)");
        let out = run(&state, "invoice batch Globex 5 0").await;
        assert_eq!(out, "nothing to create");
        assert_eq!(state.services.refresh.value(), 2);

        assert_eq!(state.diagnostics_snapshot().commands_failed, 1);
    }

    #[tokio::test]
    async fn set_saves_the_settings_file_and_quit_does_not_rewrite_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let (services, toasts) = Services::headless();
        let state = AppState::new(
            services,
            toasts,
            Arc::new(Ledger::new(Duration::ZERO)),
            AppSettings::default(),
            path.clone(),
        );

        let out = run(&state, "set toast 90000").await;
        assert!(out.contains("toast 60000 ms"), "{out}");
        run(&state, "set timeout off").await;

        let saved = load_settings(&path);
        assert_eq!(saved.toast_duration_ms, 60_000);
        assert_eq!(saved.request_timeout_ms, None);

        std::fs::remove_file(&path).unwrap();
        assert_eq!(run(&state, "quit").await, "quit");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn sticky_notify_keeps_its_toast() {
        let state = app();
        run(&state, "notify --sticky warning Backup overdue").await;
        let shown = state.toasts.active();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].title, "Backup");
        assert_eq!(shown[0].description.as_deref(), Some("overdue"));
    }

    #[tokio::test]
    async fn mute_and_emit() {
        let state = app();
        run(&state, "mute").await;
        assert!(!state.services.sound.is_enabled());

        state.start();
        let before = state.services.refresh.value();
        let out = run(&state, "emit data:refresh").await;
        assert!(out.contains("delivered to 1"), "{out}");
        assert_eq!(state.services.refresh.value(), before + 1);
        state.shutdown();
    }
}
