//! sessionkeeper - keeps a signed-in session consistent with the identity
//! provider.
//!
//! Reads activation commands from stdin, one per line:
//! `visible`, `hidden`, `focus`, `blur`, `restore`, `foreground`, `check`,
//! `status`, `logout`, `quit`.

use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use sessionkeeper::activation::PlatformSignal;
use sessionkeeper::session::{subscriber_fn, SessionState};
use sessionkeeper::startup::{start, SessionConfig, SessionRuntime};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sessionkeeper=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn describe(state: &SessionState) -> String {
    match state {
        SessionState::Unknown => "not signed in".to_string(),
        SessionState::Valid { user, .. } => match &user.username {
            Some(name) => format!("signed in as {} ({})", name, user.id),
            None => format!("signed in as {}", user.id),
        },
        SessionState::Invalid { reason } => format!("session expired: {}", reason),
    }
}

fn print_status(runtime: &SessionRuntime) {
    let snapshot = runtime.coordinator.store().snapshot();
    println!("{}", describe(&snapshot.state));
    if let Some(err) = &snapshot.last_error {
        println!("  last error: {} [{}]", err.user_message(), err.error_code());
        println!("  hint: {}", err.recovery_hint());
    }
    if snapshot.unreachable_exhausted {
        println!(
            "  identity provider unreachable {} times in a row",
            snapshot.consecutive_unreachable
        );
    }
}

async fn run(config: SessionConfig) -> Result<()> {
    let mut runtime = start(&config)
        .await
        .wrap_err("Failed to start session subsystem")?;
    println!("startup: {}", runtime.startup_outcome);
    print_status(&runtime);

    let _state_listener = runtime.coordinator.store().subscribe(|state| {
        println!("session: {}", describe(state));
    });
    let refresher = subscriber_fn("console", || {
        println!("session recovered, refetching data");
        Ok(())
    });
    runtime.coordinator.registry().register(&refresher);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.wrap_err("Failed to read stdin")? else {
                    break;
                };
                match line.trim() {
                    "" => {}
                    "quit" | "exit" => break,
                    "status" => print_status(&runtime),
                    "logout" => match runtime.coordinator.logout().await {
                        Ok(()) => println!("logged out"),
                        Err(e) => eprintln!("logout failed: {}", e.user_message()),
                    },
                    other => match PlatformSignal::from_command(other) {
                        Some(signal) => {
                            runtime.activation.source.emit(signal);
                        }
                        None => eprintln!("unknown command: {}", other),
                    },
                }
            }
            Some(report) = runtime.activation.reports.recv() => {
                match report.sweep {
                    Some(sweep) => println!("{} (sweep: {:?}): {}", report.event, sweep, report.outcome),
                    None => println!("{}: {}", report.event, report.outcome),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    runtime.shutdown();
    Ok(())
}

fn main() -> Result<()> {
    if std::env::args().any(|arg| arg == "--version") {
        println!("sessionkeeper {}", VERSION);
        return Ok(());
    }

    color_eyre::install()?;
    init_tracing();

    let config = SessionConfig::from_env();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(config))
}
