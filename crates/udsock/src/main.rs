//! udsock - serve, send to, and inspect Unix-domain socket paths

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use udsock_core::config::{Config, LogFormat};
use udsock_core::error::format_error_with_remediation;
use udsock_core::logging::init_logging;
use udsock_core::{
    Connection, EndpointManager, Input, Output, PathState, Server, TransportMode, probe_path,
};

/// Largest datagram the server will receive in one read.
const MAX_DATAGRAM: usize = 64 * 1024;

#[derive(Parser, Debug)]
#[command(name = "udsock", version, about = "Unix-domain socket endpoints")]
struct Cli {
    /// Config file (default: $UDSOCK_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format (pretty or json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bind a path and copy what peers send to stdout
    Serve(ServeArgs),
    /// Connect to a path and send a message
    Send(SendArgs),
    /// Report whether a path is missing, stale, or served
    Status(StatusArgs),
    /// Remove a socket node
    Unlink {
        path: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ServeArgs {
    path: PathBuf,

    /// stream or datagram (default from config)
    #[arg(long)]
    mode: Option<TransportMode>,

    /// Serve a single peer (or a single datagram) and exit
    #[arg(long)]
    once: bool,

    /// Pending-connection queue length
    #[arg(long)]
    backlog: Option<u32>,

    /// Receive timeout in milliseconds; 0 blocks indefinitely
    #[arg(long)]
    timeout_ms: Option<u32>,

    /// Send each stream peer's bytes back to it
    #[arg(long)]
    echo: bool,
}

#[derive(Args, Debug)]
struct SendArgs {
    path: PathBuf,

    #[arg(long)]
    mode: Option<TransportMode>,

    /// Message to send; read from stdin when absent
    message: Option<String>,
}

#[derive(Args, Debug)]
struct StatusArgs {
    path: PathBuf,

    #[arg(long)]
    mode: Option<TransportMode>,

    /// Print a JSON object instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct StatusReport<'a> {
    path: &'a Path,
    mode: TransportMode,
    state: PathState,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn report(err: &anyhow::Error) {
    if let Some(core) = err.downcast_ref::<udsock_core::Error>() {
        eprintln!("{}", format_error_with_remediation(core));
    } else {
        eprintln!("Error: {err:#}");
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    init_logging(&config.logging).context("failed to initialize logging")?;

    match cli.command {
        Command::Serve(args) => serve(&config, args),
        Command::Send(args) => send(&config, args),
        Command::Status(args) => status(&config, args),
        Command::Unlink { path } => {
            udsock_core::manager::unlink(&path)?;
            info!(path = %path.display(), "socket node removed");
            Ok(())
        }
    }
}

fn serve(config: &Config, args: ServeArgs) -> Result<()> {
    let mode = args.mode.unwrap_or(config.endpoint.mode);
    let mut options = config.options();
    if let Some(timeout_ms) = args.timeout_ms {
        options.receive_timeout_ms = timeout_ms;
    }
    let manager = EndpointManager::new(options);
    let mut stdout = io::stdout().lock();

    let mut server = if args.once {
        Server::create(&manager, &args.path, mode)?
    } else {
        let backlog = args.backlog.unwrap_or(config.endpoint.backlog);
        Server::listen(&manager, &args.path, mode, backlog)?
    };
    server.set_unlink_on_drop(config.endpoint.unlink_on_drop);

    match (mode, args.once) {
        (TransportMode::Datagram, once) => loop {
            receive_datagram(server.input()?, &mut stdout)?;
            if once {
                break;
            }
        },
        (TransportMode::Stream, true) => {
            let echo = args.echo.then(|| server.output()).transpose()?;
            relay(server.input()?, echo, &mut stdout)?;
        }
        (TransportMode::Stream, false) => loop {
            let peer = server.accept()?;
            let echo = args.echo.then(|| peer.output()).transpose()?;
            let bytes = relay(peer.input()?, echo, &mut stdout)?;
            info!(bytes, "peer finished");
            peer.close()?;
        },
    }

    server.close()?;
    Ok(())
}

/// Copy one peer's bytes to `sink` until end of stream.
fn relay(mut input: Input<'_>, mut echo: Option<Output<'_>>, sink: &mut impl Write) -> Result<u64> {
    let mut buf = [0u8; 8192];
    let mut total = 0u64;
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                warn!("receive timeout elapsed; dropping peer");
                break;
            }
            Err(err) => return Err(err).context("read from peer"),
        };
        sink.write_all(&buf[..n])?;
        sink.flush()?;
        if let Some(out) = echo.as_mut() {
            out.write_all(&buf[..n]).context("echo to peer")?;
        }
        total += n as u64;
    }
    Ok(total)
}

fn receive_datagram(mut input: Input<'_>, sink: &mut impl Write) -> Result<()> {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let n = input.read(&mut buf).context("receive datagram")?;
    sink.write_all(&buf[..n])?;
    sink.flush()?;
    Ok(())
}

fn send(config: &Config, args: SendArgs) -> Result<()> {
    let mode = args.mode.unwrap_or(config.endpoint.mode);
    let payload = match args.message {
        Some(message) => message.into_bytes(),
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf).context("read stdin")?;
            buf
        }
    };

    let conn = Connection::connect(&config.manager(), &args.path, mode)?;
    let mut out = conn.output()?;
    match mode {
        TransportMode::Stream => {
            out.write_all(&payload).context("send")?;
            out.close()?;
            io::copy(&mut conn.input()?, &mut io::stdout().lock()).context("read reply")?;
        }
        TransportMode::Datagram => {
            let sent = out.write(&payload).context("send datagram")?;
            if sent != payload.len() {
                bail!("datagram truncated: sent {sent} of {} bytes", payload.len());
            }
        }
    }
    conn.close()?;
    Ok(())
}

fn status(config: &Config, args: StatusArgs) -> Result<()> {
    let mode = args.mode.unwrap_or(config.endpoint.mode);
    let state = probe_path(&args.path, mode)?;
    if args.json {
        let report = StatusReport {
            path: &args.path,
            mode,
            state,
        };
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!("{}: {state}", args.path.display());
    }
    Ok(())
}
