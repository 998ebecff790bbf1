use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Args, Subcommand};
use powsrv_client::{ClientConfig, ClientError, PowClient};
use powsrv_transport::{Endpoint, TransportError};

use crate::config::{Config, DeviceKind, Overrides, Selection};
use crate::exit::{client_error, transport_error, CliError, CliResult, TIMEOUT, USAGE};
use crate::logging::LogLevel;
use crate::output::OutputFormat;

pub mod info;
pub mod init;
pub mod pow;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the PoW server until interrupted.
    Serve(ServeArgs),
    /// Print server version, PoW type and PoW version.
    Info(InfoArgs),
    /// Compute a nonce for transaction trytes.
    Pow(PowArgs),
    /// Re-initialize the server's PoW devices.
    Init(InitArgs),
    /// Show version information.
    Version(VersionArgs),
}

impl Command {
    /// Log level from the `[log]` section of the config file, if any.
    pub fn config_log_level(&self) -> Option<LogLevel> {
        match self {
            Command::Serve(args) => args
                .config
                .as_deref()
                .and_then(|path| Config::load(path).ok())
                .and_then(|config| config.log.level),
            _ => None,
        }
    }
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Info(args) => info::run(args, format),
        Command::Pow(args) => pow::run(args, format),
        Command::Init(args) => init::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// TOML configuration file.
    #[arg(long, short = 'c', env = "POWSRV_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Endpoint to listen on (socket path, unix:/path or tcp://host:port).
    #[arg(long, short = 's', env = "POWSRV_ENDPOINT")]
    pub endpoint: Option<String>,
    /// Use a single device of this kind.
    #[arg(long, short = 't', env = "POWSRV_POW_TYPE", value_enum)]
    pub pow_type: Option<DeviceKind>,
    /// Highest accepted min weight magnitude.
    #[arg(long, short = 'm', env = "POWSRV_MAX_MWM")]
    pub max_mwm: Option<u8>,
    /// Worker threads for CPU devices (0 = all cores).
    #[arg(long, env = "POWSRV_THREADS")]
    pub threads: Option<usize>,
    /// Upstream endpoint for relay devices.
    #[arg(long, env = "POWSRV_UPSTREAM")]
    pub upstream: Option<String>,
    /// Device selection policy.
    #[arg(long, env = "POWSRV_SELECTION", value_enum)]
    pub selection: Option<Selection>,
    /// Device index used by the fixed selection policy.
    #[arg(long, env = "POWSRV_FIXED_DEVICE")]
    pub fixed_device: Option<usize>,
}

impl ServeArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            endpoint: self.endpoint.clone(),
            pow_type: self.pow_type,
            max_mwm: self.max_mwm,
            threads: self.threads,
            upstream: self.upstream.clone(),
            selection: self.selection,
            fixed_device: self.fixed_device,
        }
    }
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Server endpoint.
    #[arg(env = "POWSRV_ENDPOINT", default_value = Endpoint::DEFAULT_UNIX_PATH)]
    pub endpoint: String,
    /// Connect and reply timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct PowArgs {
    /// Server endpoint.
    #[arg(env = "POWSRV_ENDPOINT", default_value = Endpoint::DEFAULT_UNIX_PATH)]
    pub endpoint: String,
    /// Min weight magnitude (difficulty).
    #[arg(long, short = 'm')]
    pub mwm: u8,
    /// Transaction trytes.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub trytes: Option<String>,
    /// Read transaction trytes from a file.
    #[arg(long, conflicts_with = "trytes")]
    pub file: Option<PathBuf>,
    /// Reply timeout (e.g. 60s, 500ms).
    #[arg(long, default_value = "60s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Server endpoint.
    #[arg(env = "POWSRV_ENDPOINT", default_value = Endpoint::DEFAULT_UNIX_PATH)]
    pub endpoint: String,
    /// Connect and reply timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_endpoint(input: &str) -> CliResult<Endpoint> {
    input
        .parse()
        .map_err(|err| transport_error("invalid endpoint", err))
}

pub fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Connect, retrying while the server socket does not exist yet or refuses,
/// until `timeout` has passed.
pub fn connect_with_timeout(
    endpoint: &Endpoint,
    config: ClientConfig,
    timeout: Duration,
) -> CliResult<PowClient> {
    let start = Instant::now();
    loop {
        match PowClient::connect_with_config(endpoint, config.clone()) {
            Ok(client) => return Ok(client),
            Err(err) => {
                if !is_retryable_connect_error(&err) {
                    return Err(client_error("connect failed", err));
                }
                if start.elapsed() >= timeout {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("connect to {endpoint} timed out after {timeout:?}"),
                    ));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

fn is_retryable_connect_error(err: &ClientError) -> bool {
    match err {
        ClientError::Transport(TransportError::Connect { source, .. }) => {
            source.kind() == std::io::ErrorKind::NotFound
                || source.kind() == std::io::ErrorKind::ConnectionRefused
        }
        _ => false,
    }
}
