//! Command-line interface for cmdlink.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

/// Which runtime to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Hosted server: health HTTP plus WebSocket sessions.
    Serve,
    /// Operator client for `serve`.
    Connect,
    /// Raw-stream controller waiting for agents.
    Listen,
    /// Raw-stream agent dialing a controller.
    Agent,
}

impl Mode {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "serve" => Some(Mode::Serve),
            "connect" => Some(Mode::Connect),
            "listen" => Some(Mode::Listen),
            "agent" => Some(Mode::Agent),
            _ => None,
        }
    }

    /// Whether the mode needs a positional target.
    pub fn needs_target(&self) -> bool {
        matches!(self, Mode::Connect | Mode::Agent)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Serve => "serve",
            Mode::Connect => "connect",
            Mode::Listen => "listen",
            Mode::Agent => "agent",
        };
        f.write_str(name)
    }
}

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Selected runtime.
    pub mode: Option<Mode>,
    /// Endpoint for `connect` and `agent`.
    pub target: Option<String>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Bind address override.
    pub host: Option<String>,
    /// Control port override.
    pub port: Option<u16>,
    /// Subchannel port override.
    pub transfer_port: Option<u16>,
    /// Exec timeout override in seconds.
    pub timeout_secs: Option<u64>,
    /// Where downloads are stored on the controller.
    pub download_dir: Option<PathBuf>,
    /// Transfer size limit in bytes.
    pub max_bytes: Option<u64>,
    /// Report transfer progress.
    pub verbose: bool,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

impl Args {
    /// The mode and, where required, its target.
    pub fn runtime(&self) -> Result<(Mode, Option<&str>), ArgsError> {
        let mode = self.mode.ok_or(ArgsError::MissingMode)?;
        match (mode.needs_target(), self.target.as_deref()) {
            (true, None) => Err(ArgsError::MissingTarget(mode)),
            (false, Some(extra)) => Err(ArgsError::UnexpectedArgument(extra.to_string())),
            (_, target) => Ok((mode, target)),
        }
    }
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('H') | Long("host") => {
                result.host = Some(parser.value()?.parse()?);
            }
            Short('p') | Long("port") => {
                result.port = Some(parse_number(&mut parser, "port")?);
            }
            Short('t') | Long("transfer-port") => {
                result.transfer_port = Some(parse_number(&mut parser, "transfer-port")?);
            }
            Long("timeout") => {
                result.timeout_secs = Some(parse_number(&mut parser, "timeout")?);
            }
            Short('d') | Long("download-dir") => {
                result.download_dir = Some(parser.value()?.parse()?);
            }
            Long("max-bytes") => {
                result.max_bytes = Some(parse_number(&mut parser, "max-bytes")?);
            }
            Short('v') | Long("verbose") => {
                result.verbose = true;
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                let val = val.to_string_lossy().into_owned();
                if result.mode.is_none() {
                    result.mode =
                        Some(Mode::parse(&val).ok_or(ArgsError::UnknownCommand(val))?);
                } else if result.target.is_none() {
                    result.target = Some(val);
                } else {
                    return Err(ArgsError::UnexpectedArgument(val));
                }
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

fn parse_number<T: std::str::FromStr>(
    parser: &mut lexopt::Parser,
    name: &'static str,
) -> Result<T, ArgsError> {
    use lexopt::ValueExt;

    let value: String = parser.value()?.parse()?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidValue(name, value))
}

/// Short usage line printed on argument errors.
pub fn usage() -> &'static str {
    "USAGE:\n    cmdlink <serve|connect|listen|agent> [OPTIONS] [TARGET]\n\nRun 'cmdlink --help' for details."
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"cmdlink {version}
Remote command channel with a file transfer side channel

USAGE:
    cmdlink serve   [OPTIONS]
    cmdlink connect [OPTIONS] <URL>
    cmdlink listen  [OPTIONS]
    cmdlink agent   [OPTIONS] <HOST[:PORT]>

COMMANDS:
    serve       Host sessions over WebSocket (health HTTP on PORT, WebSocket on PORT+1)
    connect     Operate a 'serve' host; ws://, wss://, http:// and https:// accepted
    listen      Wait for raw-stream agents and operate them one at a time
    agent       Dial a 'listen' controller and execute its commands here

OPTIONS:
    -c, --config <FILE>         Path to configuration file (JSON)
    -H, --host <ADDR>           Address to bind listeners to [default: 0.0.0.0]
    -p, --port <PORT>           Control port [default: 10000 serve, 5003 listen]
    -t, --transfer-port <PORT>  File transfer port [default: 5002]
        --timeout <SECS>        Command timeout [default: 30]
    -d, --download-dir <DIR>    Where downloaded files are stored [default: .]
        --max-bytes <N>         Reject transfers larger than N bytes
    -v, --verbose               Report transfer progress
    -l, --log-level <LVL>       Log level (error, warn, info, debug, trace)
    -h, --help                  Print help
    -V, --version               Print version

ENVIRONMENT VARIABLES:
    PORT                        Control port of 'serve' (overrides config)
    CMDLINK_HOST                Bind address (overrides config)
    CMDLINK_TRANSFER_PORT       File transfer port (overrides config)
    CMDLINK_TIMEOUT_SECS        Command timeout (overrides config)
    CMDLINK_LOG_LEVEL           Log level (overrides config)
    RUST_LOG                    Alternative log level setting

EXAMPLES:
    # Host sessions on the default ports
    cmdlink serve

    # Operate it; falls back to plain ws:// when TLS fails
    cmdlink connect https://host.example.com

    # Raw-stream pair
    cmdlink listen -d ./loot
    cmdlink agent 10.0.0.5:5003
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("cmdlink {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
    /// First positional is not a known subcommand.
    UnknownCommand(String),
    /// No subcommand given.
    MissingMode,
    /// `connect` or `agent` without a target.
    MissingTarget(Mode),
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
            Self::UnknownCommand(cmd) => write!(f, "unknown command: '{}'", cmd),
            Self::MissingMode => write!(f, "missing command"),
            Self::MissingTarget(mode) => write!(f, "'{}' requires a target", mode),
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
