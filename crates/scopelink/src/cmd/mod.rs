use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Args, Subcommand, ValueEnum};
use scopelink_bridge::{OversizePolicy, WriteFailurePolicy};
use scopelink_transport::{Direction, Endpoint, IpcStream, DEFAULT_BASE_PATH};

use crate::exit::{transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Host a bridge and print packets arriving on its RX endpoint.
    Serve(ServeArgs),
    /// Connect to a bridge's RX endpoint and send one packet.
    Send(SendArgs),
    /// Connect to a bridge's TX endpoint and print the packets it sends.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EndpointArgs {
    /// Logical channel name; endpoints are <BASE_PATH><NAME>TX and <BASE_PATH><NAME>RX.
    pub name: String,
    /// Prefix for endpoint addresses.
    #[arg(long, env = "SCOPELINK_BASE_PATH", default_value = DEFAULT_BASE_PATH)]
    pub base_path: String,
}

impl EndpointArgs {
    pub fn endpoint(&self, direction: Direction) -> Endpoint {
        Endpoint::with_base(self.base_path.clone(), self.name.clone(), direction)
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Queue the reference packet {command 1, id 0x0808, data 01..05} for sending.
    #[arg(long)]
    pub demo: bool,
    /// Exit after printing N received packets.
    #[arg(long)]
    pub count: Option<usize>,
    /// Transport buffer size in bytes, header included.
    #[arg(long, default_value_t = scopelink_frame::DEFAULT_BUFFER_CAPACITY)]
    pub buffer_capacity: usize,
    /// Read timeout on the RX endpoint (e.g. 500ms, 2s). Blocks by default.
    #[arg(long)]
    pub read_timeout: Option<String>,
    /// What to do when writing a packet fails.
    #[arg(long, value_enum, default_value = "continue")]
    pub write_failure: WriteFailureArg,
    /// What to do with a header declaring an oversize payload.
    #[arg(long, value_enum, default_value = "placeholder")]
    pub oversize: OversizeArg,
    /// Rebind a direction after its peer disconnects.
    #[arg(long)]
    pub restart: bool,
    /// Only host the TX endpoint.
    #[arg(long, conflicts_with = "receive_only")]
    pub send_only: bool,
    /// Only host the RX endpoint.
    #[arg(long, conflicts_with = "send_only")]
    pub receive_only: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum WriteFailureArg {
    Continue,
    Disconnect,
}

impl From<WriteFailureArg> for WriteFailurePolicy {
    fn from(arg: WriteFailureArg) -> Self {
        match arg {
            WriteFailureArg::Continue => WriteFailurePolicy::Continue,
            WriteFailureArg::Disconnect => WriteFailurePolicy::Disconnect,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum OversizeArg {
    Placeholder,
    Disconnect,
}

impl From<OversizeArg> for OversizePolicy {
    fn from(arg: OversizeArg) -> Self {
        match arg {
            OversizeArg::Placeholder => OversizePolicy::Placeholder,
            OversizeArg::Disconnect => OversizePolicy::Disconnect,
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Command field (decimal or 0x-prefixed hex).
    #[arg(long, value_parser = parse_u16, default_value = "0")]
    pub command: u16,
    /// Packet ID field (decimal or 0x-prefixed hex).
    #[arg(long, value_parser = parse_u16, default_value = "0")]
    pub id: u16,
    /// Payload as a UTF-8 string.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Payload as hex digits, e.g. 0102030405.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Buffer size of the receiving bridge, header included.
    #[arg(long, default_value_t = scopelink_frame::DEFAULT_BUFFER_CAPACITY)]
    pub buffer_capacity: usize,
    /// Keep retrying the connection for this long (e.g. 3s).
    #[arg(long)]
    pub retry_for: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Exit after receiving N packets.
    #[arg(long)]
    pub count: Option<usize>,
    /// Buffer size of the sending bridge, header included.
    #[arg(long, default_value_t = scopelink_frame::DEFAULT_BUFFER_CAPACITY)]
    pub buffer_capacity: usize,
    /// Keep retrying the connection for this long (e.g. 3s).
    #[arg(long)]
    pub retry_for: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `2s`, or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
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
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Accept `2056` or `0x0808`.
pub fn parse_u16(input: &str) -> Result<u16, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(digits) => u16::from_str_radix(digits, 16),
        None => input.parse(),
    };
    parsed.map_err(|err| format!("invalid 16-bit value {input:?}: {err}"))
}

/// Connect as the peer of `endpoint`, retrying for `retry_for` if given.
pub fn connect_endpoint(endpoint: &Endpoint, retry_for: Option<Duration>) -> CliResult<IpcStream> {
    let deadline = retry_for.map(|d| Instant::now() + d);
    loop {
        match scopelink_transport::connect(endpoint) {
            Ok(stream) => return Ok(stream),
            Err(err) => match deadline {
                Some(deadline) if Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(25));
                }
                _ => return Err(transport_error("connect failed", err)),
            },
        }
    }
}

pub fn parse_retry(retry_for: Option<&str>) -> CliResult<Option<Duration>> {
    retry_for.map(parse_duration).transpose()
}
