//! CLI entry point for the simregs register server and one-shot client.

mod clock;

use std::env;
use std::ffi::OsString;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use simregs_core::{
    BitRange, CancelToken, DirectAddressSpace, ObserverConfig, ObserverLoop,
    RegisterError, RegisterProbe, Sdk, SignalRecorder, SpaceConfig, WaitCondition, WaitOutcome,
    DEFAULT_ACK_TIMEOUT,
};
use simregs_remote::{RegisterServer, RemoteAddressSpace, RemoteConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::clock::{Clock, ClockConfig};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 7878;

const USAGE_TEXT: &str = "\
Usage: simregs <command> [options]

Commands:
  serve                          Host a register space driven by a free-running clock
  read <address>                 Print one register
  write <address> <value>        Store one register
  wait <address> <value>         Block until (register & mask) == (value & mask)
  describe <address>             Print the label of an address
  reset                          Restore every peripheral register to power-up values
  watch                          Print probes once per committed cycle

Options:
  --host <host>          Server host (default 127.0.0.1)
  --port <port>          Server port (default 7878)
  --period-ms <ms>       serve: pause between cycles (default 10)
  --timeout-ms <ms>      serve: acknowledgment bound; wait: wall-clock bound;
                         watch: refresh interval
  --mask <mask>          wait: compared bits (default 0xFFFFFFFF)
  --cycles <n>           wait: cycle bound; watch: stop after n cycles
  --probe <addr[:msb:lsb]>  watch: register field to print (repeatable)
  -h, --help             Show this help message

Numbers accept decimal or 0x-prefixed hexadecimal.

Examples:
  simregs serve --port 7878
  simregs read 0x40014004
  simregs wait 0x58000010 5 --timeout-ms 1000
  simregs watch --probe 0x40014000:7:0 --cycles 10
";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    host: String,
    port: u16,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ServeArgs {
    target: Target,
    period: Duration,
    ack_timeout: Duration,
}

#[derive(Debug, PartialEq, Eq)]
struct WaitArgs {
    target: Target,
    condition: WaitCondition,
}

#[derive(Debug, PartialEq, Eq)]
struct ProbeSpec {
    address: u32,
    range: BitRange,
}

#[derive(Debug, PartialEq, Eq)]
struct WatchArgs {
    target: Target,
    probes: Vec<ProbeSpec>,
    cycles: Option<u64>,
    refresh: Duration,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Serve(ServeArgs),
    Read { target: Target, address: u32 },
    Write { target: Target, address: u32, value: u32 },
    Wait(WaitArgs),
    Describe { target: Target, address: u32 },
    Reset { target: Target },
    Watch(WatchArgs),
}

#[derive(Debug)]
enum ParseResult {
    Command(Command),
    Help,
}

/// Positional arguments and `--flag value` pairs in command-line order.
#[derive(Debug, Default)]
struct RawArgs {
    positionals: Vec<String>,
    options: Vec<(String, String)>,
}

impl RawArgs {
    fn expect_positionals(&self, names: &[&str]) -> Result<(), String> {
        if self.positionals.len() < names.len() {
            return Err(format!("missing {}", names[self.positionals.len()]));
        }
        if self.positionals.len() > names.len() {
            return Err(format!(
                "unexpected argument: {}",
                self.positionals[names.len()]
            ));
        }
        Ok(())
    }

    fn reject_unknown(&self, allowed: &[&str]) -> Result<(), String> {
        match self
            .options
            .iter()
            .find(|(flag, _)| !allowed.contains(&flag.as_str()))
        {
            Some((flag, _)) => Err(format!("unknown option: {flag}")),
            None => Ok(()),
        }
    }

    fn last(&self, flag: &str) -> Option<&str> {
        self.options
            .iter()
            .rev()
            .find(|(name, _)| name == flag)
            .map(|(_, value)| value.as_str())
    }

    fn all<'a>(&'a self, flag: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.options
            .iter()
            .filter(move |(name, _)| name == flag)
            .map(|(_, value)| value.as_str())
    }

    fn target(&self) -> Result<Target, String> {
        let mut target = Target::default();
        if let Some(host) = self.last("--host") {
            target.host = host.to_string();
        }
        if let Some(port) = self.last("--port") {
            target.port = port
                .parse()
                .map_err(|_| format!("invalid port: {port}"))?;
        }
        Ok(target)
    }

    fn number(&self, flag: &str) -> Result<Option<u64>, String> {
        self.last(flag).map(|value| parse_u64(value, flag)).transpose()
    }
}

const CLIENT_FLAGS: [&str; 2] = ["--host", "--port"];

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let first = args.next().ok_or_else(|| "missing command".to_string())?;

    if first == "--help" || first == "-h" {
        return Ok(ParseResult::Help);
    }

    let command_str = first.to_string_lossy().to_string();
    let raw = collect_args(args)?;

    let command = match command_str.as_str() {
        "serve" => parse_serve_args(&raw).map(Command::Serve),
        "read" => parse_address_command(&raw).map(|(target, address)| Command::Read {
            target,
            address,
        }),
        "write" => parse_write_args(&raw),
        "wait" => parse_wait_args(&raw).map(Command::Wait),
        "describe" => parse_address_command(&raw).map(|(target, address)| Command::Describe {
            target,
            address,
        }),
        "reset" => {
            raw.expect_positionals(&[])?;
            raw.reject_unknown(&CLIENT_FLAGS)?;
            raw.target().map(|target| Command::Reset { target })
        }
        "watch" => parse_watch_args(&raw).map(Command::Watch),
        other => Err(format!("unknown command: {other}")),
    }?;
    Ok(ParseResult::Command(command))
}

#[allow(clippy::while_let_on_iterator)]
fn collect_args(mut args: impl Iterator<Item = OsString>) -> Result<RawArgs, String> {
    let mut raw = RawArgs::default();

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }

        let arg = arg.to_string_lossy().to_string();
        if arg.starts_with("--") {
            let value = args
                .next()
                .ok_or_else(|| format!("missing value for {arg}"))?;
            raw.options.push((arg, value.to_string_lossy().to_string()));
            continue;
        }

        if arg.starts_with('-') {
            return Err(format!("unknown option: {arg}"));
        }

        raw.positionals.push(arg);
    }

    Ok(raw)
}

fn parse_number(text: &str) -> Option<u64> {
    let text = text.replace('_', "");
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn parse_u64(text: &str, what: &str) -> Result<u64, String> {
    parse_number(text).ok_or_else(|| format!("invalid {what}: {text}"))
}

fn parse_u32(text: &str, what: &str) -> Result<u32, String> {
    parse_number(text)
        .and_then(|value| u32::try_from(value).ok())
        .ok_or_else(|| format!("invalid {what}: {text}"))
}

fn parse_serve_args(raw: &RawArgs) -> Result<ServeArgs, String> {
    raw.expect_positionals(&[])?;
    raw.reject_unknown(&["--host", "--port", "--period-ms", "--timeout-ms"])?;
    Ok(ServeArgs {
        target: raw.target()?,
        period: raw
            .number("--period-ms")?
            .map_or(ClockConfig::default().period, Duration::from_millis),
        ack_timeout: raw
            .number("--timeout-ms")?
            .map_or(DEFAULT_ACK_TIMEOUT, Duration::from_millis),
    })
}

fn parse_address_command(raw: &RawArgs) -> Result<(Target, u32), String> {
    raw.expect_positionals(&["address"])?;
    raw.reject_unknown(&CLIENT_FLAGS)?;
    Ok((raw.target()?, parse_u32(&raw.positionals[0], "address")?))
}

fn parse_write_args(raw: &RawArgs) -> Result<Command, String> {
    raw.expect_positionals(&["address", "value"])?;
    raw.reject_unknown(&CLIENT_FLAGS)?;
    Ok(Command::Write {
        target: raw.target()?,
        address: parse_u32(&raw.positionals[0], "address")?,
        value: parse_u32(&raw.positionals[1], "value")?,
    })
}

fn parse_wait_args(raw: &RawArgs) -> Result<WaitArgs, String> {
    raw.expect_positionals(&["address", "value"])?;
    raw.reject_unknown(&["--host", "--port", "--mask", "--cycles", "--timeout-ms"])?;
    let mut condition = WaitCondition::new(
        parse_u32(&raw.positionals[0], "address")?,
        parse_u32(&raw.positionals[1], "value")?,
    );
    if let Some(mask) = raw.last("--mask") {
        condition = condition.with_mask(parse_u32(mask, "mask")?);
    }
    if let Some(cycles) = raw.number("--cycles")? {
        condition = condition.with_cycles_timeout(cycles);
    }
    if let Some(millis) = raw.number("--timeout-ms")? {
        condition = condition.with_millis_timeout(millis);
    }
    Ok(WaitArgs {
        target: raw.target()?,
        condition,
    })
}

fn parse_probe(text: &str) -> Result<ProbeSpec, String> {
    let parts: Vec<&str> = text.split(':').collect();
    let invalid = || format!("invalid probe: {text}");
    let (address, range) = match parts.as_slice() {
        [address] => (*address, BitRange::FULL),
        [address, msb, lsb] => {
            let msb = msb.parse().map_err(|_| invalid())?;
            let lsb = lsb.parse().map_err(|_| invalid())?;
            (*address, BitRange::new(msb, lsb).map_err(|err| err.to_string())?)
        }
        _ => return Err(invalid()),
    };
    Ok(ProbeSpec {
        address: parse_u32(address, "probe address")?,
        range,
    })
}

fn parse_watch_args(raw: &RawArgs) -> Result<WatchArgs, String> {
    raw.expect_positionals(&[])?;
    raw.reject_unknown(&["--host", "--port", "--probe", "--cycles", "--timeout-ms"])?;
    let probes = raw
        .all("--probe")
        .map(parse_probe)
        .collect::<Result<Vec<_>, _>>()?;
    if probes.is_empty() {
        return Err("watch needs at least one --probe".to_string());
    }
    Ok(WatchArgs {
        target: raw.target()?,
        probes,
        cycles: raw.number("--cycles")?,
        refresh: raw
            .number("--timeout-ms")?
            .map_or(ObserverConfig::default().refresh, Duration::from_millis),
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn connect(target: &Target) -> Result<Sdk, i32> {
    match RemoteAddressSpace::connect((target.host.as_str(), target.port), RemoteConfig::default())
    {
        Ok(space) => Ok(Sdk::new(Arc::new(space))),
        Err(err) => {
            eprintln!("error: cannot reach {}:{}: {err}", target.host, target.port);
            Err(1)
        }
    }
}

fn report<T>(result: Result<T, RegisterError>) -> Result<T, i32> {
    result.map_err(|err| {
        eprintln!("error: {err}");
        1
    })
}

fn run_serve(args: &ServeArgs) -> Result<(), i32> {
    let space = Arc::new(DirectAddressSpace::new(SpaceConfig {
        ack_timeout: args.ack_timeout,
    }));
    let server = RegisterServer::bind((args.target.host.as_str(), args.target.port), space.clone())
        .and_then(RegisterServer::spawn)
        .map_err(|err| {
            eprintln!("error: failed to start server: {err}");
            1
        })?;

    println!("listening on {}", server.local_addr());
    let _ = io::stdout().flush();
    info!(addr = %server.local_addr(), period = ?args.period, "engine running");

    let clock = Clock::new(ClockConfig {
        period: args.period,
    });
    clock.run(&space, &CancelToken::new());
    server.shutdown();
    Ok(())
}

fn run_read(target: &Target, address: u32) -> Result<(), i32> {
    let sdk = connect(target)?;
    let value = report(sdk.read(address))?;
    println!("{value:#010x}");
    Ok(())
}

fn run_write(target: &Target, address: u32, value: u32) -> Result<(), i32> {
    let sdk = connect(target)?;
    report(sdk.write(address, value))
}

fn run_wait(args: &WaitArgs) -> Result<(), i32> {
    let sdk = connect(&args.target)?;
    match report(sdk.wait(&args.condition, None))? {
        WaitOutcome::Satisfied { cycles } => {
            println!("satisfied after {cycles} cycles");
            Ok(())
        }
        WaitOutcome::TimedOut { cycles } => {
            println!("timed out after {cycles} cycles");
            Err(2)
        }
    }
}

fn run_describe(target: &Target, address: u32) -> Result<(), i32> {
    let sdk = connect(target)?;
    println!("{}", report(sdk.describe(address))?);
    Ok(())
}

fn run_reset(target: &Target) -> Result<(), i32> {
    let sdk = connect(target)?;
    report(sdk.reset())
}

fn run_watch(args: &WatchArgs) -> Result<(), i32> {
    let sdk = connect(&args.target)?;
    let mut recorder = SignalRecorder::new();
    for probe in &args.probes {
        let label = report(sdk.describe(probe.address))?;
        let label = if probe.range == BitRange::FULL {
            label
        } else {
            format!("{label}[{}:{}]", probe.range.msb(), probe.range.lsb())
        };
        recorder.add_probe(RegisterProbe::new(label, probe.address, probe.range));
    }

    let stop = CancelToken::new();
    let observer = ObserverLoop::new(ObserverConfig {
        refresh: args.refresh,
        ..ObserverConfig::default()
    });
    let result = observer.run(sdk.space(), &stop, |sentinel| {
        if !recorder.sample(&sdk, u64::from(sentinel), false)? {
            return Ok(());
        }
        println!("{}", format_sample(&recorder, sentinel));
        let recorded = u64::try_from(recorder.len()).unwrap_or(u64::MAX);
        if args.cycles.is_some_and(|limit| recorded >= limit) {
            stop.cancel();
        }
        Ok(())
    });
    report(result).map(|_| ())
}

fn format_sample(recorder: &SignalRecorder, sentinel: u32) -> String {
    let index = recorder.len().saturating_sub(1);
    let fields: Vec<String> = recorder
        .probes()
        .iter()
        .map(|probe| {
            let signal = probe.signal();
            let value = signal
                .value_at(index)
                .map_or_else(|| "-".to_string(), |value| format!("{value:#x}"));
            let marker = if signal.changed_at(index) { "*" } else { "" };
            format!("{}={value}{marker}", signal.label())
        })
        .collect();
    format!("cycle {sentinel}: {}", fields.join(" "))
}

fn run(command: &Command) -> Result<(), i32> {
    match command {
        Command::Serve(args) => run_serve(args),
        Command::Read { target, address } => run_read(target, *address),
        Command::Write {
            target,
            address,
            value,
        } => run_write(target, *address, *value),
        Command::Wait(args) => run_wait(args),
        Command::Describe { target, address } => run_describe(target, *address),
        Command::Reset { target } => run_reset(target),
        Command::Watch(args) => run_watch(args),
    }
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Command(command)) => {
            init_tracing();
            match run(&command) {
                Ok(()) => 0,
                Err(code) => code,
            }
        }
        Err(error) => {
            if error.starts_with("Usage:") {
                println!("{error}");
            } else {
                eprintln!("error: {error}");
                eprintln!("{USAGE_TEXT}");
            }
            1
        }
    };

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn parse(args: &[&str]) -> Result<ParseResult, String> {
        parse_args(args.iter().map(OsString::from))
    }

    fn command(args: &[&str]) -> Command {
        match parse(args).expect("valid args should parse") {
            ParseResult::Command(command) => command,
            ParseResult::Help => panic!("unexpected help"),
        }
    }

    #[test]
    fn parses_serve_with_defaults() {
        assert_eq!(
            command(&["serve"]),
            Command::Serve(ServeArgs {
                target: Target::default(),
                period: Duration::from_millis(10),
                ack_timeout: DEFAULT_ACK_TIMEOUT,
            })
        );
    }

    #[test]
    fn parses_serve_flags() {
        assert_eq!(
            command(&[
                "serve",
                "--port",
                "0",
                "--period-ms",
                "2",
                "--timeout-ms",
                "50"
            ]),
            Command::Serve(ServeArgs {
                target: Target {
                    host: DEFAULT_HOST.to_string(),
                    port: 0,
                },
                period: Duration::from_millis(2),
                ack_timeout: Duration::from_millis(50),
            })
        );
    }

    #[test]
    fn parses_hex_and_decimal_numbers() {
        assert_eq!(
            command(&["write", "0x4001_4004", "17", "--host", "sim.local"]),
            Command::Write {
                target: Target {
                    host: "sim.local".to_string(),
                    port: DEFAULT_PORT,
                },
                address: 0x4001_4004,
                value: 17,
            }
        );
    }

    #[test]
    fn parses_wait_bounds() {
        let Command::Wait(args) = command(&[
            "wait",
            "0x58000010",
            "5",
            "--mask",
            "0xff",
            "--cycles",
            "3",
            "--timeout-ms",
            "100",
        ]) else {
            panic!("expected wait");
        };
        assert_eq!(
            args.condition,
            WaitCondition::new(0x5800_0010, 5)
                .with_mask(0xFF)
                .with_cycles_timeout(3)
                .with_millis_timeout(100)
        );
    }

    #[test]
    fn parses_watch_probes() {
        let Command::Watch(args) = command(&[
            "watch",
            "--probe",
            "0x40014000:7:4",
            "--probe",
            "0x40014004",
            "--cycles",
            "2",
        ]) else {
            panic!("expected watch");
        };
        assert_eq!(
            args.probes,
            vec![
                ProbeSpec {
                    address: 0x4001_4000,
                    range: BitRange::new(7, 4).expect("range"),
                },
                ProbeSpec {
                    address: 0x4001_4004,
                    range: BitRange::FULL,
                },
            ]
        );
        assert_eq!(args.cycles, Some(2));
        assert_eq!(args.refresh, ObserverConfig::default().refresh);
    }

    #[test]
    fn parses_watch_refresh() {
        let Command::Watch(args) =
            command(&["watch", "--probe", "0x40014004", "--timeout-ms", "250"])
        else {
            panic!("expected watch");
        };
        assert_eq!(args.refresh, Duration::from_millis(250));
        assert_eq!(args.cycles, None);
    }

    #[test]
    fn watch_requires_a_probe() {
        let error = parse(&["watch"]).expect_err("watch without probes should fail");
        assert!(error.contains("--probe"));
    }

    #[test]
    fn rejects_inverted_probe_range() {
        let error = parse(&["watch", "--probe", "0x40014000:2:5"])
            .expect_err("inverted range should fail");
        assert!(!error.is_empty());
    }

    #[test]
    fn parses_help_flag() {
        assert!(matches!(parse(&["--help"]), Ok(ParseResult::Help)));
    }

    #[test]
    fn rejects_unknown_command() {
        let error = parse(&["unknown"]).expect_err("unknown command should fail parse");
        assert!(error.contains("unknown command"));
    }

    #[test]
    fn rejects_options_foreign_to_the_command() {
        let error = parse(&["read", "0x0", "--mask", "1"]).expect_err("read takes no mask");
        assert!(error.contains("unknown option: --mask"));
    }

    #[test]
    fn rejects_missing_and_extra_positionals() {
        let missing = parse(&["write", "0x0"]).expect_err("missing value");
        assert!(missing.contains("missing value"));
        let extra = parse(&["reset", "now"]).expect_err("extra argument");
        assert!(extra.contains("unexpected argument"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let error = parse(&["write", "0x1_0000_0000", "1"]).expect_err("too wide");
        assert!(error.contains("invalid address"));
    }
}
