use anyhow::{Context, Result};
use clap::Parser;
use commandline::{CliArgs, CliCommands, OutputFormat, SetCommand};
use flexi_logger::{Logger, LoggerHandle};
use hysen2pfc_lib::{
    emulator::Emulator,
    protocol::{check_echo, crc16_modbus, encode_request, verify_payload},
    Change, Clock, Hysen2pfc, PeriodUpdate, Status,
};
use log::*;
use snapshot::{parse_hex, to_hex};
use std::{ops::Deref, panic};

mod commandline;
mod snapshot;

fn logging_init(loglevel: LevelFilter) -> Result<LoggerHandle> {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .with_context(|| "Cannot init logging")?
        .start()
        .with_context(|| "Cannot start logging")?;

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);
        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("<cause unknown>")
        });

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unknown>"),
            filename,
            line,
            column,
            cause
        );
    }));
    Ok(log_handle)
}

fn print_status(status: &Status, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Debug => println!("Status: {status:#?}"),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(status).with_context(|| "Cannot format status as JSON")?
        ),
        OutputFormat::Yaml => print!(
            "{}",
            serde_yaml::to_string(status).with_context(|| "Cannot format status as YAML")?
        ),
    }
    Ok(())
}

fn seed_status(args: &CliArgs) -> Result<Status> {
    if let Some(path) = &args.snapshot {
        return snapshot::load(path);
    }
    if let Some(hex) = &args.status {
        return Status::decode(&parse_hex(hex)?)
            .with_context(|| "Cannot decode seed status payload");
    }
    let default_file = snapshot::DEFAULT_SNAPSHOT_FILE;
    if std::path::Path::new(default_file).exists() {
        return snapshot::load(default_file);
    }
    info!("No snapshot given, emulated device starts with factory defaults");
    Ok(Status::default())
}

fn open_device(args: &CliArgs) -> Result<(Hysen2pfc<Emulator>, Emulator)> {
    let emulator = Emulator::new(&seed_status(args)?);
    emulator.set_latency(args.latency);
    let mut device = Hysen2pfc::new(emulator.clone());
    device.set_timeout(args.timeout);
    device
        .connect()
        .with_context(|| "Cannot connect to emulated device")?;
    Ok((device, emulator))
}

fn to_change(command: &SetCommand) -> Change {
    match *command {
        SetCommand::KeyLock { value } => Change::KeyLock(value),
        SetCommand::Power { value } => Change::Power(value.into()),
        SetCommand::Mode { value } => Change::OperationMode(value),
        SetCommand::Fan { value } => Change::FanMode(value),
        SetCommand::TargetTemp { value } => Change::TargetTemp(value),
        SetCommand::Hysteresis { value } => Change::Hysteresis(value),
        SetCommand::Calibration { value } => Change::Calibration(value),
        SetCommand::CoolingMax { value } => Change::CoolingMaxTemp(value),
        SetCommand::CoolingMin { value } => Change::CoolingMinTemp(value),
        SetCommand::HeatingMax { value } => Change::HeatingMaxTemp(value),
        SetCommand::HeatingMin { value } => Change::HeatingMinTemp(value),
        SetCommand::FanControl { value } => Change::FanControl(value),
        SetCommand::FrostProtection { value } => Change::FrostProtection(value),
        SetCommand::Time {
            hour,
            minute,
            second,
            weekday,
        } => Change::Clock(Clock {
            hour,
            minute,
            second,
            weekday,
        }),
        SetCommand::TimeNow => Change::Clock(Clock::from_datetime(&chrono::Local::now())),
        SetCommand::Schedule { value } => Change::Schedule(value),
        SetCommand::Period {
            edge,
            enable,
            disable,
            hour,
            minute,
        } => {
            let enabled = match (enable, disable) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            Change::Period(edge, PeriodUpdate::new(enabled, hour, minute))
        }
    }
}

fn print_exchanges(emulator: &Emulator) {
    for exchange in emulator.exchanges() {
        println!("> {}", to_hex(&encode_request(&exchange.request)));
        println!("< {}", to_hex(&encode_request(&exchange.response)));
    }
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter())?;

    let emulator = match &args.command {
        CliCommands::Crc { hex } => {
            let crc = crc16_modbus(&parse_hex(hex)?);
            println!("CRC16/MODBUS: {crc:#06X} ({})", to_hex(&crc.to_le_bytes()));
            None
        }
        CliCommands::Frame { hex } => {
            println!("{}", to_hex(&encode_request(&parse_hex(hex)?)));
            None
        }
        CliCommands::DecodeStatus { hex, format } => {
            let status = Status::decode(&parse_hex(hex)?)
                .with_context(|| "Cannot decode status payload")?;
            print_status(&status, *format)?;
            None
        }
        CliCommands::CheckResponse { request, payload } => {
            let request = parse_hex(request)?;
            let verified = verify_payload(&parse_hex(payload)?)
                .and_then(|verified| check_echo(&request, &verified).map(|_| verified))
                .with_context(|| "Response rejected")?;
            println!("{}", to_hex(&verified));
            None
        }
        CliCommands::Status { format } => {
            let (mut device, emulator) = open_device(&args)?;
            let status = device.get_status().with_context(|| "Cannot get status")?;
            print_status(&status, *format)?;
            if status.clock_drifted(&Clock::from_datetime(&chrono::Local::now())) {
                warn!("Device clock {} differs from host clock", status.clock());
            }
            Some(emulator)
        }
        CliCommands::Set { command } => {
            let (mut device, emulator) = open_device(&args)?;
            let change = to_change(command);
            let result = device.apply(change);
            print_exchanges(&emulator);
            result.with_context(|| format!("Cannot set {change}"))?;
            let status = emulator
                .status()
                .with_context(|| "Cannot read emulated device")?;
            print_status(&status, OutputFormat::Debug)?;
            Some(emulator)
        }
    };

    if let (Some(path), Some(emulator)) = (&args.save, emulator) {
        let status = emulator
            .status()
            .with_context(|| "Cannot read emulated device")?;
        snapshot::save(path, &status)?;
    }

    Ok(())
}
