use clap::{Parser, Subcommand};
use clap_num::number_range;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use hysen2pfc_lib::{
    FanControl, FanMode, FrostProtection, Hysteresis, KeyLock, OperationMode, ScheduleEdge,
    WeeklySchedule,
};
use std::time::Duration;

fn hour(s: &str) -> Result<u8, String> {
    number_range(s, 0, 23)
}

fn minute(s: &str) -> Result<u8, String> {
    number_range(s, 0, 59)
}

fn weekday(s: &str) -> Result<u8, String> {
    number_range(s, 1, 7)
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum Switch {
    On,
    Off,
}

impl From<Switch> for bool {
    fn from(value: Switch) -> bool {
        value == Switch::On
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Debug,
    Json,
    Yaml,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum SetCommand {
    /// Front panel key lock; any lock also enables the remote lock
    KeyLock {
        /// all_unlocked, power_unlocked or all_locked
        value: KeyLock,
    },
    /// Switch the controller on or off
    Power {
        #[arg(value_enum)]
        value: Switch,
    },
    /// Operation mode: fan, cool or heat
    Mode { value: OperationMode },
    /// Fan speed: low, medium, high or auto (auto is not available in fan mode)
    Fan { value: FanMode },
    /// Target temperature in °C, within the limits of the current mode
    TargetTemp { value: u8 },
    /// Switching hysteresis: 0.5 or 1 °C
    Hysteresis { value: Hysteresis },
    /// Room sensor calibration offset in °C, -5.0 to 5.0
    Calibration {
        #[arg(allow_hyphen_values = true)]
        value: f32,
    },
    /// Cooling maximum temperature in °C
    CoolingMax { value: u8 },
    /// Cooling minimum temperature in °C
    CoolingMin { value: u8 },
    /// Heating maximum temperature in °C
    HeatingMax { value: u8 },
    /// Heating minimum temperature in °C
    HeatingMin { value: u8 },
    /// Fan behaviour once the target is reached: in_control or out_of_control
    FanControl { value: FanControl },
    /// Frost protection: on or off
    FrostProtection { value: FrostProtection },
    /// Set the device clock
    Time {
        #[arg(long, value_parser = hour)]
        hour: u8,
        #[arg(long, value_parser = minute)]
        minute: u8,
        #[arg(long, value_parser = minute, default_value_t = 0)]
        second: u8,
        /// 1 (Monday) to 7 (Sunday)
        #[arg(long, value_parser = weekday)]
        weekday: u8,
    },
    /// Set the device clock from the host clock
    TimeNow,
    /// Days sharing the daily schedule: today, 12345_67, 123456_7 or 1234567
    Schedule { value: WeeklySchedule },
    /// Change one schedule period edge; omitted values are kept
    Period {
        /// period1_on, period1_off, period2_on or period2_off
        edge: ScheduleEdge,
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
        #[arg(long, value_parser = hour)]
        hour: Option<u8>,
        #[arg(long, value_parser = minute)]
        minute: Option<u8>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Print the CRC-16/MODBUS of hex bytes
    Crc { hex: String },
    /// Print the request frame for hex command bytes
    Frame { hex: String },
    /// Decode a captured 35 byte status payload
    DecodeStatus {
        hex: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Debug)]
        format: OutputFormat,
    },
    /// Verify a decrypted response payload against its request and print the command payload
    CheckResponse {
        /// Command bytes of the request
        #[arg(long)]
        request: String,
        /// Decrypted response payload, length byte to CRC
        payload: String,
    },
    /// Show the status of the emulated device
    Status {
        #[arg(long, value_enum, default_value_t = OutputFormat::Debug)]
        format: OutputFormat,
    },
    /// Run one setter against the emulated device
    Set {
        #[command(subcommand)]
        command: SetCommand,
    },
}

const fn about_text() -> &'static str {
    "hysen 2-pipe fan coil controller protocol tool"
}

#[derive(Parser, Debug)]
#[command(version, about=about_text(), long_about = None)]
pub struct CliArgs {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    #[command(subcommand)]
    pub command: CliCommands,

    /// YAML status snapshot seeding the emulated device
    #[arg(long, conflicts_with = "status")]
    pub snapshot: Option<String>,

    /// Captured 35 byte status payload (hex) seeding the emulated device
    #[arg(long)]
    pub status: Option<String>,

    /// Write the final state of the emulated device to this YAML snapshot
    #[arg(long)]
    pub save: Option<String>,

    /// Timeout for each request (e.g., "500ms", "1s", "2s 500ms")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "5s")]
    pub timeout: Duration,

    /// Simulated response time of the emulated device (e.g., "0ms", "200ms")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "0ms")]
    pub latency: Duration,
}
