//! Text commands understood by the RHX command server.
//!
//! Commands are plain ASCII, several may be sent in one write separated by
//! `;`. `get` queries are answered with a line of the form
//! `Return: <Parameter> <Value>`.
//!
//! # Example
//!
//! ```
//! use rhx_tcp_client::control::{enable_channel, native_channel_name};
//!
//! let channel = native_channel_name('A', 1);
//! assert_eq!(
//!     enable_channel(&channel, true, true),
//!     "set a-001.tcpdataoutputenabled true; set a-001.tcpdataoutputenabledspike true;"
//! );
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RhxError};

/// Controller run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Acquiring and streaming.
    Run,
    /// Idle.
    Stop,
    /// Acquiring, streaming and saving to disk.
    Record,
    /// Waiting for a trigger before recording.
    Trigger,
}

impl RunMode {
    /// Wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Run => "run",
            RunMode::Stop => "stop",
            RunMode::Record => "record",
            RunMode::Trigger => "trigger",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = RhxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "run" => Ok(RunMode::Run),
            "stop" => Ok(RunMode::Stop),
            "record" => Ok(RunMode::Record),
            "trigger" => Ok(RunMode::Trigger),
            other => Err(RhxError::Protocol(format!("Unknown run mode: {}", other))),
        }
    }
}

/// Type of controller the RHX software is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerType {
    /// Recording controller on USB 2.
    RecordUsb2,
    /// Recording controller on USB 3.
    RecordUsb3,
    /// Stimulation/recording controller.
    StimRecord,
}

impl ControllerType {
    /// Wire spelling as returned by `get type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerType::RecordUsb2 => "ControllerRecordUSB2",
            ControllerType::RecordUsb3 => "ControllerRecordUSB3",
            ControllerType::StimRecord => "ControllerStimRecord",
        }
    }

    /// Only stimulation controllers accept stim commands.
    pub fn is_stim(&self) -> bool {
        matches!(self, ControllerType::StimRecord)
    }

    /// Suffix of the files this controller writes (`rhs` or `rhd`).
    pub fn file_suffix(&self) -> &'static str {
        if self.is_stim() {
            "rhs"
        } else {
            "rhd"
        }
    }
}

impl FromStr for ControllerType {
    type Err = RhxError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        [
            ControllerType::RecordUsb2,
            ControllerType::RecordUsb3,
            ControllerType::StimRecord,
        ]
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| RhxError::Protocol(format!("Unknown controller type: {}", s)))
    }
}

/// Channels on one headstage port.
pub const CHANNELS_PER_PORT: usize = 128;

/// Native channel name for `index` on `port`, e.g. `a-010`.
pub fn native_channel_name(port: char, index: usize) -> String {
    format!("{}-{:03}", port.to_ascii_lowercase(), index)
}

/// Disable TCP output on every channel.
pub fn clear_all_data_outputs() -> String {
    "execute clearalldataoutputs;".to_string()
}

/// Enable or disable wideband and spike TCP output for one channel.
pub fn enable_channel(channel: &str, wide: bool, spike: bool) -> String {
    format!(
        "set {ch}.tcpdataoutputenabled {wide}; set {ch}.tcpdataoutputenabledspike {spike};",
        ch = channel,
        wide = wide,
        spike = spike
    )
}

/// Change the run mode.
pub fn set_run_mode(mode: RunMode) -> String {
    format!("set runmode {};", mode)
}

/// Query the run mode.
pub fn get_run_mode() -> String {
    "get runmode;".to_string()
}

/// Query the amplifier sample rate.
pub fn get_sample_rate() -> String {
    "get sampleratehertz;".to_string()
}

/// Query the controller type.
pub fn get_type() -> String {
    "get type;".to_string()
}

/// Enable or disable stimulation on one channel (stim controllers only).
pub fn set_stim_enabled(channel: &str, enabled: bool) -> String {
    format!("set {}.stimenabled {};", channel, enabled)
}

/// Push the stimulation parameters of `channel` to the hardware.
pub fn upload_stim_parameters(channel: &str) -> String {
    format!("execute uploadstimparameters {};", channel)
}

/// Fire a manual stimulation trigger, e.g. `f1`.
pub fn manual_stim_trigger_pulse(key: &str) -> String {
    format!("execute manualstimtriggerpulse {};", key)
}

/// Base name (no suffix) of files written in record mode.
pub fn set_base_filename(name: &str) -> String {
    format!("set filename.basefilename {};", name)
}

/// Directory of files written in record mode.
pub fn set_file_path(path: &str) -> String {
    format!("set filename.path {};", path)
}

/// Native name of the `index`-th amplifier channel counting from `a-000`,
/// moving to the next port every [`CHANNELS_PER_PORT`] channels.
pub fn nth_channel_name(index: usize) -> String {
    let port = (b'a' + (index / CHANNELS_PER_PORT % 26) as u8) as char;
    native_channel_name(port, index % CHANNELS_PER_PORT)
}

/// Commands that clear all outputs, enable wide and spike output on the
/// first `channel_count` channels (port A first), and start acquisition.
pub fn routine_commands(channel_count: usize) -> Vec<String> {
    let mut commands = Vec::with_capacity(channel_count + 2);
    commands.push(clear_all_data_outputs());
    for index in 0..channel_count {
        commands.push(enable_channel(&nth_channel_name(index), true, true));
    }
    commands.push(set_run_mode(RunMode::Run));
    commands
}

/// Extract the value of a `Return: <parameter> <value>` reply.
///
/// The parameter name is matched case-insensitively.
pub fn parse_return<'a>(reply: &'a str, parameter: &str) -> Result<&'a str> {
    for line in reply.lines() {
        let Some(rest) = line.trim().strip_prefix("Return:") else {
            continue;
        };
        let mut parts = rest.trim().splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        if name.eq_ignore_ascii_case(parameter) {
            let value = parts.next().unwrap_or_default().trim();
            if value.is_empty() {
                break;
            }
            return Ok(value.trim_end_matches(';'));
        }
    }
    Err(RhxError::Protocol(format!(
        "Expected 'Return: {} <value>', got: {:?}",
        parameter,
        reply.trim()
    )))
}

/// Parse the reply to [`get_run_mode`].
pub fn parse_run_mode_reply(reply: &str) -> Result<RunMode> {
    parse_return(reply, "RunMode")?.parse()
}

/// Parse the reply to [`get_type`].
pub fn parse_type_reply(reply: &str) -> Result<ControllerType> {
    parse_return(reply, "Type")?.parse()
}

/// Parse the reply to [`get_sample_rate`].
pub fn parse_sample_rate_reply(reply: &str) -> Result<f64> {
    let value = parse_return(reply, "SampleRateHertz")?;
    value
        .parse::<f64>()
        .map_err(|_| RhxError::Protocol(format!("Invalid sample rate: {}", value)))
}
