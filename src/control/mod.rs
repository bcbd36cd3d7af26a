//! Command plane: text commands to the RHX command server.
//!
//! Data never flows here. The command socket only switches TCP output on
//! and off per channel, changes the run mode and answers `get` queries.
//!
//! # Workflow
//!
//! 1. `execute clearalldataoutputs;`
//! 2. `set a-000.tcpdataoutputenabled true; ...` for each wanted channel
//! 3. `set runmode run;`
//! 4. Binary data begins on the waveform and spike sockets
//!
//! # Example
//!
//! ```ignore
//! use rhx_tcp_client::control::{routine_commands, CommandChannel};
//!
//! let mut channel = CommandChannel::new(stream);
//! for command in routine_commands(16) {
//!     channel.send(&command).await?;
//! }
//! ```

mod channel;
mod command;

pub use channel::{CommandChannel, COMMAND_BUFFER_SIZE};
pub use command::{
    clear_all_data_outputs, enable_channel, get_run_mode, get_sample_rate, get_type,
    manual_stim_trigger_pulse, native_channel_name, nth_channel_name, parse_return,
    parse_run_mode_reply, parse_sample_rate_reply, parse_type_reply, routine_commands,
    set_base_filename, set_file_path, set_run_mode, set_stim_enabled, upload_stim_parameters,
    ControllerType, RunMode, CHANNELS_PER_PORT,
};
