use crate::midi::ReconcileStrategy;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// List MIDI sources and destinations
    #[arg(long)]
    pub list: bool,

    /// Print incoming MIDI messages until interrupted
    #[arg(long)]
    pub monitor: bool,

    /// Send a short message given as hex bytes, e.g. "90 40 7F"
    #[arg(long, value_name = "HEX")]
    pub send: Option<String>,

    /// Destination for --send, matched against destination names
    #[arg(long, value_name = "NAME", requires = "send")]
    pub destination: Option<String>,

    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Hot-plug handling, overrides the configuration (poll or reset)
    #[arg(long, value_name = "STRATEGY")]
    pub strategy: Option<ReconcileStrategy>,

    /// Log to stderr instead of the log file
    #[arg(long)]
    pub log_stderr: bool,
}

/// Parses up to three hex bytes into a status byte and two data bytes.
/// Spaces, commas and an optional 0x prefix per byte are accepted.
pub fn parse_hex_message(input: &str) -> Result<(u8, u8, u8), String> {
    let bytes = input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(|token| {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            u8::from_str_radix(digits, 16).map_err(|_| format!("'{}' is not a hex byte", token))
        })
        .collect::<Result<Vec<u8>, String>>()?;

    match bytes.as_slice() {
        [] => Err("no bytes given".to_string()),
        [status, ..] if *status < 0x80 => {
            Err(format!("{:02X} is not a status byte", status))
        }
        [status] => Ok((*status, 0, 0)),
        [status, data1] => Ok((*status, *data1, 0)),
        [status, data1, data2] => Ok((*status, *data1, *data2)),
        _ => Err(format!(
            "at most three bytes fit a short message, got {}",
            bytes.len()
        )),
    }
}

pub fn validate_destination(name: &str, destinations: &[String]) -> Result<(), String> {
    if !destinations.iter().any(|d| d.contains(name)) {
        let mut error_msg = format!(
            "Error: Destination '{}' not found in available destinations:\n",
            name
        );
        for destination in destinations {
            error_msg.push_str(&format!("  - {}\n", destination));
        }
        return Err(error_msg);
    }
    Ok(())
}
