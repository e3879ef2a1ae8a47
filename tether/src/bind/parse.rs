//! Parser for `lsof -Ffn` output

use super::BindError;

/// Prefix of the name record for a socket bound on all interfaces
const WILDCARD_NAME_PREFIX: &str = "n*:";

/// Extract the bound port from field-per-line lsof output.
///
/// With `-Ffn` lsof prints something like:
///
/// ```text
/// p19730
/// f123
/// n*:41254
/// ```
///
/// The pid and file descriptor records only have to be present. Anything other
/// than exactly these three records is malformed and never retried.
///
/// # Panics
///
/// Panics if the port does not fit in 16 bits; lsof never prints such a port.
pub fn parse_lsof_output(output: &str) -> Result<u16, BindError> {
    let text = output.strip_suffix('\n').unwrap_or(output);
    let lines: Vec<&str> = text.split('\n').collect();

    let value = match lines.as_slice() {
        [_pid, _fd, name] => name
            .strip_prefix(WILDCARD_NAME_PREFIX)
            .and_then(|port| port.parse::<i32>().ok()),
        _ => None,
    };

    match value {
        Some(port) if port > 0 => Ok(checked_port(port)),
        _ => Err(BindError::MalformedOutput {
            output: output.to_string(),
        }),
    }
}

fn checked_port(value: i32) -> u16 {
    match u16::try_from(value) {
        Ok(port) => port,
        Err(_) => panic!("parsed invalid port: {value}"),
    }
}
