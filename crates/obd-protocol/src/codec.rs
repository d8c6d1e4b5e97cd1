//! Request encoding and reply decoding
//!
//! Pure functions over the ASCII wire format. No retries happen here.

use crate::error::ObdError;
use crate::pid::Pid;

/// Adapter sentinel for an unanswered request
pub const NO_DATA: &str = "NODATA";

/// Progress line some adapters print while auto-detecting the protocol
const SEARCHING: &str = "SEARCHING...";

/// Build the request text for a PID, e.g. `"01 0C"`
pub fn encode_request(pid: Pid) -> String {
    format!("{:02X} {:02X}", pid.mode(), pid.code())
}

/// Collapse a raw reply into bare hex text.
///
/// Drops the prompt, blank lines, `SEARCHING...` and any echo of `request`,
/// then removes the remaining whitespace.
pub fn normalize_reply(reply: &str, request: &str) -> String {
    let echo: String = request
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    reply
        .split(['\r', '\n'])
        .map(|line| line.trim_matches(|c: char| c == '>' || c.is_whitespace()))
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case(SEARCHING))
        .map(|line| {
            line.chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_uppercase()
        })
        .filter(|line| *line != echo)
        .collect()
}

/// Extract the payload bytes that follow the `(mode + 0x40, pid)` prefix.
pub fn parse_payload(pid: Pid, reply: &str) -> Result<Vec<u8>, ObdError> {
    let text = normalize_reply(reply, &encode_request(pid));
    if text.is_empty() {
        return Err(ObdError::EmptyResponse);
    }
    if text == NO_DATA {
        return Err(ObdError::NoData);
    }

    let expected = format!("{:02X}{:02X}", pid.mode() + 0x40, pid.code());
    let payload = text
        .strip_prefix(&expected)
        .ok_or_else(|| ObdError::UnexpectedPrefix {
            expected: expected.clone(),
            reply: text.clone(),
        })?;

    let bytes = decode_hex(payload)?;
    if bytes.len() < pid.response_bytes() {
        return Err(ObdError::ShortResponse {
            expected: pid.response_bytes(),
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}

/// Decode a reply into the PID's physical value.
pub fn decode_response(pid: Pid, reply: &str, tank_volume_liters: f64) -> Result<f64, ObdError> {
    let bytes = parse_payload(pid, reply)?;
    Ok(pid.apply_formula(&bytes, tank_volume_liters))
}

/// Decode the `01 00` reply into its bitmask.
pub fn decode_supported_pids(reply: &str) -> Result<u32, ObdError> {
    let bytes = parse_payload(Pid::SupportedPids, reply)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Render bytes as uppercase hex, optionally space separated
pub fn encode_hex(bytes: &[u8], spaced: bool) -> String {
    let parts: Vec<String> = bytes.iter().map(|b| format!("{:02X}", b)).collect();
    parts.join(if spaced { " " } else { "" })
}

fn decode_hex(text: &str) -> Result<Vec<u8>, ObdError> {
    if text.len() % 2 != 0 || !text.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ObdError::InvalidHex(text.to_string()));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16)
                .map_err(|_| ObdError::InvalidHex(text.to_string()))
        })
        .collect()
}
