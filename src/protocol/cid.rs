// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Contact-ID frame validation and account rewriting

use thiserror::Error;
use tracing::debug;

use super::{CidRules, ACCOUNT_RANGE, CID_FRAME_LEN, CODE_RANGE, FRAME_DELIMITER, MAX_ACCOUNT};

/// Why a frame could not be rewritten
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Frame is not exactly 21 bytes
    #[error("invalid message length: got {got}, want 21")]
    InvalidLength {
        /// Received length
        got: usize,
    },

    /// Account field is not four ASCII digits
    #[error("error converting account number '{raw}'")]
    InvalidAccount {
        /// Account field as received
        raw: String,
    },

    /// Offset account does not fit four digits
    #[error("rewritten account number {value} does not fit in 4 digits")]
    AccountOverflow {
        /// Account after the offset
        value: u64,
    },

    /// Code substitution has the wrong width
    #[error("code mapping '{code}' -> '{replacement}' changes the frame width")]
    InvalidCodeMapping {
        /// Code found in the frame
        code: String,
        /// Configured substitute
        replacement: String,
    },
}

/// Length and prefix check, delimiter included
pub fn is_message_valid(frame: &[u8], rules: &CidRules) -> bool {
    !frame.is_empty()
        && frame.len() == rules.valid_length
        && !rules.required_prefix.is_empty()
        && frame.starts_with(rules.required_prefix.as_bytes())
}

fn parse_account(frame: &[u8]) -> Result<u32, FrameError> {
    let raw = frame.get(ACCOUNT_RANGE).ok_or(FrameError::InvalidLength { got: frame.len() })?;
    let invalid = || FrameError::InvalidAccount {
        raw: String::from_utf8_lossy(raw).into_owned(),
    };

    if !raw.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(invalid)
}

/// Apply the account offset and code substitutions to a full frame.
///
/// The result has the same width as the input.
pub fn rewrite_frame(frame: &[u8], rules: &CidRules) -> Result<Vec<u8>, FrameError> {
    if frame.len() != CID_FRAME_LEN {
        return Err(FrameError::InvalidLength { got: frame.len() });
    }

    let original = parse_account(frame)?;
    let account = if rules.in_rewrite_range(original) {
        u64::from(original) + u64::from(rules.acc_num_add)
    } else {
        u64::from(original)
    };
    if account > MAX_ACCOUNT {
        return Err(FrameError::AccountOverflow { value: account });
    }

    let code = String::from_utf8_lossy(&frame[CODE_RANGE]).into_owned();
    let new_code = rules.map_code(&code);
    if new_code.len() != CODE_RANGE.len() {
        return Err(FrameError::InvalidCodeMapping {
            code: code.clone(),
            replacement: new_code.to_string(),
        });
    }

    let mut out = Vec::with_capacity(frame.len());
    out.extend_from_slice(&frame[..ACCOUNT_RANGE.start]);
    out.extend_from_slice(format!("{:04}", account).as_bytes());
    out.extend_from_slice(new_code.as_bytes());
    out.extend_from_slice(&frame[CODE_RANGE.end..]);

    debug!("Changed account number {:04} -> {:04}", original, account);
    Ok(out)
}

/// Device id carried by a (rewritten) frame
pub fn extract_device_id(frame: &[u8]) -> Result<u32, FrameError> {
    parse_account(frame)
}

/// Frame as text, delimiter stripped
pub fn frame_text(frame: &[u8]) -> String {
    let body = frame.strip_suffix(&[FRAME_DELIMITER]).unwrap_or(frame);
    String::from_utf8_lossy(body).into_owned()
}
