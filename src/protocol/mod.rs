// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Protocol module - Contact-ID frames as sent by alarm devices
//!
//! A frame is a fixed-width ASCII record terminated by [`FRAME_DELIMITER`]:
//!
//! ```text
//!  0      7      11     15       20  21
//!  ├──────┼──────┼──────┼────────┼───┤
//!  │header│acct  │code  │zone/etc│DC4│
//!  └──────┴──────┴──────┴────────┴───┘
//! ```
//!
//! Every frame is answered with a single [`ACK`] or [`NACK`] byte.

mod cid;

pub use cid::{extract_device_id, frame_text, is_message_valid, rewrite_frame, FrameError};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Frame terminator (DC4)
pub const FRAME_DELIMITER: u8 = 0x14;

/// Positive acknowledgement
pub const ACK: u8 = 0x06;

/// Negative acknowledgement
pub const NACK: u8 = 0x15;

/// Width of a complete frame, delimiter included
pub const CID_FRAME_LEN: usize = 21;

/// Byte range of the account number
pub const ACCOUNT_RANGE: std::ops::Range<usize> = 7..11;

/// Byte range of the event code
pub const CODE_RANGE: std::ops::Range<usize> = 11..15;

/// Largest account number that fits the 4-digit field
pub const MAX_ACCOUNT: u64 = 9999;

/// Frame validation and rewrite rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CidRules {
    /// Leading characters every frame must start with
    pub required_prefix: String,

    /// Exact frame length in bytes, delimiter included
    pub valid_length: usize,

    /// Offset added to account numbers inside the rewrite range
    pub acc_num_add: u32,

    /// Lowest account number that gets the offset
    pub acc_num_min: u32,

    /// Highest account number that gets the offset
    pub acc_num_max: u32,

    /// Event code substitutions, e.g. `E603 -> E602`
    pub test_code_map: HashMap<String, String>,
}

impl Default for CidRules {
    fn default() -> Self {
        let mut test_code_map = HashMap::new();
        test_code_map.insert("E603".to_string(), "E602".to_string());

        Self {
            required_prefix: "5".to_string(),
            valid_length: CID_FRAME_LEN,
            acc_num_add: 2100,
            acc_num_min: 2000,
            acc_num_max: 2200,
            test_code_map,
        }
    }
}

impl CidRules {
    /// Whether `account` gets the offset applied
    pub fn in_rewrite_range(&self, account: u32) -> bool {
        (self.acc_num_min..=self.acc_num_max).contains(&account)
    }

    /// Replacement for an event code, if one is configured
    pub fn map_code<'a>(&'a self, code: &'a str) -> &'a str {
        self.test_code_map.get(code).map(String::as_str).unwrap_or(code)
    }
}
