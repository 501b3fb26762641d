// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Device module - known devices and their histories

mod registry;
mod state;

pub use registry::{DeviceHandle, DeviceRegistry, RegistryError};
pub use state::DeviceState;
