//! Shared audio host for capture and playback
//!
//! Both the microphone loop and the speech queue open streams against one
//! process-wide host so device enumeration happens once and repeated
//! open/close cycles don't re-initialize the backend.

use std::sync::{Mutex, OnceLock};

use cpal::Device;
use cpal::traits::HostTrait;

use crate::{Error, Result};

static HOST: OnceLock<Mutex<cpal::Host>> = OnceLock::new();

/// Run `f` with the shared audio host, constructing it on first use.
///
/// # Errors
///
/// Returns error if the host mutex is poisoned.
pub fn with_host<T>(f: impl FnOnce(&cpal::Host) -> Result<T>) -> Result<T> {
    let host = HOST.get_or_init(|| Mutex::new(cpal::default_host()));
    let guard = host
        .lock()
        .map_err(|_| Error::Audio("audio host lock poisoned".to_string()))?;
    f(&guard)
}

/// Get the default input device from the shared host
///
/// # Errors
///
/// Returns error if no input device is available.
pub fn input_device() -> Result<Device> {
    with_host(|host| {
        host.default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))
    })
}

/// Get the default output device from the shared host
///
/// # Errors
///
/// Returns error if no output device is available.
pub fn output_device() -> Result<Device> {
    with_host(|host| {
        host.default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))
    })
}
