//! The five proxied XInput entry points.
//!
//! Exported with the exact signatures of the real library so the host
//! links against this DLL transparently. Each body is one call into the
//! forwarding primitive; `XInputGetState` carries the control poll because
//! it is the call the host is guaranteed to make at a high, regular rate.

use windows_sys::Win32::UI::Input::XboxController::{
    XINPUT_BATTERY_INFORMATION, XINPUT_CAPABILITIES, XINPUT_KEYSTROKE, XINPUT_STATE,
    XINPUT_VIBRATION,
};

use crate::forward::{forward, Observation, ERROR_DEVICE_NOT_CONNECTED};
use crate::Agent;

type XInputGetStateFn = unsafe extern "system" fn(u32, *mut XINPUT_STATE) -> u32;
type XInputSetStateFn = unsafe extern "system" fn(u32, *mut XINPUT_VIBRATION) -> u32;
type XInputGetCapabilitiesFn =
    unsafe extern "system" fn(u32, u32, *mut XINPUT_CAPABILITIES) -> u32;
type XInputGetBatteryInformationFn =
    unsafe extern "system" fn(u32, u8, *mut XINPUT_BATTERY_INFORMATION) -> u32;
type XInputGetKeystrokeFn = unsafe extern "system" fn(u32, u32, *mut XINPUT_KEYSTROKE) -> u32;

/// Shared shape of all five exports: no agent (attach failed mid-flight)
/// or no resolved target reads as a disconnected device.
fn proxy(
    pick: impl FnOnce(&Agent) -> usize,
    observation: Observation<'_>,
    call: impl FnOnce(usize) -> u32,
) -> u32 {
    match Agent::get() {
        Some(agent) => forward(
            agent,
            pick(agent),
            observation,
            call,
            ERROR_DEVICE_NOT_CONNECTED,
        ),
        None => ERROR_DEVICE_NOT_CONNECTED,
    }
}

#[no_mangle]
pub unsafe extern "system" fn XInputGetState(user_index: u32, state: *mut XINPUT_STATE) -> u32 {
    proxy(
        |agent| agent.targets().get_state,
        Observation::ControlPoll,
        |addr| {
            let f: XInputGetStateFn = std::mem::transmute(addr);
            f(user_index, state)
        },
    )
}

#[no_mangle]
pub unsafe extern "system" fn XInputSetState(
    user_index: u32,
    vibration: *mut XINPUT_VIBRATION,
) -> u32 {
    proxy(
        |agent| agent.targets().set_state,
        Observation::None,
        |addr| {
            let f: XInputSetStateFn = std::mem::transmute(addr);
            f(user_index, vibration)
        },
    )
}

#[no_mangle]
pub unsafe extern "system" fn XInputGetCapabilities(
    user_index: u32,
    flags: u32,
    capabilities: *mut XINPUT_CAPABILITIES,
) -> u32 {
    proxy(
        |agent| agent.targets().get_capabilities,
        Observation::None,
        |addr| {
            let f: XInputGetCapabilitiesFn = std::mem::transmute(addr);
            f(user_index, flags, capabilities)
        },
    )
}

#[no_mangle]
pub unsafe extern "system" fn XInputGetBatteryInformation(
    user_index: u32,
    dev_type: u8,
    battery_information: *mut XINPUT_BATTERY_INFORMATION,
) -> u32 {
    proxy(
        |agent| agent.targets().get_battery_information,
        Observation::None,
        |addr| {
            let f: XInputGetBatteryInformationFn = std::mem::transmute(addr);
            f(user_index, dev_type, battery_information)
        },
    )
}

#[no_mangle]
pub unsafe extern "system" fn XInputGetKeystroke(
    user_index: u32,
    reserved: u32,
    keystroke: *mut XINPUT_KEYSTROKE,
) -> u32 {
    proxy(
        |agent| agent.targets().get_keystroke,
        Observation::None,
        |addr| {
            let f: XInputGetKeystrokeFn = std::mem::transmute(addr);
            f(user_index, reserved, keystroke)
        },
    )
}
