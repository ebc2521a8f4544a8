//! Host description attached to reports
//!
//! Collected once per process and cached.

use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use sysinfo::System;

lazy_static::lazy_static! {
    static ref SYSTEM_INFORMATION: Mutex<Option<SystemInformation>> = Mutex::new(None);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemInformation {
    pub os: String,
    pub cpu: String,
    pub logical_cores: usize,
    pub total_memory_mb: u64,
    /// Whether the process may raise priority to the realtime class.
    pub elevated_privileges: bool,
}

/// Cached host description.
pub fn system_information() -> SystemInformation {
    let mut cached = SYSTEM_INFORMATION
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    cached.get_or_insert_with(collect).clone()
}

fn collect() -> SystemInformation {
    let mut system = System::new();
    system.refresh_memory();
    system.refresh_cpu_all();

    let cpu = cpu_brand()
        .or_else(|| system.cpus().first().map(|cpu| cpu.brand().trim().to_owned()))
        .filter(|brand| !brand.is_empty())
        .unwrap_or_else(|| "Unknown".to_owned());

    SystemInformation {
        os: os_info::get().to_string(),
        cpu,
        logical_cores: system.cpus().len(),
        total_memory_mb: system.total_memory() / (1024 * 1024),
        elevated_privileges: is_admin(),
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn cpu_brand() -> Option<String> {
    raw_cpuid::CpuId::new()
        .get_processor_brand_string()
        .map(|brand| brand.as_str().trim().to_owned())
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn cpu_brand() -> Option<String> {
    None
}

#[cfg(windows)]
pub fn is_admin() -> bool {
    use std::mem::{self, size_of};
    use std::ptr;
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
    use windows_sys::Win32::Security::{
        GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY,
    };
    use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    unsafe {
        let mut token: HANDLE = ptr::null_mut();
        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) == 0 {
            return false;
        }
        let mut elevation: TOKEN_ELEVATION = mem::zeroed();
        let mut size = size_of::<TOKEN_ELEVATION>() as u32;
        let elevated = GetTokenInformation(
            token,
            TokenElevation,
            &mut elevation as *mut _ as *mut std::ffi::c_void,
            size,
            &mut size,
        ) != 0
            && elevation.TokenIsElevated != 0;
        CloseHandle(token);
        elevated
    }
}

#[cfg(unix)]
pub fn is_admin() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(any(unix, windows)))]
pub fn is_admin() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collected_once_and_reused() {
        let first = system_information();
        let second = system_information();
        assert_eq!(first, second);
        assert!(!first.os.is_empty());
        assert!(!first.cpu.is_empty());
    }
}
