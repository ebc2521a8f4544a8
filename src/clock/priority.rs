//! Scheduling priority control
//!
//! Raising priority is a scarce, fallible OS resource. [`ElevatedPriority`] holds the
//! previous priority for exactly one raise/restore pairing and always restores it,
//! either through [`ElevatedPriority::release`] or when dropped during unwinding.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

use crate::error::PriorityError;

/// Capability to raise the calling thread's priority and put it back.
pub trait PriorityControl: Send + Sync {
    /// Whatever must be remembered to undo a raise.
    type Snapshot: Copy + Send + fmt::Debug;

    /// Raise priority as far as the current privileges allow, returning the previous state.
    /// A failed raise must leave priority unchanged.
    fn raise(&self) -> Result<Self::Snapshot, PriorityError>;

    /// Put back the state captured by [`PriorityControl::raise`].
    fn restore(&self, previous: Self::Snapshot) -> Result<(), PriorityError>;
}

static RAISE_FAILURE_REPORTED: AtomicBool = AtomicBool::new(false);

/// Whether a failed priority raise has been reported by this process.
pub fn raise_failure_reported() -> bool {
    RAISE_FAILURE_REPORTED.load(Ordering::Relaxed)
}

fn report_raise_failure(err: &PriorityError) {
    // Once per process, every later timestamp would fail the same way.
    if !RAISE_FAILURE_REPORTED.swap(true, Ordering::Relaxed) {
        warn!(error = %err, "timing without elevated priority, measurements may be noisier");
    }
}

/// Scoped elevated-priority state.
#[must_use = "dropping the guard restores priority immediately"]
pub struct ElevatedPriority<'a, P: PriorityControl> {
    control: &'a P,
    previous: Option<P::Snapshot>,
}

impl<'a, P: PriorityControl> ElevatedPriority<'a, P> {
    /// Raise priority. A failed raise is reported once and yields an unelevated guard.
    pub fn acquire(control: &'a P) -> Self {
        let previous = match control.raise() {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                report_raise_failure(&err);
                None
            }
        };
        Self { control, previous }
    }

    pub fn is_elevated(&self) -> bool {
        self.previous.is_some()
    }

    /// Restore the previous priority and report whether that worked.
    pub fn release(mut self) -> Result<(), PriorityError> {
        match self.previous.take() {
            Some(previous) => self.control.restore(previous),
            None => Ok(()),
        }
    }
}

impl<P: PriorityControl> Drop for ElevatedPriority<'_, P> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            if let Err(err) = self.control.restore(previous) {
                error!(error = %err, ?previous, "priority left elevated after an aborted timestamp read");
            }
        }
    }
}

/// A raise that affects the whole process, shared by every thread that holds it.
///
/// The first holder raises and keeps the saved state; only the last release restores
/// it, so interleaved threads can not save an already raised state as "previous".
#[cfg_attr(not(windows), allow(dead_code))]
#[derive(Debug)]
struct SharedHold<S> {
    holders: usize,
    saved: Option<S>,
}

#[cfg_attr(not(windows), allow(dead_code))]
impl<S: Copy> SharedHold<S> {
    const fn new() -> Self {
        Self {
            holders: 0,
            saved: None,
        }
    }

    fn acquire(
        &mut self,
        raise: impl FnOnce() -> Result<S, PriorityError>,
    ) -> Result<(), PriorityError> {
        if self.holders == 0 {
            self.saved = Some(raise()?);
        }
        self.holders += 1;
        Ok(())
    }

    fn release(
        &mut self,
        restore: impl FnOnce(S) -> Result<(), PriorityError>,
    ) -> Result<(), PriorityError> {
        match self.holders {
            0 => Ok(()),
            1 => {
                self.holders = 0;
                self.saved.take().map_or(Ok(()), restore)
            }
            _ => {
                self.holders -= 1;
                Ok(())
            }
        }
    }
}

/// Control for targets without a priority API.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPriority;

impl PriorityControl for NoopPriority {
    type Snapshot = ();

    fn raise(&self) -> Result<(), PriorityError> {
        Ok(())
    }

    fn restore(&self, _previous: ()) -> Result<(), PriorityError> {
        Ok(())
    }
}

#[cfg(unix)]
pub use self::unix::NicePriority;

#[cfg(unix)]
mod unix {
    use std::io;

    use super::PriorityControl;
    use crate::error::PriorityError;

    /// Process nice value. On Linux this applies to the calling thread only.
    #[derive(Debug, Clone, Copy)]
    pub struct NicePriority {
        target: libc::c_int,
    }

    impl NicePriority {
        pub const HIGHEST: libc::c_int = -20;

        pub fn with_target(target: libc::c_int) -> Self {
            Self { target }
        }
    }

    impl Default for NicePriority {
        fn default() -> Self {
            Self::with_target(Self::HIGHEST)
        }
    }

    impl PriorityControl for NicePriority {
        type Snapshot = libc::c_int;

        fn raise(&self) -> Result<libc::c_int, PriorityError> {
            let previous = current_nice().map_err(PriorityError::RaiseFailed)?;
            if previous <= self.target {
                return Ok(previous);
            }
            match set_nice(self.target) {
                Ok(()) => Ok(previous),
                Err(err) if is_permission_error(&err) => {
                    // Settle for whatever RLIMIT_NICE lets an unprivileged process reach.
                    let fallback = nice_floor()
                        .and_then(|floor| fallback_target(self.target, floor, previous))
                        .ok_or(PriorityError::RaiseFailed(err))?;
                    set_nice(fallback).map_err(PriorityError::RaiseFailed)?;
                    Ok(previous)
                }
                Err(err) => Err(PriorityError::RaiseFailed(err)),
            }
        }

        fn restore(&self, previous: libc::c_int) -> Result<(), PriorityError> {
            set_nice(previous).map_err(PriorityError::RestoreFailed)
        }
    }

    fn current_nice() -> io::Result<libc::c_int> {
        // -1 is a valid nice value, only errno tells a failure apart.
        clear_errno();
        let value = unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) };
        if value == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error().unwrap_or(0) != 0 {
                return Err(err);
            }
        }
        Ok(value)
    }

    fn set_nice(value: libc::c_int) -> io::Result<()> {
        if unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, value) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn is_permission_error(err: &io::Error) -> bool {
        matches!(err.raw_os_error(), Some(libc::EACCES) | Some(libc::EPERM))
    }

    /// Nice value `target` is lowered to when only `floor` is reachable, if that still
    /// improves on `current`.
    pub(super) fn fallback_target(
        target: libc::c_int,
        floor: libc::c_int,
        current: libc::c_int,
    ) -> Option<libc::c_int> {
        let fallback = floor.max(target);
        (fallback < current).then_some(fallback)
    }

    /// Lowest nice value allowed by a soft `RLIMIT_NICE` of `limit` (`20 - limit`).
    #[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
    pub(super) fn floor_from_limit(limit: u64) -> Option<libc::c_int> {
        match limit {
            0 => None,
            limit => Some((20 - limit.min(40) as libc::c_int).clamp(-20, 19)),
        }
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn nice_floor() -> Option<libc::c_int> {
        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        if unsafe { libc::getrlimit(libc::RLIMIT_NICE, &mut limit) } != 0 {
            return None;
        }
        if limit.rlim_cur == libc::RLIM_INFINITY {
            return None;
        }
        floor_from_limit(limit.rlim_cur as u64)
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn nice_floor() -> Option<libc::c_int> {
        None
    }

    fn clear_errno() {
        #[cfg(target_os = "linux")]
        unsafe {
            *libc::__errno_location() = 0;
        }
        #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
        unsafe {
            *libc::__error() = 0;
        }
    }
}

#[cfg(windows)]
pub use self::windows::{WindowsPriority, WindowsPrioritySnapshot};

#[cfg(windows)]
mod windows {
    use std::io;
    use std::sync::{Mutex, PoisonError};
    use windows_sys::Win32::System::Threading::{
        GetCurrentProcess, GetCurrentThread, GetPriorityClass, GetThreadPriority,
        SetPriorityClass, SetThreadPriority, REALTIME_PRIORITY_CLASS,
        THREAD_PRIORITY_TIME_CRITICAL,
    };

    use super::{PriorityControl, SharedHold};
    use crate::error::PriorityError;

    const THREAD_PRIORITY_ERROR_RETURN: i32 = 0x7FFF_FFFF;

    /// The priority class belongs to the process, so every measuring thread shares it.
    static PROCESS_CLASS: Mutex<SharedHold<u32>> = Mutex::new(SharedHold::new());

    /// Process priority class plus thread priority.
    ///
    /// Without the increase-base-priority privilege Windows quietly grants
    /// `HIGH_PRIORITY_CLASS` instead of the realtime class.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct WindowsPriority;

    #[derive(Debug, Clone, Copy)]
    pub struct WindowsPrioritySnapshot {
        thread_priority: i32,
    }

    fn raise_class() -> Result<u32, PriorityError> {
        unsafe {
            let process = GetCurrentProcess();
            let priority_class = GetPriorityClass(process);
            if priority_class == 0 {
                return Err(PriorityError::RaiseFailed(io::Error::last_os_error()));
            }
            if SetPriorityClass(process, REALTIME_PRIORITY_CLASS) == 0 {
                return Err(PriorityError::RaiseFailed(io::Error::last_os_error()));
            }
            Ok(priority_class)
        }
    }

    fn restore_class(priority_class: u32) -> Result<(), PriorityError> {
        if unsafe { SetPriorityClass(GetCurrentProcess(), priority_class) } == 0 {
            return Err(PriorityError::RestoreFailed(io::Error::last_os_error()));
        }
        Ok(())
    }

    impl PriorityControl for WindowsPriority {
        type Snapshot = WindowsPrioritySnapshot;

        fn raise(&self) -> Result<WindowsPrioritySnapshot, PriorityError> {
            let thread = unsafe { GetCurrentThread() };
            let thread_priority = unsafe { GetThreadPriority(thread) };
            if thread_priority == THREAD_PRIORITY_ERROR_RETURN {
                return Err(PriorityError::RaiseFailed(io::Error::last_os_error()));
            }

            let mut class = PROCESS_CLASS.lock().unwrap_or_else(PoisonError::into_inner);
            class.acquire(raise_class)?;
            if unsafe { SetThreadPriority(thread, THREAD_PRIORITY_TIME_CRITICAL) } == 0 {
                let err = io::Error::last_os_error();
                // Undo our share of the class raise before reporting.
                let _ = class.release(restore_class);
                return Err(PriorityError::RaiseFailed(err));
            }

            Ok(WindowsPrioritySnapshot { thread_priority })
        }

        fn restore(&self, previous: WindowsPrioritySnapshot) -> Result<(), PriorityError> {
            let thread_ok =
                unsafe { SetThreadPriority(GetCurrentThread(), previous.thread_priority) } != 0;
            let thread_err = (!thread_ok).then(io::Error::last_os_error);
            let class_result = PROCESS_CLASS
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .release(restore_class);
            match (thread_err, class_result) {
                (Some(err), _) => Err(PriorityError::RestoreFailed(err)),
                (None, result) => result,
            }
        }
    }
}

/// The priority control used by default on this target.
#[cfg(windows)]
pub type PlatformPriority = WindowsPriority;

#[cfg(unix)]
pub type PlatformPriority = NicePriority;

#[cfg(not(any(unix, windows)))]
pub type PlatformPriority = NoopPriority;
