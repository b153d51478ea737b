//! Background root scanner.
//!
//! One thread per provider re-enumerates attached devices, diffs the result
//! against the last committed state, updates the registry and identifier
//! store, and raises a single coalesced roots notification per cycle that
//! produced an actual difference. The scanner starts paused; `resume`
//! unpauses and triggers one immediate pass. Repeated resumes coalesce into
//! at most one pending extra pass. Pausing cancels an in-flight cycle
//! promptly via an atomic flag checked between per-device steps.
//!
//! A cycle cancelled after committing changes leaves a pending-notify mark
//! so the notification is not lost; it fires at the end of the next
//! completed, unpaused cycle.

use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::notifications::ChangeResource;
use crate::provider::{DeviceEntry, ProviderState, SessionState, Shared};
use crate::transport::{DeviceId, DeviceRecord, StorageRecord};

/// Result of one scan cycle.
pub(crate) struct ScanOutcome {
    /// Whether the cycle committed any add/remove/update.
    pub(crate) changed: bool,
    /// Whether the cycle ran to completion (false when cancelled).
    pub(crate) completed: bool,
}

#[derive(Default)]
struct ControlState {
    paused: bool,
    /// Single-entry wake signal: at most one pending extra pass.
    wake: bool,
    stop: bool,
    /// Committed changes whose notification has not fired yet.
    pending_notify: bool,
}

struct ScanControl {
    state: Mutex<ControlState>,
    cond: Condvar,
    cancel: AtomicBool,
}

/// Handle to the scanner thread.
pub(crate) struct RootScanner {
    control: Arc<ScanControl>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RootScanner {
    /// Spawns the scanner thread, initially paused.
    pub(crate) fn spawn(shared: Arc<Shared>) -> Self {
        let control = Arc::new(ScanControl {
            state: Mutex::new(ControlState {
                paused: true,
                ..ControlState::default()
            }),
            cond: Condvar::new(),
            cancel: AtomicBool::new(false),
        });
        let thread_control = Arc::clone(&control);
        let handle = std::thread::Builder::new()
            .name("mtp-root-scanner".to_string())
            .spawn(move || run(shared, thread_control))
            .expect("failed to spawn root scanner thread");
        Self {
            control,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Stops enumeration and cancels any in-flight cycle.
    pub(crate) fn pause(&self) {
        let mut state = self.control.state.lock().unwrap();
        state.paused = true;
        self.control.cancel.store(true, Ordering::Relaxed);
        self.control.cond.notify_all();
    }

    /// Resumes periodic enumeration and triggers one immediate pass.
    pub(crate) fn resume(&self) {
        let mut state = self.control.state.lock().unwrap();
        state.paused = false;
        state.wake = true;
        self.control.cancel.store(false, Ordering::Relaxed);
        self.control.cond.notify_all();
    }

    /// Stops the thread and joins it. Idempotent.
    pub(crate) fn stop(&self) {
        {
            let mut state = self.control.state.lock().unwrap();
            state.stop = true;
            self.control.cancel.store(true, Ordering::Relaxed);
            self.control.cond.notify_all();
        }
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

fn run(shared: Arc<Shared>, control: Arc<ScanControl>) {
    debug!("root scanner started (interval {:?})", shared.config.scan_interval);
    loop {
        // Wait for: stop, or resumed and (woken or interval elapsed).
        {
            let mut state = control.state.lock().unwrap();
            loop {
                if state.stop {
                    debug!("root scanner stopping");
                    return;
                }
                if state.paused {
                    state = control.cond.wait(state).unwrap();
                    continue;
                }
                if state.wake {
                    state.wake = false;
                    break;
                }
                let (guard, timeout) = control
                    .cond
                    .wait_timeout(state, shared.config.scan_interval)
                    .unwrap();
                state = guard;
                if timeout.timed_out() && !state.stop && !state.paused {
                    break;
                }
            }
        }

        let outcome = shared.scan_once(&control.cancel);

        let notify = {
            let mut state = control.state.lock().unwrap();
            if outcome.completed && !state.paused {
                let fire = outcome.changed || state.pending_notify;
                state.pending_notify = false;
                fire
            } else {
                if outcome.changed {
                    state.pending_notify = true;
                }
                false
            }
        };
        if notify {
            debug!("root scan: root set changed, notifying");
            shared.notifier.notify(&ChangeResource::Roots);
        }
    }
}

impl Shared {
    /// Runs one enumeration cycle against the transport and commits the
    /// resulting diff. Cancellation is honored between per-device steps.
    pub(crate) fn scan_once(&self, cancel: &AtomicBool) -> ScanOutcome {
        debug!("root scan: enumerating devices");
        let records = match self.transport.list_devices() {
            Ok(records) => records,
            Err(error) => {
                warn!("root scan: device enumeration failed: {}", error);
                return ScanOutcome {
                    changed: false,
                    completed: true,
                };
            }
        };
        if cancel.load(Ordering::Relaxed) {
            return ScanOutcome {
                changed: false,
                completed: false,
            };
        }

        let mut changed = false;
        let mut completed = true;
        let mut sessions_to_close: Vec<DeviceId> = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            let mut seen: HashSet<DeviceId> = HashSet::new();
            for record in records {
                if cancel.load(Ordering::Relaxed) {
                    debug!("root scan: cancelled mid-cycle");
                    completed = false;
                    break;
                }
                seen.insert(record.device_id);
                changed |= apply_device_record(&mut state, record, self.config.scan_failure_limit);
            }

            // Only a completed cycle may conclude that a device vanished.
            if completed {
                let vanished: Vec<DeviceId> = state
                    .devices
                    .keys()
                    .copied()
                    .filter(|device_id| !seen.contains(device_id))
                    .collect();
                for device_id in vanished {
                    info!("root scan: device {} vanished", device_id);
                    changed = true;
                    if let Some(entry) = state.devices.remove(&device_id)
                        && entry.state == SessionState::Open
                    {
                        sessions_to_close.push(device_id);
                    }
                    state.store.clear_device(device_id);
                }
            }
        }

        for device_id in sessions_to_close {
            if let Err(error) = self.transport.close_session(device_id) {
                debug!("root scan: closing session of vanished device {}: {}", device_id, error);
            }
        }

        ScanOutcome { changed, completed }
    }
}

/// Applies one device record to the registry and store. Returns whether the
/// device's visible state changed.
fn apply_device_record(state: &mut ProviderState, record: DeviceRecord, failure_limit: u32) -> bool {
    let device_id = record.device_id;
    let is_new = !state.devices.contains_key(&device_id);
    if is_new {
        info!("root scan: new device {} ({})", device_id, record.name);
    }
    let entry = state
        .devices
        .entry(device_id)
        .or_insert_with(|| DeviceEntry::new(record.name.clone()));

    // Per-device error isolation: an erroring device keeps its stale roots
    // until the failure persists past the configured limit, then reports
    // none. A healthy cycle resets the failure count.
    let effective: Vec<StorageRecord> = if record.errors.is_empty() {
        entry.scan_failures = 0;
        record.storages.clone()
    } else {
        entry.scan_failures += 1;
        if entry.scan_failures >= failure_limit {
            warn!(
                "root scan: device {} failed {} consecutive cycles ({:?}), clearing roots",
                device_id, entry.scan_failures, record.errors
            );
            Vec::new()
        } else {
            debug!(
                "root scan: device {} errored ({:?}), keeping stale roots",
                device_id, record.errors
            );
            entry.storages.clone()
        }
    };

    let changed =
        is_new || entry.name != record.name || entry.observed_open != record.opened || entry.storages != effective;

    entry.name = record.name.clone();
    entry.observed_open = record.opened;
    entry.errors = record.errors;
    entry.storages = effective.clone();
    state.store.put_roots(device_id, &record.name, &effective);

    changed
}
