/*
 * Boot Sequence
 *
 * Brings the kernel core up inside an embedder-supplied machine: installs
 * the platform, filesystem and loader, adopts the calling context as the
 * initial thread, spawns the service threads, and finally enables
 * interrupts.
 *
 * Booting again tears nothing down explicitly; it installs a fresh
 * scheduler context and platform, which is what the hosted test suite
 * leans on to run scenarios back to back in one process.
 */

use alloc::boxed::Box;
use alloc::sync::Arc;

use crate::config::{BootConfig, PRI_MAX, PRI_MIN, SchedPolicy};
use crate::fs::{self, FileSystem};
use crate::intr;
use crate::platform::{self, Platform};
use crate::scheduler::process::Loader;
use crate::scheduler::{self, ThreadFlags, mlfq, process, thread};
use crate::sync::lock;
use crate::utils::timer;

/// Boot the kernel core. The caller becomes the initial thread and
/// continues after the boot with interrupts enabled.
pub fn start(
    config: BootConfig,
    platform: Arc<dyn Platform>,
    filesystem: Box<dyn FileSystem>,
    loader: Box<dyn Loader>,
) {
    platform::install(platform.clone());
    intr::reset();
    thread::reset_tids();
    timer::reset();

    let initial = thread::allocate_tid();
    scheduler::init(config.policy, initial);
    platform.adopt(initial);

    let fs_lock = lock::create();
    fs::install(filesystem, fs_lock);
    process::install_loader(loader);

    let idle = scheduler::spawn_flagged("idle", PRI_MIN, ThreadFlags::SERVICE, idle_loop)
        .expect("could not spawn the idle thread");
    scheduler::with_scheduler_mut(|s| s.idle_thread = idle);

    let wakeup = scheduler::spawn_flagged(
        "wakeup",
        PRI_MAX,
        ThreadFlags::SERVICE,
        timer::alarm_service_loop,
    )
    .expect("could not spawn the alarm service thread");
    scheduler::with_scheduler_mut(|s| s.wakeup_thread = Some(wakeup));

    if config.policy == SchedPolicy::Mlfq {
        let mlfqs = scheduler::spawn_flagged("mlfqs", PRI_MAX, ThreadFlags::SERVICE, mlfq::service_loop)
            .expect("could not spawn the MLFQ service thread");
        scheduler::with_scheduler_mut(|s| s.mlfqs_thread = Some(mlfqs));
    }

    intr::enable();
    log::info!("kernel up, {:?} scheduling", config.policy);
}

/// The idle thread: parked except when nothing else is runnable, in which
/// case it immediately offers the CPU back.
fn idle_loop() {
    loop {
        let old = intr::disable();
        scheduler::block_current();
        intr::set_level(old);
        crate::platform::get().relax();
    }
}
