//! Real-time scheduling helpers (Linux SCHED_FIFO / affinity / mlockall).
//!
//! Applied once per process, before the rig's threads start. Every step is
//! best-effort: a refusal is logged, never fatal, since the rig also runs
//! fine (with more jitter) under the normal scheduler.

use crate::cli::RtLock;

#[cfg(target_os = "linux")]
/// Capacity of cpu_set_t in CPU indices (bits).
const MAX_CPUSET_BITS: usize = std::mem::size_of::<libc::cpu_set_t>() * 8;

#[cfg(target_os = "linux")]
pub fn setup_rt_once(rt: bool, prio: Option<i32>, lock: RtLock, rt_cpu: Option<usize>) {
    use libc::{
        CPU_ISSET, CPU_SET, CPU_ZERO, SCHED_FIFO, sched_get_priority_max, sched_get_priority_min,
        sched_param, sched_setscheduler,
    };
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !rt {
        return;
    }

    #[inline]
    fn try_apply_mem_lock(lock: RtLock) -> eyre::Result<()> {
        use libc::{MCL_CURRENT, MCL_FUTURE, mlockall};

        let flags = match lock {
            RtLock::None => return Ok(()),
            RtLock::Current => MCL_CURRENT,
            RtLock::All => MCL_CURRENT | MCL_FUTURE,
        };
        let rc = unsafe { mlockall(flags) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            // An All refusal under EPERM/ENOMEM may still allow Current.
            if matches!(lock, RtLock::All)
                && matches!(err.raw_os_error(), Some(c) if c == libc::EPERM || c == libc::ENOMEM)
                && unsafe { mlockall(MCL_CURRENT) } == 0
            {
                return Ok(());
            }
            eyre::bail!(
                "mlockall failed: {err}; hint: needs CAP_IPC_LOCK (or root) and sufficient 'ulimit -l'"
            );
        }
        Ok(())
    }

    #[inline]
    fn try_apply_fifo_priority(prio: Option<i32>) -> eyre::Result<()> {
        let (min, max) = unsafe {
            let min = sched_get_priority_min(SCHED_FIFO);
            let max = sched_get_priority_max(SCHED_FIFO);
            if min < 0 || max < 0 { (1, 99) } else { (min, max) }
        };
        let wanted = prio.unwrap_or(max);
        let param = sched_param {
            sched_priority: wanted.clamp(min, max),
        };
        let rc = unsafe { sched_setscheduler(0, SCHED_FIFO, &param) };
        if rc != 0 {
            eyre::bail!(
                "{}; hint: needs CAP_SYS_NICE or root (e.g. `sudo setcap cap_sys_nice=ep /path/to/spotter`)",
                std::io::Error::last_os_error()
            );
        }
        Ok(())
    }

    /// Pin the process to a single CPU if permitted by the current mask.
    #[inline]
    fn try_apply_affinity(rt_cpu: Option<usize>) -> eyre::Result<()> {
        let online = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if online < 1 {
            eyre::bail!("_SC_NPROCESSORS_ONLN < 1");
        }
        let target = rt_cpu.unwrap_or(0);
        if target as libc::c_long >= online {
            eyre::bail!("requested CPU {target} >= online {online}");
        }
        if target >= MAX_CPUSET_BITS {
            eyre::bail!("requested CPU {target} exceeds cpu_set_t capacity {MAX_CPUSET_BITS}");
        }
        let mut allowed: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        unsafe { CPU_ZERO(&mut allowed) };
        let rc =
            unsafe { libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut allowed) };
        if rc == 0 && !unsafe { CPU_ISSET(target, &allowed) } {
            eyre::bail!("CPU {target} not permitted by current affinity mask");
        }
        let mut desired: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        unsafe {
            CPU_ZERO(&mut desired);
            CPU_SET(target, &mut desired);
        }
        let rc =
            unsafe { libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &desired) };
        if rc != 0 {
            eyre::bail!(std::io::Error::last_os_error());
        }
        Ok(())
    }

    RT_ONCE.get_or_init(|| {
        match try_apply_mem_lock(lock) {
            Ok(()) => tracing::info!(?lock, "RT memory lock applied"),
            Err(err) => tracing::warn!(error = %err, "mlockall failed"),
        }
        match try_apply_fifo_priority(prio) {
            Ok(()) => tracing::info!(prio = ?prio, "SCHED_FIFO applied"),
            Err(err) => tracing::warn!(error = %err, "SCHED_FIFO not applied"),
        }
        match try_apply_affinity(rt_cpu) {
            Ok(()) => tracing::info!(cpu = rt_cpu.unwrap_or(0), "CPU affinity applied"),
            Err(err) => tracing::warn!(error = %err, "affinity not applied"),
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(rt: bool, _prio: Option<i32>, _lock: RtLock, _rt_cpu: Option<usize>) {
    if rt {
        tracing::warn!("--rt is only supported on Linux; running under the normal scheduler");
    }
}
