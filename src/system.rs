use std::io;

use crate::error::BenchError;

/// Restrict the calling thread to a single CPU.
pub fn pin_to_cpu(cpu: usize) -> Result<(), BenchError> {
    let max = 8 * std::mem::size_of::<libc::cpu_set_t>();
    if cpu >= max {
        return Err(BenchError::Affinity {
            cpu,
            source: io::Error::from_raw_os_error(libc::EINVAL),
        });
    }
    let rc = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if rc != 0 {
        return Err(BenchError::Affinity {
            cpu,
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Lock current and future pages so page faults stay out of the samples.
pub fn lock_memory() -> Result<(), BenchError> {
    let rc = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    if rc != 0 {
        return Err(BenchError::MemoryLock(io::Error::last_os_error()));
    }
    Ok(())
}
