//! fork/exec plumbing. Everything the child touches is prepared before
//! `fork`; between `fork` and `exec` the child only makes
//! async-signal-safe calls.

use std::ffi::CString;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::ptr;

use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};
use tracing::{debug, trace};

use crate::childman;
use crate::errors::{RtResult, RuntimeError};
use crate::runtime;

/// Descriptor wiring for one child. Later entries win when two share a
/// target, so redirects listed after pipe ends override them.
#[derive(Debug, Default)]
pub struct FdPlan {
    actions: Vec<(OwnedFd, RawFd)>,
}

impl FdPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dup(&mut self, source: OwnedFd, target: RawFd) {
        self.actions.push((source, target));
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn raw(&self) -> Vec<(RawFd, RawFd)> {
        self.actions
            .iter()
            .map(|(fd, target)| (fd.as_raw_fd(), *target))
            .collect()
    }
}

/// Pipe whose both ends are close-on-exec.
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub fn pipe() -> RtResult<(OwnedFd, OwnedFd)> {
    nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
        .map_err(|errno| RuntimeError::process("<pipe>", "pipe", errno))
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
pub fn pipe() -> RtResult<(OwnedFd, OwnedFd)> {
    let (read, write) =
        nix::unistd::pipe().map_err(|errno| RuntimeError::process("<pipe>", "pipe", errno))?;
    for fd in [&read, &write] {
        // SAFETY: fcntl on a descriptor we own.
        if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
            return Err(RuntimeError::process("<pipe>", "fcntl", Errno::last()));
        }
    }
    Ok((read, write))
}

pub fn set_nonblocking(fd: &OwnedFd) -> RtResult<()> {
    let raw = fd.as_raw_fd();
    // SAFETY: fcntl on a descriptor we own.
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags < 0 {
        return Err(RuntimeError::process("<pipe>", "fcntl", Errno::last()));
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(RuntimeError::process("<pipe>", "fcntl", Errno::last()));
    }
    Ok(())
}

/// Status as a shell reports it: exit code, or 128 + signal number.
pub fn exit_code(status: WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
        _ => None,
    }
}

pub fn wait(pid: Pid, cmd: &str) -> RtResult<i32> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => {
                if let Some(code) = exit_code(status) {
                    debug!(pid = pid.as_raw(), code, cmd, "child exited");
                    return Ok(code);
                }
            }
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(RuntimeError::process(cmd, "wait", errno)),
        }
    }
}

pub fn try_wait(pid: Pid, cmd: &str) -> RtResult<Option<i32>> {
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(status) => Ok(exit_code(status)),
        Err(Errno::EINTR) => Ok(None),
        Err(errno) => Err(RuntimeError::process(cmd, "wait", errno)),
    }
}

/// Fork and exec `argv` with the descriptors in `plan`. Exec failure in the
/// child comes back through a close-on-exec pipe as its errno.
pub fn spawn(argv: &[String], plan: &FdPlan) -> RtResult<Pid> {
    let Some(name) = argv.first() else {
        return Err(RuntimeError::process("", "exec", Errno::ENOENT));
    };
    let c_args = argv
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| RuntimeError::incompatible(format!("argument of `{name}` contains a NUL byte")))?;
    let mut c_argv: Vec<*const libc::c_char> = c_args.iter().map(|arg| arg.as_ptr()).collect();
    c_argv.push(ptr::null());

    let mut redirects = plan.raw();
    let floor = redirects
        .iter()
        .map(|&(_, target)| target)
        .max()
        .unwrap_or(2)
        .max(2)
        + 1;

    let (err_read, err_write) = pipe()?;
    debug!(cmd = %argv.join(" "), fds = ?redirects, "spawning");

    // SAFETY: the child branch below only makes async-signal-safe calls.
    match unsafe { fork() } {
        Err(errno) => Err(RuntimeError::process(name, "fork", errno)),
        Ok(ForkResult::Child) => {
            // SAFETY: pointers and descriptors were prepared before the fork.
            unsafe { exec_child(&c_argv, &mut redirects, floor, err_write.as_raw_fd()) }
        }
        Ok(ForkResult::Parent { child }) => {
            drop(err_write);
            match read_exec_error(err_read) {
                Ok(None) => {
                    trace!(pid = child.as_raw(), cmd = %name, "exec succeeded");
                    Ok(child)
                }
                Ok(Some(errno)) => {
                    let _ = wait(child, name);
                    Err(RuntimeError::process(name, "exec", errno))
                }
                Err(err) => {
                    let _ = wait(child, name);
                    Err(RuntimeError::from(err).with_context(format!("spawning `{name}`")))
                }
            }
        }
    }
}

/// Runs in the forked child and never returns.
///
/// Sources are first moved above every target so that wiring one target
/// cannot clobber the source of another.
unsafe fn exec_child(
    argv: &[*const libc::c_char],
    redirects: &mut [(RawFd, RawFd)],
    floor: RawFd,
    report: RawFd,
) -> ! {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        let report_fd = libc::fcntl(report, libc::F_DUPFD_CLOEXEC, floor);
        let report = if report_fd < 0 { report } else { report_fd };
        for pair in redirects.iter_mut() {
            let moved = libc::fcntl(pair.0, libc::F_DUPFD_CLOEXEC, floor);
            if moved < 0 {
                report_and_exit(report);
            }
            pair.0 = moved;
        }
        for &(source, target) in redirects.iter() {
            if libc::dup2(source, target) < 0 {
                report_and_exit(report);
            }
        }
        libc::execvp(argv[0], argv.as_ptr());
        report_and_exit(report)
    }
}

unsafe fn report_and_exit(report: RawFd) -> ! {
    let code = Errno::last_raw().to_ne_bytes();
    unsafe {
        libc::write(report, code.as_ptr().cast(), code.len());
        libc::_exit(127)
    }
}

fn read_exec_error(fd: OwnedFd) -> std::io::Result<Option<Errno>> {
    let mut file = File::from(fd);
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok((filled == buf.len()).then(|| Errno::from_raw(i32::from_ne_bytes(buf))))
}

/// Drain `readers` until every one reaches end-of-file, or until all
/// `children` have exited and a full pass finds no more data. Then wait for
/// whatever is still running. Statuses follow the order of `children`.
pub fn collect(readers: Vec<OwnedFd>, children: &[Pid], cmd: &str) -> RtResult<(Vec<i32>, Vec<Vec<u8>>)> {
    let settings = runtime::settings();
    let mut sources = Vec::with_capacity(readers.len());
    for fd in readers {
        set_nonblocking(&fd)?;
        sources.push(Some(File::from(fd)));
    }
    let mut outputs = vec![Vec::new(); sources.len()];
    let mut statuses: Vec<Option<i32>> = vec![None; children.len()];
    let mut buf = vec![0u8; settings.read_chunk.max(1)];
    let mut children_done = false;

    if let Some(last) = children.last() {
        childman::set_child(*last);
    }
    let drained: RtResult<()> = (|| {
        loop {
            let mut progressed = false;
            for (slot, out) in sources.iter_mut().zip(outputs.iter_mut()) {
                let Some(file) = slot else { continue };
                match file.read(&mut buf) {
                    Ok(0) => *slot = None,
                    Ok(n) => {
                        out.extend_from_slice(&buf[..n]);
                        progressed = true;
                    }
                    Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            if sources.iter().all(Option::is_none) {
                return Ok(());
            }
            if progressed {
                continue;
            }
            if children_done {
                // output descriptors still held open by a grandchild
                trace!(cmd, "children exited with readers still open");
                return Ok(());
            }
            children_done = true;
            for (pid, status) in children.iter().zip(statuses.iter_mut()) {
                if status.is_none() {
                    *status = try_wait(*pid, cmd)?;
                    children_done &= status.is_some();
                }
            }
            if !children_done {
                std::thread::sleep(settings.poll_interval);
            }
        }
    })();
    let waited: RtResult<Vec<i32>> = children
        .iter()
        .zip(statuses)
        .map(|(pid, status)| match status {
            Some(code) => Ok(code),
            None => wait(*pid, cmd),
        })
        .collect();
    childman::clear_child();
    drained?;
    Ok((waited?, outputs))
}
