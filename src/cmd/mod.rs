//! Turns command nodes into processes: build the argument vectors and
//! redirections, fork every stage with its descriptors wired, then wait
//! or hand the children to the background table.

mod builder;
pub mod process;

pub use builder::{CmdIoData, Direction};

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::OwnedFd;
use std::thread::JoinHandle;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, trace};

use crate::ast::{Cmd, CmdFull};
use crate::childman;
use crate::errors::{RtResult, RuntimeError};
use crate::objects::ObjectFactory;
use crate::symbol_table::SymbolTableStack;
use process::FdPlan;

/// Name of the root-scope variable holding the last foreground status.
pub const STATUS_VAR: &str = "__status__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdOutput {
    pub status: i32,
    pub output: String,
}

/// A fully resolved pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdData {
    pub args: Vec<String>,
    pub redirects: Vec<CmdIoData>,
}

/// Descriptors the parent keeps after the children are forked.
#[derive(Default)]
struct Spawned {
    capture: Option<OwnedFd>,
    to_variables: Vec<(String, OwnedFd)>,
    feeders: Vec<(OwnedFd, String)>,
}

pub struct CmdExecutor<'a> {
    stack: &'a SymbolTableStack,
}

impl<'a> CmdExecutor<'a> {
    pub fn new(stack: &'a SymbolTableStack) -> Self {
        Self { stack }
    }

    /// Run a command. `None` when it went to the background, otherwise the
    /// status of the last stage.
    pub fn exec(&self, node: &CmdFull) -> RtResult<Option<i32>> {
        let stages = self.build(node.cmd())?;
        Ok(self
            .launch(stages, node.background(), false)?
            .map(|out| out.status))
    }

    /// Run a command in the foreground and capture its standard output.
    pub fn exec_get_result(&self, node: &CmdFull) -> RtResult<CmdOutput> {
        let stages = self.build(node.cmd())?;
        self.launch(stages, false, true)?
            .ok_or_else(|| RuntimeError::null_access("captured command produced no result"))
    }

    /// Resolve every stage before anything is forked.
    pub fn build(&self, cmd: &Cmd) -> RtResult<Vec<CmdData>> {
        let mut stages = Vec::new();
        self.build_into(cmd, &mut stages)?;
        if stages.is_empty() {
            return Err(RuntimeError::incompatible("empty pipeline"));
        }
        Ok(stages)
    }

    fn build_into(&self, cmd: &Cmd, stages: &mut Vec<CmdData>) -> RtResult<()> {
        match cmd {
            Cmd::Simple(simple) => stages.push(CmdData {
                args: self.build_args(simple.children())?,
                redirects: vec![],
            }),
            Cmd::IoRedirectList(list) => stages.push(CmdData {
                args: self.build_args(list.cmd().children())?,
                redirects: list
                    .children()
                    .iter()
                    .map(|io| self.build_redirect(io))
                    .collect::<RtResult<_>>()?,
            }),
            Cmd::PipeSequence(seq) => {
                for stage in seq.children() {
                    self.build_into(stage, stages)?;
                }
            }
        }
        Ok(())
    }

    fn launch(&self, stages: Vec<CmdData>, background: bool, capture: bool) -> RtResult<Option<CmdOutput>> {
        let name = stages
            .iter()
            .map(|s| s.args.join(" "))
            .collect::<Vec<_>>()
            .join(" | ");
        debug!(cmd = %name, background, capture, "dispatch");
        let mut children = Vec::with_capacity(stages.len());
        match self.spawn_all(stages, background, capture, &mut children) {
            Ok(spawned) => self.finish(spawned, &children, background, &name),
            Err(err) => {
                abort(&children, &name);
                Err(err)
            }
        }
    }

    fn spawn_all(
        &self,
        stages: Vec<CmdData>,
        background: bool,
        capture: bool,
        children: &mut Vec<Pid>,
    ) -> RtResult<Spawned> {
        let count = stages.len();
        let mut spawned = Spawned::default();
        let mut upstream: Option<OwnedFd> = None;
        for (i, stage) in stages.into_iter().enumerate() {
            let mut plan = FdPlan::new();
            if let Some(read) = upstream.take() {
                plan.dup(read, 0);
            }
            if i + 1 < count {
                let (read, write) = process::pipe()?;
                plan.dup(write, 1);
                upstream = Some(read);
            } else if capture {
                let (read, write) = process::pipe()?;
                plan.dup(write, 1);
                spawned.capture = Some(read);
            }
            for io in &stage.redirects {
                wire_redirect(io, background, &mut plan, &mut spawned)?;
            }
            children.push(process::spawn(&stage.args, &plan)?);
            // the parent's copies of the child ends close here
            drop(plan);
        }
        Ok(spawned)
    }

    fn finish(
        &self,
        spawned: Spawned,
        children: &[Pid],
        background: bool,
        name: &str,
    ) -> RtResult<Option<CmdOutput>> {
        let feeders = spawn_feeders(spawned.feeders);
        if background {
            childman::register_background(children);
            debug!(cmd = name, pids = ?children, "running in background");
            return Ok(None);
        }

        let capturing = spawned.capture.is_some();
        let mut readers: Vec<OwnedFd> = spawned.capture.into_iter().collect();
        let mut names = Vec::with_capacity(spawned.to_variables.len());
        for (var, fd) in spawned.to_variables {
            names.push(var);
            readers.push(fd);
        }
        let (statuses, mut outputs) = process::collect(readers, children, name)?;
        for feeder in feeders {
            let _ = feeder.join();
        }

        let f = ObjectFactory::new(self.stack);
        let captured = if capturing { outputs.remove(0) } else { Vec::new() };
        for (var, bytes) in names.into_iter().zip(outputs) {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            trace!(var = %var, len = text.len(), "bind command output");
            self.stack.insert(&var, f.new_string(text), false);
        }
        let status = statuses.last().copied().unwrap_or_default();
        self.stack.insert(STATUS_VAR, f.new_int(status.into()), true);
        Ok(Some(CmdOutput {
            status,
            output: String::from_utf8_lossy(&captured).into_owned(),
        }))
    }
}

fn open_redirect(io: &CmdIoData) -> RtResult<File> {
    let path = io.content.as_str();
    let opened = match io.direction {
        Direction::In => File::open(path),
        Direction::Out => OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path),
        _ => OpenOptions::new().append(true).create(true).open(path),
    };
    opened.map_err(|e| RuntimeError::from(e).with_context(format!("redirect `{path}`")))
}

fn wire_redirect(io: &CmdIoData, background: bool, plan: &mut FdPlan, spawned: &mut Spawned) -> RtResult<()> {
    let source: OwnedFd = match io.direction {
        Direction::In | Direction::Out | Direction::OutAppend => open_redirect(io)?.into(),
        Direction::InVariable => {
            let (read, write) = process::pipe()?;
            spawned.feeders.push((write, format!("{}\n", io.content)));
            read
        }
        // nobody is left to read a background command's output
        Direction::OutVariable if background => OpenOptions::new()
            .write(true)
            .open("/dev/null")
            .map_err(RuntimeError::from)?
            .into(),
        Direction::OutVariable => {
            let (read, write) = process::pipe()?;
            spawned.to_variables.push((io.content.clone(), read));
            write
        }
    };
    if io.all && !io.direction.is_input() {
        plan.dup(source.try_clone().map_err(RuntimeError::from)?, 1);
        plan.dup(source, 2);
    } else {
        plan.dup(source, io.n_iface);
    }
    Ok(())
}

/// Each here-string is written from its own thread.
fn spawn_feeders(feeders: Vec<(OwnedFd, String)>) -> Vec<JoinHandle<()>> {
    feeders
        .into_iter()
        .map(|(fd, text)| {
            std::thread::spawn(move || {
                let mut file = File::from(fd);
                // a child that exits without reading closes the pipe early
                let _ = file.write_all(text.as_bytes());
            })
        })
        .collect()
}

/// Stop and reap the stages already forked when a later one fails.
fn abort(children: &[Pid], name: &str) {
    for pid in children {
        let _ = kill(*pid, Signal::SIGKILL);
        let _ = process::wait(*pid, name);
    }
}
