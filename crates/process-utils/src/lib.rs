//! Child process helpers for the autosr workspace.
//!
//! [`tokio_command`] builds commands that never pop up a console window on
//! Windows. [`supervise`] hands a spawned child to a waiter task on a
//! `TaskTracker` and returns a [`SupervisedChild`] that can be killed any number of times
//! without signalling a process that already exited.

#[cfg(feature = "tokio")]
mod supervised;

#[cfg(feature = "tokio")]
pub use supervised::{ChildExit, SupervisedChild, supervise};

/// Windows `CREATE_NO_WINDOW` process creation flag.
#[cfg(all(windows, feature = "tokio"))]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Build a `tokio::process::Command` for `program`.
///
/// On Windows the child gets no console window; elsewhere this is
/// `Command::new`.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<std::ffi::OsStr>) -> tokio::process::Command {
    #[allow(unused_mut)]
    let mut cmd = tokio::process::Command::new(program);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.as_std_mut().creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}
