//! Command output
//!
//! Listing output is paged through `less` when stdout is a terminal, and
//! can additionally be duplicated to a file (`-O path`). The pager's
//! stdin is fed synchronously; if the user quits the pager early the
//! resulting broken pipe simply ends the output, it is not an error. The
//! pager child is reaped and the file handle closed on every exit path.

use std::fs::File;
use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::error::CmdError;

pub struct CommandOutput {
    pager: Option<Child>,
    output_file: Option<File>,
    // Set once the pager pipe breaks; suppresses further pager writes.
    pager_gone: bool,
}

impl CommandOutput {
    /// Pager-backed output (the common case for listings).
    pub fn new(output_path: Option<&Path>) -> Result<Self, CmdError> {
        Self::with_pagination(true, output_path)
    }

    /// Plain stdout output, still honoring the output file.
    pub fn unpaged(output_path: Option<&Path>) -> Result<Self, CmdError> {
        Self::with_pagination(false, output_path)
    }

    fn with_pagination(paginate: bool, output_path: Option<&Path>) -> Result<Self, CmdError> {
        let output_file = match output_path {
            Some(path) => Some(File::create(path)?),
            None => None,
        };
        let pager = if paginate && io::stdout().is_terminal() {
            match spawn_pager() {
                Ok(child) => Some(child),
                Err(err) => {
                    tracing::warn!("failed to spawn pager, writing to stdout: {err}");
                    None
                }
            }
        } else {
            None
        };
        Ok(Self {
            pager,
            output_file,
            pager_gone: false,
        })
    }

    /// Write a full output line.
    pub fn line(&mut self, text: impl AsRef<str>) {
        self.emit(text.as_ref(), true);
    }

    /// Write without a trailing newline (long listings build a line from
    /// several pieces).
    pub fn write(&mut self, text: impl AsRef<str>) {
        self.emit(text.as_ref(), false);
    }

    fn emit(&mut self, text: &str, newline: bool) {
        if let Some(file) = &mut self.output_file {
            let res = if newline {
                writeln!(file, "{text}")
            } else {
                write!(file, "{text}")
            };
            if let Err(err) = res {
                tracing::warn!("failed to write output file: {err}");
                self.output_file = None;
            }
        }
        match &mut self.pager {
            Some(child) if !self.pager_gone => {
                if let Some(stdin) = child.stdin.as_mut() {
                    let res = if newline {
                        writeln!(stdin, "{text}")
                    } else {
                        write!(stdin, "{text}")
                    };
                    if res.is_err() {
                        // The user quit the pager; stop feeding it.
                        self.pager_gone = true;
                    }
                }
            }
            Some(_) => {}
            None => {
                if newline {
                    println!("{text}");
                } else {
                    print!("{text}");
                    let _ = io::stdout().flush();
                }
            }
        }
    }

    /// Close the pager's stdin and wait for it to exit.
    pub fn finish(&mut self) {
        if let Some(mut child) = self.pager.take() {
            drop(child.stdin.take());
            let _ = child.wait();
        }
        self.output_file = None;
    }
}

impl Drop for CommandOutput {
    fn drop(&mut self) {
        self.finish();
    }
}

fn spawn_pager() -> io::Result<Child> {
    Command::new("less")
        .env("SHELL", "/bin/true")
        .env("LESSSECURE", "1")
        .env("LESS", "-d -F -X -PPress 'q' to quit --> $")
        .stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    // Under `cargo test` stdout is not a tty, so no pager is spawned and
    // output goes to stdout plus the optional file.
    #[test]
    fn tee_writes_lines_to_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        {
            let mut out = CommandOutput::new(Some(&path)).unwrap();
            out.line("vol-111");
            out.write("i-");
            out.write("222");
            out.line("");
        }
        let mut contents = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "vol-111\ni-222\n");
    }

    #[test]
    fn unwritable_output_file_is_an_io_error() {
        let err = CommandOutput::new(Some(Path::new("/nonexistent-dir/out.txt")));
        assert!(matches!(err, Err(CmdError::Io(_))));
    }
}
