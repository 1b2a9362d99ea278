//! Raw frame encoder
//!
//! Streams `rgb24` frames into an ffmpeg child process over stdin.

use anyhow::Result;
use image::RgbImage;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use tracing::{debug, info, warn};

use super::FrameSink;
use crate::config::RenderConfig;
use crate::error::CommandError;
use crate::media::ffmpeg;

pub fn encoder_command(render: &RenderConfig, output: &Path) -> Command {
    let mut cmd = ffmpeg();
    cmd.arg("-f").arg("rawvideo")
        .arg("-pix_fmt").arg("rgb24")
        .arg("-s").arg(format!("{}x{}", render.width, render.height))
        .arg("-r").arg(render.fps.to_string())
        .arg("-i").arg("-")
        .arg("-c:v").arg(&render.encoder)
        .args(&render.encoder_args)
        .arg(output);
    cmd
}

/// Running ffmpeg process accepting frames. Dropping it closes stdin and
/// waits for the process, so an aborted render leaves no orphan behind.
pub struct VideoEncoder {
    program: String,
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    frames: u64,
}

impl VideoEncoder {
    pub fn spawn(render: &RenderConfig, output: &Path) -> Result<Self, CommandError> {
        Self::spawn_command(encoder_command(render, output))
    }

    fn spawn_command(mut cmd: Command) -> Result<Self, CommandError> {
        let program = cmd.get_program().to_string_lossy().into_owned();
        cmd.stdin(Stdio::piped()).stdout(Stdio::null()).stderr(Stdio::inherit());
        debug!("Starting encoder {:?}", cmd);

        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?;
        let stdin = child.stdin.take().map(BufWriter::new);
        Ok(Self {
            program,
            child,
            stdin,
            frames: 0,
        })
    }

    fn broken_pipe(&self, source: io::Error) -> CommandError {
        CommandError::BrokenPipe {
            program: self.program.clone(),
            source,
        }
    }

    /// Close stdin and wait for ffmpeg to finish writing the file
    pub fn finish(mut self) -> Result<u64, CommandError> {
        let flushed = match self.stdin.take() {
            Some(mut stdin) => stdin.flush(),
            None => Ok(()),
        };

        let status = self.child.wait().map_err(|source| CommandError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        flushed.map_err(|e| self.broken_pipe(e))?;
        if !status.success() {
            return Err(CommandError::Failed {
                program: self.program.clone(),
                status,
                stderr: String::new(),
            });
        }

        info!("Encoded {} frames", self.frames);
        Ok(self.frames)
    }
}

impl FrameSink for VideoEncoder {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let result = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(frame.as_raw()),
            None => Err(io::Error::from(io::ErrorKind::BrokenPipe)),
        };
        result.map_err(|e| self.broken_pipe(e))?;
        self.frames += 1;
        Ok(())
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        // Already closed and waited for by `finish`
        let Some(mut stdin) = self.stdin.take() else {
            return;
        };
        let _ = stdin.flush();
        drop(stdin);

        match self.child.wait() {
            Ok(status) => debug!(
                "{} stopped after {} frames with {}",
                self.program, self.frames, status
            ),
            Err(e) => warn!("Failed to wait for {}: {}", self.program, e),
        }
    }
}
