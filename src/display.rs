use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::DisplayError;
use crate::plotting::{plot_scatter, PlotStyle, ScatterPlot};

/// Where the finished figure goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Show in an image viewer and block until dismissed, then delete the figure.
    /// If input closes before that, the figure is left on disk for the viewer.
    /// `viewer` overrides the platform default opener.
    Window { viewer: Option<String> },
    /// Write a PNG and return.
    File(PathBuf),
}

impl Default for Target {
    fn default() -> Self {
        Target::Window { viewer: None }
    }
}

/// Render `plot` and present it. Blocks for `Target::Window`.
pub fn present(plot: &ScatterPlot, style: &PlotStyle, target: &Target) -> Result<(), DisplayError> {
    match target {
        Target::File(path) => {
            plot_scatter(plot, style, path)?;
            info!(path = %path.display(), "figure written");
            Ok(())
        }
        Target::Window { viewer } => {
            let figure = tempfile::Builder::new()
                .prefix("node2vec-viz-")
                .suffix(".png")
                .tempfile()?;
            plot_scatter(plot, style, figure.path())?;

            open_in_viewer(figure.path(), viewer.as_deref())?;

            let stdin = io::stdin();
            let dismissed = wait_for_dismissal(stdin.lock(), io::stdout())?;
            release_figure(figure, dismissed)?;
            Ok(())
        }
    }
}

fn default_viewer() -> (&'static str, Vec<&'static str>) {
    if cfg!(target_os = "macos") {
        ("open", vec![])
    } else if cfg!(target_os = "windows") {
        ("cmd", vec!["/C", "start", ""])
    } else {
        ("xdg-open", vec![])
    }
}

fn open_in_viewer(path: &Path, viewer: Option<&str>) -> Result<(), DisplayError> {
    let mut command = match viewer {
        Some(program) => Command::new(program),
        None => {
            let (program, args) = default_viewer();
            let mut command = Command::new(program);
            command.args(args);
            command
        }
    };
    command.arg(path);

    let viewer_name = format!("{:?}", command.get_program());
    debug!(viewer = %viewer_name, path = %path.display(), "launching image viewer");

    let status = command.status().map_err(|source| DisplayError::Viewer {
        viewer: viewer_name.clone(),
        source,
    })?;
    if !status.success() {
        return Err(DisplayError::Viewer {
            viewer: viewer_name,
            source: io::Error::new(io::ErrorKind::Other, format!("exited with {}", status)),
        });
    }
    Ok(())
}

/// Block until a line (or EOF) arrives on `input`. Returns `false` on EOF.
pub fn wait_for_dismissal<R: BufRead, W: Write>(mut input: R, mut output: W) -> io::Result<bool> {
    write!(output, "Figure is open. Press Enter to close and exit... ")?;
    output.flush()?;
    let mut line = String::new();
    let read = input.read_line(&mut line)?;
    writeln!(output)?;
    Ok(read > 0)
}

/// Delete the figure once dismissed; otherwise leave it on disk and return its path.
fn release_figure(figure: NamedTempFile, dismissed: bool) -> io::Result<Option<PathBuf>> {
    if dismissed {
        debug!(path = %figure.path().display(), "removing temporary figure");
        figure.close()?;
        return Ok(None);
    }
    let (_, path) = figure.keep().map_err(|e| e.error)?;
    warn!(path = %path.display(), "input closed before the figure was dismissed, leaving it on disk");
    Ok(Some(path))
}
