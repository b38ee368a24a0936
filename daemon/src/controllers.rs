use std::path::{Path, PathBuf};

pub const DEFAULT_INPUT_DEVICE_DIR: &str = "/dev/input";

/// Upper bound on reported controllers, matching the number of pad slots the
/// platform tracks.
pub const MAX_CONTROLLERS: i32 = 8;

#[derive(Debug, thiserror::Error)]
#[error("failed to enumerate controllers in {}: {source}", .dir.display())]
pub struct ControllerError {
    dir: PathBuf,
    #[source]
    source: std::io::Error,
}

/// Reports how many controllers are connected right now.
pub trait ControllerSource {
    fn connected_count(&mut self) -> Result<i32, ControllerError>;
}

impl<C: ControllerSource + ?Sized> ControllerSource for Box<C> {
    fn connected_count(&mut self) -> Result<i32, ControllerError> {
        (**self).connected_count()
    }
}

/// A count pinned in configuration.
#[derive(Debug, Clone, Copy)]
pub struct FixedControllers(pub i32);

impl ControllerSource for FixedControllers {
    fn connected_count(&mut self) -> Result<i32, ControllerError> {
        Ok(self.0)
    }
}

/// Counts joystick device nodes (`js0`, `js1`, …) in an input device directory.
///
/// A host without the directory has no joysticks and reports zero.
#[derive(Debug, Clone)]
pub struct InputDeviceControllers {
    dir: PathBuf,
}

impl InputDeviceControllers {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Default for InputDeviceControllers {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_DEVICE_DIR)
    }
}

impl ControllerSource for InputDeviceControllers {
    fn connected_count(&mut self) -> Result<i32, ControllerError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(ControllerError {
                    dir: self.dir.clone(),
                    source,
                })
            }
        };

        let count = entries
            .filter_map(Result::ok)
            .filter(|entry| is_joystick_node(&entry.file_name().to_string_lossy()))
            .count();

        Ok((count as i32).min(MAX_CONTROLLERS))
    }
}

fn is_joystick_node(name: &str) -> bool {
    name.strip_prefix("js")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}
