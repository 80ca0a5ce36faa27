//! Directory-backed camera.
//!
//! Every `*.jpg` / `*.jpeg` file in the source directory is one video input.
//! The file is re-read on each poll, so replacing it (from a phone sync
//! folder, a webcam dump script, …) acts as a new frame.

use std::path::{Path, PathBuf};

use super::{CaptureError, Facing, VideoBackend, VideoInput, VideoStream};

#[derive(Debug, Clone)]
pub struct FileCamera {
    dir: PathBuf,
}

impl FileCamera {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Guess the facing of an input from its file name.
pub fn facing_from_name(name: &str) -> Facing {
    let lower = name.to_lowercase();
    if ["rear", "back", "environment"].iter().any(|k| lower.contains(k)) {
        Facing::Rear
    } else if ["front", "user", "selfie"].iter().any(|k| lower.contains(k)) {
        Facing::Front
    } else {
        Facing::Unknown
    }
}

fn is_jpeg_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

impl VideoBackend for FileCamera {
    fn inputs(&self) -> Result<Vec<VideoInput>, CaptureError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            CaptureError::Unavailable(format!("cannot read {}: {e}", self.dir.display()))
        })?;

        let mut inputs: Vec<VideoInput> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_jpeg_path(path))
            .filter_map(|path| {
                let id = path.file_name()?.to_str()?.to_string();
                let label = path.file_stem()?.to_str()?.to_string();
                Some(VideoInput {
                    facing: facing_from_name(&label),
                    id,
                    label,
                })
            })
            .collect();

        inputs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(inputs)
    }

    fn open_input(&self, input: &VideoInput) -> Result<Box<dyn VideoStream>, CaptureError> {
        let path = self.dir.join(&input.id);
        if !path.is_file() {
            return Err(CaptureError::Unavailable(format!(
                "{} disappeared",
                path.display()
            )));
        }
        Ok(Box::new(FileStream {
            path,
            stopped: false,
        }))
    }
}

struct FileStream {
    path: PathBuf,
    stopped: bool,
}

impl VideoStream for FileStream {
    fn latest_frame(&mut self) -> Option<Vec<u8>> {
        if self.stopped {
            return None;
        }
        match std::fs::read(&self.path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::debug!("camera: cannot read {}: {e}", self.path.display());
                None
            }
        }
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::tests::JPEG;
    use crate::camera::CaptureController;
    use std::sync::Arc;

    #[test]
    fn facing_is_inferred_from_name() {
        assert_eq!(facing_from_name("Rear-Camera"), Facing::Rear);
        assert_eq!(facing_from_name("environment"), Facing::Rear);
        assert_eq!(facing_from_name("selfie_cam"), Facing::Front);
        assert_eq!(facing_from_name("webcam"), Facing::Unknown);
    }

    #[test]
    fn lists_only_jpeg_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("front.jpg"), JPEG).unwrap();
        std::fs::write(dir.path().join("back.JPEG"), JPEG).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hi").unwrap();

        let inputs = FileCamera::new(dir.path()).inputs().unwrap();
        let ids: Vec<_> = inputs.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["back.JPEG", "front.jpg"]);
        assert_eq!(inputs[0].facing, Facing::Rear);
        assert_eq!(inputs[1].facing, Facing::Front);
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let cam = FileCamera::new(dir.path().join("nope"));
        assert!(matches!(cam.inputs(), Err(CaptureError::Unavailable(_))));
    }

    #[test]
    fn controller_prefers_rear_file_and_snapshots_it() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_front.jpg"), [0xFF, 0xD8, 0x01, 0xFF, 0xD9]).unwrap();
        std::fs::write(dir.path().join("b_rear.jpg"), JPEG).unwrap();

        let mut ctl = CaptureController::new(Arc::new(FileCamera::new(dir.path())), true);
        ctl.open().unwrap();
        assert!(ctl.poll());
        let image = ctl.snapshot().unwrap();
        assert_eq!(crate::audio::decode_base64(image.base64_data()).unwrap(), JPEG);
    }

    #[test]
    fn replaced_file_is_a_new_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cam.jpg");
        std::fs::write(&path, b"partial").unwrap();

        let mut ctl = CaptureController::new(Arc::new(FileCamera::new(dir.path())), true);
        ctl.open().unwrap();
        assert!(!ctl.poll());

        std::fs::write(&path, JPEG).unwrap();
        assert!(ctl.poll());
    }
}
