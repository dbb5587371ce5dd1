// src/exec/artifacts.rs

use std::path::Path;

use tracing::{debug, trace};

use crate::events::Artifacts;
use crate::ids::ExecutionId;

const SCREENSHOT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
const VIDEO_EXTENSIONS: &[&str] = &["webm", "mp4"];

/// Collect screenshots and videos from `<artifacts_dir>/<execution_id>/`.
///
/// Not recursive. Missing directories yield no artifacts. Paths are sorted
/// by file name.
pub fn collect_artifacts(artifacts_dir: Option<&Path>, execution_id: ExecutionId) -> Artifacts {
    let mut artifacts = Artifacts::default();
    let Some(root) = artifacts_dir else {
        return artifacts;
    };

    let dir = root.join(execution_id.to_string());
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) => {
            trace!(%execution_id, dir = %dir.display(), error = %err, "no artifacts directory");
            return artifacts;
        }
    };

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    for path in paths {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let ext = ext.to_ascii_lowercase();
        let shown = path.display().to_string();
        if SCREENSHOT_EXTENSIONS.contains(&ext.as_str()) {
            artifacts.screenshots.push(shown);
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            artifacts.videos.push(shown);
        }
    }

    debug!(
        %execution_id,
        screenshots = artifacts.screenshots.len(),
        videos = artifacts.videos.len(),
        "artifacts collected"
    );
    artifacts
}
