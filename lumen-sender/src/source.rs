//! Capture source selection.

use lumen_core::{LumenError, ScreenSource, TestPattern};

use crate::config::CaptureConfig;

/// Build the screen source named by `config.source`.
///
/// Call it on the thread that captures; DXGI handles stay there.
pub fn open_source(config: &CaptureConfig) -> Result<Box<dyn ScreenSource>, LumenError> {
    match config.source.trim().to_ascii_lowercase().as_str() {
        "pattern" | "test" => Ok(Box::new(TestPattern::new(config.width, config.height))),
        "dxgi" => open_dxgi(config),
        other => Err(LumenError::CaptureUnavailable(format!(
            "unknown capture source {other:?} (expected \"dxgi\" or \"pattern\")"
        ))),
    }
}

#[cfg(target_os = "windows")]
fn open_dxgi(config: &CaptureConfig) -> Result<Box<dyn ScreenSource>, LumenError> {
    let source = lumen_core::DxgiSource::new(config.monitor_index, config.capture_timeout_ms)?;
    Ok(Box::new(source))
}

#[cfg(not(target_os = "windows"))]
fn open_dxgi(_config: &CaptureConfig) -> Result<Box<dyn ScreenSource>, LumenError> {
    Err(LumenError::CaptureUnavailable(
        "DXGI capture is only available on Windows".into(),
    ))
}
