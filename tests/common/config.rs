//! Test configuration helpers for creating downloaders over scripted collaborators

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use media_dl::{Config, MediaDownloader, ResumeMode};

use super::fixtures::{ScriptedExtractor, ScriptedTransfer};

/// Configuration writing into `dir` with a fast retry countdown
///
/// Three ticks of 10ms keep retry scenarios well under a second.
pub fn fast_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.download.target_dir = Some(dir.path().to_path_buf());
    config.retry.delay = 3;
    config.retry.tick = Duration::from_millis(10);
    config
}

/// Downloader whose only extractor is `extractor` and whose strategies are all `transfer`
pub fn scripted_downloader(
    config: Config,
    extractor: &Arc<ScriptedExtractor>,
    transfer: &Arc<ScriptedTransfer>,
) -> MediaDownloader {
    let mut builder = MediaDownloader::builder(config)
        .without_direct_extractor()
        .extractor(extractor.clone());
    for mode in [ResumeMode::Single, ResumeMode::Range, ResumeMode::Segmented] {
        builder = builder.transfer(mode, transfer.clone());
    }
    builder.build().expect("valid test configuration")
}
