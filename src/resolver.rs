//! Target file naming for the parts of a job
//!
//! Every part gets a unique, filesystem-safe path of the form
//! `<dir>/<title><suffix><ext>`, where `ext` comes from the content type
//! (`video/mp4` → `.mp4`) and `suffix` is `" (N)"` while the name is taken by a
//! sibling part or an existing file. When two siblings would share a plain
//! extension, all newly named parts switch to content-qualified extensions
//! (`.video.mp4`, `.audio.mp4`).
//!
//! Parts that already hold a target keep it, so a re-extracted part that
//! inherited an in-progress file is never renamed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::transfer::StrategySet;
use crate::types::{Job, Part};
use crate::utils::{content_extension, file_extension, sanitize_file_name};

/// Maximum numeric suffix tried before giving up on a name
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Base name used when the title sanitizes to nothing
const FALLBACK_BASE_NAME: &str = "download";

type ExtensionFn = fn(&str) -> Option<String>;

/// Fail with [`Error::StaleMetadata`] if any part lacks a usable content type
/// or carries one outside `allowed` (prefix match, empty = any)
pub(crate) fn check_content_types(job: &Job, allowed: &[String]) -> Result<()> {
    for (index, part) in job.parts().iter().enumerate() {
        part_extension(index, part, file_extension)?;
        let content_type = part.info().content_type.as_deref().unwrap_or_default();
        if !media_type_allowed(content_type, allowed) {
            return Err(Error::StaleMetadata(format!(
                "part {} has unexpected content type {:?}",
                index, content_type
            )));
        }
    }
    Ok(())
}

fn media_type_allowed(content_type: &str, allowed: &[String]) -> bool {
    let content_type = content_type.trim().to_ascii_lowercase();
    allowed.is_empty()
        || allowed
            .iter()
            .any(|prefix| content_type.starts_with(&prefix.to_ascii_lowercase()))
}

fn part_extension(index: usize, part: &Part, extension: ExtensionFn) -> Result<String> {
    part.info()
        .content_type
        .as_deref()
        .and_then(extension)
        .ok_or_else(|| {
            Error::StaleMetadata(format!(
                "part {} has no usable content type ({:?})",
                index,
                part.info().content_type
            ))
        })
}

/// Assign a target file to every part that has none
///
/// `default_dir` is used when the job carries no directory of its own. A forced
/// target replaces naming altogether and keeps progress only when the part's
/// strategy can resume from the file already there.
pub(crate) fn resolve_targets(
    job: &mut Job,
    default_dir: Option<&Path>,
    strategies: &StrategySet,
) -> Result<()> {
    if let Some(forced) = job.target_force().map(Path::to_path_buf) {
        return resolve_forced(job, forced, strategies);
    }

    let fresh: Vec<usize> = job
        .parts
        .iter()
        .enumerate()
        .filter(|(_, part)| part.target.is_none())
        .map(|(index, _)| index)
        .collect();
    if fresh.is_empty() {
        return Ok(());
    }

    let dir = job
        .target_dir()
        .or(default_dir)
        .map(Path::to_path_buf)
        .ok_or_else(|| Error::config("no target directory configured", "target_dir"))?;
    let base = match sanitize_file_name(&job.title) {
        name if name.is_empty() => FALLBACK_BASE_NAME.to_string(),
        name => name,
    };

    let (mut names, conflict) = candidate_names(job, &fresh, &dir, &base, file_extension)?;
    if conflict {
        tracing::debug!(
            job = %job.title,
            parts = fresh.len(),
            "Sibling parts share an extension, using content-qualified names"
        );
        names = candidate_names(job, &fresh, &dir, &base, content_extension)?.0;
    }

    for (index, target) in fresh.into_iter().zip(names) {
        tracing::debug!(part = index, target = %target.display(), "Assigned target file");
        let part = &mut job.parts[index];
        part.reset();
        part.target = Some(target);
    }
    Ok(())
}

/// Names for the `fresh` parts, plus whether any candidate hit a sibling's name
fn candidate_names(
    job: &Job,
    fresh: &[usize],
    dir: &Path,
    base: &str,
    extension: ExtensionFn,
) -> Result<(Vec<PathBuf>, bool)> {
    let mut taken: HashSet<PathBuf> = job.parts.iter().filter_map(|p| p.target.clone()).collect();
    let mut names = Vec::with_capacity(fresh.len());
    let mut conflict = false;

    for &index in fresh {
        let ext = part_extension(index, &job.parts[index], extension)?;
        let mut suffix = 0u32;
        let path = loop {
            let name = match suffix {
                0 => format!("{}{}", base, ext),
                n => format!("{} ({}){}", base, n, ext),
            };
            let candidate = dir.join(name);
            if taken.contains(&candidate) {
                conflict = true;
            } else if !candidate.exists() {
                break candidate;
            }

            suffix += 1;
            if suffix > MAX_RENAME_ATTEMPTS {
                return Err(Error::config(
                    format!(
                        "no free file name for \"{}{}\" in {}",
                        base,
                        ext,
                        dir.display()
                    ),
                    "target_dir",
                ));
            }
        };
        taken.insert(path.clone());
        names.push(path);
    }

    Ok((names, conflict))
}

fn resolve_forced(job: &mut Job, forced: PathBuf, strategies: &StrategySet) -> Result<()> {
    let count = job.parts.len();
    let [part] = job.parts.as_mut_slice() else {
        return Err(Error::config(
            format!("a forced target needs a single-part job, this one has {} parts", count),
            "target",
        ));
    };
    if part.target.as_deref() == Some(forced.as_path()) {
        return Ok(());
    }

    let strategy = strategies.select(part.info().mode);
    match strategy.can_resume(part.info(), &forced) {
        Some(downloaded) => {
            tracing::debug!(
                target = %forced.display(),
                downloaded,
                strategy = strategy.name(),
                "Forced target is resumable"
            );
            part.target = Some(forced);
            part.downloaded = downloaded;
        }
        None => {
            tracing::debug!(target = %forced.display(), "Forced target will be overwritten");
            part.reset();
            part.target = Some(forced);
        }
    }
    Ok(())
}
