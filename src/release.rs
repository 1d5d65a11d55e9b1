//! Release state machine driving the develop → main transition.
//!
//! The run is strictly sequential and fail-fast: the first error aborts the
//! whole procedure and the remote is left in whatever state the sequence
//! reached. Exactly two conditions are tolerated, each with one
//! deterministic fallback: an empty diff before a commit (logged and
//! skipped) and a merge conflict confined to the manifest (resolved in
//! favor of develop's copy).

use log::*;
use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::{
    config::{DEVELOP_BRANCH, MAIN_BRANCH, ReleaseConfig},
    error::MainlineError,
    manifest,
    repo::{MergeOutcome, Repository},
    result::Result,
};

/// States of the release procedure, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Cloned,
    DevelopUpdated,
    DevVersionCommitted,
    DevTaggedPushed,
    MainCheckedOut,
    Merged,
    ReleaseVersionCommitted,
    ReleaseTaggedPushed,
}

impl Stage {
    /// The stage that follows this one; `None` for the terminal stage.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Cloned => Some(Stage::DevelopUpdated),
            Stage::DevelopUpdated => Some(Stage::DevVersionCommitted),
            Stage::DevVersionCommitted => Some(Stage::DevTaggedPushed),
            Stage::DevTaggedPushed => Some(Stage::MainCheckedOut),
            Stage::MainCheckedOut => Some(Stage::Merged),
            Stage::Merged => Some(Stage::ReleaseVersionCommitted),
            Stage::ReleaseVersionCommitted => Some(Stage::ReleaseTaggedPushed),
            Stage::ReleaseTaggedPushed => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Cloned => "cloned",
            Stage::DevelopUpdated => "develop-updated",
            Stage::DevVersionCommitted => "dev-version-committed",
            Stage::DevTaggedPushed => "dev-tagged-pushed",
            Stage::MainCheckedOut => "main-checked-out",
            Stage::Merged => "merged",
            Stage::ReleaseVersionCommitted => "release-version-committed",
            Stage::ReleaseTaggedPushed => "release-tagged-pushed",
        };
        write!(f, "{name}")
    }
}

/// Summary of a completed run.
#[derive(Debug)]
pub struct ReleaseReport {
    /// Tag created on develop, e.g. "v1.2.0dev".
    pub dev_tag: String,
    /// Tag created on main, e.g. "v1.2.0".
    pub release_tag: String,
    /// Whether the merge needed the designated manifest resolution.
    pub resolved_conflict: bool,
    /// Stages reached, in order.
    pub stages: Vec<Stage>,
}

/// Run the full release procedure inside `workspace_root`.
pub fn run(cfg: &ReleaseConfig, workspace_root: &Path) -> Result<ReleaseReport> {
    let releaser = Releaser::setup(cfg, workspace_root)?;
    releaser.run()
}

struct Releaser<'a> {
    cfg: &'a ReleaseConfig,
    repo: Repository,
    workdir: PathBuf,
    /// Manifest file name, relative to the repository root.
    manifest_name: String,
    resolved_conflict: bool,
}

impl<'a> Releaser<'a> {
    /// Clone the repository into the workspace and run pre-flight checks.
    fn setup(cfg: &'a ReleaseConfig, workspace_root: &Path) -> Result<Self> {
        let clone_path = workspace_root.join(&cfg.repository);
        let repo = Repository::new(&cfg.remote_url(), &clone_path)?;
        let workdir = repo.workdir()?.to_path_buf();

        let manifest_path = manifest::find_manifest(&workdir)?;
        let manifest_name = manifest_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let releaser = Self {
            cfg,
            repo,
            workdir,
            manifest_name,
            resolved_conflict: false,
        };
        releaser.preflight()?;
        Ok(releaser)
    }

    /// Abort before any mutation when the run's tags already exist.
    fn preflight(&self) -> Result<()> {
        for tag in [self.cfg.dev_tag(), self.cfg.release_tag()] {
            if self.repo.tag_exists(&tag) && !self.cfg.force {
                return Err(MainlineError::TagExists(tag).into());
            }
        }
        Ok(())
    }

    fn run(mut self) -> Result<ReleaseReport> {
        let mut stage = Stage::Cloned;
        let mut stages = vec![stage];
        info!("reached stage: {stage}");

        while let Some(next) = stage.next() {
            self.advance(next)?;
            info!("reached stage: {next}");
            stages.push(next);
            stage = next;
        }

        Ok(ReleaseReport {
            dev_tag: self.cfg.dev_tag(),
            release_tag: self.cfg.release_tag(),
            resolved_conflict: self.resolved_conflict,
            stages,
        })
    }

    fn advance(&mut self, to: Stage) -> Result<()> {
        match to {
            // entry state, established by clone()
            Stage::Cloned => Ok(()),
            Stage::DevelopUpdated => self.update_develop(),
            Stage::DevVersionCommitted => self.commit_dev_version(),
            Stage::DevTaggedPushed => self.tag_and_push_dev(),
            Stage::MainCheckedOut => self.checkout_main(),
            Stage::Merged => self.merge_develop(),
            Stage::ReleaseVersionCommitted => self.commit_release_version(),
            Stage::ReleaseTaggedPushed => self.tag_and_push_release(),
        }
    }

    fn update_develop(&self) -> Result<()> {
        self.repo.checkout_branch(DEVELOP_BRANCH)?;
        self.repo.pull(DEVELOP_BRANCH)
    }

    fn commit_dev_version(&self) -> Result<()> {
        let dev_version = self.cfg.dev_version();
        if self.cfg.dry_run {
            info!(
                "dry-run: would set version to {} in {}",
                dev_version, self.manifest_name
            );
            info!("dry-run: would commit the version bump on {DEVELOP_BRANCH}");
            return Ok(());
        }
        manifest::edit_version(&self.manifest_path(), &dev_version)?;
        self.commit_if_changed(&format!(
            "chore(release): bump version to {dev_version}"
        ))
    }

    fn tag_and_push_dev(&self) -> Result<()> {
        let tag = self.cfg.dev_tag();
        if self.cfg.dry_run {
            info!("dry-run: would tag {tag} and push {DEVELOP_BRANCH} with tags");
            return Ok(());
        }
        self.repo.tag_head(&tag, self.cfg.force)?;
        self.repo.push_branch(DEVELOP_BRANCH, self.cfg.force)?;
        self.repo.push_tag(&tag, self.cfg.force)
    }

    fn checkout_main(&self) -> Result<()> {
        self.repo.checkout_branch(MAIN_BRANCH)?;
        self.repo.pull(MAIN_BRANCH)
    }

    fn merge_develop(&mut self) -> Result<()> {
        if self.cfg.dry_run {
            info!(
                "dry-run: would merge {DEVELOP_BRANCH} into {MAIN_BRANCH}, \
                 preferring {DEVELOP_BRANCH}'s {} on conflict",
                self.manifest_name
            );
            return Ok(());
        }

        match self.repo.merge_branch(DEVELOP_BRANCH)? {
            MergeOutcome::Conflicted => {
                let conflicts = self.repo.conflicted_paths()?;
                let foreign: Vec<String> = conflicts
                    .iter()
                    .filter(|p| **p != self.manifest_name)
                    .cloned()
                    .collect();
                if !foreign.is_empty() {
                    return Err(
                        MainlineError::unresolvable_conflict(&foreign).into()
                    );
                }

                warn!(
                    "merge conflict on {}: taking {DEVELOP_BRANCH}'s copy",
                    self.manifest_name
                );
                self.repo
                    .restore_file_from(DEVELOP_BRANCH, &self.manifest_name)?;
                self.repo.commit_merge(DEVELOP_BRANCH)?;
                self.resolved_conflict = true;
                Ok(())
            }
            outcome => {
                debug!("merge outcome: {outcome:?}");
                Ok(())
            }
        }
    }

    fn commit_release_version(&self) -> Result<()> {
        let version = &self.cfg.version;
        if self.cfg.dry_run {
            info!(
                "dry-run: would set version to {version} in {}, strip dev \
                 pins, and commit on {MAIN_BRANCH}",
                self.manifest_name
            );
            return Ok(());
        }
        manifest::edit_for_release(&self.manifest_path(), version)?;
        self.commit_if_changed(&format!("chore(release): {version}"))
    }

    fn tag_and_push_release(&self) -> Result<()> {
        let tag = self.cfg.release_tag();
        if self.cfg.dry_run {
            info!("dry-run: would tag {tag} and push {MAIN_BRANCH} with tags");
            return Ok(());
        }
        self.repo.tag_head(&tag, self.cfg.force)?;
        self.repo.push_branch(MAIN_BRANCH, self.cfg.force)?;
        self.repo.push_tag(&tag, self.cfg.force)
    }

    /// Commit staged plus unstaged changes, tolerating an empty diff.
    fn commit_if_changed(&self, msg: &str) -> Result<()> {
        if !self.repo.has_changes()? {
            warn!("no local changes to commit");
            return Ok(());
        }
        self.repo.add_all()?;
        self.repo.commit(msg)
    }

    fn manifest_path(&self) -> PathBuf {
        self.workdir.join(&self.manifest_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_linearly_ordered() {
        let mut stage = Stage::Cloned;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }

        assert_eq!(
            seen,
            vec![
                Stage::Cloned,
                Stage::DevelopUpdated,
                Stage::DevVersionCommitted,
                Stage::DevTaggedPushed,
                Stage::MainCheckedOut,
                Stage::Merged,
                Stage::ReleaseVersionCommitted,
                Stage::ReleaseTaggedPushed,
            ]
        );
        assert!(Stage::ReleaseTaggedPushed.next().is_none());
    }

    #[test]
    fn stage_names_are_stable() {
        assert_eq!(Stage::Cloned.to_string(), "cloned");
        assert_eq!(Stage::Merged.to_string(), "merged");
        assert_eq!(
            Stage::ReleaseTaggedPushed.to_string(),
            "release-tagged-pushed"
        );
    }
}
