//! Git repository operations for the release procedure.
//!
//! Wraps `git2::Repository` with exactly the operations the release state
//! machine needs: clone, branch checkout, fast-forward pull, staging,
//! commit, tag, push, and merge with designated conflict resolution.
//!
//! Authentication is resolved per transport: ssh remotes go through the ssh
//! agent, https remotes use a personal access token from `MAINLINE_TOKEN` or
//! `GITHUB_TOKEN`, and local-path remotes need no credentials at all.

use color_eyre::eyre::eyre;
use git2::{
    BranchType, Cred, CredentialType, FetchOptions, MergeOptions, PushOptions,
    RemoteCallbacks, Signature, StatusOptions,
    build::{CheckoutBuilder, RepoBuilder},
};
use log::*;
use std::{env, fs, path::Path};

use crate::{error::MainlineError, result::Result};

/// Name of the remote every clone is wired to.
const ORIGIN_REMOTE: &str = "origin";

/// Environment variables probed for an access token, in order.
const TOKEN_ENV_VARS: &[&str] = &["MAINLINE_TOKEN", "GITHUB_TOKEN"];

/// Fallback committer identity when the host has no git identity configured.
const FALLBACK_IDENTITY: (&str, &str) = ("mainline", "mainline@localhost");

/// How a merge of one branch into another concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Nothing to merge: the current branch already contains the source.
    UpToDate,
    /// The current branch was fast-forwarded to the source.
    FastForwarded,
    /// A merge commit was created without conflicts.
    Merged,
    /// The merge stopped on conflicts; the index holds the conflict entries
    /// and the caller decides whether its resolution policy applies.
    Conflicted,
}

/// Create authentication callbacks for remote operations.
fn auth_callbacks<'r>() -> RemoteCallbacks<'r> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(|_url, username_from_url, allowed| {
        if allowed.contains(CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT)
            && let Some(token) = TOKEN_ENV_VARS.iter().find_map(|v| env::var(v).ok())
        {
            return Cred::userpass_plaintext(
                username_from_url.unwrap_or("git"),
                &token,
            );
        }
        Cred::default()
    });
    callbacks
}

/// High-level git interface scoped to one working clone.
pub struct Repository {
    repo: git2::Repository,
}

impl Repository {
    /// Clone the repository at `url` into `local_path`.
    pub fn new(url: &str, local_path: &Path) -> Result<Self> {
        info!("cloning {} into {}", url, local_path.display());
        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(auth_callbacks());

        let repo = RepoBuilder::new()
            .fetch_options(fetch_options)
            .clone(url, local_path)?;

        Ok(Self { repo })
    }

    /// Open an existing repository at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            repo: git2::Repository::open(path)?,
        })
    }

    /// Get the repository's working directory path.
    pub fn workdir(&self) -> Result<&Path> {
        self.repo
            .workdir()
            .ok_or_else(|| eyre!("repository has no working directory"))
    }

    /// Switch the working directory to `branch`, creating the local branch
    /// from its remote-tracking counterpart on first checkout after clone.
    pub fn checkout_branch(&self, branch: &str) -> Result<()> {
        info!("switching to branch: {branch}");

        if self.repo.find_branch(branch, BranchType::Local).is_err() {
            let remote_name = format!("{ORIGIN_REMOTE}/{branch}");
            debug!("creating local branch {branch} from {remote_name}");
            let remote_branch =
                self.repo.find_branch(&remote_name, BranchType::Remote)?;
            let commit = remote_branch.get().peel_to_commit()?;
            let mut local = self.repo.branch(branch, &commit, false)?;
            local.set_upstream(Some(&remote_name))?;
        }

        let ref_name = format!("refs/heads/{branch}");
        let target = self.repo.revparse_single(&ref_name)?;
        self.repo.checkout_tree(&target, None)?;
        self.repo.set_head(&ref_name)?;
        Ok(())
    }

    /// Fetch `branch` from origin and fast-forward the local branch.
    ///
    /// A local branch that cannot be fast-forwarded has diverged from the
    /// remote, which is fatal for a release run.
    pub fn pull(&self, branch: &str) -> Result<()> {
        info!("pulling latest for branch: {branch}");
        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(auth_callbacks());
        let mut remote = self.repo.find_remote(ORIGIN_REMOTE)?;
        remote.fetch(&[branch], Some(&mut fetch_options), None)?;

        let fetch_head = self.repo.find_reference("FETCH_HEAD")?;
        let fetch_commit = self.repo.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = self.repo.merge_analysis(&[&fetch_commit])?;

        if analysis.is_up_to_date() {
            debug!("{branch} already up to date");
            return Ok(());
        }

        if analysis.is_fast_forward() {
            debug!("fast-forwarding {branch}");
            let ref_name = format!("refs/heads/{branch}");
            let mut reference = self.repo.find_reference(&ref_name)?;
            reference.set_target(fetch_commit.id(), "pull: fast-forward")?;
            self.repo.set_head(&ref_name)?;
            self.repo
                .checkout_head(Some(CheckoutBuilder::default().force()))?;
            return Ok(());
        }

        Err(MainlineError::DivergedBranch {
            branch: branch.into(),
        }
        .into())
    }

    /// Whether the working tree differs from HEAD, untracked files included.
    pub fn has_changes(&self) -> Result<bool> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        Ok(!statuses.is_empty())
    }

    /// Stage all changed files, equivalent to `git add .`.
    pub fn add_all(&self) -> Result<()> {
        debug!("adding changed files to index");
        let mut index = self.repo.index()?;
        index.add_all(["."], git2::IndexAddOption::DEFAULT, None)?;
        index.write()?;
        Ok(())
    }

    /// Create a commit from the staged changes on the current branch.
    pub fn commit(&self, msg: &str) -> Result<()> {
        debug!("committing changes with msg: {msg}");
        let mut index = self.repo.index()?;
        let oid = index.write_tree()?;
        let tree = self.repo.find_tree(oid)?;
        let parent_commit = self.repo.head()?.peel_to_commit()?;
        let committer = self.signature()?;
        self.repo.commit(
            Some("HEAD"),
            &committer,
            &committer,
            msg,
            &tree,
            &[&parent_commit],
        )?;
        Ok(())
    }

    /// Whether a tag with this name exists locally.
    pub fn tag_exists(&self, tag: &str) -> bool {
        self.repo
            .find_reference(&format!("refs/tags/{tag}"))
            .is_ok()
    }

    /// Create an annotated tag pointing at HEAD.
    pub fn tag_head(&self, tag: &str, force: bool) -> Result<()> {
        info!("tagging HEAD as {tag}");
        let commit = self.repo.head()?.peel_to_commit()?;
        let tagger = self.signature()?;
        self.repo
            .tag(tag, commit.as_object(), &tagger, tag, force)?;
        Ok(())
    }

    /// Push a local branch to origin.
    pub fn push_branch(&self, branch: &str, force: bool) -> Result<()> {
        info!("pushing branch {branch}");
        self.push_refspec(&format!("refs/heads/{branch}"), force)
    }

    /// Push a tag to origin.
    pub fn push_tag(&self, tag: &str, force: bool) -> Result<()> {
        info!("pushing tag {tag}");
        self.push_refspec(&format!("refs/tags/{tag}"), force)
    }

    /// Merge `from` into the current branch.
    ///
    /// Fast-forwards when possible. On conflicts the index is left holding
    /// the conflict entries and [`MergeOutcome::Conflicted`] is returned so
    /// the caller can apply its resolution policy; a clean merge is
    /// committed immediately.
    pub fn merge_branch(&self, from: &str) -> Result<MergeOutcome> {
        info!("merging branch {from}");
        let their_ref = self.repo.find_reference(&format!("refs/heads/{from}"))?;
        let annotated = self.repo.reference_to_annotated_commit(&their_ref)?;
        let (analysis, _) = self.repo.merge_analysis(&[&annotated])?;

        if analysis.is_up_to_date() {
            info!("nothing to merge: already up to date");
            return Ok(MergeOutcome::UpToDate);
        }

        if analysis.is_fast_forward() {
            debug!("fast-forwarding to {from}");
            let mut head_ref = self.repo.head()?;
            head_ref.set_target(annotated.id(), "merge: fast-forward")?;
            self.repo
                .checkout_head(Some(CheckoutBuilder::default().force()))?;
            return Ok(MergeOutcome::FastForwarded);
        }

        let mut checkout = CheckoutBuilder::new();
        checkout.allow_conflicts(true);
        self.repo.merge(
            &[&annotated],
            Some(&mut MergeOptions::new()),
            Some(&mut checkout),
        )?;

        if self.repo.index()?.has_conflicts() {
            warn!("merge of {from} reported conflicts");
            return Ok(MergeOutcome::Conflicted);
        }

        self.commit_merge(from)?;
        Ok(MergeOutcome::Merged)
    }

    /// Paths currently in conflict in the index.
    pub fn conflicted_paths(&self) -> Result<Vec<String>> {
        let index = self.repo.index()?;
        let mut paths = vec![];
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            if let Some(entry) =
                conflict.our.or(conflict.their).or(conflict.ancestor)
            {
                paths.push(String::from_utf8_lossy(&entry.path).to_string());
            }
        }
        Ok(paths)
    }

    /// Overwrite `path` in the working tree with the copy committed on
    /// `branch` and stage it, clearing any conflict entry for that path.
    pub fn restore_file_from(&self, branch: &str, path: &str) -> Result<()> {
        info!("resolving {path} with the copy from {branch}");
        let spec = format!("{branch}:{path}");
        let object = self.repo.revparse_single(&spec)?;
        let blob = object
            .into_blob()
            .map_err(|_| eyre!("{spec} is not a file"))?;
        fs::write(self.workdir()?.join(path), blob.content())?;

        let mut index = self.repo.index()?;
        index.add_path(Path::new(path))?;
        index.write()?;
        Ok(())
    }

    /// Commit the merge staged in the index with both parents and clear the
    /// repository's in-progress merge state.
    pub fn commit_merge(&self, from: &str) -> Result<()> {
        let mut index = self.repo.index()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;
        let head_commit = self.repo.head()?.peel_to_commit()?;
        let their_commit = self
            .repo
            .find_reference(&format!("refs/heads/{from}"))?
            .peel_to_commit()?;
        let sig = self.signature()?;
        let msg = format!("merge branch '{from}'");
        self.repo.commit(
            Some("HEAD"),
            &sig,
            &sig,
            &msg,
            &tree,
            &[&head_commit, &their_commit],
        )?;
        self.repo.cleanup_state()?;
        Ok(())
    }

    fn push_refspec(&self, refspec: &str, force: bool) -> Result<()> {
        let mut push_opts = PushOptions::default();
        push_opts.remote_callbacks(auth_callbacks());
        let mut remote = self.repo.find_remote(ORIGIN_REMOTE)?;

        // + indicates "force" push
        let prefix = if force { "+" } else { "" };
        let ref_spec = format!("{prefix}{refspec}");
        remote.push(&[ref_spec], Some(&mut push_opts))?;
        Ok(())
    }

    /// Committer identity from git config, falling back to a fixed identity
    /// so automation hosts without a configured user can still commit.
    fn signature(&self) -> Result<Signature<'static>> {
        let config = self.repo.config()?.snapshot()?;
        match (config.get_str("user.name"), config.get_str("user.email")) {
            (Ok(user), Ok(email)) => Ok(Signature::now(user, email)?),
            _ => {
                debug!("no git identity configured, using fallback identity");
                Ok(Signature::now(FALLBACK_IDENTITY.0, FALLBACK_IDENTITY.1)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MANIFEST: &str = "[project]\nname = \"sample-lib\"\nversion = \"1.0.0\"\n";

    /// Init a repository with an identity and one commit on branch `main`.
    fn seed_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let git = git2::Repository::init(dir.path()).unwrap();
        let mut config = git.config().unwrap();
        config.set_str("user.name", "tester").unwrap();
        config.set_str("user.email", "tester@example.com").unwrap();

        fs::write(dir.path().join("pyproject.toml"), MANIFEST).unwrap();

        let mut index = git.index().unwrap();
        index
            .add_all(["."], git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_oid = index.write_tree().unwrap();
        let tree = git.find_tree(tree_oid).unwrap();
        let sig = git2::Signature::now("tester", "tester@example.com").unwrap();
        let commit_oid = git
            .commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap();

        let commit = git.find_commit(commit_oid).unwrap();
        git.branch("main", &commit, true).unwrap();
        git.set_head("refs/heads/main").unwrap();

        drop(tree);
        drop(commit);
        drop(git);

        let repo = Repository::open(dir.path()).unwrap();
        (dir, repo)
    }

    fn write_and_commit(dir: &TempDir, repo: &Repository, content: &str, msg: &str) {
        fs::write(dir.path().join("pyproject.toml"), content).unwrap();
        repo.add_all().unwrap();
        repo.commit(msg).unwrap();
    }

    fn create_branch_at_head(dir: &TempDir, name: &str) {
        let git = git2::Repository::open(dir.path()).unwrap();
        let commit = git.head().unwrap().peel_to_commit().unwrap();
        git.branch(name, &commit, true).unwrap();
    }

    #[test]
    fn detects_working_tree_changes() {
        let (dir, repo) = seed_repo();
        assert!(!repo.has_changes().unwrap());

        fs::write(dir.path().join("pyproject.toml"), "changed").unwrap();
        assert!(repo.has_changes().unwrap());

        repo.add_all().unwrap();
        repo.commit("update manifest").unwrap();
        assert!(!repo.has_changes().unwrap());
    }

    #[test]
    fn tags_head_and_reports_existence() {
        let (_dir, repo) = seed_repo();
        assert!(!repo.tag_exists("v1.0.0"));

        repo.tag_head("v1.0.0", false).unwrap();
        assert!(repo.tag_exists("v1.0.0"));

        // re-tagging without force fails, with force succeeds
        assert!(repo.tag_head("v1.0.0", false).is_err());
        repo.tag_head("v1.0.0", true).unwrap();
    }

    #[test]
    fn checks_out_local_branches() {
        let (dir, repo) = seed_repo();
        create_branch_at_head(&dir, "develop");

        repo.checkout_branch("develop").unwrap();
        write_and_commit(&dir, &repo, "on develop", "develop commit");

        repo.checkout_branch("main").unwrap();
        let content =
            fs::read_to_string(dir.path().join("pyproject.toml")).unwrap();
        assert_eq!(content, MANIFEST);
    }

    #[test]
    fn merge_fast_forwards_when_possible() {
        let (dir, repo) = seed_repo();
        create_branch_at_head(&dir, "develop");

        repo.checkout_branch("develop").unwrap();
        write_and_commit(&dir, &repo, "ahead", "develop commit");

        repo.checkout_branch("main").unwrap();
        let outcome = repo.merge_branch("develop").unwrap();
        assert_eq!(outcome, MergeOutcome::FastForwarded);

        let content =
            fs::read_to_string(dir.path().join("pyproject.toml")).unwrap();
        assert_eq!(content, "ahead");
    }

    #[test]
    fn merge_is_up_to_date_when_source_is_behind() {
        let (dir, repo) = seed_repo();
        create_branch_at_head(&dir, "develop");
        write_and_commit(&dir, &repo, "main ahead", "main commit");

        let outcome = repo.merge_branch("develop").unwrap();
        assert_eq!(outcome, MergeOutcome::UpToDate);
    }

    #[test]
    fn merge_reports_conflicts_and_resolution_applies_branch_copy() {
        let (dir, repo) = seed_repo();
        create_branch_at_head(&dir, "develop");

        repo.checkout_branch("develop").unwrap();
        write_and_commit(
            &dir,
            &repo,
            "version = \"2.0.0dev\"\n",
            "bump on develop",
        );

        repo.checkout_branch("main").unwrap();
        write_and_commit(&dir, &repo, "version = \"1.0.1\"\n", "patch on main");

        let outcome = repo.merge_branch("develop").unwrap();
        assert_eq!(outcome, MergeOutcome::Conflicted);
        assert_eq!(repo.conflicted_paths().unwrap(), vec!["pyproject.toml"]);

        repo.restore_file_from("develop", "pyproject.toml").unwrap();
        repo.commit_merge("develop").unwrap();

        let content =
            fs::read_to_string(dir.path().join("pyproject.toml")).unwrap();
        assert_eq!(content, "version = \"2.0.0dev\"\n");
        assert!(!repo.has_changes().unwrap());

        // the merge commit carries both parents
        let git = git2::Repository::open(dir.path()).unwrap();
        let head = git.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.parent_count(), 2);
    }

    #[test]
    fn clones_and_pulls_from_local_remote() {
        let (origin_dir, origin) = seed_repo();

        let clone_parent = TempDir::new().unwrap();
        let clone_path = clone_parent.path().join("sample-lib");
        let url = origin_dir.path().to_str().unwrap().to_string();
        let cloned = Repository::new(&url, &clone_path).unwrap();

        // advance the origin, then pull the clone forward
        write_and_commit(&origin_dir, &origin, "advanced", "origin commit");

        cloned.checkout_branch("main").unwrap();
        cloned.pull("main").unwrap();
        let content =
            fs::read_to_string(clone_path.join("pyproject.toml")).unwrap();
        assert_eq!(content, "advanced");
    }
}
