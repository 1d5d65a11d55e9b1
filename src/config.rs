//! Immutable release configuration produced by argument resolution.

/// Default organization used when `--org` is not supplied.
pub const DEFAULT_ORG: &str = "mainline-dev";

/// Default remote host used when `--host` is not supplied.
pub const DEFAULT_HOST: &str = "github.com";

/// Branch that carries in-progress development work.
pub const DEVELOP_BRANCH: &str = "develop";

/// Branch that carries released versions.
pub const MAIN_BRANCH: &str = "main";

/// Everything one release run needs to know, resolved up front.
///
/// Immutable once parsed: the state machine borrows it and never writes back.
#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    /// Bare repository name, e.g. "sample-lib".
    pub repository: String,
    /// Target release version, e.g. "1.2.0". Validated as a bare semver
    /// triple at parse time but carried as opaque text for manifest editing.
    pub version: String,
    /// Organization owning the repository on the remote host.
    pub org: String,
    /// Remote host for constructing the clone URL.
    pub host: String,
    /// Explicit clone URL override. When set, host/org are ignored.
    pub remote: Option<String>,
    /// Print mutating operations instead of executing them.
    pub dry_run: bool,
    /// Overwrite and force-push tags that already exist.
    pub force: bool,
}

impl ReleaseConfig {
    /// The URL the repository is cloned from and pushed to.
    pub fn remote_url(&self) -> String {
        self.remote.clone().unwrap_or_else(|| {
            format!("https://{}/{}/{}.git", self.host, self.org, self.repository)
        })
    }

    /// Development version written to the manifest on develop.
    pub fn dev_version(&self) -> String {
        format!("{}dev", self.version)
    }

    /// Tag pushed on develop, e.g. "v1.2.0dev".
    pub fn dev_tag(&self) -> String {
        format!("v{}dev", self.version)
    }

    /// Tag pushed on main, e.g. "v1.2.0".
    pub fn release_tag(&self) -> String {
        format!("v{}", self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ReleaseConfig {
        ReleaseConfig {
            repository: "sample-lib".into(),
            version: "1.2.0".into(),
            org: DEFAULT_ORG.into(),
            host: DEFAULT_HOST.into(),
            remote: None,
            dry_run: false,
            force: false,
        }
    }

    #[test]
    fn constructs_remote_url_from_parts() {
        let cfg = test_config();
        assert_eq!(
            cfg.remote_url(),
            "https://github.com/mainline-dev/sample-lib.git"
        );
    }

    #[test]
    fn remote_override_wins() {
        let mut cfg = test_config();
        cfg.remote = Some("/tmp/mirrors/sample-lib.git".into());
        assert_eq!(cfg.remote_url(), "/tmp/mirrors/sample-lib.git");
    }

    #[test]
    fn derives_tag_and_version_names() {
        let cfg = test_config();
        assert_eq!(cfg.dev_version(), "1.2.0dev");
        assert_eq!(cfg.dev_tag(), "v1.2.0dev");
        assert_eq!(cfg.release_tag(), "v1.2.0");
    }
}
