//! CLI argument parsing and release configuration resolution.
use clap::Parser;
use semver::Version;
use url::Url;

use crate::{
    config::{DEFAULT_HOST, DEFAULT_ORG, ReleaseConfig},
    error::MainlineError,
    result::Result,
};

/// Bump, tag, and promote develop to main.
#[derive(Parser, Debug)]
#[command(about, long_about = None)]
pub struct Args {
    /// Repository to release, e.g. "sample-lib".
    pub repository: String,

    /// Target release version, e.g. "1.2.0".
    pub version: String,

    #[arg(long, default_value = DEFAULT_ORG)]
    /// Organization owning the repository on the remote host.
    pub org: String,

    #[arg(long, default_value = DEFAULT_HOST)]
    /// Remote host used to construct the clone URL.
    pub host: String,

    #[arg(long)]
    /// Explicit clone URL, bypassing host/org resolution.
    pub remote: Option<String>,

    #[arg(long, default_value_t = false)]
    /// Print mutating operations instead of executing them.
    pub dry_run: bool,

    #[arg(long, default_value_t = false)]
    /// Overwrite and force-push tags that already exist.
    pub force: bool,

    #[arg(long, default_value_t = false)]
    /// Enable debug logging.
    pub debug: bool,
}

impl Args {
    /// Validate arguments and produce the immutable release configuration.
    pub fn into_config(self) -> Result<ReleaseConfig> {
        if self.repository.is_empty() {
            return Err(
                MainlineError::invalid_args("repository must not be empty").into()
            );
        }

        // A path-like name would silently change the clone target.
        if self.repository.contains('/') || self.repository.contains('\\') {
            return Err(MainlineError::invalid_args(format!(
                "repository must be a bare name, got path-like '{}'",
                self.repository
            ))
            .into());
        }

        // The version is carried as opaque text for manifest editing, but it
        // must at least be a bare semver triple so the derived dev/release
        // tags are well formed.
        let parsed = Version::parse(&self.version).map_err(|e| {
            MainlineError::invalid_args(format!(
                "version '{}' is not a valid semantic version: {}",
                self.version, e
            ))
        })?;

        if !parsed.pre.is_empty() || !parsed.build.is_empty() {
            return Err(MainlineError::invalid_args(format!(
                "version '{}' must be a bare MAJOR.MINOR.PATCH release version",
                self.version
            ))
            .into());
        }

        // A constructed clone URL must at least parse; explicit --remote
        // values may be local paths and are passed through untouched.
        if self.remote.is_none() {
            let url = format!(
                "https://{}/{}/{}.git",
                self.host, self.org, self.repository
            );
            Url::parse(&url).map_err(MainlineError::UrlError)?;
        }

        Ok(ReleaseConfig {
            repository: self.repository,
            version: self.version,
            org: self.org,
            host: self.host,
            remote: self.remote,
            dry_run: self.dry_run,
            force: self.force,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> clap::error::Result<Args> {
        Args::try_parse_from(argv)
    }

    #[test]
    fn parses_positional_arguments() {
        let args = parse(&["mainline", "sample-lib", "1.2.0"]).unwrap();
        assert_eq!(args.repository, "sample-lib");
        assert_eq!(args.version, "1.2.0");
        assert_eq!(args.org, DEFAULT_ORG);
        assert_eq!(args.host, DEFAULT_HOST);
        assert!(!args.dry_run);
        assert!(!args.force);
    }

    #[test]
    fn requires_both_positional_arguments() {
        assert!(parse(&["mainline"]).is_err());
        assert!(parse(&["mainline", "sample-lib"]).is_err());
    }

    #[test]
    fn parses_flags() {
        let args = parse(&[
            "mainline",
            "sample-lib",
            "1.2.0",
            "--org",
            "acme",
            "--dry-run",
            "--force",
        ])
        .unwrap();
        assert_eq!(args.org, "acme");
        assert!(args.dry_run);
        assert!(args.force);
    }

    #[test]
    fn rejects_path_like_repository() {
        let args = parse(&["mainline", "acme/sample-lib", "1.2.0"]).unwrap();
        assert!(args.into_config().is_err());
    }

    #[test]
    fn rejects_invalid_version() {
        let args = parse(&["mainline", "sample-lib", "not-a-version"]).unwrap();
        assert!(args.into_config().is_err());
    }

    #[test]
    fn rejects_prerelease_version() {
        let args = parse(&["mainline", "sample-lib", "1.2.0-rc.1"]).unwrap();
        assert!(args.into_config().is_err());
    }

    #[test]
    fn produces_config_for_valid_arguments() {
        let args =
            parse(&["mainline", "sample-lib", "1.2.0", "--remote", "/tmp/r.git"])
                .unwrap();
        let cfg = args.into_config().unwrap();
        assert_eq!(cfg.repository, "sample-lib");
        assert_eq!(cfg.version, "1.2.0");
        assert_eq!(cfg.remote_url(), "/tmp/r.git");
    }
}
