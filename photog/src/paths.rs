//! This module resolves user-supplied paths (which may use `~` as shorthand for the home directory) to canonical
//! filesystem paths.

use {
    anyhow::{Context, Result},
    photog_shared::Error,
    std::path::PathBuf,
    tokio::fs,
};

/// Replace a leading `~` or `~/` in `path` with the current user's home directory.
///
/// Paths without that prefix (including `~user/...`), and all paths when no home directory can be determined, are
/// returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(home) = dirs::home_dir() {
        if path == "~" {
            return home;
        } else if let Some(rest) = path.strip_prefix("~/") {
            return home.join(rest);
        }
    }

    PathBuf::from(path)
}

/// Expand `path` and resolve it to an absolute path with all symlinks followed.
///
/// Fails with `Error::Path` if the path does not exist.
pub async fn resolve(path: &str) -> Result<PathBuf> {
    fs::canonicalize(expand_home(path))
        .await
        .with_context(|| Error::Path(path.to_owned()))
}

#[cfg(test)]
mod test {
    use {super::*, tempfile::TempDir};

    #[test]
    fn home_shorthand() {
        assert_eq!(expand_home("/tmp/photos"), PathBuf::from("/tmp/photos"));
        assert_eq!(expand_home("photos/~"), PathBuf::from("photos/~"));
        assert_eq!(expand_home("~other/photos"), PathBuf::from("~other/photos"));

        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~"), home);
            assert_eq!(expand_home("~/photos/2021"), home.join("photos/2021"));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn missing_paths() -> Result<()> {
        let dir = TempDir::new()?;

        let missing = dir.path().join("missing").to_str().unwrap().to_owned();

        let error = resolve(&missing).await.unwrap_err();

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::Path(path)) if *path == missing
        ));

        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn symlinks() -> Result<()> {
        let dir = TempDir::new()?;

        let target = dir.path().join("target");
        fs::create_dir(&target).await?;

        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link)?;

        assert_eq!(
            resolve(link.to_str().unwrap()).await?,
            fs::canonicalize(&target).await?
        );

        Ok(())
    }
}
