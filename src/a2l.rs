//! A long-lived `addr2line -fe <image>` co-process. Queries are synchronous
//! request/response pairs over the child's standard streams: we write one
//! address, then consume exactly the two lines it prints (function name, then
//! `<path>:<line>`). Consuming anything else would desynchronize every
//! subsequent answer, so all pipe traffic goes through [`Addr2LineSession`].

use crate::error::Result;
use anyhow::Context;
use anyhow::anyhow;
use anyhow::ensure;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::Child;
use std::process::ChildStdin;
use std::process::ChildStdout;
use std::process::Command;
use std::process::Stdio;

pub(crate) struct Addr2LineSession {
    child: Child,
    input: ChildStdin,
    output: BufReader<ChildStdout>,
    /// Normalized absolute directory of the image, used to rebase the paths
    /// the tool reports.
    image_dir: String,
    /// Once the child is known dead, every further query answers None
    /// without touching the pipes.
    failed: bool,
}

impl Addr2LineSession {
    /// Verifies both paths, spawns `tool -fe image` and wires up the pipes.
    pub(crate) fn spawn(tool: &Path, image: &Path) -> Result<Addr2LineSession> {
        let tool = resolve_tool(tool)?;
        ensure!(
            image.exists(),
            "Image file `{}` not found",
            image.display()
        );

        let mut child = Command::new(&tool)
            .arg("-fe")
            .arg(image)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start `{}`", tool.display()))?;

        let input = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("Missing stdin pipe for `{}`", tool.display()))?;
        let output = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| anyhow!("Missing stdout pipe for `{}`", tool.display()))?;

        Ok(Addr2LineSession {
            child,
            input,
            output,
            image_dir: image_directory(image)?,
            failed: false,
        })
    }

    /// Maps an address to its normalized source path (with the `:<line>`
    /// suffix still attached), or None when the tool doesn't know the
    /// location or the session is no longer usable.
    pub(crate) fn resolve(&mut self, address: u64) -> Option<String> {
        if self.failed {
            return None;
        }
        match self.query(address) {
            Ok(location) => location,
            Err(error) => {
                tracing::warn!(%error, address, "addr2line session lost");
                self.failed = true;
                None
            }
        }
    }

    fn query(&mut self, address: u64) -> Result<Option<String>> {
        writeln!(self.input, "{address:08x}")?;
        self.input.flush()?;

        // First line is the function name; only the location matters here.
        self.read_line()?;
        let location = self.read_line()?;

        if location.starts_with("??") {
            return Ok(None);
        }
        Ok(Some(normalize_path(&location)))
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self.output.read_line(&mut line)?;
        ensure!(n > 0, "addr2line closed its output stream");
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    /// The part of `path` below the image's directory, or None when the path
    /// lies outside it.
    pub(crate) fn rebase<'p>(&self, path: &'p str) -> Option<&'p str> {
        remove_prefix(&self.image_dir, path)
    }
}

impl Drop for Addr2LineSession {
    fn drop(&mut self) {
        // Kill delivers SIGKILL; the tool holds no state worth a graceful
        // shutdown and the kernel build would otherwise wait on it.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Accepts the tool as given when it names an existing file, otherwise
/// resolves it through $PATH, so both `./scripts/addr2line` and a
/// cross-prefixed `aarch64-linux-gnu-addr2line` work.
fn resolve_tool(tool: &Path) -> Result<PathBuf> {
    if tool.exists() {
        return Ok(tool.to_path_buf());
    }
    which::which(tool).with_context(|| format!("addr2line binary `{}` not found", tool.display()))
}

fn image_directory(image: &Path) -> Result<String> {
    let dir = match image.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().context("Failed to read the current directory")?,
    };
    Ok(normalize_path(&dir.to_string_lossy()))
}

/// Lexically resolves `.` and `..` without touching the filesystem. Tokens
/// are the `/`-separated components; the result always re-joins them with a
/// leading slash per component, so any non-empty input comes out
/// absolute-shaped. A `..` with no preceding token is kept literally.
pub(crate) fn normalize_path(input: &str) -> String {
    let mut out = String::new();
    let mut previous_token = None;
    for token in input.split('/').filter(|t| !t.is_empty()) {
        match token {
            "." => {}
            ".." if previous_token.is_some() => {
                if let Some(position) = out.rfind('/') {
                    out.truncate(position);
                }
            }
            _ => {
                out.push('/');
                out.push_str(token);
            }
        }
        previous_token = Some(token);
    }
    out
}

/// The suffix of `path` after `root`, iff `path` starts byte-for-byte with
/// `root`.
pub(crate) fn remove_prefix<'p>(root: &str, path: &'p str) -> Option<&'p str> {
    path.strip_prefix(root)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_plain_paths() {
        assert_eq!(normalize_path("a/b/c"), "/a/b/c");
        assert_eq!(normalize_path("/a/b/c"), "/a/b/c");
        assert_eq!(normalize_path("drivers/foo.c:10"), "/drivers/foo.c:10");
    }

    #[test]
    fn test_normalize_dot_and_dotdot() {
        assert_eq!(normalize_path("/a/./b"), "/a/b");
        assert_eq!(normalize_path("/a/x/../b"), "/a/b");
        assert_eq!(normalize_path("a/../../b"), "/b");
        assert_eq!(normalize_path("../a"), "/../a");
        assert_eq!(normalize_path("/a/b/../../c"), "/c");
    }

    #[test]
    fn test_normalize_degenerate_inputs() {
        assert_eq!(normalize_path(""), "");
        assert_eq!(normalize_path("/"), "");
        assert_eq!(normalize_path("//a//b"), "/a/b");
        assert_eq!(normalize_path("."), "");
    }

    #[test]
    fn test_remove_prefix() {
        assert_eq!(
            remove_prefix("/src/linux", "/src/linux/drivers/foo.c:10"),
            Some("/drivers/foo.c:10")
        );
        assert_eq!(remove_prefix("", "/drivers/foo.c:10"), Some("/drivers/foo.c:10"));
        assert_eq!(remove_prefix("/src/linux", "/src/linux"), Some(""));
        assert_eq!(remove_prefix("/src/linux", "/other/foo.c:10"), None);
        // Byte-for-byte: a shared prefix that splits a component still counts,
        // exactly like the original strcmp walk.
        assert_eq!(remove_prefix("/src/li", "/src/linux/foo.c:1"), Some("nux/foo.c:1"));
    }

    #[cfg(unix)]
    mod session {
        use super::super::Addr2LineSession;
        use super::super::test_support::fake_image;
        use super::super::test_support::fake_tool;
        use std::path::Path;

        #[test]
        fn test_resolve_known_and_unknown_addresses() {
            let dir = tempfile::tempdir().unwrap();
            let tool = fake_tool(
                dir.path(),
                "    *1a0) echo '/src/linux/drivers/./foo.c:10';;\n    *) echo '??:0';;\n",
            );
            let image = fake_image(dir.path());

            let mut session = Addr2LineSession::spawn(&tool, &image).unwrap();
            assert_eq!(
                session.resolve(0x1a0).as_deref(),
                Some("/src/linux/drivers/foo.c:10")
            );
            assert_eq!(session.resolve(0x2b0), None);
            // The unknown answer must not desynchronize the next query.
            assert_eq!(
                session.resolve(0x1a0).as_deref(),
                Some("/src/linux/drivers/foo.c:10")
            );
        }

        #[test]
        fn test_rebase_against_image_directory() {
            let dir = tempfile::tempdir().unwrap();
            let prefix = dir.path().to_str().unwrap().to_owned();
            let tool = fake_tool(dir.path(), &format!("    *) echo '{prefix}/kernel/fork.c:95';;\n"));
            let image = fake_image(dir.path());

            let mut session = Addr2LineSession::spawn(&tool, &image).unwrap();
            let path = session.resolve(0x100).unwrap();
            assert_eq!(session.rebase(&path), Some("/kernel/fork.c:95"));
            assert_eq!(session.rebase("/elsewhere/foo.c:1"), None);
        }

        #[test]
        fn test_dead_child_is_sticky() {
            let dir = tempfile::tempdir().unwrap();
            let tool = dir.path().join("fake-addr2line");
            std::fs::write(&tool, "#!/bin/sh\nexit 0\n").unwrap();
            {
                use std::os::unix::fs::PermissionsExt;
                let mut permissions = std::fs::metadata(&tool).unwrap().permissions();
                permissions.set_mode(0o755);
                std::fs::set_permissions(&tool, permissions).unwrap();
            }
            let image = fake_image(dir.path());

            let mut session = Addr2LineSession::spawn(&tool, &image).unwrap();
            assert_eq!(session.resolve(0x1a0), None);
            assert!(session.failed);
            assert_eq!(session.resolve(0x2b0), None);
        }

        #[test]
        fn test_spawn_rejects_missing_paths() {
            let dir = tempfile::tempdir().unwrap();
            let image = fake_image(dir.path());
            assert!(
                Addr2LineSession::spawn(Path::new("/no/such/addr2line-tool"), &image).is_err()
            );

            let tool = fake_tool(dir.path(), "    *) echo '??:0';;\n");
            assert!(
                Addr2LineSession::spawn(&tool, &dir.path().join("missing-image")).is_err()
            );
        }
    }
}
