//! Ephemeral root assembly.
//!
//! An ephemeral root is a uniquely named directory holding a shadow of the
//! absolute host paths one interpreter launch needs: the binary, library
//! roots, CA bundle, resolver files, and the per-run directory. The child
//! chroots into it before `exec`, so the shadow is the entire world the
//! user code can see.
//!
//! Lifecycle: assembled before spawn, handed to the child as its working
//! directory, removed by the supervisor's after-exit hook. The assembler
//! never deletes on its own - the tree must outlive this scope while the
//! child runs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

/// An assembled ephemeral root directory at `<base>/tmp/sandbox-<uuid>`.
#[derive(Debug)]
pub struct EphemeralRoot {
    path: PathBuf,
}

impl EphemeralRoot {
    /// Create the root and shadow every existing `required` path inside it
    /// at its own absolute location. Host paths that do not exist are
    /// skipped - interpreter installations vary.
    pub fn assemble(base: &Path, required: &[PathBuf]) -> io::Result<Self> {
        let path = base.join("tmp").join(format!("sandbox-{}", Uuid::new_v4()));
        fs::create_dir_all(&path)?;

        let root = Self { path };
        for source in required {
            if !source.exists() {
                warn!(path = %source.display(), "shadow path missing on host, skipping");
                continue;
            }
            root.shadow(source)?;
        }
        Ok(root)
    }

    /// Shadow one absolute host path into the root at the same location.
    pub fn shadow(&self, source: &Path) -> io::Result<()> {
        self.shadow_as(source, source)
    }

    /// Shadow `source` so it appears at `visible` inside the root.
    ///
    /// Used to materialise curated copies (the hermetic library tree) at
    /// the absolute path the interpreter expects.
    pub fn shadow_as(&self, source: &Path, visible: &Path) -> io::Result<()> {
        let relative = visible.strip_prefix("/").unwrap_or(visible);
        let target = self.path.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        copy_tree(source, &target)
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively delete the root. Called from the after-exit hook once
    /// the child is gone; failures are logged, not propagated, since the
    /// execution result is already decided by then.
    pub fn remove(&self) {
        if let Err(err) = fs::remove_dir_all(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), %err, "failed to remove ephemeral root");
            }
        }
    }
}

/// Copy a file or directory tree, following symlinks.
///
/// Symlinks are resolved rather than recreated: shared-library symlink
/// chains must end in real bytes inside the chroot.
pub fn copy_tree(source: &Path, target: &Path) -> io::Result<()> {
    let meta = fs::metadata(source)?;
    if meta.is_dir() {
        fs::create_dir_all(target)?;
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            let entry_source = entry.path();
            // A dangling symlink inside a library dir is not worth failing
            // the whole assembly for.
            if fs::metadata(&entry_source).is_err() {
                continue;
            }
            copy_tree(&entry_source, &target.join(entry.file_name()))?;
        }
    } else {
        fs::copy(source, target)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn assemble_creates_unique_roots() {
        let base = tempfile::tempdir().unwrap();
        let a = EphemeralRoot::assemble(base.path(), &[]).unwrap();
        let b = EphemeralRoot::assemble(base.path(), &[]).unwrap();
        assert!(a.path().exists());
        assert!(b.path().exists());
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(base.path().join("tmp")));
    }

    #[test]
    fn shadow_mirrors_absolute_paths() {
        let host = tempfile::tempdir().unwrap();
        let lib_dir = host.path().join("lib/demo");
        fs::create_dir_all(&lib_dir).unwrap();
        fs::write(lib_dir.join("mod.py"), b"x = 1\n").unwrap();

        let base = tempfile::tempdir().unwrap();
        let root = EphemeralRoot::assemble(base.path(), &[lib_dir.clone()]).unwrap();

        let shadowed = root
            .path()
            .join(lib_dir.strip_prefix("/").unwrap())
            .join("mod.py");
        assert_eq!(fs::read(shadowed).unwrap(), b"x = 1\n");
    }

    #[test]
    fn missing_paths_are_skipped() {
        let base = tempfile::tempdir().unwrap();
        let root = EphemeralRoot::assemble(
            base.path(),
            &[PathBuf::from("/definitely/not/a/real/path")],
        )
        .unwrap();
        assert!(root.path().exists());
    }

    #[test]
    fn symlinks_are_resolved_to_content() {
        let host = tempfile::tempdir().unwrap();
        let dir = host.path().join("so");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("libdemo.so.1.2"), b"elf bytes").unwrap();
        symlink("libdemo.so.1.2", dir.join("libdemo.so")).unwrap();

        let base = tempfile::tempdir().unwrap();
        let root = EphemeralRoot::assemble(base.path(), &[dir.clone()]).unwrap();

        let shadowed = root.path().join(dir.strip_prefix("/").unwrap());
        assert_eq!(fs::read(shadowed.join("libdemo.so")).unwrap(), b"elf bytes");
        assert!(!fs::symlink_metadata(shadowed.join("libdemo.so"))
            .unwrap()
            .file_type()
            .is_symlink());
    }

    #[test]
    fn remove_deletes_the_tree() {
        let base = tempfile::tempdir().unwrap();
        let root = EphemeralRoot::assemble(base.path(), &[]).unwrap();
        let path = root.path().to_path_buf();
        fs::write(path.join("leftover"), b"x").unwrap();
        root.remove();
        assert!(!path.exists());
    }
}
