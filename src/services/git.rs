//! git2-backed [`GitService`].

use super::{DiffHunk, GitService};
use crate::domain::{ChangeType, DiffFile, GitDiff};
use anyhow::{Context, Result};
use git2::{Diff, DiffFormat, DiffOptions, Repository, Status, StatusOptions};
use std::path::{Path, PathBuf};

/// Reads uncommitted changes from the repository containing `root`.
///
/// A fresh `Repository` handle is opened per query because handles are not
/// `Sync`.
pub struct Git2Service {
    root: PathBuf,
}

impl Git2Service {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Bind only when `root` is inside a git repository.
    pub fn discover(root: impl Into<PathBuf>) -> Option<Self> {
        let root = root.into();
        Repository::discover(&root).ok().map(|_| Self { root })
    }

    fn open(&self) -> Result<Repository> {
        Repository::discover(&self.root)
            .with_context(|| format!("No git repository at {}", self.root.display()))
    }

    /// `root` relative to the repository working directory, `""` at the top.
    fn prefix(&self, repo: &Repository) -> String {
        let root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
        repo.workdir()
            .and_then(|workdir| workdir.canonicalize().ok())
            .and_then(|workdir| root.strip_prefix(workdir).ok().map(Path::to_path_buf))
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default()
    }

    /// Uncommitted changes under `root`, as the diff input the extractor reads.
    pub fn changed_files(&self) -> Result<GitDiff> {
        let repo = self.open()?;
        let prefix = self.prefix(&repo);
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true).include_ignored(false);
        if !prefix.is_empty() {
            opts.pathspec(&prefix);
        }

        let statuses = repo.statuses(Some(&mut opts)).context("Failed to read git status")?;
        let mut files = Vec::new();
        for entry in statuses.iter() {
            let Some(path) = entry.path() else { continue };
            let status = entry.status();
            let change_type = if status.intersects(Status::WT_DELETED | Status::INDEX_DELETED) {
                ChangeType::Deleted
            } else if status.intersects(Status::WT_NEW | Status::INDEX_NEW) {
                ChangeType::Added
            } else if status.intersects(
                Status::WT_MODIFIED
                    | Status::INDEX_MODIFIED
                    | Status::WT_RENAMED
                    | Status::INDEX_RENAMED
                    | Status::WT_TYPECHANGE
                    | Status::INDEX_TYPECHANGE,
            ) {
                ChangeType::Modified
            } else {
                continue;
            };
            files.push(DiffFile::new(strip_prefix(&prefix, path), change_type));
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(GitDiff { files })
    }
}

impl GitService for Git2Service {
    fn diff_hunks(&self, path: &str) -> Result<Vec<DiffHunk>> {
        let repo = self.open()?;
        let prefix = self.prefix(&repo);
        let pathspec = if prefix.is_empty() { path.to_string() } else { format!("{prefix}/{path}") };
        let mut opts = DiffOptions::new();
        opts.pathspec(&pathspec).include_untracked(true).recurse_untracked_dirs(true).context_lines(3);

        let head_tree = repo.head().ok().and_then(|head| head.peel_to_tree().ok());
        let diff = repo
            .diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut opts))
            .with_context(|| format!("Failed to diff {path}"))?;

        let mut hunks = collect_hunks(&diff)?;
        for hunk in &mut hunks {
            hunk.path = strip_prefix(&prefix, &hunk.path);
        }
        Ok(hunks)
    }
}

fn strip_prefix(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        return path.to_string();
    }
    path.strip_prefix(prefix).map(|p| p.trim_start_matches('/')).unwrap_or(path).to_string()
}

fn collect_hunks(diff: &Diff<'_>) -> Result<Vec<DiffHunk>> {
    let mut hunks: Vec<DiffHunk> = Vec::new();

    diff.print(DiffFormat::Patch, |delta, hunk, line| {
        let Some(hunk) = hunk else {
            return true;
        };
        let path = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        let header = String::from_utf8_lossy(hunk.header()).trim_end().to_string();

        let starts_new = hunks.last().map_or(true, |h| h.path != path || h.header != header);
        if starts_new {
            hunks.push(DiffHunk {
                path,
                header,
                new_start: hunk.new_start() as usize,
                new_lines: hunk.new_lines() as usize,
                content: String::new(),
            });
        }

        if let Some(current) = hunks.last_mut() {
            let origin = line.origin();
            if origin == 'H' {
                return true;
            }
            if matches!(origin, '+' | '-' | ' ') {
                current.content.push(origin);
            }
            current.content.push_str(&String::from_utf8_lossy(line.content()));
        }
        true
    })
    .context("Failed to render diff")?;

    Ok(hunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn commit_all(repo: &Repository, message: &str) {
        let mut index = repo.index().expect("index");
        index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None).expect("add");
        index.write().expect("write index");
        let tree_id = index.write_tree().expect("tree");
        let tree = repo.find_tree(tree_id).expect("find tree");
        let sig = git2::Signature::now("tester", "tester@example.com").expect("sig");
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[]).expect("commit");
    }

    #[test]
    fn test_discover_requires_repository() {
        let tmp = TempDir::new().expect("tmp");
        assert!(Git2Service::discover(tmp.path()).is_none());
        Repository::init(tmp.path()).expect("init");
        assert!(Git2Service::discover(tmp.path()).is_some());
    }

    #[test]
    fn test_diff_hunks_for_modified_file() {
        let tmp = TempDir::new().expect("tmp");
        let repo = Repository::init(tmp.path()).expect("init");
        fs::create_dir_all(tmp.path().join("src")).expect("mkdir");
        fs::write(tmp.path().join("src/lib.rs"), "fn a() {}\nfn b() {}\n").expect("write");
        commit_all(&repo, "initial");

        fs::write(tmp.path().join("src/lib.rs"), "fn a() {}\nfn b() { todo() }\nfn c() {}\n")
            .expect("rewrite");

        let service = Git2Service::new(tmp.path());
        let hunks = service.diff_hunks("src/lib.rs").expect("hunks");
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].path, "src/lib.rs");
        assert!(hunks[0].header.starts_with("@@"));
        assert!(hunks[0].content.contains("+fn c() {}"));
        assert!(hunks[0].content.contains("-fn b() {}"));
    }

    #[test]
    fn test_untouched_file_has_no_hunks() {
        let tmp = TempDir::new().expect("tmp");
        let repo = Repository::init(tmp.path()).expect("init");
        fs::write(tmp.path().join("a.txt"), "same\n").expect("write");
        commit_all(&repo, "initial");

        let hunks = Git2Service::new(tmp.path()).diff_hunks("a.txt").expect("hunks");
        assert!(hunks.is_empty());
    }

    #[test]
    fn test_changed_files_reports_change_types() {
        let tmp = TempDir::new().expect("tmp");
        let repo = Repository::init(tmp.path()).expect("init");
        fs::write(tmp.path().join("keep.rs"), "a\n").expect("write");
        fs::write(tmp.path().join("edit.rs"), "a\n").expect("write");
        fs::write(tmp.path().join("gone.rs"), "a\n").expect("write");
        commit_all(&repo, "initial");

        fs::write(tmp.path().join("edit.rs"), "b\n").expect("edit");
        fs::remove_file(tmp.path().join("gone.rs")).expect("remove");
        fs::write(tmp.path().join("new.rs"), "c\n").expect("add");

        let diff = Git2Service::new(tmp.path()).changed_files().expect("status");
        let summary: Vec<(&str, ChangeType)> =
            diff.files.iter().map(|f| (f.path.as_str(), f.change_type)).collect();
        assert_eq!(
            summary,
            vec![
                ("edit.rs", ChangeType::Modified),
                ("gone.rs", ChangeType::Deleted),
                ("new.rs", ChangeType::Added),
            ]
        );
    }

    #[test]
    fn test_subdirectory_root_uses_relative_paths() {
        let tmp = TempDir::new().expect("tmp");
        let repo = Repository::init(tmp.path()).expect("init");
        fs::create_dir_all(tmp.path().join("app/src")).expect("mkdir");
        fs::write(tmp.path().join("app/src/main.rs"), "fn main() {}\n").expect("write");
        commit_all(&repo, "initial");
        fs::write(tmp.path().join("app/src/main.rs"), "fn main() { run() }\n").expect("edit");

        let service = Git2Service::new(tmp.path().join("app"));
        let diff = service.changed_files().expect("status");
        assert_eq!(diff.files[0].path, "src/main.rs");
        let hunks = service.diff_hunks("src/main.rs").expect("hunks");
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].path, "src/main.rs");
    }
}
