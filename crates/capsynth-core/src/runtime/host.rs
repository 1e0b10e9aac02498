//! Host functions exposed to capability scripts.
//!
//! All file helpers operate relative to a single workspace directory. Absolute
//! paths and `..` components are rejected before touching the filesystem.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use rhai::{Array, Dynamic, Engine, EvalAltResult};

type HostResult<T> = Result<T, Box<EvalAltResult>>;

/// Resolve a script-supplied relative path inside `root`.
pub fn confine(root: &Path, relative: &str) -> HostResult<PathBuf> {
    let path = Path::new(relative);
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if relative.trim().is_empty() || escapes {
        return Err(format!("path is outside the capability workspace: {relative}").into());
    }
    Ok(root.join(path))
}

fn io_fail(op: &str, path: &Path, err: std::io::Error) -> Box<EvalAltResult> {
    format!("{op} {}: {err}", path.display()).into()
}

fn ensure_parent(path: &Path) -> HostResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_fail("create dir", parent, e))?;
    }
    Ok(())
}

/// Register the workspace-scoped helpers on `engine`.
pub fn register(engine: &mut Engine, workspace: &Path) {
    let root = Arc::new(workspace.to_path_buf());

    let r = Arc::clone(&root);
    engine.register_fn("write_text", move |path: &str, content: &str| -> HostResult<bool> {
        let target = confine(&r, path)?;
        ensure_parent(&target)?;
        fs::write(&target, content).map_err(|e| io_fail("write", &target, e))?;
        Ok(true)
    });

    let r = Arc::clone(&root);
    engine.register_fn("append_text", move |path: &str, content: &str| -> HostResult<bool> {
        use std::io::Write;
        let target = confine(&r, path)?;
        ensure_parent(&target)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&target)
            .map_err(|e| io_fail("open", &target, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| io_fail("append", &target, e))?;
        Ok(true)
    });

    let r = Arc::clone(&root);
    engine.register_fn("read_text", move |path: &str| -> HostResult<String> {
        let target = confine(&r, path)?;
        fs::read_to_string(&target).map_err(|e| io_fail("read", &target, e))
    });

    let r = Arc::clone(&root);
    engine.register_fn("file_exists", move |path: &str| -> HostResult<bool> {
        Ok(confine(&r, path)?.exists())
    });

    let r = Arc::clone(&root);
    engine.register_fn("list_dir", move |path: &str| -> HostResult<Array> {
        let target = confine(&r, path)?;
        if !target.exists() {
            return Ok(Array::new());
        }
        let mut names: Vec<String> = fs::read_dir(&target)
            .map_err(|e| io_fail("list", &target, e))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names.into_iter().map(Dynamic::from).collect())
    });

    let r = Arc::clone(&root);
    engine.register_fn("make_dir", move |path: &str| -> HostResult<bool> {
        let target = confine(&r, path)?;
        fs::create_dir_all(&target).map_err(|e| io_fail("create dir", &target, e))?;
        Ok(true)
    });

    let r = Arc::clone(&root);
    engine.register_fn("copy_file", move |from: &str, to: &str| -> HostResult<bool> {
        let source = confine(&r, from)?;
        let target = confine(&r, to)?;
        ensure_parent(&target)?;
        fs::copy(&source, &target).map_err(|e| io_fail("copy", &source, e))?;
        Ok(true)
    });

    engine.register_fn("now_iso", || chrono::Utc::now().to_rfc3339());
}
