//! 原子写出工具。
//!
//! 「先写临时文件，成功后再 rename 到目标路径」，
//! 写出失败时目标路径保持原状，不会留下截断的半成品。

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 通过已打开的临时文件原子写出，写完 fsync 后才 rename。
pub fn write_atomic<F>(target: &Path, write_fn: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    stage_atomic(target, |tmp_path| {
        let mut tmp_file = File::create(tmp_path)?;
        write_fn(&mut tmp_file)?;
        tmp_file.flush()?;
        tmp_file.sync_all()
    })
}

/// 原子写入一段完整的字节内容。
pub fn write_bytes_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    write_atomic(target, |file| file.write_all(bytes))
}

/// 以路径形式暴露临时文件的原子写出。
///
/// 适用于必须自己按路径打开文件的写出方（例如 SQLite）。
/// `stage_fn` 失败时删除临时文件并原样返回错误。
pub fn stage_atomic<T, E, F>(target: &Path, stage_fn: F) -> Result<T, E>
where
    F: FnOnce(&Path) -> Result<T, E>,
    E: From<io::Error>,
{
    let parent = target.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "目标路径没有父目录，无法执行原子写入",
        )
    })?;

    fs::create_dir_all(parent)?;

    let stem = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("staged");
    let tmp_path = tmp_path_for(parent, stem);

    let value = match stage_fn(&tmp_path) {
        Ok(value) => value,
        Err(err) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }
    };

    // rename 会覆盖已存在的目标文件
    if let Err(err) = fs::rename(&tmp_path, target) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }

    Ok(value)
}

/// `parent/.<stem>.<pid>.<n>.partial`，同一进程内每次调用都不同
pub fn tmp_path_for(parent: &Path, stem: &str) -> PathBuf {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    parent.join(format!(".{stem}.{}.{n}.partial", std::process::id()))
}
