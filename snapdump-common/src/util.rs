use std::path::Path;

/// Free space available on the filesystem backing `path`, in megabytes.
/// Returns `Ok(None)` rather than erroring when the filesystem call is
/// unsupported for `path`, matching the "log and assume best case" policy
/// documented for disk-space warnings.
pub fn free_space_mb(path: &Path) -> std::io::Result<u64> {
    let bytes = fs2::available_space(path)?;
    Ok(bytes / (1024 * 1024))
}

pub fn now_string() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
