use std::path::{Path, PathBuf};

use tempfile::TempDir;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Monthly store sales; "north" is missing March and "south" starts in February.
pub const MONTHLY_SALES: &str = "\
store,month,sales
north,2022-01-01,1
north,2022-02-01,2
north,2022-04-01,4
south,2022-02-01,20
south,2022-03-01,30
south,2022-04-01,40
";

pub fn write_csv(dir: &TempDir, name: &str, contents: &str) -> TestResult<PathBuf> {
    let path = dir.path().join(name);
    std::fs::write(&path, contents)?;
    Ok(path)
}

pub fn arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
