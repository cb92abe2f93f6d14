// Common test utilities shared across acceptance tests
//
// ## Deterministic ordering
//
// Eviction order depends on modification times. Creating files in a tight
// loop can give many of them the same mtime, so every helper here pins mtimes
// explicitly with `filetime`: the first file created is the oldest.
//
// Directory mtimes change whenever a child is added or removed, so a
// directory's own age must be set after its contents are in place.

use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Pin the modification time of `path` to `age_secs` seconds in the past
pub fn set_age(path: &Path, age_secs: u64) {
    let mtime = SystemTime::now() - Duration::from_secs(age_secs);
    filetime::set_file_mtime(path, FileTime::from_system_time(mtime)).unwrap();
}

/// Create `count` files of `size` bytes named "File number {i}.test"
///
/// File `i` is one second older than file `i + 1`; the newest file is
/// `newest_age_secs` old. Returns the paths in creation order.
pub fn create_flat_directory_of_files(
    dir: &Path,
    count: usize,
    size: usize,
    newest_age_secs: u64,
) -> Vec<PathBuf> {
    fs::create_dir_all(dir).unwrap();
    let content = vec![b'x'; size];

    (0..count)
        .map(|i| {
            let path = dir.join(format!("File number {}.test", i));
            fs::write(&path, &content).unwrap();
            set_age(&path, newest_age_secs + (count - i) as u64);
            path
        })
        .collect()
}

/// Number of regular files directly inside `dir`
#[allow(dead_code)]
pub fn file_count(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter(|entry| entry.as_ref().unwrap().file_type().unwrap().is_file())
        .count()
}

/// Build the nested tree used by the directory eviction scenarios
///
/// ```text
/// root/                      10 x 1000 bytes   (oldest)
/// root/dir_10000_bytes/      30 x 100
///     dir_2000_bytes/        20 x 100
///     dir_5000_bytes/        50 x 100
/// root/dir_5000_bytes/       10 x 100
///     dir_4000_bytes/        40 x 100
/// root/dir_6000_bytes/       20 x 100          (newest)
///     dir_1000_bytes/        10 x 100
///     dir_3000_bytes/        30 x 100
/// ```
///
/// 31 000 bytes in total.
#[allow(dead_code)]
pub fn create_nested_tree(root: &Path) {
    create_flat_directory_of_files(root, 10, 1000, 10_000);

    let dir_10000 = root.join("dir_10000_bytes");
    create_flat_directory_of_files(&dir_10000, 30, 100, 9_000);
    create_flat_directory_of_files(&dir_10000.join("dir_2000_bytes"), 20, 100, 8_900);
    create_flat_directory_of_files(&dir_10000.join("dir_5000_bytes"), 50, 100, 8_800);
    set_age(&dir_10000.join("dir_2000_bytes"), 8_900);
    set_age(&dir_10000.join("dir_5000_bytes"), 8_800);
    set_age(&dir_10000, 8_800);

    let dir_5000 = root.join("dir_5000_bytes");
    create_flat_directory_of_files(&dir_5000, 10, 100, 8_000);
    create_flat_directory_of_files(&dir_5000.join("dir_4000_bytes"), 40, 100, 7_900);
    set_age(&dir_5000.join("dir_4000_bytes"), 7_900);
    set_age(&dir_5000, 7_900);

    let dir_6000 = root.join("dir_6000_bytes");
    create_flat_directory_of_files(&dir_6000, 20, 100, 7_000);
    create_flat_directory_of_files(&dir_6000.join("dir_1000_bytes"), 10, 100, 6_900);
    create_flat_directory_of_files(&dir_6000.join("dir_3000_bytes"), 30, 100, 6_800);
    set_age(&dir_6000.join("dir_1000_bytes"), 6_900);
    set_age(&dir_6000.join("dir_3000_bytes"), 6_800);
    set_age(&dir_6000, 6_800);
}
