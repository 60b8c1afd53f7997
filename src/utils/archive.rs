//! 提交文件包（gzip 压缩的 tar）的打包与解包

use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{AutograderError, Result};

/// 将目录打包为 gzip 压缩的 tar 字节
///
/// 条目按相对路径排序，同样的目录内容总是得到同样的条目顺序。
/// 目录不存在时打包为空归档。
pub fn pack_dir(dir: &Path) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    if dir.is_dir() {
        let mut files = Vec::new();
        collect_files(dir, dir, &mut files)?;
        files.sort();

        for relative in files {
            builder
                .append_path_with_name(dir.join(&relative), &relative)
                .map_err(|e| {
                    AutograderError::storage(format!(
                        "打包文件 '{}' 失败: {e}",
                        relative.display()
                    ))
                })?;
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| AutograderError::storage(format!("完成 tar 归档失败: {e}")))?;
    encoder
        .finish()
        .map_err(|e| AutograderError::storage(format!("完成 gzip 压缩失败: {e}")))
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_path_buf());
        }
    }
    Ok(())
}

/// 将 gzip 压缩的 tar 字节解包到目标目录；空字节只创建目录
pub fn unpack_to_dir(bytes: &[u8], dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| {
        AutograderError::storage(format!("创建目录 '{}' 失败: {e}", dir.display()))
    })?;

    if bytes.is_empty() {
        return Ok(());
    }

    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    archive.unpack(dir).map_err(|e| {
        AutograderError::storage(format!("解包到 '{}' 失败: {e}", dir.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_and_unpack() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("nested")).unwrap();
        fs::write(src.path().join("submission.py"), "print('hi')\n").unwrap();
        fs::write(src.path().join("nested/data.txt"), "1 2 3").unwrap();

        let bytes = pack_dir(src.path()).unwrap();

        let dst = tempfile::tempdir().unwrap();
        unpack_to_dir(&bytes, &dst.path().join("input")).unwrap();
        assert_eq!(
            fs::read_to_string(dst.path().join("input/submission.py")).unwrap(),
            "print('hi')\n"
        );
        assert_eq!(
            fs::read_to_string(dst.path().join("input/nested/data.txt")).unwrap(),
            "1 2 3"
        );
    }

    #[test]
    fn test_empty_bytes_create_directory() {
        let dst = tempfile::tempdir().unwrap();
        unpack_to_dir(&[], &dst.path().join("output")).unwrap();
        assert!(dst.path().join("output").is_dir());
    }

    #[test]
    fn test_pack_missing_dir_is_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = pack_dir(&dir.path().join("missing")).unwrap();

        let dst = tempfile::tempdir().unwrap();
        unpack_to_dir(&bytes, dst.path()).unwrap();
        assert_eq!(fs::read_dir(dst.path()).unwrap().count(), 0);
    }
}
